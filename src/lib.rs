//! offload-rs - element-wise kernel offload through wgpu
//!
//! Selects a compute device (a GPU, or a CPU-class adapter when the platform
//! has no GPU), compiles a WGSL kernel program, moves host arrays into device
//! buffers, dispatches the kernel over a 1-D index space, times the
//! execution and reads the result back.
//!
//! # Quick Start
//!
//! ```no_run
//! use offload_rs::prelude::*;
//!
//! let config = Config::builder().element_count(1024).seed(7).build().unwrap();
//! let a = HostArray::random(1024, Some(1));
//! let b = HostArray::random(1024, Some(2));
//!
//! let outcome = offload_rs::pipeline::run(&config, &a, &b).unwrap();
//! println!("Kernel Execution Time: {:?}", outcome.kernel_time);
//! ```
//!
//! # Step by step
//!
//! [`ComputeSession`] exposes each stage on its own and releases every
//! device handle in dependency order when dropped:
//!
//! ```no_run
//! use offload_rs::prelude::*;
//!
//! # fn main() -> offload_rs::Result<()> {
//! let mut session = ComputeSession::open(&DeviceRequest::default())?;
//! session.build_program("kernels/vector_ops.wgsl")?;
//! session.create_kernel("vector_add")?;
//!
//! let a = HostArray::from_vec(vec![1, 2, 3]);
//! let b = HostArray::from_vec(vec![10, 20, 30]);
//! let (lhs, rhs, out) = (session.allocate(3)?, session.allocate(3)?, session.allocate(3)?);
//! session.upload(lhs, &a)?;
//! session.upload(rhs, &b)?;
//!
//! session.bind_scalar(0, 3u32)?;
//! session.bind_buffer(1, lhs)?;
//! session.bind_buffer(2, rhs)?;
//! session.bind_buffer(3, out)?;
//! session.enqueue(3)?.wait()?;
//!
//! let mut result = HostArray::zeroed(3);
//! session.download(out, &mut result)?;
//! assert_eq!(result.as_slice(), &[11, 22, 33]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod gpu;
pub mod host;
pub mod pipeline;
pub mod prelude;
pub mod session;
pub mod telemetry;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use host::{HostArray, PreviewMode};
pub use session::{BufferId, ComputeSession};
