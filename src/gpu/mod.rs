//! Device dispatch pipeline on top of wgpu.
//!
//! Leaf-first: [`device`] picks an adapter, [`context`] opens it and hands out
//! the command queue, [`program`] compiles WGSL, [`kernel`] binds arguments and
//! dispatches, [`buffer`] moves data between host and device.

pub mod buffer;
pub mod context;
pub mod device;
pub mod kernel;
pub mod program;

pub use buffer::{BufferManager, DeviceBuffer};
pub use context::{CommandQueue, ComputeContext};
pub use device::{select_device, DeviceClass, DeviceRequest, SelectedDevice};
pub use kernel::{Event, Kernel, KernelSignature, KernelState, WorkGeometry};
pub use program::{compile_source, read_source, CompiledSource, Program, ProgramBuilder};
