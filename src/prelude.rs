pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::gpu::{DeviceClass, DeviceRequest, Event, KernelState};
pub use crate::host::{HostArray, PreviewMode};
pub use crate::pipeline::{run, RunOutcome};
pub use crate::session::{BufferId, ComputeSession};
pub use crate::telemetry::{ExecutionTimer, TimingStats};
