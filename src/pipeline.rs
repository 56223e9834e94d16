//! End-to-end offload of an element-wise kernel.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gpu::{DeviceClass, DeviceRequest};
use crate::host::HostArray;
use crate::session::ComputeSession;
use crate::telemetry::{ExecutionTimer, RunReport, TimingStats};
use std::time::Duration;

/// Argument positions of the element-wise kernels.
const ARG_COUNT: usize = 0;
const ARG_LHS: usize = 1;
const ARG_RHS: usize = 2;
const ARG_OUT: usize = 3;

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    pub output: HostArray,
    /// Enqueue-to-completion time of the first dispatch.
    pub kernel_time: Duration,
    pub timings: TimingStats,
    pub device_name: String,
    pub device_class: DeviceClass,
    pub backend: wgpu::Backend,
    /// `None` unless verification was requested.
    pub verified: Option<bool>,
}

impl RunOutcome {
    pub fn report(&self, config: &Config) -> RunReport {
        RunReport {
            device_name: self.device_name.clone(),
            device_class: self.device_class,
            backend: format!("{:?}", self.backend),
            kernel_path: config.kernel_path.display().to_string(),
            entry_point: config.entry_point.clone(),
            element_count: self.output.len(),
            kernel_time_ms: crate::telemetry::timer::as_millis_f64(self.kernel_time),
            timings: self.timings.summary(),
            verified: self.verified,
        }
    }
}

/// Runs `a (op) b` on the selected device and downloads the result.
///
/// Every device handle is released before returning, on success and on
/// failure.
pub fn run(config: &Config, a: &HostArray, b: &HostArray) -> Result<RunOutcome> {
    config.validate()?;
    let n = config.element_count;
    if a.len() != n || b.len() != n {
        return Err(Error::config(format!(
            "input arrays hold {} and {} elements, expected {n}",
            a.len(),
            b.len()
        )));
    }
    // Bounded by validate().
    let work_size = n as u32;

    let mut session = ComputeSession::open(&DeviceRequest::from(config))?;
    session.build_program(&config.kernel_path)?;
    session.create_kernel(&config.entry_point)?;

    let (info, device_class) = match (session.adapter_info(), session.device_class()) {
        (Some(info), Some(class)) => (info.clone(), class),
        _ => return Err(Error::context("session has no open device")),
    };

    let lhs = session.allocate(n)?;
    let rhs = session.allocate(n)?;
    let out = session.allocate(n)?;

    session.upload(lhs, a)?;
    session.upload(rhs, b)?;

    session.bind_scalar(ARG_COUNT, work_size)?;
    session.bind_buffer(ARG_LHS, lhs)?;
    session.bind_buffer(ARG_RHS, rhs)?;
    session.bind_buffer(ARG_OUT, out)?;

    let mut timings = TimingStats::new();
    let mut kernel_time = None;
    for iteration in 0..config.iterations {
        let checkpoint = ExecutionTimer::start();
        session.enqueue(work_size)?.wait()?;
        let elapsed = checkpoint.elapsed();

        tracing::debug!("iteration {iteration}: {elapsed:?}");
        timings.record(elapsed);
        kernel_time.get_or_insert(elapsed);
    }

    let mut output = HostArray::zeroed(n);
    session.download(out, &mut output)?;

    let verified = if config.verify {
        if let Some((index, expected)) = output.first_sum_mismatch(a, b) {
            return Err(Error::Verification {
                index,
                expected,
                actual: output.as_slice()[index],
            });
        }
        tracing::info!("output verified against host-side addition");
        Some(true)
    } else {
        None
    };

    session.release();

    Ok(RunOutcome {
        output,
        kernel_time: kernel_time.unwrap_or_default(),
        timings,
        device_name: info.name,
        device_class,
        backend: info.backend,
        verified,
    })
}
