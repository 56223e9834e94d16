//! Device context and its in-order command queue.

use super::device::{DeviceClass, SelectedDevice};
use super::kernel::{Event, Kernel};
use crate::error::{Error, Result};

/// Owns the logical device opened on a [`SelectedDevice`].
///
/// Programs, kernels and buffers created against the context share its
/// lifetime and must be released before it.
#[derive(Debug)]
pub struct ComputeContext {
    device: wgpu::Device,
    queue: Option<wgpu::Queue>,
    info: wgpu::AdapterInfo,
    class: DeviceClass,
    limits: wgpu::Limits,
    // Kept so the adapter outlives the device on every backend.
    _adapter: wgpu::Adapter,
}

impl ComputeContext {
    /// Opens the device with the adapter's own limits.
    pub fn create(selected: SelectedDevice) -> Result<Self> {
        let (adapter, info, class) = selected.into_parts();
        let limits = adapter.limits();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("offload-device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            ..Default::default()
        }))
        .map_err(|e| Error::context(format!("{} rejected the request: {e}", info.name)))?;

        device.on_uncaptured_error(Box::new(|err| {
            tracing::error!("uncaptured device error: {err}");
        }));

        tracing::info!("context created on {}", info.name);

        Ok(Self {
            device,
            queue: Some(queue),
            info,
            class,
            limits,
            _adapter: adapter,
        })
    }

    /// Hands out the context's single in-order queue.
    ///
    /// Fails with [`Error::QueueCreation`] once the queue has been taken.
    pub fn create_queue(&mut self) -> Result<CommandQueue> {
        let queue = self
            .queue
            .take()
            .ok_or_else(|| Error::queue("the context's queue has already been created"))?;

        tracing::debug!("command queue created");

        Ok(CommandQueue {
            queue,
            device: self.device.clone(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Adapter the context was opened on.
    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Limits the device was opened with.
    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Destroys the device without waiting on outstanding work.
    pub(crate) fn release(self) {
        // Never waits on the device.
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            tracing::warn!("abandoning outstanding device work: {err}");
        }
        self.device.destroy();
        tracing::debug!("released context on {}", self.info.name);
    }
}

/// In-order submission channel bound to one context.
#[derive(Debug)]
pub struct CommandQueue {
    queue: wgpu::Queue,
    device: wgpu::Device,
}

impl CommandQueue {
    /// Submits `kernel` over `global_work_size` work items.
    pub fn enqueue(&self, kernel: &mut Kernel, global_work_size: u32) -> Result<Event> {
        kernel.dispatch(self, global_work_size)
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn submit<I>(&self, commands: I) -> wgpu::SubmissionIndex
    where
        I: IntoIterator<Item = wgpu::CommandBuffer>,
    {
        self.queue.submit(commands)
    }

    /// Blocks until the submission identified by `index` has executed.
    pub(crate) fn block_on(
        &self,
        index: wgpu::SubmissionIndex,
    ) -> std::result::Result<(), wgpu::PollError> {
        self.device
            .poll(wgpu::PollType::WaitForSubmissionIndex(index))
            .map(|_| ())
    }

    /// Blocks until everything submitted so far has executed.
    pub fn finish(&self) -> std::result::Result<(), wgpu::PollError> {
        self.device.poll(wgpu::PollType::Wait).map(|_| ())
    }
}

/// Runs `f` inside validation and out-of-memory error scopes and reports the
/// first error either scope captured.
pub(crate) fn with_error_scopes<T>(
    device: &wgpu::Device,
    f: impl FnOnce() -> T,
) -> std::result::Result<T, wgpu::Error> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

    let value = f();

    let out_of_memory = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());

    match out_of_memory.or(validation) {
        Some(err) => Err(err),
        None => Ok(value),
    }
}
