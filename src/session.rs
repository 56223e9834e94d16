//! Ownership and ordered release of every device handle of a run.

use crate::error::{Error, Result};
use crate::gpu::{
    select_device, BufferManager, CommandQueue, ComputeContext, DeviceClass, DeviceBuffer,
    DeviceRequest, Event, Kernel, KernelState, Program, ProgramBuilder,
};
use crate::host::HostArray;
use std::path::Path;

/// Handle to a buffer owned by a [`ComputeSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(usize);

/// One device, its queue, a program, a kernel and the buffers it uses.
///
/// Handles are released in dependency order, buffers first and the context
/// last, either through [`release`](Self::release) or on drop.
#[derive(Debug)]
pub struct ComputeSession {
    buffers: Vec<DeviceBuffer>,
    kernel: Option<Kernel>,
    queue: Option<CommandQueue>,
    program: Option<Program>,
    manager: Option<BufferManager>,
    context: Option<ComputeContext>,
    released: bool,
}

impl ComputeSession {
    /// Selects a device, opens a context on it and creates the queue.
    pub fn open(request: &DeviceRequest) -> Result<Self> {
        let selected = select_device(request)?;
        let mut context = ComputeContext::create(selected)?;
        let queue = context.create_queue()?;
        let manager = BufferManager::new(&context);

        Ok(Self {
            buffers: Vec::new(),
            kernel: None,
            queue: Some(queue),
            program: None,
            manager: Some(manager),
            context: Some(context),
            released: false,
        })
    }

    fn context(&self) -> Result<&ComputeContext> {
        self.context
            .as_ref()
            .ok_or_else(|| Error::context("session has been released"))
    }

    fn queue(&self) -> Result<&CommandQueue> {
        self.queue
            .as_ref()
            .ok_or_else(|| Error::queue("session has been released"))
    }

    fn manager(&self) -> Result<&BufferManager> {
        self.manager
            .as_ref()
            .ok_or_else(|| Error::allocation("session has been released"))
    }

    fn buffer(&self, id: BufferId) -> Result<&DeviceBuffer> {
        self.buffers
            .get(id.0)
            .ok_or_else(|| Error::transfer(format!("unknown buffer {}", id.0)))
    }

    pub fn device_class(&self) -> Option<DeviceClass> {
        self.context.as_ref().map(ComputeContext::class)
    }

    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.context.as_ref().map(ComputeContext::info)
    }

    /// Reads and compiles the kernel program at `path`.
    pub fn build_program<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let program = ProgramBuilder::build(self.context()?, path)?;
        self.program = Some(program);
        Ok(())
    }

    /// Compiles in-memory source as the session's program.
    pub fn build_program_source(&mut self, label: &str, source: String) -> Result<()> {
        let program = ProgramBuilder::build_source(self.context()?, label, source)?;
        self.program = Some(program);
        Ok(())
    }

    pub fn create_kernel(&mut self, entry_point: &str) -> Result<()> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| Error::kernel(entry_point, "no program has been built"))?;
        let kernel = program.create_kernel(self.context()?, entry_point)?;
        self.kernel = Some(kernel);
        Ok(())
    }

    pub fn kernel_state(&self) -> Option<KernelState> {
        self.kernel.as_ref().map(Kernel::state)
    }

    pub fn allocate(&mut self, element_count: usize) -> Result<BufferId> {
        let label = format!("buffer-{}", self.buffers.len());
        let buffer = self.manager()?.allocate_labeled(element_count, &label)?;
        self.buffers.push(buffer);
        Ok(BufferId(self.buffers.len() - 1))
    }

    pub fn element_count(&self, id: BufferId) -> Result<usize> {
        Ok(self.buffer(id)?.element_count())
    }

    pub fn upload(&self, id: BufferId, host: &HostArray) -> Result<()> {
        self.manager()?.upload(self.queue()?, self.buffer(id)?, host)
    }

    pub fn download(&self, id: BufferId, host: &mut HostArray) -> Result<()> {
        self.manager()?.download(self.queue()?, self.buffer(id)?, host)
    }

    pub fn bind_scalar<T: bytemuck::Pod>(&mut self, index: usize, value: T) -> Result<()> {
        self.kernel
            .as_mut()
            .ok_or_else(|| Error::bind(index, "no kernel has been created"))?
            .bind_scalar(index, value)
    }

    pub fn bind_buffer(&mut self, index: usize, id: BufferId) -> Result<()> {
        let buffer = self
            .buffers
            .get(id.0)
            .ok_or_else(|| Error::bind(index, format!("unknown buffer {}", id.0)))?;
        self.kernel
            .as_mut()
            .ok_or_else(|| Error::bind(index, "no kernel has been created"))?
            .bind_buffer(index, buffer)
    }

    pub fn enqueue(&mut self, global_work_size: u32) -> Result<Event> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| Error::dispatch("session has been released"))?;
        let kernel = self
            .kernel
            .as_mut()
            .ok_or_else(|| Error::dispatch("no kernel has been created"))?;
        queue.enqueue(kernel, global_work_size)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Releases buffers, kernel, queue, program and context, in that order.
    ///
    /// Never fails or blocks: work still in flight is abandoned, problems are
    /// logged and the remaining steps still run. Calling it again is a no-op.
    pub fn release(&mut self) {
        if self.released {
            tracing::debug!("session already released");
            return;
        }
        self.released = true;

        for buffer in self.buffers.drain(..) {
            buffer.destroy();
            tracing::debug!("released {}", buffer.label());
        }
        self.manager = None;

        if self.kernel.take().is_some() {
            tracing::debug!("released kernel");
        }

        if self.queue.take().is_some() {
            tracing::debug!("released command queue");
        }

        if let Some(program) = self.program.take() {
            tracing::debug!("released program {}", program.label());
        }

        if let Some(context) = self.context.take() {
            context.release();
        }
    }

    #[cfg(test)]
    fn empty() -> Self {
        Self {
            buffers: Vec::new(),
            kernel: None,
            queue: None,
            program: None,
            manager: None,
            context: None,
            released: false,
        }
    }
}

impl Drop for ComputeSession {
    fn drop(&mut self) {
        self.release();
    }
}
