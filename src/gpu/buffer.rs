//! Device buffer allocation and host transfers.

use super::context::{with_error_scopes, CommandQueue, ComputeContext};
use crate::error::{Error, Result};
use crate::host::{Element, HostArray};

const ELEMENT_SIZE: usize = std::mem::size_of::<Element>();

/// Device-resident array with a fixed element count.
#[derive(Debug)]
pub struct DeviceBuffer {
    buffer: wgpu::Buffer,
    element_count: usize,
    label: String,
}

impl DeviceBuffer {
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn element_size(&self) -> usize {
        ELEMENT_SIZE
    }

    pub fn byte_size(&self) -> u64 {
        self.buffer.size()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Frees the device memory now instead of when the last handle drops.
    pub(crate) fn destroy(&self) {
        self.buffer.destroy();
    }

    fn check_len(&self, host: &HostArray) -> Result<()> {
        if host.len() != self.element_count {
            return Err(Error::transfer(format!(
                "{} holds {} elements, host array has {}",
                self.label,
                self.element_count,
                host.len()
            )));
        }
        Ok(())
    }
}

/// Checks an allocation of `element_count` elements against device limits
/// and returns its size in bytes.
pub fn allocation_size(element_count: usize, limits: &wgpu::Limits) -> Result<u64> {
    if element_count == 0 {
        return Err(Error::allocation("cannot allocate an empty buffer"));
    }

    let bytes = (element_count as u64)
        .checked_mul(ELEMENT_SIZE as u64)
        .ok_or_else(|| Error::allocation(format!("{element_count} elements overflow")))?;

    if bytes > limits.max_buffer_size {
        return Err(Error::allocation(format!(
            "{bytes} bytes exceeds the device's buffer size limit of {}",
            limits.max_buffer_size
        )));
    }
    if bytes > u64::from(limits.max_storage_buffer_binding_size) {
        return Err(Error::allocation(format!(
            "{bytes} bytes exceeds the device's storage binding limit of {}",
            limits.max_storage_buffer_binding_size
        )));
    }

    Ok(bytes)
}

/// Allocates device buffers and copies data between them and host arrays.
#[derive(Debug)]
pub struct BufferManager {
    device: wgpu::Device,
    limits: wgpu::Limits,
}

impl BufferManager {
    pub fn new(context: &ComputeContext) -> Self {
        Self {
            device: context.device().clone(),
            limits: context.limits().clone(),
        }
    }

    /// Creates an uninitialized read-write buffer for `element_count` elements.
    pub fn allocate(&self, element_count: usize) -> Result<DeviceBuffer> {
        self.allocate_labeled(element_count, "offload-buffer")
    }

    pub fn allocate_labeled(&self, element_count: usize, label: &str) -> Result<DeviceBuffer> {
        let size = allocation_size(element_count, &self.limits)?;

        let buffer = with_error_scopes(&self.device, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })
        .map_err(|e| Error::allocation(e.to_string()))?;

        tracing::debug!("allocated {label}: {element_count} elements ({size} bytes)");

        Ok(DeviceBuffer {
            buffer,
            element_count,
            label: label.to_string(),
        })
    }

    /// Copies `host` into `buffer` and blocks until the copy has executed.
    ///
    /// The buffer is untouched when the lengths differ.
    pub fn upload(&self, queue: &CommandQueue, buffer: &DeviceBuffer, host: &HostArray) -> Result<()> {
        buffer.check_len(host)?;

        let index = with_error_scopes(&self.device, || {
            queue.queue().write_buffer(&buffer.buffer, 0, host.as_bytes());
            queue.submit(std::iter::empty())
        })
        .map_err(|e| Error::transfer(e.to_string()))?;

        queue
            .block_on(index)
            .map_err(|e| Error::transfer(format!("upload to {} did not complete: {e}", buffer.label)))?;

        tracing::trace!("uploaded {} bytes to {}", host.byte_len(), buffer.label);
        Ok(())
    }

    /// Copies `buffer` into `host` through a mappable staging buffer.
    ///
    /// The host array is untouched when the lengths differ or the copy fails.
    pub fn download(
        &self,
        queue: &CommandQueue,
        buffer: &DeviceBuffer,
        host: &mut HostArray,
    ) -> Result<()> {
        buffer.check_len(host)?;
        let size = buffer.byte_size();

        let staging = with_error_scopes(&self.device, || {
            let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("offload-staging"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("offload-readback"),
                });
            encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, size);
            queue.submit(Some(encoder.finish()));

            staging
        })
        .map_err(|e| Error::transfer(e.to_string()))?;

        let slice = staging.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        queue
            .finish()
            .map_err(|e| Error::transfer(format!("download from {} did not complete: {e}", buffer.label)))?;

        rx.recv()
            .map_err(|_| Error::transfer("mapping callback was dropped"))?
            .map_err(|e| Error::transfer(format!("couldn't map staging buffer: {e}")))?;

        {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice_mut::<Element, u8>(host.as_mut_slice()).copy_from_slice(&data);
        }
        staging.unmap();
        staging.destroy();

        tracing::trace!("downloaded {size} bytes from {}", buffer.label);
        Ok(())
    }
}
