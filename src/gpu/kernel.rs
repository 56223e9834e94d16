//! Kernel argument binding and dispatch.

use super::buffer::DeviceBuffer;
use super::context::{with_error_scopes, CommandQueue, ComputeContext};
use super::program::CompiledSource;
use crate::error::{Error, Result};
use wgpu::util::DeviceExt;

/// Uniform buffers are padded to this many bytes.
const UNIFORM_ALIGNMENT: usize = 16;

/// What a declared parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A `var<uniform>` value of `size` bytes.
    Scalar { size: u32 },
    /// A `var<storage>` runtime-sized array.
    Buffer { element_size: u32, read_only: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub index: usize,
    pub name: Option<String>,
    pub kind: SlotKind,
}

/// Parameter list and workgroup shape of one compute entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSignature {
    entry_point: String,
    slots: Vec<ParamSlot>,
    workgroup_size: u32,
}

impl KernelSignature {
    /// Reflects the group 0 bindings `entry_point` uses as positional
    /// parameters.
    ///
    /// Bindings only other entry points touch are not part of the signature.
    /// Binding numbers must run contiguously from zero; binding `i` is
    /// argument index `i`.
    pub fn reflect(compiled: &CompiledSource, entry_point: &str) -> Result<Self> {
        let module = &compiled.module;
        let (entry_index, entry) = module
            .entry_points
            .iter()
            .enumerate()
            .find(|(_, ep)| ep.name == entry_point)
            .ok_or_else(|| Error::kernel(entry_point, "no such entry point in the program"))?;
        let usage = compiled.info.get_entry_point(entry_index);

        if entry.stage != naga::ShaderStage::Compute {
            return Err(Error::kernel(
                entry_point,
                format!("{:?} entry points cannot be dispatched", entry.stage),
            ));
        }

        let [x, y, z] = entry.workgroup_size;
        if y != 1 || z != 1 {
            return Err(Error::kernel(
                entry_point,
                format!("workgroup size ({x}, {y}, {z}) is not one-dimensional"),
            ));
        }

        let mut bound = Vec::new();
        for (handle, var) in module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            if usage[handle].is_empty() {
                continue;
            }
            if binding.group != 0 {
                return Err(Error::kernel(
                    entry_point,
                    format!("bind group {} is not supported", binding.group),
                ));
            }

            let inner = &module.types[var.ty].inner;
            let kind = match (var.space, inner) {
                (naga::AddressSpace::Uniform, naga::TypeInner::Scalar(_)) => SlotKind::Scalar {
                    size: inner.size(module.to_ctx()),
                },
                (naga::AddressSpace::Storage { access }, naga::TypeInner::Array { stride, .. }) => {
                    SlotKind::Buffer {
                        element_size: *stride,
                        read_only: !access.contains(naga::StorageAccess::STORE),
                    }
                }
                _ => {
                    return Err(Error::kernel(
                        entry_point,
                        format!(
                            "binding {} has an unsupported type",
                            binding.binding
                        ),
                    ))
                }
            };

            bound.push((binding.binding, var.name.clone(), kind));
        }

        bound.sort_by_key(|(binding, _, _)| *binding);

        let slots = bound
            .into_iter()
            .enumerate()
            .map(|(index, (binding, name, kind))| {
                if binding as usize != index {
                    return Err(Error::kernel(
                        entry_point,
                        format!("binding {binding} leaves a gap in the parameter list"),
                    ));
                }
                Ok(ParamSlot { index, name, kind })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            entry_point: entry_point.to_string(),
            slots,
            workgroup_size: x,
        })
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&ParamSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    fn layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.slots
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.index as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: match slot.kind {
                        SlotKind::Scalar { .. } => wgpu::BufferBindingType::Uniform,
                        SlotKind::Buffer { read_only, .. } => {
                            wgpu::BufferBindingType::Storage { read_only }
                        }
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect()
    }
}

/// Binding progress of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Created,
    PartiallyBound,
    FullyBound,
    Enqueued,
}

/// Tracks which declared parameters have been bound and checks new bindings
/// against the signature.
#[derive(Debug, Clone)]
pub struct ArgumentTable {
    signature: KernelSignature,
    bound: Vec<bool>,
    enqueued: bool,
}

impl ArgumentTable {
    pub fn new(signature: KernelSignature) -> Self {
        let bound = vec![false; signature.len()];
        Self {
            signature,
            bound,
            enqueued: false,
        }
    }

    pub fn signature(&self) -> &KernelSignature {
        &self.signature
    }

    fn slot(&self, index: usize) -> Result<&ParamSlot> {
        self.signature.slot(index).ok_or_else(|| {
            Error::bind(
                index,
                format!(
                    "`{}` declares {} parameters",
                    self.signature.entry_point,
                    self.signature.len()
                ),
            )
        })
    }

    pub fn check_scalar(&self, index: usize, size: usize) -> Result<()> {
        match self.slot(index)?.kind {
            SlotKind::Scalar { size: expected } if expected as usize == size => Ok(()),
            SlotKind::Scalar { size: expected } => Err(Error::bind(
                index,
                format!("scalar is {size} bytes, parameter expects {expected}"),
            )),
            SlotKind::Buffer { .. } => Err(Error::bind(index, "parameter expects a buffer")),
        }
    }

    pub fn check_buffer(&self, index: usize, element_size: usize) -> Result<()> {
        match self.slot(index)?.kind {
            SlotKind::Buffer {
                element_size: expected,
                ..
            } if expected as usize == element_size => Ok(()),
            SlotKind::Buffer {
                element_size: expected,
                ..
            } => Err(Error::bind(
                index,
                format!("buffer elements are {element_size} bytes, parameter expects {expected}"),
            )),
            SlotKind::Scalar { .. } => Err(Error::bind(index, "parameter expects a scalar")),
        }
    }

    /// Records a binding that passed its check. Rebinding overwrites.
    pub fn mark_bound(&mut self, index: usize) {
        self.bound[index] = true;
        self.enqueued = false;
    }

    pub fn mark_enqueued(&mut self) {
        self.enqueued = true;
    }

    pub fn unbound(&self) -> Vec<usize> {
        self.bound
            .iter()
            .enumerate()
            .filter(|(_, bound)| !**bound)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn state(&self) -> KernelState {
        let bound = self.bound.iter().filter(|b| **b).count();
        if self.enqueued {
            KernelState::Enqueued
        } else if bound == self.bound.len() && bound > 0 {
            KernelState::FullyBound
        } else if bound > 0 {
            KernelState::PartiallyBound
        } else {
            KernelState::Created
        }
    }

    /// Fails with [`Error::Dispatch`] listing every unbound index.
    pub fn ensure_complete(&self) -> Result<()> {
        let unbound = self.unbound();
        if unbound.is_empty() {
            Ok(())
        } else {
            Err(Error::dispatch(format!(
                "`{}` has unbound arguments at indices {unbound:?}",
                self.signature.entry_point
            )))
        }
    }
}

/// Workgroup grid covering a 1-D index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkGeometry {
    pub x: u32,
    pub y: u32,
}

impl WorkGeometry {
    /// Folds `ceil(items / workgroup_size)` groups into a 2-D grid when they
    /// exceed `max_per_dimension`.
    pub fn for_items(items: u32, workgroup_size: u32, max_per_dimension: u32) -> Result<Self> {
        if items == 0 {
            return Err(Error::dispatch("global work size must be > 0"));
        }

        let groups = items.div_ceil(workgroup_size.max(1));
        if groups <= max_per_dimension {
            return Ok(Self { x: groups, y: 1 });
        }

        let y = groups.div_ceil(max_per_dimension);
        if y > max_per_dimension {
            return Err(Error::dispatch(format!(
                "{items} work items need more than {max_per_dimension}x{max_per_dimension} workgroups"
            )));
        }

        Ok(Self {
            x: max_per_dimension,
            y,
        })
    }

    pub fn groups(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y)
    }
}

/// One-shot completion token for an enqueued dispatch.
#[derive(Debug)]
#[must_use = "an event must be waited on to observe completion"]
pub struct Event {
    index: wgpu::SubmissionIndex,
    device: wgpu::Device,
}

impl Event {
    /// Blocks until the dispatch has executed. There is no timeout.
    pub fn wait(self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::WaitForSubmissionIndex(self.index))
            .map(|_| ())
            .map_err(|e| Error::dispatch(format!("waiting for completion failed: {e}")))
    }
}

/// A compute entry point with its positional argument bindings.
#[derive(Debug)]
pub struct Kernel {
    args: ArgumentTable,
    resources: Vec<Option<wgpu::Buffer>>,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    device: wgpu::Device,
    max_groups_per_dimension: u32,
}

impl Kernel {
    pub(crate) fn new(
        context: &ComputeContext,
        shader: &wgpu::ShaderModule,
        entry_point: &str,
        signature: KernelSignature,
    ) -> Result<Self> {
        let device = context.device();

        let (layout, pipeline) = with_error_scopes(device, || {
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(entry_point),
                entries: &signature.layout_entries(),
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(entry_point),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

            (layout, pipeline)
        })
        .map_err(|e| Error::kernel(entry_point, e.to_string()))?;

        tracing::debug!(
            "created kernel `{entry_point}` with {} parameters, workgroup size {}",
            signature.len(),
            signature.workgroup_size()
        );

        Ok(Self {
            resources: vec![None; signature.len()],
            args: ArgumentTable::new(signature),
            pipeline,
            layout,
            device: device.clone(),
            max_groups_per_dimension: context.limits().max_compute_workgroups_per_dimension,
        })
    }

    pub fn signature(&self) -> &KernelSignature {
        self.args.signature()
    }

    pub fn state(&self) -> KernelState {
        self.args.state()
    }

    /// Binds a plain value to a scalar parameter.
    pub fn bind_scalar<T: bytemuck::Pod>(&mut self, index: usize, value: T) -> Result<()> {
        let bytes = bytemuck::bytes_of(&value);
        self.args.check_scalar(index, bytes.len())?;

        let mut contents = bytes.to_vec();
        contents.resize(bytes.len().next_multiple_of(UNIFORM_ALIGNMENT), 0);

        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("offload-scalar-arg"),
                contents: &contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        self.resources[index] = Some(buffer);
        self.args.mark_bound(index);
        tracing::trace!("bound scalar argument {index}");
        Ok(())
    }

    pub fn bind_buffer(&mut self, index: usize, buffer: &DeviceBuffer) -> Result<()> {
        self.args.check_buffer(index, buffer.element_size())?;

        self.resources[index] = Some(buffer.raw().clone());
        self.args.mark_bound(index);
        tracing::trace!("bound buffer {} to argument {index}", buffer.label());
        Ok(())
    }

    pub(crate) fn dispatch(&mut self, queue: &CommandQueue, global_work_size: u32) -> Result<Event> {
        let geometry = WorkGeometry::for_items(
            global_work_size,
            self.signature().workgroup_size(),
            self.max_groups_per_dimension,
        )?;
        self.args.ensure_complete()?;

        let entries: Vec<wgpu::BindGroupEntry> = self
            .resources
            .iter()
            .enumerate()
            .filter_map(|(binding, resource)| {
                resource.as_ref().map(|buffer| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                })
            })
            .collect();

        let entry_point = self.signature().entry_point();
        let index = with_error_scopes(&self.device, || {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(entry_point),
                layout: &self.layout,
                entries: &entries,
            });

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("offload-dispatch"),
                });

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(entry_point),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(geometry.x, geometry.y, 1);
            }

            queue.submit(Some(encoder.finish()))
        })
        .map_err(|e| Error::dispatch(e.to_string()))?;

        tracing::debug!(
            "enqueued `{entry_point}` over {global_work_size} items ({}x{} workgroups)",
            geometry.x,
            geometry.y
        );

        self.args.mark_enqueued();

        Ok(Event {
            index,
            device: self.device.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_add_signature() -> KernelSignature {
        let source = include_str!("../../kernels/vector_ops.wgsl");
        let compiled = crate::gpu::program::compile_source(source, "vector_ops.wgsl").unwrap();
        KernelSignature::reflect(&compiled, "vector_add").unwrap()
    }

    fn module(source: &str) -> CompiledSource {
        crate::gpu::program::compile_source(source, "test.wgsl").unwrap()
    }

    #[test]
    fn test_bind_index_out_of_range() {
        let table = ArgumentTable::new(vector_add_signature());

        let err = table.check_scalar(4, 4).unwrap_err();
        assert!(matches!(err, Error::ArgumentBind { index: 4, .. }));

        let err = table.check_buffer(9, 4).unwrap_err();
        assert!(matches!(err, Error::ArgumentBind { index: 9, .. }));
    }

    #[test]
    fn test_bind_size_and_kind_checked() {
        let table = ArgumentTable::new(vector_add_signature());

        assert!(table.check_scalar(0, 4).is_ok());
        assert!(matches!(
            table.check_scalar(0, 8),
            Err(Error::ArgumentBind { index: 0, .. })
        ));
        assert!(matches!(
            table.check_buffer(0, 4),
            Err(Error::ArgumentBind { index: 0, .. })
        ));

        assert!(table.check_buffer(1, 4).is_ok());
        assert!(matches!(
            table.check_buffer(1, 8),
            Err(Error::ArgumentBind { index: 1, .. })
        ));
        assert!(matches!(
            table.check_scalar(3, 4),
            Err(Error::ArgumentBind { index: 3, .. })
        ));
    }

    #[test]
    fn test_state_transitions() {
        let mut table = ArgumentTable::new(vector_add_signature());
        assert_eq!(table.state(), KernelState::Created);

        table.mark_bound(0);
        assert_eq!(table.state(), KernelState::PartiallyBound);

        for index in 1..4 {
            table.mark_bound(index);
        }
        assert_eq!(table.state(), KernelState::FullyBound);

        table.mark_enqueued();
        assert_eq!(table.state(), KernelState::Enqueued);

        // Rebinding after a dispatch is allowed and overwrites.
        table.mark_bound(2);
        assert_eq!(table.state(), KernelState::FullyBound);
    }

    #[test]
    fn test_unbound_indices_block_dispatch() {
        let mut table = ArgumentTable::new(vector_add_signature());
        table.mark_bound(0);
        table.mark_bound(2);

        assert_eq!(table.unbound(), vec![1, 3]);
        let err = table.ensure_complete().unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
        assert!(err.to_string().contains("[1, 3]"));
    }

    #[test]
    fn test_geometry_one_dimensional() {
        let geometry = WorkGeometry::for_items(3, 64, 65_535).unwrap();
        assert_eq!(geometry, WorkGeometry { x: 1, y: 1 });

        let geometry = WorkGeometry::for_items(129, 64, 65_535).unwrap();
        assert_eq!(geometry, WorkGeometry { x: 3, y: 1 });
    }

    #[test]
    fn test_geometry_folds_into_two_dimensions() {
        let items = 100_000_000;
        let geometry = WorkGeometry::for_items(items, 64, 65_535).unwrap();

        assert_eq!(geometry.x, 65_535);
        assert_eq!(geometry.y, 24);
        assert!(geometry.groups() * 64 >= u64::from(items));
    }

    #[test]
    fn test_geometry_rejects_empty_and_oversized() {
        assert!(matches!(
            WorkGeometry::for_items(0, 64, 65_535),
            Err(Error::Dispatch(_))
        ));
        assert!(matches!(
            WorkGeometry::for_items(u32::MAX, 1, 16),
            Err(Error::Dispatch(_))
        ));
    }

    #[test]
    fn test_missing_entry_point() {
        let module = module(include_str!("../../kernels/vector_ops.wgsl"));
        let err = KernelSignature::reflect(&module, "vector_mul").unwrap_err();
        assert!(matches!(err, Error::KernelCreation { .. }));
    }

    #[test]
    fn test_non_compute_entry_point_rejected() {
        let module = module(
            "@vertex fn vs() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }",
        );
        let err = KernelSignature::reflect(&module, "vs").unwrap_err();
        assert!(matches!(err, Error::KernelCreation { .. }));
    }

    #[test]
    fn test_binding_gap_rejected() {
        let module = module(
            "@group(0) @binding(0) var<uniform> n: u32;\n\
             @group(0) @binding(2) var<storage, read_write> out: array<i32>;\n\
             @compute @workgroup_size(64) fn main(@builtin(global_invocation_id) gid: vec3<u32>) {\n\
                 if (gid.x < n) { out[gid.x] = 1; }\n\
             }",
        );
        let err = KernelSignature::reflect(&module, "main").unwrap_err();
        assert!(matches!(err, Error::KernelCreation { .. }));
    }

    #[test]
    fn test_signature_covers_only_bindings_the_entry_point_uses() {
        let module = module(
            "@group(0) @binding(0) var<uniform> n: u32;\n\
             @group(0) @binding(1) var<storage, read> v1: array<i32>;\n\
             @group(0) @binding(2) var<storage, read> v2: array<i32>;\n\
             @group(0) @binding(3) var<storage, read_write> v_out: array<i32>;\n\
             @group(0) @binding(4) var<uniform> factor: i32;\n\
             @group(1) @binding(0) var<storage, read_write> scratch: array<i32>;\n\
             @compute @workgroup_size(64) fn vector_add(@builtin(global_invocation_id) gid: vec3<u32>) {\n\
                 if (gid.x < n) { v_out[gid.x] = v1[gid.x] + v2[gid.x]; }\n\
             }\n\
             @compute @workgroup_size(64) fn vector_scale(@builtin(global_invocation_id) gid: vec3<u32>) {\n\
                 if (gid.x < n) { v_out[gid.x] = v1[gid.x] * factor; scratch[gid.x] = factor; }\n\
             }",
        );

        let signature = KernelSignature::reflect(&module, "vector_add").unwrap();
        assert_eq!(signature.len(), 4);

        let mut table = ArgumentTable::new(signature);
        assert!(matches!(
            table.check_scalar(4, 4),
            Err(Error::ArgumentBind { index: 4, .. })
        ));

        for index in 0..4 {
            table.mark_bound(index);
        }
        assert!(table.ensure_complete().is_ok());
        assert_eq!(table.state(), KernelState::FullyBound);

        // The sibling really does use the second bind group.
        let err = KernelSignature::reflect(&module, "vector_scale").unwrap_err();
        assert!(matches!(err, Error::KernelCreation { .. }));
    }

    #[test]
    fn test_two_dimensional_workgroup_rejected() {
        let module = module("@compute @workgroup_size(8, 8) fn main() {}");
        let err = KernelSignature::reflect(&module, "main").unwrap_err();
        assert!(matches!(err, Error::KernelCreation { .. }));
    }
}
