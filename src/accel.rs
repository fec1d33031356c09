//! Ray-tracing acceleration structures.
//!
//! Bottom-level structures are built per drawable and compacted when the
//! reported compacted size is smaller than the build-time allocation. The
//! top-level structure is rebuilt from instance records on demand.

use byteorder::{ByteOrder, LittleEndian};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::containers::Handle;
use crate::context::GraphicsContext;
use crate::drawable::Drawable;
use crate::interface::BlendMode;
use crate::rhi;

/// Geometry input a mesh exposes for bottom-level builds.
pub struct BlasGeometryDesc {
    pub vertex_buffer: Rc<Buffer>,
    pub vertex_offset: u64,
    pub vertex_stride: u64,
    pub vertex_format: rhi::ResourceFormat,
    pub num_vertices: u32,
    pub index_buffer: Rc<Buffer>,
    pub index_offset: u64,
    pub num_indices: u32,
    /// Refit an existing structure instead of rebuilding it.
    pub is_update: bool,
}

pub struct AccelerationStructureDesc {
    pub drawables: Vec<Rc<Drawable>>,
}

const SCRATCH_ALIGNMENT_SLACK: u64 = 256;

fn geometry_build_input<'a>(geometry: &'a BlasGeometryDesc) -> rhi::AccelGeometryBuildInput<'a> {
    rhi::AccelGeometryBuildInput {
        flags: rhi::AccelBuildFlag::FAST_TRACE | rhi::AccelBuildFlag::ALLOW_COMPACTION,
        is_update: geometry.is_update,
        geometries: vec![rhi::AccelTriangleGeometry {
            vertex_buffer: geometry.vertex_buffer.rhi_buffer(),
            vertex_offset: geometry.vertex_offset,
            vertex_stride: geometry.vertex_stride,
            vertex_format: geometry.vertex_format,
            num_vertices: geometry.num_vertices,
            index_buffer: geometry.index_buffer.rhi_buffer(),
            index_offset: geometry.index_offset,
            num_indices: geometry.num_indices,
        }],
    }
}

//--------------------------------------------------------------------------------------------------

/// One drawable's bottom-level structure and its backing buffer.
pub struct GeometryAccelerationStructure {
    ctx: Rc<GraphicsContext>,
    blas: Option<Box<dyn rhi::AccelerationStructure>>,
    blas_buffer: Option<Buffer>,
}

impl GeometryAccelerationStructure {
    fn new(ctx: &Rc<GraphicsContext>) -> GeometryAccelerationStructure {
        GeometryAccelerationStructure {
            ctx: ctx.clone(),
            blas: None,
            blas_buffer: None,
        }
    }

    pub fn rhi_blas(&self) -> &dyn rhi::AccelerationStructure {
        &**self.blas.as_ref().expect("blas was not built")
    }

    pub fn gpu_reference(&self) -> u64 {
        self.rhi_blas().gpu_reference()
    }

    pub fn buffer_size(&self) -> u64 {
        self.blas_buffer
            .as_ref()
            .map(|buffer| buffer.desc().size)
            .unwrap_or(0)
    }

    fn create_buffer(&mut self, size: u64) {
        let buffer = Buffer::new(
            &self.ctx,
            rhi::BufferDesc {
                size,
                usages: rhi::BufferUsage::ACCEL_STORAGE,
                memory_property: rhi::BufferMemoryProperty::GpuOnly,
                persistently_mapped: false,
            },
            false,
        );
        self.blas = Some(self.ctx.device().create_acceleration_structure(
            &rhi::AccelStructureDesc {
                structure_type: rhi::AccelStructureType::BottomLevel,
                buffer: buffer.rhi_buffer(),
                buffer_offset: 0,
                buffer_range_size: size,
            },
        ));
        self.blas_buffer = Some(buffer);
    }

    /// Replaces the backing allocation with a compacted-size one and returns
    /// the previous structure, which stays valid as the compaction source.
    fn compact_buffer(&mut self, size: u64) -> Box<dyn rhi::AccelerationStructure> {
        let old_blas = self.blas.take().expect("blas was not built");
        self.create_buffer(size);
        old_blas
    }
}

impl Drop for GeometryAccelerationStructure {
    fn drop(&mut self) {
        if let Some(blas) = self.blas.take() {
            self.ctx.add_delayed_destroy(Box::new(move || drop(blas)));
        }
    }
}

//--------------------------------------------------------------------------------------------------

struct PendingBuild {
    drawable: Rc<Drawable>,
    geometry: BlasGeometryDesc,
    blas: Rc<RefCell<GeometryAccelerationStructure>>,
    scratch_offset: u64,
    emit_offset: Option<u64>,
}

/// A top-level acceleration structure over a set of drawables.
pub struct AccelerationStructure {
    ctx: Rc<GraphicsContext>,
    tlas: Option<Box<dyn rhi::AccelerationStructure>>,
    tlas_buffer: Option<Buffer>,
    cpu_descriptor: Cell<rhi::DescriptorHandle>,
}

impl AccelerationStructure {
    pub fn new(ctx: &Rc<GraphicsContext>, desc: &AccelerationStructureDesc) -> AccelerationStructure {
        let mut seen = HashSet::new();
        let mut drawables: Vec<Rc<Drawable>> = Vec::new();
        for drawable in &desc.drawables {
            if drawable.mesh.primitive_topology() == rhi::PrimitiveTopology::TriangleList
                && seen.insert(Rc::as_ptr(drawable) as usize)
            {
                drawables.push(drawable.clone());
            }
        }

        Self::build_bottom_levels(ctx, &drawables);

        let mut structure = AccelerationStructure {
            ctx: ctx.clone(),
            tlas: None,
            tlas_buffer: None,
            cpu_descriptor: Cell::new(rhi::DescriptorHandle::default()),
        };
        structure.build_top_level(&drawables);
        structure
    }

    fn build_bottom_levels(ctx: &Rc<GraphicsContext>, drawables: &[Rc<Drawable>]) {
        let mut pending: Vec<PendingBuild> = Vec::new();
        let mut scratch_size = 0u64;
        let mut emit_count = 0u64;

        for drawable in drawables {
            let existing = drawable.blas.borrow().clone();
            let geometry = match drawable.mesh.blas_geometry() {
                Some(geometry) => geometry,
                None => continue,
            };
            match existing {
                Some(_) if !geometry.is_update => continue,
                None if geometry.is_update => {
                    log::warn!(
                        target: "gfx",
                        "drawable requested an update build without a previous structure"
                    );
                    continue;
                }
                _ => {}
            }

            let size_info = ctx
                .device()
                .acceleration_structure_memory_size_of_geometry(&geometry_build_input(&geometry));
            let blas = match existing {
                Some(blas) => blas,
                None => Rc::new(RefCell::new(GeometryAccelerationStructure::new(ctx))),
            };
            let scratch_offset = scratch_size;
            let emit_offset = if geometry.is_update {
                scratch_size += size_info.update_scratch_size;
                None
            } else {
                scratch_size += size_info.build_scratch_size;
                blas.borrow_mut().create_buffer(size_info.structure_size);
                let offset = emit_count * 8;
                emit_count += 1;
                Some(offset)
            };
            pending.push(PendingBuild {
                drawable: drawable.clone(),
                geometry,
                blas,
                scratch_offset,
                emit_offset,
            });
        }

        if pending.is_empty() {
            return;
        }

        let scratch_buffer = Buffer::new(
            ctx,
            rhi::BufferDesc {
                size: scratch_size + SCRATCH_ALIGNMENT_SLACK,
                usages: rhi::BufferUsage::STORAGE_READ_WRITE,
                memory_property: rhi::BufferMemoryProperty::GpuOnly,
                persistently_mapped: false,
            },
            false,
        );
        let emit_buffer = Buffer::new(
            ctx,
            rhi::BufferDesc {
                size: (emit_count * 8).max(8),
                usages: rhi::BufferUsage::STORAGE_READ_WRITE,
                memory_property: rhi::BufferMemoryProperty::GpuOnly,
                persistently_mapped: false,
            },
            false,
        );
        let emit_download_buffer = Buffer::new(
            ctx,
            rhi::BufferDesc {
                size: (emit_count * 8).max(8),
                usages: rhi::BufferUsage::empty(),
                memory_property: rhi::BufferMemoryProperty::GpuToCpu,
                persistently_mapped: false,
            },
            false,
        );

        {
            let blas_borrows: Vec<_> = pending.iter().map(|build| build.blas.borrow()).collect();
            ctx.execute_immediately(|cmd| {
                let descs: Vec<rhi::AccelGeometryBuildDesc<'_>> = pending
                    .iter()
                    .zip(blas_borrows.iter())
                    .map(|(build, blas)| {
                        let dst = blas.rhi_blas();
                        rhi::AccelGeometryBuildDesc {
                            build_input: geometry_build_input(&build.geometry),
                            scratch_buffer: scratch_buffer.rhi_buffer(),
                            scratch_buffer_offset: build.scratch_offset,
                            src_structure: if build.geometry.is_update {
                                Some(dst)
                            } else {
                                None
                            },
                            dst_structure: dst,
                            emit_data: build
                                .emit_offset
                                .map(|offset| {
                                    vec![rhi::AccelBuildEmitData {
                                        data_type: rhi::AccelBuildEmitDataType::CompactedSize,
                                        dst_buffer: emit_buffer.rhi_buffer(),
                                        dst_buffer_offset: offset,
                                    }]
                                })
                                .unwrap_or_default(),
                        }
                    })
                    .collect();
                cmd.build_bottom_level_acceleration_structures(&descs);
                if emit_count > 0 {
                    cmd.resource_barriers(
                        &[rhi::BufferBarrier {
                            buffer: emit_buffer.rhi_buffer(),
                            src_access: rhi::ResourceAccess::ACCEL_EMIT_DATA_WRITE,
                            dst_access: rhi::ResourceAccess::TRANSFER_READ,
                        }],
                        &[],
                    );
                    cmd.copy_buffer_to_buffer(
                        emit_buffer.rhi_buffer(),
                        emit_download_buffer.rhi_buffer(),
                        rhi::BufferCopyDesc::default(),
                    );
                }
            });
        }

        if emit_count > 0 {
            let mut compacted_sizes = vec![0u8; (emit_count * 8) as usize];
            emit_download_buffer.get_data_raw(&mut compacted_sizes);
            for build in &pending {
                let offset = match build.emit_offset {
                    Some(offset) => offset as usize,
                    None => continue,
                };
                let compacted_size = LittleEndian::read_u64(&compacted_sizes[offset..offset + 8]);
                if compacted_size > 0 && compacted_size < build.blas.borrow().buffer_size() {
                    let old_blas = build.blas.borrow_mut().compact_buffer(compacted_size);
                    ctx.execute_immediately(|cmd| {
                        cmd.compact_acceleration_structure(
                            &*old_blas,
                            build.blas.borrow().rhi_blas(),
                        );
                    });
                    ctx.add_delayed_destroy(Box::new(move || drop(old_blas)));
                }
            }
        }

        for build in pending {
            *build.drawable.blas.borrow_mut() = Some(build.blas);
        }
    }

    fn build_top_level(&mut self, drawables: &[Rc<Drawable>]) {
        let mut instance_bytes = Vec::new();
        let mut num_instances = 0u32;
        for drawable in drawables {
            let blas = match &*drawable.blas.borrow() {
                Some(blas) => blas.clone(),
                None => continue,
            };
            let flags = if drawable.material.blend_mode() == BlendMode::Opaque {
                rhi::AccelInstanceFlag::FORCE_OPAQUE
            } else {
                rhi::AccelInstanceFlag::FORCE_NON_OPAQUE
            };
            let instance = rhi::AccelInstanceDesc {
                transform: drawable.transform.borrow().to_rows_3x4(),
                instance_id: drawable.handle().index(),
                mask: 0xff,
                sbt_offset: drawable.handle().index(),
                flags: flags.bits(),
                blas_reference: blas.borrow().gpu_reference(),
            };
            instance.encode(&mut instance_bytes);
            num_instances += 1;
        }

        let instance_buffer = Buffer::new(
            &self.ctx,
            rhi::BufferDesc {
                size: (instance_bytes.len() as u64).max(rhi::AccelInstanceDesc::SIZE),
                usages: rhi::BufferUsage::ACCEL_BUILD_INPUT,
                memory_property: rhi::BufferMemoryProperty::CpuToGpu,
                persistently_mapped: false,
            },
            false,
        );
        instance_buffer.set_data_raw(&instance_bytes, 0);

        let build_input = rhi::AccelInstanceBuildInput {
            flags: rhi::AccelBuildFlag::FAST_TRACE,
            is_update: false,
            num_instances,
            instances_buffer: instance_buffer.rhi_buffer(),
        };
        let size_info = self
            .ctx
            .device()
            .acceleration_structure_memory_size_of_instances(&build_input);

        let tlas_buffer = Buffer::new(
            &self.ctx,
            rhi::BufferDesc {
                size: size_info.structure_size,
                usages: rhi::BufferUsage::ACCEL_STORAGE,
                memory_property: rhi::BufferMemoryProperty::GpuOnly,
                persistently_mapped: false,
            },
            false,
        );
        let tlas = self
            .ctx
            .device()
            .create_acceleration_structure(&rhi::AccelStructureDesc {
                structure_type: rhi::AccelStructureType::TopLevel,
                buffer: tlas_buffer.rhi_buffer(),
                buffer_offset: 0,
                buffer_range_size: size_info.structure_size,
            });
        let scratch_buffer = Buffer::new(
            &self.ctx,
            rhi::BufferDesc {
                size: size_info.build_scratch_size + SCRATCH_ALIGNMENT_SLACK,
                usages: rhi::BufferUsage::STORAGE_READ_WRITE,
                memory_property: rhi::BufferMemoryProperty::GpuOnly,
                persistently_mapped: false,
            },
            false,
        );

        self.ctx.execute_immediately(|cmd| {
            cmd.build_top_level_acceleration_structure(&rhi::AccelInstanceBuildDesc {
                build_input: rhi::AccelInstanceBuildInput {
                    flags: rhi::AccelBuildFlag::FAST_TRACE,
                    is_update: false,
                    num_instances,
                    instances_buffer: instance_buffer.rhi_buffer(),
                },
                scratch_buffer: scratch_buffer.rhi_buffer(),
                scratch_buffer_offset: 0,
                dst_structure: &*tlas,
            });
        });

        self.tlas = Some(tlas);
        self.tlas_buffer = Some(tlas_buffer);
    }

    pub fn has_value(&self) -> bool {
        self.tlas.is_some()
    }

    pub fn rhi_tlas(&self) -> &dyn rhi::AccelerationStructure {
        &**self.tlas.as_ref().expect("tlas was not built")
    }

    pub fn get_descriptor(&self) -> rhi::DescriptorHandle {
        let mut handle = self.cpu_descriptor.get();
        if handle.cpu == 0 {
            handle = self
                .ctx
                .allocate_cpu_descriptor(rhi::DescriptorType::AccelerationStructure);
            self.ctx
                .device()
                .create_acceleration_structure_descriptor(self.rhi_tlas(), handle);
            self.cpu_descriptor.set(handle);
        }
        handle
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        let descriptor = self.cpu_descriptor.get();
        if descriptor.cpu != 0 {
            self.ctx
                .free_cpu_descriptor(rhi::DescriptorType::AccelerationStructure, descriptor);
        }
        if let Some(tlas) = self.tlas.take() {
            self.ctx.add_delayed_destroy(Box::new(move || drop(tlas)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{Material, Mesh};
    use crate::rhi::null::{Event, NullDevice, NULL_COMPACTED_SIZE};
    use crate::scene::GpuScene;
    use crate::shader::{ShaderParameter, ShaderParameterMetadataList};
    use std::cell::RefCell;

    struct TriangleMesh {
        vertex_buffer: Rc<Buffer>,
        index_buffer: Rc<Buffer>,
        metadata: ShaderParameterMetadataList,
    }

    impl TriangleMesh {
        fn new(ctx: &Rc<GraphicsContext>) -> TriangleMesh {
            let make = |usage| {
                Rc::new(Buffer::new(
                    ctx,
                    rhi::BufferDesc {
                        size: 1024,
                        usages: usage,
                        ..Default::default()
                    },
                    false,
                ))
            };
            TriangleMesh {
                vertex_buffer: make(rhi::BufferUsage::VERTEX | rhi::BufferUsage::ACCEL_BUILD_INPUT),
                index_buffer: make(rhi::BufferUsage::INDEX | rhi::BufferUsage::ACCEL_BUILD_INPUT),
                metadata: ShaderParameterMetadataList::default(),
            }
        }
    }

    impl Mesh for TriangleMesh {
        fn mesh_type_name(&self) -> &str {
            "triangle"
        }
        fn vertex_input_desc(
            &self,
            _attributes: rhi::VertexAttributesType,
        ) -> Vec<rhi::VertexInputBufferDesc> {
            Vec::new()
        }
        fn primitive_topology(&self) -> rhi::PrimitiveTopology {
            rhi::PrimitiveTopology::TriangleList
        }
        fn shader_params_metadata(&self) -> &ShaderParameterMetadataList {
            &self.metadata
        }
        fn fill_shader_params(&self, _ctx: &Rc<GraphicsContext>, _drawable: &Drawable) {}
        fn bind_buffers(&self, _encoder: &mut dyn rhi::GraphicsEncoder) {}
        fn num_indices(&self) -> u32 {
            3
        }
        fn source_path(&self, _stage: rhi::ShaderStage) -> &str {
            ""
        }
        fn source_entry(&self, _stage: rhi::ShaderStage) -> &str {
            ""
        }
        fn blas_geometry(&self) -> Option<BlasGeometryDesc> {
            Some(BlasGeometryDesc {
                vertex_buffer: self.vertex_buffer.clone(),
                vertex_offset: 0,
                vertex_stride: 12,
                vertex_format: rhi::ResourceFormat::Rgb10A2Unorm,
                num_vertices: 3,
                index_buffer: self.index_buffer.clone(),
                index_offset: 0,
                num_indices: 3,
                is_update: false,
            })
        }
    }

    struct OpaqueMaterial {
        params: RefCell<ShaderParameter>,
        metadata: ShaderParameterMetadataList,
    }

    impl Material for OpaqueMaterial {
        fn blend_mode(&self) -> BlendMode {
            BlendMode::Opaque
        }
        fn base_material(&self) -> Option<Rc<dyn Material>> {
            None
        }
        fn shader_params_metadata(&self) -> &ShaderParameterMetadataList {
            &self.metadata
        }
        fn shader_parameters(&self) -> &RefCell<ShaderParameter> {
            &self.params
        }
        fn shader_identifier(&self) -> String {
            "opaque".to_string()
        }
    }

    #[test]
    fn blas_is_built_compacted_and_reused() {
        let device = NullDevice::new();
        let log = device.event_log();
        let ctx = GraphicsContext::new(Rc::new(device), 2);

        let mesh = Rc::new(TriangleMesh::new(&ctx));
        let material = Rc::new(OpaqueMaterial {
            params: RefCell::new(ShaderParameter::new()),
            metadata: ShaderParameterMetadataList::default(),
        });
        let drawable = Rc::new(Drawable::new(mesh, material));
        let mut scene = GpuScene::new();
        scene.add_drawable(drawable.clone());

        log.borrow_mut().clear();
        let accel = AccelerationStructure::new(
            &ctx,
            &AccelerationStructureDesc {
                // the duplicate must be deduplicated
                drawables: vec![drawable.clone(), drawable.clone()],
            },
        );
        assert!(accel.has_value());

        {
            let events = log.borrow();
            assert!(events
                .iter()
                .any(|event| *event == Event::BuildBottomLevel { count: 1 }));
            // the null backend reports a compacted size smaller than the
            // build allocation, so a compaction pass must run
            assert!(events
                .iter()
                .any(|event| *event == Event::CompactAccelerationStructure));
            assert!(events
                .iter()
                .any(|event| *event == Event::BuildTopLevel { num_instances: 1 }));
        }
        assert_eq!(
            drawable.blas.borrow().as_ref().unwrap().borrow().buffer_size(),
            NULL_COMPACTED_SIZE
        );

        // a second build reuses the cached bottom-level structure
        log.borrow_mut().clear();
        let _accel = AccelerationStructure::new(
            &ctx,
            &AccelerationStructureDesc {
                drawables: vec![drawable.clone()],
            },
        );
        let events = log.borrow();
        assert!(!events
            .iter()
            .any(|event| match event {
                Event::BuildBottomLevel { .. } => true,
                _ => false,
            }));
        assert!(events
            .iter()
            .any(|event| *event == Event::BuildTopLevel { num_instances: 1 }));
    }
}
