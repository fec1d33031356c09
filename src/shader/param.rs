//! Shader parameter blocks.
//!
//! A parameter block is described by an ordered metadata list. From it we
//! derive the CPU-side packing, the GPU uniform buffer layout, the bind group
//! layout and the generated shader declaration. Value parameters live in the
//! uniform buffer; resource parameters occupy CPU slots holding the bound
//! resource reference.

use std::cell::Cell;
use std::rc::Rc;

use crate::accel::AccelerationStructure;
use crate::buffer::{as_bytes, Buffer, DataSetDesc};
use crate::context::GraphicsContext;
use crate::rhi;
use crate::sampler::Sampler;
use crate::texture::Texture;
use crate::utils::align_up;

/// Binding index shift applied per owning set when samplers are relocated to
/// a dedicated sampler heap set.
pub const SAMPLERS_BINDING_SHIFT: u32 = 32;

#[derive(Clone, Debug)]
pub struct ShaderParameterMetadata {
    pub type_name: String,
    pub var_name: String,
    pub array_sizes: Vec<u32>,
    pub descriptor_type: rhi::DescriptorType,
    pub format: rhi::ResourceFormat,
    pub texture_view_type: rhi::TextureViewType,
    pub cpu_size: u64,
    pub cpu_alignment: u64,
    pub gpu_size: u64,
    pub gpu_alignment: u64,
    pub structured_stride: u32,
}

impl ShaderParameterMetadata {
    pub fn element_count(&self) -> u32 {
        self.array_sizes.iter().product::<u32>().max(1)
    }

    fn array_suffix(&self) -> String {
        let mut suffix = String::new();
        for size in &self.array_sizes {
            suffix.push_str(&format!("[{}]", size));
        }
        suffix
    }

    /// A value stored in the uniform buffer.
    pub fn value(type_name: &str, var_name: &str, size: u64, alignment: u64) -> Self {
        ShaderParameterMetadata {
            type_name: type_name.to_string(),
            var_name: var_name.to_string(),
            array_sizes: Vec::new(),
            descriptor_type: rhi::DescriptorType::None,
            format: rhi::ResourceFormat::Undefined,
            texture_view_type: rhi::TextureViewType::Automatic,
            cpu_size: size,
            cpu_alignment: alignment,
            gpu_size: size,
            gpu_alignment: alignment,
            structured_stride: 0,
        }
    }

    fn resource(
        type_name: &str,
        var_name: &str,
        descriptor_type: rhi::DescriptorType,
    ) -> Self {
        ShaderParameterMetadata {
            type_name: type_name.to_string(),
            var_name: var_name.to_string(),
            array_sizes: Vec::new(),
            descriptor_type,
            format: rhi::ResourceFormat::Undefined,
            texture_view_type: rhi::TextureViewType::Automatic,
            cpu_size: RESOURCE_RECORD_SIZE,
            cpu_alignment: RESOURCE_RECORD_ALIGNMENT,
            gpu_size: 0,
            gpu_alignment: 0,
            structured_stride: 0,
        }
    }

    pub fn sampled_texture(type_name: &str, var_name: &str) -> Self {
        Self::resource(type_name, var_name, rhi::DescriptorType::SampledTexture)
    }

    pub fn storage_texture(type_name: &str, var_name: &str, format: rhi::ResourceFormat) -> Self {
        let mut metadata =
            Self::resource(type_name, var_name, rhi::DescriptorType::ReadWriteStorageTexture);
        metadata.format = format;
        metadata
    }

    pub fn uniform_buffer(type_name: &str, var_name: &str) -> Self {
        Self::resource(type_name, var_name, rhi::DescriptorType::UniformBuffer)
    }

    pub fn storage_buffer(type_name: &str, var_name: &str, stride: u32) -> Self {
        let mut metadata =
            Self::resource(type_name, var_name, rhi::DescriptorType::ReadOnlyStorageBuffer);
        metadata.structured_stride = stride;
        metadata
    }

    pub fn rw_storage_buffer(type_name: &str, var_name: &str, stride: u32) -> Self {
        let mut metadata =
            Self::resource(type_name, var_name, rhi::DescriptorType::ReadWriteStorageBuffer);
        metadata.structured_stride = stride;
        metadata
    }

    pub fn sampler(var_name: &str) -> Self {
        Self::resource("SamplerState", var_name, rhi::DescriptorType::Sampler)
    }

    pub fn acceleration_structure(var_name: &str) -> Self {
        Self::resource(
            "RaytracingAccelerationStructure",
            var_name,
            rhi::DescriptorType::AccelerationStructure,
        )
    }

    pub fn with_array(mut self, sizes: &[u32]) -> Self {
        self.array_sizes = sizes.to_vec();
        self
    }
}

/// CPU footprint of a resource reference record.
const RESOURCE_RECORD_SIZE: u64 = 16;
const RESOURCE_RECORD_ALIGNMENT: u64 = 8;

#[derive(Clone, Debug, Default)]
pub struct ShaderParameterMetadataList {
    pub params: Vec<ShaderParameterMetadata>,
}

impl ShaderParameterMetadataList {
    pub fn new(params: Vec<ShaderParameterMetadata>) -> Self {
        ShaderParameterMetadataList { params }
    }

    /// The bind group layout of this block: the uniform buffer at binding 0
    /// (omitted when no value parameters exist), then one entry per resource
    /// parameter at consecutive bindings advanced by array count.
    pub fn bind_group_layout(&self, set: u32, visibility: rhi::ShaderStage) -> rhi::BindGroupLayout {
        let mut layout = vec![rhi::BindGroupLayoutEntry {
            count: 1,
            descriptor_type: rhi::DescriptorType::UniformBuffer,
            visibility,
            binding_or_register: 0,
            space: set,
        }];
        let mut uniform_buffer_empty = true;
        let mut curr_binding = 1;

        for param in &self.params {
            let count = param.element_count();
            if param.descriptor_type == rhi::DescriptorType::None {
                uniform_buffer_empty = false;
            } else {
                layout.push(rhi::BindGroupLayoutEntry {
                    count,
                    descriptor_type: param.descriptor_type,
                    visibility,
                    binding_or_register: curr_binding,
                    space: set,
                });
                curr_binding += count;
            }
        }

        if uniform_buffer_empty {
            layout.remove(0);
        }
        layout
    }

    /// The generated HLSL declaration of this block: a `cbuffer` holding all
    /// value parameters, followed by one register declaration per resource.
    pub fn generated_shader_declaration(
        &self,
        set: u32,
        samplers_set: u32,
        separate_samplers: bool,
    ) -> String {
        let mut uniform_buffer = String::new();
        let mut other_bindings = String::new();
        let mut curr_binding = 1;

        for param in &self.params {
            let array = param.array_suffix();
            let count = param.element_count();

            match param.descriptor_type {
                rhi::DescriptorType::None => {
                    uniform_buffer
                        .push_str(&format!("{} {}{};\n", param.type_name, param.var_name, array));
                }
                rhi::DescriptorType::Sampler => {
                    let mut sampler_binding = curr_binding;
                    let mut sampler_set = set;
                    if separate_samplers {
                        sampler_binding += SAMPLERS_BINDING_SHIFT * set;
                        sampler_set = samplers_set;
                    }
                    other_bindings.push_str(&format!(
                        "[[vk::binding({}, {})]] SamplerState {}{} : register(s{}, space{});\n",
                        sampler_binding, sampler_set, param.var_name, array, sampler_binding,
                        sampler_set
                    ));
                    curr_binding += count;
                }
                rhi::DescriptorType::UniformBuffer => {
                    other_bindings.push_str(&format!(
                        "[[vk::binding({}, {})]] {} {}{} : register(b{}, space{});\n",
                        curr_binding, set, param.type_name, param.var_name, array, curr_binding,
                        set
                    ));
                    curr_binding += count;
                }
                rhi::DescriptorType::ReadOnlyStorageBuffer
                | rhi::DescriptorType::SampledTexture
                | rhi::DescriptorType::ReadOnlyStorageTexture
                | rhi::DescriptorType::AccelerationStructure => {
                    other_bindings.push_str(&format!(
                        "[[vk::binding({}, {})]] {} {}{} : register(t{}, space{});\n",
                        curr_binding, set, param.type_name, param.var_name, array, curr_binding,
                        set
                    ));
                    curr_binding += count;
                }
                rhi::DescriptorType::ReadWriteStorageBuffer => {
                    other_bindings.push_str(&format!(
                        "[[vk::binding({}, {})]] {} {}{} : register(u{}, space{});\n",
                        curr_binding, set, param.type_name, param.var_name, array, curr_binding,
                        set
                    ));
                    curr_binding += count;
                }
                rhi::DescriptorType::ReadWriteStorageTexture => {
                    other_bindings.push_str(&format!(
                        "[[vk::binding({}, {}), vk::image_format(\"{}\")]] {} {}{} : register(u{}, space{});\n",
                        curr_binding,
                        set,
                        param.format.storage_image_name(),
                        param.type_name,
                        param.var_name,
                        array,
                        curr_binding,
                        set
                    ));
                    curr_binding += count;
                }
            }
        }

        if uniform_buffer.is_empty() {
            other_bindings
        } else {
            format!(
                "[[vk::binding(0, {})]] cbuffer _cbuffer_{} : register(b0, space{}) {{\n{}}};\n{}",
                set, set, set, uniform_buffer, other_bindings
            )
        }
    }
}

//--------------------------------------------------------------------------------------------------

/// One maximal run of value parameters whose CPU to GPU offset delta is
/// constant, enabling a coalesced upload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct UniformRange {
    pub cpu_offset: u64,
    pub gpu_offset: u64,
    pub size: u64,
}

/// Per array element slot of the computed layout.
#[derive(Clone, Debug)]
pub struct ParamSlot {
    pub param_index: usize,
    pub cpu_offset: u64,
    /// Offset inside the uniform buffer; `None` for resource parameters.
    pub gpu_offset: Option<u64>,
    /// Index into the resource slot table; `None` for value parameters.
    pub resource_index: Option<usize>,
}

/// The resource bound to one resource parameter element.
#[derive(Clone)]
pub enum ResourceSlot {
    Empty,
    Buffer(BufferParam),
    Texture(TextureParam),
    RwTexture(RwTextureParam),
    Sampler(SamplerParam),
    AccelerationStructure(AccelParam),
}

#[derive(Clone)]
pub struct BufferParam {
    pub buffer: Rc<Buffer>,
    pub offset: u64,
    pub size: u64,
}

#[derive(Clone)]
pub struct TextureParam {
    pub texture: Rc<Texture>,
    pub base_level: u32,
    pub num_levels: u32,
    pub base_layer: u32,
    pub num_layers: u32,
}

impl TextureParam {
    pub fn whole(texture: Rc<Texture>) -> TextureParam {
        TextureParam {
            texture,
            base_level: 0,
            num_levels: 0,
            base_layer: 0,
            num_layers: 0,
        }
    }
}

#[derive(Clone)]
pub struct RwTextureParam {
    pub texture: Rc<Texture>,
    pub mip_level: u32,
    pub base_layer: u32,
    pub num_layers: u32,
}

#[derive(Clone)]
pub struct SamplerParam {
    pub sampler: Rc<Sampler>,
}

#[derive(Clone)]
pub struct AccelParam {
    pub accel: Rc<AccelerationStructure>,
}

//--------------------------------------------------------------------------------------------------

/// An allocated parameter block: CPU blob, resource slots and the optional
/// GPU uniform buffer with its upload ranges.
#[derive(Default)]
pub struct ShaderParameter {
    ctx: Option<Rc<GraphicsContext>>,
    metadata: ShaderParameterMetadataList,
    layout: Vec<ParamSlot>,
    data: Vec<u8>,
    resources: Vec<ResourceSlot>,
    uniform_buffer: Option<Buffer>,
    uniform_ranges: Vec<UniformRange>,
    dirty_count: Cell<u32>,
    last_update_frame: Cell<u64>,
    allocated: bool,
}

impl ShaderParameter {
    pub fn new() -> ShaderParameter {
        ShaderParameter::default()
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    pub fn initialize(
        &mut self,
        ctx: &Rc<GraphicsContext>,
        metadata: ShaderParameterMetadataList,
        use_gpu_only_memory: bool,
    ) {
        if self.allocated {
            return;
        }

        let mut gpu_size = 0u64;
        let mut gpu_alignment = 0u64;
        let mut cpu_size = 0u64;
        let mut cpu_alignment = 0u64;
        let mut temp_ranges: Vec<UniformRange> = Vec::new();
        let mut layout = Vec::new();
        let mut num_resources = 0usize;

        for (param_index, param) in metadata.params.iter().enumerate() {
            let count = param.element_count();
            if param.descriptor_type == rhi::DescriptorType::None {
                for _ in 0..count {
                    gpu_size = align_up(gpu_size, param.gpu_alignment);
                    cpu_size = align_up(cpu_size, param.cpu_alignment);
                    temp_ranges.push(UniformRange {
                        cpu_offset: cpu_size,
                        gpu_offset: gpu_size,
                        size: param.gpu_size,
                    });
                    layout.push(ParamSlot {
                        param_index,
                        cpu_offset: cpu_size,
                        gpu_offset: Some(gpu_size),
                        resource_index: None,
                    });
                    gpu_size += param.gpu_size;
                    cpu_size += param.cpu_size;
                }
                gpu_alignment = gpu_alignment.max(param.gpu_alignment);
            } else {
                for _ in 0..count {
                    cpu_size = align_up(cpu_size, param.cpu_alignment);
                    layout.push(ParamSlot {
                        param_index,
                        cpu_offset: cpu_size,
                        gpu_offset: None,
                        resource_index: Some(num_resources),
                    });
                    cpu_size += param.cpu_size;
                    num_resources += 1;
                }
            }
            cpu_alignment = cpu_alignment.max(param.cpu_alignment);
        }
        gpu_size = align_up(gpu_size, gpu_alignment);
        cpu_size = align_up(cpu_size, cpu_alignment);

        self.data = vec![0u8; cpu_size as usize];
        self.resources = vec![ResourceSlot::Empty; num_resources];
        self.layout = layout;

        if gpu_size > 0 {
            self.uniform_buffer = Some(Buffer::new(
                ctx,
                rhi::BufferDesc {
                    size: gpu_size,
                    usages: rhi::BufferUsage::UNIFORM,
                    memory_property: if use_gpu_only_memory {
                        rhi::BufferMemoryProperty::GpuOnly
                    } else {
                        rhi::BufferMemoryProperty::CpuToGpu
                    },
                    persistently_mapped: false,
                },
                true,
            ));
        }

        // coalesce runs with a constant cpu-gpu delta
        let mut i = 0;
        while i < temp_ranges.len() {
            let mut j = i + 1;
            while j < temp_ranges.len() {
                if temp_ranges[j].cpu_offset - temp_ranges[i].cpu_offset
                    != temp_ranges[j].gpu_offset - temp_ranges[i].gpu_offset
                {
                    break;
                }
                j += 1;
            }
            let size =
                temp_ranges[j - 1].cpu_offset + temp_ranges[j - 1].size - temp_ranges[i].cpu_offset;
            self.uniform_ranges.push(UniformRange {
                cpu_offset: temp_ranges[i].cpu_offset,
                gpu_offset: temp_ranges[i].gpu_offset,
                size,
            });
            i = j;
        }

        self.ctx = Some(ctx.clone());
        self.metadata = metadata;
        self.allocated = true;
    }

    pub fn reset(&mut self) {
        if self.allocated {
            self.data.clear();
            self.resources.clear();
            self.layout.clear();
            self.uniform_ranges.clear();
            self.uniform_buffer = None;
            self.allocated = false;
        }
    }

    pub fn metadata_list(&self) -> &ShaderParameterMetadataList {
        &self.metadata
    }

    pub fn layout(&self) -> &[ParamSlot] {
        &self.layout
    }

    pub fn uniform_ranges(&self) -> &[UniformRange] {
        &self.uniform_ranges
    }

    pub fn uniform_buffer(&self) -> Option<&Buffer> {
        self.uniform_buffer.as_ref()
    }

    pub fn dirty_count(&self) -> u32 {
        self.dirty_count.get()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn slot_of(&self, var_name: &str, element: usize) -> Option<&ParamSlot> {
        let mut remaining = element;
        for slot in &self.layout {
            if self.metadata.params[slot.param_index].var_name == var_name {
                if remaining == 0 {
                    return Some(slot);
                }
                remaining -= 1;
            }
        }
        None
    }

    fn mark_dirty(&mut self) {
        let frames_in_flight = self
            .ctx
            .as_ref()
            .map(|ctx| ctx.frames_in_flight())
            .unwrap_or(0);
        self.dirty_count.set(frames_in_flight);
        // sentinel: never equal to a real frame count, so the next update
        // always uploads
        self.last_update_frame.set(u64::max_value());
    }

    /// Writes a value parameter. Marks the block dirty for every frame in
    /// flight.
    pub fn set_value<T: Copy>(&mut self, var_name: &str, value: &T) {
        self.set_value_at(var_name, 0, value);
    }

    pub fn set_value_at<T: Copy>(&mut self, var_name: &str, element: usize, value: &T) {
        let (offset, size) = match self.slot_of(var_name, element) {
            Some(slot) => (
                slot.cpu_offset as usize,
                self.metadata.params[slot.param_index].cpu_size as usize,
            ),
            None => {
                log::warn!(target: "gfx", "unknown shader parameter `{}`", var_name);
                return;
            }
        };
        let bytes = as_bytes(value);
        let size = size.min(bytes.len());
        self.data[offset..offset + size].copy_from_slice(&bytes[..size]);
        self.mark_dirty();
    }

    fn set_resource(&mut self, var_name: &str, element: usize, resource: ResourceSlot) {
        let index = match self.slot_of(var_name, element).and_then(|s| s.resource_index) {
            Some(index) => index,
            None => {
                log::warn!(target: "gfx", "unknown resource parameter `{}`", var_name);
                return;
            }
        };
        self.resources[index] = resource;
    }

    pub fn set_buffer(&mut self, var_name: &str, param: BufferParam) {
        self.set_resource(var_name, 0, ResourceSlot::Buffer(param));
    }

    pub fn set_texture(&mut self, var_name: &str, param: TextureParam) {
        self.set_resource(var_name, 0, ResourceSlot::Texture(param));
    }

    pub fn set_rw_texture(&mut self, var_name: &str, param: RwTextureParam) {
        self.set_resource(var_name, 0, ResourceSlot::RwTexture(param));
    }

    pub fn set_sampler(&mut self, var_name: &str, param: SamplerParam) {
        self.set_resource(var_name, 0, ResourceSlot::Sampler(param));
    }

    pub fn set_acceleration_structure(&mut self, var_name: &str, param: AccelParam) {
        self.set_resource(var_name, 0, ResourceSlot::AccelerationStructure(param));
    }

    pub fn set_texture_at(&mut self, var_name: &str, element: usize, param: TextureParam) {
        self.set_resource(var_name, element, ResourceSlot::Texture(param));
    }

    pub fn resource(&self, index: usize) -> &ResourceSlot {
        &self.resources[index]
    }

    /// Uploads the dirty uniform ranges, at most once per frame, decrementing
    /// the dirty counter. A no-op once every frame in flight has seen the
    /// data.
    pub fn update_uniform_buffer(&self) {
        let ctx = match &self.ctx {
            Some(ctx) => ctx,
            None => return,
        };
        let need_to_update = ctx.frame_count() != self.last_update_frame.get();
        self.last_update_frame.set(ctx.frame_count());
        if !need_to_update || self.dirty_count.get() == 0 {
            return;
        }
        if let Some(uniform_buffer) = &self.uniform_buffer {
            let descs: Vec<DataSetDesc<'_>> = self
                .uniform_ranges
                .iter()
                .map(|range| DataSetDesc {
                    data: &self.data
                        [range.cpu_offset as usize..(range.cpu_offset + range.size) as usize],
                    offset: range.gpu_offset,
                })
                .collect();
            uniform_buffer.set_multiple_data_raw(&descs);
        }
        self.dirty_count.set(self.dirty_count.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::null::NullDevice;

    fn test_ctx() -> Rc<GraphicsContext> {
        GraphicsContext::new(Rc::new(NullDevice::new()), 2)
    }

    fn packing_metadata() -> ShaderParameterMetadataList {
        ShaderParameterMetadataList::new(vec![
            ShaderParameterMetadata::value("float4", "ubo_a", 16, 16),
            {
                let mut t = ShaderParameterMetadata::sampled_texture("Texture2D", "tex_b");
                t.cpu_size = 16;
                t.cpu_alignment = 16;
                t
            },
            {
                let mut v = ShaderParameterMetadata::value("float", "ubo_c", 4, 4);
                v.cpu_alignment = 16;
                v.gpu_alignment = 16;
                v
            },
        ])
    }

    #[test]
    fn packing_and_uniform_ranges() {
        let ctx = test_ctx();
        let mut params = ShaderParameter::new();
        params.initialize(&ctx, packing_metadata(), false);

        let offsets: Vec<(u64, Option<u64>)> = params
            .layout()
            .iter()
            .map(|slot| (slot.cpu_offset, slot.gpu_offset))
            .collect();
        assert_eq!(offsets, [(0, Some(0)), (16, None), (32, Some(16))]);

        // the texture breaks the constant cpu-gpu delta, so two ranges
        assert_eq!(
            params.uniform_ranges(),
            [
                UniformRange {
                    cpu_offset: 0,
                    gpu_offset: 0,
                    size: 16
                },
                UniformRange {
                    cpu_offset: 32,
                    gpu_offset: 16,
                    size: 4
                },
            ]
        );
        assert_eq!(
            params.uniform_ranges().iter().map(|r| r.size).sum::<u64>(),
            20
        );
        assert!(params.uniform_buffer().is_some());
    }

    #[test]
    fn adjacent_values_coalesce_into_one_range() {
        let ctx = test_ctx();
        let mut params = ShaderParameter::new();
        params.initialize(
            &ctx,
            ShaderParameterMetadataList::new(vec![
                ShaderParameterMetadata::value("float4", "a", 16, 16),
                ShaderParameterMetadata::value("float4", "b", 16, 16),
                ShaderParameterMetadata::value("float", "c", 4, 4),
            ]),
            false,
        );
        assert_eq!(
            params.uniform_ranges(),
            [UniformRange {
                cpu_offset: 0,
                gpu_offset: 0,
                size: 36
            }]
        );
    }

    #[test]
    fn dirty_counter_decrements_once_per_frame() {
        let ctx = test_ctx();
        let mut params = ShaderParameter::new();
        params.initialize(
            &ctx,
            ShaderParameterMetadataList::new(vec![ShaderParameterMetadata::value(
                "float4", "color", 16, 16,
            )]),
            false,
        );
        assert_eq!(params.dirty_count(), 0);

        params.set_value("color", &[1.0f32, 0.0, 0.0, 1.0]);
        assert_eq!(params.dirty_count(), ctx.frames_in_flight());

        ctx.advance_frame();
        params.update_uniform_buffer();
        assert_eq!(params.dirty_count(), 1);
        // same frame again: no-op
        params.update_uniform_buffer();
        assert_eq!(params.dirty_count(), 1);

        ctx.advance_frame();
        params.update_uniform_buffer();
        assert_eq!(params.dirty_count(), 0);

        ctx.advance_frame();
        params.update_uniform_buffer();
        assert_eq!(params.dirty_count(), 0);
    }

    #[test]
    fn bind_group_layout_shape() {
        let layout = packing_metadata().bind_group_layout(2, rhi::ShaderStage::FRAGMENT);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].descriptor_type, rhi::DescriptorType::UniformBuffer);
        assert_eq!(layout[0].binding_or_register, 0);
        assert_eq!(layout[0].space, 2);
        assert_eq!(layout[1].descriptor_type, rhi::DescriptorType::SampledTexture);
        assert_eq!(layout[1].binding_or_register, 1);
    }

    #[test]
    fn bind_group_layout_without_values_drops_uniform_buffer() {
        let list = ShaderParameterMetadataList::new(vec![
            ShaderParameterMetadata::sampled_texture("Texture2D", "a").with_array(&[4]),
            ShaderParameterMetadata::sampler("s"),
        ]);
        let layout = list.bind_group_layout(0, rhi::ShaderStage::FRAGMENT);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].binding_or_register, 1);
        assert_eq!(layout[0].count, 4);
        // binding advanced by the array count
        assert_eq!(layout[1].binding_or_register, 5);
    }

    #[test]
    fn generated_declaration() {
        let decl = packing_metadata().generated_shader_declaration(1, 3, false);
        assert!(decl.starts_with(
            "[[vk::binding(0, 1)]] cbuffer _cbuffer_1 : register(b0, space1) {\n"
        ));
        assert!(decl.contains("float4 ubo_a;\n"));
        assert!(decl.contains("float ubo_c;\n"));
        assert!(decl.contains(
            "[[vk::binding(1, 1)]] Texture2D tex_b : register(t1, space1);\n"
        ));
    }

    #[test]
    fn generated_declaration_relocates_samplers() {
        let list = ShaderParameterMetadataList::new(vec![ShaderParameterMetadata::sampler("s")]);
        let decl = list.generated_shader_declaration(2, 4, true);
        let expected_binding = 1 + SAMPLERS_BINDING_SHIFT * 2;
        assert_eq!(
            decl,
            format!(
                "[[vk::binding({}, 4)]] SamplerState s : register(s{}, space4);\n",
                expected_binding, expected_binding
            )
        );
    }
}
