//! Plain data types shared with RHI backends.

use bitflags::bitflags;
use ordered_float::NotNan;

//--------------------------------------------------------------------------------------------------
// Formats

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ResourceFormat {
    Undefined,
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Uint,
    R32Float,
    Rg32Float,
    Rgba32Float,
    Rg11B10Float,
    Rgb10A2Unorm,
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,
    Bc1RgbaUnorm,
    Bc1RgbaSrgb,
    Bc3RgbaUnorm,
    Bc3RgbaSrgb,
    Bc5RgUnorm,
    Bc7RgbaUnorm,
    Bc7RgbaSrgb,
}

impl Default for ResourceFormat {
    fn default() -> Self {
        ResourceFormat::Undefined
    }
}

impl ResourceFormat {
    pub fn is_depth_stencil(self) -> bool {
        match self {
            ResourceFormat::D16Unorm
            | ResourceFormat::D24UnormS8Uint
            | ResourceFormat::D32Float
            | ResourceFormat::D32FloatS8Uint => true,
            _ => false,
        }
    }

    pub fn is_color(self) -> bool {
        self != ResourceFormat::Undefined && !self.is_depth_stencil()
    }

    pub fn is_srgb(self) -> bool {
        match self {
            ResourceFormat::Rgba8Srgb
            | ResourceFormat::Bgra8Srgb
            | ResourceFormat::Bc1RgbaSrgb
            | ResourceFormat::Bc3RgbaSrgb
            | ResourceFormat::Bc7RgbaSrgb => true,
            _ => false,
        }
    }

    pub fn is_compressed(self) -> bool {
        match self {
            ResourceFormat::Bc1RgbaUnorm
            | ResourceFormat::Bc1RgbaSrgb
            | ResourceFormat::Bc3RgbaUnorm
            | ResourceFormat::Bc3RgbaSrgb
            | ResourceFormat::Bc5RgUnorm
            | ResourceFormat::Bc7RgbaUnorm
            | ResourceFormat::Bc7RgbaSrgb => true,
            _ => false,
        }
    }

    /// Image format name usable in a `[[vk::image_format("…")]]` attribute.
    pub fn storage_image_name(self) -> &'static str {
        match self {
            ResourceFormat::R8Unorm => "r8",
            ResourceFormat::Rg8Unorm => "rg8",
            ResourceFormat::Rgba8Unorm => "rgba8",
            ResourceFormat::R16Float => "r16f",
            ResourceFormat::Rg16Float => "rg16f",
            ResourceFormat::Rgba16Float => "rgba16f",
            ResourceFormat::R32Uint => "r32ui",
            ResourceFormat::R32Float => "r32f",
            ResourceFormat::Rg32Float => "rg32f",
            ResourceFormat::Rgba32Float => "rgba32f",
            ResourceFormat::Rg11B10Float => "r11g11b10f",
            ResourceFormat::Rgb10A2Unorm => "rgb10a2",
            _ => "unknown",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Resources

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

impl Default for TextureDimension {
    fn default() -> Self {
        TextureDimension::D2
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TextureViewType {
    /// Derived from the texture dimension and layer count.
    Automatic,
    D1,
    D2,
    D2Array,
    Cube,
    CubeArray,
    D3,
}

impl Default for TextureViewType {
    fn default() -> Self {
        TextureViewType::Automatic
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth_or_layers: u32,
}

bitflags! {
    #[derive(Default)]
    pub struct BufferUsage: u32 {
        const VERTEX              = 0x0001;
        const INDEX               = 0x0002;
        const UNIFORM             = 0x0004;
        const STORAGE_READ        = 0x0008;
        const STORAGE_READ_WRITE  = 0x0010;
        const INDIRECT            = 0x0020;
        const ACCEL_BUILD_INPUT   = 0x0040;
        const ACCEL_STORAGE       = 0x0080;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct TextureUsage: u32 {
        const SAMPLED             = 0x0001;
        const STORAGE_READ        = 0x0002;
        const STORAGE_READ_WRITE  = 0x0004;
        const COLOR_ATTACHMENT    = 0x0008;
        const DEPTH_STENCIL_ATTACHMENT = 0x0010;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BufferMemoryProperty {
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl Default for BufferMemoryProperty {
    fn default() -> Self {
        BufferMemoryProperty::GpuOnly
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BufferDesc {
    pub size: u64,
    pub usages: BufferUsage,
    pub memory_property: BufferMemoryProperty,
    pub persistently_mapped: bool,
}

impl Default for BufferDesc {
    fn default() -> Self {
        BufferDesc {
            size: 0,
            usages: BufferUsage::empty(),
            memory_property: BufferMemoryProperty::GpuOnly,
            persistently_mapped: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextureDesc {
    pub extent: Extent3d,
    pub levels: u32,
    pub format: ResourceFormat,
    pub dim: TextureDimension,
    pub usages: TextureUsage,
}

impl Default for TextureDesc {
    fn default() -> Self {
        TextureDesc {
            extent: Extent3d::default(),
            levels: 1,
            format: ResourceFormat::Undefined,
            dim: TextureDimension::D2,
            usages: TextureUsage::empty(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Samplers

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SamplerFilterMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SamplerMipmapMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SamplerAddressMode {
    Wrap,
    Clamp,
    Mirror,
    Border,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Structural equality and hashing make this directly usable as a cache key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SamplerDesc {
    pub mag_filter: SamplerFilterMode,
    pub min_filter: SamplerFilterMode,
    pub mipmap_mode: SamplerMipmapMode,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub lod_bias: NotNan<f32>,
    pub lod_min: NotNan<f32>,
    pub lod_max: NotNan<f32>,
    pub compare_op: Option<CompareOp>,
    pub anisotropy: u32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        SamplerDesc {
            mag_filter: SamplerFilterMode::Nearest,
            min_filter: SamplerFilterMode::Nearest,
            mipmap_mode: SamplerMipmapMode::Nearest,
            address_mode_u: SamplerAddressMode::Clamp,
            address_mode_v: SamplerAddressMode::Clamp,
            address_mode_w: SamplerAddressMode::Clamp,
            lod_bias: NotNan::new(0.0).unwrap(),
            lod_min: NotNan::new(0.0).unwrap(),
            lod_max: NotNan::new(1000.0).unwrap(),
            compare_op: None,
            anisotropy: 0,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Descriptors

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DescriptorType {
    /// A value stored in the owning uniform buffer, not a resource binding.
    None,
    Sampler,
    UniformBuffer,
    ReadOnlyStorageBuffer,
    ReadWriteStorageBuffer,
    SampledTexture,
    ReadOnlyStorageTexture,
    ReadWriteStorageTexture,
    AccelerationStructure,
}

impl Default for DescriptorType {
    fn default() -> Self {
        DescriptorType::None
    }
}

/// Opaque pair of heap addresses identifying one descriptor.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DescriptorHandle {
    pub cpu: u64,
    pub gpu: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DescriptorHeapType {
    Resource,
    Sampler,
}

#[derive(Clone, Debug)]
pub struct DescriptorHeapDesc {
    pub max_count: u32,
    pub heap_type: DescriptorHeapType,
    pub shader_visible: bool,
}

bitflags! {
    #[derive(Default)]
    pub struct ShaderStage: u32 {
        const VERTEX                  = 0x01;
        const TESSELLATION_CONTROL    = 0x02;
        const TESSELLATION_EVALUATION = 0x04;
        const GEOMETRY                = 0x08;
        const FRAGMENT                = 0x10;
        const COMPUTE                 = 0x20;
        const ALL_GRAPHICS            = 0x1f;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BindGroupLayoutEntry {
    pub count: u32,
    pub descriptor_type: DescriptorType,
    pub visibility: ShaderStage,
    pub binding_or_register: u32,
    pub space: u32,
}

pub type BindGroupLayout = Vec<BindGroupLayoutEntry>;

//--------------------------------------------------------------------------------------------------
// Accesses and barriers

bitflags! {
    #[derive(Default)]
    pub struct ResourceAccess: u32 {
        const NONE                      = 0;
        const UNIFORM_BUFFER_READ       = 0x0001;
        const INDIRECT_READ             = 0x0002;
        const STORAGE_READ              = 0x0004;
        const STORAGE_WRITE             = 0x0008;
        const SAMPLED_TEXTURE_READ      = 0x0010;
        const COLOR_ATTACHMENT_WRITE    = 0x0020;
        const DEPTH_STENCIL_READ        = 0x0040;
        const DEPTH_STENCIL_WRITE       = 0x0080;
        const TRANSFER_READ             = 0x0100;
        const TRANSFER_WRITE            = 0x0200;
        const ACCEL_BUILD_READ          = 0x0400;
        const ACCEL_BUILD_WRITE         = 0x0800;
        const ACCEL_EMIT_DATA_WRITE     = 0x1000;
        const PRESENT                   = 0x2000;
    }
}

pub struct BufferBarrier<'a> {
    pub buffer: &'a dyn super::Buffer,
    pub src_access: ResourceAccess,
    pub dst_access: ResourceAccess,
}

pub struct TextureBarrier<'a> {
    pub texture: &'a dyn super::Texture,
    pub base_level: u32,
    /// 0 means "all levels from `base_level`".
    pub num_levels: u32,
    pub base_layer: u32,
    pub num_layers: u32,
    pub src_access: ResourceAccess,
    pub dst_access: ResourceAccess,
}

impl<'a> TextureBarrier<'a> {
    pub fn whole(
        texture: &'a dyn super::Texture,
        src_access: ResourceAccess,
        dst_access: ResourceAccess,
    ) -> Self {
        TextureBarrier {
            texture,
            base_level: 0,
            num_levels: 0,
            base_layer: 0,
            num_layers: 0,
            src_access,
            dst_access,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct BufferCopyDesc {
    pub src_offset: u64,
    pub dst_offset: u64,
    /// 0 means "copy the whole source".
    pub size: u64,
}

//--------------------------------------------------------------------------------------------------
// Render and compute passes

#[derive(Clone, Debug)]
pub struct CommandLabel {
    pub label: String,
    pub color: [f32; 3],
}

impl CommandLabel {
    pub fn new(label: impl Into<String>, color: [f32; 3]) -> Self {
        CommandLabel {
            label: label.into(),
            color,
        }
    }
}

#[derive(Copy, Clone)]
pub struct TextureViewRef<'a> {
    pub texture: &'a dyn super::Texture,
    pub mip_level: u32,
    pub base_layer: u32,
    pub num_layers: u32,
}

impl<'a> TextureViewRef<'a> {
    pub fn base(texture: &'a dyn super::Texture) -> Self {
        TextureViewRef {
            texture,
            mip_level: 0,
            base_layer: 0,
            num_layers: 1,
        }
    }
}

pub struct ColorAttachmentDesc<'a> {
    pub texture: TextureViewRef<'a>,
    pub clear_color: Option<[f32; 4]>,
    pub store: bool,
}

pub struct DepthStencilAttachmentDesc<'a> {
    pub texture: TextureViewRef<'a>,
    pub clear_value: Option<(f32, u8)>,
    pub store: bool,
    pub read_only: bool,
}

pub struct RenderTargetDesc<'a> {
    pub colors: Vec<ColorAttachmentDesc<'a>>,
    pub depth_stencil: Option<DepthStencilAttachmentDesc<'a>>,
}

impl<'a> Default for RenderTargetDesc<'a> {
    fn default() -> Self {
        RenderTargetDesc {
            colors: Vec::new(),
            depth_stencil: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

//--------------------------------------------------------------------------------------------------
// Pipelines

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    PatchList,
}

impl Default for PrimitiveTopology {
    fn default() -> Self {
        PrimitiveTopology::TriangleList
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColorTargetAttachmentState {
    pub format: ResourceFormat,
    pub blend_enable: bool,
    pub blend_op: BlendOp,
    pub src_blend_factor: BlendFactor,
    pub dst_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
}

impl Default for ColorTargetAttachmentState {
    fn default() -> Self {
        ColorTargetAttachmentState {
            format: ResourceFormat::Undefined,
            blend_enable: false,
            blend_op: BlendOp::Add,
            src_blend_factor: BlendFactor::One,
            dst_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StencilFaceState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        StencilFaceState {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DepthStencilState {
    pub format: ResourceFormat,
    pub depth_write: bool,
    pub depth_test: bool,
    pub depth_compare_op: CompareOp,
    pub stencil_test: bool,
    pub stencil_front_face: StencilFaceState,
    pub stencil_back_face: StencilFaceState,
    pub stencil_compare_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_reference: u8,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            format: ResourceFormat::Undefined,
            depth_write: false,
            depth_test: false,
            depth_compare_op: CompareOp::Always,
            stencil_test: false,
            stencil_front_face: StencilFaceState::default(),
            stencil_back_face: StencilFaceState::default(),
            stencil_compare_mask: 0xff,
            stencil_write_mask: 0xff,
            stencil_reference: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RasterizationState {
    pub topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
    pub conservative: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        RasterizationState {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::CounterClockwise,
            cull_mode: CullMode::None,
            polygon_mode: PolygonMode::Fill,
            conservative: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TessellationState {
    pub patch_control_points: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VertexInputAttribute {
    pub semantics: VertexSemantics,
    pub format: ResourceFormat,
    pub offset: u32,
}

bitflags! {
    #[derive(Default)]
    pub struct VertexAttributesType: u32 {
        const POSITION  = 0x01;
        const NORMAL    = 0x02;
        const TANGENT   = 0x04;
        const COLOR     = 0x08;
        const TEXCOORD0 = 0x10;
        const TEXCOORD1 = 0x20;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VertexSemantics {
    Position,
    Normal,
    Tangent,
    Color,
    Texcoord0,
    Texcoord1,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexInputBufferDesc {
    pub stride: u32,
    pub per_instance: bool,
    pub attributes: Vec<VertexInputAttribute>,
}

#[derive(Copy, Clone)]
pub struct PipelineShader<'a> {
    pub module: &'a dyn super::ShaderModule,
    pub entry: &'a str,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct PushConstantsDesc {
    pub size: u32,
    pub visibility: ShaderStage,
    pub register_: u32,
    pub space: u32,
}

pub struct StaticSampler<'a> {
    pub sampler: &'a dyn super::Sampler,
    pub binding_or_register: u32,
    pub space: u32,
    pub visibility: ShaderStage,
}

pub struct GraphicsShaderSet<'a> {
    pub vertex: PipelineShader<'a>,
    pub tessellation_control: Option<PipelineShader<'a>>,
    pub tessellation_evaluation: Option<PipelineShader<'a>>,
    pub geometry: Option<PipelineShader<'a>>,
    pub fragment: PipelineShader<'a>,
}

pub struct GraphicsPipelineDesc<'a> {
    pub vertex_input_buffers: Vec<VertexInputBufferDesc>,
    pub tessellation_state: TessellationState,
    pub rasterization_state: RasterizationState,
    pub depth_stencil_state: DepthStencilState,
    pub color_target_attachments: Vec<ColorTargetAttachmentState>,
    pub bind_groups_layout: Vec<BindGroupLayout>,
    pub static_samplers: Vec<StaticSampler<'a>>,
    pub push_constants: Option<PushConstantsDesc>,
    pub shaders: GraphicsShaderSet<'a>,
}

pub struct ComputePipelineDesc<'a> {
    pub bind_groups_layout: Vec<BindGroupLayout>,
    pub static_samplers: Vec<StaticSampler<'a>>,
    pub push_constants: Option<PushConstantsDesc>,
    pub compute: PipelineShader<'a>,
}

//--------------------------------------------------------------------------------------------------
// Acceleration structures

bitflags! {
    #[derive(Default)]
    pub struct AccelBuildFlag: u32 {
        const FAST_TRACE   = 0x01;
        const FAST_BUILD   = 0x02;
        const ALLOW_UPDATE = 0x04;
        const ALLOW_COMPACTION = 0x08;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccelStructureType {
    BottomLevel,
    TopLevel,
}

pub struct AccelStructureDesc<'a> {
    pub structure_type: AccelStructureType,
    pub buffer: &'a dyn super::Buffer,
    pub buffer_offset: u64,
    pub buffer_range_size: u64,
}

pub struct AccelTriangleGeometry<'a> {
    pub vertex_buffer: &'a dyn super::Buffer,
    pub vertex_offset: u64,
    pub vertex_stride: u64,
    pub vertex_format: ResourceFormat,
    pub num_vertices: u32,
    pub index_buffer: &'a dyn super::Buffer,
    pub index_offset: u64,
    pub num_indices: u32,
}

pub struct AccelGeometryBuildInput<'a> {
    pub flags: AccelBuildFlag,
    pub is_update: bool,
    pub geometries: Vec<AccelTriangleGeometry<'a>>,
}

pub struct AccelInstanceBuildInput<'a> {
    pub flags: AccelBuildFlag,
    pub is_update: bool,
    pub num_instances: u32,
    pub instances_buffer: &'a dyn super::Buffer,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct AccelMemorySize {
    pub structure_size: u64,
    pub build_scratch_size: u64,
    pub update_scratch_size: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccelBuildEmitDataType {
    CompactedSize,
}

pub struct AccelBuildEmitData<'a> {
    pub data_type: AccelBuildEmitDataType,
    pub dst_buffer: &'a dyn super::Buffer,
    pub dst_buffer_offset: u64,
}

pub struct AccelGeometryBuildDesc<'a> {
    pub build_input: AccelGeometryBuildInput<'a>,
    pub scratch_buffer: &'a dyn super::Buffer,
    pub scratch_buffer_offset: u64,
    pub src_structure: Option<&'a dyn super::AccelerationStructure>,
    pub dst_structure: &'a dyn super::AccelerationStructure,
    pub emit_data: Vec<AccelBuildEmitData<'a>>,
}

pub struct AccelInstanceBuildDesc<'a> {
    pub build_input: AccelInstanceBuildInput<'a>,
    pub scratch_buffer: &'a dyn super::Buffer,
    pub scratch_buffer_offset: u64,
    pub dst_structure: &'a dyn super::AccelerationStructure,
}

bitflags! {
    #[derive(Default)]
    pub struct AccelInstanceFlag: u32 {
        const TRIANGLE_FACING_CULL_DISABLE = 0x01;
        const FORCE_OPAQUE     = 0x02;
        const FORCE_NON_OPAQUE = 0x04;
    }
}

/// Instance record layout consumed by top-level builds, one per drawable.
#[derive(Clone, Debug, Default)]
pub struct AccelInstanceDesc {
    pub transform: [[f32; 4]; 3],
    pub instance_id: u32,
    pub mask: u32,
    pub sbt_offset: u32,
    pub flags: u32,
    pub blas_reference: u64,
}

const ACCEL_INSTANCE_RECORD_SIZE: usize = 64;

impl AccelInstanceDesc {
    /// Serialised size of one instance record.
    pub const SIZE: u64 = ACCEL_INSTANCE_RECORD_SIZE as u64;

    pub fn encode(&self, out: &mut Vec<u8>) {
        use byteorder::{ByteOrder, LittleEndian};
        let mut record = [0u8; ACCEL_INSTANCE_RECORD_SIZE];
        for row in 0..3 {
            for col in 0..4 {
                LittleEndian::write_f32(
                    &mut record[(row * 4 + col) * 4..],
                    self.transform[row][col],
                );
            }
        }
        LittleEndian::write_u32(&mut record[48..], self.instance_id & 0x00ff_ffff | self.mask << 24);
        LittleEndian::write_u32(&mut record[52..], self.sbt_offset & 0x00ff_ffff | self.flags << 24);
        LittleEndian::write_u64(&mut record[56..], self.blas_reference);
        out.extend_from_slice(&record);
    }
}

//--------------------------------------------------------------------------------------------------
// Device level

#[derive(Copy, Clone, Debug)]
pub enum QueueType {
    Graphics,
    Compute,
    Transfer,
}

#[derive(Clone, Debug)]
pub struct DeviceProperties {
    pub name: String,
    /// Samplers live in a dedicated descriptor heap with its own sets.
    pub separate_sampler_heap: bool,
    /// Suffix used for compiled shader binaries of this backend.
    pub shader_binary_suffix: &'static str,
}

#[derive(Clone, Debug)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
}

//--------------------------------------------------------------------------------------------------
// Descriptor creation

pub struct BufferDescriptorDesc<'a> {
    pub buffer: &'a dyn super::Buffer,
    pub descriptor_type: DescriptorType,
    pub offset: u64,
    pub size: u64,
    pub structure_stride: u32,
    pub format: ResourceFormat,
}

pub struct TextureDescriptorDesc<'a> {
    pub texture: &'a dyn super::Texture,
    pub descriptor_type: DescriptorType,
    pub base_level: u32,
    pub num_levels: u32,
    pub base_layer: u32,
    pub num_layers: u32,
    pub format: ResourceFormat,
    pub view_type: TextureViewType,
}
