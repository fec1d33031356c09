//! Engine graphics core.
//!
//! The centre of the crate is the frame [render graph](graph::RenderGraph):
//! passes declare what they read and write, the graph schedules them, aliases
//! transient resources in a typed pool and computes the minimum set of
//! state-transition barriers before driving everything through one command
//! encoder. Around it sit the pieces it cannot be built without: the GPU
//! [scene](scene::GpuScene), reflected
//! [shader parameter blocks](shader::ShaderParameter), content-addressed
//! sampler/shader/pipeline caches and the frame-in-flight
//! [graphics manager](manager::GraphicsManager) that drives
//! acquire, record, submit and present.
//!
//! No concrete graphics API is mandated; backends implement the trait
//! capability set in [`rhi`].

#[macro_use]
extern crate log;

pub mod accel;
pub mod asset;
pub mod buffer;
pub mod camera;
pub mod commands;
pub mod containers;
pub mod context;
pub mod drawable;
pub mod error;
pub mod graph;
pub mod interface;
pub mod manager;
pub mod rhi;
pub mod sampler;
pub mod scene;
pub mod shader;
pub mod suballoc;
pub mod texture;
pub mod utils;
pub mod vfs;

pub use self::accel::{AccelerationStructure, AccelerationStructureDesc, BlasGeometryDesc};
pub use self::buffer::{Buffer, DataSetDesc};
pub use self::camera::{Camera, CameraHandle, ProjectionType};
pub use self::commands::{CommandHelpers, MipmapMode};
pub use self::containers::{DenseMap, DenseSet, Handle, SlotMap};
pub use self::context::GraphicsContext;
pub use self::drawable::{Drawable, DrawableHandle, Transform};
pub use self::error::{AssetError, Error, Result};
pub use self::graph::{
    AccelerationStructureHandle, BufferHandle, RenderGraph, RenderedObjectListDesc,
    RenderedObjectListHandle, RenderedObjectType, TextureHandle,
};
pub use self::interface::{BlendMode, Displayer, FragmentShader, Material, Mesh, Renderer};
pub use self::manager::{FrameDescriptors, GraphicsManager, GraphicsSettings, PipelineCache};
pub use self::sampler::{Sampler, SamplerCache};
pub use self::scene::GpuScene;
pub use self::shader::{
    CompilerEnvironment, ShaderCompiler, ShaderParameter, ShaderParameterMetadata,
    ShaderParameterMetadataList, ShaderSourceCompiler,
};
pub use self::suballoc::{BufferSuballocator, SuballocatedBuffer};
pub use self::texture::Texture;
pub use self::vfs::{MemoryVfs, StdVfs, Vfs};
