//! Shader parameter blocks, compilation environment and compiler caches.

mod compiler;
mod environment;
mod param;
pub mod preprocessor;

pub use self::compiler::{ShaderCompiler, ShaderSourceCompiler};
pub use self::environment::CompilerEnvironment;
pub use self::param::{
    AccelParam, BufferParam, ParamSlot, ResourceSlot, RwTextureParam, SamplerParam,
    ShaderParameter, ShaderParameterMetadata, ShaderParameterMetadataList, TextureParam,
    UniformRange, SAMPLERS_BINDING_SHIFT,
};
