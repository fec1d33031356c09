//! Render hardware interface.
//!
//! An abstract capability set over the GPU: devices, queues, command
//! encoders, descriptor heaps, swapchains and the plain data types describing
//! resources and pipeline state. Backends implement the traits in
//! [`traits`]; the engine core never names a concrete graphics API.

mod traits;
mod types;

pub mod null;

pub use self::traits::*;
pub use self::types::*;
