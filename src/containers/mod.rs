//! Container primitives: stable-handle slot maps and densely stored maps/sets.

mod dense_map;
mod dense_set;
mod slot_map;

pub use self::dense_map::DenseMap;
pub use self::dense_set::DenseSet;
pub use self::slot_map::{Handle, SlotMap};
