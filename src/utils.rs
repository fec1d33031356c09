//! Small shared helpers.

use std::hash::{Hash, Hasher};

/// Rounds `value` up to the next multiple of `alignment`. An alignment of 0
/// or 1 leaves the value unchanged.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        (value + alignment - 1) / alignment * alignment
    }
}

/// Stable hash of any hashable value, independent of hash map state.
pub fn stable_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = fxhash::FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(13, 1), 13);
        assert_eq!(align_up(13, 0), 13);
    }
}
