//! Densely stored hash set, sibling of [`DenseMap`](super::DenseMap).

use fxhash::FxHashMap;
use std::hash::Hash;

pub struct DenseSet<K: Eq + Hash + Clone> {
    keys: Vec<K>,
    index_map: FxHashMap<K, usize>,
    version: u64,
    version_dirty: bool,
}

impl<K: Eq + Hash + Clone> DenseSet<K> {
    pub fn new() -> Self {
        DenseSet {
            keys: Vec::new(),
            index_map: FxHashMap::default(),
            version: 0,
            version_dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index_map.contains_key(key)
    }

    /// Returns true if the key was newly inserted.
    pub fn insert(&mut self, key: K) -> bool {
        if self.index_map.contains_key(&key) {
            return false;
        }
        self.index_map.insert(key.clone(), self.keys.len());
        self.keys.push(key);
        self.version_dirty = true;
        true
    }

    pub fn erase(&mut self, key: &K) {
        let index = match self.index_map.remove(key) {
            Some(index) => index,
            None => return,
        };
        self.version_dirty = true;
        let last = self.keys.len() - 1;
        if index != last {
            self.keys.swap(index, last);
            *self.index_map.get_mut(&self.keys[index]).unwrap() = index;
        }
        self.keys.pop();
    }

    pub fn version(&mut self) -> u64 {
        if self.version_dirty {
            self.version += 1;
            self.version_dirty = false;
        }
        self.version
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keys.iter()
    }
}

impl<K: Eq + Hash + Clone> Default for DenseSet<K> {
    fn default() -> Self {
        DenseSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_erase() {
        let mut set = DenseSet::new();
        assert!(set.insert(4));
        assert!(set.insert(7));
        assert!(!set.insert(4));
        assert_eq!(set.len(), 2);

        set.erase(&4);
        assert!(!set.contains(&4));
        assert!(set.contains(&7));
        assert_eq!(set.keys(), [7]);
    }

    #[test]
    fn version_tracks_mutations() {
        let mut set = DenseSet::new();
        let v0 = set.version();
        set.insert("x");
        let v1 = set.version();
        assert!(v1 > v0);
        // duplicate insert and missing erase are no-ops
        set.insert("x");
        set.erase(&"y");
        assert_eq!(set.version(), v1);
    }
}
