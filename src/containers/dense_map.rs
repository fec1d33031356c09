//! Densely stored hash map with swap-with-tail erasure.

use fxhash::FxHashMap;
use std::hash::Hash;

/// Maps keys to values, keeping both in contiguous storage.
///
/// `erase` swaps the erased entry with the tail, so the dense index of the
/// last entry changes but no other entry moves. A version counter advances
/// whenever a mutation actually changed the contents since the last read,
/// letting callers cheaply detect "did anything change".
pub struct DenseMap<K: Eq + Hash + Clone, V> {
    keys: Vec<K>,
    values: Vec<V>,
    index_map: FxHashMap<K, usize>,
    version: u64,
    version_dirty: bool,
}

impl<K: Eq + Hash + Clone, V> DenseMap<K, V> {
    pub fn new() -> Self {
        DenseMap {
            keys: Vec::new(),
            values: Vec::new(),
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

    /// Dense index of `key`, if present.
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.index_map.get(key).cloned()
    }

    /// Inserts `key` if absent; existing entries are left untouched.
    /// Returns the dense index of the entry.
    pub fn insert(&mut self, key: K, value: V) -> usize {
        if let Some(&index) = self.index_map.get(&key) {
            return index;
        }
        let index = self.keys.len();
        self.index_map.insert(key.clone(), index);
        self.keys.push(key);
        self.values.push(value);
        self.version_dirty = true;
        index
    }

    /// Inserts `key` or overwrites its value if already present.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> usize {
        if let Some(&index) = self.index_map.get(&key) {
            self.values[index] = value;
            return index;
        }
        let index = self.keys.len();
        self.index_map.insert(key.clone(), index);
        self.keys.push(key);
        self.values.push(value);
        self.version_dirty = true;
        index
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
            self.values.swap(index, last);
            *self.index_map.get_mut(&self.keys[index]).unwrap() = index;
        }
        self.keys.pop();
        self.values.pop();
    }

    /// Erases every key yielded by `keys`.
    pub fn erase_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>)
    where
        K: 'a,
    {
        for key in keys {
            self.erase(key);
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index_map.get(key).map(move |&i| &self.values[i])
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let values = &mut self.values;
        self.index_map.get(key).map(move |&i| &mut values[i])
    }

    /// Current version; advances iff a mutation happened since the last read.
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

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(self.values.iter())
    }
}

impl<K: Eq + Hash + Clone, V> Default for DenseMap<K, V> {
    fn default() -> Self {
        DenseMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_erase() {
        let mut map = DenseMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("c", 3);
        let v0 = map.version();

        map.erase(&"b");

        assert_eq!(map.keys(), ["a", "c"]);
        assert_eq!(map.values(), [1, 3]);
        assert_eq!(map.index_of(&"a"), Some(0));
        assert_eq!(map.index_of(&"c"), Some(1));
        assert_eq!(map.index_of(&"b"), None);
        assert!(map.version() > v0);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut map = DenseMap::new();
        assert_eq!(map.insert("a", 1), 0);
        let v0 = map.version();
        assert_eq!(map.insert("a", 7), 0);
        assert_eq!(map.get(&"a"), Some(&1));
        // no-op insert must not advance the version
        assert_eq!(map.version(), v0);

        map.insert_or_assign("a", 7);
        assert_eq!(map.get(&"a"), Some(&7));
    }

    #[test]
    fn index_map_stays_consistent() {
        let mut map = DenseMap::new();
        for i in 0..16 {
            map.insert(i, i * 10);
        }
        for i in (0..16).step_by(3) {
            map.erase(&i);
        }
        assert_eq!(map.keys().len(), map.values().len());
        for (i, key) in map.keys().to_vec().iter().enumerate() {
            assert_eq!(map.index_of(key), Some(i));
            assert_eq!(map.get(key), Some(&(key * 10)));
        }
    }

    #[test]
    fn erase_missing_key_keeps_version() {
        let mut map = DenseMap::new();
        map.insert("a", 1);
        let v0 = map.version();
        map.erase(&"zzz");
        assert_eq!(map.version(), v0);
    }
}
