//! Cache Store Module
//!
//! Concurrent key/entry map offering the per-key atomic primitives the
//! cache and the sweeper are built on.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::CacheEntry;

/// Entries are shared by reference so conditional updates can compare identity.
pub type SharedEntry<V> = Arc<CacheEntry<V>>;

// == Cache Store ==
/// Concurrent mapping from key to entry.
///
/// Every operation is atomic for a single key. Shard locks are only held
/// for the duration of one call, never across an await point. No
/// cross-key atomicity is offered.
#[derive(Debug)]
pub struct CacheStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, SharedEntry<V>>,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash,
{
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    // == Try Get ==
    /// Returns the entry currently stored for `key`, if any.
    pub fn try_get(&self, key: &K) -> Option<SharedEntry<V>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    // == Put If Absent ==
    /// Inserts `entry` unless the key is already present.
    ///
    /// Returns whichever entry is stored for the key afterwards: the given
    /// one on insert, otherwise the one that was already there.
    pub fn put_if_absent(&self, key: K, entry: SharedEntry<V>) -> SharedEntry<V> {
        match self.entries.entry(key) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&entry));
                entry
            }
        }
    }

    // == Compare And Set ==
    /// Replaces the entry for `key` only if it is still `expected`.
    ///
    /// Identity is by pointer, so an entry replaced by an equal-looking
    /// one still counts as changed.
    pub fn compare_and_set(
        &self,
        key: &K,
        expected: &SharedEntry<V>,
        new: SharedEntry<V>,
    ) -> bool {
        match self.entries.get_mut(key) {
            Some(mut current) if Arc::ptr_eq(current.value(), expected) => {
                *current.value_mut() = new;
                true
            }
            _ => false,
        }
    }

    // == Remove If Same ==
    /// Removes the entry for `key` only if it is still `expected`.
    pub fn remove_if_same(&self, key: &K, expected: &SharedEntry<V>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, expected))
            .is_some()
    }

    // == Insert ==
    /// Stores `entry` for `key`, replacing whatever was there.
    pub fn insert(&self, key: K, entry: SharedEntry<V>) {
        self.entries.insert(key, entry);
    }

    // == Remove ==
    /// Unconditionally deletes the entry for `key`.
    pub fn remove(&self, key: &K) -> Option<SharedEntry<V>> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Snapshot ==
    /// Copies out the current `(key, entry)` pairs.
    ///
    /// This is not a point-in-time view: shards are visited one after the
    /// other while writers keep going.
    pub fn snapshot(&self) -> Vec<(K, SharedEntry<V>)> {
        self.entries
            .iter()
            .map(|item| (item.key().clone(), Arc::clone(item.value())))
            .collect()
    }
}

impl<K, V> Default for CacheStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: &str) -> SharedEntry<String> {
        Arc::new(CacheEntry::eternal(value.to_string()))
    }

    #[test]
    fn test_store_new() {
        let store: CacheStore<String, String> = CacheStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_try_get_missing() {
        let store: CacheStore<String, String> = CacheStore::new();
        assert!(store.try_get(&"missing".to_string()).is_none());
    }

    #[test]
    fn test_put_if_absent_inserts() {
        let store = CacheStore::new();
        let first = entry("value1");

        let present = store.put_if_absent("key1".to_string(), Arc::clone(&first));

        assert!(Arc::ptr_eq(&present, &first));
        assert_eq!(store.try_get(&"key1".to_string()).unwrap().value, "value1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_if_absent_keeps_existing() {
        let store = CacheStore::new();
        let first = entry("value1");
        store.put_if_absent("key1".to_string(), Arc::clone(&first));

        let present = store.put_if_absent("key1".to_string(), entry("value2"));

        assert!(Arc::ptr_eq(&present, &first));
        assert_eq!(store.try_get(&"key1".to_string()).unwrap().value, "value1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_set_succeeds_on_same_entry() {
        let store = CacheStore::new();
        let key = "key1".to_string();
        let first = store.put_if_absent(key.clone(), entry("value1"));

        assert!(store.compare_and_set(&key, &first, entry("value2")));
        assert_eq!(store.try_get(&key).unwrap().value, "value2");
    }

    #[test]
    fn test_compare_and_set_fails_on_replaced_entry() {
        let store = CacheStore::new();
        let key = "key1".to_string();
        let stale = store.put_if_absent(key.clone(), entry("value1"));
        // equal contents, different allocation
        store.insert(key.clone(), entry("value1"));

        assert!(!store.compare_and_set(&key, &stale, entry("value2")));
        assert_eq!(store.try_get(&key).unwrap().value, "value1");
    }

    #[test]
    fn test_compare_and_set_fails_on_missing_key() {
        let store = CacheStore::new();
        let orphan = entry("value1");

        assert!(!store.compare_and_set(&"key1".to_string(), &orphan, entry("value2")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_if_same() {
        let store = CacheStore::new();
        let key = "key1".to_string();
        let stale = store.put_if_absent(key.clone(), entry("value1"));
        let fresh = entry("value2");
        store.insert(key.clone(), Arc::clone(&fresh));

        assert!(!store.remove_if_same(&key, &stale));
        assert_eq!(store.len(), 1);

        assert!(store.remove_if_same(&key, &fresh));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let store = CacheStore::new();
        store.insert("key1".to_string(), entry("value1"));
        store.insert("key2".to_string(), entry("value2"));

        let removed = store.remove(&"key1".to_string()).unwrap();
        assert_eq!(removed.value, "value1");
        assert!(store.remove(&"key1".to_string()).is_none());

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_shares_entries() {
        let store = CacheStore::new();
        let first = entry("value1");
        store.insert("key1".to_string(), Arc::clone(&first));
        store.insert("key2".to_string(), entry("value2"));

        let mut snapshot = store.snapshot();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, "key1");
        assert!(Arc::ptr_eq(&snapshot[0].1, &first));
    }

    #[test]
    fn test_concurrent_put_if_absent_single_winner() {
        let store = Arc::new(CacheStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.put_if_absent("key".to_string(), entry(&format!("value{i}")))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = store.try_get(&"key".to_string()).unwrap();

        assert_eq!(store.len(), 1);
        assert!(results.iter().all(|present| Arc::ptr_eq(present, &stored)));
    }
}
