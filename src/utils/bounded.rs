//! Capacity-bounded map that evicts the least recently inserted key

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Map holding at most `capacity` keys
///
/// Inserting a key, new or existing, makes it the most recent. Stale queue
/// slots left behind by re-inserts are skipped at eviction time and
/// compacted once they outnumber the live keys.
#[derive(Debug)]
pub struct BoundedMap<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: VecDeque<(K, u64)>,
    next_stamp: u64,
}

impl<K: Eq + Hash + Clone, V> BoundedMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_stamp: 0,
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Insert or replace a value, returning how many keys were evicted
    pub fn insert(&mut self, key: K, value: V) -> usize {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.entries.insert(key.clone(), (value, stamp));
        self.order.push_back((key, stamp));

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((oldest, oldest_stamp)) = self.order.pop_front() else {
                break;
            };
            if self.entries.get(&oldest).is_some_and(|(_, s)| *s == oldest_stamp) {
                self.entries.remove(&oldest);
                evicted += 1;
            }
        }

        if self.order.len() > self.entries.len() * 2 {
            let entries = &self.entries;
            self.order
                .retain(|(k, s)| entries.get(k).is_some_and(|(_, live)| live == s));
        }
        evicted
    }

    /// Value for `key`, inserting one built by `make` when absent
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        if let Some((value, _)) = self.entries.get(&key) {
            return value.clone();
        }
        let value = make();
        self.insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

}
