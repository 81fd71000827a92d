//! Counter table with an array kept ascending by `(count, seq)`.
//!
//! The minimum sits at the front and is popped in O(1). Every other update
//! removes the key's slot and reinserts it at its new sorted position, which
//! shifts O(k) slots.

use std::collections::VecDeque;

use hashbrown::HashMap;

use super::{Counter, CounterBackend, FrequencyCounters, SketchKey};

#[derive(Debug, Clone, Copy)]
struct SortedSlot<K> {
    rank: (u64, u64),
    key: K,
}

/// Counter table indexed by a sorted array.
#[derive(Debug, Clone)]
pub struct SortedArrayCounters<K> {
    counters: HashMap<K, Counter>,
    sorted: VecDeque<SortedSlot<K>>,
}

impl<K: SketchKey> SortedArrayCounters<K> {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counters: HashMap::with_capacity(capacity),
            sorted: VecDeque::with_capacity(capacity),
        }
    }

    fn insert_sorted(&mut self, slot: SortedSlot<K>) {
        let at = self.sorted.partition_point(|s| s.rank < slot.rank);
        self.sorted.insert(at, slot);
    }

    #[cfg(test)]
    fn ranks(&self) -> Vec<(u64, u64)> {
        self.sorted.iter().map(|s| s.rank).collect()
    }
}

impl<K: SketchKey> FrequencyCounters<K> for SortedArrayCounters<K> {
    fn backend(&self) -> CounterBackend {
        CounterBackend::SortedArray
    }

    fn size(&self) -> usize {
        self.counters.len()
    }

    fn get(&self, key: &K) -> Option<Counter> {
        self.counters.get(key).copied()
    }

    fn increment(&mut self, key: &K) -> bool {
        let Some(counter) = self.counters.get_mut(key) else {
            return false;
        };
        let old_rank = counter.rank();
        counter.count += 1;
        let new_rank = counter.rank();
        // Ranks are unique (seq is), so the slot is exactly at the partition point.
        let at = self.sorted.partition_point(|s| s.rank < old_rank);
        if let Some(mut slot) = self.sorted.remove(at) {
            debug_assert!(slot.key == *key);
            slot.rank = new_rank;
            self.insert_sorted(slot);
        }
        true
    }

    fn insert(&mut self, key: K, counter: Counter) {
        self.counters.insert(key, counter);
        self.insert_sorted(SortedSlot {
            rank: counter.rank(),
            key,
        });
    }

    fn evict_minimum(&mut self) -> Option<(K, Counter)> {
        let front = self.sorted.pop_front()?;
        self.counters.remove_entry(&front.key)
    }

    fn entries(&self) -> Vec<(K, Counter)> {
        self.counters.iter().map(|(k, c)| (*k, *c)).collect()
    }
}
