//! Counter table with a binary min-heap over `(count, seq)`.
//!
//! Finding the eviction victim is O(log k). Incrementing a tracked key first
//! locates its heap slot by linear scan, so in-place updates cost O(k). The
//! heap carries no key → slot map.

use hashbrown::HashMap;

use super::{Counter, CounterBackend, FrequencyCounters, SketchKey};

#[derive(Debug, Clone, Copy)]
struct HeapSlot<K> {
    rank: (u64, u64),
    key: K,
}

/// Counter table indexed by a min-heap.
#[derive(Debug, Clone)]
pub struct HeapCounters<K> {
    counters: HashMap<K, Counter>,
    heap: Vec<HeapSlot<K>>,
}

impl<K: SketchKey> HeapCounters<K> {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counters: HashMap::with_capacity(capacity),
            heap: Vec::with_capacity(capacity),
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].rank >= self.heap[parent].rank {
                break;
            }
            self.heap.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left].rank < self.heap[smallest].rank {
                smallest = left;
            }
            if right < len && self.heap[right].rank < self.heap[smallest].rank {
                smallest = right;
            }
            if smallest == pos {
                return;
            }
            self.heap.swap(pos, smallest);
            pos = smallest;
        }
    }

    #[cfg(test)]
    fn is_heap(&self) -> bool {
        (1..self.heap.len()).all(|i| self.heap[(i - 1) / 2].rank <= self.heap[i].rank)
    }
}

impl<K: SketchKey> FrequencyCounters<K> for HeapCounters<K> {
    fn backend(&self) -> CounterBackend {
        CounterBackend::Heap
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
        counter.count += 1;
        let rank = counter.rank();
        // Linear scan for the slot; see module docs.
        if let Some(pos) = self.heap.iter().position(|slot| slot.key == *key) {
            self.heap[pos].rank = rank;
            // The rank only grew, so the slot can only move down.
            self.sift_down(pos);
        }
        true
    }

    fn insert(&mut self, key: K, counter: Counter) {
        self.counters.insert(key, counter);
        self.heap.push(HeapSlot {
            rank: counter.rank(),
            key,
        });
        let last = self.heap.len() - 1;
        self.sift_up(last);
    }

    fn evict_minimum(&mut self) -> Option<(K, Counter)> {
        if self.heap.is_empty() {
            return None;
        }
        let root = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        self.counters.remove_entry(&root.key)
    }

    fn entries(&self) -> Vec<(K, Counter)> {
        self.counters.iter().map(|(k, c)| (*k, *c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_invariant_survives_mixed_updates() {
        let mut table = HeapCounters::with_capacity(8);
        for (seq, key) in [4_i64, 1, 7, 3, 9, 2].into_iter().enumerate() {
            table.insert(key, Counter::fresh(seq as u64));
            assert!(table.is_heap());
        }
        for key in [4, 4, 4, 9, 1, 4, 2] {
            assert!(table.increment(&key));
            assert!(table.is_heap());
        }
        // Remaining count-1 keys: 7 (seq 2), 3 (seq 3); 7 is older.
        assert_eq!(table.evict_minimum().map(|(k, _)| k), Some(7));
        assert!(table.is_heap());
        assert_eq!(table.evict_minimum().map(|(k, _)| k), Some(3));
        assert_eq!(table.size(), 4);
    }

    #[test]
    fn drain_yields_ascending_ranks() {
        let mut table = HeapCounters::with_capacity(5);
        for (seq, count) in [5_u64, 3, 8, 1, 3].into_iter().enumerate() {
            table.insert(
                seq as i64,
                Counter {
                    count,
                    error: 0,
                    seq: seq as u64,
                },
            );
        }
        let mut ranks = Vec::new();
        while let Some((_, c)) = table.evict_minimum() {
            ranks.push(c.rank());
        }
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        assert_eq!(ranks, sorted);
        assert_eq!(table.size(), 0);
    }
}
