//! Hash-table-only backend: eviction scans every counter.

use hashbrown::HashMap;

use super::{Counter, CounterBackend, FrequencyCounters, SketchKey};

/// Counter table without an auxiliary index.
#[derive(Debug, Clone)]
pub struct HashOnlyCounters<K> {
    counters: HashMap<K, Counter>,
}

impl<K: SketchKey> HashOnlyCounters<K> {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counters: HashMap::with_capacity(capacity),
        }
    }
}

impl<K: SketchKey> FrequencyCounters<K> for HashOnlyCounters<K> {
    fn backend(&self) -> CounterBackend {
        CounterBackend::HashOnly
    }

    fn size(&self) -> usize {
        self.counters.len()
    }

    fn get(&self, key: &K) -> Option<Counter> {
        self.counters.get(key).copied()
    }

    fn increment(&mut self, key: &K) -> bool {
        match self.counters.get_mut(key) {
            Some(counter) => {
                counter.count += 1;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, key: K, counter: Counter) {
        self.counters.insert(key, counter);
    }

    fn evict_minimum(&mut self) -> Option<(K, Counter)> {
        let victim = self
            .counters
            .iter()
            .min_by_key(|(_, counter)| counter.rank())
            .map(|(key, _)| *key)?;
        self.counters.remove_entry(&victim)
    }

    fn entries(&self) -> Vec<(K, Counter)> {
        self.counters.iter().map(|(k, c)| (*k, *c)).collect()
    }
}
