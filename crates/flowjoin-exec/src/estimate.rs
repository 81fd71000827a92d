//! Per-partition key-distribution summaries.
//!
//! Each partition's key stream (optionally a strided sample of it) is fed
//! through a fresh [`SpaceSaving`] sketch and frozen into a [`Histogram`]. The
//! sketch is discarded after its snapshot is taken.

use flowjoin_error::{FlowJoinError, Result};
use flowjoin_sketch::{CounterBackend, Histogram, SpaceSaving};
use flowjoin_types::{JoinKey, PartitionedRelation, Payload};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How many sketches summarize one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationScope {
    /// One sketch per partition; yields `P` histograms per relation.
    #[default]
    PerPartition,
    /// One sketch consuming every partition in id order; yields one histogram.
    PerRelation,
}

impl EstimationScope {
    /// Histograms produced for a relation with `partitions` partitions.
    #[must_use]
    pub const fn histograms_per_relation(self, partitions: usize) -> usize {
        match self {
            Self::PerPartition => partitions,
            Self::PerRelation => 1,
        }
    }
}

/// Sketch parameters shared by every partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorSettings {
    pub capacity: usize,
    pub backend: CounterBackend,
    /// Feed every `sample_stride`-th key to the sketch; 1 means every key.
    ///
    /// Counts in the resulting histogram are counts of the sample and are not
    /// scaled back up. A `SkewThreshold::Count(n)` therefore means `n` sampled
    /// occurrences, roughly `n * sample_stride` real ones; a
    /// `SkewThreshold::Frequency` is unaffected by the stride.
    pub sample_stride: usize,
}

impl EstimatorSettings {
    #[must_use]
    pub const fn new(capacity: usize, backend: CounterBackend) -> Self {
        Self {
            capacity,
            backend,
            sample_stride: 1,
        }
    }

    #[must_use]
    pub const fn with_sample_stride(mut self, stride: usize) -> Self {
        self.sample_stride = stride;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FlowJoinError::InvalidCapacity {
                capacity: self.capacity,
            });
        }
        if self.sample_stride == 0 {
            return Err(FlowJoinError::InvalidSampleStride {
                stride: self.sample_stride,
            });
        }
        Ok(())
    }
}

/// Summarize one key stream.
pub fn estimate_keys<I>(keys: I, settings: &EstimatorSettings) -> Result<Histogram<JoinKey>>
where
    I: IntoIterator<Item = JoinKey>,
{
    settings.validate()?;
    let mut sketch = SpaceSaving::new(settings.capacity, settings.backend)?;
    sketch.process(keys.into_iter().step_by(settings.sample_stride));
    Ok(sketch.into_histogram())
}

/// Summarize every partition of `relation` according to `scope`.
///
/// With `parallel`, per-partition sketches run on the rayon pool; the output
/// is still ordered by partition id.
pub fn estimate_relation<V: Payload>(
    relation: &PartitionedRelation<V>,
    settings: &EstimatorSettings,
    scope: EstimationScope,
    parallel: bool,
) -> Result<Vec<Histogram<JoinKey>>> {
    settings.validate()?;
    match scope {
        EstimationScope::PerRelation => Ok(vec![estimate_keys(
            relation.iter_tuples().map(|t| t.key),
            settings,
        )?]),
        EstimationScope::PerPartition if parallel => relation
            .partitions()
            .par_iter()
            .map(|p| estimate_keys(p.keys(), settings))
            .collect(),
        EstimationScope::PerPartition => relation
            .partitions()
            .iter()
            .map(|p| estimate_keys(p.keys(), settings))
            .collect(),
    }
}
