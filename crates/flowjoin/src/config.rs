//! Run configuration.
//!
//! Every field has a default, so a config file only names what it changes:
//!
//! ```toml
//! partitions = 8
//! capacity = 64
//! backend = "heap"
//! build_side = "right"
//! skew_threshold = { frequency = 0.01 }
//! ```

use flowjoin_error::{FlowJoinError, Result};
use flowjoin_exec::{EstimationScope, EstimatorSettings, HeavyKeySource};
use flowjoin_sketch::{CounterBackend, SkewThreshold};
use flowjoin_types::RelationSide;
use serde::{Deserialize, Serialize};

/// Default partition count `P`.
pub const DEFAULT_PARTITIONS: usize = 4;
/// Default Space-Saving capacity `k`.
pub const DEFAULT_CAPACITY: usize = 128;

/// Where the input tuples sit when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputLayout {
    /// Partition `p` holds exactly the keys with `key mod P == p`. Checked at
    /// the start of every run.
    #[default]
    HashAligned,
    /// Tuples sit on arbitrary nodes; cold keys are shuffled to `key mod P`.
    NodeLocal,
}

/// Parameters of one Flow-Join run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowJoinConfig {
    pub partitions: usize,
    pub capacity: usize,
    pub skew_threshold: SkewThreshold,
    pub backend: CounterBackend,
    /// Relation whose heavy-keyed tuples are broadcast.
    pub build_side: RelationSide,
    pub heavy_key_source: HeavyKeySource,
    pub estimation_scope: EstimationScope,
    /// Sketch every n-th key. Histogram counts are sample counts, so a
    /// `SkewThreshold::Count` is compared against the sample, not the input.
    pub sample_stride: usize,
    pub input_layout: InputLayout,
    pub parallel: bool,
}

impl Default for FlowJoinConfig {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            capacity: DEFAULT_CAPACITY,
            skew_threshold: SkewThreshold::default(),
            backend: CounterBackend::default(),
            build_side: RelationSide::Left,
            heavy_key_source: HeavyKeySource::default(),
            estimation_scope: EstimationScope::default(),
            sample_stride: 1,
            input_layout: InputLayout::default(),
            parallel: false,
        }
    }
}

impl FlowJoinConfig {
    #[must_use]
    pub const fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_skew_threshold(mut self, threshold: SkewThreshold) -> Self {
        self.skew_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_backend(mut self, backend: CounterBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Select the backend by label (`hash_only`, `heap`, `sorted_array`).
    pub fn with_backend_name(mut self, name: &str) -> Result<Self> {
        self.backend = name.parse()?;
        Ok(self)
    }

    #[must_use]
    pub const fn with_build_side(mut self, side: RelationSide) -> Self {
        self.build_side = side;
        self
    }

    #[must_use]
    pub const fn with_heavy_key_source(mut self, source: HeavyKeySource) -> Self {
        self.heavy_key_source = source;
        self
    }

    #[must_use]
    pub const fn with_estimation_scope(mut self, scope: EstimationScope) -> Self {
        self.estimation_scope = scope;
        self
    }

    #[must_use]
    pub const fn with_sample_stride(mut self, stride: usize) -> Self {
        self.sample_stride = stride;
        self
    }

    #[must_use]
    pub const fn with_input_layout(mut self, layout: InputLayout) -> Self {
        self.input_layout = layout;
        self
    }

    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sketch parameters derived from this config.
    #[must_use]
    pub const fn estimator_settings(&self) -> EstimatorSettings {
        EstimatorSettings::new(self.capacity, self.backend).with_sample_stride(self.sample_stride)
    }

    /// Reject non-positive `P`, `k`, stride, or an out-of-domain threshold.
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(FlowJoinError::InvalidPartitionCount {
                partitions: self.partitions,
            });
        }
        self.estimator_settings().validate()?;
        self.skew_threshold.validate()
    }
}
