//! Global heavy-hitter detection.
//!
//! Histograms from every partition of both relations are folded into one
//! detector. A key is globally heavy for a side if it passes the threshold in
//! *any* of that side's histograms (union, never intersection). Publishing the
//! result is the synchronization barrier of the pipeline: it fails until every
//! expected histogram has been folded, and the published [`HeavyKeySet`] is
//! immutable.
//!
//! Detection inherits the sketch's approximation: a key whose true count is
//! just above the threshold may be missed only within the histogram's error
//! bound. Missing a heavy key never loses join results, it only forfeits the
//! load-balancing benefit for that key.

use std::collections::BTreeSet;

use flowjoin_error::{FlowJoinError, Result};
use flowjoin_sketch::{Histogram, SkewThreshold};
use flowjoin_types::{JoinKey, JoinRole};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which side's heavy keys trigger a build-side broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeavyKeySource {
    Build,
    Probe,
    /// Union of both sides.
    #[default]
    Both,
}

/// Union of the keys that pass `threshold` in any of `histograms`.
pub fn detect_heavy_keys<'a, I>(histograms: I, threshold: SkewThreshold) -> BTreeSet<JoinKey>
where
    I: IntoIterator<Item = &'a Histogram<JoinKey>>,
{
    histograms
        .into_iter()
        .flat_map(|h| h.heavy_keys(threshold))
        .collect()
}

/// Published, read-only heavy keys of both relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeavyKeySet {
    build: BTreeSet<JoinKey>,
    probe: BTreeSet<JoinKey>,
}

impl HeavyKeySet {
    /// Heavy-key set supplied directly by the caller.
    #[must_use]
    pub const fn from_keys(build: BTreeSet<JoinKey>, probe: BTreeSet<JoinKey>) -> Self {
        Self { build, probe }
    }

    #[must_use]
    pub const fn build(&self) -> &BTreeSet<JoinKey> {
        &self.build
    }

    #[must_use]
    pub const fn probe(&self) -> &BTreeSet<JoinKey> {
        &self.probe
    }

    #[must_use]
    pub const fn side(&self, role: JoinRole) -> &BTreeSet<JoinKey> {
        match role {
            JoinRole::Build => &self.build,
            JoinRole::Probe => &self.probe,
        }
    }

    /// Keys whose build tuples get broadcast.
    #[must_use]
    pub fn broadcast_keys(&self, source: HeavyKeySource) -> BTreeSet<JoinKey> {
        match source {
            HeavyKeySource::Build => self.build.clone(),
            HeavyKeySource::Probe => self.probe.clone(),
            HeavyKeySource::Both => self.build.union(&self.probe).copied().collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.probe.is_empty()
    }
}

#[derive(Debug, Clone)]
struct SideFold {
    heavy: BTreeSet<JoinKey>,
    folded: Vec<bool>,
}

impl SideFold {
    fn new(expected: usize) -> Self {
        Self {
            heavy: BTreeSet::new(),
            folded: vec![false; expected],
        }
    }

    fn folded_count(&self) -> usize {
        self.folded.iter().filter(|f| **f).count()
    }
}

/// Accumulates histograms until every partition of both sides is in.
#[derive(Debug, Clone)]
pub struct HeavyHitterDetector {
    threshold: SkewThreshold,
    build: SideFold,
    probe: SideFold,
}

impl HeavyHitterDetector {
    /// Detector expecting `histograms_per_side` histograms for each relation.
    ///
    /// # Errors
    ///
    /// Invalid thresholds, or zero expected histograms.
    pub fn new(threshold: SkewThreshold, histograms_per_side: usize) -> Result<Self> {
        threshold.validate()?;
        if histograms_per_side == 0 {
            return Err(FlowJoinError::InvalidPartitionCount {
                partitions: histograms_per_side,
            });
        }
        Ok(Self {
            threshold,
            build: SideFold::new(histograms_per_side),
            probe: SideFold::new(histograms_per_side),
        })
    }

    #[must_use]
    pub const fn threshold(&self) -> SkewThreshold {
        self.threshold
    }

    fn side_mut(&mut self, role: JoinRole) -> &mut SideFold {
        match role {
            JoinRole::Build => &mut self.build,
            JoinRole::Probe => &mut self.probe,
        }
    }

    /// Fold the histogram of `role`'s slot `slot` into the global set.
    ///
    /// Returns how many keys became heavy because of this histogram.
    ///
    /// # Errors
    ///
    /// [`FlowJoinError::UnexpectedHistogram`] if the slot is out of range or
    /// was already folded.
    pub fn fold(
        &mut self,
        role: JoinRole,
        slot: usize,
        histogram: &Histogram<JoinKey>,
    ) -> Result<usize> {
        let threshold = self.threshold;
        let side = self.side_mut(role);
        match side.folded.get_mut(slot) {
            Some(done) if !*done => *done = true,
            _ => {
                return Err(FlowJoinError::UnexpectedHistogram {
                    side: role.as_str(),
                    partition: slot,
                });
            }
        }
        let before = side.heavy.len();
        side.heavy.extend(histogram.heavy_keys(threshold));
        let added = side.heavy.len() - before;
        debug!(
            role = role.as_str(),
            slot,
            observed = histogram.observed(),
            error_bound = histogram.error_bound(),
            added,
            "histogram folded into heavy-key set"
        );
        Ok(added)
    }

    /// Whether every expected histogram of both sides has been folded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.build.folded.iter().all(|f| *f) && self.probe.folded.iter().all(|f| *f)
    }

    /// Publish the global heavy-key set.
    ///
    /// # Errors
    ///
    /// [`FlowJoinError::IncompleteDetection`] naming the first side that is
    /// still missing histograms.
    pub fn publish(self) -> Result<HeavyKeySet> {
        for (role, side) in [(JoinRole::Build, &self.build), (JoinRole::Probe, &self.probe)] {
            let folded = side.folded_count();
            if folded != side.folded.len() {
                return Err(FlowJoinError::IncompleteDetection {
                    side: role.as_str(),
                    folded,
                    expected: side.folded.len(),
                });
            }
        }
        Ok(HeavyKeySet {
            build: self.build.heavy,
            probe: self.probe.heavy,
        })
    }
}
