//! Structured Flow-Join telemetry.
//!
//! The pipeline reports progress through an observer passed in by the caller,
//! never through global state. Follows the zero-cost observer pattern: a trait
//! with a no-op implementation the compiler elides entirely when unused.
//!
//! # Conformance rules
//!
//! 1. Every [`FlowJoinEvent`] variant carries `elapsed_ns` since run start.
//! 2. All events implement `serde::Serialize` for JSON export.
//! 3. Observers MUST NOT block or perform I/O on the calling thread beyond
//!    what the `tracing` subscriber does.

use serde::Serialize;
use tracing::{debug, info};

use flowjoin_sketch::CounterBackend;
use flowjoin_types::JoinRole;

// ---------------------------------------------------------------------------
// Telemetry event schema
// ---------------------------------------------------------------------------

/// Structured event emitted at each pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FlowJoinEvent {
    /// A histogram was produced for one partition (or one whole relation).
    PartitionEstimated {
        role: JoinRole,
        /// Histogram slot: partition id, or 0 for per-relation estimation.
        slot: usize,
        backend: CounterBackend,
        /// Keys consumed by the sketch (after sampling).
        observed: u64,
        tracked: usize,
        error_bound: u64,
        elapsed_ns: u64,
    },

    /// The detection barrier passed and the heavy-key set is read-only.
    HeavyKeysPublished {
        build_heavy: usize,
        probe_heavy: usize,
        /// Keys whose build tuples will be broadcast.
        broadcast_keys: usize,
        elapsed_ns: u64,
    },

    /// One partition after redistribution.
    PartitionRedistributed {
        partition: usize,
        build_before: usize,
        build_after: usize,
        probe_after: usize,
        elapsed_ns: u64,
    },

    /// One partition's local join finished.
    PartitionJoined {
        partition: usize,
        build_rows: usize,
        probe_rows: usize,
        matches: usize,
        elapsed_ns: u64,
    },

    /// The whole run finished.
    RunCompleted {
        result_rows: usize,
        duplicates_collapsed: usize,
        build_sent: usize,
        probe_sent: usize,
        elapsed_ns: u64,
    },
}

impl FlowJoinEvent {
    /// Nanoseconds since the run started.
    #[must_use]
    pub fn elapsed_ns(&self) -> u64 {
        match self {
            Self::PartitionEstimated { elapsed_ns, .. }
            | Self::HeavyKeysPublished { elapsed_ns, .. }
            | Self::PartitionRedistributed { elapsed_ns, .. }
            | Self::PartitionJoined { elapsed_ns, .. }
            | Self::RunCompleted { elapsed_ns, .. } => *elapsed_ns,
        }
    }

    /// Short classification label for this event kind.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::PartitionEstimated { .. } => "partition_estimated",
            Self::HeavyKeysPublished { .. } => "heavy_keys_published",
            Self::PartitionRedistributed { .. } => "partition_redistributed",
            Self::PartitionJoined { .. } => "partition_joined",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

// ---------------------------------------------------------------------------
// Observer trait
// ---------------------------------------------------------------------------

/// Receiver of [`FlowJoinEvent`]s.
pub trait FlowJoinObserver: Send + Sync {
    fn on_event(&self, event: &FlowJoinEvent);
}

/// Observer that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl FlowJoinObserver for NoOpObserver {
    #[inline]
    fn on_event(&self, _event: &FlowJoinEvent) {}
}

/// Forwards events to `tracing`; the run summary at `info`, the rest at
/// `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl FlowJoinObserver for TracingObserver {
    fn on_event(&self, event: &FlowJoinEvent) {
        match event {
            FlowJoinEvent::RunCompleted {
                result_rows,
                duplicates_collapsed,
                build_sent,
                probe_sent,
                elapsed_ns,
            } => info!(
                target: "flowjoin::telemetry",
                result_rows,
                duplicates_collapsed,
                build_sent,
                probe_sent,
                elapsed_ns,
                "flow-join run completed"
            ),
            other => debug!(
                target: "flowjoin::telemetry",
                kind = other.kind_str(),
                elapsed_ns = other.elapsed_ns(),
                event = ?other,
                "flow-join event"
            ),
        }
    }
}

/// Ring-buffer observer that stores the last N events for inspection.
pub struct ObserverRingBuffer {
    events: parking_lot::Mutex<RingBufferInner>,
}

struct RingBufferInner {
    buf: Vec<FlowJoinEvent>,
    capacity: usize,
    write_pos: usize,
    count: usize,
}

impl ObserverRingBuffer {
    /// Create a ring buffer holding at most `capacity` events. A zero
    /// capacity buffer discards everything.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: parking_lot::Mutex::new(RingBufferInner {
                buf: Vec::with_capacity(capacity),
                capacity,
                write_pos: 0,
                count: 0,
            }),
        }
    }

    /// Copy of the stored events in chronological order.
    #[must_use]
    pub fn drain(&self) -> Vec<FlowJoinEvent> {
        let inner = self.events.lock();
        let n = inner.count.min(inner.capacity);
        let mut result = Vec::with_capacity(n);
        if n == 0 {
            return result;
        }
        let start = if inner.count >= inner.capacity {
            inner.write_pos
        } else {
            0
        };
        for i in 0..n {
            result.push(inner.buf[(start + i) % inner.capacity].clone());
        }
        result
    }

    /// Total events ever observed, including overwritten ones.
    #[must_use]
    pub fn total_observed(&self) -> usize {
        self.events.lock().count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.events.lock();
        inner.count.min(inner.capacity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FlowJoinObserver for ObserverRingBuffer {
    fn on_event(&self, event: &FlowJoinEvent) {
        let mut inner = self.events.lock();
        inner.count += 1;
        if inner.capacity == 0 {
            return;
        }
        let pos = inner.write_pos;
        if inner.buf.len() < inner.capacity {
            inner.buf.push(event.clone());
        } else {
            inner.buf[pos] = event.clone();
        }
        inner.write_pos = (pos + 1) % inner.capacity;
    }
}

impl std::fmt::Debug for ObserverRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRingBuffer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
