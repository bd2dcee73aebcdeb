//! Outcome bookkeeping for cache-context generation.

use std::fmt;

use crate::ffts::cache_op::CacheOperation;
use crate::ffts::context::ContextId;
use crate::ffts::mode::ThreadingMode;

/// Why a selected slot produced no contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The node's fan-out cap would be exceeded
    FanOutCap { needed: usize, remaining: usize },
    /// The fed compute context has too few free source slots
    SourceSlotsFull { needed: usize, remaining: usize },
    /// Nobody reads the tensor, so there is nothing to wait for
    NoConsumers,
    /// The slice generator produced no records
    EmptySlice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedSlot {
    pub slot: usize,
    pub reason: SkipReason,
}

/// Contexts appended and slots skipped by one builder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub op: CacheOperation,
    pub appended: Vec<ContextId>,
    pub skipped: Vec<SkippedSlot>,
}

impl OpOutcome {
    pub fn new(op: CacheOperation) -> Self {
        Self {
            op,
            appended: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn skip(&mut self, slot: usize, reason: SkipReason) {
        tracing::warn!("{}: slot {} skipped ({:?})", self.op, slot, reason);
        self.skipped.push(SkippedSlot { slot, reason });
    }

    pub fn is_empty(&self) -> bool {
        self.appended.is_empty()
    }
}

/// Result of generating every cache operation for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGenReport {
    pub node: String,
    pub mode: ThreadingMode,
    pub prefetch: OpOutcome,
    pub invalidate: OpOutcome,
    pub write_back: OpOutcome,
}

impl CacheGenReport {
    pub fn outcome(&self, op: CacheOperation) -> &OpOutcome {
        match op {
            CacheOperation::Prefetch => &self.prefetch,
            CacheOperation::Invalidate => &self.invalidate,
            CacheOperation::WriteBack => &self.write_back,
        }
    }

    pub fn total_appended(&self) -> usize {
        self.prefetch.appended.len() + self.invalidate.appended.len() + self.write_back.appended.len()
    }

    pub fn total_skipped(&self) -> usize {
        self.prefetch.skipped.len() + self.invalidate.skipped.len() + self.write_back.skipped.len()
    }
}

impl fmt::Display for CacheGenReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): prefetch={}, invalidate={}, write_back={}, skipped={}",
            self.node,
            self.mode,
            self.prefetch.appended.len(),
            self.invalidate.appended.len(),
            self.write_back.appended.len(),
            self.total_skipped()
        )
    }
}

/// Aggregate over a graph-level pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphReport {
    pub nodes: Vec<CacheGenReport>,
}

impl GraphReport {
    pub fn total_appended(&self) -> usize {
        self.nodes.iter().map(|n| n.total_appended()).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.nodes.iter().map(|n| n.total_skipped()).sum()
    }

    pub fn node(&self, name: &str) -> Option<&CacheGenReport> {
        self.nodes.iter().find(|n| n.node == name)
    }
}

impl fmt::Display for GraphReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GraphReport: nodes={}, contexts={}, skipped slots={}",
            self.nodes.len(),
            self.total_appended(),
            self.total_skipped()
        )
    }
}
