//! Cache-operation builders.
//!
//! Every `(CacheOperation, ThreadingMode)` pair maps to one builder function
//! through [`builder_for`]. The match is exhaustive, so there is no cell that
//! quietly succeeds without doing its work.
//!
//! The helpers in this module form the skeleton the builders share: slot
//! selection from the enable bitmap, the per-node fan-out cap, base-address
//! lookup and context-id lookup.

pub mod auto;
pub mod dynamic;
pub mod manual;

use crate::error::{check_index, missing_attr, ForgeResult};
use crate::ffts::cache_op::{CacheOperation, TensorDirection};
use crate::ffts::config::CacheTaskConfig;
use crate::ffts::context::{ContextId, DescriptorList};
use crate::ffts::mode::ThreadingMode;
use crate::ffts::report::OpOutcome;
use crate::ffts::slice_param::SliceParamGenerator;
use crate::graph::attr::names;
use crate::graph::{Graph, Node, NodeId};

/// Everything a builder reads or writes for one node
pub struct BuildContext<'a> {
    pub graph: &'a mut Graph,
    pub node: NodeId,
    pub list: &'a mut DescriptorList,
    pub slicer: &'a dyn SliceParamGenerator,
    pub config: &'a CacheTaskConfig,
}

pub type BuildFn = fn(&mut BuildContext<'_>) -> ForgeResult<OpOutcome>;

pub fn builder_for(op: CacheOperation, mode: ThreadingMode) -> BuildFn {
    match (op, mode) {
        (CacheOperation::Prefetch, ThreadingMode::Manual) => manual::prefetch,
        (CacheOperation::Invalidate, ThreadingMode::Manual) => manual::invalidate,
        (CacheOperation::WriteBack, ThreadingMode::Manual) => manual::write_back,
        (CacheOperation::Prefetch, ThreadingMode::Auto) => auto::prefetch,
        (CacheOperation::Invalidate, ThreadingMode::Auto) => auto::invalidate,
        (CacheOperation::WriteBack, ThreadingMode::Auto) => auto::write_back,
        (CacheOperation::Prefetch, ThreadingMode::Dynamic) => dynamic::prefetch,
        (CacheOperation::Invalidate, ThreadingMode::Dynamic) => dynamic::invalidate,
        (CacheOperation::WriteBack, ThreadingMode::Dynamic) => dynamic::write_back,
    }
}

/// Slots whose bit is set in the operation's enable bitmap.
///
/// An absent or zero bitmap selects nothing. Bits at or above the anchor
/// count or `max_slot_num` are ignored.
pub fn selected_slots(node: &Node, op: CacheOperation, config: &CacheTaskConfig) -> Vec<usize> {
    let bitmap = match node.attrs.get_int(op.info().bitmap_attr) {
        Some(bm) if bm != 0 => bm as u64,
        _ => return Vec::new(),
    };
    let anchors = match op.direction() {
        TensorDirection::Input => node.inputs.len(),
        TensorDirection::Output => node.outputs.len(),
    };
    let limit = anchors.min(config.max_slot_num).min(64);
    let slots: Vec<usize> = (0..limit).filter(|&i| bitmap & (1u64 << i) != 0).collect();

    let ignored = bitmap.count_ones() as usize - slots.len();
    if ignored > 0 {
        tracing::debug!(
            "{}: node '{}' bitmap {:#x} has {} bit(s) beyond {} usable slot(s)",
            op,
            node.name,
            bitmap,
            ignored,
            limit
        );
    }
    slots
}

/// Base address recorded for slot `slot` on the given side of the node
pub fn base_address(node: &Node, direction: TensorDirection, slot: usize) -> ForgeResult<u64> {
    let (attr, what) = match direction {
        TensorDirection::Input => (names::INPUT_ADDRS, "input slot"),
        TensorDirection::Output => (names::OUTPUT_ADDRS, "output slot"),
    };
    let addrs = node
        .attrs
        .get_list_int(attr)
        .ok_or_else(|| missing_attr(&node.name, attr))?;
    check_index(what, slot, addrs.len())?;
    Ok(addrs[slot] as u64)
}

/// Compute context of a manually partitioned node
pub fn manual_context_id(node: &Node) -> ForgeResult<ContextId> {
    node.attrs
        .get_int(names::CONTEXT_ID)
        .and_then(ContextId::from_attr)
        .ok_or_else(|| missing_attr(&node.name, names::CONTEXT_ID))
}

/// Per-window context ids stored in `attr`; an empty list counts as absent
pub fn window_context_ids(node: &Node, attr: &'static str) -> ForgeResult<Vec<ContextId>> {
    let raw = node
        .attrs
        .get_list_int(attr)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| missing_attr(&node.name, attr))?;
    raw.iter()
        .map(|&v| ContextId::from_attr(v).ok_or_else(|| missing_attr(&node.name, attr)))
        .collect()
}

/// Running count of contexts one (node, operation) has created
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    used: usize,
    cap: usize,
}

impl FanOut {
    pub fn new(cap: usize) -> Self {
        Self { used: 0, cap }
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.used)
    }

    pub fn fits(&self, count: usize) -> bool {
        count <= self.remaining()
    }

    pub fn take(&mut self, count: usize) {
        self.used += count;
    }
}
