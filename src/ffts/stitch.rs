//! Dependency stitching between cache contexts and compute contexts.
//!
//! Runs right after a data context is appended and updates the bookkeeping
//! of the contexts it depends on or gates:
//! - write-back contexts become successors of their producer
//! - invalidate contexts become successors of every consumer
//! - prefetch contexts take a source slot on the compute context they feed

use std::collections::HashSet;

use crate::error::{CtxForgeError, ForgeResult};
use crate::ffts::context::{ContextId, DescriptorList, TaskContext};
use crate::graph::attr::names;
use crate::graph::{Graph, Node, NodeId};

/// A downstream reader of a tensor together with its compute context ids.
///
/// `context_ids` holds one id for manually partitioned consumers and one id
/// per window for auto-threaded consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub node: NodeId,
    pub name: String,
    pub context_ids: Vec<ContextId>,
}

impl Consumer {
    pub fn first_id(&self) -> ContextId {
        self.context_ids[0]
    }

    /// Context of this consumer serving window `window`.
    ///
    /// The consumer must publish a context for every window, laid out as a
    /// contiguous block starting at `first`.
    pub fn window_id(&self, window: usize, owner: &str) -> ForgeResult<ContextId> {
        let Some(&actual) = self.context_ids.get(window) else {
            return Err(CtxForgeError::MissingConsumerWindow {
                node: format!("{} -> {}", owner, self.name),
                window,
                published: self.context_ids.len(),
            });
        };
        let expected = self.first_id().window(window)?;
        if actual != expected {
            return Err(CtxForgeError::WindowLayoutMismatch {
                node: format!("{} -> {}", owner, self.name),
                window,
                expected: expected.raw(),
                actual: actual.raw(),
            });
        }
        Ok(actual)
    }
}

fn id_list(node: &Node, attr: &str) -> Option<Vec<ContextId>> {
    let raw = node.attrs.get_list_int(attr)?;
    let ids: Option<Vec<ContextId>> = raw.iter().map(|&v| ContextId::from_attr(v)).collect();
    ids.filter(|ids| !ids.is_empty())
}

fn single_id(node: &Node) -> Option<Vec<ContextId>> {
    node.attrs
        .get_int(names::CONTEXT_ID)
        .and_then(ContextId::from_attr)
        .map(|id| vec![id])
}

/// Ids of a direct consumer: explicit id first, window list second
fn direct_ids(node: &Node) -> Option<Vec<ContextId>> {
    single_id(node).or_else(|| id_list(node, names::CONTEXT_ID_LIST))
}

/// Ids of a consumer found behind a pass-through node: window list first
fn penetrated_ids(node: &Node) -> Option<Vec<ContextId>> {
    id_list(node, names::CONTEXT_ID_LIST).or_else(|| single_id(node))
}

/// Consumers of output `out_index` of `node`, looking through `_no_task` nodes.
///
/// Consumers without a context id are skipped. Consumers reached twice are
/// reported once.
pub fn discover_consumers(
    graph: &Graph,
    node: NodeId,
    out_index: usize,
) -> ForgeResult<Vec<Consumer>> {
    let mut consumers = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut visited = HashSet::new();
    collect_consumers(
        graph,
        node,
        out_index,
        false,
        &mut visited,
        &mut seen_ids,
        &mut consumers,
    )?;
    Ok(consumers)
}

fn collect_consumers(
    graph: &Graph,
    node: NodeId,
    out_index: usize,
    penetrated: bool,
    visited: &mut HashSet<(NodeId, usize)>,
    seen_ids: &mut HashSet<ContextId>,
    consumers: &mut Vec<Consumer>,
) -> ForgeResult<()> {
    if !visited.insert((node, out_index)) {
        return Ok(());
    }
    for peer in graph.peer_in_anchors(node, out_index) {
        let peer_node = graph.node(peer.node)?;
        if peer_node.is_no_task() {
            tracing::debug!(
                "penetrating no-task node '{}' ({})",
                peer_node.name,
                peer_node.op_type
            );
            for peer_out in 0..peer_node.outputs.len() {
                collect_consumers(graph, peer.node, peer_out, true, visited, seen_ids, consumers)?;
            }
            continue;
        }

        let ids = if penetrated {
            penetrated_ids(peer_node)
        } else {
            direct_ids(peer_node)
        };
        let Some(ids) = ids else {
            tracing::warn!(
                "consumer '{}' has no context id, omitted from successor wiring",
                peer_node.name
            );
            continue;
        };
        if seen_ids.insert(ids[0]) {
            consumers.push(Consumer {
                node: peer.node,
                name: peer_node.name.clone(),
                context_ids: ids,
            });
        }
    }
    Ok(())
}

/// Make `to` a successor of `from`. Already present ids are left alone.
pub fn add_successor(
    list: &mut DescriptorList,
    from: ContextId,
    to: ContextId,
    max_successor_num: usize,
) -> ForgeResult<()> {
    let successors = list.get_mut(from)?.successor_list_mut();
    if successors.contains(&to) {
        return Ok(());
    }
    if successors.len() >= max_successor_num {
        return Err(CtxForgeError::SuccessorListFull {
            context: from,
            limit: max_successor_num,
        });
    }
    successors.push(to);
    Ok(())
}

/// Free source slots on `compute`; fails for context types without a slot table
pub fn source_slot_room(
    list: &DescriptorList,
    compute: ContextId,
    max_prefetch_num: usize,
) -> ForgeResult<usize> {
    match list.get(compute)? {
        TaskContext::Compute(ctx) if ctx.context_type.supports_prefetch() => {
            Ok(max_prefetch_num.saturating_sub(ctx.src_slot.len()))
        }
        other => Err(CtxForgeError::UnsupportedContextType {
            context: compute,
            context_type: other.context_type(),
        }),
    }
}

/// Attach prefetch context `data` to the next source slot of `compute`.
///
/// Returns the source-slot index, which is also the bit set in both
/// prefetch bitmaps.
pub fn register_source_slot(
    list: &mut DescriptorList,
    compute: ContextId,
    data: ContextId,
    max_prefetch_num: usize,
) -> ForgeResult<u32> {
    let ctx = match list.get_mut(compute)? {
        TaskContext::Compute(ctx) if ctx.context_type.supports_prefetch() => ctx,
        other => {
            return Err(CtxForgeError::UnsupportedContextType {
                context: compute,
                context_type: other.context_type(),
            })
        }
    };
    if ctx.src_slot.len() >= max_prefetch_num {
        return Err(CtxForgeError::CapacityExceeded {
            what: "source slot",
            limit: max_prefetch_num,
        });
    }
    let slot = ctx.src_slot.len() as u32;
    ctx.prefetch_enable_bitmap |= 1 << slot;
    ctx.prefetch_once_bitmap |= 1 << slot;
    ctx.src_slot.push(data);
    Ok(slot)
}
