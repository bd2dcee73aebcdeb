//! Dynamic-shape nodes.
//!
//! Shapes are unknown at compile time, so no addressing is computed here.
//! Each selected slot gets one context per window of
//! `_dynamic_context_id_list` and the new ids are recorded on the node for the
//! runtime to patch.

use crate::error::ForgeResult;
use crate::ffts::cache_op::CacheOperation;
use crate::ffts::context::{ContextId, DataContext};
use crate::ffts::report::{OpOutcome, SkipReason};
use crate::ffts::stitch::{add_successor, register_source_slot, source_slot_room};
use crate::graph::attr::names;

use super::{selected_slots, window_context_ids, BuildContext, FanOut};

pub fn prefetch(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    build(ctx, CacheOperation::Prefetch)
}

pub fn invalidate(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    build(ctx, CacheOperation::Invalidate)
}

pub fn write_back(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    build(ctx, CacheOperation::WriteBack)
}

fn build(ctx: &mut BuildContext<'_>, op: CacheOperation) -> ForgeResult<OpOutcome> {
    let mut outcome = OpOutcome::new(op);
    let node = ctx.graph.node(ctx.node)?;
    let slots = selected_slots(node, op, ctx.config);
    if slots.is_empty() {
        return Ok(outcome);
    }

    let windows = window_context_ids(node, names::DYNAMIC_CONTEXT_ID_LIST)?;
    let cap = ctx.config.max_prefetch_num;
    let mut fan_out = FanOut::new(cap);

    for slot in slots {
        if !fan_out.fits(1) {
            outcome.skip(
                slot,
                SkipReason::FanOutCap {
                    needed: 1,
                    remaining: fan_out.remaining(),
                },
            );
            continue;
        }
        if op == CacheOperation::Prefetch {
            let mut room = usize::MAX;
            for &window_ctx in &windows {
                room = room.min(source_slot_room(ctx.list, window_ctx, cap)?);
            }
            if room == 0 {
                outcome.skip(
                    slot,
                    SkipReason::SourceSlotsFull {
                        needed: 1,
                        remaining: 0,
                    },
                );
                continue;
            }
        }

        for (window, &window_ctx) in windows.iter().enumerate() {
            let mut data = DataContext::new(op.context_type(), 1);
            data.thread_id = window as u32;
            let id = ctx.list.push_data(data);
            match op {
                CacheOperation::Prefetch => {
                    register_source_slot(ctx.list, window_ctx, id, cap)?;
                }
                CacheOperation::Invalidate | CacheOperation::WriteBack => {
                    add_successor(ctx.list, window_ctx, id, ctx.config.max_successor_num)?;
                }
            }
            outcome.appended.push(id);
        }
        fan_out.take(1);
    }

    if !outcome.appended.is_empty() {
        record_ids(ctx, op, &outcome.appended)?;
    }
    Ok(outcome)
}

/// Append `ids` to the node's per-operation id list
fn record_ids(ctx: &mut BuildContext<'_>, op: CacheOperation, ids: &[ContextId]) -> ForgeResult<()> {
    let attr = op.info().recorded_ids_attr;
    let node = ctx.graph.node_mut(ctx.node)?;
    let mut recorded: Vec<i64> = node.attrs.get_list_int(attr).map(<[i64]>::to_vec).unwrap_or_default();
    recorded.extend(ids.iter().map(|id| i64::from(id.raw())));
    tracing::debug!("{}: recorded {} id(s) on '{}' as {}", op, ids.len(), node.name, attr);
    node.attrs.set_list_int(attr, recorded);
    Ok(())
}
