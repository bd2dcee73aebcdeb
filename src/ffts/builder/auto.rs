//! Auto-threaded nodes.
//!
//! The node runs as `slice_instance_num` threads spread over a block of
//! parallel windows, one compute context per window listed in
//! `_context_id_list`. Each selected slot yields one data context per window.
//! The context carries the non-tail and tail templates and the hardware
//! derives each thread's address from `addr_offset * thread_id`.

use crate::error::{CtxForgeError, ForgeResult};
use crate::ffts::cache_op::{CacheOperation, TensorDirection};
use crate::ffts::context::{ContextId, DataContext, DescriptorList};
use crate::ffts::mode::ThreadingMode;
use crate::ffts::report::{OpOutcome, SkipReason};
use crate::ffts::slice_param::{DataParam, SliceRequest};
use crate::ffts::stitch::{add_successor, discover_consumers, register_source_slot, source_slot_room};
use crate::graph::attr::names;
use crate::graph::Node;

use super::{base_address, selected_slots, window_context_ids, BuildContext, FanOut};

/// Fill the threading fields of a window context from its templates.
///
/// With a single thread, or without a tail template, only the thread id is
/// set and both quadruples stay empty.
pub fn fill_auto_threading(
    ctx: &mut DataContext,
    templates: &[DataParam],
    slice_instance_num: usize,
    window: usize,
) {
    ctx.thread_id = window as u32;
    let [head, tail] = templates else {
        return;
    };
    if slice_instance_num <= 1 {
        return;
    }
    ctx.aten = true;
    ctx.thread_dim = slice_instance_num as u32;
    ctx.addr_offset = tail.base_addr_offset / (slice_instance_num as u64 - 1);
    ctx.non_tail = head.quad();
    ctx.tail = tail.quad();
}

struct AutoSlot {
    templates: Vec<DataParam>,
    addr_base: u64,
}

fn thread_count(node: &Node) -> ForgeResult<usize> {
    node.slice_info
        .as_ref()
        .map(|info| info.slice_instance_num)
        .ok_or_else(|| CtxForgeError::MissingThreadSlice(node.name.clone()))
}

fn prepare_slot(
    ctx: &BuildContext<'_>,
    node: &Node,
    slot: usize,
    direction: TensorDirection,
) -> ForgeResult<AutoSlot> {
    let request = SliceRequest {
        slot,
        direction,
        burst_len: ctx.config.burst_len,
        mode: ThreadingMode::Auto,
    };
    let templates = ctx.slicer.generate(node, &request)?;
    let addr_base = base_address(node, direction, slot)?;
    Ok(AutoSlot {
        templates,
        addr_base,
    })
}

fn push_window(
    list: &mut DescriptorList,
    op: CacheOperation,
    pred_cnt: u32,
    prepared: &AutoSlot,
    threads: usize,
    window: usize,
) -> ContextId {
    let mut data = DataContext::new(op.context_type(), pred_cnt);
    data.addr_base = prepared.addr_base;
    fill_auto_threading(&mut data, &prepared.templates, threads, window);
    list.push_data(data)
}

pub fn prefetch(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    let op = CacheOperation::Prefetch;
    let mut outcome = OpOutcome::new(op);
    let node = ctx.graph.node(ctx.node)?;
    let slots = selected_slots(node, op, ctx.config);
    if slots.is_empty() {
        return Ok(outcome);
    }

    let windows = window_context_ids(node, names::CONTEXT_ID_LIST)?;
    let threads = thread_count(node)?;
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
        let prepared = prepare_slot(ctx, node, slot, TensorDirection::Input)?;
        if prepared.templates.is_empty() {
            outcome.skip(slot, SkipReason::EmptySlice);
            continue;
        }

        for (window, &window_ctx) in windows.iter().enumerate() {
            let id = push_window(ctx.list, op, 1, &prepared, threads, window);
            register_source_slot(ctx.list, window_ctx, id, cap)?;
            outcome.appended.push(id);
        }
        fan_out.take(1);
    }
    Ok(outcome)
}

pub fn invalidate(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    let op = CacheOperation::Invalidate;
    let mut outcome = OpOutcome::new(op);
    let node = ctx.graph.node(ctx.node)?;
    let slots = selected_slots(node, op, ctx.config);
    if slots.is_empty() {
        return Ok(outcome);
    }

    let windows = window_context_ids(node, names::CONTEXT_ID_LIST)?;
    let threads = thread_count(node)?;
    let mut fan_out = FanOut::new(ctx.config.max_prefetch_num);

    for slot in slots {
        let consumers = discover_consumers(ctx.graph, ctx.node, slot)?;
        if consumers.is_empty() {
            outcome.skip(slot, SkipReason::NoConsumers);
            continue;
        }
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
        // Resolve every window's consumer ids before touching the list
        let mut gates: Vec<Vec<ContextId>> = Vec::with_capacity(windows.len());
        for window in 0..windows.len() {
            let ids = consumers
                .iter()
                .map(|c| c.window_id(window, &node.name))
                .collect::<ForgeResult<Vec<_>>>()?;
            gates.push(ids);
        }
        let prepared = prepare_slot(ctx, node, slot, TensorDirection::Output)?;
        if prepared.templates.is_empty() {
            outcome.skip(slot, SkipReason::EmptySlice);
            continue;
        }

        let pred_cnt = consumers.len() as u32;
        for (window, consumer_ids) in gates.iter().enumerate() {
            let id = push_window(ctx.list, op, pred_cnt, &prepared, threads, window);
            for &consumer in consumer_ids {
                add_successor(ctx.list, consumer, id, ctx.config.max_successor_num)?;
            }
            outcome.appended.push(id);
        }
        fan_out.take(1);
    }
    Ok(outcome)
}

pub fn write_back(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    let op = CacheOperation::WriteBack;
    let mut outcome = OpOutcome::new(op);
    let node = ctx.graph.node(ctx.node)?;
    let slots = selected_slots(node, op, ctx.config);
    if slots.is_empty() {
        return Ok(outcome);
    }

    let windows = window_context_ids(node, names::CONTEXT_ID_LIST)?;
    let threads = thread_count(node)?;
    let mut fan_out = FanOut::new(ctx.config.max_prefetch_num);

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
        let prepared = prepare_slot(ctx, node, slot, TensorDirection::Output)?;
        if prepared.templates.is_empty() {
            outcome.skip(slot, SkipReason::EmptySlice);
            continue;
        }

        for (window, &window_ctx) in windows.iter().enumerate() {
            let id = push_window(ctx.list, op, 1, &prepared, threads, window);
            add_successor(ctx.list, window_ctx, id, ctx.config.max_successor_num)?;
            outcome.appended.push(id);
        }
        fan_out.take(1);
    }
    Ok(outcome)
}
