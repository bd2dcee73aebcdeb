//! Manually partitioned nodes: one compute context, one data context per
//! addressing record.

use crate::error::ForgeResult;
use crate::ffts::cache_op::{CacheOperation, TensorDirection};
use crate::ffts::context::{ContextId, ContextType, DataContext, DescriptorList};
use crate::ffts::mode::ThreadingMode;
use crate::ffts::report::{OpOutcome, SkipReason};
use crate::ffts::slice_param::{DataParam, SliceRequest};
use crate::ffts::stitch::{add_successor, discover_consumers, register_source_slot, source_slot_room};

use super::{base_address, manual_context_id, selected_slots, BuildContext, FanOut};

/// Append a data context carrying `record` verbatim in both quadruples
fn push_record(
    list: &mut DescriptorList,
    context_type: ContextType,
    pred_cnt: u32,
    record: &DataParam,
    addr_base: u64,
) -> ContextId {
    let mut ctx = DataContext::new(context_type, pred_cnt);
    ctx.addr_base = addr_base;
    ctx.addr_offset = record.base_addr_offset;
    ctx.non_tail = record.quad();
    ctx.tail = record.quad();
    list.push_data(ctx)
}

fn request(slot: usize, direction: TensorDirection, burst_len: u64) -> SliceRequest {
    SliceRequest {
        slot,
        direction,
        burst_len,
        mode: ThreadingMode::Manual,
    }
}

pub fn prefetch(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    let op = CacheOperation::Prefetch;
    let mut outcome = OpOutcome::new(op);
    let node = ctx.graph.node(ctx.node)?;
    let slots = selected_slots(node, op, ctx.config);
    if slots.is_empty() {
        return Ok(outcome);
    }

    let compute = manual_context_id(node)?;
    let cap = ctx.config.max_prefetch_num;
    let mut fan_out = FanOut::new(cap);

    for slot in slots {
        let records = ctx
            .slicer
            .generate(node, &request(slot, TensorDirection::Input, ctx.config.burst_len))?;
        if records.is_empty() {
            outcome.skip(slot, SkipReason::EmptySlice);
            continue;
        }
        if !fan_out.fits(records.len()) {
            outcome.skip(
                slot,
                SkipReason::FanOutCap {
                    needed: records.len(),
                    remaining: fan_out.remaining(),
                },
            );
            continue;
        }
        let room = source_slot_room(ctx.list, compute, cap)?;
        if room < records.len() {
            outcome.skip(
                slot,
                SkipReason::SourceSlotsFull {
                    needed: records.len(),
                    remaining: room,
                },
            );
            continue;
        }
        let addr_base = base_address(node, TensorDirection::Input, slot)?;

        for record in &records {
            let id = push_record(ctx.list, op.context_type(), 1, record, addr_base);
            let src_slot = register_source_slot(ctx.list, compute, id, cap)?;
            tracing::debug!(
                "prefetch {} for '{}' input {} -> src slot {} of {}",
                id,
                node.name,
                slot,
                src_slot,
                compute
            );
            outcome.appended.push(id);
        }
        fan_out.take(records.len());
    }
    Ok(outcome)
}

pub fn invalidate(ctx: &mut BuildContext<'_>) -> ForgeResult<OpOutcome> {
    let op = CacheOperation::Invalidate;
    let mut outcome = OpOutcome::new(op);
    let node = ctx.graph.node(ctx.node)?;
    let slots = selected_slots(node, op, ctx.config);
    let mut fan_out = FanOut::new(ctx.config.max_prefetch_num);

    for slot in slots {
        let consumers = discover_consumers(ctx.graph, ctx.node, slot)?;
        if consumers.is_empty() {
            outcome.skip(slot, SkipReason::NoConsumers);
            continue;
        }
        let records = ctx
            .slicer
            .generate(node, &request(slot, TensorDirection::Output, ctx.config.burst_len))?;
        if records.is_empty() {
            outcome.skip(slot, SkipReason::EmptySlice);
            continue;
        }
        if !fan_out.fits(records.len()) {
            outcome.skip(
                slot,
                SkipReason::FanOutCap {
                    needed: records.len(),
                    remaining: fan_out.remaining(),
                },
            );
            continue;
        }
        let addr_base = base_address(node, TensorDirection::Output, slot)?;

        let pred_cnt = consumers.len() as u32;
        for record in &records {
            let id = push_record(ctx.list, op.context_type(), pred_cnt, record, addr_base);
            for consumer in &consumers {
                add_successor(
                    ctx.list,
                    consumer.first_id(),
                    id,
                    ctx.config.max_successor_num,
                )?;
            }
            outcome.appended.push(id);
        }
        fan_out.take(records.len());
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

    let producer = manual_context_id(node)?;
    let mut fan_out = FanOut::new(ctx.config.max_prefetch_num);

    for slot in slots {
        let records = ctx
            .slicer
            .generate(node, &request(slot, TensorDirection::Output, ctx.config.burst_len))?;
        if records.is_empty() {
            outcome.skip(slot, SkipReason::EmptySlice);
            continue;
        }
        if !fan_out.fits(records.len()) {
            outcome.skip(
                slot,
                SkipReason::FanOutCap {
                    needed: records.len(),
                    remaining: fan_out.remaining(),
                },
            );
            continue;
        }
        let addr_base = base_address(node, TensorDirection::Output, slot)?;

        for record in &records {
            let id = push_record(ctx.list, op.context_type(), 1, record, addr_base);
            add_successor(ctx.list, producer, id, ctx.config.max_successor_num)?;
            outcome.appended.push(id);
        }
        fan_out.take(records.len());
    }
    Ok(outcome)
}
