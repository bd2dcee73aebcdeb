//! Write-back generation and whole-node ordering

mod common;

use common::*;
use ctxforge::ffts::{CacheOperation, CacheTaskConfig, ContextType, TaskContext};
use ctxforge::graph::attr::names;

#[test]
fn test_write_back_follows_producer() {
    let mut sg = Subgraph::new();
    let (node, aic) = sg.manual("conv", vec![f16(&[128])], vec![f16(&[128])], ContextType::AicAiv);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    let ids = &report.write_back.appended;
    assert_eq!(ids.len(), 1);
    let wb = sg.list.data(ids[0]).unwrap();
    assert_eq!(wb.context_type, ContextType::WriteBackData);
    assert_eq!(wb.pred_cnt, 1);
    assert_eq!(wb.addr_base, addr_of(node, 0, true) as u64);
    assert_eq!(wb.non_tail.len_inner, 256);
    assert_eq!(sg.list.get(aic).unwrap().successor_list(), &[ids[0]]);
}

#[test]
fn test_write_back_bursts_all_follow_producer() {
    let mut sg = Subgraph::new();
    let (node, aic) = sg.manual(
        "conv",
        vec![f16(&[128])],
        vec![f16(&[1000])],
        ContextType::AicAiv,
    );
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);

    let config = CacheTaskConfig::default().with_burst_len(800);
    let report = generator_with(config)
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    let ids = report.write_back.appended.clone();
    assert_eq!(ids.len(), 3);
    assert_eq!(sg.list.get(aic).unwrap().successor_list(), ids.as_slice());
    let lens: Vec<u32> = ids
        .iter()
        .map(|&id| sg.list.data(id).unwrap().non_tail.len_inner)
        .collect();
    assert_eq!(lens, vec![800, 800, 400]);
}

#[test]
fn test_write_back_on_non_prefetch_context_is_allowed() {
    let mut sg = Subgraph::new();
    let (node, ai_cpu) = sg.manual("cpu_op", vec![f16(&[16])], vec![f16(&[16])], ContextType::AiCpu);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();
    assert_eq!(report.write_back.appended.len(), 1);
    assert_eq!(sg.list.get(ai_cpu).unwrap().successor_list().len(), 1);
}

#[test]
fn test_operations_append_in_fixed_order() {
    let mut sg = Subgraph::new();
    let (node, aic) = sg.manual("conv", vec![f16(&[64])], vec![f16(&[64])], ContextType::AicAiv);
    let (next, _) = sg.manual("next", vec![f16(&[64])], vec![f16(&[64])], ContextType::AicAiv);
    sg.connect(node, 0, next, 0);
    sg.set_bitmap(node, names::PREFETCH_ENABLE_BM, 0b1);
    sg.set_bitmap(node, names::INVALIDATE_BM, 0b1);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);

    let start = sg.list.len() as u32;
    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    assert_eq!(report.total_appended(), 3);
    for (offset, op) in CacheOperation::ALL.iter().enumerate() {
        let outcome = report.outcome(*op);
        assert_eq!(outcome.appended[0].raw(), start + offset as u32);
        let data = sg.list.data(outcome.appended[0]).unwrap();
        assert_eq!(data.context_type, op.context_type());
    }
    // the producer gates only its write-back
    assert_eq!(
        sg.list.get(aic).unwrap().successor_list(),
        &report.write_back.appended[..]
    );
    assert!(matches!(sg.list.get(aic).unwrap(), TaskContext::Compute(c) if c.src_slot.len() == 1));
}
