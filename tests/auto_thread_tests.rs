//! Auto-threaded nodes: window contexts and shared templates

mod common;

use common::*;
use ctxforge::ffts::{ContextType, SkipReason};
use ctxforge::graph::attr::names;
use ctxforge::graph::DType;
use ctxforge::graph::{DimRange, TensorDesc, ThreadMode, ThreadSliceMap};
use ctxforge::CtxForgeError;

#[test]
fn test_reference_workload_prefetch_per_window() {
    let mut sg = Subgraph::new();
    let (node, windows) = sg.auto(
        "conv",
        vec![f16(&REFERENCE_SHAPE)],
        vec![f16(&REFERENCE_SHAPE)],
        4,
    );
    sg.set_bitmap(node, names::PREFETCH_ENABLE_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    let ids = &report.prefetch.appended;
    assert_eq!(ids.len(), 4);
    for (w, (&id, &window)) in ids.iter().zip(&windows).enumerate() {
        let data = sg.list.data(id).unwrap();
        assert_eq!(data.context_type, ContextType::FlushData);
        assert!(data.aten);
        assert_eq!(data.thread_dim, 4);
        assert_eq!(data.thread_id, w as u32);
        assert_eq!(data.addr_offset, REFERENCE_THREAD_BYTES as u64);
        assert_eq!(data.addr_base, addr_of(node, 0, false) as u64);
        assert_eq!(data.non_tail.len_inner, REFERENCE_THREAD_BYTES);
        assert_eq!(data.tail.len_inner, REFERENCE_THREAD_BYTES);

        let compute = sg.list.compute(window).unwrap();
        assert_eq!(compute.src_slot, vec![id]);
        assert_eq!(compute.prefetch_enable_bitmap, 0b1);
    }
}

#[test]
fn test_uneven_split_has_short_tail() {
    let mut sg = Subgraph::new();
    let desc = TensorDesc::new(vec![10, 16], DType::Float32);
    let (node, _) = sg.auto("gemm", vec![desc.clone()], vec![desc], 3);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    let data = sg.list.data(report.write_back.appended[2]).unwrap();
    // rows 0..4 in the head window, rows 8..10 in the tail window
    assert_eq!(data.non_tail.len_inner, 4 * 16 * 4);
    assert_eq!(data.tail.len_inner, 2 * 16 * 4);
    assert_eq!(data.addr_offset, 256);
    assert_eq!(data.thread_id, 2);
}

#[test]
fn test_invalidate_is_gated_by_matching_consumer_window() {
    let mut sg = Subgraph::new();
    let (producer, _) = sg.auto("producer", vec![f16(&[64])], vec![f16(&[64])], 4);
    let (consumer, consumer_windows) = sg.auto("consumer", vec![f16(&[64])], vec![f16(&[64])], 4);
    sg.connect(producer, 0, consumer, 0);
    sg.set_bitmap(producer, names::INVALIDATE_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, producer)
        .unwrap();

    let ids = &report.invalidate.appended;
    assert_eq!(ids.len(), 4);
    for (w, &id) in ids.iter().enumerate() {
        assert_eq!(sg.list.data(id).unwrap().pred_cnt, 1);
        assert_eq!(
            sg.list.get(consumer_windows[w]).unwrap().successor_list(),
            &[id]
        );
    }
}

#[test]
fn test_non_contiguous_consumer_windows_fail() {
    let mut sg = Subgraph::new();
    let (producer, _) = sg.auto("producer", vec![f16(&[64])], vec![f16(&[64])], 4);
    let (consumer, w) = sg.auto("consumer", vec![f16(&[64])], vec![f16(&[64])], 4);
    sg.connect(producer, 0, consumer, 0);
    sg.set_bitmap(producer, names::INVALIDATE_BM, 0b1);
    sg.graph.node_mut(consumer).unwrap().attrs.set_list_int(
        names::CONTEXT_ID_LIST,
        vec![w[0].raw() as i64, w[1].raw() as i64, w[3].raw() as i64, w[2].raw() as i64],
    );

    let before = sg.list.len();
    let err = generator()
        .generate_node(&mut sg.graph, &mut sg.list, producer)
        .unwrap_err();
    assert!(matches!(err, CtxForgeError::WindowLayoutMismatch { window: 2, .. }));
    assert_eq!(err.category(), ctxforge::ErrorCategory::Layout);
    assert_eq!(sg.list.len(), before);
}

#[test]
fn test_write_back_follows_each_window() {
    let mut sg = Subgraph::new();
    let (node, windows) = sg.auto("conv", vec![f16(&[64])], vec![f16(&[64])], 2);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    for (w, &id) in report.write_back.appended.iter().enumerate() {
        assert_eq!(sg.list.get(windows[w]).unwrap().successor_list(), &[id]);
    }
}

#[test]
fn test_missing_window_list_is_hard_error() {
    let mut sg = Subgraph::new();
    let (node, _) = sg.auto("conv", vec![f16(&[64])], vec![f16(&[64])], 2);
    sg.set_bitmap(node, names::PREFETCH_ENABLE_BM, 0b1);
    sg.graph.node_mut(node).unwrap().attrs.remove(names::CONTEXT_ID_LIST);

    let err = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap_err();
    assert!(matches!(
        err,
        CtxForgeError::MissingAttribute {
            attr: names::CONTEXT_ID_LIST,
            ..
        }
    ));
}

#[test]
fn test_single_thread_leaves_threading_fields_empty() {
    let mut sg = Subgraph::new();
    let (node, _) = sg.auto("conv", vec![f16(&[64])], vec![f16(&[64])], 1);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    let data = sg.list.data(report.write_back.appended[0]).unwrap();
    assert!(!data.aten);
    assert_eq!(data.thread_dim, 0);
    assert_eq!(data.addr_base, addr_of(node, 0, true) as u64);
}

#[test]
fn test_manual_consumer_of_auto_producer_fails() {
    let mut sg = Subgraph::new();
    let (producer, _) = sg.auto("producer", vec![f16(&[64])], vec![f16(&[64])], 2);
    let (consumer, consumer_ctx) =
        sg.manual("consumer", vec![f16(&[64])], vec![f16(&[64])], ContextType::AicAiv);
    // sits right after the consumer's context, no edge to the producer
    let (_, unrelated_ctx) =
        sg.manual("unrelated", vec![f16(&[64])], vec![f16(&[64])], ContextType::AicAiv);
    sg.connect(producer, 0, consumer, 0);
    sg.set_bitmap(producer, names::INVALIDATE_BM, 0b1);

    let before = sg.list.len();
    let err = generator()
        .generate_node(&mut sg.graph, &mut sg.list, producer)
        .unwrap_err();

    assert!(matches!(
        err,
        CtxForgeError::MissingConsumerWindow {
            window: 1,
            published: 1,
            ..
        }
    ));
    assert_eq!(err.category(), ctxforge::ErrorCategory::Layout);
    assert_eq!(sg.list.len(), before);
    assert!(sg.list.get(consumer_ctx).unwrap().successor_list().is_empty());
    assert!(sg.list.get(unrelated_ctx).unwrap().successor_list().is_empty());
}

#[test]
fn test_consumer_with_fewer_windows_fails() {
    let mut sg = Subgraph::new();
    let (producer, _) = sg.auto("producer", vec![f16(&[64])], vec![f16(&[64])], 4);
    let (consumer, _) = sg.auto("consumer", vec![f16(&[64])], vec![f16(&[64])], 2);
    sg.connect(producer, 0, consumer, 0);
    sg.set_bitmap(producer, names::INVALIDATE_BM, 0b1);

    let before = sg.list.len();
    let err = generator()
        .generate_node(&mut sg.graph, &mut sg.list, producer)
        .unwrap_err();

    assert!(matches!(
        err,
        CtxForgeError::MissingConsumerWindow {
            window: 2,
            published: 2,
            ..
        }
    ));
    assert_eq!(sg.list.len(), before);
}

#[test]
fn test_consumer_with_more_windows_gates_leading_windows() {
    let mut sg = Subgraph::new();
    let (producer, _) = sg.auto("producer", vec![f16(&[64])], vec![f16(&[64])], 2);
    let (consumer, consumer_windows) = sg.auto("consumer", vec![f16(&[64])], vec![f16(&[64])], 4);
    sg.connect(producer, 0, consumer, 0);
    sg.set_bitmap(producer, names::INVALIDATE_BM, 0b1);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, producer)
        .unwrap();

    let ids = &report.invalidate.appended;
    assert_eq!(ids.len(), 2);
    assert_eq!(sg.list.get(consumer_windows[0]).unwrap().successor_list(), &[ids[0]]);
    assert_eq!(sg.list.get(consumer_windows[1]).unwrap().successor_list(), &[ids[1]]);
    assert!(sg.list.get(consumer_windows[2]).unwrap().successor_list().is_empty());
}

#[test]
fn test_short_axis_runs_fewer_threads() {
    let mut sg = Subgraph::new();
    let (node, windows) = sg.auto("gemm", vec![f16(&[2, 8])], vec![f16(&[2, 8])], 4);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);
    assert_eq!(windows.len(), 2);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    let ids = &report.write_back.appended;
    assert_eq!(ids.len(), 2);
    for (w, &id) in ids.iter().enumerate() {
        let data = sg.list.data(id).unwrap();
        assert_eq!(data.thread_dim, 2);
        assert_eq!(data.thread_id, w as u32);
        // one row of 8 fp16 values per thread
        assert_eq!(data.non_tail.len_inner, 16);
        assert_eq!(data.tail.len_inner, 16);
        assert_eq!(data.addr_offset, 16);
    }
}

fn empty_output_slice(threads: usize, empty_thread: usize) -> ThreadSliceMap {
    let mut map = ThreadSliceMap::new(ThreadMode::Auto, threads);
    map.output_tensor_slice = (0..threads)
        .map(|t| {
            let rows = if t == empty_thread {
                DimRange::new(t, t)
            } else {
                DimRange::new(t, t + 1)
            };
            vec![vec![rows, DimRange::full(8)]]
        })
        .collect();
    map
}

#[test]
fn test_thread_without_work_skips_slot() {
    let mut sg = Subgraph::new();
    let (node, _) = sg.auto("gemm", vec![f16(&[4, 8])], vec![f16(&[4, 8])], 4);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);
    sg.graph.node_mut(node).unwrap().slice_info = Some(empty_output_slice(4, 0));

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    assert!(report.write_back.appended.is_empty());
    assert_eq!(report.write_back.skipped[0].reason, SkipReason::EmptySlice);
    assert!(sg.list.iter().all(|(_, ctx)| !ctx.context_type().is_data()));
}

#[test]
fn test_manual_thread_without_work_skips_slot() {
    let mut sg = Subgraph::new();
    let (node, _) = sg.manual("gemm", vec![f16(&[4, 8])], vec![f16(&[4, 8])], ContextType::AicAiv);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);
    let mut slice = empty_output_slice(1, 0);
    slice.thread_mode = ThreadMode::Manual;
    sg.graph.node_mut(node).unwrap().slice_info = Some(slice);

    let report = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap();

    assert!(report.write_back.appended.is_empty());
    assert_eq!(report.write_back.skipped[0].reason, SkipReason::EmptySlice);
}

#[test]
fn test_tail_thread_without_work_is_hard_error() {
    let mut sg = Subgraph::new();
    let (node, _) = sg.auto("gemm", vec![f16(&[4, 8])], vec![f16(&[4, 8])], 4);
    sg.set_bitmap(node, names::WRITE_BACK_BM, 0b1);
    sg.graph.node_mut(node).unwrap().slice_info = Some(empty_output_slice(4, 3));

    let err = generator()
        .generate_node(&mut sg.graph, &mut sg.list, node)
        .unwrap_err();
    assert!(matches!(err, CtxForgeError::InvalidSlice(_)));
}
