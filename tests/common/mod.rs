//! Shared fixtures for the cache-context integration tests
//!
//! Builders here create a node together with the compute context(s) it owns,
//! so every test starts from a descriptor list that already holds the
//! compute side of the subgraph.

#![allow(dead_code)]

use std::io::Write;

use anyhow::Context;
use ctxforge::ffts::{CacheTaskConfig, CacheTaskGenerator, ComputeContext, ContextId, ContextType, DescriptorList};
use ctxforge::graph::attr::names;
use ctxforge::graph::{DType, Graph, NodeId, TensorDesc, ThreadMode, ThreadSliceMap};
use once_cell::sync::Lazy;
pub use serial_test::serial;

/// Tensor from the fp16 reference workload, split four ways along axis 0
pub const REFERENCE_SHAPE: [usize; 4] = [288, 8, 24, 33];
/// Bytes one thread of the reference workload touches
pub const REFERENCE_THREAD_BYTES: u32 = 72 * 8 * 24 * 33 * 2;

static LOGGING: Lazy<()> = Lazy::new(ctxforge::logging::init_logging_default);

pub fn init_test_logging() {
    Lazy::force(&LOGGING);
}

pub fn f16(shape: &[usize]) -> TensorDesc {
    TensorDesc::new(shape.to_vec(), DType::Float16)
}

/// Base address assigned to slot `slot` of the node called `name`
pub fn addr_of(node: NodeId, slot: usize, output: bool) -> i64 {
    let side = if output { 0x8000 } else { 0 };
    0x1_0000_0000 + (node.0 as i64) * 0x10_0000 + side + (slot as i64) * 0x1000
}

pub struct Subgraph {
    pub graph: Graph,
    pub list: DescriptorList,
}

impl Default for Subgraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Subgraph {
    pub fn new() -> Self {
        init_test_logging();
        Self {
            graph: Graph::new(),
            list: DescriptorList::new(),
        }
    }

    fn add_with_addrs(&mut self, name: &str, inputs: Vec<TensorDesc>, outputs: Vec<TensorDesc>) -> NodeId {
        let (n_in, n_out) = (inputs.len(), outputs.len());
        let id = self.graph.add_node(name, "Conv2D", inputs, outputs);
        let node = self.graph.node_mut(id).unwrap();
        node.attrs
            .set_list_int(names::INPUT_ADDRS, (0..n_in).map(|s| addr_of(id, s, false)).collect());
        node.attrs
            .set_list_int(names::OUTPUT_ADDRS, (0..n_out).map(|s| addr_of(id, s, true)).collect());
        id
    }

    /// Manually partitioned node owning one compute context
    pub fn manual(
        &mut self,
        name: &str,
        inputs: Vec<TensorDesc>,
        outputs: Vec<TensorDesc>,
        context_type: ContextType,
    ) -> (NodeId, ContextId) {
        let id = self.add_with_addrs(name, inputs, outputs);
        let ctx = self.list.push_compute(ComputeContext::new(context_type));
        self.graph
            .node_mut(id)
            .unwrap()
            .attrs
            .set_int(names::CONTEXT_ID, ctx.raw() as i64);
        (id, ctx)
    }

    /// Auto-threaded node split along axis 0 into `threads` slices, one
    /// window context per slice. Short axes get fewer slices and windows.
    pub fn auto(
        &mut self,
        name: &str,
        inputs: Vec<TensorDesc>,
        outputs: Vec<TensorDesc>,
        threads: usize,
    ) -> (NodeId, Vec<ContextId>) {
        let mut slice = ThreadSliceMap::new(ThreadMode::Auto, threads);
        for (i, desc) in inputs.iter().enumerate() {
            slice = slice.with_input_split(i, &desc.shape, 0);
        }
        for (i, desc) in outputs.iter().enumerate() {
            slice = slice.with_output_split(i, &desc.shape, 0);
        }
        let threads = slice.slice_instance_num;
        let id = self.add_with_addrs(name, inputs, outputs);
        let windows: Vec<ContextId> = (0..slice.parallel_window_size)
            .map(|t| {
                self.list
                    .push_compute(ComputeContext::new(ContextType::AicAiv).with_thread(t as u32, threads as u32))
            })
            .collect();
        let node = self.graph.node_mut(id).unwrap();
        node.slice_info = Some(slice);
        node.attrs.set_list_int(
            names::CONTEXT_ID_LIST,
            windows.iter().map(|w| w.raw() as i64).collect(),
        );
        (id, windows)
    }

    /// Dynamic-shape node with `windows` pre-assigned window contexts
    pub fn dynamic(
        &mut self,
        name: &str,
        inputs: Vec<TensorDesc>,
        outputs: Vec<TensorDesc>,
        windows: usize,
    ) -> (NodeId, Vec<ContextId>) {
        let id = self.add_with_addrs(name, inputs, outputs);
        let ids: Vec<ContextId> = (0..windows)
            .map(|_| self.list.push_compute(ComputeContext::new(ContextType::AicAiv)))
            .collect();
        let node = self.graph.node_mut(id).unwrap();
        node.attrs.set_bool(names::UNKNOWN_SHAPE, true);
        node.attrs.set_list_int(
            names::DYNAMIC_CONTEXT_ID_LIST,
            ids.iter().map(|w| w.raw() as i64).collect(),
        );
        (id, ids)
    }

    /// Pass-through node without a task of its own
    pub fn no_task(&mut self, name: &str, desc: TensorDesc) -> NodeId {
        let id = self.graph.add_node(name, "Reshape", vec![desc.clone()], vec![desc]);
        self.graph.node_mut(id).unwrap().attrs.set_bool(names::NO_TASK, true);
        id
    }

    pub fn set_bitmap(&mut self, node: NodeId, attr: &str, bitmap: i64) {
        self.graph.node_mut(node).unwrap().attrs.set_int(attr, bitmap);
    }

    pub fn connect(&mut self, src: NodeId, out: usize, dst: NodeId, input: usize) {
        self.graph.connect(src, out, dst, input).unwrap();
    }
}

pub fn generator() -> CacheTaskGenerator {
    CacheTaskGenerator::new(CacheTaskConfig::default()).unwrap()
}

pub fn generator_with(config: CacheTaskConfig) -> CacheTaskGenerator {
    CacheTaskGenerator::new(config).unwrap()
}

/// Write `json` to a temporary `.json` file
pub fn write_config_file(json: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::with_suffix(".json")
        .context("Failed to create temporary config file")?;
    file.write_all(json.as_bytes())
        .context("Failed to write temporary config file")?;
    Ok(file)
}
