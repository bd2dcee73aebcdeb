//! Per-node cache-context generation.
//!
//! A node's cache operations always run prefetch, then invalidate, then
//! write-back. [`CacheOpSequence`] encodes that order in its type, so a
//! later phase cannot be reached without finishing the earlier ones.

use std::marker::PhantomData;

use crate::error::ForgeResult;
use crate::ffts::builder::{builder_for, BuildContext};
use crate::ffts::cache_op::CacheOperation;
use crate::ffts::config::CacheTaskConfig;
use crate::ffts::context::DescriptorList;
use crate::ffts::mode::ThreadingMode;
use crate::ffts::report::{CacheGenReport, GraphReport, OpOutcome};
use crate::ffts::slice_param::{RowMajorSliceParams, SliceParamGenerator};
use crate::graph::attr::names;
use crate::graph::{Graph, Node, NodeId};

/// Nothing has run yet
pub struct Start;
/// Prefetch contexts are in place
pub struct Prefetched;
/// Invalidate contexts are in place
pub struct Invalidated;

pub struct CacheOpSequence<'a, S> {
    ctx: BuildContext<'a>,
    mode: ThreadingMode,
    _state: PhantomData<S>,
}

impl<'a, S> CacheOpSequence<'a, S> {
    fn run(&mut self, op: CacheOperation) -> ForgeResult<OpOutcome> {
        let build = builder_for(op, self.mode);
        build(&mut self.ctx).map_err(|e| {
            let name = self
                .ctx
                .graph
                .node(self.ctx.node)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            tracing::error!("{} ({}) failed for node '{}': {}", op, self.mode, name, e);
            e
        })
    }

    fn advance<T>(self) -> CacheOpSequence<'a, T> {
        CacheOpSequence {
            ctx: self.ctx,
            mode: self.mode,
            _state: PhantomData,
        }
    }
}

impl<'a> CacheOpSequence<'a, Start> {
    pub fn new(ctx: BuildContext<'a>, mode: ThreadingMode) -> Self {
        Self {
            ctx,
            mode,
            _state: PhantomData,
        }
    }

    pub fn prefetch(mut self) -> ForgeResult<(CacheOpSequence<'a, Prefetched>, OpOutcome)> {
        let outcome = self.run(CacheOperation::Prefetch)?;
        Ok((self.advance(), outcome))
    }
}

impl<'a> CacheOpSequence<'a, Prefetched> {
    pub fn invalidate(mut self) -> ForgeResult<(CacheOpSequence<'a, Invalidated>, OpOutcome)> {
        let outcome = self.run(CacheOperation::Invalidate)?;
        Ok((self.advance(), outcome))
    }
}

impl<'a> CacheOpSequence<'a, Invalidated> {
    pub fn write_back(mut self) -> ForgeResult<OpOutcome> {
        self.run(CacheOperation::WriteBack)
    }
}

/// Generates cache contexts for nodes of a graph
pub struct CacheTaskGenerator<G: SliceParamGenerator = RowMajorSliceParams> {
    config: CacheTaskConfig,
    slicer: G,
}

impl CacheTaskGenerator<RowMajorSliceParams> {
    pub fn new(config: CacheTaskConfig) -> ForgeResult<Self> {
        Self::with_slicer(config, RowMajorSliceParams::new())
    }
}

impl<G: SliceParamGenerator> CacheTaskGenerator<G> {
    pub fn with_slicer(config: CacheTaskConfig, slicer: G) -> ForgeResult<Self> {
        config.validate()?;
        Ok(Self { config, slicer })
    }

    pub fn config(&self) -> &CacheTaskConfig {
        &self.config
    }

    /// Generate all three operations for `node` using its resolved mode
    pub fn generate_node(
        &self,
        graph: &mut Graph,
        list: &mut DescriptorList,
        node: NodeId,
    ) -> ForgeResult<CacheGenReport> {
        let mode = ThreadingMode::resolve(graph.node(node)?);
        self.generate_node_with_mode(graph, list, node, mode)
    }

    /// Generate all three operations for `node` in an explicit mode.
    ///
    /// The first hard failure aborts the node. Contexts appended before the
    /// failure stay in the list.
    pub fn generate_node_with_mode(
        &self,
        graph: &mut Graph,
        list: &mut DescriptorList,
        node: NodeId,
        mode: ThreadingMode,
    ) -> ForgeResult<CacheGenReport> {
        let name = graph.node(node)?.name.clone();
        let start_len = list.len();

        let ctx = BuildContext {
            graph,
            node,
            list,
            slicer: &self.slicer,
            config: &self.config,
        };
        let (seq, prefetch) = CacheOpSequence::new(ctx, mode).prefetch()?;
        let (seq, invalidate) = seq.invalidate()?;
        let write_back = seq.write_back()?;

        let report = CacheGenReport {
            node: name,
            mode,
            prefetch,
            invalidate,
            write_back,
        };
        tracing::info!(
            "cache contexts for {} (list {} -> {})",
            report,
            start_len,
            start_len + report.total_appended()
        );
        Ok(report)
    }

    /// Generate for every node that owns a compute context.
    ///
    /// Pass-through nodes and nodes without context ids are skipped. Stops at
    /// the first node that fails.
    pub fn generate_graph(
        &self,
        graph: &mut Graph,
        list: &mut DescriptorList,
    ) -> ForgeResult<GraphReport> {
        let targets: Vec<NodeId> = graph
            .nodes
            .iter()
            .filter(|n| !n.is_no_task() && has_compute_context(n))
            .map(|n| n.id)
            .collect();

        let mut report = GraphReport::default();
        for node in targets {
            report.nodes.push(self.generate_node(graph, list, node)?);
        }
        tracing::info!("{}", report);
        Ok(report)
    }
}

fn has_compute_context(node: &Node) -> bool {
    node.attrs.contains(names::CONTEXT_ID)
        || node.attrs.contains(names::CONTEXT_ID_LIST)
        || node.attrs.contains(names::DYNAMIC_CONTEXT_ID_LIST)
}
