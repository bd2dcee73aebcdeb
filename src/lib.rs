//! ctxforge - cache-operation task contexts for an AI accelerator
//!
//! Given an annotated compute graph, appends data-movement contexts
//! (prefetch, invalidate, write-back) to a node's task-context list and
//! wires them into the dependency graph of its compute contexts.

#![allow(clippy::needless_range_loop)] // Clearer for slot and window loops

pub mod error;
pub mod ffts;
pub mod graph;
pub mod logging;

pub use error::{CtxForgeError, ErrorCategory, ForgeResult};
pub use ffts::{
    CacheGenReport, CacheOperation, CacheTaskConfig, CacheTaskGenerator, ContextId, ContextType,
    DescriptorList, ThreadingMode,
};
pub use graph::{Graph, Node, NodeId};
