//! Minimal compute-graph model consumed by the task-context compiler.

pub mod attr;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod shape;
pub mod slice;
pub mod tensor;

pub use attr::{AttrBag, AttrValue};
pub use graph::{Anchor, Edge, Graph, Node, NodeId};
pub use slice::{DimRange, TensorSlice, ThreadMode, ThreadSliceMap};
pub use tensor::{DType, TensorDesc};
