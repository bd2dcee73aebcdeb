//! Threading mode of the compute context(s) a node's cache contexts serve.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::attr::names;
use crate::graph::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadingMode {
    /// One compute context, explicit id
    Manual,
    /// N window contexts sharing one set of templates
    Auto,
    /// Partition known only at runtime; window ids assigned upstream
    Dynamic,
}

impl ThreadingMode {
    /// Unknown shape wins over the slice descriptor's thread mode.
    pub fn resolve(node: &Node) -> Self {
        if node.attrs.get_bool(names::UNKNOWN_SHAPE).unwrap_or(false) {
            return ThreadingMode::Dynamic;
        }
        match &node.slice_info {
            Some(slice) if slice.is_auto() => ThreadingMode::Auto,
            _ => ThreadingMode::Manual,
        }
    }
}

impl fmt::Display for ThreadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadingMode::Manual => write!(f, "manual"),
            ThreadingMode::Auto => write!(f, "auto"),
            ThreadingMode::Dynamic => write!(f, "dynamic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DType, Graph, TensorDesc, ThreadMode, ThreadSliceMap};

    #[test]
    fn test_resolution_order() {
        let mut graph = Graph::new();
        let desc = TensorDesc::new(vec![4], DType::Float32);
        let id = graph.add_node("n", "Relu", vec![desc.clone()], vec![desc]);

        assert_eq!(ThreadingMode::resolve(graph.node(id).unwrap()), ThreadingMode::Manual);

        graph.node_mut(id).unwrap().slice_info = Some(ThreadSliceMap::new(ThreadMode::Auto, 2));
        assert_eq!(ThreadingMode::resolve(graph.node(id).unwrap()), ThreadingMode::Auto);

        graph
            .node_mut(id)
            .unwrap()
            .attrs
            .set_bool(names::UNKNOWN_SHAPE, true);
        assert_eq!(ThreadingMode::resolve(graph.node(id).unwrap()), ThreadingMode::Dynamic);
    }
}
