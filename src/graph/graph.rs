//! Arena graph of operator nodes connected through numbered anchors.

use serde::{Deserialize, Serialize};

use crate::error::{check_index, CtxForgeError, ForgeResult};
use crate::graph::{AttrBag, TensorDesc, ThreadSliceMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// One end of an edge: a node and the index of its input or output anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub node: NodeId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub src: Anchor,
    pub dst: Anchor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
    pub attrs: AttrBag,
    pub slice_info: Option<ThreadSliceMap>,
}

impl Node {
    pub fn is_no_task(&self) -> bool {
        self.attrs
            .get_bool(crate::graph::attr::names::NO_TASK)
            .unwrap_or(false)
    }

    pub fn input_desc(&self, index: usize) -> ForgeResult<&TensorDesc> {
        check_index("input anchor", index, self.inputs.len())?;
        Ok(&self.inputs[index])
    }

    pub fn output_desc(&self, index: usize) -> ForgeResult<&TensorDesc> {
        check_index("output anchor", index, self.outputs.len())?;
        Ok(&self.outputs[index])
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op_type: impl Into<String>,
        inputs: Vec<TensorDesc>,
        outputs: Vec<TensorDesc>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: name.into(),
            op_type: op_type.into(),
            inputs,
            outputs,
            attrs: AttrBag::new(),
            slice_info: None,
        });
        id
    }

    /// Connect output `out_index` of `src` to input `in_index` of `dst`.
    pub fn connect(
        &mut self,
        src: NodeId,
        out_index: usize,
        dst: NodeId,
        in_index: usize,
    ) -> ForgeResult<()> {
        check_index("output anchor", out_index, self.node(src)?.outputs.len())?;
        check_index("input anchor", in_index, self.node(dst)?.inputs.len())?;
        let dst_anchor = Anchor {
            node: dst,
            index: in_index,
        };
        if self.edges.iter().any(|e| e.dst == dst_anchor) {
            return Err(CtxForgeError::InvalidConfiguration(format!(
                "input {} of node {} is already connected",
                in_index, dst.0
            )));
        }
        self.edges.push(Edge {
            src: Anchor {
                node: src,
                index: out_index,
            },
            dst: dst_anchor,
        });
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> ForgeResult<&Node> {
        self.nodes.get(id.0).ok_or(CtxForgeError::IndexOutOfRange {
            what: "node",
            index: id.0,
            len: self.nodes.len(),
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> ForgeResult<&mut Node> {
        let len = self.nodes.len();
        self.nodes.get_mut(id.0).ok_or(CtxForgeError::IndexOutOfRange {
            what: "node",
            index: id.0,
            len,
        })
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    /// Input anchors fed by output `out_index` of `node`, in edge order.
    pub fn peer_in_anchors(&self, node: NodeId, out_index: usize) -> Vec<Anchor> {
        self.edges
            .iter()
            .filter(|e| e.src.node == node && e.src.index == out_index)
            .map(|e| e.dst)
            .collect()
    }
}
