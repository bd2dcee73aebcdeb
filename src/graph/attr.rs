//! Attribute bag attached to every graph node.
//!
//! Lookups return `Option`: an absent attribute and an attribute of the
//! wrong type both read as `None`, so a caller can never pick up a stale
//! default after a failed lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute names read and written by the task-context compiler.
pub mod names {
    /// Prefetch enable bitmap, bit i selects input slot i
    pub const PREFETCH_ENABLE_BM: &str = "_prefetch_enable_bm";
    /// Invalidate bitmap, bit i selects output slot i
    pub const INVALIDATE_BM: &str = "_invalidate_bm";
    /// Write-back bitmap, bit i selects output slot i
    pub const WRITE_BACK_BM: &str = "_write_back_bm";

    /// Compute context id of a manually partitioned node
    pub const CONTEXT_ID: &str = "_context_id";
    /// Per-window compute context ids of an auto-threaded node
    pub const CONTEXT_ID_LIST: &str = "_context_id_list";
    /// Per-window context ids assigned to a dynamic-shape node
    pub const DYNAMIC_CONTEXT_ID_LIST: &str = "_dynamic_context_id_list";

    pub const INPUT_ADDRS: &str = "_input_addrs";
    pub const OUTPUT_ADDRS: &str = "_output_addrs";

    /// Pass-through node that never receives its own context
    pub const NO_TASK: &str = "_no_task";
    pub const UNKNOWN_SHAPE: &str = "_is_unknown_shape";

    pub const PREFETCH_CTX_ID_LIST: &str = "_prefetch_ctx_id_list";
    pub const INVALIDATE_CTX_ID_LIST: &str = "_invalidate_ctx_id_list";
    pub const WRITE_BACK_CTX_ID_LIST: &str = "_write_back_ctx_id_list";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    ListInt(Vec<i64>),
    Bool(bool),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrBag {
    values: BTreeMap<String, AttrValue>,
}

impl AttrBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(AttrValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_list_int(&self, name: &str) -> Option<&[i64]> {
        match self.values.get(name) {
            Some(AttrValue::ListInt(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(AttrValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: AttrValue) {
        self.values.insert(name.into(), value);
    }

    pub fn set_int(&mut self, name: impl Into<String>, value: i64) {
        self.set(name, AttrValue::Int(value));
    }

    pub fn set_list_int(&mut self, name: impl Into<String>, value: Vec<i64>) {
        self.set(name, AttrValue::ListInt(value));
    }

    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) {
        self.set(name, AttrValue::Bool(value));
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_lookup() {
        let mut bag = AttrBag::new();
        bag.set_int(names::CONTEXT_ID, 3);
        bag.set_list_int(names::OUTPUT_ADDRS, vec![100, 200]);
        bag.set_bool(names::NO_TASK, true);

        assert_eq!(bag.get_int(names::CONTEXT_ID), Some(3));
        assert_eq!(bag.get_list_int(names::OUTPUT_ADDRS), Some(&[100, 200][..]));
        assert_eq!(bag.get_bool(names::NO_TASK), Some(true));
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn test_wrong_type_reads_as_absent() {
        let mut bag = AttrBag::new();
        bag.set_int(names::OUTPUT_ADDRS, 100);
        assert_eq!(bag.get_list_int(names::OUTPUT_ADDRS), None);
        assert_eq!(bag.get_int(names::INPUT_ADDRS), None);
    }
}
