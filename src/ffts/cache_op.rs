//! Cache operations and their fixed per-operation properties.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ffts::context::ContextType;
use crate::graph::attr::names;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheOperation {
    Prefetch = 0,
    Invalidate = 1,
    WriteBack = 2,
}

/// Which side of the node an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOpInfo {
    pub name: &'static str,
    /// Attribute holding the per-slot enable bitmap
    pub bitmap_attr: &'static str,
    pub context_type: ContextType,
    pub direction: TensorDirection,
    /// Attribute that records appended context ids in dynamic mode
    pub recorded_ids_attr: &'static str,
}

static CACHE_OP_TABLE: [CacheOpInfo; 3] = [
    CacheOpInfo {
        name: "prefetch",
        bitmap_attr: names::PREFETCH_ENABLE_BM,
        context_type: ContextType::FlushData,
        direction: TensorDirection::Input,
        recorded_ids_attr: names::PREFETCH_CTX_ID_LIST,
    },
    CacheOpInfo {
        name: "invalidate",
        bitmap_attr: names::INVALIDATE_BM,
        context_type: ContextType::InvalidateData,
        direction: TensorDirection::Output,
        recorded_ids_attr: names::INVALIDATE_CTX_ID_LIST,
    },
    CacheOpInfo {
        name: "write_back",
        bitmap_attr: names::WRITE_BACK_BM,
        context_type: ContextType::WriteBackData,
        direction: TensorDirection::Output,
        recorded_ids_attr: names::WRITE_BACK_CTX_ID_LIST,
    },
];

impl CacheOperation {
    /// Execution order within one node
    pub const ALL: [CacheOperation; 3] = [
        CacheOperation::Prefetch,
        CacheOperation::Invalidate,
        CacheOperation::WriteBack,
    ];

    pub fn info(self) -> &'static CacheOpInfo {
        &CACHE_OP_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn context_type(self) -> ContextType {
        self.info().context_type
    }

    pub fn direction(self) -> TensorDirection {
        self.info().direction
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
