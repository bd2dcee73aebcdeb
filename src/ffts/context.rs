//! Hardware task contexts and the descriptor list that owns them.
//!
//! A context is addressed only by its position in the [`DescriptorList`].
//! [`ContextId`] wraps that position so ids cannot be mixed up with slot
//! indices, window ids or addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CtxForgeError, ForgeResult};

/// Position of a context in its descriptor list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u32);

impl ContextId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Id of the same context in window `window` of a contiguous window block
    pub fn window(self, window: usize) -> ForgeResult<Self> {
        u32::try_from(window)
            .ok()
            .and_then(|w| self.0.checked_add(w))
            .map(Self)
            .ok_or(CtxForgeError::ContextIdOverflow { base: self, window })
    }

    /// Convert an id stored in an integer attribute
    pub fn from_attr(value: i64) -> Option<Self> {
        u32::try_from(value).ok().map(Self)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Context type tag, encoded exactly as the scheduler firmware expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ContextType {
    AicAiv = 0x0000,
    NotifyWait = 0x0003,
    NotifyRecord = 0x0004,
    WriteValue = 0x0005,
    MixAicAiv = 0x0006,
    Sdma = 0x0008,
    FlushData = 0x0009,
    InvalidateData = 0x000A,
    WriteBackData = 0x000B,
    AiCpu = 0x000C,
}

impl ContextType {
    pub const fn tag(self) -> u16 {
        self as u16
    }

    pub const fn is_data(self) -> bool {
        matches!(
            self,
            ContextType::FlushData | ContextType::InvalidateData | ContextType::WriteBackData
        )
    }

    /// Only the AI core families own a prefetch source-slot table
    pub const fn supports_prefetch(self) -> bool {
        matches!(self, ContextType::AicAiv | ContextType::MixAicAiv)
    }
}

/// `{len_inner, num_inner, num_outer, stride_inner, stride_outer}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrQuad {
    pub len_inner: u32,
    pub num_inner: u32,
    pub num_outer: u32,
    pub stride_inner: u32,
    pub stride_outer: u32,
}

impl AddrQuad {
    /// Field order of the firmware descriptor
    pub fn to_words(&self) -> [u32; 5] {
        [
            self.len_inner,
            self.num_inner,
            self.num_outer,
            self.stride_inner,
            self.stride_outer,
        ]
    }

    pub fn total_bytes(&self) -> u64 {
        self.len_inner as u64 * self.num_inner as u64 * self.num_outer as u64
    }
}

/// Prefetch, invalidate or write-back descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataContext {
    pub context_type: ContextType,
    pub pred_cnt: u32,
    pub pred_cnt_init: u32,
    /// Auto thread enable
    pub aten: bool,
    pub thread_id: u32,
    pub thread_dim: u32,
    pub addr_base: u64,
    pub addr_offset: u64,
    pub non_tail: AddrQuad,
    pub tail: AddrQuad,
    pub successor_list: Vec<ContextId>,
}

impl DataContext {
    pub fn new(context_type: ContextType, pred_cnt: u32) -> Self {
        Self {
            context_type,
            pred_cnt,
            pred_cnt_init: pred_cnt,
            aten: false,
            thread_id: 0,
            thread_dim: 0,
            addr_base: 0,
            addr_offset: 0,
            non_tail: AddrQuad::default(),
            tail: AddrQuad::default(),
            successor_list: Vec::new(),
        }
    }

    /// Firmware word order: non-tail quadruple then tail quadruple
    pub fn addressing_words(&self) -> [u32; 10] {
        let mut words = [0u32; 10];
        words[..5].copy_from_slice(&self.non_tail.to_words());
        words[5..].copy_from_slice(&self.tail.to_words());
        words
    }
}

/// AI core (or other compute) descriptor that cache contexts hang off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeContext {
    pub context_type: ContextType,
    pub pred_cnt: u32,
    pub pred_cnt_init: u32,
    pub aten: bool,
    pub thread_id: u32,
    pub thread_dim: u32,
    pub successor_list: Vec<ContextId>,
    pub src_slot: Vec<ContextId>,
    pub prefetch_enable_bitmap: u32,
    pub prefetch_once_bitmap: u32,
}

impl ComputeContext {
    pub fn new(context_type: ContextType) -> Self {
        Self {
            context_type,
            pred_cnt: 0,
            pred_cnt_init: 0,
            aten: false,
            thread_id: 0,
            thread_dim: 0,
            successor_list: Vec::new(),
            src_slot: Vec::new(),
            prefetch_enable_bitmap: 0,
            prefetch_once_bitmap: 0,
        }
    }

    pub fn with_thread(mut self, thread_id: u32, thread_dim: u32) -> Self {
        self.aten = true;
        self.thread_id = thread_id;
        self.thread_dim = thread_dim;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskContext {
    Compute(ComputeContext),
    Data(DataContext),
}

impl TaskContext {
    pub fn context_type(&self) -> ContextType {
        match self {
            TaskContext::Compute(ctx) => ctx.context_type,
            TaskContext::Data(ctx) => ctx.context_type,
        }
    }

    pub fn successor_list(&self) -> &[ContextId] {
        match self {
            TaskContext::Compute(ctx) => &ctx.successor_list,
            TaskContext::Data(ctx) => &ctx.successor_list,
        }
    }

    pub fn successor_list_mut(&mut self) -> &mut Vec<ContextId> {
        match self {
            TaskContext::Compute(ctx) => &mut ctx.successor_list,
            TaskContext::Data(ctx) => &mut ctx.successor_list,
        }
    }

    pub fn pred_cnt(&self) -> u32 {
        match self {
            TaskContext::Compute(ctx) => ctx.pred_cnt,
            TaskContext::Data(ctx) => ctx.pred_cnt,
        }
    }

    pub fn as_data(&self) -> Option<&DataContext> {
        match self {
            TaskContext::Data(ctx) => Some(ctx),
            TaskContext::Compute(_) => None,
        }
    }

    pub fn as_compute(&self) -> Option<&ComputeContext> {
        match self {
            TaskContext::Compute(ctx) => Some(ctx),
            TaskContext::Data(_) => None,
        }
    }
}

/// Append-only sequence of contexts for one task definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorList {
    contexts: Vec<TaskContext>,
}

impl DescriptorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next appended context will receive
    pub fn next_id(&self) -> ContextId {
        ContextId::new(self.contexts.len() as u32)
    }

    pub fn push(&mut self, context: TaskContext) -> ContextId {
        let id = self.next_id();
        self.contexts.push(context);
        id
    }

    pub fn push_compute(&mut self, context: ComputeContext) -> ContextId {
        self.push(TaskContext::Compute(context))
    }

    pub fn push_data(&mut self, context: DataContext) -> ContextId {
        self.push(TaskContext::Data(context))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn get(&self, id: ContextId) -> ForgeResult<&TaskContext> {
        self.contexts
            .get(id.index())
            .ok_or(CtxForgeError::ContextNotFound(id))
    }

    pub fn get_mut(&mut self, id: ContextId) -> ForgeResult<&mut TaskContext> {
        self.contexts
            .get_mut(id.index())
            .ok_or(CtxForgeError::ContextNotFound(id))
    }

    pub fn data(&self, id: ContextId) -> ForgeResult<&DataContext> {
        self.get(id)?
            .as_data()
            .ok_or_else(|| crate::internal_error!("context {} is not a data context", id))
    }

    pub fn compute(&self, id: ContextId) -> ForgeResult<&ComputeContext> {
        self.get(id)?
            .as_compute()
            .ok_or_else(|| crate::internal_error!("context {} is not a compute context", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContextId, &TaskContext)> {
        self.contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| (ContextId::new(i as u32), ctx))
    }

    pub fn to_json(&self) -> ForgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> ForgeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
