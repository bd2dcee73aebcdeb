//! Cache-operation task contexts for FFTS subgraphs.
//!
//! For every node the generator appends prefetch, invalidate and write-back
//! data contexts to the shared [`DescriptorList`] and stitches them into the
//! dependency graph of the compute contexts they serve.

pub mod builder;
pub mod cache_op;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod mode;
pub mod report;
pub mod slice_param;
pub mod stitch;

pub use cache_op::{CacheOperation, TensorDirection};
pub use config::CacheTaskConfig;
pub use context::{AddrQuad, ComputeContext, ContextId, ContextType, DataContext, DescriptorList, TaskContext};
pub use dispatch::{CacheOpSequence, CacheTaskGenerator};
pub use mode::ThreadingMode;
pub use report::{CacheGenReport, GraphReport, OpOutcome, SkipReason, SkippedSlot};
pub use slice_param::{DataParam, RowMajorSliceParams, SliceParamGenerator, SliceRequest};
