//! Unified error handling for ctxforge
//!
//! Every failure the task-context compiler can report is a variant of
//! [`CtxForgeError`]. Variants are grouped into categories so callers can
//! tell a hard failure (abort the node) from a soft one (skip a slot):
//! - Configuration errors (missing attributes, missing thread slices)
//! - Index errors (slot or context index out of range)
//! - Capacity errors (fan-out, source-slot and successor limits)
//! - Unsupported errors (context types that cannot take part in a wiring step)
//! - Layout errors (auto-mode window blocks that are not contiguous)

use std::fmt;

use crate::ffts::context::{ContextId, ContextType};

// Re-export thiserror for convenience
pub use thiserror;

/// Unified error type for ctxforge
#[derive(Debug, thiserror::Error)]
pub enum CtxForgeError {
    // ========== Configuration Errors ==========
    /// A required node attribute is absent
    #[error("node '{node}' is missing attribute '{attr}'")]
    MissingAttribute { node: String, attr: &'static str },

    /// Auto-mode addressing was requested without a thread-slice descriptor
    #[error("node '{0}' has no thread slice descriptor")]
    MissingThreadSlice(String),

    /// Invalid compiler configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The slice description cannot be turned into addressing records
    #[error("Invalid slice: {0}")]
    InvalidSlice(String),

    // ========== Index Errors ==========
    /// Slot or anchor index outside the recorded range
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A context id does not name an entry of the descriptor list
    #[error("context {0} not found in descriptor list")]
    ContextNotFound(ContextId),

    /// Offsetting a context id by a window index leaves the 32-bit id space
    #[error("context {base} has no window {window}: id out of range")]
    ContextIdOverflow { base: ContextId, window: usize },

    // ========== Capacity Errors ==========
    /// A hardware fan-in/fan-out limit would be exceeded
    #[error("{what} capacity exceeded: limit {limit}")]
    CapacityExceeded { what: &'static str, limit: usize },

    /// Successor list of a context is already at the hardware limit
    #[error("successor list of context {context} is full (limit {limit})")]
    SuccessorListFull { context: ContextId, limit: usize },

    // ========== Unsupported Errors ==========
    /// The context cannot carry prefetch source slots
    #[error("context {context} of type {context_type:?} does not support prefetch source slots")]
    UnsupportedContextType {
        context: ContextId,
        context_type: ContextType,
    },

    // ========== Layout Errors ==========
    /// Per-window contexts of a consumer are not laid out contiguously
    #[error("node '{node}' window {window}: expected context {expected}, found {actual}")]
    WindowLayoutMismatch {
        node: String,
        window: usize,
        expected: u32,
        actual: u32,
    },

    /// A consumer publishes fewer window contexts than the producer runs
    #[error("node '{node}' window {window}: consumer publishes only {published} window context(s)")]
    MissingConsumerWindow {
        node: String,
        window: usize,
        published: usize,
    },

    // ========== I/O Errors ==========
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug)
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl CtxForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            CtxForgeError::MissingAttribute { .. }
            | CtxForgeError::MissingThreadSlice(_)
            | CtxForgeError::InvalidConfiguration(_)
            | CtxForgeError::InvalidSlice(_)
            | CtxForgeError::IoError(_)
            | CtxForgeError::JsonError(_) => ErrorCategory::Configuration,

            CtxForgeError::IndexOutOfRange { .. }
            | CtxForgeError::ContextNotFound(_)
            | CtxForgeError::ContextIdOverflow { .. } => ErrorCategory::Index,

            CtxForgeError::CapacityExceeded { .. } | CtxForgeError::SuccessorListFull { .. } => {
                ErrorCategory::Capacity
            }

            CtxForgeError::UnsupportedContextType { .. } => ErrorCategory::Unsupported,

            CtxForgeError::WindowLayoutMismatch { .. }
            | CtxForgeError::MissingConsumerWindow { .. } => ErrorCategory::Layout,

            CtxForgeError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Soft errors skip the offending slot; processing of the node continues.
    ///
    /// Only the per-node fan-out and per-context source-slot limits are soft.
    /// A full successor list is a hard failure.
    pub fn is_soft(&self) -> bool {
        matches!(self, CtxForgeError::CapacityExceeded { .. })
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing attribute, missing slice info or bad configuration
    Configuration,
    /// Slot, anchor or context index out of range
    Index,
    /// Hardware capacity limit
    Capacity,
    /// Context type not usable for the requested wiring
    Unsupported,
    /// Window block layout violated
    Layout,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Index => write!(f, "Index"),
            ErrorCategory::Capacity => write!(f, "Capacity"),
            ErrorCategory::Unsupported => write!(f, "Unsupported"),
            ErrorCategory::Layout => write!(f, "Layout"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Result alias used throughout the crate
pub type ForgeResult<T> = std::result::Result<T, CtxForgeError>;

/// Create an internal error with context
///
/// # Examples
/// ```ignore
/// return Err(internal_error!("descriptor list shrank during build"));
/// ```
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::CtxForgeError::InternalError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::CtxForgeError::InternalError(format!($fmt, $($arg)*))
    };
}

/// Create a configuration error with context
///
/// # Examples
/// ```ignore
/// return Err(config_error!("max_prefetch_num must be > 0, got {}", n));
/// ```
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::CtxForgeError::InvalidConfiguration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::CtxForgeError::InvalidConfiguration(format!($fmt, $($arg)*))
    };
}

/// Build a `MissingAttribute` error for a node
pub fn missing_attr(node: &str, attr: &'static str) -> CtxForgeError {
    CtxForgeError::MissingAttribute {
        node: node.to_string(),
        attr,
    }
}

/// Bounds-check an index, returning `IndexOutOfRange` on failure
pub fn check_index(what: &'static str, index: usize, len: usize) -> ForgeResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(CtxForgeError::IndexOutOfRange { what, index, len })
    }
}
