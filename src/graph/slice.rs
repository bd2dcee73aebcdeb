//! Thread-slice descriptors.
//!
//! A sliced node runs as `slice_instance_num` thread slices. For every thread
//! the descriptor records, per operand and per axis, the half-open element
//! range that thread touches.

use serde::{Deserialize, Serialize};

use crate::error::{CtxForgeError, ForgeResult};

/// Half-open range `[lower, higher)` along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimRange {
    pub lower: usize,
    pub higher: usize,
}

impl DimRange {
    pub fn new(lower: usize, higher: usize) -> Self {
        Self { lower, higher }
    }

    pub fn full(dim: usize) -> Self {
        Self::new(0, dim)
    }

    pub fn len(&self) -> usize {
        self.higher.saturating_sub(self.lower)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ranges for every axis of one operand
pub type TensorSlice = Vec<DimRange>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadMode {
    #[default]
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThreadSliceMap {
    pub thread_mode: ThreadMode,
    /// Number of thread slices the node is cut into
    pub slice_instance_num: usize,
    /// Number of windows (compute contexts) executing the slices
    pub parallel_window_size: usize,
    /// `[thread][input][axis]`
    pub input_tensor_slice: Vec<Vec<TensorSlice>>,
    /// `[thread][output][axis]`
    pub output_tensor_slice: Vec<Vec<TensorSlice>>,
}

impl ThreadSliceMap {
    pub fn new(thread_mode: ThreadMode, slice_instance_num: usize) -> Self {
        Self {
            thread_mode,
            slice_instance_num,
            parallel_window_size: slice_instance_num,
            ..Default::default()
        }
    }

    pub fn with_parallel_window_size(mut self, size: usize) -> Self {
        self.parallel_window_size = size;
        self
    }

    /// Split `shape` evenly along `axis` for every thread and record the
    /// result as the slice of input `index`.
    ///
    /// An axis shorter than the thread count lowers `slice_instance_num` and
    /// `parallel_window_size` to the number of threads that get work, so
    /// operands split later use the lowered count.
    pub fn with_input_split(mut self, index: usize, shape: &[usize], axis: usize) -> Self {
        let slices = split_along_axis(shape, axis, self.slice_instance_num);
        self.limit_threads(slices.len());
        place(&mut self.input_tensor_slice, index, slices);
        self
    }

    pub fn with_output_split(mut self, index: usize, shape: &[usize], axis: usize) -> Self {
        let slices = split_along_axis(shape, axis, self.slice_instance_num);
        self.limit_threads(slices.len());
        place(&mut self.output_tensor_slice, index, slices);
        self
    }

    fn limit_threads(&mut self, threads: usize) {
        self.slice_instance_num = self.slice_instance_num.min(threads);
        self.parallel_window_size = self.parallel_window_size.min(threads);
    }

    pub fn is_auto(&self) -> bool {
        self.thread_mode == ThreadMode::Auto
    }

    pub fn input_slice(&self, thread: usize, index: usize) -> ForgeResult<&TensorSlice> {
        lookup(&self.input_tensor_slice, thread, index, "input")
    }

    pub fn output_slice(&self, thread: usize, index: usize) -> ForgeResult<&TensorSlice> {
        lookup(&self.output_tensor_slice, thread, index, "output")
    }
}

fn lookup<'a>(
    table: &'a [Vec<TensorSlice>],
    thread: usize,
    index: usize,
    what: &str,
) -> ForgeResult<&'a TensorSlice> {
    table
        .get(thread)
        .and_then(|per_thread| per_thread.get(index))
        .ok_or_else(|| {
            CtxForgeError::InvalidSlice(format!(
                "no {} slice for thread {} tensor {}",
                what, thread, index
            ))
        })
}

fn place(table: &mut Vec<Vec<TensorSlice>>, index: usize, slices: Vec<TensorSlice>) {
    if table.len() < slices.len() {
        table.resize_with(slices.len(), Vec::new);
    }
    for (thread, slice) in slices.into_iter().enumerate() {
        let per_thread = &mut table[thread];
        if per_thread.len() <= index {
            per_thread.resize_with(index + 1, Vec::new);
        }
        per_thread[index] = slice;
    }
}

/// Even split of `axis` into at most `threads` parts; the last part takes the
/// remainder.
///
/// Every part is non-empty: when `axis` is too short to give each thread a
/// share, fewer parts are returned. A zero-length axis yields one empty part.
pub fn split_along_axis(shape: &[usize], axis: usize, threads: usize) -> Vec<TensorSlice> {
    let dim = shape.get(axis).copied().unwrap_or(1);
    let step = dim.div_ceil(threads.max(1)).max(1);
    let parts = dim.div_ceil(step).max(1);
    (0..parts)
        .map(|t| {
            shape
                .iter()
                .enumerate()
                .map(|(a, &d)| {
                    if a == axis {
                        let lower = (t * step).min(dim);
                        let higher = ((t + 1) * step).min(dim);
                        DimRange::new(lower, higher)
                    } else {
                        DimRange::full(d)
                    }
                })
                .collect()
        })
        .collect()
}
