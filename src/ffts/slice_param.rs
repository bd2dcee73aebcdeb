//! Slice-to-param generation.
//!
//! Turns the memory slice one thread touches into addressing records the
//! data contexts can carry. A record describes `num_outer` groups of
//! `num_inner` runs of `len_inner` contiguous bytes:
//!
//! ```text
//! for o in 0..num_outer:
//!     for i in 0..num_inner:
//!         copy base + o * stride_outer + i * stride_inner, len_inner bytes
//! ```
//!
//! Slices that need more than two loop levels are emitted as several records.
//! A non-zero burst budget splits records so no record moves more than
//! `burst_len` bytes where a split point exists.

use serde::{Deserialize, Serialize};

use crate::error::{CtxForgeError, ForgeResult};
use crate::ffts::cache_op::TensorDirection;
use crate::ffts::context::AddrQuad;
use crate::ffts::mode::ThreadingMode;
use crate::graph::shape::row_major_strides;
use crate::graph::{DimRange, Node, TensorDesc, TensorSlice};

/// One addressing record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataParam {
    pub len_inner: u32,
    pub num_inner: u32,
    pub num_outer: u32,
    pub stride_inner: u32,
    pub stride_outer: u32,
    pub base_addr_offset: u64,
}

impl DataParam {
    /// Single contiguous run of `len` bytes
    pub fn contiguous(len: u32, base_addr_offset: u64) -> Self {
        Self {
            len_inner: len,
            num_inner: 1,
            num_outer: 1,
            stride_inner: len,
            stride_outer: len,
            base_addr_offset,
        }
    }

    pub fn quad(&self) -> AddrQuad {
        AddrQuad {
            len_inner: self.len_inner,
            num_inner: self.num_inner,
            num_outer: self.num_outer,
            stride_inner: self.stride_inner,
            stride_outer: self.stride_outer,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.quad().total_bytes()
    }

    pub fn is_contiguous(&self) -> bool {
        self.num_inner == 1 && self.num_outer == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRequest {
    pub slot: usize,
    pub direction: TensorDirection,
    pub burst_len: u64,
    pub mode: ThreadingMode,
}

/// Source of addressing records for one tensor slot.
///
/// Manual mode expects the records of thread 0, already split by the burst
/// budget. Auto mode expects exactly two records: the non-tail window
/// template followed by the tail window template (one record when the node
/// has a single thread). No records means the slot has no work.
pub trait SliceParamGenerator {
    fn generate(&self, node: &Node, request: &SliceRequest) -> ForgeResult<Vec<DataParam>>;
}

/// Generator for row-major tensors described by the node's thread slices
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMajorSliceParams;

impl RowMajorSliceParams {
    pub fn new() -> Self {
        Self
    }

    fn thread_slice(
        node: &Node,
        desc: &TensorDesc,
        direction: TensorDirection,
        thread: usize,
        slot: usize,
    ) -> ForgeResult<TensorSlice> {
        let Some(info) = node.slice_info.as_ref() else {
            return Ok(full_slice(desc));
        };
        let slice = match direction {
            TensorDirection::Input => info.input_slice(thread, slot),
            TensorDirection::Output => info.output_slice(thread, slot),
        };
        match slice {
            Ok(slice) if !slice.is_empty() => Ok(slice.clone()),
            // Operands the slicer left untouched are read whole
            _ => Ok(full_slice(desc)),
        }
    }
}

impl SliceParamGenerator for RowMajorSliceParams {
    fn generate(&self, node: &Node, request: &SliceRequest) -> ForgeResult<Vec<DataParam>> {
        let desc = match request.direction {
            TensorDirection::Input => node.input_desc(request.slot)?,
            TensorDirection::Output => node.output_desc(request.slot)?,
        };
        let elem = desc.element_size();

        match request.mode {
            ThreadingMode::Manual => {
                let slice = Self::thread_slice(node, desc, request.direction, 0, request.slot)?;
                if !has_work(&slice) {
                    return Ok(Vec::new());
                }
                let params = slice_to_params(&desc.shape, elem, &slice)?;
                split_by_burst(&params, request.burst_len)
            }
            ThreadingMode::Auto => {
                let info = node
                    .slice_info
                    .as_ref()
                    .ok_or_else(|| CtxForgeError::MissingThreadSlice(node.name.clone()))?;
                let threads = info.slice_instance_num;
                if threads == 0 {
                    return Err(CtxForgeError::InvalidSlice(format!(
                        "node '{}' has zero thread slices",
                        node.name
                    )));
                }
                let mut templates = Vec::with_capacity(2);
                let window_threads = if threads == 1 {
                    vec![0]
                } else {
                    vec![0, threads - 1]
                };
                for thread in window_threads {
                    let slice =
                        Self::thread_slice(node, desc, request.direction, thread, request.slot)?;
                    if !has_work(&slice) {
                        if thread == 0 {
                            return Ok(Vec::new());
                        }
                        return Err(CtxForgeError::InvalidSlice(format!(
                            "node '{}' slot {}: tail thread {} has no work, {} threads exceed the split",
                            node.name, request.slot, thread, threads
                        )));
                    }
                    let params = slice_to_params(&desc.shape, elem, &slice)?;
                    match params.as_slice() {
                        [single] => templates.push(*single),
                        _ => {
                            return Err(CtxForgeError::InvalidSlice(format!(
                                "node '{}' slot {}: thread {} slice needs {} records, window template needs 1",
                                node.name,
                                request.slot,
                                thread,
                                params.len()
                            )))
                        }
                    }
                }
                Ok(templates)
            }
            ThreadingMode::Dynamic => Err(CtxForgeError::InvalidSlice(format!(
                "node '{}' has a dynamic shape, no static addressing",
                node.name
            ))),
        }
    }
}

fn has_work(slice: &TensorSlice) -> bool {
    slice.iter().all(|range| !range.is_empty())
}

fn full_slice(desc: &TensorDesc) -> TensorSlice {
    desc.shape.iter().map(|&d| DimRange::full(d)).collect()
}

fn to_u32(value: u64, what: &str) -> ForgeResult<u32> {
    u32::try_from(value)
        .map_err(|_| CtxForgeError::InvalidSlice(format!("{} {} does not fit 32 bits", what, value)))
}

/// Addressing records for the row-major slice `ranges` of a tensor of `shape`.
pub fn slice_to_params(
    shape: &[usize],
    elem_size: usize,
    ranges: &[DimRange],
) -> ForgeResult<Vec<DataParam>> {
    if ranges.len() != shape.len() {
        return Err(CtxForgeError::InvalidSlice(format!(
            "slice rank {} does not match tensor rank {}",
            ranges.len(),
            shape.len()
        )));
    }
    for (axis, (range, &dim)) in ranges.iter().zip(shape).enumerate() {
        if range.higher > dim || range.is_empty() {
            return Err(CtxForgeError::InvalidSlice(format!(
                "axis {} range [{}, {}) invalid for dim {}",
                axis, range.lower, range.higher, dim
            )));
        }
    }

    let elem = elem_size as u64;
    let strides = row_major_strides(shape);
    let base: u64 = ranges
        .iter()
        .zip(&strides)
        .map(|(r, &s)| r.lower as u64 * s as u64 * elem)
        .sum();

    // Innermost contiguous run: fully covered inner axes plus the first partial one
    let mut run = elem;
    let mut split = shape.len();
    while split > 0 {
        split -= 1;
        run *= ranges[split].len() as u64;
        if ranges[split].len() != shape[split] {
            break;
        }
    }

    // Remaining loop axes, outermost first, as (count, byte stride)
    let mut loops: Vec<(u64, u64)> = Vec::new();
    for axis in (0..split).rev() {
        let count = ranges[axis].len() as u64;
        if count == 1 {
            continue;
        }
        let stride = strides[axis] as u64 * elem;
        match loops.first_mut() {
            Some(inner) if stride == inner.1 * inner.0 => inner.0 *= count,
            _ => loops.insert(0, (count, stride)),
        }
    }

    let len_inner = to_u32(run, "run length")?;
    let mut params = Vec::new();
    match loops.len() {
        0 => params.push(DataParam::contiguous(len_inner, base)),
        1 => {
            let (count, stride) = loops[0];
            params.push(DataParam {
                len_inner,
                num_inner: to_u32(count, "inner count")?,
                num_outer: 1,
                stride_inner: to_u32(stride, "inner stride")?,
                stride_outer: to_u32(stride * count, "outer stride")?,
                base_addr_offset: base,
            });
        }
        n => {
            let (outer_count, outer_stride) = loops[n - 2];
            let (inner_count, inner_stride) = loops[n - 1];
            let template = DataParam {
                len_inner,
                num_inner: to_u32(inner_count, "inner count")?,
                num_outer: to_u32(outer_count, "outer count")?,
                stride_inner: to_u32(inner_stride, "inner stride")?,
                stride_outer: to_u32(outer_stride, "outer stride")?,
                base_addr_offset: base,
            };
            // Leading loops become separate records, odometer order
            let leading = &loops[..n - 2];
            let mut index = vec![0u64; leading.len()];
            loop {
                let offset: u64 = index
                    .iter()
                    .zip(leading)
                    .map(|(&i, &(_, stride))| i * stride)
                    .sum();
                params.push(DataParam {
                    base_addr_offset: base + offset,
                    ..template
                });
                let mut axis = leading.len();
                loop {
                    if axis == 0 {
                        return Ok(params);
                    }
                    axis -= 1;
                    index[axis] += 1;
                    if index[axis] < leading[axis].0 {
                        break;
                    }
                    index[axis] = 0;
                }
            }
        }
    }
    Ok(params)
}

/// Split records so that each moves at most `burst_len` bytes; 0 disables splitting.
pub fn split_by_burst(params: &[DataParam], burst_len: u64) -> ForgeResult<Vec<DataParam>> {
    if burst_len == 0 {
        return Ok(params.to_vec());
    }
    let mut out = Vec::new();
    for p in params {
        if p.total_bytes() <= burst_len {
            out.push(*p);
            continue;
        }
        if p.is_contiguous() {
            split_run(p.len_inner as u64, p.base_addr_offset, burst_len, &mut out)?;
            continue;
        }

        let row_bytes = p.len_inner as u64 * p.num_inner as u64;
        if p.num_outer > 1 && row_bytes <= burst_len {
            let per_chunk = (burst_len / row_bytes).min(p.num_outer as u64) as u32;
            let mut start = 0u32;
            while start < p.num_outer {
                let count = per_chunk.min(p.num_outer - start);
                out.push(DataParam {
                    num_outer: count,
                    base_addr_offset: p.base_addr_offset
                        + start as u64 * p.stride_outer as u64,
                    ..*p
                });
                start += count;
            }
            continue;
        }

        for outer in 0..p.num_outer as u64 {
            let row_base = p.base_addr_offset + outer * p.stride_outer as u64;
            if p.len_inner as u64 <= burst_len {
                let per_chunk = (burst_len / p.len_inner as u64).min(p.num_inner as u64) as u32;
                let mut start = 0u32;
                while start < p.num_inner {
                    let count = per_chunk.min(p.num_inner - start);
                    out.push(DataParam {
                        num_inner: count,
                        num_outer: 1,
                        stride_outer: to_u32(
                            count as u64 * p.stride_inner as u64,
                            "outer stride",
                        )?,
                        base_addr_offset: row_base + start as u64 * p.stride_inner as u64,
                        ..*p
                    });
                    start += count;
                }
            } else {
                for inner in 0..p.num_inner as u64 {
                    let run_base = row_base + inner * p.stride_inner as u64;
                    split_run(p.len_inner as u64, run_base, burst_len, &mut out)?;
                }
            }
        }
    }
    Ok(out)
}

fn split_run(len: u64, base: u64, burst_len: u64, out: &mut Vec<DataParam>) -> ForgeResult<()> {
    let mut offset = 0u64;
    while offset < len {
        let chunk = burst_len.min(len - offset);
        out.push(DataParam::contiguous(to_u32(chunk, "chunk length")?, base + offset));
        offset += chunk;
    }
    Ok(())
}
