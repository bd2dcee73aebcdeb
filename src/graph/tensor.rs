//! Tensor descriptors for the compute graph.

use serde::{Deserialize, Serialize};

use crate::graph::shape::{element_count, row_major_strides};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float32,
    Float16,
    BFloat16,
    Int8,
    UInt8,
    Int32,
    Int64,
}

impl DType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Float16 | DType::BFloat16 => 2,
            DType::Int8 | DType::UInt8 => 1,
            DType::Int64 => 8,
        }
    }
}

/// Shape and element type of one operand, always row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDesc {
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Element strides, outermost axis first.
    pub strides: Vec<usize>,
}

impl TensorDesc {
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        let strides = row_major_strides(&shape);
        Self {
            shape,
            dtype,
            strides,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn element_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }

    pub fn byte_size(&self) -> usize {
        self.element_count().saturating_mul(self.element_size())
    }

    pub fn set_shape(&mut self, shape: Vec<usize>) {
        self.strides = row_major_strides(&shape);
        self.shape = shape;
    }
}
