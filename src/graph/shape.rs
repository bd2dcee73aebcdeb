//! Shape helpers for the compute graph.

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().copied().product()
}

pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride: usize = 1;
    for dim in shape.iter().rev() {
        strides.push(stride);
        stride = stride.saturating_mul(*dim);
    }
    strides.reverse();
    strides
}
