//! Tensor - Host Handle for Engine Tensors
//!
//! `Tensor` stands in for a device tensor owned by the external compute
//! engine. Values live on the host as `f64` and are quantized to the declared
//! [`DType`] on every write, so a tensor always holds exactly what the engine
//! would hold while its byte size reflects the declared element width.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use core::fmt;

use crate::dtype::DType;
use crate::error::{TensorError, TensorResult};

// =============================================================================
// Tensor Struct
// =============================================================================

/// A dense, contiguous N-dimensional tensor tagged with an element type.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f64>,
    shape: Vec<usize>,
    dtype: DType,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a tensor from a vector with the given shape and dtype.
    ///
    /// Returns an error if the number of values does not match the shape.
    pub fn from_vec(data: Vec<f64>, shape: &[usize], dtype: DType) -> TensorResult<Self> {
        let expected = numel(shape);
        if expected != data.len() {
            return Err(TensorError::shape_mismatch(shape, &[data.len()]));
        }
        let data = data.into_iter().map(|v| dtype.quantize(v)).collect();
        Ok(Self {
            data,
            shape: shape.to_vec(),
            dtype,
        })
    }

    /// Creates a 1-D tensor from a slice.
    #[must_use]
    pub fn from_slice(data: &[f64], dtype: DType) -> Self {
        Self {
            data: data.iter().map(|&v| dtype.quantize(v)).collect(),
            shape: vec![data.len()],
            dtype,
        }
    }

    /// Creates a zero-initialized tensor.
    #[must_use]
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        Self {
            data: vec![0.0; numel(shape)],
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Creates a 0-dimensional tensor holding one value.
    #[must_use]
    pub fn scalar(value: f64, dtype: DType) -> Self {
        Self {
            data: vec![dtype.quantize(value)],
            shape: Vec::new(),
            dtype,
        }
    }

    /// Stacks equally shaped tensors along a new leading dimension.
    pub fn stack(tensors: &[Tensor]) -> TensorResult<Self> {
        let first = tensors.first().ok_or(TensorError::EmptyTensor)?;
        let mut data = Vec::with_capacity(first.numel() * tensors.len());
        for t in tensors {
            if t.shape != first.shape {
                return Err(TensorError::shape_mismatch(&first.shape, &t.shape));
            }
            if t.dtype != first.dtype {
                return Err(TensorError::DTypeMismatch {
                    expected: first.dtype,
                    actual: t.dtype,
                });
            }
            data.extend_from_slice(&t.data);
        }
        let mut shape = vec![tensors.len()];
        shape.extend_from_slice(&first.shape);
        Ok(Self {
            data,
            shape,
            dtype: first.dtype,
        })
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor has zero elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the width in bytes of one element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.dtype.size_of()
    }

    /// Returns the byte size of the tensor payload.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.numel() * self.element_size()
    }

    /// Returns the values as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Returns a copy of the values.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    /// Returns the single value of a one-element tensor.
    pub fn item(&self) -> TensorResult<f64> {
        if self.data.len() == 1 {
            Ok(self.data[0])
        } else {
            Err(TensorError::NotScalar {
                numel: self.data.len(),
            })
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Overwrites the values in place, quantizing to this tensor's dtype.
    pub fn copy_from_slice(&mut self, values: &[f64]) -> TensorResult<()> {
        if values.len() != self.data.len() {
            return Err(TensorError::shape_mismatch(&[self.data.len()], &[values.len()]));
        }
        let dtype = self.dtype;
        for (dst, &src) in self.data.iter_mut().zip(values) {
            *dst = dtype.quantize(src);
        }
        Ok(())
    }

    /// Adds a value to every element in place.
    pub fn add_scalar_(&mut self, value: f64) {
        let dtype = self.dtype;
        for v in &mut self.data {
            *v = dtype.quantize(*v + value);
        }
    }

    /// Sets every element to zero.
    pub fn zero_(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Sums all elements.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Elementwise exponential.
    #[must_use]
    pub fn exp(&self) -> Self {
        self.map(f64::exp)
    }

    /// Divides every element by a scalar.
    #[must_use]
    pub fn div_scalar(&self, divisor: f64) -> Self {
        self.map(|v| v / divisor)
    }

    /// Multiplies every element by a scalar.
    #[must_use]
    pub fn mul_scalar(&self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    /// Converts to another dtype, quantizing values.
    #[must_use]
    pub fn to_dtype(&self, dtype: DType) -> Self {
        Self {
            data: self.data.iter().map(|&v| dtype.quantize(v)).collect(),
            shape: self.shape.clone(),
            dtype,
        }
    }

    /// Returns the size of the last dimension (1 for scalars).
    #[must_use]
    pub fn last_dim(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Returns the number of rows when viewed as `[rows, last_dim]`.
    #[must_use]
    pub fn rows(&self) -> usize {
        match self.last_dim() {
            0 => 0,
            cols => self.numel() / cols,
        }
    }

    /// Index of the first maximal element of each row along the last dimension.
    pub fn argmax_last(&self) -> TensorResult<Vec<usize>> {
        let cols = self.last_dim();
        if cols == 0 || self.is_empty() {
            return Err(TensorError::EmptyTensor);
        }
        Ok(self
            .data
            .chunks(cols)
            .map(|row| argmax_row(row).0)
            .collect())
    }

    /// Maximal value and its index for each row along the last dimension.
    pub fn max_last(&self) -> TensorResult<Vec<(f64, usize)>> {
        let cols = self.last_dim();
        if cols == 0 || self.is_empty() {
            return Err(TensorError::EmptyTensor);
        }
        Ok(self
            .data
            .chunks(cols)
            .map(|row| {
                let (idx, val) = argmax_row(row);
                (val, idx)
            })
            .collect())
    }

    /// Returns the sub-tensor `start..start + len` along `dim`.
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> TensorResult<Self> {
        if dim >= self.ndim() {
            return Err(TensorError::InvalidDimension {
                index: dim,
                ndim: self.ndim(),
            });
        }
        let size = self.shape[dim];
        if start + len > size {
            return Err(TensorError::OutOfBounds {
                start,
                end: start + len,
                size,
            });
        }

        let outer: usize = self.shape[..dim].iter().product();
        let inner: usize = self.shape[dim + 1..].iter().product();
        let mut data = Vec::with_capacity(outer * len * inner);
        for o in 0..outer {
            let base = o * size * inner;
            data.extend_from_slice(&self.data[base + start * inner..base + (start + len) * inner]);
        }

        let mut shape = self.shape.clone();
        shape[dim] = len;
        Ok(Self {
            data,
            shape,
            dtype: self.dtype,
        })
    }

    /// Splits `dim` into `parts` equal chunks and returns chunk `index`.
    pub fn chunk(&self, dim: usize, parts: usize, index: usize) -> TensorResult<Self> {
        if dim >= self.ndim() {
            return Err(TensorError::InvalidDimension {
                index: dim,
                ndim: self.ndim(),
            });
        }
        let size = self.shape[dim];
        if parts == 0 || size % parts != 0 {
            return Err(TensorError::shape_mismatch(&[parts], &[size]));
        }
        let len = size / parts;
        self.narrow(dim, index * len, len)
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        let dtype = self.dtype;
        Self {
            data: self.data.iter().map(|&v| dtype.quantize(f(v))).collect(),
            shape: self.shape.clone(),
            dtype,
        }
    }
}

fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// First index holding the row maximum; NaN never wins.
fn argmax_row(row: &[f64]) -> (usize, f64) {
    let mut best = (0, row[0]);
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > best.1 || (best.1.is_nan() && !v.is_nan()) {
            best = (i, v);
        }
    }
    best
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("numel", &self.numel())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_shape_check() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], DType::F32).unwrap();
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.numel(), 4);

        let err = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2], DType::F32).unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_nbytes_uses_element_width() {
        let t = Tensor::zeros(&[1024], DType::F32);
        assert_eq!(t.nbytes(), 4096);
        assert_eq!(t.to_dtype(DType::F16).nbytes(), 2048);
        assert_eq!(Tensor::zeros(&[3, 5], DType::I64).nbytes(), 120);
    }

    #[test]
    fn test_integer_tensor_quantizes() {
        let mut t = Tensor::zeros(&[2], DType::I32);
        t.copy_from_slice(&[1.7, -3.2]).unwrap();
        assert_eq!(t.to_vec(), vec![1.0, -3.0]);
    }

    #[test]
    fn test_stack() {
        let a = Tensor::scalar(3.0, DType::I64);
        let b = Tensor::scalar(4.0, DType::I64);
        let s = Tensor::stack(&[a, b]).unwrap();
        assert_eq!(s.shape(), &[2]);
        assert_eq!(s.to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_stack_rejects_mixed_dtype() {
        let a = Tensor::scalar(3.0, DType::I64);
        let b = Tensor::scalar(4.0, DType::F32);
        assert!(matches!(
            Tensor::stack(&[a, b]),
            Err(TensorError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_item() {
        assert_eq!(Tensor::scalar(2.5, DType::F64).item().unwrap(), 2.5);
        assert!(Tensor::zeros(&[2], DType::F32).item().is_err());
    }

    #[test]
    fn test_argmax_last_first_occurrence() {
        let t = Tensor::from_vec(vec![0.1, 0.9, 0.9, 0.5, 0.2, 0.1], &[2, 3], DType::F32).unwrap();
        assert_eq!(t.argmax_last().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_narrow_last_dim() {
        let t = Tensor::from_vec((0..6).map(f64::from).collect(), &[2, 3], DType::F32).unwrap();
        let n = t.narrow(1, 1, 2).unwrap();
        assert_eq!(n.shape(), &[2, 2]);
        assert_eq!(n.to_vec(), vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_chunk_rows() {
        let t = Tensor::from_vec((0..8).map(f64::from).collect(), &[4, 2], DType::F32).unwrap();
        let c = t.chunk(0, 2, 1).unwrap();
        assert_eq!(c.to_vec(), vec![4.0, 5.0, 6.0, 7.0]);
        assert!(t.chunk(0, 3, 0).is_err());
    }

    #[test]
    fn test_exp_and_sum() {
        let t = Tensor::from_slice(&[0.0, 1.0], DType::F64);
        assert!((t.exp().sum() - (1.0 + std::f64::consts::E)).abs() < 1e-12);
    }

    #[test]
    fn test_rows() {
        let t = Tensor::zeros(&[2, 3, 5], DType::F32);
        assert_eq!(t.rows(), 6);
        assert_eq!(t.last_dim(), 5);
    }
}
