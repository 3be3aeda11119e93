//! In-memory tensor data.
//!
//! [`TensorData`] is a dense, row-major n-dimensional buffer of a single [`DataType`].
//! It is the unit exchanged with the chunk engine when reading and writing tensor leaves.

use itertools::Itertools;
use thiserror::Error;

use crate::data_type::{DataType, Element, dispatch_data_type};

/// A tensor data error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TensorDataError {
    /// The number of bytes does not match the shape and data type.
    #[error("expected {expected} bytes for shape {shape:?} and data type {data_type}, got {got}")]
    InvalidBytesLength {
        /// The data type.
        data_type: DataType,
        /// The shape.
        shape: Vec<u64>,
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },
    /// A value cannot be represented by the target data type.
    #[error("the value {value} cannot be represented by data type {data_type}")]
    CastOutOfRange {
        /// The value.
        value: String,
        /// The target data type.
        data_type: DataType,
    },
    /// Incompatible shapes.
    #[error("incompatible shapes {0:?} and {1:?}")]
    IncompatibleShapes(Vec<u64>, Vec<u64>),
    /// Incompatible data types.
    #[error("incompatible data types {0} and {1}")]
    IncompatibleDataTypes(DataType, DataType),
    /// An index is out of bounds.
    #[error("index {index} is out of bounds for an axis of size {size}")]
    OutOfBounds {
        /// The index.
        index: u64,
        /// The size of the axis.
        size: u64,
    },
    /// Cannot stack an empty list of tensors.
    #[error("cannot stack an empty list of tensors")]
    EmptyStack,
}

/// A dense n-dimensional tensor buffer in native byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    data_type: DataType,
    shape: Vec<u64>,
    bytes: Vec<u8>,
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn usize_from(value: u64) -> usize {
    value as usize
}

pub(crate) fn num_elements(shape: &[u64]) -> u64 {
    shape.iter().product()
}

/// Returns `shape` with every axis of size one removed.
pub(crate) fn squeezed(shape: &[u64]) -> Vec<u64> {
    shape.iter().copied().filter(|&size| size != 1).collect()
}

impl TensorData {
    /// Create tensor data from native-endian bytes.
    ///
    /// # Errors
    /// Returns [`TensorDataError::InvalidBytesLength`] if the length of `bytes` does not match `shape` and `data_type`.
    pub fn new(
        data_type: DataType,
        shape: Vec<u64>,
        bytes: Vec<u8>,
    ) -> Result<Self, TensorDataError> {
        let expected = usize_from(num_elements(&shape)) * data_type.size();
        if bytes.len() == expected {
            Ok(Self {
                data_type,
                shape,
                bytes,
            })
        } else {
            Err(TensorDataError::InvalidBytesLength {
                data_type,
                shape,
                expected,
                got: bytes.len(),
            })
        }
    }

    /// Create zero-filled tensor data.
    #[must_use]
    pub fn zeros(data_type: DataType, shape: Vec<u64>) -> Self {
        let len = usize_from(num_elements(&shape)) * data_type.size();
        Self {
            data_type,
            shape,
            bytes: vec![0; len],
        }
    }

    /// Create tensor data from a slice of elements.
    ///
    /// # Errors
    /// Returns an error if the number of elements does not match `shape`.
    pub fn from_elements<T: Element>(
        shape: Vec<u64>,
        elements: &[T],
    ) -> Result<Self, TensorDataError> {
        Self::new(T::DATA_TYPE, shape, bytemuck::cast_slice(elements).to_vec())
    }

    /// Create one dimensional tensor data from a vector of elements.
    #[must_use]
    pub fn from_vec<T: Element>(elements: Vec<T>) -> Self {
        Self {
            data_type: T::DATA_TYPE,
            shape: vec![elements.len() as u64],
            bytes: bytemuck::cast_slice(&elements).to_vec(),
        }
    }

    /// Create zero dimensional tensor data holding a single element.
    #[must_use]
    pub fn from_scalar<T: Element>(element: T) -> Self {
        Self {
            data_type: T::DATA_TYPE,
            shape: vec![],
            bytes: bytemuck::bytes_of(&element).to_vec(),
        }
    }

    /// Create boolean tensor data.
    ///
    /// # Errors
    /// Returns an error if the number of elements does not match `shape`.
    pub fn from_bools(shape: Vec<u64>, elements: &[bool]) -> Result<Self, TensorDataError> {
        Self::new(
            DataType::Bool,
            shape,
            elements.iter().map(|&b| u8::from(b)).collect(),
        )
    }

    /// Create zero dimensional boolean tensor data.
    #[must_use]
    pub fn from_bool(element: bool) -> Self {
        Self {
            data_type: DataType::Bool,
            shape: vec![],
            bytes: vec![u8::from(element)],
        }
    }

    /// Create filled tensor data by repeating the single element of `scalar`.
    ///
    /// # Errors
    /// Returns [`TensorDataError::IncompatibleShapes`] if `scalar` has more than one element.
    pub fn broadcast_scalar(scalar: &Self, shape: Vec<u64>) -> Result<Self, TensorDataError> {
        if scalar.num_elements() != 1 {
            return Err(TensorDataError::IncompatibleShapes(scalar.shape.clone(), shape));
        }
        let bytes = scalar.bytes.repeat(usize_from(num_elements(&shape)));
        Ok(Self {
            data_type: scalar.data_type,
            shape,
            bytes,
        })
    }

    /// The data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// The number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        num_elements(&self.shape)
    }

    /// Returns true if the tensor holds exactly one element.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.num_elements() == 1
    }

    /// The native-endian bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the tensor and return its native-endian bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Return the elements as a vector of `T`, casting if the data type differs.
    ///
    /// # Errors
    /// Returns [`TensorDataError::CastOutOfRange`] if an element cannot be represented by `T`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorDataError> {
        if self.data_type == T::DATA_TYPE {
            Ok(bytemuck::pod_collect_to_vec(&self.bytes))
        } else {
            Ok(bytemuck::pod_collect_to_vec(&self.cast(T::DATA_TYPE)?.bytes))
        }
    }

    /// Return the elements as `f64`.
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch_data_type!(self.data_type, T => {
            bytemuck::pod_collect_to_vec::<u8, T>(&self.bytes)
                .into_iter()
                .map(|element| num::ToPrimitive::to_f64(&element).unwrap_or(f64::NAN))
                .collect()
        })
    }

    /// Cast to another data type.
    ///
    /// Floats are truncated when cast to integers.
    ///
    /// # Errors
    /// Returns [`TensorDataError::CastOutOfRange`] if an element cannot be represented by `data_type`.
    pub fn cast(&self, data_type: DataType) -> Result<Self, TensorDataError> {
        if self.data_type == data_type {
            return Ok(self.clone());
        }
        let bytes = dispatch_data_type!(self.data_type, S => {
            let source: Vec<S> = bytemuck::pod_collect_to_vec(&self.bytes);
            cast_elements(&source, data_type)?
        });
        Ok(Self {
            data_type,
            shape: self.shape.clone(),
            bytes,
        })
    }

    /// Change the shape without changing the elements.
    ///
    /// # Errors
    /// Returns [`TensorDataError::IncompatibleShapes`] if the number of elements differs.
    pub fn reshape(mut self, shape: Vec<u64>) -> Result<Self, TensorDataError> {
        if num_elements(&shape) == self.num_elements() {
            self.shape = shape;
            Ok(self)
        } else {
            Err(TensorDataError::IncompatibleShapes(self.shape, shape))
        }
    }

    /// Stack tensors of equal shape and data type along a new leading axis.
    ///
    /// # Errors
    /// Returns an error if `items` is empty or the shapes or data types differ.
    pub fn stack(items: &[Self]) -> Result<Self, TensorDataError> {
        let first = items.first().ok_or(TensorDataError::EmptyStack)?;
        let mut bytes = Vec::with_capacity(first.bytes.len() * items.len());
        for item in items {
            if item.data_type != first.data_type {
                return Err(TensorDataError::IncompatibleDataTypes(
                    first.data_type,
                    item.data_type,
                ));
            }
            if item.shape != first.shape {
                return Err(TensorDataError::IncompatibleShapes(
                    first.shape.clone(),
                    item.shape.clone(),
                ));
            }
            bytes.extend_from_slice(&item.bytes);
        }
        let shape = std::iter::once(items.len() as u64)
            .chain(first.shape.iter().copied())
            .collect();
        Ok(Self {
            data_type: first.data_type,
            shape,
            bytes,
        })
    }

    /// Return the sub-tensor at `index` along the leading axis.
    ///
    /// # Errors
    /// Returns [`TensorDataError::OutOfBounds`] if the tensor is zero dimensional or `index` is out of bounds.
    pub fn index_axis0(&self, index: u64) -> Result<Self, TensorDataError> {
        let size = self.shape.first().copied().unwrap_or(0);
        if index >= size {
            return Err(TensorDataError::OutOfBounds { index, size });
        }
        let stride = self.bytes.len() / usize_from(size);
        let start = usize_from(index) * stride;
        Ok(Self {
            data_type: self.data_type,
            shape: self.shape[1..].to_vec(),
            bytes: self.bytes[start..start + stride].to_vec(),
        })
    }

    /// Split the tensor into its sub-tensors along the leading axis.
    ///
    /// # Errors
    /// Returns [`TensorDataError::OutOfBounds`] if the tensor is zero dimensional.
    pub fn split_axis0(&self) -> Result<Vec<Self>, TensorDataError> {
        if self.shape.is_empty() {
            return Err(TensorDataError::OutOfBounds { index: 0, size: 0 });
        }
        (0..self.shape[0]).map(|i| self.index_axis0(i)).collect()
    }

    /// Returns true if every byte of the elements is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

fn cast_elements<S: Element>(
    source: &[S],
    data_type: DataType,
) -> Result<Vec<u8>, TensorDataError> {
    let out_of_range = |element: &S| TensorDataError::CastOutOfRange {
        value: format!("{element:?}"),
        data_type,
    };
    if data_type == DataType::Bool {
        return source
            .iter()
            .map(|element| {
                element
                    .to_f64()
                    .map(|value| u8::from(value != 0.0))
                    .ok_or_else(|| out_of_range(element))
            })
            .collect();
    }
    dispatch_data_type!(data_type, T => {
        let target = source
            .iter()
            .map(|element| <T as num::NumCast>::from(*element).ok_or_else(|| out_of_range(element)))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(bytemuck::pod_collect_to_vec::<T, u8>(&target))
    })
}

impl std::fmt::Display for TensorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TensorData(shape=({}), dtype='{}')",
            self.shape.iter().join(", "),
            self.data_type
        )
    }
}

#[cfg(feature = "ndarray")]
impl TensorData {
    /// Convert to an [`ndarray::ArrayD`], casting if the data type differs.
    ///
    /// # Errors
    /// Returns an error if an element cannot be represented by `T`.
    pub fn to_ndarray<T: Element>(&self) -> Result<ndarray::ArrayD<T>, TensorDataError> {
        let elements = self.to_vec::<T>()?;
        let shape: Vec<usize> = self.shape.iter().map(|&size| usize_from(size)).collect();
        ndarray::ArrayD::from_shape_vec(shape, elements)
            .map_err(|_| {
                TensorDataError::IncompatibleShapes(self.shape.clone(), self.shape.clone())
            })
    }
}

#[cfg(feature = "ndarray")]
impl<T: Element, D: ndarray::Dimension> From<ndarray::Array<T, D>> for TensorData {
    fn from(array: ndarray::Array<T, D>) -> Self {
        let shape = array.shape().iter().map(|&size| size as u64).collect();
        let elements: Vec<T> = array.iter().copied().collect();
        Self {
            data_type: T::DATA_TYPE,
            shape,
            bytes: bytemuck::cast_slice(&elements).to_vec(),
        }
    }
}

/// Convert native-endian element bytes to little-endian in place, or back.
pub(crate) fn swap_to_from_little_endian(bytes: &mut [u8], element_size: usize) {
    if cfg!(target_endian = "big") && element_size > 1 {
        for element in bytes.chunks_exact_mut(element_size) {
            element.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_data_new_validates_length() {
        assert!(TensorData::new(DataType::UInt16, vec![2, 2], vec![0; 8]).is_ok());
        assert!(matches!(
            TensorData::new(DataType::UInt16, vec![2, 2], vec![0; 7]),
            Err(TensorDataError::InvalidBytesLength { expected: 8, got: 7, .. })
        ));
    }

    #[test]
    fn tensor_data_is_zero() {
        assert!(TensorData::zeros(DataType::Float32, vec![3, 2]).is_zero());
        assert!(TensorData::from_vec(vec![0i16, 0]).is_zero());
        assert!(!TensorData::from_vec(vec![0i16, 1]).is_zero());
    }

    #[test]
    fn tensor_data_cast() {
        let data = TensorData::from_vec(vec![0.2f64, 1.9, 255.0]);
        let cast = data.cast(DataType::UInt8).unwrap();
        assert_eq!(cast.to_vec::<u8>().unwrap(), vec![0, 1, 255]);
        assert!(matches!(
            TensorData::from_vec(vec![256.0f64]).cast(DataType::UInt8),
            Err(TensorDataError::CastOutOfRange { .. })
        ));
        assert!(TensorData::from_vec(vec![-1i32]).cast(DataType::UInt32).is_err());
        let bools = TensorData::from_vec(vec![0i64, 3]).cast(DataType::Bool).unwrap();
        assert_eq!(bools.bytes(), &[0, 1]);
        let half = TensorData::from_vec(vec![1.5f32]).cast(DataType::Float16).unwrap();
        assert_eq!(half.to_vec::<f32>().unwrap(), vec![1.5]);
    }

    #[test]
    fn tensor_data_stack_and_split() {
        let a = TensorData::from_elements(vec![2], &[1u8, 2]).unwrap();
        let b = TensorData::from_elements(vec![2], &[3u8, 4]).unwrap();
        let stacked = TensorData::stack(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(stacked.shape(), &[2, 2]);
        assert_eq!(stacked.bytes(), &[1, 2, 3, 4]);
        assert_eq!(stacked.split_axis0().unwrap(), vec![a, b]);
        assert_eq!(stacked.index_axis0(1).unwrap().bytes(), &[3, 4]);
        assert!(stacked.index_axis0(2).is_err());
        assert_eq!(TensorData::stack(&[]), Err(TensorDataError::EmptyStack));
    }

    #[test]
    fn tensor_data_broadcast_scalar() {
        let scalar = TensorData::from_scalar(7i16);
        let filled = TensorData::broadcast_scalar(&scalar, vec![2, 3]).unwrap();
        assert_eq!(filled.to_vec::<i16>().unwrap(), vec![7; 6]);
        assert!(TensorData::broadcast_scalar(&filled, vec![6]).is_err());
    }

    #[test]
    fn tensor_data_squeezed() {
        assert_eq!(squeezed(&[1, 100, 1]), vec![100]);
        assert!(squeezed(&[1, 1]).is_empty());
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn tensor_data_ndarray() {
        let array = ndarray::Array2::<f32>::ones((2, 3));
        let data = TensorData::from(array.clone());
        assert_eq!(data.shape(), &[2, 3]);
        assert_eq!(data.to_ndarray::<f32>().unwrap(), array.into_dyn());
    }
}
