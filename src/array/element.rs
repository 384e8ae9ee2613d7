//! Typed array elements.

use derive_more::From;
use num::traits::AsPrimitive;
use thiserror::Error;

use super::DataType;

/// A fixed size element of an array.
pub trait Element:
    bytemuck::Pod + PartialOrd + std::fmt::Debug + Send + Sync + AsPrimitive<f64> + 'static
{
    /// The data type of the element.
    const DATA_TYPE: DataType;

    /// Wrap a vector of elements in [`ArrayElements`].
    fn into_array_elements(elements: Vec<Self>) -> ArrayElements;

    /// Borrow the elements of `elements` if they are of this type.
    fn elements_slice(elements: &ArrayElements) -> Option<&[Self]>;

    /// Unwrap the elements of `elements` if they are of this type.
    ///
    /// # Errors
    /// Returns [`IncompatibleElementTypeError`] if `elements` have a different data type.
    fn from_array_elements(elements: ArrayElements) -> Result<Vec<Self>, IncompatibleElementTypeError>;
}

/// An incompatible element type error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("incompatible element type {0}, expected {1}")]
pub struct IncompatibleElementTypeError(DataType, DataType);

impl IncompatibleElementTypeError {
    /// Create a new incompatible element type error.
    #[must_use]
    pub const fn new(got: DataType, expected: DataType) -> Self {
        Self(got, expected)
    }
}

/// An invalid bytes length error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("{0} bytes is not a multiple of the {1} element size")]
pub struct InvalidBytesLengthError(usize, DataType);

/// A vector of elements of a single [`DataType`].
#[derive(Clone, Debug, PartialEq, From)]
#[allow(missing_docs)]
pub enum ArrayElements {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

/// Evaluate `$body` with `$v` bound to the typed vector of an [`ArrayElements`].
macro_rules! with_elements {
    ($elements:expr, $v:ident => $body:expr) => {
        match $elements {
            $crate::array::ArrayElements::Int8($v) => $body,
            $crate::array::ArrayElements::Int16($v) => $body,
            $crate::array::ArrayElements::Int32($v) => $body,
            $crate::array::ArrayElements::Int64($v) => $body,
            $crate::array::ArrayElements::UInt8($v) => $body,
            $crate::array::ArrayElements::UInt16($v) => $body,
            $crate::array::ArrayElements::UInt32($v) => $body,
            $crate::array::ArrayElements::UInt64($v) => $body,
            $crate::array::ArrayElements::Float32($v) => $body,
            $crate::array::ArrayElements::Float64($v) => $body,
        }
    };
}
pub(crate) use with_elements;

/// Evaluate `$body` with `$t` bound to the element type of a [`DataType`].
macro_rules! with_data_type {
    ($data_type:expr, $t:ident => $body:expr) => {
        match $data_type {
            $crate::array::DataType::Int8 => {
                type $t = i8;
                $body
            }
            $crate::array::DataType::Int16 => {
                type $t = i16;
                $body
            }
            $crate::array::DataType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::array::DataType::Int64 => {
                type $t = i64;
                $body
            }
            $crate::array::DataType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::array::DataType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::array::DataType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::array::DataType::UInt64 => {
                type $t = u64;
                $body
            }
            $crate::array::DataType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::array::DataType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}
pub(crate) use with_data_type;

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DATA_TYPE: DataType = DataType::$variant;

            fn into_array_elements(elements: Vec<Self>) -> ArrayElements {
                ArrayElements::$variant(elements)
            }

            fn elements_slice(elements: &ArrayElements) -> Option<&[Self]> {
                if let ArrayElements::$variant(v) = elements {
                    Some(v)
                } else {
                    None
                }
            }

            fn from_array_elements(
                elements: ArrayElements,
            ) -> Result<Vec<Self>, IncompatibleElementTypeError> {
                if let ArrayElements::$variant(v) = elements {
                    Ok(v)
                } else {
                    Err(IncompatibleElementTypeError::new(
                        elements.data_type(),
                        DataType::$variant,
                    ))
                }
            }
        }
    };
}

impl_element!(i8, Int8);
impl_element!(i16, Int16);
impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(u8, UInt8);
impl_element!(u16, UInt16);
impl_element!(u32, UInt32);
impl_element!(u64, UInt64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);

fn cast_slice_as<T, U>(elements: &[T]) -> Vec<U>
where
    T: AsPrimitive<U>,
    U: Copy + 'static,
{
    elements.iter().map(|element| element.as_()).collect()
}

impl ArrayElements {
    /// Create elements of `data_type` from native endian `bytes`.
    ///
    /// # Errors
    /// Returns [`InvalidBytesLengthError`] if the length of `bytes` is not a multiple of the data type size.
    pub fn from_bytes(data_type: DataType, bytes: &[u8]) -> Result<Self, InvalidBytesLengthError> {
        if bytes.len() % data_type.size() != 0 {
            return Err(InvalidBytesLengthError(bytes.len(), data_type));
        }
        Ok(with_data_type!(data_type, T => T::into_array_elements(
            bytemuck::pod_collect_to_vec::<u8, T>(bytes)
        )))
    }

    /// Create elements of `data_type` from `values`, cast with `as` semantics.
    #[must_use]
    pub fn from_f64(data_type: DataType, values: &[f64]) -> Self {
        with_data_type!(data_type, T => T::into_array_elements(cast_slice_as::<f64, T>(values)))
    }

    /// Create `num_elements` copies of a `value` cast to `data_type` with `as` semantics.
    #[must_use]
    pub fn filled(data_type: DataType, value: f64, num_elements: usize) -> Self {
        Self::from_f64(data_type, &vec![value; num_elements])
    }

    /// Return the data type of the elements.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt8(_) => DataType::UInt8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
        }
    }

    /// Return the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        with_elements!(self, v => v.len())
    }

    /// Returns true if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the native endian bytes of the elements.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        with_elements!(self, v => bytemuck::cast_slice::<_, u8>(v.as_slice()).to_vec())
    }

    /// Cast the elements to `data_type` with `as` semantics.
    ///
    /// Floating point values are truncated towards zero and saturate at the bounds of an integer type.
    #[must_use]
    pub fn cast(&self, data_type: DataType) -> Self {
        if self.data_type() == data_type {
            return self.clone();
        }
        with_elements!(self, v => with_data_type!(data_type, U => U::into_array_elements(cast_slice_as(v.as_slice()))))
    }

    /// Return the elements cast to `f64`.
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_elements!(self, v => cast_slice_as(v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_elements_bytes() {
        let elements = ArrayElements::from(vec![1u16, 2, 3]);
        assert_eq!(elements.data_type(), DataType::UInt16);
        assert_eq!(elements.len(), 3);
        let bytes = elements.to_bytes();
        assert_eq!(bytes.len(), 6);
        assert_eq!(
            ArrayElements::from_bytes(DataType::UInt16, &bytes).unwrap(),
            elements
        );
        assert!(ArrayElements::from_bytes(DataType::UInt16, &bytes[1..]).is_err());
    }

    #[test]
    fn array_elements_cast() {
        let elements = ArrayElements::from(vec![-1.5f32, 0.5, 300.0]);
        assert_eq!(
            elements.cast(DataType::UInt8),
            ArrayElements::UInt8(vec![0, 0, 255])
        );
        assert_eq!(
            elements.cast(DataType::Int16),
            ArrayElements::Int16(vec![-1, 0, 300])
        );
        assert_eq!(
            ArrayElements::from(vec![255u8]).cast(DataType::Int8),
            ArrayElements::Int8(vec![-1])
        );
        assert_eq!(elements.to_f64_vec(), vec![-1.5, 0.5, 300.0]);
    }

    #[test]
    fn array_elements_typed() {
        let elements = ArrayElements::filled(DataType::Int32, 7.0, 2);
        assert_eq!(i32::elements_slice(&elements), Some([7, 7].as_slice()));
        assert_eq!(u8::elements_slice(&elements), None);
        assert_eq!(
            u8::from_array_elements(elements.clone()),
            Err(IncompatibleElementTypeError::new(
                DataType::Int32,
                DataType::UInt8
            ))
        );
        assert_eq!(i32::from_array_elements(elements).unwrap(), vec![7, 7]);
    }
}
