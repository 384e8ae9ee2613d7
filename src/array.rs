//! Array primitives.
//!
//! - [`DataType`]: the fixed size element types an operator output may hold.
//! - [`Element`] and [`ArrayElements`]: typed elements and numeric casting between data types.
//! - [`AxisTags`]: the ordered semantic labels of the axes of an array.
//! - [`OutputMeta`]: the metadata of an operator output.
//! - [`ArrayView`]: the destination of a request, a writable region of a dense array.

mod array_view;
mod axis_tags;
pub mod data_type;
mod element;
mod output_meta;

pub use self::{
    array_view::{ArrayView, ArrayViewCopyError, ArrayViewCreateError},
    axis_tags::{AxisKind, AxisTag, AxisTags},
    data_type::DataType,
    element::{ArrayElements, Element, IncompatibleElementTypeError, InvalidBytesLengthError},
    output_meta::OutputMeta,
};

pub(crate) use element::with_elements;

/// An ND index to an element in an array.
pub type ArrayIndices = Vec<u64>;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// Convert a vector of elements with `shape` into an [`ndarray::ArrayD`].
///
/// # Errors
/// Returns a [`ndarray::ShapeError`] if the number of elements does not match `shape` or the shape overflows [`usize`].
#[cfg(feature = "ndarray")]
pub fn elements_to_ndarray<T>(
    shape: &[u64],
    elements: Vec<T>,
) -> Result<ndarray::ArrayD<T>, ndarray::ShapeError> {
    let shape = shape
        .iter()
        .map(|&size| usize::try_from(size))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ndarray::ShapeError::from_kind(ndarray::ErrorKind::Overflow))?;
    ndarray::ArrayD::<T>::from_shape_vec(shape, elements)
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;

    #[test]
    fn array_elements_to_ndarray() {
        let array = elements_to_ndarray(&[2, 3], (0..6u8).collect()).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 0]], 3);
        assert!(elements_to_ndarray(&[2, 2], vec![0u8; 3]).is_err());
    }
}
