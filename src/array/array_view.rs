use thiserror::Error;
use unsafe_cell_slice::UnsafeCellSlice;

use crate::roi::{IncompatibleDimensionalityError, Roi};

use super::ArrayShape;

/// A writable view of a region of a dense array in C order.
///
/// An [`ArrayView`] is the destination of a request.
/// It references the bytes of an array with a known shape and element size, and the region of that array it may write.
///
/// Views of disjoint regions of one array can be created with [`ArrayView::subset_view`] and written concurrently.
pub struct ArrayView<'a> {
    bytes: UnsafeCellSlice<'a, u8>,
    array_shape: ArrayShape,
    element_size: usize,
    roi: Roi,
}

/// An array view create error.
#[derive(Debug, Error)]
pub enum ArrayViewCreateError {
    /// The length of the bytes does not match the array shape and element size.
    #[error("array bytes have length {0}, expected {1}")]
    InvalidBytesLength(usize, usize),
    /// The region is out of bounds of the array shape.
    #[error("the region {0} is out of bounds for array shape {1:?}")]
    RoiOutOfBounds(Roi, ArrayShape),
    /// The region has an incompatible dimensionality to the array shape.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
}

/// An array view copy error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("copied bytes have length {0}, expected {1}")]
pub struct ArrayViewCopyError(usize, usize);

impl<'a> ArrayView<'a> {
    /// Create a new [`ArrayView`] of the `roi` of an array with `array_shape` and `element_size` backed by `bytes`.
    ///
    /// # Errors
    /// Returns an error if
    ///  - the length of `bytes` does not match `array_shape` and `element_size`,
    ///  - the dimensionality of `roi` and `array_shape` do not match, or
    ///  - `roi` is out of bounds of `array_shape`.
    pub fn new(
        bytes: &'a mut [u8],
        array_shape: ArrayShape,
        element_size: usize,
        roi: Roi,
    ) -> Result<Self, ArrayViewCreateError> {
        let expected_len = array_shape
            .iter()
            .product::<u64>()
            .saturating_mul(element_size as u64);
        if bytes.len() as u64 != expected_len {
            Err(ArrayViewCreateError::InvalidBytesLength(
                bytes.len(),
                usize::try_from(expected_len).unwrap_or(usize::MAX),
            ))
        } else if roi.dimensionality() != array_shape.len() {
            Err(IncompatibleDimensionalityError::new(roi.dimensionality(), array_shape.len()).into())
        } else if !roi.inbounds_shape(&array_shape) {
            Err(ArrayViewCreateError::RoiOutOfBounds(roi, array_shape))
        } else {
            Ok(Self {
                bytes: UnsafeCellSlice::new(bytes),
                array_shape,
                element_size,
                roi,
            })
        }
    }

    /// Create a new [`ArrayView`] of an entire array with `array_shape` and `element_size` backed by `bytes`.
    ///
    /// # Errors
    /// Returns an error if the length of `bytes` does not match `array_shape` and `element_size`.
    pub fn new_full(
        bytes: &'a mut [u8],
        array_shape: ArrayShape,
        element_size: usize,
    ) -> Result<Self, ArrayViewCreateError> {
        let roi = Roi::new_with_shape(array_shape.clone());
        Self::new(bytes, array_shape, element_size, roi)
    }

    /// Return the region of the array the view may write.
    #[must_use]
    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// Return the shape of the array referenced by the view.
    #[must_use]
    pub fn array_shape(&self) -> &[u64] {
        &self.array_shape
    }

    /// Return the element size in bytes.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Return the number of elements in the view.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.roi.num_elements()
    }

    /// Return the number of bytes in the view.
    #[must_use]
    pub fn num_bytes(&self) -> u64 {
        self.roi.num_elements() * self.element_size as u64
    }

    /// Copy `bytes` holding the elements of the view in C order into the array.
    ///
    /// # Errors
    /// Returns [`ArrayViewCopyError`] if the length of `bytes` does not match the number of bytes in the view.
    #[allow(clippy::cast_possible_truncation)]
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<(), ArrayViewCopyError> {
        if bytes.len() as u64 != self.num_bytes() {
            return Err(ArrayViewCopyError(
                bytes.len(),
                self.num_bytes() as usize,
            ));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let Ok(indices) = self.roi.contiguous_linearised_indices(&self.array_shape) else {
            // the region of a view is always within the array shape
            return Err(ArrayViewCopyError(bytes.len(), 0));
        };
        // Offsets are bounded by the length of the array bytes
        let run_length = indices.contiguous_elements() as usize * self.element_size;
        let array_bytes = unsafe { self.bytes.index_mut(..) };
        for ((array_index, _), run) in indices.iter().zip(bytes.chunks_exact(run_length)) {
            let offset = array_index as usize * self.element_size;
            array_bytes[offset..offset + run_length].copy_from_slice(run);
        }
        Ok(())
    }

    /// Fill every element of the view with `element`.
    ///
    /// # Errors
    /// Returns [`ArrayViewCopyError`] if the length of `element` is not the element size.
    pub fn fill(&mut self, element: &[u8]) -> Result<(), ArrayViewCopyError> {
        if element.len() != self.element_size {
            return Err(ArrayViewCopyError(element.len(), self.element_size));
        }
        let num_elements = self.roi.num_elements_usize();
        self.copy_from_bytes(&element.repeat(num_elements))
    }

    /// Return the bytes of the array within the view in C order.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let array_bytes: &[u8] = unsafe { self.bytes.index_mut(..) };
        self.roi
            .extract_bytes(array_bytes, &self.array_shape, self.element_size)
            .unwrap_or_default()
    }

    /// Returns true if the elements of the view are contiguous in the array.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.roi
            .contiguous_linearised_indices(&self.array_shape)
            .is_ok_and(|indices| indices.iter().len() <= 1)
    }

    /// Return a new view of the same region of the same array, borrowing `self` exclusively.
    #[must_use]
    pub fn reborrow(&mut self) -> ArrayView<'_> {
        ArrayView {
            bytes: self.bytes,
            array_shape: self.array_shape.clone(),
            element_size: self.element_size,
            roi: self.roi.clone(),
        }
    }

    /// Return a new [`ArrayView`] of the same array as `self` restricted to `roi`, which is relative to the region of `self`.
    ///
    /// # Safety
    /// The returned view references the same bytes as `self`.
    /// The caller must ensure that `self` and any views created through this method do not write the same elements concurrently.
    /// Views of disjoint regions can be written concurrently.
    ///
    /// # Errors
    /// Returns [`ArrayViewCreateError`] if the dimensionality of `roi` does not match the view or `roi` extends beyond the region of the view.
    pub unsafe fn subset_view(&self, roi: &Roi) -> Result<ArrayView<'a>, ArrayViewCreateError> {
        if roi.dimensionality() != self.roi.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                roi.dimensionality(),
                self.roi.dimensionality(),
            )
            .into());
        }
        if !roi.inbounds_shape(&self.roi.shape()) {
            return Err(ArrayViewCreateError::RoiOutOfBounds(
                roi.clone(),
                self.roi.shape(),
            ));
        }
        let roi_inner = roi.translate(self.roi.start())?;
        debug_assert_eq!(
            self.bytes.len() as u64,
            self.array_shape.iter().product::<u64>() * self.element_size as u64
        );
        Ok(ArrayView {
            bytes: self.bytes,
            array_shape: self.array_shape.clone(),
            element_size: self.element_size,
            roi: roi_inner,
        })
    }
}

impl std::fmt::Debug for ArrayView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayView")
            .field("array_shape", &self.array_shape)
            .field("element_size", &self.element_size)
            .field("roi", &self.roi)
            .finish_non_exhaustive()
    }
}
