//! Region of interest iterators.

use std::iter::FusedIterator;

use itertools::izip;

use super::{IncompatibleRoiAndShapeError, Roi};

/// Linearised contiguous runs of a [`Roi`] within an array.
///
/// Iterating yields a tuple: (linearised index of the first element, # contiguous elements).
/// Every run has the same length.
#[derive(Debug, Clone)]
pub struct ContiguousLinearisedIndices {
    /// The start of each run (the region with trailing contiguous axes collapsed).
    outer_start: Vec<u64>,
    /// The shape of the outer iteration space.
    outer_shape: Vec<u64>,
    /// The strides of the array in elements.
    strides: Vec<u64>,
    contiguous_elements: u64,
}

impl ContiguousLinearisedIndices {
    /// Create a new contiguous linearised indices iterator.
    ///
    /// # Errors
    /// Returns [`IncompatibleRoiAndShapeError`] if `array_shape` does not encapsulate `roi`.
    pub fn new(roi: &Roi, array_shape: &[u64]) -> Result<Self, IncompatibleRoiAndShapeError> {
        if !roi.inbounds_shape(array_shape) {
            return Err(IncompatibleRoiAndShapeError::new(
                roi.clone(),
                array_shape.to_vec(),
            ));
        }

        let dimensionality = array_shape.len();
        let mut strides = vec![1; dimensionality];
        for i in (0..dimensionality.saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * array_shape[i + 1];
        }

        // Collapse trailing axes that are fully covered by the region.
        let roi_shape = roi.shape();
        let mut contiguous = true;
        let mut contiguous_elements = 1;
        let mut outer_shape = vec![1; dimensionality];
        for (&start, &size, &array_size, outer_size) in izip!(
            roi.start().iter().rev(),
            roi_shape.iter().rev(),
            array_shape.iter().rev(),
            outer_shape.iter_mut().rev(),
        ) {
            if contiguous {
                contiguous_elements *= size;
                contiguous = start == 0 && size == array_size;
            } else {
                *outer_size = size;
            }
        }

        Ok(Self {
            outer_start: roi.start().to_vec(),
            outer_shape,
            strides,
            contiguous_elements,
        })
    }

    /// Return the number of contiguous elements (fixed on each iteration).
    #[must_use]
    pub fn contiguous_elements(&self) -> u64 {
        self.contiguous_elements
    }

    /// Create a new serial iterator.
    #[must_use]
    pub fn iter(&self) -> ContiguousLinearisedIndicesIterator<'_> {
        <&Self as IntoIterator>::into_iter(self)
    }
}

impl<'a> IntoIterator for &'a ContiguousLinearisedIndices {
    type Item = (u64, u64);
    type IntoIter = ContiguousLinearisedIndicesIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        let length = if self.contiguous_elements == 0 {
            0
        } else {
            self.outer_shape.iter().product()
        };
        ContiguousLinearisedIndicesIterator {
            inner: self,
            index: 0,
            length,
        }
    }
}

/// Serial iterator over [`ContiguousLinearisedIndices`].
pub struct ContiguousLinearisedIndicesIterator<'a> {
    inner: &'a ContiguousLinearisedIndices,
    index: u64,
    length: u64,
}

impl Iterator for ContiguousLinearisedIndicesIterator<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.length {
            return None;
        }
        let mut current = self.index;
        let mut linearised = 0;
        for (&start, &size, &stride) in izip!(
            self.inner.outer_start.iter().rev(),
            self.inner.outer_shape.iter().rev(),
            self.inner.strides.iter().rev(),
        ) {
            linearised += (current % size + start) * stride;
            current /= size;
        }
        self.index += 1;
        Some((linearised, self.inner.contiguous_elements))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.length - self.index).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ContiguousLinearisedIndicesIterator<'_> {}

impl FusedIterator for ContiguousLinearisedIndicesIterator<'_> {}
