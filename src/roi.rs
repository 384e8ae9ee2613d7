//! Regions of interest.
//!
//! A [`Roi`] is a half-open box `[start, stop)` over the axes of an array.
//! Every request that flows through an operator graph is expressed as a [`Roi`] of the output being queried.
//!
//! This module also provides the coordinate algebra operators use to translate requests between their output and their inputs:
//!  - intersection and translation,
//!  - axis insertion, removal and replacement, and
//!  - extracting the bytes of a region from a dense array.

pub mod iterators;

use std::{fmt::Display, ops::Range};

use derive_more::From;
use itertools::izip;
use thiserror::Error;

use crate::array::{ArrayIndices, ArrayShape};

use iterators::ContiguousLinearisedIndices;

/// A region of interest.
///
/// The region spans `start[i]..stop[i]` on axis `i`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Roi {
    /// The start of the region (inclusive).
    start: ArrayIndices,
    /// The stop of the region (exclusive).
    stop: ArrayIndices,
}

impl Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_ranges())
    }
}

/// A region of interest creation error.
#[derive(Clone, Debug, Error, From)]
#[error("incompatible start {0:?} with stop {1:?}")]
pub struct RoiCreateError(ArrayIndices, ArrayIndices);

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An incompatible region of interest and array shape error.
#[derive(Clone, Debug, Error, From)]
#[error("incompatible region {0} with array shape {1:?}")]
pub struct IncompatibleRoiAndShapeError(Roi, ArrayShape);

impl IncompatibleRoiAndShapeError {
    /// Create a new incompatible region and shape error.
    #[must_use]
    pub fn new(roi: Roi, array_shape: ArrayShape) -> Self {
        Self(roi, array_shape)
    }
}

impl Roi {
    /// Create a new region from `start` and `stop` (exclusive).
    ///
    /// # Errors
    /// Returns [`RoiCreateError`] if `start` and `stop` differ in length or any element of `stop` is less than `start`.
    pub fn new(start: ArrayIndices, stop: ArrayIndices) -> Result<Self, RoiCreateError> {
        if start.len() != stop.len() || std::iter::zip(&start, &stop).any(|(start, stop)| stop < start)
        {
            Err(RoiCreateError(start, stop))
        } else {
            Ok(Self { start, stop })
        }
    }

    /// Create a new region from a list of [`Range`]s.
    ///
    /// Inverted ranges are clamped to be empty.
    #[must_use]
    pub fn new_with_ranges(ranges: &[Range<u64>]) -> Self {
        let start = ranges.iter().map(|range| range.start).collect();
        let stop = ranges
            .iter()
            .map(|range| std::cmp::max(range.start, range.end))
            .collect();
        Self { start, stop }
    }

    /// Create a new region covering an entire array with `shape`.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            stop: shape,
        }
    }

    /// Create a new region from a `start` and a `shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `start` and `shape` differ in length.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: &[u64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            let stop = std::iter::zip(&start, shape)
                .map(|(start, size)| start + size)
                .collect();
            Ok(Self { start, stop })
        } else {
            Err(IncompatibleDimensionalityError::new(
                shape.len(),
                start.len(),
            ))
        }
    }

    /// Return the start of the region.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the stop (exclusive) of the region.
    #[must_use]
    pub fn stop(&self) -> &[u64] {
        &self.stop
    }

    /// Return the shape of the region.
    #[must_use]
    pub fn shape(&self) -> ArrayShape {
        std::iter::zip(&self.start, &self.stop)
            .map(|(start, stop)| stop - start)
            .collect()
    }

    /// Return the dimensionality of the region.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Returns true if the region has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        std::iter::zip(&self.start, &self.stop).any(|(start, stop)| start == stop)
    }

    /// Return the number of elements in the region.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        std::iter::zip(&self.start, &self.stop)
            .map(|(start, stop)| stop - start)
            .product()
    }

    /// Return the number of elements in the region as a `usize`.
    ///
    /// # Panics
    /// Panics if [`num_elements()`](Self::num_elements()) is greater than [`usize::MAX`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap()
    }

    /// Return the region as a vec of ranges.
    #[must_use]
    pub fn to_ranges(&self) -> Vec<Range<u64>> {
        std::iter::zip(&self.start, &self.stop)
            .map(|(&start, &stop)| start..stop)
            .collect()
    }

    /// Return the range of the region along `axis`.
    ///
    /// # Panics
    /// Panics if `axis` is not less than the dimensionality of the region.
    #[must_use]
    pub fn axis_range(&self, axis: usize) -> Range<u64> {
        self.start[axis]..self.stop[axis]
    }

    /// Returns true if the region contains `indices`.
    #[must_use]
    pub fn contains(&self, indices: &[u64]) -> bool {
        indices.len() == self.dimensionality()
            && izip!(indices, &self.start, &self.stop).all(|(&i, &start, &stop)| i >= start && i < stop)
    }

    /// Return the intersection of this region and `other`.
    ///
    /// Returns [`None`] if the regions do not overlap on every axis.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the dimensionality of `other` does not match.
    pub fn intersection(&self, other: &Self) -> Result<Option<Self>, IncompatibleDimensionalityError> {
        if other.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                other.dimensionality(),
                self.dimensionality(),
            ));
        }
        let mut start = Vec::with_capacity(self.dimensionality());
        let mut stop = Vec::with_capacity(self.dimensionality());
        for (&a_start, &a_stop, &b_start, &b_stop) in
            izip!(&self.start, &self.stop, &other.start, &other.stop)
        {
            let overlap_start = std::cmp::max(a_start, b_start);
            let overlap_stop = std::cmp::min(a_stop, b_stop);
            if overlap_start >= overlap_stop {
                return Ok(None);
            }
            start.push(overlap_start);
            stop.push(overlap_stop);
        }
        Ok(Some(Self { start, stop }))
    }

    /// Return the region shifted by `+offset`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the length of `offset` does not match the dimensionality.
    pub fn translate(&self, offset: &[u64]) -> Result<Self, IncompatibleDimensionalityError> {
        if offset.len() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                offset.len(),
                self.dimensionality(),
            ));
        }
        Ok(Self {
            start: std::iter::zip(&self.start, offset).map(|(a, b)| a + b).collect(),
            stop: std::iter::zip(&self.stop, offset).map(|(a, b)| a + b).collect(),
        })
    }

    /// Return the region relative to `origin` (shifted by `-origin`).
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the length of `origin` does not match the dimensionality.
    ///
    /// # Panics
    /// Panics if `origin` exceeds the start of the region on any axis.
    pub fn relative_to(&self, origin: &[u64]) -> Result<Self, IncompatibleDimensionalityError> {
        if origin.len() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                origin.len(),
                self.dimensionality(),
            ));
        }
        Ok(Self {
            start: std::iter::zip(&self.start, origin).map(|(a, b)| a - b).collect(),
            stop: std::iter::zip(&self.stop, origin).map(|(a, b)| a - b).collect(),
        })
    }

    /// Return the region with the range of `axis` replaced by `range`.
    ///
    /// # Panics
    /// Panics if `axis` is not less than the dimensionality of the region.
    #[must_use]
    pub fn with_axis_range(&self, axis: usize, range: Range<u64>) -> Self {
        let mut roi = self.clone();
        roi.start[axis] = range.start;
        roi.stop[axis] = std::cmp::max(range.start, range.end);
        roi
    }

    /// Return the region with a new axis spanning `range` inserted at `axis`.
    ///
    /// # Panics
    /// Panics if `axis` is greater than the dimensionality of the region.
    #[must_use]
    pub fn insert_axis(&self, axis: usize, range: Range<u64>) -> Self {
        let mut roi = self.clone();
        roi.start.insert(axis, range.start);
        roi.stop.insert(axis, std::cmp::max(range.start, range.end));
        roi
    }

    /// Return the region with `axis` removed.
    ///
    /// # Panics
    /// Panics if `axis` is not less than the dimensionality of the region.
    #[must_use]
    pub fn remove_axis(&self, axis: usize) -> Self {
        let mut roi = self.clone();
        roi.start.remove(axis);
        roi.stop.remove(axis);
        roi
    }

    /// Returns true if the region is within the bounds of an array with `array_shape`.
    #[must_use]
    pub fn inbounds_shape(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && std::iter::zip(&self.stop, array_shape).all(|(stop, shape)| stop <= shape)
    }

    /// Returns an iterator over the linearised indices of contiguous elements of the region in an array with `array_shape`.
    ///
    /// # Errors
    /// Returns [`IncompatibleRoiAndShapeError`] if `array_shape` does not encapsulate this region.
    pub fn contiguous_linearised_indices(
        &self,
        array_shape: &[u64],
    ) -> Result<ContiguousLinearisedIndices, IncompatibleRoiAndShapeError> {
        ContiguousLinearisedIndices::new(self, array_shape)
    }

    /// Return the bytes of this region from the bytes of an array with `array_shape` and `element_size`.
    ///
    /// # Errors
    /// Returns [`IncompatibleRoiAndShapeError`] if `bytes` does not match `array_shape` and `element_size` or the region is out of bounds.
    ///
    /// # Panics
    /// Panics if attempting to access a byte index beyond [`usize::MAX`].
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<Vec<u8>, IncompatibleRoiAndShapeError> {
        let element_size_u64 = element_size as u64;
        if bytes.len() as u64 != array_shape.iter().product::<u64>() * element_size_u64 {
            return Err(IncompatibleRoiAndShapeError::new(
                self.clone(),
                array_shape.to_vec(),
            ));
        }
        let mut bytes_roi = Vec::with_capacity(self.num_elements_usize() * element_size);
        for (array_index, contiguous_elements) in &self.contiguous_linearised_indices(array_shape)? {
            let byte_offset = usize::try_from(array_index * element_size_u64).unwrap();
            let byte_length = usize::try_from(contiguous_elements * element_size_u64).unwrap();
            bytes_roi.extend_from_slice(&bytes[byte_offset..byte_offset + byte_length]);
        }
        Ok(bytes_roi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_new() {
        assert!(Roi::new(vec![0, 0], vec![10, 10]).is_ok());
        assert!(Roi::new(vec![0, 0], vec![10]).is_err());
        assert!(Roi::new(vec![5, 5], vec![0, 0]).is_err());
        assert!(Roi::new(vec![5, 5], vec![5, 5]).unwrap().is_empty());
        assert!(Roi::new_with_start_shape(vec![0, 0], &[1]).is_err());

        let roi = Roi::new_with_start_shape(vec![1, 2], &[3, 4]).unwrap();
        assert_eq!(roi, Roi::new_with_ranges(&[1..4, 2..6]));
        assert_eq!(roi.shape(), vec![3, 4]);
        assert_eq!(roi.num_elements(), 12);
        assert_eq!(roi.to_string(), "[1..4, 2..6]");
        assert!(roi.contains(&[1, 5]));
        assert!(!roi.contains(&[4, 5]));
        assert!(!roi.contains(&[1]));
    }

    #[test]
    fn roi_intersection() {
        let roi0 = Roi::new_with_ranges(&[1..5, 2..6]);
        let roi1 = Roi::new_with_ranges(&[3..6, 4..7]);
        assert_eq!(
            roi0.intersection(&roi1).unwrap(),
            Some(Roi::new_with_ranges(&[3..5, 4..6]))
        );
        let touching = Roi::new_with_ranges(&[5..8, 2..6]);
        assert_eq!(roi0.intersection(&touching).unwrap(), None);
        assert!(roi0.intersection(&Roi::new_with_ranges(&[0..1])).is_err());
    }

    #[test]
    fn roi_translate_and_axes() {
        let roi = Roi::new_with_ranges(&[1..5, 2..6]);
        assert_eq!(
            roi.translate(&[10, 20]).unwrap(),
            Roi::new_with_ranges(&[11..15, 22..26])
        );
        assert_eq!(
            roi.relative_to(&[1, 1]).unwrap(),
            Roi::new_with_ranges(&[0..4, 1..5])
        );
        assert!(roi.relative_to(&[1, 1, 1]).is_err());
        assert_eq!(roi.with_axis_range(0, 7..8), Roi::new_with_ranges(&[7..8, 2..6]));
        assert_eq!(
            roi.insert_axis(1, 3..4),
            Roi::new_with_ranges(&[1..5, 3..4, 2..6])
        );
        assert_eq!(roi.remove_axis(0), Roi::new_with_ranges(&[2..6]));
        assert!(roi.inbounds_shape(&[5, 6]));
        assert!(!roi.inbounds_shape(&[4, 6]));
        assert!(!roi.inbounds_shape(&[5, 6, 1]));
    }

    #[test]
    fn roi_extract_bytes() {
        //  0  1  2  3
        //  4  5  6  7
        //  8  9 10 11
        // 12 13 14 15
        let bytes: Vec<u8> = (0..16).collect();
        let roi = Roi::new_with_ranges(&[1..3, 1..3]);
        assert_eq!(roi.extract_bytes(&bytes, &[4, 4], 1).unwrap(), vec![5, 6, 9, 10]);
        assert!(roi.extract_bytes(&bytes, &[4, 4], 2).is_err());
        assert!(roi.extract_bytes(&bytes, &[2, 2], 4).is_err());
        let roi = Roi::new_with_ranges(&[1..2, 0..2]);
        assert_eq!(
            roi.extract_bytes(&bytes, &[4, 2], 2).unwrap(),
            vec![4, 5, 6, 7]
        );
    }
}
