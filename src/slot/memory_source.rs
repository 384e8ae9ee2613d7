use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    array::{ArrayElements, ArrayShape, ArrayView, AxisTags, DataType, Element, OutputMeta},
    operator::OperatorError,
    roi::{IncompatibleDimensionalityError, Roi},
};

use super::ArraySource;

/// An in-memory array source.
///
/// The array is held as dense C order bytes.
/// The metadata is always ready and hints can be set with [`MemorySource::set_meta`].
pub struct MemorySource {
    meta: RwLock<Arc<OutputMeta>>,
    bytes: RwLock<Vec<u8>>,
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemorySource({})", self.meta.read())
    }
}

impl MemorySource {
    /// Create a new memory source from native endian `bytes` with `shape`, `data_type`, and `axis_tags`.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if the length of `bytes` or `axis_tags` does not match `shape` and `data_type`.
    pub fn new(
        shape: ArrayShape,
        data_type: DataType,
        axis_tags: AxisTags,
        bytes: Vec<u8>,
    ) -> Result<Self, OperatorError> {
        if axis_tags.len() != shape.len() {
            return Err(IncompatibleDimensionalityError::new(axis_tags.len(), shape.len()).into());
        }
        let expected_len = shape.iter().product::<u64>() * data_type.size() as u64;
        if bytes.len() as u64 != expected_len {
            return Err(crate::array::ArrayViewCreateError::InvalidBytesLength(
                bytes.len(),
                usize::try_from(expected_len).unwrap_or(usize::MAX),
            )
            .into());
        }
        Ok(Self {
            meta: RwLock::new(Arc::new(OutputMeta::new(shape, data_type, axis_tags))),
            bytes: RwLock::new(bytes),
        })
    }

    /// Create a new memory source from `elements` with `shape` and `axis_tags`.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if the number of elements or the length of `axis_tags` does not match `shape`.
    pub fn from_elements<T: Element>(
        shape: ArrayShape,
        axis_tags: AxisTags,
        elements: Vec<T>,
    ) -> Result<Self, OperatorError> {
        Self::new(
            shape,
            T::DATA_TYPE,
            axis_tags,
            bytemuck::cast_slice::<T, u8>(&elements).to_vec(),
        )
    }

    /// Create a new memory source from an [`ndarray::ArrayD`] and `axis_tags`.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if the length of `axis_tags` does not match the dimensionality of `array`.
    #[cfg(feature = "ndarray")]
    pub fn from_ndarray<T: Element>(
        array: &ndarray::ArrayD<T>,
        axis_tags: AxisTags,
    ) -> Result<Self, OperatorError> {
        let shape = array.shape().iter().map(|&size| size as u64).collect();
        let elements = array.iter().copied().collect::<Vec<_>>();
        Self::from_elements(shape, axis_tags, elements)
    }

    /// Replace the metadata hints of the source (value range and block shapes).
    ///
    /// The shape, data type, and axis tags are retained.
    pub fn set_meta(&self, meta: &OutputMeta) {
        let mut current = self.meta.write();
        let updated = OutputMeta {
            value_range: meta.value_range,
            ideal_blockshape: meta.ideal_blockshape.clone(),
            max_blockshape: meta.max_blockshape.clone(),
            ..(**current).clone()
        };
        *current = Arc::new(updated);
    }

    /// Set the value range of the source.
    pub fn set_value_range(&self, value_range: Option<(f64, f64)>) {
        let mut current = self.meta.write();
        *current = Arc::new((**current).clone().with_value_range(value_range));
    }

    /// Overwrite the elements within `roi` with `elements` in C order.
    ///
    /// Returns the stored region, which can be forwarded to dirty propagation.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if `roi` is out of bounds or `elements` do not match `roi` and the data type.
    pub fn store_roi(&self, roi: &Roi, elements: &ArrayElements) -> Result<Roi, OperatorError> {
        let meta = self.meta();
        if elements.data_type() != meta.data_type {
            return Err(crate::array::IncompatibleElementTypeError::new(
                elements.data_type(),
                meta.data_type,
            )
            .into());
        }
        let mut bytes = self.bytes.write();
        let mut view = ArrayView::new(
            bytes.as_mut_slice(),
            meta.shape.clone(),
            meta.data_type.size(),
            roi.clone(),
        )?;
        view.copy_from_bytes(&elements.to_bytes())?;
        Ok(roi.clone())
    }
}

impl ArraySource for MemorySource {
    fn meta(&self) -> Arc<OutputMeta> {
        self.meta.read().clone()
    }

    fn retrieve_into(&self, roi: &Roi, view: &mut ArrayView) -> Result<(), OperatorError> {
        let meta = self.meta();
        if !roi.inbounds_shape(&meta.shape) {
            return Err(OperatorError::RoiOutOfBounds(roi.clone(), meta.shape.clone()));
        }
        let bytes = self.bytes.read();
        let roi_bytes = roi.extract_bytes(bytes.as_slice(), &meta.shape, meta.data_type.size())?;
        view.copy_from_bytes(&roi_bytes)?;
        Ok(())
    }
}
