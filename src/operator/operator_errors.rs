use thiserror::Error;

use crate::{
    array::{
        ArrayShape, ArrayViewCopyError, ArrayViewCreateError, AxisTags, DataType,
        IncompatibleElementTypeError, InvalidBytesLengthError,
    },
    roi::{IncompatibleDimensionalityError, IncompatibleRoiAndShapeError, Roi, RoiCreateError},
};

/// A function error, returned by a [`MergeFunction`](super::MergeFunction) or [`PixelFunction`](super::PixelFunction).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct FunctionError(String);

impl FunctionError {
    /// Create a new function error with a `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An operator error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OperatorError {
    /// An input slot is not connected.
    #[error("input slot {0} is not connected")]
    SlotNotConnected(&'static str),
    /// A value slot has no value.
    #[error("slot {0} has no value")]
    SlotNotReady(&'static str),
    /// The output is not ready.
    #[error("output {slot} of {operator} is not ready")]
    OutputNotReady {
        /// The operator name.
        operator: &'static str,
        /// The output slot name.
        slot: &'static str,
    },
    /// The operator has no output with this name and subindex.
    #[error("{operator} has no output {slot}{subindex:?}")]
    UnknownOutput {
        /// The operator name.
        operator: &'static str,
        /// The output slot name.
        slot: String,
        /// The subindex.
        subindex: Vec<usize>,
    },
    /// The output is structural and is never executed.
    #[error("output {slot} of {operator} cannot be executed")]
    ExecuteUnreachable {
        /// The operator name.
        operator: &'static str,
        /// The output slot name.
        slot: &'static str,
    },
    /// The region is out of bounds of the array shape.
    #[error("the region {0} is out of bounds for shape {1:?}")]
    RoiOutOfBounds(Roi, ArrayShape),
    /// The region is not valid for the operator.
    #[error("invalid region {0}: {1}")]
    InvalidRoi(Roi, String),
    /// The destination view does not match the region or data type of the request.
    #[error("a view of {view_elements} elements of size {view_element_size} cannot hold a region of {roi_elements} elements of size {element_size}")]
    IncompatibleView {
        /// The number of elements in the view.
        view_elements: u64,
        /// The element size of the view.
        view_element_size: usize,
        /// The number of elements in the region.
        roi_elements: u64,
        /// The element size of the data type of the output.
        element_size: usize,
    },
    /// The inputs of an operator are inconsistent.
    #[error("incompatible inputs to {operator}: {reason}")]
    IncompatibleInputs {
        /// The operator name.
        operator: &'static str,
        /// The reason.
        reason: String,
    },
    /// The channel axis of an input is not the last axis.
    #[error("the channel axis must be the last axis, got axis tags {0}")]
    ChannelAxisNotLast(AxisTags),
    /// The element size of a data type view does not match the input.
    #[error("cannot view {0} elements as {1}, the element sizes differ")]
    IncompatibleElementSize(DataType, DataType),
    /// A function error.
    #[error(transparent)]
    Function(#[from] FunctionError),
    /// An incompatible dimensionality error.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// An incompatible region and shape error.
    #[error(transparent)]
    IncompatibleRoiAndShape(#[from] IncompatibleRoiAndShapeError),
    /// A region create error.
    #[error(transparent)]
    RoiCreate(#[from] RoiCreateError),
    /// An array view create error.
    #[error(transparent)]
    ArrayViewCreate(#[from] ArrayViewCreateError),
    /// An array view copy error.
    #[error(transparent)]
    ArrayViewCopy(#[from] ArrayViewCopyError),
    /// An invalid bytes length error.
    #[error(transparent)]
    InvalidBytesLength(#[from] InvalidBytesLengthError),
    /// An incompatible element type error.
    #[error(transparent)]
    IncompatibleElementType(#[from] IncompatibleElementTypeError),
    /// An [`ndarray`] shape error.
    #[cfg(feature = "ndarray")]
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}
