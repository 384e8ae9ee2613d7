//! Operators.
//!
//! An [`Operator`] is a named unit with input slots and output slots.
//! The surrounding engine invokes three steps on an operator:
//!  - [`Operator::setup_outputs`] derives output metadata from input metadata and parameters (configure),
//!  - [`Operator::execute`] computes the elements of an output within a region of interest, and
//!  - [`Operator::propagate_dirty`] translates a changed input region into the changed output regions.
//!
//! Value dependent inconsistencies during configure (e.g. an axis that is not present, or an out of range channel) make an output *not ready* rather than failing.
//! Structural inconsistencies (e.g. merging inputs with differing shapes) make [`Operator::setup_outputs`] return an [`OperatorError`].
//!
//! An output of an operator is exposed as an [`ArraySource`] with [`OperatorOutput`], so operators can be chained.
//!
//! Operators hold their configure-time derived tables in an immutable snapshot that is replaced on every configure.
//! An execute reads the current snapshot once and never observes a partially updated table.

mod channel_selector;
mod concatenator;
mod dtype;
mod max_channel_indicator;
mod merger;
mod operator_errors;
mod pixel_operator;
mod select_subslot;
mod single_channel_selector;
mod slicer;
mod stacker;
mod sub_region;
mod wrap_slot;

use std::sync::Arc;

pub use self::{
    channel_selector::OpMultiChannelSelector,
    concatenator::OpMultiInputConcatenator,
    dtype::{OpConvertDtype, OpDtypeView},
    max_channel_indicator::OpMaxChannelIndicator,
    merger::{ElementwiseMerge, MergeFunction, OpMultiArrayMerger},
    operator_errors::{FunctionError, OperatorError},
    pixel_operator::{OpPixelOperator, PixelFunction, PixelMap},
    select_subslot::OpSelectSubslot,
    single_channel_selector::OpSingleChannelSelector,
    slicer::OpMultiArraySlicer,
    stacker::OpMultiArrayStacker,
    sub_region::OpSubRegion,
    wrap_slot::OpWrapSlot,
};

use crate::{
    array::{ArrayView, OutputMeta},
    config::global_config,
    roi::{IncompatibleDimensionalityError, Roi},
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion},
};

/// The operator interface.
pub trait Operator: Send + Sync {
    /// Return the name of the operator.
    fn name(&self) -> &'static str;

    /// Derive the metadata of the outputs from the inputs and parameters (configure).
    ///
    /// Configure is idempotent and only replaces the derived state of the operator.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if the inputs are structurally inconsistent.
    fn setup_outputs(&self) -> Result<(), OperatorError>;

    /// Return the metadata of output `slot` at `subindex`.
    ///
    /// Returns not ready metadata for an unknown output.
    fn output_meta(&self, slot: &str, subindex: &[usize]) -> Arc<OutputMeta>;

    /// Compute the elements of output `slot` at `subindex` within `roi` into `result`.
    ///
    /// The region of `result` must have the shape of `roi`.
    /// Callers are expected to query ready outputs only, see [`OperatorOutput`] which validates requests.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if `roi` is invalid for the operator or an upstream request fails.
    fn execute(
        &self,
        slot: &str,
        subindex: &[usize],
        roi: &Roi,
        result: &mut ArrayView,
    ) -> Result<(), OperatorError>;

    /// Translate a changed `region` of input `slot` at `subindex` into the changed regions of the outputs.
    ///
    /// Dirty propagation never fails, a region that cannot be determined precisely marks the entire output dirty.
    fn propagate_dirty(
        &self,
        slot: &str,
        subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification>;
}

/// An output of an operator, exposed as an [`ArraySource`].
#[derive(Clone)]
pub struct OperatorOutput {
    operator: Arc<dyn Operator>,
    slot: &'static str,
    subindex: Vec<usize>,
}

impl std::fmt::Debug for OperatorOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{:?}", self.operator.name(), self.slot, self.subindex)
    }
}

impl OperatorOutput {
    /// Create a new operator output for `slot` at `subindex` of `operator`.
    #[must_use]
    pub fn new(operator: Arc<dyn Operator>, slot: &'static str, subindex: Vec<usize>) -> Self {
        Self {
            operator,
            slot,
            subindex,
        }
    }

    /// Return the operator.
    #[must_use]
    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }

    /// Return the output slot name.
    #[must_use]
    pub fn slot(&self) -> &'static str {
        self.slot
    }

    /// Return the subindex of the output.
    #[must_use]
    pub fn subindex(&self) -> &[usize] {
        &self.subindex
    }

    /// Convert into a shared [`ArraySource`].
    #[must_use]
    pub fn into_source(self) -> ArraySourceRef {
        Arc::new(self)
    }
}

impl ArraySource for OperatorOutput {
    fn meta(&self) -> Arc<OutputMeta> {
        self.operator.output_meta(self.slot, &self.subindex)
    }

    fn retrieve_into(&self, roi: &Roi, view: &mut ArrayView) -> Result<(), OperatorError> {
        let meta = self.meta();
        if !meta.ready {
            return Err(OperatorError::OutputNotReady {
                operator: self.operator.name(),
                slot: self.slot,
            });
        }
        if roi.dimensionality() != meta.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                roi.dimensionality(),
                meta.dimensionality(),
            )
            .into());
        }
        if global_config().validate_request_bounds() && !roi.inbounds_shape(&meta.shape) {
            return Err(OperatorError::RoiOutOfBounds(roi.clone(), meta.shape.clone()));
        }
        let element_size = meta.data_type.size();
        if view.num_elements() != roi.num_elements() || view.element_size() != element_size {
            return Err(OperatorError::IncompatibleView {
                view_elements: view.num_elements(),
                view_element_size: view.element_size(),
                roi_elements: roi.num_elements(),
                element_size,
            });
        }

        tracing::trace!(
            operator = self.operator.name(),
            slot = self.slot,
            subindex = ?self.subindex,
            roi = %roi,
            "execute"
        );
        let roi_shape = roi.shape();
        if view.roi().shape() == roi_shape {
            self.operator
                .execute(self.slot, &self.subindex, roi, view)
        } else {
            // The view has another geometry (e.g. an inserted axis), so execute into a dense temporary
            let mut bytes = vec![0u8; roi.num_elements_usize() * element_size];
            let mut temporary = ArrayView::new_full(&mut bytes, roi_shape, element_size)?;
            self.operator
                .execute(self.slot, &self.subindex, roi, &mut temporary)?;
            view.copy_from_bytes(&bytes)?;
            Ok(())
        }
    }
}

/// The union of value ranges, if every range is known.
fn union_value_range(
    value_ranges: impl IntoIterator<Item = Option<(f64, f64)>>,
) -> Option<(f64, f64)> {
    value_ranges
        .into_iter()
        .try_fold(None, |union: Option<(f64, f64)>, value_range| {
            let (min, max) = value_range?;
            Some(Some(union.map_or((min, max), |(union_min, union_max)| {
                (union_min.min(min), union_max.max(max))
            })))
        })
        .flatten()
}

/// Replace the extent of `axis` of a block shape hint, if the hint has `dimensionality`.
fn blockshape_with_axis_extent(
    blockshape: Option<&Vec<u64>>,
    dimensionality: usize,
    axis: usize,
    extent: u64,
) -> Option<Vec<u64>> {
    blockshape
        .filter(|blockshape| blockshape.len() == dimensionality && axis < dimensionality)
        .map(|blockshape| {
            let mut blockshape = blockshape.clone();
            blockshape[axis] = extent;
            blockshape
        })
}

/// Notifications marking every listed output fully dirty.
fn all_dirty(outputs: impl IntoIterator<Item = (&'static str, Vec<usize>)>) -> Vec<DirtyNotification> {
    outputs
        .into_iter()
        .map(|(slot, subindex)| DirtyNotification::full(slot, subindex))
        .collect()
}

fn log_configured(operator: &'static str, meta: &OutputMeta) {
    if meta.ready {
        tracing::debug!(operator, shape = ?meta.shape, data_type = %meta.data_type, "configured");
    } else {
        tracing::debug!(operator, "configured, output not ready");
    }
}

fn warn_unknown_slot(operator: &'static str, slot: &str) {
    tracing::warn!(operator, slot, "dirty notification on an unknown slot, marking all outputs dirty");
}
