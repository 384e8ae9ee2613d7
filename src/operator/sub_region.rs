use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    array::{ArrayIndices, ArrayView, OutputMeta},
    roi::Roi,
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, ValueSlot},
};

use super::{log_configured, warn_unknown_slot, Operator, OperatorError, OperatorOutput};

/// Crops an array to a region.
///
/// Inputs:
///  - `Input`: the array.
///  - `Roi`: the `(start, stop)` of the region.
///
/// Outputs:
///  - `Output`: the region of the input, with shape `stop - start`.
///
/// The output is not ready if the region does not match the dimensionality of the input, is empty along any axis, or extends beyond the input.
pub struct OpSubRegion {
    /// The input array.
    pub input: InputSlot,
    /// The region to crop to.
    pub roi: ValueSlot<(ArrayIndices, ArrayIndices)>,
    state: RwLock<Arc<SubRegionState>>,
}

#[derive(Default)]
struct SubRegionState {
    meta: Arc<OutputMeta>,
    crop: Option<Roi>,
}

impl OpSubRegion {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the region slot.
    pub const ROI: &'static str = "Roi";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new sub-region selector with unconnected inputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            roi: ValueSlot::new(Self::ROI),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<SubRegionState> {
        self.state.read().clone()
    }

    fn configure(&self) -> SubRegionState {
        let input_meta = self.input.meta();
        let Some((start, stop)) = self.roi.get() else {
            return SubRegionState::default();
        };
        if !input_meta.ready
            || start.len() != input_meta.dimensionality()
            || stop.len() != input_meta.dimensionality()
            || std::iter::zip(&start, &stop).any(|(start, stop)| start >= stop)
        {
            return SubRegionState::default();
        }
        let Ok(crop) = Roi::new(start, stop) else {
            return SubRegionState::default();
        };
        if !crop.inbounds_shape(&input_meta.shape) {
            return SubRegionState::default();
        }
        let meta = OutputMeta {
            shape: crop.shape(),
            ..input_meta.as_ref().clone()
        };
        SubRegionState {
            meta: Arc::new(meta),
            crop: Some(crop),
        }
    }
}

impl Default for OpSubRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpSubRegion {
    fn name(&self) -> &'static str {
        "OpSubRegion"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        let state = self.configure();
        log_configured(self.name(), &state.meta);
        *self.state.write() = Arc::new(state);
        Ok(())
    }

    fn output_meta(&self, slot: &str, subindex: &[usize]) -> Arc<OutputMeta> {
        if slot == Self::OUTPUT && subindex.is_empty() {
            self.state().meta.clone()
        } else {
            Arc::new(OutputMeta::not_ready())
        }
    }

    fn execute(
        &self,
        _slot: &str,
        _subindex: &[usize],
        roi: &Roi,
        result: &mut ArrayView,
    ) -> Result<(), OperatorError> {
        let state = self.state();
        let crop = state.crop.as_ref().ok_or(OperatorError::OutputNotReady {
            operator: self.name(),
            slot: Self::OUTPUT,
        })?;
        let input_roi = roi.translate(crop.start())?;
        self.input
            .request(input_roi)?
            .write_into(result.reborrow())
            .wait()
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        _subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        let state = self.state();
        match (slot, region) {
            (Self::INPUT, DirtyRegion::Roi(roi)) => {
                let Some(crop) = &state.crop else {
                    return vec![];
                };
                match roi.intersection(crop) {
                    Ok(Some(intersection)) => intersection
                        .relative_to(crop.start())
                        .map(|roi| vec![DirtyNotification::roi(Self::OUTPUT, vec![], roi)])
                        .unwrap_or_default(),
                    Ok(None) => vec![],
                    Err(err) => {
                        tracing::debug!(operator = self.name(), %err, "dirty region suppressed");
                        vec![]
                    }
                }
            }
            (Self::INPUT | Self::ROI, _) => vec![DirtyNotification::full(Self::OUTPUT, vec![])],
            _ => {
                warn_unknown_slot(self.name(), slot);
                vec![DirtyNotification::full(Self::OUTPUT, vec![])]
            }
        }
    }
}
