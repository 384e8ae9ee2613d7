use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    array::{ArrayView, OutputMeta},
    roi::Roi,
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, ValueSlot},
};

use super::{blockshape_with_axis_extent, log_configured, warn_unknown_slot, Operator, OperatorError, OperatorOutput};

/// Selects a single channel of an array, keeping the channel axis with extent 1.
///
/// Inputs:
///  - `Input`: the array, with a channel axis at any position.
///  - `Index`: the channel to select.
///
/// Outputs:
///  - `Output`: the selected channel.
///
/// The output is not ready if the input has no channel axis or `Index` is not an available channel.
pub struct OpSingleChannelSelector {
    /// The input array.
    pub input: InputSlot,
    /// The channel to select.
    pub index: ValueSlot<u64>,
    state: RwLock<Arc<SingleChannelSelectorState>>,
}

#[derive(Default)]
struct SingleChannelSelectorState {
    meta: Arc<OutputMeta>,
    channel_axis: usize,
    index: u64,
}

impl OpSingleChannelSelector {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the index slot.
    pub const INDEX: &'static str = "Index";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new single channel selector with unconnected inputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            index: ValueSlot::new(Self::INDEX),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<SingleChannelSelectorState> {
        self.state.read().clone()
    }

    fn configure(&self) -> SingleChannelSelectorState {
        let input_meta = self.input.meta();
        let (Some(index), Some(channel_axis)) =
            (self.index.get(), input_meta.axis_tags.channel_index())
        else {
            return SingleChannelSelectorState::default();
        };
        if !input_meta.ready || input_meta.shape.get(channel_axis).map_or(true, |&channels| index >= channels) {
            return SingleChannelSelectorState::default();
        }
        let dimensionality = input_meta.dimensionality();
        let mut meta = input_meta.as_ref().clone();
        meta.shape[channel_axis] = 1;
        meta.ideal_blockshape =
            blockshape_with_axis_extent(meta.ideal_blockshape.as_ref(), dimensionality, channel_axis, 1);
        meta.max_blockshape =
            blockshape_with_axis_extent(meta.max_blockshape.as_ref(), dimensionality, channel_axis, 1);
        SingleChannelSelectorState {
            meta: Arc::new(meta),
            channel_axis,
            index,
        }
    }
}

impl Default for OpSingleChannelSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpSingleChannelSelector {
    fn name(&self) -> &'static str {
        "OpSingleChannelSelector"
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
        let input_roi = roi.with_axis_range(state.channel_axis, state.index..state.index + 1);
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
            (Self::INPUT, DirtyRegion::Roi(roi)) if roi.dimensionality() == state.meta.dimensionality() => {
                vec![DirtyNotification::roi(
                    Self::OUTPUT,
                    vec![],
                    roi.with_axis_range(state.channel_axis, 0..1),
                )]
            }
            (Self::INPUT | Self::INDEX, _) => vec![DirtyNotification::full(Self::OUTPUT, vec![])],
            _ => {
                warn_unknown_slot(self.name(), slot);
                vec![DirtyNotification::full(Self::OUTPUT, vec![])]
            }
        }
    }
}
