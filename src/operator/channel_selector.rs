use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    array::{ArrayView, OutputMeta},
    roi::Roi,
    slot::{
        ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, RequestPool,
        ValueSlot,
    },
};

use super::{blockshape_with_axis_extent, log_configured, warn_unknown_slot, Operator, OperatorError, OperatorOutput};

/// Selects and reorders channels of an array.
///
/// Inputs:
///  - `Input`: the array, with the channel axis last.
///  - `SelectedChannels`: the input channel of each output channel. Channels may repeat. Defaults to `[0]`.
///
/// Outputs:
///  - `Output`: the array with as many channels as selected.
///
/// The ideal block shape hint gets channel extent 1 and the max block shape hint gets the number of selected channels.
///
/// The output is not ready if the selection is empty or a selected channel is not available.
/// Configure fails if the channel axis of the input is not the last axis.
pub struct OpMultiChannelSelector {
    /// The input array.
    pub input: InputSlot,
    /// The selected channels.
    pub selected_channels: ValueSlot<Vec<u64>>,
    state: RwLock<Arc<ChannelSelectorState>>,
}

#[derive(Default)]
struct ChannelSelectorState {
    meta: Arc<OutputMeta>,
    channels: Vec<u64>,
}

impl OpMultiChannelSelector {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the selected channels slot.
    pub const SELECTED_CHANNELS: &'static str = "SelectedChannels";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new channel selector with an unconnected input, selecting channel 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            selected_channels: ValueSlot::with_value(Self::SELECTED_CHANNELS, vec![0]),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<ChannelSelectorState> {
        self.state.read().clone()
    }

    fn configure(&self) -> Result<ChannelSelectorState, OperatorError> {
        let input_meta = self.input.meta();
        if !input_meta.ready {
            return Ok(ChannelSelectorState::default());
        }
        let dimensionality = input_meta.dimensionality();
        let channel_axis = match input_meta.axis_tags.channel_index() {
            Some(channel_axis) if channel_axis + 1 == dimensionality => channel_axis,
            _ => return Err(OperatorError::ChannelAxisNotLast(input_meta.axis_tags.clone())),
        };
        let channels = self.selected_channels.get().unwrap_or_default();
        let available = input_meta.shape[channel_axis];
        if channels.is_empty() || channels.iter().any(|&channel| channel >= available) {
            tracing::debug!(operator = self.name(), ?channels, available, "invalid channel selection");
            return Ok(ChannelSelectorState::default());
        }

        let num_channels = channels.len() as u64;
        let mut meta = input_meta.as_ref().clone();
        meta.shape[channel_axis] = num_channels;
        meta.ideal_blockshape = blockshape_with_axis_extent(
            meta.ideal_blockshape.as_ref(),
            dimensionality,
            channel_axis,
            1,
        );
        meta.max_blockshape = blockshape_with_axis_extent(
            meta.max_blockshape.as_ref(),
            dimensionality,
            channel_axis,
            num_channels,
        );
        Ok(ChannelSelectorState {
            meta: Arc::new(meta),
            channels,
        })
    }
}

impl Default for OpMultiChannelSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpMultiChannelSelector {
    fn name(&self) -> &'static str {
        "OpMultiChannelSelector"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        match self.configure() {
            Ok(state) => {
                log_configured(self.name(), &state.meta);
                *self.state.write() = Arc::new(state);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(operator = self.name(), %err, "configure failed");
                *self.state.write() = Arc::default();
                Err(err)
            }
        }
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
        let channel_axis = roi.dimensionality().checked_sub(1).ok_or_else(|| {
            OperatorError::InvalidRoi(roi.clone(), "the region has no channel axis".to_string())
        })?;
        let range = roi.axis_range(channel_axis);
        let selected = usize::try_from(range.start)
            .ok()
            .zip(usize::try_from(range.end).ok())
            .and_then(|(start, end)| state.channels.get(start..end))
            .ok_or_else(|| {
                OperatorError::InvalidRoi(roi.clone(), "channels out of range".to_string())
            })?;

        if let [channel] = selected {
            let input_roi = roi.with_axis_range(channel_axis, *channel..channel + 1);
            return self
                .input
                .request(input_roi)?
                .write_into(result.reborrow())
                .wait();
        }

        let result_roi = Roi::new_with_shape(roi.shape());
        let mut pool = RequestPool::new();
        for (output_channel, &channel) in (0u64..).zip(selected) {
            let view_roi = result_roi.with_axis_range(channel_axis, output_channel..output_channel + 1);
            // SAFETY: each view covers a distinct channel of the result
            let view = unsafe { result.subset_view(&view_roi) }?;
            let input_roi = roi.with_axis_range(channel_axis, channel..channel + 1);
            pool.add(self.input.request(input_roi)?.write_into(view));
        }
        tracing::trace!(operator = self.name(), roi = %roi, num_requests = pool.len(), "selecting channels");
        pool.wait()?;
        Ok(())
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        _subindex: &[usize],
        _region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        if slot != Self::INPUT && slot != Self::SELECTED_CHANNELS {
            warn_unknown_slot(self.name(), slot);
        }
        vec![DirtyNotification::full(Self::OUTPUT, vec![])]
    }
}

#[cfg(test)]
mod tests {
    use crate::{operator::test_util::ramp, slot::ArraySourceExt};

    use super::*;

    fn selector(channels: Vec<u64>) -> Arc<OpMultiChannelSelector> {
        let selector = Arc::new(OpMultiChannelSelector::new());
        selector.input.connect(ramp::<u16>(&[2, 4], "xc"));
        selector.selected_channels.set(channels);
        selector.setup_outputs().unwrap();
        selector
    }

    #[test]
    fn channel_selector_default_selection() {
        let selector = Arc::new(OpMultiChannelSelector::new());
        selector.input.connect(ramp::<u16>(&[2, 4], "xc"));
        selector.setup_outputs().unwrap();
        let output = selector.output();
        assert_eq!(output.meta().shape, vec![2, 1]);
        assert_eq!(
            output.retrieve_typed::<u16>(&Roi::new_with_shape(vec![2, 1])).unwrap(),
            vec![0, 4]
        );
    }

    #[test]
    fn channel_selector_remap() {
        let selector = selector(vec![2, 0, 0]);
        let output = selector.output();
        assert_eq!(output.meta().shape, vec![2, 3]);
        assert_eq!(
            output.retrieve_typed::<u16>(&Roi::new_with_shape(vec![2, 3])).unwrap(),
            vec![2, 0, 0, 6, 4, 4]
        );
        assert_eq!(
            output
                .retrieve_typed::<u16>(&Roi::new_with_ranges(&[1..2, 0..1]))
                .unwrap(),
            vec![6]
        );
    }

    #[test]
    fn channel_selector_configure() {
        let source = ramp::<u16>(&[2, 4], "xc");
        source.set_meta(
            &OutputMeta::not_ready()
                .with_ideal_blockshape(Some(vec![2, 4]))
                .with_max_blockshape(Some(vec![2, 4])),
        );
        let selector = OpMultiChannelSelector::new();
        selector.input.connect(source);
        selector.selected_channels.set(vec![3, 1]);
        selector.setup_outputs().unwrap();
        let meta = selector.output_meta(OpMultiChannelSelector::OUTPUT, &[]);
        assert_eq!(meta.ideal_blockshape, Some(vec![2, 1]));
        assert_eq!(meta.max_blockshape, Some(vec![2, 2]));

        selector.selected_channels.set(vec![4]);
        selector.setup_outputs().unwrap();
        assert!(!selector.output_meta(OpMultiChannelSelector::OUTPUT, &[]).ready);
        selector.selected_channels.set(vec![]);
        selector.setup_outputs().unwrap();
        assert!(!selector.output_meta(OpMultiChannelSelector::OUTPUT, &[]).ready);

        selector.input.connect(ramp::<u16>(&[4, 2], "cx"));
        selector.selected_channels.set(vec![0]);
        assert!(matches!(
            selector.setup_outputs(),
            Err(OperatorError::ChannelAxisNotLast(..))
        ));
    }

    #[test]
    fn channel_selector_dirty() {
        let selector = selector(vec![1]);
        assert_eq!(
            selector.propagate_dirty(
                OpMultiChannelSelector::INPUT,
                &[],
                &Roi::new_with_ranges(&[0..1, 1..2]).into()
            ),
            vec![DirtyNotification::full(OpMultiChannelSelector::OUTPUT, vec![])]
        );
    }
}
