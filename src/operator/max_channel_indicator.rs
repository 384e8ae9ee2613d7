use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    array::{with_elements, ArrayView, DataType, Element, OutputMeta},
    roi::Roi,
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot},
};

use super::{log_configured, warn_unknown_slot, Operator, OperatorError, OperatorOutput};

/// Indicates where a channel is the maximal channel of an array.
///
/// Inputs:
///  - `Input`: the array, with the channel axis last.
///
/// Outputs:
///  - `Output`: a `uint8` array with the shape of the input and value range `(0, 1)`.
///    Channel `c` is 1 where `c` is the first maximal channel of the input, and 0 elsewhere.
///    An input block that is zero everywhere yields zeros.
///
/// Requests must cover exactly one channel.
/// Configure fails if the channel axis of the input is not the last axis.
pub struct OpMaxChannelIndicator {
    /// The input array.
    pub input: InputSlot,
    state: RwLock<Arc<MaxChannelIndicatorState>>,
}

#[derive(Default)]
struct MaxChannelIndicatorState {
    meta: Arc<OutputMeta>,
    num_channels: u64,
}

/// Write 1 to `indicator` where `channel` is the first maximal channel of each pixel of `elements`.
#[allow(clippy::cast_possible_truncation)]
fn indicate_max_channel<T: Element>(elements: &[T], num_channels: usize, channel: usize, indicator: &mut [u8]) {
    if elements.iter().all(|element| element.as_() == 0.0) {
        return;
    }
    for (pixel, output) in std::iter::zip(elements.chunks_exact(num_channels), indicator) {
        let argmax = pixel
            .iter()
            .enumerate()
            .fold(0, |argmax, (i, value)| if *value > pixel[argmax] { i } else { argmax });
        *output = u8::from(argmax == channel);
    }
}

impl OpMaxChannelIndicator {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new max channel indicator with an unconnected input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<MaxChannelIndicatorState> {
        self.state.read().clone()
    }

    fn configure(&self) -> Result<MaxChannelIndicatorState, OperatorError> {
        let input_meta = self.input.meta();
        if !input_meta.ready {
            return Ok(MaxChannelIndicatorState::default());
        }
        let num_channels = match input_meta.axis_tags.channel_index() {
            Some(channel_axis) if channel_axis + 1 == input_meta.dimensionality() => {
                input_meta.shape[channel_axis]
            }
            _ => return Err(OperatorError::ChannelAxisNotLast(input_meta.axis_tags.clone())),
        };
        let meta = OutputMeta {
            data_type: DataType::UInt8,
            value_range: Some((0.0, 1.0)),
            ..input_meta.as_ref().clone()
        };
        Ok(MaxChannelIndicatorState {
            meta: Arc::new(meta),
            num_channels,
        })
    }
}

impl Default for OpMaxChannelIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpMaxChannelIndicator {
    fn name(&self) -> &'static str {
        "OpMaxChannelIndicator"
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
        let channels = roi.axis_range(channel_axis);
        if channels.end - channels.start != 1 {
            return Err(OperatorError::InvalidRoi(
                roi.clone(),
                "exactly one channel must be requested".to_string(),
            ));
        }
        let (Ok(channel), Ok(num_channels)) = (
            usize::try_from(channels.start),
            usize::try_from(state.num_channels),
        ) else {
            return Err(OperatorError::InvalidRoi(roi.clone(), "channel out of range".to_string()));
        };

        let input_roi = roi.with_axis_range(channel_axis, 0..state.num_channels);
        let elements = self.input.request(input_roi)?.wait_elements()?;
        let mut indicator = vec![0u8; roi.num_elements_usize()];
        with_elements!(&elements, v => indicate_max_channel(v, num_channels, channel, &mut indicator));
        result.copy_from_bytes(&indicator)?;
        Ok(())
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
                let channel_axis = roi.dimensionality() - 1;
                vec![DirtyNotification::roi(
                    Self::OUTPUT,
                    vec![],
                    roi.with_axis_range(channel_axis, 0..state.num_channels),
                )]
            }
            (Self::INPUT, _) => vec![DirtyNotification::full(Self::OUTPUT, vec![])],
            _ => {
                warn_unknown_slot(self.name(), slot);
                vec![DirtyNotification::full(Self::OUTPUT, vec![])]
            }
        }
    }
}
