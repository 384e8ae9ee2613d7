use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    array::{ArrayView, OutputMeta},
    roi::Roi,
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, SlotList, ValueSlot},
};

use super::{log_configured, warn_unknown_slot, Operator, OperatorError, OperatorOutput};

/// Selects one sub-slot of a slot list.
///
/// Inputs:
///  - `Inputs`: the slot list.
///  - `SubslotIndex`: the index of the sub-slot to select.
///
/// Outputs:
///  - `Output`: the selected sub-slot, passed through.
///
/// The output is not ready if the index is beyond the list.
pub struct OpSelectSubslot {
    /// The slot list.
    pub inputs: Arc<SlotList>,
    /// The index of the sub-slot to select.
    pub subslot_index: ValueSlot<usize>,
    state: RwLock<Arc<SelectSubslotState>>,
}

#[derive(Default)]
struct SelectSubslotState {
    index: usize,
    selected: Option<Arc<InputSlot>>,
}

impl OpSelectSubslot {
    /// The name of the inputs slot.
    pub const INPUTS: &'static str = "Inputs";
    /// The name of the sub-slot index slot.
    pub const SUBSLOT_INDEX: &'static str = "SubslotIndex";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new sub-slot selector with an empty slot list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: Arc::new(SlotList::new(Self::INPUTS)),
            subslot_index: ValueSlot::new(Self::SUBSLOT_INDEX),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<SelectSubslotState> {
        self.state.read().clone()
    }
}

impl Default for OpSelectSubslot {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpSelectSubslot {
    fn name(&self) -> &'static str {
        "OpSelectSubslot"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        let state = self
            .subslot_index
            .get()
            .and_then(|index| {
                Some(SelectSubslotState {
                    index,
                    selected: Some(self.inputs.get(index)?),
                })
            })
            .unwrap_or_default();
        *self.state.write() = Arc::new(state);
        log_configured(self.name(), &self.output_meta(Self::OUTPUT, &[]));
        Ok(())
    }

    fn output_meta(&self, slot: &str, subindex: &[usize]) -> Arc<OutputMeta> {
        match &self.state().selected {
            Some(selected) if slot == Self::OUTPUT && subindex.is_empty() => selected.meta(),
            _ => Arc::new(OutputMeta::not_ready()),
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
        let selected = state.selected.as_ref().ok_or(OperatorError::OutputNotReady {
            operator: self.name(),
            slot: Self::OUTPUT,
        })?;
        selected
            .request(roi.clone())?
            .write_into(result.reborrow())
            .wait()
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        let state = self.state();
        match (slot, subindex) {
            (Self::INPUTS, [index]) if *index == state.index && state.selected.is_some() => {
                vec![DirtyNotification {
                    slot: Self::OUTPUT,
                    subindex: vec![],
                    region: region.clone(),
                }]
            }
            (Self::INPUTS, _) => vec![],
            (Self::SUBSLOT_INDEX, _) => vec![DirtyNotification::full(Self::OUTPUT, vec![])],
            _ => {
                warn_unknown_slot(self.name(), slot);
                vec![DirtyNotification::full(Self::OUTPUT, vec![])]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{operator::test_util::ramp, slot::ArraySourceExt};

    use super::*;

    fn select() -> Arc<OpSelectSubslot> {
        let select = Arc::new(OpSelectSubslot::new());
        select.inputs.push(ramp::<u8>(&[2], "x"));
        select.inputs.push(ramp::<u8>(&[3], "x"));
        select.subslot_index.set(1);
        select.setup_outputs().unwrap();
        select
    }

    #[test]
    fn select_subslot() {
        let select = select();
        let output = select.output();
        assert_eq!(output.meta().shape, vec![3]);
        assert_eq!(
            output.retrieve_typed::<u8>(&Roi::new_with_ranges(&[1..3])).unwrap(),
            vec![1, 2]
        );
        select.subslot_index.set(2);
        select.setup_outputs().unwrap();
        assert!(!output.meta().ready);
    }

    #[test]
    fn select_subslot_dirty() {
        let select = select();
        let roi = Roi::new_with_ranges(&[0..1]);
        assert_eq!(
            select.propagate_dirty(OpSelectSubslot::INPUTS, &[1], &roi.clone().into()),
            vec![DirtyNotification::roi(OpSelectSubslot::OUTPUT, vec![], roi.clone())]
        );
        assert!(select
            .propagate_dirty(OpSelectSubslot::INPUTS, &[0], &roi.into())
            .is_empty());
        assert_eq!(
            select.propagate_dirty(OpSelectSubslot::SUBSLOT_INDEX, &[], &DirtyRegion::Full),
            vec![DirtyNotification::full(OpSelectSubslot::OUTPUT, vec![])]
        );
    }
}
