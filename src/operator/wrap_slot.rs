use std::sync::Arc;

use crate::{
    array::{ArrayView, OutputMeta},
    roi::Roi,
    slot::{ArraySource, DirtyNotification, DirtyRegion, InputSlot, SlotList},
};

use super::{Operator, OperatorError};

/// Exposes a single input as a slot list with one sub-slot.
///
/// The sub-slot of the output is the input slot itself, so data flows through without the operator executing.
pub struct OpWrapSlot {
    /// The input.
    pub input: Arc<InputSlot>,
    output: Arc<SlotList>,
}

impl OpWrapSlot {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new wrap slot adaptor with an unconnected input.
    #[must_use]
    pub fn new() -> Self {
        let input = Arc::new(InputSlot::new(Self::INPUT));
        let output = Arc::new(SlotList::new(Self::OUTPUT));
        output.push_slot(input.clone());
        Self { input, output }
    }

    /// Return the output slot list.
    #[must_use]
    pub fn output(&self) -> Arc<SlotList> {
        self.output.clone()
    }
}

impl Default for OpWrapSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpWrapSlot {
    fn name(&self) -> &'static str {
        "OpWrapSlot"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        let wrapped = self
            .output
            .get(0)
            .is_some_and(|slot| Arc::ptr_eq(&slot, &self.input));
        if !wrapped || self.output.len() != 1 {
            self.output.resize(0);
            self.output.push_slot(self.input.clone());
        }
        tracing::debug!(operator = self.name(), ready = self.input.ready(), "configured");
        Ok(())
    }

    fn output_meta(&self, slot: &str, subindex: &[usize]) -> Arc<OutputMeta> {
        if slot == Self::OUTPUT && subindex == [0] {
            self.input.meta()
        } else {
            Arc::new(OutputMeta::not_ready())
        }
    }

    fn execute(
        &self,
        _slot: &str,
        _subindex: &[usize],
        _roi: &Roi,
        _result: &mut ArrayView,
    ) -> Result<(), OperatorError> {
        Err(OperatorError::ExecuteUnreachable {
            operator: self.name(),
            slot: Self::OUTPUT,
        })
    }

    fn propagate_dirty(
        &self,
        _slot: &str,
        _subindex: &[usize],
        _region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use crate::{operator::test_util::ramp, slot::ArraySourceExt};

    use super::*;

    #[test]
    fn wrap_slot() {
        let wrap = OpWrapSlot::new();
        let output = wrap.output();
        assert_eq!(output.len(), 1);
        assert!(!wrap.output_meta(OpWrapSlot::OUTPUT, &[0]).ready);

        wrap.input.connect(ramp::<u8>(&[3], "x"));
        wrap.setup_outputs().unwrap();
        assert_eq!(output.len(), 1);
        assert!(output.ready());
        assert_eq!(
            output
                .get(0)
                .unwrap()
                .retrieve_typed::<u8>(&Roi::new_with_ranges(&[1..3]))
                .unwrap(),
            vec![1, 2]
        );
        assert_eq!(wrap.output_meta(OpWrapSlot::OUTPUT, &[0]).shape, vec![3]);
        assert!(!wrap.output_meta(OpWrapSlot::OUTPUT, &[1]).ready);
    }

    #[test]
    fn wrap_slot_execute_unreachable() {
        let wrap = OpWrapSlot::new();
        let mut bytes = vec![0u8];
        let mut view = ArrayView::new_full(&mut bytes, vec![1], 1).unwrap();
        assert!(matches!(
            wrap.execute(OpWrapSlot::OUTPUT, &[0], &Roi::new_with_shape(vec![1]), &mut view),
            Err(OperatorError::ExecuteUnreachable { .. })
        ));
        assert!(wrap
            .propagate_dirty(OpWrapSlot::INPUT, &[], &DirtyRegion::Full)
            .is_empty());
    }
}
