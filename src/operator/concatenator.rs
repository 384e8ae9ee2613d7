use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
};

use parking_lot::RwLock;

use crate::{
    array::{ArrayView, OutputMeta},
    roi::Roi,
    slot::{ArraySource, DirtyNotification, DirtyRegion, SlotList, SlotListId, SlotListObserver},
};

use super::{Operator, OperatorError};

/// Concatenates a list of slot lists into one slot list.
///
/// Inputs:
///  - `Inputs`: the slot lists, in order.
///
/// Outputs:
///  - `Output`: a slot list holding the sub-slots of every input list in order.
///
/// The output holds the same sub-slots as the inputs, so data flows through without the operator executing.
/// After configure, the concatenator observes every input list and mirrors insertions and removals into the output.
/// The output is rebuilt on configure when the input lists changed.
pub struct OpMultiInputConcatenator {
    inputs: RwLock<Vec<Arc<SlotList>>>,
    output: Arc<SlotList>,
    state: RwLock<Arc<ConcatenatorState>>,
    this: Weak<Self>,
}

#[derive(Default)]
struct ConcatenatorState {
    /// The ids of the input lists at the last rebuild, in order.
    list_ids: Vec<SlotListId>,
    /// Input list id to its position in the inputs.
    positions: HashMap<SlotListId, usize>,
    subscribed: HashSet<SlotListId>,
}

impl OpMultiInputConcatenator {
    /// The name of the inputs slot.
    pub const INPUTS: &'static str = "Inputs";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new concatenator without input lists.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            inputs: RwLock::default(),
            output: Arc::new(SlotList::new(Self::OUTPUT)),
            state: RwLock::default(),
            this: this.clone(),
        })
    }

    /// Append an input list.
    pub fn push_input(&self, list: Arc<SlotList>) {
        self.inputs.write().push(list);
    }

    /// Insert an input list at `index`.
    ///
    /// # Panics
    /// Panics if `index` is greater than the number of input lists.
    pub fn insert_input(&self, index: usize, list: Arc<SlotList>) {
        self.inputs.write().insert(index, list);
    }

    /// Remove and return the input list at `index`.
    pub fn remove_input(&self, index: usize) -> Option<Arc<SlotList>> {
        let mut inputs = self.inputs.write();
        (index < inputs.len()).then(|| inputs.remove(index))
    }

    /// Return the input lists.
    #[must_use]
    pub fn inputs(&self) -> Vec<Arc<SlotList>> {
        self.inputs.read().clone()
    }

    /// Return the output slot list.
    #[must_use]
    pub fn output(&self) -> Arc<SlotList> {
        self.output.clone()
    }

    fn state(&self) -> Arc<ConcatenatorState> {
        self.state.read().clone()
    }

    /// The output index of sub-slot `index` of `list`, if `list` is a configured input.
    fn output_index(&self, list: &SlotList, index: usize) -> Option<usize> {
        let position = *self.state().positions.get(&list.id())?;
        let preceding = self
            .inputs
            .read()
            .get(..position)?
            .iter()
            .map(|list| list.len())
            .sum::<usize>();
        Some(preceding + index)
    }
}

impl SlotListObserver for OpMultiInputConcatenator {
    fn slot_inserted(&self, list: &SlotList, index: usize) {
        let (Some(output_index), Some(slot)) = (self.output_index(list, index), list.get(index)) else {
            return;
        };
        tracing::trace!(list = %list.id(), index, output_index, "mirroring inserted sub-slot");
        self.output.insert_slot(output_index, slot);
    }

    fn slot_removed(&self, list: &SlotList, index: usize) {
        let Some(output_index) = self.output_index(list, index) else {
            return;
        };
        tracing::trace!(list = %list.id(), index, output_index, "mirroring removed sub-slot");
        self.output.remove(output_index);
    }
}

impl Operator for OpMultiInputConcatenator {
    fn name(&self) -> &'static str {
        "OpMultiInputConcatenator"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        let inputs = self.inputs();
        let list_ids = inputs.iter().map(|list| list.id()).collect::<Vec<_>>();
        let previous = self.state();
        if previous.list_ids == list_ids && !inputs.is_empty() {
            return Ok(());
        }

        let mut subscribed = previous.subscribed.clone();
        if let Some(this) = self.this.upgrade() {
            let observer: Arc<dyn SlotListObserver> = this;
            for list in &inputs {
                if subscribed.insert(list.id()) {
                    list.subscribe(Arc::downgrade(&observer));
                }
            }
        }
        let positions = inputs
            .iter()
            .enumerate()
            .map(|(position, list)| (list.id(), position))
            .collect();
        *self.state.write() = Arc::new(ConcatenatorState {
            list_ids,
            positions,
            subscribed,
        });

        self.output.resize(0);
        for slot in inputs.iter().flat_map(|list| list.slots()) {
            self.output.push_slot(slot);
        }
        tracing::debug!(
            operator = self.name(),
            num_input_lists = inputs.len(),
            num_slots = self.output.len(),
            "configured"
        );
        Ok(())
    }

    fn output_meta(&self, slot: &str, subindex: &[usize]) -> Arc<OutputMeta> {
        match subindex {
            [index] if slot == Self::OUTPUT => self
                .output
                .get(*index)
                .map_or_else(|| Arc::new(OutputMeta::not_ready()), |slot| slot.meta()),
            _ => Arc::new(OutputMeta::not_ready()),
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
        // The output shares the input sub-slots, which notify downstream themselves
        vec![]
    }
}
