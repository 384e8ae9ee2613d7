use std::{marker::PhantomData, sync::Arc};

use parking_lot::RwLock;

use crate::{
    array::{ArrayElements, ArrayView, DataType, Element, IncompatibleElementTypeError, OutputMeta},
    roi::Roi,
    slot::{
        ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, RequestPool,
        SlotList, ValueSlot,
    },
};

use super::{log_configured, warn_unknown_slot, FunctionError, Operator, OperatorError, OperatorOutput};

/// A function merging the elements of several arrays into one array.
///
/// The elements of each input are in C order of the same region.
/// A merge function must be pointwise: each output element may only depend on the input elements at the same position.
/// Dirty propagation of [`OpMultiArrayMerger`] relies on this.
pub trait MergeFunction: Send + Sync {
    /// Merge `inputs` into one array of elements.
    ///
    /// # Errors
    /// Returns a [`FunctionError`] if the inputs cannot be merged.
    fn merge(&self, inputs: &[ArrayElements]) -> Result<ArrayElements, FunctionError>;
}

impl<F> MergeFunction for F
where
    F: Fn(&[ArrayElements]) -> Result<ArrayElements, FunctionError> + Send + Sync,
{
    fn merge(&self, inputs: &[ArrayElements]) -> Result<ArrayElements, FunctionError> {
        self(inputs)
    }
}

/// A [`MergeFunction`] applying a function to the elements at each position of inputs with element type `T`.
///
/// ```rust
/// # use roiflow::{array::ArrayElements, operator::{ElementwiseMerge, MergeFunction}};
/// let sum = ElementwiseMerge::new(|values: &[u8]| values.iter().sum());
/// let merged = sum.merge(&[ArrayElements::UInt8(vec![1, 2]), ArrayElements::UInt8(vec![3, 4])])?;
/// assert_eq!(merged, ArrayElements::UInt8(vec![4, 6]));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ElementwiseMerge<T, F> {
    function: F,
    _element: PhantomData<fn(&[T]) -> T>,
}

impl<T: Element, F: Fn(&[T]) -> T + Send + Sync> ElementwiseMerge<T, F> {
    /// Create a new elementwise merge from `function`.
    pub fn new(function: F) -> Self {
        Self {
            function,
            _element: PhantomData,
        }
    }
}

impl<T: Element, F: Fn(&[T]) -> T + Send + Sync> MergeFunction for ElementwiseMerge<T, F> {
    fn merge(&self, inputs: &[ArrayElements]) -> Result<ArrayElements, FunctionError> {
        let inputs = inputs
            .iter()
            .map(|elements| {
                T::elements_slice(elements).ok_or_else(|| {
                    FunctionError::new(format!(
                        "expected {} elements, got {}",
                        T::DATA_TYPE,
                        elements.data_type()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let len = inputs.first().map_or(0, |elements| elements.len());
        if inputs.iter().any(|elements| elements.len() != len) {
            return Err(FunctionError::new("inputs have differing lengths"));
        }
        let mut values = Vec::with_capacity(inputs.len());
        let merged = (0..len)
            .map(|i| {
                values.clear();
                values.extend(inputs.iter().map(|elements| elements[i]));
                (self.function)(&values)
            })
            .collect::<Vec<T>>();
        Ok(T::into_array_elements(merged))
    }
}

/// Merges a list of arrays with a [`MergeFunction`].
///
/// Inputs:
///  - `Inputs`: the arrays to merge, which must have the same shape and axis tags.
///  - `MergingFunction`: the merge function.
///
/// Outputs:
///  - `Output`: the merged array, with the metadata of the first input.
///
/// The value range of the output is the merge function applied to the value range of every input, if every input has one.
///
/// The output is not ready if the list is empty, any input is not ready, or the merge function is not set.
/// Configure fails if the inputs have differing shapes or axis tags.
pub struct OpMultiArrayMerger {
    /// The arrays to merge.
    pub inputs: Arc<SlotList>,
    /// The merge function.
    pub merging_function: ValueSlot<Arc<dyn MergeFunction>>,
    state: RwLock<Arc<MergerState>>,
}

#[derive(Default)]
struct MergerState {
    meta: Arc<OutputMeta>,
    inputs: Vec<Arc<InputSlot>>,
    data_types: Vec<DataType>,
    function: Option<Arc<dyn MergeFunction>>,
}

impl OpMultiArrayMerger {
    /// The name of the inputs slot.
    pub const INPUTS: &'static str = "Inputs";
    /// The name of the merging function slot.
    pub const MERGING_FUNCTION: &'static str = "MergingFunction";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new merger with an empty list of inputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: Arc::new(SlotList::new(Self::INPUTS)),
            merging_function: ValueSlot::new(Self::MERGING_FUNCTION),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<MergerState> {
        self.state.read().clone()
    }

    fn configure(&self) -> Result<MergerState, OperatorError> {
        let inputs = self.inputs.slots();
        let metas = inputs.iter().map(|input| input.meta()).collect::<Vec<_>>();
        let (Some(first), Some(function)) = (metas.first(), self.merging_function.get()) else {
            return Ok(MergerState::default());
        };
        if metas.iter().any(|meta| !meta.ready) {
            return Ok(MergerState::default());
        }
        for meta in &metas[1..] {
            if meta.shape != first.shape {
                return Err(OperatorError::IncompatibleInputs {
                    operator: self.name(),
                    reason: format!("input shapes {:?} and {:?} differ", first.shape, meta.shape),
                });
            }
            if meta.axis_tags != first.axis_tags {
                return Err(OperatorError::IncompatibleInputs {
                    operator: self.name(),
                    reason: format!(
                        "input axis tags {} and {} differ",
                        first.axis_tags, meta.axis_tags
                    ),
                });
            }
        }

        let value_ranges = metas
            .iter()
            .map(|meta| {
                meta.value_range
                    .map(|(min, max)| ArrayElements::from_f64(meta.data_type, &[min, max]))
            })
            .collect::<Option<Vec<_>>>();
        let value_range = match value_ranges {
            Some(value_ranges) => match function.merge(&value_ranges)?.to_f64_vec()[..] {
                [min, max] => Some((min, max)),
                _ => None,
            },
            None => None,
        };

        let meta = first.as_ref().clone().with_value_range(value_range);
        Ok(MergerState {
            meta: Arc::new(meta),
            data_types: metas.iter().map(|meta| meta.data_type).collect(),
            inputs,
            function: Some(function),
        })
    }
}

impl Default for OpMultiArrayMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpMultiArrayMerger {
    fn name(&self) -> &'static str {
        "OpMultiArrayMerger"
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
        let function = state.function.as_ref().ok_or(OperatorError::SlotNotReady(
            Self::MERGING_FUNCTION,
        ))?;

        let mut pool = RequestPool::new();
        for input in &state.inputs {
            pool.add(input.request(roi.clone())?);
        }
        tracing::trace!(operator = self.name(), roi = %roi, num_requests = pool.len(), "merging");
        let inputs = std::iter::zip(&state.data_types, pool.wait()?)
            .map(|(&data_type, bytes)| ArrayElements::from_bytes(data_type, &bytes))
            .collect::<Result<Vec<_>, _>>()?;

        let merged = function.merge(&inputs)?;
        if merged.data_type() != state.meta.data_type {
            return Err(
                IncompatibleElementTypeError::new(merged.data_type(), state.meta.data_type).into(),
            );
        }
        if merged.len() as u64 != roi.num_elements() {
            return Err(FunctionError::new(format!(
                "merge function returned {} elements, expected {}",
                merged.len(),
                roi.num_elements()
            ))
            .into());
        }
        result.copy_from_bytes(&merged.to_bytes())?;
        Ok(())
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        _subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        match slot {
            Self::INPUTS => vec![DirtyNotification {
                slot: Self::OUTPUT,
                subindex: vec![],
                region: region.clone(),
            }],
            Self::MERGING_FUNCTION => vec![DirtyNotification::full(Self::OUTPUT, vec![])],
            _ => {
                warn_unknown_slot(self.name(), slot);
                vec![DirtyNotification::full(Self::OUTPUT, vec![])]
            }
        }
    }
}
