use std::{marker::PhantomData, sync::Arc};

use parking_lot::RwLock;

use crate::{
    array::{ArrayElements, ArrayView, DataType, Element, IncompatibleElementTypeError, OutputMeta},
    roi::Roi,
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, ValueSlot},
};

use super::{log_configured, warn_unknown_slot, FunctionError, Operator, OperatorError, OperatorOutput};

/// A function applied to every element of an array.
///
/// The output must have one element per input element, all of one data type that does not depend on the values.
pub trait PixelFunction: Send + Sync {
    /// Apply the function to `elements`.
    ///
    /// # Errors
    /// Returns a [`FunctionError`] if the function cannot be applied to `elements`.
    fn apply(&self, elements: &ArrayElements) -> Result<ArrayElements, FunctionError>;
}

impl<F> PixelFunction for F
where
    F: Fn(&ArrayElements) -> Result<ArrayElements, FunctionError> + Send + Sync,
{
    fn apply(&self, elements: &ArrayElements) -> Result<ArrayElements, FunctionError> {
        self(elements)
    }
}

/// A [`PixelFunction`] mapping elements of type `T` to elements of type `U`.
///
/// ```rust
/// # use roiflow::{array::ArrayElements, operator::{PixelFunction, PixelMap}};
/// let double = PixelMap::new(|x: u8| f32::from(x) * 2.0);
/// assert_eq!(
///     double.apply(&ArrayElements::UInt8(vec![1, 2]))?,
///     ArrayElements::Float32(vec![2.0, 4.0])
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PixelMap<T, U, F> {
    function: F,
    _elements: PhantomData<fn(T) -> U>,
}

impl<T: Element, U: Element, F: Fn(T) -> U + Send + Sync> PixelMap<T, U, F> {
    /// Create a new pixel map from `function`.
    pub fn new(function: F) -> Self {
        Self {
            function,
            _elements: PhantomData,
        }
    }
}

impl<T: Element, U: Element, F: Fn(T) -> U + Send + Sync> PixelFunction for PixelMap<T, U, F> {
    fn apply(&self, elements: &ArrayElements) -> Result<ArrayElements, FunctionError> {
        let elements = T::elements_slice(elements).ok_or_else(|| {
            FunctionError::new(format!(
                "expected {} elements, got {}",
                T::DATA_TYPE,
                elements.data_type()
            ))
        })?;
        Ok(U::into_array_elements(
            elements.iter().map(|&element| (self.function)(element)).collect(),
        ))
    }
}

/// Applies a [`PixelFunction`] to every element of an array.
///
/// Inputs:
///  - `Input`: the array.
///  - `Function`: the function.
///
/// Outputs:
///  - `Output`: the array of function values.
///
/// The output data type is determined by applying the function to a single element with value 1.
/// The output value range is the function applied to the input value range, which assumes the function is monotonic.
///
/// Configure fails if the function cannot be applied.
pub struct OpPixelOperator {
    /// The input array.
    pub input: InputSlot,
    /// The function.
    pub function: ValueSlot<Arc<dyn PixelFunction>>,
    state: RwLock<Arc<PixelOperatorState>>,
}

#[derive(Default)]
struct PixelOperatorState {
    meta: Arc<OutputMeta>,
    input_data_type: Option<DataType>,
    function: Option<Arc<dyn PixelFunction>>,
}

impl OpPixelOperator {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the function slot.
    pub const FUNCTION: &'static str = "Function";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new pixel operator with unconnected inputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            function: ValueSlot::new(Self::FUNCTION),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<PixelOperatorState> {
        self.state.read().clone()
    }

    fn configure(&self) -> Result<PixelOperatorState, OperatorError> {
        let input_meta = self.input.meta();
        let Some(function) = self.function.get() else {
            return Ok(PixelOperatorState::default());
        };
        if !input_meta.ready {
            return Ok(PixelOperatorState::default());
        }

        let sample = function.apply(&ArrayElements::from_f64(input_meta.data_type, &[1.0]))?;
        if sample.len() != 1 {
            return Err(FunctionError::new(format!(
                "the function returned {} elements for 1 element",
                sample.len()
            ))
            .into());
        }

        let value_range = match input_meta.value_range {
            Some((min, max)) => {
                let range = function.apply(&ArrayElements::from_f64(input_meta.data_type, &[min, max]))?;
                match range.to_f64_vec()[..] {
                    [min, max] => Some((min, max)),
                    _ => None,
                }
            }
            None => None,
        };

        let meta = OutputMeta {
            data_type: sample.data_type(),
            value_range,
            ..input_meta.as_ref().clone()
        };
        Ok(PixelOperatorState {
            meta: Arc::new(meta),
            input_data_type: Some(input_meta.data_type),
            function: Some(function),
        })
    }
}

impl Default for OpPixelOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpPixelOperator {
    fn name(&self) -> &'static str {
        "OpPixelOperator"
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
        let (Some(function), Some(input_data_type)) = (&state.function, state.input_data_type) else {
            return Err(OperatorError::OutputNotReady {
                operator: self.name(),
                slot: Self::OUTPUT,
            });
        };
        let bytes = self.input.request(roi.clone())?.wait()?;
        let elements = ArrayElements::from_bytes(input_data_type, &bytes)?;
        let output = function.apply(&elements)?;
        if output.data_type() != state.meta.data_type {
            return Err(
                IncompatibleElementTypeError::new(output.data_type(), state.meta.data_type).into(),
            );
        }
        if output.len() != elements.len() {
            return Err(FunctionError::new(format!(
                "the function returned {} elements for {} elements",
                output.len(),
                elements.len()
            ))
            .into());
        }
        result.copy_from_bytes(&output.to_bytes())?;
        Ok(())
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        _subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        match slot {
            Self::INPUT => vec![DirtyNotification {
                slot: Self::OUTPUT,
                subindex: vec![],
                region: region.clone(),
            }],
            Self::FUNCTION => vec![DirtyNotification::full(Self::OUTPUT, vec![])],
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

    fn square_root() -> Arc<dyn PixelFunction> {
        Arc::new(PixelMap::new(|x: u16| f64::from(x).sqrt()))
    }

    #[test]
    fn pixel_operator_execute() {
        let operator = Arc::new(OpPixelOperator::new());
        operator.input.connect(ramp::<u16>(&[2, 3], "yx"));
        operator.function.set(square_root());
        operator.setup_outputs().unwrap();
        let output = operator.output();
        assert_eq!(output.meta().data_type, DataType::Float64);
        assert_eq!(output.meta().shape, vec![2, 3]);
        assert_eq!(
            output
                .retrieve_typed::<f64>(&Roi::new_with_ranges(&[1..2, 0..2]))
                .unwrap(),
            vec![3.0f64.sqrt(), 2.0]
        );
    }

    #[test]
    fn pixel_operator_value_range() {
        let source = ramp::<u16>(&[2, 3], "yx");
        source.set_value_range(Some((4.0, 16.0)));
        let operator = OpPixelOperator::new();
        operator.input.connect(source);
        operator.function.set(square_root());
        operator.setup_outputs().unwrap();
        assert_eq!(
            operator.output_meta(OpPixelOperator::OUTPUT, &[]).value_range,
            Some((2.0, 4.0))
        );
    }

    #[test]
    fn pixel_operator_probe_failure() {
        let operator = OpPixelOperator::new();
        operator.input.connect(ramp::<u8>(&[2, 3], "yx"));
        operator.function.set(square_root());
        assert!(matches!(
            operator.setup_outputs(),
            Err(OperatorError::Function(..))
        ));
        assert!(!operator.output_meta(OpPixelOperator::OUTPUT, &[]).ready);

        let empty = |_: &ArrayElements| -> Result<ArrayElements, FunctionError> {
            Ok(ArrayElements::UInt8(vec![]))
        };
        operator.function.set(Arc::new(empty));
        assert!(operator.setup_outputs().is_err());
    }

    #[test]
    fn pixel_operator_dirty() {
        let operator = OpPixelOperator::new();
        let roi = Roi::new_with_ranges(&[0..1, 0..2]);
        assert_eq!(
            operator.propagate_dirty(OpPixelOperator::INPUT, &[], &roi.clone().into()),
            vec![DirtyNotification::roi(OpPixelOperator::OUTPUT, vec![], roi)]
        );
        assert_eq!(
            operator.propagate_dirty(OpPixelOperator::FUNCTION, &[], &DirtyRegion::Full),
            vec![DirtyNotification::full(OpPixelOperator::OUTPUT, vec![])]
        );
    }
}
