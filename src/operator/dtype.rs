//! Data type views and conversions.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    array::{ArrayView, DataType, OutputMeta},
    roi::Roi,
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, ValueSlot},
};

use super::{log_configured, warn_unknown_slot, Operator, OperatorError, OperatorOutput};

fn pass_through_dirty(
    operator: &'static str,
    input: &'static str,
    parameter: &'static str,
    slot: &str,
    region: &DirtyRegion,
) -> Vec<DirtyNotification> {
    const OUTPUT: &str = "Output";
    if slot == input {
        vec![DirtyNotification {
            slot: OUTPUT,
            subindex: vec![],
            region: region.clone(),
        }]
    } else {
        if slot != parameter {
            warn_unknown_slot(operator, slot);
        }
        vec![DirtyNotification::full(OUTPUT, vec![])]
    }
}

/// Reinterprets the elements of an array as another data type with the same element size.
///
/// Inputs:
///  - `Input`: the array.
///  - `OutputDtype`: the data type to reinterpret the elements as.
///
/// Outputs:
///  - `Output`: the array with the bytes of the input, without a value range.
///
/// Configure fails if the element sizes of the data types differ.
pub struct OpDtypeView {
    /// The input array.
    pub input: InputSlot,
    /// The output data type.
    pub output_dtype: ValueSlot<DataType>,
    meta: RwLock<Arc<OutputMeta>>,
}

impl OpDtypeView {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the output data type slot.
    pub const OUTPUT_DTYPE: &'static str = "OutputDtype";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new data type view with unconnected inputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            output_dtype: ValueSlot::new(Self::OUTPUT_DTYPE),
            meta: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn configure(&self) -> Result<OutputMeta, OperatorError> {
        let input_meta = self.input.meta();
        let Some(data_type) = self.output_dtype.get() else {
            return Ok(OutputMeta::not_ready());
        };
        if !input_meta.ready {
            return Ok(OutputMeta::not_ready());
        }
        if input_meta.data_type.size() != data_type.size() {
            return Err(OperatorError::IncompatibleElementSize(
                input_meta.data_type,
                data_type,
            ));
        }
        Ok(OutputMeta {
            data_type,
            value_range: None,
            ..input_meta.as_ref().clone()
        })
    }
}

impl Default for OpDtypeView {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpDtypeView {
    fn name(&self) -> &'static str {
        "OpDtypeView"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        match self.configure() {
            Ok(meta) => {
                log_configured(self.name(), &meta);
                *self.meta.write() = Arc::new(meta);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(operator = self.name(), %err, "configure failed");
                *self.meta.write() = Arc::default();
                Err(err)
            }
        }
    }

    fn output_meta(&self, slot: &str, subindex: &[usize]) -> Arc<OutputMeta> {
        if slot == Self::OUTPUT && subindex.is_empty() {
            self.meta.read().clone()
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
        // The element sizes match, so the input writes its bytes directly into the result
        self.input
            .request(roi.clone())?
            .write_into(result.reborrow())
            .wait()
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        _subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        pass_through_dirty(self.name(), Self::INPUT, Self::OUTPUT_DTYPE, slot, region)
    }
}

/// Converts the elements of an array to another data type with `as` semantics.
///
/// Inputs:
///  - `Input`: the array.
///  - `ConversionDtype`: the data type to convert to.
///
/// Outputs:
///  - `Output`: the converted array.
///
/// The value range of the input passes through unchanged.
pub struct OpConvertDtype {
    /// The input array.
    pub input: InputSlot,
    /// The data type to convert to.
    pub conversion_dtype: ValueSlot<DataType>,
    state: RwLock<Arc<ConvertDtypeState>>,
}

#[derive(Default)]
struct ConvertDtypeState {
    meta: Arc<OutputMeta>,
    input_data_type: Option<DataType>,
}

impl OpConvertDtype {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the conversion data type slot.
    pub const CONVERSION_DTYPE: &'static str = "ConversionDtype";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new data type conversion with unconnected inputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            conversion_dtype: ValueSlot::new(Self::CONVERSION_DTYPE),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    fn state(&self) -> Arc<ConvertDtypeState> {
        self.state.read().clone()
    }
}

impl Default for OpConvertDtype {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpConvertDtype {
    fn name(&self) -> &'static str {
        "OpConvertDtype"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        let input_meta = self.input.meta();
        let state = match self.conversion_dtype.get() {
            Some(data_type) if input_meta.ready => ConvertDtypeState {
                meta: Arc::new(OutputMeta {
                    data_type,
                    ..input_meta.as_ref().clone()
                }),
                input_data_type: Some(input_meta.data_type),
            },
            _ => ConvertDtypeState::default(),
        };
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
        let request = self.input.request(roi.clone())?;
        if state.input_data_type == Some(state.meta.data_type) {
            request.write_into(result.reborrow()).wait()
        } else {
            let converted = request.wait_elements()?.cast(state.meta.data_type);
            result.copy_from_bytes(&converted.to_bytes())?;
            Ok(())
        }
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        _subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        pass_through_dirty(self.name(), Self::INPUT, Self::CONVERSION_DTYPE, slot, region)
    }
}
