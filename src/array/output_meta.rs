use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::{ArrayShape, AxisTags, DataType};

/// Metadata describing an operator output.
///
/// Output metadata is derived from the metadata of the inputs of an operator whenever it is configured.
///
/// An example `JSON` document:
/// ```json
/// {
///     "shape": [512, 512, 3],
///     "data_type": "uint8",
///     "axis_tags": [
///         {"key": "y", "kind": "space"},
///         {"key": "x", "kind": "space"},
///         {"key": "c", "kind": "channels"}
///     ],
///     "value_range": [0.0, 255.0],
///     "ideal_blockshape": [64, 64, 3],
///     "ready": true
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Display)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct OutputMeta {
    /// The shape of the output.
    pub shape: ArrayShape,
    /// The data type of the output.
    pub data_type: DataType,
    /// The axis tags of the output, one per dimension.
    pub axis_tags: AxisTags,
    /// The range of values the output may hold, as `(min, max)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<(f64, f64)>,
    /// The block shape that an output is most efficiently requested with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_blockshape: Option<ArrayShape>,
    /// The largest block shape that should be requested at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blockshape: Option<ArrayShape>,
    /// Whether the output can be queried.
    pub ready: bool,
}

impl Default for OutputMeta {
    /// Metadata of an output that is not ready.
    fn default() -> Self {
        Self::not_ready()
    }
}

impl OutputMeta {
    /// Create new ready output metadata without hints.
    #[must_use]
    pub fn new(shape: ArrayShape, data_type: DataType, axis_tags: AxisTags) -> Self {
        Self {
            shape,
            data_type,
            axis_tags,
            value_range: None,
            ideal_blockshape: None,
            max_blockshape: None,
            ready: true,
        }
    }

    /// Create metadata of an output that is not ready.
    #[must_use]
    pub fn not_ready() -> Self {
        Self {
            shape: vec![],
            data_type: DataType::UInt8,
            axis_tags: AxisTags::default(),
            value_range: None,
            ideal_blockshape: None,
            max_blockshape: None,
            ready: false,
        }
    }

    /// Set the value range.
    #[must_use]
    pub fn with_value_range(mut self, value_range: Option<(f64, f64)>) -> Self {
        self.value_range = value_range;
        self
    }

    /// Set the ideal block shape.
    #[must_use]
    pub fn with_ideal_blockshape(mut self, ideal_blockshape: Option<ArrayShape>) -> Self {
        self.ideal_blockshape = ideal_blockshape;
        self
    }

    /// Set the maximum block shape.
    #[must_use]
    pub fn with_max_blockshape(mut self, max_blockshape: Option<ArrayShape>) -> Self {
        self.max_blockshape = max_blockshape;
        self
    }

    /// Return the dimensionality of the output.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Return the number of elements of the output.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the number of channels of the output, if it has a channel axis.
    #[must_use]
    pub fn num_channels(&self) -> Option<u64> {
        self.axis_tags
            .channel_index()
            .and_then(|index| self.shape.get(index).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_meta_json() {
        let meta = OutputMeta::new(vec![512, 512, 3], DataType::UInt8, AxisTags::from_keys("yxc"))
            .with_value_range(Some((0.0, 255.0)))
            .with_ideal_blockshape(Some(vec![64, 64, 3]));
        let json = r#"{
            "shape": [512, 512, 3],
            "data_type": "uint8",
            "axis_tags": [
                {"key": "y", "kind": "space"},
                {"key": "x", "kind": "space"},
                {"key": "c", "kind": "channels"}
            ],
            "value_range": [0.0, 255.0],
            "ideal_blockshape": [64, 64, 3],
            "ready": true
        }"#;
        assert_eq!(serde_json::from_str::<OutputMeta>(json).unwrap(), meta);
        let round_trip: OutputMeta = serde_json::from_str(&meta.to_string()).unwrap();
        assert_eq!(round_trip, meta);
        assert_eq!(meta.num_channels(), Some(3));
        assert_eq!(meta.num_elements(), 512 * 512 * 3);
    }

    #[test]
    fn output_meta_not_ready() {
        let meta = OutputMeta::default();
        assert!(!meta.ready);
        assert_eq!(meta.dimensionality(), 0);
        assert_eq!(meta.num_channels(), None);
    }
}
