use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    array::{ArrayView, OutputMeta},
    roi::Roi,
    slot::{ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, ValueSlot},
};

use super::{
    all_dirty, blockshape_with_axis_extent, log_configured, warn_unknown_slot, Operator,
    OperatorError, OperatorOutput,
};

/// Slices an array along an axis into a list of arrays that keep the sliced axis with extent 1.
///
/// Inputs:
///  - `Input`: the array.
///  - `AxisFlag`: the key of the axis to slice along.
///  - `SliceIndexes` (optional): the indices of the axis to slice at. Defaults to every index of the axis.
///
/// Outputs:
///  - `Slices`: one sub-output per slice index.
///
/// Sub-output `i` has the shape of `Input` except for extent 1 along the sliced axis.
/// Block shape hints get extent 1 along the sliced axis, the value range passes through.
///
/// The sub-outputs are not ready if the axis is not present or a slice index is beyond the extent of the axis.
pub struct OpMultiArraySlicer {
    /// The input array.
    pub input: InputSlot,
    /// The key of the axis to slice along.
    pub axis_flag: ValueSlot<String>,
    /// The indices to slice at.
    pub slice_indexes: ValueSlot<Vec<u64>>,
    state: RwLock<Arc<SlicerState>>,
}

#[derive(Default)]
struct SlicerState {
    meta: Arc<OutputMeta>,
    axis: usize,
    indices: Vec<u64>,
    /// Slice index to the sub-outputs sliced at that index.
    lookup: BTreeMap<u64, Vec<usize>>,
}

impl OpMultiArraySlicer {
    /// The name of the input slot.
    pub const INPUT: &'static str = "Input";
    /// The name of the axis flag slot.
    pub const AXIS_FLAG: &'static str = "AxisFlag";
    /// The name of the slice indexes slot.
    pub const SLICE_INDEXES: &'static str = "SliceIndexes";
    /// The name of the output slot.
    pub const SLICES: &'static str = "Slices";

    /// Create a new slicer with unconnected inputs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: InputSlot::new(Self::INPUT),
            axis_flag: ValueSlot::new(Self::AXIS_FLAG),
            slice_indexes: ValueSlot::new(Self::SLICE_INDEXES),
            state: RwLock::default(),
        }
    }

    /// Return the number of slices after the last configure.
    #[must_use]
    pub fn num_slices(&self) -> usize {
        self.state.read().indices.len()
    }

    /// Return the slice at `index` as an [`ArraySource`](crate::slot::ArraySource).
    #[must_use]
    pub fn slice(self: &Arc<Self>, index: usize) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::SLICES, vec![index]).into_source()
    }

    /// Return every slice after the last configure.
    #[must_use]
    pub fn slices(self: &Arc<Self>) -> Vec<ArraySourceRef> {
        (0..self.num_slices()).map(|index| self.slice(index)).collect()
    }

    fn state(&self) -> Arc<SlicerState> {
        self.state.read().clone()
    }

    fn configure(&self) -> SlicerState {
        let input_meta = self.input.meta();
        let Some(key) = self.axis_flag.get() else {
            return SlicerState::default();
        };
        let Some((axis, extent)) = input_meta
            .axis_tags
            .index(&key)
            .filter(|_| input_meta.ready)
            .and_then(|axis| Some((axis, *input_meta.shape.get(axis)?)))
        else {
            return SlicerState::default();
        };
        let indices = self
            .slice_indexes
            .get()
            .unwrap_or_else(|| (0..extent).collect());
        if indices.iter().any(|&index| index >= extent) {
            return SlicerState::default();
        }

        let mut meta = input_meta.as_ref().clone();
        let dimensionality = meta.dimensionality();
        meta.shape[axis] = 1;
        meta.ideal_blockshape =
            blockshape_with_axis_extent(meta.ideal_blockshape.as_ref(), dimensionality, axis, 1);
        meta.max_blockshape =
            blockshape_with_axis_extent(meta.max_blockshape.as_ref(), dimensionality, axis, 1);

        let mut lookup = BTreeMap::<u64, Vec<usize>>::new();
        for (slice, &index) in indices.iter().enumerate() {
            lookup.entry(index).or_default().push(slice);
        }
        SlicerState {
            meta: Arc::new(meta),
            axis,
            indices,
            lookup,
        }
    }

    fn all_slices_dirty(state: &SlicerState) -> Vec<DirtyNotification> {
        all_dirty((0..state.indices.len()).map(|slice| (Self::SLICES, vec![slice])))
    }
}

impl Default for OpMultiArraySlicer {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpMultiArraySlicer {
    fn name(&self) -> &'static str {
        "OpMultiArraySlicer"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        let state = self.configure();
        log_configured(self.name(), &state.meta);
        *self.state.write() = Arc::new(state);
        Ok(())
    }

    fn output_meta(&self, slot: &str, subindex: &[usize]) -> Arc<OutputMeta> {
        let state = self.state();
        match subindex {
            [slice] if slot == Self::SLICES && *slice < state.indices.len() => state.meta.clone(),
            _ => Arc::new(OutputMeta::not_ready()),
        }
    }

    fn execute(
        &self,
        slot: &str,
        subindex: &[usize],
        roi: &Roi,
        result: &mut ArrayView,
    ) -> Result<(), OperatorError> {
        let state = self.state();
        let index = match subindex {
            [slice] if slot == Self::SLICES => state.indices.get(*slice).copied(),
            _ => None,
        }
        .ok_or_else(|| OperatorError::UnknownOutput {
            operator: self.name(),
            slot: slot.to_string(),
            subindex: subindex.to_vec(),
        })?;

        let range = roi.axis_range(state.axis);
        let input_roi = roi.with_axis_range(state.axis, range.start + index..range.end + index);
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
            (Self::AXIS_FLAG | Self::SLICE_INDEXES, _) | (Self::INPUT, DirtyRegion::Full) => {
                Self::all_slices_dirty(&state)
            }
            (Self::INPUT, DirtyRegion::Roi(roi)) => {
                if roi.dimensionality() != state.meta.dimensionality() {
                    return Self::all_slices_dirty(&state);
                }
                let slice_roi = roi.with_axis_range(state.axis, 0..1);
                state
                    .lookup
                    .range(roi.axis_range(state.axis))
                    .flat_map(|(_, slices)| slices)
                    .map(|&slice| DirtyNotification::roi(Self::SLICES, vec![slice], slice_roi.clone()))
                    .collect()
            }
            _ => {
                warn_unknown_slot(self.name(), slot);
                Self::all_slices_dirty(&state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        array::DataType,
        operator::test_util::ramp,
        slot::{ArraySource, ArraySourceExt},
    };

    use super::*;

    fn slicer() -> Arc<OpMultiArraySlicer> {
        let slicer = Arc::new(OpMultiArraySlicer::new());
        slicer.input.connect(ramp::<u8>(&[3, 2, 4], "zyx"));
        slicer.axis_flag.set("z".to_string());
        slicer.setup_outputs().unwrap();
        slicer
    }

    #[test]
    fn slicer_configure() {
        let slicer = slicer();
        assert_eq!(slicer.num_slices(), 3);
        let meta = slicer.slice(1).meta();
        assert!(meta.ready);
        assert_eq!(meta.shape, vec![1, 2, 4]);
        assert_eq!(meta.data_type, DataType::UInt8);
        assert_eq!(meta.axis_tags.keys(), "zyx");
        assert!(!slicer.output_meta(OpMultiArraySlicer::SLICES, &[3]).ready);
        assert!(!slicer.output_meta("Output", &[0]).ready);
    }

    #[test]
    fn slicer_configure_not_ready() {
        let slicer = slicer();
        slicer.axis_flag.set("t".to_string());
        slicer.setup_outputs().unwrap();
        assert!(!slicer.output_meta(OpMultiArraySlicer::SLICES, &[0]).ready);

        slicer.axis_flag.set("z".to_string());
        slicer.slice_indexes.set(vec![0, 3]);
        slicer.setup_outputs().unwrap();
        assert!(!slicer.output_meta(OpMultiArraySlicer::SLICES, &[0]).ready);

        let unconnected = OpMultiArraySlicer::new();
        unconnected.axis_flag.set("z".to_string());
        unconnected.setup_outputs().unwrap();
        assert_eq!(unconnected.num_slices(), 0);
    }

    #[test]
    fn slicer_blockshape_hints() {
        let source = ramp::<u8>(&[3, 2, 4], "zyx");
        source.set_meta(
            &OutputMeta::not_ready()
                .with_ideal_blockshape(Some(vec![3, 2, 2]))
                .with_max_blockshape(Some(vec![2, 2])),
        );
        let slicer = OpMultiArraySlicer::new();
        slicer.input.connect(source);
        slicer.axis_flag.set("z".to_string());
        slicer.setup_outputs().unwrap();
        let meta = slicer.output_meta(OpMultiArraySlicer::SLICES, &[0]);
        assert_eq!(meta.ideal_blockshape, Some(vec![1, 2, 2]));
        assert_eq!(meta.max_blockshape, None);
    }

    #[test]
    fn slicer_execute() {
        let slicer = slicer();
        slicer.slice_indexes.set(vec![2, 0]);
        slicer.setup_outputs().unwrap();
        let slice = slicer.slice(0);
        let elements = slice
            .retrieve_typed::<u8>(&Roi::new_with_ranges(&[0..1, 1..2, 1..3]))
            .unwrap();
        assert_eq!(elements, vec![21, 22]);
        let elements = slicer
            .slice(1)
            .retrieve_typed::<u8>(&Roi::new_with_shape(vec![1, 2, 4]))
            .unwrap();
        assert_eq!(elements, (0..8).collect::<Vec<u8>>());
        assert!(matches!(
            slice.retrieve(&Roi::new_with_ranges(&[0..2, 0..2, 0..4])),
            Err(OperatorError::RoiOutOfBounds(..))
        ));
    }

    #[test]
    fn slicer_dirty() {
        let slicer = slicer();
        slicer.slice_indexes.set(vec![0, 2, 2]);
        slicer.setup_outputs().unwrap();
        let dirty = slicer.propagate_dirty(
            OpMultiArraySlicer::INPUT,
            &[],
            &Roi::new_with_ranges(&[1..3, 0..1, 2..4]).into(),
        );
        let expected_roi = Roi::new_with_ranges(&[0..1, 0..1, 2..4]);
        assert_eq!(
            dirty,
            vec![
                DirtyNotification::roi(OpMultiArraySlicer::SLICES, vec![1], expected_roi.clone()),
                DirtyNotification::roi(OpMultiArraySlicer::SLICES, vec![2], expected_roi),
            ]
        );
        let dirty = slicer.propagate_dirty(
            OpMultiArraySlicer::AXIS_FLAG,
            &[],
            &DirtyRegion::Full,
        );
        assert_eq!(dirty.len(), 3);
        assert!(dirty.iter().all(|notification| notification.region == DirtyRegion::Full));
        assert!(slicer
            .propagate_dirty(
                OpMultiArraySlicer::INPUT,
                &[],
                &Roi::new_with_ranges(&[1..2, 0..1, 0..1]).into()
            )
            .is_empty());
    }
}
