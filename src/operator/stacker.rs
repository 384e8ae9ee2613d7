use std::{ops::Range, sync::Arc};

use parking_lot::RwLock;

use crate::{
    array::{ArrayShape, ArrayView, AxisTag, OutputMeta},
    roi::Roi,
    slot::{
        ArraySource, ArraySourceRef, DirtyNotification, DirtyRegion, InputSlot, RequestPool,
        SlotList, ValueSlot,
    },
};

use super::{log_configured, union_value_range, warn_unknown_slot, Operator, OperatorError, OperatorOutput};

/// Stacks a list of arrays along an axis.
///
/// Inputs:
///  - `Images`: the arrays to stack, in order.
///  - `AxisFlag`: the key of the axis to stack along.
///  - `AxisIndex` (optional): the position of the axis if no array has it. Defaults to appending the axis.
///
/// Outputs:
///  - `Output`: the stacked array.
///
/// An array with the axis contributes its extent along the axis (a native source).
/// An array without the axis contributes a single position and has the axis inserted (a synthesized source).
/// Arrays occupy consecutive intervals of the stacking axis in list order.
///
/// The output is not ready if the list is empty, any array is not ready, the data types differ, the shapes differ other than along the stacking axis, or `AxisIndex` is beyond the dimensionality of the arrays.
pub struct OpMultiArrayStacker {
    /// The arrays to stack.
    pub images: Arc<SlotList>,
    /// The key of the axis to stack along.
    pub axis_flag: ValueSlot<String>,
    /// The position of a synthesized stacking axis.
    pub axis_index: ValueSlot<usize>,
    state: RwLock<Arc<StackerState>>,
}

#[derive(Clone, Debug)]
struct Interval {
    start: u64,
    stop: u64,
    native: bool,
}

#[derive(Default)]
struct StackerState {
    meta: Arc<OutputMeta>,
    axis: usize,
    sources: Vec<Arc<InputSlot>>,
    intervals: Vec<Interval>,
}

impl OpMultiArrayStacker {
    /// The name of the images slot.
    pub const IMAGES: &'static str = "Images";
    /// The name of the axis flag slot.
    pub const AXIS_FLAG: &'static str = "AxisFlag";
    /// The name of the axis index slot.
    pub const AXIS_INDEX: &'static str = "AxisIndex";
    /// The name of the output slot.
    pub const OUTPUT: &'static str = "Output";

    /// Create a new stacker with an empty list of images.
    #[must_use]
    pub fn new() -> Self {
        Self {
            images: Arc::new(SlotList::new(Self::IMAGES)),
            axis_flag: ValueSlot::new(Self::AXIS_FLAG),
            axis_index: ValueSlot::new(Self::AXIS_INDEX),
            state: RwLock::default(),
        }
    }

    /// Return the output as an [`ArraySource`].
    #[must_use]
    pub fn output(self: &Arc<Self>) -> ArraySourceRef {
        OperatorOutput::new(self.clone(), Self::OUTPUT, vec![]).into_source()
    }

    /// Return the interval of the stacking axis occupied by each image after the last configure.
    #[must_use]
    pub fn source_ranges(&self) -> Vec<Range<u64>> {
        self.state
            .read()
            .intervals
            .iter()
            .map(|interval| interval.start..interval.stop)
            .collect()
    }

    fn state(&self) -> Arc<StackerState> {
        self.state.read().clone()
    }

    fn configure(&self) -> Option<StackerState> {
        let key = self.axis_flag.get()?;
        let sources = self.images.slots();
        let metas = sources
            .iter()
            .map(|source| source.meta())
            .collect::<Vec<_>>();
        let first = metas.first()?;
        if metas.iter().any(|meta| !meta.ready) {
            return None;
        }
        if metas.iter().any(|meta| meta.data_type != first.data_type) {
            tracing::debug!(operator = self.name(), "images have differing data types");
            return None;
        }

        // Axis tags come from the first image with the axis, otherwise the axis is inserted into the tags of the first image
        let (axis_tags, axis) =
            if let Some(meta) = metas.iter().find(|meta| meta.axis_tags.contains(&key)) {
                let axis = meta.axis_tags.index(&key)?;
                (meta.axis_tags.clone(), axis)
            } else {
                let axis = self.axis_index.get().unwrap_or(first.dimensionality());
                if axis > first.dimensionality() {
                    return None;
                }
                let mut axis_tags = first.axis_tags.clone();
                axis_tags.insert(axis, AxisTag::from_key(key.clone()));
                (axis_tags, axis)
            };
        let dimensionality = axis_tags.len();

        let mut intervals = Vec::with_capacity(metas.len());
        let mut offset = 0;
        let mut non_axis_shape: Option<ArrayShape> = None;
        for meta in &metas {
            let (native, shape) = match meta.axis_tags.index(&key) {
                Some(source_axis) if source_axis == axis && meta.dimensionality() == dimensionality => {
                    let mut shape = meta.shape.clone();
                    let extent = shape.remove(axis);
                    (Some(extent), shape)
                }
                None if meta.dimensionality() + 1 == dimensionality => (None, meta.shape.clone()),
                _ => {
                    tracing::debug!(operator = self.name(), axis_tags = %meta.axis_tags, "image has an incompatible stacking axis");
                    return None;
                }
            };
            match &non_axis_shape {
                Some(non_axis_shape) if *non_axis_shape != shape => {
                    tracing::debug!(operator = self.name(), shape = ?meta.shape, "images have differing shapes");
                    return None;
                }
                Some(_) => {}
                None => non_axis_shape = Some(shape),
            }
            let contribution = native.unwrap_or(1);
            intervals.push(Interval {
                start: offset,
                stop: offset + contribution,
                native: native.is_some(),
            });
            offset += contribution;
        }

        let mut shape = non_axis_shape?;
        shape.insert(axis, offset);
        let hint = |blockshape: Option<&ArrayShape>| {
            let mut blockshape = blockshape?.clone();
            if !intervals[0].native {
                blockshape.insert(axis, 1);
            }
            (blockshape.len() == dimensionality).then_some(blockshape)
        };
        let meta = OutputMeta::new(shape, first.data_type, axis_tags)
            .with_value_range(union_value_range(metas.iter().map(|meta| meta.value_range)))
            .with_ideal_blockshape(hint(first.ideal_blockshape.as_ref()))
            .with_max_blockshape(hint(first.max_blockshape.as_ref()));
        Some(StackerState {
            meta: Arc::new(meta),
            axis,
            sources,
            intervals,
        })
    }
}

impl Default for OpMultiArrayStacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for OpMultiArrayStacker {
    fn name(&self) -> &'static str {
        "OpMultiArrayStacker"
    }

    fn setup_outputs(&self) -> Result<(), OperatorError> {
        let state = self.configure().unwrap_or_default();
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
        let axis = state.axis;
        let range = roi.axis_range(axis);
        let result_roi = Roi::new_with_shape(roi.shape());

        let mut pool = RequestPool::new();
        for (source, interval) in std::iter::zip(&state.sources, &state.intervals) {
            let start = std::cmp::max(range.start, interval.start);
            let stop = std::cmp::min(range.end, interval.stop);
            if start >= stop {
                continue;
            }
            let source_roi = if interval.native {
                roi.with_axis_range(axis, start - interval.start..stop - interval.start)
            } else {
                roi.remove_axis(axis)
            };
            let view_roi = result_roi.with_axis_range(axis, start - range.start..stop - range.start);
            // SAFETY: the intervals are disjoint, so every view covers a distinct slab of the result
            let view = unsafe { result.subset_view(&view_roi) }?;
            pool.add(source.request(source_roi)?.write_into(view));
        }
        tracing::trace!(operator = self.name(), roi = %roi, num_requests = pool.len(), "stacking");
        pool.wait()?;
        Ok(())
    }

    fn propagate_dirty(
        &self,
        slot: &str,
        subindex: &[usize],
        region: &DirtyRegion,
    ) -> Vec<DirtyNotification> {
        let state = self.state();
        let full = || vec![DirtyNotification::full(Self::OUTPUT, vec![])];
        match (slot, subindex, region) {
            (Self::IMAGES, [index], DirtyRegion::Roi(roi)) => {
                let Some(interval) = state.intervals.get(*index) else {
                    return full();
                };
                let dimensionality = state.meta.dimensionality();
                let output_roi = if interval.native && roi.dimensionality() == dimensionality {
                    let range = roi.axis_range(state.axis);
                    roi.with_axis_range(
                        state.axis,
                        range.start + interval.start..range.end + interval.start,
                    )
                } else if !interval.native && roi.dimensionality() + 1 == dimensionality {
                    roi.insert_axis(state.axis, interval.start..interval.stop)
                } else {
                    return full();
                };
                vec![DirtyNotification::roi(Self::OUTPUT, vec![], output_roi)]
            }
            (Self::IMAGES | Self::AXIS_FLAG | Self::AXIS_INDEX, _, _) => full(),
            _ => {
                warn_unknown_slot(self.name(), slot);
                full()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        array::DataType,
        operator::test_util::ramp,
        slot::ArraySourceExt,
    };

    use super::*;

    fn stacker() -> Arc<OpMultiArrayStacker> {
        let stacker = Arc::new(OpMultiArrayStacker::new());
        stacker.images.push(ramp::<u16>(&[2, 2, 3], "zyx"));
        stacker.images.push(ramp::<u16>(&[2, 3], "yx"));
        stacker.images.push(ramp::<u16>(&[1, 2, 3], "zyx"));
        stacker.axis_flag.set("z".to_string());
        stacker.setup_outputs().unwrap();
        stacker
    }

    #[test]
    fn stacker_configure() {
        let stacker = stacker();
        let meta = stacker.output().meta();
        assert!(meta.ready);
        assert_eq!(meta.shape, vec![4, 2, 3]);
        assert_eq!(meta.data_type, DataType::UInt16);
        assert_eq!(meta.axis_tags.keys(), "zyx");
        assert_eq!(stacker.source_ranges(), vec![0..2, 2..3, 3..4]);
    }

    #[test]
    fn stacker_configure_synthesized_axis() {
        let stacker = OpMultiArrayStacker::new();
        stacker.images.push(ramp::<u8>(&[2, 3], "yx"));
        stacker.images.push(ramp::<u8>(&[2, 3], "yx"));
        stacker.axis_flag.set("c".to_string());
        stacker.setup_outputs().unwrap();
        let meta = stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]);
        assert_eq!(meta.shape, vec![2, 3, 2]);
        assert_eq!(meta.axis_tags.keys(), "yxc");

        stacker.axis_index.set(0);
        stacker.setup_outputs().unwrap();
        let meta = stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]);
        assert_eq!(meta.shape, vec![2, 2, 3]);
        assert_eq!(meta.axis_tags.keys(), "cyx");

        stacker.axis_index.set(3);
        stacker.setup_outputs().unwrap();
        assert!(!stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]).ready);
    }

    #[test]
    fn stacker_configure_not_ready() {
        let stacker = OpMultiArrayStacker::new();
        stacker.axis_flag.set("z".to_string());
        stacker.setup_outputs().unwrap();
        assert!(!stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]).ready);

        stacker.images.push(ramp::<u8>(&[2, 3], "yx"));
        stacker.images.push(ramp::<u16>(&[2, 3], "yx"));
        stacker.setup_outputs().unwrap();
        assert!(!stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]).ready);

        stacker.images.remove(1);
        stacker.images.push(ramp::<u8>(&[3, 3], "yx"));
        stacker.setup_outputs().unwrap();
        assert!(!stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]).ready);

        stacker.images.remove(1);
        stacker.setup_outputs().unwrap();
        assert!(stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]).ready);
    }

    #[test]
    fn stacker_value_range_and_hints() {
        let source0 = ramp::<u8>(&[2, 3], "yx");
        source0.set_meta(
            &OutputMeta::not_ready()
                .with_value_range(Some((0.0, 10.0)))
                .with_ideal_blockshape(Some(vec![1, 3])),
        );
        let source1 = ramp::<u8>(&[2, 3], "yx");
        source1.set_value_range(Some((-5.0, 5.0)));
        let stacker = OpMultiArrayStacker::new();
        stacker.images.push(source0);
        stacker.images.push(source1.clone());
        stacker.axis_flag.set("z".to_string());
        stacker.axis_index.set(0);
        stacker.setup_outputs().unwrap();
        let meta = stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]);
        assert_eq!(meta.value_range, Some((-5.0, 10.0)));
        assert_eq!(meta.ideal_blockshape, Some(vec![1, 1, 3]));

        source1.set_value_range(None);
        stacker.setup_outputs().unwrap();
        assert_eq!(stacker.output_meta(OpMultiArrayStacker::OUTPUT, &[]).value_range, None);
    }

    #[test]
    fn stacker_execute() {
        let stacker = stacker();
        let output = stacker.output();
        let elements = output
            .retrieve_typed::<u16>(&Roi::new_with_ranges(&[1..4, 1..2, 0..2]))
            .unwrap();
        assert_eq!(elements, vec![9, 10, 3, 4, 3, 4]);
        let elements = output
            .retrieve_typed::<u16>(&Roi::new_with_ranges(&[2..3, 0..2, 2..3]))
            .unwrap();
        assert_eq!(elements, vec![2, 5]);
    }

    #[test]
    fn stacker_dirty() {
        let stacker = stacker();
        assert_eq!(
            stacker.propagate_dirty(
                OpMultiArrayStacker::IMAGES,
                &[0],
                &Roi::new_with_ranges(&[1..2, 0..1, 0..3]).into()
            ),
            vec![DirtyNotification::roi(
                OpMultiArrayStacker::OUTPUT,
                vec![],
                Roi::new_with_ranges(&[1..2, 0..1, 0..3])
            )]
        );
        assert_eq!(
            stacker.propagate_dirty(
                OpMultiArrayStacker::IMAGES,
                &[1],
                &Roi::new_with_ranges(&[0..1, 1..3]).into()
            ),
            vec![DirtyNotification::roi(
                OpMultiArrayStacker::OUTPUT,
                vec![],
                Roi::new_with_ranges(&[2..3, 0..1, 1..3])
            )]
        );
        assert_eq!(
            stacker.propagate_dirty(
                OpMultiArrayStacker::IMAGES,
                &[2],
                &Roi::new_with_ranges(&[0..1, 0..2, 0..3]).into()
            ),
            vec![DirtyNotification::roi(
                OpMultiArrayStacker::OUTPUT,
                vec![],
                Roi::new_with_ranges(&[3..4, 0..2, 0..3])
            )]
        );
        let full = vec![DirtyNotification::full(OpMultiArrayStacker::OUTPUT, vec![])];
        assert_eq!(
            stacker.propagate_dirty(OpMultiArrayStacker::IMAGES, &[2], &DirtyRegion::Full),
            full
        );
        assert_eq!(
            stacker.propagate_dirty(OpMultiArrayStacker::AXIS_FLAG, &[], &DirtyRegion::Full),
            full
        );
    }
}
