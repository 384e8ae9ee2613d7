use std::sync::Arc;

use roiflow::{
    array::{ArrayView, AxisTags, DataType},
    operator::{
        OpMultiArraySlicer, OpMultiArrayStacker, OpMultiChannelSelector,
        OpMultiInputConcatenator, OpPixelOperator, OpSubRegion, Operator, PixelMap,
    },
    roi::Roi,
    slot::{ArraySource, ArraySourceExt, ArraySourceRef, MemorySource, SlotList},
};

fn ramp_u8(shape: &[u64], keys: &str) -> Arc<MemorySource> {
    let num_elements = shape.iter().product::<u64>();
    let elements = (0..num_elements).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    Arc::new(MemorySource::from_elements(shape.to_vec(), AxisTags::from_keys(keys), elements).unwrap())
}

fn filled_u8(shape: &[u64], keys: &str, value: u8) -> ArraySourceRef {
    let num_elements = shape.iter().product::<u64>() as usize;
    Arc::new(MemorySource::from_elements(shape.to_vec(), AxisTags::from_keys(keys), vec![value; num_elements]).unwrap())
}

#[rustfmt::skip]
#[test]
fn stacker_occupancy_matches_offsets() -> Result<(), Box<dyn std::error::Error>> {
    let stacker = Arc::new(OpMultiArrayStacker::new());
    stacker.images.push(filled_u8(&[3, 2, 2], "zyx", 1));
    stacker.images.push(filled_u8(&[2, 2], "yx", 2));
    stacker.images.push(filled_u8(&[1, 2, 2], "zyx", 3));
    stacker.images.push(filled_u8(&[2, 2, 2], "zyx", 4));
    stacker.axis_flag.set("z".to_string());
    stacker.setup_outputs()?;

    let ranges = stacker.source_ranges();
    assert_eq!(ranges, vec![0..3, 3..4, 4..5, 5..7]);
    let output = stacker.output();
    assert_eq!(output.meta().shape, vec![7, 2, 2]);
    for z in 0..7 {
        let source = ranges.iter().position(|range| range.contains(&z)).unwrap();
        let slab = output.retrieve_typed::<u8>(&Roi::new_with_ranges(&[z..z + 1, 0..2, 0..2]))?;
        assert_eq!(slab, vec![source as u8 + 1; 4]);
    }

    // A request spanning every source
    let column = output.retrieve_typed::<u8>(&Roi::new_with_ranges(&[0..7, 1..2, 1..2]))?;
    assert_eq!(column, vec![1, 1, 1, 2, 3, 4, 4]);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn slice_then_stack_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let volume = ramp_u8(&[4, 3, 5], "zyx");
    let slicer = Arc::new(OpMultiArraySlicer::new());
    slicer.input.connect(volume.clone());
    slicer.axis_flag.set("z".to_string());
    slicer.setup_outputs()?;
    assert_eq!(slicer.num_slices(), 4);

    let stacker = Arc::new(OpMultiArrayStacker::new());
    for slice in slicer.slices() {
        stacker.images.push(slice);
    }
    stacker.axis_flag.set("z".to_string());
    stacker.setup_outputs()?;

    let output = stacker.output();
    assert_eq!(output.meta().shape, volume.meta().shape);
    assert_eq!(output.meta().axis_tags, volume.meta().axis_tags);
    for roi in [
        Roi::new_with_shape(vec![4, 3, 5]),
        Roi::new_with_ranges(&[1..3, 0..2, 2..5]),
        Roi::new_with_ranges(&[3..4, 2..3, 0..1]),
    ] {
        assert_eq!(output.retrieve(&roi)?, volume.retrieve(&roi)?);
    }

    // Into a view of a larger buffer
    let mut bytes = vec![0u8; 2 * 3 * 6];
    let mut view = ArrayView::new(&mut bytes, vec![2, 3, 6], 1, Roi::new_with_ranges(&[0..2, 0..3, 1..6]))?;
    output.retrieve_into(&Roi::new_with_ranges(&[2..4, 0..3, 0..5]), &mut view)?;
    let expected = volume.retrieve_typed::<u8>(&Roi::new_with_ranges(&[2..4, 0..3, 0..5]))?;
    let written = bytes.chunks_exact(6).flat_map(|row| row[1..].to_vec()).collect::<Vec<_>>();
    assert_eq!(written, expected);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn stack_operator_outputs_on_new_axis() -> Result<(), Box<dyn std::error::Error>> {
    // 0  1  2  3
    // 4  5  6  7
    // 8  9 10 11
    let image = ramp_u8(&[3, 4], "yx");
    let crop = |start: Vec<u64>, stop: Vec<u64>| -> Result<Arc<OpSubRegion>, Box<dyn std::error::Error>> {
        let sub_region = Arc::new(OpSubRegion::new());
        sub_region.input.connect(image.clone());
        sub_region.roi.set((start, stop));
        sub_region.setup_outputs()?;
        Ok(sub_region)
    };
    let top_left = crop(vec![0, 0], vec![2, 2])?;
    let bottom_right = crop(vec![1, 2], vec![3, 4])?;

    let stacker = Arc::new(OpMultiArrayStacker::new());
    stacker.images.push(top_left.output());
    stacker.images.push(bottom_right.output());
    stacker.axis_flag.set("c".to_string());
    stacker.setup_outputs()?;
    assert_eq!(stacker.source_ranges(), vec![0..1, 1..2]);

    // Each source is written into a strided view of the stacked output
    let output = stacker.output();
    assert_eq!(output.meta().shape, vec![2, 2, 2]);
    assert_eq!(output.retrieve_typed::<u8>(&Roi::new_with_shape(vec![2, 2, 2]))?, vec![0, 6, 1, 7, 4, 10, 5, 11]);
    assert_eq!(output.retrieve_typed::<u8>(&Roi::new_with_ranges(&[1..2, 0..2, 1..2]))?, vec![10, 11]);
    assert_eq!(output.retrieve_typed::<u8>(&Roi::new_with_ranges(&[0..2, 1..2, 0..2]))?, vec![1, 7, 5, 11]);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn configure_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let volume = ramp_u8(&[3, 4, 2], "yxc");
    let sub_region = Arc::new(OpSubRegion::new());
    sub_region.input.connect(volume);
    sub_region.roi.set((vec![1, 1, 0], vec![3, 4, 2]));
    let selector = Arc::new(OpMultiChannelSelector::new());
    selector.input.connect(sub_region.output());
    selector.selected_channels.set(vec![1, 0]);

    sub_region.setup_outputs()?;
    selector.setup_outputs()?;
    let meta = selector.output().meta();
    let roi = Roi::new_with_shape(meta.shape.clone());
    let elements = selector.output().retrieve(&roi)?;

    sub_region.setup_outputs()?;
    selector.setup_outputs()?;
    selector.setup_outputs()?;
    assert_eq!(selector.output().meta(), meta);
    assert_eq!(selector.output().retrieve(&roi)?, elements);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn sub_region_zero_extent_not_ready() -> Result<(), Box<dyn std::error::Error>> {
    let sub_region = Arc::new(OpSubRegion::new());
    sub_region.input.connect(ramp_u8(&[4, 4], "yx"));
    sub_region.roi.set((vec![2, 0], vec![2, 4]));
    sub_region.setup_outputs()?;
    let output = sub_region.output();
    assert!(!output.meta().ready);
    assert!(output.retrieve(&Roi::new_with_shape(vec![0, 4])).is_err());

    sub_region.roi.set((vec![2, 0], vec![3, 4]));
    sub_region.setup_outputs()?;
    assert!(output.meta().ready);
    assert_eq!(output.retrieve_typed::<u8>(&Roi::new_with_shape(vec![1, 4]))?, vec![8, 9, 10, 11]);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn channel_selector_remaps_channels() -> Result<(), Box<dyn std::error::Error>> {
    // Channel c of pixel x has value 10 * x + c
    let elements = (0..3u8).flat_map(|x| (0..4).map(move |c| 10 * x + c)).collect::<Vec<_>>();
    let source = MemorySource::from_elements(vec![3, 4], AxisTags::from_keys("xc"), elements)?;
    let selector = Arc::new(OpMultiChannelSelector::new());
    selector.input.connect(Arc::new(source));
    selector.selected_channels.set(vec![2, 0, 0]);
    selector.setup_outputs()?;

    let output = selector.output();
    assert_eq!(output.meta().shape, vec![3, 3]);
    assert_eq!(output.retrieve_typed::<u8>(&Roi::new_with_shape(vec![3, 3]))?, vec![2, 0, 0, 12, 10, 10, 22, 20, 20]);
    assert_eq!(output.retrieve_typed::<u8>(&Roi::new_with_ranges(&[1..3, 1..3]))?, vec![10, 10, 20, 20]);
    assert_eq!(output.retrieve_typed::<u8>(&Roi::new_with_ranges(&[0..3, 0..1]))?, vec![2, 12, 22]);
    Ok(())
}

#[rustfmt::skip]
#[test]
fn pixel_operator_doubles_value_range() -> Result<(), Box<dyn std::error::Error>> {
    let source = MemorySource::from_elements(vec![4], AxisTags::from_keys("x"), vec![0.0f32, 25.0, 50.0, 100.0])?;
    source.set_value_range(Some((0.0, 100.0)));
    let operator = Arc::new(OpPixelOperator::new());
    operator.input.connect(Arc::new(source));
    operator.function.set(Arc::new(PixelMap::new(|x: f32| x * 2.0)));
    operator.setup_outputs()?;

    let output = operator.output();
    assert_eq!(output.meta().data_type, DataType::Float32);
    assert_eq!(output.meta().value_range, Some((0.0, 200.0)));
    assert_eq!(output.retrieve_typed::<f32>(&Roi::new_with_ranges(&[1..4]))?, vec![50.0, 100.0, 200.0]);
    Ok(())
}

fn values(list: &SlotList) -> Vec<u8> {
    list.slots().iter().map(|slot| slot.retrieve_typed::<u8>(&Roi::new_with_shape(vec![1])).unwrap()[0]).collect()
}

#[rustfmt::skip]
#[test]
fn concatenator_tracks_insert_remove() -> Result<(), Box<dyn std::error::Error>> {
    let concatenator = OpMultiInputConcatenator::new();
    let lists = (0..3).map(|_| Arc::new(SlotList::new("Images"))).collect::<Vec<_>>();
    for (i, list) in lists.iter().enumerate() {
        list.push(filled_u8(&[1], "x", 10 * i as u8));
        concatenator.push_input(list.clone());
    }
    concatenator.setup_outputs()?;
    let output = concatenator.output();

    assert_eq!(values(&output), vec![0, 10, 20]);

    lists[1].push(filled_u8(&[1], "x", 11));
    lists[0].insert(0, filled_u8(&[1], "x", 1));
    lists[2].push(filled_u8(&[1], "x", 21));
    assert_eq!(values(&output), vec![1, 0, 10, 11, 20, 21]);

    lists[1].remove(0);
    assert_eq!(values(&output), vec![1, 0, 11, 20, 21]);
    lists[0].remove(1);
    lists[2].remove(1);
    assert_eq!(values(&output), vec![1, 11, 20]);

    // The output stays usable as the input of another operator
    let stacker = Arc::new(OpMultiArrayStacker::new());
    for slot in output.slots() {
        stacker.images.push(slot);
    }
    stacker.axis_flag.set("z".to_string());
    stacker.setup_outputs()?;
    assert_eq!(stacker.output().retrieve_typed::<u8>(&Roi::new_with_shape(vec![1, 3]))?, vec![1, 11, 20]);
    Ok(())
}
