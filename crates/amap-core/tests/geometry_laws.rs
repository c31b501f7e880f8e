use amap_core::boundaries::inner_boundaries;
use amap_core::filter::zoom::{resample_nearest, zoom};
use amap_core::volume::flip;
use amap_core::{AtlasVolumeSet, AxisFlips, Orientation, VoxelSize};
use ndarray::Array3;
use proptest::prelude::*;

fn atlas(shape: (usize, usize, usize)) -> AtlasVolumeSet {
    let annotation = Array3::from_shape_fn(shape, |(x, y, z)| (x * 100 + y * 10 + z) as u32);
    let brain = annotation.mapv(|v| v as f32 * 0.5);
    let hemispheres = Array3::from_shape_fn(shape, |(x, _, _)| if x % 2 == 0 { 1 } else { 2 });
    AtlasVolumeSet::new(annotation, brain, hemispheres, VoxelSize::new(10.0, 20.0, 30.0)).unwrap()
}

fn orientation() -> impl Strategy<Value = Orientation> {
    prop_oneof![
        Just(Orientation::Horizontal),
        Just(Orientation::Coronal),
        Just(Orientation::Sagittal),
    ]
}

proptest! {
    #[test]
    fn test_reorientation_round_trip(
        nx in 1usize..5, ny in 1usize..5, nz in 1usize..5,
        orientation in orientation(),
    ) {
        let original = atlas((nx, ny, nz));
        let restored = original
            .clone()
            .reoriented_to_sample(orientation)
            .restored_from_sample(orientation);
        prop_assert_eq!(restored, original);
    }

    #[test]
    fn test_reorientation_preserves_voxel_count(
        nx in 1usize..5, ny in 1usize..5, nz in 1usize..5,
        orientation in orientation(),
    ) {
        let reoriented = atlas((nx, ny, nz)).reoriented_to_sample(orientation);
        let shape = reoriented.shape();
        prop_assert_eq!(shape.iter().product::<usize>(), nx * ny * nz);
        prop_assert_eq!(reoriented.brain().shape(), reoriented.annotation().shape());
        prop_assert_eq!(reoriented.hemispheres().shape(), reoriented.annotation().shape());
    }

    #[test]
    fn test_double_flip_is_identity(
        nx in 1usize..6, ny in 1usize..6, nz in 1usize..6,
        fx in any::<bool>(), fy in any::<bool>(), fz in any::<bool>(),
    ) {
        let data = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| (x + 7 * y + 31 * z) as u32);
        let flips = AxisFlips::new(fx, fy, fz);
        prop_assert_eq!(flip(flip(data.clone(), flips), flips), data);
    }

    #[test]
    fn test_zoom_shape_follows_factors(
        nx in 2usize..12, ny in 2usize..12, nz in 1usize..4,
        fx in 0.2f64..2.0, fy in 0.2f64..2.0,
    ) {
        let data = Array3::<f32>::ones((nx, ny, nz));
        let out = zoom(&data, [fx, fy, 1.0]);
        let expected_x = ((nx as f64 * fx).round() as usize).max(1);
        let expected_y = ((ny as f64 * fy).round() as usize).max(1);
        prop_assert_eq!(out.shape(), &[expected_x, expected_y, nz]);
        // Linear interpolation never leaves the input range.
        prop_assert!(out.iter().all(|v| (*v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_nearest_resampling_only_uses_existing_labels(
        nx in 1usize..5, ny in 1usize..5, nz in 1usize..5,
        ox in 1usize..8, oy in 1usize..8, oz in 1usize..8,
    ) {
        let labels = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| (x * 25 + y * 5 + z) as u32 + 1);
        let out = resample_nearest(&labels, [ox, oy, oz]);
        prop_assert!(out.iter().all(|l| labels.iter().any(|v| v == l)));
    }
}

#[test]
fn test_uniform_labels_have_no_boundaries() {
    let labels = Array3::<u32>::from_elem((4, 4, 4), 9);
    assert!(inner_boundaries(&labels).iter().all(|b| !*b));
}
