use amap_core::transform::scale_transform;
use amap_core::VoxelSize;
use amap_io::{load_sample, read_volume, write_volume, LoadOptions, SampleSource};
use anyhow::Result;
use ndarray::Array3;
use tempfile::tempdir;

#[test]
fn test_nifti_sample_is_rescaled_like_planes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nii.gz");
    let data = Array3::from_shape_fn((4, 6, 8), |(r, c, z)| (r + c + z) as f32);
    let size = VoxelSize::uniform(5.0);
    write_volume(&path, &data, &size, &scale_transform(&size))?;

    let source = SampleSource::discover(&path, false)?;
    assert_eq!(source, SampleSource::Nifti(path.clone()));
    assert_eq!(source.plane_count(), None);

    let volume = load_sample(&source, [0.5, 0.5, 0.5], LoadOptions::default())?;
    assert_eq!(volume.shape(), &[2, 3, 4]);
    // Corners map onto corners under linear zoom.
    assert_eq!(volume[[0, 0, 0]], 0.0);
    assert_eq!(volume[[1, 2, 3]], 3.0 + 5.0 + 7.0);
    Ok(())
}

#[test]
fn test_u16_volume_round_trip_through_gzip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("downsampled.nii.gz");
    let data = Array3::from_shape_fn((3, 3, 3), |(x, y, z)| (x * 9 + y * 3 + z) as u16 * 1000);
    let size = VoxelSize::new(10.0, 10.0, 25.0);
    write_volume(&path, &data, &size, &scale_transform(&size))?;
    let back: Array3<u16> = read_volume(&path)?;
    assert_eq!(back, data);
    Ok(())
}
