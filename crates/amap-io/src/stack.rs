//! Sample discovery and loading.
//!
//! A sample is a stack of 2D planes (a directory of images or a text file
//! listing them), a single multi-page TIFF or a single NIfTI volume. Loaded samples use the raw
//! `[row, column, plane]` layout; callers reorder axes as they need.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use amap_core::filter::zoom::zoom;
use anyhow::{Context, Result};
use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

const PLANE_EXTENSIONS: [&str; 3] = ["tif", "tiff", "png"];

/// Where the sample voxels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSource {
    /// Ordered 2D plane files, first plane first.
    Planes(Vec<PathBuf>),
    /// A single TIFF file, one plane per page.
    TiffStack(PathBuf),
    /// A single 3D NIfTI volume.
    Nifti(PathBuf),
}

impl SampleSource {
    /// Resolve a user-supplied sample path.
    ///
    /// Directories are scanned for plane images and always ordered
    /// naturally. Text files list one plane path per line, relative paths
    /// being resolved against the list's directory; they are only reordered
    /// when `sort` is set.
    pub fn discover(path: impl AsRef<Path>, sort: bool) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Sample path {} does not exist", path.display());
        }

        if path.is_dir() {
            let mut planes: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_plane_file(p))
                .collect();
            if planes.is_empty() {
                anyhow::bail!("No plane images found in {}", path.display());
            }
            planes.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
            return Ok(SampleSource::Planes(planes));
        }

        let name = path.to_string_lossy().to_lowercase();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            return Ok(SampleSource::Nifti(path.to_path_buf()));
        }
        if name.ends_with(".txt") {
            let mut planes = read_path_list(path)?;
            if sort {
                planes.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
            }
            return Ok(SampleSource::Planes(planes));
        }
        if name.ends_with(".tif") || name.ends_with(".tiff") {
            return Ok(SampleSource::TiffStack(path.to_path_buf()));
        }
        if is_plane_file(path) {
            return Ok(SampleSource::Planes(vec![path.to_path_buf()]));
        }
        anyhow::bail!("Unsupported sample input {}", path.display())
    }

    /// Number of planes, if known without reading voxel data.
    pub fn plane_count(&self) -> Option<usize> {
        match self {
            SampleSource::Planes(paths) => Some(paths.len()),
            SampleSource::TiffStack(_) | SampleSource::Nifti(_) => None,
        }
    }
}

fn is_plane_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PLANE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_path_list(list: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(list)
        .with_context(|| format!("Failed to read path list {}", list.display()))?;
    let base = list.parent().unwrap_or_else(|| Path::new(""));
    let planes: Vec<PathBuf> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let p = PathBuf::from(line);
            if p.is_relative() {
                base.join(p)
            } else {
                p
            }
        })
        .collect();
    if planes.is_empty() {
        anyhow::bail!("Path list {} is empty", list.display());
    }
    Ok(planes)
}

/// Order strings so that embedded numbers compare by value (`z2 < z10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_digits(&mut a);
                let nb = take_digits(&mut b);
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta
                    .len()
                    .cmp(&tb.len())
                    .then_with(|| ta.cmp(tb))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                if ca != cb {
                    return ca.cmp(&cb);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

/// Worker threads left after reserving `n_free_cpus` cores, at least one.
pub fn available_workers(n_free_cpus: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(n_free_cpus).max(1)
}

/// How planes are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub parallel: bool,
    pub n_free_cpus: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            n_free_cpus: 2,
        }
    }
}

/// Load a sample and resample it by `factors` (`[row, column, plane]`).
///
/// Planes are rescaled in-plane as they are read, then the stack is
/// rescaled along the plane axis. All planes must share one shape.
pub fn load_sample(source: &SampleSource, factors: [f64; 3], options: LoadOptions) -> Result<Array3<f32>> {
    match source {
        SampleSource::Nifti(path) => {
            let volume: Array3<f32> = crate::nifti_io::read_volume(path)?;
            Ok(zoom(&volume, factors))
        }
        SampleSource::TiffStack(path) => {
            let pages = read_tiff_pages(path)?;
            tracing::debug!(pages = pages.len(), "Read multi-page TIFF");
            let planes: Vec<Array2<f32>> = pages
                .into_iter()
                .map(|page| zoom_plane(page, factors))
                .collect();
            let names = vec![path.clone(); planes.len()];
            let stack = stack_planes(&planes, &names)?;
            Ok(zoom(&stack, [1.0, 1.0, factors[2]]))
        }
        SampleSource::Planes(paths) => {
            let planes = if options.parallel && paths.len() > 1 {
                let workers = available_workers(options.n_free_cpus);
                tracing::debug!(workers, planes = paths.len(), "Loading planes in parallel");
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .context("Failed to build plane loading pool")?;
                pool.install(|| {
                    paths
                        .par_iter()
                        .map(|p| load_plane(p, factors))
                        .collect::<Result<Vec<_>>>()
                })?
            } else {
                paths
                    .iter()
                    .map(|p| load_plane(p, factors))
                    .collect::<Result<Vec<_>>>()?
            };
            let stack = stack_planes(&planes, paths)?;
            Ok(zoom(&stack, [1.0, 1.0, factors[2]]))
        }
    }
}

fn load_plane(path: &Path, factors: [f64; 3]) -> Result<Array2<f32>> {
    let image = image::open(path)
        .with_context(|| format!("Failed to read plane {}", path.display()))?
        .into_luma16();
    let (width, height) = image.dimensions();
    let pixels: Vec<f32> = image.into_raw().into_iter().map(f32::from).collect();
    let plane = Array2::from_shape_vec((height as usize, width as usize), pixels)
        .with_context(|| format!("Plane {} has an inconsistent buffer", path.display()))?;
    Ok(zoom_plane(plane, factors))
}

fn zoom_plane(plane: Array2<f32>, factors: [f64; 3]) -> Array2<f32> {
    let plane = plane.insert_axis(Axis(2));
    zoom(&plane, [factors[0], factors[1], 1.0]).index_axis_move(Axis(2), 0)
}

/// Decode every page of a greyscale TIFF as a `[row, column]` plane.
fn read_tiff_pages(path: &Path) -> Result<Vec<Array2<f32>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to read TIFF header of {}", path.display()))?;

    let mut pages = Vec::new();
    loop {
        let page = pages.len();
        let (width, height) = decoder.dimensions()?;
        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => anyhow::bail!(
                "Page {page} of {} is {other:?}, only greyscale stacks are supported",
                path.display()
            ),
        }
        let pixels: Vec<f32> = match decoder
            .read_image()
            .with_context(|| format!("Failed to decode page {page} of {}", path.display()))?
        {
            DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::F32(v) => v,
            DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
            _ => anyhow::bail!("Page {page} of {} has an unsupported sample type", path.display()),
        };
        let plane = Array2::from_shape_vec((height as usize, width as usize), pixels)
            .with_context(|| format!("Page {page} of {} has an inconsistent buffer", path.display()))?;
        pages.push(plane);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok(pages)
}

fn stack_planes(planes: &[Array2<f32>], paths: &[PathBuf]) -> Result<Array3<f32>> {
    let first = planes.first().context("Sample has no planes")?;
    let (rows, cols) = first.dim();
    let mut stack = Array3::<f32>::zeros((rows, cols, planes.len()));
    for (z, (plane, path)) in planes.iter().zip(paths).enumerate() {
        if plane.dim() != (rows, cols) {
            anyhow::bail!(
                "Plane {} has shape {:?}, expected {:?}",
                path.display(),
                plane.dim(),
                (rows, cols)
            );
        }
        stack.index_axis_mut(Axis(2), z).assign(plane);
    }
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use tempfile::tempdir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn write_plane(path: &Path, width: u32, height: u32, value: u16) {
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(width, height, |x, _| Luma([value + x as u16]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_natural_order() {
        let mut names = vec!["z10.tif", "z2.tif", "z1.tif", "z02.tif"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["z1.tif", "z2.tif", "z02.tif", "z10.tif"]);
    }

    #[test]
    fn test_discover_directory_sorts_naturally() -> Result<()> {
        let dir = tempdir()?;
        for i in [10, 2, 1] {
            write_plane(&dir.path().join(format!("plane_{}.png", i)), 2, 2, 0);
        }
        fs::write(dir.path().join("notes.md"), "ignored")?;
        let SampleSource::Planes(planes) = SampleSource::discover(dir.path(), false)? else {
            panic!("expected planes");
        };
        let names: Vec<_> = planes
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["plane_1.png", "plane_2.png", "plane_10.png"]);
        Ok(())
    }

    #[test]
    fn test_path_list_keeps_order_unless_sorted() -> Result<()> {
        let dir = tempdir()?;
        let list = dir.path().join("planes.txt");
        fs::write(&list, "b10.png\nb9.png\n\n")?;
        assert_eq!(
            SampleSource::discover(&list, false)?,
            SampleSource::Planes(vec![dir.path().join("b10.png"), dir.path().join("b9.png")])
        );
        assert_eq!(
            SampleSource::discover(&list, true)?,
            SampleSource::Planes(vec![dir.path().join("b9.png"), dir.path().join("b10.png")])
        );
        Ok(())
    }

    #[test]
    fn test_missing_sample_is_an_error() {
        assert!(SampleSource::discover("/does/not/exist", false).is_err());
    }

    #[test]
    fn test_load_stack_layout() -> Result<()> {
        let dir = tempdir()?;
        for z in 0..3 {
            write_plane(&dir.path().join(format!("{}.png", z)), 4, 2, z * 100);
        }
        let source = SampleSource::discover(dir.path(), false)?;
        let options = LoadOptions { parallel: true, n_free_cpus: 0 };
        let volume = load_sample(&source, [1.0, 1.0, 1.0], options)?;
        // [rows, columns, planes]
        assert_eq!(volume.shape(), &[2, 4, 3]);
        assert_eq!(volume[[0, 3, 2]], 203.0);
        Ok(())
    }

    #[test]
    fn test_load_rescales_each_axis() -> Result<()> {
        let dir = tempdir()?;
        for z in 0..4 {
            write_plane(&dir.path().join(format!("{}.png", z)), 8, 4, 0);
        }
        let source = SampleSource::discover(dir.path(), false)?;
        let volume = load_sample(&source, [0.5, 0.5, 0.5], LoadOptions::default())?;
        assert_eq!(volume.shape(), &[2, 4, 2]);
        Ok(())
    }

    #[test]
    fn test_mismatched_planes_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_plane(&dir.path().join("0.png"), 4, 4, 0);
        write_plane(&dir.path().join("1.png"), 4, 3, 0);
        let source = SampleSource::discover(dir.path(), false)?;
        let options = LoadOptions { parallel: false, n_free_cpus: 0 };
        assert!(load_sample(&source, [1.0, 1.0, 1.0], options).is_err());
        Ok(())
    }

    fn write_tiff_stack(path: &Path, width: u32, height: u32, pages: u16) -> Result<()> {
        let mut encoder = TiffEncoder::new(File::create(path)?)?;
        for z in 0..pages {
            let data: Vec<u16> = (0..width * height).map(|i| z * 100 + i as u16).collect();
            encoder.write_image::<colortype::Gray16>(width, height, &data)?;
        }
        Ok(())
    }

    #[test]
    fn test_multi_page_tiff_loads_every_page() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sample.tiff");
        write_tiff_stack(&path, 4, 4, 3)?;

        let source = SampleSource::discover(&path, false)?;
        assert_eq!(source, SampleSource::TiffStack(path.clone()));
        let volume = load_sample(&source, [1.0, 1.0, 1.0], LoadOptions::default())?;
        assert_eq!(volume.shape(), &[4, 4, 3]);
        // Row 1, column 2 of the last page.
        assert_eq!(volume[[1, 2, 2]], 206.0);
        Ok(())
    }

    #[test]
    fn test_multi_page_tiff_is_rescaled_on_every_axis() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sample.tif");
        write_tiff_stack(&path, 8, 4, 4)?;
        let source = SampleSource::discover(&path, false)?;
        let volume = load_sample(&source, [0.5, 0.5, 0.5], LoadOptions::default())?;
        assert_eq!(volume.shape(), &[2, 4, 2]);
        Ok(())
    }

    #[test]
    fn test_single_page_tiff_is_a_one_plane_stack() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("plane.tif");
        write_tiff_stack(&path, 3, 2, 1)?;
        let source = SampleSource::discover(&path, false)?;
        let volume = load_sample(&source, [1.0; 3], LoadOptions::default())?;
        assert_eq!(volume.shape(), &[2, 3, 1]);
        Ok(())
    }
}
