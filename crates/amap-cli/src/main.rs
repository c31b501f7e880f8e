use std::path::PathBuf;

use amap_core::{AxisFlips, Orientation, VoxelSize};
use amap_registration::{AmapConfig, NiftyReg, Pipeline, PipelineOptions, RegistrationParameters};
use anyhow::{Context, Result};
use clap::{Args, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amap")]
#[command(about = "Register a reference atlas onto a whole-brain sample")]
struct Cli {
    /// Sample: a directory of planes, a text file listing planes, or a NIfTI file
    sample: PathBuf,

    /// Output directory
    output: PathBuf,

    /// Sample voxel size along x, in µm
    #[arg(short = 'x', long = "x-pixel-um")]
    x_pixel_um: f64,

    /// Sample voxel size along y, in µm
    #[arg(short = 'y', long = "y-pixel-um")]
    y_pixel_um: f64,

    /// Sample voxel size along z, in µm
    #[arg(short = 'z', long = "z-pixel-um")]
    z_pixel_um: f64,

    /// Sample orientation (horizontal, coronal, sagittal)
    #[arg(long, default_value = "coronal")]
    orientation: Orientation,

    #[arg(long)]
    flip_x: bool,

    #[arg(long)]
    flip_y: bool,

    #[arg(long)]
    flip_z: bool,

    /// Configuration file; falls back to $AMAP_CONFIG_PATH
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Folder holding the engine binaries
    #[arg(long)]
    binaries_folder: Option<PathBuf>,

    /// Additional channel to downsample, as name=path
    #[arg(long = "additional", value_parser = parse_channel)]
    additional: Vec<(String, PathBuf)>,

    /// Skip the boundary image
    #[arg(long)]
    no_boundaries: bool,

    /// Do not save the downsampled sample
    #[arg(long)]
    no_save_downsampled: bool,

    /// Naturally sort the planes of a path list
    #[arg(long)]
    sort_input_file: bool,

    /// CPU cores to leave free
    #[arg(long, default_value_t = 2)]
    n_free_cpus: usize,

    /// Verbose logging; keep temporary files
    #[arg(long)]
    debug: bool,

    #[command(flatten)]
    registration: RegistrationArgs,
}

/// Overrides for the `[registration]` table.
#[derive(Args)]
struct RegistrationArgs {
    #[arg(long)]
    affine_n_steps: Option<u32>,

    #[arg(long)]
    affine_use_n_steps: Option<u32>,

    #[arg(long)]
    freeform_n_steps: Option<u32>,

    #[arg(long)]
    freeform_use_n_steps: Option<u32>,

    #[arg(long)]
    bending_energy_weight: Option<f64>,

    /// Control point spacing; negative values are voxels
    #[arg(long, allow_hyphen_values = true)]
    grid_spacing: Option<i32>,

    #[arg(long, allow_hyphen_values = true)]
    smoothing_sigma_reference: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    smoothing_sigma_floating: Option<f64>,

    #[arg(long)]
    histogram_n_bins_reference: Option<u32>,

    #[arg(long)]
    histogram_n_bins_floating: Option<u32>,
}

impl RegistrationArgs {
    fn apply(&self, mut params: RegistrationParameters) -> RegistrationParameters {
        let RegistrationArgs {
            affine_n_steps,
            affine_use_n_steps,
            freeform_n_steps,
            freeform_use_n_steps,
            bending_energy_weight,
            grid_spacing,
            smoothing_sigma_reference,
            smoothing_sigma_floating,
            histogram_n_bins_reference,
            histogram_n_bins_floating,
        } = *self;
        if let Some(v) = affine_n_steps {
            params.affine_n_steps = v;
        }
        if let Some(v) = affine_use_n_steps {
            params.affine_use_n_steps = v;
        }
        if let Some(v) = freeform_n_steps {
            params.freeform_n_steps = v;
        }
        if let Some(v) = freeform_use_n_steps {
            params.freeform_use_n_steps = v;
        }
        if let Some(v) = bending_energy_weight {
            params.bending_energy_weight = v;
        }
        if let Some(v) = grid_spacing {
            params.grid_spacing = v;
        }
        if let Some(v) = smoothing_sigma_reference {
            params.smoothing_sigma_reference = v;
        }
        if let Some(v) = smoothing_sigma_floating {
            params.smoothing_sigma_floating = v;
        }
        if let Some(v) = histogram_n_bins_reference {
            params.histogram_n_bins_reference = v;
        }
        if let Some(v) = histogram_n_bins_floating {
            params.histogram_n_bins_floating = v;
        }
        params
    }
}

fn parse_channel(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected name=path, got '{value}'")),
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = AmapConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(folder) = &cli.binaries_folder {
        config.engine = config.engine.with_binaries_folder(folder);
    }
    let parameters = cli.registration.apply(config.registration.clone());
    let engine = NiftyReg::new(config.engine.clone());

    let mut options = PipelineOptions::new(
        VoxelSize::new(cli.x_pixel_um, cli.y_pixel_um, cli.z_pixel_um),
        cli.orientation,
    )
    .with_flips(AxisFlips::new(cli.flip_x, cli.flip_y, cli.flip_z))
    .with_boundaries(!cli.no_boundaries)
    .with_save_downsampled(!cli.no_save_downsampled)
    .with_sort_input_file(cli.sort_input_file)
    .with_n_free_cpus(cli.n_free_cpus)
    .with_debug(cli.debug);
    for (name, path) in cli.additional {
        options = options.with_channel(name, path);
    }

    info!(sample = %cli.sample.display(), output = %cli.output.display(), "Starting registration");
    let report = Pipeline::new(config, &engine, &cli.output, options)
        .with_parameters(parameters)
        .run(&cli.sample)
        .with_context(|| format!("Registration of {} failed", cli.sample.display()))?;

    info!(
        executed = report.executed.len(),
        skipped = report.skipped.len(),
        "Done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel() {
        assert_eq!(
            parse_channel("cfos=/data/cfos").unwrap(),
            ("cfos".to_string(), PathBuf::from("/data/cfos"))
        );
        assert!(parse_channel("cfos").is_err());
        assert!(parse_channel("=/data").is_err());
    }

    #[test]
    fn test_minimal_arguments() {
        let cli = Cli::try_parse_from(["amap", "in", "out", "-x", "2", "-y", "2", "-z", "5"]).unwrap();
        assert_eq!(cli.orientation, Orientation::Coronal);
        assert_eq!(cli.n_free_cpus, 2);
        assert!(cli.additional.is_empty());
        let params = cli.registration.apply(RegistrationParameters::default());
        assert_eq!(params, RegistrationParameters::default());
    }

    #[test]
    fn test_knobs_override_configuration() {
        let cli = Cli::try_parse_from([
            "amap",
            "in",
            "out",
            "-x",
            "2",
            "-y",
            "2",
            "-z",
            "5",
            "--orientation",
            "sagittal",
            "--grid-spacing",
            "-5",
            "--freeform-use-n-steps",
            "3",
            "--additional",
            "cfos=/data/cfos",
        ])
        .unwrap();
        assert_eq!(cli.orientation, Orientation::Sagittal);
        assert_eq!(cli.additional, vec![("cfos".to_string(), PathBuf::from("/data/cfos"))]);
        let params = cli.registration.apply(RegistrationParameters::default());
        assert_eq!(params.grid_spacing, -5);
        assert_eq!(params.freeform_use_n_steps, 3);
        assert_eq!(params.affine_n_steps, 6);
    }
}
