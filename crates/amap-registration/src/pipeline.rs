//! End-to-end registration run over one output directory.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use amap_core::boundaries::boundary_image;
use amap_core::{AxisFlips, Orientation, StructureVolume, VoxelSize};
use amap_io::{available_workers, read_volume, write_volume, LoadOptions, SampleSource};
use ndarray::Array3;

use crate::atlas::AtlasModel;
use crate::brain::BrainProcessor;
use crate::config::AmapConfig;
use crate::driver::RegistrationDriver;
use crate::engine::RegistrationEngine;
use crate::error::{RegistrationError, Result};
use crate::gate::{FsProbe, GateOptions, StageGate, StageId};
use crate::params::RegistrationParameters;
use crate::paths::OutputPaths;
use crate::progress::{LoggingCallback, StageCallback, StageTracker};
use crate::validation::validate_voxel_size;
use crate::volumes::VolumeAggregator;

/// How the sample was acquired and what the run should produce.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Sample voxel size in µm.
    pub pixel_size: VoxelSize,
    pub orientation: Orientation,
    /// Extra flips applied to the atlas after the orientation's own.
    pub flips: AxisFlips,
    pub boundaries: bool,
    pub save_downsampled: bool,
    /// Keep temporary files.
    pub debug: bool,
    pub sort_input_file: bool,
    pub n_free_cpus: usize,
    /// Further channels to downsample, by name.
    pub additional_channels: Vec<(String, PathBuf)>,
}

impl PipelineOptions {
    pub fn new(pixel_size: VoxelSize, orientation: Orientation) -> Self {
        Self {
            pixel_size,
            orientation,
            flips: AxisFlips::none(),
            boundaries: true,
            save_downsampled: true,
            debug: false,
            sort_input_file: false,
            n_free_cpus: 2,
            additional_channels: Vec::new(),
        }
    }

    pub fn with_flips(mut self, flips: AxisFlips) -> Self {
        self.flips = flips;
        self
    }

    pub fn with_boundaries(mut self, boundaries: bool) -> Self {
        self.boundaries = boundaries;
        self
    }

    pub fn with_save_downsampled(mut self, save: bool) -> Self {
        self.save_downsampled = save;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_sort_input_file(mut self, sort: bool) -> Self {
        self.sort_input_file = sort;
        self
    }

    pub fn with_n_free_cpus(mut self, n: usize) -> Self {
        self.n_free_cpus = n;
        self
    }

    pub fn with_channel(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.additional_channels.push((name.into(), path.into()));
        self
    }

    fn gate_options(&self) -> GateOptions {
        GateOptions {
            boundaries: self.boundaries,
            retain_temp: self.debug,
        }
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            parallel: available_workers(self.n_free_cpus) > 1,
            n_free_cpus: self.n_free_cpus,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub executed: Vec<StageId>,
    pub skipped: Vec<StageId>,
    /// Additional channels downsampled in this run.
    pub channels: Vec<String>,
    /// Rows of the volumes table, when it was computed in this run.
    pub volumes: Option<Vec<StructureVolume>>,
}

/// Resumable registration of the configured atlas onto one sample.
pub struct Pipeline<'e> {
    config: AmapConfig,
    engine: &'e dyn RegistrationEngine,
    paths: OutputPaths,
    options: PipelineOptions,
    callbacks: Vec<Arc<dyn StageCallback>>,
}

impl<'e> Pipeline<'e> {
    pub fn new(
        config: AmapConfig,
        engine: &'e dyn RegistrationEngine,
        output: impl Into<PathBuf>,
        options: PipelineOptions,
    ) -> Self {
        let paths = OutputPaths::for_atlas(output, &config.atlas);
        Self {
            config,
            engine,
            paths,
            options,
            callbacks: vec![Arc::new(LoggingCallback)],
        }
    }

    pub fn with_parameters(mut self, parameters: RegistrationParameters) -> Self {
        self.config.registration = parameters;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn StageCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    fn atlas(&self) -> Result<AtlasModel> {
        Ok(AtlasModel::new(self.config.atlas.clone())?.with_destination(self.paths.root()))
    }

    /// Run every pending stage for `sample`.
    ///
    /// Stages whose outputs already exist are skipped; the plan is fixed
    /// when the run starts.
    pub fn run(&self, sample: &Path) -> Result<PipelineReport> {
        validate_voxel_size("sample", &self.options.pixel_size)?;
        fs::create_dir_all(self.paths.root())?;

        let gate = StageGate::new(&self.paths, &FsProbe, self.options.gate_options());
        let plan = gate.pending_stages();
        let channels: Vec<(String, PathBuf)> = {
            let pending = gate.pending_channels(
                self.options.additional_channels.iter().map(|(name, _)| name.as_str()),
            );
            self.options
                .additional_channels
                .iter()
                .filter(|(name, _)| pending.contains(&name.as_str()))
                .cloned()
                .collect()
        };

        let engine_pending = StageId::ENGINE.iter().any(|s| plan.contains(s));
        if engine_pending {
            self.config.registration.validate()?;
        }

        let mut tracker = StageTracker::new();
        for callback in &self.callbacks {
            tracker.add_callback(callback.clone());
        }
        let mut report = PipelineReport::default();
        tracker.start();

        let mut stages = Stages {
            plan: &plan,
            tracker: &mut tracker,
            report: &mut report,
        };

        stages.run(StageId::Preprocess, || self.preprocess(sample))?;

        for (name, path) in &channels {
            self.downsample_channel(name, path)?;
            stages.report.channels.push(name.clone());
        }

        let driver = if engine_pending {
            Some(
                RegistrationDriver::new(self.engine, &self.paths, self.config.registration.clone())?
                    .with_threads(available_workers(self.options.n_free_cpus)),
            )
        } else {
            None
        };
        if let Some(driver) = &driver {
            stages.run(StageId::Affine, || driver.affine())?;
            stages.run(StageId::Freeform, || driver.freeform())?;
            stages.run(StageId::Segmentation, || driver.segmentation())?;
            stages.run(StageId::Hemispheres, || driver.hemispheres())?;
            stages.run(StageId::InverseTransform, || driver.inverse_transform())?;
        } else {
            for stage in StageId::ENGINE {
                stages.tracker.stage_skipped(stage);
                stages.report.skipped.push(stage);
            }
        }
        drop(driver);

        if let Some(rows) = stages.run(StageId::Volumes, || self.volumes())? {
            stages.report.volumes = Some(rows);
        }
        stages.run(StageId::Boundaries, || self.boundaries())?;
        stages.run(StageId::Cleanup, || self.cleanup())?;

        tracker.complete();
        tracing::info!(output = %self.paths.root().display(), "Registration finished");
        Ok(report)
    }

    fn preprocess(&self, sample: &Path) -> Result<()> {
        let source = SampleSource::discover(sample, self.options.sort_input_file)
            .map_err(|e| RegistrationError::missing_input(format!("{e:#}")))?;
        let mut atlas = self.atlas()?;
        atlas.load()?;

        let mut brain = BrainProcessor::new(
            atlas,
            source,
            self.options.pixel_size,
            self.options.orientation,
        )?
        .with_load_options(self.options.load_options());
        brain.load()?;

        brain.swap_atlas_orientation_to_self()?;
        brain.flip_atlas(self.options.orientation.standard_flips())?;
        brain.flip_atlas(self.options.flips)?;
        brain.atlas().persist()?;

        if self.options.save_downsampled {
            tracing::info!("Saving downsampled image");
            brain.save(&self.paths.downsampled)?;
        }
        let filtered = brain.filter()?;
        tracing::info!("Saving filtered image");
        brain.save_volume(&self.paths.downsampled_filtered, &filtered)?;
        Ok(())
    }

    fn downsample_channel(&self, name: &str, path: &Path) -> Result<()> {
        tracing::info!(channel = name, "Downsampling additional channel");
        let source = SampleSource::discover(path, self.options.sort_input_file)
            .map_err(|e| RegistrationError::missing_input(format!("{name}: {e:#}")))?;
        let mut brain = BrainProcessor::new(
            self.atlas()?,
            source,
            self.options.pixel_size,
            self.options.orientation,
        )?
        .with_load_options(self.options.load_options());
        brain.load()?;
        brain.save(self.paths.downsampled_channel(name))
    }

    fn volumes(&self) -> Result<Vec<StructureVolume>> {
        let p = &self.paths;
        for input in [&p.registered_atlas, &p.registered_hemispheres] {
            if !input.exists() {
                return Err(RegistrationError::missing_artifact(StageId::Volumes, input));
            }
        }
        let atlas = self.atlas()?;
        let structures = atlas.structures()?;
        let voxel_volume = atlas.pixel_sizes()?.voxel_volume_mm3();
        VolumeAggregator::new(
            &structures,
            atlas.left_hemisphere_value(),
            atlas.right_hemisphere_value(),
            voxel_volume,
        )
        .write_table(&p.registered_atlas, &p.registered_hemispheres, &p.volumes)
    }

    fn boundaries(&self) -> Result<()> {
        let p = &self.paths;
        if !p.registered_atlas.exists() {
            return Err(RegistrationError::missing_artifact(
                StageId::Boundaries,
                &p.registered_atlas,
            ));
        }
        let atlas = self.atlas()?;
        let labels: Array3<u32> = read_volume(&p.registered_atlas)?;
        write_volume(
            &p.boundaries,
            &boundary_image(&labels),
            &atlas.pixel_sizes()?,
            &atlas.scale_transform()?,
        )?;
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        for path in self.paths.temporary() {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed temporary file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "Temporary file already gone")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Runs planned stages and records what happened.
struct Stages<'a> {
    plan: &'a BTreeSet<StageId>,
    tracker: &'a mut StageTracker,
    report: &'a mut PipelineReport,
}

impl Stages<'_> {
    fn run<T>(&mut self, stage: StageId, f: impl FnOnce() -> Result<T>) -> Result<Option<T>> {
        if !self.plan.contains(&stage) {
            self.tracker.stage_skipped(stage);
            self.report.skipped.push(stage);
            return Ok(None);
        }
        self.tracker.stage_started(stage);
        match f() {
            Ok(value) => {
                self.tracker.stage_completed(stage);
                self.report.executed.push(stage);
                Ok(Some(value))
            }
            Err(e) => {
                self.tracker.stage_failed(stage, &e.to_string());
                Err(e)
            }
        }
    }
}
