//! Runs the engine stages of a registration.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::engine::{
    AffineRequest, EngineOutcome, FreeformRequest, InvertAffineRequest, RegistrationEngine,
    ResampleRequest,
};
use crate::error::{RegistrationError, Result};
use crate::gate::StageId;
use crate::params::{EngineFlags, RegistrationParameters};
use crate::paths::{LogPaths, OutputPaths};

const STAGING_PREFIX: &str = ".amap-staging-";

/// Scratch directory inside the output root that engine outputs are written
/// to before being moved into place. Removed when dropped.
#[derive(Debug)]
struct Staging {
    dir: TempDir,
}

impl Staging {
    fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    fn path_for(&self, destination: &Path) -> PathBuf {
        match destination.file_name() {
            Some(name) => self.dir.path().join(name),
            None => self.dir.path().join("output"),
        }
    }
}

/// Invokes the engine for each registration stage.
///
/// A stage succeeds when the engine exits with code zero and every declared
/// output exists. Outputs only appear at their final paths once the whole
/// stage has succeeded, the primary output last.
pub struct RegistrationDriver<'a> {
    engine: &'a dyn RegistrationEngine,
    paths: &'a OutputPaths,
    parameters: RegistrationParameters,
    threads: usize,
    staging: Staging,
}

impl<'a> RegistrationDriver<'a> {
    pub fn new(
        engine: &'a dyn RegistrationEngine,
        paths: &'a OutputPaths,
        parameters: RegistrationParameters,
    ) -> Result<Self> {
        let staging = Staging::new(paths.root())?;
        Ok(Self {
            engine,
            paths,
            parameters,
            threads: 1,
            staging,
        })
    }

    /// Threads the engine may use (`-omp`).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn parameters(&self) -> &RegistrationParameters {
        &self.parameters
    }

    fn threaded(&self, flags: EngineFlags) -> EngineFlags {
        flags.with("-omp", self.threads)
    }

    fn require(&self, stage: StageId, inputs: &[&Path]) -> Result<()> {
        match inputs.iter().find(|p| !p.exists()) {
            Some(missing) => Err(RegistrationError::missing_artifact(stage, *missing)),
            None => Ok(()),
        }
    }

    /// Check the outcome and move staged outputs into place, in order.
    fn commit(
        &self,
        stage: StageId,
        outcome: EngineOutcome,
        outputs: &[(PathBuf, &Path)],
    ) -> Result<()> {
        if !outcome.success() {
            tracing::error!(%stage, status = %outcome, "Engine stage failed");
            return Err(RegistrationError::engine_failure(
                stage,
                outcome.status(),
                outcome.log,
                outcome.err,
            ));
        }
        if let Some((staged, _)) = outputs.iter().find(|(staged, _)| !staged.exists()) {
            tracing::error!(%stage, output = %staged.display(), "Engine did not write its output");
            return Err(RegistrationError::engine_failure(
                stage,
                format!("{}, declared output missing", outcome.status()),
                outcome.log,
                outcome.err,
            ));
        }
        for (staged, destination) in outputs {
            fs::rename(staged, destination)?;
        }
        tracing::info!(%stage, "Stage complete");
        Ok(())
    }

    /// Affine alignment of the atlas brain onto the filtered sample.
    pub fn affine(&self) -> Result<()> {
        let stage = StageId::Affine;
        let p = self.paths;
        self.require(stage, &[p.atlas_brain.as_path(), p.downsampled_filtered.as_path()])?;
        tracing::info!("Starting affine registration");

        let request = AffineRequest {
            reference: p.downsampled_filtered.clone(),
            floating: p.atlas_brain.clone(),
            flags: self.threaded(self.parameters.affine_flags()?),
            matrix: self.staging.path_for(&p.affine_matrix),
            result: self.staging.path_for(&p.affine_registered_brain),
            logs: p.affine_logs.clone(),
        };
        let outcome = self.engine.run_affine(&request)?;
        self.commit(
            stage,
            outcome,
            &[
                (request.result, p.affine_registered_brain.as_path()),
                (request.matrix, p.affine_matrix.as_path()),
            ],
        )
    }

    /// Free-form alignment starting from the affine matrix.
    pub fn freeform(&self) -> Result<()> {
        let stage = StageId::Freeform;
        let p = self.paths;
        self.require(
            stage,
            &[
                p.atlas_brain.as_path(),
                p.downsampled_filtered.as_path(),
                p.affine_matrix.as_path(),
            ],
        )?;
        tracing::info!("Starting freeform registration");

        let request = FreeformRequest {
            reference: p.downsampled_filtered.clone(),
            floating: p.atlas_brain.clone(),
            initial_affine: p.affine_matrix.clone(),
            flags: self.threaded(self.parameters.freeform_flags()?),
            control_points: self.staging.path_for(&p.control_point),
            result: self.staging.path_for(&p.freeform_registered_brain),
            logs: p.freeform_logs.clone(),
        };
        let outcome = self.engine.run_freeform(&request)?;
        self.commit(
            stage,
            outcome,
            &[
                (request.result, p.freeform_registered_brain.as_path()),
                (request.control_points, p.control_point.as_path()),
            ],
        )
    }

    fn resample(
        &self,
        stage: StageId,
        floating: &Path,
        result: &Path,
        logs: &LogPaths,
    ) -> Result<()> {
        let p = self.paths;
        self.require(
            stage,
            &[
                floating,
                p.downsampled_filtered.as_path(),
                p.control_point.as_path(),
            ],
        )?;
        let request = ResampleRequest {
            reference: p.downsampled_filtered.clone(),
            floating: floating.to_path_buf(),
            control_points: p.control_point.clone(),
            flags: self.threaded(self.parameters.segmentation_flags()),
            result: self.staging.path_for(result),
            logs: logs.clone(),
        };
        let outcome = self.engine.run_resample(&request)?;
        self.commit(stage, outcome, &[(request.result, result)])
    }

    /// Carry the atlas annotation onto the sample.
    pub fn segmentation(&self) -> Result<()> {
        tracing::info!("Starting segmentation");
        let p = self.paths;
        self.resample(
            StageId::Segmentation,
            &p.atlas_annotation,
            &p.registered_atlas,
            &p.segmentation_logs,
        )
    }

    /// Carry the hemisphere labels onto the sample.
    pub fn hemispheres(&self) -> Result<()> {
        tracing::info!("Segmenting hemispheres");
        let p = self.paths;
        self.resample(
            StageId::Hemispheres,
            &p.atlas_hemispheres,
            &p.registered_hemispheres,
            &p.segmentation_logs,
        )
    }

    /// Sample-to-atlas transform: invert the affine, then run the free-form
    /// alignment with reference and floating exchanged.
    pub fn inverse_transform(&self) -> Result<()> {
        let stage = StageId::InverseTransform;
        let p = self.paths;
        self.require(
            stage,
            &[
                p.affine_matrix.as_path(),
                p.atlas_brain.as_path(),
                p.downsampled_filtered.as_path(),
            ],
        )?;
        tracing::info!("Generating inverse transform");

        let invert = InvertAffineRequest {
            matrix: p.affine_matrix.clone(),
            inverse: self.staging.path_for(&p.invert_affine_matrix),
            logs: p.invert_affine_logs.clone(),
        };
        let outcome = self.engine.invert_affine(&invert)?;
        self.commit(stage, outcome, &[(invert.inverse, p.invert_affine_matrix.as_path())])?;

        let request = FreeformRequest {
            reference: p.atlas_brain.clone(),
            floating: p.downsampled_filtered.clone(),
            initial_affine: p.invert_affine_matrix.clone(),
            flags: self.threaded(self.parameters.freeform_flags()?),
            control_points: self.staging.path_for(&p.inverse_control_point),
            result: self.staging.path_for(&p.inverse_freeform_registered_brain),
            logs: p.inverse_freeform_logs.clone(),
        };
        let outcome = self.engine.run_freeform(&request)?;
        self.commit(
            stage,
            outcome,
            &[
                (request.result, p.inverse_freeform_registered_brain.as_path()),
                (request.control_points, p.inverse_control_point.as_path()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CallKind, ReplayEngine};
    use tempfile::tempdir;

    fn seed(paths: &OutputPaths) {
        fs::write(&paths.atlas_brain, b"brain").unwrap();
        fs::write(&paths.downsampled_filtered, b"sample").unwrap();
    }

    #[test]
    fn test_affine_writes_matrix_and_flags() {
        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        seed(&paths);
        let engine = ReplayEngine::new();
        let driver = RegistrationDriver::new(&engine, &paths, RegistrationParameters::default())
            .unwrap()
            .with_threads(3);
        driver.affine().unwrap();

        assert!(paths.affine_matrix.exists());
        assert!(paths.affine_registered_brain.exists());
        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].flags.render(), "-ln 6 -lp 5 -omp 3 ");
    }

    #[test]
    fn test_freeform_needs_affine() {
        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        seed(&paths);
        let engine = ReplayEngine::new();
        let driver =
            RegistrationDriver::new(&engine, &paths, RegistrationParameters::default()).unwrap();
        match driver.freeform() {
            Err(RegistrationError::MissingArtifact { stage, path }) => {
                assert_eq!(stage, StageId::Freeform);
                assert_eq!(path, paths.affine_matrix);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(engine.calls().len(), 0);
    }

    #[test]
    fn test_failed_stage_leaves_no_output() {
        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        seed(&paths);
        let engine = ReplayEngine::new().failing_on(CallKind::Affine);
        let driver =
            RegistrationDriver::new(&engine, &paths, RegistrationParameters::default()).unwrap();
        match driver.affine() {
            Err(RegistrationError::EngineFailure { stage, log, err, .. }) => {
                assert_eq!(stage, StageId::Affine);
                assert_eq!(log, paths.affine_logs.log);
                assert_eq!(err, paths.affine_logs.err);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!paths.affine_matrix.exists());
        assert!(!paths.affine_registered_brain.exists());
    }

    #[test]
    fn test_missing_declared_output_is_a_failure() {
        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        seed(&paths);
        let engine = ReplayEngine::new().without_output_on(CallKind::Affine);
        let driver =
            RegistrationDriver::new(&engine, &paths, RegistrationParameters::default()).unwrap();
        assert!(matches!(
            driver.affine(),
            Err(RegistrationError::EngineFailure { .. })
        ));
        assert!(!paths.affine_matrix.exists());
    }

    #[test]
    fn test_invalid_parameters_never_reach_engine() {
        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        seed(&paths);
        let engine = ReplayEngine::new();
        let parameters = RegistrationParameters::default().with_affine_steps(6, 7);
        let driver = RegistrationDriver::new(&engine, &paths, parameters).unwrap();
        assert!(matches!(
            driver.affine(),
            Err(RegistrationError::InvalidParameter(_))
        ));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_inverse_transform_swaps_roles() {
        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        seed(&paths);
        let engine = ReplayEngine::new();
        let driver =
            RegistrationDriver::new(&engine, &paths, RegistrationParameters::default()).unwrap();
        driver.affine().unwrap();
        driver.inverse_transform().unwrap();

        assert!(paths.invert_affine_matrix.exists());
        assert!(paths.inverse_control_point.exists());
        let calls = engine.calls();
        let inverse = &calls[2];
        assert_eq!(inverse.kind, CallKind::Freeform);
        assert_eq!(
            inverse.inputs,
            vec![
                paths.atlas_brain.clone(),
                paths.downsampled_filtered.clone(),
                paths.invert_affine_matrix.clone(),
            ]
        );
    }

    #[test]
    fn test_staging_removed_on_drop() {
        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        let engine = ReplayEngine::new();
        {
            let _driver =
                RegistrationDriver::new(&engine, &paths, RegistrationParameters::default())
                    .unwrap();
            assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
