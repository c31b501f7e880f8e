//! Which pipeline stages still have to run.
//!
//! Nothing is stored between runs: a stage is complete when its declared
//! output exists, so re-running a pipeline resumes where it stopped.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::paths::OutputPaths;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageId {
    Preprocess,
    Affine,
    Freeform,
    Segmentation,
    Hemispheres,
    InverseTransform,
    Volumes,
    Boundaries,
    Cleanup,
}

impl StageId {
    pub const ALL: [StageId; 9] = [
        StageId::Preprocess,
        StageId::Affine,
        StageId::Freeform,
        StageId::Segmentation,
        StageId::Hemispheres,
        StageId::InverseTransform,
        StageId::Volumes,
        StageId::Boundaries,
        StageId::Cleanup,
    ];

    /// Stages that invoke the registration engine.
    pub const ENGINE: [StageId; 5] = [
        StageId::Affine,
        StageId::Freeform,
        StageId::Segmentation,
        StageId::Hemispheres,
        StageId::InverseTransform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Preprocess => "preprocess",
            StageId::Affine => "affine",
            StageId::Freeform => "freeform",
            StageId::Segmentation => "segmentation",
            StageId::Hemispheres => "hemispheres",
            StageId::InverseTransform => "inverse transform",
            StageId::Volumes => "volumes",
            StageId::Boundaries => "boundaries",
            StageId::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Existence check for stage artifacts.
pub trait ArtifactProbe {
    fn exists(&self, path: &Path) -> bool;
}

/// Probe backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl ArtifactProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Probe backed by a fixed set of paths.
#[derive(Debug, Clone, Default)]
pub struct SetProbe {
    present: HashSet<PathBuf>,
}

impl SetProbe {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            present: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>) {
        self.present.insert(path.into());
    }
}

impl ArtifactProbe for SetProbe {
    fn exists(&self, path: &Path) -> bool {
        self.present.contains(path)
    }
}

/// Run-level switches that affect the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOptions {
    /// Write the boundary image.
    pub boundaries: bool,
    /// Keep temporary files (debug runs).
    pub retain_temp: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            boundaries: true,
            retain_temp: false,
        }
    }
}

/// Per-stage skip rules over an output layout.
pub struct StageGate<'a, P: ArtifactProbe + ?Sized> {
    paths: &'a OutputPaths,
    probe: &'a P,
    options: GateOptions,
}

impl<'a, P: ArtifactProbe + ?Sized> StageGate<'a, P> {
    pub fn new(paths: &'a OutputPaths, probe: &'a P, options: GateOptions) -> Self {
        Self {
            paths,
            probe,
            options,
        }
    }

    fn missing(&self, path: &Path) -> bool {
        !self.probe.exists(path)
    }

    /// Affine is only needed while a freeform transform is still to come.
    pub fn affine(&self) -> bool {
        self.freeform() && self.inverse_transform()
    }

    pub fn freeform(&self) -> bool {
        self.missing(&self.paths.control_point)
    }

    pub fn segmentation(&self) -> bool {
        self.missing(&self.paths.registered_atlas)
    }

    pub fn hemispheres(&self) -> bool {
        self.missing(&self.paths.registered_hemispheres)
    }

    pub fn inverse_transform(&self) -> bool {
        self.missing(&self.paths.inverse_control_point)
    }

    pub fn volumes(&self) -> bool {
        self.missing(&self.paths.volumes)
    }

    pub fn boundaries(&self) -> bool {
        self.options.boundaries && self.missing(&self.paths.boundaries)
    }

    pub fn cleanup(&self) -> bool {
        !self.options.retain_temp
    }

    /// Sample and atlas copies are rebuilt only if an engine stage needs
    /// them and one of them is gone.
    pub fn preprocess(&self) -> bool {
        let engine_pending = StageId::ENGINE.iter().any(|s| self.is_pending(*s));
        engine_pending
            && (self.missing(&self.paths.downsampled_filtered)
                || self.paths.atlas_copies().iter().any(|p| self.missing(p)))
    }

    pub fn is_pending(&self, stage: StageId) -> bool {
        match stage {
            StageId::Preprocess => self.preprocess(),
            StageId::Affine => self.affine(),
            StageId::Freeform => self.freeform(),
            StageId::Segmentation => self.segmentation(),
            StageId::Hemispheres => self.hemispheres(),
            StageId::InverseTransform => self.inverse_transform(),
            StageId::Volumes => self.volumes(),
            StageId::Boundaries => self.boundaries(),
            StageId::Cleanup => self.cleanup(),
        }
    }

    pub fn pending_stages(&self) -> BTreeSet<StageId> {
        let pending: BTreeSet<StageId> = StageId::ALL
            .into_iter()
            .filter(|stage| self.is_pending(*stage))
            .collect();
        tracing::debug!(?pending, "Evaluated stage gate");
        pending
    }

    /// Additional channels whose downsampled copy is missing.
    pub fn pending_channels<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Vec<&'n str> {
        names
            .into_iter()
            .filter(|name| self.missing(&self.paths.downsampled_channel(name)))
            .collect()
    }
}

/// Stages still to run for `paths`, judged by `probe`.
pub fn pending_stages(
    paths: &OutputPaths,
    probe: &dyn ArtifactProbe,
    options: GateOptions,
) -> BTreeSet<StageId> {
    StageGate::new(paths, probe, options).pending_stages()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> OutputPaths {
        OutputPaths::new("/out")
    }

    #[test]
    fn test_fresh_directory_runs_everything() {
        let pending = pending_stages(&paths(), &SetProbe::default(), GateOptions::default());
        assert_eq!(pending, StageId::ALL.into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_only_control_point_present() {
        let paths = paths();
        let probe = SetProbe::new([paths.control_point.clone()]);
        let gate = StageGate::new(&paths, &probe, GateOptions::default());
        assert!(!gate.affine());
        assert!(!gate.freeform());
        assert!(gate.segmentation());
        assert!(gate.hemispheres());
        assert!(gate.inverse_transform());
    }

    #[test]
    fn test_inverse_output_alone_skips_affine() {
        let paths = paths();
        let probe = SetProbe::new([paths.inverse_control_point.clone()]);
        let gate = StageGate::new(&paths, &probe, GateOptions::default());
        assert!(!gate.affine());
        assert!(gate.freeform());
    }

    #[test]
    fn test_boundaries_only_when_requested() {
        let paths = paths();
        let probe = SetProbe::default();
        let options = GateOptions {
            boundaries: false,
            retain_temp: false,
        };
        assert!(!StageGate::new(&paths, &probe, options).boundaries());

        let probe = SetProbe::new([paths.boundaries.clone()]);
        assert!(!StageGate::new(&paths, &probe, GateOptions::default()).boundaries());
    }

    #[test]
    fn test_cleanup_follows_retain_flag() {
        let paths = paths();
        let probe = SetProbe::default();
        let retain = GateOptions {
            boundaries: true,
            retain_temp: true,
        };
        assert!(!StageGate::new(&paths, &probe, retain).cleanup());
        assert!(StageGate::new(&paths, &probe, GateOptions::default()).cleanup());
    }

    #[test]
    fn test_completed_run_only_cleans_up() {
        let paths = paths();
        let probe = SetProbe::new(paths.named().into_iter().map(|(_, p)| p.to_path_buf()));
        let pending = pending_stages(&paths, &probe, GateOptions::default());
        assert_eq!(pending, BTreeSet::from([StageId::Cleanup]));
    }

    #[test]
    fn test_preprocess_needs_a_pending_engine_stage() {
        let paths = paths();
        // Engine outputs present, preprocessed inputs gone.
        let probe = SetProbe::new([
            paths.control_point.clone(),
            paths.inverse_control_point.clone(),
            paths.registered_atlas.clone(),
            paths.registered_hemispheres.clone(),
        ]);
        let gate = StageGate::new(&paths, &probe, GateOptions::default());
        assert!(!gate.preprocess());

        // Segmentation pending and an atlas copy missing.
        let mut probe = SetProbe::new([paths.downsampled_filtered.clone()]);
        probe.insert(paths.atlas_annotation.clone());
        probe.insert(paths.atlas_brain.clone());
        let gate = StageGate::new(&paths, &probe, GateOptions::default());
        assert!(gate.preprocess());
        probe.insert(paths.atlas_hemispheres.clone());
        let gate = StageGate::new(&paths, &probe, GateOptions::default());
        assert!(!gate.preprocess());
    }

    #[test]
    fn test_pending_channels() {
        let paths = paths();
        let probe = SetProbe::new([paths.downsampled_channel("cells")]);
        let gate = StageGate::new(&paths, &probe, GateOptions::default());
        assert_eq!(gate.pending_channels(["cells", "autofluo"]), vec!["autofluo"]);
    }

    #[test]
    fn test_gate_is_repeatable() {
        let paths = paths();
        let probe = SetProbe::new([paths.volumes.clone()]);
        let first = pending_stages(&paths, &probe, GateOptions::default());
        let second = pending_stages(&paths, &probe, GateOptions::default());
        assert_eq!(first, second);
        assert!(!first.contains(&StageId::Volumes));
    }
}
