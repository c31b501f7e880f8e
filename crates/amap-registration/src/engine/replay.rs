use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use amap_core::filter::zoom::resample_nearest;
use amap_core::transform::scale_transform;
use amap_core::VoxelSize;
use amap_io::{read_volume, read_voxel_size, write_volume};
use ndarray::Array3;

use super::{
    AffineRequest, EngineOutcome, FreeformRequest, InvertAffineRequest, RegistrationEngine,
    ResampleRequest,
};
use crate::error::Result;
use crate::params::EngineFlags;
use crate::paths::LogPaths;

const IDENTITY_MATRIX: &str = "1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n";

/// Engine operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Affine,
    Freeform,
    Resample,
    InvertAffine,
}

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCall {
    pub kind: CallKind,
    pub flags: EngineFlags,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

/// In-process engine that writes plausible outputs without registering.
///
/// Affine matrices are the identity, control points and registered brains
/// are copies of the reference image, and resampling maps labels onto the
/// reference grid by nearest neighbour. Calls are recorded and individual
/// operations can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    calls: Arc<Mutex<Vec<ReplayCall>>>,
    failing: HashSet<CallKind>,
    silent: HashSet<CallKind>,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with code 1 on every call of `kind`.
    pub fn failing_on(mut self, kind: CallKind) -> Self {
        self.failing.insert(kind);
        self
    }

    /// Exit successfully on every call of `kind` without writing outputs.
    pub fn without_output_on(mut self, kind: CallKind) -> Self {
        self.silent.insert(kind);
        self
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<ReplayCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|c| c.kind == kind).count()
    }

    fn replay(
        &self,
        call: ReplayCall,
        logs: &LogPaths,
        produce: impl FnOnce() -> anyhow::Result<()>,
    ) -> Result<EngineOutcome> {
        let kind = call.kind;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        fs::write(&logs.log, format!("replay {kind:?}\n"))?;
        if self.failing.contains(&kind) {
            fs::write(&logs.err, format!("replay {kind:?} failed on request\n"))?;
            return Ok(EngineOutcome::new(Some(1), logs));
        }
        fs::write(&logs.err, "")?;
        if !self.silent.contains(&kind) {
            produce()?;
        }
        Ok(EngineOutcome::new(Some(0), logs))
    }
}

fn copy_reference(reference: &Path, outputs: &[&Path]) -> anyhow::Result<()> {
    for output in outputs {
        fs::copy(reference, output)?;
    }
    Ok(())
}

fn resample_labels(floating: &Path, reference: &Path, result: &Path) -> anyhow::Result<()> {
    let labels: Array3<u32> = read_volume(floating)?;
    let grid: Array3<f32> = read_volume(reference)?;
    let shape = grid.shape();
    let resampled = resample_nearest(&labels, [shape[0], shape[1], shape[2]]);
    let voxel_size = read_voxel_size(reference)?.unwrap_or_else(|| VoxelSize::uniform(1000.0));
    write_volume(result, &resampled, &voxel_size, &scale_transform(&voxel_size))
}

impl RegistrationEngine for ReplayEngine {
    fn name(&self) -> &str {
        "replay"
    }

    fn run_affine(&self, request: &AffineRequest) -> Result<EngineOutcome> {
        let call = ReplayCall {
            kind: CallKind::Affine,
            flags: request.flags.clone(),
            inputs: vec![request.reference.clone(), request.floating.clone()],
            outputs: vec![request.matrix.clone(), request.result.clone()],
        };
        self.replay(call, &request.logs, || {
            fs::write(&request.matrix, IDENTITY_MATRIX)?;
            copy_reference(&request.reference, &[request.result.as_path()])
        })
    }

    fn run_freeform(&self, request: &FreeformRequest) -> Result<EngineOutcome> {
        let call = ReplayCall {
            kind: CallKind::Freeform,
            flags: request.flags.clone(),
            inputs: vec![
                request.reference.clone(),
                request.floating.clone(),
                request.initial_affine.clone(),
            ],
            outputs: vec![request.control_points.clone(), request.result.clone()],
        };
        self.replay(call, &request.logs, || {
            copy_reference(
                &request.reference,
                &[request.control_points.as_path(), request.result.as_path()],
            )
        })
    }

    fn run_resample(&self, request: &ResampleRequest) -> Result<EngineOutcome> {
        let call = ReplayCall {
            kind: CallKind::Resample,
            flags: request.flags.clone(),
            inputs: vec![
                request.reference.clone(),
                request.floating.clone(),
                request.control_points.clone(),
            ],
            outputs: vec![request.result.clone()],
        };
        self.replay(call, &request.logs, || {
            resample_labels(&request.floating, &request.reference, &request.result)
        })
    }

    fn invert_affine(&self, request: &InvertAffineRequest) -> Result<EngineOutcome> {
        let call = ReplayCall {
            kind: CallKind::InvertAffine,
            flags: EngineFlags::new(),
            inputs: vec![request.matrix.clone()],
            outputs: vec![request.inverse.clone()],
        };
        self.replay(call, &request.logs, || {
            fs::copy(&request.matrix, &request.inverse)?;
            Ok(())
        })
    }
}
