//! Fixed layout of the registration output directory.

use std::path::{Path, PathBuf};

use amap_core::{AtlasConfig, AtlasElement};

/// Standard output and error capture of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub log: PathBuf,
    pub err: PathBuf,
}

impl LogPaths {
    fn new(root: &Path, stem: &str) -> Self {
        Self {
            log: root.join(format!("{stem}.log")),
            err: root.join(format!("{stem}.err")),
        }
    }
}

/// Every file the pipeline reads or writes under one output root.
///
/// All paths are a pure function of the root and the atlas file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    root: PathBuf,

    pub downsampled: PathBuf,
    pub downsampled_filtered: PathBuf,
    pub registered_atlas: PathBuf,
    pub registered_hemispheres: PathBuf,
    pub volumes: PathBuf,
    pub boundaries: PathBuf,

    pub affine_matrix: PathBuf,
    pub invert_affine_matrix: PathBuf,
    pub control_point: PathBuf,
    pub inverse_control_point: PathBuf,

    pub affine_registered_brain: PathBuf,
    pub freeform_registered_brain: PathBuf,
    pub inverse_freeform_registered_brain: PathBuf,

    pub affine_logs: LogPaths,
    pub freeform_logs: LogPaths,
    pub inverse_freeform_logs: LogPaths,
    pub segmentation_logs: LogPaths,
    pub invert_affine_logs: LogPaths,

    pub atlas_annotation: PathBuf,
    pub atlas_brain: PathBuf,
    pub atlas_hemispheres: PathBuf,
}

impl OutputPaths {
    /// Layout with the default atlas copy names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            downsampled: root.join("downsampled.nii"),
            downsampled_filtered: root.join("downsampled_filtered.nii"),
            registered_atlas: root.join("registered_atlas.nii"),
            registered_hemispheres: root.join("registered_hemispheres.nii"),
            volumes: root.join("volumes.csv"),
            boundaries: root.join("boundaries.nii"),

            affine_matrix: root.join("affine_matrix.txt"),
            invert_affine_matrix: root.join("invert_affine_matrix.txt"),
            control_point: root.join("control_point_file.nii"),
            inverse_control_point: root.join("inverse_control_point_file.nii"),

            affine_registered_brain: root.join("affine_registered_atlas_brain.nii"),
            freeform_registered_brain: root.join("freeform_registered_atlas_brain.nii"),
            inverse_freeform_registered_brain: root.join("inverse_freeform_registered_brain.nii"),

            affine_logs: LogPaths::new(&root, "affine"),
            freeform_logs: LogPaths::new(&root, "freeform"),
            inverse_freeform_logs: LogPaths::new(&root, "inverse_freeform"),
            segmentation_logs: LogPaths::new(&root, "segment"),
            invert_affine_logs: LogPaths::new(&root, "invert_affine"),

            atlas_annotation: root.join("annotations.nii"),
            atlas_brain: root.join("brain.nii"),
            atlas_hemispheres: root.join("hemispheres.nii"),
            root,
        }
    }

    /// Layout whose atlas copies carry the configured file names.
    pub fn for_atlas(root: impl Into<PathBuf>, atlas: &AtlasConfig) -> Self {
        let mut paths = Self::new(root);
        paths.atlas_annotation = atlas.destination_path(&paths.root, AtlasElement::Annotation);
        paths.atlas_brain = atlas.destination_path(&paths.root, AtlasElement::Brain);
        paths.atlas_hemispheres = atlas.destination_path(&paths.root, AtlasElement::Hemispheres);
        paths
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downsampled copy of an additional channel.
    pub fn downsampled_channel(&self, name: &str) -> PathBuf {
        self.root.join(format!("downsampled_{name}.nii"))
    }

    /// The three atlas copies, in annotation, brain, hemispheres order.
    pub fn atlas_copies(&self) -> [&Path; 3] {
        [&self.atlas_annotation, &self.atlas_brain, &self.atlas_hemispheres]
    }

    /// Every named path with its logical name.
    pub fn named(&self) -> Vec<(&'static str, &Path)> {
        let mut named: Vec<(&'static str, &Path)> = vec![
            ("downsampled", &self.downsampled),
            ("downsampled_filtered", &self.downsampled_filtered),
            ("registered_atlas", &self.registered_atlas),
            ("registered_hemispheres", &self.registered_hemispheres),
            ("volumes", &self.volumes),
            ("boundaries", &self.boundaries),
            ("affine_matrix", &self.affine_matrix),
            ("invert_affine_matrix", &self.invert_affine_matrix),
            ("control_point", &self.control_point),
            ("inverse_control_point", &self.inverse_control_point),
            ("affine_registered_brain", &self.affine_registered_brain),
            ("freeform_registered_brain", &self.freeform_registered_brain),
            ("inverse_freeform_registered_brain", &self.inverse_freeform_registered_brain),
            ("atlas_annotation", &self.atlas_annotation),
            ("atlas_brain", &self.atlas_brain),
            ("atlas_hemispheres", &self.atlas_hemispheres),
        ];
        for (name, logs) in self.logs() {
            named.push((name, &logs.log));
            named.push((name, &logs.err));
        }
        named
    }

    fn logs(&self) -> [(&'static str, &LogPaths); 5] {
        [
            ("affine_logs", &self.affine_logs),
            ("freeform_logs", &self.freeform_logs),
            ("inverse_freeform_logs", &self.inverse_freeform_logs),
            ("segmentation_logs", &self.segmentation_logs),
            ("invert_affine_logs", &self.invert_affine_logs),
        ]
    }

    /// Intermediate files removed by cleanup.
    pub fn temporary(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = vec![
            &self.downsampled_filtered,
            &self.affine_registered_brain,
            &self.freeform_registered_brain,
            &self.inverse_freeform_registered_brain,
        ];
        for (_, logs) in self.logs() {
            paths.push(&logs.log);
            paths.push(&logs.err);
        }
        paths
    }
}
