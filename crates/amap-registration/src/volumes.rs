//! Per-structure volumes of a registered annotation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use amap_core::{Hemisphere, StructureVolume, Structures};
use amap_io::{read_volume, write_volumes_table};
use ndarray::{Array3, Zip};

use crate::error::{RegistrationError, Result};

/// Counts labelled voxels per structure and hemisphere.
///
/// Rows are flat: a voxel is attributed to the structure whose id it
/// carries and never rolled up into that structure's ancestors.
#[derive(Debug)]
pub struct VolumeAggregator<'a> {
    structures: &'a Structures,
    left_value: u32,
    right_value: u32,
    voxel_volume_mm3: f64,
}

impl<'a> VolumeAggregator<'a> {
    pub fn new(
        structures: &'a Structures,
        left_value: u32,
        right_value: u32,
        voxel_volume_mm3: f64,
    ) -> Self {
        Self {
            structures,
            left_value,
            right_value,
            voxel_volume_mm3,
        }
    }

    fn hemisphere(&self, value: u32) -> Hemisphere {
        if value == self.left_value {
            Hemisphere::Left
        } else if value == self.right_value {
            Hemisphere::Right
        } else {
            Hemisphere::Whole
        }
    }

    /// One row per observed `(id, hemisphere)`, ordered by id then
    /// left, right, whole. Background (0) is skipped.
    pub fn aggregate(
        &self,
        labels: &Array3<u32>,
        hemispheres: &Array3<u32>,
    ) -> Result<Vec<StructureVolume>> {
        if labels.shape() != hemispheres.shape() {
            return Err(RegistrationError::ShapeMismatch {
                expected: labels.shape().to_vec(),
                actual: hemispheres.shape().to_vec(),
            });
        }

        let mut counts: BTreeMap<(u32, Hemisphere), u64> = BTreeMap::new();
        Zip::from(labels).and(hemispheres).for_each(|&label, &side| {
            if label != 0 {
                *counts.entry((label, self.hemisphere(side))).or_default() += 1;
            }
        });

        let mut unknown = BTreeSet::new();
        let rows = counts
            .into_iter()
            .map(|((id, hemisphere), voxel_count)| {
                let name = match self.structures.name(id) {
                    Some(name) => name.to_string(),
                    None => {
                        if unknown.insert(id) {
                            tracing::warn!(id, "UnknownStructureId: label not in structure table");
                        }
                        format!("unknown structure {id}")
                    }
                };
                StructureVolume {
                    id,
                    name,
                    hemisphere,
                    voxel_count,
                    volume_mm3: voxel_count as f64 * self.voxel_volume_mm3,
                }
            })
            .collect();
        Ok(rows)
    }

    /// Aggregate registered volumes on disk and write the table.
    pub fn write_table(
        &self,
        registered_atlas: &Path,
        registered_hemispheres: &Path,
        table: &Path,
    ) -> Result<Vec<StructureVolume>> {
        let labels: Array3<u32> = read_volume(registered_atlas)?;
        let hemispheres: Array3<u32> = read_volume(registered_hemispheres)?;
        let rows = self.aggregate(&labels, &hemispheres)?;
        write_volumes_table(table, &rows)?;
        tracing::info!(rows = rows.len(), path = %table.display(), "Wrote volumes table");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amap_core::Structure;

    const LEFT: u32 = 2;
    const RIGHT: u32 = 1;

    fn structures() -> Structures {
        vec![
            Structure { id: 997, name: "root".into(), parent: None },
            Structure { id: 10, name: "left only".into(), parent: Some(997) },
            Structure { id: 20, name: "split".into(), parent: Some(997) },
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_left_only_and_split_structures() {
        // 4x2x2: x < 2 is left, x >= 2 is right.
        let hemispheres =
            Array3::from_shape_fn((4, 2, 2), |(x, _, _)| if x < 2 { LEFT } else { RIGHT });
        // Structure 10 fills x == 0, structure 20 fills x == 1 and x == 2.
        let labels = Array3::from_shape_fn((4, 2, 2), |(x, _, _)| match x {
            0 => 10,
            1 | 2 => 20,
            _ => 0,
        });
        let structures = structures();
        let voxel_volume = 0.01 * 0.02 * 0.05;
        let rows = VolumeAggregator::new(&structures, LEFT, RIGHT, voxel_volume)
            .aggregate(&labels, &hemispheres)
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].id, rows[0].hemisphere, rows[0].voxel_count), (10, Hemisphere::Left, 4));
        assert_eq!((rows[1].id, rows[1].hemisphere, rows[1].voxel_count), (20, Hemisphere::Left, 4));
        assert_eq!((rows[2].id, rows[2].hemisphere, rows[2].voxel_count), (20, Hemisphere::Right, 4));

        let total: u64 = rows.iter().map(|r| r.voxel_count).sum();
        assert_eq!(total, labels.iter().filter(|l| **l != 0).count() as u64);
        for row in &rows {
            assert!((row.volume_mm3 - row.voxel_count as f64 * voxel_volume).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unknown_ids_get_placeholder() {
        let labels = Array3::from_elem((1, 1, 2), 42);
        let hemispheres = Array3::from_elem((1, 1, 2), 0);
        let structures = structures();
        let rows = VolumeAggregator::new(&structures, LEFT, RIGHT, 1.0)
            .aggregate(&labels, &hemispheres)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "unknown structure 42");
        assert_eq!(rows[0].hemisphere, Hemisphere::Whole);
        assert_eq!(rows[0].voxel_count, 2);
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let structures = structures();
        let result = VolumeAggregator::new(&structures, LEFT, RIGHT, 1.0)
            .aggregate(&Array3::zeros((2, 2, 2)), &Array3::zeros((2, 2, 3)));
        assert!(matches!(result, Err(RegistrationError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_background_only_gives_no_rows() {
        let structures = structures();
        let rows = VolumeAggregator::new(&structures, LEFT, RIGHT, 1.0)
            .aggregate(&Array3::zeros((3, 3, 3)), &Array3::from_elem((3, 3, 3), LEFT))
            .unwrap();
        assert!(rows.is_empty());
    }
}
