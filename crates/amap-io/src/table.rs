//! Per-structure volume table.

use std::path::Path;

use amap_core::StructureVolume;
use anyhow::{Context, Result};

/// Write rows as `id,name,hemisphere,voxel_count,volume_mm3`.
pub fn write_volumes_table(path: impl AsRef<Path>, rows: &[StructureVolume]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create volumes table {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    // An empty table still gets its header.
    if rows.is_empty() {
        writer.write_record(["id", "name", "hemisphere", "voxel_count", "volume_mm3"])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_volumes_table(path: impl AsRef<Path>) -> Result<Vec<StructureVolume>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open volumes table {}", path.display()))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<StructureVolume>, _>>()
        .with_context(|| format!("Malformed volumes table {}", path.display()))
}
