//! Structure hierarchy table.

use std::path::Path;

use amap_core::{Structure, Structures};
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StructureRecord {
    id: u32,
    name: String,
    #[serde(default)]
    parent_structure_id: Option<u32>,
}

/// Read a structures CSV with `id`, `name` and an optional
/// `parent_structure_id` column. Other columns are ignored; an empty parent
/// marks a root.
pub fn read_structures(path: impl AsRef<Path>) -> Result<Structures> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open structures table {}", path.display()))?;
    let mut structures = Structures::new();
    for (row, record) in reader.deserialize::<StructureRecord>().enumerate() {
        let record = record.with_context(|| {
            format!("Malformed row {} in structures table {}", row + 1, path.display())
        })?;
        structures.insert(Structure {
            id: record.id,
            name: record.name,
            parent: record.parent_structure_id,
        });
    }
    tracing::debug!(count = structures.len(), path = %path.display(), "Read structures");
    Ok(structures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reads_hierarchy_with_extra_columns() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("structures.csv");
        std::fs::write(
            &path,
            "acronym,id,name,structure_id_path,parent_structure_id\n\
             root,997,root,/997/,\n\
             grey,8,Basic cell groups and regions,/997/8/,997\n",
        )?;
        let structures = read_structures(&path)?;
        assert_eq!(structures.len(), 2);
        assert_eq!(structures.name(8), Some("Basic cell groups and regions"));
        assert_eq!(structures.parent(8), Some(997));
        assert_eq!(structures.parent(997), None);
        Ok(())
    }

    #[test]
    fn test_parent_column_is_optional() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("structures.csv");
        std::fs::write(&path, "id,name\n1,one\n2,two\n")?;
        let structures = read_structures(&path)?;
        assert_eq!(structures.name(2), Some("two"));
        assert_eq!(structures.parent(2), None);
        Ok(())
    }

    #[test]
    fn test_bad_id_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("structures.csv");
        std::fs::write(&path, "id,name\nabc,one\n")?;
        assert!(read_structures(&path).is_err());
        Ok(())
    }
}
