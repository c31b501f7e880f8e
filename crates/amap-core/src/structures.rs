//! Structure hierarchy and per-structure volume records.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One brain structure of the atlas hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub id: u32,
    pub name: String,
    pub parent: Option<u32>,
}

/// Structure hierarchy keyed by label id.
#[derive(Debug, Clone, Default)]
pub struct Structures {
    by_id: HashMap<u32, Structure>,
}

impl Structures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a structure, replacing any previous entry with the same id.
    pub fn insert(&mut self, structure: Structure) {
        self.by_id.insert(structure.id, structure);
    }

    pub fn get(&self, id: u32) -> Option<&Structure> {
        self.by_id.get(&id)
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(|s| s.name.as_str())
    }

    pub fn parent(&self, id: u32) -> Option<u32> {
        self.by_id.get(&id).and_then(|s| s.parent)
    }

    /// Ancestors of `id` from the direct parent up to the root.
    ///
    /// Stops on a cycle or a parent that is missing from the table.
    pub fn ancestors(&self, id: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if parent == id || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.parent(parent);
        }
        chain
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl FromIterator<Structure> for Structures {
    fn from_iter<I: IntoIterator<Item = Structure>>(iter: I) -> Self {
        let mut structures = Self::new();
        for s in iter {
            structures.insert(s);
        }
        structures
    }
}

/// Hemisphere a volume row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    Left,
    Right,
    /// Voxels whose hemisphere label is neither the left nor the right value.
    Whole,
}

impl Hemisphere {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hemisphere::Left => "left",
            Hemisphere::Right => "right",
            Hemisphere::Whole => "whole",
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the volumes table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureVolume {
    pub id: u32,
    pub name: String,
    pub hemisphere: Hemisphere,
    pub voxel_count: u64,
    pub volume_mm3: f64,
}
