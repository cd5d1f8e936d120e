//! Class schemes: how label names become class indices, how class indices become output pixel
//! values, and which colors those values get in a color mask.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{MaskError, Result};

/// Label name to class index. Labels that are not present are never drawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelIndexMap(HashMap<String, u8>);

impl LabelIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, index: u8) {
        self.0.insert(label.into(), index);
    }

    pub fn get(&self, label: &str) -> Option<u8> {
        self.0.get(label).copied()
    }

    /// Largest class index a rasterized mask can contain (0 for an empty map).
    pub fn max_index(&self) -> u8 {
        self.0.values().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u8)> for LabelIndexMap {
    fn from_iter<I: IntoIterator<Item = (S, u8)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Ordered `(class index -> output value)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(u8, u8)>", into = "Vec<(u8, u8)>")]
pub struct RemapTable {
    entries: Vec<(u8, u8)>,
    lookup: Vec<Option<u8>>,
}

impl RemapTable {
    pub fn new(entries: Vec<(u8, u8)>) -> Result<Self> {
        let mut lookup = vec![None; 256];
        for &(source, output) in &entries {
            if lookup[source as usize].replace(output).is_some() {
                return Err(MaskError::InvalidScheme(format!(
                    "class index {} is remapped more than once",
                    source
                )));
            }
        }
        Ok(Self { entries, lookup })
    }

    // Built-in tables have unique sources, so no duplicate check is needed
    fn preset(entries: &[(u8, u8)]) -> Self {
        let mut lookup = vec![None; 256];
        for &(source, output) in entries {
            lookup[source as usize] = Some(output);
        }
        Self {
            entries: entries.to_vec(),
            lookup,
        }
    }

    #[inline]
    pub fn lookup(&self, index: u8) -> Option<u8> {
        self.lookup[index as usize]
    }

    pub fn entries(&self) -> &[(u8, u8)] {
        &self.entries
    }

    /// Check that every index the label map can produce has an output value.
    pub fn validate_for(&self, labels: &LabelIndexMap) -> Result<()> {
        match (0..=labels.max_index()).find(|&index| self.lookup(index).is_none()) {
            Some(index) => Err(MaskError::UnmappedIndex(index)),
            None => Ok(()),
        }
    }
}

impl TryFrom<Vec<(u8, u8)>> for RemapTable {
    type Error = MaskError;

    fn try_from(entries: Vec<(u8, u8)>) -> Result<Self> {
        Self::new(entries)
    }
}

impl From<RemapTable> for Vec<(u8, u8)> {
    fn from(table: RemapTable) -> Self {
        table.entries
    }
}

/// Colors indexed directly by output value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette(Vec<[u8; 3]>);

impl Palette {
    pub fn new(colors: Vec<[u8; 3]>) -> Self {
        Self(colors)
    }

    #[inline]
    pub fn color(&self, value: u8) -> Result<[u8; 3]> {
        self.0
            .get(value as usize)
            .copied()
            .ok_or(MaskError::PaletteIndex {
                value,
                len: self.0.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every value the remap table can emit has a color.
    pub fn validate_for(&self, remap: &RemapTable) -> Result<()> {
        for &(_, output) in remap.entries() {
            self.color(output)?;
        }
        Ok(())
    }
}

/// Everything that decides the pixel values of a mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassScheme {
    pub labels: LabelIndexMap,
    pub remap: RemapTable,
    #[serde(default)]
    pub palette: Palette,
    /// Output value that must be present for a mask to be exported
    #[serde(default)]
    pub sentinel: Option<u8>,
    /// Expand qualifying masks to RGB through the palette
    #[serde(default)]
    pub color: bool,
}

const SIX_CLASS_PALETTE: [[u8; 3]; 6] = [
    [0, 0, 0],
    [64, 64, 64],
    [129, 129, 129],
    [64, 255, 64],
    [255, 255, 255],
    [255, 129, 64],
];

impl ClassScheme {
    /// Six classes with class 5 as the sentinel, exported as color masks.
    pub fn six_class() -> Self {
        let labels = [("gum", 0), ("0", 1), ("2", 2), ("3", 3), ("4", 4), ("5", 5)]
            .into_iter()
            .collect();
        Self {
            labels,
            remap: RemapTable::preset(&[(0, 2), (1, 0), (2, 4), (3, 3), (4, 1), (5, 5)]),
            palette: Palette::new(SIX_CLASS_PALETTE.to_vec()),
            sentinel: Some(5),
            color: true,
        }
    }

    /// Five classes without a sentinel, exported as single-channel masks.
    pub fn five_class() -> Self {
        let labels = [("gum", 0), ("0", 1), ("2", 2), ("3", 3), ("4", 4)]
            .into_iter()
            .collect();
        Self {
            labels,
            remap: RemapTable::preset(&[(0, 2), (1, 0), (2, 4), (3, 3), (4, 1)]),
            palette: Palette::new(SIX_CLASS_PALETTE[..5].to_vec()),
            sentinel: None,
            color: false,
        }
    }

    /// Load a scheme from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            MaskError::InvalidScheme(format!("cannot open {}: {}", path.display(), e))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            MaskError::InvalidScheme(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Run the once-per-job consistency checks.
    pub fn validate(&self) -> Result<()> {
        self.remap.validate_for(&self.labels)?;
        if self.color {
            self.palette.validate_for(&self.remap)?;
        }
        if let Some(sentinel) = self.sentinel {
            if !self.remap.entries().iter().any(|&(_, out)| out == sentinel) {
                log::warn!(
                    "Sentinel value {} is never produced by the remap table; no mask will qualify",
                    sentinel
                );
            }
        }
        Ok(())
    }
}
