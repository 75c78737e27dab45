use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// Maps each materialized raster file name to its digit label.
// Backed by a BTreeMap so iteration is always in file name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(BTreeMap<String, u8>);

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: String, label: u8) {
        self.0.insert(file_name, label);
    }

    pub fn get(&self, file_name: &str) -> Option<u8> {
        self.0.get(file_name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.0.iter().map(|(name, &label)| (name.as_str(), label))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| PipelineError::Encoding {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|e| PipelineError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| PipelineError::LabelMap {
            path: path.to_path_buf(),
            source,
        })
    }
}

// Deterministic, zero-padded name for the raster of example `index`
pub fn raster_file_name(index: usize) -> String {
    format!("img_{:05}.png", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_file_name() {
        assert_eq!(raster_file_name(0), "img_00000.png");
        assert_eq!(raster_file_name(59999), "img_59999.png");
    }

    #[test]
    fn test_iteration_is_sorted_by_name() {
        let mut map = LabelMap::new();
        map.insert(raster_file_name(2), 7);
        map.insert(raster_file_name(0), 5);
        map.insert(raster_file_name(1), 0);
        let names: Vec<&str> = map.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["img_00000.png", "img_00001.png", "img_00002.png"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        let mut map = LabelMap::new();
        map.insert(raster_file_name(0), 5);
        map.insert(raster_file_name(1), 0);
        map.save(&path).unwrap();

        // Stored as a plain JSON object
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"img_00000.png\": 5"));

        assert_eq!(LabelMap::load(&path).unwrap(), map);
    }

    #[test]
    fn test_load_rejects_non_digit_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"{ "img_00000.png": "five" }"#).unwrap();
        assert!(matches!(
            LabelMap::load(&path),
            Err(PipelineError::LabelMap { .. })
        ));
    }
}
