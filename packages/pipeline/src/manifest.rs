//! Record of finished per-stream rasters, keyed by event and stream.
//!
//! The mosaicker reads its inputs from here rather than from file-name
//! patterns, so a stray `.tif` in the output folder never leaks into a
//! composite.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wse_grids_event_models::EventType;

use crate::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ManifestEntry {
    event: EventType,
    stream: String,
    path: PathBuf,
}

/// `(event, stream) -> raster path` for every finished raster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<EventType, BTreeMap<String, PathBuf>>,
}

impl Manifest {
    /// An empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the manifest at `path`, dropping entries whose raster no longer
    /// exists. A missing file yields an empty manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&text)?;

        let mut manifest = Self::new();
        for entry in entries {
            if entry.path.exists() {
                manifest.record(entry.event, &entry.stream, entry.path);
            } else {
                log::warn!(
                    "Dropping manifest entry {} / {}: {} is missing",
                    entry.stream,
                    entry.event,
                    entry.path.display()
                );
            }
        }
        Ok(manifest)
    }

    /// Writes the manifest to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let entries: Vec<ManifestEntry> = self
            .entries
            .iter()
            .flat_map(|(event, streams)| {
                streams.iter().map(|(stream, path)| ManifestEntry {
                    event: *event,
                    stream: stream.clone(),
                    path: path.clone(),
                })
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }

    /// Records (or replaces) the raster for `stream` and `event`.
    pub fn record(&mut self, event: EventType, stream: &str, path: PathBuf) {
        self.entries
            .entry(event)
            .or_default()
            .insert(stream.to_string(), path);
    }

    /// Forgets the raster for `stream` and `event`.
    pub fn remove(&mut self, event: EventType, stream: &str) {
        if let Some(streams) = self.entries.get_mut(&event) {
            streams.remove(stream);
        }
    }

    /// Rasters recorded for `event`, ordered by stream name.
    #[must_use]
    pub fn rasters(&self, event: EventType) -> Vec<&Path> {
        self.entries
            .get(&event)
            .map(|streams| streams.values().map(PathBuf::as_path).collect())
            .unwrap_or_default()
    }

    /// Total number of recorded rasters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_prunes_missing_rasters() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.tif");
        fs::write(&present, "x").unwrap();

        let mut manifest = Manifest::new();
        manifest.record(EventType::Pct1, "Clear Creek", present.clone());
        manifest.record(EventType::Pct1, "Mill Branch", dir.path().join("gone.tif"));
        manifest.record(EventType::Pct10, "Clear Creek", present.clone());
        assert_eq!(manifest.len(), 3);

        let path = dir.path().join("manifest.json");
        manifest.save(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.rasters(EventType::Pct1), vec![present.as_path()]);
        assert!(loaded.rasters(EventType::Pct50).is_empty());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join("manifest.json")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn record_replaces_and_remove_forgets() {
        let mut manifest = Manifest::new();
        manifest.record(EventType::Pct1, "Clear Creek", PathBuf::from("/a.tif"));
        manifest.record(EventType::Pct1, "Clear Creek", PathBuf::from("/b.tif"));
        assert_eq!(manifest.rasters(EventType::Pct1), vec![Path::new("/b.tif")]);
        manifest.remove(EventType::Pct1, "Clear Creek");
        assert!(manifest.is_empty());
    }
}
