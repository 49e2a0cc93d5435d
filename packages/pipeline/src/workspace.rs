//! Output folder layout.
//!
//! ```text
//! <root>/
//!   flooding_1pct.geojson, flooding_0_2pct.geojson, manifest.json
//!   <event>.tif                      composites
//!   <stream>/
//!     xs_elev.geojson, clipper.geojson, status.json
//!     <event>.tin, <event>_temp.tif  transient
//!     <event>_full.tif, <event>.tif
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use wse_grids_event_models::{EventType, ExtentClass};

use crate::PipelineError;

/// Turns a stream name into its folder name: every character that is not
/// ASCII alphanumeric becomes `_`, a leading digit gains a `t` prefix, and
/// the result is lower-cased.
#[must_use]
pub fn normalize_stream_name(name: &str) -> String {
    let mut folder: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if folder.starts_with(|c: char| c.is_ascii_digit()) {
        folder.insert(0, 't');
    }
    folder
}

/// The run's output root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// A workspace rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_root(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.root).map_err(|e| PipelineError::io(&self.root, e))
    }

    /// Folder for `stream`.
    #[must_use]
    pub fn stream(&self, stream: &str) -> StreamFolder {
        StreamFolder {
            stream: stream.to_string(),
            dir: self.root.join(normalize_stream_name(stream)),
        }
    }

    /// Buffered flood-hazard extent for `class`.
    #[must_use]
    pub fn flood_extent_path(&self, class: ExtentClass) -> PathBuf {
        self.root.join(format!("{}.geojson", class.layer_name()))
    }

    /// Manifest of finished per-stream rasters.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Composite raster for `event`.
    #[must_use]
    pub fn composite_path(&self, event: EventType) -> PathBuf {
        self.root.join(format!("{}.tif", event.code()))
    }
}

/// One stream's output folder.
#[derive(Debug, Clone)]
pub struct StreamFolder {
    stream: String,
    dir: PathBuf,
}

impl StreamFolder {
    /// Stream name as given.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Folder path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the folder if needed. Returns whether it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be created.
    pub fn ensure(&self) -> Result<bool, PipelineError> {
        if self.dir.is_dir() {
            log::info!("Folder {} already exists", self.dir.display());
            return Ok(false);
        }
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;
        Ok(true)
    }

    /// Prepared cross-sections with joined elevations.
    #[must_use]
    pub fn xs_elev_path(&self) -> PathBuf {
        self.dir.join("xs_elev.geojson")
    }

    /// Reach boundary.
    #[must_use]
    pub fn clipper_path(&self) -> PathBuf {
        self.dir.join("clipper.geojson")
    }

    /// Persisted stage checkpoints.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.dir.join("status.json")
    }

    /// Transient surface for `event`.
    #[must_use]
    pub fn tin_path(&self, event: EventType) -> PathBuf {
        self.dir.join(format!("{}.tin", event.code()))
    }

    /// Transient unclipped raster for `event`.
    #[must_use]
    pub fn temp_raster_path(&self, event: EventType) -> PathBuf {
        self.dir.join(format!("{}_temp.tif", event.code()))
    }

    /// Raster clipped to the reach boundary.
    #[must_use]
    pub fn full_raster_path(&self, event: EventType) -> PathBuf {
        self.dir.join(format!("{}_full.tif", event.code()))
    }

    /// Final raster for `event`.
    #[must_use]
    pub fn final_raster_path(&self, event: EventType) -> PathBuf {
        self.dir.join(format!("{}.tif", event.code()))
    }
}
