#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! WSE grid synthesis pipeline.
//!
//! Turns surveyed cross-section lines plus a tabular elevation table into
//! one water-surface elevation grid per stream and flood event, then
//! max-composites the per-stream grids into one grid per event.
//!
//! Per stream the stages run strictly in order: folder, cross-section
//! preparation, elevation join, reach boundary, and then for each event
//! surface, raster, reach clip, flood-extent clip and terrain floor. Every
//! stage is idempotent; [`state`] records durable checkpoints so an
//! interrupted run resumes where it stopped.

pub mod boundary;
pub mod combine;
pub mod config;
pub mod cross_sections;
pub mod driver;
pub mod extent_clip;
pub mod flood_extent;
pub mod join;
pub mod manifest;
pub mod mosaic;
pub mod progress;
pub mod scoped;
pub mod state;
pub mod summary;
pub mod surface;
pub mod terrain;
pub mod workspace;

use thiserror::Error;
use wse_grids_engine::{EngineError, GridSnap, SpatialEngine, SpatialRef};
use wse_grids_event_models::{EventType, UnknownEventError};

pub use config::RunConfig;
pub use driver::{recover_status, run};
pub use state::StageState;
pub use summary::{EventOutcome, RunSummary, StreamSummary};

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A spatial engine operation or spatial file I/O failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The elevation table could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The run configuration could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A JSON state file could not be read or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// An event name in the configuration is not recognized.
    #[error(transparent)]
    UnknownEvent(#[from] UnknownEventError),

    /// A stream/event attempted a state change the stage graph forbids.
    #[error("Invalid state transition for {event}: {from} -> {to}")]
    InvalidTransition {
        /// Event being processed.
        event: EventType,
        /// State before the change.
        from: StageState,
        /// Requested state.
        to: StageState,
    },
}

impl PipelineError {
    /// Wraps an I/O error with the path it happened at.
    #[must_use]
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Run-wide settings threaded into every stage.
#[derive(Clone, Copy)]
pub struct ProcessingContext<'a> {
    /// Engine performing every spatial operation.
    pub engine: &'a dyn SpatialEngine,
    /// Working spatial reference of all outputs.
    pub spatial_ref: SpatialRef,
    /// Output cell size in working-reference linear units.
    pub cell_size: f64,
    /// Grid alignment taken from the terrain raster.
    pub snap: Option<GridSnap>,
    /// Keep transient artifacts (TINs, unclipped rasters) on disk.
    pub keep_intermediate: bool,
}

impl std::fmt::Debug for ProcessingContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("spatial_ref", &self.spatial_ref)
            .field("cell_size", &self.cell_size)
            .field("snap", &self.snap)
            .field("keep_intermediate", &self.keep_intermediate)
            .finish_non_exhaustive()
    }
}
