//! Per-(stream, event) processing state.
//!
//! ```text
//! PENDING -> SURFACE_BUILT -> RASTERIZED -> REACH_CLIPPED -> EXTENT_CLIPPED
//!         -> FLOOR_ENFORCED | SKIPPED_FLOOR -> DONE
//! PENDING -> INSUFFICIENT_DATA
//! ```
//!
//! Only `REACH_CLIPPED`, `EXTENT_CLIPPED` and `DONE` leave an artifact behind,
//! so only those are persisted to the stream's `status.json`. On load every
//! persisted state is checked against the files it promises.

use std::collections::BTreeMap;
use std::fs;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use wse_grids_event_models::EventType;

use crate::workspace::StreamFolder;
use crate::{PipelineError, scoped};

/// Where one stream/event pair stands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    /// Nothing usable on disk.
    Pending,
    /// Surface triangulated.
    SurfaceBuilt,
    /// Surface sampled onto the output grid.
    Rasterized,
    /// `<event>_full.tif` written.
    ReachClipped,
    /// `<event>.tif` written, terrain floor not yet applied.
    ExtentClipped,
    /// Terrain floor applied.
    FloorEnforced,
    /// Terrain floor exempt for this event.
    SkippedFloor,
    /// `<event>.tif` final.
    Done,
    /// Fewer than two cross-sections carry this event.
    InsufficientData,
}

impl StageState {
    /// Whether this state is persisted.
    #[must_use]
    pub const fn is_durable(self) -> bool {
        matches!(self, Self::ReachClipped | Self::ExtentClipped | Self::Done)
    }

    /// Whether `self -> next` is an edge of the stage graph.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::SurfaceBuilt | Self::InsufficientData)
                | (Self::SurfaceBuilt, Self::Rasterized)
                | (Self::Rasterized, Self::ReachClipped)
                | (Self::ReachClipped, Self::ExtentClipped)
                | (Self::ExtentClipped, Self::FloorEnforced | Self::SkippedFloor)
                | (Self::FloorEnforced | Self::SkippedFloor, Self::Done)
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusEntry {
    event: EventType,
    state: StageState,
}

/// The state of every event of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStatus {
    states: BTreeMap<EventType, StageState>,
}

impl StreamStatus {
    /// Recovers the state of `events` for `folder`.
    ///
    /// With a `status.json`, each persisted state is kept only while the
    /// artifact it promises exists. Events it does not mention, or every
    /// event when there is no file, are inferred from the artifacts alone.
    /// Persisted events outside `events` are carried over untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if `status.json` exists but cannot be read.
    pub fn recover(folder: &StreamFolder, events: &[EventType]) -> Result<Self, PipelineError> {
        let path = folder.status_path();
        let persisted: BTreeMap<EventType, StageState> = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
            serde_json::from_str::<Vec<StatusEntry>>(&text)?
                .into_iter()
                .map(|entry| (entry.event, entry.state))
                .collect()
        } else {
            BTreeMap::new()
        };

        let mut states: BTreeMap<EventType, StageState> = persisted
            .iter()
            .filter(|(event, _)| !events.contains(event))
            .map(|(event, state)| (*event, *state))
            .collect();
        states.extend(events.iter().map(|event| {
            let has_final = folder.final_raster_path(*event).exists();
            let has_full = folder.full_raster_path(*event).exists();
            let state = persisted.get(event).map_or_else(
                || infer(has_final, has_full),
                |state| validate(*state, has_final, has_full),
            );
            if let Some(before) = persisted.get(event)
                && *before != state
            {
                log::warn!(
                    "{} {event}: recorded {before} but artifacts say {state}",
                    folder.stream()
                );
            }
            (*event, state)
        }));

        Ok(Self { states })
    }

    /// Current state of `event`.
    #[must_use]
    pub fn state(&self, event: EventType) -> StageState {
        self.states
            .get(&event)
            .copied()
            .unwrap_or(StageState::Pending)
    }

    /// States in event order.
    pub fn iter(&self) -> impl Iterator<Item = (EventType, StageState)> + '_ {
        self.states.iter().map(|(event, state)| (*event, *state))
    }

    /// Moves `event` to `next`, persisting the status when `next` is
    /// durable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTransition`] for an edge the stage
    /// graph does not have, or an error if persisting fails.
    pub fn advance(
        &mut self,
        folder: &StreamFolder,
        event: EventType,
        next: StageState,
    ) -> Result<(), PipelineError> {
        let current = self.state(event);
        if !current.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                event,
                from: current,
                to: next,
            });
        }
        log::trace!("{} {event}: {current} -> {next}", folder.stream());
        self.states.insert(event, next);
        if next.is_durable() {
            self.save(folder)?;
        }
        Ok(())
    }

    /// Writes the durable states to `status.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, folder: &StreamFolder) -> Result<(), PipelineError> {
        let entries: Vec<StatusEntry> = self
            .states
            .iter()
            .filter(|(_, state)| state.is_durable())
            .map(|(event, state)| StatusEntry {
                event: *event,
                state: *state,
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        let path = folder.status_path();
        let temp = scoped::TempArtifact::new(folder.dir().join("status.json.partial"));
        fs::write(temp.path(), json).map_err(|e| PipelineError::io(temp.path(), e))?;
        temp.persist_to(&path)
    }
}

const fn infer(has_final: bool, has_full: bool) -> StageState {
    if has_final {
        StageState::Done
    } else if has_full {
        StageState::ReachClipped
    } else {
        StageState::Pending
    }
}

const fn validate(persisted: StageState, has_final: bool, has_full: bool) -> StageState {
    match persisted {
        StageState::Done | StageState::ExtentClipped if has_final => persisted,
        StageState::Done | StageState::ExtentClipped | StageState::ReachClipped if has_full => {
            StageState::ReachClipped
        }
        _ => StageState::Pending,
    }
}
