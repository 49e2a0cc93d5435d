//! Joining tabular event elevations onto cross-section lines.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use wse_grids_cross_section_models::{CrossSection, ElevationRecord};
use wse_grids_event_models::EventType;

use crate::PipelineError;

/// Reads the elevation table at `path`.
///
/// Rows that fail to parse are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or has no header.
pub fn read_elevation_table(path: &Path) -> Result<Vec<ElevationRecord>, PipelineError> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let records = parse_elevation_table(file)?;
    log::info!(
        "Read {} elevation records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Parses elevation records from any CSV source.
///
/// # Errors
///
/// Returns an error if the header cannot be read.
pub fn parse_elevation_table(reader: impl Read) -> Result<Vec<ElevationRecord>, PipelineError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    csv_reader.headers()?;

    let mut records = Vec::new();
    for (row, result) in csv_reader.deserialize::<ElevationRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping malformed elevation row {}: {e}", row + 1),
        }
    }
    Ok(records)
}

/// Elevation records grouped by exact line identifier, in table order.
#[must_use]
pub fn index_by_line(records: &[ElevationRecord]) -> BTreeMap<&str, Vec<&ElevationRecord>> {
    let mut index: BTreeMap<&str, Vec<&ElevationRecord>> = BTreeMap::new();
    for record in records {
        index.entry(record.line_id.as_str()).or_default().push(record);
    }
    index
}

/// The elevation each event ends up with after applying `records` in order.
///
/// Later records win for the same event; unrecognized event text and empty
/// elevations are ignored.
#[must_use]
pub fn resolve_elevations(records: &[&ElevationRecord]) -> BTreeMap<EventType, f64> {
    let mut resolved = BTreeMap::new();
    for record in records {
        let Some(event) = record.event() else {
            log::debug!(
                "Ignoring unrecognized event {:?} for line {}",
                record.event_type,
                record.line_id
            );
            continue;
        };
        if let Some(wsel) = record.wsel {
            resolved.insert(event, wsel);
        }
    }
    resolved
}

/// Counts from one join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Lines that had at least one matching record.
    pub matched: usize,
    /// Lines dropped as 2D evaluation lines.
    pub dropped: usize,
}

/// Overwrites each cross-section's event elevations with its matching
/// records and drops every cross-section any matching record flags as a 2D
/// evaluation line.
#[must_use]
pub fn join_elevations(
    cross_sections: Vec<CrossSection>,
    records: &[ElevationRecord],
) -> (Vec<CrossSection>, JoinStats) {
    let index = index_by_line(records);
    let mut stats = JoinStats::default();

    let joined = cross_sections
        .into_iter()
        .filter_map(|mut xs| {
            let Some(matching) = index.get(xs.line_id.as_str()) else {
                return Some(xs);
            };
            stats.matched += 1;
            if matching.iter().any(|r| r.is_evaluation_line()) {
                log::debug!("Dropping evaluation line {}", xs.line_id);
                stats.dropped += 1;
                return None;
            }
            for (event, wsel) in resolve_elevations(matching) {
                xs.elevations.set(event, wsel);
            }
            Some(xs)
        })
        .collect();

    (joined, stats)
}
