//! Standalone join of the elevation table onto every cross-section.
//!
//! Unlike the per-stream join, nothing is dropped: evaluation lines keep
//! their elevations and every feature gets one `PCT_*` attribute per event,
//! `null` where the table has no value.

use std::path::Path;

use geojson::JsonValue;
use wse_grids_cross_section_models::LINE_ID_FIELD;
use wse_grids_engine::vector::{self, LayerFeature};
use wse_grids_event_models::EventType;

use crate::join::{index_by_line, read_elevation_table, resolve_elevations};
use crate::{PipelineError, scoped};

/// Counts from one combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombineSummary {
    /// Features written.
    pub features: usize,
    /// Features with at least one matching elevation record.
    pub matched: usize,
}

/// Joins `elevation_table` onto every feature of `cross_sections` and
/// writes the result to `output`, replacing any file there.
///
/// # Errors
///
/// Returns an error if an input cannot be read or the output written.
pub fn combine(
    cross_sections: &Path,
    elevation_table: &Path,
    output: &Path,
) -> Result<CombineSummary, PipelineError> {
    let mut layer = vector::read_layer(cross_sections)?;
    let records = read_elevation_table(elevation_table)?;
    let index = index_by_line(&records);

    let mut summary = CombineSummary::default();
    for feature in &mut layer.features {
        let matching = line_id(feature)
            .as_deref()
            .and_then(|id| index.get(id))
            .map(|records| resolve_elevations(records))
            .unwrap_or_default();
        if !matching.is_empty() {
            summary.matched += 1;
        }
        for event in EventType::all() {
            let value = matching
                .get(event)
                .map_or(JsonValue::Null, |wsel| JsonValue::from(*wsel));
            feature
                .properties
                .insert(event.combined_field_name().to_string(), value);
        }
        summary.features += 1;
    }

    if scoped::remove_if_exists(output)? {
        log::info!("Replacing {}", output.display());
    }
    scoped::write_atomically(output, |path| vector::write_layer(path, &layer))?;

    log::info!(
        "Combined {} of {} cross-sections with elevations into {}",
        summary.matched,
        summary.features,
        output.display()
    );
    Ok(summary)
}

fn line_id(feature: &LayerFeature) -> Option<String> {
    match feature.properties.get(LINE_ID_FIELD)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
