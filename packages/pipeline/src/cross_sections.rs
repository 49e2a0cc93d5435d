//! Cross-section preparation: selecting one stream's lines, projecting them
//! into the working spatial reference and carrying them to and from the
//! stream's `xs_elev` layer.

use geo::{Geometry, MultiLineString};
use geojson::{JsonObject, JsonValue};
use wse_grids_cross_section_models::{
    CrossSection, EventElevations, LINE_ID_FIELD, STATION_FIELD, STREAM_FIELD,
};
use wse_grids_engine::vector::{FeatureLayer, LayerFeature};
use wse_grids_event_models::{EventType, UNSET_ELEVATION};

use crate::{PipelineError, ProcessingContext};

/// Distinct `WTR_NM` values in first-appearance order.
#[must_use]
pub fn stream_names(layer: &FeatureLayer) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for feature in &layer.features {
        if let Some(name) = feature.string(STREAM_FIELD)
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

/// Selects the cross-sections whose `WTR_NM` equals `stream` exactly,
/// projects them into the working spatial reference and resets every event
/// elevation to the unset sentinel.
///
/// Features without a line identifier, a numeric station or line geometry
/// are skipped with a warning.
///
/// # Errors
///
/// Returns an error if projection fails.
pub fn prepare(
    layer: &FeatureLayer,
    stream: &str,
    ctx: &ProcessingContext<'_>,
) -> Result<Vec<CrossSection>, PipelineError> {
    let mut cross_sections = Vec::new();

    for feature in layer
        .features
        .iter()
        .filter(|f| f.string(STREAM_FIELD) == Some(stream))
    {
        let Some(mut cross_section) = from_feature(feature) else {
            continue;
        };
        let projected = ctx.engine.project(
            &Geometry::MultiLineString(cross_section.geometry),
            &layer.spatial_ref,
            &ctx.spatial_ref,
        )?;
        let Some(geometry) = as_lines(projected) else {
            log::warn!(
                "Cross-section {} lost its line geometry in projection; skipping",
                cross_section.line_id
            );
            continue;
        };
        cross_section.geometry = geometry;
        cross_section.elevations = EventElevations::unset();
        cross_sections.push(cross_section);
    }

    log::debug!(
        "Selected {} cross-sections for {stream}",
        cross_sections.len()
    );

    Ok(cross_sections)
}

/// Reads cross-sections (with any `WSE_*` attributes) back from a layer.
///
/// Missing or non-numeric elevation attributes read as the unset sentinel.
#[must_use]
pub fn from_layer(layer: &FeatureLayer) -> Vec<CrossSection> {
    layer.features.iter().filter_map(from_feature).collect()
}

/// Builds the `xs_elev` layer for `cross_sections`.
#[must_use]
pub fn to_layer(cross_sections: &[CrossSection], ctx: &ProcessingContext<'_>) -> FeatureLayer {
    let mut layer = FeatureLayer::new(ctx.spatial_ref);
    layer.features = cross_sections
        .iter()
        .map(|xs| {
            let mut properties = JsonObject::new();
            properties.insert(LINE_ID_FIELD.to_string(), JsonValue::from(xs.line_id.as_str()));
            properties.insert(STREAM_FIELD.to_string(), JsonValue::from(xs.stream.as_str()));
            properties.insert(STATION_FIELD.to_string(), JsonValue::from(xs.station));
            for (event, value) in xs.elevations.iter() {
                properties.insert(event.field_name().to_string(), JsonValue::from(value));
            }
            LayerFeature {
                geometry: Geometry::MultiLineString(xs.geometry.clone()),
                properties,
            }
        })
        .collect();
    layer
}

fn from_feature(feature: &LayerFeature) -> Option<CrossSection> {
    let line_id = match feature.properties.get(LINE_ID_FIELD) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => {
            log::warn!("Cross-section without {LINE_ID_FIELD}; skipping");
            return None;
        }
    };
    let Some(station) = feature.number(STATION_FIELD) else {
        log::warn!("Cross-section {line_id} has no numeric {STATION_FIELD}; skipping");
        return None;
    };
    let Some(geometry) = as_lines(feature.geometry.clone()) else {
        log::warn!("Cross-section {line_id} is not a line; skipping");
        return None;
    };

    let mut elevations = EventElevations::unset();
    for event in EventType::all() {
        let value = feature.number(event.field_name()).unwrap_or(UNSET_ELEVATION);
        elevations.set(*event, value);
    }

    Some(CrossSection {
        line_id,
        stream: feature.string(STREAM_FIELD).unwrap_or_default().to_string(),
        station,
        geometry,
        elevations,
    })
}

fn as_lines(geometry: Geometry<f64>) -> Option<MultiLineString<f64>> {
    match geometry {
        Geometry::LineString(line) => Some(MultiLineString::new(vec![line])),
        Geometry::MultiLineString(lines) => Some(lines),
        Geometry::Line(line) => Some(MultiLineString::new(vec![line.into()])),
        _ => None,
    }
}
