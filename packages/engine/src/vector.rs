//! `GeoJSON` feature layers.
//!
//! A layer is a `FeatureCollection` whose spatial reference travels in the
//! legacy top-level `crs` member. Files without one are WGS 84.

use std::fs;
use std::path::Path;
use std::str::FromStr as _;

use geo::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};

use crate::{EngineError, SpatialRef};

/// One feature: a geometry plus its attribute table row.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerFeature {
    /// Feature geometry.
    pub geometry: Geometry<f64>,
    /// Feature attributes.
    pub properties: JsonObject,
}

impl LayerFeature {
    /// String attribute `name`, `None` if absent or not a string.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(JsonValue::as_str)
    }

    /// Numeric attribute `name`. Numeric strings are accepted.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.properties.get(name)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A feature class held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayer {
    /// Spatial reference of every geometry.
    pub spatial_ref: SpatialRef,
    /// Features in file order.
    pub features: Vec<LayerFeature>,
}

impl FeatureLayer {
    /// An empty layer.
    #[must_use]
    pub const fn new(spatial_ref: SpatialRef) -> Self {
        Self {
            spatial_ref,
            features: Vec::new(),
        }
    }
}

/// Reads the `GeoJSON` layer at `path`.
///
/// Features without a geometry are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not `GeoJSON`, or holds a
/// geometry that cannot be converted.
pub fn read_layer(path: &Path) -> Result<FeatureLayer, EngineError> {
    let text = fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let (features, foreign_members) = match GeoJson::from_str(&text)? {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(feature) => (vec![feature], None),
        GeoJson::Geometry(geometry) => (vec![Feature::from(geometry)], None),
    };

    let crs_name = foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(JsonValue::as_str);
    let spatial_ref = match crs_name {
        Some(name) => SpatialRef::from_crs_name(name).ok_or_else(|| EngineError::Conversion {
            message: format!("{}: unrecognized crs {name:?}", path.display()),
        })?,
        None => SpatialRef::WGS84,
    };

    let mut layer = FeatureLayer::new(spatial_ref);
    for (index, feature) in features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            log::warn!("{}: feature {index} has no geometry; skipping", path.display());
            continue;
        };
        layer.features.push(LayerFeature {
            geometry: Geometry::<f64>::try_from(geometry)?,
            properties: feature.properties.unwrap_or_default(),
        });
    }

    log::debug!(
        "Read {} features ({}) from {}",
        layer.features.len(),
        layer.spatial_ref,
        path.display()
    );

    Ok(layer)
}

/// Writes `layer` to `path` as a `FeatureCollection`, replacing any file
/// there.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_layer(path: &Path, layer: &FeatureLayer) -> Result<(), EngineError> {
    let features = layer
        .features
        .iter()
        .map(|feature| Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &feature.geometry,
            ))),
            id: None,
            properties: Some(feature.properties.clone()),
            foreign_members: None,
        })
        .collect();

    let mut foreign_members = JsonObject::new();
    if layer.spatial_ref.is_known() {
        foreign_members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": layer.spatial_ref.crs_name() },
            }),
        );
    }

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: (!foreign_members.is_empty()).then_some(foreign_members),
    };

    let json = serde_json::to_string_pretty(&collection)?;
    fs::write(path, json).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })
}
