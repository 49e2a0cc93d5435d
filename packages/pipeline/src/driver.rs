//! Top-level orchestration: every configured stream through every stage,
//! then one composite per event.

use std::cell::OnceCell;

use geo::MultiPolygon;
use wse_grids_cross_section_models::{CrossSection, ElevationRecord};
use wse_grids_engine::SpatialEngine;
use wse_grids_engine::vector::{self, FeatureLayer};
use wse_grids_event_models::EventType;

use crate::flood_extent::{FloodExtents, ensure_flood_extents};
use crate::manifest::Manifest;
use crate::mosaic::mosaic_event;
use crate::progress::ProgressCallback;
use crate::state::{StageState, StreamStatus};
use crate::summary::{EventOutcome, RunSummary, StreamSummary};
use crate::terrain::{Terrain, enforce_floor};
use crate::workspace::{StreamFolder, Workspace};
use crate::{
    PipelineError, ProcessingContext, RunConfig, boundary, cross_sections, extent_clip, join,
    scoped, surface,
};

/// Recovered states of one stream, in configured event order.
pub type StreamStates = (String, Vec<(EventType, StageState)>);

/// Shared inputs, each read on first use.
struct Inputs<'a> {
    config: &'a RunConfig,
    cross_sections: OnceCell<FeatureLayer>,
    elevations: OnceCell<Vec<ElevationRecord>>,
}

impl<'a> Inputs<'a> {
    const fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            cross_sections: OnceCell::new(),
            elevations: OnceCell::new(),
        }
    }

    fn cross_sections(&self) -> Result<&FeatureLayer, PipelineError> {
        if let Some(layer) = self.cross_sections.get() {
            return Ok(layer);
        }
        log::info!(
            "Loading cross-sections from {}",
            self.config.cross_sections.display()
        );
        let layer = vector::read_layer(&self.config.cross_sections)?;
        Ok(self.cross_sections.get_or_init(|| layer))
    }

    fn elevations(&self) -> Result<&[ElevationRecord], PipelineError> {
        if let Some(records) = self.elevations.get() {
            return Ok(records);
        }
        let records = join::read_elevation_table(&self.config.elevation_table)?;
        Ok(self.elevations.get_or_init(|| records))
    }

    /// Configured streams, or every stream of the cross-section layer.
    fn streams(&self) -> Result<Vec<String>, PipelineError> {
        if !self.config.streams.is_empty() {
            return Ok(self.config.streams.clone());
        }
        let names = cross_sections::stream_names(self.cross_sections()?);
        log::info!("No streams configured; processing all {}", names.len());
        Ok(names)
    }
}

/// Read-only state shared by every event of every stream.
struct EventStages<'a> {
    extents: &'a FloodExtents,
    terrain: &'a Terrain,
}

/// Runs the whole pipeline for `config`.
///
/// Per-stream and per-event failures are recorded in the returned summary
/// and never stop the run.
///
/// # Errors
///
/// Returns an error only for run-wide problems: an invalid configuration,
/// an unreadable terrain header or flood-hazard layer, or a manifest that
/// cannot be read or written.
pub fn run(
    config: &RunConfig,
    engine: &dyn SpatialEngine,
    progress: &dyn ProgressCallback,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let events = config.event_types()?;

    let workspace = Workspace::new(&config.output_folder);
    workspace.ensure_root()?;

    let spatial_ref = config.spatial_ref();
    let terrain = Terrain::new(&config.terrain);
    let ctx = ProcessingContext {
        engine,
        spatial_ref,
        cell_size: config.cell_size,
        snap: Some(terrain.snap(&spatial_ref)?),
        keep_intermediate: config.keep_intermediate,
    };
    log::debug!("Processing context: {ctx:?}");

    let extents = ensure_flood_extents(&workspace, &config.flood_hazard, &ctx)?;
    let stages = EventStages {
        extents: &extents,
        terrain: &terrain,
    };

    let inputs = Inputs::new(config);
    let streams = inputs.streams()?;
    let manifest_path = workspace.manifest_path();
    let mut manifest = Manifest::load(&manifest_path)?;
    let mut summary = RunSummary::default();

    progress.set_total(streams.len() as u64);
    for (index, stream) in streams.iter().enumerate() {
        progress.set_message(format!("Stream {stream}"));
        log::info!("Processing {stream} ({}/{})", index + 1, streams.len());

        let folder = workspace.stream(stream);
        let stream_summary =
            match process_stream(&folder, &events, &inputs, &stages, &mut manifest, &ctx) {
                Ok(outcomes) => StreamSummary {
                    stream: stream.clone(),
                    events: outcomes,
                    failure: None,
                },
                Err(e) => {
                    log::error!("Stream {stream} failed: {e}");
                    StreamSummary {
                        stream: stream.clone(),
                        events: Vec::new(),
                        failure: Some(e.to_string()),
                    }
                }
            };
        summary.streams.push(stream_summary);
        manifest.save(&manifest_path)?;
        progress.inc(1);
    }

    if config.mosaic {
        for event in &events {
            progress.set_message(format!("Mosaic {event}"));
            match mosaic_event(&workspace, &manifest, *event, &ctx) {
                Ok(Some(path)) => {
                    log::info!("Wrote {event} composite to {}", path.display());
                    summary.mosaicked.push(*event);
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Mosaic for {event} failed: {e}");
                    summary.mosaic_failures.push((*event, e.to_string()));
                }
            }
        }
    } else {
        log::info!("Mosaicking disabled");
    }

    progress.finish(format!(
        "{} rasters from {} streams",
        summary.count(EventOutcome::has_raster),
        summary.streams.len()
    ));
    Ok(summary)
}

/// Recovers the state of every configured stream and event without
/// touching any output.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the stream list must
/// come from an unreadable cross-section layer, or a status file is
/// unreadable.
pub fn recover_status(config: &RunConfig) -> Result<Vec<StreamStates>, PipelineError> {
    config.validate()?;
    let events = config.event_types()?;
    let workspace = Workspace::new(&config.output_folder);
    let inputs = Inputs::new(config);

    inputs
        .streams()?
        .into_iter()
        .map(|stream| {
            let status = StreamStatus::recover(&workspace.stream(&stream), &events)?;
            let states: Vec<_> = events.iter().map(|e| (*e, status.state(*e))).collect();
            Ok::<_, PipelineError>((stream, states))
        })
        .collect()
}

fn process_stream(
    folder: &StreamFolder,
    events: &[EventType],
    inputs: &Inputs<'_>,
    stages: &EventStages<'_>,
    manifest: &mut Manifest,
    ctx: &ProcessingContext<'_>,
) -> Result<Vec<(EventType, EventOutcome)>, PipelineError> {
    folder.ensure()?;
    let cross_sections = stream_cross_sections(folder, inputs, ctx)?;
    let boundary = boundary::ensure_boundary(folder, &cross_sections, ctx)?;
    let mut status = StreamStatus::recover(folder, events)?;

    let mut outcomes = Vec::with_capacity(events.len());
    for event in events {
        let outcome = process_event(
            folder,
            &cross_sections,
            boundary.as_ref(),
            *event,
            &mut status,
            stages,
            ctx,
        )
        .unwrap_or_else(|e| {
            log::error!("{event} for {} failed: {e}", folder.stream());
            EventOutcome::Failed(e.to_string())
        });

        if outcome.has_raster() {
            manifest.record(*event, folder.stream(), folder.final_raster_path(*event));
        } else {
            manifest.remove(*event, folder.stream());
        }
        outcomes.push((*event, outcome));
    }
    Ok(outcomes)
}

/// The stream's joined cross-sections, from `xs_elev` when it exists.
fn stream_cross_sections(
    folder: &StreamFolder,
    inputs: &Inputs<'_>,
    ctx: &ProcessingContext<'_>,
) -> Result<Vec<CrossSection>, PipelineError> {
    let path = folder.xs_elev_path();
    if path.exists() {
        log::info!("Cross-sections for {} already joined", folder.stream());
        return Ok(cross_sections::from_layer(&vector::read_layer(&path)?));
    }

    let prepared = cross_sections::prepare(inputs.cross_sections()?, folder.stream(), ctx)?;
    if prepared.is_empty() {
        log::warn!("No cross-sections found for {}", folder.stream());
    }
    let (joined, stats) = join::join_elevations(prepared, inputs.elevations()?);
    log::info!(
        "Joined elevations onto {} cross-sections of {} ({} dropped as evaluation lines)",
        stats.matched,
        folder.stream(),
        stats.dropped
    );

    let layer = cross_sections::to_layer(&joined, ctx);
    scoped::write_atomically(&path, |p| vector::write_layer(p, &layer))?;
    Ok(joined)
}

/// Drives one stream/event pair from its recovered state to `DONE`.
fn process_event(
    folder: &StreamFolder,
    cross_sections: &[CrossSection],
    boundary: Option<&MultiPolygon<f64>>,
    event: EventType,
    status: &mut StreamStatus,
    stages: &EventStages<'_>,
    ctx: &ProcessingContext<'_>,
) -> Result<EventOutcome, PipelineError> {
    let mut progressed = false;
    loop {
        match status.state(event) {
            StageState::Done if progressed => return Ok(EventOutcome::Completed),
            StageState::Done => {
                log::info!("{event} for {} already exists", folder.stream());
                return Ok(EventOutcome::AlreadyComplete);
            }
            StageState::InsufficientData => return Ok(EventOutcome::InsufficientData),
            StageState::Pending => {
                if let Some(outcome) =
                    build_reach_raster(folder, cross_sections, boundary, event, status, ctx)?
                {
                    return Ok(outcome);
                }
            }
            StageState::ReachClipped => {
                if !extent_clip::clip_to_flood_extent(folder, event, stages.extents, ctx)? {
                    return Ok(EventOutcome::MissingPrerequisite);
                }
                status.advance(folder, event, StageState::ExtentClipped)?;
                scoped::remove_if_exists(&folder.full_raster_path(event))?;
            }
            StageState::ExtentClipped => {
                if event.enforces_terrain_floor() {
                    enforce_floor(folder, event, stages.terrain, ctx)?;
                    status.advance(folder, event, StageState::FloorEnforced)?;
                } else {
                    log::debug!("{event} is exempt from the terrain floor");
                    status.advance(folder, event, StageState::SkippedFloor)?;
                }
            }
            StageState::FloorEnforced | StageState::SkippedFloor => {
                status.advance(folder, event, StageState::Done)?;
            }
            // Only reachable inside `build_reach_raster`, which always
            // leaves the pair in a durable or terminal state on success.
            state @ (StageState::SurfaceBuilt | StageState::Rasterized) => {
                return Err(PipelineError::InvalidTransition {
                    event,
                    from: state,
                    to: StageState::ReachClipped,
                });
            }
        }
        progressed = true;
    }
}

/// `PENDING` through `REACH_CLIPPED`. The surface and the unclipped raster
/// never outlive this call.
///
/// Returns the final outcome when the pair cannot go further.
fn build_reach_raster(
    folder: &StreamFolder,
    cross_sections: &[CrossSection],
    boundary: Option<&MultiPolygon<f64>>,
    event: EventType,
    status: &mut StreamStatus,
    ctx: &ProcessingContext<'_>,
) -> Result<Option<EventOutcome>, PipelineError> {
    let Some(tin) = surface::build_surface(folder, cross_sections, event, ctx)? else {
        status.advance(folder, event, StageState::InsufficientData)?;
        return Ok(Some(EventOutcome::InsufficientData));
    };
    status.advance(folder, event, StageState::SurfaceBuilt)?;

    let raster = surface::rasterize_surface(folder, &tin.value, event, ctx)?;
    drop(tin.release(ctx));
    status.advance(folder, event, StageState::Rasterized)?;

    let Some(boundary) = boundary else {
        log::info!("No boundary for {}; skipping {event}", folder.stream());
        return Ok(Some(EventOutcome::MissingPrerequisite));
    };
    surface::clip_to_reach(folder, &raster.value, boundary, event, ctx)?;
    drop(raster.release(ctx));
    status.advance(folder, event, StageState::ReachClipped)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use geo::{
        CoordsIter, Geometry, MultiLineString, Polygon, Rect, coord, line_string, point,
    };
    use geojson::{JsonObject, JsonValue};
    use wse_grids_engine::vector::LayerFeature;
    use wse_grids_engine::{
        Breakline, CellMask, CellPredicate, EngineError, GeoEngine, GridSnap, LinearUnit,
        MosaicMethod, Raster, SpatialRef, Tin, crs, geotiff,
    };

    use super::*;
    use crate::config::SpatialReferenceConfig;
    use crate::progress::NullProgress;

    const STATE_PLANE: SpatialRef = SpatialRef::new(2236, LinearUnit::Foot);

    fn cross_section(stream: &str, line_id: &str, station: f64, x: f64) -> LayerFeature {
        line_feature(stream, line_id, station, (x, 0.0), (x, 100.0))
    }

    fn line_feature(
        stream: &str,
        line_id: &str,
        station: f64,
        start: (f64, f64),
        end: (f64, f64),
    ) -> LayerFeature {
        let mut properties = JsonObject::new();
        properties.insert("XS_LN_ID".to_string(), JsonValue::from(line_id));
        properties.insert("WTR_NM".to_string(), JsonValue::from(stream));
        properties.insert("STREAM_STN".to_string(), JsonValue::from(station));
        LayerFeature {
            geometry: Geometry::MultiLineString(MultiLineString::new(vec![line_string![
                (x: start.0, y: start.1),
                (x: end.0, y: end.1)
            ]])),
            properties,
        }
    }

    fn ae_zone(rect: Rect<f64>) -> LayerFeature {
        let mut zone = JsonObject::new();
        zone.insert("FLD_ZONE".to_string(), JsonValue::from("AE"));
        LayerFeature {
            geometry: Geometry::Polygon(rect.to_polygon()),
            properties: zone,
        }
    }

    /// Three cross-sections at x = 100/200/300 (the middle one without a 1%
    /// elevation), an AE zone over everything, and a flat terrain at 90 with
    /// a 150 ridge under x in [100, 150).
    fn clear_creek(dir: &Path) -> RunConfig {
        let mut xs = FeatureLayer::new(STATE_PLANE);
        xs.features = vec![
            cross_section("Clear Creek", "XS-1", 1000.0, 100.0),
            cross_section("Clear Creek", "XS-2", 1100.0, 200.0),
            cross_section("Clear Creek", "XS-3", 1200.0, 300.0),
        ];
        vector::write_layer(&dir.join("xs.geojson"), &xs).unwrap();

        let mut hazard = FeatureLayer::new(STATE_PLANE);
        hazard.features.push(ae_zone(Rect::new(
            coord! { x: -100.0, y: -100.0 },
            coord! { x: 1200.0, y: 300.0 },
        )));
        vector::write_layer(&dir.join("hazard.geojson"), &hazard).unwrap();

        std::fs::write(
            dir.join("elevations.csv"),
            "XS_LN_ID,EVENT_TYP,WSEL,EVAL_LN\n\
             XS-1,1 Percent Chance,101.2,F\n\
             XS-3,1 Percent Chance,103.5,F\n\
             XS-1,10pct,99.0,F\n\
             XS-3,10pct,100.0,F\n\
             MB-1,1 Percent Chance,101.0,F\n\
             MB-2,1 Percent Chance,104.0,F\n\
             MB-1,10pct,99.5,F\n\
             MB-2,10pct,100.5,F\n",
        )
        .unwrap();

        let mut dem = vec![90.0_f32; 120 * 20];
        for row in 0..20 {
            for col in 10..15 {
                dem[row * 120 + col] = 150.0;
            }
        }
        let dem = Raster::from_values(0.0, 200.0, 10.0, 120, 20, STATE_PLANE, dem).unwrap();
        geotiff::write_raster(&dir.join("dem.tif"), &dem).unwrap();

        RunConfig {
            cross_sections: dir.join("xs.geojson"),
            flood_hazard: dir.join("hazard.geojson"),
            elevation_table: dir.join("elevations.csv"),
            terrain: dir.join("dem.tif"),
            output_folder: dir.join("wse"),
            streams: vec!["Clear Creek".to_string()],
            events: vec!["01pct".to_string(), "10pct".to_string(), "50pct".to_string()],
            cell_size: 10.0,
            spatial_reference: SpatialReferenceConfig {
                epsg: 2236,
                unit: Some(LinearUnit::Foot),
            },
            mosaic: true,
            keep_intermediate: false,
        }
    }

    #[test]
    fn clear_creek_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = clear_creek(dir.path());
        let engine = GeoEngine::new();

        let summary = run(&config, &engine, &NullProgress).unwrap();
        assert!(summary.is_success(), "{summary:?}");

        let stream = summary.stream("Clear Creek").unwrap();
        assert_eq!(stream.outcome(EventType::Pct1), Some(&EventOutcome::Completed));
        assert_eq!(stream.outcome(EventType::Pct10), Some(&EventOutcome::Completed));
        assert_eq!(
            stream.outcome(EventType::Pct50),
            Some(&EventOutcome::InsufficientData)
        );

        let folder = Workspace::new(&config.output_folder).stream("Clear Creek");

        // 1%: exempt from the floor, every cell of the 200 x 100 reach kept.
        let pct1 = geotiff::read_raster(&folder.final_raster_path(EventType::Pct1)).unwrap();
        assert_eq!(pct1.data_cell_count(), 200);
        let at_195 = pct1.value_at(coord! { x: 195.0, y: 50.0 }).unwrap();
        assert!((f64::from(at_195) - 102.2925).abs() < 1e-3, "{at_195}");

        // 10%: the five columns over the ridge fall below terrain.
        let pct10 = geotiff::read_raster(&folder.final_raster_path(EventType::Pct10)).unwrap();
        assert_eq!(pct10.data_cell_count(), 150);
        assert_eq!(pct10.value_at(coord! { x: 145.0, y: 50.0 }), None);
        assert!(pct10.value_at(coord! { x: 155.0, y: 50.0 }).is_some());

        assert!(!folder.final_raster_path(EventType::Pct50).exists());
        for event in [EventType::Pct1, EventType::Pct10] {
            assert!(!folder.full_raster_path(event).exists());
            assert!(!folder.temp_raster_path(event).exists());
            assert!(!folder.tin_path(event).exists());
        }
        assert!(folder.xs_elev_path().exists());
        assert!(folder.clipper_path().exists());

        let workspace = Workspace::new(&config.output_folder);
        assert_eq!(summary.mosaicked, vec![EventType::Pct1, EventType::Pct10]);
        let composite = geotiff::read_raster(&workspace.composite_path(EventType::Pct1)).unwrap();
        assert_eq!(composite.data_cell_count(), 200);
        assert!(!workspace.composite_path(EventType::Pct50).exists());
    }

    #[test]
    fn rerun_is_already_complete() {
        let dir = tempfile::tempdir().unwrap();
        let config = clear_creek(dir.path());
        let engine = GeoEngine::new();

        run(&config, &engine, &NullProgress).unwrap();
        let summary = run(&config, &engine, &NullProgress).unwrap();

        let stream = summary.stream("Clear Creek").unwrap();
        assert_eq!(
            stream.outcome(EventType::Pct1),
            Some(&EventOutcome::AlreadyComplete)
        );
        assert_eq!(
            stream.outcome(EventType::Pct10),
            Some(&EventOutcome::AlreadyComplete)
        );
        assert_eq!(summary.mosaicked, vec![EventType::Pct1, EventType::Pct10]);
    }

    #[test]
    fn resumes_from_reach_clipped_raster() {
        let dir = tempfile::tempdir().unwrap();
        let config = clear_creek(dir.path());
        let engine = GeoEngine::new();
        run(&config, &engine, &NullProgress).unwrap();

        // Simulate an interruption between the reach clip and the extent clip.
        let folder = Workspace::new(&config.output_folder).stream("Clear Creek");
        let final_path = folder.final_raster_path(EventType::Pct1);
        std::fs::rename(&final_path, folder.full_raster_path(EventType::Pct1)).unwrap();
        std::fs::remove_file(folder.status_path()).unwrap();

        let states = recover_status(&config).unwrap();
        assert_eq!(
            states,
            vec![(
                "Clear Creek".to_string(),
                vec![
                    (EventType::Pct1, StageState::ReachClipped),
                    (EventType::Pct10, StageState::Done),
                    (EventType::Pct50, StageState::Pending),
                ]
            )]
        );

        let summary = run(&config, &engine, &NullProgress).unwrap();
        let stream = summary.stream("Clear Creek").unwrap();
        assert_eq!(stream.outcome(EventType::Pct1), Some(&EventOutcome::Completed));
        assert!(final_path.exists());
        assert!(!folder.full_raster_path(EventType::Pct1).exists());
    }

    #[test]
    fn missing_stream_yields_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = clear_creek(dir.path());
        config.streams = vec!["Mill Branch".to_string()];
        config.mosaic = false;
        let engine = GeoEngine::new();

        let summary = run(&config, &engine, &NullProgress).unwrap();
        let stream = summary.stream("Mill Branch").unwrap();
        assert!(stream.failure.is_none());
        assert!(
            stream
                .events
                .iter()
                .all(|(_, outcome)| *outcome == EventOutcome::InsufficientData)
        );
        assert!(summary.mosaicked.is_empty());
    }

    #[test]
    fn unreadable_elevation_table_fails_only_that_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = clear_creek(dir.path());
        config.elevation_table = dir.path().join("missing.csv");
        let engine = GeoEngine::new();

        let summary = run(&config, &engine, &NullProgress).unwrap();
        assert!(!summary.is_success());
        let stream = summary.stream("Clear Creek").unwrap();
        assert!(stream.failure.as_deref().unwrap().contains("missing.csv"));
        assert!(summary.mosaicked.is_empty());
    }

    /// `GeoEngine` with injected failures east of x = 550: hulls over
    /// x in [550, 850) fail, and beyond x = 850 surfaces above 102 fail to
    /// rasterize and reach clips fail.
    struct FaultyEngine(GeoEngine);

    impl FaultyEngine {
        fn fail(operation: &str) -> EngineError {
            EngineError::Conversion {
                message: format!("injected {operation} failure"),
            }
        }
    }

    impl SpatialEngine for FaultyEngine {
        fn project(
            &self,
            geometry: &Geometry<f64>,
            source: &SpatialRef,
            target: &SpatialRef,
        ) -> Result<Geometry<f64>, EngineError> {
            self.0.project(geometry, source, target)
        }

        fn convex_hull(&self, geometries: &[Geometry<f64>]) -> Result<Polygon<f64>, EngineError> {
            if geometries
                .iter()
                .flat_map(CoordsIter::coords_iter)
                .any(|c| (550.0..850.0).contains(&c.x))
            {
                return Err(Self::fail("hull"));
            }
            self.0.convex_hull(geometries)
        }

        fn dissolve(&self, polygons: &[Polygon<f64>]) -> Result<MultiPolygon<f64>, EngineError> {
            self.0.dissolve(polygons)
        }

        fn buffer(
            &self,
            polygon: &MultiPolygon<f64>,
            distance: f64,
        ) -> Result<MultiPolygon<f64>, EngineError> {
            self.0.buffer(polygon, distance)
        }

        fn triangulate(
            &self,
            breaklines: &[Breakline],
            spatial_ref: &SpatialRef,
        ) -> Result<Tin, EngineError> {
            self.0.triangulate(breaklines, spatial_ref)
        }

        fn rasterize(
            &self,
            surface: &Tin,
            cell_size: f64,
            snap: Option<&GridSnap>,
        ) -> Result<Raster, EngineError> {
            let east = surface.extent().is_some_and(|(min_x, ..)| min_x >= 850.0);
            let high = surface.triangles.iter().flatten().any(|v| v[2] > 102.0);
            if east && high {
                return Err(Self::fail("rasterize"));
            }
            self.0.rasterize(surface, cell_size, snap)
        }

        fn mask_extract(
            &self,
            raster: &Raster,
            mask: &MultiPolygon<f64>,
            keep_inside: bool,
        ) -> Result<Raster, EngineError> {
            if keep_inside && raster.origin_x >= 850.0 {
                return Err(Self::fail("mask"));
            }
            self.0.mask_extract(raster, mask, keep_inside)
        }

        fn compare_cellwise(
            &self,
            a: &Raster,
            b: &Raster,
            predicate: CellPredicate,
        ) -> Result<CellMask, EngineError> {
            self.0.compare_cellwise(a, b, predicate)
        }

        fn set_null_where(
            &self,
            raster: &Raster,
            condition: &CellMask,
        ) -> Result<Raster, EngineError> {
            self.0.set_null_where(raster, condition)
        }

        fn mosaic(&self, rasters: &[Raster], method: MosaicMethod) -> Result<Raster, EngineError> {
            self.0.mosaic(rasters, method)
        }
    }

    #[test]
    fn failures_stay_with_their_stream_and_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = clear_creek(dir.path());
        let mut xs = vector::read_layer(&config.cross_sections).unwrap();
        xs.features.extend([
            cross_section("Dry Fork", "DF-1", 1000.0, 600.0),
            cross_section("Dry Fork", "DF-2", 1100.0, 700.0),
            cross_section("Mill Branch", "MB-1", 1000.0, 900.0),
            cross_section("Mill Branch", "MB-2", 1100.0, 1000.0),
        ]);
        vector::write_layer(&config.cross_sections, &xs).unwrap();
        config.streams = vec![
            "Dry Fork".to_string(),
            "Mill Branch".to_string(),
            "Clear Creek".to_string(),
        ];
        config.events = vec!["01pct".to_string(), "10pct".to_string()];
        let engine = FaultyEngine(GeoEngine::new());

        let summary = run(&config, &engine, &NullProgress).unwrap();
        assert!(!summary.is_success());

        // Boundary failure: the whole stream fails, the run goes on.
        let dry_fork = summary.stream("Dry Fork").unwrap();
        assert!(dry_fork.failure.as_deref().unwrap().contains("injected hull"));
        assert!(dry_fork.events.is_empty());

        // Event failures: each event fails on its own.
        let mill_branch = summary.stream("Mill Branch").unwrap();
        assert!(mill_branch.failure.is_none());
        for event in [EventType::Pct1, EventType::Pct10] {
            assert!(matches!(
                mill_branch.outcome(event),
                Some(EventOutcome::Failed(_))
            ));
        }
        let folder = Workspace::new(&config.output_folder).stream("Mill Branch");
        for event in [EventType::Pct1, EventType::Pct10] {
            assert!(!folder.tin_path(event).exists());
            assert!(!folder.temp_raster_path(event).exists());
            assert!(!folder.full_raster_path(event).exists());
            assert!(!folder.final_raster_path(event).exists());
        }

        let clear_creek = summary.stream("Clear Creek").unwrap();
        assert!(clear_creek.failure.is_none());
        assert_eq!(
            clear_creek.outcome(EventType::Pct1),
            Some(&EventOutcome::Completed)
        );
        assert_eq!(
            clear_creek.outcome(EventType::Pct10),
            Some(&EventOutcome::Completed)
        );
        let folder = Workspace::new(&config.output_folder).stream("Clear Creek");
        let pct1 = geotiff::read_raster(&folder.final_raster_path(EventType::Pct1)).unwrap();
        assert_eq!(pct1.data_cell_count(), 200);

        // Only the finished stream reaches the composites.
        assert_eq!(summary.mosaicked, vec![EventType::Pct1, EventType::Pct10]);
        let workspace = Workspace::new(&config.output_folder);
        let composite = geotiff::read_raster(&workspace.composite_path(EventType::Pct1)).unwrap();
        assert_eq!(composite.data_cell_count(), 200);

        // Failed pairs are not checkpointed; a rerun starts them over.
        let states = recover_status(&config).unwrap();
        let (_, mill_branch_states) = states
            .iter()
            .find(|(stream, _)| stream == "Mill Branch")
            .unwrap();
        assert!(
            mill_branch_states
                .iter()
                .all(|(_, state)| *state == StageState::Pending)
        );
    }

    /// Cross-sections and hazard areas as lon/lat `GeoJSON` without a `crs`
    /// member, gridded in NAD83 / Georgia West (US feet).
    #[test]
    fn geographic_inputs_reach_a_state_plane_grid() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();
        let georgia_west = SpatialRef::from_epsg(2240).unwrap();

        let mut xs = FeatureLayer::new(SpatialRef::UNKNOWN);
        xs.features = vec![
            line_feature("Peachtree Creek", "PC-1", 1000.0, (-84.40, 33.745), (-84.40, 33.755)),
            line_feature("Peachtree Creek", "PC-2", 1100.0, (-84.39, 33.745), (-84.39, 33.755)),
        ];
        vector::write_layer(&dir.join("xs.geojson"), &xs).unwrap();

        let lon_lat_box = Rect::new(coord! { x: -84.41, y: 33.74 }, coord! { x: -84.38, y: 33.76 });
        let mut hazard = FeatureLayer::new(SpatialRef::UNKNOWN);
        hazard.features.push(ae_zone(lon_lat_box));
        vector::write_layer(&dir.join("hazard.geojson"), &hazard).unwrap();

        std::fs::write(
            dir.join("elevations.csv"),
            "XS_LN_ID,EVENT_TYP,WSEL,EVAL_LN\n\
             PC-1,1 Percent Chance,101.2,F\n\
             PC-2,1 Percent Chance,103.5,F\n",
        )
        .unwrap();

        // Terrain covering the projected hazard box with a margin.
        let outline = lon_lat_box.to_polygon();
        let corners = outline.exterior().coords_iter().map(|c| {
            let projected = crs::project_geometry(
                &Geometry::Point(point!(x: c.x, y: c.y)),
                &SpatialRef::WGS84,
                &georgia_west,
            )
            .unwrap();
            let Geometry::Point(p) = projected else {
                panic!("expected point");
            };
            (p.x(), p.y())
        });
        let (min_x, min_y, max_x, max_y) = corners.fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x0, y0, x1, y1), (x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        );
        let cell = 50.0;
        let origin_x = (min_x / cell).floor() * cell - 2.0 * cell;
        let origin_y = (max_y / cell).ceil() * cell + 2.0 * cell;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let width = ((max_x - origin_x) / cell).ceil() as usize + 2;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let height = ((origin_y - min_y) / cell).ceil() as usize + 2;
        let dem = Raster::from_values(
            origin_x,
            origin_y,
            cell,
            width,
            height,
            georgia_west,
            vec![90.0; width * height],
        )
        .unwrap();
        geotiff::write_raster(&dir.join("dem.tif"), &dem).unwrap();

        let config = RunConfig {
            cross_sections: dir.join("xs.geojson"),
            flood_hazard: dir.join("hazard.geojson"),
            elevation_table: dir.join("elevations.csv"),
            terrain: dir.join("dem.tif"),
            output_folder: dir.join("wse"),
            streams: vec!["Peachtree Creek".to_string()],
            events: vec!["01pct".to_string()],
            cell_size: cell,
            spatial_reference: SpatialReferenceConfig {
                epsg: 2240,
                unit: None,
            },
            mosaic: true,
            keep_intermediate: false,
        };
        assert_eq!(config.spatial_ref(), SpatialRef::new(2240, LinearUnit::Foot));

        let summary = run(&config, &GeoEngine::new(), &NullProgress).unwrap();
        assert!(summary.is_success(), "{summary:?}");
        let stream = summary.stream("Peachtree Creek").unwrap();
        assert_eq!(stream.outcome(EventType::Pct1), Some(&EventOutcome::Completed));

        // About 3,040 ft between the lines by 3,640 ft along them.
        let folder = Workspace::new(&config.output_folder).stream("Peachtree Creek");
        let pct1 = geotiff::read_raster(&folder.final_raster_path(EventType::Pct1)).unwrap();
        assert_eq!(pct1.spatial_ref, georgia_west);
        let cells = pct1.data_cell_count();
        assert!((3_500..5_500).contains(&cells), "{cells} cells");
        assert!(
            pct1.values()
                .iter()
                .filter(|v| !v.is_nan())
                .all(|v| (101.19..=103.51).contains(v))
        );
        assert_eq!(summary.mosaicked, vec![EventType::Pct1]);
    }
}
