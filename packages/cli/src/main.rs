#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for WSE grid synthesis.
//!
//! `run` drives the full pipeline from a TOML configuration, `combine`
//! joins the elevation table onto every cross-section, `status` shows where
//! each stream/event stands without touching outputs, and `events` lists
//! the recognized flood events.
//!
//! Uses `indicatif-log-bridge` (via [`progress::init_logger`]) to route
//! `log` output through `indicatif::MultiProgress` so that log lines and
//! progress bars never fight for the terminal.

mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wse_grids_engine::GeoEngine;
use wse_grids_event_models::EventType;
use wse_grids_pipeline::{RunConfig, RunSummary, combine, recover_status, run};

use crate::progress::IndicatifProgress;

#[derive(Parser)]
#[command(name = "wse_grids", about = "Water surface elevation grid synthesis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build WSE grids for every configured stream and event
    Run {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Build the per-event composites (overrides the configuration)
        #[arg(long, conflicts_with = "no_mosaic")]
        mosaic: bool,
        /// Skip the per-event composites (overrides the configuration)
        #[arg(long)]
        no_mosaic: bool,
        /// Output cell size (overrides the configuration)
        #[arg(long)]
        cell_size: Option<f64>,
        /// Keep TINs and unclipped rasters
        #[arg(long)]
        keep_intermediate: bool,
    },
    /// Join the elevation table onto all cross-sections as `PCT_*` fields
    Combine {
        /// Cross-section lines (`GeoJSON`)
        #[arg(long)]
        cross_sections: PathBuf,
        /// Cross-section elevation table (CSV)
        #[arg(long)]
        elevation_table: PathBuf,
        /// Output layer (`GeoJSON`), replaced if present
        #[arg(long)]
        output: PathBuf,
    },
    /// Show the recovered state of every stream and event
    Status {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,
    },
    /// List recognized events with their codes and synonyms
    Events,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            mosaic,
            no_mosaic,
            cell_size,
            keep_intermediate,
        } => {
            let mut config = RunConfig::load(&config)?;
            if mosaic {
                config.mosaic = true;
            } else if no_mosaic {
                config.mosaic = false;
            }
            if let Some(cell_size) = cell_size {
                config.cell_size = cell_size;
            }
            config.keep_intermediate |= keep_intermediate;

            let bar = IndicatifProgress::steps_bar(&multi, "Streams", 0);
            let summary = run(&config, &GeoEngine::new(), bar.as_ref())?;
            print_summary(&summary);
            if !summary.is_success() {
                return Err("one or more streams or events failed".into());
            }
        }
        Commands::Combine {
            cross_sections,
            elevation_table,
            output,
        } => {
            let summary = combine::combine(&cross_sections, &elevation_table, &output)?;
            println!(
                "{} of {} cross-sections matched; wrote {}",
                summary.matched,
                summary.features,
                output.display()
            );
        }
        Commands::Status { config } => {
            let config = RunConfig::load(&config)?;
            for (stream, states) in recover_status(&config)? {
                println!("{stream}");
                for (event, state) in states {
                    println!("  {:<10} {state}", event.code());
                }
            }
        }
        Commands::Events => {
            for event in EventType::all() {
                println!(
                    "{:<10} {:<12} {:<6} {}",
                    event.code(),
                    event.field_name(),
                    event.extent_class().to_string(),
                    event.synonyms().join(", ")
                );
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    for stream in &summary.streams {
        match &stream.failure {
            Some(reason) => println!("{}: failed: {reason}", stream.stream),
            None => {
                println!("{}", stream.stream);
                for (event, outcome) in &stream.events {
                    println!("  {:<10} {outcome}", event.code());
                }
            }
        }
    }

    let mosaicked: Vec<&str> = summary.mosaicked.iter().map(|e| e.code()).collect();
    if !mosaicked.is_empty() {
        println!("Composites: {}", mosaicked.join(", "));
    }
    for (event, reason) in &summary.mosaic_failures {
        println!("Composite {event} failed: {reason}");
    }
}
