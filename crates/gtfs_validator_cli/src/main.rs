use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use gtfs_shapes_core::{
    GtfsFeed, ShapeToStopMatchingValidator, StopToShapeMatcherSettings, ValidationNotice,
    ValidatorRunner,
};

#[derive(Debug, Parser)]
#[command(name = "gtfs-shapes")]
#[command(about = "Checks that GTFS stops lie along their trips' shapes")]
struct Args {
    /// Directory holding the extracted GTFS files.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Report destination; standard output when omitted.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// JSON file with matcher settings; missing fields keep their defaults.
    #[arg(short = 's', long = "settings")]
    settings: Option<PathBuf>,

    #[arg(long = "max-distance")]
    max_distance: Option<f64>,

    #[arg(short = 'p', long = "pretty")]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    notices: Vec<&'a ValidationNotice>,
    summary: BTreeMap<&'a str, usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = load_settings(args.settings.as_deref(), args.max_distance)?;

    let started_at = Instant::now();
    let feed = GtfsFeed::from_directory(&args.input)
        .with_context(|| format!("load input {}", args.input.display()))?;
    info!(
        "loaded {} trips, {} stop times, {} shape points",
        feed.trips.len(),
        feed.stop_times.len(),
        feed.shapes.as_ref().map_or(0, |shapes| shapes.len())
    );

    let mut runner = ValidatorRunner::new();
    runner.register(ShapeToStopMatchingValidator::new(settings));
    let notices = runner.run(&feed);
    info!(
        "found {} notices in {:.2?}",
        notices.len(),
        started_at.elapsed()
    );

    let report = Report {
        notices: notices.iter().collect(),
        summary: notices.count_by_code(),
    };
    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("write {}", path.display()))?;
            info!("report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn load_settings(
    path: Option<&Path>,
    max_distance: Option<f64>,
) -> anyhow::Result<StopToShapeMatcherSettings> {
    let mut settings = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("read settings {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parse settings {}", path.display()))?
        }
        None => StopToShapeMatcherSettings::default(),
    };
    if let Some(max_distance) = max_distance {
        settings.max_distance_from_stop_to_shape_meters = max_distance;
    }
    settings.validate().context("invalid matcher settings")?;
    Ok(settings)
}
