//! Fetch -> decode -> select -> validate -> match -> export
use std::{io::Write, path::PathBuf};

use log::{info, warn};

use crate::{
    config::AnalysisConfig,
    error::PipelineError,
    export::{self, OutputDirectory, Summary},
    fetch, gtfs, map,
    matcher::{self, TransferIndex, TransferMatcher},
    source::{self, TableSource},
    timetable::{ServiceSelection, Timetable},
};

/// Where the GTFS feed comes from.
#[derive(Debug, Clone)]
pub enum FeedLocation {
    /// A zip archive or an extracted directory
    Local(PathBuf),
    /// Downloaded into `data_dir`, reusing an earlier download unless `force`
    Remote {
        url: String,
        data_dir: PathBuf,
        force: bool,
    },
}

impl FeedLocation {
    pub fn fetch(&self) -> Result<PathBuf, PipelineError> {
        match self {
            FeedLocation::Local(path) => Ok(path.clone()),
            FeedLocation::Remote {
                url,
                data_dir,
                force,
            } => fetch::fetch_feed(url, data_dir, *force),
        }
    }
}

/// Decodes and selects the part of the feed the matcher works on.
pub fn load_timetable(
    source: &mut dyn TableSource,
    selection: &ServiceSelection,
) -> Result<Timetable, PipelineError> {
    info!("Loading transit data");
    let feed = gtfs::Feed::read(source)?;
    Timetable::select(&feed, selection)
}

pub fn fetch_timetable(
    location: &FeedLocation,
    selection: &ServiceSelection,
) -> Result<Timetable, PipelineError> {
    let path = location.fetch()?;
    let mut source = source::open_feed(&path)?;
    load_timetable(source.as_mut(), selection)
}

/// One walking distance: match, then write CSV, GeoJSON, summary and map.
pub fn analyze(
    timetable: &Timetable,
    config: &AnalysisConfig,
    out: &OutputDirectory,
) -> Result<TransferIndex, PipelineError> {
    info!(
        "Finding bus stops within {}m of stations",
        config.matching.buffer_metres
    );
    let index = TransferMatcher::new(timetable, config.matching)?.run();
    if index.stations.is_empty() {
        warn!("No ION stations found, the map will be empty");
    } else if index.total_matches() == 0 {
        warn!("No transfer opportunities found in this time window");
    } else {
        info!("Found {} total transfer opportunities", index.total_matches());
    }

    export::write_index(&index, out, "")?;
    let summary = Summary::new(&index, config.selection.service_date);
    out.write("analysis_summary.json", |w| export::write_summary(&summary, w))?;
    let html = map::render_map(&index)?;
    out.write("ion_transfer_map.html", |w| Ok(w.write_all(html.as_bytes())?))?;

    log_summary(&summary);
    Ok(index)
}

/// Several walking distances: per-distance tables plus one interactive map.
pub fn sweep(
    timetable: &Timetable,
    config: &AnalysisConfig,
    distances: &[f64],
    out: &OutputDirectory,
) -> Result<Vec<TransferIndex>, PipelineError> {
    info!("Calculating transfers for {} distances", distances.len());
    if timetable.stations.is_empty() {
        warn!("No ION stations found, the map will be empty");
    }
    let indexes = matcher::sweep(timetable, &config.matching, distances)?;

    for index in &indexes {
        export::write_index(index, out, &format!("_{}m", index.config.buffer_metres))?;
    }
    let html = map::render_sweep_map(&indexes)?;
    out.write("ion_transfer_map_interactive.html", |w| {
        Ok(w.write_all(html.as_bytes())?)
    })?;
    Ok(indexes)
}

fn log_summary(summary: &Summary) {
    info!("Total ION stops analyzed: {}", summary.total_ion_stops);
    info!(
        "Stops with transfer opportunities: {}",
        summary.stops_with_transfers
    );
    info!(
        "Maximum routes at a single stop: {}",
        summary.max_routes_at_stop
    );
    for station in &summary.top_stations {
        info!("  {}: {} routes", station.stop_name, station.bus_xfer_routes);
    }
}
