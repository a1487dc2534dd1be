use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, Utc};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{error::PipelineError, matcher::TransferIndex};

#[derive(Serialize, Debug)]
struct StationRow<'a> {
    stop_id: &'a str,
    stop_name: &'a str,
    stop_lat: f64,
    stop_lon: f64,
    transfer_count: usize,
    bus_xfer_routes: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TopStation {
    pub stop_name: String,
    pub bus_xfer_routes: usize,
}

/// Headline figures of a run, written next to the tabular outputs.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Summary {
    pub analysis_date: String,
    pub service_date: NaiveDate,
    pub time_window: String,
    pub buffer_metres: f64,
    pub max_transfer_minutes: f64,
    pub total_ion_stops: usize,
    pub stops_with_transfers: usize,
    pub max_routes_at_stop: usize,
    pub total_transfer_opportunities: usize,
    pub top_stations: Vec<TopStation>,
}

impl Summary {
    pub fn new(index: &TransferIndex, service_date: NaiveDate) -> Self {
        let window = index.config.window;
        let top_stations = index
            .stations
            .iter()
            .sorted_by(|a, b| b.route_count.cmp(&a.route_count))
            .take(5)
            .map(|s| TopStation {
                stop_name: s.station_name.clone(),
                bus_xfer_routes: s.route_count,
            })
            .collect_vec();

        Summary {
            analysis_date: Utc::now().to_rfc3339(),
            service_date,
            time_window: format!("{} - {}", window.start, window.end),
            buffer_metres: index.config.buffer_metres,
            max_transfer_minutes: index.config.max_transfer_minutes,
            total_ion_stops: index.stations.len(),
            stops_with_transfers: index
                .stations
                .iter()
                .filter(|s| s.route_count > 0)
                .count(),
            max_routes_at_stop: index.max_route_count(),
            total_transfer_opportunities: index.total_matches(),
            top_stations,
        }
    }
}

/// One row per station
pub fn write_station_csv<W: Write>(index: &TransferIndex, writer: W) -> Result<(), PipelineError> {
    let mut csv = csv::Writer::from_writer(writer);
    for station in &index.stations {
        csv.serialize(StationRow {
            stop_id: &station.station_id,
            stop_name: &station.station_name,
            stop_lat: station.location.y(),
            stop_lon: station.location.x(),
            transfer_count: station.transfer_count,
            bus_xfer_routes: station.route_count,
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// One row per individual match
pub fn write_match_csv<W: Write>(index: &TransferIndex, writer: W) -> Result<(), PipelineError> {
    let mut csv = csv::Writer::from_writer(writer);
    for m in index.stations.iter().flat_map(|s| &s.matches) {
        csv.serialize(m)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn feature_collection(index: &TransferIndex) -> FeatureCollection {
    let features = index
        .stations
        .iter()
        .map(|station| {
            let mut properties = JsonObject::new();
            properties.insert("stop_id".into(), JsonValue::from(station.station_id.clone()));
            properties.insert(
                "stop_name".into(),
                JsonValue::from(station.station_name.clone()),
            );
            properties.insert(
                "transfer_count".into(),
                JsonValue::from(station.transfer_count),
            );
            properties.insert(
                "bus_xfer_routes".into(),
                JsonValue::from(station.route_count),
            );
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::Point(vec![
                    station.location.x(),
                    station.location.y(),
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect_vec();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson<W: Write>(index: &TransferIndex, writer: W) -> Result<(), PipelineError> {
    serde_json::to_writer(writer, &feature_collection(index))?;
    Ok(())
}

pub fn write_summary<W: Write>(summary: &Summary, writer: W) -> Result<(), PipelineError> {
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

/// Where the files of a run are written.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    root: PathBuf,
}

impl OutputDirectory {
    pub fn create(root: &Path) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Opens `name` for writing, runs `write` on it and logs the result.
    pub fn write<F>(&self, name: &str, write: F) -> Result<PathBuf, PipelineError>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<(), PipelineError>,
    {
        let path = self.path(name);
        let mut file = BufWriter::new(File::create(&path)?);
        write(&mut file)?;
        file.flush()?;
        info!("Saved {}", path.display());
        Ok(path)
    }
}

/// Writes the per-station CSV, match CSV and GeoJSON for one index.
/// `suffix` distinguishes the files of a sweep, e.g. `_100m`.
pub fn write_index(
    index: &TransferIndex,
    out: &OutputDirectory,
    suffix: &str,
) -> Result<(), PipelineError> {
    out.write(&format!("ion_transfer_index{suffix}.csv"), |w| {
        write_station_csv(index, w)
    })?;
    out.write(&format!("ion_transfer_matches{suffix}.csv"), |w| {
        write_match_csv(index, w)
    })?;
    out.write(&format!("ion_transfer_index{suffix}.geojson"), |w| {
        write_geojson(index, w)
    })?;
    Ok(())
}
