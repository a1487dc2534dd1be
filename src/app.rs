use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{value_parser, Args, Parser, Subcommand};
use log::info;

use crate::{
    config::{AnalysisConfig, MatchConfig, PeakWindow},
    data::Time,
    error::PipelineError,
    export::OutputDirectory,
    fetch::DEFAULT_GTFS_URL,
    pipeline::{self, FeedLocation},
    timetable::ServiceSelection,
};

/// Analyze ION-bus transfer opportunities in Waterloo Region
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct TransferApp {
    #[command(subcommand)]
    pub op: TransferOperation,
}

#[derive(Debug, Clone, Subcommand)]
pub enum TransferOperation {
    /// Transfer index, summary and map for a single walking distance
    Analyze {
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Walking distance in metres
        #[arg(long, default_value_t = 100.0)]
        buffer: f64,
    },
    /// Transfer indexes and an interactive map for several walking distances
    Sweep {
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Walking distances in metres
        #[arg(long, value_delimiter = ',', default_values_t = [50.0, 100.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0, 500.0])]
        distances: Vec<f64>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ScenarioArgs {
    /// Service date to analyze
    #[arg(long, value_parser = value_parser!(NaiveDate), default_value = "2025-06-10")]
    pub date: NaiveDate,
    /// Start of the peak window
    #[arg(long, default_value = "07:00:00")]
    pub start: Time,
    /// End of the peak window
    #[arg(long, default_value = "09:00:00")]
    pub end: Time,
    /// Max transfer time in minutes
    #[arg(long, default_value_t = 6.0)]
    pub transfer_time: f64,
    /// Route ids whose stops are treated as stations
    #[arg(long = "rail-route", default_values_t = [String::from("301")])]
    pub rail_routes: Vec<String>,
    /// GTFS route_type treated as bus
    #[arg(long, default_value_t = 3)]
    pub bus_route_type: u16,
    /// URL to download GTFS data from
    #[arg(long, default_value_t = String::from(DEFAULT_GTFS_URL))]
    pub gtfs_url: String,
    /// Local GTFS zip or directory, skips the download
    #[arg(long)]
    pub gtfs: Option<PathBuf>,
    /// Re-download GTFS data even if a copy exists
    #[arg(long)]
    pub force_download: bool,
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,
    /// TOML file whose values take precedence over these arguments
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ScenarioArgs {
    pub fn analysis_config(&self, buffer_metres: f64) -> Result<AnalysisConfig, PipelineError> {
        let config = AnalysisConfig {
            selection: ServiceSelection {
                service_date: self.date,
                rail_route_ids: self.rail_routes.clone(),
                bus_route_type: self.bus_route_type,
            },
            matching: MatchConfig {
                window: PeakWindow {
                    start: self.start,
                    end: self.end,
                },
                buffer_metres,
                max_transfer_minutes: self.transfer_time,
            },
        };
        match &self.config {
            None => Ok(config),
            Some(path) => {
                info!("Reading configuration from {}", path.display());
                config.overlay_file(path)
            }
        }
    }

    pub fn feed_location(&self) -> FeedLocation {
        match &self.gtfs {
            Some(path) => FeedLocation::Local(path.clone()),
            None => FeedLocation::Remote {
                url: self.gtfs_url.clone(),
                data_dir: self.data_dir.clone(),
                force: self.force_download,
            },
        }
    }
}

impl TransferOperation {
    pub fn run(&self) -> Result<(), PipelineError> {
        match self {
            TransferOperation::Analyze { scenario, buffer } => {
                let config = scenario.analysis_config(*buffer)?;
                // reject bad parameters before touching the network
                config.matching.validate()?;
                log_config(&config);

                let out = OutputDirectory::create(&scenario.output_dir)?;
                let timetable =
                    pipeline::fetch_timetable(&scenario.feed_location(), &config.selection)?;
                pipeline::analyze(&timetable, &config, &out)?;
                info!(
                    "Analysis complete, view the map at {}",
                    out.path("ion_transfer_map.html").display()
                );
            }
            TransferOperation::Sweep {
                scenario,
                distances,
            } => {
                let config = scenario.analysis_config(0.0)?;
                for distance in distances {
                    config.matching.with_buffer(*distance).validate()?;
                }
                log_config(&config);

                let out = OutputDirectory::create(&scenario.output_dir)?;
                let timetable =
                    pipeline::fetch_timetable(&scenario.feed_location(), &config.selection)?;
                pipeline::sweep(&timetable, &config, distances, &out)?;
                info!(
                    "Interactive map saved to {}",
                    out.path("ion_transfer_map_interactive.html").display()
                );
            }
        }
        Ok(())
    }
}

fn log_config(config: &AnalysisConfig) {
    info!("Service date: {}", config.selection.service_date);
    info!(
        "Time window: {} - {}",
        config.matching.window.start, config.matching.window.end
    );
    info!("Walking distance: {}m", config.matching.buffer_metres);
    info!(
        "Max transfer time: {} minutes",
        config.matching.max_transfer_minutes
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::MatchError;

    #[test]
    fn defaults_match_the_morning_peak() {
        let app = TransferApp::try_parse_from(["ion_bus_connect", "analyze"]).unwrap();
        let TransferOperation::Analyze { scenario, buffer } = app.op else {
            panic!("expected analyze");
        };
        let config = scenario.analysis_config(buffer).unwrap();

        assert_eq!(
            config.selection.service_date,
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
        );
        assert_eq!(config.selection.rail_route_ids, vec![String::from("301")]);
        assert_eq!(config.matching.window.start, Time::hms(7, 0, 0));
        assert_eq!(config.matching.window.end, Time::hms(9, 0, 0));
        assert_eq!(config.matching.buffer_metres, 100.0);
        assert_eq!(config.matching.max_transfer_minutes, 6.0);
        assert!(matches!(scenario.feed_location(), FeedLocation::Remote { .. }));
    }

    #[test]
    fn parses_evening_sweep() {
        let app = TransferApp::try_parse_from([
            "ion_bus_connect",
            "sweep",
            "--start",
            "17:00",
            "--end",
            "19:00",
            "--distances",
            "100,200",
            "--gtfs",
            "feeds/grt",
        ])
        .unwrap();
        let TransferOperation::Sweep {
            scenario,
            distances,
        } = app.op
        else {
            panic!("expected sweep");
        };

        assert_eq!(distances, vec![100.0, 200.0]);
        assert_eq!(scenario.start, Time::hms(17, 0, 0));
        assert!(matches!(scenario.feed_location(), FeedLocation::Local(_)));
    }

    #[test]
    fn rejects_malformed_time() {
        assert!(TransferApp::try_parse_from(["ion_bus_connect", "analyze", "--start", "7am"]).is_err());
    }

    #[test]
    fn inverted_window_fails_before_fetching() {
        let app = TransferApp::try_parse_from([
            "ion_bus_connect",
            "analyze",
            "--start",
            "09:00",
            "--end",
            "07:00",
            "--gtfs",
            "does/not/exist.zip",
        ])
        .unwrap();
        assert!(matches!(
            app.op.run(),
            Err(PipelineError::MatchError(MatchError::InvalidConfigError(_)))
        ));
    }
}
