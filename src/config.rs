use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{data::Time, error::MatchError, error::PipelineError, timetable::ServiceSelection};

/// The time range in which rail arrivals are considered, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub start: Time,
    pub end: Time,
}

impl PeakWindow {
    pub fn contains(&self, time: Time) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Parameters of a single transfer computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub window: PeakWindow,
    /// Walking distance from a station to a bus stop
    pub buffer_metres: f64,
    /// Longest acceptable wait between arrival and departure
    pub max_transfer_minutes: f64,
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.buffer_metres.is_finite() || self.buffer_metres < 0.0 {
            return Err(MatchError::InvalidConfigError(format!(
                "buffer_metres must be a non-negative number, found {}",
                self.buffer_metres
            )));
        }
        if !self.max_transfer_minutes.is_finite() || self.max_transfer_minutes < 0.0 {
            return Err(MatchError::InvalidConfigError(format!(
                "max_transfer_minutes must be a non-negative number, found {}",
                self.max_transfer_minutes
            )));
        }
        if self.window.end < self.window.start {
            return Err(MatchError::InvalidConfigError(format!(
                "peak window end {} precedes start {}",
                self.window.end, self.window.start
            )));
        }
        Ok(())
    }

    pub fn with_buffer(&self, buffer_metres: f64) -> MatchConfig {
        MatchConfig {
            buffer_metres,
            ..*self
        }
    }

    pub fn max_transfer_seconds(&self) -> f64 {
        self.max_transfer_minutes * 60.0
    }
}

/// Everything a run needs apart from where the feed comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub selection: ServiceSelection,
    pub matching: MatchConfig,
}

impl AnalysisConfig {
    /// Layers a TOML file over `self`; keys present in the file win.
    pub fn overlay_file(&self, path: &Path) -> Result<AnalysisConfig, PipelineError> {
        self.overlay(config::File::from(path).format(config::FileFormat::Toml))
    }

    fn overlay<S>(&self, source: S) -> Result<AnalysisConfig, PipelineError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(self)?)
            .add_source(source)
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
