use geo::Point;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::error::ParseTimeError;

/// Scheduled time of day, in seconds after midnight of the service date.
///
/// GTFS allows times past `24:00:00` for trips that run over midnight, so
/// this is not a wall-clock time and is never wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(u32);

impl Time {
    #[cfg(test)]
    pub const fn hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    /// Signed gap from `self` to `later`, in seconds
    pub fn seconds_until(&self, later: Time) -> i64 {
        i64::from(later.0) - i64::from(self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

impl FromStr for Time {
    type Err = ParseTimeError;

    /// Accepts `H:MM:SS`, `HH:MM:SS` and `HH:MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_owned());
        let parts = s
            .trim()
            .split(':')
            .map(|part| part.parse::<u32>().map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;

        let (hours, minutes, seconds) = match parts.as_slice() {
            [h, m] => (*h, *m, 0),
            [h, m, s] => (*h, *m, *s),
            _ => return Err(err()),
        };
        if minutes > 59 || seconds > 59 {
            return Err(err());
        }
        hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes * 60 + seconds))
            .map(Time)
            .ok_or_else(err)
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

/// A rail station. Location is optional so that incomplete feeds can be
/// reported instead of silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub location: Option<Point<f64>>,
}

/// A rail stop time at a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub station_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub time: Option<Time>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub trip_id: String,
    pub route_id: String,
    pub time: Option<Time>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusStop {
    pub id: String,
    pub name: String,
    pub location: Option<Point<f64>>,
    pub departures: Vec<Departure>,
}

/// A bus departure reachable from a rail arrival.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferMatch {
    pub station_id: String,
    pub rail_route_id: String,
    pub rail_trip_id: String,
    pub bus_stop_id: String,
    pub route_id: String,
    pub trip_id: String,
    pub arrival_time: Time,
    pub departure_time: Time,
    pub gap_minutes: f64,
    pub distance_metres: f64,
}

impl TransferMatch {
    /// Identity of the bus service this match boards, ignoring which
    /// arrival fed it.
    pub fn boarding(&self) -> (&str, &str, Time) {
        (&self.bus_stop_id, &self.route_id, self.departure_time)
    }
}
