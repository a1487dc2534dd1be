use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate, Weekday};
use geo::Point;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    data::*,
    error::{MatchError, PipelineError, RecordKind},
    gtfs,
};

const GTFS_DATE_FORMAT: &str = "%Y%m%d";

/// Which part of the feed is analysed: one service date, the rail routes
/// whose stops are stations, and the route type treated as bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSelection {
    pub service_date: NaiveDate,
    pub rail_route_ids: Vec<String>,
    pub bus_route_type: u16,
}

/// The matcher's input: stations, bus stops with their departures, and the
/// rail arrivals of one service date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timetable {
    pub stations: Vec<Station>,
    pub bus_stops: Vec<BusStop>,
    pub arrivals: Vec<Arrival>,
}

impl Timetable {
    pub fn select(feed: &gtfs::Feed, selection: &ServiceSelection) -> Result<Self, PipelineError> {
        let service_ids = active_services(feed, &selection.service_date)?;
        info!(
            "Found {} service IDs for {}",
            service_ids.len(),
            selection.service_date
        );
        if service_ids.is_empty() {
            return Err(PipelineError::NoServiceError(selection.service_date));
        }

        let rail_routes: HashSet<&str> = selection
            .rail_route_ids
            .iter()
            .map(String::as_str)
            .collect();
        let bus_routes: HashSet<&str> = feed
            .routes
            .iter()
            .filter(|route| route.route_type == selection.bus_route_type)
            .map(|route| route.route_id.as_str())
            .collect();
        info!(
            "Found {} rail routes and {} bus routes",
            feed.routes
                .iter()
                .filter(|route| rail_routes.contains(route.route_id.as_str()))
                .count(),
            bus_routes.len()
        );

        let trips: HashMap<&str, &gtfs::Trip> = feed
            .trips
            .iter()
            .filter(|trip| service_ids.contains(trip.service_id.as_str()))
            .map(|trip| (trip.trip_id.as_str(), trip))
            .collect();

        let mut arrivals = Vec::new();
        let mut departures: HashMap<&str, Vec<Departure>> = HashMap::new();
        for stop_time in &feed.stop_times {
            let Some(trip) = trips.get(stop_time.trip_id.as_str()) else {
                continue;
            };
            if rail_routes.contains(trip.route_id.as_str()) {
                let Some(time) = scheduled_time(&stop_time.arrival_time, stop_time)? else {
                    continue;
                };
                arrivals.push(Arrival {
                    station_id: stop_time.stop_id.clone(),
                    trip_id: trip.trip_id.clone(),
                    route_id: trip.route_id.clone(),
                    time: Some(time),
                });
            } else if bus_routes.contains(trip.route_id.as_str()) {
                let Some(time) = scheduled_time(&stop_time.departure_time, stop_time)? else {
                    continue;
                };
                departures
                    .entry(stop_time.stop_id.as_str())
                    .or_default()
                    .push(Departure {
                        trip_id: trip.trip_id.clone(),
                        route_id: trip.route_id.clone(),
                        time: Some(time),
                    });
            }
        }

        let station_ids: HashSet<&str> = arrivals.iter().map(|a| a.station_id.as_str()).collect();
        let known_stops: HashSet<&str> = feed.stops.iter().map(|s| s.stop_id.as_str()).collect();
        for unknown in station_ids
            .iter()
            .chain(departures.keys())
            .filter(|id| !known_stops.contains(**id))
            .sorted()
            .dedup()
        {
            warn!("stop {unknown:?} is referenced by stop_times.txt but missing from stops.txt");
        }

        let stations = feed
            .stops
            .iter()
            .filter(|stop| station_ids.contains(stop.stop_id.as_str()))
            .map(|stop| Station {
                id: stop.stop_id.clone(),
                name: stop.stop_name.clone(),
                location: location(stop),
            })
            .collect_vec();

        let bus_stops = feed
            .stops
            .iter()
            .filter_map(|stop| {
                let mut departures = departures.remove(stop.stop_id.as_str())?;
                departures.sort_by_key(|departure| departure.time);
                Some(BusStop {
                    id: stop.stop_id.clone(),
                    name: stop.stop_name.clone(),
                    location: location(stop),
                    departures,
                })
            })
            .collect_vec();

        info!(
            "Found {} stations and {} bus stops",
            stations.len(),
            bus_stops.len()
        );
        Ok(Timetable {
            stations,
            bus_stops,
            arrivals,
        })
    }

    /// Checks that every record carries the location or time the matcher
    /// needs, reporting the first that does not.
    pub fn validate(&self) -> Result<(), MatchError> {
        let missing = |kind, id: &str, field| MatchError::MissingDataError {
            kind,
            id: id.to_owned(),
            field,
        };
        for station in &self.stations {
            if station.location.is_none() {
                return Err(missing(RecordKind::Station, &station.id, "location"));
            }
        }
        for bus_stop in &self.bus_stops {
            if bus_stop.location.is_none() {
                return Err(missing(RecordKind::BusStop, &bus_stop.id, "location"));
            }
            if bus_stop.departures.iter().any(|d| d.time.is_none()) {
                return Err(missing(RecordKind::Departure, &bus_stop.id, "departure time"));
            }
        }
        if let Some(arrival) = self.arrivals.iter().find(|a| a.time.is_none()) {
            return Err(missing(RecordKind::Arrival, &arrival.station_id, "arrival time"));
        }
        Ok(())
    }
}

fn location(stop: &gtfs::Stop) -> Option<Point<f64>> {
    match (stop.stop_lon, stop.stop_lat) {
        (Some(lon), Some(lat)) => Some(Point::new(lon, lat)),
        _ => None,
    }
}

/// Parses a stop time value. Untimed stops are legal in GTFS and are not
/// scheduled events, so they yield `None` rather than an error.
fn scheduled_time(
    raw: &Option<String>,
    stop_time: &gtfs::StopTime,
) -> Result<Option<Time>, PipelineError> {
    match raw.as_deref() {
        None | Some("") => {
            debug!(
                "skipping untimed stop {} on trip {}",
                stop_time.stop_id, stop_time.trip_id
            );
            Ok(None)
        }
        Some(raw) => raw.parse().map(Some).map_err(|e| {
            PipelineError::MalformedFeedError(format!(
                "trip {} at stop {}: {e}",
                stop_time.trip_id, stop_time.stop_id
            ))
        }),
    }
}

/// Service ids running on `date`: calendar.txt patterns, then
/// calendar_dates.txt additions (type 1) and removals (type 2).
pub fn active_services<'a>(
    feed: &'a gtfs::Feed,
    date: &NaiveDate,
) -> Result<HashSet<&'a str>, PipelineError> {
    let mut services = HashSet::new();
    for calendar in &feed.calendar {
        let start = parse_date(&calendar.start_date)?;
        let end = parse_date(&calendar.end_date)?;
        let runs = match date.weekday() {
            Weekday::Mon => calendar.monday,
            Weekday::Tue => calendar.tuesday,
            Weekday::Wed => calendar.wednesday,
            Weekday::Thu => calendar.thursday,
            Weekday::Fri => calendar.friday,
            Weekday::Sat => calendar.saturday,
            Weekday::Sun => calendar.sunday,
        } == 1;
        if runs && start <= *date && *date <= end {
            services.insert(calendar.service_id.as_str());
        }
    }

    for exception in &feed.calendar_dates {
        if parse_date(&exception.date)? != *date {
            continue;
        }
        match exception.exception_type {
            1 => {
                services.insert(exception.service_id.as_str());
            }
            2 => {
                services.remove(exception.service_id.as_str());
            }
            other => {
                return Err(PipelineError::MalformedFeedError(format!(
                    "unknown exception_type {other} for service {}",
                    exception.service_id
                )))
            }
        }
    }
    Ok(services)
}

fn parse_date(raw: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(raw, GTFS_DATE_FORMAT)
        .map_err(|e| PipelineError::MalformedFeedError(format!("invalid date {raw:?}: {e}")))
}
