use std::collections::{HashMap, HashSet};

use geo::{Distance, Haversine, Point};
use itertools::Itertools;
use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    config::MatchConfig,
    data::*,
    error::MatchError,
    timetable::Timetable,
};

/// Transfer opportunities at one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationTransfers {
    pub station_id: String,
    pub station_name: String,
    pub location: Point<f64>,
    /// Distinct (bus stop, route, departure) boardings reachable from any arrival
    pub transfer_count: usize,
    /// Distinct bus routes among those boardings
    pub route_count: usize,
    pub matches: Vec<TransferMatch>,
}

/// Result of one matcher run: one entry per input station, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferIndex {
    pub config: MatchConfig,
    pub stations: Vec<StationTransfers>,
}

impl TransferIndex {
    pub fn total_matches(&self) -> usize {
        self.stations.iter().map(|s| s.matches.len()).sum()
    }

    pub fn max_route_count(&self) -> usize {
        self.stations
            .iter()
            .map(|s| s.route_count)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct TransferMatcher<'a> {
    pub timetable: &'a Timetable,
    pub config: MatchConfig,
    arrivals_by_station: HashMap<&'a str, Vec<(Time, &'a Arrival)>>,
    /// Departures of each bus stop ordered by time, parallel to
    /// `timetable.bus_stops`
    departures_by_stop: Vec<Vec<(Time, &'a Departure)>>,
}

impl<'a> TransferMatcher<'a> {
    pub fn new(timetable: &'a Timetable, config: MatchConfig) -> Result<Self, MatchError> {
        config.validate()?;
        timetable.validate()?;

        let arrivals_by_station = timetable
            .arrivals
            .iter()
            .filter_map(|arrival| {
                let time = arrival.time?;
                config
                    .window
                    .contains(time)
                    .then_some((arrival.station_id.as_str(), (time, arrival)))
            })
            .into_group_map();

        let departures_by_stop = timetable
            .bus_stops
            .iter()
            .map(|bus_stop| {
                bus_stop
                    .departures
                    .iter()
                    .filter_map(|departure| Some((departure.time?, departure)))
                    .sorted_by_key(|(time, _)| *time)
                    .collect_vec()
            })
            .collect_vec();

        Ok(Self {
            timetable,
            config,
            arrivals_by_station,
            departures_by_stop,
        })
    }

    pub fn run(&self) -> TransferIndex {
        let stations = self
            .timetable
            .stations
            .iter()
            .map(|station| self.station_transfers(station))
            .collect_vec();

        TransferIndex {
            config: self.config,
            stations,
        }
    }

    /// Bus stops within walking distance of `station`, with their distance
    /// in metres. The threshold is inclusive.
    pub fn nearby_stops(&self, station: &Station) -> Vec<(&'a BusStop, f64)> {
        self.nearby_positions(station)
            .into_iter()
            .map(|(position, distance)| (&self.timetable.bus_stops[position], distance))
            .collect()
    }

    fn nearby_positions(&self, station: &Station) -> Vec<(usize, f64)> {
        let Some(origin) = station.location else {
            return Vec::new();
        };
        self.timetable
            .bus_stops
            .iter()
            .enumerate()
            .filter_map(|(position, bus_stop)| {
                let distance = walking_distance(origin, bus_stop.location?);
                (distance <= self.config.buffer_metres).then_some((position, distance))
            })
            .collect()
    }

    pub fn station_transfers(&self, station: &Station) -> StationTransfers {
        let arrivals = self
            .arrivals_by_station
            .get(station.id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let max_gap = self.config.max_transfer_seconds();

        let mut matches = Vec::new();
        for (position, distance) in self.nearby_positions(station) {
            let bus_stop = &self.timetable.bus_stops[position];
            let departures = &self.departures_by_stop[position];
            for &(arrival_time, arrival) in arrivals {
                // skip straight to the first departure not before the arrival
                // and stop at the first one past the limit
                let first = departures.partition_point(|(time, _)| *time < arrival_time);
                for &(departure_time, departure) in &departures[first..] {
                    let gap = arrival_time.seconds_until(departure_time) as f64;
                    if gap > max_gap {
                        break;
                    }
                    matches.push(TransferMatch {
                        station_id: station.id.clone(),
                        rail_route_id: arrival.route_id.clone(),
                        rail_trip_id: arrival.trip_id.clone(),
                        bus_stop_id: bus_stop.id.clone(),
                        route_id: departure.route_id.clone(),
                        trip_id: departure.trip_id.clone(),
                        arrival_time,
                        departure_time,
                        gap_minutes: gap / 60.0,
                        distance_metres: distance,
                    });
                }
            }
        }

        let transfer_count = matches
            .iter()
            .map(TransferMatch::boarding)
            .collect::<HashSet<_>>()
            .len();
        let route_count = matches
            .iter()
            .map(|m| m.route_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        StationTransfers {
            station_id: station.id.clone(),
            station_name: station.name.clone(),
            // validated in `new`
            location: station.location.unwrap_or_else(|| Point::new(0.0, 0.0)),
            transfer_count,
            route_count,
            matches,
        }
    }
}

/// Great-circle distance in metres.
pub fn walking_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

/// Runs the matcher once per walking distance. Each run only reads the
/// shared timetable, so they execute in parallel.
pub fn sweep(
    timetable: &Timetable,
    base: &MatchConfig,
    distances: &[f64],
) -> Result<Vec<TransferIndex>, MatchError> {
    distances
        .par_iter()
        .map(|&distance| {
            info!("Processing {distance}m");
            Ok(TransferMatcher::new(timetable, base.with_buffer(distance))?.run())
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PeakWindow;
    use crate::error::RecordKind;

    const METRES_PER_DEGREE_LAT: f64 = 111_195.0;

    fn uw_station() -> Station {
        Station {
            id: String::from("UW"),
            name: String::from("University of Waterloo"),
            location: Some(Point::new(-80.5449, 43.4723)),
        }
    }

    fn north_of(point: Point<f64>, metres: f64) -> Point<f64> {
        Point::new(point.x(), point.y() + metres / METRES_PER_DEGREE_LAT)
    }

    fn departure(route_id: &str, time: Time) -> Departure {
        Departure {
            trip_id: format!("{route_id}-{time}"),
            route_id: route_id.to_owned(),
            time: Some(time),
        }
    }

    fn bus_stop(id: &str, location: Point<f64>, mut departures: Vec<Departure>) -> BusStop {
        departures.sort_by_key(|d| d.time);
        BusStop {
            id: id.to_owned(),
            name: id.to_owned(),
            location: Some(location),
            departures,
        }
    }

    fn arrival(station_id: &str, time: Time) -> Arrival {
        Arrival {
            station_id: station_id.to_owned(),
            trip_id: format!("ion-{time}"),
            route_id: String::from("301"),
            time: Some(time),
        }
    }

    fn config(buffer_metres: f64, max_transfer_minutes: f64) -> MatchConfig {
        MatchConfig {
            window: PeakWindow {
                start: Time::hms(7, 0, 0),
                end: Time::hms(9, 0, 0),
            },
            buffer_metres,
            max_transfer_minutes,
        }
    }

    fn count(timetable: &Timetable, config: MatchConfig) -> Vec<usize> {
        TransferMatcher::new(timetable, config)
            .unwrap()
            .run()
            .stations
            .iter()
            .map(|s| s.transfer_count)
            .collect()
    }

    /// Station with one bus stop 80m away that departs 4 minutes after an
    /// 08:00 arrival
    fn single_stop() -> Timetable {
        let station = uw_station();
        let stop = bus_stop(
            "B80",
            north_of(station.location.unwrap(), 80.0),
            vec![departure("7", Time::hms(8, 4, 0))],
        );
        Timetable {
            stations: vec![station],
            bus_stops: vec![stop],
            arrivals: vec![arrival("UW", Time::hms(8, 0, 0))],
        }
    }

    /// A richer layout used by the monotonicity checks
    fn network() -> Timetable {
        let uw = uw_station();
        let origin = uw.location.unwrap();
        let lonely = Station {
            id: String::from("LONELY"),
            name: String::from("Lonely"),
            location: Some(north_of(origin, 5_000.0)),
        };
        Timetable {
            stations: vec![uw, lonely],
            bus_stops: vec![
                bus_stop(
                    "B30",
                    north_of(origin, 30.0),
                    vec![
                        departure("7", Time::hms(7, 58, 0)),
                        departure("7", Time::hms(8, 3, 0)),
                        departure("8", Time::hms(8, 3, 0)),
                        departure("9", Time::hms(8, 10, 0)),
                    ],
                ),
                bus_stop(
                    "B120",
                    north_of(origin, 120.0),
                    vec![
                        departure("12", Time::hms(8, 1, 0)),
                        departure("12", Time::hms(8, 16, 0)),
                    ],
                ),
                bus_stop(
                    "B400",
                    north_of(origin, 400.0),
                    vec![departure("201", Time::hms(8, 5, 0))],
                ),
            ],
            arrivals: vec![
                arrival("UW", Time::hms(8, 0, 0)),
                arrival("UW", Time::hms(8, 2, 0)),
                arrival("UW", Time::hms(8, 12, 0)),
                arrival("UW", Time::hms(9, 30, 0)),
                arrival("LONELY", Time::hms(8, 0, 0)),
            ],
        }
    }

    #[test]
    fn stop_within_buffer_counts() {
        assert_eq!(count(&single_stop(), config(100.0, 6.0)), vec![1]);
    }

    #[test]
    fn stop_outside_buffer_does_not_count() {
        let index = TransferMatcher::new(&single_stop(), config(50.0, 6.0))
            .unwrap()
            .run();
        assert_eq!(index.stations.len(), 1);
        assert_eq!(index.stations[0].transfer_count, 0);
        assert!(index.stations[0].matches.is_empty());
    }

    #[test]
    fn departure_before_arrival_is_excluded() {
        let mut timetable = single_stop();
        timetable.bus_stops[0].departures.insert(0, departure("9", Time::hms(7, 58, 0)));

        let index = TransferMatcher::new(&timetable, config(100.0, 6.0))
            .unwrap()
            .run();
        assert_eq!(index.stations[0].transfer_count, 1);
        assert_eq!(index.stations[0].matches[0].route_id, "7");
    }

    #[test]
    fn two_routes_at_the_same_time_count_twice() {
        let mut timetable = single_stop();
        timetable.bus_stops[0]
            .departures
            .push(departure("8", Time::hms(8, 4, 0)));

        let index = TransferMatcher::new(&timetable, config(100.0, 6.0))
            .unwrap()
            .run();
        assert_eq!(index.stations[0].transfer_count, 2);
        assert_eq!(index.stations[0].route_count, 2);
    }

    #[test]
    fn departures_out_of_order_are_still_matched() {
        let station = uw_station();
        // listed as the feed might give them, not by time
        let stop = BusStop {
            id: String::from("B78"),
            name: String::from("B78"),
            location: Some(north_of(station.location.unwrap(), 78.0)),
            departures: vec![
                departure("late", Time::hms(8, 30, 0)),
                departure("7", Time::hms(8, 4, 0)),
                departure("8", Time::hms(8, 5, 0)),
            ],
        };
        let timetable = Timetable {
            stations: vec![station],
            bus_stops: vec![stop],
            arrivals: vec![arrival("UW", Time::hms(8, 0, 0))],
        };

        let index = TransferMatcher::new(&timetable, config(100.0, 6.0))
            .unwrap()
            .run();
        let routes = index.stations[0]
            .matches
            .iter()
            .map(|m| m.route_id.as_str())
            .collect_vec();
        assert_eq!(index.stations[0].transfer_count, 2);
        assert_eq!(routes, vec!["7", "8"]);
        // the timetable itself is left as it was
        assert_eq!(timetable.bus_stops[0].departures[0].route_id, "late");
    }

    #[test]
    fn match_names_the_rail_trip() {
        let timetable = single_stop();
        let index = TransferMatcher::new(&timetable, config(100.0, 6.0))
            .unwrap()
            .run();
        let m = &index.stations[0].matches[0];
        assert_eq!(m.rail_route_id, "301");
        assert_eq!(m.rail_trip_id, "ion-08:00:00");
        assert_eq!(m.trip_id, "7-08:04:00");
    }

    #[test]
    fn gap_bounds_are_inclusive() {
        let station = uw_station();
        let arrival_time = Time::hms(8, 0, 0);
        let timetable = Timetable {
            bus_stops: vec![bus_stop(
                "B",
                north_of(station.location.unwrap(), 10.0),
                vec![
                    departure("same", arrival_time),
                    departure("edge", Time::hms(8, 6, 0)),
                    departure("late", Time::hms(8, 6, 1)),
                ],
            )],
            stations: vec![station],
            arrivals: vec![arrival("UW", arrival_time)],
        };

        let index = TransferMatcher::new(&timetable, config(100.0, 6.0))
            .unwrap()
            .run();
        let routes = index.stations[0]
            .matches
            .iter()
            .map(|m| m.route_id.as_str())
            .collect_vec();
        assert_eq!(routes, vec!["same", "edge"]);
        assert_eq!(index.stations[0].matches[1].gap_minutes, 6.0);
    }

    #[test]
    fn distance_bound_is_inclusive() {
        let timetable = single_stop();
        let exact = walking_distance(
            timetable.stations[0].location.unwrap(),
            timetable.bus_stops[0].location.unwrap(),
        );
        assert_eq!(count(&timetable, config(exact, 6.0)), vec![1]);
        assert_eq!(count(&timetable, config(exact - 0.001, 6.0)), vec![0]);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Point::new(-80.5449, 43.4723);
        let b = Point::new(-80.5227, 43.4649);
        assert_eq!(walking_distance(a, b), walking_distance(b, a));
    }

    #[test]
    fn arrivals_outside_window_are_ignored() {
        let mut timetable = single_stop();
        timetable.arrivals = vec![arrival("UW", Time::hms(9, 0, 1))];
        timetable.bus_stops[0].departures = vec![departure("7", Time::hms(9, 2, 0))];
        assert_eq!(count(&timetable, config(100.0, 6.0)), vec![0]);

        // the window end itself is still in
        timetable.arrivals = vec![arrival("UW", Time::hms(9, 0, 0))];
        assert_eq!(count(&timetable, config(100.0, 6.0)), vec![1]);
    }

    #[test]
    fn every_station_appears_once_in_order() {
        let timetable = network();
        let index = TransferMatcher::new(&timetable, config(0.0, 0.0))
            .unwrap()
            .run();
        let ids = index.stations.iter().map(|s| s.station_id.as_str()).collect_vec();
        assert_eq!(ids, vec!["UW", "LONELY"]);
    }

    #[test]
    fn station_without_nearby_stops_counts_zero() {
        let index = TransferMatcher::new(&network(), config(500.0, 30.0))
            .unwrap()
            .run();
        let lonely = &index.stations[1];
        assert_eq!(lonely.station_id, "LONELY");
        assert_eq!(lonely.transfer_count, 0);
        assert_eq!(lonely.route_count, 0);
    }

    #[test]
    fn every_match_respects_the_bounds() {
        let config = config(150.0, 6.0);
        let index = TransferMatcher::new(&network(), config).unwrap().run();
        assert!(index.total_matches() > 0);
        for m in index.stations.iter().flat_map(|s| &s.matches) {
            let gap = m.arrival_time.seconds_until(m.departure_time);
            assert!((0..=360).contains(&gap), "{m:?}");
            assert!(m.distance_metres <= config.buffer_metres, "{m:?}");
            assert!(config.window.contains(m.arrival_time), "{m:?}");
        }
    }

    #[test]
    fn matches_are_not_deduplicated_across_arrivals() {
        // 08:03 departures are reachable from both the 08:00 and 08:02 arrivals
        let index = TransferMatcher::new(&network(), config(50.0, 6.0))
            .unwrap()
            .run();
        let uw = &index.stations[0];
        assert_eq!(uw.matches.len(), 4);
        assert_eq!(uw.transfer_count, 2);
        assert_eq!(uw.route_count, 2);
    }

    #[test]
    fn count_grows_with_buffer() {
        let timetable = network();
        let mut previous = vec![0, 0];
        for buffer in [0.0, 25.0, 50.0, 100.0, 150.0, 300.0, 500.0, 10_000.0] {
            let counts = count(&timetable, config(buffer, 6.0));
            for (now, before) in counts.iter().zip(&previous) {
                assert!(now >= before, "buffer {buffer}: {counts:?} < {previous:?}");
            }
            previous = counts;
        }
        assert!(previous[0] > 0);
    }

    #[test]
    fn count_grows_with_transfer_time() {
        let timetable = network();
        let mut previous = vec![0, 0];
        for minutes in [0.0, 1.0, 3.0, 6.0, 10.0, 20.0, 60.0] {
            let counts = count(&timetable, config(500.0, minutes));
            for (now, before) in counts.iter().zip(&previous) {
                assert!(now >= before, "{minutes} min: {counts:?} < {previous:?}");
            }
            previous = counts;
        }
    }

    #[test]
    fn rerun_with_other_config_is_independent() {
        let timetable = network();
        let first = TransferMatcher::new(&timetable, config(100.0, 6.0)).unwrap().run();
        let _ = TransferMatcher::new(&timetable, config(500.0, 30.0)).unwrap().run();
        let again = TransferMatcher::new(&timetable, config(100.0, 6.0)).unwrap().run();
        assert_eq!(first, again);
    }

    #[test]
    fn sweep_matches_individual_runs() {
        let timetable = network();
        let base = config(100.0, 6.0);
        let distances = [50.0, 100.0, 150.0, 500.0];
        let results = sweep(&timetable, &base, &distances).unwrap();

        assert_eq!(results.len(), distances.len());
        for (index, distance) in results.iter().zip(distances) {
            assert_eq!(index.config.buffer_metres, distance);
            let single = TransferMatcher::new(&timetable, base.with_buffer(distance))
                .unwrap()
                .run();
            assert_eq!(*index, single);
        }
    }

    #[test]
    fn sweep_rejects_negative_distance() {
        let result = sweep(&network(), &config(100.0, 6.0), &[100.0, -50.0]);
        assert!(matches!(result, Err(MatchError::InvalidConfigError(_))));
    }

    #[test]
    fn invalid_config_is_rejected_before_matching() {
        let timetable = single_stop();
        let result = TransferMatcher::new(&timetable, config(100.0, -1.0));
        assert!(matches!(result, Err(MatchError::InvalidConfigError(_))));
    }

    #[test]
    fn missing_arrival_time_is_reported() {
        let mut timetable = single_stop();
        timetable.arrivals[0].time = None;
        match TransferMatcher::new(&timetable, config(100.0, 6.0)) {
            Err(MatchError::MissingDataError { kind, id, .. }) => {
                assert_eq!(kind, RecordKind::Arrival);
                assert_eq!(id, "UW");
            }
            other => panic!("expected missing data, got {other:?}"),
        }
    }

    #[test]
    fn missing_bus_stop_location_is_reported() {
        let mut timetable = single_stop();
        timetable.bus_stops[0].location = None;
        assert!(matches!(
            TransferMatcher::new(&timetable, config(100.0, 6.0)),
            Err(MatchError::MissingDataError {
                kind: RecordKind::BusStop,
                ..
            })
        ));
    }
}
