use log::info;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{error::PipelineError, source::TableSource};

#[derive(Deserialize, Debug, Clone)]
pub struct Stop {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: String,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Route {
    pub route_id: String,
    pub route_type: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StopTime {
    pub trip_id: String,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub stop_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Calendar {
    pub service_id: String,
    pub monday: u8,
    pub tuesday: u8,
    pub wednesday: u8,
    pub thursday: u8,
    pub friday: u8,
    pub saturday: u8,
    pub sunday: u8,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CalendarDate {
    pub service_id: String,
    pub date: String,
    pub exception_type: u8,
}

/// The raw tables of a GTFS feed that the transfer analysis needs.
#[derive(Debug, Default)]
pub struct Feed {
    pub stops: Vec<Stop>,
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
    pub calendar: Vec<Calendar>,
    pub calendar_dates: Vec<CalendarDate>,
}

impl Feed {
    pub fn read(source: &mut dyn TableSource) -> Result<Feed, PipelineError> {
        info!("Processing stops");
        let stops = required(source, "stops.txt")?;

        info!("Processing routes");
        let routes = required(source, "routes.txt")?;

        info!("Processing trips");
        let trips = required(source, "trips.txt")?;

        info!("Processing stop_times");
        let stop_times = required(source, "stop_times.txt")?;

        info!("Processing calendars");
        let calendar = deserialize_into(source, "calendar.txt")?;
        let calendar_dates = deserialize_into(source, "calendar_dates.txt")?;
        if calendar.is_none() && calendar_dates.is_none() {
            return Err(PipelineError::MissingTableError(String::from(
                "calendar.txt or calendar_dates.txt",
            )));
        }

        Ok(Feed {
            stops,
            routes,
            trips,
            stop_times,
            calendar: calendar.unwrap_or_default(),
            calendar_dates: calendar_dates.unwrap_or_default(),
        })
    }
}

fn required<T: DeserializeOwned>(
    source: &mut dyn TableSource,
    name: &str,
) -> Result<Vec<T>, PipelineError> {
    deserialize_into(source, name)?.ok_or_else(|| PipelineError::MissingTableError(name.to_owned()))
}

fn deserialize_into<T: DeserializeOwned>(
    source: &mut dyn TableSource,
    name: &str,
) -> Result<Option<Vec<T>>, PipelineError> {
    let Some(reader) = source.open(name)? else {
        return Ok(None);
    };
    let rows = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
        .deserialize()
        .collect::<Result<Vec<T>, _>>()?;
    Ok(Some(rows))
}
