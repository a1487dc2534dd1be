//! Leaflet maps of a transfer index. Stations are drawn as circles sized
//! and coloured by the number of bus routes reachable from them.
use itertools::Itertools;
use serde::Serialize;
use serde_json::json;

use crate::{error::PipelineError, matcher::TransferIndex};

const RAMP: [&str; 8] = [
    "#f1eef6", "#d4b9da", "#c994c7", "#df65b0", "#e7298a", "#ce1256", "#91003f", "#67001f",
];
const NO_TRANSFER_COLOR: &str = "#505050";

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title>{{TITLE}}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
  html, body, #map { height: 100%; margin: 0; }
  .panel { position: fixed; z-index: 1000; background: white; padding: 10px;
           border: 2px solid grey; border-radius: 5px; font: 12px Arial, sans-serif; }
  .legend { bottom: 30px; left: 10px; width: 200px; }
  .slider { top: 10px; right: 10px; width: 300px; }
  .ramp { height: 20px; margin: 5px 0;
          background: linear-gradient(to right, #505050 0%, #505050 10%, #f1eef6 10%, #67001f 100%); }
</style>
</head>
<body>
<div id="map"></div>
<div class="panel legend">
  <div style="font-weight: bold">{{CAPTION}}</div>
  <div class="ramp"></div>
  <div style="display: flex; justify-content: space-between"><span>0</span><span id="maxValue">{{MAX}}</span></div>
</div>
{{CONTROLS}}
<script>
var colorScale = {{RAMP}};
var stopsData = {{DATA}};
var map = L.map('map').setView([{{LAT}}, {{LON}}], 12);
L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);
var markers = [];

function getColor(value, maxValue) {
  if (value === 0 || maxValue === 0) return '{{GREY}}';
  var position = (value / maxValue) * (colorScale.length - 1);
  return colorScale[Math.min(Math.floor(position), colorScale.length - 1)];
}

function draw(key) {
  markers.forEach(function (marker) { marker.remove(); });
  markers = [];
  var maxValue = 0;
  stopsData.forEach(function (stop) { maxValue = Math.max(maxValue, stop.transfers[key]); });
  document.getElementById('maxValue').textContent = maxValue;
  stopsData.forEach(function (stop) {
    var value = stop.transfers[key];
    var marker = L.circleMarker([stop.lat, stop.lon], {
      radius: value === 0 ? 6 : 8 + (value / Math.max(maxValue, 1)) * 12,
      color: '#000000',
      fillColor: getColor(value, maxValue),
      fillOpacity: 0.9,
      weight: 2
    }).addTo(map);
    marker.bindTooltip(stop.stop_name + ': ' + value + ' bus routes');
    markers.push(marker);
  });
}
{{SCRIPT}}
</script>
</body>
</html>
"#;

const SLIDER: &str = r#"<div class="panel slider">
  <h4 style="margin-top: 0">Transfer Distance</h4>
  <input type="range" id="distanceSlider" min="0" max="{{LAST}}" value="{{INITIAL}}" step="1" style="width: 100%" />
  <div style="text-align: center; margin-top: 5px"><span id="distanceValue"></span> meters</div>
</div>"#;

const SLIDER_SCRIPT: &str = r#"var distances = {{DISTANCES}};
function select(position) {
  document.getElementById('distanceValue').textContent = distances[position];
  draw(distances[position]);
}
document.getElementById('distanceSlider').addEventListener('input', function (e) {
  select(parseInt(e.target.value));
});
select({{INITIAL}});"#;

#[derive(Serialize)]
struct MapStop<'a> {
    stop_id: &'a str,
    stop_name: &'a str,
    lat: f64,
    lon: f64,
    transfers: serde_json::Map<String, serde_json::Value>,
}

/// A map of one index
pub fn render_map(index: &TransferIndex) -> Result<String, PipelineError> {
    let key = distance_key(index.config.buffer_metres);
    let caption = format!("Bus Routes with Transfer Opportunities (within {key}m)");
    render(
        &caption,
        std::slice::from_ref(index),
        "",
        &format!("draw({});", serde_json::to_string(&key)?),
    )
}

/// One map with a slider over the indexes of a sweep
pub fn render_sweep_map(indexes: &[TransferIndex]) -> Result<String, PipelineError> {
    let distances = indexes
        .iter()
        .map(|index| distance_key(index.config.buffer_metres))
        .collect_vec();
    let initial = distances
        .iter()
        .position(|d| d == "100")
        .unwrap_or_default()
        .to_string();
    let controls = SLIDER
        .replace("{{LAST}}", &distances.len().saturating_sub(1).to_string())
        .replace("{{INITIAL}}", &initial);
    let script = SLIDER_SCRIPT
        .replace("{{DISTANCES}}", &serde_json::to_string(&distances)?)
        .replace("{{INITIAL}}", &initial);
    render("Bus Transfer Routes", indexes, &controls, &script)
}

fn render(
    caption: &str,
    indexes: &[TransferIndex],
    controls: &str,
    script: &str,
) -> Result<String, PipelineError> {
    let Some(first) = indexes.first() else {
        return Ok(String::new());
    };

    let stops = first
        .stations
        .iter()
        .enumerate()
        .map(|(position, station)| MapStop {
            stop_id: &station.station_id,
            stop_name: &station.station_name,
            lat: station.location.y(),
            lon: station.location.x(),
            transfers: indexes
                .iter()
                .map(|index| {
                    let routes = index.stations.get(position).map_or(0, |s| s.route_count);
                    (distance_key(index.config.buffer_metres), json!(routes))
                })
                .collect(),
        })
        .collect_vec();

    let count = first.stations.len().max(1) as f64;
    let lat = first.stations.iter().map(|s| s.location.y()).sum::<f64>() / count;
    let lon = first.stations.iter().map(|s| s.location.x()).sum::<f64>() / count;

    Ok(PAGE
        .replace("{{TITLE}}", caption)
        .replace("{{CAPTION}}", caption)
        .replace("{{MAX}}", &first.max_route_count().to_string())
        .replace("{{CONTROLS}}", controls)
        .replace("{{RAMP}}", &serde_json::to_string(&RAMP)?)
        .replace("{{GREY}}", NO_TRANSFER_COLOR)
        .replace("{{LAT}}", &lat.to_string())
        .replace("{{LON}}", &lon.to_string())
        .replace("{{SCRIPT}}", script)
        .replace("{{DATA}}", &script_safe(&serde_json::to_string(&stops)?)))
}

fn distance_key(buffer_metres: f64) -> String {
    if buffer_metres.fract() == 0.0 {
        format!("{buffer_metres:.0}")
    } else {
        buffer_metres.to_string()
    }
}

/// Keeps station names from closing the surrounding script element
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}
