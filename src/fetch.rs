use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::info;

use crate::error::PipelineError;

pub const DEFAULT_GTFS_URL: &str = "https://www.regionofwaterloo.ca/opendatadownloads/GRT_GTFS.zip";

const ARCHIVE_NAME: &str = "grt_gtfs.zip";

/// Downloads the GTFS archive into `data_dir` unless a copy is already there.
pub fn fetch_feed(url: &str, data_dir: &Path, force: bool) -> Result<PathBuf, PipelineError> {
    let destination = data_dir.join(ARCHIVE_NAME);
    if destination.is_file() && !force {
        info!("Using existing GTFS data at {}", destination.display());
        return Ok(destination);
    }

    info!("Downloading GTFS data from {url}");
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let bytes = client.get(url).send()?.error_for_status()?.bytes()?;

    fs::create_dir_all(data_dir)?;
    fs::write(&destination, &bytes)?;
    info!("Downloaded to {}", destination.display());
    Ok(destination)
}
