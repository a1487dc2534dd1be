//! Counts the bus departures that ION riders can catch within a short walk
//! and wait of each station, for one service date and peak window.
use clap::Parser;

use crate::app::TransferApp;

mod app;
mod config;
mod data;
mod error;
mod export;
mod fetch;
mod gtfs;
mod map;
mod matcher;
mod pipeline;
mod source;
mod timetable;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = TransferApp::parse();
    if let Err(e) = args.op.run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}
