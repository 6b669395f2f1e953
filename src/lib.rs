#![forbid(unsafe_code)]

pub mod api;
pub mod backfill;
pub mod browser;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dates;
pub mod extract;
pub mod logging;
pub mod model;
pub mod navigator;
pub mod paginate;
pub mod scheduler;
pub mod scrape;
pub mod sink;
pub mod sources;
pub mod store;
