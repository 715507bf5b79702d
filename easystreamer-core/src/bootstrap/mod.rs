//! Startup helpers for the client binary

pub mod config;

pub use config::{load_config, CONFIG_PATH_ENV};
