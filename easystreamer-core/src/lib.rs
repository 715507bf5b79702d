//! `EasyStreamer` client core
//!
//! Everything the subscription client needs that is not tied to a media
//! transport: configuration, logging, wire models, the client identity, the
//! HTTP API client and the periodic catalog/stats pollers.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod models;
pub mod poller;

pub use api::{ApiClient, CatalogSource, SignalingChannel};
pub use config::Config;
pub use error::{Error, Result};
pub use identity::ClientId;
