pub mod args;
pub mod cache;
pub mod common;
pub mod config;
pub mod constants;
pub mod errors;
pub mod fetch;
pub mod keys;
pub mod pipeline;
pub mod places;
pub mod processor;
pub mod progress;
pub mod registry;
pub mod scoring;
pub mod store;
pub mod tabular;

pub use config::EnricherConfig;
pub use errors::{EnrichError, FetchError, PlacesError, RowError};
pub use pipeline::{Pipeline, RunSummary, StopReason};
pub use places::{PlacesClient, SearchRequest, SerperClient};
