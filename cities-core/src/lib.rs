//! Core library for the `cities` client.
//!
//! This crate defines:
//! - The remote cities API contract and its HTTP implementation
//! - The paginated city list store with request cancellation
//! - The preferred cities store with per-city loading and retry
//! - Configuration, pagination link parsing and a fixed-delay retrier
//!
//! It is used by `cities-cli`, but any front end can drive the stores and
//! render from their read accessors.

pub mod api;
pub mod cancel;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod retry;
pub mod store;

pub use api::{CitiesApi, api_from_config};
pub use config::Config;
pub use error::ApiError;
pub use model::{CitiesPage, CityInfo, GeonameId, Links, PreferredCitiesPatch, PreferredIds};
pub use query::{CityParams, parse_link};
pub use retry::{RetryPolicy, retry, retry_with};
pub use store::{
    CityListStore, FetchOutcome, ListPhase, PreferredCitiesState, PreferredCitiesStore,
    PreferredEntry,
};
