use crate::{
    Config,
    api::http::HttpCitiesApi,
    cancel::CancelSignal,
    error::ApiError,
    model::{CitiesPage, CityInfo, GeonameId, PreferredCitiesPatch, PreferredIds},
    query::CityParams,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};

pub mod http;

/// The remote cities service.
///
/// Stores only talk to the server through this trait, so tests can swap in a
/// scripted implementation.
#[async_trait]
pub trait CitiesApi: Send + Sync + Debug {
    /// `GET /cities`. When `cancel` is given, the call resolves with
    /// [`ApiError::Canceled`] as soon as its handle is cancelled.
    async fn get_cities(
        &self,
        params: &CityParams,
        cancel: Option<CancelSignal>,
    ) -> Result<CitiesPage, ApiError>;

    /// `GET /cities/{id}`.
    async fn get_city(&self, id: &GeonameId) -> Result<CityInfo, ApiError>;

    /// `GET /preferences/cities`.
    async fn get_preferred_cities(&self) -> Result<PreferredIds, ApiError>;

    /// `PATCH /preferences/cities`.
    async fn save_preferred_cities(&self, patch: &PreferredCitiesPatch) -> Result<(), ApiError>;
}

/// Construct the HTTP-backed API from config.
pub fn api_from_config(config: &Config) -> anyhow::Result<Arc<dyn CitiesApi>> {
    let api = HttpCitiesApi::new(
        &config.base_url,
        Duration::from_secs(config.request_timeout_secs),
    )
    .map_err(|err| {
        anyhow::anyhow!(
            "Invalid base_url '{}' in config: {err}.\n\
             Hint: run `cities configure` and enter the server address.",
            config.base_url
        )
    })?;

    Ok(Arc::new(api))
}
