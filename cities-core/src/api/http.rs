use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    cancel::{CancelSignal, guarded},
    error::ApiError,
    model::{CitiesPage, CityInfo, GeonameId, PreferredCitiesPatch, PreferredIds},
    query::CityParams,
};

use super::CitiesApi;

#[derive(Debug, Clone)]
pub struct HttpCitiesApi {
    base: Url,
    http: Client,
}

impl HttpCitiesApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                url: base.to_string(),
                source,
            })?;

        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &Url,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.send_raw(url, request).await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn send_raw(&self, url: &Url, request: RequestBuilder) -> Result<String, ApiError> {
        let transport = |source| ApiError::Transport {
            url: url.to_string(),
            source,
        };

        let res = request.send().await.map_err(transport)?;
        let status = res.status();
        let body = res.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl CitiesApi for HttpCitiesApi {
    async fn get_cities(
        &self,
        params: &CityParams,
        cancel: Option<CancelSignal>,
    ) -> Result<CitiesPage, ApiError> {
        let url = self.endpoint(&["cities"]);
        tracing::debug!(%url, ?params, "GET cities");

        let request = self.http.get(url.clone()).query(&params.to_query());
        guarded(cancel, self.send(&url, request)).await
    }

    async fn get_city(&self, id: &GeonameId) -> Result<CityInfo, ApiError> {
        let url = self.endpoint(&["cities", id.as_str()]);
        tracing::debug!(%url, "GET city");

        self.send(&url, self.http.get(url.clone())).await
    }

    async fn get_preferred_cities(&self) -> Result<PreferredIds, ApiError> {
        let url = self.endpoint(&["preferences", "cities"]);
        tracing::debug!(%url, "GET preferred cities");

        self.send(&url, self.http.get(url.clone())).await
    }

    async fn save_preferred_cities(&self, patch: &PreferredCitiesPatch) -> Result<(), ApiError> {
        let url = self.endpoint(&["preferences", "cities"]);
        tracing::debug!(%url, changes = patch.len(), "PATCH preferred cities");

        self.send_raw(&url, self.http.patch(url.clone()).json(patch)).await?;
        Ok(())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
