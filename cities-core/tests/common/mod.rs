//! Scripted in-memory implementation of the cities API.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cities_core::{
    ApiError, CitiesApi, CitiesPage, CityInfo, CityParams, GeonameId, Links, PreferredCitiesPatch,
    PreferredIds, cancel::CancelSignal,
};
use parking_lot::Mutex;

pub const TOTAL_CITIES: u64 = 100;

#[derive(Debug, Default)]
pub struct MockApi {
    /// Every `GET /cities` call, in order.
    pub city_requests: Mutex<Vec<CityParams>>,
    /// Delay before answering a list request, by filter.
    pub list_delays: Mutex<HashMap<String, Duration>>,
    /// Number of upcoming list requests that fail.
    pub list_failures: Mutex<u32>,
    /// When set, list requests ignore their cancellation signal.
    pub ignore_cancel: Mutex<bool>,

    pub preferred: Mutex<Vec<GeonameId>>,
    pub preferred_requests: Mutex<u32>,
    pub preferred_failures: Mutex<u32>,

    pub failing_cities: Mutex<BTreeSet<GeonameId>>,
    pub city_delay: Mutex<Duration>,
    pub city_lookups: Mutex<Vec<GeonameId>>,

    pub patches: Mutex<Vec<PreferredCitiesPatch>>,
    pub fail_patches: Mutex<bool>,
}

impl MockApi {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_preferred(ids: &[u64]) -> Arc<Self> {
        let api = Self::default();
        *api.preferred.lock() = ids.iter().copied().map(GeonameId::from).collect();
        Arc::new(api)
    }

    pub fn delay_filter(&self, filter: &str, delay: Duration) {
        self.list_delays.lock().insert(filter.to_string(), delay);
    }

    pub fn fail_city(&self, id: u64) {
        self.failing_cities.lock().insert(GeonameId::from(id));
    }

    pub fn heal_cities(&self) {
        self.failing_cities.lock().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.city_requests.lock().len()
    }

    async fn answer_list(&self, params: &CityParams) -> Result<CitiesPage, ApiError> {
        let filter = params.filter.clone().unwrap_or_default();
        let delay = self.list_delays.lock().get(&filter).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.list_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(server_error("/cities"));
            }
        }

        Ok(page_for(params))
    }
}

pub fn city(id: u64) -> CityInfo {
    CityInfo {
        id: GeonameId::from(id),
        name: format!("preferred_{id}"),
        country: format!("country_{id}"),
        subregion: Some(format!("subcountry_{id}")),
    }
}

pub fn server_error(path: &str) -> ApiError {
    ApiError::Status {
        url: format!("http://localhost:3030{path}"),
        status: 500,
        body: "Internal error".to_string(),
    }
}

fn link(offset: u64, limit: u64, filter: &str) -> String {
    if filter.is_empty() {
        format!("/cities?offset={offset}&limit={limit}")
    } else {
        format!("/cities?offset={offset}&limit={limit}&filter={filter}")
    }
}

/// Cities are numbered from 1; names carry the filter so tests can tell
/// which search a city came from.
pub fn page_for(params: &CityParams) -> CitiesPage {
    let filter = params.filter.clone().unwrap_or_default();
    let offset: u64 = params.offset.as_deref().and_then(|o| o.parse().ok()).unwrap_or(0);
    let limit: u64 = params.limit.as_deref().and_then(|l| l.parse().ok()).unwrap_or(30);
    let end = (offset + limit).min(TOTAL_CITIES);

    let data = (offset..end)
        .map(|n| CityInfo {
            id: GeonameId::from(n + 1),
            name: format!("{filter}_{}", n + 1),
            country: "Testland".to_string(),
            subregion: None,
        })
        .collect();

    let last_offset = (TOTAL_CITIES - 1) / limit * limit;
    CitiesPage {
        data,
        total: TOTAL_CITIES,
        links: Links {
            first: link(0, limit, &filter),
            next: (end < TOTAL_CITIES).then(|| link(end, limit, &filter)),
            prev: (offset > 0).then(|| link(offset.saturating_sub(limit), limit, &filter)),
            last: link(last_offset, limit, &filter),
        },
        filter: (!filter.is_empty()).then_some(filter),
    }
}

#[async_trait]
impl CitiesApi for MockApi {
    async fn get_cities(
        &self,
        params: &CityParams,
        cancel: Option<CancelSignal>,
    ) -> Result<CitiesPage, ApiError> {
        self.city_requests.lock().push(params.clone());

        let ignore_cancel = *self.ignore_cancel.lock();
        match cancel {
            Some(signal) if !ignore_cancel => signal.guard(self.answer_list(params)).await,
            _signal => self.answer_list(params).await,
        }
    }

    async fn get_city(&self, id: &GeonameId) -> Result<CityInfo, ApiError> {
        self.city_lookups.lock().push(id.clone());

        let delay = *self.city_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing_cities.lock().contains(id) {
            return Err(server_error(&format!("/cities/{id}")));
        }

        let n: u64 = id.as_str().parse().unwrap_or_default();
        Ok(city(n))
    }

    async fn get_preferred_cities(&self) -> Result<PreferredIds, ApiError> {
        *self.preferred_requests.lock() += 1;

        {
            let mut failures = self.preferred_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(server_error("/preferences/cities"));
            }
        }

        Ok(PreferredIds {
            data: self.preferred.lock().clone(),
        })
    }

    async fn save_preferred_cities(&self, patch: &PreferredCitiesPatch) -> Result<(), ApiError> {
        if *self.fail_patches.lock() {
            return Err(server_error("/preferences/cities"));
        }
        self.patches.lock().push(patch.clone());
        Ok(())
    }
}
