use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;

use crate::{
    api::CitiesApi,
    error::ApiError,
    model::{CityInfo, GeonameId, PreferredCitiesPatch},
    retry::{RetryPolicy, retry_with},
};

/// What is known locally about one preferred city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "city", rename_all = "lowercase")]
pub enum PreferredEntry {
    Pending,
    Loaded(CityInfo),
    #[serde(rename = "error")]
    Failed,
}

impl PreferredEntry {
    pub fn city(&self) -> Option<&CityInfo> {
        match self {
            PreferredEntry::Loaded(city) => Some(city),
            PreferredEntry::Pending | PreferredEntry::Failed => None,
        }
    }
}

/// Preferred cities keyed by id, with the ids currently loading or failed.
///
/// Every transition goes through the methods below, which keep an id in at
/// most one of `loading_ids`, `error_ids` or a `Loaded` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreferredCitiesState {
    pub entries: BTreeMap<GeonameId, PreferredEntry>,
    pub error_ids: BTreeSet<GeonameId>,
    /// Ids with a detail fetch in flight, mapped to that fetch's number.
    /// Only the fetch recorded here may commit a result.
    pub loading_ids: BTreeMap<GeonameId, u64>,
    #[serde(skip)]
    last_fetch: u64,
}

impl PreferredCitiesState {
    fn from_ids(ids: &[GeonameId]) -> Self {
        let entries = ids.iter().fold(BTreeMap::new(), |mut acc, id| {
            acc.insert(id.clone(), PreferredEntry::Pending);
            acc
        });

        Self {
            entries,
            ..Self::default()
        }
    }

    /// Start over from a fresh id list. Fetches still running for listed ids
    /// stay in flight and are not started again.
    fn replace_ids(&mut self, ids: &[GeonameId]) {
        let fresh = Self::from_ids(ids);
        let loading = ids
            .iter()
            .filter_map(|id| self.loading_ids.get_key_value(id))
            .map(|(id, fetch)| (id.clone(), *fetch))
            .collect();

        self.entries = fresh.entries;
        self.error_ids.clear();
        self.loading_ids = loading;
    }

    /// Returns the new fetch's number, or `None` when one is already running.
    fn begin_fetch(&mut self, id: &GeonameId) -> Option<u64> {
        if self.loading_ids.contains_key(id) {
            return None;
        }
        self.last_fetch += 1;
        self.loading_ids.insert(id.clone(), self.last_fetch);
        self.error_ids.remove(id);
        self.entries.insert(id.clone(), PreferredEntry::Pending);
        Some(self.last_fetch)
    }

    /// Results of fetches that are no longer the recorded one for `id` are
    /// dropped.
    fn finish_fetch(
        &mut self,
        id: &GeonameId,
        fetch: u64,
        result: Result<CityInfo, ApiError>,
    ) -> bool {
        if self.loading_ids.get(id) != Some(&fetch) {
            return false;
        }
        self.loading_ids.remove(id);
        match result {
            Ok(city) => {
                self.error_ids.remove(id);
                self.entries.insert(id.clone(), PreferredEntry::Loaded(city));
            }
            Err(_) => {
                self.error_ids.insert(id.clone());
                self.entries.insert(id.clone(), PreferredEntry::Failed);
            }
        }
        true
    }

    fn select(&mut self, city: CityInfo) {
        self.loading_ids.remove(&city.id);
        self.error_ids.remove(&city.id);
        self.entries.insert(city.id.clone(), PreferredEntry::Loaded(city));
    }

    fn deselect(&mut self, id: &GeonameId) {
        self.loading_ids.remove(id);
        self.error_ids.remove(id);
        self.entries.remove(id);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.error_ids.clear();
        self.loading_ids.clear();
    }

    pub fn loaded(&self) -> impl Iterator<Item = &CityInfo> {
        self.entries.values().filter_map(PreferredEntry::city)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: PreferredCitiesState,
    /// Detail fetches not yet joined. Each task holds a clone of the store's
    /// `Arc`, so the set outlives every task it owns.
    tasks: JoinSet<()>,
}

/// Tasks taken out of the store by [`PreferredCitiesStore::settled`]. If that
/// future is dropped early the remaining fetches keep running.
struct Detached(JoinSet<()>);

impl Drop for Detached {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

/// The user's preferred cities.
///
/// Details are fetched one request per city so that each entry resolves, or
/// fails, on its own. Fan-out operations return once the requests are
/// scheduled; [`settled`](Self::settled) waits for them.
#[derive(Debug, Clone)]
pub struct PreferredCitiesStore {
    api: Arc<dyn CitiesApi>,
    inner: Arc<Mutex<Inner>>,
}

impl PreferredCitiesStore {
    pub fn new(api: Arc<dyn CitiesApi>) -> Self {
        Self {
            api,
            inner: Arc::default(),
        }
    }

    /// Fetch the preferred ids, mark them all pending and start loading each
    /// city's details. Returns the number of detail fetches started; ids
    /// whose details are already loading keep their running fetch.
    pub async fn load_preferred(&self) -> Result<usize, ApiError> {
        let preferred = self.api.get_preferred_cities().await?;
        tracing::debug!(count = preferred.data.len(), "preferred cities loaded");

        self.inner.lock().state.replace_ids(&preferred.data);
        Ok(self.spawn_fetches(preferred.data))
    }

    /// [`load_preferred`](Self::load_preferred) with the id list request
    /// retried according to `policy`.
    pub async fn load_preferred_with_retry(&self, policy: RetryPolicy) -> Result<usize, ApiError> {
        retry_with(policy, || self.load_preferred()).await
    }

    /// Fetch one failed city again. Returns `false` if `id` is not failed.
    pub fn retry_failed(&self, id: &GeonameId) -> bool {
        if !self.inner.lock().state.error_ids.contains(id) {
            return false;
        }
        self.spawn_fetches([id.clone()]) == 1
    }

    /// Fetch every failed city again, each independently.
    pub fn retry_all_failed(&self) -> usize {
        let failed: Vec<GeonameId> = self.inner.lock().state.error_ids.iter().cloned().collect();
        self.spawn_fetches(failed)
    }

    /// Persist the (de)selection of `city`; local state changes only once the
    /// server has accepted it.
    pub async fn set_preferred(&self, city: CityInfo, selected: bool) -> Result<(), ApiError> {
        self.persist(PreferredCitiesPatch::from([(city.id.clone(), selected)]))
            .await?;

        let mut inner = self.inner.lock();
        if selected {
            inner.state.select(city);
        } else {
            inner.state.deselect(&city.id);
        }
        Ok(())
    }

    /// Deselect by id, for entries whose details never loaded.
    pub async fn remove_preferred(&self, id: &GeonameId) -> Result<(), ApiError> {
        self.persist(PreferredCitiesPatch::from([(id.clone(), false)]))
            .await?;

        self.inner.lock().state.deselect(id);
        Ok(())
    }

    /// Deselect every preferred city in a single request, then forget them.
    pub async fn reset_all(&self) -> Result<(), ApiError> {
        let patch: PreferredCitiesPatch = self
            .inner
            .lock()
            .state
            .entries
            .keys()
            .map(|id| (id.clone(), false))
            .collect();

        if patch.is_empty() {
            return Ok(());
        }

        self.persist(patch).await?;
        self.inner.lock().state.clear();
        Ok(())
    }

    /// Wait until every detail fetch started so far has finished.
    pub async fn settled(&self) {
        loop {
            let mut tasks = Detached(std::mem::take(&mut self.inner.lock().tasks));
            if tasks.0.is_empty() {
                return;
            }
            while let Some(joined) = tasks.0.join_next().await {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "preferred city task did not complete");
                }
            }
        }
    }

    async fn persist(&self, patch: PreferredCitiesPatch) -> Result<(), ApiError> {
        self.api.save_preferred_cities(&patch).await?;
        tracing::info!(changes = patch.len(), "preferred cities saved");
        Ok(())
    }

    fn spawn_fetches(&self, ids: impl IntoIterator<Item = GeonameId>) -> usize {
        let mut inner = self.inner.lock();
        while inner.tasks.try_join_next().is_some() {}

        let mut started = 0;
        for id in ids {
            let Some(fetch) = inner.state.begin_fetch(&id) else {
                continue;
            };

            let api = Arc::clone(&self.api);
            let shared = Arc::clone(&self.inner);
            inner.tasks.spawn(async move {
                let result = api.get_city(&id).await;
                if let Err(err) = &result {
                    tracing::warn!(%id, error = %err, "failed to load preferred city");
                }
                if !shared.lock().state.finish_fetch(&id, fetch, result) {
                    tracing::debug!(%id, fetch, "dropping stale preferred city result");
                }
            });
            started += 1;
        }
        started
    }

    pub fn preferred_cities(&self) -> BTreeMap<GeonameId, PreferredEntry> {
        self.inner.lock().state.entries.clone()
    }

    pub fn preferred_cities_with_error(&self) -> BTreeSet<GeonameId> {
        self.inner.lock().state.error_ids.clone()
    }

    pub fn preferred_cities_loading(&self) -> BTreeSet<GeonameId> {
        self.inner.lock().state.loading_ids.keys().cloned().collect()
    }

    pub fn loaded_cities(&self) -> Vec<CityInfo> {
        self.inner.lock().state.loaded().cloned().collect()
    }

    pub fn snapshot(&self) -> PreferredCitiesState {
        self.inner.lock().state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(id: u64) -> CityInfo {
        CityInfo {
            id: GeonameId::from(id),
            name: format!("city_{id}"),
            country: format!("country_{id}"),
            subregion: None,
        }
    }

    fn ids(raw: &[u64]) -> Vec<GeonameId> {
        raw.iter().copied().map(GeonameId::from).collect()
    }

    #[test]
    fn from_ids_marks_everything_pending() {
        let state = PreferredCitiesState::from_ids(&ids(&[3, 1, 2]));

        assert_eq!(state.entries.len(), 3);
        assert!(state.entries.values().all(|e| *e == PreferredEntry::Pending));
        assert!(state.error_ids.is_empty());
    }

    #[test]
    fn fetch_lifecycle_moves_id_between_sets() {
        let id = GeonameId::from(7);
        let mut state = PreferredCitiesState::from_ids(&[id.clone()]);

        let first = state.begin_fetch(&id).unwrap();
        assert_eq!(state.begin_fetch(&id), None, "second fetch for a loading id");
        assert!(state.finish_fetch(&id, first, Err(ApiError::Canceled)));
        assert!(state.error_ids.contains(&id));
        assert!(state.loading_ids.is_empty());
        assert_eq!(state.entries[&id], PreferredEntry::Failed);

        let second = state.begin_fetch(&id).unwrap();
        assert_ne!(first, second);
        assert!(!state.error_ids.contains(&id));
        assert!(state.finish_fetch(&id, second, Ok(city(7))));
        assert_eq!(state.entries[&id], PreferredEntry::Loaded(city(7)));
        assert!(state.error_ids.is_empty() && state.loading_ids.is_empty());
    }

    #[test]
    fn result_for_removed_id_is_dropped() {
        let id = GeonameId::from(4);
        let mut state = PreferredCitiesState::from_ids(&[id.clone()]);

        let fetch = state.begin_fetch(&id).unwrap();
        state.deselect(&id);

        assert!(!state.finish_fetch(&id, fetch, Ok(city(4))));
        assert!(state.entries.is_empty());
    }

    #[test]
    fn only_the_latest_fetch_for_an_id_commits() {
        let id = GeonameId::from(4);
        let mut state = PreferredCitiesState::from_ids(&[id.clone()]);

        let old = state.begin_fetch(&id).unwrap();
        state.deselect(&id);
        state.replace_ids(&[id.clone()]);
        let new = state.begin_fetch(&id).unwrap();

        assert!(!state.finish_fetch(&id, old, Err(ApiError::Canceled)));
        assert_eq!(state.entries[&id], PreferredEntry::Pending);
        assert!(state.loading_ids.contains_key(&id));

        assert!(state.finish_fetch(&id, new, Ok(city(4))));
        assert_eq!(state.entries[&id], PreferredEntry::Loaded(city(4)));
    }

    #[test]
    fn replacing_ids_keeps_running_fetches_of_listed_ids() {
        let mut state = PreferredCitiesState::from_ids(&ids(&[1, 2]));
        let one = state.begin_fetch(&GeonameId::from(1)).unwrap();
        state.begin_fetch(&GeonameId::from(2)).unwrap();

        state.replace_ids(&ids(&[1, 3]));

        assert_eq!(state.loading_ids.get(&GeonameId::from(1)), Some(&one));
        assert!(!state.loading_ids.contains_key(&GeonameId::from(2)));
        assert_eq!(state.begin_fetch(&GeonameId::from(1)), None);
        assert!(state.begin_fetch(&GeonameId::from(3)).is_some());
        assert_eq!(state.entries.len(), 2);
    }

    #[test]
    fn select_overrides_failed_entry() {
        let id = GeonameId::from(9);
        let mut state = PreferredCitiesState::from_ids(&[id.clone()]);
        let fetch = state.begin_fetch(&id).unwrap();
        state.finish_fetch(&id, fetch, Err(ApiError::Canceled));

        state.select(city(9));

        assert_eq!(state.entries[&id], PreferredEntry::Loaded(city(9)));
        assert!(state.error_ids.is_empty());
    }

    #[test]
    fn entries_serialize_with_state_tag() {
        let json = serde_json::to_value(PreferredEntry::Failed).unwrap();
        assert_eq!(json, serde_json::json!({"state": "error"}));

        let json = serde_json::to_value(PreferredEntry::Pending).unwrap();
        assert_eq!(json, serde_json::json!({"state": "pending"}));
    }
}
