//! Cache-first access to the uNoGS catalog.
//!
//! Every fetch first asks the [`ResponseStore`] for a fresh entry and only
//! goes to the network on a miss. Network results are verified and
//! normalized before being stored, so a cached entry is always one that
//! normalized successfully once.

use crate::cache::ResponseStore;
use crate::error::CatalogError;
use crate::models::{GenreMap, GenreSelection, QueryFilters, QueryKind, RegionMap, TitleRecord, ALL_REGIONS};
use crate::normalize::{normalize_genres, normalize_regions, normalize_titles, verify};
use crate::query::{Endpoints, Fingerprint};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

/// Headers identifying the caller to RapidAPI.
#[derive(Clone)]
pub struct ApiHeaders {
    pub host: String,
    pub key: String,
}

impl ApiHeaders {
    pub fn new(host: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
        }
    }
}

impl fmt::Debug for ApiHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiHeaders")
            .field("host", &self.host)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Raw access to the provider. Timeouts and connection errors surface as
/// [`CatalogError::NetworkFailure`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str, headers: &ApiHeaders) -> Result<Value, CatalogError>;
}

pub struct CatalogClient<T: Transport> {
    transport: T,
    store: ResponseStore,
    endpoints: Endpoints,
    headers: ApiHeaders,
    genres: OnceCell<GenreMap>,
    regions: OnceCell<RegionMap>,
}

impl<T: Transport> CatalogClient<T> {
    pub fn new(transport: T, store: ResponseStore, endpoints: Endpoints, headers: ApiHeaders) -> Self {
        Self {
            transport,
            store,
            endpoints,
            headers,
            genres: OnceCell::new(),
            regions: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &ResponseStore {
        &self.store
    }

    /// Titles matching `filters`, served from cache when possible.
    ///
    /// The rating and title type filters are applied to the normalized
    /// records; a filter set that leaves nothing is an `EmptyResult`.
    #[instrument(skip(self))]
    pub async fn fetch_titles(&self, filters: &QueryFilters) -> Result<Vec<TitleRecord>, CatalogError> {
        filters.validate()?;
        let fingerprint = self.fingerprint(filters).await?;
        info!("Fetching titles available in: {}", filters.region);

        let titles = self.load_titles(&fingerprint).await?;
        let total = titles.len();
        let matching: Vec<TitleRecord> = titles.into_iter().filter(|t| filters.admits(t)).collect();

        if matching.is_empty() {
            info!("None of the {} titles passed the rating and type filters", total);
            return Err(CatalogError::EmptyResult);
        }

        debug!("{} of {} titles match the filters", matching.len(), total);
        Ok(matching)
    }

    /// The supercategory genres, built at most once per client.
    pub async fn fetch_genres(&self) -> Result<&GenreMap, CatalogError> {
        self.genres.get_or_try_init(|| self.load_genres()).await
    }

    /// The available regions, built at most once per client.
    pub async fn fetch_regions(&self) -> Result<&RegionMap, CatalogError> {
        self.regions.get_or_try_init(|| self.load_regions()).await
    }

    /// Resolve region and genre names, loading the listings only when a
    /// specific region or genre was chosen.
    pub async fn fingerprint(&self, filters: &QueryFilters) -> Result<Fingerprint, CatalogError> {
        let regions = if filters.region == ALL_REGIONS {
            None
        } else {
            Some(self.fetch_regions().await?)
        };
        let genres = match filters.genres {
            GenreSelection::Any => None,
            GenreSelection::Only(_) => Some(self.fetch_genres().await?),
        };
        Fingerprint::resolve(filters, regions, genres)
    }

    async fn load_titles(&self, fingerprint: &Fingerprint) -> Result<Vec<TitleRecord>, CatalogError> {
        if let Some(items) = self.store.get(QueryKind::Titles, Some(fingerprint)) {
            match normalize_titles(&items) {
                Ok(titles) => {
                    debug!("Using {} cached titles", titles.len());
                    return Ok(titles);
                }
                Err(e) => warn!("Discarding cached titles: {}", e),
            }
        }

        let url = self.endpoints.titles(fingerprint);
        let items = self.request(QueryKind::Titles, &url).await?;
        let titles = normalize_titles(&items).map_err(|e| log_format_error(QueryKind::Titles, e))?;
        self.save(QueryKind::Titles, Some(fingerprint), &items);

        info!("Retrieved {} titles", titles.len());
        Ok(titles)
    }

    async fn load_genres(&self) -> Result<GenreMap, CatalogError> {
        info!("Fetching list of genres");
        if let Some(items) = self.store.get(QueryKind::Genres, None) {
            match GenreMap::from_items(&items) {
                Ok(genres) => return Ok(genres),
                Err(e) => warn!("Discarding cached genres: {}", e),
            }
        }

        let items = self.request(QueryKind::Genres, &self.endpoints.genres()).await?;
        let genres = normalize_genres(&items).map_err(|e| log_format_error(QueryKind::Genres, e))?;
        self.save(QueryKind::Genres, None, &genres.to_items());
        Ok(genres)
    }

    async fn load_regions(&self) -> Result<RegionMap, CatalogError> {
        info!("Fetching list of available regions");
        if let Some(items) = self.store.get(QueryKind::Regions, None) {
            match RegionMap::from_items(&items) {
                Ok(regions) => return Ok(regions),
                Err(e) => warn!("Discarding cached regions: {}", e),
            }
        }

        let items = self.request(QueryKind::Regions, &self.endpoints.regions()).await?;
        let regions = normalize_regions(&items).map_err(|e| log_format_error(QueryKind::Regions, e))?;
        self.save(QueryKind::Regions, None, &regions.to_items());
        Ok(regions)
    }

    /// Call the provider and unwrap its `ITEMS` array.
    #[instrument(skip(self, kind, url), fields(kind = %kind))]
    async fn request(&self, kind: QueryKind, url: &str) -> Result<Vec<Value>, CatalogError> {
        info!("No usable saved response; querying the catalog");

        let raw = self.transport.fetch(url, &self.headers).await.map_err(|e| {
            error!("There was a problem contacting the catalog: {}", e);
            e
        })?;

        verify(&raw).map_err(|e| {
            if e.is_no_match() {
                info!("No matching {}", kind);
                e
            } else {
                log_format_error(kind, e)
            }
        })
    }

    fn save(&self, kind: QueryKind, fingerprint: Option<&Fingerprint>, items: &[Value]) {
        if let Err(e) = self.store.put(kind, fingerprint, items) {
            warn!("Failed to save {} response, continuing without caching: {}", kind, e);
        }
    }
}

fn log_format_error(kind: QueryKind, e: CatalogError) -> CatalogError {
    if e.needs_update() {
        error!("Could not read {} response, check the API for format changes: {}", kind, e);
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoreConfig;
    use crate::models::TitleType;
    use chrono::{Duration, Local};
    use serde_json::json;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const BASE_URL: &str = "https://mock.unogs.test";

    /// Transport double: canned payloads per URL plus a call log.
    #[derive(Clone, Default)]
    struct MockTransport {
        responses: Arc<Mutex<HashMap<String, Value>>>,
        calls: Arc<Mutex<Vec<(String, String)>>>,
        offline: Arc<Mutex<bool>>,
    }

    impl MockTransport {
        fn respond(&self, url: String, body: Value) {
            self.responses.lock().unwrap().insert(url, body);
        }

        fn go_offline(&self) {
            *self.offline.lock().unwrap() = true;
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch(&self, url: &str, headers: &ApiHeaders) -> Result<Value, CatalogError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), headers.key.clone()));
            if *self.offline.lock().unwrap() {
                return Err(CatalogError::NetworkFailure("connection refused".to_string()));
            }
            self.responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| CatalogError::NetworkFailure(format!("404 for {}", url)))
        }
    }

    fn endpoints() -> Endpoints {
        Endpoints::new(BASE_URL)
    }

    fn client(temp: &TempDir, transport: &MockTransport) -> CatalogClient<MockTransport> {
        let store = ResponseStore::open(StoreConfig::new(temp.path().join("netflixRoulette")));
        CatalogClient::new(
            transport.clone(),
            store,
            endpoints(),
            ApiHeaders::new("unogs-unogs-v1.p.rapidapi.com", "test-key"),
        )
    }

    fn raw_title(id: u32, kind: &str, rating: &str) -> Value {
        json!({
            "netflixid": id.to_string(),
            "title": format!("Title {}", id),
            "image": format!("https://img.example/{}.jpg", id),
            "synopsis": "Something happens.",
            "rating": rating,
            "type": kind,
            "released": "2016",
            "runtime": "1h40m"
        })
    }

    fn three_titles() -> Value {
        json!({
            "COUNT": "3",
            "ITEMS": [
                raw_title(1, "movie", "7.1"),
                raw_title(2, "series", "8.4"),
                raw_title(3, "movie", "5.0"),
            ]
        })
    }

    fn genres_payload() -> Value {
        json!({
            "COUNT": "4",
            "ITEMS": [
                { "All Action": [801362, 1568] },
                { "All Comedies": [6548] },
                { "Action Comedies": [43040] },
                { "Action Thrillers": [43048] },
            ]
        })
    }

    fn regions_payload() -> Value {
        json!({
            "COUNT": "2",
            "ITEMS": [
                ["21", "ar", "Argentina ", "4.99", "ARS"],
                ["267", "jp", "Japan", "702", "JPY"],
            ]
        })
    }

    fn action_fingerprint() -> Fingerprint {
        Fingerprint::from_parts("all", &BTreeSet::from([801362, 1568]))
    }

    #[tokio::test]
    async fn test_titles_are_cached_after_first_fetch() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        transport.respond(endpoints().genres(), genres_payload());
        let fp = action_fingerprint();
        transport.respond(endpoints().titles(&fp), three_titles());

        let client = client(&temp, &transport);
        let filters = QueryFilters::default().with_genres(["Action"]);

        let first = client.fetch_titles(&filters).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(transport.calls_to(&endpoints().titles(&fp)), 1);

        let cached = client.store().get(QueryKind::Titles, Some(&fp)).unwrap();
        assert_eq!(cached.len(), 3);

        let second = client.fetch_titles(&filters).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(transport.calls_to(&endpoints().titles(&fp)), 1);
        assert_eq!(transport.calls_to(&endpoints().genres()), 1);
    }

    #[tokio::test]
    async fn test_new_client_reuses_disk_cache() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        transport.respond(endpoints().regions(), regions_payload());
        transport.respond(endpoints().genres(), genres_payload());

        {
            let client = client(&temp, &transport);
            client.fetch_regions().await.unwrap();
            client.fetch_genres().await.unwrap();
        }
        assert_eq!(transport.total_calls(), 2);

        transport.go_offline();
        let client = client(&temp, &transport);
        let regions = client.fetch_regions().await.unwrap();
        assert_eq!(regions.code("Argentina"), Some("21"));
        assert_eq!(regions.names()[0], ALL_REGIONS);

        let genres = client.fetch_genres().await.unwrap();
        assert_eq!(genres.names().collect::<Vec<_>>(), vec!["Action", "Comedies"]);
        assert_eq!(transport.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_region_filter_resolves_code() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        transport.respond(endpoints().regions(), regions_payload());
        let fp = Fingerprint::from_parts("267", &BTreeSet::new());
        transport.respond(endpoints().titles(&fp), three_titles());

        let client = client(&temp, &transport);
        let filters = QueryFilters::default().with_region("Japan");

        assert_eq!(client.fingerprint(&filters).await.unwrap(), fp);
        assert_eq!(client.fetch_titles(&filters).await.unwrap().len(), 3);
        assert_eq!(transport.calls_to(&endpoints().genres()), 0);
    }

    #[tokio::test]
    async fn test_credential_is_sent_with_requests() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        transport.respond(endpoints().genres(), genres_payload());

        client(&temp, &transport).fetch_genres().await.unwrap();
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, "test-key");
    }

    #[tokio::test]
    async fn test_network_failure_is_reported_once() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        transport.go_offline();

        let client = client(&temp, &transport);
        let result = client.fetch_titles(&QueryFilters::default()).await;

        assert!(matches!(result, Err(CatalogError::NetworkFailure(_))));
        assert_eq!(transport.total_calls(), 1);
        assert_eq!(client.store().file_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_items_is_empty_result_and_not_cached() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        let fp = Fingerprint::from_parts("all", &BTreeSet::new());
        transport.respond(endpoints().titles(&fp), json!({ "COUNT": "0", "ITEMS": [] }));

        let client = client(&temp, &transport);
        let result = client.fetch_titles(&QueryFilters::default()).await;

        assert!(matches!(result, Err(CatalogError::EmptyResult)));
        assert_eq!(client.store().file_count(), 0);
    }

    #[tokio::test]
    async fn test_changed_payload_needs_update() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        let fp = Fingerprint::from_parts("all", &BTreeSet::new());
        transport.respond(
            endpoints().titles(&fp),
            json!({ "ITEMS": [ { "netflixid": "1", "name": "renamed field" } ] }),
        );
        transport.respond(endpoints().genres(), json!({ "ITEMS": [ { "Action": [1] } ] }));

        let client = client(&temp, &transport);

        let titles = client.fetch_titles(&QueryFilters::default()).await;
        assert!(matches!(titles, Err(CatalogError::MalformedResponse(_))));

        let genres = client.fetch_genres().await;
        assert!(matches!(genres, Err(CatalogError::UnexpectedFormat(_))));
        assert_eq!(client.store().file_count(), 0);
    }

    #[tokio::test]
    async fn test_local_filters_can_empty_the_result() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        let fp = Fingerprint::from_parts("all", &BTreeSet::new());
        transport.respond(endpoints().titles(&fp), three_titles());

        let client = client(&temp, &transport);

        let series = QueryFilters::default().with_title_type(TitleType::Series);
        let titles = client.fetch_titles(&series).await.unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].id, "2");

        let unreachable = QueryFilters::default().with_ratings(9.0, 10.0);
        assert!(matches!(
            client.fetch_titles(&unreachable).await,
            Err(CatalogError::EmptyResult)
        ));
        assert_eq!(transport.calls_to(&endpoints().titles(&fp)), 1);
    }

    #[tokio::test]
    async fn test_invalid_filters_never_reach_the_network() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        let client = client(&temp, &transport);

        let inverted = QueryFilters::default().with_ratings(8.0, 2.0);
        assert!(matches!(
            client.fetch_titles(&inverted).await,
            Err(CatalogError::PreconditionViolation(_))
        ));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_genres_are_refetched() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        transport.respond(endpoints().genres(), genres_payload());

        let client = client(&temp, &transport);
        let old = Local::now().date_naive() - Duration::days(30);
        client
            .store()
            .put_dated(QueryKind::Genres, None, &[json!({ "Old": [1] })], old)
            .unwrap();

        let genres = client.fetch_genres().await.unwrap();
        assert!(genres.ids("Old").is_none());
        assert_eq!(transport.calls_to(&endpoints().genres()), 1);
        assert!(client.store().get(QueryKind::Genres, None).is_some());
    }

    #[tokio::test]
    async fn test_unreadable_cached_titles_are_refetched() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        let fp = Fingerprint::from_parts("all", &BTreeSet::new());
        transport.respond(endpoints().titles(&fp), three_titles());

        let client = client(&temp, &transport);
        client
            .store()
            .put(QueryKind::Titles, Some(&fp), &[json!({ "garbage": true })])
            .unwrap();

        let titles = client.fetch_titles(&QueryFilters::default()).await.unwrap();
        assert_eq!(titles.len(), 3);
        assert_eq!(transport.calls_to(&endpoints().titles(&fp)), 1);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let transport = MockTransport::default();
        let fp = Fingerprint::from_parts("all", &BTreeSet::new());
        transport.respond(endpoints().titles(&fp), three_titles());

        let client = client(&temp, &transport);
        let directory = client.store().directory().to_path_buf();
        std::fs::remove_dir_all(&directory).unwrap();
        std::fs::write(&directory, "not a directory").unwrap();

        let titles = client.fetch_titles(&QueryFilters::default()).await.unwrap();
        assert_eq!(titles.len(), 3);
    }

    #[tokio::test]
    async fn test_unusable_cache_directory_still_fetches() {
        let temp = TempDir::new().unwrap();
        let blocked = temp.path().join("netflixRoulette");
        std::fs::write(&blocked, "not a directory").unwrap();

        let transport = MockTransport::default();
        let fp = Fingerprint::from_parts("all", &BTreeSet::new());
        transport.respond(endpoints().titles(&fp), three_titles());
        transport.respond(endpoints().regions(), regions_payload());

        let client = CatalogClient::new(
            transport.clone(),
            ResponseStore::open(StoreConfig::new(&blocked)),
            endpoints(),
            ApiHeaders::new("unogs-unogs-v1.p.rapidapi.com", "test-key"),
        );

        let titles = client.fetch_titles(&QueryFilters::default()).await.unwrap();
        assert_eq!(titles.len(), 3);
        assert_eq!(client.fetch_regions().await.unwrap().code("Japan"), Some("267"));
        assert_eq!(client.store().file_count(), 0);
    }
}
