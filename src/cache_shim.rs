// Cache-control shim
// Sits in front of any Transport. Requests for the critical files always go
// to the network with revalidation forced; a cached copy is only served when
// the network itself fails. Everything else is network-first with the same
// cache fallback. Cached generations are dropped periodically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ShimConfig;
use crate::transport::{CacheDirective, FetchRequest, FetchResponse, Transport, TransportError};

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub store_count: AtomicUsize,
    pub bypass_count: AtomicUsize,
    pub network_failures: AtomicUsize,
    pub purge_count: AtomicUsize,
    pub purged_entries: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStatsReport {
    pub hit_count: usize,
    pub miss_count: usize,
    pub store_count: usize,
    pub bypass_count: usize,
    pub network_failures: usize,
    pub purge_count: usize,
    pub purged_entries: usize,
}

impl CacheStats {
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            hit_count: self.hit_count.load(Ordering::SeqCst),
            miss_count: self.miss_count.load(Ordering::SeqCst),
            store_count: self.store_count.load(Ordering::SeqCst),
            bypass_count: self.bypass_count.load(Ordering::SeqCst),
            network_failures: self.network_failures.load(Ordering::SeqCst),
            purge_count: self.purge_count.load(Ordering::SeqCst),
            purged_entries: self.purged_entries.load(Ordering::SeqCst),
        }
    }
}

// Cache keys ignore the query string so cache-busted URLs still find the
// copy stored for the same resource.
pub fn cache_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: FetchResponse,
    stored_at: DateTime<Utc>,
}

/// Named cache generations of stored responses.
#[derive(Debug, Default)]
pub struct ResponseCache {
    generations: DashMap<String, DashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, cache_name: &str, url: &str, response: FetchResponse) {
        self.generations
            .entry(cache_name.to_string())
            .or_default()
            .insert(
                cache_key(url),
                CacheEntry {
                    response,
                    stored_at: Utc::now(),
                },
            );
    }

    // Looks through every generation, newest entry wins
    pub fn lookup(&self, url: &str) -> Option<FetchResponse> {
        let key = cache_key(url);
        self.generations
            .iter()
            .filter_map(|generation| generation.get(&key).map(|entry| entry.value().clone()))
            .max_by_key(|entry| entry.stored_at)
            .map(|entry| entry.response)
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.generations.iter().map(|g| g.key().clone()).collect()
    }

    /// Returns the number of entries dropped with the generation.
    pub fn delete(&self, cache_name: &str) -> usize {
        self.generations
            .remove(cache_name)
            .map_or(0, |(_, entries)| entries.len())
    }

    pub fn entry_count(&self) -> usize {
        self.generations.iter().map(|g| g.len()).sum()
    }

    fn delete_all(&self) -> usize {
        let names = self.cache_names();
        names.iter().map(|name| self.delete(name)).sum()
    }
}

pub struct CacheShim<T: Transport> {
    inner: T,
    config: ShimConfig,
    cache: Arc<ResponseCache>,
    stats: Arc<CacheStats>,
}

impl<T: Transport> CacheShim<T> {
    pub fn new(inner: T, config: ShimConfig) -> Self {
        Self {
            inner,
            config,
            cache: Arc::new(ResponseCache::new()),
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn stats(&self) -> CacheStatsReport {
        self.stats.report()
    }

    pub fn is_critical(&self, url: &str) -> bool {
        self.config
            .critical_files
            .iter()
            .any(|name| url.contains(name.as_str()))
    }

    /// Drops every cache generation other than the current one.
    pub fn activate(&self) -> usize {
        let mut removed = 0;
        for name in self.cache.cache_names() {
            if name != self.config.cache_name {
                info!(cache = %name, "deleting old cache");
                removed += self.cache.delete(&name);
            }
        }
        removed
    }

    pub fn purge_all(&self) -> usize {
        purge(&self.cache, &self.stats)
    }

    /// Purges every cache on a fixed interval until the handle is aborted.
    pub fn spawn_purge_task(&self, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);

        // interval panics on a zero period
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                purge(&cache, &stats);
            }
        })
    }

    fn revalidating(request: &FetchRequest) -> FetchRequest {
        request
            .clone()
            .with_cache(CacheDirective::NoStore)
            .with_header("Cache-Control", "no-cache, no-store, must-revalidate")
            .with_header("Pragma", "no-cache")
    }

    fn fallback(&self, request: &FetchRequest, err: TransportError) -> Result<FetchResponse, TransportError> {
        self.stats.network_failures.fetch_add(1, Ordering::SeqCst);
        match self.cache.lookup(&request.url) {
            Some(cached) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                warn!(url = %request.url, error = %err, "network failed, serving cached response");
                Ok(cached)
            }
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                debug!(url = %request.url, "network failed and nothing cached");
                Err(err)
            }
        }
    }
}

fn purge(cache: &ResponseCache, stats: &CacheStats) -> usize {
    let removed = cache.delete_all();
    stats.purge_count.fetch_add(1, Ordering::SeqCst);
    stats.purged_entries.fetch_add(removed, Ordering::SeqCst);
    debug!(removed, "purged response caches");
    removed
}

#[async_trait]
impl<T: Transport> Transport for CacheShim<T> {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let outgoing = if self.is_critical(&request.url) {
            self.stats.bypass_count.fetch_add(1, Ordering::SeqCst);
            debug!(url = %request.url, "bypassing cache for critical file");
            Self::revalidating(request)
        } else {
            request.clone()
        };

        match self.inner.send(&outgoing).await {
            Ok(response) => {
                if response.is_success() {
                    self.cache.put(&self.config.cache_name, &request.url, response.clone());
                    self.stats.store_count.fetch_add(1, Ordering::SeqCst);
                }
                Ok(response)
            }
            Err(err) => self.fallback(request, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::mock_transport::{MockOutcome, MockTransport};
    use bytes::Bytes;
    use test_case::test_case;

    const DOC: &str = r#"{"days":[]}"#;

    fn shim(script: Vec<MockOutcome>) -> (CacheShim<Arc<MockTransport>>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(script));
        (CacheShim::new(transport.clone(), ShimConfig::default()), transport)
    }

    fn response(url: &str, body: &'static str) -> FetchResponse {
        FetchResponse {
            url: url.to_string(),
            status: 200,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test_case("http://localhost/itinerary.json?v=1&_=2" => "http://localhost/itinerary.json")]
    #[test_case("http://localhost/map.js#top" => "http://localhost/map.js")]
    #[test_case("itinerary.json?v=3" => "itinerary.json" ; "relative url")]
    fn test_cache_key(url: &str) -> String {
        cache_key(url)
    }

    #[tokio::test]
    async fn test_critical_files_are_revalidated() {
        let (shim, transport) = shim(vec![MockOutcome::Respond(200, DOC)]);
        shim.send(&FetchRequest::get("http://localhost/itinerary.json?v=1"))
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.cache, CacheDirective::NoStore);
        assert_eq!(sent.header("cache-control"), Some("no-cache, no-store, must-revalidate"));
        assert_eq!(sent.header("pragma"), Some("no-cache"));
        assert_eq!(shim.stats().bypass_count, 1);
    }

    #[tokio::test]
    async fn test_other_requests_pass_through() {
        let (shim, transport) = shim(vec![MockOutcome::Respond(200, "body{}")]);
        shim.send(&FetchRequest::get("http://localhost/style.css"))
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.cache, CacheDirective::Default);
        assert!(sent.headers.is_empty());
        assert_eq!(shim.stats().bypass_count, 0);
    }

    #[tokio::test]
    async fn test_network_failure_serves_cached_copy() {
        let (shim, _transport) = shim(vec![
            MockOutcome::Respond(200, DOC),
            MockOutcome::Fail(TransportError::Blocked("offline".to_string())),
        ]);

        shim.send(&FetchRequest::get("http://localhost/itinerary.json?v=1"))
            .await
            .unwrap();
        let cached = shim
            .send(&FetchRequest::get("http://localhost/itinerary.json?v=2"))
            .await
            .unwrap();

        assert_eq!(&cached.body[..], DOC.as_bytes());
        let stats = shim.stats();
        assert_eq!(stats.store_count, 1);
        assert_eq!(stats.network_failures, 1);
        assert_eq!(stats.hit_count, 1);
    }

    #[tokio::test]
    async fn test_network_failure_without_cache_propagates() {
        let (shim, _transport) = shim(vec![MockOutcome::Fail(TransportError::TimedOut)]);
        let err = shim
            .send(&FetchRequest::get("http://localhost/itinerary.json"))
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::TimedOut);
        assert_eq!(shim.stats().miss_count, 1);
    }

    #[tokio::test]
    async fn test_http_errors_are_neither_cached_nor_replaced() {
        let (shim, _transport) = shim(vec![
            MockOutcome::Respond(200, DOC),
            MockOutcome::Respond(500, "boom"),
        ]);

        shim.send(&FetchRequest::get("http://localhost/itinerary.json"))
            .await
            .unwrap();
        let response = shim
            .send(&FetchRequest::get("http://localhost/itinerary.json"))
            .await
            .unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(shim.stats().store_count, 1);
        assert_eq!(
            &shim.cache().lookup("http://localhost/itinerary.json").unwrap().body[..],
            DOC.as_bytes()
        );
    }

    #[test]
    fn test_activate_drops_old_generations() {
        let (shim, _transport) = shim(vec![]);
        shim.cache().put("itinerary-cache-v0", "http://localhost/a", response("a", "old"));
        shim.cache().put("itinerary-cache-v0", "http://localhost/b", response("b", "old"));
        shim.cache().put("itinerary-cache-v1", "http://localhost/a", response("a", "new"));

        assert_eq!(shim.activate(), 2);
        assert_eq!(shim.cache().cache_names(), vec!["itinerary-cache-v1".to_string()]);
        assert_eq!(shim.cache().entry_count(), 1);
    }

    #[test]
    fn test_purge_all() {
        let (shim, _transport) = shim(vec![]);
        shim.cache().put("one", "http://localhost/a", response("a", "1"));
        shim.cache().put("two", "http://localhost/b", response("b", "2"));

        assert_eq!(shim.purge_all(), 2);
        assert_eq!(shim.cache().entry_count(), 0);
        assert!(shim.cache().lookup("http://localhost/a").is_none());

        let stats = shim.stats();
        assert_eq!(stats.purge_count, 1);
        assert_eq!(stats.purged_entries, 2);
    }

    #[test]
    fn test_lookup_prefers_newest_entry() {
        let cache = ResponseCache::new();
        cache.put("old", "http://localhost/itinerary.json", response("a", "first"));
        std::thread::sleep(Duration::from_millis(5));
        cache.put("new", "http://localhost/itinerary.json?v=9", response("b", "second"));

        let found = cache.lookup("http://localhost/itinerary.json").unwrap();
        assert_eq!(&found.body[..], b"second");
    }

    #[tokio::test]
    async fn test_periodic_purge() {
        let (shim, _transport) = shim(vec![]);
        shim.cache().put("itinerary-cache-v1", "http://localhost/a", response("a", "1"));

        let handle = shim.spawn_purge_task(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();

        assert_eq!(shim.cache().entry_count(), 0);
        assert!(shim.stats().purge_count >= 1);
    }

    #[test]
    fn test_critical_file_matching() {
        let (shim, _transport) = shim(vec![]);
        assert!(shim.is_critical("http://localhost/JpTravel/itinerary.json?v=1"));
        assert!(shim.is_critical("http://localhost/JpTravel/index.html"));
        assert!(!shim.is_critical("http://localhost/JpTravel/style.css"));
    }
}
