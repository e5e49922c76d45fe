// Resilient itinerary loader
// Walks an ordered list of fetch strategies, one at a time, until one of them
// yields a parsed itinerary. Every attempt has its own deadline, so a stuck
// request can never block the strategies behind it.

use parking_lot::Mutex;
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{EnvironmentProfile, IndicatorKind, LoaderConfig};
use crate::itinerary::Itinerary;
use crate::transport::{CacheDirective, FetchRequest, Transport, TransportError, TransportKind};

// Terminal and per-attempt failures of the loader
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network request blocked: {0}")]
    NetworkBlocked(String),

    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    #[error("Invalid itinerary JSON: {0}")]
    Parse(String),

    #[error("All {attempts} fetch strategies failed; last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    NetworkBlocked,
    Http,
    Parse,
    Exhausted,
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::Timeout { .. } => ErrorKind::Timeout,
            LoadError::NetworkBlocked(_) => ErrorKind::NetworkBlocked,
            LoadError::Http { .. } => ErrorKind::Http,
            LoadError::Parse(_) => ErrorKind::Parse,
            LoadError::Exhausted { .. } => ErrorKind::Exhausted,
        }
    }

    fn from_transport(err: TransportError, timeout: Duration) -> Self {
        match err {
            TransportError::TimedOut => LoadError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            TransportError::Blocked(msg) | TransportError::InvalidRequest(msg) => {
                LoadError::NetworkBlocked(msg)
            }
        }
    }
}

// Where a strategy points its request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Relative,
    CacheBusted,
    FallbackOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub label: String,
    pub transport: TransportKind,
    pub target: Target,
    pub cache: CacheDirective,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Strategy {
    pub fn new(label: impl Into<String>, target: Target, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            transport: TransportKind::Fetch,
            target,
            cache: CacheDirective::Default,
            headers: Vec::new(),
            timeout,
        }
    }

    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn cache(mut self, cache: CacheDirective) -> Self {
        self.cache = cache;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn resolve_url(&self, config: &LoaderConfig) -> Result<String, LoadError> {
        let base = match self.target {
            Target::Relative | Target::CacheBusted => &config.base_url,
            Target::FallbackOrigin => &config.fallback_origin,
        };

        let mut directory = Url::parse(base).map_err(|e| invalid_url(base, e))?;
        // The base names a directory even when written without a trailing slash
        if !directory.path().ends_with('/') {
            let path = format!("{}/", directory.path());
            directory.set_path(&path);
        }
        let mut url = directory
            .join(&config.resource_name)
            .map_err(|e| invalid_url(base, e))?;

        if self.target != Target::Relative {
            url.query_pairs_mut()
                .append_pair("v", &chrono::Utc::now().timestamp_millis().to_string())
                .append_pair("_", &rand::random::<u32>().to_string());
        }

        Ok(url.to_string())
    }

    fn request(&self, url: String) -> FetchRequest {
        let mut request = FetchRequest::get(url)
            .with_kind(self.transport)
            .with_cache(self.cache);
        for (name, value) in &self.headers {
            request = request.with_header(name.as_str(), value.as_str());
        }
        request
    }
}

fn invalid_url(base: &str, err: impl std::fmt::Display) -> LoadError {
    LoadError::NetworkBlocked(format!("invalid url {}: {}", base, err))
}

/// Ordered fallback chain. Adding or removing a way of fetching the document
/// is a change to this list, never to the loop that consumes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyChain {
    strategies: Vec<Strategy>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn for_environment(env: &EnvironmentProfile, config: &LoaderConfig) -> Self {
        let timeout = env.default_timeout();
        let mut strategies = vec![Strategy::new("plain", Target::Relative, timeout)
            .cache(CacheDirective::NoStore)];

        // A reload directive only matters where there is a cache to bypass
        if env.supports_cache_api {
            strategies.push(
                Strategy::new("cache-busted", Target::CacheBusted, timeout)
                    .cache(CacheDirective::Reload)
                    .header("Cache-Control", "no-cache, no-store, must-revalidate")
                    .header("Pragma", "no-cache")
                    .header("Expires", "0"),
            );
        }

        strategies.push(
            Strategy::new("xhr", Target::CacheBusted, timeout)
                .transport(TransportKind::Xhr)
                .cache(CacheDirective::NoCache)
                .header("Accept", "application/json"),
        );
        strategies.push(
            Strategy::new(
                "fallback-origin",
                Target::FallbackOrigin,
                timeout * config.fallback_timeout_multiplier,
            )
            .cache(CacheDirective::NoStore)
            .header("Accept", "application/json"),
        );

        Self { strategies }
    }

    pub fn push(&mut self, strategy: Strategy) {
        self.strategies.push(strategy);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.label.as_str()).collect()
    }

    // Sum of every deadline: how long a fully failing load can take
    pub fn worst_case_latency(&self) -> Duration {
        self.strategies.iter().map(|s| s.timeout).sum()
    }
}

// Best-effort loading feedback; never affects the load result
pub trait LoadingIndicator: Send + Sync {
    fn show(&self, kind: IndicatorKind);
    fn hide(&self, kind: IndicatorKind);
}

pub struct NoIndicator;

impl LoadingIndicator for NoIndicator {
    fn show(&self, _kind: IndicatorKind) {}
    fn hide(&self, _kind: IndicatorKind) {}
}

/// Tracks indicator visibility so the rendered page can reflect it.
#[derive(Debug, Default)]
pub struct IndicatorPanel {
    visible: Mutex<Vec<IndicatorKind>>,
    toggles: Mutex<usize>,
}

impl IndicatorPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self, kind: IndicatorKind) -> bool {
        self.visible.lock().contains(&kind)
    }

    pub fn toggle_count(&self) -> usize {
        *self.toggles.lock()
    }
}

impl LoadingIndicator for IndicatorPanel {
    fn show(&self, kind: IndicatorKind) {
        let mut visible = self.visible.lock();
        if !visible.contains(&kind) {
            visible.push(kind);
        }
        *self.toggles.lock() += 1;
    }

    fn hide(&self, kind: IndicatorKind) {
        self.visible.lock().retain(|k| *k != kind);
        *self.toggles.lock() += 1;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoaderStats {
    pub loads: usize,
    pub attempts: usize,
    pub successes: usize,
    pub exhausted: usize,
    pub timeouts: usize,
    pub network_blocked: usize,
    pub http_errors: usize,
    pub parse_errors: usize,
    pub last_success_strategy: Option<String>,
    pub last_load_ms: u64,
}

impl LoaderStats {
    fn record_failure(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::Timeout => self.timeouts += 1,
            ErrorKind::NetworkBlocked => self.network_blocked += 1,
            ErrorKind::Http => self.http_errors += 1,
            ErrorKind::Parse => self.parse_errors += 1,
            ErrorKind::Exhausted => self.exhausted += 1,
        }
    }
}

pub struct Loader<T: Transport> {
    transport: T,
    config: LoaderConfig,
    environment: EnvironmentProfile,
    chain: StrategyChain,
    indicator: Arc<dyn LoadingIndicator>,
    stats: Mutex<LoaderStats>,
}

impl<T: Transport> Loader<T> {
    pub fn new(transport: T, config: LoaderConfig, environment: EnvironmentProfile) -> Self {
        let chain = StrategyChain::for_environment(&environment, &config);
        Self {
            transport,
            config,
            environment,
            chain,
            indicator: Arc::new(NoIndicator),
            stats: Mutex::new(LoaderStats::default()),
        }
    }

    pub fn with_chain(mut self, chain: StrategyChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn LoadingIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats.lock().clone()
    }

    /// Tries each strategy in order and stops at the first success. Attempt
    /// N+1 only starts after attempt N has settled.
    pub async fn load(&self) -> Result<Itinerary, LoadError> {
        let started = Instant::now();
        let mut attempts = 0;
        let mut last_error: Option<LoadError> = None;

        self.stats.lock().loads += 1;
        info!(
            resource = %self.config.resource_name,
            strategies = self.chain.len(),
            "loading itinerary"
        );

        for strategy in self.chain.iter() {
            attempts += 1;
            self.stats.lock().attempts += 1;

            if let Some(kind) = self.environment.indicator {
                self.indicator.show(kind);
            }
            let result = self.attempt(strategy).await;
            if let Some(kind) = self.environment.indicator {
                self.indicator.hide(kind);
            }

            match result {
                Ok(itinerary) => {
                    let mut stats = self.stats.lock();
                    stats.successes += 1;
                    stats.last_success_strategy = Some(strategy.label.clone());
                    stats.last_load_ms = started.elapsed().as_millis() as u64;
                    info!(
                        strategy = %strategy.label,
                        attempt = attempts,
                        days = itinerary.days.len(),
                        "itinerary loaded"
                    );
                    return Ok(itinerary);
                }
                Err(err) => {
                    warn!(strategy = %strategy.label, attempt = attempts, error = %err, "fetch strategy failed");
                    self.stats.lock().record_failure(err.kind());
                    last_error = Some(err);
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no fetch strategies configured".to_string());
        let mut stats = self.stats.lock();
        stats.record_failure(ErrorKind::Exhausted);
        stats.last_load_ms = started.elapsed().as_millis() as u64;

        Err(LoadError::Exhausted {
            attempts,
            last_error,
        })
    }

    async fn attempt(&self, strategy: &Strategy) -> Result<Itinerary, LoadError> {
        let url = strategy.resolve_url(&self.config)?;
        let request = strategy.request(url);
        debug!(strategy = %strategy.label, url = %request.url, timeout_ms = strategy.timeout.as_millis() as u64, "attempting fetch");

        let response = match tokio::time::timeout(strategy.timeout, self.transport.send(&request)).await {
            Err(_) => {
                return Err(LoadError::Timeout {
                    timeout_ms: strategy.timeout.as_millis() as u64,
                })
            }
            Ok(Err(err)) => return Err(LoadError::from_transport(err, strategy.timeout)),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(LoadError::Http {
                status: response.status,
            });
        }

        Itinerary::from_slice(&response.body)
    }
}
