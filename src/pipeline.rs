// Page-load pipeline: one load, one terminal outcome, one render call.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache_shim::CacheShim;
use crate::config::ViewerConfig;
use crate::loader::{LoadError, Loader};
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::view::ViewController;

#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    Rendered { days: usize, markers: usize },
    Failed { message: String },
}

impl TerminalOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, TerminalOutcome::Rendered { .. })
    }
}

pub type ShimmedTransport = Arc<CacheShim<HttpTransport>>;

/// A loader over real HTTP with the cache shim in front of it. Owns the
/// shim's purge task and stops it when dropped.
pub struct HttpLoader {
    loader: Loader<ShimmedTransport>,
    shim: ShimmedTransport,
    purge_task: JoinHandle<()>,
}

impl HttpLoader {
    pub fn loader(&self) -> &Loader<ShimmedTransport> {
        &self.loader
    }

    pub fn shim(&self) -> &CacheShim<HttpTransport> {
        &self.shim
    }

    pub fn purge_task(&self) -> &JoinHandle<()> {
        &self.purge_task
    }
}

impl Drop for HttpLoader {
    fn drop(&mut self) {
        self.purge_task.abort();
    }
}

/// Builds the HTTP loader, activates the current cache generation and starts
/// the periodic purge. Must be called from within a tokio runtime.
pub fn http_loader(config: &ViewerConfig) -> Result<HttpLoader, TransportError> {
    let shim = Arc::new(CacheShim::new(HttpTransport::new()?, config.shim.clone()));

    let removed = shim.activate();
    let purge_task = shim.spawn_purge_task(config.shim.purge_interval());
    info!(
        cache = %config.shim.cache_name,
        removed,
        purge_interval_seconds = config.shim.purge_interval_seconds,
        "cache shim active"
    );

    let loader = Loader::new(
        Arc::clone(&shim),
        config.loader.clone(),
        config.environment.clone(),
    );
    Ok(HttpLoader {
        loader,
        shim,
        purge_task,
    })
}

/// Runs the loader once and hands its result to exactly one of the view's
/// success or error paths.
pub async fn run<T: Transport>(loader: &Loader<T>, view: &mut ViewController) -> TerminalOutcome {
    match loader.load().await {
        Ok(itinerary) => {
            view.render(&itinerary);
            let markers = view.map().map_or(0, |map| map.marker_count());
            TerminalOutcome::Rendered {
                days: itinerary.days.len(),
                markers,
            }
        }
        Err(err) => {
            let message = failure_message(&err);
            info!(error = %err, "itinerary load failed");
            view.show_error(&message);
            TerminalOutcome::Failed { message }
        }
    }
}

fn failure_message(err: &LoadError) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        "Unknown error while loading itinerary".to_string()
    } else {
        message
    }
}
