// Itinerary viewer: loads a travel itinerary document through a chain of
// fallback fetch strategies and renders it as day tabs plus a marker map.

pub mod cache_shim;
pub mod config;
pub mod itinerary;
pub mod loader;
pub mod map;
pub mod markup;
pub mod pipeline;
pub mod transport;
pub mod view;

// Re-export key types for convenience
pub use cache_shim::{CacheShim, CacheStatsReport, ResponseCache};
pub use config::{
    ConfigError, EnvironmentProfile, IndicatorKind, LoaderConfig, MapConfig, ShimConfig,
    ViewerConfig,
};
pub use itinerary::{Day, Itinerary, LatLng, Place};
pub use loader::{
    ErrorKind, IndicatorPanel, LoadError, Loader, LoaderStats, LoadingIndicator, Strategy,
    StrategyChain, Target,
};
pub use map::{MapView, Marker, TileLayer};
pub use pipeline::{http_loader, run, HttpLoader, TerminalOutcome};
pub use transport::{
    CacheDirective, FetchRequest, FetchResponse, HttpTransport, Transport, TransportError,
    TransportKind,
};
pub use view::{HostPage, Tab, ViewController};
