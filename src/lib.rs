//! Incremental, cached, cancellable paginated fetching.
//!
//! A [`PagedFetchEngine`] backs an infinite-scroll select or a lazily loaded
//! table: it tracks the pagination cursor, debounces search input, memoizes
//! pages with a TTL, and discards responses superseded by a newer reset.
//! Rendering and the network itself are collaborators: the UI forwards
//! triggers and reads back an [`EngineView`], and a [`Transport`] performs
//! the requests.

pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;
pub mod transport;

pub use config::EngineConfig;
pub use engine::cache::ResponseCache;
pub use engine::cursor::LoadState;
pub use engine::key::{ParamValue, QueryKey, RequestKeyBuilder};
pub use engine::page::{Page, ResponseShape};
pub use engine::paged::{
    EngineView, ErrorCallback, FetchOutcome, PagedFetchEngine, PagedFetchEngineBuilder, SkipReason,
};
pub use engine::stats::FetchStatsSnapshot;
pub use engine::strategy::{FetchStrategy, LazyLoadEvent, SortOrder};
pub use error::FetchError;
pub use transport::http_transport::HttpTransport;
pub use transport::traits::{FetchRequest, HttpMethod, Transport};
