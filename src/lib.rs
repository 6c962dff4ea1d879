//! Brokered embedding core for a document-management service.
//!
//! A fixed pool of stateless workers computes embeddings behind a broker
//! that correlates requests and responses by id. Callers get an awaitable,
//! cancellable handle per request; a shutdown coordinator drains in-flight
//! work on termination and tells the hosting server when to stop. A thin
//! article pipeline (extract, summarize, embed, index/search) sits on top
//! behind narrow trait boundaries.

use std::time::Duration;

pub mod articles;
pub mod broker;
pub mod config;
pub mod embeddings;
pub mod errors;
mod handle;
mod pending;
pub mod request;
pub mod response;
pub mod service;
pub mod shutdown;
mod worker;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use embeddings::{ByteFrequencyEmbeddings, EmbeddingStrategy, FnEmbeddings};
pub use errors::{ArticleError, EmbedError, StrategyError};
pub use handle::EmbedHandle;
pub use request::EmbedRequest;
pub use response::EmbedResponse;
pub use service::EmbedService;
pub use shutdown::{terminate_signal, Lifecycle, ServerControl, ShutdownCoordinator};

#[cfg(not(test))]
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
