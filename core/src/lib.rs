//! Synchronous client for the OpenTSDB HTTP API.
//!
//! # Overview
//! Each operation (`put`, `query`, `suggest`, ...) becomes one HTTP call
//! against a fixed `/api/...` endpoint. Payloads are serialized as JSON,
//! responses are decoded as JSON, and server error bodies are mapped onto
//! `Error::Api` or `Error::NotExists` depending on the message.
//!
//! # Design
//! - `OpenTsdbClient` owns a `ClientConfig` and a `Transport`. The default
//!   transport is a blocking `ureq` agent (feature `ureq`).
//! - Request building (`OpenTsdbClient::build_request`) and response
//!   classification (`classify_response`) are pure functions of their inputs,
//!   so callers can perform the I/O themselves.
//! - Results are `serde_json::Value`: the server's response shapes vary with
//!   the response type modifier (`details`, `summary`, ...).
//!
//! ```no_run
//! use opentsdb_client::{ClientConfig, DataPoint, OpenTsdbClient, SuggestKind};
//!
//! let client = OpenTsdbClient::new(ClientConfig::new("tsdb.internal", 4242));
//! client.put(&DataPoint::new("sys.cpu.user", 1_346_846_400, 42.5).tag("host", "web01"))?;
//! let names = client.suggest("sys.", SuggestKind::Metrics, Some(10))?;
//! # Ok::<(), opentsdb_client::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod response;
pub mod types;

pub use client::{OpenTsdbClient, LOG_TARGET};
pub use config::ClientConfig;
pub use error::{ApiError, EntityKind, Error, Result};
#[cfg(feature = "ureq")]
pub use http::UreqTransport;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use response::classify_response;
pub use types::{
    DataPoint, Filter, LastQuery, LastSubQuery, Query, SubQuery, SuggestKind, SuggestRequest,
    UidAssign,
};
