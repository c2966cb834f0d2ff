//! OpenTSDB HTTP API client.
//!
//! # Design
//! `OpenTsdbClient` owns its `ClientConfig` and a `Transport`. Every public
//! operation funnels into one private `request` routine that builds the
//! `HttpRequest`, runs the round trip, logs it, and hands the response to
//! the classifier. `build_request` is public so callers doing their own I/O
//! can produce the exact same requests.
//!
//! Host and port are read from the config each time a request is built, so
//! `set_host`/`set_port` apply to the next call. Setters take `&mut self`;
//! the config cannot change while a call is in flight.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, Transport};
use crate::response::classify_response;
use crate::types::{SuggestKind, SuggestRequest};

/// `tracing` target of the per-call debug event.
pub const LOG_TARGET: &str = "opentsdb";

pub const DROP_CACHES_PATH: &str = "/api/dropcaches";
pub const UID_ASSIGN_PATH: &str = "/api/uid/assign";
pub const PUT_PATH: &str = "/api/put";
pub const QUERY_PATH: &str = "/api/query";
pub const EXP_PATH: &str = "/api/query/exp";
pub const LAST_PATH: &str = "/api/query/last";
pub const SUGGEST_PATH: &str = "/api/suggest";

/// Synchronous client for the OpenTSDB HTTP API.
#[derive(Debug, Clone)]
pub struct OpenTsdbClient<T> {
    config: ClientConfig,
    transport: T,
}

#[cfg(feature = "ureq")]
impl OpenTsdbClient<crate::http::UreqTransport> {
    /// Client talking over a default `ureq` agent.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, crate::http::UreqTransport::new())
    }
}

impl<T: Transport> OpenTsdbClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.config.host = host.into();
    }

    pub fn set_port(&mut self, port: u16) {
        self.config.port = port;
    }

    pub fn set_response_type(&mut self, response_type: impl Into<String>) {
        self.config.response_type = response_type.into();
    }

    pub fn set_timezone(&mut self, timezone: impl Into<String>) {
        self.config.timezone = timezone.into();
    }

    /// Drop the server's UID and metadata caches.
    pub fn drop_caches(&self) -> Result<Value> {
        self.request("drop_caches", DROP_CACHES_PATH, HttpMethod::Get, None)
    }

    /// Assign UIDs to one or more metric names, tag keys or tag values.
    pub fn assign_uid<P: Serialize + ?Sized>(&self, uid: &P) -> Result<Value> {
        let payload = to_payload(uid)?;
        self.request("assign_uid", UID_ASSIGN_PATH, HttpMethod::Post, Some(payload))
    }

    /// Store one data point (an object) or several (an array).
    ///
    /// Any other payload shape is rejected before a request is sent.
    pub fn put<P: Serialize + ?Sized>(&self, data: &P) -> Result<Value> {
        let payload = to_payload(data)?;
        if !payload.is_object() && !payload.is_array() {
            return Err(Error::InvalidArgument(format!(
                "put payload should be an object or an array, got {}",
                json_type(&payload)
            )));
        }
        self.request("put", PUT_PATH, HttpMethod::Post, Some(payload))
    }

    pub fn query<P: Serialize + ?Sized>(&self, query: &P) -> Result<Value> {
        let payload = to_payload(query)?;
        self.request("query", QUERY_PATH, HttpMethod::Post, Some(payload))
    }

    /// Delete the data points matched by `query`.
    pub fn delete<P: Serialize + ?Sized>(&self, query: &P) -> Result<Value> {
        let payload = to_payload(query)?;
        self.request("delete", QUERY_PATH, HttpMethod::Delete, Some(payload))
    }

    /// Run an expression query.
    pub fn exp<P: Serialize + ?Sized>(&self, query: &P) -> Result<Value> {
        let payload = to_payload(query)?;
        self.request("exp", EXP_PATH, HttpMethod::Post, Some(payload))
    }

    /// Latest value of each matched time series.
    pub fn last<P: Serialize + ?Sized>(&self, query: &P) -> Result<Value> {
        let payload = to_payload(query)?;
        self.request("last", LAST_PATH, HttpMethod::Post, Some(payload))
    }

    /// Names of the given kind starting with `query`, at most `max` of them
    /// (server default when `None`).
    pub fn suggest(&self, query: &str, kind: SuggestKind, max: Option<u32>) -> Result<Value> {
        let payload = to_payload(&SuggestRequest::new(query, kind, max))?;
        self.request("suggest", SUGGEST_PATH, HttpMethod::Post, Some(payload))
    }

    /// Build the request for `path`. The query string is the response type,
    /// `tz=<timezone>` and any query already on `path`, joined with `&`.
    /// The timezone is percent-encoded except for `/`.
    /// A `null` payload sends no body.
    pub fn build_request(
        &self,
        path: &str,
        method: HttpMethod,
        payload: Option<&Value>,
    ) -> Result<HttpRequest> {
        let (path, path_query) = match path.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path, ""),
        };
        let timezone = format!("tz={}", encode_timezone(&self.config.timezone));
        let query = [self.config.response_type.as_str(), timezone.as_str(), path_query]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("&");

        let (headers, body) = match payload.filter(|payload| !payload.is_null()) {
            Some(payload) => {
                let body = serde_json::to_string(payload).map_err(Error::Serialize)?;
                (
                    vec![("content-type".to_string(), "application/json".to_string())],
                    Some(body),
                )
            }
            None => (Vec::new(), None),
        };

        Ok(HttpRequest {
            method,
            url: format!("{}{path}?{query}", self.config.base_url()),
            headers,
            body,
        })
    }

    fn request(
        &self,
        operation: &str,
        path: &str,
        method: HttpMethod,
        payload: Option<Value>,
    ) -> Result<Value> {
        let request = self.build_request(path, method, payload.as_ref())?;

        let started = Instant::now();
        let response = self.transport.execute(&request).map_err(Error::Transport)?;
        if self.config.log_requests {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let payload = payload.map_or_else(|| "-".to_string(), |payload| payload.to_string());
            tracing::debug!(
                target: LOG_TARGET,
                operation,
                elapsed_ms,
                "{elapsed_ms:.3}ms {operation} {payload}"
            );
        }

        classify_response(&response)
    }
}

fn to_payload<P: Serialize + ?Sized>(payload: &P) -> Result<Value> {
    serde_json::to_value(payload).map_err(Error::Serialize)
}

fn encode_timezone(timezone: &str) -> String {
    timezone
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
