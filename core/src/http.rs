//! HTTP request/response data and the transport seam.
//!
//! # Design
//! Requests and responses are plain data. The client builds `HttpRequest`
//! values and classifies `HttpResponse` values; a `Transport` implementation
//! performs the actual round trip in between. Keeping the network behind a
//! trait lets tests substitute a canned transport and lets callers bring
//! their own HTTP stack.
//!
//! A transport never interprets the status code: 4xx/5xx responses come back
//! as `Ok(HttpResponse)` so the classifier can look at the error body.

use std::error::Error as StdError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
///
/// `url` is fully qualified, including the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure raised by a transport: connection refused, timeout, TLS, etc.
pub type TransportError = Box<dyn StdError + Send + Sync + 'static>;

/// Executes one HTTP round trip.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

#[cfg(feature = "ureq")]
pub use self::blocking::UreqTransport;

#[cfg(feature = "ureq")]
mod blocking {
    use ureq::RequestBuilder;

    use super::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};

    /// Blocking transport backed by a `ureq` agent.
    ///
    /// Every request is sent with `http_status_as_error(false)` so error
    /// statuses are returned as data, whatever the agent's own setting.
    /// Response bodies are read in full with no size limit.
    #[derive(Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new() -> Self {
            Self::with_agent(ureq::Agent::new_with_defaults())
        }

        /// Wrap a caller-configured agent (timeouts, proxies, TLS).
        pub fn with_agent(agent: ureq::Agent) -> Self {
            Self { agent }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Copy the headers and turn off status-as-error for this request.
    fn prepare<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder.config().http_status_as_error(false).build()
    }

    impl Transport for UreqTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut response = match request.method {
                HttpMethod::Get => prepare(self.agent.get(&request.url), request).call()?,
                HttpMethod::Post => {
                    let builder = prepare(self.agent.post(&request.url), request);
                    match &request.body {
                        Some(body) => builder.send(body.as_bytes())?,
                        None => builder.send_empty()?,
                    }
                }
                HttpMethod::Delete => {
                    let builder = self.agent.delete(&request.url);
                    match &request.body {
                        // OpenTSDB reads the query from the DELETE body.
                        Some(body) => prepare(builder.force_send_body(), request)
                            .send(body.as_bytes())?,
                        None => prepare(builder, request).call()?,
                    }
                }
            };

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response
                .body_mut()
                .with_config()
                .limit(u64::MAX)
                .read_to_string()?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}
