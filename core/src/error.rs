//! Error types for the OpenTSDB client.
//!
//! # Design
//! OpenTSDB answers "that metric / tag key / tag value does not exist" with
//! the same 400 status it uses for every other failure. Callers usually want
//! to branch on the missing identifier, so those errors get a dedicated
//! `NotExists` variant keyed by a closed `EntityKind`. Everything else the
//! server reports lands in `Api`.

use std::fmt;

use crate::http::TransportError;

/// Message and optional server-side stack trace from an `error` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub message: String,
    pub trace: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>, trace: Option<String>) -> Self {
        Self {
            message: message.into(),
            trace,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The kind of identifier a not-found error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Metric,
    TagKey,
    TagValue,
}

impl EntityKind {
    /// Resolve the entity token the server puts in
    /// `No such name for '<token>': ...`.
    ///
    /// Returns `None` for tokens outside the known set.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "metric" | "metrics" => Some(EntityKind::Metric),
            "tagk" => Some(EntityKind::TagKey),
            "tagv" => Some(EntityKind::TagValue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Metric => "metric",
            EntityKind::TagKey => "tagk",
            EntityKind::TagValue => "tagv",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by `OpenTsdbClient`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected locally; no request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server reported an error that is not a missing identifier.
    #[error("OpenTSDB error: {0}")]
    Api(ApiError),

    /// The server reported that a metric, tag key or tag value is unknown.
    #[error("{kind} does not exist: {error}")]
    NotExists { kind: EntityKind, error: ApiError },

    #[error("failed to serialize request payload: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Raised by the transport before a response was received.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl Error {
    pub fn is_not_exists(&self) -> bool {
        matches!(self, Error::NotExists { .. })
    }

    /// The missing entity kind, for `NotExists` errors.
    pub fn not_exists_kind(&self) -> Option<EntityKind> {
        match self {
            Error::NotExists { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The server-reported message and trace, for `Api` and `NotExists`.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(error) | Error::NotExists { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
