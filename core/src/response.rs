//! Classification of OpenTSDB responses.
//!
//! The server uses 4xx/5xx for three different outcomes: a missing
//! identifier, a generic failure, and partial failures that carry a normal
//! body (e.g. `/api/uid/assign` reporting names that already exist). Only
//! bodies with an `error` object are raised; the rest are returned as data.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{ApiError, EntityKind, Error};
use crate::http::HttpResponse;

static NO_SUCH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"No such name for '([^']+)': '(.*)'").expect("valid no-such-name pattern")
});

/// Decode the body, falling back to an empty object when it is empty or not
/// JSON.
pub fn decode_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Turn a response into the decoded value or a typed error.
pub fn classify_response(response: &HttpResponse) -> Result<Value, Error> {
    let content = decode_body(&response.body);
    if response.is_success() {
        return Ok(content);
    }

    let Some(error) = content.get("error").filter(|error| !error.is_null()) else {
        return Ok(content);
    };

    let message = error
        .get("details")
        .and_then(Value::as_str)
        .or_else(|| error.get("message").and_then(Value::as_str))
        .or_else(|| error.as_str())
        .unwrap_or_default()
        .to_string();
    let trace = error
        .get("trace")
        .and_then(Value::as_str)
        .map(str::to_string);

    Err(api_error(ApiError::new(message, trace)))
}

fn api_error(error: ApiError) -> Error {
    let kind = NO_SUCH_NAME
        .captures(&error.message)
        .and_then(|captures| EntityKind::from_token(&captures[1]));
    match kind {
        Some(kind) => Error::NotExists { kind, error },
        None => Error::Api(error),
    }
}
