//! Typed request payloads for the OpenTSDB HTTP API.
//!
//! Every client operation accepts any `Serialize` payload, so these are a
//! convenience over hand-built `serde_json::json!` values. Optional fields
//! are skipped when unset, matching what the server expects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single point for `/api/put`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: String,
    /// Unix epoch in seconds or milliseconds.
    pub timestamp: i64,
    pub value: f64,
    pub tags: BTreeMap<String, String>,
}

impl DataPoint {
    pub fn new(metric: impl Into<String>, timestamp: i64, value: f64) -> Self {
        Self {
            metric: metric.into(),
            timestamp,
            value,
            tags: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Body of `/api/query` and `DELETE /api/query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Absolute timestamp or relative string such as `1h-ago`.
    pub start: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<serde_json::Value>,
    pub queries: Vec<SubQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms_resolution: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_tsuids: Option<bool>,
    /// Only honored by the server on `DELETE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
}

impl Query {
    pub fn new(start: impl Into<serde_json::Value>, queries: Vec<SubQuery>) -> Self {
        Self {
            start: start.into(),
            end: None,
            queries,
            ms_resolution: None,
            show_tsuids: None,
            delete: None,
        }
    }

    pub fn end(mut self, end: impl Into<serde_json::Value>) -> Self {
        self.end = Some(end.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuery {
    pub aggregator: String,
    pub metric: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downsample: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<bool>,
}

impl SubQuery {
    pub fn new(aggregator: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            aggregator: aggregator.into(),
            metric: metric.into(),
            tags: BTreeMap::new(),
            filters: Vec::new(),
            downsample: None,
            rate: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn downsample(mut self, downsample: impl Into<String>) -> Self {
        self.downsample = Some(downsample.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Filter type, e.g. `literal_or`, `wildcard`, `regexp`.
    #[serde(rename = "type")]
    pub kind: String,
    pub tagk: String,
    pub filter: String,
    #[serde(default)]
    pub group_by: bool,
}

/// Body of `/api/query/last`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastQuery {
    pub queries: Vec<LastSubQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_names: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_scan: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSubQuery {
    pub metric: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl LastSubQuery {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Body of `/api/uid/assign`: names to create per UID type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UidAssign {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metric: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tagk: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tagv: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestKind {
    #[default]
    #[serde(rename = "metrics")]
    Metrics,
    #[serde(rename = "tagk")]
    TagKey,
    #[serde(rename = "tagv")]
    TagValue,
}

/// Body of `/api/suggest`. `max` is omitted unless set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestRequest {
    #[serde(rename = "type")]
    pub kind: SuggestKind,
    pub q: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl SuggestRequest {
    pub fn new(q: impl Into<String>, kind: SuggestKind, max: Option<u32>) -> Self {
        Self {
            kind,
            q: q.into(),
            max,
        }
    }
}
