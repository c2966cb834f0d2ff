//! In-memory OpenTSDB look-alike for exercising the client over real HTTP.
//!
//! Implements the endpoints the client talks to with OpenTSDB-shaped bodies,
//! including the error object (`{"error": {"code", "message", "details",
//! "trace"}}`) and the partial-failure bodies that come back with 400 but no
//! `error` key. Only the behavior the client depends on is modeled: relative
//! time strings are treated as unbounded and every sub query aggregates all
//! matching series into one result.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

const DEFAULT_SUGGEST_MAX: usize = 25;

/// One stored sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub metric: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub value: f64,
    pub tags: BTreeMap<String, String>,
}

/// UID tables and samples.
#[derive(Debug, Default)]
pub struct Store {
    metrics: BTreeMap<String, u32>,
    tagks: BTreeMap<String, u32>,
    tagvs: BTreeMap<String, u32>,
    points: Vec<Point>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UidKind {
    Metric,
    TagK,
    TagV,
}

impl UidKind {
    /// Token used in `No such name for '<token>'` messages.
    fn token(self) -> &'static str {
        match self {
            UidKind::Metric => "metrics",
            UidKind::TagK => "tagk",
            UidKind::TagV => "tagv",
        }
    }
}

impl Store {
    fn table(&self, kind: UidKind) -> &BTreeMap<String, u32> {
        match kind {
            UidKind::Metric => &self.metrics,
            UidKind::TagK => &self.tagks,
            UidKind::TagV => &self.tagvs,
        }
    }

    fn table_mut(&mut self, kind: UidKind) -> &mut BTreeMap<String, u32> {
        match kind {
            UidKind::Metric => &mut self.metrics,
            UidKind::TagK => &mut self.tagks,
            UidKind::TagV => &mut self.tagvs,
        }
    }

    /// Assign a new UID, or return the existing one as the error.
    fn assign(&mut self, kind: UidKind, name: &str) -> Result<u32, u32> {
        let table = self.table_mut(kind);
        if let Some(uid) = table.get(name) {
            return Err(*uid);
        }
        let uid = table.len() as u32 + 1;
        table.insert(name.to_string(), uid);
        Ok(uid)
    }

    fn get_or_assign(&mut self, kind: UidKind, name: &str) -> u32 {
        self.assign(kind, name).unwrap_or_else(|uid| uid)
    }

    fn resolve(&self, kind: UidKind, name: &str) -> Result<u32, TsdbError> {
        self.table(kind)
            .get(name)
            .copied()
            .ok_or_else(|| TsdbError::no_such_name(kind, name))
    }

    fn tsuid(&self, point: &Point) -> String {
        let mut tsuid = format_uid(self.metrics.get(&point.metric).copied().unwrap_or_default());
        for (key, value) in &point.tags {
            tsuid.push_str(&format_uid(self.tagks.get(key).copied().unwrap_or_default()));
            tsuid.push_str(&format_uid(self.tagvs.get(value).copied().unwrap_or_default()));
        }
        tsuid
    }
}

fn format_uid(uid: u32) -> String {
    format!("{uid:06X}")
}

pub type Db = Arc<RwLock<Store>>;

/// OpenTSDB error body.
#[derive(Debug)]
pub struct TsdbError {
    status: StatusCode,
    message: String,
    details: Option<String>,
    trace: Option<String>,
}

impl TsdbError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
            trace: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn no_such_name(kind: UidKind, name: &str) -> Self {
        let message = format!("No such name for '{}': '{name}'", kind.token());
        Self {
            status: StatusCode::BAD_REQUEST,
            trace: Some(format!(
                "net.opentsdb.uid.NoSuchUniqueName: {message}\n\tat net.opentsdb.uid.UniqueId.getId(UniqueId.java:406)"
            )),
            details: Some(message.clone()),
            message,
        }
    }
}

impl IntoResponse for TsdbError {
    fn into_response(self) -> Response {
        let mut error = Map::new();
        error.insert("code".to_string(), json!(self.status.as_u16()));
        error.insert("message".to_string(), json!(self.message));
        if let Some(details) = self.details {
            error.insert("details".to_string(), json!(details));
        }
        if let Some(trace) = self.trace {
            error.insert("trace".to_string(), json!(trace));
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, TsdbError> {
    if body.trim().is_empty() {
        return Err(TsdbError::bad_request("Missing request content"));
    }
    serde_json::from_str(body).map_err(|e| {
        TsdbError::bad_request("Unable to parse the given JSON").with_details(e.to_string())
    })
}

/// True when `flag` appears as a bare parameter or `flag=...` in the query.
fn has_flag(query: Option<&str>, flag: &str) -> bool {
    query.is_some_and(|query| {
        query
            .split('&')
            .any(|part| part == flag || part.starts_with(&format!("{flag}=")))
    })
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/api/dropcaches", get(drop_caches))
        .route("/api/uid/assign", post(assign_uid))
        .route("/api/put", post(put))
        .route("/api/query", post(query).delete(delete))
        .route("/api/query/exp", post(exp))
        .route("/api/query/last", post(last))
        .route("/api/suggest", post(suggest))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn drop_caches() -> Json<Value> {
    tracing::debug!("caches dropped");
    Json(json!({"message": "Caches dropped", "status": "200"}))
}

#[derive(Debug, Default, Deserialize)]
pub struct UidAssign {
    #[serde(default)]
    pub metric: Option<Vec<String>>,
    #[serde(default)]
    pub tagk: Option<Vec<String>>,
    #[serde(default)]
    pub tagv: Option<Vec<String>>,
}

async fn assign_uid(State(db): State<Db>, body: String) -> Result<Response, TsdbError> {
    let input: UidAssign = parse_body(&body)?;
    let mut store = db.write().await;

    let mut output = Map::new();
    let mut failed = false;
    for (field, kind, names) in [
        ("metric", UidKind::Metric, input.metric),
        ("tagk", UidKind::TagK, input.tagk),
        ("tagv", UidKind::TagV, input.tagv),
    ] {
        let Some(names) = names else { continue };
        let mut assigned = Map::new();
        let mut errors = Map::new();
        for name in names {
            match store.assign(kind, &name) {
                Ok(uid) => {
                    assigned.insert(name, json!(format_uid(uid)));
                }
                Err(uid) => {
                    errors.insert(
                        name,
                        json!(format!("Name already exists with UID: {}", format_uid(uid))),
                    );
                }
            }
        }
        output.insert(field.to_string(), Value::Object(assigned));
        if !errors.is_empty() {
            failed = true;
            output.insert(format!("{field}_errors"), Value::Object(errors));
        }
    }

    let status = if failed {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(Value::Object(output))).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PutBody {
    Many(Vec<Value>),
    One(Value),
}

fn parse_point(raw: &Value) -> Result<Point, String> {
    let metric = raw
        .get("metric")
        .and_then(Value::as_str)
        .filter(|metric| !metric.is_empty())
        .ok_or("Metric name was empty")?;
    let timestamp = raw
        .get("timestamp")
        .and_then(Value::as_i64)
        .filter(|ts| *ts > 0)
        .ok_or("Invalid timestamp")?;
    let value = match raw.get("value") {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.parse().ok(),
        _ => None,
    }
    .ok_or("Unable to parse value to a number")?;
    let tags: BTreeMap<String, String> = raw
        .get("tags")
        .and_then(|tags| serde_json::from_value(tags.clone()).ok())
        .ok_or("Missing tags")?;
    if tags.is_empty() {
        return Err("Missing tags".to_string());
    }
    // Millisecond timestamps have more than ten digits.
    let timestamp = if timestamp > 9_999_999_999 {
        timestamp / 1000
    } else {
        timestamp
    };
    Ok(Point {
        metric: metric.to_string(),
        timestamp,
        value,
        tags,
    })
}

async fn put(
    State(db): State<Db>,
    RawQuery(params): RawQuery,
    body: String,
) -> Result<Response, TsdbError> {
    let raws = match parse_body::<PutBody>(&body)? {
        PutBody::Many(raws) => raws,
        PutBody::One(raw) => vec![raw],
    };

    let mut store = db.write().await;
    let mut success = 0;
    let mut errors = Vec::new();
    for raw in raws {
        match parse_point(&raw) {
            Ok(point) => {
                store.get_or_assign(UidKind::Metric, &point.metric);
                for (key, value) in &point.tags {
                    store.get_or_assign(UidKind::TagK, key);
                    store.get_or_assign(UidKind::TagV, value);
                }
                store.points.push(point);
                success += 1;
            }
            Err(error) => errors.push(json!({"datapoint": raw, "error": error})),
        }
    }
    tracing::debug!(success, failed = errors.len(), "put");

    let failed = errors.len();
    if has_flag(params.as_deref(), "details") {
        let status = if failed > 0 {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        };
        let body = json!({"success": success, "failed": failed, "errors": errors});
        return Ok((status, Json(body)).into_response());
    }
    if failed > 0 {
        return Err(TsdbError::bad_request("One or more data points had errors")
            .with_details("Please see the TSD logs or append \"details\" to the put request"));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub start: Option<Value>,
    pub end: Option<Value>,
    #[serde(default)]
    pub queries: Vec<SubQuery>,
}

#[derive(Debug, Deserialize)]
pub struct SubQuery {
    pub aggregator: String,
    pub metric: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub metric: String,
    pub tags: BTreeMap<String, String>,
    pub aggregate_tags: Vec<String>,
    pub dps: BTreeMap<String, f64>,
}

/// Absolute bound in seconds; relative strings are unbounded.
fn bound(value: Option<&Value>) -> Option<i64> {
    value.and_then(Value::as_i64).map(|ts| {
        if ts > 9_999_999_999 {
            ts / 1000
        } else {
            ts
        }
    })
}

fn tags_match(filter: &BTreeMap<String, String>, tags: &BTreeMap<String, String>) -> bool {
    filter.iter().all(|(key, wanted)| match tags.get(key) {
        Some(actual) => wanted == "*" || wanted.split('|').any(|v| v == actual),
        None => false,
    })
}

fn aggregate(aggregator: &str, values: &[f64]) -> f64 {
    match aggregator {
        "min" => values.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "avg" => values.iter().sum::<f64>() / values.len() as f64,
        "count" => values.len() as f64,
        _ => values.iter().sum(),
    }
}

const AGGREGATORS: [&str; 5] = ["sum", "min", "max", "avg", "count"];

/// Check every name in the sub query exists.
fn validate(store: &Store, query: &SubQuery) -> Result<(), TsdbError> {
    if !AGGREGATORS.contains(&query.aggregator.as_str()) {
        return Err(TsdbError::bad_request(format!(
            "No such aggregator: {}",
            query.aggregator
        )));
    }
    store.resolve(UidKind::Metric, &query.metric)?;
    for (key, value) in &query.tags {
        store.resolve(UidKind::TagK, key)?;
        if value != "*" {
            for value in value.split('|') {
                store.resolve(UidKind::TagV, value)?;
            }
        }
    }
    Ok(())
}

/// Run `body` against the store, returning results and the indexes of the
/// points that contributed to them.
fn evaluate(
    store: &Store,
    body: &QueryBody,
) -> Result<(Vec<QueryResult>, BTreeSet<usize>), TsdbError> {
    if body.start.is_none() {
        return Err(TsdbError::bad_request("Missing start time"));
    }
    if body.queries.is_empty() {
        return Err(TsdbError::bad_request("Missing sub queries"));
    }
    let start = bound(body.start.as_ref());
    let end = bound(body.end.as_ref());

    let mut results = Vec::new();
    let mut matched = BTreeSet::new();
    for query in &body.queries {
        validate(store, query)?;

        let hits: Vec<(usize, &Point)> = store
            .points
            .iter()
            .enumerate()
            .filter(|(_, point)| point.metric == query.metric)
            .filter(|(_, point)| tags_match(&query.tags, &point.tags))
            .filter(|(_, point)| start.is_none_or(|start| point.timestamp >= start))
            .filter(|(_, point)| end.is_none_or(|end| point.timestamp <= end))
            .collect();
        if hits.is_empty() {
            continue;
        }

        let mut by_ts: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        let mut tags = hits[0].1.tags.clone();
        let mut aggregate_tags = BTreeSet::new();
        for (index, point) in &hits {
            matched.insert(*index);
            by_ts.entry(point.timestamp).or_default().push(point.value);
            tags.retain(|key, value| {
                let same = point.tags.get(key) == Some(&*value);
                if !same {
                    aggregate_tags.insert(key.clone());
                }
                same
            });
            for key in point.tags.keys() {
                if !tags.contains_key(key) {
                    aggregate_tags.insert(key.clone());
                }
            }
        }

        results.push(QueryResult {
            metric: query.metric.clone(),
            tags,
            aggregate_tags: aggregate_tags.into_iter().collect(),
            dps: by_ts
                .into_iter()
                .map(|(ts, values)| (ts.to_string(), aggregate(&query.aggregator, &values)))
                .collect(),
        });
    }
    Ok((results, matched))
}

async fn query(State(db): State<Db>, body: String) -> Result<Json<Vec<QueryResult>>, TsdbError> {
    let body: QueryBody = parse_body(&body)?;
    let store = db.read().await;
    let (results, _) = evaluate(&store, &body)?;
    Ok(Json(results))
}

async fn delete(State(db): State<Db>, body: String) -> Result<Json<Vec<QueryResult>>, TsdbError> {
    let body: QueryBody = parse_body(&body)?;
    let mut store = db.write().await;
    let (results, matched) = evaluate(&store, &body)?;
    let mut index = 0;
    store.points.retain(|_| {
        let keep = !matched.contains(&index);
        index += 1;
        keep
    });
    tracing::debug!(deleted = matched.len(), "delete");
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct ExpBody {
    pub time: Value,
    pub metrics: Vec<ExpMetric>,
    #[serde(default)]
    pub expressions: Vec<ExpExpression>,
}

#[derive(Debug, Deserialize)]
pub struct ExpMetric {
    pub id: String,
    pub metric: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpExpression {
    pub id: String,
    pub expr: String,
}

async fn exp(State(db): State<Db>, body: String) -> Result<Json<Value>, TsdbError> {
    let raw: Value = parse_body(&body)?;
    let input: ExpBody = serde_json::from_value(raw.clone()).map_err(|e| {
        TsdbError::bad_request("Unable to parse the given JSON").with_details(e.to_string())
    })?;
    if input.time.get("start").is_none() {
        return Err(TsdbError::bad_request("Missing start time"));
    }
    let store = db.read().await;
    for metric in &input.metrics {
        store.resolve(UidKind::Metric, &metric.metric)?;
    }

    let outputs: Vec<Value> = input
        .expressions
        .iter()
        .map(|expression| {
            json!({
                "id": expression.id,
                "expr": expression.expr,
                "dps": [],
                "meta": [],
            })
        })
        .collect();
    Ok(Json(json!({"outputs": outputs, "query": raw})))
}

#[derive(Debug, Deserialize)]
pub struct LastBody {
    #[serde(default)]
    pub queries: Vec<LastSubQuery>,
}

#[derive(Debug, Deserialize)]
pub struct LastSubQuery {
    pub metric: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

async fn last(State(db): State<Db>, body: String) -> Result<Json<Vec<Value>>, TsdbError> {
    let body: LastBody = parse_body(&body)?;
    let store = db.read().await;

    let mut results = Vec::new();
    for query in &body.queries {
        store.resolve(UidKind::Metric, &query.metric)?;
        for key in query.tags.keys() {
            store.resolve(UidKind::TagK, key)?;
        }

        // Latest point per series, keyed by tag set.
        let mut latest: BTreeMap<&BTreeMap<String, String>, &Point> = BTreeMap::new();
        for point in store
            .points
            .iter()
            .filter(|point| point.metric == query.metric && tags_match(&query.tags, &point.tags))
        {
            let entry = latest.entry(&point.tags).or_insert(point);
            if point.timestamp >= entry.timestamp {
                *entry = point;
            }
        }
        for point in latest.into_values() {
            results.push(json!({
                "metric": point.metric,
                "timestamp": point.timestamp * 1000,
                "value": point.value.to_string(),
                "tags": point.tags,
                "tsuid": store.tsuid(point),
            }));
        }
    }
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct SuggestBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub q: String,
    pub max: Option<usize>,
}

async fn suggest(State(db): State<Db>, body: String) -> Result<Json<Vec<String>>, TsdbError> {
    let body: SuggestBody = parse_body(&body)?;
    let kind = match body.kind.as_str() {
        "metrics" => UidKind::Metric,
        "tagk" => UidKind::TagK,
        "tagv" => UidKind::TagV,
        other => {
            return Err(TsdbError::bad_request(format!(
                "Invalid 'type' parameter:{other}"
            )))
        }
    };
    let store = db.read().await;
    let names = store
        .table(kind)
        .keys()
        .filter(|name| name.starts_with(&body.q))
        .take(body.max.unwrap_or(DEFAULT_SUGGEST_MAX))
        .cloned()
        .collect();
    Ok(Json(names))
}
