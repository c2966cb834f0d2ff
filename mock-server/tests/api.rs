use axum::http::{self, Request, StatusCode};
use axum::response::Response;
use axum::routing::RouterIntoService;
use http_body_util::BodyExt;
use mock_server::app;
use serde_json::{json, Value};
use tower::{Service, ServiceExt};

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

async fn send(app: &mut RouterIntoService<String>, request: Request<String>) -> Response {
    ServiceExt::ready(app)
        .await
        .unwrap()
        .call(request)
        .await
        .unwrap()
}

const CPU_POINTS: &str = r#"[
    {"metric": "sys.cpu.user", "timestamp": 1346846400, "value": 10, "tags": {"host": "web01"}},
    {"metric": "sys.cpu.user", "timestamp": 1346846400, "value": 5, "tags": {"host": "web02"}},
    {"metric": "sys.cpu.user", "timestamp": 1346846460, "value": 12, "tags": {"host": "web01"}}
]"#;

// --- dropcaches ---

#[tokio::test]
async fn drop_caches_returns_status_body() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/api/dropcaches?tz=UTC")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body, json!({"message": "Caches dropped", "status": "200"}));
}

// --- put ---

#[tokio::test]
async fn put_returns_204_with_empty_body() {
    let resp = app()
        .oneshot(json_request("POST", "/api/put?tz=UTC", CPU_POINTS))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn put_single_point_object() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/put",
            r#"{"metric": "sys.mem", "timestamp": 1, "value": "3.5", "tags": {"host": "a"}}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn put_bad_point_returns_error_object() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/put",
            r#"{"metric": "sys.mem", "timestamp": 1, "value": 1}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], 400);
    assert_eq!(body["error"]["message"], "One or more data points had errors");
    assert!(body["error"]["details"].is_string());
}

#[tokio::test]
async fn put_with_details_reports_summary_without_error_key() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/put?details&tz=UTC",
            r#"[
                {"metric": "sys.mem", "timestamp": 1, "value": 1, "tags": {"host": "a"}},
                {"metric": "sys.mem", "timestamp": 1, "value": 1}
            ]"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body.get("error").is_none());
    assert_eq!(body["success"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["errors"][0]["error"], "Missing tags");
}

#[tokio::test]
async fn put_malformed_json_returns_400() {
    let resp = app()
        .oneshot(json_request("POST", "/api/put", "{not json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "Unable to parse the given JSON");
}

#[tokio::test]
async fn put_empty_body_returns_400() {
    let resp = app()
        .oneshot(json_request("POST", "/api/put", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "Missing request content");
}

// --- uid/assign ---

#[tokio::test]
async fn assign_uid_twice_reports_existing_names() {
    let mut app = app().into_service();
    let assign = r#"{"metric": ["sys.cpu.0", "sys.cpu.1"], "tagk": ["host"]}"#;

    let resp = send(&mut app, json_request("POST", "/api/uid/assign", assign)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(
        body,
        json!({
            "metric": {"sys.cpu.0": "000001", "sys.cpu.1": "000002"},
            "tagk": {"host": "000001"}
        })
    );

    let resp = send(
        &mut app,
        json_request("POST", "/api/uid/assign", r#"{"metric": ["sys.cpu.1", "sys.cpu.2"]}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body.get("error").is_none());
    assert_eq!(body["metric"], json!({"sys.cpu.2": "000003"}));
    assert_eq!(
        body["metric_errors"]["sys.cpu.1"],
        "Name already exists with UID: 000002"
    );
}

// --- query ---

#[tokio::test]
async fn query_unknown_metric_returns_no_such_name() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/query",
            r#"{"start": 0, "queries": [{"aggregator": "sum", "metric": "nope"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "No such name for 'metrics': 'nope'");
    assert_eq!(body["error"]["details"], "No such name for 'metrics': 'nope'");
    assert!(body["error"]["trace"]
        .as_str()
        .unwrap()
        .starts_with("net.opentsdb.uid.NoSuchUniqueName"));
}

#[tokio::test]
async fn query_missing_start_returns_400() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/query",
            r#"{"queries": [{"aggregator": "sum", "metric": "m"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "Missing start time");
}

// --- suggest ---

#[tokio::test]
async fn suggest_invalid_type_returns_400() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/suggest",
            r#"{"type": "hosts", "q": "web"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "Invalid 'type' parameter:hosts");
}

// --- full lifecycle ---

#[tokio::test]
async fn series_lifecycle() {
    let mut app = app().into_service();

    // put
    let resp = send(&mut app, json_request("POST", "/api/put", CPU_POINTS)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // query, aggregated across hosts
    let query = r#"{"start": 1346846400, "queries": [{"aggregator": "sum", "metric": "sys.cpu.user"}]}"#;
    let resp = send(&mut app, json_request("POST", "/api/query", query)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(
        body,
        json!([{
            "metric": "sys.cpu.user",
            "tags": {},
            "aggregateTags": ["host"],
            "dps": {"1346846400": 15.0, "1346846460": 12.0}
        }])
    );

    // unknown tag value
    let resp = send(
        &mut app,
        json_request(
            "POST",
            "/api/query",
            r#"{"start": 0, "queries": [{"aggregator": "sum", "metric": "sys.cpu.user", "tags": {"host": "web09"}}]}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "No such name for 'tagv': 'web09'");

    // last
    let resp = send(
        &mut app,
        json_request(
            "POST",
            "/api/query/last",
            r#"{"queries": [{"metric": "sys.cpu.user", "tags": {"host": "web01"}}]}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["timestamp"], 1_346_846_460_000_i64);
    assert_eq!(body[0]["value"], "12");
    assert_eq!(body[0]["tsuid"], "000001000001000001");

    // suggest
    let resp = send(
        &mut app,
        json_request("POST", "/api/suggest", r#"{"type": "tagv", "q": "web", "max": 1}"#),
    )
    .await;
    assert_eq!(body_json(resp).await, json!(["web01"]));

    // delete web02 and query again
    let delete = r#"{"start": 0, "queries": [{"aggregator": "sum", "metric": "sys.cpu.user", "tags": {"host": "web02"}}]}"#;
    let resp = send(&mut app, json_request("DELETE", "/api/query", delete)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body[0]["dps"], json!({"1346846400": 5.0}));

    let resp = send(&mut app, json_request("POST", "/api/query", query)).await;
    let body = body_json(resp).await;
    assert_eq!(body[0]["dps"], json!({"1346846400": 10.0, "1346846460": 12.0}));
    assert_eq!(body[0]["tags"], json!({"host": "web01"}));

    // exp
    let exp = r#"{
        "time": {"start": "1h-ago", "aggregator": "sum"},
        "metrics": [{"id": "a", "metric": "sys.cpu.user"}],
        "expressions": [{"id": "e", "expr": "a * 2"}]
    }"#;
    let resp = send(&mut app, json_request("POST", "/api/query/exp", exp)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["outputs"][0]["id"], "e");
    assert_eq!(body["query"]["metrics"][0]["id"], "a");
}
