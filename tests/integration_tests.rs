//! Integration tests using wiremock to simulate the API server.

use async_trait::async_trait;
use futures::TryStreamExt;
use rpcwarden::limiter::{RateLimitConfig, RestrictionParams};
use rpcwarden::{
    codes, AjaxError, ApiVersion, AuthActions, AuthData, BatchCall, BatchKey, BatchRequest,
    Client, ErrorKind, HookAuth, VersionTable,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two retries with a short base delay.
fn fast_params() -> RestrictionParams {
    RestrictionParams {
        max_retries: 2,
        retry_delay_ms: 10,
        ..RestrictionParams::standard()
    }
}

fn hook_client(server: &MockServer) -> Client {
    init_tracing();
    Client::builder()
        .auth(HookAuth::new(format!("{}/rest/1/secret/", server.uri())).unwrap())
        .restriction_params(fast_params())
        .build()
        .unwrap()
}

fn success(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "result": result,
        "time": {
            "start": 1.0,
            "finish": 1.2,
            "duration": 0.2,
            "processing": 0.1,
            "operating": 0.5,
            "operating_reset_at": 4_000_000_000.0
        }
    }))
}

fn failure(status: u16, code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": code,
        "error_description": format!("{code} description")
    }))
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

/// A token credential whose refresh swaps `stale` for `fresh`.
struct TokenAuth {
    base: Url,
    token: Mutex<String>,
    refreshes: AtomicUsize,
}

impl TokenAuth {
    fn new(server: &MockServer) -> Arc<Self> {
        Arc::new(Self {
            base: Url::parse(&format!("{}/rest/", server.uri())).unwrap(),
            token: Mutex::new("stale".to_string()),
            refreshes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AuthActions for TokenAuth {
    fn auth_data(&self) -> Option<AuthData> {
        Some(AuthData {
            access_token: self.token.lock().unwrap().clone(),
            refresh_token: "refresh".to_string(),
            expires: 0,
            expires_in: 3600,
            domain: None,
            member_id: None,
        })
    }

    async fn refresh_auth(&self) -> rpcwarden::Result<AuthData> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = "fresh".to_string();
        Ok(self.auth_data().unwrap())
    }

    fn target_origin_with_path(&self) -> HashMap<ApiVersion, Url> {
        HashMap::from([(ApiVersion::V2, self.base.clone())])
    }
}

#[tokio::test]
async fn test_successful_call() {
    let mock_server = MockServer::start().await;

    // Exact body: a hook credential adds no `auth` field.
    Mock::given(method("POST"))
        .and(path("/rest/1/secret/user.get.json"))
        .and(body_json(json!({"ID": 1})))
        .respond_with(success(json!([{"ID": "1", "NAME": "Ann"}])))
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let result = client.call("user.get", &json!({"ID": 1})).await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.data(), &json!([{"ID": "1", "NAME": "Ann"}]));
    assert_eq!(result.status(), 200);
    assert_eq!(result.version(), ApiVersion::V2);
    assert_eq!(result.query().method, "user.get");

    let stats = client.stats().await;
    assert_eq!(stats.engine.successful_requests, 1);
    assert_eq!(stats.methods["user.get"].calls, 1);
    let method_stats = client
        .restriction_manager()
        .operating_limiter()
        .method_stats("user.get")
        .unwrap();
    assert_eq!(method_stats.operating_ms, 500);
}

#[tokio::test]
async fn test_typed_call() {
    #[derive(serde::Deserialize)]
    struct User {
        #[serde(rename = "NAME")]
        name: String,
    }

    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/1/secret/user.current.json"))
        .respond_with(success(json!({"NAME": "Ann"})))
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let user = client.call_as::<User, _>("user.current", &()).await.unwrap();
    assert_eq!(user.data().name, "Ann");

    let err = client
        .call_as::<Vec<u32>, _>("user.current", &())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(codes::INVALID_RESPONSE));
}

#[tokio::test]
async fn test_expired_token_refreshes_once_without_using_a_retry() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/profile.json"))
        .and(body_partial_json(json!({"auth": "stale"})))
        .respond_with(failure(401, codes::EXPIRED_TOKEN))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/profile.json"))
        .and(body_partial_json(json!({"auth": "fresh"})))
        .respond_with(success(json!({"ID": "1"})))
        .mount(&mock_server)
        .await;

    let auth = TokenAuth::new(&mock_server);
    let client = Client::builder()
        .shared_auth(auth.clone())
        .restriction_params(RestrictionParams {
            max_retries: 0,
            ..fast_params()
        })
        .build()
        .unwrap();

    let result = client.call("profile", &()).await.unwrap();
    assert_eq!(result.data(), &json!({"ID": "1"}));
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(request_count(&mock_server).await, 2);

    let stats = client.stats().await;
    assert_eq!(stats.engine.auth_refreshes, 1);
    assert_eq!(stats.engine.retries, 0);
}

#[tokio::test]
async fn test_second_auth_failure_is_surfaced() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/profile.json"))
        .respond_with(failure(401, codes::INVALID_TOKEN))
        .mount(&mock_server)
        .await;

    let auth = TokenAuth::new(&mock_server);
    let client = Client::builder()
        .shared_auth(auth.clone())
        .restriction_params(fast_params())
        .build()
        .unwrap();

    let err = client.call("profile", &()).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::INVALID_TOKEN));
    assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(request_count(&mock_server).await, 2);
}

#[tokio::test]
async fn test_access_denied_fails_fast() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/crm.deal.get.json"))
        .respond_with(failure(403, codes::ACCESS_DENIED))
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let err = client
        .call("crm.deal.get", &json!({"id": 1}))
        .await
        .unwrap_err();

    let ajax = err.as_ajax().unwrap();
    assert_eq!(ajax.code(), codes::ACCESS_DENIED);
    assert_eq!(ajax.status(), 403);
    assert_eq!(ajax.description(), "ACCESS_DENIED description");
    assert_eq!(ajax.request_info().unwrap().method, "crm.deal.get");
    assert!(!err.is_retryable());

    assert_eq!(request_count(&mock_server).await, 1);
    let stats = client.stats().await;
    assert_eq!(stats.engine.retries, 0);
    assert_eq!(stats.restrictions.retries, 0);
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let counter = attempt_count.clone();

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/crm.deal.list.json"))
        .respond_with(move |_: &Request| {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                failure(500, "INTERNAL_SERVER_ERROR")
            } else {
                success(json!([]))
            }
        })
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let result = client.call("crm.deal.list", &()).await.unwrap();

    assert!(result.is_success());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    let stats = client.stats().await;
    assert_eq!(stats.engine.retries, 2);
    assert_eq!(stats.engine.failed_requests, 2);
    assert_eq!(stats.methods["crm.deal.list"].consecutive_errors, 0);
}

#[tokio::test]
async fn test_all_attempts_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/crm.deal.list.json"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad gateway"))
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let err = client.call("crm.deal.list", &()).await.unwrap_err();

    let ajax = err.as_ajax().unwrap();
    assert_eq!(ajax.code(), codes::ALL_ATTEMPTS_EXHAUSTED);
    let last = std::error::Error::source(ajax)
        .and_then(|source| source.downcast_ref::<AjaxError>())
        .unwrap();
    assert_eq!(last.code(), codes::INVALID_RESPONSE);
    assert_eq!(last.status(), 502);

    assert_eq!(request_count(&mock_server).await, 3);
    assert_eq!(client.stats().await.methods["crm.deal.list"].consecutive_errors, 3);
}

#[tokio::test]
async fn test_timeouts_are_retried_then_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/user.get.json"))
        .respond_with(success(json!([])).set_delay(Duration::from_millis(300)))
        .mount(&mock_server)
        .await;

    init_tracing();
    let client = Client::builder()
        .auth(HookAuth::new(format!("{}/rest/1/secret/", mock_server.uri())).unwrap())
        .restriction_params(RestrictionParams {
            max_retries: 1,
            ..fast_params()
        })
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = client.call("user.get", &()).await.unwrap_err();
    let ajax = err.as_ajax().unwrap();
    assert_eq!(ajax.code(), codes::ALL_ATTEMPTS_EXHAUSTED);
    let last = std::error::Error::source(ajax)
        .and_then(|source| source.downcast_ref::<AjaxError>())
        .unwrap();
    assert_eq!(last.code(), codes::REQUEST_TIMEOUT);
    assert_eq!(last.kind(), ErrorKind::Timeout);
    assert_eq!(request_count(&mock_server).await, 2);
}

#[tokio::test]
async fn test_connection_errors_are_retried_then_exhausted() {
    init_tracing();
    // Bind then release a port so nothing is listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = Client::builder()
        .auth(HookAuth::new(format!("http://127.0.0.1:{port}/rest/1/secret/")).unwrap())
        .restriction_params(fast_params())
        .build()
        .unwrap();

    let err = client.call("user.get", &()).await.unwrap_err();
    let ajax = err.as_ajax().unwrap();
    assert_eq!(ajax.code(), codes::ALL_ATTEMPTS_EXHAUSTED);
    let last = std::error::Error::source(ajax)
        .and_then(|source| source.downcast_ref::<AjaxError>())
        .unwrap();
    assert_eq!(last.code(), codes::NETWORK_ERROR);
    assert_eq!(last.kind(), ErrorKind::Network);
    assert_eq!(last.status(), 0);

    let stats = client.stats().await;
    assert_eq!(stats.engine.total_requests, 3);
    assert_eq!(stats.engine.retries, 2);
}

#[tokio::test]
async fn test_query_limit_is_retried() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let counter = attempt_count.clone();

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/user.get.json"))
        .respond_with(move |_: &Request| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                failure(503, codes::QUERY_LIMIT_EXCEEDED)
            } else {
                success(json!([]))
            }
        })
        .mount(&mock_server)
        .await;

    init_tracing();
    let client = Client::builder()
        .auth(HookAuth::new(format!("{}/rest/1/secret/", mock_server.uri())).unwrap())
        .restriction_params(RestrictionParams {
            rate_limit: RateLimitConfig {
                drain_rate: 1_000.0,
                ..RateLimitConfig::default()
            },
            ..fast_params()
        })
        .build()
        .unwrap();

    client.call("user.get", &()).await.unwrap();

    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    let stats = client.stats().await;
    assert_eq!(stats.restrictions.rate_limit_errors, 1);
    assert_eq!(stats.restrictions.rate_limiter.limit_hits, 1);
}

#[tokio::test]
async fn test_soft_error_code_returns_failed_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/crm.deal.get.json"))
        .respond_with(failure(400, codes::NOT_FOUND))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .auth(HookAuth::new(format!("{}/rest/1/secret/", mock_server.uri())).unwrap())
        .restriction_params(fast_params())
        .soft_error_codes([codes::NOT_FOUND])
        .build()
        .unwrap();

    let result = client
        .call("crm.deal.get", &json!({"id": 404}))
        .await
        .unwrap();
    assert!(!result.is_success());
    assert_eq!(result.error().unwrap().code(), codes::NOT_FOUND);
    assert_eq!(result.status(), 400);
    assert_eq!(result.query().params, json!({"id": 404}));
    assert_eq!(request_count(&mock_server).await, 1);
}

#[tokio::test]
async fn test_invalid_params_are_rejected_before_sending() {
    let mock_server = MockServer::start().await;
    let client = hook_client(&mock_server);

    let err = client.call("user.get", &json!([1, 2])).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::INVALID_PARAMS));
    assert_eq!(request_count(&mock_server).await, 0);
}

fn three_command_batch() -> Vec<BatchCall> {
    vec![
        BatchCall::new("user.get", json!({"ID": 1})),
        BatchCall::new("crm.deal.get", json!({"id": 2})),
        BatchCall::new("user.current", Value::Null),
    ]
}

async fn mount_v2_batch(mock_server: &MockServer, halt: u8) {
    Mock::given(method("POST"))
        .and(path("/rest/1/secret/batch.json"))
        .and(body_json(json!({
            "halt": halt,
            "cmd": ["user.get?ID=1", "crm.deal.get?id=2", "user.current"]
        })))
        .respond_with(success(json!({
            "result": {"0": [{"ID": "1"}], "2": {"ID": "7"}},
            "result_error": {"1": {"error": "NOT_FOUND", "error_description": "Deal not found"}},
            "result_total": {"0": 1},
            "result_next": [],
            "result_time": {
                "0": {"operating": 1.0, "operating_reset_at": 4_000_000_000.0},
                "2": {"operating": 2.0, "operating_reset_at": 4_000_000_000.0}
            }
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_v2_batch_collects_errors() {
    let mock_server = MockServer::start().await;
    mount_v2_batch(&mock_server, 0).await;

    let client = hook_client(&mock_server);
    let outcome = client.batch(three_command_batch(), false).await.unwrap();

    let keys: Vec<&BatchKey> = outcome.data().iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![&BatchKey::Index(0), &BatchKey::Index(2)]);
    assert_eq!(outcome.data()[0].1.data(), &json!([{"ID": "1"}]));
    assert_eq!(outcome.data()[0].1.total(), Some(1));
    assert_eq!(outcome.data()[1].1.query().method, "user.current");

    assert!(!outcome.is_success());
    let err = outcome.error("1").unwrap();
    assert_eq!(err.code(), codes::NOT_FOUND);
    assert_eq!(err.description(), "Deal not found");

    let operating = client.restriction_manager().operating_limiter();
    assert_eq!(
        operating.method_stats("batch::user.current").unwrap().operating_ms,
        2_000
    );
    assert!(operating.method_stats("batch::crm.deal.get").is_none());
}

#[tokio::test]
async fn test_v2_batch_halts_on_error() {
    let mock_server = MockServer::start().await;
    mount_v2_batch(&mock_server, 1).await;

    let client = hook_client(&mock_server);
    let err = client.batch(three_command_batch(), true).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::NOT_FOUND));
}

#[tokio::test]
async fn test_soft_errors_do_not_halt_batch() {
    let mock_server = MockServer::start().await;
    mount_v2_batch(&mock_server, 1).await;

    let client = Client::builder()
        .auth(HookAuth::new(format!("{}/rest/1/secret/", mock_server.uri())).unwrap())
        .restriction_params(fast_params())
        .soft_error_codes([codes::NOT_FOUND])
        .build()
        .unwrap();

    let outcome = client.batch(three_command_batch(), true).await.unwrap();
    assert_eq!(outcome.error("1").unwrap().code(), codes::NOT_FOUND);
    assert_eq!(outcome.data().len(), 2);
}

async fn v3_failing_batch(mock_server: &MockServer) -> Client {
    Mock::given(method("POST"))
        .and(path("/rest/api/1/secret/batch"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": "ACCESS_DENIED", "message": "Batch is not allowed"}
        })))
        .mount(mock_server)
        .await;

    let auth = HookAuth::new(format!("{}/rest/1/secret/", mock_server.uri()))
        .unwrap()
        .with_v3_base(format!("{}/rest/api/1/secret/", mock_server.uri()))
        .unwrap();
    Client::builder()
        .auth(auth)
        .restriction_params(fast_params())
        .build()
        .unwrap()
}

fn v3_commands() -> Vec<BatchCall> {
    vec![
        BatchCall::new("tasks.task.get", json!({"id": 1})),
        BatchCall::new("main.eventlog.list", Value::Null),
    ]
}

#[tokio::test]
async fn test_failed_batch_call_fails_every_command() {
    init_tracing();
    let mock_server = MockServer::start().await;
    let client = v3_failing_batch(&mock_server).await;

    let outcome = client.batch(v3_commands(), false).await.unwrap();
    assert!(outcome.data().is_empty());
    assert_eq!(outcome.errors().len(), 2);
    for key in ["0", "1"] {
        let err = outcome.error(key).unwrap();
        assert_eq!(err.code(), codes::ACCESS_DENIED);
        assert_eq!(err.description(), "Batch is not allowed");
    }
    assert_eq!(request_count(&mock_server).await, 1);
}

#[tokio::test]
async fn test_failed_batch_call_halts() {
    let mock_server = MockServer::start().await;
    let client = v3_failing_batch(&mock_server).await;

    let err = client.batch(v3_commands(), true).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::ACCESS_DENIED));
}

#[tokio::test]
async fn test_named_batch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/batch.json"))
        .and(body_json(json!({
            "halt": 0,
            "cmd": {"deal": "crm.deal.get?id=2", "me": "user.current"}
        })))
        .respond_with(success(json!({
            "result": {"me": {"ID": "1"}, "deal": {"ID": "2"}},
            "result_error": []
        })))
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let request = BatchRequest::parse(&json!({
        "me": ["user.current"],
        "deal": {"method": "crm.deal.get", "params": {"id": 2}}
    }))
    .unwrap();
    let outcome = client.batch(request, false).await.unwrap();

    assert!(outcome.is_success());
    let me = outcome
        .data()
        .iter()
        .find(|(key, _)| key == &BatchKey::Name("me".into()))
        .unwrap();
    assert_eq!(me.1.data(), &json!({"ID": "1"}));
}

#[tokio::test]
async fn test_batch_size_is_checked_before_sending() {
    let mock_server = MockServer::start().await;
    let client = hook_client(&mock_server);

    let calls: Vec<BatchCall> = (0..51)
        .map(|i| BatchCall::new("user.get", json!({"ID": i})))
        .collect();
    let err = client.batch(calls, false).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::ERROR_BATCH_LENGTH_EXCEEDED));

    let err = client.batch(Vec::<BatchCall>::new(), false).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::ERROR_BATCH_EMPTY));

    assert_eq!(request_count(&mock_server).await, 0);
}

#[tokio::test]
async fn test_batch_by_chunk() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/batch.json"))
        .respond_with(|req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            let count = body["cmd"].as_array().map(Vec::len).unwrap_or_default();
            let results: Vec<Value> = (0..count).map(|i| json!(i)).collect();
            success(json!({"result": results, "result_error": []}))
        })
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let calls: Vec<BatchCall> = (0..120)
        .map(|i| BatchCall::new("user.get", json!({"ID": i})))
        .collect();
    let outcome = client.batch_by_chunk(calls, false).await.unwrap();

    assert_eq!(request_count(&mock_server).await, 3);
    assert_eq!(outcome.data().len(), 120);
    assert_eq!(outcome.data()[119].0, BatchKey::Index(119));
    assert_eq!(outcome.data()[119].1.data(), &json!(19));
}

#[tokio::test]
async fn test_v3_routing_and_batch() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/1/secret/tasks.task.get"))
        .and(|req: &Request| req.url.query_pairs().any(|(k, _)| k == "sdk_request_id"))
        .respond_with(success(json!({"task": {"id": 1}})))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/api/1/secret/batch"))
        .and(body_json(json!([
            {"method": "tasks.task.get", "query": {"id": 1}},
            {"method": "main.eventlog.list", "query": {}}
        ])))
        .respond_with(success(json!([{"task": {"id": 1}}, {"items": []}])))
        .mount(&mock_server)
        .await;

    let auth = HookAuth::new(format!("{}/rest/1/secret/", mock_server.uri()))
        .unwrap()
        .with_v3_base(format!("{}/rest/api/1/secret/", mock_server.uri()))
        .unwrap();
    let client = Client::builder()
        .auth(auth)
        .version_table(VersionTable::builtin())
        .restriction_params(fast_params())
        .build()
        .unwrap();

    let task = client.call("tasks.task.get", &json!({"id": 1})).await.unwrap();
    assert_eq!(task.version(), ApiVersion::V3);

    let outcome = client
        .batch(
            vec![
                BatchCall::new("tasks.task.get", json!({"id": 1})),
                BatchCall::new("main.eventlog.list", Value::Null),
            ],
            true,
        )
        .await
        .unwrap();
    assert_eq!(outcome.data().len(), 2);
    assert_eq!(outcome.data()[1].1.data(), &json!({"items": []}));
    assert_eq!(outcome.data()[1].1.version(), ApiVersion::V3);
    assert!(client
        .restriction_manager()
        .operating_limiter()
        .method_stats("batch::main.eventlog.list")
        .is_some());
}

#[tokio::test]
async fn test_call_list_follows_next() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/crm.deal.list.json"))
        .and(body_partial_json(json!({"start": 50})))
        .respond_with(success(json!([{"ID": "51"}, {"ID": "52"}])))
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/1/secret/crm.deal.list.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "result": (1..=50).map(|i| json!({"ID": i.to_string()})).collect::<Vec<_>>(),
                "next": 50,
                "total": 52,
                "time": {}
            })),
        )
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let items = client
        .call_list("crm.deal.list", &json!({"select": ["ID"]}), None)
        .await
        .unwrap();

    assert_eq!(items.len(), 52);
    assert_eq!(items[51], json!({"ID": "52"}));
    assert_eq!(request_count(&mock_server).await, 2);
}

#[tokio::test]
async fn test_fetch_list_uses_id_cursor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/1/secret/tasks.task.list.json"))
        .and(body_partial_json(json!({"filter": {">ID": 50}})))
        .respond_with(success(json!({
            "tasks": [{"ID": 51}, {"ID": 52}, {"ID": 53}]
        })))
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/1/secret/tasks.task.list.json"))
        .and(body_partial_json(json!({
            "order": {"ID": "ASC"},
            "start": -1,
            "filter": {"STATUS": 2}
        })))
        .respond_with(success(json!({
            "tasks": (1..=50).map(|i| json!({"ID": i})).collect::<Vec<_>>()
        })))
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    let chunks: Vec<Vec<Value>> = client
        .fetch_list(
            "tasks.task.list",
            &json!({"filter": {"STATUS": 2}}),
            "ID",
            Some("tasks"),
        )
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].len(), 50);
    assert_eq!(chunks[1], vec![json!({"ID": 51}), json!({"ID": 52}), json!({"ID": 53})]);
    assert_eq!(request_count(&mock_server).await, 2);
}

#[tokio::test]
async fn test_reset_stats() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/1/secret/user.get.json"))
        .respond_with(success(json!([])))
        .mount(&mock_server)
        .await;

    let client = hook_client(&mock_server);
    client.call("user.get", &()).await.unwrap();
    client.set_restriction_params(RestrictionParams::enterprise()).await;
    assert_eq!(client.restriction_params().rate_limit.burst_limit, 250.0);

    client.reset_stats().await;
    let stats = client.stats().await;
    assert_eq!(stats.engine.total_requests, 0);
    assert!(stats.methods.is_empty());
    assert_eq!(stats.restrictions.operating.tracked_methods, 0);
}
