//! The API client: request execution engine and the call/list/batch surface.
//!
//! The [`Client`] type is the main entry point for calling remote methods.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    auth::{AuthActions, AuthData},
    batch::{BatchCall, BatchKey, BatchRequest, BatchStrategy, MAX_BATCH_COMMANDS},
    error::{codes, parse_error_payload, AjaxError, ErrorKind, RequestInfo},
    limiter::{RestrictionManager, RestrictionParams, RestrictionStats, RetryDecision, BATCH_PREFIX},
    metrics::{EngineMetrics, MethodMetrics, Metrics},
    request_id::RequestIdGenerator,
    result::{AjaxResult, Outcome, PayloadTime},
    version::{ApiVersion, VersionTable},
    Error, Result,
};
use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Page size the server uses for list methods.
pub const LIST_PAGE_SIZE: usize = 50;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A client for the JSON-RPC API with rate limiting, retries, and credential refresh.
///
/// The client is cheap to clone and designed to be shared: limiter state, statistics and the
/// connection pool belong to the instance and are shared by every clone.
///
/// # Examples
///
/// ```no_run
/// use rpcwarden::{Client, HookAuth};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), rpcwarden::Error> {
/// let client = Client::builder()
///     .auth(HookAuth::new("https://example.com/rest/1/secret/")?)
///     .build()?;
///
/// let user = client.call("user.get", &json!({"ID": 1})).await?;
/// println!("User: {:?}", user.data());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    auth: Arc<dyn AuthActions>,
    restrictions: RestrictionManager,
    versions: VersionTable,
    request_ids: RequestIdGenerator,
    metrics: Metrics,
    soft_codes: HashSet<String>,
    default_headers: HeaderMap,
    timeout: Duration,
}

/// Snapshot of everything the client counts.
#[derive(Debug, Clone)]
pub struct ClientStats {
    pub engine: EngineMetrics,
    pub methods: HashMap<String, MethodMetrics>,
    pub restrictions: RestrictionStats,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Calls `method`, routed to v3 when the method supports it and a v3 endpoint exists.
    ///
    /// `params` must serialize to a JSON object (or to `null`, sent as an empty object).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ajax`] for fatal codes, for exhausted retries (`ALL_ATTEMPTS_EXHAUSTED`
    /// with the last failure as its source) and for invalid params. Errors whose code is in the
    /// soft set come back as a failed [`AjaxResult`] instead.
    pub async fn call<P>(&self, method: &str, params: &P) -> Result<AjaxResult>
    where
        P: Serialize + ?Sized,
    {
        let request_id = self.inner.request_ids.next_id();
        self.call_with_id(method, params, request_id).await
    }

    /// Like [`call`](Client::call) with a caller-chosen correlation id.
    pub async fn call_with_id<P>(
        &self,
        method: &str,
        params: &P,
        request_id: impl Into<String>,
    ) -> Result<AjaxResult>
    where
        P: Serialize + ?Sized,
    {
        let params = to_params(method, params)?;
        let version = self.route(method);
        self.execute(version, method, params, request_id.into()).await
    }

    /// Calls `method` over a specific wire version.
    pub async fn call_versioned<P>(
        &self,
        version: ApiVersion,
        method: &str,
        params: &P,
    ) -> Result<AjaxResult>
    where
        P: Serialize + ?Sized,
    {
        let params = to_params(method, params)?;
        let request_id = self.inner.request_ids.next_id();
        self.execute(version, method, params, request_id).await
    }

    /// Calls `method` and deserializes its result into `T`.
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`call`](Client::call), returns `INVALID_RESPONSE` when the
    /// result does not match `T` and the call's own error when it failed softly.
    pub async fn call_as<T, P>(&self, method: &str, params: &P) -> Result<AjaxResult<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        checked(self.call(method, params).await?)?.into_typed()
    }

    /// Fetches the page after `result`, re-issuing its query with `start` set to its cursor.
    pub async fn next_page(&self, result: &AjaxResult) -> Result<Option<AjaxResult>> {
        let Some(query) = result.next_query() else {
            return Ok(None);
        };
        let request_id = self.inner.request_ids.next_id();
        self.execute(result.version(), &query.method, query.params, request_id)
            .await
            .map(Some)
    }

    /// Collects every page of an offset-paginated list method.
    ///
    /// `extract` names the member holding the items when the result is an object (`"tasks"`
    /// for `tasks.task.list`); otherwise the result itself must be the list.
    pub async fn call_list<P>(
        &self,
        method: &str,
        params: &P,
        extract: Option<&str>,
    ) -> Result<Vec<Value>>
    where
        P: Serialize + ?Sized,
    {
        let mut page = checked(self.call(method, params).await?)?;
        let mut items = extract_items(&page, extract)?;
        while let Some(next) = self.next_page(&page).await? {
            page = checked(next)?;
            items.extend(extract_items(&page, extract)?);
            tracing::debug!(
                method = %method,
                fetched = items.len(),
                total = ?page.total(),
                "Fetched list page"
            );
        }
        Ok(items)
    }

    /// Streams a list method in chunks using an id cursor instead of offsets.
    ///
    /// Items are ordered by `id_key` ascending and each request filters `>id_key` on the last
    /// id seen, with `start = -1` so the server skips counting. The stream ends after the first
    /// chunk shorter than [`LIST_PAGE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns `INVALID_PARAMS` immediately when `params` is not an object; call errors are
    /// yielded by the stream.
    pub fn fetch_list<P>(
        &self,
        method: &str,
        params: &P,
        id_key: &str,
        extract: Option<&str>,
    ) -> Result<BoxStream<'static, Result<Vec<Value>>>>
    where
        P: Serialize + ?Sized,
    {
        let params = match to_params(method, params)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let cursor = ListCursor {
            client: self.clone(),
            method: method.to_string(),
            params,
            id_key: id_key.to_string(),
            extract: extract.map(str::to_string),
            last_id: None,
            done: false,
        };

        Ok(stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.done {
                return Ok(None);
            }
            let chunk = cursor.next_chunk().await?;
            if chunk.is_empty() {
                return Ok(None);
            }
            cursor.last_id = chunk
                .last()
                .and_then(|item| item.get(&cursor.id_key))
                .cloned();
            cursor.done = chunk.len() < LIST_PAGE_SIZE || cursor.last_id.is_none();
            Ok(Some((chunk, cursor)))
        })
        .boxed())
    }

    /// Sends up to 50 commands as one `batch` call.
    ///
    /// v3 is used when it supports `batch` and every command's method; otherwise v2. Each
    /// command's timing is fed to the operating limiter under `batch::<method>`.
    ///
    /// With `halt_on_error` the first failing command is returned as the error. Without it,
    /// failures are collected in the outcome keyed by command index or name, next to the
    /// results of the commands that succeeded.
    ///
    /// # Errors
    ///
    /// Returns `ERROR_BATCH_EMPTY` or `ERROR_BATCH_LENGTH_EXCEEDED` before any request is made.
    pub async fn batch(
        &self,
        request: impl Into<BatchRequest>,
        halt_on_error: bool,
    ) -> Result<Outcome<Vec<(BatchKey, AjaxResult)>>> {
        let request = request.into();
        let shape = request.shape();
        let commands = request.into_commands(halt_on_error)?;

        let version = if self.has_base(ApiVersion::V3)
            && self.inner.versions.supports(ApiVersion::V3, "batch")
            && self
                .inner
                .versions
                .supports_all(ApiVersion::V3, commands.iter().map(|c| c.method.as_str()))
        {
            ApiVersion::V3
        } else {
            ApiVersion::V2
        };
        let strategy = BatchStrategy::select(version, shape);
        let payload = strategy.encode(&commands, halt_on_error);

        tracing::debug!(
            commands = commands.len(),
            version = %version,
            halt_on_error = halt_on_error,
            "Executing batch"
        );

        let request_id = self.inner.request_ids.next_id();
        let query = RequestInfo::new("batch", payload.clone(), request_id.clone());
        let response = match self.execute(version, "batch", payload, request_id).await {
            Ok(response) => response,
            // Without halting, a failed batch call fails each command instead of the whole call.
            Err(Error::Ajax(err)) if !halt_on_error => {
                tracing::warn!(
                    error = %err,
                    commands = commands.len(),
                    "Batch call failed"
                );
                AjaxResult::failed(err, query, version)
            }
            Err(err) => return Err(err),
        };
        let outcomes =
            strategy.decode(&commands, &response, halt_on_error, |err| self.is_soft(err))?;

        let mut data = Vec::with_capacity(outcomes.len());
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(result) => {
                    self.inner
                        .restrictions
                        .update_stats(&format!("{BATCH_PREFIX}{}", outcome.method), result.time())
                        .await;
                    data.push((outcome.key, result));
                }
                Err(err) => {
                    tracing::warn!(
                        key = %outcome.key,
                        method = %outcome.method,
                        error = %err,
                        "Batch command failed"
                    );
                    errors.push((outcome.key.to_string(), err));
                }
            }
        }
        Ok(Outcome::new(data, errors))
    }

    /// Runs any number of commands as consecutive batches of at most 50.
    ///
    /// Keys in the outcome are positions in `calls`.
    pub async fn batch_by_chunk(
        &self,
        calls: Vec<BatchCall>,
        halt_on_error: bool,
    ) -> Result<Outcome<Vec<(BatchKey, AjaxResult)>>> {
        let mut data = Vec::with_capacity(calls.len());
        let mut errors = Vec::new();
        let mut offset = 0;
        let mut calls = calls.into_iter().peekable();

        while calls.peek().is_some() {
            let chunk: Vec<BatchCall> = calls.by_ref().take(MAX_BATCH_COMMANDS).collect();
            let len = chunk.len();
            let (chunk_data, chunk_errors) = self
                .batch(BatchRequest::List(chunk), halt_on_error)
                .await?
                .into_parts();

            data.extend(chunk_data.into_iter().map(|(key, result)| (shift(key, offset), result)));
            errors.extend(chunk_errors.into_iter().map(|(key, err)| {
                let key = key.parse::<usize>().map(|i| (i + offset).to_string()).unwrap_or(key);
                (key, err)
            }));
            offset += len;
        }
        Ok(Outcome::new(data, errors))
    }

    /// Replaces the restriction parameters without losing per-method statistics.
    pub async fn set_restriction_params(&self, params: RestrictionParams) {
        self.inner.restrictions.set_config(params).await;
    }

    pub fn restriction_params(&self) -> RestrictionParams {
        self.inner.restrictions.params()
    }

    pub fn restriction_manager(&self) -> &RestrictionManager {
        &self.inner.restrictions
    }

    pub fn version_table(&self) -> &VersionTable {
        &self.inner.versions
    }

    pub async fn stats(&self) -> ClientStats {
        ClientStats {
            engine: self.inner.metrics.engine(),
            methods: self.inner.metrics.methods(),
            restrictions: self.inner.restrictions.stats().await,
        }
    }

    pub async fn reset_stats(&self) {
        self.inner.metrics.reset();
        self.inner.restrictions.reset_stats().await;
    }

    fn route(&self, method: &str) -> ApiVersion {
        if self.inner.versions.supports(ApiVersion::V3, method) && self.has_base(ApiVersion::V3) {
            ApiVersion::V3
        } else {
            ApiVersion::V2
        }
    }

    fn has_base(&self, version: ApiVersion) -> bool {
        self.inner
            .auth
            .target_origin_with_path()
            .contains_key(&version)
    }

    /// The retry loop shared by every call.
    async fn execute(
        &self,
        version: ApiVersion,
        method: &str,
        params: Value,
        request_id: String,
    ) -> Result<AjaxResult> {
        let endpoint = self.endpoint(version, method, &request_id)?;
        let query = RequestInfo::new(method, params, request_id);
        let restrictions = &self.inner.restrictions;
        let max_retries = restrictions.max_retries();

        let mut auth = self.ensure_auth().await?;
        let mut refreshed = false;
        let mut attempt = 0;

        loop {
            restrictions.wait_before(method, &query.params).await;
            self.inner.metrics.record_attempt();
            let started = Instant::now();

            let err = match self
                .execute_request(version, &endpoint, &query, &auth, attempt)
                .await
            {
                Ok(result) => {
                    self.inner.metrics.record_success(method, started.elapsed());
                    restrictions.update_stats(method, result.time()).await;
                    return Ok(result);
                }
                Err(err) => err,
            };
            self.inner.metrics.record_failure(method, err.code());

            if err.kind() == ErrorKind::Auth && !refreshed {
                tracing::info!(
                    method = %method,
                    request_id = %query.request_id,
                    code = %err.code(),
                    "Credential rejected - refreshing and retrying"
                );
                refreshed = true;
                auth = self.inner.auth.refresh_auth().await?;
                self.inner.metrics.record_auth_refresh();
                continue;
            }

            tracing::warn!(
                error = %err,
                attempt = attempt,
                method = %method,
                request_id = %query.request_id,
                "Request failed"
            );

            match restrictions
                .handle_error(&err, attempt, method, &query.params)
                .await
            {
                RetryDecision::Stop => return self.surface(err, &query, version),
                RetryDecision::Retry(_) if attempt >= max_retries => {
                    if self.is_soft(&err) {
                        return self.surface(err, &query, version);
                    }
                    tracing::error!(
                        method = %method,
                        request_id = %query.request_id,
                        attempts = attempt + 1,
                        "All attempts exhausted"
                    );
                    return Err(AjaxError::all_attempts_exhausted(attempt + 1, err).into());
                }
                RetryDecision::Retry(delay) => {
                    tracing::info!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt,
                        method = %method,
                        "Retrying request after delay"
                    );
                    self.inner.metrics.record_retry();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn is_soft(&self, err: &AjaxError) -> bool {
        self.inner.soft_codes.contains(err.code())
    }

    fn surface(&self, err: AjaxError, query: &RequestInfo, version: ApiVersion) -> Result<AjaxResult> {
        if self.is_soft(&err) {
            Ok(AjaxResult::failed(err, query.clone(), version))
        } else {
            Err(err.into())
        }
    }

    async fn ensure_auth(&self) -> Result<AuthData> {
        match self.inner.auth.auth_data() {
            Some(auth) => Ok(auth),
            None => {
                tracing::debug!("No cached credential - requesting one");
                let auth = self.inner.auth.refresh_auth().await?;
                self.inner.metrics.record_auth_refresh();
                Ok(auth)
            }
        }
    }

    /// `<base>/<method>.json` for v2, `<base>/<method>?sdk_request_id=<id>` for v3.
    fn endpoint(&self, version: ApiVersion, method: &str, request_id: &str) -> Result<Url> {
        let bases = self.inner.auth.target_origin_with_path();
        let mut url = bases
            .get(&version)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("No {version} base URL configured")))?;

        let segment = match version {
            ApiVersion::V2 => format!("{method}.json"),
            ApiVersion::V3 => method.to_string(),
        };
        url.path_segments_mut()
            .map_err(|()| Error::Configuration("Base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push(&segment);
        if version == ApiVersion::V3 {
            url.query_pairs_mut().append_pair("sdk_request_id", request_id);
        }
        Ok(url)
    }

    /// Executes a single request attempt.
    async fn execute_request(
        &self,
        version: ApiVersion,
        endpoint: &Url,
        query: &RequestInfo,
        auth: &AuthData,
        attempt: usize,
    ) -> std::result::Result<AjaxResult, AjaxError> {
        let mut url = endpoint.clone();
        let body = match &query.params {
            Value::Object(map) => {
                let mut body = map.clone();
                if !auth.is_hook() {
                    body.insert("auth".into(), Value::String(auth.access_token.clone()));
                }
                Value::Object(body)
            }
            other => {
                if !auth.is_hook() {
                    url.query_pairs_mut().append_pair("auth", &auth.access_token);
                }
                other.clone()
            }
        };

        tracing::debug!(
            method = %query.method,
            url = %endpoint,
            attempt = attempt,
            request_id = %query.request_id,
            "Executing API request"
        );

        let response = self
            .inner
            .http_client
            .post(url)
            .headers(self.inner.default_headers.clone())
            .timeout(self.inner.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| AjaxError::from_transport(e, Some(query.clone())))?;

        self.parse_response(version, query, response).await
    }

    /// Decodes the envelope `{result, next?, total?, time}` or its error shapes.
    async fn parse_response(
        &self,
        version: ApiVersion,
        query: &RequestInfo,
        response: reqwest::Response,
    ) -> std::result::Result<AjaxResult, AjaxError> {
        let status = response.status();
        let raw_body = response
            .text()
            .await
            .map_err(|e| AjaxError::from_transport(e, Some(query.clone())))?;

        let payload = match serde_json::from_str::<Value>(&raw_body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    status = status.as_u16(),
                    error = %e,
                    raw_response = %raw_body,
                    "Failed to decode response"
                );
                return Err(AjaxError::new(
                    codes::INVALID_RESPONSE,
                    format!("response is not JSON (status {status})"),
                    status.as_u16(),
                )
                .with_request_info(query.clone())
                .with_cause(e));
            }
        };

        if payload.get("error").is_some() || !status.is_success() {
            let (code, description) = parse_error_payload(&payload).unwrap_or_else(|| {
                (
                    codes::INVALID_RESPONSE.to_string(),
                    format!("unexpected status {status}"),
                )
            });
            // Errors reported inside a 200 are treated as client errors.
            let status = if status.is_success() {
                StatusCode::BAD_REQUEST
            } else {
                status
            };
            return Err(AjaxError::new(code, description, status.as_u16())
                .with_request_info(query.clone()));
        }

        let Some(result) = payload.get("result").cloned() else {
            return Err(AjaxError::new(
                codes::INVALID_RESPONSE,
                "response has no result",
                status.as_u16(),
            )
            .with_request_info(query.clone()));
        };
        let time = payload
            .get("time")
            .and_then(|t| serde_json::from_value::<PayloadTime>(t.clone()).ok())
            .unwrap_or_default();

        Ok(AjaxResult::new(
            result,
            payload.get("next").and_then(Value::as_u64),
            payload.get("total").and_then(Value::as_u64),
            time,
            query.clone(),
            version,
            status.as_u16(),
        ))
    }
}

struct ListCursor {
    client: Client,
    method: String,
    params: Map<String, Value>,
    id_key: String,
    extract: Option<String>,
    last_id: Option<Value>,
    done: bool,
}

impl ListCursor {
    async fn next_chunk(&self) -> Result<Vec<Value>> {
        let mut params = self.params.clone();

        let mut order = Map::new();
        order.insert(self.id_key.clone(), Value::String("ASC".into()));
        params.insert("order".into(), Value::Object(order));

        let mut filter = match params.remove("filter") {
            Some(Value::Object(filter)) => filter,
            _ => Map::new(),
        };
        if let Some(last_id) = &self.last_id {
            filter.insert(format!(">{}", self.id_key), last_id.clone());
        }
        params.insert("filter".into(), Value::Object(filter));
        params.insert("start".into(), Value::from(-1));

        let page = checked(self.client.call(&self.method, &Value::Object(params)).await?)?;
        extract_items(&page, self.extract.as_deref())
    }
}

/// Turns a softly failed result into its error.
fn checked(result: AjaxResult) -> Result<AjaxResult> {
    match result.error() {
        Some(err) => Err(err.clone().into()),
        None => Ok(result),
    }
}

fn extract_items(page: &AjaxResult, extract: Option<&str>) -> Result<Vec<Value>> {
    let data = match extract {
        Some(key) => page.data().get(key).unwrap_or(&Value::Null),
        None => page.data(),
    };
    match data {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map.values().cloned().collect()),
        Value::Null => Ok(Vec::new()),
        _ => Err(AjaxError::new(
            codes::INVALID_RESPONSE,
            format!("{} did not return a list", page.query().method),
            page.status(),
        )
        .with_request_info(page.query().clone())
        .into()),
    }
}

fn shift(key: BatchKey, offset: usize) -> BatchKey {
    match key {
        BatchKey::Index(i) => BatchKey::Index(i + offset),
        named => named,
    }
}

/// Params as a JSON object; `null` becomes an empty object.
fn to_params<P>(method: &str, params: &P) -> std::result::Result<Value, AjaxError>
where
    P: Serialize + ?Sized,
{
    let invalid = |description: String| {
        AjaxError::new(codes::INVALID_PARAMS, description, 400)
            .with_request_info(RequestInfo::new(method, Value::Null, String::new()))
    };
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => Ok(Value::Object(map)),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(other) => Err(invalid(format!("params of {method} must be an object, got {other}"))),
        Err(e) => Err(invalid(format!("params of {method} cannot be encoded: {e}")).with_cause(e)),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use rpcwarden::{ClientBuilder, HookAuth, RestrictionParams};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), rpcwarden::Error> {
/// let client = ClientBuilder::new()
///     .auth(HookAuth::new("https://example.com/rest/1/secret/")?)
///     .restriction_params(RestrictionParams::enterprise())
///     .timeout(Duration::from_secs(10))
///     .soft_error_codes(["NOT_FOUND"])
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    auth: Option<Arc<dyn AuthActions>>,
    restriction_params: RestrictionParams,
    versions: VersionTable,
    soft_codes: HashSet<String>,
    default_headers: HeaderMap,
    timeout: Duration,
    request_id_prefix: Option<String>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            auth: None,
            restriction_params: RestrictionParams::standard(),
            versions: VersionTable::builtin(),
            soft_codes: HashSet::new(),
            default_headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            request_id_prefix: None,
        }
    }

    /// Sets the authentication provider.
    pub fn auth<A>(mut self, auth: A) -> Self
    where
        A: AuthActions + 'static,
    {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Sets an authentication provider shared with other owners, such as an
    /// [`AutoAuthRefresher`](crate::AutoAuthRefresher).
    pub fn shared_auth(mut self, auth: Arc<dyn AuthActions>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn restriction_params(mut self, params: RestrictionParams) -> Self {
        self.restriction_params = params;
        self
    }

    /// Sets the table of v3-capable methods. Defaults to [`VersionTable::builtin`].
    pub fn version_table(mut self, versions: VersionTable) -> Self {
        self.versions = versions;
        self
    }

    /// Error codes returned as failed results rather than errors.
    pub fn soft_error_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.soft_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the per-request timeout. Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the prefix of generated request ids.
    pub fn request_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.request_id_prefix = Some(prefix.into());
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no authentication provider was set or the HTTP client cannot be
    /// created.
    pub fn build(self) -> Result<Client> {
        let auth = self
            .auth
            .ok_or_else(|| Error::Configuration("An auth provider is required".to_string()))?;

        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;

        let request_ids = match self.request_id_prefix {
            Some(prefix) => RequestIdGenerator::new(prefix),
            None => RequestIdGenerator::default(),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                auth,
                restrictions: RestrictionManager::new(self.restriction_params),
                versions: self.versions,
                request_ids,
                metrics: Metrics::default(),
                soft_codes: self.soft_codes,
                default_headers: self.default_headers,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
