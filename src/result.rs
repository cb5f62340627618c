//! Immutable call results.
//!
//! [`AjaxResult`] wraps one completed exchange: the decoded `result`, pagination cursors, the
//! server-reported [`PayloadTime`], and the frozen query it answers so that the next page can be
//! requested from it. [`Outcome`] is the looser success-or-errors container returned by the
//! multi-call helpers (batches, chunked batches).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AjaxError, RequestInfo};
use crate::version::ApiVersion;
use crate::Result;

/// Server-side timing attached to every successful payload.
///
/// The wire reports seconds. `operating` is the execution time the method has consumed against
/// its rolling budget, `operating_reset_at` the epoch second at which part of that budget frees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadTime {
    pub start: f64,
    pub finish: f64,
    pub duration: f64,
    pub processing: f64,
    pub operating: f64,
    pub operating_reset_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_finish: Option<String>,
}

impl PayloadTime {
    /// Consumed operating budget in milliseconds.
    pub fn operating_ms(&self) -> u64 {
        seconds_to_ms(self.operating)
    }

    /// Budget reset instant in epoch milliseconds.
    pub fn operating_reset_at_ms(&self) -> u64 {
        seconds_to_ms(self.operating_reset_at)
    }
}

fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

/// The answer to one remote call.
///
/// There are no mutators: a result can only be consumed into a new value with [`map`] or
/// [`into_typed`].
///
/// [`map`]: AjaxResult::map
/// [`into_typed`]: AjaxResult::into_typed
#[derive(Debug, Clone)]
pub struct AjaxResult<T = Value> {
    result: T,
    next: Option<u64>,
    total: Option<u64>,
    time: PayloadTime,
    errors: Vec<(String, AjaxError)>,
    query: RequestInfo,
    version: ApiVersion,
    status: u16,
}

impl<T> AjaxResult<T> {
    /// Creates a successful result.
    pub fn new(
        result: T,
        next: Option<u64>,
        total: Option<u64>,
        time: PayloadTime,
        query: RequestInfo,
        version: ApiVersion,
        status: u16,
    ) -> Self {
        Self {
            result,
            next,
            total,
            time,
            errors: Vec::new(),
            query,
            version,
            status,
        }
    }

    /// Creates a failed result carrying `error` under its code.
    pub fn failed(error: AjaxError, query: RequestInfo, version: ApiVersion) -> Self
    where
        T: Default,
    {
        Self {
            result: T::default(),
            next: None,
            total: None,
            time: PayloadTime::default(),
            status: error.status(),
            errors: vec![(error.code().to_string(), error)],
            query,
            version,
        }
    }

    pub fn data(&self) -> &T {
        &self.result
    }

    pub fn into_data(self) -> T {
        self.result
    }

    /// Offset of the next page, if there is one.
    pub fn next(&self) -> Option<u64> {
        self.next
    }

    /// Total number of records the list method reports.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn time(&self) -> &PayloadTime {
        &self.time
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    /// The query this result answers.
    pub fn query(&self) -> &RequestInfo {
        &self.query
    }

    pub fn errors(&self) -> &[(String, AjaxError)] {
        &self.errors
    }

    /// The first error, if the call failed.
    pub fn error(&self) -> Option<&AjaxError> {
        self.errors.first().map(|(_, err)| err)
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns `true` if the server reported another page.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    /// Builds the query for the next page: the original params with `start` set to the cursor.
    pub fn next_query(&self) -> Option<RequestInfo> {
        let next = self.next?;
        let mut params = match &self.query.params {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        params.insert("start".to_string(), Value::from(next));
        Some(RequestInfo::new(
            self.query.method.clone(),
            Value::Object(params),
            self.query.request_id.clone(),
        ))
    }

    /// Maps the payload to a different type, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> AjaxResult<U>
    where
        F: FnOnce(T) -> U,
    {
        AjaxResult {
            result: f(self.result),
            next: self.next,
            total: self.total,
            time: self.time,
            errors: self.errors,
            query: self.query,
            version: self.version,
            status: self.status,
        }
    }
}

impl AjaxResult<Value> {
    /// Deserializes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns an `INVALID_RESPONSE` error when the payload does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<AjaxResult<T>> {
        let query = self.query.clone();
        let status = self.status;
        let typed = serde_json::from_value::<T>(self.result.clone()).map_err(|e| {
            AjaxError::new(
                crate::error::codes::INVALID_RESPONSE,
                format!("result does not match the expected type: {e}"),
                status,
            )
            .with_request_info(query)
            .with_cause(e)
        })?;
        Ok(self.map(|_| typed))
    }
}

impl<T> AsRef<T> for AjaxResult<T> {
    fn as_ref(&self) -> &T {
        &self.result
    }
}

impl<T> std::ops::Deref for AjaxResult<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.result
    }
}

/// Data plus the errors collected while producing it.
///
/// Errors are keyed by the address of the failing piece (a batch index or command name) and kept
/// in the order they were observed.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    data: T,
    errors: Vec<(String, AjaxError)>,
}

impl<T> Outcome<T> {
    pub fn new(data: T, errors: Vec<(String, AjaxError)>) -> Self {
        Self { data, errors }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn errors(&self) -> &[(String, AjaxError)] {
        &self.errors
    }

    /// Looks up the error recorded under `key`.
    pub fn error(&self, key: &str) -> Option<&AjaxError> {
        self.errors
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, err)| err)
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_parts(self) -> (T, Vec<(String, AjaxError)>) {
        (self.data, self.errors)
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        Outcome {
            data: f(self.data),
            errors: self.errors,
        }
    }
}
