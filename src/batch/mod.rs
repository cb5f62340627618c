//! Batches: up to 50 commands sent as one `batch` call.
//!
//! A batch is normalized into [`BatchCommand`]s, encoded by one of four [`BatchStrategy`]
//! variants (wire version × request shape), executed as a single call, and the combined response
//! is split back into one [`AjaxResult`] per command.

mod query;
mod v2;
mod v3;

pub use query::build_query;

use serde_json::{Map, Value};
use std::fmt;

use crate::error::{codes, AjaxError, RequestInfo};
use crate::result::{AjaxResult, PayloadTime};
use crate::version::ApiVersion;

/// Most commands one batch may carry.
pub const MAX_BATCH_COMMANDS: usize = 50;

/// Address of a command's result: its position in a list, or its name in a map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BatchKey {
    Index(usize),
    Name(String),
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKey::Index(i) => write!(f, "{i}"),
            BatchKey::Name(name) => f.write_str(name),
        }
    }
}

/// Whether the caller addressed commands by position or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchShape {
    Array,
    Object,
}

/// One method call of a batch, as the caller wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCall {
    pub method: String,
    pub params: Value,
}

impl BatchCall {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// A normalized command.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCommand {
    pub method: String,
    pub query: Value,
    pub key: BatchKey,
    /// Continue-on-error semantics were requested for this batch.
    pub parallel: bool,
}

/// The commands of a batch, positional or named.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchRequest {
    List(Vec<BatchCall>),
    Named(Vec<(String, BatchCall)>),
}

impl BatchRequest {
    pub fn list<I>(calls: I) -> Self
    where
        I: IntoIterator<Item = BatchCall>,
    {
        BatchRequest::List(calls.into_iter().collect())
    }

    pub fn named<I, S>(calls: I) -> Self
    where
        I: IntoIterator<Item = (S, BatchCall)>,
        S: Into<String>,
    {
        BatchRequest::Named(calls.into_iter().map(|(k, c)| (k.into(), c)).collect())
    }

    /// Parses the loosely-typed shapes callers use:
    ///
    /// - a list of tuples: `[["user.get", {"ID": 1}], ["user.current"]]`
    /// - a list of objects: `[{"method": "user.get", "params": {"ID": 1}}]`
    /// - a map of named commands, each a tuple or an object: `{"me": ["user.current"]}`
    ///
    /// # Errors
    ///
    /// Returns an `INVALID_REQUEST` error for anything else.
    pub fn parse(value: &Value) -> Result<Self, AjaxError> {
        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_call(item).ok_or_else(|| invalid_command(&i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(BatchRequest::List),
            Value::Object(map) => map
                .iter()
                .map(|(name, item)| {
                    parse_call(item)
                        .map(|call| (name.clone(), call))
                        .ok_or_else(|| invalid_command(name))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(BatchRequest::Named),
            _ => Err(AjaxError::new(
                codes::INVALID_REQUEST,
                "batch must be a list or a map of commands",
                400,
            )),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BatchRequest::List(calls) => calls.len(),
            BatchRequest::Named(calls) => calls.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> BatchShape {
        match self {
            BatchRequest::List(_) => BatchShape::Array,
            BatchRequest::Named(_) => BatchShape::Object,
        }
    }

    /// Normalizes into commands, checking the 1..=50 size bound.
    ///
    /// # Errors
    ///
    /// Returns `ERROR_BATCH_EMPTY` or `ERROR_BATCH_LENGTH_EXCEEDED`.
    pub fn into_commands(self, halt_on_error: bool) -> Result<Vec<BatchCommand>, AjaxError> {
        check_len(self.len())?;
        let parallel = !halt_on_error;
        let commands = match self {
            BatchRequest::List(calls) => calls
                .into_iter()
                .enumerate()
                .map(|(i, call)| BatchCommand {
                    method: call.method,
                    query: call.params,
                    key: BatchKey::Index(i),
                    parallel,
                })
                .collect(),
            BatchRequest::Named(calls) => calls
                .into_iter()
                .map(|(name, call)| BatchCommand {
                    method: call.method,
                    query: call.params,
                    key: BatchKey::Name(name),
                    parallel,
                })
                .collect(),
        };
        Ok(commands)
    }
}

impl From<Vec<BatchCall>> for BatchRequest {
    fn from(calls: Vec<BatchCall>) -> Self {
        BatchRequest::List(calls)
    }
}

fn parse_call(item: &Value) -> Option<BatchCall> {
    match item {
        Value::Array(parts) => {
            let method = parts.first()?.as_str()?;
            let params = parts.get(1).cloned().unwrap_or(Value::Null);
            Some(BatchCall::new(method, params))
        }
        Value::Object(map) => {
            let method = map.get("method")?.as_str()?;
            let params = map
                .get("params")
                .or_else(|| map.get("query"))
                .cloned()
                .unwrap_or(Value::Null);
            Some(BatchCall::new(method, params))
        }
        _ => None,
    }
}

fn invalid_command(key: &str) -> AjaxError {
    AjaxError::new(
        codes::INVALID_REQUEST,
        format!("batch command {key} has no method"),
        400,
    )
}

fn check_len(len: usize) -> Result<(), AjaxError> {
    if len == 0 {
        return Err(AjaxError::new(
            codes::ERROR_BATCH_EMPTY,
            "batch must contain at least one command",
            400,
        ));
    }
    if len > MAX_BATCH_COMMANDS {
        return Err(AjaxError::new(
            codes::ERROR_BATCH_LENGTH_EXCEEDED,
            format!("batch contains {len} commands, the limit is {MAX_BATCH_COMMANDS}"),
            400,
        ));
    }
    Ok(())
}

/// Distinct methods in an outgoing `batch` payload, in first-seen order.
///
/// Reads the v2 form (`cmd` as a list or map of `method?query` strings) and the v3 form (a list
/// of `{method, query}` objects).
pub fn sub_methods(payload: &Value) -> Vec<String> {
    let mut methods: Vec<String> = Vec::new();
    let mut push = |method: &str| {
        if !method.is_empty() && !methods.iter().any(|m| m == method) {
            methods.push(method.to_string());
        }
    };

    let v2_method = |cmd: &Value| -> Option<String> {
        let cmd = cmd.as_str()?;
        Some(cmd.split('?').next().unwrap_or(cmd).to_string())
    };

    match payload {
        Value::Array(items) => {
            for item in items {
                if let Some(method) = item.get("method").and_then(Value::as_str) {
                    push(method);
                }
            }
        }
        Value::Object(map) => match map.get("cmd") {
            Some(Value::Array(cmds)) => {
                for method in cmds.iter().filter_map(v2_method) {
                    push(&method);
                }
            }
            Some(Value::Object(cmds)) => {
                for method in cmds.values().filter_map(v2_method) {
                    push(&method);
                }
            }
            _ => {}
        },
        _ => {}
    }
    methods
}

/// A decoded command: its key, and either its result or its error.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub key: BatchKey,
    pub method: String,
    pub result: Result<AjaxResult, AjaxError>,
}

/// Encoding/decoding variant, fixed by wire version and request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    V2Array,
    V2Object,
    V3Array,
    V3Object,
}

impl BatchStrategy {
    pub fn select(version: ApiVersion, shape: BatchShape) -> Self {
        match (version, shape) {
            (ApiVersion::V2, BatchShape::Array) => BatchStrategy::V2Array,
            (ApiVersion::V2, BatchShape::Object) => BatchStrategy::V2Object,
            (ApiVersion::V3, BatchShape::Array) => BatchStrategy::V3Array,
            (ApiVersion::V3, BatchShape::Object) => BatchStrategy::V3Object,
        }
    }

    pub fn version(self) -> ApiVersion {
        match self {
            BatchStrategy::V2Array | BatchStrategy::V2Object => ApiVersion::V2,
            BatchStrategy::V3Array | BatchStrategy::V3Object => ApiVersion::V3,
        }
    }

    pub fn shape(self) -> BatchShape {
        match self {
            BatchStrategy::V2Array | BatchStrategy::V3Array => BatchShape::Array,
            BatchStrategy::V2Object | BatchStrategy::V3Object => BatchShape::Object,
        }
    }

    /// Builds the params of the `batch` call.
    pub fn encode(self, commands: &[BatchCommand], halt_on_error: bool) -> Value {
        match self {
            BatchStrategy::V2Array => v2::encode_array(commands, halt_on_error),
            BatchStrategy::V2Object => v2::encode_object(commands, halt_on_error),
            BatchStrategy::V3Array | BatchStrategy::V3Object => v3::encode(commands),
        }
    }

    /// Splits the response of the `batch` call into per-command outcomes.
    ///
    /// A failed batch call fails every command. With `halt_on_error` the first failing command
    /// whose error is not soft is returned as the error instead; soft errors stay in the
    /// outcomes.
    ///
    /// # Errors
    ///
    /// Returns the first hard command error when `halt_on_error` is set.
    pub fn decode<F>(
        self,
        commands: &[BatchCommand],
        response: &AjaxResult,
        halt_on_error: bool,
        is_soft: F,
    ) -> Result<Vec<CommandOutcome>, AjaxError>
    where
        F: Fn(&AjaxError) -> bool,
    {
        if let Some(err) = response.error() {
            if halt_on_error && !is_soft(err) {
                return Err(err.clone());
            }
            return Ok(commands
                .iter()
                .map(|cmd| CommandOutcome {
                    key: cmd.key.clone(),
                    method: cmd.method.clone(),
                    result: Err(err.clone()),
                })
                .collect());
        }

        let outcomes = match self {
            BatchStrategy::V2Array | BatchStrategy::V2Object => v2::decode(commands, response),
            BatchStrategy::V3Array | BatchStrategy::V3Object => v3::decode(commands, response),
        };

        if halt_on_error {
            let hard = outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().err())
                .find(|err| !is_soft(err));
            if let Some(err) = hard {
                return Err(err.clone());
            }
        }
        Ok(outcomes)
    }
}

/// Builds the result of one command from its decoded pieces.
fn command_result(
    command: &BatchCommand,
    batch: &AjaxResult,
    data: Value,
    next: Option<u64>,
    total: Option<u64>,
    time: PayloadTime,
) -> AjaxResult {
    let query = RequestInfo::new(
        command.method.clone(),
        command.query.clone(),
        batch.query().request_id.clone(),
    );
    AjaxResult::new(data, next, total, time, query, batch.version(), batch.status())
}

fn command_error(command: &BatchCommand, batch: &AjaxResult, code: String, description: String) -> AjaxError {
    AjaxError::new(code, description, 400).with_request_info(RequestInfo::new(
        command.method.clone(),
        command.query.clone(),
        batch.query().request_id.clone(),
    ))
}

/// Params as a JSON object, `null` treated as empty.
pub(crate) fn params_object(params: &Value) -> Map<String, Value> {
    match params {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}
