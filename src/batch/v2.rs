//! v2 batches: `{halt, cmd}` with one query string per command, answered by parallel
//! `result`, `result_error`, `result_total`, `result_next` and `result_time` members.

use serde_json::{Map, Value};

use super::{command_error, command_result, build_query, BatchCommand, BatchKey, CommandOutcome};
use crate::error::{codes, parse_error_payload};
use crate::result::{AjaxResult, PayloadTime};

pub(super) fn encode_array(commands: &[BatchCommand], halt_on_error: bool) -> Value {
    let cmd = commands.iter().map(|c| Value::String(command_line(c))).collect();
    envelope(Value::Array(cmd), halt_on_error)
}

pub(super) fn encode_object(commands: &[BatchCommand], halt_on_error: bool) -> Value {
    let cmd: Map<String, Value> = commands
        .iter()
        .map(|c| (c.key.to_string(), Value::String(command_line(c))))
        .collect();
    envelope(Value::Object(cmd), halt_on_error)
}

fn envelope(cmd: Value, halt_on_error: bool) -> Value {
    let mut body = Map::new();
    body.insert("halt".into(), Value::from(u8::from(halt_on_error)));
    body.insert("cmd".into(), cmd);
    Value::Object(body)
}

fn command_line(command: &BatchCommand) -> String {
    let query = build_query(&command.query);
    if query.is_empty() {
        command.method.clone()
    } else {
        format!("{}?{}", command.method, query)
    }
}

pub(super) fn decode(commands: &[BatchCommand], response: &AjaxResult) -> Vec<CommandOutcome> {
    let payload = response.data();
    let member = |name: &str, key: &BatchKey| lookup(payload.get(name), key);

    commands
        .iter()
        .map(|command| {
            let key = &command.key;
            let result = if let Some(err) = member("result_error", key) {
                let (code, description) = parse_error_payload(err)
                    .unwrap_or_else(|| (codes::INVALID_RESPONSE.to_string(), err.to_string()));
                Err(command_error(command, response, code, description))
            } else if let Some(data) = member("result", key) {
                let time = member("result_time", key)
                    .and_then(|t| serde_json::from_value::<PayloadTime>(t.clone()).ok())
                    .unwrap_or_default();
                Ok(command_result(
                    command,
                    response,
                    data.clone(),
                    member("result_next", key).and_then(Value::as_u64),
                    member("result_total", key).and_then(Value::as_u64),
                    time,
                ))
            } else {
                Err(command_error(
                    command,
                    response,
                    codes::INVALID_RESPONSE.to_string(),
                    format!("batch response has no result for command {key}"),
                ))
            };
            CommandOutcome {
                key: key.clone(),
                method: command.method.clone(),
                result,
            }
        })
        .collect()
}

/// Finds a command's entry in a `result_*` member, which may be a list or a map keyed by
/// position or name.
fn lookup<'a>(member: Option<&'a Value>, key: &BatchKey) -> Option<&'a Value> {
    match (member?, key) {
        (Value::Array(items), BatchKey::Index(i)) => items.get(*i),
        (Value::Object(map), BatchKey::Index(i)) => map.get(&i.to_string()),
        (Value::Object(map), BatchKey::Name(name)) => map.get(name),
        _ => None,
    }
}
