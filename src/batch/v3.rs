//! v3 batches: a bare list of `{method, query}` objects.

use serde_json::{Map, Value};

use super::{command_result, params_object, BatchCommand, CommandOutcome};
use crate::result::AjaxResult;

pub(super) fn encode(commands: &[BatchCommand]) -> Value {
    Value::Array(
        commands
            .iter()
            .map(|command| {
                let mut item = Map::new();
                item.insert("method".into(), Value::String(command.method.clone()));
                item.insert("query".into(), Value::Object(params_object(&command.query)));
                Value::Object(item)
            })
            .collect(),
    )
}

/// One entry per command when the result is a list of matching length; otherwise every command
/// sees the whole result. All commands share the batch's timing.
pub(super) fn decode(commands: &[BatchCommand], response: &AjaxResult) -> Vec<CommandOutcome> {
    let per_command = match response.data() {
        Value::Array(items) if items.len() == commands.len() => Some(items),
        _ => None,
    };

    commands
        .iter()
        .enumerate()
        .map(|(i, command)| {
            let data = match per_command {
                Some(items) => items[i].clone(),
                None => response.data().clone(),
            };
            CommandOutcome {
                key: command.key.clone(),
                method: command.method.clone(),
                result: Ok(command_result(
                    command,
                    response,
                    data,
                    None,
                    None,
                    response.time().clone(),
                )),
            }
        })
        .collect()
}
