//! Bracket-style query strings for v2 batch commands.

use serde_json::Value;
use url::form_urlencoded::Serializer;

/// Encodes params as a nested query string: `{"filter": {"ID": [1, 2]}}` becomes
/// `filter%5BID%5D%5B0%5D=1&filter%5BID%5D%5B1%5D=2`.
///
/// Booleans are sent as `1` and `0`; `null` as an empty value.
///
/// ```
/// use rpcwarden::batch::build_query;
/// use serde_json::json;
///
/// assert_eq!(build_query(&json!({"ID": 7, "select": ["NAME"]})), "ID=7&select%5B0%5D=NAME");
/// ```
pub fn build_query(params: &Value) -> String {
    let mut serializer = Serializer::new(String::new());
    if let Value::Object(map) = params {
        for (key, value) in map {
            append(&mut serializer, key, value);
        }
    }
    serializer.finish()
}

fn append(serializer: &mut Serializer<'_, String>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                append(serializer, &format!("{prefix}[{key}]"), nested);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                append(serializer, &format!("{prefix}[{i}]"), nested);
            }
        }
        Value::String(s) => {
            serializer.append_pair(prefix, s);
        }
        Value::Bool(b) => {
            serializer.append_pair(prefix, if *b { "1" } else { "0" });
        }
        Value::Number(n) => {
            serializer.append_pair(prefix, &n.to_string());
        }
        Value::Null => {
            serializer.append_pair(prefix, "");
        }
    }
}
