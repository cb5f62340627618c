//! Correlation identifiers for calls.

use uuid::Uuid;

/// Issues identifiers of the form `<prefix>-<uuid v4>`.
#[derive(Debug, Clone)]
pub struct RequestIdGenerator {
    prefix: String,
}

impl RequestIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns a fresh identifier.
    pub fn next_id(&self) -> String {
        format!("{}-{}", self.prefix, Uuid::new_v4())
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new("rpc")
    }
}
