//! Wire versions and the table of methods each version serves.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A wire format of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V2,
    V3,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::V2 => f.write_str("v2"),
            ApiVersion::V3 => f.write_str("v3"),
        }
    }
}

/// Which methods the v3 wire format accepts.
///
/// Every method is assumed to exist on v2. The table is handed to the client at construction so
/// tests and deployments can describe their own server.
#[derive(Debug, Clone, Default)]
pub struct VersionTable {
    v3_methods: HashSet<String>,
}

impl VersionTable {
    /// A table with no v3 methods: everything goes over v2.
    pub fn v2_only() -> Self {
        Self::default()
    }

    /// A table listing the given v3-capable methods.
    pub fn with_v3_methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            v3_methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    /// Methods the v3 endpoint served when this client was written.
    pub fn builtin() -> Self {
        Self::with_v3_methods(["batch", "main.eventlog.get", "main.eventlog.list", "tasks.task.get"])
    }

    pub fn supports(&self, version: ApiVersion, method: &str) -> bool {
        match version {
            ApiVersion::V2 => true,
            ApiVersion::V3 => self.v3_methods.contains(method),
        }
    }

    /// Returns `true` if every method can be sent over v3.
    pub fn supports_all<'a, I>(&self, version: ApiVersion, methods: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        methods.into_iter().all(|m| self.supports(version, m))
    }
}
