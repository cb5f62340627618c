//! Credentials and the authentication provider seam.
//!
//! The client never performs an OAuth handshake. It asks an [`AuthActions`] implementation for
//! the current credential, for a fresh one when the server rejects it, and for the base URL of
//! each wire version.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

use crate::version::ApiVersion;
use crate::Result;

/// `refresh_token` value marking a static webhook credential that never expires.
pub const HOOK_REFRESH_TOKEN: &str = "hook";

/// A credential as issued by the authorization server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthData {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of `access_token`, in epoch seconds.
    pub expires: i64,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
}

impl AuthData {
    /// A static webhook credential.
    pub fn hook() -> Self {
        Self {
            access_token: String::new(),
            refresh_token: HOOK_REFRESH_TOKEN.to_string(),
            expires: 0,
            expires_in: 0,
            domain: None,
            member_id: None,
        }
    }

    /// Returns `true` for static webhook credentials, which are never refreshed and never sent in
    /// request bodies.
    pub fn is_hook(&self) -> bool {
        self.refresh_token == HOOK_REFRESH_TOKEN
    }

    /// Seconds until `expires`, negative once expired.
    pub fn seconds_until_expiry(&self) -> i64 {
        self.expires - now_secs()
    }
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// What the client needs from an authentication provider.
#[async_trait]
pub trait AuthActions: Send + Sync {
    /// The cached credential, or `None` if there is none yet.
    fn auth_data(&self) -> Option<AuthData>;

    /// Obtains a new credential and caches it.
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::Error::Auth`] when no credential can be obtained.
    async fn refresh_auth(&self) -> Result<AuthData>;

    /// Base URL of every wire version the server offers.
    fn target_origin_with_path(&self) -> HashMap<ApiVersion, Url>;
}

/// A static webhook credential: fixed base URLs, never refreshed.
///
/// The secret lives in the URL path, so requests carry no `auth` field.
#[derive(Debug, Clone)]
pub struct HookAuth {
    bases: HashMap<ApiVersion, Url>,
}

impl HookAuth {
    /// Creates a provider serving v2 under `v2_base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(v2_base: impl AsRef<str>) -> Result<Self> {
        let mut bases = HashMap::new();
        bases.insert(ApiVersion::V2, Url::parse(v2_base.as_ref())?);
        Ok(Self { bases })
    }

    /// Adds the v3 base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_v3_base(mut self, v3_base: impl AsRef<str>) -> Result<Self> {
        self.bases
            .insert(ApiVersion::V3, Url::parse(v3_base.as_ref())?);
        Ok(self)
    }
}

#[async_trait]
impl AuthActions for HookAuth {
    fn auth_data(&self) -> Option<AuthData> {
        Some(AuthData::hook())
    }

    async fn refresh_auth(&self) -> Result<AuthData> {
        Ok(AuthData::hook())
    }

    fn target_origin_with_path(&self) -> HashMap<ApiVersion, Url> {
        self.bases.clone()
    }
}
