//! # rpcwarden - A resilient client for rate-limited JSON-RPC APIs
//!
//! rpcwarden calls a versioned JSON-RPC-over-HTTP API (the "v2" and "v3" wire formats) and takes
//! care of everything between the caller and the wire: per-account throughput limits, the
//! per-method execution-time budgets the server reports, retries with backoff, credential refresh
//! on `401`, and batches of up to 50 commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rpcwarden::{Client, HookAuth};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     #[serde(rename = "ID")]
//!     id: String,
//!     #[serde(rename = "NAME")]
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rpcwarden::Error> {
//!     let client = Client::builder()
//!         .auth(HookAuth::new("https://example.com/rest/1/secret/")?)
//!         .build()?;
//!
//!     // One call, typed
//!     let users = client.call_as::<Vec<User>, _>("user.get", &json!({"ID": 1})).await?;
//!     for user in users.data() {
//!         println!("{}: {}", user.id, user.name);
//!     }
//!
//!     // Every page of a list method
//!     let deals = client.call_list("crm.deal.list", &json!({"select": ["ID"]}), None).await?;
//!     println!("{} deals", deals.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Batches
//!
//! ```no_run
//! use rpcwarden::{BatchCall, BatchRequest, Client};
//! use serde_json::json;
//!
//! # async fn example(client: Client) -> Result<(), rpcwarden::Error> {
//! let outcome = client
//!     .batch(
//!         BatchRequest::named([
//!             ("me", BatchCall::new("user.current", json!({}))),
//!             ("deal", BatchCall::new("crm.deal.get", json!({"id": 7}))),
//!         ]),
//!         false,
//!     )
//!     .await?;
//!
//! for (key, result) in outcome.data() {
//!     println!("{key}: {:?}", result.data());
//! }
//! for (key, err) in outcome.errors() {
//!     eprintln!("{key} failed: {err}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Restrictions
//!
//! Every call passes three limiters, in order: the operating limiter (waits out a method whose
//! execution budget is exhausted), the adaptive delayer (slows down a method nearing its
//! budget), and a leaky-bucket rate limiter that tightens itself after repeated rate-limit errors.
//! Their parameters can be swapped at runtime:
//!
//! ```no_run
//! use rpcwarden::{Client, RestrictionParams};
//!
//! # async fn example(client: Client) {
//! client.set_restriction_params(RestrictionParams::enterprise()).await;
//! # }
//! ```
//!
//! ## Features
//!
//! - **Retry policy by error class** - fatal codes fail fast, rate-limit and operating-limit
//!   errors wait as the server requires, transient failures back off exponentially
//! - **Soft error codes** - chosen codes come back as failed results instead of errors
//! - **Immutable results** - [`AjaxResult`] carries the query it answers, so the next page can be
//!   requested from it
//! - **Background credential renewal** - [`AutoAuthRefresher`]
//! - **Structured logging** with `tracing`

pub mod auth;
pub mod batch;
mod client;
mod error;
pub mod limiter;
mod metrics;
pub mod refresher;
pub mod request_id;
mod result;
pub mod retry;
pub mod version;

pub use auth::{AuthActions, AuthData, HookAuth};
pub use batch::{BatchCall, BatchKey, BatchRequest, BatchShape};
pub use client::{Client, ClientBuilder, ClientStats, LIST_PAGE_SIZE};
pub use error::{codes, AjaxError, Error, ErrorKind, RequestInfo, Result};
pub use limiter::RestrictionParams;
pub use metrics::{EngineMetrics, MethodMetrics};
pub use refresher::{AutoAuthRefresher, RefreshEvent, RefresherConfig, RefresherState};
pub use result::{AjaxResult, Outcome, PayloadTime};
pub use version::{ApiVersion, VersionTable};
