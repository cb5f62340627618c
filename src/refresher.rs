//! Background credential renewal.
//!
//! [`AutoAuthRefresher`] periodically inspects the credential of an [`AuthActions`] provider and
//! refreshes it ahead of expiry, independently of any call in flight. Static webhook credentials
//! are never refreshed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthActions, AuthData};
use crate::limiter::lock;
use crate::retry::Backoff;
use crate::{Error, Result};

/// Share of the refresh window inside which an "expiring soon" event is emitted.
const EXPIRING_SOON_FACTOR: f64 = 1.05;

/// Timing of the refresh task.
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Time between two credential checks.
    pub check_interval: Duration,
    /// Refresh once the credential expires within this window.
    pub refresh_before_expiry: Duration,
    /// Base delay after a failed refresh, doubled for each consecutive failure.
    pub retry_interval: Duration,
    /// Retries after a failed refresh before the task stops itself.
    pub max_retries: usize,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30 * 60),
            refresh_before_expiry: Duration::from_secs(10 * 60),
            retry_interval: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherState {
    Stopped,
    Running,
}

/// Notifications from the refresh task.
#[derive(Debug, Clone)]
pub enum RefreshEvent {
    /// A new credential was obtained.
    Refreshed(AuthData),
    /// The credential expires shortly after the refresh window opens.
    ExpiringSoon { seconds_left: i64 },
    /// A refresh failed; another attempt follows after `retry_in`.
    RefreshFailed {
        error: Error,
        retry: usize,
        retry_in: Duration,
    },
    /// The task ended. `error` is set when it gave up after repeated failures.
    Stopped { error: Option<Error> },
}

type EventHandler = Arc<dyn Fn(RefreshEvent) + Send + Sync>;

struct RefresherInner {
    auth: Arc<dyn AuthActions>,
    config: RefresherConfig,
    on_event: Option<EventHandler>,
    is_refreshing: AtomicBool,
}

/// Keeps a provider's credential fresh in the background.
///
/// # Examples
///
/// ```no_run
/// use rpcwarden::{AuthActions, AutoAuthRefresher, RefreshEvent, RefresherConfig};
/// use std::sync::Arc;
///
/// # async fn example(auth: Arc<dyn AuthActions>) -> Result<(), rpcwarden::Error> {
/// let refresher = AutoAuthRefresher::new(auth, RefresherConfig::default())
///     .on_event(|event| {
///         if let RefreshEvent::Stopped { error: Some(err) } = event {
///             eprintln!("credential refresh gave up: {err}");
///         }
///     });
/// refresher.start()?;
/// // ...
/// refresher.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct AutoAuthRefresher {
    inner: Arc<RefresherInner>,
    cancellation_token: Mutex<CancellationToken>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoAuthRefresher {
    pub fn new(auth: Arc<dyn AuthActions>, config: RefresherConfig) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                auth,
                config,
                on_event: None,
                is_refreshing: AtomicBool::new(false),
            }),
            cancellation_token: Mutex::new(CancellationToken::new()),
            task_handle: Mutex::new(None),
        }
    }

    /// Registers the event callback. Must be called before [`start`](Self::start).
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(RefreshEvent) + Send + Sync + 'static,
    {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.on_event = Some(Arc::new(handler));
        }
        self
    }

    /// Spawns the refresh task. The first check runs immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the task is already running.
    pub fn start(&self) -> Result<()> {
        let mut handle = lock(&self.task_handle);
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(Error::Configuration(
                "Auth refresher already running".to_string(),
            ));
        }

        let cancel = CancellationToken::new();
        *lock(&self.cancellation_token) = cancel.clone();
        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(async move {
            inner.run(cancel).await;
        }));

        tracing::info!(
            check_interval_secs = self.inner.config.check_interval.as_secs(),
            "Auth refresher started"
        );
        Ok(())
    }

    /// Cancels the task and waits for it to finish.
    pub async fn stop(&self) {
        lock(&self.cancellation_token).cancel();
        let handle = lock(&self.task_handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Auth refresher task panicked");
            }
        }
    }

    pub fn state(&self) -> RefresherState {
        match lock(&self.task_handle).as_ref() {
            Some(handle) if !handle.is_finished() => RefresherState::Running,
            _ => RefresherState::Stopped,
        }
    }

    /// Refreshes right away. Returns `None` if a refresh is already in progress.
    ///
    /// # Errors
    ///
    /// Returns the provider's error.
    pub async fn refresh_now(&self) -> Result<Option<AuthData>> {
        self.inner.refresh().await
    }
}

impl Drop for AutoAuthRefresher {
    fn drop(&mut self) {
        lock(&self.cancellation_token).cancel();
    }
}

/// Clears the busy flag when a refresh ends, however it ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefresherInner {
    async fn run(&self, cancel: CancellationToken) {
        let mut failures = 0;
        loop {
            let delay = match self.check().await {
                Ok(()) => {
                    failures = 0;
                    self.config.check_interval
                }
                Err(err) => {
                    failures += 1;
                    if failures > self.config.max_retries {
                        tracing::error!(
                            error = %err,
                            failures = failures,
                            "Auth refresh failed repeatedly - stopping refresher"
                        );
                        self.emit(RefreshEvent::Stopped { error: Some(err) });
                        return;
                    }
                    let retry_in = Backoff::exponential(self.config.retry_interval)
                        .delay_for_attempt(failures - 1);
                    tracing::warn!(
                        error = %err,
                        retry = failures,
                        delay_ms = retry_in.as_millis() as u64,
                        "Auth refresh failed - retrying"
                    );
                    self.emit(RefreshEvent::RefreshFailed {
                        error: err,
                        retry: failures,
                        retry_in,
                    });
                    retry_in
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Auth refresher stopped");
                    self.emit(RefreshEvent::Stopped { error: None });
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn check(&self) -> Result<()> {
        let Some(auth) = self.auth.auth_data() else {
            tracing::info!("No credential available - refreshing");
            return self.refresh().await.map(|_| ());
        };
        if auth.is_hook() {
            tracing::debug!("Webhook credential does not need refreshing");
            return Ok(());
        }

        let seconds_left = auth.seconds_until_expiry();
        let window = self.config.refresh_before_expiry.as_secs() as i64;
        if seconds_left <= window {
            tracing::info!(seconds_left = seconds_left, "Credential expires soon - refreshing");
            self.refresh().await.map(|_| ())
        } else {
            if (seconds_left as f64) <= window as f64 * EXPIRING_SOON_FACTOR {
                self.emit(RefreshEvent::ExpiringSoon { seconds_left });
            }
            Ok(())
        }
    }

    async fn refresh(&self) -> Result<Option<AuthData>> {
        if self
            .is_refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Refresh already in progress");
            return Ok(None);
        }
        let _guard = RefreshGuard(&self.is_refreshing);

        let auth = self.auth.refresh_auth().await?;
        tracing::info!(expires = auth.expires, "Credential refreshed");
        self.emit(RefreshEvent::Refreshed(auth.clone()));
        Ok(Some(auth))
    }

    fn emit(&self, event: RefreshEvent) {
        if let Some(handler) = &self.on_event {
            handler(event);
        }
    }
}
