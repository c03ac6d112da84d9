//! Credential lifecycle manager
//!
//! Owns the OAuth client state and keeps its access token valid for the life
//! of the process. A single timer drives proactive refreshes; callers that
//! arrive before the first token join the in-flight refresh instead of
//! starting their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::auth::credentials::{CredentialSet, CredentialStore};
use crate::auth::exchange::{GoogleTokenEndpoint, TokenExchange};
use crate::config::{google, ApiEndpoints, Config, OAuthClientConfig};
use crate::error::{AuthError, ConfigError, Result};
use crate::workspace::client::WorkspaceClient;

/// Refresh this long before the access token expires
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Delay before retrying a failed refresh
pub const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Delay until the next proactive refresh for a token expiring at `expiry`.
///
/// Zero when `now` is already inside the safety margin.
pub fn refresh_delay(expiry: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expiry - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .saturating_sub(REFRESH_MARGIN)
}

/// The one outstanding scheduled refresh
///
/// `generation` identifies the timer: a timer task that woke after being
/// replaced finds a different generation in the state and stands down.
struct PendingTimer {
    handle: JoinHandle<()>,
    fires_at: Instant,
    generation: u64,
}

impl PendingTimer {
    fn cancel(self) {
        self.handle.abort();
    }
}

/// Refresh control state. At most one refresh is in flight, and a timer only
/// exists while idle.
enum RefreshState {
    Idle { pending: Option<PendingTimer> },
    Refreshing,
    Destroyed,
}

/// Last completed refresh attempt, published to waiting callers
#[derive(Debug, Clone, Default)]
struct AttemptRecord {
    seq: u64,
    outcome: Option<std::result::Result<(), AuthError>>,
}

type RefreshOutcome = std::result::Result<Option<DateTime<Utc>>, AuthError>;

struct Inner {
    store: Arc<CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    state: Mutex<RefreshState>,
    attempts: watch::Sender<AttemptRecord>,
    timer_generation: AtomicU64,
}

/// How long a foreground caller waits for a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// Return the outcome of the next attempt, whatever it is
    FirstAttempt,
    /// Ride out transient failures until a token lands
    UntilToken,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a refresh unless one is already running.
    fn trigger(self: &Arc<Self>) -> std::result::Result<(), AuthError> {
        self.start_refresh(None)
    }

    /// Entry point for timer `generation` once its deadline passes.
    fn fire_timer(self: &Arc<Self>, generation: u64) {
        if let Err(e) = self.start_refresh(Some(generation)) {
            tracing::debug!(error = %e, "Scheduled refresh skipped");
        }
    }

    fn start_refresh(self: &Arc<Self>, timer: Option<u64>) -> std::result::Result<(), AuthError> {
        {
            let mut state = self.lock_state();
            match &mut *state {
                RefreshState::Destroyed => return Err(AuthError::Destroyed),
                RefreshState::Refreshing => {
                    tracing::debug!("Refresh already in flight, joining it");
                    return Ok(());
                }
                RefreshState::Idle { pending } => {
                    let current = pending.as_ref().map(|t| t.generation);
                    match timer {
                        Some(generation) if current != Some(generation) => {
                            tracing::debug!(generation, "Replaced refresh timer fired, ignoring");
                            return Ok(());
                        }
                        // The firing timer is the pending one; nothing to cancel.
                        Some(_) => {
                            pending.take();
                        }
                        None => {
                            if let Some(pending) = pending.take() {
                                pending.cancel();
                            }
                        }
                    }
                }
            }
            *state = RefreshState::Refreshing;
        }

        // The refresh runs detached so a caller that gives up waiting can
        // never leave the state stuck in `Refreshing`.
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.run_refresh().await });
        Ok(())
    }

    async fn run_refresh(self: Arc<Self>) {
        let mut guard = InFlight {
            inner: &self,
            finished: false,
        };
        let outcome = self.refresh_once().await;
        guard.finished = true;
        self.complete(outcome);
    }

    async fn refresh_once(&self) -> RefreshOutcome {
        let refresh_token = self
            .store
            .get()
            .refresh_token
            .ok_or(AuthError::MissingRefreshToken)?;

        tracing::debug!("Refreshing access token...");
        let grant = self.exchange.refresh(&refresh_token).await?;
        let snapshot = self.store.update(grant);
        Ok(snapshot.expiry)
    }

    /// Leave `Refreshing`, arm the next timer and wake waiting callers.
    fn complete(self: &Arc<Self>, outcome: RefreshOutcome) {
        let next = match &outcome {
            Ok(Some(expiry)) => {
                let delay = refresh_delay(*expiry, Utc::now());
                tracing::info!(
                    expires_at = %expiry.to_rfc3339(),
                    next_refresh_secs = delay.as_secs(),
                    "Access token refreshed"
                );
                Some(delay)
            }
            Ok(None) => {
                tracing::warn!("Token response carried no expiry, proactive refresh disabled");
                None
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    retry_in_secs = RETRY_BACKOFF.as_secs(),
                    "Token refresh failed"
                );
                Some(RETRY_BACKOFF)
            }
        };

        {
            let mut state = self.lock_state();
            if matches!(*state, RefreshState::Destroyed) {
                tracing::debug!("Manager destroyed during refresh, not rescheduling");
            } else {
                let pending = next.and_then(|delay| self.arm_timer(delay));
                *state = RefreshState::Idle { pending };
            }
        }

        self.attempts.send_modify(|record| {
            record.seq += 1;
            record.outcome = Some(outcome.map(|_| ()));
        });
    }

    fn arm_timer(self: &Arc<Self>, delay: Duration) -> Option<PendingTimer> {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No runtime available, refresh timer not armed");
            return None;
        };

        let fires_at = Instant::now() + delay;
        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let inner: Weak<Inner> = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            tokio::time::sleep_until(fires_at).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire_timer(generation);
            }
        });

        Some(PendingTimer {
            handle,
            fires_at,
            generation,
        })
    }
}

/// Returns the state to idle if a refresh task unwinds before completing
struct InFlight<'a> {
    inner: &'a Arc<Inner>,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.complete(Err(AuthError::Interrupted));
        }
    }
}

/// Keeps one OAuth client's access token valid for the life of the process
///
/// Must be created inside a Tokio runtime: construction with a refresh token
/// immediately spawns the first refresh.
pub struct AuthManager {
    inner: Arc<Inner>,
    client: Arc<WorkspaceClient>,
}

impl AuthManager {
    /// Create a manager for the given client identity
    pub fn new(
        oauth: &OAuthClientConfig,
        refresh_token: Option<String>,
        exchange: Arc<dyn TokenExchange>,
        api: ApiEndpoints,
    ) -> std::result::Result<Self, ConfigError> {
        oauth.validate()?;

        let initial = CredentialSet {
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            ..Default::default()
        };
        let has_refresh_token = initial.refresh_token.is_some();

        let store = Arc::new(CredentialStore::new(initial));
        let (attempts, _) = watch::channel(AttemptRecord::default());
        let inner = Arc::new(Inner {
            store: Arc::clone(&store),
            exchange,
            state: Mutex::new(RefreshState::Idle { pending: None }),
            attempts,
            timer_generation: AtomicU64::new(0),
        });

        if has_refresh_token {
            // Only fails once destroyed, which cannot have happened yet.
            let _ = inner.trigger();
        }

        Ok(Self {
            inner,
            client: Arc::new(WorkspaceClient::new(store, api)),
        })
    }

    /// Create a manager that talks to Google's token endpoints
    pub fn from_config(config: &Config) -> Result<Self> {
        let exchange = GoogleTokenEndpoint::new(config.oauth.clone())?;
        let manager = Self::new(
            &config.oauth,
            config.refresh_token.clone(),
            Arc::new(exchange),
            config.api.clone(),
        )?;
        Ok(manager)
    }

    /// Get the shared client handle, waiting for a first token if needed
    ///
    /// Returns at once when an unexpired access token is held, even one close
    /// to expiry. Otherwise joins (or starts) a refresh and waits through
    /// transient failures; a permanent failure is returned to the caller.
    pub async fn client(&self) -> std::result::Result<Arc<WorkspaceClient>, AuthError> {
        self.client_with(Wait::UntilToken).await
    }

    /// Like [`client`](Self::client), but gives up after a single attempt
    async fn client_once(&self) -> std::result::Result<Arc<WorkspaceClient>, AuthError> {
        self.client_with(Wait::FirstAttempt).await
    }

    async fn client_with(&self, wait: Wait) -> std::result::Result<Arc<WorkspaceClient>, AuthError> {
        if !self.holds_usable_token() {
            self.wait_for_token(wait).await?;
        }
        Ok(Arc::clone(&self.client))
    }

    /// An access token is held and has not expired
    fn holds_usable_token(&self) -> bool {
        let creds = self.inner.store.get();
        creds.access_token.is_some() && !creds.is_expired_at(Utc::now())
    }

    async fn wait_for_token(&self, wait: Wait) -> std::result::Result<(), AuthError> {
        let mut attempts = self.inner.attempts.subscribe();
        attempts.borrow_and_update();

        // A refresh may have landed between the caller's check and subscribe.
        if self.holds_usable_token() {
            return Ok(());
        }

        self.inner.trigger()?;

        loop {
            attempts
                .changed()
                .await
                .map_err(|_| AuthError::Destroyed)?;

            let record = attempts.borrow_and_update().clone();
            match record.outcome {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) if wait == Wait::UntilToken && e.is_transient() => {
                    tracing::debug!(attempt = record.seq, error = %e, "Waiting for refresh retry");
                }
                Some(Err(e)) => return Err(e),
                None => {}
            }
        }
    }

    /// Check once that the refresh token actually yields a usable token
    ///
    /// Waits for at most one refresh attempt, so an unreachable token
    /// endpoint reports `false` instead of hanging. Never fails; `false` means
    /// startup should abort.
    pub async fn validate_auth(&self) -> bool {
        match self.introspect_current().await {
            Ok(()) => {
                tracing::info!("Authentication validated");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Auth validation failed");
                false
            }
        }
    }

    async fn introspect_current(&self) -> std::result::Result<(), AuthError> {
        let client = self.client_once().await?;
        let access_token = client.access_token().ok_or_else(|| AuthError::Introspection {
            message: "no access token available".to_string(),
        })?;

        let info = self.inner.exchange.introspect(&access_token).await?;

        let missing: Vec<&str> = google::SCOPES
            .iter()
            .copied()
            .filter(|scope| !info.scopes().any(|granted| granted == *scope))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Token lacks expected scopes");
        }

        Ok(())
    }

    /// Cancel the pending timer and detach all listeners. Idempotent.
    ///
    /// A refresh already in flight may still finish and update the store, but
    /// it will not arm another timer.
    pub fn destroy(&self) {
        let previous = {
            let mut state = self.inner.lock_state();
            std::mem::replace(&mut *state, RefreshState::Destroyed)
        };

        match previous {
            RefreshState::Destroyed => return,
            RefreshState::Idle {
                pending: Some(timer),
            } => timer.cancel(),
            RefreshState::Idle { pending: None } | RefreshState::Refreshing => {}
        }

        self.inner.store.close();
        self.inner.attempts.send_modify(|record| {
            record.seq += 1;
            record.outcome = Some(Err(AuthError::Destroyed));
        });
        tracing::info!("Auth manager destroyed");
    }

    /// Subscribe to credential changes
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialSet> {
        self.inner.store.subscribe()
    }

    /// Current credential snapshot
    pub fn credentials(&self) -> CredentialSet {
        self.inner.store.get()
    }

    /// Whether a refresh call is outstanding
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock_state(), RefreshState::Refreshing)
    }

    /// When the pending refresh or retry timer fires, if one is armed
    pub fn next_refresh_at(&self) -> Option<Instant> {
        match &*self.inner.lock_state() {
            RefreshState::Idle {
                pending: Some(timer),
            } => Some(timer.fires_at),
            _ => None,
        }
    }
}

impl Drop for AuthManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::TokenGrant;
    use crate::auth::exchange::TokenInfo;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Token exchange that replays scripted refresh results
    #[derive(Default)]
    struct ScriptedExchange {
        script: Mutex<VecDeque<std::result::Result<TokenGrant, AuthError>>>,
        refresh_calls: AtomicUsize,
        introspect_calls: AtomicUsize,
        gate: Option<Semaphore>,
    }

    impl ScriptedExchange {
        fn new(script: Vec<std::result::Result<TokenGrant, AuthError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn gated(script: Vec<std::result::Result<TokenGrant, AuthError>>) -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::new(script)
            }
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1);
            }
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for ScriptedExchange {
        async fn refresh(&self, _refresh_token: &str) -> std::result::Result<TokenGrant, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(valid_for(60)))
        }

        async fn introspect(&self, access_token: &str) -> std::result::Result<TokenInfo, AuthError> {
            self.introspect_calls.fetch_add(1, Ordering::SeqCst);
            if access_token.is_empty() {
                return Err(AuthError::Introspection {
                    message: "empty token".to_string(),
                });
            }
            Ok(TokenInfo {
                scope: google::SCOPES.join(" "),
                expires_in: Some(3600),
                ..Default::default()
            })
        }
    }

    fn valid_for(minutes: i64) -> TokenGrant {
        TokenGrant {
            access_token: format!("at-{minutes}"),
            expiry: Some(Utc::now() + chrono::Duration::minutes(minutes)),
            refresh_token: None,
        }
    }

    fn network_error() -> AuthError {
        AuthError::Network {
            message: "connection reset".to_string(),
        }
    }

    fn manager(exchange: &Arc<ScriptedExchange>, refresh_token: Option<&str>) -> AuthManager {
        let oauth = OAuthClientConfig::new("client-id", "client-secret", "http://localhost");
        AuthManager::new(
            &oauth,
            refresh_token.map(str::to_string),
            exchange.clone(),
            ApiEndpoints::default(),
        )
        .unwrap()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_refresh_delay() {
        let now = Utc::now();
        assert_eq!(
            refresh_delay(now + chrono::Duration::minutes(60), now),
            Duration::from_secs(55 * 60)
        );
        assert_eq!(
            refresh_delay(now + chrono::Duration::minutes(3), now),
            Duration::ZERO
        );
        assert_eq!(
            refresh_delay(now - chrono::Duration::minutes(1), now),
            Duration::ZERO
        );
    }

    #[test]
    fn test_missing_client_identity_is_rejected() {
        let oauth = OAuthClientConfig::new("", "client-secret", "http://localhost");
        let exchange = Arc::new(ScriptedExchange::default());
        let result = AuthManager::new(&oauth, None, exchange, ApiEndpoints::default());
        assert!(matches!(
            result,
            Err(ConfigError::MissingClientField { ref field }) if field == "client_id"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_construction_schedules_first_refresh() {
        let exchange = Arc::new(ScriptedExchange::new(vec![]));
        let manager = manager(&exchange, Some("rt"));

        settle().await;

        assert_eq!(exchange.refresh_calls(), 1);
        let creds = manager.credentials();
        assert_eq!(creds.access_token.as_deref(), Some("at-60"));
        assert_eq!(creds.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_refresh_token_means_no_initial_refresh() {
        let exchange = Arc::new(ScriptedExchange::new(vec![]));
        let manager = manager(&exchange, None);

        settle().await;

        assert_eq!(exchange.refresh_calls(), 0);
        assert!(manager.next_refresh_at().is_none());
        assert_eq!(manager.client().await.unwrap_err(), AuthError::MissingRefreshToken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_refresh_five_minutes_before_expiry() {
        let start = Instant::now();
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(valid_for(60))]));
        let manager = manager(&exchange, Some("rt"));

        tokio_test::assert_ok!(manager.client().await);

        let fires_at = manager.next_refresh_at().unwrap();
        let offset = fires_at - start;
        assert!(offset <= Duration::from_secs(55 * 60));
        assert!(offset >= Duration::from_secs(55 * 60 - 1));

        tokio::time::advance(Duration::from_secs(54 * 60)).await;
        settle().await;
        assert_eq!(exchange.refresh_calls(), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        settle().await;
        assert_eq!(exchange.refresh_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_retries_after_backoff() {
        let start = Instant::now();
        let exchange = Arc::new(ScriptedExchange::new(vec![Err(network_error())]));
        let manager = manager(&exchange, Some("rt"));

        settle().await;

        assert_eq!(exchange.refresh_calls(), 1);
        assert!(!manager.is_refreshing());
        assert_eq!(manager.next_refresh_at(), Some(start + RETRY_BACKOFF));
        assert!(manager.credentials().access_token.is_none());

        tokio::time::advance(RETRY_BACKOFF).await;
        settle().await;

        assert_eq!(exchange.refresh_calls(), 2);
        assert_eq!(manager.credentials().access_token.as_deref(), Some("at-60"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let exchange = Arc::new(ScriptedExchange::gated(vec![Ok(valid_for(60))]));
        let manager = manager(&exchange, Some("rt"));

        let (a, b, _) = tokio::join!(manager.client(), manager.client(), async {
            settle().await;
            assert!(manager.is_refreshing());
            exchange.release();
        });

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(exchange.refresh_calls(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.access_token().as_deref(), Some("at-60"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_token_returned_without_waiting() {
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(valid_for(4))]));
        let manager = manager(&exchange, Some("rt"));
        settle().await;

        // Inside the safety margin, so the scheduler owns the renewal; the
        // accessor still hands out the current token straight away.
        let first = manager.client().await.unwrap();
        let second = manager.client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(exchange.refresh_calls() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_waits_through_transient_failures() {
        let exchange = Arc::new(ScriptedExchange::new(vec![
            Err(network_error()),
            Err(AuthError::Endpoint {
                status: 503,
                message: "unavailable".to_string(),
            }),
            Ok(valid_for(60)),
        ]));
        let manager = manager(&exchange, Some("rt"));

        let client = manager.client().await.unwrap();

        assert_eq!(exchange.refresh_calls(), 3);
        assert_eq!(client.access_token().as_deref(), Some("at-60"));
        assert!(!manager.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_surfaces_permanent_failure() {
        let exchange = Arc::new(ScriptedExchange::new(vec![Err(AuthError::InvalidGrant {
            message: "revoked".to_string(),
        })]));
        let manager = manager(&exchange, Some("rt"));

        let err = manager.client().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
        assert!(manager.next_refresh_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_auth_success() {
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(valid_for(60))]));
        let manager = manager(&exchange, Some("rt"));

        assert!(manager.validate_auth().await);
        assert_eq!(exchange.refresh_calls(), 1);
        assert_eq!(exchange.introspect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_auth_failure_returns_false() {
        let exchange = Arc::new(ScriptedExchange::new(vec![Err(AuthError::InvalidGrant {
            message: "revoked".to_string(),
        })]));
        let manager = manager(&exchange, Some("rt"));

        assert!(!manager.validate_auth().await);
        assert_eq!(exchange.introspect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_cancels_pending_timer() {
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(valid_for(60))]));
        let manager = manager(&exchange, Some("rt"));
        settle().await;
        assert!(manager.next_refresh_at().is_some());

        manager.destroy();
        manager.destroy();

        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        settle().await;
        assert_eq!(exchange.refresh_calls(), 1);
        assert!(manager.next_refresh_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_refresh_after_destroy_does_not_rearm() {
        let exchange = Arc::new(ScriptedExchange::gated(vec![Ok(valid_for(60))]));
        let manager = manager(&exchange, Some("rt"));
        settle().await;
        assert!(manager.is_refreshing());

        manager.destroy();
        exchange.release();
        settle().await;

        // The completed refresh may land in the store, but nothing is armed.
        assert_eq!(manager.credentials().access_token.as_deref(), Some("at-60"));
        assert!(manager.next_refresh_at().is_none());

        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        settle().await;
        assert_eq!(exchange.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_wakes_waiting_callers() {
        let exchange = Arc::new(ScriptedExchange::gated(vec![]));
        let manager = manager(&exchange, Some("rt"));

        let (result, _) = tokio::join!(manager.client(), async {
            settle().await;
            manager.destroy();
        });

        assert_eq!(result.unwrap_err(), AuthError::Destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_before_any_timer() {
        let exchange = Arc::new(ScriptedExchange::default());
        let manager = manager(&exchange, None);
        manager.destroy();
        manager.destroy();
        assert!(!manager.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_detaches_listeners() {
        let exchange = Arc::new(ScriptedExchange::gated(vec![]));
        let manager = manager(&exchange, Some("rt"));
        let mut rx = manager.subscribe();

        manager.destroy();
        exchange.release();
        settle().await;

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_sees_refreshed_tokens() {
        let exchange = Arc::new(ScriptedExchange::gated(vec![Ok(valid_for(60))]));
        let manager = manager(&exchange, Some("rt"));
        let mut rx = manager.subscribe();

        exchange.release();
        let creds = rx.recv().await.unwrap();

        assert_eq!(creds.access_token.as_deref(), Some("at-60"));
        assert_eq!(creds.refresh_token.as_deref(), Some("rt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(valid_for(60))]));
        {
            let _manager = manager(&exchange, Some("rt"));
            settle().await;
        }

        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        settle().await;
        assert_eq!(exchange.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_auth_gives_up_after_one_attempt() {
        let script = (0..200).map(|_| Err(network_error())).collect();
        let exchange = Arc::new(ScriptedExchange::new(script));
        let manager = manager(&exchange, Some("rt"));

        let result = tokio::time::timeout(Duration::from_secs(60 * 60), manager.validate_auth()).await;

        assert_eq!(result, Ok(false));
        assert_eq!(exchange.refresh_calls(), 1);
        assert_eq!(exchange.introspect_calls.load(Ordering::SeqCst), 0);
        // The scheduler keeps retrying in the background.
        assert!(manager.next_refresh_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_is_not_handed_out() {
        let exchange = Arc::new(ScriptedExchange::gated(vec![
            Ok(valid_for(-1)),
            Ok(valid_for(60)),
        ]));
        let manager = manager(&exchange, Some("rt"));

        exchange.release();
        settle().await;
        assert_eq!(manager.credentials().access_token.as_deref(), Some("at--1"));

        let released = AtomicBool::new(false);
        let (waited, _) = tokio::join!(
            async {
                let client = manager.client().await.unwrap();
                (client.access_token(), released.load(Ordering::SeqCst))
            },
            async {
                settle().await;
                released.store(true, Ordering::SeqCst);
                exchange.release();
            }
        );

        assert_eq!(waited, (Some("at-60".to_string()), true));
        assert_eq!(exchange.refresh_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_timer_stands_down() {
        let exchange = Arc::new(ScriptedExchange::new(vec![Ok(valid_for(60))]));
        let manager = manager(&exchange, Some("rt"));
        tokio_test::assert_ok!(manager.client().await);

        let armed_at = manager.next_refresh_at();
        let current = match &*manager.inner.lock_state() {
            RefreshState::Idle {
                pending: Some(timer),
            } => timer.generation,
            _ => panic!("expected an armed timer"),
        };

        // A timer that woke after being replaced must not preempt the new one.
        manager.inner.fire_timer(current - 1);
        settle().await;
        assert_eq!(exchange.refresh_calls(), 1);
        assert_eq!(manager.next_refresh_at(), armed_at);

        manager.inner.fire_timer(current);
        settle().await;
        assert_eq!(exchange.refresh_calls(), 2);
    }
}
