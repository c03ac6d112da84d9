//! Credential snapshot and store
//!
//! The store is the single source of truth for the current token set. Only the
//! refresh cycle writes to it; everything else reads snapshots.

use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Buffered change notifications per listener before it starts lagging
const LISTENER_CAPACITY: usize = 16;

/// Current token snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    /// Bearer token for API calls, absent until the first refresh succeeds
    pub access_token: Option<String>,

    /// Long-lived secret used to mint new access tokens
    pub refresh_token: Option<String>,

    /// Absolute time the access token becomes invalid
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// Snapshot holding only a refresh token
    pub fn with_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: Some(refresh_token.into()),
            ..Default::default()
        }
    }

    /// Whether the access token is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry, Some(expiry) if expiry <= now)
    }
}

/// Token data returned by a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
    /// Some providers rotate the refresh token, most return none
    pub refresh_token: Option<String>,
}

/// Merge a refresh result into the current snapshot.
///
/// The access token and expiry are replaced. A refresh token is only replaced
/// when the grant carries one, so a known refresh token is never lost.
pub fn merge(current: &CredentialSet, grant: TokenGrant) -> CredentialSet {
    CredentialSet {
        access_token: Some(grant.access_token),
        expiry: grant.expiry,
        refresh_token: grant.refresh_token.or_else(|| current.refresh_token.clone()),
    }
}

/// Holds the current [`CredentialSet`] and notifies listeners on change
pub struct CredentialStore {
    current: RwLock<CredentialSet>,
    listeners: Mutex<Option<broadcast::Sender<CredentialSet>>>,
}

impl CredentialStore {
    /// Create a store seeded with an initial snapshot
    pub fn new(initial: CredentialSet) -> Self {
        let (tx, _) = broadcast::channel(LISTENER_CAPACITY);
        Self {
            current: RwLock::new(initial),
            listeners: Mutex::new(Some(tx)),
        }
    }

    /// Last known snapshot. Never triggers a refresh.
    pub fn get(&self) -> CredentialSet {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    /// Merge a grant into the store and notify listeners
    pub fn update(&self, grant: TokenGrant) -> CredentialSet {
        let merged = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = merge(&current, grant);
            current.clone()
        };

        if let Some(tx) = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            // No receivers is fine; notifications are advisory.
            let _ = tx.send(merged.clone());
        }

        merged
    }

    /// Register a listener for credential changes
    ///
    /// After [`close`](Self::close) the returned receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialSet> {
        match self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Detach every listener. Idempotent.
    pub fn close(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
