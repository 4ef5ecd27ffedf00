//! Authorization lifecycle for the OAuth cloud-storage backend.
//!
//! The session is the only mutable state shared across backup calls. It never
//! polls the remote service; expiry is discovered when a request is rejected.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{errors::AuthError, utils::persistence::write_atomic};

/// Credential issued by the cloud service for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub authorized_at: DateTime<Utc>,
}

impl AccountToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            account_id: None,
            authorized_at: Utc::now(),
        }
    }
}

impl fmt::Debug for AccountToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountToken")
            .field("access_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("authorized_at", &self.authorized_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationState {
    Unauthenticated,
    Authenticated(AccountToken),
    Expired,
}

impl AuthorizationState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthorizationState::Unauthenticated => "not connected",
            AuthorizationState::Authenticated(_) => "connected",
            AuthorizationState::Expired => "session expired",
        }
    }
}

/// The interactive authorization flow. Redirect mechanics live with the caller.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self) -> Result<AccountToken, AuthError>;
}

/// Authorizer that hands out a token issued ahead of time, e.g. from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthorizer {
    token: Option<String>,
}

impl StaticTokenAuthorizer {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|value| !value.trim().is_empty()),
        }
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn authorize(&self) -> Result<AccountToken, AuthError> {
        self.token
            .as_ref()
            .map(|token| AccountToken::new(token.trim()))
            .ok_or(AuthError::Cancelled)
    }
}

pub struct OAuthSession {
    authorizer: Arc<dyn Authorizer>,
    state: RwLock<AuthorizationState>,
    token_file: Option<PathBuf>,
}

impl fmt::Debug for OAuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSession")
            .field("state", &self.current_state().label())
            .field("token_file", &self.token_file)
            .finish()
    }
}

impl OAuthSession {
    /// In-memory session that starts unauthenticated.
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            state: RwLock::new(AuthorizationState::Unauthenticated),
            token_file: None,
        }
    }

    /// Session persisted at `token_file`; a previously stored token is picked up immediately.
    pub fn with_token_file(
        authorizer: Arc<dyn Authorizer>,
        token_file: PathBuf,
    ) -> io::Result<Self> {
        let state = match load_token(&token_file)? {
            Some(token) => AuthorizationState::Authenticated(token),
            None => AuthorizationState::Unauthenticated,
        };
        Ok(Self {
            authorizer,
            state: RwLock::new(state),
            token_file: Some(token_file),
        })
    }

    /// Runs the interactive flow. On failure the previous state is kept.
    pub async fn authorize(&self) -> Result<(), AuthError> {
        let token = self.authorizer.authorize().await.map_err(|err| {
            tracing::warn!(error = %err, "cloud authorization failed");
            err
        })?;
        if let Some(path) = &self.token_file {
            let json = serde_json::to_vec_pretty(&token)
                .map_err(|err| AuthError::Rejected(err.to_string()))?;
            write_atomic(path, &json).map_err(|err| {
                AuthError::Rejected(format!("could not store token: {err}"))
            })?;
        }
        self.set_state(AuthorizationState::Authenticated(token));
        tracing::info!("cloud service connected");
        Ok(())
    }

    /// Last known state; never touches the network.
    pub fn current_state(&self) -> AuthorizationState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sign_out(&self) {
        self.set_state(AuthorizationState::Unauthenticated);
        self.forget_token_file();
        tracing::info!("cloud service disconnected");
    }

    /// Bearer credential for the next request, or the reason there is none.
    pub(crate) fn access_token(&self) -> Result<String, AuthError> {
        match self.current_state() {
            AuthorizationState::Authenticated(token) => Ok(token.access_token),
            AuthorizationState::Unauthenticated => Err(AuthError::Unauthenticated),
            AuthorizationState::Expired => Err(AuthError::Expired),
        }
    }

    /// Records that the service rejected `access_token`.
    ///
    /// A token obtained by a newer `authorize` call is left alone.
    pub(crate) fn mark_expired(&self, access_token: &str) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let rejected = matches!(
                &*state,
                AuthorizationState::Authenticated(token) if token.access_token == access_token
            );
            if !rejected {
                return;
            }
            *state = AuthorizationState::Expired;
        }
        self.forget_token_file();
        tracing::warn!("cloud session expired; re-authorization required");
    }

    fn set_state(&self, next: AuthorizationState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn forget_token_file(&self) {
        if let Some(path) = &self.token_file {
            if let Err(err) = fs::remove_file(path) {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %err, "could not remove token file");
                }
            }
        }
    }
}

fn load_token(path: &Path) -> io::Result<Option<AccountToken>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path)?;
    match serde_json::from_slice(&data) {
        Ok(token) => Ok(Some(token)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable token file");
            Ok(None)
        }
    }
}
