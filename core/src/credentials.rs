//! Credential storage for the store client.
//!
//! The sandbox core never talks to an identity provider itself. It consumes
//! tokens through an injected [`CredentialProvider`]; there is no process-wide
//! token state. Refreshes are merged into the stored record so an access-token
//! rotation never drops the refresh token.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Access/refresh credential pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl TokenSet {
    /// Creates a token set holding only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: None,
        }
    }

    /// Sets the refresh token.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Sets the expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns true if the access token has an expiry at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Folds a refreshed set into this one.
    ///
    /// The access token is always replaced; other fields are replaced only
    /// when the refresh carries them.
    pub fn merge(&mut self, refreshed: TokenSet) {
        self.access_token = refreshed.access_token;
        if refreshed.refresh_token.is_some() {
            self.refresh_token = refreshed.refresh_token;
        }
        if refreshed.expires_at.is_some() {
            self.expires_at = refreshed.expires_at;
        }
        if refreshed.scope.is_some() {
            self.scope = refreshed.scope;
        }
        if refreshed.token_type.is_some() {
            self.token_type = refreshed.token_type;
        }
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Durable keyed store for the token set.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the stored tokens, if any.
    async fn load_tokens(&self) -> Result<Option<TokenSet>>;

    /// Replaces the stored tokens.
    async fn persist_tokens(&self, tokens: &TokenSet) -> Result<()>;

    /// Refresh callback: merges `refreshed` into the stored record and
    /// persists the result.
    async fn on_token_refresh(&self, refreshed: TokenSet) -> Result<TokenSet> {
        let merged = match self.load_tokens().await? {
            Some(mut current) => {
                current.merge(refreshed);
                current
            }
            None => refreshed,
        };
        self.persist_tokens(&merged).await?;
        tracing::debug!(
            has_refresh_token = merged.refresh_token.is_some(),
            "persisted refreshed credentials"
        );
        Ok(merged)
    }
}

/// Trades an authorization code for tokens.
#[async_trait]
pub trait AuthCodeExchanger: Send + Sync {
    async fn exchange_auth_code(&self, code: &str) -> Result<TokenSet>;
}

/// Exchanges `code` and stores the resulting tokens.
pub async fn authorize(
    exchanger: &dyn AuthCodeExchanger,
    provider: &dyn CredentialProvider,
    code: &str,
) -> Result<TokenSet> {
    if code.trim().is_empty() {
        return Err(Error::Credentials("authorization code is empty".to_string()));
    }
    let tokens = exchanger.exchange_auth_code(code).await?;
    provider.on_token_refresh(tokens).await
}

/// Token set stored as a JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialStore {
    async fn load_tokens(&self) -> Result<Option<TokenSet>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let tokens = serde_json::from_str(&json).map_err(|e| {
            Error::Credentials(format!("cannot parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(tokens))
    }

    async fn persist_tokens(&self, tokens: &TokenSet) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(tokens)?;
        tokio::fs::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        Ok(())
    }
}

/// Token set held in memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: Mutex<Option<TokenSet>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl CredentialProvider for MemoryCredentialStore {
    async fn load_tokens(&self) -> Result<Option<TokenSet>> {
        Ok(self.tokens.lock().await.clone())
    }

    async fn persist_tokens(&self, tokens: &TokenSet) -> Result<()> {
        *self.tokens.lock().await = Some(tokens.clone());
        Ok(())
    }
}
