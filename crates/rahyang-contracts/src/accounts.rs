//! JSON-file-backed user directory for login and role gating.
//!
//! The store is a flat array of account records, seeded with two default
//! accounts on first load. Passwords are opaque strings; this directory is
//! an access gate for the tools, not a security boundary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    pub password: String,
    pub role: Role,
    /// `None` means a non-expiring account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("unknown username or wrong password")]
    InvalidCredentials,
    #[error("account expired on {0}")]
    Expired(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct UserStore {
    path: PathBuf,
    users: Vec<UserAccount>,
}

impl UserStore {
    /// Load the store from `path`, seeding and persisting the default
    /// accounts when the file does not exist yet.
    pub fn load_or_seed(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if !path.exists() {
            let store = Self {
                path,
                users: default_accounts(),
            };
            store.save()?;
            return Ok(store);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading user store {}", path.display()))?;
        let users: Vec<UserAccount> = serde_json::from_str(&raw)
            .with_context(|| format!("user store {} is not a JSON account array", path.display()))?;
        Ok(Self { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn accounts(&self) -> &[UserAccount] {
        &self.users
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.users)?)
            .with_context(|| format!("failed writing user store {}", self.path.display()))?;
        Ok(())
    }

    /// Check credentials against the directory. Expiry is evaluated against
    /// the injected `now` so callers and tests control the clock.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<&UserAccount, AuthError> {
        let account = self
            .users
            .iter()
            .find(|account| account.username == username && account.password == password)
            .ok_or(AuthError::InvalidCredentials)?;
        if let Some(expires_at) = account.expires_at {
            if now >= expires_at {
                return Err(AuthError::Expired(expires_at));
            }
        }
        Ok(account)
    }

    /// Insert or replace the account with the same username.
    pub fn upsert(&mut self, account: UserAccount) {
        match self
            .users
            .iter_mut()
            .find(|existing| existing.username == account.username)
        {
            Some(existing) => *existing = account,
            None => self.users.push(account),
        }
    }

    pub fn remove(&mut self, username: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|account| account.username != username);
        self.users.len() != before
    }

    pub fn set_expiry(&mut self, username: &str, expires_at: Option<DateTime<Utc>>) -> bool {
        match self
            .users
            .iter_mut()
            .find(|account| account.username == username)
        {
            Some(account) => {
                account.expires_at = expires_at;
                true
            }
            None => false,
        }
    }
}

fn default_accounts() -> Vec<UserAccount> {
    vec![
        UserAccount {
            username: "admin".to_string(),
            password: "admin123".to_string(),
            role: Role::Admin,
            expires_at: None,
        },
        UserAccount {
            username: "user".to_string(),
            password: "user123".to_string(),
            role: Role::User,
            expires_at: None,
        },
    ]
}
