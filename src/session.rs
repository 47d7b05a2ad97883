//! The signed-in session: credential token and current user.
//!
//! A `Session` is created once per process and shared (behind an `Arc`) by the gateway and
//! the authentication commands. Repositories never touch it directly; they only observe its
//! absence or rejection as `StoreError::Auth` from remote calls.
//!
//! When built with a credentials path the session survives between invocations: `establish`
//! writes the token and user to that file and `clear` removes it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::task::wire;

/// Account details returned by the service at login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "wire::id_string")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_verified: bool,
}

/// What is kept on disk between invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Credentials {
    token: String,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug)]
pub struct Session {
    state: RwLock<Option<Credentials>>,
    store_path: Option<PathBuf>,
}

impl Session {
    /// A session with no credential and no persistence.
    pub fn anonymous() -> Self {
        Session {
            state: RwLock::new(None),
            store_path: None,
        }
    }

    /// A non-persistent session holding `token`.
    #[cfg(test)]
    pub fn with_token(token: impl Into<String>) -> Self {
        Session {
            state: RwLock::new(Some(Credentials {
                token: token.into(),
                user: None,
            })),
            store_path: None,
        }
    }

    /// Restore the session persisted at `path`. A missing or unreadable file yields a
    /// signed-out session that will persist to `path` on the next `establish`.
    pub fn load(path: &Path) -> Self {
        let creds = match read_credentials(path) {
            Ok(creds) => creds,
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "ignoring stored credentials");
                None
            }
        };
        Session {
            state: RwLock::new(creds),
            store_path: Some(path.to_path_buf()),
        }
    }

    /// Start a session with a freshly issued token.
    pub fn establish(&self, token: impl Into<String>, user: Option<User>) -> Result<(), SessionError> {
        let creds = Credentials {
            token: token.into(),
            user,
        };
        if let Some(path) = &self.store_path {
            write_credentials(path, &creds)?;
        }
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Some(creds);
        tracing::debug!("session established");
        Ok(())
    }

    /// Drop the credential, in memory and on disk. Never fails: a file that cannot be
    /// removed is reported and left behind.
    pub fn clear(&self) {
        let had = self
            .state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if let Some(path) = &self.store_path {
            if path.exists() {
                if let Err(error) = fs::remove_file(path) {
                    tracing::warn!(%error, path = %path.display(), "failed to remove credentials");
                }
            }
        }
        if had {
            tracing::info!("session cleared");
        }
    }

    /// Replace the stored account details, keeping the token. Does nothing when signed out.
    pub fn remember_user(&self, user: User) -> Result<(), SessionError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(creds) = state.as_mut() else {
            return Ok(());
        };
        let updated = Credentials {
            token: creds.token.clone(),
            user: Some(user),
        };
        if let Some(path) = &self.store_path {
            write_credentials(path, &updated)?;
        }
        *creds = updated;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(|c| c.user.clone())
    }

    /// Value for the `Authorization` header, if signed in. Tokens stored with a
    /// `Bearer ` prefix are used as they are.
    pub fn bearer(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let token = state.as_ref()?.token.trim();
        if token.is_empty() {
            return None;
        }
        Some(if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {token}")
        })
    }
}

fn read_credentials(path: &Path) -> Result<Option<Credentials>, SessionError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| SessionError::Store(format!("read {}: {e}", path.display())))?;
    let creds: Credentials = serde_json::from_str(&raw)?;
    Ok((!creds.token.trim().is_empty()).then_some(creds))
}

fn write_credentials(path: &Path, creds: &Credentials) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SessionError::Store(format!("mkdir {}: {e}", parent.display())))?;
    }
    let data = serde_json::to_string_pretty(creds)?;
    // Atomic-ish write via temp + rename.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)
        .map_err(|e| SessionError::Store(format!("write {}: {e}", tmp.display())))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)) {
            tracing::warn!("failed to chmod 0600 {}: {e}", tmp.display());
        }
    }
    fs::rename(&tmp, path)
        .map_err(|e| SessionError::Store(format!("rename to {}: {e}", path.display())))?;
    Ok(())
}
