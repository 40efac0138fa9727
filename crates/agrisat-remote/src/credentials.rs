//! Service-account credentials for the imagery service.
//!
//! The credential document is the JSON key file issued for a service
//! identity. Only `client_email` and `private_key` are required; the key is
//! handed to the token endpoint as-is and never logged.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{RemoteError, Result};

/// Default environment variable holding the credential document.
pub const DEFAULT_CREDENTIALS_ENV: &str = "AGRISAT_SERVICE_JSON";

#[derive(Deserialize)]
struct RawKey {
    client_email: Option<String>,
    private_key: Option<String>,
    project_id: Option<String>,
    token_uri: Option<String>,
}

#[derive(Clone)]
pub struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    project_id: Option<String>,
    token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Parse and validate a credential document.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawKey = serde_json::from_str(text).map_err(|e| {
            RemoteError::Authentication(format!("credential document is not valid JSON: {e}"))
        })?;

        let client_email = required(raw.client_email, "client_email")?;
        let private_key = required(raw.private_key, "private_key")?;

        Ok(Self {
            client_email,
            private_key,
            project_id: raw.project_id.filter(|s| !s.trim().is_empty()),
            token_uri: raw.token_uri.filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RemoteError::Authentication(format!("cannot read {}: {e}", path.display()))
        })?;
        let key = Self::from_json(&text)?;
        info!(identity = %key.client_email, source = %path.display(), "loaded service credentials");
        Ok(key)
    }

    /// Read the document from environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        let text = std::env::var(var).map_err(|_| {
            RemoteError::Authentication(format!("environment variable {var} is not set"))
        })?;
        let key = Self::from_json(&text)?;
        info!(identity = %key.client_email, source = var, "loaded service credentials");
        Ok(key)
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn token_uri(&self) -> Option<&str> {
        self.token_uri.as_deref()
    }

    pub(crate) fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RemoteError::Authentication(format!(
            "credential document is missing {field}"
        ))),
    }
}
