//! Google access token lookup.
//!
//! The token is obtained elsewhere; caltrack only stores and reads it.
//! `CALTRACK_GOOGLE_TOKEN` wins over the keyring entry.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::keyring_store;
use crate::error::AuthError;

pub const SERVICE_NAME: &str = "google";
pub const TOKEN_ENV: &str = "CALTRACK_GOOGLE_TOKEN";

/// Seconds before expiry at which a token is already treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    /// Unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Environment,
    Keyring,
}

impl StoredToken {
    pub fn new(access_token: impl Into<String>, expires_in: Option<i64>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: expires_in.map(|secs| Utc::now().timestamp() + secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now().timestamp() > exp - EXPIRY_SKEW_SECS,
            None => false,
        }
    }

    /// Environment first, then the keyring. `Ok(None)` when neither has one.
    pub fn lookup() -> Result<Option<(Self, TokenOrigin)>, AuthError> {
        if let Some(token) = std::env::var(TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
        {
            return Ok(Some((Self::new(token, None), TokenOrigin::Environment)));
        }

        let Some(json) = keyring_store::get(SERVICE_NAME)? else {
            return Ok(None);
        };
        let token: StoredToken =
            serde_json::from_str(&json).map_err(|e| AuthError::Corrupt(e.to_string()))?;
        Ok(Some((token, TokenOrigin::Keyring)))
    }

    /// A token usable right now.
    ///
    /// # Errors
    /// `NotAuthenticated` when none is stored, `TokenExpired` when it is past
    /// its expiry.
    pub fn resolve() -> Result<Self, AuthError> {
        let (token, _) = Self::lookup()?.ok_or_else(|| AuthError::NotAuthenticated {
            service: SERVICE_NAME.to_string(),
        })?;
        if token.is_expired() {
            return Err(AuthError::TokenExpired {
                service: SERVICE_NAME.to_string(),
            });
        }
        Ok(token)
    }

    pub fn save(&self) -> Result<(), AuthError> {
        let json = serde_json::to_string(self).map_err(|e| AuthError::Corrupt(e.to_string()))?;
        keyring_store::set(SERVICE_NAME, &json)
    }

    pub fn delete() -> Result<(), AuthError> {
        keyring_store::delete(SERVICE_NAME)
    }
}
