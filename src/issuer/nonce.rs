use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::elapsed_beyond;

/// A `c_nonce` handed to the wallet, bound to the session it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CNonceState {
    pub c_nonce: String,
    /// Pre-authorized code or issuer state of the session.
    pub session_key: String,
    pub created_at: DateTime<Utc>,
}

impl CNonceState {
    pub fn new(c_nonce: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            c_nonce: c_nonce.into(),
            session_key: session_key.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, expires_in: u64, now: DateTime<Utc>) -> bool {
        elapsed_beyond(self.created_at, expires_in, now)
    }
}

/// A fresh nonce together with its lifetime, as returned to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedNonce {
    pub c_nonce: String,
    pub c_nonce_expires_in: u64,
}
