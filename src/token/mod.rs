//! Purpose-scoped, signed and optionally encrypted tokens.
//!
//! A token is `v1.<payload>.<tag>` where both parts are base64url without
//! padding. `payload` holds the JSON claims after the configured [`Cipher`]
//! ran over them and `tag` is the HMAC of the version followed by `payload`.
//!
//! [`Cipher`]: crate::crypto::Cipher

mod codec;
mod event;
mod manager;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use codec::Codec;
pub use event::{Created, EventSink, spawn_audit_consumer};
pub use manager::TokenManager;

/// Current token framing version.
pub const TOKEN_VERSION: &str = "v1";
/// Random bytes carried by each token.
pub const NONCE_LENGTH: usize = 16;

pub type Result<T> = std::result::Result<T, TokenError>;

/// Functional category a token is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Proves control of an email address before account creation.
    Registration,
    /// Short-lived access to an authenticated session.
    Authentication,
    /// Longer-lived credential exchanged for a new access token.
    Refresh,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authentication => "authentication",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pieces of information asserted on a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Email at registration, user ID afterwards.
    #[serde(rename = "sub")]
    pub subject: String,
    pub purpose: Purpose,
    #[serde(rename = "iat")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "exp")]
    pub expires_at: DateTime<Utc>,
    #[serde(with = "hex::serde")]
    pub nonce: [u8; NONCE_LENGTH],
}

/// Reasons a token could not be issued or accepted.
///
/// Variants other than [`TokenError::Encoding`] must never be told apart by
/// an external caller.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token encoding failed: {0}")]
    Encoding(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("malformed token")]
    Malformed,
    #[error("token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
    #[error("token issued for {found} while {expected} is expected")]
    PurposeMismatch { expected: Purpose, found: Purpose },
}

impl TokenError {
    pub(crate) fn encoding<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Encoding(Box::new(err))
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Encoding(_) => "encoding",
            Self::InvalidSignature => "invalid_signature",
            Self::Malformed => "malformed",
            Self::Expired { .. } => "expired",
            Self::PurposeMismatch { .. } => "purpose_mismatch",
        }
    }
}
