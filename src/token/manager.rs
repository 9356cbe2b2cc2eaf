//! Issue and verify tokens of a single purpose.

use std::sync::Arc;

use chrono::TimeDelta;

use super::{
    Claims, Codec, Created, EventSink, NONCE_LENGTH, Purpose, Result,
    TokenError,
};
use crate::clock::Clock;
use crate::crypto::{
    Cipher, HmacSigner, SelectedCipher, Signer, SigningKey, random_bytes,
};

/// Purpose-scoped token issuer and verifier.
///
/// Immutable once built and shared by reference between request handlers.
pub struct TokenManager<C = SelectedCipher, S = HmacSigner> {
    purpose: Purpose,
    codec: Codec<C, S>,
    clock: Arc<dyn Clock>,
    lifetime: TimeDelta,
    grace: TimeDelta,
    events: EventSink,
}

impl TokenManager {
    /// Create a [`TokenManager`] signing with HMAC-SHA256 under `key`.
    pub fn hmac(
        purpose: Purpose,
        key: SigningKey,
        cipher: SelectedCipher,
        clock: Arc<dyn Clock>,
        lifetime: TimeDelta,
    ) -> Self {
        Self::new(
            purpose,
            Codec::new(cipher, HmacSigner::new(key)),
            clock,
            lifetime,
        )
    }
}

impl<C: Cipher, S: Signer> TokenManager<C, S> {
    /// Create a new [`TokenManager`]. Events are discarded until a sink is
    /// set with [`TokenManager::with_events`].
    pub fn new(
        purpose: Purpose,
        codec: Codec<C, S>,
        clock: Arc<dyn Clock>,
        lifetime: TimeDelta,
    ) -> Self {
        Self {
            purpose,
            codec,
            clock,
            lifetime,
            grace: TimeDelta::zero(),
            events: EventSink::disabled(),
        }
    }

    /// Publish a [`Created`] event for every issued token.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Accept tokens up to `grace` after their expiry.
    pub fn with_grace(mut self, grace: TimeDelta) -> Self {
        self.grace = grace.abs();
        self
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn lifetime(&self) -> TimeDelta {
        self.lifetime
    }

    /// Create a new token bound to `subject`.
    ///
    /// `subject` is opaque and never validated here.
    pub fn issue(&self, subject: &str) -> Result<String> {
        let now = self.clock.now();
        let expires_at =
            now.checked_add_signed(self.lifetime).ok_or_else(|| {
                TokenError::Encoding("token lifetime overflows".into())
            })?;

        let claims = Claims {
            subject: subject.to_owned(),
            purpose: self.purpose,
            issued_at: now,
            expires_at,
            nonce: random_bytes::<NONCE_LENGTH>()
                .map_err(TokenError::encoding)?,
        };

        let token = self.codec.encode(&claims).inspect_err(|err| {
            tracing::error!(
                purpose = %self.purpose,
                error = %err,
                "token encoding failed"
            );
        })?;

        metrics::counter!(
            "tokens_issued_total",
            "purpose" => self.purpose.as_str()
        )
        .increment(1);

        self.events.publish(Created {
            purpose: self.purpose,
            subject: claims.subject,
            token: token.clone(),
            issued_at: now,
        });

        Ok(token)
    }

    /// Decode and check a token.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let result = self.check(token);

        let outcome = match &result {
            Ok(_) => "valid",
            Err(err) => {
                tracing::debug!(
                    purpose = %self.purpose,
                    reason = err.reason(),
                    "token rejected"
                );
                err.reason()
            },
        };
        metrics::counter!(
            "token_verifications_total",
            "purpose" => self.purpose.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        result
    }

    fn check(&self, token: &str) -> Result<Claims> {
        let claims = self.codec.decode(token)?;

        let deadline = claims
            .expires_at
            .checked_add_signed(self.grace)
            .unwrap_or(claims.expires_at);
        if self.clock.now() > deadline {
            return Err(TokenError::Expired {
                expired_at: claims.expires_at,
            });
        }

        if claims.purpose != self.purpose {
            return Err(TokenError::PurposeMismatch {
                expected: self.purpose,
                found: claims.purpose,
            });
        }

        Ok(claims)
    }
}

impl<C, S> std::fmt::Debug for TokenManager<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("purpose", &self.purpose)
            .field("lifetime", &self.lifetime)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}
