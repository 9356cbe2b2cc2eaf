//! Registration and login workflows on top of the token managers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::account::{
    AccountError, CredentialValidator, NewUser, User, UserRepository,
};
use crate::token::{Claims, Purpose, TokenError, TokenManager};

pub const TOKEN_TYPE: &str = "Bearer";

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("{role} manager issues {found} tokens")]
    Misconfigured { role: Purpose, found: Purpose },
}

/// Access token paired with the refresh token that can renew it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_type: String,
    pub token: String,
    pub refresh_token: String,
    /// Access token lifetime, in seconds.
    pub expires_in: i64,
}

/// Relay between callers and the purpose-scoped token managers.
pub struct Relay {
    registration: TokenManager,
    authentication: TokenManager,
    refresh: TokenManager,
    credentials: Arc<dyn CredentialValidator>,
    users: Arc<dyn UserRepository>,
}

impl Relay {
    /// Create a new [`Relay`].
    ///
    /// Each manager must issue tokens of the purpose matching its role.
    pub fn new(
        registration: TokenManager,
        authentication: TokenManager,
        refresh: TokenManager,
        credentials: Arc<dyn CredentialValidator>,
        users: Arc<dyn UserRepository>,
    ) -> Result<Self> {
        for (role, manager) in [
            (Purpose::Registration, &registration),
            (Purpose::Authentication, &authentication),
            (Purpose::Refresh, &refresh),
        ] {
            if manager.purpose() != role {
                return Err(RelayError::Misconfigured {
                    role,
                    found: manager.purpose(),
                });
            }
        }

        Ok(Self {
            registration,
            authentication,
            refresh,
            credentials,
            users,
        })
    }

    /// Registration token lifetime, in seconds.
    pub fn registration_expires_in(&self) -> i64 {
        self.registration.lifetime().num_seconds()
    }

    /// Issue a registration token proving control of `email` once it comes
    /// back.
    pub fn begin_registration(&self, email: &str) -> Result<String> {
        Ok(self.registration.issue(email)?)
    }

    /// Create the user whose email is attested by `token`.
    pub async fn complete_registration(
        &self,
        token: &str,
        display_name: String,
        password: String,
    ) -> Result<User> {
        let claims = self.registration.verify(token)?;

        Ok(self
            .users
            .create_user(NewUser {
                email: claims.subject,
                display_name,
                password,
            })
            .await?)
    }

    /// Check credentials then open a session.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<TokenPair> {
        let subject = self
            .credentials
            .validate_credentials(identifier, secret)
            .await
            .inspect_err(|err| tracing::debug!(error = %err, "login refused"))?;

        Ok(TokenPair {
            token_type: TOKEN_TYPE.to_owned(),
            token: self.authentication.issue(&subject)?,
            refresh_token: self.refresh.issue(&subject)?,
            expires_in: self.authentication.lifetime().num_seconds(),
        })
    }

    /// Mint a new access token from a refresh token.
    ///
    /// The refresh token is handed back unchanged: a session cannot outlive
    /// it.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.refresh.verify(refresh_token)?;

        Ok(TokenPair {
            token_type: TOKEN_TYPE.to_owned(),
            token: self.authentication.issue(&claims.subject)?,
            refresh_token: refresh_token.to_owned(),
            expires_in: self.authentication.lifetime().num_seconds(),
        })
    }

    /// Check an access token.
    pub fn authenticate(&self, token: &str) -> Result<Claims> {
        Ok(self.authentication.verify(token)?)
    }
}
