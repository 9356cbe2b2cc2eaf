//! HTTP routes over the relay.

pub mod login;
pub mod oauth;
pub mod register;
pub mod status;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::error::ServerError;

/// JSON body deserialized then validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Password must mix letters with digits or symbols.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let letters = password.chars().any(char::is_alphabetic);
    let others = password.chars().any(|c| !c.is_alphabetic());

    if letters && others {
        Ok(())
    } else {
        Err(ValidationError::new("weak_password"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::AppState;
    use crate::clock::ManualClock;
    use crate::config::Configuration;

    /// Application state running on a frozen clock.
    pub(crate) fn state(clock: Arc<ManualClock>) -> AppState {
        AppState {
            config: Arc::new(Configuration::new(
                "relay",
                "https://relay.example.com/",
            )),
            relay: Arc::new(crate::relay::tests::relay(clock)),
        }
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("P$soW%920$n&").is_ok());
        assert!(validate_password("correcthorse").is_err());
        assert!(validate_password("1234567890").is_err());
    }
}
