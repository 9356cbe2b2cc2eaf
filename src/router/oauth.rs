//! Get a new access token with a refresh token.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::Result;
use crate::relay::{Relay, TokenPair};
use crate::router::Valid;

const REFRESH_TOKEN_GRANT: &str = "refresh_token";

fn validate_grant_type(
    grant_type: &str,
) -> std::result::Result<(), ValidationError> {
    // OAuth 2.0 refresh requests name their grant.
    if grant_type != REFRESH_TOKEN_GRANT {
        return Err(ValidationError::new("invalid_grant_type"));
    }

    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(min = 1, message = "Refresh token is required."))]
    pub refresh_token: String,
    #[validate(custom(
        function = "validate_grant_type",
        message = "\"grant_type\" must be \"refresh_token\"."
    ))]
    pub grant_type: String,
}

pub async fn handler(
    State(relay): State<Arc<Relay>>,
    Valid(body): Valid<Body>,
) -> Result<Json<TokenPair>> {
    Ok(Json(relay.refresh(&body.refresh_token)?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::TimeDelta;
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::relay::tests::{PASSWORD, t0};
    use crate::router::register::tests::register;
    use crate::*;

    async fn login(app: axum::Router) -> TokenPair {
        register(app.clone(), "alice@example.com").await;
        let response = make_request(
            None,
            app,
            Method::POST,
            "/login",
            json!({ "email": "alice@example.com", "password": PASSWORD })
                .to_string(),
        )
        .await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_handler() {
        let clock = Arc::new(ManualClock::new(t0()));
        let state = router::tests::state(clock.clone());
        let app = app(state.clone());
        let pair = login(app.clone()).await;

        clock.advance(TimeDelta::minutes(10));

        let response = make_request(
            None,
            app,
            Method::POST,
            "/oauth/token",
            json!({
                "grant_type": "refresh_token",
                "refresh_token": pair.refresh_token,
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: TokenPair = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.refresh_token, pair.refresh_token);
        assert!(state.relay.authenticate(&body.token).is_ok());
        assert!(state.relay.authenticate(&pair.token).is_err());
    }

    #[tokio::test]
    async fn test_invalid_grant_type() {
        let state = router::tests::state(Arc::new(ManualClock::new(t0())));
        let app = app(state);
        let pair = login(app.clone()).await;

        let response = make_request(
            None,
            app,
            Method::POST,
            "/oauth/token",
            json!({
                "grant_type": "password",
                "refresh_token": pair.refresh_token,
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let state = router::tests::state(Arc::new(ManualClock::new(t0())));
        let app = app(state);
        let pair = login(app.clone()).await;

        let response = make_request(
            None,
            app,
            Method::POST,
            "/oauth/token",
            json!({
                "grant_type": "refresh_token",
                "refresh_token": pair.token,
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
