//! Open a session with email and password.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Result;
use crate::relay::{Relay, TokenPair};
use crate::router::Valid;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub password: String,
}

/// Handler exchanging credentials for an access and a refresh token.
pub async fn handler(
    State(relay): State<Arc<Relay>>,
    Valid(body): Valid<Body>,
) -> Result<Json<TokenPair>> {
    Ok(Json(relay.login(&body.email, &body.password).await?))
}
