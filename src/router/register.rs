//! Two-step registration: attest an email, then create the account.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::account::User;
use crate::error::Result;
use crate::relay::Relay;
use crate::router::Valid;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub token: String,
    pub expires_in: i64,
}

/// Handler issuing a registration token.
pub async fn handler(
    State(relay): State<Arc<Relay>>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let token = relay.begin_registration(&body.email.to_lowercase())?;

    Ok(Json(Response {
        token,
        expires_in: relay.registration_expires_in(),
    }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CompleteBody {
    #[validate(length(min = 1, message = "Token is required."))]
    pub token: String,
    #[validate(length(
        min = 2,
        max = 32,
        message = "Display name must be between 2 and 32 characters."
    ))]
    pub display_name: String,
    #[validate(
        length(
            min = 8,
            max = 255,
            message = "Password must contain at least 8 characters."
        ),
        custom(
            function = "crate::router::validate_password",
            message = "Password is too weak."
        )
    )]
    pub password: String,
}

/// Handler creating the user attested by a registration token.
pub async fn complete(
    State(relay): State<Arc<Relay>>,
    Valid(body): Valid<CompleteBody>,
) -> Result<(StatusCode, Json<User>)> {
    let user = relay
        .complete_registration(&body.token, body.display_name, body.password)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}
