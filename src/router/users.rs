//! Users-related HTTP API.

use axum::extract::{Request, State};
use axum::http::header;
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::token::Claims;
use crate::{AppState, ServerError};

const BEARER: &str = "Bearer ";

/// Custom middleware for authentification.
async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .ok_or(ServerError::Unauthorized)?;

    let claims = state.relay.authenticate(token.trim())?;

    req.extensions_mut().insert::<Claims>(claims);
    Ok(next.run(req).await)
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Me {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

async fn me(Extension(claims): Extension<Claims>) -> Json<Me> {
    Json(Me {
        id: claims.subject,
        expires_at: claims.expires_at,
    })
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users/@me` goes to `me`. Authorization required.
        .route("/@me", get(me))
        .route_layer(middleware::from_fn_with_state(state, auth))
}
