//! Error handler for relay.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::account::AccountError;
use crate::relay::RelayError;
use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Token(TokenError),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

impl From<TokenError> for ServerError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(_) => ServerError::Internal {
                details: "token encoding failed".into(),
                source: Some(Box::new(err)),
            },
            err => ServerError::Token(err),
        }
    }
}

impl From<AccountError> for ServerError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidCredentials => ServerError::InvalidCredentials,
            AccountError::Validation(errors) => ServerError::Validation(errors),
            err => ServerError::Internal {
                details: "account operation failed".into(),
                source: Some(Box::new(err)),
            },
        }
    }
}

impl From<RelayError> for ServerError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Token(err) => err.into(),
            RelayError::Account(err) => err.into(),
            err => ServerError::Internal {
                details: err.to_string(),
                source: None,
            },
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        match serde_json::to_string(&self) {
            Ok(body) => Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into()),
            Err(_) => Ok(internal_server_error()),
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            // Callers only learn that the token was refused.
            ServerError::Token(err) => {
                tracing::debug!(
                    reason = err.reason(),
                    error = %err,
                    "token refused"
                );

                response
                    .title("Invalid or expired token.")
                    .details("")
                    .status(StatusCode::UNAUTHORIZED)
            },

            ServerError::InvalidCredentials => response
                .title("Invalid credentials.")
                .details("")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Internal { details, source } => {
                tracing::error!(
                    err = ?source,
                    %details,
                    "server returned 500 status"
                );

                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use http_body_util::BodyExt;

    use super::*;
    use crate::token::Purpose;

    async fn body(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_token_errors_look_the_same() {
        let mut bodies = Vec::new();
        for err in [
            TokenError::InvalidSignature,
            TokenError::Malformed,
            TokenError::Expired {
                expired_at: Utc::now(),
            },
            TokenError::PurposeMismatch {
                expected: Purpose::Authentication,
                found: Purpose::Refresh,
            },
        ] {
            let (status, body) = body(err.into()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            bodies.push(body);
        }

        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(bodies[0]["title"], "Invalid or expired token.");
    }

    #[tokio::test]
    async fn test_encoding_is_internal() {
        let err = TokenError::Encoding("boom".into());
        let (status, _) = body(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_credentials() {
        let (status, body) =
            body(AccountError::InvalidCredentials.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["title"], "Invalid credentials.");
    }

    #[tokio::test]
    async fn test_validation_fields() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "email",
            validator::ValidationError::new("email")
                .with_message("Email must be formatted.".into()),
        );

        let (status, body) = body(errors.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "email");
        assert_eq!(body["errors"][0]["message"], "Email must be formatted.");
    }
}
