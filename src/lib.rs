//! Relay issues purpose-scoped tokens for registration and authentication.

#![forbid(unsafe_code)]

pub mod account;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod relay;
mod router;
pub mod telemetry;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::FromRef;
use axum::http::{Method, StatusCode, header};
use axum::middleware as AxumMiddleware;
use axum::routing::{get, post};
pub use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::account::MemoryAccounts;
use crate::clock::{Clock, SystemClock};
use crate::config::{Configuration, SecretError, SigningKeys};
use crate::crypto::{AesGcmCipher, SelectedCipher, SigningKey, SymmetricKey};
use crate::relay::Relay;
use crate::token::{EventSink, Purpose, TokenManager, spawn_audit_consumer};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request =
            request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub relay: Arc<Relay>,
}

impl FromRef<AppState> for Arc<Relay> {
    fn from_ref(state: &AppState) -> Arc<Relay> {
        Arc::clone(&state.relay)
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(
                    |chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                        tracing::trace!(
                            size_bytes = chunk.len(),
                            latency = ?latency,
                            "sending body chunk"
                        )
                    },
                )
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(true)
                        .level(tracing::Level::INFO),
                )
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let register_router = Router::new()
        // `POST /register` goes to `register`.
        .route("/", post(router::register::handler))
        // `POST /register/complete` goes to `complete`.
        .route("/complete", post(router::register::complete));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        // `POST /oauth/token` goes to `oauth`.
        .route("/oauth/token", post(router::oauth::handler))
        .nest("/register", register_router)
        .nest("/users", router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Read the AES key material from `KEY` and `SALT` through `lookup`.
fn cipher(
    config: &Configuration,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SelectedCipher, SecretError> {
    if !config.token.encryption {
        tracing::warn!("token encryption is disabled, claims are only signed");
        return Ok(SelectedCipher::default());
    }

    let key = lookup("KEY").ok_or(SecretError::Missing("KEY"))?;
    let salt = lookup("SALT").ok_or(SecretError::Missing("SALT"))?;
    let key = SymmetricKey::derive_from_password(key, salt)?;

    Ok(AesGcmCipher::new(key).into())
}

/// Wire one token manager per purpose, with the configured lifetimes, grace
/// and event sink.
fn build_relay(
    config: &Configuration,
    keys: SigningKeys,
    cipher: SelectedCipher,
    clock: Arc<dyn Clock>,
    events: EventSink,
) -> Result<Relay, Box<dyn std::error::Error>> {
    let manager = |purpose: Purpose, key: SigningKey, lifetime| {
        TokenManager::hmac(
            purpose,
            key,
            cipher.clone(),
            Arc::clone(&clock),
            lifetime,
        )
        .with_grace(config.token.grace())
        .with_events(events.clone())
    };

    let accounts = Arc::new(MemoryAccounts::new(
        config.argon2.clone(),
        Arc::clone(&clock),
    )?);
    let relay = Relay::new(
        manager(
            Purpose::Registration,
            keys.registration,
            config.token.registration_lifetime(),
        ),
        manager(
            Purpose::Authentication,
            keys.authentication,
            config.token.authentication_lifetime(),
        ),
        manager(
            Purpose::Refresh,
            keys.refresh,
            config.token.refresh_lifetime(),
        ),
        accounts.clone(),
        accounts,
    )?;

    Ok(relay)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = Configuration::default().path_from_env().read()?;

    let keys = SigningKeys::from_env()?;
    let cipher = cipher(&config, |name| std::env::var(name).ok())?;

    // every issued token is reported to the audit log.
    let (events, receiver) = EventSink::channel(config.token.event_buffer);
    spawn_audit_consumer(receiver);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let relay = build_relay(&config, keys, cipher, clock, events)?;

    Ok(AppState {
        config,
        relay: Arc::new(relay),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeDelta;

    use super::*;
    use crate::account::tests::light_argon2;
    use crate::clock::ManualClock;
    use crate::relay::tests::{PASSWORD, t0};

    fn lookup(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn config(encryption: bool) -> Configuration {
        let mut config =
            Configuration::new("relay", "https://relay.example.com/");
        config.token.encryption = encryption;
        config.argon2 = light_argon2();
        config
    }

    fn keys() -> SigningKeys {
        SigningKeys::new(
            SigningKey::new("registration key").unwrap(),
            SigningKey::new("authentication key").unwrap(),
            SigningKey::new("refresh key").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_cipher_disabled() {
        let cipher = cipher(&config(false), lookup(&[])).unwrap();
        assert!(matches!(cipher, SelectedCipher::Noop(_)));
    }

    #[test]
    fn test_cipher_missing_material() {
        assert!(matches!(
            cipher(&config(true), lookup(&[("SALT", "pepper and salt")])),
            Err(SecretError::Missing("KEY"))
        ));
        assert!(matches!(
            cipher(&config(true), lookup(&[("KEY", "secret")])),
            Err(SecretError::Missing("SALT"))
        ));
    }

    #[test]
    fn test_cipher_enabled() {
        let vars = lookup(&[("KEY", "secret"), ("SALT", "pepper and salt")]);
        let cipher = cipher(&config(true), vars).unwrap();
        assert!(matches!(cipher, SelectedCipher::AesGcm(_)));
    }

    #[tokio::test]
    async fn test_build_relay() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut config = config(false);
        config.token.grace = 30;
        let (events, mut receiver) = EventSink::channel(16);

        let relay = build_relay(
            &config,
            keys(),
            SelectedCipher::default(),
            clock.clone(),
            events,
        )
        .unwrap();
        assert_eq!(relay.registration_expires_in(), 900);

        let token = relay.begin_registration("alice@example.com").unwrap();
        let created = receiver.try_recv().unwrap();
        assert_eq!(created.purpose, Purpose::Registration);
        assert_eq!(created.token, token);

        relay
            .complete_registration(&token, "Alice".into(), PASSWORD.into())
            .await
            .unwrap();
        let pair = relay.login("alice@example.com", PASSWORD).await.unwrap();
        assert_eq!(pair.expires_in, 300);

        let purposes: Vec<Purpose> =
            std::iter::from_fn(|| receiver.try_recv().ok())
                .map(|created| created.purpose)
                .collect();
        assert_eq!(purposes, [Purpose::Authentication, Purpose::Refresh]);

        // Past expiry, within grace.
        clock.advance(TimeDelta::seconds(300 + 10));
        assert!(relay.authenticate(&pair.token).is_ok());

        clock.advance(TimeDelta::seconds(21));
        assert!(relay.authenticate(&pair.token).is_err());
    }

    #[test]
    fn test_build_relay_keeps_purposes_apart() {
        let clock = Arc::new(ManualClock::new(t0()));
        let (events, _receiver) = EventSink::channel(1);
        let relay = build_relay(
            &config(false),
            keys(),
            SelectedCipher::default(),
            clock,
            events,
        )
        .unwrap();

        let token = relay.begin_registration("alice@example.com").unwrap();
        assert!(relay.authenticate(&token).is_err());
        assert!(relay.refresh(&token).is_err());
    }
}
