//! Public instance status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Structured configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    name: String,
    version: String,
    url: String,
}

/// Public server status (configuration).
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    let name = if config.name.is_empty() {
        env!("CARGO_CRATE_NAME").to_owned()
    } else {
        config.name.clone()
    };

    Json(Status {
        name,
        version: env!("CARGO_PKG_VERSION").into(),
        url: config.url.clone(),
    })
}
