//! Account collaborators used by the relay.
//!
//! User persistence and credential checks live outside of the token core.
//! [`MemoryAccounts`] is a process-local implementation of both.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::{JoinError, spawn_blocking};
use validator::{ValidationError, ValidationErrors};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::config::Argon2 as ArgonConfig;
use crate::crypto::{CryptoError, PasswordManager, random_bytes};

const ID_LENGTH: usize = 16;

pub type Result<T> = std::result::Result<T, AccountError>;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("password hashing task failed: {0}")]
    Task(#[from] JoinError),
}

/// Public user representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// User to create once its email is attested.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

/// Check a login secret and resolve the subject it belongs to.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Returns the user ID on success.
    async fn validate_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<String>;
}

/// Persist users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
}

struct Account {
    user: User,
    password_hash: String,
}

/// In-memory users keyed by lowercase email.
pub struct MemoryAccounts {
    pwd: PasswordManager,
    /// Checked in place of a missing account, so unknown emails cost as much
    /// as wrong passwords.
    placeholder_hash: String,
    clock: Arc<dyn Clock>,
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryAccounts {
    /// Create a new [`MemoryAccounts`].
    pub fn new(
        config: Option<ArgonConfig>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let pwd = PasswordManager::new(config)?;
        let placeholder_hash = pwd.hash_password(random_bytes::<32>()?)?;

        Ok(Self {
            pwd,
            placeholder_hash,
            clock,
            accounts: RwLock::new(HashMap::new()),
        })
    }

    /// User ID and password hash stored for `identifier`.
    ///
    /// The placeholder hash is returned for unknown identifiers.
    async fn lookup(&self, identifier: &str) -> (Option<String>, String) {
        let accounts = self.accounts.read().await;
        match accounts.get(&identifier.to_lowercase()) {
            Some(account) => (
                Some(account.user.id.clone()),
                account.password_hash.clone(),
            ),
            None => (None, self.placeholder_hash.clone()),
        }
    }

    /// Argon2 is CPU bound, it runs on the blocking pool.
    async fn verify(&self, secret: &str, hash: String) -> Result<bool> {
        let pwd = self.pwd.clone();
        let secret = Zeroizing::new(secret.to_owned());

        let valid = spawn_blocking(move || {
            pwd.verify_password(secret.as_bytes(), &hash)
        })
        .await?;
        Ok(valid)
    }

    async fn hash(&self, password: String) -> Result<String> {
        let pwd = self.pwd.clone();
        let password = Zeroizing::new(password);

        Ok(spawn_blocking(move || pwd.hash_password(password.as_bytes()))
            .await??)
    }
}

fn email_taken() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "email",
        ValidationError::new("email_taken")
            .with_message("Email is already registered.".into()),
    );
    errors
}

#[async_trait]
impl UserRepository for MemoryAccounts {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let email = user.email.to_lowercase();
        if self.accounts.read().await.contains_key(&email) {
            return Err(email_taken().into());
        }

        let password_hash = self.hash(user.password).await?;
        let created = User {
            id: Alphanumeric
                .sample_string(&mut OsRng, ID_LENGTH)
                .to_lowercase(),
            email: email.clone(),
            display_name: user.display_name,
            created_at: self.clock.now(),
        };

        let mut accounts = self.accounts.write().await;
        // Checked again, another request may have won the race.
        if accounts.contains_key(&email) {
            return Err(email_taken().into());
        }
        accounts.insert(
            email,
            Account {
                user: created.clone(),
                password_hash,
            },
        );

        tracing::info!(user_id = created.id.as_str(), "user created");
        Ok(created)
    }
}

#[async_trait]
impl CredentialValidator for MemoryAccounts {
    async fn validate_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<String> {
        // Lock is released before hashing.
        let (id, hash) = self.lookup(identifier).await;
        let valid = self.verify(secret, hash).await?;

        match id {
            Some(id) if valid => Ok(id),
            _ => Err(AccountError::InvalidCredentials),
        }
    }
}
