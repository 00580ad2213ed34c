//! Staff authentication: Argon2 password hashes, bearer tokens issued at
//! login, and the middleware/extractors that put the user on the request.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::errors::ApiError;
use crate::models::User;

const TOKEN_LENGTH: usize = 40;

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Persistence the authentication layer needs.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_token(&self, token: &str) -> Result<Option<User>>;
    async fn store_token(&self, user_id: Uuid, token: Option<&str>) -> Result<()>;
}

#[async_trait]
impl UserStore for Database {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.get_user_by_username(username).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>> {
        self.get_user_by_token(token).await
    }

    async fn store_token(&self, user_id: Uuid, token: Option<&str>) -> Result<()> {
        self.set_user_token(user_id, token).await
    }
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Check credentials and issue a fresh token. `None` on bad credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<(User, String)>> {
        let user = match self.store.find_by_username(username).await? {
            Some(user) => user,
            None => {
                info!(username = %username, "Login attempt for unknown user");
                return Ok(None);
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(username = %username, "Login attempt with wrong password");
            return Ok(None);
        }

        let token = generate_token();
        self.store.store_token(user.id, Some(&token)).await?;
        info!(user_id = %user.id, username = %user.username, "User logged in");
        Ok(Some((user, token)))
    }

    pub async fn logout(&self, user: &User) -> Result<()> {
        self.store.store_token(user.id, None).await?;
        info!(user_id = %user.id, "User logged out");
        Ok(())
    }

    pub async fn authenticate_by_token(&self, token: &str) -> Result<Option<User>> {
        self.store.find_by_token(token).await
    }
}

/// Resolves `Authorization: Bearer <token>` into a [`User`] request extension.
pub async fn auth_middleware(
    State(auth): State<AuthService>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);

    if let Some(token) = token {
        match auth.authenticate_by_token(&token).await {
            Ok(Some(user)) => {
                debug!(user_id = %user.id, "Authenticated request");
                req.extensions_mut().insert(user);
            }
            Ok(None) => debug!("Bearer token did not match any user"),
            Err(e) => warn!(error = %e, "Token lookup failed"),
        }
    }

    next.run(req).await
}

/// Authenticated user extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ApiError::Unauthorized("Log in to continue".to_string()))
    }
}

/// Optional authenticated user extractor.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<User>().cloned()))
    }
}
