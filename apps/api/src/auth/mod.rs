//! Identity resolution for incoming requests.
//!
//! The hosted auth provider issues a signed session JWT. `Identity` is an
//! infallible extractor: a missing, malformed, or expired token resolves to
//! an anonymous identity and handlers decide how to reject it.

use std::collections::HashSet;
use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, JwtKey};
use crate::errors::AppError;
use crate::models::{NewUser, User};
use crate::resources::Repository;
use crate::state::AppState;

pub mod permissions;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid verification key: {0}")]
    Key(jsonwebtoken::errors::Error),

    #[error("Invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Session token claims. Only `sub` and `exp` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Comma-separated entitlements, each optionally scope-prefixed (`u:`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fea: Option<String>,
}

impl Claims {
    /// The user record these claims describe. Blank emails are dropped so
    /// they never collide on the unique email column.
    pub fn to_new_user(&self) -> NewUser {
        NewUser {
            id: self.sub.clone(),
            name: self.name.clone().unwrap_or_default(),
            email: self
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            image_url: self.picture.clone().unwrap_or_default(),
        }
    }

    pub fn entitlements(&self) -> HashSet<String> {
        self.fea
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| match f.split_once(':') {
                Some((_scope, key)) => key.to_string(),
                None => f.to_string(),
            })
            .collect()
    }
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let (key, algorithm) = match &config.jwt_key {
            JwtKey::RsaPem(pem) => (
                DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(AuthError::Key)?,
                Algorithm::RS256,
            ),
            JwtKey::Secret(secret) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        if let Some(issuer) = &config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self { key, validation })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(decode::<Claims>(token, &self.key, &self.validation)?.claims)
    }
}

/// The caller of the current request.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    claims: Option<Claims>,
    entitlements: HashSet<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_claims(claims: Claims) -> Self {
        let entitlements = claims.entitlements();
        Self {
            claims: Some(claims),
            entitlements,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.claims.as_ref().map(|c| c.sub.as_str())
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// The user id, or `Unauthorized`.
    pub fn require_user(&self) -> Result<&str, AppError> {
        self.user_id().ok_or(AppError::Unauthorized)
    }

    pub fn has_permission(&self, feature: &str) -> bool {
        self.entitlements.contains(feature)
    }

    /// Loads the full user record through the tagged cache. `None` when
    /// anonymous or not yet synced.
    pub async fn load_user(&self, repo: &Repository) -> Result<Option<User>, AppError> {
        match self.user_id() {
            Some(user_id) => repo.get_user(user_id).await,
            None => Ok(None),
        }
    }

    /// Returns the user record, creating it from the claims on first use so
    /// rows that reference the user can be written before an explicit sync.
    pub async fn ensure_user(&self, repo: &Repository) -> Result<User, AppError> {
        let claims = self.claims().ok_or(AppError::Unauthorized)?;
        if let Some(user) = repo.get_user(&claims.sub).await? {
            return Ok(user);
        }
        repo.upsert_user(claims.to_new_user()).await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let Some(token) = token else {
            return Ok(Identity::anonymous());
        };

        match state.verifier.verify(token.trim()) {
            Ok(claims) => Ok(Identity::from_claims(claims)),
            Err(e) => {
                debug!("Treating request as anonymous: {e}");
                Ok(Identity::anonymous())
            }
        }
    }
}
