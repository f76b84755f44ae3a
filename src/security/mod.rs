use crate::config::SecurityConfig;
use crate::error::Error;
use anyhow::Result;
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user or service id)
    pub sub: String,
    /// Role granted by the issuing service, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: usize,
}

/// Bearer-token and internal-token checks for the query API
pub struct SecurityService {
    config: SecurityConfig,
}

impl SecurityService {
    /// Create a new security service
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Sign an HS256 token; tokens normally come from the identity service
    pub fn issue_token(&self, subject: &str, role: Option<&str>, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role: role.map(str::to_string),
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Authentication(format!("Failed to generate JWT token: {}", e)))?;

        Ok(token)
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| Error::Authentication(format!("Invalid token: {}", e)))?;

        Ok(token_data)
    }

    /// Validate the `Authorization: Bearer <jwt>` header
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Claims> {
        let token = bearer_token(headers).ok_or_else(|| {
            Error::Authentication("missing or malformed Authorization header".to_string())
        })?;
        Ok(self.validate_token(token)?.claims)
    }

    /// Compare the `X-Internal-Token` header with the configured token.
    /// An unset token closes the internal API entirely.
    pub fn check_internal_token(&self, headers: &HeaderMap) -> Result<()> {
        let expected = self.config.internal_token.trim();
        if expected.is_empty() {
            return Err(Error::Authentication("internal API is not configured".to_string()).into());
        }

        let provided = headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
            return Err(Error::Authentication("invalid internal token".to_string()).into());
        }
        Ok(())
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
