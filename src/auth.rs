use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::api::ApiError;
use crate::errors::AuthError;

pub const ANONYMOUS_USER: &str = "demo-user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub anonymous: bool,
}

pub struct AuthState {
    secret: Option<String>,
    allow_anonymous: bool,
    ttl_hours: u64,
}

impl AuthState {
    pub fn new(secret: Option<String>, allow_anonymous: bool, ttl_hours: u64) -> Self {
        Self {
            secret,
            allow_anonymous,
            ttl_hours,
        }
    }

    pub fn issue_token(&self, user_id: &str) -> Result<String, AuthError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| AuthError::Issue("no signing secret configured".into()))?;
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        let exp = self
            .ttl_hours
            .checked_mul(3600)
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| AuthError::Issue(format!("token ttl of {} hours is out of range", self.ttl_hours)))?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp,
            email: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AuthError::Issue(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| AuthError::InvalidToken("token authentication disabled".into()))?;
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let Some(header) = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        else {
            if self.allow_anonymous {
                return Ok(AuthUser {
                    user_id: ANONYMOUS_USER.to_string(),
                    anonymous: true,
                });
            }
            return Err(AuthError::MissingCredentials);
        };
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidFormat)?;
        let claims = self.validate_token(token)?;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("empty subject".into()));
        }
        Ok(AuthUser {
            user_id: claims.sub,
            anonymous: false,
        })
    }
}

/// Resolves the bearer credential and stores the `AuthUser` in request extensions.
pub async fn require_user(
    State(auth): State<Arc<AuthState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = auth.resolve(&headers).map_err(|e| {
        tracing::debug!(error = %e, path = %request.uri().path(), "authentication rejected");
        ApiError::from(e)
    })?;
    tracing::debug!(user_id = %user.user_id, anonymous = user.anonymous, "authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-of-sufficient-length";

    fn bearer(token: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        h
    }

    #[test]
    fn issued_token_resolves_to_subject() {
        let auth = AuthState::new(Some(SECRET.into()), false, 1);
        let token = auth.issue_token("user-42").unwrap();
        let user = auth.resolve(&bearer(&token)).unwrap();
        assert_eq!(user.user_id, "user-42");
        assert!(!user.anonymous);
    }

    #[test]
    fn oversized_ttl_is_an_issue_error() {
        let auth = AuthState::new(Some(SECRET.into()), false, u64::MAX);
        assert!(matches!(auth.issue_token("alice"), Err(AuthError::Issue(_))));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AuthState::new(Some("another-secret-entirely-123".into()), false, 1);
        let token = other.issue_token("mallory").unwrap();
        let auth = AuthState::new(Some(SECRET.into()), false, 1);
        assert!(matches!(auth.resolve(&bearer(&token)), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn missing_header_depends_on_anonymous_flag() {
        let strict = AuthState::new(Some(SECRET.into()), false, 1);
        assert!(matches!(
            strict.resolve(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
        let open = AuthState::new(None, true, 1);
        let user = open.resolve(&HeaderMap::new()).unwrap();
        assert_eq!(user.user_id, ANONYMOUS_USER);
        assert!(user.anonymous);
    }

    #[test]
    fn invalid_token_is_rejected_even_when_anonymous_allowed() {
        let open = AuthState::new(Some(SECRET.into()), true, 1);
        assert!(open.resolve(&bearer("not-a-jwt")).is_err());
        let mut basic = HeaderMap::new();
        basic.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc"),
        );
        assert!(matches!(open.resolve(&basic), Err(AuthError::InvalidFormat)));
    }
}
