use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing;

use adpulse_core::AppContext;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub exp: usize,
}

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: i64,
}

/// Extract JWT token from Authorization header
fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

/// Generate JWT token for a user id
pub fn generate_token(user_id: i64, secret: &str, expires_in_days: u64) -> Result<String, StatusCode> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .as_secs() as usize;

    let exp = now + (expires_in_days * 24 * 60 * 60) as usize;

    let claims = Claims { user_id, exp };

    let encoding_key = EncodingKey::from_secret(secret.as_ref());

    encode(&Header::default(), &claims, &encoding_key).map_err(|e| {
        tracing::error!("Failed to generate JWT token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Verify JWT token and extract the user id
pub fn verify_token(token: &str, secret: &str) -> Result<i64, StatusCode> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    let validation = Validation::default();

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims.user_id),
        Err(e) => {
            tracing::debug!("JWT verification failed: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Axum middleware for JWT authentication
pub async fn auth_middleware(
    mut req: Request,
    next: axum::middleware::Next,
) -> Result<Response, StatusCode> {
    // Skip authentication for health check and token issuance
    let path = req.uri().path();
    if path == "/health" || path == "/api/v1/auth/token" {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match extract_token(auth_header) {
        Some(t) => t,
        None => {
            tracing::debug!("Missing Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let ctx = req
        .extensions()
        .get::<AppContext>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let user_id = verify_token(&token, &ctx.config.server.jwt_secret)?;

    req.extensions_mut().insert(AuthenticatedUser { user_id });

    tracing::debug!("Authenticated user: {}", user_id);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = generate_token(42, "test-secret", 1).unwrap();
        assert_eq!(verify_token(&token, "test-secret").unwrap(), 42);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = generate_token(42, "test-secret", 1).unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token(Some("Bearer abc.def.ghi")),
            Some("abc.def.ghi".to_string())
        );
        assert_eq!(extract_token(Some("Basic xyz")), None);
        assert_eq!(extract_token(None), None);
    }
}
