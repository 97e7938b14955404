// JWT-backed identity collaborator

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::models::{AuthUser, Role, TokenValidation};
use crate::error::{EngineError, EngineResult};

/// Identity collaborator contract
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn validate_token(&self, token: &str) -> EngineResult<TokenValidation>;
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_type: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Validates HS256 tokens minted by the identity service with a shared secret
pub struct JwtIdentityProvider {
    secret: String,
}

impl JwtIdentityProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mint a token for `user`; used by tooling and tests
    pub fn issue(&self, user: &AuthUser, ttl_seconds: i64) -> EngineResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id,
            role: user.role,
            customer_type: user.customer_type.clone(),
            iat: now,
            exp: now + ttl_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| EngineError::Internal(format!("token generation failed: {}", e)))
    }

    fn decode_claims(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| tracing::debug!("Rejected token: {}", e))
        .ok()
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn validate_token(&self, token: &str) -> EngineResult<TokenValidation> {
        Ok(match self.decode_claims(token) {
            Some(claims) => TokenValidation::valid(AuthUser {
                id: claims.sub,
                role: claims.role,
                customer_type: claims.customer_type,
            }),
            None => TokenValidation::invalid(),
        })
    }
}
