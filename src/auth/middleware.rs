// Bearer-token extractor for protected routes

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::models::{AuthUser, Role};
use crate::auth::token::IdentityProvider;
use crate::error::EngineError;

/// Caller identity resolved through the identity collaborator
///
/// The raw bearer token is kept so it can be forwarded to the address and
/// supplier collaborators on the caller's behalf.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: AuthUser,
    pub token: String,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    /// Rejects callers whose role is not listed
    pub fn require_any(&self, roles: &[Role]) -> Result<(), EngineError> {
        if roles.contains(&self.user.role) {
            return Ok(());
        }
        warn!(
            "Authorization failed: user_id={}, role={}, allowed={:?}",
            self.user.id, self.user.role, roles
        );
        Err(EngineError::Unauthorized(format!(
            "role {} may not perform this action",
            self.user.role
        )))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, EngineError> {
    let header_value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| EngineError::Unauthorized("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| EngineError::Unauthorized("malformed Authorization header".to_string()))?;

    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| EngineError::Unauthorized("expected a Bearer token".to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn IdentityProvider>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.to_string();
        let identity = Arc::<dyn IdentityProvider>::from_ref(state);

        let validation = identity.validate_token(&token).await?;
        match (validation.is_valid, validation.user) {
            (true, Some(user)) => {
                debug!("Authenticated user_id={} role={}", user.id, user.role);
                Ok(AuthenticatedUser { user, token })
            }
            _ => Err(EngineError::Unauthorized("invalid or expired token".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header_value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/orders");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert!(bearer_token(&parts_with(Some("Basic abc"))).is_err());
        assert!(bearer_token(&parts_with(Some("Bearer "))).is_err());
        assert!(bearer_token(&parts_with(None)).is_err());
    }

    #[test]
    fn test_require_any() {
        let caller = AuthenticatedUser {
            user: AuthUser {
                id: Uuid::new_v4(),
                role: Role::Driver,
                customer_type: None,
            },
            token: "t".to_string(),
        };
        assert!(caller.require_any(&[Role::Driver, Role::Admin]).is_ok());
        assert!(matches!(
            caller.require_any(&[Role::Supplier]),
            Err(EngineError::Unauthorized(_))
        ));
    }
}
