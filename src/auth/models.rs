// Identity data models

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Actor role as asserted by the identity collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Supplier,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Supplier => "supplier",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "supplier" => Ok(Role::Supplier),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Authenticated principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    /// Raw customer type ("household", "commercial", ...); pricing
    /// normalizes it once at the engine entry point
    pub customer_type: Option<String>,
}

/// Result of `validateToken`
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub is_valid: bool,
    pub user: Option<AuthUser>,
}

impl TokenValidation {
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            user: None,
        }
    }

    pub fn valid(user: AuthUser) -> Self {
        Self {
            is_valid: true,
            user: Some(user),
        }
    }
}
