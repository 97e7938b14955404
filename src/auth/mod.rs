// Identity collaborator boundary
// Token validation is delegated; the engine only consumes {id, role}

pub mod middleware;
pub mod models;
pub mod token;

pub use middleware::AuthenticatedUser;
pub use models::{AuthUser, Role, TokenValidation};
pub use token::{IdentityProvider, JwtIdentityProvider};
