// Public API - what other modules can use
pub use handlers::{create_session, end_session};
pub use middleware::{bearer_token, jwt_auth};
pub use service::SessionAuthenticator;
pub use token::TokenConfig;
pub use types::{Principal, PrincipalKind, SessionClaims, SessionResponse};

// Internal modules
mod handlers;
mod middleware;
pub mod models;
pub mod repository;
pub mod service;
mod token;
mod types;
