pub mod access_jwt;
pub mod factory;
pub mod oidc;
pub mod session;

pub use access_jwt::AccessTokenVerifier;
pub use factory::{build_access_verifier, build_oidc_client};
pub use oidc::OidcClient;
pub use session::{Session, SessionStore};
