#![doc = include_str!("../README.md")]

pub mod claims;
pub mod datasource;
pub mod error;
pub mod oauth;
pub mod pkce;
pub mod roles;
pub mod session;
pub mod store;
pub mod token;
pub mod types;
pub mod well_known;
pub mod zone;

// Re-exports for convenient access
pub use claims::{IdentityClaims, parse_id_token};
pub use datasource::{
    AuthConfig, AuthenticatedSession, LoginOutcome, OidcDataSource, PlatformBackend, data_source,
};
pub use error::Error;
pub use oauth::{AuthClient, AuthorizationRequest, OAuthConfig, TokenResponse, UserInfo};
pub use pkce::{generate_code_challenge, generate_code_verifier, generate_nonce, generate_state};
pub use roles::{GroupRoleMapper, RoleMapper};
pub use session::SessionManager;
pub use store::{MemoryStorage, Storage, TokenStore};
pub use token::TokenBundle;
pub use types::{Role, Subject};
pub use well_known::OpenIdConfiguration;
pub use zone::{NetworkZone, ProbingZoneResolver, ZoneConfig, ZoneEndpoints, ZoneResolver};
