//! Bearer token authentication against an OIDC identity provider.
//!
//! The provider is addressed by its domain (e.g. `tenant.eu.auth0.com`):
//! - issuer / authority: `https://<domain>/`
//! - signing keys: `https://<domain>/.well-known/jwks.json`
//!
//! A domain may also be given with an explicit `http://` or `https://` scheme,
//! which is used as-is (handy for local identity provider emulators).

mod validator;

pub use validator::JwtValidator;

use serde::Deserialize;

use crate::config::AUTH_DOMAIN_PLACEHOLDER;

/// Path of the provider's public key discovery document.
pub const JWKS_PATH: &str = ".well-known/jwks.json";

/// Error type for bearer authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("No signing key matches key id '{0}'")]
    UnknownKey(String),

    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(String),

    #[error("Authentication is not configured")]
    NotConfigured,
}

/// Claims the service reads from an accepted access token.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Subject (used as the caller's name identifier)
    pub sub: String,
    pub exp: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The domain, if it is set to something other than blank or the sample placeholder.
pub fn configured_domain(domain: Option<&str>) -> Option<&str> {
    domain
        .map(str::trim)
        .filter(|d| !d.is_empty() && *d != AUTH_DOMAIN_PLACEHOLDER)
}

/// Issuer URL for a domain, always with a trailing slash.
pub fn authority(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("https://") || domain.starts_with("http://") {
        format!("{}/", domain)
    } else {
        format!("https://{}/", domain)
    }
}

pub fn jwks_url(domain: &str) -> String {
    format!("{}{}", authority(domain), JWKS_PATH)
}
