//! Shared application state for request handlers.

use std::sync::Arc;

use crate::auth::{self, AuthError, JwtValidator};
use crate::config::{AppConfig, ConfigSource, KEY_AUTH_AUDIENCE, KEY_AUTH_DOMAIN};

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// `auth` is `None` when no identity provider domain is configured; protected
/// routes then reject every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Option<Arc<JwtValidator>>,
}

impl AppState {
    /// Creates application state; identity provider settings are read from
    /// `settings` so environment overrides apply to authentication too.
    pub fn new(config: AppConfig, settings: &dyn ConfigSource) -> Result<Self, AuthError> {
        let domain = settings.get(KEY_AUTH_DOMAIN);
        let auth = match auth::configured_domain(domain.as_deref()) {
            Some(domain) => Some(Arc::new(JwtValidator::new(
                domain,
                settings.get(KEY_AUTH_AUDIENCE),
            )?)),
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            auth,
        })
    }
}
