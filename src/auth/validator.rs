use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use moka::future::Cache;

use super::{authority, jwks_url, AuthError, Claims};

/// How long fetched signing keys are trusted before refetching
const JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

/// Timeout for fetching the JWKS document on the request path
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Validates RS256 bearer tokens issued by the configured provider.
///
/// Signing keys are fetched lazily and cached; an unknown key id forces one
/// refetch so key rotation is picked up without a restart.
pub struct JwtValidator {
    issuer: String,
    audience: Option<String>,
    jwks_url: String,
    http_client: reqwest::Client,
    keys: Cache<(), Arc<JwkSet>>,
}

impl JwtValidator {
    pub fn new(domain: &str, audience: Option<String>) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::KeyFetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            issuer: authority(domain),
            audience,
            jwks_url: jwks_url(domain),
            http_client,
            keys: Cache::builder()
                .max_capacity(1)
                .time_to_live(JWKS_CACHE_TTL)
                .build(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify signature, issuer, audience and expiry; return the claims.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header has no key id".to_string()))?;

        let keys = self.signing_keys().await?;
        let jwk = match keys.find(&kid) {
            Some(jwk) => jwk.clone(),
            None => {
                tracing::debug!(kid = %kid, "Unknown key id, refreshing signing keys");
                self.keys.invalidate(&()).await;
                self.signing_keys()
                    .await?
                    .find(&kid)
                    .cloned()
                    .ok_or(AuthError::UnknownKey(kid))?
            }
        };

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        decode::<Claims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    async fn signing_keys(&self) -> Result<Arc<JwkSet>, AuthError> {
        self.keys
            .try_get_with((), self.fetch_keys())
            .await
            .map_err(|e| match &*e {
                AuthError::KeyFetch(detail) => AuthError::KeyFetch(detail.clone()),
                other => AuthError::KeyFetch(other.to_string()),
            })
    }

    async fn fetch_keys(&self) -> Result<Arc<JwkSet>, AuthError> {
        tracing::debug!(url = %self.jwks_url, "Fetching signing keys");

        let keys: JwkSet = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("Malformed JWKS document: {}", e)))?;

        Ok(Arc::new(keys))
    }
}
