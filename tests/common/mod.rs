//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serviceops::startup::{Severity, StartupLog};
use tokio::net::TcpListener;

/// RSA key used to sign test tokens (PKCS#1 PEM)
pub const TEST_RSA_PEM: &str = include_str!("../fixtures/test_rsa.pem");

/// Public modulus of [`TEST_RSA_PEM`], base64url without padding
pub const TEST_RSA_N: &str = "0SuYuw81nkNGgqLoCDIv7jTKntz86MJMBdTwtHDx4IGelPtfm-PryLYWZULvGGUspYYOTIHqDWQ95T5lFwZbKh3mJNI_vaFFEXkgiWBh0MMEDPtKVKOWL8zHLOlZ8u7iwoSz0wRosz37-X8EYVSNN8-QxzFjHDVYjM5VyXI4nBziKmIU19e9V6C2yXYSPn_-IZNsEHE5V4QjriZkvq-OHSY-eCKqnqgcOvakFkfD-u-6Pyzh1uawIPFbBObBoYOOIO0cl7XxchqJ4KL5qJn4pMuGXfhAGiUCjiXW1C9yOy-uh7FOm777ZJiJ5J9iwoAvCsLIXBWhnQTcYIpdiNaCBw";

pub const TEST_RSA_E: &str = "AQAB";

pub const TEST_KID: &str = "test-key-1";

pub const TEST_AUDIENCE: &str = "https://serviceops.test/api";

/// A log sink that keeps every record for assertions.
#[derive(Default)]
pub struct RecordingLog {
    records: Mutex<Vec<Record>>,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub severity: Severity,
    pub dependency: String,
    pub message: String,
    pub error: Option<String>,
}

impl RecordingLog {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.severity == severity)
            .collect()
    }
}

impl StartupLog for RecordingLog {
    fn log(&self, severity: Severity, dependency: &str, message: &str, error: Option<&str>) {
        self.records.lock().unwrap().push(Record {
            severity,
            dependency: dependency.to_string(),
            message: message.to_string(),
            error: error.map(str::to_string),
        });
    }
}

/// A stand-in identity provider serving `/.well-known/jwks.json`.
pub struct MockIdentityProvider {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockIdentityProvider {
    /// Serve the test key set with a 200 status.
    pub async fn healthy() -> Self {
        Self::start(StatusCode::OK).await
    }

    /// Answer every JWKS request with `status`.
    pub async fn start(status: StatusCode) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let app = Router::new().route(
            "/.well-known/jwks.json",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (status, axum::Json(jwks()))
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits }
    }

    /// Domain value pointing at this server.
    pub fn domain(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Issuer the validator expects for this server.
    pub fn issuer(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn jwks() -> serde_json::Value {
    serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": TEST_KID,
            "n": TEST_RSA_N,
            "e": TEST_RSA_E,
        }]
    })
}

/// Sign an RS256 token with the test key.
pub fn sign_token(issuer: &str, audience: &str, kid: &str, expires_in_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());

    let claims = serde_json::json!({
        "sub": "auth0|integration-test",
        "iss": issuer,
        "aud": audience,
        "iat": now,
        "exp": now + expires_in_secs,
    });

    jsonwebtoken::encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(TEST_RSA_PEM.as_bytes()).unwrap(),
    )
    .unwrap()
}

/// Bind to an ephemeral port and release it, yielding an address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
