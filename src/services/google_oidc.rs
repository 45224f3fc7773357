// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Verification of the Google-signed OIDC tokens Cloud Tasks attaches to
//! queued listing changes.

use crate::config::Config;
use anyhow::Context;
use axum::http::HeaderValue;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Caller identity proven by a valid token.
#[derive(Debug, Clone)]
pub struct TaskCaller {
    pub email: String,
    pub subject: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OidcError {
    /// Token missing, malformed, or issued for someone else
    #[error("rejected: {0}")]
    Forbidden(String),
    /// Key fetch failed; Cloud Tasks will retry
    #[error("transient: {0}")]
    Transient(String),
}

enum KeySource {
    /// Google's published signing keys, refreshed on demand
    Google { cache: RwLock<Option<KeySet>> },
    /// One fixed key, for local runs and tests
    Fixed { kid: String, key: Arc<DecodingKey> },
}

struct KeySet {
    by_kid: HashMap<String, Arc<DecodingKey>>,
    fetched_until: Instant,
}

/// Checks that `/tasks/*` callers are our Cloud Tasks service account.
pub struct GoogleOidcVerifier {
    http: reqwest::Client,
    audience: String,
    invoker_email: String,
    keys: KeySource,
    refresh: Mutex<()>,
}

impl GoogleOidcVerifier {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let verifier = Self::build(
            config,
            KeySource::Google {
                cache: RwLock::new(None),
            },
        )?;
        tracing::info!(
            audience = %verifier.audience,
            invoker = %verifier.invoker_email,
            "Cloud Tasks OIDC verifier ready"
        );
        Ok(verifier)
    }

    /// Verifier that trusts exactly one RS256 key.
    pub fn with_fixed_key(
        config: &Config,
        kid: impl Into<String>,
        key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        anyhow::ensure!(!kid.trim().is_empty(), "fixed OIDC key needs a kid");
        Self::build(
            config,
            KeySource::Fixed {
                kid,
                key: Arc::new(key),
            },
        )
    }

    fn build(config: &Config, keys: KeySource) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        Ok(Self {
            http,
            audience: config.api_url.trim_end_matches('/').to_string(),
            invoker_email: crate::config::tasks_invoker_email(&config.gcp_project_id),
            keys,
            refresh: Mutex::new(()),
        })
    }

    /// Verify the bearer token on a task callback.
    pub async fn verify(&self, auth_header: Option<&HeaderValue>) -> Result<TaskCaller, OidcError> {
        let token = bearer_token(auth_header)?;

        let header = decode_header(token)
            .map_err(|e| OidcError::Forbidden(format!("bad JWT header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(OidcError::Forbidden(format!("alg {:?} not allowed", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| OidcError::Forbidden("JWT has no kid".to_string()))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.audience.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| OidcError::Forbidden(format!("JWT rejected: {e}")))?
            .claims;

        if claims.iat > jsonwebtoken::get_current_timestamp() + CLOCK_SKEW_SECS {
            return Err(OidcError::Forbidden("iat is in the future".to_string()));
        }

        match (claims.email, claims.email_verified) {
            (Some(email), Some(true)) if email == self.invoker_email => Ok(TaskCaller {
                email,
                subject: claims.sub,
            }),
            (Some(email), Some(true)) => Err(OidcError::Forbidden(format!(
                "unexpected caller {email}"
            ))),
            (None, _) => Err(OidcError::Forbidden("no email claim".to_string())),
            (Some(_), _) => Err(OidcError::Forbidden("email not verified".to_string())),
        }
    }

    async fn key_for(&self, kid: &str) -> Result<Arc<DecodingKey>, OidcError> {
        let cache = match &self.keys {
            KeySource::Fixed { kid: fixed, key } if fixed == kid => return Ok(key.clone()),
            KeySource::Fixed { .. } => {
                return Err(OidcError::Forbidden(format!("unknown kid {kid}")));
            }
            KeySource::Google { cache } => cache,
        };

        if let Some(key) = cached_key(cache, kid).await {
            return Ok(key);
        }

        // Google rotates keys; an unknown kid forces one refetch.
        let _guard = self.refresh.lock().await;
        if let Some(key) = cached_key(cache, kid).await {
            return Ok(key);
        }
        let fresh = self.fetch_keys().await?;
        let key = fresh.by_kid.get(kid).cloned();
        *cache.write().await = Some(fresh);

        key.ok_or_else(|| OidcError::Forbidden(format!("kid {kid} not in Google JWKS")))
    }

    async fn fetch_keys(&self) -> Result<KeySet, OidcError> {
        tracing::debug!(url = GOOGLE_JWKS_URL, "Fetching Google signing keys");

        let response = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .map_err(|e| OidcError::Transient(format!("JWKS request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(OidcError::Transient(format!(
                "JWKS returned {}",
                response.status()
            )));
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(max_age)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_KEY_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| OidcError::Transient(format!("bad JWKS body: {e}")))?;

        let by_kid: HashMap<_, _> = jwks
            .keys
            .into_iter()
            .filter(Jwk::is_rs256_signing_key)
            .filter_map(|jwk| match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => Some((jwk.kid, Arc::new(key))),
                Err(e) => {
                    tracing::warn!(kid = %jwk.kid, error = %e, "Skipping unusable JWKS key");
                    None
                }
            })
            .collect();

        if by_kid.is_empty() {
            return Err(OidcError::Transient("JWKS had no RS256 keys".to_string()));
        }

        Ok(KeySet {
            by_kid,
            fetched_until: Instant::now() + ttl,
        })
    }
}

async fn cached_key(cache: &RwLock<Option<KeySet>>, kid: &str) -> Option<Arc<DecodingKey>> {
    cache
        .read()
        .await
        .as_ref()
        .filter(|set| set.fetched_until > Instant::now())
        .and_then(|set| set.by_kid.get(kid).cloned())
}

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    #[serde(rename = "use")]
    use_: Option<String>,
    n: String,
    e: String,
}

impl Jwk {
    fn is_rs256_signing_key(&self) -> bool {
        self.kty == "RSA"
            && !self.kid.trim().is_empty()
            && self.alg.as_deref().map_or(true, |alg| alg == "RS256")
            && self.use_.as_deref().map_or(true, |u| u == "sig")
    }
}

#[derive(Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: u64,
    email: Option<String>,
    email_verified: Option<bool>,
}

fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, OidcError> {
    let value = header
        .ok_or_else(|| OidcError::Forbidden("no Authorization header".to_string()))?
        .to_str()
        .map_err(|_| OidcError::Forbidden("Authorization header is not ASCII".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(OidcError::Forbidden("expected a Bearer token".to_string())),
    }
}

/// `max-age` from a Cache-Control header value.
fn max_age(cache_control: &str) -> Option<u64> {
    cache_control
        .split(',')
        .filter_map(|d| d.trim().strip_prefix("max-age="))
        .find_map(|v| v.trim_matches('"').parse().ok())
}
