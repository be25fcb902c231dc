// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in: ID-token verification and the provider-side session.

use crate::config::Config;
use crate::error::AppError;
use crate::models::Identity;
use crate::session::KeyValueStore;
use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Mutex, RwLock};

const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Key under which the signed-in identity is kept between runs.
pub const IDENTITY_KEY: &str = "study_hub_identity";

/// Identity provider failure categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    /// The credential is missing, malformed, expired or for another app.
    #[error("credential rejected: {0}")]
    Rejected(String),
    /// The provider could not be reached; the user may try again.
    #[error("identity provider unavailable: {0}")]
    Transient(String),
    #[error("identity session storage failed: {0}")]
    Session(String),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        AppError::SignInFailed(err.to_string())
    }
}

/// Federated sign-in provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Prove an identity from a provider credential.
    async fn sign_in(&self, credential: &str) -> Result<Identity, IdentityError>;

    /// End the provider session.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Identity of the current provider session, if any.
    fn current(&self) -> Option<Identity>;

    /// Watch the provider session. The receiver starts at the current value
    /// and sees every later sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

#[derive(Clone)]
enum KeySource {
    Google,
    Static {
        kid: String,
        decoding_key: Arc<DecodingKey>,
    },
}

struct CachedKeys {
    by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Google Identity Services sign-in.
///
/// The browser obtains a Google ID token and hands it over as the sign-in
/// credential; the token is verified against Google's published keys.
pub struct GoogleSignIn {
    http_client: reqwest::Client,
    client_id: String,
    keys: KeySource,
    key_cache: RwLock<Option<CachedKeys>>,
    refresh_lock: Mutex<()>,
    kv: Arc<dyn KeyValueStore>,
    session: watch::Sender<Option<Identity>>,
}

impl GoogleSignIn {
    /// Create a provider that discovers and caches Google's signing keys.
    pub fn new(config: &Config, kv: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        Self::build(config, kv, KeySource::Google)
    }

    /// Create a provider that trusts one static RSA public key.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn new_with_static_key(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        kid: impl Into<String>,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static signing key id must not be empty");
        }
        Self::build(
            config,
            kv,
            KeySource::Static {
                kid,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn build(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        keys: KeySource,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building sign-in HTTP client")?;

        let restored = restore_identity(kv.as_ref());
        if let Some(identity) = &restored {
            tracing::info!(user_id = %identity.id, "Resumed Google sign-in session");
        }
        let (session, _) = watch::channel(restored);

        tracing::info!(client_id = %config.google_client_id, "Initialized Google sign-in");

        Ok(Self {
            http_client,
            client_id: config.google_client_id.clone(),
            keys,
            key_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            kv,
            session,
        })
    }

    /// Verify a Google ID token issued to this app and extract the identity.
    pub async fn verify_id_token(&self, token: &str) -> Result<Identity, IdentityError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::Rejected("credential is empty".to_string()));
        }

        let header = decode_header(token)
            .map_err(|e| IdentityError::Rejected(format!("invalid JWT header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Rejected(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Rejected("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<GoogleIdTokenClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| IdentityError::Rejected(format!("JWT validation failed: {e}")))?
            .claims;

        identity_from_claims(claims, now_unix_secs())
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, IdentityError> {
        if let KeySource::Static {
            kid: static_kid,
            decoding_key,
        } = &self.keys
        {
            return if kid == static_kid {
                Ok(decoding_key.clone())
            } else {
                Err(IdentityError::Rejected(format!(
                    "unknown JWT kid for static key: {kid}"
                )))
            };
        }

        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }

        // Google rotates keys; a miss on fresh keys forces one more fetch.
        for force in [false, true] {
            self.refresh_keys(force).await?;
            if let Some(key) = self.cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(IdentityError::Rejected(format!(
            "JWT kid not found in Google keys: {kid}"
        )))
    }

    async fn cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.key_cache.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > Instant::now())
            .and_then(|entry| entry.by_kid.get(kid))
            .cloned()
    }

    async fn refresh_keys(&self, force: bool) -> Result<(), IdentityError> {
        let _guard = self.refresh_lock.lock().await;

        if !force
            && self
                .key_cache
                .read()
                .await
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
        {
            return Ok(());
        }

        let jwks_uri = self.jwks_uri().await;
        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing Google signing keys");

        let response = self
            .http_client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::Transient(format!("JWKS request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(IdentityError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);
        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| IdentityError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let by_kid = usable_keys(jwks);
        if by_kid.is_empty() {
            return Err(IdentityError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.key_cache.write().await = Some(CachedKeys {
            by_kid,
            expires_at: Instant::now() + ttl,
        });
        tracing::debug!(ttl_secs = ttl.as_secs(), "Google signing keys refreshed");
        Ok(())
    }

    /// JWKS location from OpenID discovery, falling back to the well-known URL.
    async fn jwks_uri(&self) -> String {
        let discovered = async {
            let resp = self.http_client.get(DISCOVERY_URL).send().await.ok()?;
            if !resp.status().is_success() {
                return None;
            }
            resp.json::<OpenIdConfig>().await.ok().map(|c| c.jwks_uri)
        }
        .await;

        discovered.unwrap_or_else(|| {
            tracing::warn!("OIDC discovery failed; using fallback JWKS URI");
            DEFAULT_JWKS_URL.to_string()
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleSignIn {
    async fn sign_in(&self, credential: &str) -> Result<Identity, IdentityError> {
        let identity = self.verify_id_token(credential).await?;

        let encoded = serde_json::to_string(&identity)
            .map_err(|e| IdentityError::Session(e.to_string()))?;
        self.kv
            .set(IDENTITY_KEY, &encoded)
            .map_err(|e| IdentityError::Session(e.to_string()))?;

        tracing::info!(user_id = %identity.id, "Google sign-in succeeded");
        self.session.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.kv
            .remove(IDENTITY_KEY)
            .map_err(|e| IdentityError::Session(e.to_string()))?;
        self.session.send_replace(None);
        tracing::info!("Google session ended");
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

fn restore_identity(kv: &dyn KeyValueStore) -> Option<Identity> {
    let raw = match kv.get(IDENTITY_KEY) {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read stored sign-in session");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring corrupt stored sign-in session");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    iat: Option<u64>,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

/// RS256 signing keys from a JWKS document, keyed by `kid`.
fn usable_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    jwks.keys
        .into_iter()
        .filter(|jwk| jwk.kty == "RSA" && !jwk.kid.trim().is_empty())
        .filter(|jwk| jwk.alg.as_deref().is_none_or(|alg| alg == "RS256"))
        .filter(|jwk| jwk.use_.as_deref().is_none_or(|u| u == "sig"))
        .filter_map(|jwk| match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => Some((jwk.kid, Arc::new(key))),
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
                None
            }
        })
        .collect()
}

/// Claim checks that `jsonwebtoken` does not do for us.
fn identity_from_claims(
    claims: GoogleIdTokenClaims,
    now: u64,
) -> Result<Identity, IdentityError> {
    let Some(iat) = claims.iat else {
        return Err(IdentityError::Rejected("missing iat claim".to_string()));
    };
    if iat > now + CLOCK_SKEW_SECS {
        return Err(IdentityError::Rejected(
            "iat claim is in the future".to_string(),
        ));
    }
    if claims.sub.trim().is_empty() {
        return Err(IdentityError::Rejected("empty sub claim".to_string()));
    }
    if claims.email.is_some() && claims.email_verified == Some(false) {
        return Err(IdentityError::Rejected(
            "email_verified claim is false".to_string(),
        ));
    }

    Ok(Identity {
        id: claims.sub,
        display_name: claims.name,
        email: claims.email,
        photo_url: claims.picture,
    })
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse::<u64>().ok())
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
