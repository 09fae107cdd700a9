//! Authentication Consumption
//!
//! The dispatch core does not establish identities; it consumes them. A
//! caller is recognised by one of:
//! 1. an API key (via the `X-API-Key` header), mapped to a person code;
//! 2. a JWT (via `Authorization: Bearer`), whose `sub` is a person code.
//!
//! Either way the result is an [`AuthUser`] handed to the permission check.

use std::collections::HashMap;
use std::sync::Arc;

use inkwell_core::AuthUser;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::constants::MIN_JWT_SECRET_LENGTH;
use crate::error::{ApiError, ApiResult};
use crate::service::ServiceHandle;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for JWT time validation.
///
/// Expiry is checked here rather than inside `jsonwebtoken`, so tests can
/// pin the time and a broken system clock surfaces as an error.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds (negative before 1970).
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// JWT SECRET
// ============================================================================

/// JWT secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    pub fn new(secret: String) -> ApiResult<Self> {
        if secret.is_empty() {
            return Err(ApiError::missing_field("jwt_secret"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

fn build_jwt_secret(secret_str: String) -> JwtSecret {
    let normalized = if secret_str.trim().is_empty() {
        INSECURE_DEFAULT_SECRET.to_string()
    } else {
        secret_str
    };
    JwtSecret::new(normalized)
        .unwrap_or_else(|_| JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into())))
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// API key → person code.
    pub api_keys: HashMap<String, String>,

    pub jwt_secret: JwtSecret,

    /// JWT algorithm (default: HS256)
    pub jwt_algorithm: Algorithm,

    /// Lifetime of generated tokens in seconds (default: 1 hour)
    pub jwt_expiration_secs: i64,

    /// Tolerated clock drift in seconds (default: 60)
    pub jwt_clock_skew_secs: i64,

    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &format!("[{} keys]", self.api_keys.len()))
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let secret_str =
            std::env::var("INKWELL_JWT_SECRET").unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            api_keys: HashMap::new(),
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `INKWELL_JWT_SECRET`: JWT signing secret
    /// - `INKWELL_API_KEYS`: Comma-separated `key=personCode` pairs
    /// - `INKWELL_JWT_EXPIRATION_SECS`: Token lifetime (default: 3600)
    /// - `INKWELL_JWT_CLOCK_SKEW_SECS`: Clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_keys = std::env::var("INKWELL_API_KEYS")
            .map(|s| parse_api_keys(&s))
            .unwrap_or_default();

        Self {
            api_keys,
            jwt_expiration_secs: std::env::var("INKWELL_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jwt_expiration_secs),
            jwt_clock_skew_secs: std::env::var("INKWELL_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jwt_clock_skew_secs),
            ..defaults
        }
    }

    /// Refuse insecure secrets in production; warn about them elsewhere.
    pub fn validate_for_production(&self, environment: &str) -> ApiResult<()> {
        let environment = environment.to_lowercase();
        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Cannot start server in production with insecure JWT secret. \
                     Set INKWELL_JWT_SECRET to a secure value. INKWELL_ENVIRONMENT={}",
                    environment
                )));
            }
            tracing::warn!(
                "Using insecure default JWT secret. Set INKWELL_JWT_SECRET before deploying."
            );
        } else if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least {} characters long.",
                    self.jwt_secret.len(),
                    MIN_JWT_SECRET_LENGTH
                )));
            }
            tracing::warn!(
                length = self.jwt_secret.len(),
                "JWT secret is shorter than {} characters",
                MIN_JWT_SECRET_LENGTH
            );
        }

        Ok(())
    }

    pub fn add_api_key(&mut self, key: impl Into<String>, person_code: impl Into<String>) {
        self.api_keys.insert(key.into(), person_code.into());
    }

    /// Person code bound to an API key.
    pub fn person_for_api_key(&self, key: &str) -> Option<&str> {
        self.api_keys.get(key).map(String::as_str)
    }
}

/// Parse `key=code,key2=code2`. Malformed pairs are skipped.
fn parse_api_keys(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, code) = pair.split_once('=')?;
            let (key, code) = (key.trim(), code.trim());
            (!key.is_empty() && !code.is_empty()).then(|| (key.to_string(), code.to_string()))
        })
        .collect()
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// JWT claims consumed by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Person code of the caller.
    pub sub: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub roles: Vec<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(person_code: String, username: String, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            sub: person_code,
            username,
            roles: Vec::new(),
            iat: now,
            exp: now + expiration_secs,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn is_expired(&self, clock: &dyn JwtClock) -> bool {
        self.exp < clock.now_epoch_secs()
    }
}

// ============================================================================
// TOKENS
// ============================================================================

/// Validate a JWT and return its claims.
///
/// `jsonwebtoken` checks the signature only; expiry is checked against the
/// configured clock with the configured skew.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let claims = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidToken => ApiError::invalid_token("Token is invalid"),
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?
        .claims;

    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(timestamp = now, "System clock returned pre-epoch time");
        return Err(ApiError::internal_error("Server time configuration error"));
    }
    if claims.exp < now - config.jwt_clock_skew_secs {
        return Err(ApiError::invalid_token("Token has expired"));
    }

    Ok(claims)
}

/// Sign a token for a person.
pub fn generate_jwt_token(
    config: &AuthConfig,
    person_code: &str,
    username: &str,
    roles: Vec<String>,
) -> ApiResult<String> {
    let claims = Claims::new(
        person_code.to_string(),
        username.to_string(),
        config.jwt_expiration_secs,
        &*config.clock,
    )
    .with_roles(roles);

    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    encode(&Header::new(config.jwt_algorithm), &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Credential presented by a request, before it is tied to a person.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    ApiKey { person_code: String },
    Jwt(Claims),
}

/// Read the credential from the request headers.
///
/// `Ok(None)` means no credential was presented. The API key wins when
/// both headers are present.
pub fn extract_credential(
    config: &AuthConfig,
    api_key_header: Option<&str>,
    auth_header: Option<&str>,
) -> ApiResult<Option<Credential>> {
    if let Some(api_key) = api_key_header {
        return config
            .person_for_api_key(api_key)
            .map(|code| {
                Some(Credential::ApiKey {
                    person_code: code.to_string(),
                })
            })
            .ok_or_else(|| ApiError::unauthorized("Invalid API key"));
    }

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => Ok(Some(Credential::Jwt(validate_jwt_token(config, token.trim())?))),
            None => Err(ApiError::invalid_token("Authorization header must use Bearer scheme")),
        },
        None => Ok(None),
    }
}

/// Turn a credential into an [`AuthUser`].
///
/// Tokens are trusted for username and roles. API keys only name a person,
/// so the person record supplies them.
pub async fn resolve_user(credential: Credential, persons: &ServiceHandle) -> ApiResult<AuthUser> {
    match credential {
        Credential::Jwt(claims) => {
            let id = persons
                .decode_id(&claims.sub)
                .map_err(|_| ApiError::invalid_token("Token subject is not a person code"))?;
            let mut user = AuthUser::new(id, claims.sub, claims.username);
            user.roles = claims.roles;
            Ok(user)
        }
        Credential::ApiKey { person_code } => {
            let id = persons
                .decode_id(&person_code)
                .map_err(|_| ApiError::unauthorized("API key is bound to an invalid person code"))?;
            let person = persons
                .get_by_id(id)
                .await?
                .ok_or_else(|| ApiError::unauthorized("API key is bound to an unknown person"))?;

            let username = person
                .get("username")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            let mut user = AuthUser::new(id, person_code, username);
            user.roles = person
                .get("roles")
                .and_then(JsonValue::as_array)
                .map(|roles| roles.iter().filter_map(|r| r.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            Ok(user)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
