//! Authentication Module
//!
//! Bearer-token verification for the Renum API. Tokens are issued by the
//! managed auth provider (Supabase) and verified locally: HS256 with
//! `SUPABASE_JWT_SECRET`, expiry checked, audience check disabled to match
//! the provider's `aud = "authenticated"` convention. `sub` is the user id.
//!
//! The authenticated caller is represented by one typed `Principal` value
//! with explicit `{id, role, tenant_id}` fields; handlers never touch raw
//! claims.

use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use renum_core::{TenantId, UserId, UserRole};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// Type-safe JWT secret that prevents accidental logging.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret with validation.
    pub fn new(secret: String) -> ApiResult<Self> {
        if secret.is_empty() {
            return Err(ApiError::internal_error("SUPABASE_JWT_SECRET must not be empty"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Get the length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    /// Check if the secret is empty without exposing it.
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Symmetric key used to verify provider-issued bearer tokens.
    pub jwt_secret: JwtSecret,

    /// Managed auth provider base URL (for the login bridge).
    pub supabase_url: Option<String>,

    /// Public (anon) API key for the managed provider.
    pub supabase_anon_key: Option<String>,

    /// Privileged API key for the managed provider (admin operations only).
    pub supabase_service_role_key: Option<String>,

    /// Token lifetime used when locally minting tokens (dev/tests).
    pub jwt_expiration_secs: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("supabase_url", &self.supabase_url)
            .field(
                "supabase_anon_key",
                &self.supabase_anon_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "supabase_service_role_key",
                &self.supabase_service_role_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .finish()
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `SUPABASE_JWT_SECRET`: symmetric verification key (required)
    /// - `SUPABASE_URL`: provider base URL (login bridge)
    /// - `SUPABASE_ANON_KEY`: provider public key
    /// - `SUPABASE_SERVICE_ROLE_KEY`: provider privileged key
    /// - `RENUM_JWT_EXPIRATION_SECS`: locally minted token lifetime (default 3600)
    pub fn from_env() -> ApiResult<Self> {
        let secret = std::env::var("SUPABASE_JWT_SECRET")
            .map_err(|_| ApiError::internal_error("SUPABASE_JWT_SECRET is not set"))?;

        Ok(Self {
            jwt_secret: JwtSecret::new(secret)?,
            supabase_url: std::env::var("SUPABASE_URL").ok(),
            supabase_anon_key: std::env::var("SUPABASE_ANON_KEY").ok(),
            supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            jwt_expiration_secs: std::env::var("RENUM_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
        })
    }

    /// Configuration with an explicit secret; used by tests.
    pub fn with_secret(secret: &str) -> ApiResult<Self> {
        Ok(Self {
            jwt_secret: JwtSecret::new(secret.to_string())?,
            supabase_url: None,
            supabase_anon_key: None,
            supabase_service_role_key: None,
            jwt_expiration_secs: 3600,
        })
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

/// Claims carried by provider-issued tokens. Only the fields the backend
/// reads are modeled; everything else passes through unvalidated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Expiry (seconds since epoch). Always enforced.
    pub exp: i64,
    /// Audience; the provider sets "authenticated". Not validated.
    #[serde(default)]
    pub aud: Option<String>,
    /// Provider role claim; informational only, the profile row is
    /// authoritative for authorization.
    #[serde(default)]
    pub role: Option<String>,
    /// Email claim, when present.
    #[serde(default)]
    pub email: Option<String>,
}

/// Validate a bearer token and extract the user id.
pub fn validate_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Supabase issues aud = "authenticated"; the backend does not segment
    // audiences, so the check stays off.
    validation.validate_aud = false;
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.expose().as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ApiError::unauthenticated("Token has expired")
        }
        _ => ApiError::unauthenticated(format!("Invalid token: {}", e)),
    })?;

    Ok(data.claims)
}

/// Mint a token locally (dev tooling and tests).
pub fn generate_token(config: &AuthConfig, user_id: UserId) -> ApiResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + config.jwt_expiration_secs,
        aud: Some("authenticated".to_string()),
        role: None,
        email: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.expose().as_bytes()),
    )
    .map_err(|e| ApiError::internal_error(format!("Failed to sign token: {}", e)))
}

// ============================================================================
// PRINCIPAL
// ============================================================================

/// The authenticated caller. One typed value, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub role: UserRole,
    /// Bound tenant; `None` only for platform admins.
    pub tenant_id: Option<TenantId>,
}

impl Principal {
    /// The tenant scope this principal operates in.
    ///
    /// Platform admins may act on behalf of a tenant via the `X-Tenant-ID`
    /// header, resolved by the middleware into `tenant_id`; a missing scope
    /// here is a request error, not a programming error.
    pub fn require_tenant(&self) -> ApiResult<TenantId> {
        self.tenant_id.ok_or_else(|| {
            ApiError::validation("This operation requires a tenant scope (X-Tenant-ID)")
        })
    }

    /// Whether this principal is a platform admin.
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

// =============================================================================
// TESTS
// =============================================================================
