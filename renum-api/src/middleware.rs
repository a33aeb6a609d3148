//! Axum Middleware for Authentication and Rate Limiting
//!
//! The auth middleware verifies the bearer token, resolves the backing
//! profile row into one typed `Principal {id, role, tenant_id}`, and injects
//! it into request extensions. Handlers extract `Extension<Principal>` and
//! never touch raw claims.
//!
//! Platform admins carry no tenant of their own; they may act inside a
//! tenant by sending `X-Tenant-ID`, which the middleware resolves into the
//! principal's tenant scope.

use crate::auth::{validate_token, AuthConfig, Principal};
use crate::db::Gateway;
use crate::error::{ApiError, ErrorKind};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter,
};
use renum_core::{TenantId, UserId, UserRole};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Keyed limiter: one bucket per tenant (per user for unbound admins).
pub type TenantRateLimiter = RateLimiter<uuid::Uuid, DefaultKeyedStateStore<uuid::Uuid>, DefaultClock>;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the auth middleware.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
    pub gateway: Gateway,
    /// `None` when rate limiting is disabled.
    pub limiter: Option<Arc<TenantRateLimiter>>,
}

impl AuthMiddlewareState {
    /// Create middleware state, building the limiter from config.
    pub fn new(auth_config: Arc<AuthConfig>, gateway: Gateway, config: &crate::config::ApiConfig) -> Self {
        let limiter = if config.rate_limit_enabled {
            let per_minute = NonZeroU32::new(config.rate_limit_per_minute.max(1))
                .unwrap_or(NonZeroU32::new(1).unwrap());
            let burst = NonZeroU32::new(config.rate_limit_burst.max(1))
                .unwrap_or(NonZeroU32::new(1).unwrap());
            let quota = Quota::per_minute(per_minute).allow_burst(burst);
            Some(Arc::new(RateLimiter::keyed(quota)))
        } else {
            None
        };
        Self {
            auth_config,
            gateway,
            limiter,
        }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Authenticate the request and inject a `Principal`.
///
/// 1. Extract `Authorization: Bearer` and verify the token (HS256, expiry).
/// 2. Load the profile row for `sub`; the profile is authoritative for role
///    and tenant binding.
/// 3. Resolve the admin `X-Tenant-ID` override when present.
/// 4. Enforce the per-tenant rate limit.
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiError::unauthenticated("Missing Authorization: Bearer header").into_response()
        })?;

    let claims = validate_token(&state.auth_config, token).map_err(IntoResponse::into_response)?;

    let user_id: UserId = claims
        .sub
        .parse()
        .map_err(|_| ApiError::unauthenticated("Token subject is not a user id").into_response())?;

    let profile = state
        .gateway
        .profile_get(user_id)
        .await
        .map_err(|e| ApiError::from(e).into_response())?
        .ok_or_else(|| {
            ApiError::unauthenticated("No profile for authenticated user").into_response()
        })?;

    let tenant_override = request
        .headers()
        .get("x-tenant-id")
        .and_then(|h| h.to_str().ok())
        .map(|raw| raw.parse::<TenantId>())
        .transpose()
        .map_err(|_| ApiError::validation("X-Tenant-ID is not a UUID").into_response())?;

    let tenant_id = match (profile.role, tenant_override) {
        // Admins may step into any tenant.
        (UserRole::Admin, Some(tenant)) => Some(tenant),
        (UserRole::Admin, None) => profile.tenant_id,
        // Everyone else is pinned to their own tenant; a mismatched header
        // is a scope violation, reported as if the resource did not exist.
        (_, Some(requested)) if Some(requested) != profile.tenant_id => {
            tracing::warn!(
                audit = "tenant_scope",
                user_id = %profile.user_id,
                requested_tenant = %requested,
                "Tenant header outside caller scope"
            );
            return Err(ApiError::not_found("Tenant not found").into_response());
        }
        _ => profile.tenant_id,
    };

    if let Some(limiter) = &state.limiter {
        let key = tenant_id.unwrap_or(profile.user_id);
        if limiter.check_key(&key).is_err() {
            return Err(
                ApiError::new(ErrorKind::RateLimited, "Rate limit exceeded").into_response()
            );
        }
    }

    let principal = Principal {
        id: profile.user_id,
        role: profile.role,
        tenant_id,
    };
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use governor::Quota;
    use std::num::NonZeroU32;

    #[test]
    fn test_limiter_allows_burst_then_throttles() {
        let quota = Quota::per_minute(NonZeroU32::new(2).unwrap());
        let limiter: TenantRateLimiter = RateLimiter::keyed(quota);
        let tenant = renum_core::new_entity_id();

        assert!(limiter.check_key(&tenant).is_ok());
        assert!(limiter.check_key(&tenant).is_ok());
        assert!(limiter.check_key(&tenant).is_err());

        // Other tenants are unaffected.
        let other = renum_core::new_entity_id();
        assert!(limiter.check_key(&other).is_ok());
    }
}
