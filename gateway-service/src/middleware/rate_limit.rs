//! Per-route rate limiting middleware.
//!
//! Keys the shared fixed-window limiter on caller identity (user id when
//! authenticated, source address otherwise) plus the matched route, so one
//! caller hammering one route cannot starve anyone else.

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use service_core::error::AppError;
use std::time::Duration;

use crate::AppState;
use crate::middleware::policy::{RateLimitPolicy, RoutePolicy};
use crate::models::{AuditAction, AuditLogEntry};
use crate::services::{AuthContext, SecurityError, extract_audit_context};
use service_core::middleware::rate_limit::RateDecision;

fn client_address(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|axum::extract::ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.features.enable_rate_limiting {
        return Ok(next.run(req).await);
    }

    let policy = req
        .extensions()
        .get::<RoutePolicy>()
        .copied()
        .unwrap_or_default();
    let quota = policy.rate_limit.unwrap_or(RateLimitPolicy {
        max_requests: state.config.rate_limit.default_max_requests,
        window_ms: state.config.rate_limit.default_window_ms,
    });

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let context = req.extensions().get::<AuthContext>();
    let caller = match context.and_then(|c| c.user_id()) {
        Some(user_id) => format!("user:{}", user_id),
        None => format!("ip:{}", client_address(&req)),
    };
    let key = format!("{}:{}", caller, route);

    let decision = state.route_limiter.check(
        &key,
        quota.max_requests,
        Duration::from_millis(quota.window_ms),
    );

    match decision {
        RateDecision::Allowed { .. } => Ok(next.run(req).await),
        RateDecision::Denied { retry_after } => {
            tracing::warn!(caller = %caller, route = %route, "Rate limit exceeded");
            counter!("rate_limit_trips_total", &[("route", route.clone())]).increment(1);

            let audit_ctx = extract_audit_context(
                req.headers(),
                context.and_then(|c| c.session_id()).map(|s| s.to_string()),
            );
            state.audit.record(
                AuditLogEntry::new(
                    context.and_then(|c| c.user_id()),
                    AuditAction::RateLimitExceeded,
                    "routes",
                    Some(route),
                ),
                &audit_ctx,
            );

            let mut response =
                AppError::from(SecurityError::RateLimitExceeded { retry_after }).into_response();
            response
                .headers_mut()
                .insert("x-ratelimit-limit", HeaderValue::from(quota.max_requests));
            Ok(response)
        }
    }
}
