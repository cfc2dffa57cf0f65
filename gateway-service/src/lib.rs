pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use metrics_exporter_prometheus::PrometheusHandle;
use service_core::axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{FixedWindowLimiter, IpRateLimiter, ip_rate_limit_middleware},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::GatewayConfig;
use crate::middleware::RoutePolicy;
use crate::models::Role;
use crate::services::{
    AuditLogger, AuthResolver, IdentityStore, OfflineAuthCache, OwnershipStore, RetryQueue,
    VirusScanner,
};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::session::sign_in,
        handlers::session::refresh_session,
        handlers::session::sign_out,
        handlers::session::reconnect,
        handlers::upload::upload_file,
        handlers::audit::list_audit_events,
    ),
    components(
        schemas(
            handlers::session::SignInRequest,
            handlers::session::SessionResponse,
            models::User,
            models::Role,
            models::SessionRecord,
            models::AuditLogEntry,
            services::FileValidationResult,
            services::VirusScanResult,
            services::SecureUploadOutcome,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Session", description = "Session lifecycle against the identity store"),
        (name = "Files", description = "Screened uploads"),
        (name = "Audit", description = "Audit trail queries"),
        (name = "Internal", description = "Operational surface"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Opaque session token issued by the identity store"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub identity: Arc<dyn IdentityStore>,
    pub resolver: AuthResolver,
    pub offline_cache: Arc<OfflineAuthCache>,
    pub retry_queue: Arc<RetryQueue>,
    pub audit: AuditLogger,
    pub ownership: Arc<dyn OwnershipStore>,
    pub scanner: Arc<dyn VirusScanner>,
    pub route_limiter: Arc<FixedWindowLimiter>,
    pub login_rate_limiter: IpRateLimiter,
    pub metrics_handle: PrometheusHandle,
}

/// Attach a declared policy to a route group. The stack reads, in order:
/// policy extension, role enforcement, then the per-route quota; the
/// global auth middleware has already resolved the context by then.
fn with_policy(
    router: Router<AppState>,
    state: &AppState,
    policy: RoutePolicy,
) -> Router<AppState> {
    router
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .route_layer(from_fn_with_state(state.clone(), middleware::rbac_middleware))
        .route_layer(Extension(policy))
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Sign-in gets the credential-guessing throttle on top of its policy.
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::session::sign_in))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let session_routes = Router::new()
        .route("/auth/logout", post(handlers::session::sign_out))
        .route("/auth/refresh", post(handlers::session::refresh_session));

    let student_routes = with_policy(
        Router::new().route("/api/recommendations", get(handlers::guidance::recommendations)),
        &state,
        RoutePolicy::roles(&[Role::Student]),
    );

    let profile_routes = with_policy(
        Router::new().route(
            "/api/students/:id/profile",
            get(handlers::guidance::student_profile),
        ),
        &state,
        RoutePolicy::authenticated(),
    );

    let admin_routes = with_policy(
        Router::new()
            .route("/api/admin/reports", get(handlers::guidance::admin_reports))
            .route("/audit/events", get(handlers::audit::list_audit_events))
            .route("/internal/reconnect", post(handlers::session::reconnect)),
        &state,
        RoutePolicy::roles(&[Role::Admin]),
    );

    // Uploads may legitimately exceed axum's default body cap; the pipeline
    // itself enforces the configured maximum with a structured error.
    let upload_body_cap = (state.config.upload.max_file_size as usize)
        .saturating_mul(2)
        .max(1024 * 1024);
    let upload_routes = with_policy(
        Router::new()
            .route("/files/upload", post(handlers::upload::upload_file))
            .route_layer(DefaultBodyLimit::max(upload_body_cap)),
        &state,
        RoutePolicy::authenticated(),
    );

    let metrics_handle = state.metrics_handle.clone();

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        );

    let swagger_enabled = match state.config.environment {
        crate::config::Environment::Dev => true,
        crate::config::Environment::Prod => match state.config.swagger.enabled {
            crate::config::SwaggerMode::Public | crate::config::SwaggerMode::Authenticated => true,
            crate::config::SwaggerMode::Disabled => false,
        },
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .merge(login_route)
        .merge(session_routes)
        .merge(student_routes)
        .merge(profile_routes)
        .merge(admin_routes)
        .merge(upload_routes)
        .with_state(state.clone())
        // Resolve the caller's identity before any policy runs.
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<service_core::axum::http::HeaderValue>()
                                .unwrap_or_else(|e| {
                                    tracing::error!(
                                        "Invalid CORS origin '{}': {}. Using fallback.",
                                        o,
                                        e
                                    );
                                    service_core::axum::http::HeaderValue::from_static("*")
                                })
                        })
                        .collect::<Vec<service_core::axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::DELETE,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::AUTHORIZATION,
                    service_core::axum::http::header::CONTENT_TYPE,
                    service_core::axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or running degraded"),
        (status = 500, description = "Audit store unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    state.audit.store().health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Audit store health check failed");
        AppError::InternalError(anyhow::anyhow!("Audit store unreachable"))
    })?;

    let identity_online = state.resolver.is_online();

    Ok(service_core::axum::Json(serde_json::json!({
        "status": if identity_online { "healthy" } else { "degraded" },
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "audit_store": "up",
            "identity_store": if identity_online { "up" } else { "degraded" }
        }
    })))
}
