//! Test helper module for gateway-service integration tests.
//!
//! Builds the full router against in-memory stores so tests exercise the
//! real middleware pipeline without PostgreSQL or an identity service.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use gateway_service::{
    AppState, build_router,
    config::{
        AuthPolicyConfig, DatabaseConfig, Environment, FeatureFlags, GatewayConfig,
        IdentityStoreConfig, RateLimitConfig, RetryPolicyConfig, SecurityConfig, SwaggerConfig,
        SwaggerMode, UploadConfig,
    },
    models::{Role, User},
    services::{
        AuditLogger, AuditStore, AuthResolver, ConnectivityMonitor, InMemoryIdentityStore,
        MemoryAuditStore, MemoryOwnershipStore, OfflineAuthCache, RetryQueue, RetryQueueConfig,
        SignatureScanner,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use service_core::middleware::rate_limit::{FixedWindowLimiter, create_ip_rate_limiter};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const STUDENT_TOKEN: &str = "tok-student";
pub const COUNSELOR_TOKEN: &str = "tok-counselor";
pub const ADMIN_TOKEN: &str = "tok-admin";

/// The standard antivirus test string, for exercising the scanner.
pub const EICAR: &str = "X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub identity: Arc<InMemoryIdentityStore>,
    pub audit_store: Arc<MemoryAuditStore>,
    pub ownership: Arc<MemoryOwnershipStore>,
    pub student: User,
    pub counselor: User,
    pub admin: User,
}

/// Audit store that always fails, for proving writes never surface.
pub struct FailingAuditStore;

#[async_trait::async_trait]
impl AuditStore for FailingAuditStore {
    async fn append(
        &self,
        _entry: gateway_service::models::AuditLogEntry,
    ) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("injected audit store failure"))
    }

    async fn list(
        &self,
        _query: gateway_service::services::AuditQuery,
    ) -> Result<Vec<gateway_service::models::AuditLogEntry>, anyhow::Error> {
        Err(anyhow::anyhow!("injected audit store failure"))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("injected audit store failure"))
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with config tweaks applied before the router is built.
    pub async fn spawn_with(tweak: impl FnOnce(&mut GatewayConfig)) -> Self {
        Self::spawn_with_store(tweak, None).await
    }

    /// Spawn with config tweaks and an optional replacement audit store.
    pub async fn spawn_with_store(
        tweak: impl FnOnce(&mut GatewayConfig),
        audit_override: Option<Arc<dyn AuditStore>>,
    ) -> Self {
        let mut config = create_test_config();
        tweak(&mut config);

        let identity = Arc::new(InMemoryIdentityStore::new());
        let student = User::new(Uuid::new_v4(), "student@eduniti.in", Role::Student);
        let counselor = User::new(Uuid::new_v4(), "counselor@eduniti.in", Role::Counselor);
        let admin = User::new(Uuid::new_v4(), "admin@eduniti.in", Role::Admin);
        identity.insert_session(STUDENT_TOKEN, student.clone());
        identity.insert_session(COUNSELOR_TOKEN, counselor.clone());
        identity.insert_session(ADMIN_TOKEN, admin.clone());
        identity.register_account("student@eduniti.in", "pass@word1", student.clone());

        let offline_cache = Arc::new(OfflineAuthCache::new(chrono::Duration::minutes(
            config.auth.session_timeout_minutes,
        )));
        let connectivity = Arc::new(ConnectivityMonitor::new());
        let retry_queue = Arc::new(RetryQueue::new(RetryQueueConfig {
            max_attempts: config.retry.max_attempts,
            max_drain_passes: config.retry.max_drain_passes,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }));
        let resolver = AuthResolver::new(
            identity.clone(),
            offline_cache.clone(),
            connectivity,
            retry_queue.clone(),
        );

        let audit_store = Arc::new(MemoryAuditStore::new());
        let audit = AuditLogger::new(
            audit_override.unwrap_or_else(|| audit_store.clone() as Arc<dyn AuditStore>),
            config.features.enable_audit_logging,
        );
        let ownership = Arc::new(MemoryOwnershipStore::new());

        let state = AppState {
            config: config.clone(),
            identity: identity.clone(),
            resolver,
            offline_cache,
            retry_queue,
            audit,
            ownership: ownership.clone(),
            scanner: Arc::new(SignatureScanner::new()),
            route_limiter: Arc::new(FixedWindowLimiter::new()),
            login_rate_limiter: create_ip_rate_limiter(
                config.auth.max_login_attempts,
                config.auth.login_window_seconds,
            ),
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
        };

        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        TestApp {
            router,
            state,
            identity,
            audit_store,
            ownership,
            student,
            counselor,
            admin,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// GET with a spoofed client address in `x-forwarded-for`.
    pub async fn get_from(&self, uri: &str, token: Option<&str>, client_ip: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("GET")
            .uri(uri)
            .header("x-forwarded-for", client_ip)
            .header("User-Agent", "eduniti-tests/1.0");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// POST JSON with a spoofed client address in `x-forwarded-for`.
    pub async fn post_json_from(
        &self,
        uri: &str,
        token: Option<&str>,
        client_ip: &str,
        body: &str,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .header("x-forwarded-for", client_ip);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    /// Multipart upload of a single "file" field.
    pub async fn upload(
        &self,
        uri: &str,
        token: Option<&str>,
        file_name: &str,
        mime: &str,
        content: &[u8],
    ) -> Response<Body> {
        let boundary = "eduniti-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            );
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    /// Wait out the spawned audit write tasks, then return recorded entries.
    pub async fn audit_entries(&self) -> Vec<gateway_service::models::AuditLogEntry> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.audit_store.entries()
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

pub fn create_test_config() -> GatewayConfig {
    GatewayConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "gateway-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost:5432/gateway_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        identity_store: IdentityStoreConfig {
            url: "http://localhost:9100".to_string(),
            timeout_seconds: 1,
        },
        auth: AuthPolicyConfig {
            session_timeout_minutes: 30,
            max_login_attempts: 100,
            login_window_seconds: 60,
        },
        rate_limit: RateLimitConfig {
            default_max_requests: 1000,
            default_window_ms: 60_000,
        },
        upload: UploadConfig {
            max_file_size: 10 * 1024 * 1024,
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "image/png".to_string(),
                "text/plain".to_string(),
            ],
        },
        features: FeatureFlags {
            enable_audit_logging: true,
            enable_rate_limiting: true,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        retry: RetryPolicyConfig {
            max_attempts: 3,
            max_drain_passes: 3,
        },
    }
}
