//! Services layer for the security gateway.
//!
//! Each capability lives behind its own module: identity resolution,
//! offline continuity, replay of interrupted auth mutations, access
//! control, upload screening, audit persistence, and ownership lookups.

pub mod audit;
pub mod auth;
pub mod error;
pub mod file_security;
pub mod identity;
pub mod offline_cache;
pub mod ownership;
pub mod rbac;
pub mod retry_queue;

pub use audit::{AuditContext, AuditLogger, AuditQuery, AuditStore, MemoryAuditStore, PgAuditStore, extract_audit_context};
pub use auth::{AuthContext, AuthResolver};
pub use error::SecurityError;
pub use file_security::{
    FileValidationResult, SecureUploadOutcome, SignatureScanner, UploadOptions, VirusScanResult,
    VirusScanner, sanitize_file_name, secure_upload,
};
pub use identity::{
    ErrorClass, HttpIdentityStore, IdentityError, IdentityStore, InMemoryIdentityStore, StoreFault,
};
pub use offline_cache::{CachedAuthState, ConnectivityMonitor, OfflineAuthCache};
pub use ownership::{MemoryOwnershipStore, OwnershipStore, SqlOwnershipStore};
pub use rbac::{AccessDecision, DenyReason, enforce};
pub use retry_queue::{DrainReport, RetryQueue, RetryQueueConfig, UnconfirmedAction};
