//! File security pipeline.
//!
//! Uploads pass size and MIME checks, filename sanitization, content
//! hashing, and a signature scan before a handler is allowed to store them.
//! The scan matches a small set of known-bad byte patterns (the EICAR test
//! string among them). It is a screening heuristic, not an antivirus
//! engine; real deployments plug a scanner service in behind the
//! `VirusScanner` trait.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::config::UploadConfig;
use crate::services::error::SecurityError;

/// Outcome of the validation stage. Immutable once computed; consumed by
/// both the handler and the audit logger.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sanitized_name: String,
    pub file_hash: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Outcome of the signature scan.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirusScanResult {
    pub is_clean: bool,
    pub threats: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Store under a hash/timestamp-derived name instead of trusting the
    /// client-supplied one.
    pub generate_unique_file_name: bool,
}

/// Combined result of `secure_upload`. The flattened validation result
/// already carries the content hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecureUploadOutcome {
    pub success: bool,
    /// Name the file would be stored under, present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub validation: FileValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virus_scan: Option<VirusScanResult>,
}

// ============================================================================
// Filename sanitization
// ============================================================================

/// Strip path traversal and disallowed characters from a client-supplied
/// filename. Idempotent: sanitizing a sanitized name is a no-op.
pub fn sanitize_file_name(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    // Path components are never trusted; only the final segment survives.
    let base = normalized.rsplit('/').next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_matches('.');

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// SHA-256 digest of the file bytes, hex-encoded. Independent of filename.
pub fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ============================================================================
// Validation
// ============================================================================

/// Run the ordered validation policy: size, MIME type, name sanitization,
/// content hash. All failures are collected so callers can render
/// field-level feedback in one round trip.
pub fn validate(
    file_name: &str,
    mime_type: &str,
    bytes: &[u8],
    config: &UploadConfig,
) -> FileValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let size_bytes = bytes.len() as u64;
    if size_bytes > config.max_file_size {
        errors.push(
            SecurityError::FileTooLarge {
                size: size_bytes,
                max: config.max_file_size,
            }
            .to_string(),
        );
    }

    let mime_lower = mime_type.to_ascii_lowercase();
    if !config
        .allowed_mime_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&mime_lower))
    {
        errors.push(
            SecurityError::UnsupportedFileType {
                mime: mime_type.to_string(),
            }
            .to_string(),
        );
    }

    let sanitized_name = sanitize_file_name(file_name);
    if sanitized_name != file_name {
        warnings.push(format!(
            "File name was sanitized from '{}' to '{}'",
            file_name, sanitized_name
        ));
    }

    let file_hash = hash_content(bytes);

    FileValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        sanitized_name,
        file_hash,
        size_bytes,
        mime_type: mime_type.to_string(),
    }
}

// ============================================================================
// Signature scanning
// ============================================================================

/// Pluggable scanning capability. The reference implementation matches
/// byte signatures; a production deployment can wrap an external engine.
pub trait VirusScanner: Send + Sync {
    fn scan(&self, bytes: &[u8]) -> VirusScanResult;
}

struct ThreatSignature {
    label: &'static str,
    pattern: &'static [u8],
}

/// Matches content against a fixed set of known-bad byte patterns.
pub struct SignatureScanner {
    signatures: Vec<ThreatSignature>,
}

// The standard antivirus test string. Any scanner worth deploying flags it,
// which makes it the one signature we can rely on end to end.
const EICAR_TEST_SIGNATURE: &[u8] =
    b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

impl SignatureScanner {
    pub fn new() -> Self {
        Self {
            signatures: vec![
                ThreatSignature {
                    label: "EICAR-Test-Signature",
                    pattern: EICAR_TEST_SIGNATURE,
                },
                ThreatSignature {
                    label: "Script-In-Upload",
                    pattern: b"<script>",
                },
            ],
        }
    }
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl VirusScanner for SignatureScanner {
    fn scan(&self, bytes: &[u8]) -> VirusScanResult {
        let threats: Vec<String> = self
            .signatures
            .iter()
            .filter(|sig| contains_pattern(bytes, sig.pattern))
            .map(|sig| sig.label.to_string())
            .collect();

        VirusScanResult {
            is_clean: threats.is_empty(),
            threats,
        }
    }
}

fn contains_pattern(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

// ============================================================================
// Composition
// ============================================================================

/// Validate, scan, and name an upload. `success` is true only when
/// validation passed and the scan came back clean; otherwise the first
/// blocking reason is already in the embedded result.
pub fn secure_upload(
    file_name: &str,
    mime_type: &str,
    bytes: &[u8],
    config: &UploadConfig,
    options: UploadOptions,
    scanner: &dyn VirusScanner,
) -> SecureUploadOutcome {
    let validation = validate(file_name, mime_type, bytes, config);

    if !validation.is_valid {
        return SecureUploadOutcome {
            success: false,
            file_name: None,
            validation,
            virus_scan: None,
        };
    }

    let scan = scanner.scan(bytes);
    if !scan.is_clean {
        let mut validation = validation;
        validation.is_valid = false;
        validation.errors.push(
            SecurityError::MaliciousContentDetected {
                threats: scan.threats.clone(),
            }
            .to_string(),
        );
        return SecureUploadOutcome {
            success: false,
            file_name: None,
            validation,
            virus_scan: Some(scan),
        };
    }

    let stored_name = if options.generate_unique_file_name {
        unique_file_name(&validation.file_hash, &validation.sanitized_name)
    } else {
        validation.sanitized_name.clone()
    };

    SecureUploadOutcome {
        success: true,
        file_name: Some(stored_name),
        validation,
        virus_scan: Some(scan),
    }
}

/// Collision-free stored name derived from content hash and wall clock,
/// never from client input beyond the extension.
fn unique_file_name(file_hash: &str, sanitized_name: &str) -> String {
    let extension = sanitized_name
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{}", ext))
        .unwrap_or_default();
    format!(
        "{}-{}{}",
        Utc::now().timestamp_millis(),
        &file_hash[..16.min(file_hash.len())],
        extension
    )
}
