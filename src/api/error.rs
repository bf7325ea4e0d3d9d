//! JSON-RPC error taxonomy.
//!
//! Every error the API emits is built here, through [`RpcError::new`], so the
//! `{reason, details, suggestion}` data envelope is present on every frame.
//! This module is the single source of truth for error codes — no parallel
//! constant tables exist anywhere else in the crate.

use crate::media::MediaError;
use serde::Serialize;

// ─── Error codes ─────────────────────────────────────────────────────────────
//
// Protocol tier    -32600..-32603  (JSON-RPC 2.0)
// Service tier     -32001..-32008
// Recording tier   -1000..-1010

/// Stable error code space. Wire values never change once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Protocol
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    // Service
    AuthenticationRequired,
    RateLimitExceeded,
    InsufficientPermissions,
    CameraNotFound,
    RecordingInProgress,
    MediaMtxUnavailable,
    InsufficientStorage,
    UnsupportedCapability,
    // Recording-specific
    RecordingCameraNotFound,
    RecordingCameraNotAvailable,
    RecordingAlreadyInProgress,
    RecordingDownstreamError,
    RecordingAlreadyActive,
    StorageSpaceLow,
    StorageSpaceCritical,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::AuthenticationRequired => -32001,
            Self::RateLimitExceeded => -32002,
            Self::InsufficientPermissions => -32003,
            Self::CameraNotFound => -32004,
            Self::RecordingInProgress => -32005,
            Self::MediaMtxUnavailable => -32006,
            Self::InsufficientStorage => -32007,
            Self::UnsupportedCapability => -32008,
            Self::RecordingCameraNotFound => -1000,
            Self::RecordingCameraNotAvailable => -1001,
            Self::RecordingAlreadyInProgress => -1002,
            Self::RecordingDownstreamError => -1003,
            Self::RecordingAlreadyActive => -1006,
            Self::StorageSpaceLow => -1008,
            Self::StorageSpaceCritical => -1010,
        }
    }

    /// Wire `message` field — fixed per code, human context goes in `data`.
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal server error",
            Self::AuthenticationRequired => "Authentication failed or token expired",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::InsufficientPermissions => "Insufficient permissions",
            Self::CameraNotFound => "Camera not found or disconnected",
            Self::RecordingInProgress => "Recording operation already in progress",
            Self::MediaMtxUnavailable => "MediaMTX service unavailable",
            Self::InsufficientStorage => "Insufficient storage space",
            Self::UnsupportedCapability => "Camera capability not supported",
            Self::RecordingCameraNotFound => "Camera not found",
            Self::RecordingCameraNotAvailable => "Camera not available",
            Self::RecordingAlreadyInProgress => "Recording in progress",
            Self::RecordingDownstreamError => "MediaMTX error",
            Self::RecordingAlreadyActive => "Camera is already recording",
            Self::StorageSpaceLow => "Storage space low",
            Self::StorageSpaceCritical => "Storage space critical",
        }
    }
}

// ─── Error value ─────────────────────────────────────────────────────────────

/// Structured `error.data` payload carried by every error frame.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    /// Short machine token, e.g. `service_initializing`.
    pub reason: String,
    /// Human-readable detail.
    pub details: String,
    /// What the caller should do about it.
    pub suggestion: String,
}

/// A fully-shaped JSON-RPC error. Construct only via [`RpcError::new`] or the
/// named helpers below.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: ErrorData,
}

impl RpcError {
    /// The one constructor. Everything else in this impl delegates here.
    pub fn new(
        code: ErrorCode,
        reason: impl Into<String>,
        details: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_owned(),
            data: ErrorData {
                reason: reason.into(),
                details: details.into(),
                suggestion: suggestion.into(),
            },
        }
    }

    // ── Named shapes used across the dispatcher ──────────────────────────────

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidRequest,
            "malformed_request",
            details,
            "send a single JSON-RPC 2.0 text frame",
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            "unknown_method",
            format!("no method named '{method}' is registered"),
            "check the method name against the API documentation",
        )
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidParams,
            "invalid_params",
            details,
            "correct the named field and retry",
        )
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalError,
            "internal_error",
            details,
            "retry; contact the administrator if the problem persists",
        )
    }

    pub fn auth_required(details: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthenticationRequired,
            "auth_required",
            details,
            "call authenticate with a valid auth_token",
        )
    }

    pub fn permission_denied(method: &str, role: &str) -> Self {
        Self::new(
            ErrorCode::InsufficientPermissions,
            "insufficient_role",
            format!("method '{method}' is not permitted for role '{role}'"),
            "authenticate with an account holding a higher role",
        )
    }

    pub fn rate_limited(bucket: &str, retry_after: std::time::Duration) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            "rate_limited",
            format!("quota exceeded for {bucket}"),
            format!("retry after {} ms", retry_after.as_millis()),
        )
    }

    /// The Progressive Readiness envelope: emitted while the media controller
    /// is still starting up. `details` must contain "initializing" — clients
    /// key off that substring.
    pub fn service_initializing() -> Self {
        Self::new(
            ErrorCode::MediaMtxUnavailable,
            "service_initializing",
            "service is initializing; camera discovery has not completed",
            "poll get_system_status and retry once status is ready",
        )
    }
}

// ─── Downstream mapping ──────────────────────────────────────────────────────

impl From<MediaError> for RpcError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::CameraNotFound { device } => Self::new(
                ErrorCode::CameraNotFound,
                "camera_not_found",
                format!("no camera registered for device '{device}'"),
                "call get_camera_list for the set of connected devices",
            ),
            MediaError::CameraNotAvailable { device } => Self::new(
                ErrorCode::RecordingCameraNotAvailable,
                "camera_not_available",
                format!("device '{device}' is present but not usable"),
                "check the camera's status and cabling, then retry",
            ),
            MediaError::AlreadyRecording { device } => Self::new(
                ErrorCode::RecordingAlreadyActive,
                "already_recording",
                format!("a recording is already active on '{device}'"),
                "stop the active recording first",
            ),
            MediaError::NotRecording { device } => Self::new(
                ErrorCode::RecordingInProgress,
                "not_recording",
                format!("no active recording on '{device}'"),
                "start a recording before stopping one",
            ),
            MediaError::FileNotFound { filename } => Self::new(
                ErrorCode::InvalidParams,
                "file_not_found",
                format!("no such file: '{filename}'"),
                "list files first and use a returned filename",
            ),
            MediaError::StorageLow { available_percent } => Self::new(
                ErrorCode::StorageSpaceLow,
                "storage_low",
                format!("storage space low: {available_percent}% available"),
                "delete old recordings or extend storage",
            ),
            MediaError::StorageCritical { available_percent } => Self::new(
                ErrorCode::StorageSpaceCritical,
                "storage_critical",
                format!("storage space critical: {available_percent}% available"),
                "recording is blocked until space is reclaimed",
            ),
            MediaError::NotSupported { details } => Self::new(
                ErrorCode::UnsupportedCapability,
                "capability_not_supported",
                details,
                "query get_camera_capabilities for supported modes",
            ),
            MediaError::Downstream { details } => Self::new(
                ErrorCode::RecordingDownstreamError,
                "downstream_error",
                details,
                "retry; the media backend reported a transient failure",
            ),
            MediaError::Unavailable => Self::new(
                ErrorCode::MediaMtxUnavailable,
                "downstream_unavailable",
                "the media backend is not reachable",
                "poll get_system_status and retry once status is ready",
            ),
        }
    }
}
