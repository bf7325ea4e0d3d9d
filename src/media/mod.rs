//! Media Controller contract.
//!
//! The controller owns cameras, recordings, snapshots, and streaming paths;
//! it is the sole source of truth for domain state. This crate consumes it
//! only through [`MediaController`] — no camera semantics live in the API
//! layer. The in-memory [`sim`] implementation backs development mode and
//! the integration test suite.

pub mod sim;

pub use sim::SimulatedMediaController;

use crate::api::events::Topic;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

// ─── Domain events ───────────────────────────────────────────────────────────

/// One domain event pushed by the controller. The controller signals
/// readiness by publishing [`Topic::SystemStartup`] once discovery completes.
#[derive(Debug, Clone)]
pub struct MediaEvent {
    pub topic: Topic,
    pub payload: Value,
}

// ─── Domain results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraStatus {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamUrls {
    pub rtsp: String,
    pub hls: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub device: String,
    pub status: CameraStatus,
    pub name: String,
    pub resolution: String,
    pub fps: u32,
    pub streams: StreamUrls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCapabilities {
    pub device: String,
    pub formats: Vec<String>,
    pub resolutions: Vec<String>,
    pub fps_options: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingState {
    Recording,
    Stopped,
    Failed,
}

/// Result of `start_recording` — the controller has accepted the job; the
/// recording's wall clock is driven entirely by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStart {
    pub device: String,
    pub filename: String,
    pub status: RecordingState,
    pub start_time: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStop {
    pub device: String,
    pub filename: String,
    pub status: RecordingState,
    pub start_time: String,
    pub end_time: String,
    /// Seconds of recorded material.
    pub duration: u64,
    pub file_size: u64,
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotState {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResult {
    pub device: String,
    pub filename: String,
    pub status: SnapshotState,
    pub timestamp: String,
    pub file_size: u64,
    pub file_path: String,
}

/// One stored recording or snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub file_size: u64,
    pub created_at: String,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub download_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileList {
    pub files: Vec<FileInfo>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total_space: u64,
    pub used_space: u64,
    pub available_space: u64,
    pub usage_percent: f64,
    /// `normal` | `low` | `critical` against the retention thresholds.
    pub threshold_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// `age` | `size` | `manual`
    pub policy_type: String,
    pub max_age_days: u32,
    pub max_usage_percent: f64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResult {
    pub deleted_count: usize,
    pub freed_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub source: String,
    pub ready: bool,
    pub readers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    pub device: String,
    pub status: String,
    pub ready: bool,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalStream {
    pub stream_url: String,
    pub stream_name: String,
    pub stream_type: String,
}

/// Readiness poll document — always answerable, even before discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: String,
    pub message: String,
    pub available_cameras: Vec<String>,
    pub discovery_active: bool,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Typed downstream failures; mapped onto wire codes in `api::error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
    #[error("camera '{device}' not found")]
    CameraNotFound { device: String },
    #[error("camera '{device}' not available")]
    CameraNotAvailable { device: String },
    #[error("camera '{device}' is already recording")]
    AlreadyRecording { device: String },
    #[error("camera '{device}' is not recording")]
    NotRecording { device: String },
    #[error("file '{filename}' not found")]
    FileNotFound { filename: String },
    #[error("storage low ({available_percent}% available)")]
    StorageLow { available_percent: u8 },
    #[error("storage critical ({available_percent}% available)")]
    StorageCritical { available_percent: u8 },
    #[error("not supported: {details}")]
    NotSupported { details: String },
    #[error("downstream error: {details}")]
    Downstream { details: String },
    #[error("media backend unavailable")]
    Unavailable,
}

pub type MediaResult<T> = Result<T, MediaError>;

// ─── Controller contract ─────────────────────────────────────────────────────

#[async_trait]
pub trait MediaController: Send + Sync {
    /// True once camera discovery has completed and domain calls may proceed.
    fn is_ready(&self) -> bool;

    /// Domain event channel. Each subscriber gets every event published
    /// after the point of subscription.
    fn events(&self) -> broadcast::Receiver<MediaEvent>;

    async fn system_status(&self) -> MediaResult<SystemStatus>;

    // Cameras
    async fn camera_list(&self) -> MediaResult<Vec<CameraInfo>>;
    async fn camera_status(&self, device: &str) -> MediaResult<CameraInfo>;
    async fn camera_capabilities(&self, device: &str) -> MediaResult<CameraCapabilities>;

    // Recordings
    async fn start_recording(
        &self,
        device: &str,
        duration_secs: Option<u64>,
        format: Option<String>,
    ) -> MediaResult<RecordingStart>;
    async fn stop_recording(&self, device: &str) -> MediaResult<RecordingStop>;
    async fn list_recordings(&self, limit: usize, offset: usize) -> MediaResult<FileList>;
    async fn recording_info(&self, filename: &str) -> MediaResult<FileInfo>;
    async fn delete_recording(&self, filename: &str) -> MediaResult<()>;

    // Snapshots
    async fn take_snapshot(
        &self,
        device: &str,
        filename: Option<String>,
    ) -> MediaResult<SnapshotResult>;
    async fn list_snapshots(&self, limit: usize, offset: usize) -> MediaResult<FileList>;
    async fn snapshot_info(&self, filename: &str) -> MediaResult<FileInfo>;
    async fn delete_snapshot(&self, filename: &str) -> MediaResult<()>;

    // Storage
    async fn storage_info(&self) -> MediaResult<StorageInfo>;
    async fn retention_policy(&self) -> MediaResult<RetentionPolicy>;
    async fn set_retention_policy(&self, policy: RetentionPolicy) -> MediaResult<RetentionPolicy>;
    async fn cleanup_old_files(&self) -> MediaResult<CleanupResult>;

    // Streaming
    async fn streams(&self) -> MediaResult<Vec<StreamInfo>>;
    async fn stream_url(&self, device: &str) -> MediaResult<StreamUrls>;
    async fn stream_status(&self, device: &str) -> MediaResult<StreamStatus>;
    async fn start_streaming(&self, device: &str) -> MediaResult<StreamStatus>;
    async fn stop_streaming(&self, device: &str) -> MediaResult<StreamStatus>;

    // External streams
    async fn discover_external_streams(&self) -> MediaResult<Vec<ExternalStream>>;
    async fn add_external_stream(
        &self,
        stream_url: String,
        stream_name: String,
    ) -> MediaResult<ExternalStream>;
    async fn remove_external_stream(&self, stream_url: &str) -> MediaResult<()>;
    async fn external_streams(&self) -> MediaResult<Vec<ExternalStream>>;
    async fn set_discovery_interval(&self, scan_interval_secs: u64) -> MediaResult<u64>;
    async fn discovery_interval(&self) -> MediaResult<u64>;
}
