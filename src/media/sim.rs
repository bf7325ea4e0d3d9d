//! In-memory media controller.
//!
//! Implements the full [`MediaController`] contract against simulated
//! hardware: two USB cameras, fabricated recording/snapshot files, and a
//! MediaMTX-shaped set of stream paths. Backs the daemon's development mode
//! and the integration test suite, where it stands in for the real
//! controller with a configurable readiness delay.

use super::{
    CameraCapabilities, CameraInfo, CameraStatus, CleanupResult, ExternalStream, FileInfo,
    FileList, MediaController, MediaError, MediaEvent, MediaResult, RecordingStart,
    RecordingStop, RecordingState, RetentionPolicy, SnapshotResult, SnapshotState, StorageInfo,
    StreamInfo, StreamStatus, StreamUrls, SystemStatus,
};
use crate::api::events::Topic;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const TOTAL_SPACE: u64 = 100 * 1024 * 1024 * 1024;
const BASE_USED_SPACE: u64 = 20 * 1024 * 1024 * 1024;
/// Fabricated encoder bitrate: bytes of file per second of recording.
const BYTES_PER_SECOND: u64 = 5_000_000;
const SNAPSHOT_SIZE: u64 = 204_800;

struct ActiveRecording {
    filename: String,
    started_at: chrono::DateTime<chrono::Utc>,
    format: String,
}

struct StreamingSession {
    started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct SimState {
    cameras: BTreeMap<String, CameraInfo>,
    active_recordings: HashMap<String, ActiveRecording>,
    recordings: BTreeMap<String, FileInfo>,
    snapshots: BTreeMap<String, FileInfo>,
    streaming: HashMap<String, StreamingSession>,
    external_streams: Vec<ExternalStream>,
    retention: Option<RetentionPolicy>,
    discovery_interval_secs: u64,
}

pub struct SimulatedMediaController {
    ready: AtomicBool,
    events: broadcast::Sender<MediaEvent>,
    state: Mutex<SimState>,
}

impl SimulatedMediaController {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut state = SimState {
            discovery_interval_secs: 300,
            ..Default::default()
        };
        for device in ["camera0", "camera1"] {
            state.cameras.insert(device.to_owned(), simulated_camera(device));
        }
        Arc::new(Self {
            ready: AtomicBool::new(false),
            events,
            state: Mutex::new(state),
        })
    }

    /// Run simulated discovery: after `ready_delay` the controller flips
    /// ready, announces `system.startup`, and reports its cameras.
    pub fn start(self: &Arc<Self>, ready_delay: Duration) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ready_delay).await;
            controller.ready.store(true, Ordering::Release);
            controller.publish(
                Topic::SystemStartup,
                json!({ "status": "ready", "message": "camera discovery completed" }),
            );
            let devices: Vec<String> = {
                let state = controller.state.lock().expect("sim state poisoned");
                state.cameras.keys().cloned().collect()
            };
            for device in devices {
                controller.publish(Topic::CameraConnected, json!({ "device": device }));
            }
            debug!("simulated media controller ready");
        });
    }

    /// Inject a domain event onto the channel, as the real controller's
    /// health monitor and device watchers do.
    pub fn emit(&self, topic: Topic, payload: serde_json::Value) {
        self.publish(topic, payload);
    }

    fn publish(&self, topic: Topic, payload: serde_json::Value) {
        // No subscribers is fine — the API layer may not be pumping yet.
        let _ = self.events.send(MediaEvent { topic, payload });
    }

    fn ensure_ready(&self) -> MediaResult<()> {
        if self.ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(MediaError::Unavailable)
        }
    }

    fn with_camera<T>(
        state: &SimState,
        device: &str,
        f: impl FnOnce(&CameraInfo) -> T,
    ) -> MediaResult<T> {
        let camera = state
            .cameras
            .get(device)
            .ok_or_else(|| MediaError::CameraNotFound {
                device: device.to_owned(),
            })?;
        if camera.status != CameraStatus::Connected {
            return Err(MediaError::CameraNotAvailable {
                device: device.to_owned(),
            });
        }
        Ok(f(camera))
    }
}

fn simulated_camera(device: &str) -> CameraInfo {
    CameraInfo {
        device: device.to_owned(),
        status: CameraStatus::Connected,
        name: format!("Simulated Camera ({device})"),
        resolution: "1920x1080".to_owned(),
        fps: 30,
        streams: stream_urls(device),
    }
}

fn stream_urls(device: &str) -> StreamUrls {
    StreamUrls {
        rtsp: format!("rtsp://localhost:8554/{device}"),
        hls: format!("http://localhost:8888/{device}/index.m3u8"),
    }
}

fn timestamp_slug(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[async_trait]
impl MediaController for SimulatedMediaController {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn events(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }

    async fn system_status(&self) -> MediaResult<SystemStatus> {
        let state = self.state.lock().expect("sim state poisoned");
        Ok(SystemStatus {
            status: if self.is_ready() { "healthy" } else { "starting" }.to_owned(),
            message: if self.is_ready() {
                "system operational".to_owned()
            } else {
                "initializing".to_owned()
            },
            available_cameras: state.cameras.keys().cloned().collect(),
            discovery_active: self.is_ready(),
        })
    }

    // ── Cameras ─────────────────────────────────────────────────────────────

    async fn camera_list(&self) -> MediaResult<Vec<CameraInfo>> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.cameras.values().cloned().collect())
    }

    async fn camera_status(&self, device: &str) -> MediaResult<CameraInfo> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        state
            .cameras
            .get(device)
            .cloned()
            .ok_or_else(|| MediaError::CameraNotFound {
                device: device.to_owned(),
            })
    }

    async fn camera_capabilities(&self, device: &str) -> MediaResult<CameraCapabilities> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Self::with_camera(&state, device, |_| CameraCapabilities {
            device: device.to_owned(),
            formats: vec!["YUYV".to_owned(), "MJPEG".to_owned()],
            resolutions: vec![
                "640x480".to_owned(),
                "1280x720".to_owned(),
                "1920x1080".to_owned(),
            ],
            fps_options: vec![15, 30, 60],
        })
    }

    // ── Recordings ──────────────────────────────────────────────────────────

    async fn start_recording(
        &self,
        device: &str,
        duration_secs: Option<u64>,
        format: Option<String>,
    ) -> MediaResult<RecordingStart> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        Self::with_camera(&state, device, |_| ())?;
        if state.active_recordings.contains_key(device) {
            return Err(MediaError::AlreadyRecording {
                device: device.to_owned(),
            });
        }

        let started_at = chrono::Utc::now();
        let format = format.unwrap_or_else(|| "fmp4".to_owned());
        let filename = format!("{device}_{}.{format}", timestamp_slug(started_at));
        state.active_recordings.insert(
            device.to_owned(),
            ActiveRecording {
                filename: filename.clone(),
                started_at,
                format: format.clone(),
            },
        );
        drop(state);

        self.publish(
            Topic::RecordingStart,
            json!({
                "device": device,
                "filename": filename.clone(),
                "duration": duration_secs,
            }),
        );
        Ok(RecordingStart {
            device: device.to_owned(),
            filename,
            status: RecordingState::Recording,
            start_time: started_at.to_rfc3339(),
            format,
        })
    }

    async fn stop_recording(&self, device: &str) -> MediaResult<RecordingStop> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        let active = state
            .active_recordings
            .remove(device)
            .ok_or_else(|| MediaError::NotRecording {
                device: device.to_owned(),
            })?;

        let ended_at = chrono::Utc::now();
        let duration = (ended_at - active.started_at).num_seconds().max(0) as u64;
        let file_size = BYTES_PER_SECOND * duration.max(1);
        state.recordings.insert(
            active.filename.clone(),
            FileInfo {
                filename: active.filename.clone(),
                file_size,
                created_at: active.started_at.to_rfc3339(),
                device: device.to_owned(),
                duration: Some(duration),
                download_url: format!("/files/recordings/{}", active.filename),
            },
        );
        drop(state);

        self.publish(
            Topic::RecordingStop,
            json!({
                "device": device,
                "filename": active.filename.clone(),
                "duration": duration,
            }),
        );
        Ok(RecordingStop {
            device: device.to_owned(),
            filename: active.filename,
            status: RecordingState::Stopped,
            start_time: active.started_at.to_rfc3339(),
            end_time: ended_at.to_rfc3339(),
            duration,
            file_size,
            format: active.format,
        })
    }

    async fn list_recordings(&self, limit: usize, offset: usize) -> MediaResult<FileList> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Ok(page(&state.recordings, limit, offset))
    }

    async fn recording_info(&self, filename: &str) -> MediaResult<FileInfo> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        state
            .recordings
            .get(filename)
            .cloned()
            .ok_or_else(|| MediaError::FileNotFound {
                filename: filename.to_owned(),
            })
    }

    async fn delete_recording(&self, filename: &str) -> MediaResult<()> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        state
            .recordings
            .remove(filename)
            .map(|_| ())
            .ok_or_else(|| MediaError::FileNotFound {
                filename: filename.to_owned(),
            })
    }

    // ── Snapshots ───────────────────────────────────────────────────────────

    async fn take_snapshot(
        &self,
        device: &str,
        filename: Option<String>,
    ) -> MediaResult<SnapshotResult> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        Self::with_camera(&state, device, |_| ())?;

        let taken_at = chrono::Utc::now();
        let filename = filename
            .unwrap_or_else(|| format!("{device}_snapshot_{}.jpg", timestamp_slug(taken_at)));
        let file_path = format!("/files/snapshots/{filename}");
        state.snapshots.insert(
            filename.clone(),
            FileInfo {
                filename: filename.clone(),
                file_size: SNAPSHOT_SIZE,
                created_at: taken_at.to_rfc3339(),
                device: device.to_owned(),
                duration: None,
                download_url: file_path.clone(),
            },
        );
        drop(state);

        self.publish(
            Topic::SnapshotTaken,
            json!({ "device": device, "filename": filename.clone() }),
        );
        Ok(SnapshotResult {
            device: device.to_owned(),
            filename,
            status: SnapshotState::Success,
            timestamp: taken_at.to_rfc3339(),
            file_size: SNAPSHOT_SIZE,
            file_path,
        })
    }

    async fn list_snapshots(&self, limit: usize, offset: usize) -> MediaResult<FileList> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Ok(page(&state.snapshots, limit, offset))
    }

    async fn snapshot_info(&self, filename: &str) -> MediaResult<FileInfo> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        state
            .snapshots
            .get(filename)
            .cloned()
            .ok_or_else(|| MediaError::FileNotFound {
                filename: filename.to_owned(),
            })
    }

    async fn delete_snapshot(&self, filename: &str) -> MediaResult<()> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        state
            .snapshots
            .remove(filename)
            .map(|_| ())
            .ok_or_else(|| MediaError::FileNotFound {
                filename: filename.to_owned(),
            })
    }

    // ── Storage ─────────────────────────────────────────────────────────────

    async fn storage_info(&self) -> MediaResult<StorageInfo> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        let file_bytes: u64 = state
            .recordings
            .values()
            .chain(state.snapshots.values())
            .map(|f| f.file_size)
            .sum();
        let used = BASE_USED_SPACE + file_bytes;
        let usage_percent = (used as f64 / TOTAL_SPACE as f64) * 100.0;
        Ok(StorageInfo {
            total_space: TOTAL_SPACE,
            used_space: used,
            available_space: TOTAL_SPACE.saturating_sub(used),
            usage_percent,
            threshold_status: if usage_percent >= 95.0 {
                "critical"
            } else if usage_percent >= 80.0 {
                "low"
            } else {
                "normal"
            }
            .to_owned(),
        })
    }

    async fn retention_policy(&self) -> MediaResult<RetentionPolicy> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.retention.clone().unwrap_or(RetentionPolicy {
            policy_type: "manual".to_owned(),
            max_age_days: 0,
            max_usage_percent: 0.0,
            enabled: false,
        }))
    }

    async fn set_retention_policy(&self, policy: RetentionPolicy) -> MediaResult<RetentionPolicy> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        state.retention = Some(policy.clone());
        Ok(policy)
    }

    async fn cleanup_old_files(&self) -> MediaResult<CleanupResult> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        let Some(policy) = state.retention.clone().filter(|p| p.enabled) else {
            return Ok(CleanupResult {
                deleted_count: 0,
                freed_bytes: 0,
            });
        };

        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(policy.max_age_days));
        let expired: Vec<String> = state
            .recordings
            .values()
            .filter(|f| {
                chrono::DateTime::parse_from_rfc3339(&f.created_at)
                    .map(|t| t.with_timezone(&chrono::Utc) < cutoff)
                    .unwrap_or(false)
            })
            .map(|f| f.filename.clone())
            .collect();

        let mut freed = 0u64;
        for filename in &expired {
            if let Some(file) = state.recordings.remove(filename) {
                freed += file.file_size;
            }
        }
        Ok(CleanupResult {
            deleted_count: expired.len(),
            freed_bytes: freed,
        })
    }

    // ── Streaming ───────────────────────────────────────────────────────────

    async fn streams(&self) -> MediaResult<Vec<StreamInfo>> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state
            .streaming
            .keys()
            .map(|device| StreamInfo {
                name: device.clone(),
                source: stream_urls(device).rtsp,
                ready: true,
                readers: 0,
            })
            .collect())
    }

    async fn stream_url(&self, device: &str) -> MediaResult<StreamUrls> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Self::with_camera(&state, device, |camera| camera.streams.clone())
    }

    async fn stream_status(&self, device: &str) -> MediaResult<StreamStatus> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Self::with_camera(&state, device, |_| ())?;
        Ok(match state.streaming.get(device) {
            Some(session) => StreamStatus {
                device: device.to_owned(),
                status: "active".to_owned(),
                ready: true,
                uptime_secs: (chrono::Utc::now() - session.started_at).num_seconds().max(0)
                    as u64,
            },
            None => StreamStatus {
                device: device.to_owned(),
                status: "inactive".to_owned(),
                ready: false,
                uptime_secs: 0,
            },
        })
    }

    async fn start_streaming(&self, device: &str) -> MediaResult<StreamStatus> {
        self.ensure_ready()?;
        {
            let mut state = self.state.lock().expect("sim state poisoned");
            Self::with_camera(&state, device, |_| ())?;
            state.streaming.entry(device.to_owned()).or_insert(StreamingSession {
                started_at: chrono::Utc::now(),
            });
        }
        self.publish(Topic::StreamStarted, json!({ "device": device }));
        self.stream_status(device).await
    }

    async fn stop_streaming(&self, device: &str) -> MediaResult<StreamStatus> {
        self.ensure_ready()?;
        {
            let mut state = self.state.lock().expect("sim state poisoned");
            Self::with_camera(&state, device, |_| ())?;
            state.streaming.remove(device);
        }
        self.publish(Topic::StreamStopped, json!({ "device": device }));
        self.stream_status(device).await
    }

    // ── External streams ────────────────────────────────────────────────────

    async fn discover_external_streams(&self) -> MediaResult<Vec<ExternalStream>> {
        self.ensure_ready()?;
        // A fixed discovery result stands in for the network scan.
        Ok(vec![ExternalStream {
            stream_url: "rtsp://192.168.1.100:554/stream1".to_owned(),
            stream_name: "external_cam_1".to_owned(),
            stream_type: "onvif".to_owned(),
        }])
    }

    async fn add_external_stream(
        &self,
        stream_url: String,
        stream_name: String,
    ) -> MediaResult<ExternalStream> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        if state
            .external_streams
            .iter()
            .any(|s| s.stream_url == stream_url)
        {
            return Err(MediaError::Downstream {
                details: format!("external stream '{stream_url}' is already registered"),
            });
        }
        let stream = ExternalStream {
            stream_url,
            stream_name,
            stream_type: "manual".to_owned(),
        };
        state.external_streams.push(stream.clone());
        Ok(stream)
    }

    async fn remove_external_stream(&self, stream_url: &str) -> MediaResult<()> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        let before = state.external_streams.len();
        state.external_streams.retain(|s| s.stream_url != stream_url);
        if state.external_streams.len() == before {
            return Err(MediaError::Downstream {
                details: format!("no external stream registered for '{stream_url}'"),
            });
        }
        Ok(())
    }

    async fn external_streams(&self) -> MediaResult<Vec<ExternalStream>> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.external_streams.clone())
    }

    async fn set_discovery_interval(&self, scan_interval_secs: u64) -> MediaResult<u64> {
        self.ensure_ready()?;
        let mut state = self.state.lock().expect("sim state poisoned");
        state.discovery_interval_secs = scan_interval_secs;
        Ok(scan_interval_secs)
    }

    async fn discovery_interval(&self) -> MediaResult<u64> {
        self.ensure_ready()?;
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.discovery_interval_secs)
    }
}

fn page(files: &BTreeMap<String, FileInfo>, limit: usize, offset: usize) -> FileList {
    let mut all: Vec<&FileInfo> = files.values().collect();
    // Newest first; BTreeMap iteration is filename order, so sort by time.
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    FileList {
        files: all
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect(),
        total: files.len(),
        limit,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_controller() -> Arc<SimulatedMediaController> {
        let controller = SimulatedMediaController::new();
        controller.ready.store(true, Ordering::Release);
        controller
    }

    #[tokio::test]
    async fn domain_calls_fail_before_readiness() {
        let controller = SimulatedMediaController::new();
        assert!(!controller.is_ready());
        assert!(matches!(
            controller.camera_list().await,
            Err(MediaError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn recording_lifecycle() {
        let controller = ready_controller();
        let started = controller
            .start_recording("camera0", None, None)
            .await
            .unwrap();
        assert_eq!(started.status, RecordingState::Recording);
        assert!(started.filename.starts_with("camera0_"));
        assert!(started.filename.ends_with(".fmp4"));

        // Second start on the same device is refused.
        assert!(matches!(
            controller.start_recording("camera0", None, None).await,
            Err(MediaError::AlreadyRecording { .. })
        ));

        let stopped = controller.stop_recording("camera0").await.unwrap();
        assert_eq!(stopped.status, RecordingState::Stopped);
        assert_eq!(stopped.filename, started.filename);
        assert!(stopped.file_size > 0);

        let list = controller.list_recordings(10, 0).await.unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.files[0].filename, started.filename);
    }

    #[tokio::test]
    async fn stop_without_start_is_an_error() {
        let controller = ready_controller();
        assert!(matches!(
            controller.stop_recording("camera0").await,
            Err(MediaError::NotRecording { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_camera_is_not_found() {
        let controller = ready_controller();
        assert!(matches!(
            controller.camera_status("camera9").await,
            Err(MediaError::CameraNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_honours_requested_filename() {
        let controller = ready_controller();
        let snap = controller
            .take_snapshot("camera1", Some("front_door.jpg".to_owned()))
            .await
            .unwrap();
        assert_eq!(snap.status, SnapshotState::Success);
        assert_eq!(snap.filename, "front_door.jpg");
        assert!(controller.snapshot_info("front_door.jpg").await.is_ok());
        controller.delete_snapshot("front_door.jpg").await.unwrap();
        assert!(matches!(
            controller.snapshot_info("front_door.jpg").await,
            Err(MediaError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn startup_publishes_readiness_then_cameras() {
        let controller = SimulatedMediaController::new();
        let mut events = controller.events();
        controller.start(Duration::from_millis(10));

        let first = events.recv().await.unwrap();
        assert_eq!(first.topic, Topic::SystemStartup);
        assert!(controller.is_ready());

        let second = events.recv().await.unwrap();
        assert_eq!(second.topic, Topic::CameraConnected);
    }

    #[tokio::test]
    async fn external_stream_add_remove() {
        let controller = ready_controller();
        controller
            .add_external_stream("rtsp://10.0.0.5/cam".to_owned(), "yard".to_owned())
            .await
            .unwrap();
        assert!(controller
            .add_external_stream("rtsp://10.0.0.5/cam".to_owned(), "dup".to_owned())
            .await
            .is_err());
        assert_eq!(controller.external_streams().await.unwrap().len(), 1);
        controller
            .remove_external_stream("rtsp://10.0.0.5/cam")
            .await
            .unwrap();
        assert!(controller.external_streams().await.unwrap().is_empty());
    }
}
