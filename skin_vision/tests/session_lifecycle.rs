// End-to-end capture sessions against a scripted camera and landmarker. Time is
// paused, so sampling intervals, countdown ticks and camera frame pacing all
// advance instantly and deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use skin_vision::core_modules::capture_store::{CaptureItem, CaptureOrigin};
use skin_vision::core_modules::face::{Landmarks, Point2, Pose};
use skin_vision::core_modules::frame::frame::Frame;
use skin_vision::core_modules::landmarker::{Delegate, DetectionMode, LandmarkSource, LandmarkerFactory};
use skin_vision::core_modules::quality::QualityWarning;
use skin_vision::{
    CameraSource, CaptureHandle, CaptureSession, SessionEvent, SessionStatus, VisionConfig, VisionError,
    VisionResult,
};
use tokio::time::timeout;

fn checkerboard() -> Frame {
    let (width, height, cell) = (320u32, 240u32, 4u32);
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = if ((x / cell) + (y / cell)) % 2 == 0 { 30 } else { 230 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    Frame::from_rgba(width, height, data).unwrap()
}

struct ScriptedCamera {
    frame: Frame,
    fail_open: bool,
    frames_left: Option<usize>,
    released: Arc<AtomicBool>,
}

impl ScriptedCamera {
    fn new() -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let camera = Self {
            frame: checkerboard(),
            fail_open: false,
            frames_left: None,
            released: released.clone(),
        };
        (camera, released)
    }
}

#[async_trait]
impl CameraSource for ScriptedCamera {
    async fn open(&mut self) -> VisionResult<()> {
        if self.fail_open {
            Err(VisionError::camera("permission denied"))
        } else {
            Ok(())
        }
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::sleep(Duration::from_millis(33)).await;
        match self.frames_left.as_mut() {
            Some(0) => None,
            Some(left) => {
                *left -= 1;
                Some(self.frame.clone())
            }
            None => Some(self.frame.clone()),
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Always reports a frontal face covering the middle of the frame.
struct FrontalFace;

#[async_trait]
impl LandmarkSource for FrontalFace {
    async fn detect(&self, _frame: Arc<Frame>, _mode: DetectionMode) -> VisionResult<Landmarks> {
        Ok(Landmarks::new(vec![
            Point2::new(0.3, 0.2),
            Point2::new(0.5, 0.5),
            Point2::new(0.7, 0.8),
        ]))
    }
}

struct Models {
    gpu_ok: bool,
    cpu_ok: bool,
}

#[async_trait]
impl LandmarkerFactory for Models {
    async fn load(&self, delegate: Delegate) -> VisionResult<Arc<dyn LandmarkSource>> {
        let ok = match delegate {
            Delegate::Gpu => self.gpu_ok,
            Delegate::Cpu => self.cpu_ok,
        };
        if ok {
            Ok(Arc::new(FrontalFace))
        } else {
            Err(VisionError::ModelLoad(format!("{} delegate unavailable", delegate.as_str())))
        }
    }
}

/// Loads fine, then fails every detection.
struct BrokenDetector;

#[async_trait]
impl LandmarkSource for BrokenDetector {
    async fn detect(&self, _frame: Arc<Frame>, _mode: DetectionMode) -> VisionResult<Landmarks> {
        Err(VisionError::detection("inference crashed"))
    }
}

struct BrokenModels;

#[async_trait]
impl LandmarkerFactory for BrokenModels {
    async fn load(&self, _delegate: Delegate) -> VisionResult<Arc<dyn LandmarkSource>> {
        Ok(Arc::new(BrokenDetector))
    }
}

fn models(gpu_ok: bool, cpu_ok: bool) -> Arc<dyn LandmarkerFactory> {
    Arc::new(Models { gpu_ok, cpu_ok })
}

fn manual_only() -> VisionConfig {
    let mut config = VisionConfig::default();
    config.auto_capture.enabled = false;
    config
}

async fn next_capture(handle: &mut CaptureHandle) -> CaptureItem {
    loop {
        match handle.next_event().await {
            Some(SessionEvent::Captured(item)) => return item,
            Some(_) => {}
            None => panic!("session ended before a capture"),
        }
    }
}

async fn next_status(handle: &mut CaptureHandle) -> Option<SessionStatus> {
    loop {
        match handle.next_event().await {
            Some(SessionEvent::Status(status)) => return Some(status),
            Some(_) => {}
            None => return None,
        }
    }
}

async fn wait_until_live(handle: &mut CaptureHandle) -> Delegate {
    assert_eq!(next_status(handle).await, Some(SessionStatus::Starting));
    match next_status(handle).await {
        Some(SessionStatus::Live { delegate }) => delegate,
        other => panic!("expected live session, got {other:?}"),
    }
}

async fn wait_for_quality(handle: &mut CaptureHandle) {
    loop {
        match handle.next_event().await {
            Some(SessionEvent::Quality(_)) => return,
            Some(_) => {}
            None => panic!("session ended before a quality sample"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn good_frontal_stream_auto_captures_exactly_once() {
    let (camera, released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(VisionConfig::default(), camera, models(true, true));
    assert_eq!(wait_until_live(&mut handle).await, Delegate::Gpu);

    let item = timeout(Duration::from_secs(10), next_capture(&mut handle))
        .await
        .expect("auto-capture should fire");
    assert_eq!(item.pose, Pose::Front);
    assert_eq!(item.origin, CaptureOrigin::Auto);
    assert!(item.quality_score >= 0.78);
    assert_eq!(&item.image_bytes[..2], &[0xFF, 0xD8]);

    // Same pose held steady: no second capture, however long we wait.
    let again = timeout(Duration::from_secs(15), next_capture(&mut handle)).await;
    assert!(again.is_err());

    let items = handle.stop().await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn countdown_is_announced_before_capture() {
    let (camera, _released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(VisionConfig::default(), camera, models(true, true));
    wait_until_live(&mut handle).await;

    let mut countdown = Vec::new();
    let collected = timeout(Duration::from_secs(10), async {
        loop {
            match handle.next_event().await {
                Some(SessionEvent::Countdown(ticks)) => countdown.push(ticks),
                Some(SessionEvent::Captured(_)) => break,
                Some(_) => {}
                None => panic!("session ended"),
            }
        }
    })
    .await;
    assert!(collected.is_ok());
    assert_eq!(countdown, vec![Some(3), Some(2), Some(1), None]);
}

#[tokio::test(start_paused = true)]
async fn observation_and_overlay_follow_the_face() {
    let (camera, _released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(manual_only(), camera, models(true, true));
    wait_until_live(&mut handle).await;

    let overlay = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(SessionEvent::Overlay(commands)) = handle.next_event().await {
                return commands;
            }
        }
    })
    .await
    .expect("an overlay should be emitted");
    assert!(overlay.len() >= 2);

    let face = handle.observation();
    assert!(face.found);
    assert_eq!(face.pose(), Pose::Front);
    assert!((face.coverage - 0.24).abs() < 1e-3);
}

#[tokio::test(start_paused = true)]
async fn manual_capture_remove_and_reset() {
    let (camera, _released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(manual_only(), camera, models(true, true));
    wait_until_live(&mut handle).await;
    wait_for_quality(&mut handle).await;

    handle.capture_now().unwrap();
    let first = next_capture(&mut handle).await;
    assert_eq!(first.origin, CaptureOrigin::Manual);
    assert_eq!(first.id, 1);

    handle.capture_now().unwrap();
    let second = next_capture(&mut handle).await;
    assert_eq!(second.id, 2);

    handle.remove(first.id).unwrap();
    loop {
        if let Some(SessionEvent::Removed(id)) = handle.next_event().await {
            assert_eq!(id, first.id);
            break;
        }
    }

    handle.reset().unwrap();
    loop {
        if let Some(SessionEvent::Reset) = handle.next_event().await {
            break;
        }
    }
    assert!(handle.stop().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_capture_respects_budget() {
    let (camera, _released) = ScriptedCamera::new();
    let mut config = manual_only();
    config.auto_capture.budget = 1;
    let mut handle = CaptureSession::start(config, camera, models(true, true));
    wait_until_live(&mut handle).await;
    wait_for_quality(&mut handle).await;

    handle.capture_now().unwrap();
    next_capture(&mut handle).await;
    handle.capture_now().unwrap();
    let failure = loop {
        match handle.next_event().await {
            Some(SessionEvent::CaptureFailed(reason)) => break reason,
            Some(SessionEvent::Captured(_)) => panic!("budget exceeded"),
            Some(_) => {}
            None => panic!("session ended"),
        }
    };
    assert!(failure.contains("budget"));
    assert_eq!(handle.stop().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn gpu_failure_falls_back_to_cpu() {
    let (camera, _released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(VisionConfig::default(), camera, models(false, true));
    assert_eq!(wait_until_live(&mut handle).await, Delegate::Cpu);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn model_failure_ends_session_and_releases_camera() {
    let (camera, released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(VisionConfig::default(), camera, models(false, false));
    assert_eq!(next_status(&mut handle).await, Some(SessionStatus::Starting));
    match next_status(&mut handle).await {
        Some(SessionStatus::Error(message)) => {
            assert!(message.contains("gpu"));
            assert!(message.contains("cpu"));
        }
        other => panic!("expected an error status, got {other:?}"),
    }
    assert!(handle.next_event().await.is_none());
    assert!(released.load(Ordering::SeqCst));
    assert!(matches!(handle.capture_now(), Err(VisionError::SessionClosed)));
}

#[tokio::test(start_paused = true)]
async fn camera_denial_is_reported() {
    let (mut camera, released) = ScriptedCamera::new();
    camera.fail_open = true;
    let mut handle = CaptureSession::start(VisionConfig::default(), camera, models(true, true));
    assert_eq!(next_status(&mut handle).await, Some(SessionStatus::Starting));
    assert!(matches!(next_status(&mut handle).await, Some(SessionStatus::Error(m)) if m.contains("permission")));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn ended_stream_stops_the_session() {
    let (mut camera, released) = ScriptedCamera::new();
    camera.frames_left = Some(5);
    let mut handle = CaptureSession::start(manual_only(), camera, models(true, true));
    wait_until_live(&mut handle).await;

    assert!(matches!(next_status(&mut handle).await, Some(SessionStatus::Error(_))));
    assert_eq!(next_status(&mut handle).await, Some(SessionStatus::Stopped));
    assert!(released.load(Ordering::SeqCst));
    assert!(matches!(handle.stop().await, Err(VisionError::SessionClosed)));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_releases_the_camera() {
    let (camera, released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(VisionConfig::default(), camera, models(true, true));
    wait_until_live(&mut handle).await;
    assert!(!released.load(Ordering::SeqCst));

    drop(handle);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn detector_errors_read_as_no_face() {
    let (camera, _released) = ScriptedCamera::new();
    let mut handle = CaptureSession::start(VisionConfig::default(), camera, Arc::new(BrokenModels));
    wait_until_live(&mut handle).await;

    let sample = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(SessionEvent::Quality(sample)) = handle.next_event().await {
                return sample;
            }
        }
    })
    .await
    .expect("sampling continues while detection fails");
    assert!(sample.warnings.contains(&QualityWarning::NoFace));
    assert!(!handle.observation().found);

    // Nothing good enough to fire on.
    assert!(timeout(Duration::from_secs(8), next_capture(&mut handle)).await.is_err());
    assert!(handle.stop().await.unwrap().is_empty());
}
