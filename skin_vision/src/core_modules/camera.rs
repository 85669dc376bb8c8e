// THEORY:
// The camera is an external capability. The engine only needs three things from
// it: open the stream, hand over the next frame, and release the stream. The
// release is the part that must never be skipped, so acquisition goes through a
// `CameraGuard` whose `Drop` releases the camera. Whoever owns the guard (the
// session task) can return early, fail, or be aborted, and the camera still
// goes dark.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core_modules::frame::frame::Frame;
use crate::error::VisionResult;

/// A live video source.
#[async_trait]
pub trait CameraSource: Send {
    /// Acquires the stream. Permission problems surface as `CameraUnavailable`.
    async fn open(&mut self) -> VisionResult<()>;

    /// Waits for the next frame. `None` means the stream ended.
    ///
    /// Must be cancel-safe: the session drops this future whenever another
    /// event wins the race, and no frame may be lost mid-delivery.
    async fn next_frame(&mut self) -> Option<Frame>;

    /// Stops the stream. Called exactly once per successful or failed `open`.
    fn release(&mut self);
}

/// Owns an opened camera and releases it on drop.
pub struct CameraGuard<C: CameraSource> {
    camera: Option<C>,
}

impl<C: CameraSource> CameraGuard<C> {
    /// Opens `camera`. A failed open still releases whatever it half-acquired.
    pub async fn acquire(mut camera: C) -> VisionResult<Self> {
        if let Err(e) = camera.open().await {
            warn!(error = %e, "camera open failed");
            camera.release();
            return Err(e);
        }
        debug!("camera acquired");
        Ok(Self { camera: Some(camera) })
    }

    /// Waits for the next frame; `None` once the stream ended or was released.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        match self.camera.as_mut() {
            Some(camera) => camera.next_frame().await,
            None => None,
        }
    }

    /// Releases the camera now instead of at drop.
    pub fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.release();
            debug!("camera released");
        }
    }

    pub fn is_active(&self) -> bool {
        self.camera.is_some()
    }
}

impl<C: CameraSource> Drop for CameraGuard<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VisionError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCamera {
        fail_open: bool,
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraSource for CountingCamera {
        async fn open(&mut self) -> VisionResult<()> {
            if self.fail_open {
                Err(VisionError::camera("permission denied"))
            } else {
                Ok(())
            }
        }

        async fn next_frame(&mut self) -> Option<Frame> {
            None
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn guard_releases_exactly_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let camera = CountingCamera { fail_open: false, releases: releases.clone() };
        let mut guard = CameraGuard::acquire(camera).await.unwrap();
        assert!(guard.is_active());
        guard.release();
        assert!(!guard.is_active());
        assert!(guard.next_frame().await.is_none());
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        let camera = CountingCamera { fail_open: false, releases: releases.clone() };
        {
            let _guard = CameraGuard::acquire(camera).await.unwrap();
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_open_still_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        let camera = CountingCamera { fail_open: true, releases: releases.clone() };
        let err = CameraGuard::acquire(camera).await.err().unwrap();
        assert!(matches!(err, VisionError::CameraUnavailable(_)));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
