//! # Window capture
//!
//! [`CaptureProvider::capture_window`] tries three strategies in order and
//! returns the first frame it gets:
//!
//! 1. [`CaptureStrategy::DirectSurface`]: copy of the window's own surface.
//!    Fastest, but fails for occluded / minimized windows on some platforms.
//! 2. [`CaptureStrategy::Compositor`]: compositor-assisted full-content capture.
//! 3. [`CaptureStrategy::DesktopRegion`]: desktop copy clipped to the window rect.
//!
//! A failing strategy is reported once per run; later failures of the same
//! strategy stay quiet until [`CaptureProvider::reset_diagnostics`] re-arms them.

use image::RgbaImage;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::{Frame, Rect, WindowHandle};
use crate::cancel::CancelToken;
use crate::error::{CaptureError, CaptureUnavailable};
use crate::events::Diagnostics;
use crate::perf::PerfScope;

/// Capture calls slower than this are reported as a performance diagnostic.
pub const SLOW_CAPTURE: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    DirectSurface,
    Compositor,
    DesktopRegion,
}

impl CaptureStrategy {
    pub const ALL: [CaptureStrategy; 3] = [
        CaptureStrategy::DirectSurface,
        CaptureStrategy::Compositor,
        CaptureStrategy::DesktopRegion,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CaptureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaptureStrategy::DirectSurface => "direct surface copy",
            CaptureStrategy::Compositor => "compositor capture",
            CaptureStrategy::DesktopRegion => "desktop region copy",
        };
        f.write_str(s)
    }
}

/// Platform capture primitives.
///
/// Implementations that can block for long should watch `cancel`
/// ([`CancelToken::wait_interrupt`] / [`CancelToken::is_interrupted`]) and
/// return [`CaptureError::Interrupted`] when asked to give up.
pub trait CaptureBackend: Send {
    /// Current screen rectangle of the window.
    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, CaptureError>;

    fn capture_surface(
        &self,
        handle: WindowHandle,
        cancel: &CancelToken,
    ) -> Result<RgbaImage, CaptureError>;

    fn capture_composited(
        &self,
        handle: WindowHandle,
        cancel: &CancelToken,
    ) -> Result<RgbaImage, CaptureError>;

    /// Copy of the desktop inside `rect`, clipped to what is on screen.
    fn capture_desktop_region(
        &self,
        rect: Rect,
        cancel: &CancelToken,
    ) -> Result<RgbaImage, CaptureError>;

    /// Whether the window currently has input focus and is not minimized.
    /// Backends that cannot tell report `true`.
    fn is_foreground(&self, _handle: WindowHandle) -> Result<bool, CaptureError> {
        Ok(true)
    }
}

pub struct CaptureProvider {
    backend: Box<dyn CaptureBackend>,
    diag: Diagnostics,
    run_id: Uuid,
    reported: [bool; 3],
}

impl CaptureProvider {
    pub fn new(backend: Box<dyn CaptureBackend>, diag: Diagnostics) -> Self {
        Self {
            backend,
            diag,
            run_id: Uuid::nil(),
            reported: [false; 3],
        }
    }

    /// Tag subsequent frames with `run_id` and re-arm the per-run diagnostics.
    pub fn begin_run(&mut self, run_id: Uuid) {
        self.run_id = run_id;
        self.reset_diagnostics();
    }

    /// Allow each strategy to warn once more.
    pub fn reset_diagnostics(&mut self) {
        self.reported = [false; 3];
    }

    pub fn is_foreground(&self, handle: WindowHandle) -> Result<bool, CaptureError> {
        self.backend.is_foreground(handle)
    }

    /// Snapshot of the window and its current rectangle.
    pub fn capture_window(
        &mut self,
        handle: WindowHandle,
        cancel: &CancelToken,
    ) -> Result<(Frame, Rect), CaptureUnavailable> {
        let _scope = PerfScope::track("capture window", SLOW_CAPTURE, &self.diag);

        let rect = match self.backend.window_rect(handle) {
            Ok(rect) => rect,
            Err(e) => {
                return Err(CaptureUnavailable {
                    handle,
                    attempts: CaptureStrategy::ALL.iter().map(|s| (*s, e.clone())).collect(),
                });
            }
        };

        let mut attempts = Vec::with_capacity(3);
        for strategy in CaptureStrategy::ALL {
            if cancel.is_interrupted() {
                attempts.push((strategy, CaptureError::Interrupted));
                break;
            }

            let result = match strategy {
                CaptureStrategy::DirectSurface => self.backend.capture_surface(handle, cancel),
                CaptureStrategy::Compositor => self.backend.capture_composited(handle, cancel),
                CaptureStrategy::DesktopRegion => self.backend.capture_desktop_region(rect, cancel),
            }
            .and_then(|image| {
                if image.width() == 0 || image.height() == 0 {
                    Err(CaptureError::Backend("empty image".into()))
                } else {
                    Ok(image)
                }
            });

            match result {
                Ok(image) => return Ok((Frame::new(image, self.run_id), rect)),
                Err(e) => {
                    if !self.reported[strategy.index()] {
                        self.reported[strategy.index()] = true;
                        self.diag
                            .warn(format!("Capture of window {handle}: {strategy} failed: {e}"));
                    }
                    attempts.push((strategy, e));
                }
            }
        }

        Err(CaptureUnavailable { handle, attempts })
    }
}
