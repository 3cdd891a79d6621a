//! Default [`CaptureBackend`] built on `xcap`.
//!
//! Windows are addressed by their xcap id. `xcap` exposes a single per-window
//! capture path, which serves as the direct surface strategy; there is no
//! separate compositor path, so that strategy reports `Unsupported` and the
//! chain falls through to the desktop copy.
//!
//! Window and monitor geometry from xcap is in logical units while captured
//! images may be in physical pixels. The desktop copy keeps the monitor's
//! pixel density, and the loop rescales match locations by
//! [`Frame::pixel_scale`](super::Frame::pixel_scale).

use image::RgbaImage;
use xcap::{Monitor, Window};

use super::capture::CaptureBackend;
use super::{Rect, WindowHandle};
use crate::cancel::CancelToken;
use crate::error::CaptureError;

#[derive(Debug, Default, Clone, Copy)]
pub struct XcapBackend;

/// Summary of a capturable window, for selection front-ends.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub app_name: String,
    pub title: String,
    pub rect: Rect,
    pub minimized: bool,
}

fn backend_err(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::Backend(e.to_string())
}

/// xcap may be built against a different `image` release than ours.
fn to_rgba(width: u32, height: u32, raw: Vec<u8>) -> Result<RgbaImage, CaptureError> {
    RgbaImage::from_raw(width, height, raw)
        .ok_or_else(|| CaptureError::Backend("capture buffer size mismatch".into()))
}

fn find(handle: WindowHandle) -> Result<Window, CaptureError> {
    Window::all()
        .map_err(backend_err)?
        .into_iter()
        .find(|w| w.id().ok() == Some(handle))
        .ok_or(CaptureError::WindowNotFound(handle))
}

fn rect_of(window: &Window) -> Result<Rect, CaptureError> {
    Ok(Rect::from_origin_size(
        window.x().map_err(backend_err)?,
        window.y().map_err(backend_err)?,
        window.width().map_err(backend_err)?,
        window.height().map_err(backend_err)?,
    ))
}

fn monitor_rect(monitor: &Monitor) -> Result<Rect, CaptureError> {
    Ok(Rect::from_origin_size(
        monitor.x().map_err(backend_err)?,
        monitor.y().map_err(backend_err)?,
        monitor.width().map_err(backend_err)?,
        monitor.height().map_err(backend_err)?,
    ))
}

/// Index of the monitor showing the largest part of `rect`.
fn pick_monitor(monitors: &[Rect], rect: Rect) -> Option<usize> {
    monitors
        .iter()
        .enumerate()
        .filter_map(|(i, m)| {
            let overlap = rect.intersect(m)?;
            Some((i, overlap.width() as u64 * overlap.height() as u64))
        })
        .max_by_key(|&(_, area)| area)
        .map(|(i, _)| i)
}

/// Cut the window out of a monitor image.
///
/// `monitor` is the monitor's logical bounds and `screen` its image, which may
/// be denser. The result has the screen's density and the window's full size,
/// with the parts outside the monitor left black so match locations stay
/// relative to the window's top-left.
fn crop_to_window(screen: &RgbaImage, monitor: Rect, rect: Rect) -> Result<RgbaImage, CaptureError> {
    let visible = rect.intersect(&monitor).ok_or(CaptureError::OffScreen)?;
    let scale_x = screen.width() as f64 / monitor.width() as f64;
    let scale_y = screen.height() as f64 / monitor.height() as f64;
    let phys = |logical: i32, scale: f64| (logical as f64 * scale).round().max(0.0) as u32;

    let x = phys(visible.left - monitor.left, scale_x).min(screen.width());
    let y = phys(visible.top - monitor.top, scale_y).min(screen.height());
    let w = phys(visible.right - monitor.left, scale_x).min(screen.width()) - x;
    let h = phys(visible.bottom - monitor.top, scale_y).min(screen.height()) - y;
    if w == 0 || h == 0 {
        return Err(CaptureError::OffScreen);
    }
    let visible_part = image::imageops::crop_imm(screen, x, y, w, h).to_image();

    let mut frame = RgbaImage::new(
        phys(rect.width() as i32, scale_x).max(1),
        phys(rect.height() as i32, scale_y).max(1),
    );
    image::imageops::replace(
        &mut frame,
        &visible_part,
        phys(visible.left - rect.left, scale_x) as i64,
        phys(visible.top - rect.top, scale_y) as i64,
    );
    Ok(frame)
}

impl XcapBackend {
    pub fn new() -> Self {
        Self
    }

    /// Every window xcap can see.
    pub fn list_windows() -> Result<Vec<WindowInfo>, CaptureError> {
        let windows = Window::all().map_err(backend_err)?;
        Ok(windows
            .iter()
            .filter_map(|w| {
                Some(WindowInfo {
                    handle: w.id().ok()?,
                    app_name: w.app_name().unwrap_or_default(),
                    title: w.title().unwrap_or_default(),
                    rect: rect_of(w).ok()?,
                    minimized: w.is_minimized().unwrap_or(false),
                })
            })
            .collect())
    }

    /// First window owned by `process_name` (case-insensitive), preferring
    /// windows that are not minimized.
    pub fn find_window(process_name: &str) -> Result<WindowInfo, CaptureError> {
        let wanted = process_name.trim_end_matches(".exe");
        let mut candidates: Vec<WindowInfo> = Self::list_windows()?
            .into_iter()
            .filter(|w| w.app_name.trim_end_matches(".exe").eq_ignore_ascii_case(wanted))
            .collect();
        candidates.sort_by_key(|w| w.minimized);
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| CaptureError::Backend(format!("no window for process '{process_name}'")))
    }
}

impl CaptureBackend for XcapBackend {
    fn window_rect(&self, handle: WindowHandle) -> Result<Rect, CaptureError> {
        rect_of(&find(handle)?)
    }

    fn capture_surface(
        &self,
        handle: WindowHandle,
        _cancel: &CancelToken,
    ) -> Result<RgbaImage, CaptureError> {
        let window = find(handle)?;
        if window.is_minimized().map_err(backend_err)? {
            return Err(CaptureError::Minimized);
        }
        let image = window.capture_image().map_err(backend_err)?;
        to_rgba(image.width(), image.height(), image.into_raw())
    }

    fn capture_composited(
        &self,
        _handle: WindowHandle,
        _cancel: &CancelToken,
    ) -> Result<RgbaImage, CaptureError> {
        Err(CaptureError::Unsupported)
    }

    fn capture_desktop_region(
        &self,
        rect: Rect,
        _cancel: &CancelToken,
    ) -> Result<RgbaImage, CaptureError> {
        let monitors = Monitor::all().map_err(backend_err)?;
        let bounds = monitors
            .iter()
            .map(monitor_rect)
            .collect::<Result<Vec<_>, _>>()?;
        let idx = pick_monitor(&bounds, rect).ok_or(CaptureError::OffScreen)?;

        let screen = monitors[idx].capture_image().map_err(backend_err)?;
        let screen = to_rgba(screen.width(), screen.height(), screen.into_raw())?;
        crop_to_window(&screen, bounds[idx], rect)
    }

    fn is_foreground(&self, handle: WindowHandle) -> Result<bool, CaptureError> {
        let window = find(handle)?;
        Ok(window.is_focused().map_err(backend_err)? && !window.is_minimized().map_err(backend_err)?)
    }
}
