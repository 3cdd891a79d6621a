//! # Vision
//!
//! Everything between a target window and a confidence score:
//!
//! - [`capture`]: window capture with a three-strategy fallback chain
//! - [`xcap_backend`]: the default capture backend built on `xcap`
//! - [`template_cache`]: per-run store of decoded icon templates
//! - [`matcher`]: normalized correlation template matching
//!
//! Frames and templates carry the id of the run that produced them so a
//! frame is never scored against a template loaded by another run.

use image::{GrayImage, RgbaImage};
use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use matcher::SummedArea;

pub mod capture;
pub mod matcher;
pub mod template_cache;
pub mod xcap_backend;

/// Opaque id of an OS window. Only borrowed for the duration of a call.
pub type WindowHandle = u32;

/// Screen rectangle of a window at capture time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_origin_size(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x.saturating_add(width as i32),
            bottom: y.saturating_add(height as i32),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Overlap of two rectangles, if any.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };
        (!r.is_empty()).then_some(r)
    }
}

/// One captured snapshot of a target window.
pub struct Frame {
    image: RgbaImage,
    run_id: Uuid,
    luma: OnceCell<GrayImage>,
    sums: OnceCell<SummedArea>,
}

impl Frame {
    pub fn new(image: RgbaImage, run_id: Uuid) -> Self {
        Self {
            image,
            run_id,
            luma: OnceCell::new(),
            sums: OnceCell::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Single-channel intensity view, converted on first use.
    pub fn luma(&self) -> &GrayImage {
        self.luma
            .get_or_init(|| image::imageops::grayscale(&self.image))
    }

    /// Summed-area tables over [`Frame::luma`], shared by every comparison.
    pub(crate) fn sums(&self) -> &SummedArea {
        self.sums.get_or_init(|| SummedArea::new(self.luma()))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Frame pixels per screen unit of `rect` along x and y.
    ///
    /// Capture backends may return physical pixels while window rectangles
    /// are in logical units, so this is 2.0 on a 200% display.
    pub fn pixel_scale(&self, rect: &Rect) -> (f64, f64) {
        let ratio = |pixels: u32, units: u32| {
            if pixels == 0 || units == 0 {
                1.0
            } else {
                pixels as f64 / units as f64
            }
        };
        (ratio(self.width(), rect.width()), ratio(self.height(), rect.height()))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// A decoded icon, kept in intensity form.
#[derive(Debug)]
pub struct Template {
    path: PathBuf,
    luma: GrayImage,
    run_id: Uuid,
}

impl Template {
    pub fn new(path: impl Into<PathBuf>, image: &image::DynamicImage, run_id: Uuid) -> Self {
        Self {
            path: path.into(),
            luma: image.to_luma8(),
            run_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn luma(&self) -> &GrayImage {
        &self.luma
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_empty(&self) -> bool {
        self.luma.width() == 0 || self.luma.height() == 0
    }
}

/// Score and best location of one frame/template comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Normalized correlation in `[-1, 1]`.
    pub confidence: f32,
    /// Top-left of the best alignment, in frame pixels.
    pub location: (u32, u32),
    pub template: PathBuf,
}

impl MatchResult {
    /// Copy with `location` divided by a [`Frame::pixel_scale`], i.e. moved
    /// from frame pixels into the screen units of the window rectangle.
    pub fn to_window_units(&self, (sx, sy): (f64, f64)) -> MatchResult {
        let (x, y) = self.location;
        MatchResult {
            location: ((x as f64 / sx).round() as u32, (y as f64 / sy).round() as u32),
            ..self.clone()
        }
    }
}
