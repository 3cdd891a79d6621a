//! # Template matching
//!
//! Scores a frame against a template with the zero-mean normalized
//! correlation coefficient:
//!
//! ```text
//!            Σ (T - mean T)(I - mean I)
//! r = ---------------------------------------
//!     sqrt(Σ (T - mean T)² · Σ (I - mean I)²)
//! ```
//!
//! The raw cross-correlation `Σ T·I` comes from
//! `imageproc::template_matching::match_template_parallel`; the window sums of
//! `I` and `I²` come from summed-area tables built once per frame. Scores are
//! in `[-1, 1]`, so brightness shifts between icon and screen don't matter.
//!
//! Pure function of its inputs; safe to call from any thread.

use image::GrayImage;
use imageproc::template_matching::{MatchTemplateMethod, match_template_parallel};

use super::{Frame, MatchResult, Template};
use crate::error::InvalidTemplate;

/// Below this a window or template is treated as perfectly flat.
const FLAT_EPSILON: f64 = 1e-6;

/// Summed-area tables of pixel values and squared pixel values.
pub struct SummedArea {
    width: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl SummedArea {
    pub fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = image.get_pixel(x as u32, y as u32)[0] as u64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self { width: stride, sum, sq_sum }
    }

    /// `(Σ v, Σ v²)` over the `w`×`h` window whose top-left is `(x, y)`.
    pub fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let at = |table: &[u64], xx: usize, yy: usize| table[yy * self.width + xx];
        let area = |table: &[u64]| {
            (at(table, x + w, y + h) + at(table, x, y)) as i128
                - (at(table, x + w, y) + at(table, x, y + h)) as i128
        };
        (area(&self.sum) as f64, area(&self.sq_sum) as f64)
    }
}

/// Find the best alignment of `template` within `frame`.
pub fn match_template(frame: &Frame, template: &Template) -> Result<MatchResult, InvalidTemplate> {
    if template.is_empty() {
        return Err(InvalidTemplate::Empty(template.path().to_path_buf()));
    }
    if template.run_id() != frame.run_id() {
        return Err(InvalidTemplate::ForeignRun(template.path().to_path_buf()));
    }

    let tpl = template.luma();
    let (tw, th) = (tpl.width(), tpl.height());
    if tw > frame.width() || th > frame.height() {
        log::debug!(
            "Template {} ({}x{}) larger than frame ({}x{})",
            template.path().display(),
            tw,
            th,
            frame.width(),
            frame.height()
        );
        return Ok(MatchResult {
            confidence: -1.0,
            location: (0, 0),
            template: template.path().to_path_buf(),
        });
    }

    let (confidence, location) = correlation_peak(frame.luma(), frame.sums(), tpl);
    Ok(MatchResult {
        confidence,
        location,
        template: template.path().to_path_buf(),
    })
}

/// Highest correlation coefficient and its top-left offset. Ties keep the first
/// offset in row-major order.
fn correlation_peak(image: &GrayImage, sums: &SummedArea, tpl: &GrayImage) -> (f32, (u32, u32)) {
    let (tw, th) = (tpl.width() as usize, tpl.height() as usize);
    let n = (tw * th) as f64;

    let (t_sum, t_sq) = tpl.pixels().fold((0f64, 0f64), |(s, sq), p| {
        let v = p[0] as f64;
        (s + v, sq + v * v)
    });
    let t_var = t_sq - t_sum * t_sum / n;

    let cross = match_template_parallel(image, tpl, MatchTemplateMethod::CrossCorrelation);

    let mut best = (f32::NEG_INFINITY, (0u32, 0u32));
    for y in 0..cross.height() {
        for x in 0..cross.width() {
            let (i_sum, i_sq) = sums.window(x as usize, y as usize, tw, th);
            let i_var = i_sq - i_sum * i_sum / n;

            let score: f64 = if t_var <= FLAT_EPSILON {
                if i_var <= FLAT_EPSILON { 1.0 } else { 0.0 }
            } else if i_var <= FLAT_EPSILON {
                0.0
            } else {
                let numerator = cross.get_pixel(x, y)[0] as f64 - t_sum * i_sum / n;
                (numerator / (t_var * i_var).sqrt()).clamp(-1.0, 1.0)
            };
            let score = score as f32;

            if score > best.0 {
                best = (score, (x, y));
            }
        }
    }
    best
}
