//! Watermark placement: logical position + rotation → pixel geometry.
//!
//! Pure functions only, like the dimension math in
//! [`imaging`](crate::imaging). The compositor hands in the size of the
//! unrotated watermark layer and gets back where the rotated layer lands.
//!
//! ## Presets
//!
//! Each of the nine anchors maps to a canvas fraction `(fx, fy)` in
//! `{0, ½, 1}²`. Edge and corner anchors are pushed inward by a margin of 3%
//! of the canvas's shorter side, so a bottom-right date never touches the
//! frame:
//!
//! ```text
//! left = fx·(W − w) + (1 − 2·fx)·margin
//! top  = fy·(H − h) + (1 − 2·fy)·margin
//! ```
//!
//! ## Freeform
//!
//! `(x, y)` is the watermark's center as a fraction of the canvas. No margin.
//!
//! ## Clamping
//!
//! Per axis: a box that fits is clamped into the canvas; a box that does not
//! is centered on that axis (negative offset) and left to overflow both sides.

use crate::types::{Placement, Preset};

/// Share of the canvas's shorter side kept free around edge anchors.
pub const MARGIN_FRACTION: f64 = 0.03;

/// Anchor → canvas fraction lookup.
const PRESET_TABLE: [(Preset, (f64, f64)); 9] = [
    (Preset::TopLeft, (0.0, 0.0)),
    (Preset::TopCenter, (0.5, 0.0)),
    (Preset::TopRight, (1.0, 0.0)),
    (Preset::CenterLeft, (0.0, 0.5)),
    (Preset::Center, (0.5, 0.5)),
    (Preset::CenterRight, (1.0, 0.5)),
    (Preset::BottomLeft, (0.0, 1.0)),
    (Preset::BottomCenter, (0.5, 1.0)),
    (Preset::BottomRight, (1.0, 1.0)),
];

/// Where a (possibly rotated) watermark lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Top-left of the rotated bounding box; negative when it overflows.
    pub x: i64,
    pub y: i64,
    /// Size of the rotated bounding box.
    pub width: u32,
    pub height: u32,
    /// Normalized degrees, counter-clockwise.
    pub rotation: f64,
    /// Watermark center in canvas coordinates.
    pub pivot: (f64, f64),
}

impl Geometry {
    /// True when the rotated box lies entirely on the canvas.
    pub fn fits_within(&self, canvas: (u32, u32)) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x + self.width as i64 <= canvas.0 as i64
            && self.y + self.height as i64 <= canvas.1 as i64
    }
}

/// Canvas fraction of an anchor.
pub fn preset_fraction(anchor: Preset) -> (f64, f64) {
    PRESET_TABLE
        .iter()
        .find(|(p, _)| *p == anchor)
        .map(|(_, f)| *f)
        .unwrap_or((0.5, 0.5))
}

/// Margin in pixels for a canvas.
pub fn margin_for(canvas: (u32, u32)) -> u32 {
    (canvas.0.min(canvas.1) as f64 * MARGIN_FRACTION).round() as u32
}

/// Axis-aligned size of a `width × height` box rotated by `degrees`.
///
/// Rounded up, with a small tolerance so right angles do not pick up a
/// stray pixel from float noise.
pub fn rotated_extent(size: (u32, u32), degrees: f64) -> (u32, u32) {
    let (w, h) = (size.0 as f64, size.1 as f64);
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let extent = |v: f64| (v - 1e-6).ceil().max(0.0) as u32;
    (extent(w * cos + h * sin), extent(w * sin + h * cos))
}

/// Resolve a placement to absolute pixel geometry.
///
/// `watermark` is the unrotated layer size; `rotation_degrees` may be any
/// finite value and is normalized here.
pub fn compute_geometry(
    canvas: (u32, u32),
    watermark: (u32, u32),
    placement: &Placement,
    rotation_degrees: f64,
) -> Geometry {
    let rotation = crate::types::normalize_degrees(rotation_degrees);
    let (width, height) = rotated_extent(watermark, rotation);
    let (canvas_w, canvas_h) = (canvas.0 as f64, canvas.1 as f64);
    let (w, h) = (width as f64, height as f64);

    let (left, top) = match *placement {
        Placement::Preset { anchor } => {
            let (fx, fy) = preset_fraction(anchor);
            let margin = margin_for(canvas) as f64;
            (
                fx * (canvas_w - w) + (1.0 - 2.0 * fx) * margin,
                fy * (canvas_h - h) + (1.0 - 2.0 * fy) * margin,
            )
        }
        Placement::Freeform { x, y } => (x * canvas_w - w / 2.0, y * canvas_h - h / 2.0),
    };

    let x = clamp_axis(left, width, canvas.0);
    let y = clamp_axis(top, height, canvas.1);

    Geometry {
        x,
        y,
        width,
        height,
        rotation,
        pivot: (x as f64 + w / 2.0, y as f64 + h / 2.0),
    }
}

fn clamp_axis(start: f64, extent: u32, canvas: u32) -> i64 {
    if extent <= canvas {
        (start.round() as i64).clamp(0, (canvas - extent) as i64)
    } else {
        ((canvas as f64 - extent as f64) / 2.0).round() as i64
    }
}
