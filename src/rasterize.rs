//! Shape rasterization into class-index masks.
//!
//! Pixel `(x, y)` is centred on the integer coordinate `(x, y)`, the same convention LabelMe uses
//! for its points. Polygons are filled with a scanline pass (crossings on each row taken with the
//! half-open rule `min(y0, y1) <= y < max(y0, y1)`, pixels filled from `ceil(xa)` to `floor(xb)`)
//! and their outline is drawn on top, so boundary pixels always belong to the shape.
//!
//! Lines and line strips are stroked [`LINE_WIDTH`] pixels wide with flat ends, one segment at a
//! time. Points become discs of radius [`POINT_RADIUS`].

use log::{debug, warn};
use std::borrow::Cow;

use crate::error::{MaskError, Result};
use crate::scheme::LabelIndexMap;
use crate::types::Shape;

/// Stroke width of `line` and `linestrip` shapes
pub const LINE_WIDTH: f64 = 10.0;

/// Radius of the disc drawn for a `point` shape
pub const POINT_RADIUS: f64 = 5.0;

/// A grid of class indices, row-major, 0 meaning background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl LabelMask {
    /// An all-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Wrap existing row-major data; `None` if the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn contains(&self, value: u8) -> bool {
        self.data.contains(&value)
    }

    // Out-of-bounds writes are dropped
    #[inline]
    fn paint(&mut self, x: i64, y: i64, value: u8) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }
}

enum Region<'a> {
    Polygon(Cow<'a, [(f64, f64)]>),
    Circle { center: (f64, f64), radius: f64 },
    Polyline { points: &'a [(f64, f64)], width: f64 },
}

/// Rasterize `shapes` onto a `height` x `width` mask.
///
/// Shapes are painted in order, so later shapes overwrite earlier ones where they overlap.
/// Shapes whose label is not in `labels` are left out. Unknown shape types are skipped with a
/// warning.
pub fn rasterize_shapes(
    height: u32,
    width: u32,
    shapes: &[Shape],
    labels: &LabelIndexMap,
) -> Result<LabelMask> {
    let mut mask = LabelMask::new(width, height);

    for (index, shape) in shapes.iter().enumerate() {
        let Some(value) = labels.get(&shape.label) else {
            debug!(
                "Skipping shape #{} with unmapped label '{}'",
                index, shape.label
            );
            continue;
        };

        match region_of(index, shape)? {
            Some(Region::Polygon(points)) => fill_polygon(&mut mask, &points, value),
            Some(Region::Circle { center, radius }) => fill_circle(&mut mask, center, radius, value),
            Some(Region::Polyline { points, width }) => {
                for pair in points.windows(2) {
                    stroke_segment(&mut mask, pair[0], pair[1], width / 2.0, value);
                }
            }
            None => {}
        }
    }

    Ok(mask)
}

fn region_of(index: usize, shape: &Shape) -> Result<Option<Region<'_>>> {
    let points = &shape.points;
    let expect_count = |kind: &str, count: usize| {
        if points.len() == count {
            Ok(())
        } else {
            Err(MaskError::invalid_shape(
                index,
                &shape.label,
                format!("{} needs exactly {} points, got {}", kind, count, points.len()),
            ))
        }
    };

    match shape.shape_type.as_str() {
        "polygon" => {
            if points.len() < 3 {
                return Err(MaskError::invalid_shape(
                    index,
                    &shape.label,
                    format!("polygon needs at least 3 points, got {}", points.len()),
                ));
            }
            Ok(Some(Region::Polygon(Cow::Borrowed(points))))
        }
        "rectangle" => {
            expect_count("rectangle", 2)?;
            let (x1, y1) = points[0];
            let (x2, y2) = points[1];
            Ok(Some(Region::Polygon(Cow::Owned(vec![
                (x1, y1),
                (x2, y1),
                (x2, y2),
                (x1, y2),
            ]))))
        }
        "circle" => {
            expect_count("circle", 2)?;
            let (cx, cy) = points[0];
            let (px, py) = points[1];
            Ok(Some(Region::Circle {
                center: (cx, cy),
                radius: (cx - px).hypot(cy - py),
            }))
        }
        "line" => {
            expect_count("line", 2)?;
            Ok(Some(Region::Polyline {
                points,
                width: LINE_WIDTH,
            }))
        }
        "linestrip" => {
            if points.len() < 2 {
                return Err(MaskError::invalid_shape(
                    index,
                    &shape.label,
                    format!("linestrip needs at least 2 points, got {}", points.len()),
                ));
            }
            Ok(Some(Region::Polyline {
                points,
                width: LINE_WIDTH,
            }))
        }
        "point" => {
            expect_count("point", 1)?;
            Ok(Some(Region::Circle {
                center: points[0],
                radius: POINT_RADIUS,
            }))
        }
        other => {
            warn!(
                "Skipping shape #{} with label '{}': unsupported shape type '{}'",
                index, shape.label, other
            );
            Ok(None)
        }
    }
}

fn fill_polygon(mask: &mut LabelMask, points: &[(f64, f64)], value: u8) {
    let (w, h) = (mask.width as i64, mask.height as i64);
    if w == 0 || h == 0 {
        return;
    }

    let (y_lo, y_hi) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });
    let first_row = (y_lo.ceil() as i64).max(0);
    let last_row = (y_hi.floor() as i64).min(h - 1);

    let n = points.len();
    let mut crossings = Vec::with_capacity(n);
    for y in first_row..=last_row {
        let yf = y as f64;
        crossings.clear();
        for i in 0..n {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            if (y0 <= yf && yf < y1) || (y1 <= yf && yf < y0) {
                crossings.push(x0 + (yf - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = (span[0].ceil() as i64).max(0);
            let end = (span[1].floor() as i64).min(w - 1);
            for x in start..=end {
                mask.paint(x, y, value);
            }
        }
    }

    for i in 0..n {
        draw_segment(mask, points[i], points[(i + 1) % n], value);
    }
}

fn fill_circle(mask: &mut LabelMask, (cx, cy): (f64, f64), radius: f64, value: u8) {
    let (w, h) = (mask.width as i64, mask.height as i64);
    let r2 = radius * radius;

    let x_start = ((cx - radius).ceil() as i64).max(0);
    let x_end = ((cx + radius).floor() as i64).min(w - 1);
    let y_start = ((cy - radius).ceil() as i64).max(0);
    let y_end = ((cy + radius).floor() as i64).min(h - 1);

    for y in y_start..=y_end {
        let dy = y as f64 - cy;
        for x in x_start..=x_end {
            let dx = x as f64 - cx;
            if dx * dx + dy * dy <= r2 {
                mask.paint(x, y, value);
            }
        }
    }
}

// Pixels whose centre projects onto `a`-`b` and lies within `half_width` of it
fn stroke_segment(
    mask: &mut LabelMask,
    a: (f64, f64),
    b: (f64, f64),
    half_width: f64,
    value: u8,
) {
    let (w, h) = (mask.width as i64, mask.height as i64);
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        fill_circle(mask, a, half_width, value);
        return;
    }

    let x_start = ((a.0.min(b.0) - half_width).ceil() as i64).max(0);
    let x_end = ((a.0.max(b.0) + half_width).floor() as i64).min(w - 1);
    let y_start = ((a.1.min(b.1) - half_width).ceil() as i64).max(0);
    let y_end = ((a.1.max(b.1) + half_width).floor() as i64).min(h - 1);
    let limit = half_width * half_width * len2;

    for y in y_start..=y_end {
        let py = y as f64 - a.1;
        for x in x_start..=x_end {
            let px = x as f64 - a.0;
            let along = px * dx + py * dy;
            if along < 0.0 || along > len2 {
                continue;
            }
            let across = px * dy - py * dx;
            if across * across <= limit {
                mask.paint(x, y, value);
            }
        }
    }
}

// Clip to the pixel area first so far-away vertices cost nothing
fn draw_segment(mask: &mut LabelMask, a: (f64, f64), b: (f64, f64), value: u8) {
    let x_max = mask.width as f64 - 0.5;
    let y_max = mask.height as f64 - 0.5;
    let Some((a, b)) = clip_segment(a, b, (-0.5, -0.5), (x_max, y_max)) else {
        return;
    };

    let (mut x, mut y) = (a.0.round() as i64, a.1.round() as i64);
    let (x1, y1) = (b.0.round() as i64, b.1.round() as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        mask.paint(x, y, value);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Liang-Barsky clipping of segment `a`-`b` against the box `lo`..`hi`.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    lo: (f64, f64),
    hi: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);

    for (p, q) in [
        (-dx, a.0 - lo.0),
        (dx, hi.0 - a.0),
        (-dy, a.1 - lo.1),
        (dy, hi.1 - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
    }

    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_segment_inside_is_unchanged() {
        let clipped = clip_segment((1.0, 1.0), (3.0, 2.0), (-0.5, -0.5), (9.5, 9.5));
        assert_eq!(clipped, Some(((1.0, 1.0), (3.0, 2.0))));
    }

    #[test]
    fn test_clip_segment_outside_is_dropped() {
        assert!(clip_segment((20.0, 1.0), (30.0, 5.0), (-0.5, -0.5), (9.5, 9.5)).is_none());
        assert!(clip_segment((-5.0, -5.0), (-1.0, 20.0), (-0.5, -0.5), (9.5, 9.5)).is_none());
    }

    #[test]
    fn test_clip_segment_crossing_is_trimmed() {
        let ((ax, ay), (bx, by)) =
            clip_segment((-10.5, 2.0), (19.5, 2.0), (-0.5, -0.5), (9.5, 9.5)).unwrap();
        assert!((ax + 0.5).abs() < 1e-9 && ay == 2.0);
        assert!((bx - 9.5).abs() < 1e-9 && by == 2.0);
    }

    #[test]
    fn test_segment_with_far_vertex_only_paints_in_bounds() {
        let mut mask = LabelMask::new(4, 4);
        draw_segment(&mut mask, (0.0, 0.0), (1.0e12, 0.0), 1);
        assert_eq!(&mask.as_raw()[..4], &[1, 1, 1, 1]);
        assert!(mask.as_raw()[4..].iter().all(|&v| v == 0));
    }
}
