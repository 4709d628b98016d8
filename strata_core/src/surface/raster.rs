// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synchronous application of drawing operations to a surface.
//!
//! Everything here runs when an operation reaches the head of its queue and
//! is unblocked; the functions mutate the backing store directly. Path
//! geometry passes through the surface's current transform as it is built
//! (device-space paths), so stroke widths are in device pixels regardless
//! of the transform in effect.
//!
//! Fills rasterize with deterministic pixel-center sampling under the
//! nonzero winding rule; there is no antialiasing. That keeps results
//! bit-exact across runs, which the snapshot and ordering tests rely on.

use alloc::vec;
use alloc::vec::Vec;

use kurbo::{Affine, Arc, BezPath, PathEl, Point, Stroke, StrokeOpts, Vec2};

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::compose::{ChannelMask, Color, TransferFunction};
use crate::pixmap::Pixmap;

use super::queue::StrokeStyle;
use super::{DrawState, Surface};

/// Curve flattening tolerance, in device pixels.
const TOLERANCE: f64 = 0.25;

const TAU: f64 = core::f64::consts::TAU;

/// What a path consumption paints with.
enum Paint<'a> {
    Solid([u8; 4]),
    Pattern(&'a Pixmap),
}

impl Surface {
    /// Starts a fresh path if the current one was already consumed by a
    /// fill/stroke/clip.
    fn begin_path_op(&mut self) {
        if self.path_consumed {
            self.path = BezPath::new();
            self.path_consumed = false;
        }
    }

    #[inline]
    fn device(&self, x: f64, y: f64) -> Point {
        self.state.transform * Point::new(x, y)
    }

    pub(crate) fn apply_move_to(&mut self, x: f64, y: f64) {
        self.begin_path_op();
        let p = self.device(x, y);
        self.path.move_to(p);
    }

    pub(crate) fn apply_line_to(&mut self, x: f64, y: f64) {
        self.begin_path_op();
        let p = self.device(x, y);
        if self.path.elements().is_empty() {
            self.path.move_to(p);
        } else {
            self.path.line_to(p);
        }
    }

    pub(crate) fn apply_curve_to(
        &mut self,
        cp1x: f64,
        cp1y: f64,
        cp2x: f64,
        cp2y: f64,
        x: f64,
        y: f64,
    ) {
        self.begin_path_op();
        let c1 = self.device(cp1x, cp1y);
        let c2 = self.device(cp2x, cp2y);
        let p = self.device(x, y);
        if self.path.elements().is_empty() {
            self.path.move_to(c1);
        }
        self.path.curve_to(c1, c2, p);
    }

    /// Canvas-style arc: connects from the current point to the arc start,
    /// then sweeps from `start` to `end` radians (counterclockwise when
    /// `negative`).
    pub(crate) fn apply_arc(
        &mut self,
        x: f64,
        y: f64,
        radius: f64,
        start: f64,
        end: f64,
        negative: bool,
    ) {
        self.begin_path_op();

        // Degenerate geometry is ignored rather than poisoning the path.
        if !(x.is_finite() && y.is_finite() && start.is_finite() && end.is_finite())
            || !radius.is_finite()
            || radius < 0.0
        {
            return;
        }

        let mut sweep = end - start;
        if negative {
            while sweep > 0.0 {
                sweep -= TAU;
            }
            if sweep < -TAU || (end - start) <= -TAU {
                sweep = -TAU;
            }
        } else {
            while sweep < 0.0 {
                sweep += TAU;
            }
            if sweep > TAU || (end - start) >= TAU {
                sweep = TAU;
            }
        }

        let center = Point::new(x, y);
        let start_pt = center + Vec2::from_angle(start) * radius;
        let device_start = self.state.transform * start_pt;
        if self.path.elements().is_empty() {
            self.path.move_to(device_start);
        } else {
            self.path.line_to(device_start);
        }

        let arc = Arc::new(center, Vec2::new(radius, radius), start, sweep, 0.0);
        let transform = self.state.transform;
        for el in arc.append_iter(TOLERANCE) {
            self.path.push(transform_el(transform, el));
        }
    }

    pub(crate) fn apply_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.begin_path_op();
        self.path.move_to(self.device(x, y));
        self.path.line_to(self.device(x + width, y));
        self.path.line_to(self.device(x + width, y + height));
        self.path.line_to(self.device(x, y + height));
        self.path.close_path();
    }

    pub(crate) fn apply_close(&mut self) {
        self.begin_path_op();
        if !self.path.elements().is_empty() {
            self.path.close_path();
        }
    }

    /// Intersects the clip mask with the current path's coverage.
    pub(crate) fn apply_clip(&mut self) {
        let w = self.pixmap.width();
        let h = self.pixmap.height();
        let mut mask = vec![0_u8; w as usize * h as usize];
        for_each_covered_pixel(self.path.elements(), w, h, |x, y| {
            mask[y as usize * w as usize + x as usize] = 255;
        });
        match &mut self.state.clip {
            Some(existing) => {
                for (dst, src) in existing.iter_mut().zip(mask.iter()) {
                    *dst = (*dst).min(*src);
                }
            }
            clip @ None => *clip = Some(mask),
        }
        self.path_consumed = true;
    }

    pub(crate) fn apply_fill_color(&mut self, color: Color) {
        self.paint_path(self.path.elements().to_vec(), Paint::Solid(color.premultiply()));
        self.path_consumed = true;
    }

    pub(crate) fn apply_stroke_color(&mut self, style: StrokeStyle, color: Color) {
        let outline = self.stroke_outline(style);
        self.paint_path(outline, Paint::Solid(color.premultiply()));
        self.path_consumed = true;
    }

    pub(crate) fn apply_fill_surface(&mut self, pattern: &Pixmap) {
        self.paint_path(self.path.elements().to_vec(), Paint::Pattern(pattern));
        self.path_consumed = true;
    }

    pub(crate) fn apply_stroke_surface(&mut self, style: StrokeStyle, pattern: &Pixmap) {
        let outline = self.stroke_outline(style);
        self.paint_path(outline, Paint::Pattern(pattern));
        self.path_consumed = true;
    }

    /// Expands the current path into its stroke outline.
    fn stroke_outline(&self, style: StrokeStyle) -> Vec<PathEl> {
        let stroke = Stroke::new(style.thickness)
            .with_caps(style.cap.into())
            .with_join(style.join.into())
            .with_miter_limit(self.state.miter_limit);
        kurbo::stroke(
            self.path.elements().iter().copied(),
            &stroke,
            &StrokeOpts::default(),
            TOLERANCE,
        )
        .elements()
        .to_vec()
    }

    fn paint_path(&mut self, els: Vec<PathEl>, paint: Paint<'_>) {
        let mask = self.mask;
        let clip = self.state.clip.clone();
        let w = self.pixmap.width();
        let h = self.pixmap.height();
        for_each_covered_pixel(&els, w, h, |x, y| {
            let src = match &paint {
                Paint::Solid(px) => *px,
                Paint::Pattern(pm) => {
                    if pm.is_empty() {
                        return;
                    }
                    pm.get(x.rem_euclid(pm.width()), y.rem_euclid(pm.height()))
                        .unwrap_or([0; 4])
                }
            };
            self.pixmap.blend_pixel(x, y, src, mask, clip.as_deref());
        });
    }

    pub(crate) fn apply_draw_pixmap(&mut self, x: i32, y: i32, src: &Pixmap) {
        self.fit(x + src.width(), y + src.height());
        let transform = self.state.transform;
        let mask = self.mask;
        let clip = self.state.clip.as_deref();
        self.pixmap.draw_pixmap(
            src,
            0,
            0,
            src.width(),
            src.height(),
            x,
            y,
            transform,
            1.0,
            mask,
            clip,
        );
    }

    pub(crate) fn apply_put(&mut self, x: i32, y: i32, src: &Pixmap) {
        self.fit(x + src.width(), y + src.height());
        self.pixmap.put_rect(src, 0, 0, src.width(), src.height(), x, y);
    }

    pub(crate) fn apply_transfer(
        &mut self,
        x: i32,
        y: i32,
        region: &Pixmap,
        function: TransferFunction,
    ) {
        self.fit(x + region.width(), y + region.height());
        self.pixmap
            .transfer_rect(region, 0, 0, region.width(), region.height(), x, y, function);
    }

    pub(crate) fn apply_push(&mut self) {
        self.stack.push(self.state.clone());
    }

    pub(crate) fn apply_pop(&mut self) {
        if let Some(saved) = self.stack.pop() {
            self.state = saved;
        }
    }

    pub(crate) fn apply_reset(&mut self) {
        self.stack.clear();
        self.state = DrawState::default();
        self.path = BezPath::new();
        self.path_consumed = false;
    }

    pub(crate) fn apply_set_transform(&mut self, matrix: Affine) {
        self.state.transform = matrix;
    }

    pub(crate) fn apply_transform(&mut self, matrix: Affine) {
        self.state.transform = self.state.transform * matrix;
    }

    /// Applies new dimensions. Returns whether anything changed (equal
    /// dimensions are the one no-op case).
    pub(crate) fn apply_resize(&mut self, width: i32, height: i32) -> bool {
        if width == self.width && height == self.height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.pixmap = self.pixmap.resized(width, height);
        // Clip masks are sized to the backing store; sizing discards them.
        self.state.clip = None;
        for saved in &mut self.stack {
            saved.clip = None;
        }
        true
    }

    pub(crate) fn apply_set_channel_mask(&mut self, mask: ChannelMask) {
        self.mask = mask;
    }

    pub(crate) fn apply_set_miter_limit(&mut self, limit: f64) {
        self.state.miter_limit = limit;
    }

    /// Grows an autoresize surface to cover the given lower-right corner.
    fn fit(&mut self, right: i32, bottom: i32) {
        if !self.autoresize {
            return;
        }
        let w = self.width.max(right);
        let h = self.height.max(bottom);
        if w != self.width || h != self.height {
            self.apply_resize(w, h);
        }
    }
}

fn transform_el(a: Affine, el: PathEl) -> PathEl {
    match el {
        PathEl::MoveTo(p) => PathEl::MoveTo(a * p),
        PathEl::LineTo(p) => PathEl::LineTo(a * p),
        PathEl::QuadTo(p1, p2) => PathEl::QuadTo(a * p1, a * p2),
        PathEl::CurveTo(p1, p2, p3) => PathEl::CurveTo(a * p1, a * p2, a * p3),
        PathEl::ClosePath => PathEl::ClosePath,
    }
}

/// Visits every pixel whose center lies inside the path (nonzero winding).
///
/// Subpaths are implicitly closed for coverage purposes. Coordinates are
/// clamped to `0..width × 0..height`.
pub(crate) fn for_each_covered_pixel(
    els: &[PathEl],
    width: i32,
    height: i32,
    mut visit: impl FnMut(i32, i32),
) {
    if width <= 0 || height <= 0 || els.is_empty() {
        return;
    }

    // Flatten to line segments, closing each subpath.
    let mut segments: Vec<(Point, Point)> = Vec::new();
    let mut subpath_start: Option<Point> = None;
    let mut last: Option<Point> = None;
    kurbo::flatten(els.iter().copied(), TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            if let (Some(s), Some(l)) = (subpath_start, last)
                && l != s
            {
                segments.push((l, s));
            }
            subpath_start = Some(p);
            last = Some(p);
        }
        PathEl::LineTo(p) => {
            if let Some(l) = last {
                segments.push((l, p));
            }
            last = Some(p);
        }
        PathEl::ClosePath => {
            if let (Some(s), Some(l)) = (subpath_start, last) {
                if l != s {
                    segments.push((l, s));
                }
                last = Some(s);
            }
        }
        _ => unreachable!("flatten emits only lines"),
    });
    if let (Some(s), Some(l)) = (subpath_start, last)
        && l != s
    {
        segments.push((l, s));
    }

    let mut crossings: Vec<(f64, i32)> = Vec::new();
    for y in 0..height {
        let sample_y = y as f64 + 0.5;
        crossings.clear();
        for &(a, b) in &segments {
            if a.y <= sample_y && b.y > sample_y {
                let t = (sample_y - a.y) / (b.y - a.y);
                crossings.push((a.x + t * (b.x - a.x), 1));
            } else if b.y <= sample_y && a.y > sample_y {
                let t = (sample_y - b.y) / (a.y - b.y);
                crossings.push((b.x + t * (a.x - b.x), -1));
            }
        }
        crossings.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(core::cmp::Ordering::Equal));

        let mut winding = 0;
        for i in 0..crossings.len() {
            winding += crossings[i].1;
            if winding == 0 || i + 1 >= crossings.len() {
                continue;
            }
            let span_start = crossings[i].0;
            let span_end = crossings[i + 1].0;
            // Pixels whose center x + 0.5 falls inside [span_start, span_end).
            let x0 = ((span_start - 0.5).ceil() as i32).max(0);
            let x1 = (((span_end - 0.5).ceil()) as i32).min(width);
            for x in x0..x1 {
                visit(x, y);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(w: i32, h: i32) -> Surface {
        Surface::new(w, h, false)
    }

    fn filled_pixels(s: &Surface) -> usize {
        s.pixmap()
            .data()
            .chunks_exact(4)
            .filter(|px| px[3] != 0)
            .count()
    }

    #[test]
    fn rect_fill_covers_exact_pixels() {
        let mut s = surface(8, 8);
        s.apply_rect(1.0, 1.0, 4.0, 3.0);
        s.apply_fill_color(Color::rgb(255, 0, 0));
        assert_eq!(filled_pixels(&s), 12);
        assert_eq!(s.pixmap().get(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(s.pixmap().get(4, 3), Some([255, 0, 0, 255]));
        assert_eq!(s.pixmap().get(5, 1), Some([0, 0, 0, 0]));
        assert_eq!(s.pixmap().get(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn triangle_fill_is_half_the_square() {
        let mut s = surface(16, 16);
        s.apply_move_to(0.0, 0.0);
        s.apply_line_to(16.0, 0.0);
        s.apply_line_to(0.0, 16.0);
        s.apply_close();
        s.apply_fill_color(Color::BLACK);
        let n = filled_pixels(&s);
        assert!((100..=156).contains(&n), "half-ish coverage, got {n}");
    }

    #[test]
    fn transform_offsets_path_construction() {
        let mut s = surface(8, 8);
        s.apply_set_transform(Affine::translate((3.0, 0.0)));
        s.apply_rect(0.0, 0.0, 2.0, 2.0);
        s.apply_fill_color(Color::BLACK);
        assert_eq!(s.pixmap().get(3, 0), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn path_reusable_until_next_path_op() {
        let mut s = surface(4, 4);
        s.apply_rect(0.0, 0.0, 2.0, 2.0);
        s.apply_fill_color(Color::rgb(10, 0, 0));
        // Same path, second consumption.
        s.apply_set_channel_mask(ChannelMask::SRC);
        s.apply_fill_color(Color::rgb(0, 20, 0));
        assert_eq!(s.pixmap().get(0, 0), Some([0, 20, 0, 255]));
        // A fresh path op starts over.
        s.apply_rect(2.0, 2.0, 2.0, 2.0);
        s.apply_fill_color(Color::rgb(0, 0, 30));
        assert_eq!(s.pixmap().get(2, 2), Some([0, 0, 30, 255]));
        assert_eq!(s.pixmap().get(0, 0), Some([0, 20, 0, 255]), "old rect untouched");
    }

    #[test]
    fn clip_restricts_fill() {
        let mut s = surface(8, 8);
        s.apply_rect(0.0, 0.0, 2.0, 8.0);
        s.apply_clip();
        s.apply_rect(0.0, 0.0, 8.0, 8.0);
        s.apply_fill_color(Color::BLACK);
        assert_eq!(s.pixmap().get(1, 4), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(2, 4), Some([0, 0, 0, 0]));
    }

    #[test]
    fn nested_clips_intersect() {
        let mut s = surface(8, 8);
        s.apply_rect(0.0, 0.0, 4.0, 8.0);
        s.apply_clip();
        s.apply_rect(0.0, 0.0, 8.0, 4.0);
        s.apply_clip();
        s.apply_rect(0.0, 0.0, 8.0, 8.0);
        s.apply_fill_color(Color::BLACK);
        assert_eq!(s.pixmap().get(3, 3), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(5, 3), Some([0, 0, 0, 0]));
        assert_eq!(s.pixmap().get(3, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn push_pop_restores_clip_and_transform() {
        let mut s = surface(8, 8);
        s.apply_push();
        s.apply_set_transform(Affine::translate((4.0, 4.0)));
        s.apply_rect(0.0, 0.0, 1.0, 1.0);
        s.apply_clip();
        s.apply_pop();
        // Transform and clip are back to defaults.
        s.apply_rect(0.0, 0.0, 1.0, 1.0);
        s.apply_fill_color(Color::BLACK);
        assert_eq!(s.pixmap().get(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn pop_on_empty_stack_is_a_no_op() {
        let mut s = surface(2, 2);
        s.apply_pop();
        s.apply_rect(0.0, 0.0, 1.0, 1.0);
        s.apply_fill_color(Color::BLACK);
        assert_eq!(s.pixmap().get(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn reset_clears_stack_path_and_transform() {
        let mut s = surface(4, 4);
        s.apply_push();
        s.apply_set_transform(Affine::translate((2.0, 2.0)));
        s.apply_move_to(0.0, 0.0);
        s.apply_reset();
        s.apply_rect(0.0, 0.0, 1.0, 1.0);
        s.apply_fill_color(Color::BLACK);
        assert_eq!(s.pixmap().get(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(2, 2), Some([0, 0, 0, 0]));
        assert!(s.stack.is_empty());
    }

    #[test]
    fn stroke_covers_line_neighborhood() {
        let mut s = surface(8, 8);
        s.apply_move_to(0.0, 4.0);
        s.apply_line_to(8.0, 4.0);
        s.apply_stroke_color(StrokeStyle::new(2.0), Color::BLACK);
        assert_eq!(s.pixmap().get(4, 3), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(4, 4), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(4, 0), Some([0, 0, 0, 0]));
        assert_eq!(s.pixmap().get(4, 7), Some([0, 0, 0, 0]));
    }

    #[test]
    fn arc_full_circle_fills_disc() {
        let mut s = surface(16, 16);
        s.apply_arc(8.0, 8.0, 6.0, 0.0, TAU, false);
        s.apply_fill_color(Color::BLACK);
        assert_eq!(s.pixmap().get(8, 8), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(8, 3), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(s.pixmap().get(15, 15), Some([0, 0, 0, 0]));
    }

    #[test]
    fn fill_pattern_tiles_source() {
        let mut pattern = Pixmap::new(2, 1);
        pattern.set(0, 0, [255, 0, 0, 255]);
        pattern.set(1, 0, [0, 255, 0, 255]);
        let mut s = surface(4, 1);
        s.apply_rect(0.0, 0.0, 4.0, 1.0);
        s.apply_fill_surface(&pattern);
        assert_eq!(s.pixmap().get(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(s.pixmap().get(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(s.pixmap().get(2, 0), Some([255, 0, 0, 255]));
        assert_eq!(s.pixmap().get(3, 0), Some([0, 255, 0, 255]));
    }

    #[test]
    fn resize_is_a_no_op_only_when_equal() {
        let mut s = surface(4, 4);
        assert!(!s.apply_resize(4, 4));
        assert!(s.apply_resize(2, 2));
        assert_eq!(s.width(), 2);
        assert!(s.apply_resize(-1, 2), "negative dimensions take effect");
        assert_eq!(s.width(), -1);
        assert!(s.pixmap().is_empty());
    }

    #[test]
    fn resize_preserves_overlapping_content() {
        let mut s = surface(4, 4);
        s.apply_rect(0.0, 0.0, 2.0, 2.0);
        s.apply_fill_color(Color::BLACK);
        s.apply_resize(8, 8);
        assert_eq!(s.pixmap().get(1, 1), Some([0, 0, 0, 255]));
        assert_eq!(s.pixmap().get(7, 7), Some([0, 0, 0, 0]));
    }

    #[test]
    fn autoresize_grows_for_draws() {
        let mut s = Surface::new(2, 2, true);
        let mut img = Pixmap::new(4, 4);
        img.fill([1, 2, 3, 255]);
        s.apply_draw_pixmap(3, 3, &img);
        assert_eq!(s.width(), 7);
        assert_eq!(s.height(), 7);
        assert_eq!(s.pixmap().get(6, 6), Some([1, 2, 3, 255]));
    }

    #[test]
    fn fixed_surface_clips_draws_at_bounds() {
        let mut s = surface(2, 2);
        let mut img = Pixmap::new(4, 4);
        img.fill([1, 2, 3, 255]);
        s.apply_draw_pixmap(0, 0, &img);
        assert_eq!(s.width(), 2);
        assert_eq!(s.pixmap().get(1, 1), Some([1, 2, 3, 255]));
    }

    #[test]
    fn covered_pixel_helper_handles_empty_path() {
        let mut hits = 0;
        for_each_covered_pixel(&[], 4, 4, |_, _| hits += 1);
        assert_eq!(hits, 0);
    }
}
