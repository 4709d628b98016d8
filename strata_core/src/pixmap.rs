// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Premultiplied-RGBA8 pixel storage.
//!
//! A [`Pixmap`] is the backing store of one surface: a densely packed
//! `width × height` buffer of premultiplied RGBA bytes. All compositing
//! routines operate on premultiplied pixels; conversion to and from
//! straight alpha happens only at the API edges ([`Pixmap::from_rgba`],
//! transfer functions).

use alloc::vec;
use alloc::vec::Vec;

use kurbo::{Affine, Point};

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::compose::{ChannelMask, Color, TransferFunction};

/// A premultiplied-RGBA8 pixel buffer.
///
/// Dimensions are clamped to zero on construction; a zero-area pixmap is
/// valid and holds no bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pixmap {
    width: i32,
    height: i32,
    data: Vec<u8>,
}

impl Pixmap {
    /// Creates a transparent pixmap. Negative dimensions clamp to zero.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        let w = width.max(0);
        let h = height.max(0);
        Self {
            width: w,
            height: h,
            data: vec![0; w as usize * h as usize * 4],
        }
    }

    /// Creates a pixmap from straight-alpha RGBA bytes, premultiplying.
    ///
    /// Returns `None` if `bytes.len() != width * height * 4` or a dimension
    /// is negative.
    #[must_use]
    pub fn from_rgba(width: i32, height: i32, bytes: &[u8]) -> Option<Self> {
        if width < 0 || height < 0 || bytes.len() != width as usize * height as usize * 4 {
            return None;
        }
        let mut data = Vec::with_capacity(bytes.len());
        for px in bytes.chunks_exact(4) {
            let c = Color::rgba(px[0], px[1], px[2], px[3]).premultiply();
            data.extend_from_slice(&c);
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Creates a pixmap from already-premultiplied RGBA bytes.
    ///
    /// Returns `None` if `bytes.len() != width * height * 4` or a dimension
    /// is negative.
    #[must_use]
    pub fn from_premultiplied(width: i32, height: i32, bytes: Vec<u8>) -> Option<Self> {
        if width < 0 || height < 0 || bytes.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data: bytes,
        })
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Whether the pixmap holds no pixels.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The raw premultiplied bytes, row-major.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the premultiplied pixel at `(x, y)`, or `None` out of bounds.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Writes the premultiplied pixel at `(x, y)`; out of bounds is a no-op.
    pub fn set(&mut self, x: i32, y: i32, px: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Fills the whole pixmap with one premultiplied pixel value.
    pub fn fill(&mut self, px: [u8; 4]) {
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Returns a copy with the given dimensions, preserving the overlapping
    /// region. New area is transparent.
    #[must_use]
    pub fn resized(&self, width: i32, height: i32) -> Self {
        let mut out = Self::new(width, height);
        let w = self.width.min(out.width);
        let h = self.height.min(out.height);
        for y in 0..h {
            let src = self.index(0, y);
            let dst = out.index(0, y);
            out.data[dst..dst + w as usize * 4]
                .copy_from_slice(&self.data[src..src + w as usize * 4]);
        }
        out
    }

    /// Extracts a copy of the rectangle `(x, y, w, h)`.
    ///
    /// Pixels outside this pixmap read as transparent.
    #[must_use]
    pub fn sub(&self, x: i32, y: i32, w: i32, h: i32) -> Self {
        let mut out = Self::new(w, h);
        for v in 0..out.height {
            for u in 0..out.width {
                if let Some(px) = self.get(x + u, y + v) {
                    out.set(u, v, px);
                }
            }
        }
        out
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    #[inline]
    fn clip_allows(clip: Option<&[u8]>, idx: usize) -> bool {
        clip.is_none_or(|m| m.get(idx).copied().unwrap_or(0) != 0)
    }

    /// Composites a premultiplied pixel at `(x, y)` through `mask`,
    /// honoring an optional clip mask sized like this pixmap.
    pub(crate) fn blend_pixel(
        &mut self,
        x: i32,
        y: i32,
        src: [u8; 4],
        mask: ChannelMask,
        clip: Option<&[u8]>,
    ) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        if !Self::clip_allows(clip, y as usize * self.width as usize + x as usize) {
            return;
        }
        let dst = self.get(x, y).unwrap_or([0; 4]);
        self.set(x, y, mask.blend(src, dst));
    }

    /// Composites the rectangle `(sx, sy, sw, sh)` of `src` at `(dx, dy)`.
    ///
    /// `transform` maps destination-placement coordinates to device
    /// coordinates (identity means a plain offset blit). `alpha` scales the
    /// source (1.0 = unchanged). Sampling is nearest-neighbor; a singular
    /// transform draws nothing.
    pub(crate) fn draw_pixmap(
        &mut self,
        src: &Self,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        dx: i32,
        dy: i32,
        transform: Affine,
        alpha: f64,
        mask: ChannelMask,
        clip: Option<&[u8]>,
    ) {
        if sw <= 0 || sh <= 0 || alpha <= 0.0 {
            return;
        }
        let a8 = scale_byte(alpha);

        if transform == Affine::IDENTITY {
            for v in 0..sh {
                for u in 0..sw {
                    let Some(px) = src.get(sx + u, sy + v) else {
                        continue;
                    };
                    self.blend_pixel(dx + u, dy + v, apply_alpha(px, a8), mask, clip);
                }
            }
            return;
        }

        if transform.determinant().abs() < 1e-12 {
            return;
        }
        let inv = transform.inverse();

        // Device-space bounding box of the transformed destination rectangle.
        let rect = kurbo::Rect::new(
            dx as f64,
            dy as f64,
            (dx + sw) as f64,
            (dy + sh) as f64,
        );
        let bbox = transform.transform_rect_bbox(rect);
        let x0 = (bbox.x0.floor() as i32).max(0);
        let y0 = (bbox.y0.floor() as i32).max(0);
        let x1 = (bbox.x1.ceil() as i32).min(self.width);
        let y1 = (bbox.y1.ceil() as i32).min(self.height);

        for py in y0..y1 {
            for px in x0..x1 {
                let q = inv * Point::new(px as f64 + 0.5, py as f64 + 0.5);
                let u = q.x - dx as f64;
                let v = q.y - dy as f64;
                if u < 0.0 || v < 0.0 || u >= sw as f64 || v >= sh as f64 {
                    continue;
                }
                let Some(sample) = src.get(sx + u as i32, sy + v as i32) else {
                    continue;
                };
                self.blend_pixel(px, py, apply_alpha(sample, a8), mask, clip);
            }
        }
    }

    /// Writes the rectangle `(sx, sy, sw, sh)` of `src` at `(dx, dy)` as-is:
    /// no transform, no mask, no clip.
    pub(crate) fn put_rect(&mut self, src: &Self, sx: i32, sy: i32, sw: i32, sh: i32, dx: i32, dy: i32) {
        for v in 0..sh.max(0) {
            for u in 0..sw.max(0) {
                let Some(px) = src.get(sx + u, sy + v) else {
                    continue;
                };
                self.set(dx + u, dy + v, px);
            }
        }
    }

    /// Runs a per-pixel transfer function over the rectangle, writing the
    /// result in place of the destination pixel.
    ///
    /// Source pixels outside `src` read as transparent.
    pub(crate) fn transfer_rect(
        &mut self,
        src: &Self,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        dx: i32,
        dy: i32,
        f: TransferFunction,
    ) {
        for v in 0..sh.max(0) {
            for u in 0..sw.max(0) {
                let x = dx + u;
                let y = dy + v;
                if x < 0 || y < 0 || x >= self.width || y >= self.height {
                    continue;
                }
                let s = Color::from_premultiplied(src.get(sx + u, sy + v).unwrap_or([0; 4]));
                let d = Color::from_premultiplied(self.get(x, y).unwrap_or([0; 4]));
                self.set(x, y, f(s, d).premultiply());
            }
        }
    }
}

/// Scales a premultiplied pixel by an 8-bit alpha factor.
#[inline]
fn apply_alpha(px: [u8; 4], a8: u32) -> [u8; 4] {
    if a8 == 255 {
        return px;
    }
    [
        ((px[0] as u32 * a8 + 127) / 255) as u8,
        ((px[1] as u32 * a8 + 127) / 255) as u8,
        ((px[2] as u32 * a8 + 127) / 255) as u8,
        ((px[3] as u32 * a8 + 127) / 255) as u8,
    ]
}

#[inline]
fn scale_byte(alpha: f64) -> u32 {
    let v = alpha * 255.0 + 0.5;
    if v >= 255.0 {
        255
    } else if v <= 0.0 {
        0
    } else {
        v as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_dimensions_clamp_to_empty() {
        let pm = Pixmap::new(-3, 5);
        assert_eq!(pm.width(), 0);
        assert_eq!(pm.height(), 5);
        assert!(pm.is_empty());
        assert!(pm.get(0, 0).is_none());
    }

    #[test]
    fn set_get_round_trip() {
        let mut pm = Pixmap::new(4, 4);
        pm.set(2, 1, [10, 20, 30, 255]);
        assert_eq!(pm.get(2, 1), Some([10, 20, 30, 255]));
        assert_eq!(pm.get(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut pm = Pixmap::new(2, 2);
        pm.set(-1, 0, [255; 4]);
        pm.set(2, 0, [255; 4]);
        assert!(pm.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn resized_preserves_overlap() {
        let mut pm = Pixmap::new(3, 3);
        pm.set(1, 1, [1, 2, 3, 255]);
        pm.set(2, 2, [4, 5, 6, 255]);

        let grown = pm.resized(5, 5);
        assert_eq!(grown.get(1, 1), Some([1, 2, 3, 255]));
        assert_eq!(grown.get(2, 2), Some([4, 5, 6, 255]));
        assert_eq!(grown.get(4, 4), Some([0, 0, 0, 0]));

        let shrunk = pm.resized(2, 2);
        assert_eq!(shrunk.get(1, 1), Some([1, 2, 3, 255]));
        assert!(shrunk.get(2, 2).is_none());
    }

    #[test]
    fn sub_reads_transparent_outside() {
        let mut pm = Pixmap::new(2, 2);
        pm.set(1, 1, [9, 9, 9, 255]);
        let cut = pm.sub(1, 1, 2, 2);
        assert_eq!(cut.get(0, 0), Some([9, 9, 9, 255]));
        assert_eq!(cut.get(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn from_rgba_premultiplies() {
        let pm = Pixmap::from_rgba(1, 1, &[255, 255, 255, 128]).unwrap();
        let px = pm.get(0, 0).unwrap();
        assert_eq!(px[3], 128);
        assert!((px[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn from_rgba_rejects_wrong_length() {
        assert!(Pixmap::from_rgba(2, 2, &[0; 4]).is_none());
    }

    #[test]
    fn identity_draw_blits_with_mask() {
        let mut src = Pixmap::new(2, 2);
        src.fill([100, 0, 0, 255]);
        let mut dst = Pixmap::new(4, 4);
        dst.draw_pixmap(&src, 0, 0, 2, 2, 1, 1, Affine::IDENTITY, 1.0, ChannelMask::SRC, None);
        assert_eq!(dst.get(1, 1), Some([100, 0, 0, 255]));
        assert_eq!(dst.get(2, 2), Some([100, 0, 0, 255]));
        assert_eq!(dst.get(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(dst.get(3, 3), Some([0, 0, 0, 0]));
    }

    #[test]
    fn draw_respects_alpha_multiplier() {
        let mut src = Pixmap::new(1, 1);
        src.fill([200, 200, 200, 255]);
        let mut dst = Pixmap::new(1, 1);
        dst.draw_pixmap(&src, 0, 0, 1, 1, 0, 0, Affine::IDENTITY, 0.5, ChannelMask::SRC, None);
        let px = dst.get(0, 0).unwrap();
        assert!((px[3] as i32 - 128).abs() <= 1, "alpha scaled: {px:?}");
    }

    #[test]
    fn translated_transform_offsets_draw() {
        let mut src = Pixmap::new(1, 1);
        src.fill([0, 200, 0, 255]);
        let mut dst = Pixmap::new(4, 4);
        let xf = Affine::translate((2.0, 1.0));
        dst.draw_pixmap(&src, 0, 0, 1, 1, 0, 0, xf, 1.0, ChannelMask::OVER, None);
        assert_eq!(dst.get(2, 1), Some([0, 200, 0, 255]));
        assert_eq!(dst.get(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn singular_transform_draws_nothing() {
        let mut src = Pixmap::new(2, 2);
        src.fill([255; 4]);
        let mut dst = Pixmap::new(2, 2);
        dst.draw_pixmap(
            &src,
            0,
            0,
            2,
            2,
            0,
            0,
            Affine::scale(0.0),
            1.0,
            ChannelMask::OVER,
            None,
        );
        assert!(dst.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn clip_mask_limits_blend() {
        let mut src = Pixmap::new(2, 1);
        src.fill([50, 50, 50, 255]);
        let mut dst = Pixmap::new(2, 1);
        // Only the left pixel passes the clip.
        let clip = alloc::vec![255, 0];
        dst.draw_pixmap(
            &src,
            0,
            0,
            2,
            1,
            0,
            0,
            Affine::IDENTITY,
            1.0,
            ChannelMask::OVER,
            Some(&clip),
        );
        assert_eq!(dst.get(0, 0), Some([50, 50, 50, 255]));
        assert_eq!(dst.get(1, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn put_rect_overwrites_without_compositing() {
        let mut src = Pixmap::new(1, 1);
        src.fill([0, 0, 0, 0]);
        let mut dst = Pixmap::new(1, 1);
        dst.fill([255, 255, 255, 255]);
        dst.put_rect(&src, 0, 0, 1, 1, 0, 0);
        assert_eq!(dst.get(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn transfer_applies_function() {
        fn swap(src: Color, _dst: Color) -> Color {
            Color::rgba(src.b, src.g, src.r, src.a)
        }
        let mut src = Pixmap::new(1, 1);
        src.fill(Color::rgba(10, 20, 30, 255).premultiply());
        let mut dst = Pixmap::new(1, 1);
        dst.transfer_rect(&src, 0, 0, 1, 1, 0, 0, swap);
        assert_eq!(dst.get(0, 0), Some(Color::rgba(30, 20, 10, 255).premultiply()));
    }
}
