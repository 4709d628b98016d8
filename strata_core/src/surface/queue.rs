// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-surface operation queue types.
//!
//! Every public drawing call becomes one [`Op`] appended to the target
//! surface's FIFO queue. Most operations are synchronous state transitions
//! and drain immediately; two kinds can block the queue head:
//!
//! - `DrawImage` waits for its [`ResourceId`] to resolve or fail.
//! - Cross-surface reads (`Copy`, `Transfer`, `FillSurface`,
//!   `StrokeSurface`) carry a [`Fence`]: they wait until the source surface
//!   has completed every operation that was already queued on it when the
//!   read was issued. Operations enqueued on the source *after* that point
//!   are not waited for.
//!
//! A blocked head suspends only its own surface; other surfaces drain
//! independently. Each op carries a coordinator-global sequence number used
//! by flush barriers.

use kurbo::{Affine, Cap, Join};

use crate::compose::{ChannelMask, Color, TransferFunction};
use crate::pixmap::Pixmap;
use crate::resource::ResourceId;

use super::id::SurfaceId;

/// Line ending shape for stroked paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LineCap {
    /// Flat edge at the endpoint.
    #[default]
    Butt,
    /// Semicircular ending.
    Round,
    /// Square ending extending half the line width.
    Square,
}

/// Corner shape where stroked segments meet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LineJoin {
    /// Sharp corner, subject to the surface's miter limit.
    #[default]
    Miter,
    /// Rounded corner.
    Round,
    /// Flattened corner.
    Bevel,
}

/// Geometry of a stroke operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    /// Endpoint shape.
    pub cap: LineCap,
    /// Corner shape.
    pub join: LineJoin,
    /// Line width in pixels.
    pub thickness: f64,
}

impl StrokeStyle {
    /// Creates a style with the given width and default cap/join.
    #[must_use]
    pub const fn new(thickness: f64) -> Self {
        Self {
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            thickness,
        }
    }
}

impl From<LineCap> for Cap {
    fn from(cap: LineCap) -> Self {
        match cap {
            LineCap::Butt => Self::Butt,
            LineCap::Round => Self::Round,
            LineCap::Square => Self::Square,
        }
    }
}

impl From<LineJoin> for Join {
    fn from(join: LineJoin) -> Self {
        match join {
            LineJoin::Miter => Self::Miter,
            LineJoin::Round => Self::Round,
            LineJoin::Bevel => Self::Bevel,
        }
    }
}

/// A cross-surface read barrier.
///
/// The op becomes runnable once `source` has completed at least `watermark`
/// operations (its enqueue count captured when the read was issued).
#[derive(Clone, Copy, Debug)]
pub(crate) struct Fence {
    pub(crate) source: SurfaceId,
    pub(crate) watermark: u64,
}

/// One queued operation.
#[derive(Debug)]
pub(crate) struct Op {
    /// Coordinator-global sequence number, assigned at enqueue.
    pub(crate) seq: u64,
    pub(crate) kind: OpKind,
    pub(crate) fence: Option<Fence>,
}

/// The full drawing vocabulary of a surface.
#[derive(Debug)]
pub(crate) enum OpKind {
    // Path construction.
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    CurveTo { cp1x: f64, cp1y: f64, cp2x: f64, cp2y: f64, x: f64, y: f64 },
    Arc { x: f64, y: f64, radius: f64, start: f64, end: f64, negative: bool },
    Rect { x: f64, y: f64, width: f64, height: f64 },
    Close,

    // Path consumption.
    Clip,
    FillColor { color: Color },
    StrokeColor { style: StrokeStyle, color: Color },
    FillSurface { source: SurfaceId },
    StrokeSurface { style: StrokeStyle, source: SurfaceId },

    // Pixel transfer.
    DrawImage { x: i32, y: i32, resource: ResourceId },
    Put { x: i32, y: i32, pixels: Pixmap },
    Copy { source: SurfaceId, sx: i32, sy: i32, sw: i32, sh: i32, x: i32, y: i32 },
    Transfer {
        source: SurfaceId,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        x: i32,
        y: i32,
        function: TransferFunction,
    },

    // Draw-state stack and transform.
    Push,
    Pop,
    Reset,
    SetTransform { matrix: Affine },
    Transform { matrix: Affine },

    // Sizing and compositing configuration.
    Resize { width: i32, height: i32 },
    SetChannelMask { mask: ChannelMask },
    SetMiterLimit { limit: f64 },

    // Cursor capture, queued on the *source* surface by
    // `Display::set_cursor` so it runs in source order.
    CursorCopy { hotspot_x: i32, hotspot_y: i32, sx: i32, sy: i32, sw: i32, sh: i32 },

    // Holds the source surface of a fenced read at the fence point until
    // the reading op (`waiter_seq`, queued on `waiter`) has executed, so
    // the read observes the source exactly as of its watermark.
    SyncPoint { waiter: SurfaceId, waiter_seq: u64 },
}
