// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drawing surfaces.
//!
//! A *surface* is an addressable 2D drawing target: a premultiplied pixel
//! [`Pixmap`], a current path, a draw-state stack (transform, clip, miter
//! limit), a compositing [`ChannelMask`], and — centrally — an ordered
//! queue of pending operations.
//!
//! # Ordering contract
//!
//! Operations on one surface execute in exactly the order they were
//! enqueued, even when an operation must await an external resource; later
//! operations on the same surface wait behind it. Operations on *different*
//! surfaces are independent: a blocked surface never delays another
//! surface's queue. Draining is driven by the owning
//! [`Display`](crate::display::Display), which owns the pump and the
//! cross-surface fences.
//!
//! Surfaces are independent of the visible-layer hierarchy: a buffer
//! surface has no placement at all, and a visible layer's surface keeps
//! draining its queue even after the layer is detached from the tree.

mod id;
mod queue;
mod raster;

pub use id::SurfaceId;
pub use queue::{LineCap, LineJoin, StrokeStyle};

pub(crate) use queue::{Fence, Op, OpKind};

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use kurbo::{Affine, BezPath};

use crate::compose::ChannelMask;
use crate::pixmap::Pixmap;
use crate::resource::ResourceId;

/// Saved drawing state, one entry per `push`.
#[derive(Clone, Debug)]
pub(crate) struct DrawState {
    pub(crate) transform: Affine,
    /// Coverage mask sized like the pixmap; `None` = unclipped.
    pub(crate) clip: Option<Vec<u8>>,
    pub(crate) miter_limit: f64,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            clip: None,
            miter_limit: 10.0,
        }
    }
}

/// An addressable 2D drawing target with its own ordered operation queue.
///
/// Created through [`Display::create_layer`](crate::display::Display::create_layer)
/// or [`Display::create_buffer`](crate::display::Display::create_buffer) and
/// addressed by [`SurfaceId`]. The backing store lives exactly as long as
/// the surface.
#[derive(Debug)]
pub struct Surface {
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) pixmap: Pixmap,
    pub(crate) autoresize: bool,

    pub(crate) state: DrawState,
    pub(crate) stack: Vec<DrawState>,
    pub(crate) path: BezPath,
    pub(crate) path_consumed: bool,
    pub(crate) mask: ChannelMask,

    pub(crate) queue: VecDeque<Op>,
    /// Operations ever enqueued on this surface (fence watermarks).
    pub(crate) enqueued: u64,
    /// Operations completed on this surface.
    pub(crate) completed: u64,
    /// The last image resource drawn into this surface, exported in
    /// snapshots so imports can re-issue the load.
    pub(crate) resource_ref: Option<ResourceId>,
    /// Sequence number of the op a blocked event was last emitted for.
    pub(crate) last_blocked: Option<u64>,
}

impl Surface {
    pub(crate) fn new(width: i32, height: i32, autoresize: bool) -> Self {
        Self {
            width,
            height,
            pixmap: Pixmap::new(width, height),
            autoresize,
            state: DrawState::default(),
            stack: Vec::new(),
            path: BezPath::new(),
            path_consumed: false,
            mask: ChannelMask::default(),
            queue: VecDeque::new(),
            enqueued: 0,
            completed: 0,
            resource_ref: None,
            last_blocked: None,
        }
    }

    /// Declared width in pixels (may be zero or negative after a degenerate
    /// `resize`; the backing store clamps to empty).
    #[inline]
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Declared height in pixels.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// The backing pixel store.
    ///
    /// Reflects only operations that have already drained; use
    /// [`Display::flush`](crate::display::Display::flush) to wait for
    /// pending ones.
    #[inline]
    #[must_use]
    pub const fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Whether the surface grows to fit pixel-transfer destinations.
    #[inline]
    #[must_use]
    pub const fn autoresize(&self) -> bool {
        self.autoresize
    }

    /// The channel mask applied to subsequent drawing operations.
    #[inline]
    #[must_use]
    pub const fn channel_mask(&self) -> ChannelMask {
        self.mask
    }

    /// Number of operations queued but not yet completed.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn push_op(&mut self, op: Op) {
        self.queue.push_back(op);
        self.enqueued += 1;
    }
}
