// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The frame coordinator.
//!
//! [`Display`] owns every surface, the visible-layer tree, and the resource
//! table, and drives the cooperative pump that drains per-surface operation
//! queues. It exposes the full drawing vocabulary (each public call appends
//! one operation to the target surface's queue), the hierarchy calls, flush
//! barriers, cursor handling, presentation scale, and snapshot
//! export/import.
//!
//! # Flush semantics
//!
//! Every operation carries a global sequence number. `flush(callback)`
//! captures the current sequence watermark and the number of outstanding
//! operations; the callback fires once every operation numbered below the
//! watermark has completed, regardless of operations enqueued afterwards.
//! Barriers fire in registration order. `export_state` is a flush whose
//! callback receives a [`Snapshot`] built at fire time, so snapshots always
//! describe a settled frame.
//!
//! # The pump
//!
//! Draining is cooperative and single-threaded. After each completed
//! operation the pump first runs any other surface whose queue head just
//! became ready (a cross-surface fence on the completing surface), *then*
//! resumes the completing surface. A fenced read therefore observes the
//! source exactly as of its fence watermark, not as of some later drain.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::fmt;

use kurbo::Affine;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::compose::{ChannelMask, Color, TransferFunction};
use crate::layer::{LayerId, LayerTree, TreeError};
use crate::pixmap::Pixmap;
use crate::resource::{ResourceError, ResourceId, ResourceState, ResourceTable};
use crate::snapshot::{CURSOR_LAYER_ID, DEFAULT_LAYER_ID, LayerEntry, Snapshot};
use crate::surface::{Fence, Op, OpKind, StrokeStyle, Surface, SurfaceId};
use crate::trace::{
    BlockReason, FlushFiredEvent, FlushRegisteredEvent, OpAbortedEvent, OpCompletedEvent,
    OpEnqueuedEvent, ResourceSettledEvent, SurfaceBlockedEvent, TraceSink, Tracer,
};

/// Single-slot resize notification: `(width, height)` of the default layer.
pub type ResizeHandler = Box<dyn FnMut(i32, i32)>;

/// Single-slot cursor notification: `(cursor_snapshot, hotspot_x, hotspot_y)`.
pub type CursorHandler = Box<dyn FnMut(&Pixmap, i32, i32)>;

type FlushCallback = Box<dyn FnOnce()>;
type ExportCallback = Box<dyn FnOnce(Snapshot)>;

/// Error returned by [`Display::import_state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportError {
    /// The snapshot uses a reserved id that is neither the default nor the
    /// cursor layer.
    ReservedId(i64),
    /// A snapshot layer id is already taken on this coordinator.
    DuplicateLayer(i64),
    /// An entry references a parent id that exists nowhere.
    UnknownParent {
        /// The entry with the dangling reference.
        layer: i64,
        /// The missing parent id.
        parent: i64,
    },
    /// The snapshot's parent references loop.
    Cycle(i64),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedId(id) => write!(f, "snapshot uses reserved layer id {id}"),
            Self::DuplicateLayer(id) => write!(f, "layer id {id} already exists"),
            Self::UnknownParent { layer, parent } => {
                write!(f, "layer {layer} references unknown parent {parent}")
            }
            Self::Cycle(id) => write!(f, "snapshot parent chain loops at layer {id}"),
        }
    }
}

enum BarrierKind {
    Flush(FlushCallback),
    Export(ExportCallback),
}

struct Barrier {
    watermark: u64,
    remaining: u64,
    kind: BarrierKind,
}

enum HeadState {
    Empty,
    Ready,
    Blocked(u64, BlockReason),
}

/// The frame coordinator: owns all surfaces, the visible-layer tree, the
/// resource table, and the pending flush barriers.
pub struct Display {
    surfaces: Vec<Surface>,
    tree: LayerTree,
    resources: ResourceTable,

    default_layer: LayerId,
    default_surface: SurfaceId,
    cursor_layer: LayerId,
    cursor_surface: SurfaceId,

    /// Public id to node, for every visible layer (default, cursor, created).
    layer_ids: BTreeMap<i64, LayerId>,
    next_layer_id: i64,
    /// Public id to surface for buffers, counting down from −2. Buffers are
    /// invisible and never exported; the ids exist so the embedding protocol
    /// layer can address them the same way it addresses layers.
    buffer_ids: BTreeMap<i64, SurfaceId>,
    next_buffer_id: i64,

    scale: f64,
    state_code: u32,
    cursor_hotspot: (i32, i32),
    cursor_position: (i32, i32),

    barriers: VecDeque<Barrier>,
    next_seq: u64,
    outstanding: u64,
    aborted: u64,
    timestamp: u64,

    on_resize: Option<ResizeHandler>,
    on_cursor: Option<CursorHandler>,
    sink: Option<Box<dyn TraceSink>>,
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("surfaces", &self.surfaces.len())
            .field("layers", &self.layer_ids.len())
            .field("scale", &self.scale)
            .field("outstanding", &self.outstanding)
            .field("barriers", &self.barriers.len())
            .finish_non_exhaustive()
    }
}

impl Display {
    /// Creates a coordinator with a `width × height` default layer and an
    /// empty cursor layer.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        let mut surfaces = Vec::new();
        let mut tree = LayerTree::new();

        surfaces.push(Surface::new(width, height, false));
        let default_surface = SurfaceId { idx: 0 };
        let default_layer = tree.create_node(default_surface);

        surfaces.push(Surface::new(0, 0, false));
        let cursor_surface = SurfaceId { idx: 1 };
        let cursor_layer = tree.create_node(cursor_surface);

        let mut layer_ids = BTreeMap::new();
        layer_ids.insert(DEFAULT_LAYER_ID, default_layer);
        layer_ids.insert(CURSOR_LAYER_ID, cursor_layer);

        Self {
            surfaces,
            tree,
            resources: ResourceTable::new(),
            default_layer,
            default_surface,
            cursor_layer,
            cursor_surface,
            layer_ids,
            next_layer_id: 1,
            buffer_ids: BTreeMap::new(),
            next_buffer_id: CURSOR_LAYER_ID - 1,
            scale: 1.0,
            state_code: 0,
            cursor_hotspot: (0, 0),
            cursor_position: (0, 0),
            barriers: VecDeque::new(),
            next_seq: 0,
            outstanding: 0,
            aborted: 0,
            timestamp: 0,
            on_resize: None,
            on_cursor: None,
            sink: None,
        }
    }

    // -- Allocation --

    /// Creates a fresh visible layer, parented under the default layer at
    /// `(0, 0)` with `z = 0`, and registers it under the next public id.
    pub fn create_layer(&mut self) -> LayerId {
        let sid = self.alloc_surface(0, 0, false);
        let node = self.tree.create_node(sid);
        self.layer_ids.insert(self.next_layer_id, node);
        self.next_layer_id += 1;
        // A fresh node cannot be an ancestor of the default layer.
        let _ = self.tree.move_to_parent(node, self.default_layer, 0, 0, 0);
        node
    }

    /// Creates an invisible scratch surface with no hierarchy placement,
    /// registered under the next buffer id (counting down from −2).
    ///
    /// Buffers auto-size: pixel transfers beyond the current bounds grow the
    /// backing store to fit. They never appear in snapshots.
    pub fn create_buffer(&mut self) -> SurfaceId {
        let sid = self.alloc_surface(0, 0, true);
        self.buffer_ids.insert(self.next_buffer_id, sid);
        self.next_buffer_id -= 1;
        sid
    }

    fn alloc_surface(&mut self, width: i32, height: i32, autoresize: bool) -> SurfaceId {
        let idx = u32::try_from(self.surfaces.len()).unwrap_or(u32::MAX);
        self.surfaces.push(Surface::new(width, height, autoresize));
        SurfaceId { idx }
    }

    // -- Handles and lookups --

    /// The permanent root layer.
    #[must_use]
    pub const fn default_layer(&self) -> LayerId {
        self.default_layer
    }

    /// The permanent cursor layer, rendered above everything else.
    #[must_use]
    pub const fn cursor_layer(&self) -> LayerId {
        self.cursor_layer
    }

    /// The surface a visible layer presents.
    #[must_use]
    pub fn surface_of(&self, layer: LayerId) -> SurfaceId {
        self.tree.surface(layer)
    }

    /// Read access to a surface.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range for this coordinator.
    #[must_use]
    pub fn surface(&self, id: SurfaceId) -> &Surface {
        assert!(
            (id.idx as usize) < self.surfaces.len(),
            "{id:?} out of range (surfaces: {})",
            self.surfaces.len()
        );
        &self.surfaces[id.idx as usize]
    }

    /// The visible-layer tree.
    #[must_use]
    pub const fn tree(&self) -> &LayerTree {
        &self.tree
    }

    /// The public id of a visible layer, if it has one (buffers do not).
    #[must_use]
    pub fn public_id(&self, layer: LayerId) -> Option<i64> {
        self.layer_ids
            .iter()
            .find(|&(_, &node)| node == layer)
            .map(|(&id, _)| id)
    }

    /// Resolves a public id back to a layer handle.
    #[must_use]
    pub fn layer_by_id(&self, id: i64) -> Option<LayerId> {
        self.layer_ids.get(&id).copied()
    }

    /// The public id of a buffer surface, if it is one.
    #[must_use]
    pub fn buffer_id(&self, surface: SurfaceId) -> Option<i64> {
        self.buffer_ids
            .iter()
            .find(|&(_, &sid)| sid == surface)
            .map(|(&id, _)| id)
    }

    /// Resolves a public buffer id back to a surface handle.
    #[must_use]
    pub fn buffer_by_id(&self, id: i64) -> Option<SurfaceId> {
        self.buffer_ids.get(&id).copied()
    }

    // -- Dimensions, scale, state --

    /// Logical width of the default layer in pixels. Unaffected by
    /// [`set_scale`](Self::set_scale).
    #[must_use]
    pub fn width(&self) -> i32 {
        self.surface(self.default_surface).width()
    }

    /// Logical height of the default layer in pixels.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.surface(self.default_surface).height()
    }

    /// Sets the presentation scale factor. Affects only
    /// [`presentation_size`](Self::presentation_size), never the logical
    /// dimensions.
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// The presentation scale factor (default 1.0).
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Logical dimensions multiplied by the scale factor, rounded.
    #[must_use]
    pub fn presentation_size(&self) -> (i32, i32) {
        let w = (f64::from(self.width()) * self.scale).round();
        let h = (f64::from(self.height()) * self.scale).round();
        (w as i32, h as i32)
    }

    /// Sets the embedder-defined coordinator state code carried in
    /// snapshots.
    pub fn set_state(&mut self, state: u32) {
        self.state_code = state;
    }

    /// The embedder-defined coordinator state code.
    #[must_use]
    pub const fn state(&self) -> u32 {
        self.state_code
    }

    /// Operations enqueued but not yet completed, across all surfaces.
    #[must_use]
    pub const fn pending_ops(&self) -> u64 {
        self.outstanding
    }

    /// Operations dropped because their resource failed.
    #[must_use]
    pub const fn aborted_ops(&self) -> u64 {
        self.aborted
    }

    // -- Event handlers (single-slot, last assignment wins) --

    /// Installs (or clears) the resize handler, fired when a resize of the
    /// default layer is applied.
    pub fn set_on_resize(&mut self, handler: Option<ResizeHandler>) {
        self.on_resize = handler;
    }

    /// Installs (or clears) the cursor handler, fired when `set_cursor`
    /// captures a new cursor image.
    pub fn set_on_cursor(&mut self, handler: Option<CursorHandler>) {
        self.on_cursor = handler;
    }

    /// Installs (or clears) the trace sink receiving pipeline events.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink>>) {
        self.sink = sink;
    }

    // -- Resources --

    /// Registers a fresh pending resource.
    pub fn register_resource(&mut self) -> ResourceId {
        self.resources.register()
    }

    /// Resolves a pending resource with decoded pixels and pumps every
    /// queue that was waiting on it.
    pub fn resolve_resource(&mut self, id: ResourceId, pixmap: Pixmap) -> Result<(), ResourceError> {
        self.resources.resolve(id, pixmap)?;
        let e = ResourceSettledEvent {
            resource: id,
            failed: false,
        };
        self.emit(|t| t.resource_settled(&e));
        self.pump_all();
        Ok(())
    }

    /// Fails a pending resource. Dependent operations abort: they complete
    /// with no visual effect, still count toward flush barriers, and bump
    /// [`aborted_ops`](Self::aborted_ops). An embedder wanting a timeout
    /// policy calls this when its own deadline expires.
    pub fn fail_resource(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        self.resources.fail(id)?;
        let e = ResourceSettledEvent {
            resource: id,
            failed: true,
        };
        self.emit(|t| t.resource_settled(&e));
        self.pump_all();
        Ok(())
    }

    /// The state of a registered resource.
    #[must_use]
    pub fn resource_state(&self, id: ResourceId) -> Option<&ResourceState> {
        self.resources.get(id)
    }

    // -- Path construction --

    /// Starts a new subpath at `(x, y)`.
    pub fn move_to(&mut self, surface: SurfaceId, x: f64, y: f64) {
        self.enqueue(surface, OpKind::MoveTo { x, y }, None);
    }

    /// Adds a line segment to `(x, y)`.
    pub fn line_to(&mut self, surface: SurfaceId, x: f64, y: f64) {
        self.enqueue(surface, OpKind::LineTo { x, y }, None);
    }

    /// Adds a cubic Bézier segment to `(x, y)`.
    pub fn curve_to(
        &mut self,
        surface: SurfaceId,
        cp1x: f64,
        cp1y: f64,
        cp2x: f64,
        cp2y: f64,
        x: f64,
        y: f64,
    ) {
        self.enqueue(
            surface,
            OpKind::CurveTo {
                cp1x,
                cp1y,
                cp2x,
                cp2y,
                x,
                y,
            },
            None,
        );
    }

    /// Adds a circular arc around `(x, y)`, sweeping from `start` to `end`
    /// radians (counterclockwise when `negative`).
    pub fn arc(
        &mut self,
        surface: SurfaceId,
        x: f64,
        y: f64,
        radius: f64,
        start: f64,
        end: f64,
        negative: bool,
    ) {
        self.enqueue(
            surface,
            OpKind::Arc {
                x,
                y,
                radius,
                start,
                end,
                negative,
            },
            None,
        );
    }

    /// Adds a closed rectangular subpath.
    pub fn rect(&mut self, surface: SurfaceId, x: f64, y: f64, width: f64, height: f64) {
        self.enqueue(
            surface,
            OpKind::Rect {
                x,
                y,
                width,
                height,
            },
            None,
        );
    }

    /// Closes the current subpath.
    pub fn close(&mut self, surface: SurfaceId) {
        self.enqueue(surface, OpKind::Close, None);
    }

    // -- Path consumption --

    /// Intersects the surface's clip with the current path.
    pub fn clip(&mut self, surface: SurfaceId) {
        self.enqueue(surface, OpKind::Clip, None);
    }

    /// Fills the current path with a color through the channel mask.
    pub fn fill_color(&mut self, surface: SurfaceId, color: Color) {
        self.enqueue(surface, OpKind::FillColor { color }, None);
    }

    /// Strokes the current path with a color through the channel mask.
    pub fn stroke_color(&mut self, surface: SurfaceId, style: StrokeStyle, color: Color) {
        self.enqueue(surface, OpKind::StrokeColor { style, color }, None);
    }

    /// Fills the current path with the tiled contents of another surface.
    ///
    /// Reads a snapshot of `source` as of this call: operations already
    /// queued on `source` are waited for, operations enqueued on `source`
    /// afterwards are held back until the fill has read it.
    pub fn fill_surface(&mut self, surface: SurfaceId, source: SurfaceId) {
        self.enqueue_synced(source, surface, OpKind::FillSurface { source });
    }

    /// Strokes the current path with the tiled contents of another surface.
    ///
    /// Same fencing as [`fill_surface`](Self::fill_surface).
    pub fn stroke_surface(&mut self, surface: SurfaceId, style: StrokeStyle, source: SurfaceId) {
        self.enqueue_synced(source, surface, OpKind::StrokeSurface { style, source });
    }

    // -- Pixel transfer --

    /// Draws an externally loaded image at `(x, y)` through the transform
    /// and channel mask.
    ///
    /// If the resource is still pending, this surface's queue suspends until
    /// it resolves or fails; other surfaces are unaffected.
    pub fn draw_image(&mut self, surface: SurfaceId, x: i32, y: i32, resource: ResourceId) {
        self.enqueue(surface, OpKind::DrawImage { x, y, resource }, None);
    }

    /// Writes raw pixels at `(x, y)`: no transform, no mask, no clip.
    pub fn put(&mut self, surface: SurfaceId, x: i32, y: i32, pixels: Pixmap) {
        self.enqueue(surface, OpKind::Put { x, y, pixels }, None);
    }

    /// Copies a rectangle of `source` onto `dest` at `(x, y)` through
    /// `dest`'s transform and channel mask.
    ///
    /// Fenced like [`fill_surface`](Self::fill_surface): the copy sees
    /// `source` exactly as of this call.
    pub fn copy(
        &mut self,
        source: SurfaceId,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        dest: SurfaceId,
        x: i32,
        y: i32,
    ) {
        self.enqueue_synced(
            source,
            dest,
            OpKind::Copy {
                source,
                sx,
                sy,
                sw,
                sh,
                x,
                y,
            },
        );
    }

    /// Runs a per-pixel transfer function over a rectangle of `source` and
    /// the corresponding rectangle of `dest`, writing the function's result.
    ///
    /// Fenced like [`copy`](Self::copy).
    pub fn transfer(
        &mut self,
        source: SurfaceId,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        dest: SurfaceId,
        x: i32,
        y: i32,
        function: TransferFunction,
    ) {
        self.enqueue_synced(
            source,
            dest,
            OpKind::Transfer {
                source,
                sx,
                sy,
                sw,
                sh,
                x,
                y,
                function,
            },
        );
    }

    // -- Draw state, transform, sizing, compositing config --

    /// Saves the draw state (transform, clip, miter limit).
    pub fn push(&mut self, surface: SurfaceId) {
        self.enqueue(surface, OpKind::Push, None);
    }

    /// Restores the most recently saved draw state, if any.
    pub fn pop(&mut self, surface: SurfaceId) {
        self.enqueue(surface, OpKind::Pop, None);
    }

    /// Clears the draw-state stack, the current path, the transform, and
    /// the clip.
    pub fn reset(&mut self, surface: SurfaceId) {
        self.enqueue(surface, OpKind::Reset, None);
    }

    /// Replaces the surface's transform.
    pub fn set_transform(&mut self, surface: SurfaceId, matrix: Affine) {
        self.enqueue(surface, OpKind::SetTransform { matrix }, None);
    }

    /// Right-multiplies the surface's transform.
    pub fn transform(&mut self, surface: SurfaceId, matrix: Affine) {
        self.enqueue(surface, OpKind::Transform { matrix }, None);
    }

    /// Resizes a surface, preserving the overlapping content region.
    ///
    /// Equal dimensions are a no-op. Any other value takes effect as given,
    /// including zero or negative (the backing store clamps to empty); it is
    /// the caller's responsibility to pass meaningful dimensions. A resize
    /// of the default layer additionally fires the resize handler once
    /// applied.
    pub fn resize(&mut self, surface: SurfaceId, width: i32, height: i32) {
        self.enqueue(surface, OpKind::Resize { width, height }, None);
    }

    /// Sets the channel mask applied to subsequent fill, stroke, and
    /// image/copy operations on this surface.
    pub fn set_channel_mask(&mut self, surface: SurfaceId, mask: ChannelMask) {
        self.enqueue(surface, OpKind::SetChannelMask { mask }, None);
    }

    /// Sets the miter limit used by subsequent strokes.
    pub fn set_miter_limit(&mut self, surface: SurfaceId, limit: f64) {
        self.enqueue(surface, OpKind::SetMiterLimit { limit }, None);
    }

    // -- Hierarchy --

    /// Atomically reparents and repositions a visible layer.
    ///
    /// Fails without touching the tree if `layer` is the default or cursor
    /// layer, if `parent` is the cursor layer, or if the move would create
    /// a cycle.
    pub fn move_layer(
        &mut self,
        layer: LayerId,
        parent: LayerId,
        x: i32,
        y: i32,
        z: i32,
    ) -> Result<(), TreeError> {
        if layer == self.default_layer || layer == self.cursor_layer {
            return Err(TreeError::RootImmovable);
        }
        if parent == self.cursor_layer {
            return Err(TreeError::CursorOverlay);
        }
        self.tree.move_to_parent(layer, parent, x, y, z)
    }

    /// Repositions a layer within its parent without reparenting.
    pub fn translate(&mut self, layer: LayerId, x: i32, y: i32) {
        self.tree.translate(layer, x, y);
    }

    /// Sets a layer's opacity (255 = opaque).
    pub fn shade(&mut self, layer: LayerId, alpha: u8) {
        self.tree.shade(layer, alpha);
    }

    /// Sets a layer's placement matrix.
    pub fn distort(&mut self, layer: LayerId, matrix: Affine) {
        self.tree.distort(layer, matrix);
    }

    /// Detaches a layer from its parent. The layer, its surface, and any
    /// queued operations remain valid; queued work still drains and still
    /// counts toward pending flushes. Detached or root layers are left as
    /// they are.
    pub fn dispose(&mut self, layer: LayerId) {
        self.tree.dispose(layer);
    }

    // -- Cursor --

    /// Captures a region of `source` as the cursor image, in `source`'s
    /// queue order, recording the hotspot. Fires the cursor handler once the
    /// capture runs.
    pub fn set_cursor(
        &mut self,
        hotspot_x: i32,
        hotspot_y: i32,
        source: SurfaceId,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
    ) {
        self.enqueue(
            source,
            OpKind::CursorCopy {
                hotspot_x,
                hotspot_y,
                sx,
                sy,
                sw,
                sh,
            },
            None,
        );
    }

    /// Moves the cursor immediately. Cursor position is exempt from the
    /// ordering and flush contract for responsiveness.
    pub fn move_cursor(&mut self, x: i32, y: i32) {
        self.cursor_position = (x, y);
        let (hx, hy) = self.cursor_hotspot;
        self.tree.translate(self.cursor_layer, x - hx, y - hy);
    }

    /// The last cursor position set by [`move_cursor`](Self::move_cursor).
    #[must_use]
    pub const fn cursor_position(&self) -> (i32, i32) {
        self.cursor_position
    }

    /// The hotspot recorded by the last applied `set_cursor`.
    #[must_use]
    pub const fn cursor_hotspot(&self) -> (i32, i32) {
        self.cursor_hotspot
    }

    // -- Flush and snapshots --

    /// Registers a callback that fires once every operation enqueued, on
    /// any surface, strictly before this call has completed. Fires inline
    /// when nothing is outstanding. Concurrent flushes fire in registration
    /// order, each for its own generation of work.
    pub fn flush(&mut self, callback: impl FnOnce() + 'static) {
        self.register_barrier(BarrierKind::Flush(Box::new(callback)));
    }

    /// Flushes, then hands the callback a [`Snapshot`] of the settled frame.
    pub fn export_state(&mut self, callback: impl FnOnce(Snapshot) + 'static) {
        self.register_barrier(BarrierKind::Export(Box::new(callback)));
    }

    /// Rebuilds a surface tree from a snapshot.
    ///
    /// Intended for a freshly created coordinator; imported layer ids must
    /// not collide with existing ones. Entries carrying a resource
    /// reference re-register it as pending and queue the image draw;
    /// `callback` fires once every re-issued load has resolved or failed.
    ///
    /// Validation happens before any mutation: on `Err` the coordinator is
    /// unchanged.
    pub fn import_state(
        &mut self,
        snapshot: &Snapshot,
        callback: impl FnOnce() + 'static,
    ) -> Result<(), ImportError> {
        self.validate_snapshot(snapshot)?;

        self.state_code = snapshot.state;
        self.timestamp = self.timestamp.max(snapshot.timestamp);

        // Create nodes for all imported visible layers first so parent
        // references resolve regardless of id order.
        for (&id, _) in snapshot.layers.iter().filter(|&(&id, _)| id > 0) {
            let sid = self.alloc_surface(0, 0, false);
            let node = self.tree.create_node(sid);
            self.layer_ids.insert(id, node);
            self.next_layer_id = self.next_layer_id.max(id + 1);
        }

        for (&id, entry) in &snapshot.layers {
            let Some(&node) = self.layer_ids.get(&id) else {
                continue;
            };
            let sid = self.tree.surface(node);
            self.resize(sid, entry.width, entry.height);

            if id > 0 {
                let x = entry.x.unwrap_or(0);
                let y = entry.y.unwrap_or(0);
                let z = entry.z.unwrap_or(0);
                match entry.parent.and_then(|pid| self.layer_by_id(pid)) {
                    Some(parent) => {
                        self.tree
                            .move_to_parent(node, parent, x, y, z)
                            .map_err(|_| ImportError::Cycle(id))?;
                    }
                    None => {
                        self.tree.translate(node, x, y);
                        self.tree.z[node.idx as usize] = z;
                    }
                }
                if let Some(alpha) = entry.alpha {
                    self.tree.shade(node, alpha);
                }
                if let Some(matrix) = entry.matrix {
                    self.tree.distort(node, Affine::new(matrix));
                }
            }

            if let Some(resource) = entry.resource {
                self.resources.register_with_id(resource);
                self.enqueue(sid, OpKind::DrawImage { x: 0, y: 0, resource }, None);
            }
        }

        self.register_barrier(BarrierKind::Flush(Box::new(callback)));
        Ok(())
    }

    fn validate_snapshot(&self, snapshot: &Snapshot) -> Result<(), ImportError> {
        for (&id, entry) in &snapshot.layers {
            if id <= 0 && id != DEFAULT_LAYER_ID && id != CURSOR_LAYER_ID {
                return Err(ImportError::ReservedId(id));
            }
            if id > 0 && self.layer_ids.contains_key(&id) {
                return Err(ImportError::DuplicateLayer(id));
            }
            if let Some(parent) = entry.parent {
                let known = parent == DEFAULT_LAYER_ID
                    || (parent > 0
                        && (snapshot.layers.contains_key(&parent)
                            || self.layer_ids.contains_key(&parent)));
                if !known {
                    return Err(ImportError::UnknownParent { layer: id, parent });
                }
            }
        }
        // Parent chains must terminate.
        for (&id, _) in snapshot.layers.iter().filter(|&(&id, _)| id > 0) {
            let mut cur = id;
            let mut steps = 0_usize;
            while let Some(entry) = snapshot.layers.get(&cur) {
                match entry.parent {
                    Some(parent) if parent > 0 => {
                        steps += 1;
                        if parent == id || steps > snapshot.layers.len() {
                            return Err(ImportError::Cycle(id));
                        }
                        cur = parent;
                    }
                    _ => break,
                }
            }
        }
        Ok(())
    }

    fn build_snapshot(&mut self) -> Snapshot {
        self.timestamp += 1;
        let mut layers = BTreeMap::new();
        for (&public_id, &node) in &self.layer_ids {
            let surface = &self.surfaces[self.tree.surface(node).idx as usize];
            let mut entry = LayerEntry {
                width: surface.width,
                height: surface.height,
                resource: surface.resource_ref,
                ..LayerEntry::default()
            };
            if public_id > 0 {
                let (x, y, z) = (self.tree.x(node), self.tree.y(node), self.tree.z(node));
                if x != 0 {
                    entry.x = Some(x);
                }
                if y != 0 {
                    entry.y = Some(y);
                }
                if z != 0 {
                    entry.z = Some(z);
                }
                let alpha = self.tree.alpha(node);
                if alpha != 255 {
                    entry.alpha = Some(alpha);
                }
                let matrix = self.tree.matrix(node);
                if matrix != Affine::IDENTITY {
                    entry.matrix = Some(matrix.as_coeffs());
                }
                entry.parent = self
                    .tree
                    .parent(node)
                    .and_then(|parent| self.public_id(parent));
            }
            layers.insert(public_id, entry);
        }
        Snapshot {
            state: self.state_code,
            timestamp: self.timestamp,
            layers,
        }
    }

    // -- Compositing --

    /// Composites the visible tree (default layer, descendants in ascending
    /// `z`, cursor on top) into a single pixmap at logical size.
    ///
    /// Reflects only operations that have drained; flush first for a settled
    /// frame. Layer opacity composes multiplicatively down the tree.
    #[must_use]
    pub fn flatten(&self) -> Pixmap {
        let mut out = Pixmap::new(self.width(), self.height());
        self.render_node(self.default_layer, Affine::IDENTITY, 1.0, &mut out);
        self.render_node(self.cursor_layer, Affine::IDENTITY, 1.0, &mut out);
        out
    }

    fn render_node(&self, node: LayerId, acc: Affine, alpha: f64, out: &mut Pixmap) {
        let local = Affine::translate((
            f64::from(self.tree.x(node)),
            f64::from(self.tree.y(node)),
        )) * self.tree.matrix(node);
        let acc = acc * local;
        let alpha = alpha * f64::from(self.tree.alpha(node)) / 255.0;
        let pixmap = &self.surfaces[self.tree.surface(node).idx as usize].pixmap;
        out.draw_pixmap(
            pixmap,
            0,
            0,
            pixmap.width(),
            pixmap.height(),
            0,
            0,
            acc,
            alpha,
            ChannelMask::OVER,
            None,
        );
        for child in self.tree.render_order(node) {
            self.render_node(child, acc, alpha, out);
        }
    }

    // -- Queue plumbing --

    fn fence_on(&self, source: SurfaceId) -> Fence {
        Fence {
            source,
            watermark: self.surface(source).enqueued,
        }
    }

    fn push_op(&mut self, surface: SurfaceId, kind: OpKind, fence: Option<Fence>) {
        assert!(
            (surface.idx as usize) < self.surfaces.len(),
            "{surface:?} out of range (surfaces: {})",
            self.surfaces.len()
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.outstanding += 1;
        self.surfaces[surface.idx as usize].push_op(Op { seq, kind, fence });
        let e = OpEnqueuedEvent { surface, seq };
        self.emit(|t| t.op_enqueued(&e));
    }

    fn enqueue(&mut self, surface: SurfaceId, kind: OpKind, fence: Option<Fence>) {
        self.push_op(surface, kind, fence);
        self.pump(surface);
    }

    /// Enqueues a fenced cross-surface read together with its sync point.
    ///
    /// The sync point holds `source` at the fence watermark until the read
    /// (queued on `dest`) has executed, so the read observes `source`
    /// exactly as of the call, even if `dest` is blocked behind earlier
    /// work. A read from a surface onto itself needs no sync point; queue
    /// order already serializes it.
    fn enqueue_synced(&mut self, source: SurfaceId, dest: SurfaceId, kind: OpKind) {
        let fence = self.fence_on(source);
        if source == dest {
            self.enqueue(dest, kind, Some(fence));
            return;
        }
        // The read is pushed second, so it takes the next sequence number.
        let waiter_seq = self.next_seq + 1;
        self.push_op(
            source,
            OpKind::SyncPoint {
                waiter: dest,
                waiter_seq,
            },
            None,
        );
        self.push_op(dest, kind, Some(fence));
        self.pump(dest);
        self.pump(source);
    }

    /// Drains ready queue heads starting from `start`.
    ///
    /// After each completed operation, surfaces whose heads just became
    /// ready (fences on the completing surface) run *before* the completing
    /// surface resumes, so fenced reads observe their exact watermark.
    fn pump(&mut self, start: SurfaceId) {
        let mut stack: Vec<u32> = alloc::vec![start.idx];
        while let Some(idx) = stack.pop() {
            if self.step(idx) {
                stack.push(idx);
                for other in 0..self.surfaces.len() as u32 {
                    if other != idx && matches!(self.head_state(other), HeadState::Ready) {
                        stack.push(other);
                    }
                }
            }
        }
        self.fire_barriers();
    }

    fn pump_all(&mut self) {
        for idx in 0..self.surfaces.len() as u32 {
            self.pump(SurfaceId { idx });
        }
    }

    fn head_state(&self, idx: u32) -> HeadState {
        let surface = &self.surfaces[idx as usize];
        let Some(op) = surface.queue.front() else {
            return HeadState::Empty;
        };
        if let OpKind::DrawImage { resource, .. } = &op.kind
            && matches!(self.resources.get(*resource), Some(ResourceState::Pending))
        {
            return HeadState::Blocked(op.seq, BlockReason::Resource(*resource));
        }
        if let OpKind::SyncPoint { waiter, waiter_seq } = &op.kind {
            let pending = match self.surfaces[waiter.idx as usize].queue.front() {
                Some(front) => front.seq <= *waiter_seq,
                None => false,
            };
            if pending {
                return HeadState::Blocked(op.seq, BlockReason::Fence(*waiter));
            }
        }
        if let Some(fence) = op.fence
            && self.surfaces[fence.source.idx as usize].completed < fence.watermark
        {
            return HeadState::Blocked(op.seq, BlockReason::Fence(fence.source));
        }
        HeadState::Ready
    }

    /// Executes the queue head of `idx` if it is ready. Returns whether an
    /// operation ran.
    fn step(&mut self, idx: u32) -> bool {
        match self.head_state(idx) {
            HeadState::Empty => return false,
            HeadState::Blocked(seq, reason) => {
                if self.surfaces[idx as usize].last_blocked != Some(seq) {
                    self.surfaces[idx as usize].last_blocked = Some(seq);
                    let e = SurfaceBlockedEvent {
                        surface: SurfaceId { idx },
                        seq,
                        reason,
                    };
                    self.emit(|t| t.surface_blocked(&e));
                }
                return false;
            }
            HeadState::Ready => {}
        }

        let Some(op) = self.surfaces[idx as usize].queue.pop_front() else {
            return false;
        };
        self.execute(idx, op.kind, op.seq);
        self.surfaces[idx as usize].completed += 1;
        self.outstanding -= 1;
        for barrier in &mut self.barriers {
            if op.seq < barrier.watermark {
                barrier.remaining -= 1;
            }
        }
        let e = OpCompletedEvent {
            surface: SurfaceId { idx },
            seq: op.seq,
        };
        self.emit(|t| t.op_completed(&e));
        true
    }

    fn execute(&mut self, idx: u32, kind: OpKind, seq: u64) {
        let i = idx as usize;
        match kind {
            OpKind::MoveTo { x, y } => self.surfaces[i].apply_move_to(x, y),
            OpKind::LineTo { x, y } => self.surfaces[i].apply_line_to(x, y),
            OpKind::CurveTo {
                cp1x,
                cp1y,
                cp2x,
                cp2y,
                x,
                y,
            } => self.surfaces[i].apply_curve_to(cp1x, cp1y, cp2x, cp2y, x, y),
            OpKind::Arc {
                x,
                y,
                radius,
                start,
                end,
                negative,
            } => self.surfaces[i].apply_arc(x, y, radius, start, end, negative),
            OpKind::Rect {
                x,
                y,
                width,
                height,
            } => self.surfaces[i].apply_rect(x, y, width, height),
            OpKind::Close => self.surfaces[i].apply_close(),
            OpKind::Clip => self.surfaces[i].apply_clip(),
            OpKind::FillColor { color } => self.surfaces[i].apply_fill_color(color),
            OpKind::StrokeColor { style, color } => {
                self.surfaces[i].apply_stroke_color(style, color);
            }
            OpKind::FillSurface { source } => {
                let pattern = self.surfaces[source.idx as usize].pixmap.clone();
                self.surfaces[i].apply_fill_surface(&pattern);
            }
            OpKind::StrokeSurface { style, source } => {
                let pattern = self.surfaces[source.idx as usize].pixmap.clone();
                self.surfaces[i].apply_stroke_surface(style, &pattern);
            }
            OpKind::DrawImage { x, y, resource } => {
                let mut ok = false;
                if let Some(ResourceState::Ready(pixmap)) = self.resources.get(resource) {
                    let surface = &mut self.surfaces[i];
                    surface.apply_draw_pixmap(x, y, pixmap);
                    surface.resource_ref = Some(resource);
                    ok = true;
                }
                if !ok {
                    // Failed or never registered: abort with no visual effect.
                    self.aborted += 1;
                    let e = OpAbortedEvent {
                        surface: SurfaceId { idx },
                        seq,
                        resource,
                    };
                    self.emit(|t| t.op_aborted(&e));
                }
            }
            OpKind::Put { x, y, pixels } => self.surfaces[i].apply_put(x, y, &pixels),
            OpKind::Copy {
                source,
                sx,
                sy,
                sw,
                sh,
                x,
                y,
            } => {
                let snap = self.surfaces[source.idx as usize].pixmap.sub(sx, sy, sw, sh);
                self.surfaces[i].apply_draw_pixmap(x, y, &snap);
            }
            OpKind::Transfer {
                source,
                sx,
                sy,
                sw,
                sh,
                x,
                y,
                function,
            } => {
                let snap = self.surfaces[source.idx as usize].pixmap.sub(sx, sy, sw, sh);
                self.surfaces[i].apply_transfer(x, y, &snap, function);
            }
            OpKind::Push => self.surfaces[i].apply_push(),
            OpKind::Pop => self.surfaces[i].apply_pop(),
            OpKind::Reset => self.surfaces[i].apply_reset(),
            OpKind::SetTransform { matrix } => self.surfaces[i].apply_set_transform(matrix),
            OpKind::Transform { matrix } => self.surfaces[i].apply_transform(matrix),
            OpKind::Resize { width, height } => {
                let changed = self.surfaces[i].apply_resize(width, height);
                if changed
                    && idx == self.default_surface.idx
                    && let Some(handler) = self.on_resize.as_mut()
                {
                    handler(width, height);
                }
            }
            OpKind::SetChannelMask { mask } => self.surfaces[i].apply_set_channel_mask(mask),
            OpKind::SetMiterLimit { limit } => self.surfaces[i].apply_set_miter_limit(limit),
            // Pure ordering marker; the wait happens in `head_state`.
            OpKind::SyncPoint { .. } => {}
            OpKind::CursorCopy {
                hotspot_x,
                hotspot_y,
                sx,
                sy,
                sw,
                sh,
            } => {
                let snap = self.surfaces[i].pixmap.sub(sx, sy, sw, sh);
                let cursor = self.cursor_surface.idx as usize;
                // The cursor surface is written directly, outside its own
                // queue: cursor state is exempt from the ordering contract.
                self.surfaces[cursor].apply_resize(sw, sh);
                self.surfaces[cursor].pixmap.put_rect(&snap, 0, 0, sw, sh, 0, 0);
                self.cursor_hotspot = (hotspot_x, hotspot_y);
                let (px, py) = self.cursor_position;
                self.tree
                    .translate(self.cursor_layer, px - hotspot_x, py - hotspot_y);
                if let Some(handler) = self.on_cursor.as_mut() {
                    handler(&snap, hotspot_x, hotspot_y);
                }
            }
        }
    }

    fn register_barrier(&mut self, kind: BarrierKind) {
        let e = FlushRegisteredEvent {
            watermark: self.next_seq,
            outstanding: self.outstanding,
        };
        self.emit(|t| t.flush_registered(&e));
        if self.outstanding == 0 {
            let fired = FlushFiredEvent {
                watermark: self.next_seq,
            };
            self.emit(|t| t.flush_fired(&fired));
            match kind {
                BarrierKind::Flush(callback) => callback(),
                BarrierKind::Export(callback) => {
                    let snapshot = self.build_snapshot();
                    callback(snapshot);
                }
            }
        } else {
            self.barriers.push_back(Barrier {
                watermark: self.next_seq,
                remaining: self.outstanding,
                kind,
            });
        }
    }

    fn fire_barriers(&mut self) {
        // Watermarks are monotone, so an earlier barrier always clears no
        // later than a newer one; firing strictly from the front preserves
        // registration order.
        while matches!(self.barriers.front(), Some(b) if b.remaining == 0) {
            let Some(barrier) = self.barriers.pop_front() else {
                break;
            };
            let e = FlushFiredEvent {
                watermark: barrier.watermark,
            };
            self.emit(|t| t.flush_fired(&e));
            match barrier.kind {
                BarrierKind::Flush(callback) => callback(),
                BarrierKind::Export(callback) => {
                    let snapshot = self.build_snapshot();
                    callback(snapshot);
                }
            }
        }
    }

    fn emit(&mut self, f: impl FnOnce(&mut Tracer<'_>)) {
        let mut tracer = match self.sink.as_deref_mut() {
            Some(sink) => Tracer::new(sink),
            None => Tracer::none(),
        };
        f(&mut tracer);
    }
}
