// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic display-state snapshots.
//!
//! A [`Snapshot`] captures enough of a coordinator's visible-surface tree
//! to rebuild an equivalent tree on a fresh coordinator after a
//! reconnection: per-layer dimensions, placement, and the resource
//! reference of the last image drawn (so the import can re-issue the
//! load). Snapshots are plain data; the `strata_state` crate serializes
//! them to the persisted JSON layout.
//!
//! Public layer ids are stable for a given surface identity: the default
//! layer is always [`DEFAULT_LAYER_ID`], the cursor layer is always
//! [`CURSOR_LAYER_ID`], and created visible layers count up from 1.
//! Buffers (negative ids below the cursor's) are invisible scratch
//! surfaces and never appear in snapshots.

use alloc::collections::BTreeMap;

use crate::resource::ResourceId;

/// Public id of the permanent default (root) layer.
pub const DEFAULT_LAYER_ID: i64 = 0;

/// Public id of the permanent cursor layer.
pub const CURSOR_LAYER_ID: i64 = -1;

/// One visible layer's exported state.
///
/// Positional fields are omitted (`None`) when they hold their default
/// value; the default and cursor layers omit all of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerEntry {
    /// Declared surface width in pixels.
    pub width: i32,
    /// Declared surface height in pixels.
    pub height: i32,
    /// The last image resource drawn into the surface, if any.
    pub resource: Option<ResourceId>,
    /// Horizontal placement within the parent.
    pub x: Option<i32>,
    /// Vertical placement within the parent.
    pub y: Option<i32>,
    /// Sibling stacking order.
    pub z: Option<i32>,
    /// Opacity (255 = opaque).
    pub alpha: Option<u8>,
    /// Placement matrix as `[a, b, c, d, e, f]` affine coefficients.
    pub matrix: Option<[f64; 6]>,
    /// Public id of the parent layer, if attached.
    pub parent: Option<i64>,
}

/// A settled-frame snapshot of one coordinator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Embedder-defined coordinator state code.
    pub state: u32,
    /// Monotonically increasing export counter.
    pub timestamp: u64,
    /// All live visible layers, keyed by public id.
    pub layers: BTreeMap<i64, LayerEntry>,
}
