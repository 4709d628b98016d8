// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered asynchronous compositing for remote-display clients.
//!
//! `strata_core` renders a stream of drawing directives onto a layered 2D
//! scene, deterministically, even though some directives depend on
//! resources (images, blobs) that resolve out of order. It is `no_std`
//! compatible (with `alloc`).
//!
//! # Architecture
//!
//! The crate is organized around per-surface operation queues drained by a
//! cooperative pump:
//!
//! ```text
//!   Protocol layer (decoded drawing calls + resource handles)
//!       │
//!       ▼
//!   Display ──► per-Surface op queues ──► Pixmap backing stores
//!      │              │                        │
//!      │              └── blocked on a         ▼
//!      │                  ResourceId?    LayerTree placement
//!      ▼                                       │
//!   flush barriers ◄── op completions          ▼
//!      │                                  flatten() frame
//!      ▼
//!   callbacks (resize, cursor, export)
//! ```
//!
//! **[`surface`]** — Drawing targets: pixel store, path state, draw-state
//! stack, channel mask, and the FIFO operation queue. Strict intra-surface
//! ordering; full inter-surface independence.
//!
//! **[`compose`]** — The 4-bit channel-mask compositing model (the
//! Porter-Duff family over premultiplied pixels).
//!
//! **[`layer`]** — The visible-surface hierarchy: an arena-backed tree with
//! per-node placement (`x`, `y`, `z`, alpha, matrix). Compositing by
//! positioning, not raster blending.
//!
//! **[`display`]** — The frame coordinator: owns surfaces, tree, and
//! resources; sequences queues; provides generation-scoped `flush`
//! barriers, cursor handling, presentation scale, and snapshot
//! export/import.
//!
//! **[`resource`]** — Externally resolved images/blobs and their
//! pending/ready/failed lifecycle.
//!
//! **[`pixmap`]** — Premultiplied-RGBA8 pixel buffers and transfer
//! routines.
//!
//! **[`snapshot`]** — Plain-data display snapshots for reconnection
//! (serialized by `strata_state`).
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types
//! for pipeline instrumentation, with zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod compose;
pub mod display;
pub mod layer;
pub mod pixmap;
pub mod resource;
pub mod snapshot;
pub mod surface;
pub mod trace;

pub use kurbo;
