// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the operation pipeline.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! the coordinator calls as operations move through the per-surface queues.
//! All method bodies default to no-ops, so implementing only the events you
//! care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace`
//! feature is **off**, every `Tracer` method compiles to nothing (zero
//! overhead). When **on**, each method performs a single `Option` branch
//! before dispatching.
//!
//! Sinks are the seam where an embedder plugs real logging in;
//! `strata_debug` ships a stock line-per-event implementation.

use crate::resource::ResourceId;
use crate::surface::SurfaceId;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Why a surface's queue head cannot run yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockReason {
    /// Waiting for an external resource to resolve or fail.
    Resource(ResourceId),
    /// Waiting for another surface to drain its fenced operations.
    Fence(SurfaceId),
}

/// Emitted when an operation is appended to a surface's queue.
#[derive(Clone, Copy, Debug)]
pub struct OpEnqueuedEvent {
    /// Target surface.
    pub surface: SurfaceId,
    /// Coordinator-global sequence number.
    pub seq: u64,
}

/// Emitted when an operation completes (including aborted ones).
#[derive(Clone, Copy, Debug)]
pub struct OpCompletedEvent {
    /// Target surface.
    pub surface: SurfaceId,
    /// Coordinator-global sequence number.
    pub seq: u64,
}

/// Emitted when an operation is dropped because its resource failed.
#[derive(Clone, Copy, Debug)]
pub struct OpAbortedEvent {
    /// Target surface.
    pub surface: SurfaceId,
    /// Coordinator-global sequence number.
    pub seq: u64,
    /// The resource that failed.
    pub resource: ResourceId,
}

/// Emitted the first time a queue head is found blocked.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceBlockedEvent {
    /// The suspended surface.
    pub surface: SurfaceId,
    /// Sequence number of the blocked operation.
    pub seq: u64,
    /// What the operation is waiting for.
    pub reason: BlockReason,
}

/// Emitted when a resource leaves the pending state.
#[derive(Clone, Copy, Debug)]
pub struct ResourceSettledEvent {
    /// The resource.
    pub resource: ResourceId,
    /// Whether it failed (as opposed to resolving with pixels).
    pub failed: bool,
}

/// Emitted when a flush barrier is registered.
#[derive(Clone, Copy, Debug)]
pub struct FlushRegisteredEvent {
    /// Sequence watermark the barrier waits below.
    pub watermark: u64,
    /// Operations outstanding at registration.
    pub outstanding: u64,
}

/// Emitted when a flush barrier fires.
#[derive(Clone, Copy, Debug)]
pub struct FlushFiredEvent {
    /// The barrier's sequence watermark.
    pub watermark: u64,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the operation pipeline.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when an operation is enqueued.
    fn on_op_enqueued(&mut self, e: &OpEnqueuedEvent) {
        _ = e;
    }

    /// Called when an operation completes.
    fn on_op_completed(&mut self, e: &OpCompletedEvent) {
        _ = e;
    }

    /// Called when an operation aborts because its resource failed.
    fn on_op_aborted(&mut self, e: &OpAbortedEvent) {
        _ = e;
    }

    /// Called when a surface's queue head blocks.
    fn on_surface_blocked(&mut self, e: &SurfaceBlockedEvent) {
        _ = e;
    }

    /// Called when a resource resolves or fails.
    fn on_resource_settled(&mut self, e: &ResourceSettledEvent) {
        _ = e;
    }

    /// Called when a flush barrier is registered.
    fn on_flush_registered(&mut self, e: &FlushRegisteredEvent) {
        _ = e;
    }

    /// Called when a flush barrier fires.
    fn on_flush_fired(&mut self, e: &FlushFiredEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits an [`OpEnqueuedEvent`].
    #[inline]
    pub fn op_enqueued(&mut self, e: &OpEnqueuedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_op_enqueued(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`OpCompletedEvent`].
    #[inline]
    pub fn op_completed(&mut self, e: &OpCompletedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_op_completed(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`OpAbortedEvent`].
    #[inline]
    pub fn op_aborted(&mut self, e: &OpAbortedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_op_aborted(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`SurfaceBlockedEvent`].
    #[inline]
    pub fn surface_blocked(&mut self, e: &SurfaceBlockedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_surface_blocked(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`ResourceSettledEvent`].
    #[inline]
    pub fn resource_settled(&mut self, e: &ResourceSettledEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_resource_settled(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FlushRegisteredEvent`].
    #[inline]
    pub fn flush_registered(&mut self, e: &FlushRegisteredEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_flush_registered(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FlushFiredEvent`].
    #[inline]
    pub fn flush_fired(&mut self, e: &FlushFiredEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_flush_fired(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}
