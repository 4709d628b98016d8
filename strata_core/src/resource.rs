// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Asynchronously resolved drawing resources.
//!
//! The engine never decodes images, video frames, or blobs itself; the
//! embedding protocol layer registers a [`ResourceId`] up front, hands it to
//! a drawing call (`draw_image`), and later resolves or fails it. A surface
//! operation that depends on a pending resource blocks its own queue —
//! and only its own queue — until the resource leaves the pending state.
//!
//! There is no built-in timeout: an embedder that wants one calls
//! [`fail`](ResourceTable::fail) when its own deadline expires, which aborts
//! the dependent operations and lets the queue (and any flush barriers)
//! make progress.

use alloc::collections::BTreeMap;
use core::fmt;

use crate::pixmap::Pixmap;

/// A key identifying one externally loaded resource.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u64);

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// The lifecycle of one resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceState {
    /// Registered but not yet resolved; dependent operations block.
    Pending,
    /// Decoded pixels are available.
    Ready(Pixmap),
    /// The load failed; dependent operations abort.
    Failed,
}

/// Error returned by resolve/fail transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceError {
    /// The id was never registered.
    Unknown(ResourceId),
    /// The resource already left the pending state.
    AlreadySettled(ResourceId),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "unknown resource {id:?}"),
            Self::AlreadySettled(id) => write!(f, "resource {id:?} already settled"),
        }
    }
}

/// All resources known to one coordinator.
#[derive(Debug, Default)]
pub struct ResourceTable {
    entries: BTreeMap<u64, ResourceState>,
    next_id: u64,
}

impl ResourceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh pending resource and returns its id.
    pub fn register(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id.0, ResourceState::Pending);
        id
    }

    /// Registers a pending resource under an embedder-chosen id.
    ///
    /// Used by snapshot import, where ids must match the exported ones.
    /// Re-registering an id that already exists resets it to pending.
    pub fn register_with_id(&mut self, id: ResourceId) {
        self.next_id = self.next_id.max(id.0 + 1);
        self.entries.insert(id.0, ResourceState::Pending);
    }

    /// Resolves a pending resource with decoded pixels.
    pub fn resolve(&mut self, id: ResourceId, pixmap: Pixmap) -> Result<(), ResourceError> {
        match self.entries.get_mut(&id.0) {
            None => Err(ResourceError::Unknown(id)),
            Some(state @ ResourceState::Pending) => {
                *state = ResourceState::Ready(pixmap);
                Ok(())
            }
            Some(_) => Err(ResourceError::AlreadySettled(id)),
        }
    }

    /// Marks a pending resource as failed.
    pub fn fail(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        match self.entries.get_mut(&id.0) {
            None => Err(ResourceError::Unknown(id)),
            Some(state @ ResourceState::Pending) => {
                *state = ResourceState::Failed;
                Ok(())
            }
            Some(_) => Err(ResourceError::AlreadySettled(id)),
        }
    }

    /// Returns the state of a resource, if registered.
    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<&ResourceState> {
        self.entries.get(&id.0)
    }
}
