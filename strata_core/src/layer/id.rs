// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visible-layer identity.

use core::fmt;

/// Sentinel value indicating "no layer" in index fields.
pub(crate) const INVALID: u32 = u32::MAX;

/// A handle to a node in a [`LayerTree`](super::LayerTree).
///
/// Layers live as long as their coordinator (disposal only detaches a node,
/// it never destroys it), so handles are plain slot indices. Passing a
/// handle to a coordinator other than the one that issued it panics if the
/// index is out of range and is otherwise undetected misuse.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId {
    pub(crate) idx: u32,
}

impl LayerId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.idx)
    }
}
