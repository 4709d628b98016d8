// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays storage for the visible-layer hierarchy.

use alloc::vec::Vec;
use core::fmt;

use kurbo::Affine;

use crate::surface::SurfaceId;

use super::id::{INVALID, LayerId};
use super::traverse::Children;

/// Error returned by structural mutations of the layer tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// The requested reparent would make a node its own ancestor.
    Cycle,
    /// The default layer is the permanent root and cannot be reparented
    /// or disposed.
    RootImmovable,
    /// The cursor layer is an overlay and cannot adopt children.
    CursorOverlay,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle => write!(f, "reparent would create a cycle"),
            Self::RootImmovable => write!(f, "the default layer cannot be moved or disposed"),
            Self::CursorOverlay => write!(f, "the cursor layer cannot adopt children"),
        }
    }
}

/// Struct-of-arrays storage for all visible layers of one coordinator.
///
/// Layers are addressed by [`LayerId`] slot handles. Each node carries its
/// placement within the parent's coordinate space: an `(x, y)` offset, a
/// sibling stacking order `z`, an opacity `alpha`, and an affine `matrix`.
/// Parent links are indices, not owning references; detaching a node leaves
/// it (and its subtree) fully valid as a standalone root.
#[derive(Debug, Default)]
pub struct LayerTree {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Placement --
    pub(crate) x: Vec<i32>,
    pub(crate) y: Vec<i32>,
    pub(crate) z: Vec<i32>,
    pub(crate) alpha: Vec<u8>,
    pub(crate) matrix: Vec<Affine>,

    // -- Content --
    pub(crate) surface: Vec<SurfaceId>,

    len: u32,
}

impl LayerTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached node presenting `surface` and returns its handle.
    ///
    /// The node starts at `(0, 0)`, `z = 0`, fully opaque, with an identity
    /// matrix and no parent.
    pub fn create_node(&mut self, surface: SurfaceId) -> LayerId {
        let idx = self.len;
        self.len += 1;
        self.parent.push(INVALID);
        self.first_child.push(INVALID);
        self.next_sibling.push(INVALID);
        self.prev_sibling.push(INVALID);
        self.x.push(0);
        self.y.push(0);
        self.z.push(0);
        self.alpha.push(255);
        self.matrix.push(Affine::IDENTITY);
        self.surface.push(surface);
        LayerId { idx }
    }

    /// Number of nodes ever created.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Whether the tree holds no nodes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    // -- Topology API --

    /// Atomically reparents `child` under `parent` and repositions it.
    ///
    /// Rejects the move (leaving the tree untouched) if it would make
    /// `child` an ancestor of itself.
    ///
    /// # Panics
    ///
    /// Panics if either handle is out of range.
    pub fn move_to_parent(
        &mut self,
        child: LayerId,
        parent: LayerId,
        x: i32,
        y: i32,
        z: i32,
    ) -> Result<(), TreeError> {
        self.validate(child);
        self.validate(parent);
        if child == parent || self.is_ancestor(child, parent) {
            return Err(TreeError::Cycle);
        }

        if self.parent[child.idx as usize] != INVALID {
            self.unlink_from_parent(child.idx);
        }

        // Attach as last child, preserving insertion order among siblings.
        let p = parent.idx;
        let c = child.idx;
        self.parent[c as usize] = p;
        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }

        self.x[c as usize] = x;
        self.y[c as usize] = y;
        self.z[c as usize] = z;
        Ok(())
    }

    /// Detaches a node from its parent, if it has one.
    ///
    /// The node and its subtree remain valid standalone layers; disposing an
    /// already-detached node is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    pub fn dispose(&mut self, id: LayerId) {
        self.validate(id);
        if self.parent[id.idx as usize] != INVALID {
            self.unlink_from_parent(id.idx);
        }
    }

    /// Returns the parent of a layer, if any.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    #[must_use]
    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        if p == INVALID { None } else { Some(LayerId { idx: p }) }
    }

    /// Returns an iterator over the direct children in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    #[must_use]
    pub fn children(&self, id: LayerId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns the children in compositing order: ascending `z`, ties broken
    /// by insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    #[must_use]
    pub fn render_order(&self, id: LayerId) -> Vec<LayerId> {
        let mut kids: Vec<LayerId> = self.children(id).collect();
        // Stable sort keeps insertion order within equal z.
        kids.sort_by_key(|k| self.z[k.idx as usize]);
        kids
    }

    /// Whether `ancestor` appears on `node`'s parent chain (or equals it).
    #[must_use]
    pub fn is_ancestor(&self, ancestor: LayerId, node: LayerId) -> bool {
        self.validate(ancestor);
        self.validate(node);
        let mut cur = node.idx;
        loop {
            if cur == ancestor.idx {
                return true;
            }
            cur = self.parent[cur as usize];
            if cur == INVALID {
                return false;
            }
        }
    }

    // -- Placement API --

    /// Repositions a node within its parent without reparenting.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    pub fn translate(&mut self, id: LayerId, x: i32, y: i32) {
        self.validate(id);
        self.x[id.idx as usize] = x;
        self.y[id.idx as usize] = y;
    }

    /// Sets a node's opacity (255 = opaque). Opacity composes
    /// multiplicatively down the tree during compositing.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    pub fn shade(&mut self, id: LayerId, alpha: u8) {
        self.validate(id);
        self.alpha[id.idx as usize] = alpha;
    }

    /// Sets a node's placement matrix.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    pub fn distort(&mut self, id: LayerId, matrix: Affine) {
        self.validate(id);
        self.matrix[id.idx as usize] = matrix;
    }

    // -- Getters --

    /// Horizontal placement within the parent.
    #[must_use]
    pub fn x(&self, id: LayerId) -> i32 {
        self.validate(id);
        self.x[id.idx as usize]
    }

    /// Vertical placement within the parent.
    #[must_use]
    pub fn y(&self, id: LayerId) -> i32 {
        self.validate(id);
        self.y[id.idx as usize]
    }

    /// Sibling stacking order.
    #[must_use]
    pub fn z(&self, id: LayerId) -> i32 {
        self.validate(id);
        self.z[id.idx as usize]
    }

    /// Opacity (255 = opaque).
    #[must_use]
    pub fn alpha(&self, id: LayerId) -> u8 {
        self.validate(id);
        self.alpha[id.idx as usize]
    }

    /// Placement matrix.
    #[must_use]
    pub fn matrix(&self, id: LayerId) -> Affine {
        self.validate(id);
        self.matrix[id.idx as usize]
    }

    /// The surface this node presents.
    #[must_use]
    pub fn surface(&self, id: LayerId) -> SurfaceId {
        self.validate(id);
        self.surface[id.idx as usize]
    }

    // -- Internal helpers --

    fn validate(&self, id: LayerId) {
        assert!(
            id.idx < self.len,
            "LayerId {id:?} out of range (len {})",
            self.len
        );
    }

    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            // Was first child.
            self.first_child[p as usize] = next;
        }

        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn tree_with(n: u32) -> (LayerTree, Vec<LayerId>) {
        let mut tree = LayerTree::new();
        let ids = (0..n).map(|i| tree.create_node(SurfaceId { idx: i })).collect();
        (tree, ids)
    }

    #[test]
    fn create_starts_detached_with_defaults() {
        let (tree, ids) = tree_with(1);
        let id = ids[0];
        assert_eq!(tree.parent(id), None);
        assert_eq!((tree.x(id), tree.y(id), tree.z(id)), (0, 0, 0));
        assert_eq!(tree.alpha(id), 255);
        assert_eq!(tree.matrix(id), Affine::IDENTITY);
    }

    #[test]
    fn move_to_parent_attaches_and_positions() {
        let (mut tree, ids) = tree_with(2);
        tree.move_to_parent(ids[1], ids[0], 10, 20, 3).unwrap();
        assert_eq!(tree.parent(ids[1]), Some(ids[0]));
        assert_eq!((tree.x(ids[1]), tree.y(ids[1]), tree.z(ids[1])), (10, 20, 3));
        let kids: Vec<_> = tree.children(ids[0]).collect();
        assert_eq!(kids, vec![ids[1]]);
    }

    #[test]
    fn reparent_detaches_from_old_parent() {
        let (mut tree, ids) = tree_with(3);
        tree.move_to_parent(ids[2], ids[0], 0, 0, 0).unwrap();
        tree.move_to_parent(ids[2], ids[1], 5, 5, 0).unwrap();
        assert!(tree.children(ids[0]).next().is_none());
        assert_eq!(tree.parent(ids[2]), Some(ids[1]));
    }

    #[test]
    fn cycle_is_rejected_and_tree_unchanged() {
        let (mut tree, ids) = tree_with(3);
        tree.move_to_parent(ids[1], ids[0], 0, 0, 0).unwrap();
        tree.move_to_parent(ids[2], ids[1], 0, 0, 0).unwrap();

        assert_eq!(
            tree.move_to_parent(ids[0], ids[2], 0, 0, 0),
            Err(TreeError::Cycle)
        );
        assert_eq!(tree.move_to_parent(ids[0], ids[0], 0, 0, 0), Err(TreeError::Cycle));
        // Unchanged: ids[0] is still the root of the chain.
        assert_eq!(tree.parent(ids[0]), None);
        assert_eq!(tree.parent(ids[2]), Some(ids[1]));
    }

    #[test]
    fn dispose_detaches_but_keeps_subtree() {
        let (mut tree, ids) = tree_with(3);
        tree.move_to_parent(ids[1], ids[0], 0, 0, 0).unwrap();
        tree.move_to_parent(ids[2], ids[1], 7, 8, 0).unwrap();

        tree.dispose(ids[1]);
        assert!(tree.children(ids[0]).next().is_none());
        assert_eq!(tree.parent(ids[1]), None);
        // Subtree intact.
        assert_eq!(tree.parent(ids[2]), Some(ids[1]));
        assert_eq!((tree.x(ids[2]), tree.y(ids[2])), (7, 8));

        // Disposing again is a no-op.
        tree.dispose(ids[1]);
        assert_eq!(tree.parent(ids[1]), None);
    }

    #[test]
    fn children_keep_insertion_order() {
        let (mut tree, ids) = tree_with(4);
        for &c in &ids[1..] {
            tree.move_to_parent(c, ids[0], 0, 0, 0).unwrap();
        }
        let kids: Vec<_> = tree.children(ids[0]).collect();
        assert_eq!(kids, vec![ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn render_order_sorts_by_z_stable() {
        let (mut tree, ids) = tree_with(5);
        tree.move_to_parent(ids[1], ids[0], 0, 0, 5).unwrap();
        tree.move_to_parent(ids[2], ids[0], 0, 0, -1).unwrap();
        tree.move_to_parent(ids[3], ids[0], 0, 0, 5).unwrap();
        tree.move_to_parent(ids[4], ids[0], 0, 0, 0).unwrap();
        // Ascending z; ids[1] before ids[3] because it was inserted first.
        assert_eq!(tree.render_order(ids[0]), vec![ids[2], ids[4], ids[1], ids[3]]);
    }

    #[test]
    fn shade_and_distort_update_placement() {
        let (mut tree, ids) = tree_with(1);
        tree.shade(ids[0], 128);
        tree.distort(ids[0], Affine::scale(2.0));
        tree.translate(ids[0], -4, 9);
        assert_eq!(tree.alpha(ids[0]), 128);
        assert_eq!(tree.matrix(ids[0]), Affine::scale(2.0));
        assert_eq!((tree.x(ids[0]), tree.y(ids[0])), (-4, 9));
    }

    #[test]
    fn is_ancestor_walks_the_chain() {
        let (mut tree, ids) = tree_with(3);
        tree.move_to_parent(ids[1], ids[0], 0, 0, 0).unwrap();
        tree.move_to_parent(ids[2], ids[1], 0, 0, 0).unwrap();
        assert!(tree.is_ancestor(ids[0], ids[2]));
        assert!(tree.is_ancestor(ids[2], ids[2]));
        assert!(!tree.is_ancestor(ids[2], ids[0]));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_handle_panics() {
        let (tree, _) = tree_with(1);
        let _ = tree.parent(LayerId { idx: 99 });
    }
}
