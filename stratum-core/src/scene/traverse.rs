// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use crate::scene::id::{INVALID, NodeId};
use crate::scene::node::Nodes;
use crate::scene::Scene;

/// An iterator over the direct children of a node, bottom to top.
///
/// Created by [`Scene::children`].
pub struct Children<'a> {
    nodes: &'a Nodes,
    current: u32,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.nodes.next_sibling[idx as usize];
        Some(self.nodes.id_at(idx))
    }
}

impl Scene {
    /// Returns the node's children in paint order (bottommost first).
    ///
    /// Rects and buffers have no children; the iterator is empty for them.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Children<'_> {
        self.nodes.validate(node);
        Children {
            nodes: &self.nodes,
            current: self.nodes.first_child[node.idx as usize],
        }
    }
}
