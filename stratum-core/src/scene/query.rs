// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Point queries, buffer iteration, and frame-done fan-out.

use alloc::vec::Vec;

use crate::geometry::Box2;
use crate::scene::id::{INVALID, NodeId, OutputId};
use crate::scene::node::{Content, FrameDoneSignal, NodeKind};
use crate::scene::Scene;
use crate::signal;
use crate::time::Timestamp;

impl Scene {
    /// Finds the topmost node at `(lx, ly)`, in coordinates relative to
    /// `node`'s parent.
    ///
    /// Children are tested topmost-first; disabled subtrees are skipped.
    /// Rects and buffers hit on their bounding box, unless a buffer has a
    /// `point_accepts_input` predicate. Returns the hit node and the point
    /// in that node's local coordinates.
    #[must_use]
    pub fn node_at(&self, node: NodeId, lx: f64, ly: f64) -> Option<(NodeId, f64, f64)> {
        self.nodes.validate(node);
        self.node_at_idx(node.idx, lx, ly)
    }

    fn node_at_idx(&self, idx: u32, lx: f64, ly: f64) -> Option<(NodeId, f64, f64)> {
        let i = idx as usize;
        if !self.nodes.enabled[i] {
            return None;
        }

        let lx = lx - f64::from(self.nodes.x[i]);
        let ly = ly - f64::from(self.nodes.y[i]);

        match &self.nodes.content[i] {
            Content::Tree => {
                let mut child = self.nodes.last_child[i];
                while child != INVALID {
                    if let Some(hit) = self.node_at_idx(child, lx, ly) {
                        return Some(hit);
                    }
                    child = self.nodes.prev_sibling[child as usize];
                }
                None
            }
            Content::Rect { .. } => {
                let (width, height) = self.nodes.size_at(idx);
                let inside =
                    lx >= 0.0 && lx < f64::from(width) && ly >= 0.0 && ly < f64::from(height);
                inside.then(|| (self.nodes.id_at(idx), lx, ly))
            }
            Content::Buffer(state) => {
                let inside = if let Some(accepts) = &state.point_accepts_input {
                    accepts(self.nodes.id_at(idx), lx, ly)
                } else {
                    let (width, height) = self.nodes.size_at(idx);
                    lx >= 0.0 && lx < f64::from(width) && ly >= 0.0 && ly < f64::from(height)
                };
                inside.then(|| (self.nodes.id_at(idx), lx, ly))
            }
        }
    }

    /// Calls `f` for every enabled buffer node under `node`, with its
    /// position accumulated relative to `node`'s parent.
    pub fn for_each_buffer(&self, node: NodeId, mut f: impl FnMut(NodeId, i32, i32)) {
        self.nodes.validate(node);
        self.for_each_buffer_idx(node.idx, 0, 0, &mut f);
    }

    fn for_each_buffer_idx(
        &self,
        idx: u32,
        lx: i32,
        ly: i32,
        f: &mut impl FnMut(NodeId, i32, i32),
    ) {
        let i = idx as usize;
        if !self.nodes.enabled[i] {
            return;
        }
        let lx = lx + self.nodes.x[i];
        let ly = ly + self.nodes.y[i];
        match self.nodes.content[i].kind() {
            NodeKind::Buffer => f(self.nodes.id_at(idx), lx, ly),
            NodeKind::Tree => {
                let mut child = self.nodes.first_child[i];
                while child != INVALID {
                    self.for_each_buffer_idx(child, lx, ly, f);
                    child = self.nodes.next_sibling[child as usize];
                }
            }
            NodeKind::Rect => {}
        }
    }

    /// Calls `f` for every enabled buffer node intersecting the output's
    /// viewport, with positions in scene coordinates.
    pub fn output_for_each_buffer(&self, output: OutputId, mut f: impl FnMut(NodeId, i32, i32)) {
        let pos = self.expect_output(output);
        let viewport = self.outputs[pos].viewport();
        let root = self.root;
        self.for_each_buffer(root, |node, lx, ly| {
            let (width, height) = self.nodes.size_at(node.idx);
            if Box2::new(lx, ly, width, height).intersects(viewport) {
                f(node, lx, ly);
            }
        });
    }

    /// Fires `frame_done` on every enabled buffer whose primary output is
    /// `output`.
    ///
    /// A buffer visible on several outputs receives exactly one frame-done
    /// per vsync this way, from its largest-overlap output.
    pub fn output_send_frame_done(&mut self, output: OutputId, now: Timestamp) {
        self.expect_output(output);
        let mut targets = Vec::new();
        self.collect_nodes(self.root.idx, 0, 0, &mut targets);
        for (node, _, _) in targets {
            if !self.nodes.is_alive(node) {
                continue;
            }
            if self.nodes.content[node.idx as usize].kind() == NodeKind::Buffer
                && self.nodes.buffer_state(node.idx).primary_output == Some(output)
            {
                signal::emit(self, FrameDoneSignal(node), (node, now));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    use super::*;
    use crate::scene::testing::{TestBuffer, TestOutput};
    use crate::scene::DebugDamage;

    fn scene() -> Scene {
        Scene::with_debug_damage(DebugDamage::None)
    }

    #[test]
    fn hit_test_returns_topmost() {
        let mut scene = scene();
        let root = scene.root();
        let bottom = scene.create_rect(root, 100, 100, [0.0; 4]);
        let top = scene.create_rect(root, 100, 100, [0.0; 4]);

        let (hit, lx, ly) = scene.node_at(root, 50.0, 60.0).unwrap();
        assert_eq!(hit, top);
        assert_eq!((lx, ly), (50.0, 60.0));
        let _ = bottom;
    }

    #[test]
    fn hit_test_translates_into_local_coordinates() {
        let mut scene = scene();
        let root = scene.root();
        let tree = scene.create_tree(root);
        scene.set_position(tree, 100, 100);
        let rect = scene.create_rect(tree, 50, 50, [0.0; 4]);
        scene.set_position(rect, 10, 10);

        let (hit, lx, ly) = scene.node_at(root, 120.0, 130.0).unwrap();
        assert_eq!(hit, rect);
        assert_eq!((lx, ly), (10.0, 20.0));

        assert!(scene.node_at(root, 100.0, 100.0).is_none());
    }

    #[test]
    fn hit_test_uses_half_open_bounds() {
        let mut scene = scene();
        let root = scene.root();
        let rect = scene.create_rect(root, 10, 10, [0.0; 4]);

        assert_eq!(scene.node_at(root, 0.0, 0.0).map(|h| h.0), Some(rect));
        assert_eq!(scene.node_at(root, 9.9, 9.9).map(|h| h.0), Some(rect));
        assert!(scene.node_at(root, 10.0, 5.0).is_none());
        assert!(scene.node_at(root, -0.1, 5.0).is_none());
    }

    #[test]
    fn hit_test_skips_disabled_subtrees() {
        let mut scene = scene();
        let root = scene.root();
        let bottom = scene.create_rect(root, 100, 100, [0.0; 4]);
        let top = scene.create_rect(root, 100, 100, [0.0; 4]);

        scene.set_enabled(top, false);
        assert_eq!(scene.node_at(root, 50.0, 50.0).map(|h| h.0), Some(bottom));
    }

    #[test]
    fn hit_test_honours_point_accepts_input() {
        let mut scene = scene();
        let root = scene.root();
        let buffer = scene.create_buffer(root, Some(TestBuffer::new(100, 100)));

        // Accept only the left half.
        scene.buffer_set_point_accepts_input(
            buffer,
            Some(Box::new(|_, lx, _| lx < 50.0)),
        );

        assert_eq!(scene.node_at(root, 25.0, 50.0).map(|h| h.0), Some(buffer));
        assert!(scene.node_at(root, 75.0, 50.0).is_none());
    }

    #[test]
    fn for_each_buffer_accumulates_positions() {
        let mut scene = scene();
        let root = scene.root();
        let tree = scene.create_tree(root);
        scene.set_position(tree, 10, 10);
        let a = scene.create_buffer(tree, Some(TestBuffer::new(5, 5)));
        scene.set_position(a, 1, 2);
        let b = scene.create_buffer(root, Some(TestBuffer::new(5, 5)));
        scene.set_position(b, 100, 100);
        let hidden = scene.create_buffer(tree, Some(TestBuffer::new(5, 5)));
        scene.set_enabled(hidden, false);
        let _rect = scene.create_rect(root, 5, 5, [0.0; 4]);

        let visited = RefCell::new(Vec::new());
        scene.for_each_buffer(root, |node, x, y| visited.borrow_mut().push((node, x, y)));
        assert_eq!(*visited.borrow(), [(a, 11, 12), (b, 100, 100)]);
    }

    #[test]
    fn output_for_each_buffer_filters_by_viewport() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(100, 100)));

        let inside = scene.create_buffer(root, Some(TestBuffer::new(10, 10)));
        let outside = scene.create_buffer(root, Some(TestBuffer::new(10, 10)));
        scene.set_position(outside, 500, 500);

        let visited = RefCell::new(Vec::new());
        scene.output_for_each_buffer(output, |node, _, _| visited.borrow_mut().push(node));
        assert_eq!(*visited.borrow(), [inside]);
        let _ = outside;
    }

    #[test]
    fn frame_done_targets_primary_output_only() {
        let mut scene = scene();
        let root = scene.root();
        let o0 = scene.output_create(Box::new(TestOutput::new(100, 100)));
        let o1 = scene.output_create(Box::new(TestOutput::new(100, 100)));
        scene.output_set_position(o1, 100, 0);

        // Spans both outputs, mostly on o0.
        let buffer = scene.create_buffer(root, Some(TestBuffer::new(40, 40)));
        scene.set_position(buffer, 70, 0);
        assert_eq!(scene.buffer_primary_output(buffer), Some(o0));

        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        scene.buffer_on_frame_done(buffer, move |_, _, _| f.set(f.get() + 1));

        scene.output_send_frame_done(o0, Timestamp::from_millis(16));
        assert_eq!(fired.get(), 1);

        scene.output_send_frame_done(o1, Timestamp::from_millis(32));
        assert_eq!(fired.get(), 1, "only the primary output delivers frame-done");
    }

    #[test]
    fn frame_done_carries_the_timestamp() {
        let mut scene = scene();
        let root = scene.root();
        let o0 = scene.output_create(Box::new(TestOutput::new(100, 100)));
        let buffer = scene.create_buffer(root, Some(TestBuffer::new(10, 10)));

        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        scene.buffer_on_frame_done(buffer, move |_, _, now| s.set(Some(now)));

        scene.output_send_frame_done(o0, Timestamp::from_millis(42));
        assert_eq!(seen.get(), Some(Timestamp::from_millis(42)));
    }

    #[test]
    fn frame_done_skips_disabled_buffers() {
        let mut scene = scene();
        let root = scene.root();
        let o0 = scene.output_create(Box::new(TestOutput::new(100, 100)));
        let buffer = scene.create_buffer(root, Some(TestBuffer::new(10, 10)));

        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        scene.buffer_on_frame_done(buffer, move |_, _, _| f.set(f.get() + 1));

        scene.set_enabled(buffer, false);
        scene.output_send_frame_done(o0, Timestamp::from_millis(16));
        assert_eq!(fired.get(), 0);
    }
}
