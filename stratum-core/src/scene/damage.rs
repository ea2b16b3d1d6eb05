// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage emission.
//!
//! Two paths feed the per-output accumulators:
//!
//! - **Whole-node damage**: the node's footprint, translated into each
//!   output's space and scaled by that output's scale factor. Geometric
//!   setters call this twice — old footprint before the mutation, new
//!   footprint after — so both areas repaint. Disabled chains emit nothing.
//! - **Partial buffer damage**: a buffer-local region supplied with a buffer
//!   update. It is remapped by the node's transform, cropped to the source
//!   box, scaled by destination-over-source times the output scale per axis,
//!   and translated to the node's position on each output.
//!
//! Off-screen portions are clipped by the accumulator itself.

use crate::geometry::Box2;
use crate::region::Region;
use crate::scene::id::{INVALID, NodeId};
use crate::scene::node::Content;
use crate::scene::Scene;

impl Scene {
    /// Damages the node's whole footprint on every output, recursing into
    /// tree children. A no-op while the node's ancestor chain is disabled.
    pub(crate) fn damage_whole(&mut self, node: NodeId) {
        if self.outputs.is_empty() {
            return;
        }
        let (lx, ly, enabled) = self.node_coords(node);
        if !enabled {
            return;
        }
        self.damage_whole_at(node.idx, lx, ly);
    }

    fn damage_whole_at(&mut self, idx: u32, lx: i32, ly: i32) {
        if !self.nodes.enabled[idx as usize] {
            return;
        }

        // Trees have no footprint of their own but their children may
        // extend anywhere.
        if matches!(self.nodes.content[idx as usize], Content::Tree) {
            let mut child = self.nodes.first_child[idx as usize];
            while child != INVALID {
                let c = child as usize;
                let (cx, cy) = (self.nodes.x[c], self.nodes.y[c]);
                self.damage_whole_at(child, lx + cx, ly + cy);
                child = self.nodes.next_sibling[c];
            }
        }

        let (width, height) = self.nodes.size_at(idx);
        for i in 0..self.outputs.len() {
            let output = &self.outputs[i];
            let (ox, oy, scale) = (output.x, output.y, output.device.scale());
            let b = Box2::new(lx - ox, ly - oy, width, height).scale(scale);
            self.outputs[i].damage.add_box(b);
        }
    }

    /// Emits buffer-local `damage` for a buffer node, mapped into each
    /// output's coordinates.
    pub(crate) fn buffer_damage_region(&mut self, node: NodeId, damage: &Region) {
        let (lx, ly, enabled) = self.node_coords(node);
        if !enabled {
            return;
        }

        let state = self.nodes.buffer_state(node.idx);
        let Some(buffer) = state.buffer.as_ref() else {
            return;
        };
        let (buf_width, buf_height) = (buffer.width(), buffer.height());
        let transform = state.transform;

        // The source space is the transformed buffer.
        let src = state.src_box.unwrap_or_else(|| {
            if transform.swaps_dimensions() {
                kurbo::Rect::new(0.0, 0.0, f64::from(buf_height), f64::from(buf_width))
            } else {
                kurbo::Rect::new(0.0, 0.0, f64::from(buf_width), f64::from(buf_height))
            }
        });
        let (scale_x, scale_y) = if state.dst_width != 0 || state.dst_height != 0 {
            (
                f64::from(state.dst_width) / src.width(),
                f64::from(state.dst_height) / src.height(),
            )
        } else {
            (
                f64::from(buf_width) / src.width(),
                f64::from(buf_height) / src.height(),
            )
        };

        let mut transformed = damage.transformed(transform, buf_width, buf_height);
        transformed.intersect_box(Box2::new(
            src.x0 as i32,
            src.y0 as i32,
            src.width() as i32,
            src.height() as i32,
        ));

        for i in 0..self.outputs.len() {
            let output = &self.outputs[i];
            let (ox, oy) = (output.x, output.y);
            let output_scale = f64::from(output.device.scale());
            let mut mapped = transformed.scaled_xy(output_scale * scale_x, output_scale * scale_y);
            mapped.translate(
                (f64::from(lx - ox) * output_scale) as i32,
                (f64::from(ly - oy) * output_scale) as i32,
            );
            self.outputs[i].damage.add(&mapped);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use super::*;
    use crate::scene::testing::{TestBuffer, TestOutput};
    use crate::scene::DebugDamage;
    use crate::transform::Transform;

    fn scene() -> Scene {
        Scene::with_debug_damage(DebugDamage::None)
    }

    /// Consumes all pending damage, as a successful frame would.
    fn drain(scene: &mut Scene) {
        for output in &mut scene.outputs {
            output.damage.rotate();
        }
    }

    #[test]
    fn rect_creation_damages_footprint() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));
        drain(&mut scene);

        let rect = scene.create_rect(root, 100, 50, [0.0; 4]);
        scene.set_position(rect, 10, 20);

        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(0, 0, 100, 50)));
        assert!(damage.covers_box(Box2::new(10, 20, 100, 50)));
    }

    #[test]
    fn set_position_damages_old_and_new_footprint() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));
        let rect = scene.create_rect(root, 100, 100, [0.0; 4]);
        scene.set_position(rect, 10, 10);
        drain(&mut scene);

        scene.set_position(rect, 300, 200);
        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(10, 10, 100, 100)));
        assert!(damage.covers_box(Box2::new(300, 200, 100, 100)));
        assert_eq!(damage.area(), 2 * 100 * 100);
    }

    #[test]
    fn reparent_damages_both_locations() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));

        let t1 = scene.create_tree(root);
        let t2 = scene.create_tree(root);
        scene.set_position(t2, 500, 500);
        let node = scene.create_rect(t1, 100, 100, [0.0; 4]);
        scene.set_position(node, 10, 10);
        drain(&mut scene);

        scene.reparent(node, t2);
        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(10, 10, 100, 100)));
        // The new footprint is clipped at the output boundary.
        assert!(damage.covers_box(Box2::new(510, 510, 100, 90)));
    }

    #[test]
    fn disabled_chain_suppresses_damage() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));
        let tree = scene.create_tree(root);
        let rect = scene.create_rect(tree, 50, 50, [0.0; 4]);
        scene.set_enabled(tree, false);
        drain(&mut scene);

        scene.set_position(rect, 100, 100);
        scene.rect_set_size(rect, 80, 80);
        assert!(scene.output_damage(output).is_empty());
    }

    #[test]
    fn disabling_damages_the_old_footprint_once() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));
        let rect = scene.create_rect(root, 50, 50, [0.0; 4]);
        drain(&mut scene);

        scene.set_enabled(rect, false);
        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(0, 0, 50, 50)));
        assert_eq!(damage.area(), 50 * 50);

        drain(&mut scene);
        scene.set_enabled(rect, true);
        assert!(scene.output_damage(output).covers_box(Box2::new(0, 0, 50, 50)));
    }

    #[test]
    fn damage_is_scaled_to_output_pixels() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::with(
            1600,
            1200,
            2.0,
            Transform::Normal,
        )));
        drain(&mut scene);

        let rect = scene.create_rect(root, 5, 5, [0.0; 4]);
        scene.set_position(rect, 3, 0);
        drain(&mut scene);

        scene.rect_set_color(rect, [1.0; 4]);
        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(6, 0, 10, 10)));
        assert_eq!(damage.area(), 100);
    }

    #[test]
    fn damage_lands_in_output_local_coordinates() {
        let mut scene = scene();
        let root = scene.root();
        let o0 = scene.output_create(Box::new(TestOutput::new(800, 600)));
        let o1 = scene.output_create(Box::new(TestOutput::new(800, 600)));
        scene.output_set_position(o1, 800, 0);
        drain(&mut scene);

        let rect = scene.create_rect(root, 100, 100, [0.0; 4]);
        scene.set_position(rect, 750, 10);

        assert!(scene.output_damage(o0).covers_box(Box2::new(750, 10, 50, 100)));
        assert!(scene.output_damage(o1).covers_box(Box2::new(0, 10, 50, 100)));
        assert_eq!(scene.output_damage(o1).extents().x, 0);
    }

    #[test]
    fn partial_damage_is_cropped_scaled_and_translated() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::with(
            1600,
            1200,
            2.0,
            Transform::Normal,
        )));

        let node = scene.create_buffer(root, Some(TestBuffer::new(200, 200)));
        scene.buffer_set_source_box(node, Some(kurbo::Rect::new(50.0, 50.0, 150.0, 150.0)));
        scene.buffer_set_dest_size(node, 400, 400);
        drain(&mut scene);

        let buffer_damage = Region::from_box(Box2::new(0, 0, 200, 200));
        scene.buffer_set_buffer_with_damage(
            node,
            Some(TestBuffer::new(200, 200)),
            Some(&buffer_damage),
        );

        // Cropped to the 100x100 source box at (50, 50), scaled by
        // dst/src * output scale = 8 per axis.
        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(400, 400, 800, 800)));
        assert_eq!(damage.area(), 800 * 800);
    }

    #[test]
    fn partial_damage_with_unchanged_buffer_still_emits() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));
        let source = TestBuffer::new(100, 100);
        let node = scene.create_buffer(root, Some(source.clone()));
        drain(&mut scene);

        let buffer_damage = Region::from_box(Box2::new(10, 20, 30, 40));
        scene.buffer_set_buffer_with_damage(node, Some(source), Some(&buffer_damage));

        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(10, 20, 30, 40)));
        assert_eq!(damage.area(), 30 * 40);
    }

    #[test]
    fn partial_damage_respects_buffer_transform() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));
        let node = scene.create_buffer(root, Some(TestBuffer::new(100, 50)));
        scene.buffer_set_transform(node, Transform::Rotate90);
        drain(&mut scene);

        // A 10x10 patch at the buffer's top-left lands at (40, 0) in the
        // rotated 50x100 source space, then stretches by the per-axis
        // buffer-over-source factors (100/50, 50/100).
        let buffer_damage = Region::from_box(Box2::new(0, 0, 10, 10));
        let source = scene.buffer_buffer(node).unwrap().clone();
        scene.buffer_set_buffer_with_damage(node, Some(source), Some(&buffer_damage));

        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(80, 0, 20, 5)));
        assert_eq!(damage.area(), 100);
    }

    #[test]
    fn whole_damage_without_outputs_is_a_noop() {
        let mut scene = scene();
        let root = scene.root();
        // Just exercising the early return.
        let rect = scene.create_rect(root, 10, 10, [0.0; 4]);
        scene.set_position(rect, 5, 5);
        assert_eq!(scene.output_ids().count(), 0);
    }

    #[test]
    fn tree_damage_recurses_into_children() {
        let mut scene = scene();
        let root = scene.root();
        let output = scene.output_create(Box::new(TestOutput::new(800, 600)));
        let tree = scene.create_tree(root);
        let a = scene.create_rect(tree, 10, 10, [0.0; 4]);
        let b = scene.create_rect(tree, 10, 10, [0.0; 4]);
        scene.set_position(a, 100, 100);
        scene.set_position(b, 300, 300);
        drain(&mut scene);

        // Toggling the subtree damages both children's footprints.
        scene.set_enabled(tree, false);
        let damage = scene.output_damage(output);
        assert!(damage.covers_box(Box2::new(100, 100, 10, 10)));
        assert!(damage.covers_box(Box2::new(300, 300, 10, 10)));
    }
}
