// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-output commit pipeline.
//!
//! [`Scene::output_commit`] produces one frame for one output:
//!
//! 1. Attempt **direct scanout**: if exactly one enabled node intersects the
//!    viewport, covers it exactly, and is an uncropped buffer whose
//!    transform matches the display, its buffer is handed to the display
//!    controller and no rendering happens.
//! 2. Otherwise **composite**: attach the back buffer, expand the pending
//!    damage by its age, clear and redraw only the damaged rectangles
//!    (scissored per rectangle), hand the display a frame-damage hint in
//!    physical coordinates, and commit.
//!
//! Transitions between the two paths damage the whole output, since the
//! composition buffers missed every frame the scanout path presented.
//!
//! The debug-damage modes hook in between: `Rerender` forces full-output
//! damage every frame; `Highlight` disables scanout and overlays each
//! damage region in red, fading out over 250 ms and masking older regions
//! with newer ones.

use alloc::vec::Vec;
use core::time::Duration;

use crate::backend::RenderBackend;
use crate::geometry::{Box2, Mat3};
use crate::region::Region;
use crate::scene::id::{INVALID, NodeId, OutputId};
use crate::scene::node::{Content, OutputPresentSignal};
use crate::scene::{DebugDamage, HighlightRegion, Scene};
use crate::signal;
use crate::time::Timestamp;
use crate::transform::Transform;

/// How long a damage highlight takes to fade out.
const HIGHLIGHT_DAMAGE_FADEOUT: Duration = Duration::from_millis(250);

impl Scene {
    /// Renders and commits one frame on `output`.
    ///
    /// `now` is the caller's monotonic clock reading; it drives the
    /// debug-highlight fade. Returns whether the display commit succeeded
    /// (trivially true when no frame was needed).
    ///
    /// # Panics
    ///
    /// Panics if the output is not registered.
    pub fn output_commit(
        &mut self,
        output: OutputId,
        renderer: &mut dyn RenderBackend,
        now: Timestamp,
    ) -> bool {
        self.expect_output(output);
        let debug_damage = self.debug_damage;

        // Textures retired by buffer updates since the last frame.
        while let Some(texture) = self.retired_textures.pop() {
            renderer.texture_destroy(texture);
        }

        let scanout = self.try_scanout(output);
        let Some(pos) = self.output_pos(output) else {
            return false;
        };
        let record = &mut self.outputs[pos];
        if scanout != record.prev_scanout {
            log::debug!(
                "direct scan-out {}",
                if scanout { "enabled" } else { "disabled" }
            );
            // The composition buffers missed every scanned-out frame.
            record.damage.add_whole();
        }
        record.prev_scanout = scanout;
        if scanout {
            return true;
        }

        if debug_damage == DebugDamage::Rerender {
            self.outputs[pos].damage.add_whole();
        }
        if debug_damage == DebugDamage::Highlight {
            let current = self.outputs[pos].damage.current().clone();
            if !current.is_empty() {
                self.highlights.insert(
                    0,
                    HighlightRegion {
                        region: current,
                        when: now,
                    },
                );
            }

            // Newer regions mask older ones; emptied or expired regions die.
            let mut accumulated = Region::new();
            let mut i = 0;
            while i < self.highlights.len() {
                let highlight = &mut self.highlights[i];
                highlight.region.subtract(&accumulated);
                accumulated.union(&highlight.region);
                if now.duration_since(highlight.when) >= HIGHLIGHT_DAMAGE_FADEOUT
                    || highlight.region.is_empty()
                {
                    self.highlights.remove(i);
                } else {
                    i += 1;
                }
            }
            self.outputs[pos].damage.add(&accumulated);
        }

        let Some(age) = self.outputs[pos].device.attach_render() else {
            return false;
        };
        let (needs_frame, damage) = {
            let record = &self.outputs[pos];
            let (needs, damage) = record.damage.render_damage(Some(age));
            (needs || record.device.needs_frame(), damage)
        };
        if !needs_frame {
            self.outputs[pos].device.rollback();
            return true;
        }

        let record = &self.outputs[pos];
        let (physical_width, physical_height) = record.device.physical_size();
        let output_transform = record.device.transform();
        let (tr_width, tr_height) = record.transformed_resolution();
        let scale = record.device.scale();
        let (ox, oy) = (record.x, record.y);
        let projection = Mat3::projection(physical_width, physical_height, output_transform);

        renderer.begin(physical_width, physical_height);
        for &rect in damage.rects() {
            renderer.scissor(Some(scissor_rect(rect, output_transform, tr_width, tr_height)));
            renderer.clear([0.0, 0.0, 0.0, 1.0]);
        }

        // Present handlers may mutate the scene; paint from a snapshot and
        // skip nodes that do not survive.
        let mut render_list = Vec::new();
        self.collect_nodes(self.root.idx, -ox, -oy, &mut render_list);
        for (node, x, y) in render_list {
            if !self.nodes.is_alive(node) {
                continue;
            }
            self.render_node(
                node,
                x,
                y,
                &damage,
                scale,
                output_transform,
                (tr_width, tr_height),
                &projection,
                output,
                renderer,
            );
        }
        renderer.scissor(None);

        if debug_damage == DebugDamage::Highlight {
            for highlight in &self.highlights {
                let age = now.duration_since(highlight.when);
                let alpha = 1.0
                    - age.as_millis() as f32 / HIGHLIGHT_DAMAGE_FADEOUT.as_millis() as f32;
                for &rect in highlight.region.rects() {
                    renderer.render_rect(rect, [alpha * 0.5, 0.0, 0.0, alpha * 0.5], &projection);
                }
            }
        }

        let Some(pos) = self.output_pos(output) else {
            renderer.end();
            return false;
        };
        self.outputs[pos].device.render_software_cursors(&damage);
        renderer.end();

        let frame_damage = self.outputs[pos]
            .damage
            .current()
            .transformed(output_transform.invert(), tr_width, tr_height);
        self.outputs[pos].device.set_frame_damage(&frame_damage);
        let success = self.outputs[pos].device.commit();
        if success {
            self.outputs[pos].damage.rotate();
        }

        if debug_damage == DebugDamage::Highlight && !self.highlights.is_empty() {
            self.outputs[pos].device.schedule_frame();
        }

        success
    }

    /// Attempts to present the frame by handing a single buffer to the
    /// display controller.
    fn try_scanout(&mut self, output: OutputId) -> bool {
        // Scanout would make the highlight overlays invisible.
        if self.debug_damage == DebugDamage::Highlight {
            return false;
        }

        let pos = self.expect_output(output);
        let viewport = self.outputs[pos].viewport();

        let mut nodes = Vec::new();
        self.collect_nodes(self.root.idx, 0, 0, &mut nodes);
        let mut intersecting = 0;
        let mut candidate = None;
        for (node, x, y) in nodes {
            let (width, height) = self.nodes.size_at(node.idx);
            let node_box = Box2::new(x, y, width, height);
            if !node_box.intersects(viewport) {
                continue;
            }
            intersecting += 1;
            if node_box == viewport {
                candidate = Some(node);
            }
        }
        if intersecting != 1 {
            return false;
        }
        let Some(node) = candidate else {
            return false;
        };

        let Content::Buffer(state) = &self.nodes.content[node.idx as usize] else {
            return false;
        };
        let Some(buffer) = state.buffer.clone() else {
            return false;
        };
        if state.src_box.is_some() || state.transform != self.outputs[pos].device.transform() {
            return false;
        }

        let record = &mut self.outputs[pos];
        record.device.attach_buffer(&buffer);
        if !record.device.test() {
            record.device.rollback();
            return false;
        }

        signal::emit(self, OutputPresentSignal(node), (node, output));

        let Some(pos) = self.output_pos(output) else {
            return false;
        };
        let success = self.outputs[pos].device.commit();
        if success {
            self.outputs[pos].damage.rotate();
        }
        success
    }

    /// Collects the enabled nodes under `idx` in paint order, with
    /// positions accumulated from `(lx, ly)`.
    pub(crate) fn collect_nodes(
        &self,
        idx: u32,
        lx: i32,
        ly: i32,
        out: &mut Vec<(NodeId, i32, i32)>,
    ) {
        let i = idx as usize;
        if !self.nodes.enabled[i] {
            return;
        }
        let lx = lx + self.nodes.x[i];
        let ly = ly + self.nodes.y[i];
        out.push((self.nodes.id_at(idx), lx, ly));
        if matches!(self.nodes.content[i], Content::Tree) {
            let mut child = self.nodes.first_child[i];
            while child != INVALID {
                self.collect_nodes(child, lx, ly, out);
                child = self.nodes.next_sibling[child as usize];
            }
        }
    }

    #[expect(clippy::too_many_arguments, reason = "per-frame constants travel together")]
    fn render_node(
        &mut self,
        node: NodeId,
        x: i32,
        y: i32,
        damage: &Region,
        scale: f32,
        output_transform: Transform,
        transformed_resolution: (i32, i32),
        projection: &Mat3,
        output: OutputId,
        renderer: &mut dyn RenderBackend,
    ) {
        let idx = node.idx;
        let (width, height) = self.nodes.size_at(idx);
        let dst_box = Box2::new(x, y, width, height).scale(scale);
        let (tr_width, tr_height) = transformed_resolution;

        match &self.nodes.content[idx as usize] {
            Content::Tree => {}
            Content::Rect { color, .. } => {
                let color = *color;
                let node_damage = damage.intersection(dst_box);
                for &rect in node_damage.rects() {
                    renderer.scissor(Some(scissor_rect(
                        rect,
                        output_transform,
                        tr_width,
                        tr_height,
                    )));
                    renderer.render_rect(dst_box, color, projection);
                }
            }
            Content::Buffer(state) => {
                let Some(buffer) = state.buffer.clone() else {
                    return;
                };
                let src_box = state.src_box;
                let node_transform = state.transform;
                let cached = state.texture;

                // Prefer a client-supplied texture, then the cache, then
                // upload and cache.
                let texture = if let Some(texture) = buffer.client_texture() {
                    texture
                } else if let Some(texture) = cached {
                    texture
                } else {
                    match renderer.texture_from_buffer(&buffer) {
                        Some(texture) => {
                            self.nodes.buffer_state_mut(idx).texture = Some(texture);
                            texture
                        }
                        None => return,
                    }
                };

                let matrix = Mat3::project_box(dst_box, node_transform.invert(), projection);
                let node_damage = damage.intersection(dst_box);
                for &rect in node_damage.rects() {
                    renderer.scissor(Some(scissor_rect(
                        rect,
                        output_transform,
                        tr_width,
                        tr_height,
                    )));
                    renderer.render_textured_quad(texture, src_box, &matrix, 1.0);
                }

                signal::emit(self, OutputPresentSignal(node), (node, output));
            }
        }
    }
}

/// Maps a damage rectangle into the scissor space the renderer expects
/// (physical orientation).
fn scissor_rect(rect: Box2, output_transform: Transform, tr_width: i32, tr_height: i32) -> Box2 {
    rect.transform(output_transform.invert(), tr_width, tr_height)
}
