// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Output registry and output membership.
//!
//! Each display registered with a scene gets a [`SceneOutput`] record: a
//! position in scene coordinates, a damage accumulator, and a bit index in
//! `[0, 64)`. Index allocation fills gaps left by destroyed outputs, so the
//! registry list stays sorted by index and the smallest free index is always
//! picked.
//!
//! The membership tracker keeps every buffer node's `active_outputs` mask
//! and `primary_output` in sync with geometry. It runs after any change that
//! can move a buffer relative to an output: node position/size/transform
//! changes, buffer replacement, output creation/destruction/movement, and
//! mode changes reported via [`Scene::output_layout_changed`]. Mask and
//! primary are written before enter/leave fire, so handlers always observe
//! the post-transition state.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::backend::OutputDevice;
use crate::damage::OutputDamage;
use crate::geometry::Box2;
use crate::region::Region;
use crate::scene::id::{INVALID, NodeId, OutputId};
use crate::scene::node::{NodeKind, OutputEnterSignal, OutputLeaveSignal};
use crate::scene::Scene;
use crate::signal::{self, HandlerId, Signal, SignalRef};

/// Scene-side record for one registered display.
pub(crate) struct SceneOutput {
    pub(crate) id: OutputId,
    /// Position of the display's top-left corner in scene coordinates.
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) device: Box<dyn OutputDevice>,
    pub(crate) damage: OutputDamage,
    /// Whether the previous frame was presented by direct scanout.
    pub(crate) prev_scanout: bool,
    pub(crate) destroy: Signal<OutputId>,
}

impl SceneOutput {
    /// Physical resolution with the transform applied (width/height swapped
    /// for the 90° family).
    pub(crate) fn transformed_resolution(&self) -> (i32, i32) {
        let (w, h) = self.device.physical_size();
        if self.device.transform().swaps_dimensions() {
            (h, w)
        } else {
            (w, h)
        }
    }

    /// Resolution in scene units: transformed resolution divided by scale.
    pub(crate) fn effective_resolution(&self) -> (i32, i32) {
        let (w, h) = self.transformed_resolution();
        let scale = self.device.scale();
        ((w as f32 / scale) as i32, (h as f32 / scale) as i32)
    }

    /// The output's viewport in scene coordinates.
    pub(crate) fn viewport(&self) -> Box2 {
        let (w, h) = self.effective_resolution();
        Box2::new(self.x, self.y, w, h)
    }
}

#[derive(Clone, Copy)]
struct OutputDestroySignal(OutputId);

impl SignalRef<OutputId> for OutputDestroySignal {
    fn resolve(self, scene: &mut Scene) -> Option<&mut Signal<OutputId>> {
        scene
            .outputs
            .iter_mut()
            .find(|o| o.id == self.0)
            .map(|o| &mut o.destroy)
    }
}

impl Scene {
    /// Registers a display with the scene.
    ///
    /// The returned id is the output's bit index in buffer membership
    /// masks; the smallest index not in use is picked, reusing indices of
    /// destroyed outputs. The whole output is damaged and membership is
    /// recomputed for the entire tree so existing buffers discover it.
    ///
    /// # Panics
    ///
    /// Panics if 64 outputs are already registered.
    pub fn output_create(&mut self, device: Box<dyn OutputDevice>) -> OutputId {
        let mut prev_index: i32 = -1;
        let mut pos = 0;
        for (i, output) in self.outputs.iter().enumerate() {
            if i32::from(output.id.index()) != prev_index + 1 {
                break;
            }
            prev_index = i32::from(output.id.index());
            pos = i + 1;
        }
        let index = prev_index + 1;
        assert!(index < 64, "a scene supports at most 64 outputs");
        let id = OutputId(index as u8);

        let mut output = SceneOutput {
            id,
            x: 0,
            y: 0,
            device,
            damage: OutputDamage::default(),
            prev_scanout: false,
            destroy: Signal::default(),
        };
        output.damage.set_bounds(output.transformed_resolution());
        output.damage.add_whole();
        self.outputs.insert(pos, output);

        let root = self.root;
        self.update_outputs_subtree(root, None);
        id
    }

    /// Unregisters a display.
    ///
    /// Fires the output's destroy signal, then recomputes membership with
    /// this output excluded so affected buffers receive `output_leave` and
    /// clear their mask bit. The index becomes available for reuse.
    ///
    /// # Panics
    ///
    /// Panics if the output is not registered.
    pub fn output_destroy(&mut self, output: OutputId) {
        assert!(
            self.output_pos(output).is_some(),
            "output {output:?} is not registered"
        );
        signal::emit(self, OutputDestroySignal(output), output);

        if self.output_pos(output).is_none() {
            return;
        }
        let root = self.root;
        self.update_outputs_subtree(root, Some(output));
        if let Some(pos) = self.output_pos(output) {
            self.outputs.remove(pos);
        }
    }

    /// Moves the display within the scene.
    pub fn output_set_position(&mut self, output: OutputId, lx: i32, ly: i32) {
        let pos = self.expect_output(output);
        let record = &mut self.outputs[pos];
        if record.x == lx && record.y == ly {
            return;
        }
        record.x = lx;
        record.y = ly;
        record.damage.add_whole();
        let root = self.root;
        self.update_outputs_subtree(root, None);
    }

    /// Notifies the scene that the display's mode, scale, or transform
    /// changed.
    ///
    /// Damages the whole output and recomputes membership for the entire
    /// tree. The embedder calls this from its display event handlers.
    pub fn output_layout_changed(&mut self, output: OutputId) {
        let pos = self.expect_output(output);
        let bounds = self.outputs[pos].transformed_resolution();
        let record = &mut self.outputs[pos];
        record.damage.set_bounds(bounds);
        record.damage.add_whole();
        let root = self.root;
        self.update_outputs_subtree(root, None);
    }

    /// Adds damage to the output, in scaled output-local coordinates.
    pub fn output_damage_add(&mut self, output: OutputId, region: &Region) {
        let pos = self.expect_output(output);
        self.outputs[pos].damage.add(region);
    }

    /// Damages the whole output.
    pub fn output_damage_whole(&mut self, output: OutputId) {
        let pos = self.expect_output(output);
        self.outputs[pos].damage.add_whole();
    }

    /// The damage accumulated on the output since its last frame.
    #[must_use]
    pub fn output_damage(&self, output: OutputId) -> &Region {
        let pos = self
            .output_pos(output)
            .unwrap_or_else(|| panic!("output {output:?} is not registered"));
        self.outputs[pos].damage.current()
    }

    /// The output's position in scene coordinates.
    #[must_use]
    pub fn output_position(&self, output: OutputId) -> (i32, i32) {
        let pos = self
            .output_pos(output)
            .unwrap_or_else(|| panic!("output {output:?} is not registered"));
        (self.outputs[pos].x, self.outputs[pos].y)
    }

    /// The registered outputs, in index order.
    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        self.outputs.iter().map(|o| o.id)
    }

    /// Registers a handler fired when the output is destroyed.
    pub fn output_on_destroy(
        &mut self,
        output: OutputId,
        handler: impl FnMut(&mut Scene, OutputId) + 'static,
    ) -> HandlerId {
        let pos = self.expect_output(output);
        let id = self.alloc_handler_id();
        self.outputs[pos].destroy.add(id, Box::new(handler));
        id
    }

    /// Unregisters an output destroy handler. Safe to call from within the
    /// destroy dispatch itself.
    pub fn output_remove_handler(&mut self, output: OutputId, id: HandlerId) {
        if let Some(pos) = self.output_pos(output) {
            if self.outputs[pos].destroy.remove(id) {
                return;
            }
        }
        if self.dispatch_depth > 0 {
            self.handler_tombstones.push(id);
        }
    }

    pub(crate) fn output_pos(&self, output: OutputId) -> Option<usize> {
        self.outputs.iter().position(|o| o.id == output)
    }

    pub(crate) fn expect_output(&self, output: OutputId) -> usize {
        self.output_pos(output)
            .unwrap_or_else(|| panic!("output {output:?} is not registered"))
    }

    // -- Membership tracking --

    /// Recomputes output membership for every buffer in the subtree rooted
    /// at `node`, optionally treating one output as already gone.
    pub(crate) fn update_outputs_subtree(&mut self, node: NodeId, ignore: Option<OutputId>) {
        if !self.nodes.is_alive(node) {
            return;
        }
        let (lx, ly, _) = self.node_coords(node);
        self.update_outputs_at(node.idx, lx, ly, ignore);
    }

    fn update_outputs_at(&mut self, idx: u32, lx: i32, ly: i32, ignore: Option<OutputId>) {
        match self.nodes.content[idx as usize].kind() {
            NodeKind::Buffer => self.buffer_update_outputs(idx, lx, ly, ignore),
            NodeKind::Tree => {
                // Enter/leave handlers may mutate the tree; walk a snapshot
                // and skip children that did not survive.
                let mut children = Vec::new();
                let mut child = self.nodes.first_child[idx as usize];
                while child != INVALID {
                    let c = child as usize;
                    children.push((
                        self.nodes.id_at(child),
                        lx + self.nodes.x[c],
                        ly + self.nodes.y[c],
                    ));
                    child = self.nodes.next_sibling[c];
                }
                for (child, cx, cy) in children {
                    if self.nodes.is_alive(child) {
                        self.update_outputs_at(child.idx, cx, cy, ignore);
                    }
                }
            }
            NodeKind::Rect => {}
        }
    }

    fn buffer_update_outputs(&mut self, idx: u32, lx: i32, ly: i32, ignore: Option<OutputId>) {
        let (width, height) = self.nodes.size_at(idx);
        let buffer_box = Box2::new(lx, ly, width, height);

        let mut largest_overlap: i64 = 0;
        let mut primary = None;
        let mut active: u64 = 0;
        for output in &self.outputs {
            if Some(output.id) == ignore {
                continue;
            }
            if let Some(intersection) = buffer_box.intersection(output.viewport()) {
                let overlap = intersection.area();
                if overlap > largest_overlap {
                    largest_overlap = overlap;
                    primary = Some(output.id);
                }
                active |= output.id.mask();
            }
        }

        let node = self.nodes.id_at(idx);
        let state = self.nodes.buffer_state_mut(idx);
        let old_active = state.active_outputs;
        // Mask and primary are committed before any signal so enter/leave
        // handlers observe the post-transition state.
        state.active_outputs = active;
        state.primary_output = primary;

        // The destroyed output (if any) is still in the list here, so its
        // 1 -> 0 transition fires a leave like any other.
        let outputs: Vec<OutputId> = self.outputs.iter().map(|o| o.id).collect();
        for output in outputs {
            let mask = output.mask();
            let intersects = active & mask != 0;
            let intersected = old_active & mask != 0;
            if intersects && !intersected {
                signal::emit(self, OutputEnterSignal(node), (node, output));
            } else if !intersects && intersected {
                signal::emit(self, OutputLeaveSignal(node), (node, output));
            }
            if !self.nodes.is_alive(node) {
                return;
            }
        }
    }
}
