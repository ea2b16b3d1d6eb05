// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node storage and node operations.
//!
//! Nodes live in struct-of-arrays slots addressed by [`NodeId`] handles.
//! Topology is intrusive index links (`parent`, `first_child`, `last_child`,
//! sibling links) with [`INVALID`] as the null sentinel; destroyed slots are
//! recycled through a free list and generation counters make stale handles
//! panic instead of aliasing a reused slot.
//!
//! Sibling order is paint order: the first child is the bottommost, the last
//! child the topmost. New nodes link in at the tail.
//!
//! Every geometric mutation emits whole-node damage at the old footprint
//! before mutating and at the new footprint after (one of the two is a no-op
//! when the change leaves the node disabled or off every output), and reruns
//! output membership where positions or sizes changed.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;

use hashbrown::HashMap;

use crate::backend::SourceBuffer;
use crate::region::Region;
use crate::scene::id::{INVALID, NodeId, OutputId, TextureId};
use crate::scene::Scene;
use crate::signal::{self, HandlerId, HandlerFn, Signal, SignalRef};
use crate::time::Timestamp;
use crate::transform::Transform;

/// The three node variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// An ordered container with no intrinsic size.
    Tree,
    /// A solid-color rectangle.
    Rect,
    /// A node presenting an external pixel source.
    Buffer,
}

/// Hit-test predicate for buffer nodes, overriding the bounding-box test.
pub type PointAcceptsInput = Box<dyn Fn(NodeId, f64, f64) -> bool>;

/// Variant payload of a node.
pub(crate) enum Content {
    Tree,
    Rect {
        width: i32,
        height: i32,
        color: [f32; 4],
    },
    Buffer(Box<BufferState>),
}

impl Content {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Self::Tree => NodeKind::Tree,
            Self::Rect { .. } => NodeKind::Rect,
            Self::Buffer(_) => NodeKind::Buffer,
        }
    }
}

/// State of a buffer node.
pub(crate) struct BufferState {
    pub(crate) buffer: Option<Rc<dyn SourceBuffer>>,
    /// Sub-rectangle of the (transformed) buffer to sample; `None` samples
    /// the whole buffer.
    pub(crate) src_box: Option<kurbo::Rect>,
    pub(crate) dst_width: i32,
    pub(crate) dst_height: i32,
    pub(crate) transform: Transform,
    /// Lazily uploaded texture; valid only while `buffer` is unchanged.
    pub(crate) texture: Option<TextureId>,
    pub(crate) active_outputs: u64,
    pub(crate) primary_output: Option<OutputId>,
    pub(crate) point_accepts_input: Option<PointAcceptsInput>,
}

impl BufferState {
    fn new(buffer: Option<Rc<dyn SourceBuffer>>) -> Self {
        Self {
            buffer,
            src_box: None,
            dst_width: 0,
            dst_height: 0,
            transform: Transform::Normal,
            texture: None,
            active_outputs: 0,
            primary_output: None,
            point_accepts_input: None,
        }
    }
}

/// Signals attached to one node.
#[derive(Default)]
pub(crate) struct NodeSignals {
    pub(crate) destroy: Signal<NodeId>,
    pub(crate) output_enter: Signal<(NodeId, OutputId)>,
    pub(crate) output_leave: Signal<(NodeId, OutputId)>,
    pub(crate) output_present: Signal<(NodeId, OutputId)>,
    pub(crate) frame_done: Signal<(NodeId, Timestamp)>,
}

type AddonMap = HashMap<u64, Box<dyn Any>>;

/// Struct-of-arrays storage for all nodes of a scene.
pub(crate) struct Nodes {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) last_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Common node state --
    pub(crate) x: Vec<i32>,
    pub(crate) y: Vec<i32>,
    pub(crate) enabled: Vec<bool>,
    pub(crate) content: Vec<Content>,
    pub(crate) signals: Vec<NodeSignals>,
    pub(crate) addons: Vec<AddonMap>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    free_list: Vec<u32>,
    len: u32,
}

impl Nodes {
    pub(crate) fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            last_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            enabled: Vec::new(),
            content: Vec::new(),
            signals: Vec::new(),
            addons: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Allocates a node and links it as the topmost child of `parent`
    /// (`INVALID` for the scene root).
    pub(crate) fn alloc(&mut self, content: Content, parent: u32) -> NodeId {
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.generation[i] += 1;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.last_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.x[i] = 0;
            self.y[i] = 0;
            self.enabled[i] = true;
            self.content[i] = content;
            self.signals[i] = NodeSignals::default();
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.last_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.x.push(0);
            self.y.push(0);
            self.enabled.push(true);
            self.content.push(content);
            self.signals.push(NodeSignals::default());
            self.addons.push(AddonMap::new());
            self.generation.push(0);
            idx
        };

        if parent != INVALID {
            self.link_tail(parent, idx);
        }

        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Frees a slot for reuse. The caller has already unlinked it and
    /// destroyed its children.
    pub(crate) fn free(&mut self, idx: u32) {
        let i = idx as usize;
        self.generation[i] += 1;
        self.content[i] = Content::Tree;
        self.signals[i] = NodeSignals::default();
        self.addons[i].clear();
        self.free_list.push(idx);
    }

    /// Returns whether the given handle refers to a live node.
    pub(crate) fn is_alive(&self, id: NodeId) -> bool {
        id.idx < self.len && self.generation[id.idx as usize] == id.generation
    }

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: NodeId) {
        assert!(
            self.is_alive(id),
            "stale NodeId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    /// Rebuilds a handle for a live slot index.
    pub(crate) fn id_at(&self, idx: u32) -> NodeId {
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    pub(crate) fn buffer_state(&self, idx: u32) -> &BufferState {
        match &self.content[idx as usize] {
            Content::Buffer(state) => state,
            _ => panic!("node is not a buffer"),
        }
    }

    pub(crate) fn buffer_state_mut(&mut self, idx: u32) -> &mut BufferState {
        match &mut self.content[idx as usize] {
            Content::Buffer(state) => state,
            _ => panic!("node is not a buffer"),
        }
    }

    /// The node's size: zero for trees, width × height for rects, and the
    /// destination size (or transformed buffer size) for buffers.
    pub(crate) fn size_at(&self, idx: u32) -> (i32, i32) {
        match &self.content[idx as usize] {
            Content::Tree => (0, 0),
            Content::Rect { width, height, .. } => (*width, *height),
            Content::Buffer(state) => {
                if state.dst_width > 0 && state.dst_height > 0 {
                    (state.dst_width, state.dst_height)
                } else if let Some(buffer) = &state.buffer {
                    if state.transform.swaps_dimensions() {
                        (buffer.height(), buffer.width())
                    } else {
                        (buffer.width(), buffer.height())
                    }
                } else {
                    (0, 0)
                }
            }
        }
    }

    // -- Link management --

    pub(crate) fn link_tail(&mut self, parent: u32, child: u32) {
        let p = parent as usize;
        let c = child as usize;
        self.parent[c] = parent;
        self.next_sibling[c] = INVALID;
        self.prev_sibling[c] = self.last_child[p];
        if self.last_child[p] != INVALID {
            self.next_sibling[self.last_child[p] as usize] = child;
        } else {
            self.first_child[p] = child;
        }
        self.last_child[p] = child;
    }

    /// Links `child` directly above `sibling` (same parent, already unlinked).
    fn link_after(&mut self, sibling: u32, child: u32) {
        let s = sibling as usize;
        let c = child as usize;
        let parent = self.parent[s];
        self.parent[c] = parent;
        self.prev_sibling[c] = sibling;
        self.next_sibling[c] = self.next_sibling[s];
        if self.next_sibling[s] != INVALID {
            self.prev_sibling[self.next_sibling[s] as usize] = child;
        } else {
            self.last_child[parent as usize] = child;
        }
        self.next_sibling[s] = child;
    }

    /// Links `child` directly below `sibling` (same parent, already unlinked).
    fn link_before(&mut self, sibling: u32, child: u32) {
        let s = sibling as usize;
        let c = child as usize;
        let parent = self.parent[s];
        self.parent[c] = parent;
        self.next_sibling[c] = sibling;
        self.prev_sibling[c] = self.prev_sibling[s];
        if self.prev_sibling[s] != INVALID {
            self.next_sibling[self.prev_sibling[s] as usize] = child;
        } else {
            self.first_child[parent as usize] = child;
        }
        self.prev_sibling[s] = child;
    }

    /// Removes `idx` from its parent's child list.
    pub(crate) fn unlink(&mut self, idx: u32) {
        let i = idx as usize;
        let p = self.parent[i];
        if p == INVALID {
            return;
        }
        let prev = self.prev_sibling[i];
        let next = self.next_sibling[i];
        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        } else {
            self.last_child[p as usize] = prev;
        }
        self.parent[i] = INVALID;
        self.prev_sibling[i] = INVALID;
        self.next_sibling[i] = INVALID;
    }
}

fn same_buffer(a: &Option<Rc<dyn SourceBuffer>>, b: &Option<Rc<dyn SourceBuffer>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

// -- Signal selectors --

macro_rules! node_signal_ref {
    ($name:ident, $field:ident, $arg:ty) => {
        #[derive(Clone, Copy)]
        pub(crate) struct $name(pub(crate) NodeId);

        impl SignalRef<$arg> for $name {
            fn resolve(self, scene: &mut Scene) -> Option<&mut Signal<$arg>> {
                if !scene.nodes.is_alive(self.0) {
                    return None;
                }
                Some(&mut scene.nodes.signals[self.0.idx as usize].$field)
            }
        }
    };
}

node_signal_ref!(DestroySignal, destroy, NodeId);
node_signal_ref!(OutputEnterSignal, output_enter, (NodeId, OutputId));
node_signal_ref!(OutputLeaveSignal, output_leave, (NodeId, OutputId));
node_signal_ref!(OutputPresentSignal, output_present, (NodeId, OutputId));
node_signal_ref!(FrameDoneSignal, frame_done, (NodeId, Timestamp));

impl Scene {
    // -- Creation --

    /// Creates a tree node as the topmost child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale or not a tree.
    pub fn create_tree(&mut self, parent: NodeId) -> NodeId {
        self.assert_tree(parent);
        self.nodes.alloc(Content::Tree, parent.idx)
    }

    /// Creates a solid-color rectangle as the topmost child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale or not a tree.
    pub fn create_rect(&mut self, parent: NodeId, width: i32, height: i32, color: [f32; 4]) -> NodeId {
        self.assert_tree(parent);
        let id = self.nodes.alloc(
            Content::Rect {
                width,
                height,
                color,
            },
            parent.idx,
        );
        self.damage_whole(id);
        id
    }

    /// Creates a buffer node as the topmost child of `parent`.
    ///
    /// The passed `Rc` clone is the node's lock on the pixel source; it is
    /// released on replacement or node destruction.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale or not a tree.
    pub fn create_buffer(
        &mut self,
        parent: NodeId,
        buffer: Option<Rc<dyn SourceBuffer>>,
    ) -> NodeId {
        self.assert_tree(parent);
        let id = self
            .nodes
            .alloc(Content::Buffer(Box::new(BufferState::new(buffer))), parent.idx);
        self.damage_whole(id);
        self.update_outputs_subtree(id, None);
        id
    }

    fn assert_tree(&self, node: NodeId) {
        self.nodes.validate(node);
        assert!(
            matches!(self.nodes.content[node.idx as usize], Content::Tree),
            "parent must be a tree node"
        );
    }

    // -- Destruction --

    /// Destroys a node and its whole subtree.
    ///
    /// The node's destroy signal fires before children are destroyed, so
    /// observers may detach children they want to keep. Destroying the scene
    /// root additionally destroys all outputs, clears damage-highlight
    /// state, and drops the presentation reference.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn node_destroy(&mut self, node: NodeId) {
        self.nodes.validate(node);
        let idx = node.idx;

        self.damage_whole(node);

        // Destroy listeners run before anything else so they can remove
        // children before the recursive teardown reaches them.
        signal::emit(self, DestroySignal(node), node);
        if !self.nodes.is_alive(node) {
            return;
        }

        match self.nodes.content[idx as usize].kind() {
            NodeKind::Buffer => {
                let active = self.nodes.buffer_state(idx).active_outputs;
                if active != 0 {
                    let outputs: Vec<OutputId> = self.outputs.iter().map(|o| o.id).collect();
                    for output in outputs {
                        if active & output.mask() != 0 {
                            signal::emit(self, OutputLeaveSignal(node), (node, output));
                        }
                    }
                }
                if !self.nodes.is_alive(node) {
                    return;
                }
                let state = self.nodes.buffer_state_mut(idx);
                if let Some(texture) = state.texture.take() {
                    self.retired_textures.push(texture);
                }
                self.nodes.buffer_state_mut(idx).buffer = None;
            }
            NodeKind::Tree => {
                if node == self.root {
                    while let Some(output) = self.outputs.first().map(|o| o.id) {
                        self.output_destroy(output);
                    }
                    self.highlights.clear();
                    self.presentation = None;
                }
                loop {
                    let child = self.nodes.first_child[idx as usize];
                    if child == INVALID {
                        break;
                    }
                    let child_id = self.nodes.id_at(child);
                    self.node_destroy(child_id);
                }
            }
            NodeKind::Rect => {}
        }

        self.nodes.unlink(idx);
        self.nodes.free(idx);
    }

    // -- Common node operations --

    /// Returns the node's variant.
    #[must_use]
    pub fn node_kind(&self, node: NodeId) -> NodeKind {
        self.nodes.validate(node);
        self.nodes.content[node.idx as usize].kind()
    }

    /// Returns whether the handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.is_alive(node)
    }

    /// Returns the parent tree node, `None` for the scene root.
    #[must_use]
    pub fn node_parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.validate(node);
        let p = self.nodes.parent[node.idx as usize];
        if p == INVALID {
            None
        } else {
            Some(self.nodes.id_at(p))
        }
    }

    /// Returns the node's position relative to its parent.
    #[must_use]
    pub fn node_position(&self, node: NodeId) -> (i32, i32) {
        self.nodes.validate(node);
        (
            self.nodes.x[node.idx as usize],
            self.nodes.y[node.idx as usize],
        )
    }

    /// Returns the node's enabled flag (not the ancestor chain).
    #[must_use]
    pub fn node_enabled(&self, node: NodeId) -> bool {
        self.nodes.validate(node);
        self.nodes.enabled[node.idx as usize]
    }

    /// Returns the node's position in scene coordinates and whether its
    /// whole ancestor chain is enabled.
    #[must_use]
    pub fn node_coords(&self, node: NodeId) -> (i32, i32, bool) {
        self.nodes.validate(node);
        let mut idx = node.idx;
        let mut lx = 0;
        let mut ly = 0;
        let mut enabled = true;
        loop {
            let i = idx as usize;
            lx += self.nodes.x[i];
            ly += self.nodes.y[i];
            enabled = enabled && self.nodes.enabled[i];
            if self.nodes.parent[i] == INVALID {
                break;
            }
            idx = self.nodes.parent[i];
        }
        (lx, ly, enabled)
    }

    /// Returns the node's size (zero for trees and empty buffers).
    #[must_use]
    pub fn node_size(&self, node: NodeId) -> (i32, i32) {
        self.nodes.validate(node);
        self.nodes.size_at(node.idx)
    }

    /// Enables or disables the node and its subtree.
    pub fn set_enabled(&mut self, node: NodeId, enabled: bool) {
        self.nodes.validate(node);
        if self.nodes.enabled[node.idx as usize] == enabled {
            return;
        }
        // One of the two emissions is a no-op: damage is suppressed while
        // the chain is disabled.
        self.damage_whole(node);
        self.nodes.enabled[node.idx as usize] = enabled;
        self.damage_whole(node);
    }

    /// Moves the node relative to its parent.
    pub fn set_position(&mut self, node: NodeId, x: i32, y: i32) {
        self.nodes.validate(node);
        let i = node.idx as usize;
        if self.nodes.x[i] == x && self.nodes.y[i] == y {
            return;
        }
        self.damage_whole(node);
        self.nodes.x[i] = x;
        self.nodes.y[i] = y;
        self.damage_whole(node);
        self.update_outputs_subtree(node, None);
    }

    /// Moves `node` directly above `sibling` in paint order.
    ///
    /// # Panics
    ///
    /// Panics if the handles are stale, equal, or have different parents.
    pub fn place_above(&mut self, node: NodeId, sibling: NodeId) {
        self.nodes.validate(node);
        self.nodes.validate(sibling);
        assert!(node != sibling, "cannot place a node relative to itself");
        assert!(
            self.nodes.parent[node.idx as usize] == self.nodes.parent[sibling.idx as usize]
                && self.nodes.parent[node.idx as usize] != INVALID,
            "nodes must share a parent"
        );
        if self.nodes.prev_sibling[node.idx as usize] == sibling.idx {
            return;
        }
        self.nodes.relink_above(node.idx, sibling.idx);
        self.damage_whole(node);
        self.damage_whole(sibling);
    }

    /// Moves `node` directly below `sibling` in paint order.
    ///
    /// # Panics
    ///
    /// Panics if the handles are stale, equal, or have different parents.
    pub fn place_below(&mut self, node: NodeId, sibling: NodeId) {
        self.nodes.validate(node);
        self.nodes.validate(sibling);
        assert!(node != sibling, "cannot place a node relative to itself");
        assert!(
            self.nodes.parent[node.idx as usize] == self.nodes.parent[sibling.idx as usize]
                && self.nodes.parent[node.idx as usize] != INVALID,
            "nodes must share a parent"
        );
        if self.nodes.next_sibling[node.idx as usize] == sibling.idx {
            return;
        }
        self.nodes.relink_below(node.idx, sibling.idx);
        self.damage_whole(node);
        self.damage_whole(sibling);
    }

    /// Makes the node the topmost child of its parent.
    pub fn raise_to_top(&mut self, node: NodeId) {
        self.nodes.validate(node);
        let parent = self.nodes.parent[node.idx as usize];
        assert!(parent != INVALID, "the scene root has no siblings");
        let top = self.nodes.last_child[parent as usize];
        if top == node.idx {
            return;
        }
        let top_id = self.nodes.id_at(top);
        self.place_above(node, top_id);
    }

    /// Makes the node the bottommost child of its parent.
    pub fn lower_to_bottom(&mut self, node: NodeId) {
        self.nodes.validate(node);
        let parent = self.nodes.parent[node.idx as usize];
        assert!(parent != INVALID, "the scene root has no siblings");
        let bottom = self.nodes.first_child[parent as usize];
        if bottom == node.idx {
            return;
        }
        let bottom_id = self.nodes.id_at(bottom);
        self.place_below(node, bottom_id);
    }

    /// Moves the node under a different parent, as its topmost child.
    ///
    /// # Panics
    ///
    /// Panics if the handles are stale, `new_parent` is not a tree, or the
    /// node would become its own ancestor.
    pub fn reparent(&mut self, node: NodeId, new_parent: NodeId) {
        self.nodes.validate(node);
        self.assert_tree(new_parent);
        if self.nodes.parent[node.idx as usize] == new_parent.idx {
            return;
        }

        let mut ancestor = new_parent.idx;
        while ancestor != INVALID {
            assert!(ancestor != node.idx, "node cannot become its own ancestor");
            ancestor = self.nodes.parent[ancestor as usize];
        }

        self.damage_whole(node);
        self.nodes.unlink(node.idx);
        self.nodes.link_tail(new_parent.idx, node.idx);
        self.damage_whole(node);
        self.update_outputs_subtree(node, None);
    }

    // -- Rect operations --

    /// Resizes a rectangle node.
    pub fn rect_set_size(&mut self, node: NodeId, width: i32, height: i32) {
        self.nodes.validate(node);
        let Content::Rect {
            width: w,
            height: h,
            ..
        } = &self.nodes.content[node.idx as usize]
        else {
            panic!("node is not a rect");
        };
        if *w == width && *h == height {
            return;
        }
        self.damage_whole(node);
        if let Content::Rect {
            width: w,
            height: h,
            ..
        } = &mut self.nodes.content[node.idx as usize]
        {
            *w = width;
            *h = height;
        }
        self.damage_whole(node);
    }

    /// Recolors a rectangle node.
    pub fn rect_set_color(&mut self, node: NodeId, color: [f32; 4]) {
        self.nodes.validate(node);
        let Content::Rect { color: current, .. } = &mut self.nodes.content[node.idx as usize]
        else {
            panic!("node is not a rect");
        };
        if *current == color {
            return;
        }
        *current = color;
        self.damage_whole(node);
    }

    /// Returns a rectangle node's color.
    #[must_use]
    pub fn rect_color(&self, node: NodeId) -> [f32; 4] {
        self.nodes.validate(node);
        match &self.nodes.content[node.idx as usize] {
            Content::Rect { color, .. } => *color,
            _ => panic!("node is not a rect"),
        }
    }

    // -- Buffer operations --

    /// Replaces the node's pixel source, damaging the whole node.
    pub fn buffer_set_buffer(&mut self, node: NodeId, buffer: Option<Rc<dyn SourceBuffer>>) {
        self.buffer_set_buffer_with_damage(node, buffer, None);
    }

    /// Replaces the node's pixel source, emitting only the given
    /// buffer-local damage instead of whole-node damage.
    ///
    /// `damage` is in buffer-local pixels, pre-transform. Damage may also be
    /// supplied with an unchanged buffer to report in-place pixel updates.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale, the node is not a buffer, or `damage`
    /// is given without a buffer.
    pub fn buffer_set_buffer_with_damage(
        &mut self,
        node: NodeId,
        buffer: Option<Rc<dyn SourceBuffer>>,
        damage: Option<&Region>,
    ) {
        self.nodes.validate(node);
        // Buffer-local damage cannot be scaled into scene coordinates
        // without knowing the buffer's dimensions.
        assert!(
            buffer.is_some() || damage.is_none(),
            "damage requires a buffer"
        );

        let state = self.nodes.buffer_state(node.idx);
        if !same_buffer(&state.buffer, &buffer) {
            if damage.is_none() {
                self.damage_whole(node);
            }
            let state = self.nodes.buffer_state_mut(node.idx);
            if let Some(texture) = state.texture.take() {
                self.retired_textures.push(texture);
            }
            self.nodes.buffer_state_mut(node.idx).buffer = buffer;
            self.update_outputs_subtree(node, None);
            if damage.is_none() {
                self.damage_whole(node);
            }
        }

        if let Some(region) = damage {
            self.buffer_damage_region(node, region);
        }
    }

    /// Sets the sub-rectangle of the buffer to sample; `None` (or an empty
    /// rectangle) samples the whole buffer.
    pub fn buffer_set_source_box(&mut self, node: NodeId, src_box: Option<kurbo::Rect>) {
        self.nodes.validate(node);
        let src_box = src_box.filter(|r| r.width() > 0.0 && r.height() > 0.0);
        let state = self.nodes.buffer_state_mut(node.idx);
        if state.src_box == src_box {
            return;
        }
        state.src_box = src_box;
        self.damage_whole(node);
    }

    /// Sets the size the buffer is drawn at, in scene coordinates; zero
    /// derives the size from the buffer and its transform.
    pub fn buffer_set_dest_size(&mut self, node: NodeId, width: i32, height: i32) {
        self.nodes.validate(node);
        let state = self.nodes.buffer_state(node.idx);
        if state.dst_width == width && state.dst_height == height {
            return;
        }
        self.damage_whole(node);
        let state = self.nodes.buffer_state_mut(node.idx);
        state.dst_width = width;
        state.dst_height = height;
        self.damage_whole(node);
        self.update_outputs_subtree(node, None);
    }

    /// Sets the transform applied to the buffer when drawing.
    pub fn buffer_set_transform(&mut self, node: NodeId, transform: Transform) {
        self.nodes.validate(node);
        if self.nodes.buffer_state(node.idx).transform == transform {
            return;
        }
        self.damage_whole(node);
        self.nodes.buffer_state_mut(node.idx).transform = transform;
        self.damage_whole(node);
        self.update_outputs_subtree(node, None);
    }

    /// Fires the node's frame-done signal.
    pub fn buffer_send_frame_done(&mut self, node: NodeId, now: Timestamp) {
        self.nodes.validate(node);
        signal::emit(self, FrameDoneSignal(node), (node, now));
    }

    /// Overrides hit testing for the node; `None` restores the
    /// bounding-box test.
    pub fn buffer_set_point_accepts_input(
        &mut self,
        node: NodeId,
        accepts: Option<PointAcceptsInput>,
    ) {
        self.nodes.validate(node);
        self.nodes.buffer_state_mut(node.idx).point_accepts_input = accepts;
    }

    /// The node's current pixel source.
    #[must_use]
    pub fn buffer_buffer(&self, node: NodeId) -> Option<&Rc<dyn SourceBuffer>> {
        self.nodes.validate(node);
        self.nodes.buffer_state(node.idx).buffer.as_ref()
    }

    /// The node's source box, `None` when sampling the whole buffer.
    #[must_use]
    pub fn buffer_source_box(&self, node: NodeId) -> Option<kurbo::Rect> {
        self.nodes.validate(node);
        self.nodes.buffer_state(node.idx).src_box
    }

    /// The node's destination size (zero when derived from the buffer).
    #[must_use]
    pub fn buffer_dest_size(&self, node: NodeId) -> (i32, i32) {
        self.nodes.validate(node);
        let state = self.nodes.buffer_state(node.idx);
        (state.dst_width, state.dst_height)
    }

    /// The node's buffer transform.
    #[must_use]
    pub fn buffer_transform(&self, node: NodeId) -> Transform {
        self.nodes.validate(node);
        self.nodes.buffer_state(node.idx).transform
    }

    /// Bitmask of outputs the node currently intersects, by output index.
    #[must_use]
    pub fn buffer_active_outputs(&self, node: NodeId) -> u64 {
        self.nodes.validate(node);
        self.nodes.buffer_state(node.idx).active_outputs
    }

    /// The intersecting output with the largest overlap, if any.
    #[must_use]
    pub fn buffer_primary_output(&self, node: NodeId) -> Option<OutputId> {
        self.nodes.validate(node);
        self.nodes.buffer_state(node.idx).primary_output
    }

    // -- Addons --

    /// Attaches an opaque extension value under `key`, replacing any
    /// previous value for that key.
    pub fn node_set_addon(&mut self, node: NodeId, key: u64, value: Box<dyn Any>) {
        self.nodes.validate(node);
        self.nodes.addons[node.idx as usize].insert(key, value);
    }

    /// Returns the addon stored under `key`.
    #[must_use]
    pub fn node_addon(&self, node: NodeId, key: u64) -> Option<&dyn Any> {
        self.nodes.validate(node);
        self.nodes.addons[node.idx as usize]
            .get(&key)
            .map(|v| v.as_ref())
    }

    /// Removes and returns the addon stored under `key`.
    pub fn node_take_addon(&mut self, node: NodeId, key: u64) -> Option<Box<dyn Any>> {
        self.nodes.validate(node);
        self.nodes.addons[node.idx as usize].remove(&key)
    }

    // -- Signals --

    /// Registers a destroy handler; it fires once, before the node's
    /// children are destroyed.
    pub fn node_on_destroy(
        &mut self,
        node: NodeId,
        handler: impl FnMut(&mut Scene, NodeId) + 'static,
    ) -> HandlerId {
        self.nodes.validate(node);
        let id = self.alloc_handler_id();
        self.nodes.signals[node.idx as usize]
            .destroy
            .add(id, Box::new(handler));
        id
    }

    /// Registers a handler fired when the buffer starts intersecting an
    /// output.
    pub fn buffer_on_output_enter(
        &mut self,
        node: NodeId,
        handler: impl FnMut(&mut Scene, NodeId, OutputId) + 'static,
    ) -> HandlerId {
        self.buffer_signal_add(node, handler, |signals| &mut signals.output_enter)
    }

    /// Registers a handler fired when the buffer stops intersecting an
    /// output.
    pub fn buffer_on_output_leave(
        &mut self,
        node: NodeId,
        handler: impl FnMut(&mut Scene, NodeId, OutputId) + 'static,
    ) -> HandlerId {
        self.buffer_signal_add(node, handler, |signals| &mut signals.output_leave)
    }

    /// Registers a handler fired when the buffer is presented on an output
    /// (scanned out or drawn).
    pub fn buffer_on_output_present(
        &mut self,
        node: NodeId,
        handler: impl FnMut(&mut Scene, NodeId, OutputId) + 'static,
    ) -> HandlerId {
        self.buffer_signal_add(node, handler, |signals| &mut signals.output_present)
    }

    /// Registers a handler for the buffer's frame-done notification.
    pub fn buffer_on_frame_done(
        &mut self,
        node: NodeId,
        mut handler: impl FnMut(&mut Scene, NodeId, Timestamp) + 'static,
    ) -> HandlerId {
        self.nodes.validate(node);
        assert!(
            matches!(self.nodes.content[node.idx as usize], Content::Buffer(_)),
            "node is not a buffer"
        );
        let id = self.alloc_handler_id();
        self.nodes.signals[node.idx as usize].frame_done.add(
            id,
            Box::new(move |scene, (node, now)| handler(scene, node, now)),
        );
        id
    }

    fn buffer_signal_add(
        &mut self,
        node: NodeId,
        mut handler: impl FnMut(&mut Scene, NodeId, OutputId) + 'static,
        which: fn(&mut NodeSignals) -> &mut Signal<(NodeId, OutputId)>,
    ) -> HandlerId {
        self.nodes.validate(node);
        assert!(
            matches!(self.nodes.content[node.idx as usize], Content::Buffer(_)),
            "node is not a buffer"
        );
        let id = self.alloc_handler_id();
        let callback: HandlerFn<(NodeId, OutputId)> =
            Box::new(move |scene, (node, output)| handler(scene, node, output));
        which(&mut self.nodes.signals[node.idx as usize]).add(id, callback);
        id
    }

    /// Unregisters a handler previously added on this node. Safe to call
    /// from within a running dispatch of the same signal.
    pub fn node_remove_handler(&mut self, node: NodeId, id: HandlerId) {
        if self.nodes.is_alive(node) {
            let signals = &mut self.nodes.signals[node.idx as usize];
            if signals.destroy.remove(id)
                || signals.output_enter.remove(id)
                || signals.output_leave.remove(id)
                || signals.output_present.remove(id)
                || signals.frame_done.remove(id)
            {
                return;
            }
        }
        if self.dispatch_depth > 0 {
            self.handler_tombstones.push(id);
        }
    }
}

impl Nodes {
    /// Relinks `child` directly above `sibling` under their shared parent.
    fn relink_above(&mut self, child: u32, sibling: u32) {
        self.unlink_sibling_links(child);
        self.link_after(sibling, child);
    }

    /// Relinks `child` directly below `sibling` under their shared parent.
    fn relink_below(&mut self, child: u32, sibling: u32) {
        self.unlink_sibling_links(child);
        self.link_before(sibling, child);
    }

    /// Detaches `idx` from the sibling chain while keeping its parent set.
    fn unlink_sibling_links(&mut self, idx: u32) {
        let i = idx as usize;
        let p = self.parent[i];
        let prev = self.prev_sibling[i];
        let next = self.next_sibling[i];
        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        } else {
            self.last_child[p as usize] = prev;
        }
        self.prev_sibling[i] = INVALID;
        self.next_sibling[i] = INVALID;
    }
}
