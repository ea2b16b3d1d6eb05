// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scene container.
//!
//! A [`Scene`] owns everything: the node store (rooted in a tree node
//! created with the scene), the registered outputs with their damage
//! accumulators, the damage-highlight state for the debug mode, and the
//! optional presentation-feedback reference.
//!
//! Node, output, damage, render, and query operations live in the sibling
//! modules; they are all methods on `Scene`.

mod damage;
mod id;
mod node;
mod output;
mod query;
mod render;
mod traverse;

use alloc::vec::Vec;

use crate::backend::RenderBackend;
use crate::region::Region;
use crate::signal::HandlerId;
use crate::time::Timestamp;

pub use id::{NodeId, OutputId, PresentationId, TextureId};
pub use node::{NodeKind, PointAcceptsInput};
pub use traverse::Children;

use id::INVALID;
use node::{Content, Nodes};
use output::SceneOutput;

/// Damage visualization mode, selected once at scene creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebugDamage {
    /// Normal operation.
    #[default]
    None,
    /// Damage the whole output every frame, repainting everything.
    Rerender,
    /// Overlay damaged regions in red, fading out over 250 ms. Disables
    /// direct scanout.
    Highlight,
}

impl DebugDamage {
    /// Parses the `STRATUM_DEBUG_DAMAGE` option value. Unknown values log
    /// an error and fall back to [`DebugDamage::None`].
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("none") => Self::None,
            Some("rerender") => Self::Rerender,
            Some("highlight") => Self::Highlight,
            Some(other) => {
                log::error!("unknown STRATUM_DEBUG_DAMAGE option: {other}");
                Self::None
            }
        }
    }
}

/// One visualized damage region in [`DebugDamage::Highlight`] mode.
pub(crate) struct HighlightRegion {
    /// Output-local damage, as accumulated at the time of the frame.
    pub(crate) region: Region,
    pub(crate) when: Timestamp,
}

/// A scene graph: a tree of drawable nodes plus per-output rendering state.
pub struct Scene {
    pub(crate) nodes: Nodes,
    pub(crate) root: NodeId,
    /// Registered outputs, sorted by index.
    pub(crate) outputs: Vec<SceneOutput>,
    /// Highlight regions, newest first.
    pub(crate) highlights: Vec<HighlightRegion>,
    pub(crate) debug_damage: DebugDamage,
    pub(crate) presentation: Option<PresentationId>,
    /// Texture cache entries dropped by node mutation, waiting for a
    /// renderer to release them.
    pub(crate) retired_textures: Vec<TextureId>,
    next_handler: u64,
    pub(crate) handler_tombstones: Vec<HandlerId>,
    pub(crate) dispatch_depth: u32,
}

impl Scene {
    /// Creates an empty scene.
    ///
    /// With the `std` feature, the debug-damage mode is read once from the
    /// `STRATUM_DEBUG_DAMAGE` environment variable.
    #[must_use]
    pub fn new() -> Self {
        Self::with_debug_damage(debug_damage_from_env())
    }

    /// Creates an empty scene with an explicit debug-damage mode.
    #[must_use]
    pub fn with_debug_damage(debug_damage: DebugDamage) -> Self {
        let mut nodes = Nodes::new();
        let root = nodes.alloc(Content::Tree, INVALID);
        Self {
            nodes,
            root,
            outputs: Vec::new(),
            highlights: Vec::new(),
            debug_damage,
            presentation: None,
            retired_textures: Vec::new(),
            next_handler: 1,
            handler_tombstones: Vec::new(),
            dispatch_depth: 0,
        }
    }

    /// The scene's root tree node.
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The debug-damage mode the scene was created with.
    #[inline]
    #[must_use]
    pub fn debug_damage(&self) -> DebugDamage {
        self.debug_damage
    }

    /// Attaches a presentation-feedback reference.
    ///
    /// # Panics
    ///
    /// Panics if one is already attached.
    pub fn set_presentation(&mut self, presentation: PresentationId) {
        assert!(
            self.presentation.is_none(),
            "a presentation object is already attached"
        );
        self.presentation = Some(presentation);
    }

    /// The attached presentation-feedback reference, if any.
    #[must_use]
    pub fn presentation(&self) -> Option<PresentationId> {
        self.presentation
    }

    /// Clears the presentation reference after the underlying object was
    /// destroyed.
    pub fn handle_presentation_destroy(&mut self) {
        self.presentation = None;
    }

    /// Releases texture cache entries orphaned by buffer updates.
    ///
    /// [`output_commit`](Scene::output_commit) does this automatically;
    /// embedders tearing a scene down without a further commit call it once
    /// with their renderer.
    pub fn destroy_retired_textures(&mut self, renderer: &mut dyn RenderBackend) {
        while let Some(texture) = self.retired_textures.pop() {
            renderer.texture_destroy(texture);
        }
    }

    pub(crate) fn alloc_handler_id(&mut self) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        id
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
fn debug_damage_from_env() -> DebugDamage {
    match std::env::var("STRATUM_DEBUG_DAMAGE") {
        Ok(value) => {
            log::info!("loading STRATUM_DEBUG_DAMAGE option: {value}");
            DebugDamage::parse(Some(&value))
        }
        Err(_) => DebugDamage::None,
    }
}

#[cfg(not(feature = "std"))]
fn debug_damage_from_env() -> DebugDamage {
    DebugDamage::None
}
