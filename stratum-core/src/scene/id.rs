// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene identity types.

use core::fmt;

/// Sentinel value indicating "no node" in topology index fields.
pub(crate) const INVALID: u32 = u32::MAX;

/// A handle to a node in a [`Scene`](crate::scene::Scene).
///
/// Contains both a slot index and a generation counter so that stale handles
/// are detected after a node is destroyed and its slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Slot index into the scene's node arrays.
    pub(crate) idx: u32,
    /// Generation counter — must match the scene's generation for this slot.
    pub(crate) generation: u32,
}

impl NodeId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@gen{})", self.idx, self.generation)
    }
}

/// Identifies an output registered with a scene.
///
/// The value is the output's bit index in each buffer node's active-output
/// mask, in `[0, 64)`. Indices are reused: destroying an output frees its
/// index for the next registration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId(pub(crate) u8);

impl OutputId {
    /// Returns the bit index in `[0, 64)`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Returns the bit for this output in an active-output mask.
    #[inline]
    #[must_use]
    pub(crate) const fn mask(self) -> u64 {
        1 << self.0
    }
}

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({})", self.0)
    }
}

/// An opaque handle to a renderer-managed texture.
///
/// Texture ids are assigned by the [`RenderBackend`](crate::backend::RenderBackend)
/// and passed through without interpretation by the scene.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u64);

impl fmt::Debug for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextureId({})", self.0)
    }
}

/// An opaque token for a presentation-feedback object attached to a scene.
///
/// The scene only tracks whether one is attached; the embedder clears it via
/// [`Scene::handle_presentation_destroy`](crate::scene::Scene::handle_presentation_destroy)
/// when the underlying object goes away.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresentationId(pub u64);

impl fmt::Debug for PresentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PresentationId({})", self.0)
    }
}
