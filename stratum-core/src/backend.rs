// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend contract for displays, renderers, and pixel sources.
//!
//! The scene graph does not rasterize and does not talk to display hardware.
//! Platform backends implement these traits and the scene drives them from
//! the commit pipeline:
//!
//! - [`SourceBuffer`] — a lockable pixel source presented by buffer nodes.
//!   Holding an `Rc<dyn SourceBuffer>` *is* the lock; the scene keeps one
//!   clone per node and drops it on replacement or node destruction.
//! - [`OutputDevice`] — one display. The scene reads its geometry for
//!   membership and damage math, and drives attach/test/commit during
//!   [`output_commit`](crate::scene::Scene::output_commit).
//! - [`RenderBackend`] — the draw-call sink used on the composite path.
//!
//! All traits are object-safe; the scene stores devices as
//! `Box<dyn OutputDevice>` and borrows the renderer per commit.

use alloc::rc::Rc;

use crate::geometry::{Box2, Mat3};
use crate::region::Region;
use crate::scene::TextureId;
use crate::transform::Transform;

/// A pixel source a buffer node can present.
pub trait SourceBuffer {
    /// Width of the buffer in pixels, before any transform.
    fn width(&self) -> i32;

    /// Height of the buffer in pixels, before any transform.
    fn height(&self) -> i32;

    /// A pre-uploaded texture for this buffer, if the client provided one.
    ///
    /// When present, the render path uses it directly instead of uploading
    /// and caching a texture of its own.
    fn client_texture(&self) -> Option<TextureId> {
        None
    }
}

/// One display, as the scene sees it.
///
/// Geometry accessors must reflect the current mode; the embedder calls
/// [`output_layout_changed`](crate::scene::Scene::output_layout_changed)
/// whenever mode, scale, or transform change so the scene can recompute
/// membership and damage bounds.
pub trait OutputDevice {
    /// Size of the display buffer in physical pixels (untransformed).
    fn physical_size(&self) -> (i32, i32);

    /// Scale factor between scene units and physical pixels.
    fn scale(&self) -> f32;

    /// Orientation of the display.
    fn transform(&self) -> Transform;

    /// Stages `buffer` for direct scanout.
    fn attach_buffer(&mut self, buffer: &Rc<dyn SourceBuffer>);

    /// Tests whether the staged state (an attached buffer) can be applied.
    fn test(&mut self) -> bool;

    /// Discards staged state.
    fn rollback(&mut self);

    /// Applies staged state. Returns whether the commit succeeded.
    fn commit(&mut self) -> bool;

    /// Asks the display to schedule another frame event.
    fn schedule_frame(&mut self);

    /// Attaches the back buffer for rendering and returns its age in
    /// frames, or `None` if no buffer could be attached.
    ///
    /// An age of 1 means the buffer holds the previous frame; 0 or an age
    /// beyond the tracked history means its contents are undefined and the
    /// whole output will be repainted.
    fn attach_render(&mut self) -> Option<usize>;

    /// Whether the display wants a frame even without pending damage.
    fn needs_frame(&self) -> bool {
        false
    }

    /// Receives the frame's damage in physical coordinates, ahead of
    /// [`commit`](Self::commit).
    fn set_frame_damage(&mut self, damage: &Region);

    /// Draws software cursors over the damaged area, inside the current
    /// render pass.
    fn render_software_cursors(&mut self, damage: &Region) {
        let _ = damage;
    }
}

/// The draw-call sink for composite rendering.
pub trait RenderBackend {
    /// Starts a render pass targeting a `width` × `height` buffer.
    fn begin(&mut self, width: i32, height: i32);

    /// Ends the render pass.
    fn end(&mut self);

    /// Fills the scissored area with `color`.
    fn clear(&mut self, color: [f32; 4]);

    /// Restricts subsequent draws to `rect`, or lifts the restriction.
    fn scissor(&mut self, rect: Option<Box2>);

    /// Draws a solid rectangle.
    fn render_rect(&mut self, rect: Box2, color: [f32; 4], matrix: &Mat3);

    /// Draws a textured quad. `src` selects a sub-rectangle of the texture
    /// in pixels; `None` samples the whole texture.
    fn render_textured_quad(
        &mut self,
        texture: TextureId,
        src: Option<kurbo::Rect>,
        matrix: &Mat3,
        alpha: f32,
    );

    /// Uploads `buffer` and returns a texture for it, or `None` on failure.
    fn texture_from_buffer(&mut self, buffer: &Rc<dyn SourceBuffer>) -> Option<TextureId>;

    /// Releases a texture previously returned by
    /// [`texture_from_buffer`](Self::texture_from_buffer).
    fn texture_destroy(&mut self, texture: TextureId);
}
