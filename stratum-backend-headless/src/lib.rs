// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless backend for the stratum scene graph.
//!
//! Implements the [`stratum_core::backend`] traits without touching any
//! display hardware:
//!
//! - [`MemoryBuffer`] — an in-memory pixel source.
//! - [`HeadlessOutput`] — a scriptable display device. Shared-state handle:
//!   clone it, hand one clone to [`Scene::output_create`], and keep the
//!   other to reconfigure the "hardware" (mode, scanout test verdicts,
//!   buffer age) and to inspect what the scene did to it.
//! - [`RecordingRenderer`] — a renderer that records every draw call.
//!
//! This is the backend the integration test-suite drives the commit
//! pipeline with; embedders can also use it for compositor-level tests.
//!
//! [`Scene::output_create`]: stratum_core::Scene::output_create

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use stratum_core::backend::{OutputDevice, RenderBackend, SourceBuffer};
use stratum_core::kurbo;
use stratum_core::{Box2, Mat3, Region, TextureId, Transform};

/// An in-memory pixel source.
#[derive(Debug)]
pub struct MemoryBuffer {
    width: i32,
    height: i32,
    client_texture: Option<TextureId>,
}

impl MemoryBuffer {
    /// Creates a buffer of the given size.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            client_texture: None,
        }
    }

    /// Creates a buffer that carries a pre-uploaded client texture.
    #[must_use]
    pub fn with_client_texture(width: i32, height: i32, texture: TextureId) -> Self {
        Self {
            width,
            height,
            client_texture: Some(texture),
        }
    }

    /// Wraps the buffer for handing to a scene.
    #[must_use]
    pub fn shared(self) -> Rc<dyn SourceBuffer> {
        Rc::new(self)
    }
}

impl SourceBuffer for MemoryBuffer {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn client_texture(&self) -> Option<TextureId> {
        self.client_texture
    }
}

/// The scriptable knobs of a [`HeadlessOutput`].
#[derive(Debug, Clone)]
pub struct OutputScript {
    /// Physical size in pixels, untransformed.
    pub physical: (i32, i32),
    /// Scale between scene units and physical pixels.
    pub scale: f32,
    /// Display orientation.
    pub transform: Transform,
    /// Verdict returned from scanout tests.
    pub test_ok: bool,
    /// Verdict returned from commits.
    pub commit_ok: bool,
    /// Whether attaching the back buffer for rendering succeeds.
    pub attach_render_ok: bool,
    /// Reported back-buffer age in frames.
    pub buffer_age: usize,
    /// Whether the display wants a frame regardless of damage.
    pub needs_frame: bool,
}

/// What a [`HeadlessOutput`] observed the scene doing.
#[derive(Default)]
pub struct OutputLog {
    /// Buffers staged for direct scanout, in order.
    pub attached: Vec<Rc<dyn SourceBuffer>>,
    /// Number of scanout tests.
    pub tests: u32,
    /// Number of rollbacks.
    pub rollbacks: u32,
    /// Number of commits (successful or not).
    pub commits: u32,
    /// Number of render attaches.
    pub render_attaches: u32,
    /// Number of frame-schedule requests.
    pub scheduled_frames: u32,
    /// Frame damage hints received, in physical coordinates.
    pub frame_damage: Vec<Region>,
    /// Damage passed to software-cursor rendering.
    pub cursor_damage: Vec<Region>,
}

struct OutputInner {
    script: OutputScript,
    log: OutputLog,
}

/// A scriptable display device with shared state.
#[derive(Clone)]
pub struct HeadlessOutput {
    inner: Rc<RefCell<OutputInner>>,
}

impl HeadlessOutput {
    /// A well-behaved display: everything succeeds, buffer age 1.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_mode(width, height, 1.0, Transform::Normal)
    }

    /// A well-behaved display with an explicit mode.
    #[must_use]
    pub fn with_mode(physical_width: i32, physical_height: i32, scale: f32, transform: Transform) -> Self {
        Self {
            inner: Rc::new(RefCell::new(OutputInner {
                script: OutputScript {
                    physical: (physical_width, physical_height),
                    scale,
                    transform,
                    test_ok: true,
                    commit_ok: true,
                    attach_render_ok: true,
                    buffer_age: 1,
                    needs_frame: false,
                },
                log: OutputLog::default(),
            })),
        }
    }

    /// Mutable access to the device's knobs.
    #[must_use]
    pub fn script_mut(&self) -> RefMut<'_, OutputScript> {
        RefMut::map(self.inner.borrow_mut(), |inner| &mut inner.script)
    }

    /// What the scene did to this device.
    #[must_use]
    pub fn log(&self) -> Ref<'_, OutputLog> {
        Ref::map(self.inner.borrow(), |inner| &inner.log)
    }

    /// Forgets everything observed so far.
    pub fn clear_log(&self) {
        self.inner.borrow_mut().log = OutputLog::default();
    }
}

impl OutputDevice for HeadlessOutput {
    fn physical_size(&self) -> (i32, i32) {
        self.inner.borrow().script.physical
    }

    fn scale(&self) -> f32 {
        self.inner.borrow().script.scale
    }

    fn transform(&self) -> Transform {
        self.inner.borrow().script.transform
    }

    fn attach_buffer(&mut self, buffer: &Rc<dyn SourceBuffer>) {
        self.inner.borrow_mut().log.attached.push(buffer.clone());
    }

    fn test(&mut self) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.log.tests += 1;
        inner.script.test_ok
    }

    fn rollback(&mut self) {
        self.inner.borrow_mut().log.rollbacks += 1;
    }

    fn commit(&mut self) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.log.commits += 1;
        inner.script.commit_ok
    }

    fn schedule_frame(&mut self) {
        self.inner.borrow_mut().log.scheduled_frames += 1;
    }

    fn attach_render(&mut self) -> Option<usize> {
        let mut inner = self.inner.borrow_mut();
        inner.log.render_attaches += 1;
        if inner.script.attach_render_ok {
            Some(inner.script.buffer_age)
        } else {
            None
        }
    }

    fn needs_frame(&self) -> bool {
        self.inner.borrow().script.needs_frame
    }

    fn set_frame_damage(&mut self, damage: &Region) {
        self.inner.borrow_mut().log.frame_damage.push(damage.clone());
    }

    fn render_software_cursors(&mut self, damage: &Region) {
        self.inner.borrow_mut().log.cursor_damage.push(damage.clone());
    }
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    /// A render pass started.
    Begin {
        /// Target width in physical pixels.
        width: i32,
        /// Target height in physical pixels.
        height: i32,
    },
    /// The render pass ended.
    End,
    /// The scissored area was cleared.
    Clear([f32; 4]),
    /// The scissor changed.
    Scissor(Option<Box2>),
    /// A solid rectangle was drawn.
    Rect {
        /// Destination box in scaled output coordinates.
        dst: Box2,
        /// Fill color.
        color: [f32; 4],
        /// Draw matrix.
        matrix: Mat3,
    },
    /// A textured quad was drawn.
    Quad {
        /// The texture sampled.
        texture: TextureId,
        /// Source crop, if any.
        src: Option<kurbo::Rect>,
        /// Draw matrix.
        matrix: Mat3,
        /// Blend alpha.
        alpha: f32,
    },
}

/// A renderer that records every call for inspection.
#[derive(Default)]
pub struct RecordingRenderer {
    /// Every call since the last [`clear_log`](Self::clear_log).
    pub calls: Vec<DrawCall>,
    /// Textures created by uploads, in order.
    pub uploads: Vec<TextureId>,
    /// Textures destroyed, in order.
    pub destroyed: Vec<TextureId>,
    /// When set, uploads fail.
    pub fail_uploads: bool,
    next_texture: u64,
}

impl RecordingRenderer {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            // Client textures in tests use low ids; start high to keep the
            // two ranges apart.
            next_texture: 1000,
            ..Self::default()
        }
    }

    /// Forgets recorded calls (keeps the texture counter).
    pub fn clear_log(&mut self) {
        self.calls.clear();
    }

    /// The quads drawn since the last log clear.
    #[must_use]
    pub fn quads(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, DrawCall::Quad { .. }))
            .collect()
    }

    /// The solid rectangles drawn since the last log clear.
    #[must_use]
    pub fn rects(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, DrawCall::Rect { .. }))
            .collect()
    }

    /// Number of clears since the last log clear.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DrawCall::Clear(_)))
            .count()
    }
}

impl RenderBackend for RecordingRenderer {
    fn begin(&mut self, width: i32, height: i32) {
        self.calls.push(DrawCall::Begin { width, height });
    }

    fn end(&mut self) {
        self.calls.push(DrawCall::End);
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(DrawCall::Clear(color));
    }

    fn scissor(&mut self, rect: Option<Box2>) {
        self.calls.push(DrawCall::Scissor(rect));
    }

    fn render_rect(&mut self, rect: Box2, color: [f32; 4], matrix: &Mat3) {
        self.calls.push(DrawCall::Rect {
            dst: rect,
            color,
            matrix: *matrix,
        });
    }

    fn render_textured_quad(
        &mut self,
        texture: TextureId,
        src: Option<kurbo::Rect>,
        matrix: &Mat3,
        alpha: f32,
    ) {
        self.calls.push(DrawCall::Quad {
            texture,
            src,
            matrix: *matrix,
            alpha,
        });
    }

    fn texture_from_buffer(&mut self, _buffer: &Rc<dyn SourceBuffer>) -> Option<TextureId> {
        if self.fail_uploads {
            return None;
        }
        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        self.uploads.push(texture);
        Some(texture)
    }

    fn texture_destroy(&mut self, texture: TextureId) {
        self.destroyed.push(texture);
    }
}
