// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end commit pipeline tests: scanout selection, composite
//! rendering, damage consumption, and texture lifecycle.

use std::cell::Cell;
use std::rc::Rc;

use stratum_backend_headless::{DrawCall, HeadlessOutput, MemoryBuffer, RecordingRenderer};
use stratum_core::{
    Box2, DebugDamage, NodeId, OutputId, Region, Scene, TextureId, Timestamp, Transform,
};

fn scene() -> Scene {
    Scene::with_debug_damage(DebugDamage::None)
}

fn now(ms: u64) -> Timestamp {
    Timestamp::from_millis(ms)
}

/// Scene with one 800x600 output and a handle to its device.
fn scene_with_output() -> (Scene, HeadlessOutput, OutputId) {
    let mut scene = scene();
    let device = HeadlessOutput::new(800, 600);
    let output = scene.output_create(Box::new(device.clone()));
    (scene, device, output)
}

fn present_counter(scene: &mut Scene, node: NodeId) -> Rc<Cell<u32>> {
    let count = Rc::new(Cell::new(0));
    let c = count.clone();
    scene.buffer_on_output_present(node, move |_, _, _| c.set(c.get() + 1));
    count
}

#[test]
fn fullscreen_buffer_takes_scanout() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    let source = MemoryBuffer::new(800, 600).shared();
    let node = scene.create_buffer(root, Some(source.clone()));
    let presents = present_counter(&mut scene, node);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));

    assert_eq!(presents.get(), 1);
    assert!(renderer.calls.is_empty(), "scanout must not render");
    let log = device.log();
    assert_eq!(log.attached.len(), 1);
    assert!(Rc::ptr_eq(&log.attached[0], &source));
    assert_eq!(log.tests, 1);
    assert_eq!(log.commits, 1);
    assert_eq!(log.rollbacks, 0);
}

#[test]
fn scanout_rejected_by_transform() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    // 600x800 rotated 90° has an 800x600 footprint, so only the transform
    // mismatch disqualifies it.
    let node = scene.create_buffer(root, Some(MemoryBuffer::new(600, 800).shared()));
    scene.buffer_set_transform(node, Transform::Rotate90);
    assert_eq!(scene.node_size(node), (800, 600));

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));

    assert!(device.log().attached.is_empty());
    assert!(matches!(renderer.calls.first(), Some(DrawCall::Begin { .. })));
    assert_eq!(renderer.quads().len(), 1);
}

#[test]
fn scanout_rejected_by_source_crop() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    let node = scene.create_buffer(root, Some(MemoryBuffer::new(800, 600).shared()));
    scene.buffer_set_source_box(node, Some(stratum_core::kurbo::Rect::new(0.0, 0.0, 400.0, 300.0)));
    scene.buffer_set_dest_size(node, 800, 600);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    assert!(device.log().attached.is_empty());
    assert!(!renderer.quads().is_empty());
}

#[test]
fn scanout_rejected_by_second_visible_node() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    let node = scene.create_buffer(root, Some(MemoryBuffer::new(800, 600).shared()));
    scene.create_rect(root, 10, 10, [1.0, 0.0, 0.0, 1.0]);
    let presents = present_counter(&mut scene, node);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));

    assert!(device.log().attached.is_empty());
    // Composite still presents the buffer, just through the renderer.
    assert_eq!(presents.get(), 1);
    assert_eq!(renderer.quads().len(), 1);
    assert_eq!(renderer.rects().len(), 1);
}

#[test]
fn scanout_test_failure_falls_back_to_composite() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    scene.create_buffer(root, Some(MemoryBuffer::new(800, 600).shared()));
    device.script_mut().test_ok = false;

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));

    let log = device.log();
    assert_eq!(log.tests, 1);
    assert_eq!(log.rollbacks, 1, "failed test rolls the attach back");
    assert_eq!(log.commits, 1, "only the composite commit");
    drop(log);
    assert!(!renderer.quads().is_empty());
}

#[test]
fn leaving_scanout_damages_the_whole_output() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    scene.create_buffer(root, Some(MemoryBuffer::new(800, 600).shared()));

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    assert!(renderer.calls.is_empty());

    // A second node ends scanout; the composition buffers missed the
    // scanned-out frames, so everything repaints.
    scene.create_rect(root, 10, 10, [1.0, 0.0, 0.0, 1.0]);
    assert!(scene.output_commit(output, &mut renderer, now(32)));

    let log = device.log();
    let render_damage = log.cursor_damage.last().unwrap();
    assert!(render_damage.covers_box(Box2::new(0, 0, 800, 600)));
}

#[test]
fn no_pending_damage_skips_the_frame() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    let frames = renderer
        .calls
        .iter()
        .filter(|c| matches!(c, DrawCall::Begin { .. }))
        .count();
    assert_eq!(frames, 1);

    // Nothing changed: no new render pass, the attach is rolled back.
    assert!(scene.output_commit(output, &mut renderer, now(32)));
    let frames_after = renderer
        .calls
        .iter()
        .filter(|c| matches!(c, DrawCall::Begin { .. }))
        .count();
    assert_eq!(frames_after, 1);
    let log = device.log();
    assert_eq!(log.render_attaches, 2);
    assert_eq!(log.rollbacks, 1);
    assert_eq!(log.commits, 1);
}

#[test]
fn attach_render_failure_fails_the_commit() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    scene.create_rect(root, 10, 10, [0.0; 4]);
    device.script_mut().attach_render_ok = false;

    let mut renderer = RecordingRenderer::new();
    assert!(!scene.output_commit(output, &mut renderer, now(16)));
    assert!(renderer.calls.is_empty());
}

#[test]
fn failed_commit_keeps_damage_pending() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    scene.create_rect(root, 10, 10, [0.0; 4]);
    device.script_mut().commit_ok = false;

    let mut renderer = RecordingRenderer::new();
    assert!(!scene.output_commit(output, &mut renderer, now(16)));

    // The display recovers; the same damage renders again.
    device.script_mut().commit_ok = true;
    assert!(scene.output_commit(output, &mut renderer, now(32)));
    let frames = renderer
        .calls
        .iter()
        .filter(|c| matches!(c, DrawCall::Begin { .. }))
        .count();
    assert_eq!(frames, 2);
}

#[test]
fn composite_paints_back_to_front() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    let red = [1.0, 0.0, 0.0, 1.0];
    let blue = [0.0, 0.0, 1.0, 1.0];
    scene.create_rect(root, 100, 100, red);
    scene.create_rect(root, 100, 100, blue);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));

    let rect_colors: Vec<[f32; 4]> = renderer
        .calls
        .iter()
        .filter_map(|c| match c {
            DrawCall::Rect { color, .. } => Some(*color),
            _ => None,
        })
        .collect();
    assert_eq!(rect_colors, [red, blue], "bottom first, topmost last");

    // The damaged area is cleared before anything draws.
    let first_rect = renderer
        .calls
        .iter()
        .position(|c| matches!(c, DrawCall::Rect { .. }))
        .unwrap();
    let first_clear = renderer
        .calls
        .iter()
        .position(|c| matches!(c, DrawCall::Clear(_)))
        .unwrap();
    assert!(first_clear < first_rect);
}

#[test]
fn draws_are_scissored_to_damage() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    let rect = scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    renderer.clear_log();

    // Only the old and new 10x10 footprints are damaged.
    scene.set_position(rect, 300, 300);
    assert!(scene.output_commit(output, &mut renderer, now(32)));

    let old_footprint = Region::from_box(Box2::new(0, 0, 10, 10));
    let new_footprint = Region::from_box(Box2::new(300, 300, 10, 10));
    for call in &renderer.calls {
        if let DrawCall::Scissor(Some(b)) = call {
            assert!(
                old_footprint.covers_box(*b) || new_footprint.covers_box(*b),
                "scissor {b:?} outside the damaged footprints"
            );
        }
    }
    assert!(!renderer.rects().is_empty());
}

#[test]
fn begin_uses_physical_size_and_scaled_boxes() {
    let mut scene = scene();
    let device = HeadlessOutput::with_mode(1600, 1200, 2.0, Transform::Normal);
    let output = scene.output_create(Box::new(device));
    let root = scene.root();
    scene.create_rect(root, 100, 50, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));

    assert_eq!(
        renderer.calls.first(),
        Some(&DrawCall::Begin {
            width: 1600,
            height: 1200
        })
    );
    let dst = renderer.calls.iter().find_map(|c| match c {
        DrawCall::Rect { dst, .. } => Some(*dst),
        _ => None,
    });
    assert_eq!(dst, Some(Box2::new(0, 0, 200, 100)));
}

#[test]
fn textures_upload_once_and_cache() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    scene.create_buffer(root, Some(MemoryBuffer::new(100, 100).shared()));
    // A second node keeps the pipeline off the scanout path.
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    assert_eq!(renderer.uploads.len(), 1);

    scene.output_damage_whole(output);
    assert!(scene.output_commit(output, &mut renderer, now(32)));
    assert_eq!(renderer.uploads.len(), 1, "cache hit on the second frame");

    let textures: Vec<TextureId> = renderer
        .calls
        .iter()
        .filter_map(|c| match c {
            DrawCall::Quad { texture, .. } => Some(*texture),
            _ => None,
        })
        .collect();
    assert_eq!(textures.len(), 2);
    assert_eq!(textures[0], textures[1]);
}

#[test]
fn buffer_replacement_retires_the_cached_texture() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    let node = scene.create_buffer(root, Some(MemoryBuffer::new(100, 100).shared()));
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    let first = renderer.uploads[0];

    scene.buffer_set_buffer(node, Some(MemoryBuffer::new(100, 100).shared()));
    assert!(scene.output_commit(output, &mut renderer, now(32)));

    assert_eq!(renderer.destroyed, [first]);
    assert_eq!(renderer.uploads.len(), 2);
}

#[test]
fn client_texture_is_preferred_over_upload() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    scene.create_buffer(
        root,
        Some(MemoryBuffer::with_client_texture(100, 100, TextureId(7)).shared()),
    );
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));

    assert!(renderer.uploads.is_empty());
    let texture = renderer.calls.iter().find_map(|c| match c {
        DrawCall::Quad { texture, .. } => Some(*texture),
        _ => None,
    });
    assert_eq!(texture, Some(TextureId(7)));
}

#[test]
fn failed_upload_skips_the_node() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    scene.create_buffer(root, Some(MemoryBuffer::new(100, 100).shared()));
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    renderer.fail_uploads = true;
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    assert!(renderer.quads().is_empty());
    assert_eq!(renderer.rects().len(), 1, "other nodes still draw");
}

#[test]
fn bufferless_nodes_are_skipped() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    scene.create_buffer(root, None);
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    assert!(renderer.quads().is_empty());
}

#[test]
fn frame_damage_is_reported_in_physical_coordinates() {
    let mut scene = scene();
    // 200x100 physical rotated 90°: a 100x200 logical viewport.
    let device = HeadlessOutput::with_mode(200, 100, 1.0, Transform::Rotate90);
    let output = scene.output_create(Box::new(device.clone()));
    let root = scene.root();
    let rect = scene.create_rect(root, 30, 40, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    device.clear_log();

    scene.set_position(rect, 10, 20);
    // Damage both footprints; the hint maps through the inverse transform.
    assert!(scene.output_commit(output, &mut renderer, now(32)));
    let log = device.log();
    let hint = log.frame_damage.last().unwrap();
    // Logical (10, 20, 30, 40) maps to physical (20, 60, 40, 30).
    assert!(hint.covers_box(Box2::new(20, 60, 40, 30)));
}

#[test]
fn software_cursors_render_over_the_damage() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    let log = device.log();
    assert_eq!(log.cursor_damage.len(), 1);
    assert!(!log.cursor_damage[0].is_empty());
}

#[test]
fn buffer_age_expands_render_damage() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    let rect = scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    device.clear_log();

    // Frame 2 damages (100, 100); frame 3 damages (300, 300) but the
    // display hands back a buffer from two frames ago, so frame 2's damage
    // must be repainted as well.
    scene.set_position(rect, 100, 100);
    assert!(scene.output_commit(output, &mut renderer, now(32)));

    device.script_mut().buffer_age = 2;
    scene.set_position(rect, 300, 300);
    assert!(scene.output_commit(output, &mut renderer, now(48)));

    let log = device.log();
    let render_damage = log.cursor_damage.last().unwrap();
    assert!(render_damage.covers_box(Box2::new(100, 100, 10, 10)));
    assert!(render_damage.covers_box(Box2::new(300, 300, 10, 10)));
}

#[test]
fn unknown_buffer_age_repaints_everything() {
    let (mut scene, device, output) = scene_with_output();
    let root = scene.root();
    let rect = scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    device.clear_log();

    device.script_mut().buffer_age = 0;
    scene.set_position(rect, 50, 50);
    assert!(scene.output_commit(output, &mut renderer, now(32)));

    let log = device.log();
    assert!(log.cursor_damage.last().unwrap().covers_box(Box2::new(0, 0, 800, 600)));
}

#[test]
fn teardown_releases_retired_textures() {
    let (mut scene, _device, output) = scene_with_output();
    let root = scene.root();
    let node = scene.create_buffer(root, Some(MemoryBuffer::new(100, 100).shared()));
    scene.create_rect(root, 10, 10, [0.0; 4]);

    let mut renderer = RecordingRenderer::new();
    assert!(scene.output_commit(output, &mut renderer, now(16)));
    let uploaded = renderer.uploads[0];

    scene.node_destroy(node);
    scene.destroy_retired_textures(&mut renderer);
    assert_eq!(renderer.destroyed, [uploaded]);
}
