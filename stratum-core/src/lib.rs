// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene-graph rendering core for a Wayland-style compositor.
//!
//! `stratum_core` provides a declarative tree of drawable nodes with
//! fine-grained damage tracking: the compositor mutates the tree, and the
//! engine works out which screen regions actually need repainting on each
//! display. It is `no_std` compatible (with `alloc`) and uses array-based
//! struct-of-arrays storage with generational index handles.
//!
//! # Architecture
//!
//! Data flows downward for rendering and upward for configuration:
//!
//! ```text
//!   Scene mutation (move / resize / replace buffer / z-order)
//!       │
//!       ▼
//!   damage emission ──► per-output OutputDamage ──► output_commit()
//!                                                       │
//!                     ┌─────────────────────────────────┤
//!                     ▼                                 ▼
//!              direct scanout                  composite render
//!          (OutputDevice attach/test)    (RenderBackend clear/draw,
//!                                         scissored to damage)
//!
//!   Display mode / scale / position changes ──► membership recompute
//!       (active-output masks, primary output, enter/leave signals)
//! ```
//!
//! **[`scene`]** — The [`Scene`](scene::Scene) container: node store, node
//! operations, output registry, membership tracking, the commit pipeline,
//! and queries (hit testing, buffer iteration, frame-done fan-out).
//!
//! **[`backend`]** — The traits platform code implements: displays
//! ([`OutputDevice`](backend::OutputDevice)), renderers
//! ([`RenderBackend`](backend::RenderBackend)), and pixel sources
//! ([`SourceBuffer`](backend::SourceBuffer)).
//!
//! **[`damage`]** — Per-output damage accumulation with buffer-age history.
//!
//! **[`region`]** — Disjoint-rectangle pixel regions.
//!
//! **[`geometry`]** — Integer box math (including the coverage-preserving
//! fractional scaling the damage engine relies on) and 3×3 matrices.
//!
//! **[`transform`]** — The eight display orientations.
//!
//! **[`signal`]** — Multicast handlers with safe dispatch; scene events
//! (destroy, output enter/leave, present, frame-done) are delivered through
//! these.
//!
//! **[`time`]** — Monotonic timestamps, passed in by the caller.
//!
//! # Crate features
//!
//! - `std` (enabled by default): reads the `STRATUM_DEBUG_DAMAGE`
//!   environment variable at scene creation. Values: `none` (default),
//!   `rerender` (repaint everything each frame), `highlight` (fading red
//!   overlays on damaged regions).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub use kurbo;

pub mod backend;
pub mod damage;
pub mod geometry;
pub mod region;
pub mod scene;
pub mod signal;
pub mod time;
pub mod transform;

pub use backend::{OutputDevice, RenderBackend, SourceBuffer};
pub use geometry::{Box2, Mat3};
pub use region::Region;
pub use scene::{
    Children, DebugDamage, NodeId, NodeKind, OutputId, PointAcceptsInput, PresentationId, Scene,
    TextureId,
};
pub use signal::HandlerId;
pub use time::Timestamp;
pub use transform::Transform;
