// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multicast signals with safe dispatch.
//!
//! Scene events (node destruction, output enter/leave, presentation,
//! frame-done) are delivered through [`Signal`]s: per-event handler lists
//! whose handlers receive `&mut Scene` and may mutate the scene freely
//! during dispatch — including adding or removing handlers, moving nodes, or
//! destroying the very object the signal lives on.
//!
//! Dispatch is made safe by detaching the handler list from the scene for
//! the duration of the emission:
//!
//! - Handlers *removed* during dispatch are tombstoned and skipped, then
//!   dropped when the list is merged back.
//! - Handlers *added* during dispatch land on the fresh list in the scene
//!   and do not run for the current emission; the merge appends them after
//!   the surviving originals.
//! - If the owning object is destroyed during dispatch, the merge finds no
//!   home for the list and drops it.
//!
//! Signals carry a small `Copy` argument; handlers are `FnMut` boxes owned
//! by the signal.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::scene::Scene;

/// Identifies a registered signal handler.
///
/// Returned from the `Scene::*_on_*` registration methods and accepted by
/// the matching removal methods. Ids are unique per scene.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

pub(crate) type HandlerFn<A> = Box<dyn FnMut(&mut Scene, A)>;

struct HandlerSlot<A> {
    id: HandlerId,
    // `None` only transiently, while the handler itself is running.
    callback: Option<HandlerFn<A>>,
}

/// A multicast handler list for one event on one object.
pub(crate) struct Signal<A> {
    slots: Vec<HandlerSlot<A>>,
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<A> Signal<A> {
    pub(crate) fn add(&mut self, id: HandlerId, callback: HandlerFn<A>) {
        self.slots.push(HandlerSlot {
            id,
            callback: Some(callback),
        });
    }

    /// Removes a handler, returning whether it was present.
    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        match self.slots.iter().position(|s| s.id == id) {
            Some(pos) => {
                self.slots.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Resolves the storage location of one signal inside a scene.
///
/// Selectors are small `Copy` values (a node or output handle plus the event
/// kind, encoded in the selector type) so the emission loop can re-resolve
/// the signal after every handler call, tolerating arbitrary scene mutation
/// in between.
pub(crate) trait SignalRef<A>: Copy {
    fn resolve(self, scene: &mut Scene) -> Option<&mut Signal<A>>;
}

/// Emits `arg` to every handler of the signal selected by `sel`.
pub(crate) fn emit<A: Copy, S: SignalRef<A>>(scene: &mut Scene, sel: S, arg: A) {
    let mut sig = match sel.resolve(scene) {
        Some(slot) => core::mem::take(slot),
        None => return,
    };
    if sig.slots.is_empty() {
        return;
    }

    scene.dispatch_depth += 1;
    for i in 0..sig.slots.len() {
        // A handler may destroy the signal's owner; stop delivering then.
        if sel.resolve(scene).is_none() {
            break;
        }
        let id = sig.slots[i].id;
        if scene.handler_tombstones.contains(&id) {
            continue;
        }
        let Some(mut callback) = sig.slots[i].callback.take() else {
            continue;
        };
        callback(scene, arg);
        sig.slots[i].callback = Some(callback);
    }
    scene.dispatch_depth -= 1;

    if sel.resolve(scene).is_some() {
        // Drop handlers removed during dispatch, consuming their tombstones.
        {
            let tombstones = &mut scene.handler_tombstones;
            sig.slots.retain(|s| {
                if let Some(pos) = tombstones.iter().position(|t| *t == s.id) {
                    tombstones.swap_remove(pos);
                    false
                } else {
                    true
                }
            });
        }
        if let Some(slot) = sel.resolve(scene) {
            let late = core::mem::take(slot);
            sig.slots.extend(late.slots);
            *slot = sig;
        }
    }

    if scene.dispatch_depth == 0 {
        // Any leftover tombstones pointed at handler lists that died with
        // their owner mid-dispatch.
        scene.handler_tombstones.clear();
    }
}
