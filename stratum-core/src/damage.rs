// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-output damage accumulation.
//!
//! Every output owns an [`OutputDamage`]: the pending region that must be
//! repainted on the next frame, plus the damage of the last few presented
//! frames. The history exists for buffer-age expansion — when the display
//! hands back a buffer that is `n` frames old, everything painted in the
//! last `n - 1` frames must be repainted too, because that buffer never saw
//! those updates.
//!
//! Added damage is clipped to the output's scaled bounds; callers may damage
//! boxes that hang off-screen and only the visible part is kept.

use crate::geometry::Box2;
use crate::region::Region;

/// How many previous frames of damage are kept for buffer-age expansion.
const PREVIOUS_FRAMES: usize = 2;

/// Accumulated damage for one output.
#[derive(Debug, Default)]
pub struct OutputDamage {
    pending: Region,
    previous: [Region; PREVIOUS_FRAMES],
    previous_idx: usize,
    bounds: (i32, i32),
}

impl OutputDamage {
    /// Creates an empty accumulator for an output of the given size in
    /// scaled (physical) pixels.
    #[must_use]
    pub fn new(bounds: (i32, i32)) -> Self {
        Self {
            bounds,
            ..Self::default()
        }
    }

    /// Updates the clip bounds after a mode or scale change.
    ///
    /// Already-accumulated damage is left as is; mode changes damage the
    /// whole output anyway.
    pub fn set_bounds(&mut self, bounds: (i32, i32)) {
        self.bounds = bounds;
    }

    /// The damage accumulated since the last presented frame.
    #[inline]
    #[must_use]
    pub fn current(&self) -> &Region {
        &self.pending
    }

    /// Adds a region of damage, clipped to the output bounds.
    pub fn add(&mut self, region: &Region) {
        let mut clipped = region.clone();
        clipped.intersect_box(self.whole());
        self.pending.union(&clipped);
    }

    /// Adds a single box of damage, clipped to the output bounds.
    pub fn add_box(&mut self, b: Box2) {
        if let Some(clipped) = b.intersection(self.whole()) {
            self.pending.add_box(clipped);
        }
    }

    /// Damages the entire output.
    pub fn add_whole(&mut self) {
        self.pending.clear();
        self.pending.add_box(self.whole());
    }

    /// Computes the region to repaint for a back buffer of the given age,
    /// along with whether a frame is needed at all.
    ///
    /// `None` or an out-of-history age yields the whole output.
    pub(crate) fn render_damage(&self, age: Option<usize>) -> (bool, Region) {
        let needs_frame = !self.pending.is_empty();
        let damage = match age {
            Some(age) if age >= 1 && age <= PREVIOUS_FRAMES + 1 => {
                let mut damage = self.pending.clone();
                for back in 0..age - 1 {
                    let idx = (self.previous_idx + PREVIOUS_FRAMES - 1 - back) % PREVIOUS_FRAMES;
                    damage.union(&self.previous[idx]);
                }
                damage
            }
            _ => Region::from_box(self.whole()),
        };
        (needs_frame, damage)
    }

    /// Records a presented frame: the pending damage becomes the newest
    /// history entry.
    pub(crate) fn rotate(&mut self) {
        self.previous[self.previous_idx] = self.pending.take();
        self.previous_idx = (self.previous_idx + 1) % PREVIOUS_FRAMES;
    }

    fn whole(&self) -> Box2 {
        Box2::new(0, 0, self.bounds.0, self.bounds.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_are_clipped_to_bounds() {
        let mut damage = OutputDamage::new((100, 100));
        damage.add_box(Box2::new(-50, -50, 100, 100));
        assert!(damage.current().covers_box(Box2::new(0, 0, 50, 50)));
        assert_eq!(damage.current().area(), 2500);
    }

    #[test]
    fn fully_offscreen_damage_is_dropped() {
        let mut damage = OutputDamage::new((100, 100));
        damage.add_box(Box2::new(200, 200, 10, 10));
        assert!(damage.current().is_empty());
    }

    #[test]
    fn age_one_repaints_only_pending() {
        let mut damage = OutputDamage::new((100, 100));
        damage.add_box(Box2::new(0, 0, 10, 10));
        let (needs, region) = damage.render_damage(Some(1));
        assert!(needs);
        assert_eq!(region.area(), 100);
    }

    #[test]
    fn age_two_includes_previous_frame() {
        let mut damage = OutputDamage::new((100, 100));
        damage.add_box(Box2::new(0, 0, 10, 10));
        damage.rotate();
        damage.add_box(Box2::new(50, 50, 10, 10));

        let (_, one) = damage.render_damage(Some(1));
        assert_eq!(one.area(), 100);

        let (_, two) = damage.render_damage(Some(2));
        assert!(two.covers_box(Box2::new(0, 0, 10, 10)));
        assert!(two.covers_box(Box2::new(50, 50, 10, 10)));
        assert_eq!(two.area(), 200);
    }

    #[test]
    fn unknown_age_repaints_everything() {
        let mut damage = OutputDamage::new((100, 100));
        damage.add_box(Box2::new(0, 0, 1, 1));
        let (_, region) = damage.render_damage(None);
        assert_eq!(region.area(), 100 * 100);
        let (_, region) = damage.render_damage(Some(0));
        assert_eq!(region.area(), 100 * 100);
        let (_, region) = damage.render_damage(Some(PREVIOUS_FRAMES + 2));
        assert_eq!(region.area(), 100 * 100);
    }

    #[test]
    fn no_pending_damage_needs_no_frame() {
        let damage = OutputDamage::new((100, 100));
        let (needs, _) = damage.render_damage(Some(1));
        assert!(!needs);
    }

    #[test]
    fn rotate_clears_pending() {
        let mut damage = OutputDamage::new((100, 100));
        damage.add_whole();
        damage.rotate();
        assert!(damage.current().is_empty());
    }
}
