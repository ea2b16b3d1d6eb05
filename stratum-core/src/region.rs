// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel regions as disjoint rectangle sets.
//!
//! A [`Region`] is the set-of-pixels type used for damage: rectangles are
//! kept pairwise disjoint so iteration visits every covered pixel exactly
//! once (a scissored clear or draw per rectangle touches each pixel once).
//! The representation is not canonical — two regions covering the same
//! pixels may hold different rectangle lists — so comparisons go through
//! [`covers`](Region::covers) / [`same_coverage`](Region::same_coverage).

use alloc::vec::Vec;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::geometry::Box2;
use crate::transform::Transform;

/// A set of pixels, stored as disjoint rectangles.
#[derive(Clone, Debug, Default)]
pub struct Region {
    rects: Vec<Box2>,
}

impl Region {
    /// Creates an empty region.
    #[must_use]
    pub const fn new() -> Self {
        Self { rects: Vec::new() }
    }

    /// Creates a region covering a single box.
    #[must_use]
    pub fn from_box(b: Box2) -> Self {
        let mut region = Self::new();
        region.add_box(b);
        region
    }

    /// Returns whether the region covers no pixels.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The disjoint rectangles making up the region.
    #[inline]
    #[must_use]
    pub fn rects(&self) -> &[Box2] {
        &self.rects
    }

    /// Total number of covered pixels.
    #[must_use]
    pub fn area(&self) -> i64 {
        self.rects.iter().map(|r| r.area()).sum()
    }

    /// The bounding box of the region, [`Box2::ZERO`] when empty.
    #[must_use]
    pub fn extents(&self) -> Box2 {
        let Some(first) = self.rects.first() else {
            return Box2::ZERO;
        };
        let mut x1 = first.x;
        let mut y1 = first.y;
        let mut x2 = first.x + first.width;
        let mut y2 = first.y + first.height;
        for r in &self.rects[1..] {
            x1 = x1.min(r.x);
            y1 = y1.min(r.y);
            x2 = x2.max(r.x + r.width);
            y2 = y2.max(r.y + r.height);
        }
        Box2::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Removes all pixels.
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Returns the region, leaving an empty one behind.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            rects: core::mem::take(&mut self.rects),
        }
    }

    /// Adds the pixels of `b` to the region.
    pub fn add_box(&mut self, b: Box2) {
        if b.is_empty() {
            return;
        }
        // Keep only the parts of `b` not already covered, so rectangles
        // stay disjoint.
        let mut fragments = Vec::new();
        fragments.push(b);
        for &existing in &self.rects {
            let mut next = Vec::new();
            for frag in fragments {
                box_subtract(frag, existing, &mut next);
            }
            fragments = next;
            if fragments.is_empty() {
                return;
            }
        }
        self.rects.extend(fragments);
    }

    /// Adds every pixel of `other`.
    pub fn union(&mut self, other: &Self) {
        for &b in &other.rects {
            self.add_box(b);
        }
    }

    /// Removes the pixels of `b`.
    pub fn subtract_box(&mut self, b: Box2) {
        if b.is_empty() || self.rects.is_empty() {
            return;
        }
        let old = core::mem::take(&mut self.rects);
        for r in old {
            box_subtract(r, b, &mut self.rects);
        }
    }

    /// Removes every pixel of `other`.
    pub fn subtract(&mut self, other: &Self) {
        for &b in &other.rects {
            self.subtract_box(b);
        }
    }

    /// Clips the region to `b` in place.
    pub fn intersect_box(&mut self, b: Box2) {
        self.rects.retain_mut(|r| match r.intersection(b) {
            Some(clipped) => {
                *r = clipped;
                true
            }
            None => false,
        });
    }

    /// Returns the part of the region inside `b`.
    #[must_use]
    pub fn intersection(&self, b: Box2) -> Self {
        let mut out = self.clone();
        out.intersect_box(b);
        out
    }

    /// Moves every rectangle by `(dx, dy)`.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        for r in &mut self.rects {
            *r = r.translated(dx, dy);
        }
    }

    /// Returns the region scaled per axis, rounding outward so coverage is
    /// never lost.
    #[must_use]
    pub fn scaled_xy(&self, sx: f64, sy: f64) -> Self {
        let mut out = Self::new();
        for r in &self.rects {
            let x1 = (f64::from(r.x) * sx).floor() as i32;
            let y1 = (f64::from(r.y) * sy).floor() as i32;
            let x2 = (f64::from(r.x + r.width) * sx).ceil() as i32;
            let y2 = (f64::from(r.y + r.height) * sy).ceil() as i32;
            out.add_box(Box2::new(x1, y1, x2 - x1, y2 - y1));
        }
        out
    }

    /// Returns the region remapped by `transform` within a `width` ×
    /// `height` space (see [`Box2::transform`]).
    #[must_use]
    pub fn transformed(&self, transform: Transform, width: i32, height: i32) -> Self {
        Self {
            rects: self
                .rects
                .iter()
                .map(|r| r.transform(transform, width, height))
                .collect(),
        }
    }

    /// Returns whether every pixel of `b` is in the region.
    #[must_use]
    pub fn covers_box(&self, b: Box2) -> bool {
        if b.is_empty() {
            return true;
        }
        let mut fragments = Vec::new();
        fragments.push(b);
        for &r in &self.rects {
            let mut next = Vec::new();
            for frag in fragments {
                box_subtract(frag, r, &mut next);
            }
            fragments = next;
            if fragments.is_empty() {
                return true;
            }
        }
        false
    }

    /// Returns whether every pixel of `other` is in the region.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.rects.iter().all(|&r| self.covers_box(r))
    }

    /// Returns whether the two regions cover exactly the same pixels.
    #[must_use]
    pub fn same_coverage(&self, other: &Self) -> bool {
        self.covers(other) && other.covers(self)
    }
}

/// Pushes the up-to-four pieces of `a` not covered by `b` onto `out`.
fn box_subtract(a: Box2, b: Box2, out: &mut Vec<Box2>) {
    let Some(i) = a.intersection(b) else {
        out.push(a);
        return;
    };
    // Top strip.
    if i.y > a.y {
        out.push(Box2::new(a.x, a.y, a.width, i.y - a.y));
    }
    // Bottom strip.
    let a_bottom = a.y + a.height;
    let i_bottom = i.y + i.height;
    if a_bottom > i_bottom {
        out.push(Box2::new(a.x, i_bottom, a.width, a_bottom - i_bottom));
    }
    // Left and right strips, limited to the intersection's vertical span.
    if i.x > a.x {
        out.push(Box2::new(a.x, i.y, i.x - a.x, i.height));
    }
    let a_right = a.x + a.width;
    let i_right = i.x + i.width;
    if a_right > i_right {
        out.push(Box2::new(i_right, i.y, a_right - i_right, i.height));
    }
}
