// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer box math and 3×3 matrices.
//!
//! [`Box2`] is the integer rectangle the scene graph works in: node
//! footprints, output viewports, and damage rectangles. [`Mat3`] covers the
//! small set of matrix operations the render path needs (projection for an
//! output, projecting a destination box through a transform) without pulling
//! in a linear-algebra crate.
//!
//! The one subtle operation is [`Box2::scale`]: the far edge is computed
//! from the rounded far coordinate rather than by rounding the width, so
//! that adjacent boxes stay adjacent after scaling by a fractional factor.

use core::ops::Mul;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::transform::Transform;

/// An axis-aligned integer rectangle.
///
/// A box with non-positive width or height is *empty*: it intersects
/// nothing and occupies no pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Box2 {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Box2 {
    /// The empty box at the origin.
    pub const ZERO: Self = Self {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    /// Creates a box from position and size.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns whether this box is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns the area in pixels, zero for empty boxes.
    #[inline]
    #[must_use]
    pub const fn area(self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// Returns the box moved by `(dx, dy)`.
    #[inline]
    #[must_use]
    pub const fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    /// Returns the intersection of two boxes, or `None` if it is empty.
    #[must_use]
    pub fn intersection(self, other: Self) -> Option<Self> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let result = Self::new(x1, y1, x2 - x1, y2 - y1);
        if result.is_empty() { None } else { Some(result) }
    }

    /// Returns whether the two boxes overlap on a non-empty area.
    #[inline]
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.intersection(other).is_some()
    }

    /// Scales the box by `scale`, preserving pixel coverage.
    ///
    /// Both far edges are derived from the rounded far coordinate
    /// (`round((pos + len) * scale) - round(pos * scale)`), so horizontally
    /// or vertically adjacent boxes remain adjacent after scaling — rounding
    /// the width independently would open gaps at fractional scales.
    #[must_use]
    pub fn scale(self, scale: f32) -> Self {
        let scale = f64::from(scale);
        Self {
            x: (f64::from(self.x) * scale).round() as i32,
            y: (f64::from(self.y) * scale).round() as i32,
            width: scale_length(self.width, self.x, scale),
            height: scale_length(self.height, self.y, scale),
        }
    }

    /// Remaps the box by `transform` within a space of `width` × `height`.
    ///
    /// `width` and `height` are the dimensions of the space the box lives in
    /// *before* transforming.
    #[must_use]
    pub fn transform(self, transform: Transform, width: i32, height: i32) -> Self {
        let (w, h) = if transform.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        let (x, y) = match transform {
            Transform::Normal => (self.x, self.y),
            Transform::Rotate90 => (height - self.y - self.height, self.x),
            Transform::Rotate180 => (
                width - self.x - self.width,
                height - self.y - self.height,
            ),
            Transform::Rotate270 => (self.y, width - self.x - self.width),
            Transform::Flipped => (width - self.x - self.width, self.y),
            Transform::Flipped90 => (
                height - self.y - self.height,
                width - self.x - self.width,
            ),
            Transform::Flipped180 => (self.x, height - self.y - self.height),
            Transform::Flipped270 => (self.y, self.x),
        };
        Self::new(x, y, w, h)
    }
}

/// Scales one axis of a box so the far edge lands on the rounded far
/// coordinate.
fn scale_length(length: i32, offset: i32, scale: f64) -> i32 {
    (f64::from(offset + length) * scale).round() as i32 - (f64::from(offset) * scale).round() as i32
}

/// A row-major 3×3 matrix of `f32`.
///
/// Layout matches the convention GPU renderers expect for 2-D quads:
/// `[m00, m01, m02, m10, m11, m12, m20, m21, m22]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3(pub [f32; 9]);

impl Mat3 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// The 2-D matrix for an output transform.
    #[must_use]
    pub const fn from_transform(transform: Transform) -> Self {
        #[rustfmt::skip]
        let m = match transform {
            Transform::Normal =>     [ 1.0,  0.0, 0.0,  0.0,  1.0, 0.0, 0.0, 0.0, 1.0],
            Transform::Rotate90 =>   [ 0.0,  1.0, 0.0, -1.0,  0.0, 0.0, 0.0, 0.0, 1.0],
            Transform::Rotate180 =>  [-1.0,  0.0, 0.0,  0.0, -1.0, 0.0, 0.0, 0.0, 1.0],
            Transform::Rotate270 =>  [ 0.0, -1.0, 0.0,  1.0,  0.0, 0.0, 0.0, 0.0, 1.0],
            Transform::Flipped =>    [-1.0,  0.0, 0.0,  0.0,  1.0, 0.0, 0.0, 0.0, 1.0],
            Transform::Flipped90 =>  [ 0.0,  1.0, 0.0,  1.0,  0.0, 0.0, 0.0, 0.0, 1.0],
            Transform::Flipped180 => [ 1.0,  0.0, 0.0,  0.0, -1.0, 0.0, 0.0, 0.0, 1.0],
            Transform::Flipped270 => [ 0.0, -1.0, 0.0, -1.0,  0.0, 0.0, 0.0, 0.0, 1.0],
        };
        Self(m)
    }

    /// The projection matrix for an output of `width` × `height` physical
    /// pixels under `transform`.
    ///
    /// Maps output-buffer coordinates into clip space: the top-left pixel
    /// lands at `(-1, 1)` and the bottom-right at `(1, -1)` for the normal
    /// transform.
    #[must_use]
    pub fn projection(width: i32, height: i32, transform: Transform) -> Self {
        let t = Self::from_transform(transform).0;
        let x = 2.0 / width as f32;
        let y = 2.0 / height as f32;

        let mut m = [0.0_f32; 9];
        // Rotation + reflection.
        m[0] = x * t[0];
        m[1] = x * t[1];
        m[3] = y * -t[3];
        m[4] = y * -t[4];
        // Translation.
        m[2] = -sign(m[0] + m[1]);
        m[5] = -sign(m[3] + m[4]);
        m[8] = 1.0;
        Self(m)
    }

    /// Projects `dst` through `transform` (about the box center) and the
    /// output `projection`, producing the matrix a quad is drawn with.
    #[must_use]
    pub fn project_box(dst: Box2, transform: Transform, projection: &Self) -> Self {
        let mut m = Self::IDENTITY
            .translate(dst.x as f32, dst.y as f32)
            .scaled(dst.width as f32, dst.height as f32);
        if transform != Transform::Normal {
            m = m
                .translate(0.5, 0.5)
                .mul(Self::from_transform(transform))
                .translate(-0.5, -0.5);
        }
        projection.mul(m)
    }

    /// Returns `self` followed by a translation.
    #[must_use]
    pub fn translate(self, x: f32, y: f32) -> Self {
        self.mul(Self([1.0, 0.0, x, 0.0, 1.0, y, 0.0, 0.0, 1.0]))
    }

    /// Returns `self` followed by a non-uniform scale.
    #[must_use]
    pub fn scaled(self, x: f32, y: f32) -> Self {
        self.mul(Self([x, 0.0, 0.0, 0.0, y, 0.0, 0.0, 0.0, 1.0]))
    }
}

impl Mul for Mat3 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [0.0_f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a[row * 3] * b[col]
                    + a[row * 3 + 1] * b[3 + col]
                    + a[row * 3 + 2] * b[6 + col];
            }
        }
        Self(out)
    }
}

fn sign(v: f32) -> f32 {
    if v < 0.0 { -1.0 } else { 1.0 }
}
