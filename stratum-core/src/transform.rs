// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Output transforms.
//!
//! A [`Transform`] is one of the eight discrete orientations a display (or a
//! buffer within the scene) can take: the identity, rotations by 90°, 180°
//! and 270°, and the mirrored variant of each. The discriminants follow the
//! Wayland `wl_output.transform` encoding, where bit 0 marks the
//! 90°-rotation family and bit 2 marks mirroring.

/// One of the eight discrete output orientations.
///
/// Rotations are counter-clockwise. The flipped variants mirror along the
/// vertical axis before rotating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Transform {
    /// No transform.
    #[default]
    Normal = 0,
    /// Rotated by 90°.
    Rotate90 = 1,
    /// Rotated by 180°.
    Rotate180 = 2,
    /// Rotated by 270°.
    Rotate270 = 3,
    /// Mirrored along the vertical axis.
    Flipped = 4,
    /// Mirrored, then rotated by 90°.
    Flipped90 = 5,
    /// Mirrored, then rotated by 180°.
    Flipped180 = 6,
    /// Mirrored, then rotated by 270°.
    Flipped270 = 7,
}

impl Transform {
    /// All eight transforms, in encoding order.
    pub const ALL: [Self; 8] = [
        Self::Normal,
        Self::Rotate90,
        Self::Rotate180,
        Self::Rotate270,
        Self::Flipped,
        Self::Flipped90,
        Self::Flipped180,
        Self::Flipped270,
    ];

    /// Returns whether this transform swaps width and height.
    ///
    /// True for the 90° and 270° families (odd discriminants).
    #[inline]
    #[must_use]
    pub const fn swaps_dimensions(self) -> bool {
        (self as u8) & 1 != 0
    }

    /// Returns whether this transform mirrors.
    #[inline]
    #[must_use]
    pub const fn is_flipped(self) -> bool {
        (self as u8) & 4 != 0
    }

    /// Returns the transform that undoes this one.
    ///
    /// Pure rotations by 90° and 270° are each other's inverse; every other
    /// transform is its own inverse.
    #[must_use]
    pub const fn invert(self) -> Self {
        match self {
            Self::Rotate90 => Self::Rotate270,
            Self::Rotate270 => Self::Rotate90,
            other => other,
        }
    }
}
