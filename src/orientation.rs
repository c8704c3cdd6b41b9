//! EXIF orientation codes and rotation composition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An EXIF orientation code in `1..=8`.
///
/// | code | transform to display upright          |
/// |------|---------------------------------------|
/// | 1    | none                                  |
/// | 2    | mirror horizontally                   |
/// | 3    | rotate 180°                           |
/// | 4    | mirror vertically                     |
/// | 5    | mirror horizontally, rotate 270° CW   |
/// | 6    | rotate 90° CW                         |
/// | 7    | mirror horizontally, rotate 90° CW    |
/// | 8    | rotate 270° CW                        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Orientation(u8);

impl Orientation {
    pub const IDENTITY: Orientation = Orientation(1);

    /// Normalize a raw tag value. Anything outside `1..=8` (including the
    /// invalid `0` some writers emit) reads as identity.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1..=8 => Self(raw as u8),
            _ => Self::IDENTITY,
        }
    }

    pub fn code(self) -> u8 {
        self.0
    }

    /// Clockwise rotation needed to display the image upright.
    pub fn rotation_degrees(self) -> i32 {
        match self.0 {
            3 | 4 => 180,
            6 | 7 => 90,
            5 | 8 => -90,
            _ => 0,
        }
    }

    pub fn is_mirrored(self) -> bool {
        matches!(self.0, 2 | 4 | 5 | 7)
    }

    pub fn rotate(self, delta: RotationDelta) -> Self {
        apply_rotation(self, delta)
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A quarter-turn rotation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationDelta {
    None,
    Clockwise,
    CounterClockwise,
    Half,
}

impl RotationDelta {
    /// Accepts 0, ±90, ±180, 270 and −270. `270` is the same turn as `−90`
    /// and `−270` the same as `+90`.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Self::None),
            90 | -270 => Some(Self::Clockwise),
            -90 | 270 => Some(Self::CounterClockwise),
            180 | -180 => Some(Self::Half),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Clockwise => 90,
            Self::CounterClockwise => -90,
            Self::Half => 180,
        }
    }
}

// Rows: current code 1..=8. Columns: −90°, +90°, 180°.
const ROTATION_TABLE: [[u8; 3]; 8] = [
    [8, 6, 3],
    [5, 7, 4],
    [6, 8, 1],
    [7, 5, 2],
    [4, 2, 7],
    [1, 3, 8],
    [2, 4, 5],
    [3, 1, 6],
];

/// Compose `delta` onto `current`.
pub fn apply_rotation(current: Orientation, delta: RotationDelta) -> Orientation {
    let column = match delta {
        RotationDelta::None => return current,
        RotationDelta::CounterClockwise => 0,
        RotationDelta::Clockwise => 1,
        RotationDelta::Half => 2,
    };
    let row = usize::from(current.code().clamp(1, 8)) - 1;
    Orientation(ROTATION_TABLE[row][column])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_codes() -> impl Iterator<Item = Orientation> {
        (1..=8).map(Orientation::from_raw)
    }

    // ── normalization ────────────────────────────────────────────────

    #[test]
    fn out_of_range_reads_as_identity() {
        assert_eq!(Orientation::from_raw(0), Orientation::IDENTITY);
        assert_eq!(Orientation::from_raw(9), Orientation::IDENTITY);
        assert_eq!(Orientation::from_raw(-3), Orientation::IDENTITY);
        assert_eq!(Orientation::from_raw(6).code(), 6);
    }

    #[test]
    fn delta_parsing() {
        assert_eq!(RotationDelta::from_degrees(270), Some(RotationDelta::CounterClockwise));
        assert_eq!(RotationDelta::from_degrees(-270), Some(RotationDelta::Clockwise));
        assert_eq!(RotationDelta::from_degrees(-180), Some(RotationDelta::Half));
        assert_eq!(RotationDelta::from_degrees(45), None);
        assert_eq!(RotationDelta::from_degrees(360), None);
    }

    // ── composition ──────────────────────────────────────────────────

    #[test]
    fn zero_delta_is_identity() {
        for c in all_codes() {
            assert_eq!(apply_rotation(c, RotationDelta::None), c);
        }
    }

    #[test]
    fn inverse_rotations_cancel() {
        for c in all_codes() {
            let there = apply_rotation(c, RotationDelta::Clockwise);
            assert_eq!(apply_rotation(there, RotationDelta::CounterClockwise), c);
            let back = apply_rotation(c, RotationDelta::CounterClockwise);
            assert_eq!(apply_rotation(back, RotationDelta::Clockwise), c);
        }
    }

    #[test]
    fn two_quarter_turns_equal_half_turn() {
        for c in all_codes() {
            let twice = apply_rotation(apply_rotation(c, RotationDelta::Clockwise), RotationDelta::Clockwise);
            assert_eq!(twice, apply_rotation(c, RotationDelta::Half), "code {c}");
        }
    }

    #[test]
    fn four_quarter_turns_return_home() {
        for c in all_codes() {
            let mut o = c;
            for _ in 0..4 {
                o = o.rotate(RotationDelta::Clockwise);
            }
            assert_eq!(o, c);
        }
    }

    #[test]
    fn rotation_preserves_mirroring() {
        for c in all_codes() {
            for d in [RotationDelta::Clockwise, RotationDelta::CounterClockwise, RotationDelta::Half] {
                assert_eq!(apply_rotation(c, d).is_mirrored(), c.is_mirrored());
            }
        }
    }

    #[test]
    fn rotation_sequence_from_six() {
        let o = Orientation::from_raw(6);
        let o = o.rotate(RotationDelta::Clockwise);
        assert_eq!(o.code(), 3);
        let o = o.rotate(RotationDelta::Clockwise);
        assert_eq!(o.code(), 8);
        let o = o.rotate(RotationDelta::CounterClockwise);
        assert_eq!(o.code(), 3);
    }

    #[test]
    fn rotation_degrees_match_codes() {
        assert_eq!(Orientation::from_raw(1).rotation_degrees(), 0);
        assert_eq!(Orientation::from_raw(6).rotation_degrees(), 90);
        assert_eq!(Orientation::from_raw(3).rotation_degrees(), 180);
        assert_eq!(Orientation::from_raw(8).rotation_degrees(), -90);
        assert!(Orientation::from_raw(7).is_mirrored());
        assert!(!Orientation::from_raw(6).is_mirrored());
    }
}
