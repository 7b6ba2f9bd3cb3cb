//! Axis-aligned 3D bounding boxes and the per-frame spatial gate

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Initial minimum of an undefined box. Larger than any real coordinate.
pub const UNDEFINED_MIN: f64 = 10_000_000.0;
/// Initial maximum of an undefined box. Smaller than any real coordinate.
pub const UNDEFINED_MAX: f64 = -10_000_000.0;

/// Axis-aligned bounding box.
///
/// An undefined box keeps its min at [`UNDEFINED_MIN`] and its max at
/// [`UNDEFINED_MAX`], so comparisons stay well-formed and nothing is
/// contained in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    pub const UNDEFINED: BoundingBox = BoundingBox {
        min: [UNDEFINED_MIN; 3],
        max: [UNDEFINED_MAX; 3],
    };

    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Box around all given points, [`BoundingBox::UNDEFINED`] if there are none
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3<f64>>,
    {
        let mut bbox = Self::UNDEFINED;
        for p in points {
            bbox.include(p);
        }
        bbox
    }

    pub fn include(&mut self, p: &Point3<f64>) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    pub fn is_defined(&self) -> bool {
        (0..3).all(|axis| self.min[axis] <= self.max[axis])
    }

    /// Grow the box by `margin` on all six sides
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: self.min.map(|v| v - margin),
            max: self.max.map(|v| v + margin),
        }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|axis| p[axis] >= self.min[axis] && p[axis] <= self.max[axis])
    }

    pub fn width(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f64 {
        self.max[1] - self.min[1]
    }

    pub fn depth(&self) -> f64 {
        self.max[2] - self.min[2]
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BoundingBox([{}, {}, {}] .. [{}, {}, {}])",
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2]
        )
    }
}

/// Admissible region for candidate points, carried from frame to frame.
///
/// Remembers the last box computed from live markers so that a frame
/// without any positioned track still has something to gate against.
#[derive(Debug, Clone, Default)]
pub struct GateState {
    last_valid: Option<BoundingBox>,
}

impl GateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate for the current frame: the box around `reference` (the track
    /// positions one frame back) grown by `margin`. Falls back to the last
    /// valid box when `reference` is empty; stays undefined if there never
    /// was one.
    pub fn gate<'a, I>(&mut self, reference: I, margin: f64) -> BoundingBox
    where
        I: IntoIterator<Item = &'a Point3<f64>>,
    {
        let bbox = BoundingBox::from_points(reference);
        if bbox.is_defined() {
            self.last_valid = Some(bbox);
            bbox.expanded(margin)
        } else {
            match self.last_valid {
                Some(last) => last.expanded(margin),
                None => BoundingBox::UNDEFINED,
            }
        }
    }

    pub fn last_valid(&self) -> Option<BoundingBox> {
        self.last_valid
    }
}
