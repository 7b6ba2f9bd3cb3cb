//! Labeled output handed to writers and viewers

use crate::error::Result;
use crate::track::{MarkerTrack, TrackSet};
use nalgebra::Point3;
use ndarray::{Array2, Array3};
use serde::Serialize;

/// A marker at one frame, with the ends of its bones
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub name: String,
    pub position: Option<Point3<f64>>,
    pub parent_position: Option<Point3<f64>>,
    pub child_position: Option<Point3<f64>>,
    pub missing: bool,
}

/// Complete labeling result, tracks in canonical order
#[derive(Debug, Clone, Serialize)]
pub struct LabeledRecording {
    tracks: TrackSet,
}

impl LabeledRecording {
    pub fn new(tracks: TrackSet) -> Self {
        Self { tracks }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tracks.names().collect()
    }

    pub fn frames(&self) -> usize {
        self.tracks.frames()
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    pub fn track(&self, name: &str) -> Option<&MarkerTrack> {
        self.tracks.by_name(name)
    }

    /// Positions as frames x tracks x 3, NaN where absent
    pub fn positions(&self) -> Array3<f64> {
        let mut out = Array3::from_elem((self.frames(), self.tracks.len(), 3), f64::NAN);
        for (t, track) in self.tracks.iter().enumerate() {
            for (f, p) in track.positions().iter().enumerate() {
                if let Some(p) = p {
                    for axis in 0..3 {
                        out[[f, t, axis]] = p[axis];
                    }
                }
            }
        }
        out
    }

    /// `true` where a slot was extrapolated rather than observed
    pub fn missing_mask(&self) -> Array2<bool> {
        let mut mask = Array2::from_elem((self.frames(), self.tracks.len()), false);
        for (t, track) in self.tracks.iter().enumerate() {
            for &f in track.missing_frames() {
                if f < mask.nrows() {
                    mask[[f, t]] = true;
                }
            }
        }
        mask
    }

    /// Every marker at `frame` together with its skeleton relatives
    pub fn frame_view(&self, frame: usize) -> Vec<MarkerView> {
        self.tracks
            .iter()
            .map(|track| MarkerView {
                name: track.name.clone(),
                position: track.position(frame),
                parent_position: track.parent().and_then(|id| self.tracks.get(id).position(frame)),
                child_position: track.child().and_then(|id| self.tracks.get(id).position(frame)),
                missing: track.is_missing(frame),
            })
            .collect()
    }

    /// Identity changes between `frame - 1` and `frame`
    pub fn relabel_log(&self, frame: usize) -> Vec<String> {
        self.tracks
            .iter()
            .filter(|track| track.is_relabeled_at(frame))
            .filter_map(|track| {
                let old = track.name_at(frame - 1)?;
                let new = track.name_at(frame)?;
                Some(format!("{}: {old} -> {new}", track.name))
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
