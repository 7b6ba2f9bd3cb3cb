//! Configuration for the labeling run
//!
//! All distances are in the capture device's unit (meters for the hand
//! recordings the defaults were tuned on).

use crate::error::{LabelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Configuration for marker identity resolution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Canonical marker names. Empty means: infer from the device names
    pub marker_names: Vec<String>,
    /// Device names dropped from every frame before labeling
    pub ignored_names: BTreeSet<String>,
    /// Per-frame hardcoded bindings: frame -> {canonical -> transient}
    pub frame_overrides: BTreeMap<usize, BTreeMap<String, String>>,
    /// Frames where every transient name is trusted to equal its canonical name
    pub fallback_frames: BTreeSet<usize>,
    /// Canonical names that are correctly labeled throughout the recording
    pub trusted_names: BTreeSet<String>,
    /// Maximum distance a marker may move between two observed frames
    pub move_threshold: f64,
    /// Maximum distance a marker may jump when it was missing in the previous frame
    pub missing_move_threshold: f64,
    /// Expansion of the previous frame's bounding box used to gate candidates
    pub gate_threshold: f64,
    /// Bone-to-bone distance under which two finger bones count as crossed
    pub crossover_threshold: f64,
    /// Bend angle (rad) at the third finger marker considered anatomically implausible
    pub backwards_tip_threshold: f64,
    /// Link tracks through the skeleton and extrapolate from relatives
    pub use_skeleton: bool,
    /// Run the finger crossover and backwards-tip repairs
    pub check_hand_heuristics: bool,
    /// Negate the x coordinate of every incoming point
    pub mirror_x: bool,
    /// Prefix the capture device uses for names it generated itself
    pub auto_name_prefix: String,
    /// Cell size of the per-frame nearest-neighbor grid
    pub index_cell_size: f64,
    /// Log progress every N frames (0 disables)
    pub progress_interval: usize,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            marker_names: Vec::new(),
            ignored_names: BTreeSet::new(),
            frame_overrides: BTreeMap::new(),
            fallback_frames: BTreeSet::new(),
            trusted_names: BTreeSet::new(),
            move_threshold: 0.015,
            missing_move_threshold: 0.03,
            gate_threshold: 0.03,
            crossover_threshold: 0.005,
            backwards_tip_threshold: 2.0,
            use_skeleton: true,
            check_hand_heuristics: false,
            mirror_x: false,
            auto_name_prefix: "Marker".to_string(),
            index_cell_size: 0.03,
            progress_interval: 1000,
        }
    }
}

impl LabelerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject thresholds the assignment and repair stages cannot work with
    pub fn validate(&self) -> Result<()> {
        let distances = [
            ("move_threshold", self.move_threshold),
            ("missing_move_threshold", self.missing_move_threshold),
            ("gate_threshold", self.gate_threshold),
            ("crossover_threshold", self.crossover_threshold),
            ("index_cell_size", self.index_cell_size),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value <= 0.0 {
                return Err(LabelError::config(format!(
                    "{name} must be a positive finite distance, got {value}"
                )));
            }
        }

        if self.missing_move_threshold < self.move_threshold {
            return Err(LabelError::config(format!(
                "missing_move_threshold ({}) must not be smaller than move_threshold ({})",
                self.missing_move_threshold, self.move_threshold
            )));
        }

        let tip = self.backwards_tip_threshold;
        if !(tip > 0.0 && tip <= std::f64::consts::PI) {
            return Err(LabelError::config(format!(
                "backwards_tip_threshold must be in (0, pi], got {tip}"
            )));
        }

        Ok(())
    }

    /// Distance limit for a track depending on whether it was missing in the reference frame
    pub fn move_limit(&self, was_missing: bool) -> f64 {
        if was_missing {
            self.missing_move_threshold
        } else {
            self.move_threshold
        }
    }
}
