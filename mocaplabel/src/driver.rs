//! Sequential frame driver tying assignment, extrapolation and repair together

use crate::assign::IdentityAssigner;
use crate::bbox::GateState;
use crate::config::LabelerConfig;
use crate::correction::{schema_recognized, AnatomicalCorrector};
use crate::error::{LabelError, Result};
use crate::export::LabeledRecording;
use crate::extrapolate::ExtrapolationEngine;
use crate::frame::{FrameSource, RawFrame};
use crate::track::{TrackId, TrackSet};
use anyhow::Context;
use std::collections::BTreeSet;

/// Summary of one processed frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub frame: usize,
    /// Frame bound every track to its own name (frame 0 or a fallback frame)
    pub fallback_frame: bool,
    /// Tracks bound by nearest-neighbor matching
    pub assigned: usize,
    /// Tracks bound by name (trusted names, overrides, fallback frames)
    pub overridden: usize,
    /// Tracks flagged missing at this frame
    pub extrapolated: usize,
    /// Summed distance the tracks moved from the previous frame
    pub displacement: f64,
    /// Corrective swaps applied after assignment
    pub swaps: usize,
}

/// Labels a recording frame by frame.
///
/// Frames must be applied strictly in order; each frame's gate and
/// plausibility checks depend on the committed state of the previous one.
pub struct MarkerLabeler {
    config: LabelerConfig,
    tracks: TrackSet,
    gate: GateState,
    extrapolator: ExtrapolationEngine,
    corrector: Option<AnatomicalCorrector>,
    check_position: bool,
}

impl MarkerLabeler {
    /// Build the track set from the configuration and the names the
    /// capture device can emit.
    pub fn new(config: LabelerConfig, device_names: &[String]) -> Result<Self> {
        config.validate()?;

        let names = canonical_names(&config, device_names);
        if names.is_empty() {
            return Err(LabelError::NoMarkers);
        }
        if !device_names.is_empty() {
            let device: BTreeSet<&str> = device_names.iter().map(String::as_str).collect();
            for name in names.iter().filter(|n| !device.contains(n.as_str())) {
                log::warn!("Marker {name} is not emitted by the capture device");
            }
        }

        let mut tracks = TrackSet::new(names);
        if config.use_skeleton {
            tracks.link_skeleton();
        }

        let corrector = if !config.check_hand_heuristics {
            None
        } else if schema_recognized(&tracks) {
            Some(AnatomicalCorrector::new(
                config.crossover_threshold,
                config.backwards_tip_threshold,
            ))
        } else {
            log::warn!("Finger crossover checks not possible, marker names not recognized");
            None
        };

        Ok(Self {
            extrapolator: ExtrapolationEngine::new(config.use_skeleton),
            config,
            tracks,
            gate: GateState::new(),
            corrector,
            check_position: true,
        })
    }

    /// Accept every nearest-neighbor award without the gate/move-distance check
    pub fn without_position_check(mut self) -> Self {
        self.check_position = false;
        self
    }

    pub fn config(&self) -> &LabelerConfig {
        &self.config
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    /// Number of frames applied so far
    pub fn frames(&self) -> usize {
        self.tracks.frames()
    }

    /// Whether the anatomical repairs run on each frame
    pub fn corrects_hands(&self) -> bool {
        self.corrector.is_some()
    }

    /// Apply frame `index`, which must directly follow the last applied frame
    pub fn process_frame(&mut self, index: usize, mut raw: RawFrame) -> Result<FrameReport> {
        let expected = self.tracks.frames();
        if index != expected {
            return Err(LabelError::FrameOutOfOrder { expected, got: index });
        }

        raw.retain_not_ignored(&self.config.ignored_names);
        if self.config.mirror_x {
            raw.mirror_x();
        }

        let report = if index == 0 {
            self.init_first_frame(&raw)
        } else {
            self.label_frame(index, &raw)
        };

        log::debug!(
            "Frame {index}: {} assigned, {} overridden, {} extrapolated, displacement {:.4}",
            report.assigned,
            report.overridden,
            report.extrapolated,
            report.displacement
        );
        Ok(report)
    }

    /// Frame 0 has no history: every track takes its own name
    fn init_first_frame(&mut self, raw: &RawFrame) -> FrameReport {
        let mut report = FrameReport {
            fallback_frame: true,
            ..Default::default()
        };
        for id in self.tracks.ids().collect::<Vec<_>>() {
            let track = self.tracks.get_mut(id);
            let own = track.name.clone();
            match raw.point(&own) {
                Some(p) => {
                    track.push_observed(&own, p);
                    report.overridden += 1;
                }
                None => {
                    track.push_missing(None);
                    report.extrapolated += 1;
                }
            }
        }
        report
    }

    fn label_frame(&mut self, index: usize, raw: &RawFrame) -> FrameReport {
        let previous = index - 1;
        let mut assigner = IdentityAssigner::new(&self.config);
        if !self.check_position {
            assigner = assigner.without_position_check();
        }
        let result = assigner.assign(index, raw, &mut self.tracks, &mut self.gate, None);

        let mut report = FrameReport {
            frame: index,
            fallback_frame: result.fallback_frame,
            assigned: result.matched.len(),
            overridden: result.overridden.len(),
            extrapolated: result.unassigned.len() + result.absent.len(),
            displacement: result.matched.iter().map(|m| m.distance).sum(),
            swaps: 0,
        };
        report.displacement += moved_by_name(&self.tracks, &result.overridden, index);
        report.displacement += self
            .extrapolator
            .fill(&mut self.tracks, &result.unassigned, index, previous);

        if !result.fallback_frame {
            if let Some(corrector) = &self.corrector {
                report.swaps = corrector.correct(&mut self.tracks, index).len();
            }
        }
        report
    }

    /// Remove the most recent frame from every track.
    ///
    /// The gate keeps its last valid box; it only widens the search for the
    /// re-applied frame.
    pub fn undo_last_frame(&mut self) -> bool {
        if self.tracks.frames() == 0 {
            return false;
        }
        self.tracks.pop_frame();
        true
    }

    /// Pull every remaining frame from `source` and apply it
    pub fn run(&mut self, source: &dyn FrameSource) -> anyhow::Result<()> {
        let total = source.frame_count();
        let start = self.tracks.frames();
        log::info!("Labeling {} markers over frames {start}..{total}", self.tracks.len());

        let mut extrapolated = 0usize;
        for index in start..total {
            let raw = source
                .frame(index)
                .with_context(|| format!("reading frame {index}"))?;
            let report = self.process_frame(index, raw)?;
            extrapolated += report.extrapolated;

            let interval = self.config.progress_interval;
            if interval > 0 && index % interval == 0 {
                log::info!("Frame {index} / {total}");
            }
        }

        log::info!(
            "Labeled {} frames, {extrapolated} marker slots extrapolated",
            total.saturating_sub(start)
        );
        Ok(())
    }

    /// Hand over the labeled tracks
    pub fn finish(self) -> LabeledRecording {
        LabeledRecording::new(self.tracks)
    }
}

/// Label a whole recording in one call
pub fn label(config: LabelerConfig, source: &dyn FrameSource) -> anyhow::Result<LabeledRecording> {
    let mut labeler = MarkerLabeler::new(config, source.marker_names())?;
    labeler.run(source)?;
    Ok(labeler.finish())
}

/// Canonical names to track: the configured list, or every device name the
/// device did not generate itself. Ignored names are never tracked.
fn canonical_names(config: &LabelerConfig, device_names: &[String]) -> Vec<String> {
    if !config.marker_names.is_empty() {
        return config
            .marker_names
            .iter()
            .filter(|n| !config.ignored_names.contains(*n))
            .cloned()
            .collect();
    }

    let inferred: Vec<String> = device_names
        .iter()
        .filter(|n| !n.starts_with(&config.auto_name_prefix) && !config.ignored_names.contains(*n))
        .cloned()
        .collect();
    log::info!("Inferred the following marker names: {inferred:?}");
    inferred
}

/// Distance moved by tracks that were bound by name at `frame`
fn moved_by_name(tracks: &TrackSet, ids: &[TrackId], frame: usize) -> f64 {
    ids.iter()
        .filter_map(|id| {
            let track = tracks.get(*id);
            track.position(frame).zip(track.position(frame - 1))
        })
        .map(|(now, before)| (now - before).norm())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::InMemoryRecording;
    use crate::skeleton::{finger_marker, FINGERS};
    use approx::assert_abs_diff_eq;
    use nalgebra::Point3;
    use std::collections::BTreeMap;

    fn p(x: f64, y: f64, z: f64) -> Point3<f64> {
        Point3::new(x, y, z)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn frame(points: &[(&str, Option<Point3<f64>>)]) -> RawFrame {
        points.iter().map(|(n, p)| (*n, *p)).collect()
    }

    fn config() -> LabelerConfig {
        LabelerConfig {
            marker_names: names(&["A", "B", "C"]),
            move_threshold: 0.05,
            missing_move_threshold: 0.5,
            gate_threshold: 0.1,
            ..Default::default()
        }
    }

    fn start(labeler: &mut MarkerLabeler) {
        let first = frame(&[
            ("A", Some(p(0.0, 0.0, 0.0))),
            ("B", Some(p(1.0, 0.0, 0.0))),
            ("C", Some(p(2.0, 0.0, 0.0))),
        ]);
        labeler.process_frame(0, first).unwrap();
    }

    #[test]
    fn test_end_to_end_scenario() {
        let device = names(&["A", "B", "C", "M1", "M2", "M3"]);
        let mut labeler = MarkerLabeler::new(config(), &device).unwrap();
        start(&mut labeler);

        let second = frame(&[
            ("M1", Some(p(0.01, 0.0, 0.0))),
            ("M2", Some(p(1.01, 0.0, 0.0))),
            ("M3", Some(p(5.0, 0.0, 0.0))),
        ]);
        let report = labeler.process_frame(1, second).unwrap();
        assert_eq!(report.assigned, 2);
        assert_eq!(report.extrapolated, 1);
        assert_abs_diff_eq!(report.displacement, 0.02, epsilon = 1e-12);

        let tracks = labeler.tracks();
        assert_eq!(tracks.by_name("A").unwrap().binding(), "M1");
        assert_eq!(tracks.by_name("B").unwrap().position(1), Some(p(1.01, 0.0, 0.0)));
        let c = tracks.by_name("C").unwrap();
        assert_eq!(c.position(1), Some(p(2.0, 0.0, 0.0)));
        assert!(c.is_missing(1));
        assert_eq!(labeler.frames(), 2);
    }

    #[test]
    fn test_out_of_order_frame_rejected() {
        let mut labeler = MarkerLabeler::new(config(), &[]).unwrap();
        let err = labeler.process_frame(1, RawFrame::new()).unwrap_err();
        assert!(matches!(err, LabelError::FrameOutOfOrder { expected: 0, got: 1 }));
    }

    #[test]
    fn test_absent_at_first_frame() {
        let mut labeler = MarkerLabeler::new(config(), &[]).unwrap();
        let report = labeler
            .process_frame(0, frame(&[("A", Some(p(0.0, 0.0, 0.0))), ("B", None)]))
            .unwrap();
        assert_eq!(report.overridden, 1);
        assert_eq!(report.extrapolated, 2);
        let b = labeler.tracks().by_name("B").unwrap();
        assert_eq!(b.position(0), None);
        assert!(b.is_missing(0));
    }

    #[test]
    fn test_fallback_frame_uses_own_names() {
        let cfg = LabelerConfig {
            fallback_frames: [1].into_iter().collect(),
            ..config()
        };
        let mut labeler = MarkerLabeler::new(cfg, &[]).unwrap();
        start(&mut labeler);

        // B and C swapped their transient names; the fallback frame trusts the names anyway
        let second = frame(&[
            ("A", Some(p(0.0, 0.0, 0.0))),
            ("B", Some(p(2.0, 0.0, 0.0))),
            ("C", None),
        ]);
        let report = labeler.process_frame(1, second).unwrap();
        assert!(report.fallback_frame);
        assert_eq!(report.overridden, 2);
        assert_eq!(report.extrapolated, 1);
        assert_eq!(labeler.tracks().by_name("B").unwrap().position(1), Some(p(2.0, 0.0, 0.0)));
        assert_eq!(labeler.tracks().by_name("C").unwrap().position(1), None);
    }

    #[test]
    fn test_undo_last_frame() {
        let mut labeler = MarkerLabeler::new(config(), &[]).unwrap();
        start(&mut labeler);
        let second = frame(&[("M1", Some(p(0.01, 0.0, 0.0)))]);
        labeler.process_frame(1, second.clone()).unwrap();

        assert!(labeler.undo_last_frame());
        assert_eq!(labeler.frames(), 1);
        assert_eq!(labeler.tracks().by_name("A").unwrap().binding(), "A");

        // the frame can be applied again
        labeler.process_frame(1, second).unwrap();
        assert_eq!(labeler.tracks().by_name("A").unwrap().binding(), "M1");

        labeler.undo_last_frame();
        labeler.undo_last_frame();
        assert!(!labeler.undo_last_frame());
    }

    #[test]
    fn test_names_inferred_and_ignored() {
        let cfg = LabelerConfig {
            ignored_names: ["Ref".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let device = names(&["Hands_R_I1", "Ref", "Marker1", "Marker2", "Hands_R_I2"]);
        let labeler = MarkerLabeler::new(cfg, &device).unwrap();
        assert_eq!(
            labeler.tracks().names().collect::<Vec<_>>(),
            vec!["Hands_R_I1", "Hands_R_I2"]
        );
        // linked through the skeleton
        let i2 = labeler.tracks().by_name("Hands_R_I2").unwrap();
        assert_eq!(i2.parent(), labeler.tracks().id("Hands_R_I1"));
    }

    #[test]
    fn test_no_markers_is_an_error() {
        let device = names(&["Marker1", "Marker2"]);
        let err = MarkerLabeler::new(LabelerConfig::default(), &device).err().unwrap();
        assert!(matches!(err, LabelError::NoMarkers));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = LabelerConfig {
            gate_threshold: -1.0,
            ..config()
        };
        assert!(matches!(
            MarkerLabeler::new(cfg, &[]).err().unwrap(),
            LabelError::Config(_)
        ));
    }

    #[test]
    fn test_heuristics_need_hand_schema() {
        let cfg = LabelerConfig {
            check_hand_heuristics: true,
            ..config()
        };
        let labeler = MarkerLabeler::new(cfg, &[]).unwrap();
        assert!(!labeler.corrects_hands());
    }

    #[test]
    fn test_ignored_and_mirrored_input() {
        let cfg = LabelerConfig {
            marker_names: names(&["A"]),
            ignored_names: ["Noise".to_string()].into_iter().collect(),
            mirror_x: true,
            ..config()
        };
        let mut labeler = MarkerLabeler::new(cfg, &[]).unwrap();
        labeler
            .process_frame(0, frame(&[("A", Some(p(0.5, 0.0, 0.0)))]))
            .unwrap();
        // the ignored point sits closer to A than the real one
        let report = labeler
            .process_frame(
                1,
                frame(&[
                    ("Noise", Some(p(-0.5, 0.0, 0.0))),
                    ("M1", Some(p(0.51, 0.0, 0.0))),
                ]),
            )
            .unwrap();
        assert_eq!(report.assigned, 1);
        let a = labeler.tracks().by_name("A").unwrap();
        assert_eq!(a.position(0), Some(p(-0.5, 0.0, 0.0)));
        assert_eq!(a.position(1), Some(p(-0.51, 0.0, 0.0)));
        assert_eq!(a.binding(), "M1");
    }

    #[test]
    fn test_overrides_through_driver() {
        let mut overrides = BTreeMap::new();
        overrides.insert(1, BTreeMap::from([("A".to_string(), "Far".to_string())]));
        let cfg = LabelerConfig {
            frame_overrides: overrides,
            ..config()
        };
        let mut labeler = MarkerLabeler::new(cfg, &[]).unwrap();
        start(&mut labeler);
        let report = labeler
            .process_frame(1, frame(&[("Far", Some(p(0.5, 0.0, 0.0)))]))
            .unwrap();
        assert_eq!(report.overridden, 1);
        assert_eq!(labeler.tracks().by_name("A").unwrap().binding(), "Far");
        assert_abs_diff_eq!(report.displacement, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_run_over_source() {
        let rows = [
            "0,0.00,0,0,0,1,0,0,2,0,0",
            "1,0.01,0.01,0,0,1.01,0,0,,,",
            "2,0.02,0.02,0,0,1.02,0,0,2,0,0",
        ];
        let rec = InMemoryRecording::from_rows(names(&["A", "B", "C"]), &rows).unwrap();
        let cfg = LabelerConfig {
            marker_names: Vec::new(),
            ..config()
        };
        let recording = label(cfg, &rec).unwrap();
        assert_eq!(recording.frames(), 3);
        assert_eq!(recording.names(), vec!["A", "B", "C"]);
        let c = recording.track("C").unwrap();
        assert!(c.is_missing(1));
        assert!(!c.is_missing(2));
        assert_eq!(c.position(2), Some(p(2.0, 0.0, 0.0)));
    }

    /// Both hands laid out flat: finger `i` at x = 0.02 i, segments along y
    fn hand_pose() -> Vec<(String, Point3<f64>)> {
        let mut pose = Vec::new();
        for (i, finger) in FINGERS.iter().enumerate() {
            for segment in 1..=4u8 {
                let y = (segment as f64 - 2.0) * 0.025;
                pose.push((finger_marker(finger, segment), p(i as f64 * 0.02, y, 0.0)));
            }
        }
        pose
    }

    #[test]
    fn test_crossed_override_repaired_on_hand_recording() {
        let pose = hand_pose();
        let all: Vec<String> = pose.iter().map(|(n, _)| n.clone()).collect();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            1,
            BTreeMap::from([
                ("Hands_R_M4".to_string(), "Hands_R_I4".to_string()),
                ("Hands_R_I4".to_string(), "Hands_R_M4".to_string()),
            ]),
        );
        let config = LabelerConfig {
            marker_names: all.clone(),
            check_hand_heuristics: true,
            frame_overrides: overrides,
            ..Default::default()
        };
        let mut labeler = MarkerLabeler::new(config, &all).unwrap();
        assert!(labeler.corrects_hands());

        let raw = || pose.iter().map(|(n, p)| (n.as_str(), Some(*p))).collect::<RawFrame>();
        labeler.process_frame(0, raw()).unwrap();
        let report = labeler.process_frame(1, raw()).unwrap();

        assert_eq!(report.overridden, 2);
        assert_eq!(report.swaps, 1);
        let m4 = labeler.tracks().by_name("Hands_R_M4").unwrap();
        assert_eq!(m4.position(1), Some(p(0.04, 0.05, 0.0)));
        assert_eq!(m4.name_at(1), Some("Hands_R_M4"));
        let i4 = labeler.tracks().by_name("Hands_R_I4").unwrap();
        assert_eq!(i4.position(1), Some(p(0.02, 0.05, 0.0)));
    }
}
