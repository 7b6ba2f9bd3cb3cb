//! Frame-by-frame identity assignment
//!
//! Each track is matched to the single nearest gated candidate of the new
//! frame. When several tracks pick the same candidate only the closest one
//! keeps it; the others stay unassigned for this frame and are handed to
//! extrapolation. There is no fall back to a second-nearest candidate.

use crate::bbox::{BoundingBox, GateState};
use crate::config::LabelerConfig;
use crate::frame::RawFrame;
use crate::spatial::SpatialGrid;
use crate::track::{TrackId, TrackSet};
use nalgebra::Point3;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// A track bound to a candidate point of the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub track: TrackId,
    pub candidate: String,
    pub position: Point3<f64>,
    pub distance: f64,
}

/// Outcome of assigning one frame
#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    /// Frame was a trusted fallback frame; no matching was performed
    pub fallback_frame: bool,
    /// Tracks bound through a fallback frame, trusted name or per-frame override
    pub overridden: Vec<TrackId>,
    /// Tracks bound by nearest-neighbor matching
    pub matched: Vec<Match>,
    /// Tracks that received no slot yet and need extrapolation
    pub unassigned: Vec<TrackId>,
    /// Tracks of a fallback frame whose own name had no data; already appended as absent
    pub absent: Vec<TrackId>,
    /// Gate used for this frame
    pub gate: Option<BoundingBox>,
}

/// Nearest-neighbor identity assignment with override handling
pub struct IdentityAssigner<'a> {
    config: &'a LabelerConfig,
    check_position: bool,
}

impl<'a> IdentityAssigner<'a> {
    pub fn new(config: &'a LabelerConfig) -> Self {
        Self {
            config,
            check_position: true,
        }
    }

    /// Accept every awarded candidate without the gate/move-distance check
    pub fn without_position_check(mut self) -> Self {
        self.check_position = false;
        self
    }

    /// Assign the points of `frame` to the tracks.
    ///
    /// Bound tracks get their slot for `frame` appended right away; the
    /// ones listed in [`AssignmentResult::unassigned`] still need one.
    /// `reference` is the frame whose positions the tracks are matched
    /// from, `frame - 1` when `None`. `frame` must be at least 1.
    pub fn assign(
        &self,
        frame: usize,
        raw: &RawFrame,
        tracks: &mut TrackSet,
        gate: &mut GateState,
        reference: Option<usize>,
    ) -> AssignmentResult {
        let previous = frame.saturating_sub(1);
        let reference = reference.unwrap_or(previous);
        let mut result = AssignmentResult::default();

        // Step 1: trusted fallback frame, every track takes its own name
        if self.config.fallback_frames.contains(&frame) {
            log::info!("Hardcoded ground truth applied at frame {frame}");
            result.fallback_frame = true;
            for id in tracks.ids().collect::<Vec<_>>() {
                let track = tracks.get_mut(id);
                let own = track.name.clone();
                match raw.point(&own) {
                    Some(p) => {
                        track.push_observed(&own, p);
                        result.overridden.push(id);
                    }
                    None => {
                        track.push_missing(None);
                        result.absent.push(id);
                    }
                }
            }
            return result;
        }

        // Step 2: trusted names and per-frame overrides
        let mut candidates = raw.clone();
        let mut pending = Vec::with_capacity(tracks.len());
        let overrides = self.config.frame_overrides.get(&frame);
        for id in tracks.ids().collect::<Vec<_>>() {
            let name = tracks.get(id).name.clone();
            let target = if self.config.trusted_names.contains(&name) {
                Some(name.clone())
            } else {
                overrides.and_then(|o| o.get(&name)).cloned()
            };
            let Some(target) = target else {
                pending.push(id);
                continue;
            };

            match candidates.point(&target) {
                Some(p) => {
                    tracks.get_mut(id).push_observed(&target, p);
                    candidates.remove(&target);
                    result.overridden.push(id);
                    log::debug!("Hardcoded binding {name} -> {target} at frame {frame}");
                }
                None => {
                    log::warn!(
                        "Override {name} -> {target} at frame {frame} has no data, extrapolating"
                    );
                    result.unassigned.push(id);
                }
            }
        }

        // Step 3: gate candidates by the previous frame's bounding box
        let reference_points: Vec<Point3<f64>> =
            tracks.iter().filter_map(|t| t.position(previous)).collect();
        let bbox = gate.gate(&reference_points, self.config.gate_threshold);
        result.gate = Some(bbox);

        let (names, points): (Vec<&str>, Vec<Point3<f64>>) = candidates
            .present()
            .filter(|(_, p)| bbox.contains(p))
            .map(|(name, p)| (name, *p))
            .unzip();

        if points.is_empty() {
            log::debug!("No candidate data inside the gate at frame {frame}");
            result.unassigned.extend(pending);
            return result;
        }

        // Step 4: nearest candidate for every remaining track
        let queries: Vec<(TrackId, Point3<f64>)> = pending
            .iter()
            .filter_map(|id| tracks.get(*id).position(reference).map(|p| (*id, p)))
            .collect();
        result.unassigned.extend(
            pending
                .iter()
                .filter(|id| tracks.get(**id).position(reference).is_none()),
        );

        let grid = SpatialGrid::build(&points, self.config.index_cell_size);
        let nearest: Vec<(TrackId, usize, f64)> = queries
            .par_iter()
            .filter_map(|(id, q)| grid.nearest(q).map(|n| (*id, n.index, n.distance)))
            .collect();

        // Step 5: contested candidates go to the closest track only
        let mut contenders: BTreeMap<usize, Vec<(TrackId, f64)>> = BTreeMap::new();
        for (id, candidate, distance) in nearest {
            contenders.entry(candidate).or_default().push((id, distance));
        }

        for (candidate, mut claims) in contenders {
            claims.sort_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then_with(|| tracks.get(a.0).name.cmp(&tracks.get(b.0).name))
            });
            let (winner, distance) = claims[0];
            result.unassigned.extend(claims[1..].iter().map(|(id, _)| *id));

            // Step 6: validity of the award
            let position = points[candidate];
            let was_missing = frame > 0 && tracks.get(winner).is_missing(previous);
            if self.check_position && !self.is_plausible(&bbox, &position, distance, was_missing) {
                result.unassigned.push(winner);
                continue;
            }

            // Step 7: commit
            let track = tracks.get_mut(winner);
            let old = track.binding().to_string();
            let new = names[candidate];
            track.push_observed(new, position);
            if was_missing {
                log::debug!(
                    "Relabeled {old} to {new} at frame {frame}: {} was missing for {} frames",
                    track.name,
                    track.missing_run_before(frame)
                );
            }
            result.matched.push(Match {
                track: winner,
                candidate: new.to_string(),
                position,
                distance,
            });
        }

        result
    }

    /// Candidate inside the gate and within the move limit of the track
    fn is_plausible(
        &self,
        bbox: &BoundingBox,
        position: &Point3<f64>,
        distance: f64,
        was_missing: bool,
    ) -> bool {
        bbox.contains(position) && distance < self.config.move_limit(was_missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};

    fn p(x: f64, y: f64, z: f64) -> Point3<f64> {
        Point3::new(x, y, z)
    }

    fn tracks_at(positions: &[(&str, Point3<f64>)]) -> TrackSet {
        let mut set = TrackSet::new(positions.iter().map(|(n, _)| *n));
        for (name, pos) in positions {
            let id = set.id(name).unwrap();
            set.get_mut(id).push_observed(name, *pos);
        }
        set
    }

    fn config() -> LabelerConfig {
        LabelerConfig {
            move_threshold: 0.05,
            missing_move_threshold: 0.5,
            gate_threshold: 0.1,
            ..Default::default()
        }
    }

    fn assign(cfg: &LabelerConfig, raw: &RawFrame, set: &mut TrackSet) -> AssignmentResult {
        IdentityAssigner::new(cfg).assign(1, raw, set, &mut GateState::new(), None)
    }

    #[test]
    fn test_nearest_assignment_and_far_point() {
        let mut set = tracks_at(&[
            ("A", p(0.0, 0.0, 0.0)),
            ("B", p(1.0, 0.0, 0.0)),
            ("C", p(2.0, 0.0, 0.0)),
        ]);
        let raw: RawFrame = vec![
            ("M1", Some(p(0.01, 0.0, 0.0))),
            ("M2", Some(p(1.01, 0.0, 0.0))),
            ("M3", Some(p(5.0, 0.0, 0.0))),
        ]
        .into_iter()
        .collect();
        let cfg = config();
        let result = assign(&cfg, &raw, &mut set);

        assert_eq!(result.matched.len(), 2);
        assert_eq!(result.unassigned, vec![set.id("C").unwrap()]);
        assert_eq!(set.by_name("A").unwrap().binding(), "M1");
        assert_eq!(set.by_name("B").unwrap().position(1), Some(p(1.01, 0.0, 0.0)));
        // C has no slot yet
        assert_eq!(set.by_name("C").unwrap().len(), 1);
    }

    #[test]
    fn test_conflict_goes_to_nearest_track() {
        let mut set = tracks_at(&[("A", p(0.0, 0.0, 0.0)), ("B", p(0.001, 0.0, 0.0))]);
        let raw: RawFrame = vec![("M1", Some(p(0.0, 0.0, 0.0005)))].into_iter().collect();
        let cfg = config();
        let result = assign(&cfg, &raw, &mut set);

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].track, set.id("A").unwrap());
        assert_eq!(result.unassigned, vec![set.id("B").unwrap()]);
    }

    #[test]
    fn test_exact_tie_goes_to_lowest_name() {
        let mut set = tracks_at(&[("Zed", p(-0.01, 0.0, 0.0)), ("Abe", p(0.01, 0.0, 0.0))]);
        let raw: RawFrame = vec![("M1", Some(p(0.0, 0.0, 0.0)))].into_iter().collect();
        let cfg = config();
        let result = assign(&cfg, &raw, &mut set);
        assert_eq!(result.matched[0].track, set.id("Abe").unwrap());
    }

    #[test]
    fn test_assignment_is_injective() {
        let names = ["A", "B", "C", "D", "E"];
        let start: Vec<(&str, Point3<f64>)> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, p(i as f64 * 0.02, 0.0, 0.0)))
            .collect();
        let mut set = tracks_at(&start);
        // Fewer candidates than tracks, all crowded together
        let raw: RawFrame = (0..3)
            .map(|i| (format!("M{i}"), Some(p(0.03 + i as f64 * 0.001, 0.0, 0.0))))
            .collect();
        let cfg = config();
        let result = assign(&cfg, &raw, &mut set);

        let taken: HashSet<&str> = result.matched.iter().map(|m| m.candidate.as_str()).collect();
        assert_eq!(taken.len(), result.matched.len());
        assert_eq!(result.matched.len() + result.unassigned.len(), names.len());
    }

    #[test]
    fn test_move_threshold_depends_on_missing() {
        let cfg = LabelerConfig {
            gate_threshold: 0.5,
            ..config()
        };
        let raw: RawFrame = vec![("M1", Some(p(0.2, 0.0, 0.0)))].into_iter().collect();

        // Present at frame 0: the 0.2 jump exceeds the normal limit
        let mut set = tracks_at(&[("A", p(0.0, 0.0, 0.0))]);
        let result = assign(&cfg, &raw, &mut set);
        assert!(result.matched.is_empty());
        assert_eq!(result.unassigned, vec![set.id("A").unwrap()]);

        // Missing at frame 0: the same jump is within the post-occlusion limit
        let mut set = TrackSet::new(["A"]);
        let a = set.id("A").unwrap();
        set.get_mut(a).push_missing(Some(p(0.0, 0.0, 0.0)));
        let result = assign(&cfg, &raw, &mut set);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].track, a);
        assert_eq!(set.get(a).binding(), "M1");
    }

    #[test]
    fn test_without_position_check_accepts_jump() {
        let cfg = LabelerConfig {
            gate_threshold: 0.5,
            ..config()
        };
        let mut set = tracks_at(&[("A", p(0.0, 0.0, 0.0))]);
        let raw: RawFrame = vec![("M1", Some(p(0.2, 0.0, 0.0)))].into_iter().collect();
        let result = IdentityAssigner::new(&cfg)
            .without_position_check()
            .assign(1, &raw, &mut set, &mut GateState::new(), None);
        assert_eq!(result.matched.len(), 1);
    }

    #[test]
    fn test_fallback_frame_skips_matching() {
        let cfg = LabelerConfig {
            fallback_frames: [1].into_iter().collect(),
            ..config()
        };
        let mut set = tracks_at(&[("A", p(0.0, 0.0, 0.0)), ("B", p(1.0, 0.0, 0.0))]);
        // A's own name is absent even though a point sits right next to it
        let raw: RawFrame = vec![
            ("A", None),
            ("B", Some(p(1.0, 0.0, 0.0))),
            ("M1", Some(p(0.0, 0.0, 0.001))),
        ]
        .into_iter()
        .collect();
        let result = assign(&cfg, &raw, &mut set);

        assert!(result.fallback_frame);
        assert!(result.matched.is_empty());
        let a = set.by_name("A").unwrap();
        assert_eq!(a.position(1), None);
        assert!(a.is_missing(1));
        assert_eq!(a.len(), 2);
        assert_eq!(set.by_name("B").unwrap().binding(), "B");
    }

    #[test]
    fn test_overrides_bind_and_consume_candidates() {
        let mut overrides = BTreeMap::new();
        overrides.insert(1, BTreeMap::from([("B".to_string(), "M9".to_string())]));
        let cfg = LabelerConfig {
            trusted_names: ["A".to_string()].into_iter().collect(),
            frame_overrides: overrides,
            ..config()
        };
        let mut set = tracks_at(&[
            ("A", p(0.0, 0.0, 0.0)),
            ("B", p(1.0, 0.0, 0.0)),
            ("C", p(1.001, 0.0, 0.0)),
        ]);
        let raw: RawFrame = vec![
            ("A", Some(p(0.002, 0.0, 0.0))),
            ("M9", Some(p(1.0, 0.0, 0.0))),
        ]
        .into_iter()
        .collect();
        let result = assign(&cfg, &raw, &mut set);

        assert_eq!(result.overridden.len(), 2);
        assert_eq!(set.by_name("B").unwrap().binding(), "M9");
        // M9 was consumed by the override, so C finds nothing
        assert_eq!(result.unassigned, vec![set.id("C").unwrap()]);
    }

    #[test]
    fn test_unresolvable_override_falls_to_extrapolation() {
        let mut overrides = BTreeMap::new();
        overrides.insert(1, BTreeMap::from([("A".to_string(), "Gone".to_string())]));
        let cfg = LabelerConfig {
            frame_overrides: overrides,
            ..config()
        };
        let mut set = tracks_at(&[("A", p(0.0, 0.0, 0.0))]);
        let raw: RawFrame = vec![("M1", Some(p(0.0, 0.0, 0.0)))].into_iter().collect();
        let result = assign(&cfg, &raw, &mut set);
        assert!(result.matched.is_empty());
        assert_eq!(result.unassigned, vec![set.id("A").unwrap()]);
    }

    #[test]
    fn test_empty_frame_leaves_everything_unassigned() {
        let cfg = config();
        let mut set = tracks_at(&[("A", p(0.0, 0.0, 0.0)), ("B", p(1.0, 0.0, 0.0))]);
        let result = assign(&cfg, &RawFrame::new(), &mut set);
        assert_eq!(result.unassigned.len(), 2);
        assert!(result.gate.unwrap().is_defined());
    }
}
