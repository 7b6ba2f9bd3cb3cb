//! Position estimates for markers that could not be assigned

use crate::track::{TrackId, TrackSet};
use nalgebra::Point3;

/// Fills unassigned tracks from their skeleton relatives.
///
/// The offset from parent (and child) to the marker at the reference
/// frame is carried over to the relatives' positions at the current frame.
/// With both relatives available the two estimates are averaged; with
/// neither the marker keeps its previous position.
pub struct ExtrapolationEngine {
    use_skeleton: bool,
}

impl ExtrapolationEngine {
    pub fn new(use_skeleton: bool) -> Self {
        Self { use_skeleton }
    }

    /// Estimated position of `id` at `frame` from reference frame `reference`
    pub fn estimate(
        &self,
        tracks: &TrackSet,
        id: TrackId,
        frame: usize,
        reference: usize,
    ) -> Option<Point3<f64>> {
        let track = tracks.get(id);
        let own = track.position(reference);

        let mut from_relatives = Vec::with_capacity(2);
        if self.use_skeleton {
            for relative in [track.parent(), track.child()].into_iter().flatten() {
                let relative = tracks.get(relative);
                let offset = own.zip(relative.position(reference)).map(|(o, r)| o - r);
                let estimate = offset.zip(relative.position(frame)).map(|(v, now)| now + v);
                from_relatives.extend(estimate);
            }
        }

        match from_relatives.as_slice() {
            [a, b] => Some(Point3::from((a.coords + b.coords) / 2.0)),
            [single] => Some(*single),
            _ => track.position_at(frame.checked_sub(1)),
        }
    }

    /// Append an extrapolated slot for every track in `ids`, flagged missing.
    ///
    /// Tracks are filled in canonical name order so that a parent filled in
    /// this pass is available to its children. Returns the summed distance
    /// between each estimate and its reference position.
    pub fn fill(
        &self,
        tracks: &mut TrackSet,
        ids: &[TrackId],
        frame: usize,
        reference: usize,
    ) -> f64 {
        let mut order = ids.to_vec();
        order.sort_by(|a, b| tracks.get(*a).name.cmp(&tracks.get(*b).name));
        order.dedup();

        let mut displacement = 0.0;
        for id in order {
            if tracks.get(id).len() != frame {
                // already holds a slot for this frame
                continue;
            }
            let estimate = self.estimate(tracks, id, frame, reference);
            if let Some((now, before)) = estimate.zip(tracks.get(id).position(reference)) {
                displacement += (now - before).norm();
            }
            tracks.get_mut(id).push_missing(estimate);
        }
        displacement
    }
}
