//! Anatomical repairs for hand recordings
//!
//! Pure nearest-neighbor matching swaps identities when two fingers pass
//! close to each other or when a fingertip curls back over its middle
//! segment. These repairs detect such frames from the bone geometry and
//! exchange the affected tracks' data for that single frame.
//!
//! Only valid for the `Hands_<hand>_<finger><segment>` schema of
//! [`crate::skeleton`]; use [`schema_recognized`] before running them.

use crate::geometry::{angle_between, segment_distance};
use crate::skeleton::{finger_marker, FINGERS, FINGER_PAIRS};
use crate::track::{TrackId, TrackSet};
use nalgebra::Point3;

/// Why a pair of tracks was swapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapReason {
    /// Same-segment bones of neighbouring fingers crossed
    Crossover,
    /// Tip bone of one finger crossed the middle bone of its neighbour
    Diagonal,
    /// Knuckle bones crossed and the whole finger sits on the wrong side
    Knuckle,
    /// Fingertip bent back onto the third segment
    BackwardsTip,
}

/// A single-frame exchange of two tracks' data
#[derive(Debug, Clone, PartialEq)]
pub struct Swap {
    pub frame: usize,
    pub a: TrackId,
    pub b: TrackId,
    pub reason: SwapReason,
}

/// Whether every marker touched by the repairs exists in `tracks`
pub fn schema_recognized(tracks: &TrackSet) -> bool {
    FINGERS.iter().all(|finger| {
        (2..=4).all(|segment| tracks.contains(&finger_marker(finger, segment)))
    })
}

/// Track handles of one finger
#[derive(Debug, Clone, Copy)]
struct Digit {
    knuckle: Option<TrackId>,
    s2: TrackId,
    s3: TrackId,
    s4: TrackId,
}

impl Digit {
    fn resolve(tracks: &TrackSet, finger: &str) -> Option<Self> {
        Some(Self {
            knuckle: tracks.id(&finger_marker(finger, 1)),
            s2: tracks.id(&finger_marker(finger, 2))?,
            s3: tracks.id(&finger_marker(finger, 3))?,
            s4: tracks.id(&finger_marker(finger, 4))?,
        })
    }
}

/// A pair of tracks to exchange and the reason for it
type Exchange = (TrackId, TrackId, SwapReason);

/// Crossover and backwards-tip repair
pub struct AnatomicalCorrector {
    crossover_threshold: f64,
    backwards_tip_threshold: f64,
}

impl AnatomicalCorrector {
    pub fn new(crossover_threshold: f64, backwards_tip_threshold: f64) -> Self {
        Self {
            crossover_threshold,
            backwards_tip_threshold,
        }
    }

    /// Run both repairs on `frame`; returns the swaps performed
    pub fn correct(&self, tracks: &mut TrackSet, frame: usize) -> Vec<Swap> {
        let mut swaps = Vec::new();
        self.repair_crossovers(tracks, frame, &mut swaps);
        self.repair_backwards_tips(tracks, frame, &mut swaps);
        swaps
    }

    /// Check every adjacent finger pair for crossed bones
    pub fn repair_crossovers(&self, tracks: &mut TrackSet, frame: usize, swaps: &mut Vec<Swap>) {
        for (first, second) in FINGER_PAIRS {
            if let Some((r, l)) = digit_pair(tracks, first, second) {
                let exchanges = self.pair_exchanges(tracks, frame, r, l);
                apply(tracks, frame, exchanges, swaps);
            }
        }
        for (first, second) in FINGER_PAIRS {
            if let Some((r, l)) = digit_pair(tracks, first, second) {
                let exchanges = self.diagonal_exchanges(tracks, frame, r, l);
                apply(tracks, frame, exchanges, swaps);
            }
        }
    }

    /// Same-segment crossings between fingers `r` and `l`
    fn pair_exchanges(&self, tracks: &TrackSet, frame: usize, r: Digit, l: Digit) -> Vec<Exchange> {
        let bones = |markers| bone_distance(tracks, frame, markers);
        let d34 = bones([r.s3, r.s4, l.s3, l.s4]);
        let d23 = bones([r.s2, r.s3, l.s2, l.s3]);

        if self.crossed(d34) {
            if self.crossed(d23) {
                // both outer bones crossed: the third markers are exchanged
                let helps = self.separated(bones([r.s2, l.s3, l.s2, r.s3]))
                    && self.separated(bones([l.s3, r.s4, r.s3, l.s4]));
                if helps {
                    return vec![(r.s3, l.s3, SwapReason::Crossover)];
                }
            } else if self.separated(bones([r.s3, l.s4, l.s3, r.s4])) {
                return vec![(r.s4, l.s4, SwapReason::Crossover)];
            }
            return Vec::new();
        }

        if self.crossed(d23) {
            if self.separated(bones([r.s2, l.s3, l.s2, r.s3])) {
                return vec![
                    (r.s3, l.s3, SwapReason::Crossover),
                    (r.s4, l.s4, SwapReason::Crossover),
                ];
            }
            return Vec::new();
        }

        let (Some(r1), Some(l1)) = (r.knuckle, l.knuckle) else {
            return Vec::new();
        };
        if !self.crossed(bones([r1, r.s2, l1, l.s2])) {
            return Vec::new();
        }
        // the first finger of a pair lies at the larger x
        let segments = [(r.s2, l.s2), (r.s3, l.s3), (r.s4, l.s4)];
        let x = |id: TrackId| tracks.get(id).position(frame).map(|p| p.x);
        let wrong_side = segments
            .iter()
            .all(|&(a, b)| matches!((x(a), x(b)), (Some(xa), Some(xb)) if xa < xb));
        if !wrong_side {
            return Vec::new();
        }
        segments
            .iter()
            .map(|&(a, b)| (a, b, SwapReason::Knuckle))
            .collect()
    }

    /// Tip or middle bone of one finger crossing the neighbouring segment of the other
    fn diagonal_exchanges(
        &self,
        tracks: &TrackSet,
        frame: usize,
        r: Digit,
        l: Digit,
    ) -> Vec<Exchange> {
        let bones = |markers| bone_distance(tracks, frame, markers);

        if self.crossed(bones([l.s3, l.s4, r.s2, r.s3])) {
            if self.separated(bones([l.s3, r.s3, r.s2, l.s4])) {
                return vec![(r.s3, l.s4, SwapReason::Diagonal)];
            }
        } else if self.crossed(bones([l.s2, l.s3, r.s3, r.s4]))
            && self.separated(bones([l.s2, r.s4, r.s3, l.s3]))
        {
            return vec![(l.s3, r.s4, SwapReason::Diagonal)];
        }
        Vec::new()
    }

    /// Swap third and fourth markers of every finger whose tip bends back
    pub fn repair_backwards_tips(
        &self,
        tracks: &mut TrackSet,
        frame: usize,
        swaps: &mut Vec<Swap>,
    ) {
        for finger in FINGERS {
            let Some(digit) = Digit::resolve(tracks, finger) else {
                continue;
            };
            let positions = [digit.s2, digit.s3, digit.s4].map(|id| tracks.get(id).position(frame));
            let [Some(m2), Some(m3), Some(m4)] = positions else {
                continue;
            };

            if self.is_backwards(&m2, &m3, &m4) && !self.is_backwards(&m2, &m4, &m3) {
                let tip = vec![(digit.s3, digit.s4, SwapReason::BackwardsTip)];
                apply(tracks, frame, tip, swaps);
            }
        }
    }

    /// Bend at `middle` between bones `base-middle` and `middle-tip` is implausible
    fn is_backwards(&self, base: &Point3<f64>, middle: &Point3<f64>, tip: &Point3<f64>) -> bool {
        angle_between(&(middle - base), &(tip - middle)) >= self.backwards_tip_threshold
    }

    fn crossed(&self, distance: Option<f64>) -> bool {
        distance.is_some_and(|d| d <= self.crossover_threshold)
    }

    fn separated(&self, distance: Option<f64>) -> bool {
        distance.is_some_and(|d| d > self.crossover_threshold)
    }
}

fn digit_pair(tracks: &TrackSet, first: &str, second: &str) -> Option<(Digit, Digit)> {
    Some((Digit::resolve(tracks, first)?, Digit::resolve(tracks, second)?))
}

/// Distance between bones `m[0]-m[1]` and `m[2]-m[3]`; `None` if any marker is absent
fn bone_distance(tracks: &TrackSet, frame: usize, markers: [TrackId; 4]) -> Option<f64> {
    let [a, b, c, d] = markers.map(|id| tracks.get(id).position(frame));
    Some(segment_distance(&a?, &b?, &c?, &d?, false))
}

fn apply(tracks: &mut TrackSet, frame: usize, exchanges: Vec<Exchange>, swaps: &mut Vec<Swap>) {
    for (a, b, reason) in exchanges {
        tracks.swap_frame(frame, a, b);
        log::debug!(
            "Swapped {} and {} at frame {frame} ({reason:?})",
            tracks.get(a).name,
            tracks.get(b).name
        );
        swaps.push(Swap { frame, a, b, reason });
    }
}
