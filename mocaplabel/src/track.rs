//! Persistent marker tracks and the registry that owns them

use crate::bbox::BoundingBox;
use crate::skeleton;
use nalgebra::{Point3, Vector3};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Handle of a track inside its [`TrackSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackId(pub usize);

/// Full time series of one physical marker.
///
/// Holds one position slot per processed frame. A slot is an observed
/// point, an extrapolated point (frame listed in `missing`), or `None`
/// when nothing could be derived.
#[derive(Debug, Clone, Serialize)]
pub struct MarkerTrack {
    /// canonical name, stable for the whole run
    pub name: String,
    positions: Vec<Option<Point3<f64>>>,
    /// transient name the track was bound to at each frame
    bindings: Vec<String>,
    missing: BTreeSet<usize>,
    /// frame -> transient name, for every frame where the binding changed
    relabels: BTreeMap<usize, String>,
    pub(crate) parent: Option<TrackId>,
    pub(crate) child: Option<TrackId>,
}

impl MarkerTrack {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            positions: Vec::new(),
            bindings: Vec::new(),
            missing: BTreeSet::new(),
            relabels: BTreeMap::new(),
            parent: None,
            child: None,
        }
    }

    /// Number of frames recorded so far
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position at `frame`; `None` when absent or outside the recorded range
    pub fn position(&self, frame: usize) -> Option<Point3<f64>> {
        self.positions.get(frame).copied().flatten()
    }

    /// Position at a frame that may lie before the recording (`frame - 1` at frame 0)
    pub fn position_at(&self, frame: Option<usize>) -> Option<Point3<f64>> {
        frame.and_then(|f| self.position(f))
    }

    pub fn positions(&self) -> &[Option<Point3<f64>>] {
        &self.positions
    }

    /// Transient name the track is currently bound to
    pub fn binding(&self) -> &str {
        self.bindings.last().map(String::as_str).unwrap_or(&self.name)
    }

    pub fn name_at(&self, frame: usize) -> Option<&str> {
        self.bindings.get(frame).map(String::as_str)
    }

    /// Whether the binding at `frame` differs from the one at `frame - 1`
    pub fn is_relabeled_at(&self, frame: usize) -> bool {
        frame > 0 && self.relabels.contains_key(&frame)
    }

    /// (frame, transient name) for every re-binding, frame 0 included
    pub fn relabels(&self) -> &BTreeMap<usize, String> {
        &self.relabels
    }

    pub fn is_missing(&self, frame: usize) -> bool {
        self.missing.contains(&frame)
    }

    pub fn missing_frames(&self) -> &BTreeSet<usize> {
        &self.missing
    }

    /// Number of consecutive missing frames directly before `frame`
    pub fn missing_run_before(&self, frame: usize) -> usize {
        (0..frame).rev().take_while(|f| self.is_missing(*f)).count()
    }

    pub fn parent(&self) -> Option<TrackId> {
        self.parent
    }

    pub fn child(&self) -> Option<TrackId> {
        self.child
    }

    /// Append an observed position bound to transient name `binding`
    pub fn push_observed(&mut self, binding: &str, position: Point3<f64>) {
        self.push_slot(binding.to_string(), Some(position), false);
    }

    /// Append an extrapolated (or absent) position; keeps the current binding
    pub fn push_missing(&mut self, position: Option<Point3<f64>>) {
        let binding = self.binding().to_string();
        self.push_slot(binding, position, true);
    }

    fn push_slot(&mut self, binding: String, position: Option<Point3<f64>>, missing: bool) {
        let frame = self.positions.len();
        if frame == 0 || self.bindings[frame - 1] != binding {
            self.relabels.insert(frame, binding.clone());
        }
        self.positions.push(position);
        self.bindings.push(binding);
        if missing {
            self.missing.insert(frame);
        }
    }

    /// Drop the most recent frame, restoring the binding that preceded it
    pub fn pop_frame(&mut self) -> Option<Option<Point3<f64>>> {
        let position = self.positions.pop()?;
        let frame = self.positions.len();
        self.bindings.pop();
        self.relabels.remove(&frame);
        self.missing.remove(&frame);
        Some(position)
    }

    /// Snapshot of everything stored for one frame
    pub fn slot(&self, frame: usize) -> Option<FrameSlot> {
        Some(FrameSlot {
            position: *self.positions.get(frame)?,
            binding: self.bindings.get(frame)?.clone(),
            missing: self.is_missing(frame),
        })
    }

    /// Overwrite the data of an already recorded frame.
    /// Only the slot of `frame` changes; the relabel log is kept consistent
    /// with the neighbouring frames.
    pub(crate) fn replace_slot(&mut self, frame: usize, slot: FrameSlot) {
        if frame >= self.positions.len() {
            return;
        }
        self.positions[frame] = slot.position;
        self.bindings[frame] = slot.binding;
        if slot.missing {
            self.missing.insert(frame);
        } else {
            self.missing.remove(&frame);
        }
        self.refresh_relabel(frame);
        if frame + 1 < self.bindings.len() {
            self.refresh_relabel(frame + 1);
        }
    }

    fn refresh_relabel(&mut self, frame: usize) {
        if frame == 0 || self.bindings[frame] != self.bindings[frame - 1] {
            self.relabels.insert(frame, self.bindings[frame].clone());
        } else {
            self.relabels.remove(&frame);
        }
    }

    /// Mean over all frames with a position
    pub fn mean_position(&self) -> Option<Point3<f64>> {
        let (sum, count) = self
            .positions
            .iter()
            .flatten()
            .fold((Vector3::zeros(), 0usize), |(sum, n), p| (sum + p.coords, n + 1));
        (count > 0).then(|| Point3::from(sum / count as f64))
    }

    /// Bounding box of the whole recorded history
    pub fn extent(&self) -> BoundingBox {
        BoundingBox::from_points(self.positions.iter().flatten())
    }
}

/// Everything a track stores for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSlot {
    pub position: Option<Point3<f64>>,
    pub binding: String,
    pub missing: bool,
}

/// Fixed registry of tracks, one per canonical name.
///
/// Parent/child links are [`TrackId`] handles into this registry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackSet {
    tracks: Vec<MarkerTrack>,
    #[serde(skip)]
    index: HashMap<String, TrackId>,
}

impl TrackSet {
    /// One track per name; repeated names are kept once
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = TrackSet::default();
        for name in names {
            let name = name.into();
            if set.index.contains_key(&name) {
                log::warn!("Duplicate canonical marker name {name} ignored");
                continue;
            }
            set.index.insert(name.clone(), TrackId(set.tracks.len()));
            set.tracks.push(MarkerTrack::new(name));
        }
        set
    }

    /// Resolve parent/child handles through the skeleton table.
    /// Relations pointing at names without a track stay unset.
    pub fn link_skeleton(&mut self) {
        for i in 0..self.tracks.len() {
            let name = self.tracks[i].name.clone();
            let parent = self.relative(&name, skeleton::parent(&name));
            let child = self.relative(&name, skeleton::child(&name));
            self.tracks[i].parent = parent;
            self.tracks[i].child = child;
        }
    }

    fn relative(&self, name: &str, relative: Option<&str>) -> Option<TrackId> {
        let relative = relative?;
        let id = self.id(relative);
        if id.is_none() {
            log::warn!("Skeleton relative {relative} of {name} is not a tracked marker");
        }
        id
    }

    pub fn id(&self, name: &str) -> Option<TrackId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, id: TrackId) -> &MarkerTrack {
        &self.tracks[id.0]
    }

    pub fn get_mut(&mut self, id: TrackId) -> &mut MarkerTrack {
        &mut self.tracks[id.0]
    }

    pub fn by_name(&self, name: &str) -> Option<&MarkerTrack> {
        self.id(name).map(|id| self.get(id))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn ids(&self) -> impl Iterator<Item = TrackId> {
        (0..self.tracks.len()).map(TrackId)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerTrack> {
        self.tracks.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tracks.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Frames processed so far (all tracks have equal length)
    pub fn frames(&self) -> usize {
        self.tracks.first().map_or(0, MarkerTrack::len)
    }

    /// Exchange the data two tracks hold for `frame`. Swapping twice restores both.
    pub fn swap_frame(&mut self, frame: usize, a: TrackId, b: TrackId) {
        if a == b {
            return;
        }
        let (Some(slot_a), Some(slot_b)) = (self.get(a).slot(frame), self.get(b).slot(frame)) else {
            return;
        };
        self.get_mut(a).replace_slot(frame, slot_b);
        self.get_mut(b).replace_slot(frame, slot_a);
    }

    /// Undo the most recent frame on every track
    pub fn pop_frame(&mut self) {
        for track in &mut self.tracks {
            track.pop_frame();
        }
    }
}
