//! Raw per-frame point clouds and the sources that provide them

use crate::error::{LabelError, Result};
use nalgebra::Point3;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Leading `Frame,Time` columns of a data row
const LEADING_COLUMNS: usize = 2;

/// One frame of the capture device: transient name -> position, `None` when
/// the device reported the name without a coordinate.
///
/// Ordered by transient name so every traversal is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    points: BTreeMap<String, Option<Point3<f64>>>,
}

impl RawFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, point: Option<Point3<f64>>) {
        self.points.insert(name.into(), point);
    }

    /// Position reported under `name`; `None` if absent or not reported at all
    pub fn point(&self, name: &str) -> Option<Point3<f64>> {
        self.points.get(name).copied().flatten()
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.points.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Option<Point3<f64>>> {
        self.points.remove(name)
    }

    /// Drop every name in `ignored`
    pub fn retain_not_ignored(&mut self, ignored: &BTreeSet<String>) {
        if !ignored.is_empty() {
            self.points.retain(|name, _| !ignored.contains(name));
        }
    }

    /// Negate the x coordinate of every point
    pub fn mirror_x(&mut self) {
        for p in self.points.values_mut().flatten() {
            p.x = -p.x;
        }
    }

    /// Names with a coordinate, in name order
    pub fn present(&self) -> impl Iterator<Item = (&str, &Point3<f64>)> {
        self.points
            .iter()
            .filter_map(|(name, p)| p.as_ref().map(|p| (name.as_str(), p)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Option<Point3<f64>>)> for RawFrame {
    fn from_iter<I: IntoIterator<Item = (S, Option<Point3<f64>>)>>(iter: I) -> Self {
        let mut frame = RawFrame::new();
        for (name, point) in iter {
            frame.insert(name, point);
        }
        frame
    }
}

/// Source of raw frames for one recording.
///
/// Frames may be produced in any order or in parallel; the labeler applies
/// them strictly in sequence.
pub trait FrameSource {
    /// Every transient name the device can emit, in column order
    fn marker_names(&self) -> &[String];

    fn frame_count(&self) -> usize;

    fn frame(&self, index: usize) -> anyhow::Result<RawFrame>;
}

/// Fully parsed recording held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecording {
    names: Vec<String>,
    frames: Vec<RawFrame>,
}

impl InMemoryRecording {
    pub fn new(names: Vec<String>, frames: Vec<RawFrame>) -> Self {
        Self { names, frames }
    }

    /// Parse data rows (`Frame,Time,x,y,z,...`) in parallel.
    /// A single malformed row rejects the whole recording.
    pub fn from_rows<S: AsRef<str> + Sync>(names: Vec<String>, rows: &[S]) -> Result<Self> {
        if rows.is_empty() {
            return Err(LabelError::EmptyRecording);
        }

        let frames = rows
            .par_iter()
            .enumerate()
            .map(|(row, line)| parse_row(line.as_ref(), &names, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { names, frames })
    }

    pub fn frames(&self) -> &[RawFrame] {
        &self.frames
    }
}

impl FrameSource for InMemoryRecording {
    fn marker_names(&self) -> &[String] {
        &self.names
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, index: usize) -> anyhow::Result<RawFrame> {
        self.frames
            .get(index)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("frame {index} out of range ({} frames)", self.frames.len())
            })
    }
}

/// Parse one data row into a frame.
///
/// Rows are comma separated; when the comma split yields too few columns
/// the row is retried as tab separated. Empty cells mark an absent point.
/// Columns beyond the expected count are tolerated only when empty.
pub fn parse_row(line: &str, names: &[String], row: usize) -> Result<RawFrame> {
    let expected = LEADING_COLUMNS + 3 * names.len();

    let mut cells: Vec<&str> = line.split(',').collect();
    if cells.len() < expected {
        cells = line.split('\t').collect();
    }
    if cells.len() < expected || cells[expected..].iter().any(|c| !c.trim().is_empty()) {
        return Err(LabelError::malformed_row(row, expected, cells.len()));
    }

    let mut frame = RawFrame::new();
    for (i, name) in names.iter().enumerate() {
        let column = LEADING_COLUMNS + 3 * i;
        let xyz = &cells[column..column + 3];
        if xyz[0].trim().is_empty() {
            frame.insert(name.clone(), None);
            continue;
        }

        let mut coords = [0.0; 3];
        for (axis, cell) in xyz.iter().enumerate() {
            coords[axis] = cell
                .trim()
                .parse::<f64>()
                .map_err(|_| LabelError::InvalidCoordinate {
                    row,
                    column: column + axis,
                    value: cell.to_string(),
                })?;
        }
        frame.insert(name.clone(), Some(Point3::from(coords)));
    }
    Ok(frame)
}
