//! Marker identity resolution for optical motion capture
//!
//! The capture device hands out transient names that change whenever a
//! marker is occluded and reappears. This crate re-binds every frame's
//! points to a fixed set of canonical markers, fills gaps from skeleton
//! relatives and repairs finger crossovers on hand recordings.
//!
//! ```rust,ignore
//! use mocaplabel::{label, InMemoryRecording, LabelerConfig};
//!
//! let recording = InMemoryRecording::from_rows(names, &rows)?;
//! let config = LabelerConfig::from_json_file("labeler.json")?;
//! let labeled = label(config, &recording)?;
//! let positions = labeled.positions(); // frames x markers x 3
//! ```

pub mod assign;
pub mod bbox;
pub mod config;
pub mod correction;
pub mod driver;
pub mod error;
pub mod export;
pub mod extrapolate;
pub mod frame;
pub mod geometry;
pub mod skeleton;
pub mod spatial; // per-frame nearest-neighbor grid
pub mod track;

pub use assign::{AssignmentResult, IdentityAssigner, Match};
pub use bbox::{BoundingBox, GateState};
pub use config::LabelerConfig;
pub use correction::{schema_recognized, AnatomicalCorrector, Swap, SwapReason};
pub use driver::{label, FrameReport, MarkerLabeler};
pub use error::{LabelError, Result};
pub use export::{LabeledRecording, MarkerView};
pub use extrapolate::ExtrapolationEngine;
pub use frame::{parse_row, FrameSource, InMemoryRecording, RawFrame};
pub use track::{MarkerTrack, TrackId, TrackSet};
