//! Temporal identity tracking for landmark detections.
//!
//! An inference engine reports per-frame hand, face and body-pose
//! landmarks with no memory between frames. This crate turns those
//! anonymous detections into persistent entities with stable IDs,
//! hands them across threads without blocking the capture loop, and
//! moves them between processes: over OSC/UDP in real time, or through
//! JSON recordings replayed later.
//!
//! The pieces compose but do not depend on each other:
//!
//! * [`tracker`] — greedy nearest-centroid matching with fps-scaled
//!   expiry, plus the inference worker runtime and handoff slots.
//! * [`entity`] — [`Hand`](entity::Hand), [`Face`](entity::Face) and
//!   [`Pose`](entity::Pose) with their derived geometry.
//! * [`osc`] — UDP sender and receiver speaking the keypoint wire
//!   schema.
//! * [`playback`] — JSON recorder and timeline player.

pub mod entity;
pub mod error;
pub mod frame;
pub mod osc;
pub mod playback;
pub mod tracker;

pub use entity::{Detection, EntityKind, Face, Hand, Keypoint, OutRect, Pose, Tracked};
pub use error::{DocumentError, TransportError};
pub use frame::{Document, Frame, FrameObject};
pub use osc::{Receiver, Sender};
pub use playback::{Player, Recorder};
pub use tracker::{Matcher, MultiTracker, TrackerConfig};
