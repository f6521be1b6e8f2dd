//! Identity tracking: the per-kind matcher, the cross-thread handoff
//! primitives and the inference worker runtime.

pub mod handoff;
pub mod matcher;
pub mod runtime;

pub use handoff::{Handoff, InFlight};
pub use matcher::{Matcher, TrackerConfig};
pub use runtime::{DetectionSet, InferenceEngine, PixelFrame, Runtime};

use crate::entity::{Face, Hand, Pose, Tracked};

/// The three per-kind matchers advanced in lockstep from one detection
/// set per tick.
#[derive(Debug, Default)]
pub struct MultiTracker {
    pub hands: Matcher<Hand>,
    pub faces: Matcher<Face>,
    pub poses: Matcher<Pose>,
    last_timestamp_micros: Option<i64>,
}

impl MultiTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            hands: Matcher::new(config),
            faces: Matcher::new(config),
            poses: Matcher::new(config),
            last_timestamp_micros: None,
        }
    }

    /// Advance all matchers from one detection set, deriving the tick
    /// interval from the set's capture timestamp.
    pub fn process(&mut self, set: &DetectionSet) {
        let dt = match self.last_timestamp_micros {
            Some(prev) => (set.timestamp_micros - prev).max(0) as f32 / 1_000_000.0,
            None => 1.0 / 60.0,
        };
        self.last_timestamp_micros = Some(set.timestamp_micros);
        self.hands.advance(&set.hands, dt);
        self.faces.advance(&set.faces, dt);
        self.poses.advance(&set.poses, dt);
    }

    pub fn clear(&mut self) {
        self.hands.clear();
        self.faces.clear();
        self.poses.clear();
        self.last_timestamp_micros = None;
    }

    /// Entities with at least one applied sample on every channel.
    pub fn valid_hands(&self) -> impl Iterator<Item = &Hand> {
        self.hands.entities().iter().filter(|h| h.meta().is_valid())
    }

    pub fn valid_faces(&self) -> impl Iterator<Item = &Face> {
        self.faces.entities().iter().filter(|f| f.meta().is_valid())
    }

    pub fn valid_poses(&self) -> impl Iterator<Item = &Pose> {
        self.poses.entities().iter().filter(|p| p.meta().is_valid())
    }
}
