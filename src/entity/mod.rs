//! Tracked entity model: keypoints, tracking metadata, and the
//! [`Tracked`] trait shared by hands, faces and poses.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

pub mod face;
pub mod hand;
pub mod pose;

pub use face::{BlendShape, Face};
pub use hand::{Finger, FingerType, Hand, Handedness};
pub use pose::Pose;

/// Keypoint count for a hand entity
pub const HAND_KEYPOINT_COUNT: usize = 21;
/// Keypoint count for a face entity
pub const FACE_KEYPOINT_COUNT: usize = 478;
/// Keypoint count for a pose entity
pub const POSE_KEYPOINT_COUNT: usize = 33;

/// Kind of tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Hand,
    Face,
    Pose,
}

impl EntityKind {
    /// Fixed keypoint count for this kind; detections with any other
    /// count are invalid upstream.
    pub fn keypoint_count(&self) -> usize {
        match self {
            EntityKind::Hand => HAND_KEYPOINT_COUNT,
            EntityKind::Face => FACE_KEYPOINT_COUNT,
            EntityKind::Pose => POSE_KEYPOINT_COUNT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Hand => "hand",
            EntityKind::Face => "face",
            EntityKind::Pose => "pose",
        }
    }

    /// Parse from a document/wire string. Unknown strings fall back to
    /// Pose, matching the recorded-document reader behavior.
    pub fn parse(s: &str) -> EntityKind {
        match s.to_ascii_lowercase().as_str() {
            "hand" => EntityKind::Hand,
            "face" => EntityKind::Face,
            _ => EntityKind::Pose,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One landmark of a tracked entity.
///
/// Only the normalized and world channels persist across the wire;
/// `pos` is the normalized position mapped into an output rect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    /// Output-space position (normalized position mapped through a rect)
    pub pos: Vector3<f32>,
    /// Normalized position, x/y in [0, 1]
    pub pos_n: Vector3<f32>,
    /// World-space position in meters
    pub pos_world: Vector3<f32>,
}

/// Axis-aligned output rectangle used to map normalized positions into
/// output space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl OutRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl Default for OutRect {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// Map keypoint output positions from their normalized channel: x/y are
/// scaled into the rect, z is scaled by the rect width.
pub fn map_keypoints_to_rect(keypoints: &mut [Keypoint], rect: &OutRect) {
    for kp in keypoints {
        kp.pos.x = kp.pos_n.x * rect.width + rect.x;
        kp.pos.y = kp.pos_n.y * rect.height + rect.y;
        kp.pos.z = kp.pos_n.z * rect.width;
    }
}

/// Per-entity tracking bookkeeping, mutated once per tick by the matcher
/// (or by the OSC receiver on the network-received path).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingMeta {
    /// Matched a detection (or received a message) this tick
    pub found_this_frame: bool,
    /// Consecutive ticks without a match
    pub frames_not_found: u32,
    /// Distance of the winning match this tick
    pub match_distance: f32,
    /// Highest wire frame number applied so far; older frames are stale
    pub most_recent_frame: i64,
    /// At least one normalized-position sample has arrived
    pub normalized_set: bool,
    /// At least one world-position sample has arrived
    pub world_set: bool,
}

impl Default for TrackingMeta {
    fn default() -> Self {
        Self {
            found_this_frame: true,
            frames_not_found: 0,
            match_distance: -1.0,
            most_recent_frame: 0,
            normalized_set: false,
            world_set: false,
        }
    }
}

/// Tracking state of a live entity, derived from its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Matched a detection on the most recent tick
    Tracked,
    /// Unmatched but still within the removal threshold
    Lost,
}

impl TrackingMeta {
    pub fn state(&self) -> TrackState {
        if self.found_this_frame {
            TrackState::Tracked
        } else {
            TrackState::Lost
        }
    }

    /// An entity is valid for consumers once both streams have delivered.
    pub fn is_valid(&self) -> bool {
        self.normalized_set && self.world_set
    }
}

/// An unidentified per-tick candidate from the inference engine.
///
/// Fixed-shape DTO produced by the host's adapter; the tracker never
/// inspects the engine's native result representation.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub keypoints: Vec<Keypoint>,
    /// Hand detections only
    pub handedness: Option<Handedness>,
    /// Hand detections only: category index reported by the engine
    pub hand_index: i32,
    /// Face detections only
    pub blend_shapes: Vec<BlendShape>,
}

impl Detection {
    pub fn from_keypoints(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints,
            ..Default::default()
        }
    }
}

/// Representative normalized-space position used for identity matching.
///
/// Hands anchor at the wrist, faces at the ear midpoint, poses at the
/// shoulder/hip centroid. Short keypoint arrays yield the origin.
pub fn representative_position(kind: EntityKind, keypoints: &[Keypoint]) -> Vector3<f32> {
    match kind {
        EntityKind::Hand => keypoints
            .first()
            .map(|kp| kp.pos_n)
            .unwrap_or_else(Vector3::zeros),
        EntityKind::Face => {
            if keypoints.len() > face::KP_EAR_LEFT {
                (keypoints[face::KP_EAR_RIGHT].pos_n + keypoints[face::KP_EAR_LEFT].pos_n) * 0.5
            } else {
                Vector3::zeros()
            }
        }
        EntityKind::Pose => {
            if keypoints.len() > pose::RIGHT_HIP {
                (keypoints[pose::LEFT_SHOULDER].pos_n
                    + keypoints[pose::RIGHT_SHOULDER].pos_n
                    + keypoints[pose::LEFT_HIP].pos_n
                    + keypoints[pose::RIGHT_HIP].pos_n)
                    * 0.25
            } else {
                Vector3::zeros()
            }
        }
    }
}

/// Normalize a vector, falling back when the length is degenerate.
pub(crate) fn normalize_or(v: Vector3<f32>, fallback: Vector3<f32>) -> Vector3<f32> {
    let len = v.norm();
    if len > f32::EPSILON {
        v / len
    } else {
        fallback
    }
}

/// Blend keypoints toward a new sample. `pct` is the smoothing factor:
/// 0 snaps to the sample, values toward 1 retain the old position.
pub(crate) fn smooth_keypoints(keypoints: &mut Vec<Keypoint>, sample: &[Keypoint], pct: f32) {
    if keypoints.is_empty() || keypoints.len() != sample.len() {
        keypoints.clear();
        keypoints.extend_from_slice(sample);
        return;
    }
    let w = 1.0 - pct;
    for (kp, new_kp) in keypoints.iter_mut().zip(sample.iter()) {
        kp.pos += (new_kp.pos - kp.pos) * w;
        kp.pos_n += (new_kp.pos_n - kp.pos_n) * w;
        kp.pos_world += (new_kp.pos_world - kp.pos_world) * w;
    }
}

/// A persistent, identity-bearing tracked object.
///
/// Implemented by [`Hand`], [`Face`] and [`Pose`]; the matcher, codec,
/// receiver and player are all generic over this trait.
pub trait Tracked: Clone + Send + 'static {
    const KIND: EntityKind;

    /// Promote a detection to a new entity with the given ID. Value
    /// construction: the entity owns its keypoint storage.
    fn from_detection(id: u32, det: &Detection) -> Self;

    /// An empty entity carrying only an ID, for the network-received
    /// path where keypoints arrive over separate streams.
    fn with_id(id: u32) -> Self;

    fn id(&self) -> u32;
    fn age(&self) -> f32;
    fn age_mut(&mut self) -> &mut f32;
    fn meta(&self) -> &TrackingMeta;
    fn meta_mut(&mut self) -> &mut TrackingMeta;
    fn keypoints(&self) -> &[Keypoint];
    fn keypoints_mut(&mut self) -> &mut Vec<Keypoint>;

    /// Representative normalized position used for distance matching.
    fn representative_position(&self) -> Vector3<f32> {
        representative_position(Self::KIND, self.keypoints())
    }

    /// Snap-apply a detection: replace keypoints and auxiliary fields,
    /// then recompute derived geometry.
    fn apply_detection(&mut self, det: &Detection);

    /// Apply a detection with per-channel linear smoothing, then
    /// recompute derived geometry.
    fn apply_detection_smoothed(&mut self, det: &Detection, pct: f32);

    /// Apply an already-absolute keypoint sample, as found in
    /// recordings, without the detection-path fixups.
    fn apply_sample(&mut self, det: &Detection, pct: f32) {
        if (0.001..=0.99).contains(&pct) {
            smooth_keypoints(self.keypoints_mut(), &det.keypoints, pct);
        } else {
            let kps = self.keypoints_mut();
            kps.clear();
            kps.extend_from_slice(&det.keypoints);
        }
        self.update_derived();
    }

    /// Recompute derived geometry from the current keypoints. Must be
    /// called after every keypoint mutation.
    fn update_derived(&mut self);

    /// Per-tick work beyond aging (e.g. finger dwell timers).
    fn tick(&mut self, _dt: f32) {}
}
