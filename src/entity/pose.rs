//! Pose entity: 33-keypoint full-body skeleton.

use super::{smooth_keypoints, Detection, EntityKind, Keypoint, Tracked, TrackingMeta};

pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;

/// A tracked body pose.
#[derive(Debug, Clone)]
pub struct Pose {
    pub id: u32,
    pub age: f32,
    pub meta: TrackingMeta,
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    fn empty(id: u32) -> Self {
        Self {
            id,
            age: 0.0,
            meta: TrackingMeta::default(),
            keypoints: Vec::new(),
        }
    }
}

impl Tracked for Pose {
    const KIND: EntityKind = EntityKind::Pose;

    fn from_detection(id: u32, det: &Detection) -> Self {
        let mut pose = Pose::empty(id);
        pose.apply_detection(det);
        pose
    }

    fn with_id(id: u32) -> Self {
        Pose::empty(id)
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn age(&self) -> f32 {
        self.age
    }

    fn age_mut(&mut self) -> &mut f32 {
        &mut self.age
    }

    fn meta(&self) -> &TrackingMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TrackingMeta {
        &mut self.meta
    }

    fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    fn keypoints_mut(&mut self) -> &mut Vec<Keypoint> {
        &mut self.keypoints
    }

    fn apply_detection(&mut self, det: &Detection) {
        self.keypoints.clear();
        self.keypoints.extend_from_slice(&det.keypoints);
        self.update_derived();
    }

    fn apply_detection_smoothed(&mut self, det: &Detection, pct: f32) {
        smooth_keypoints(&mut self.keypoints, &det.keypoints, pct);
        self.update_derived();
    }

    fn update_derived(&mut self) {}
}
