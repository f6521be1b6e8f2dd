//! Face entity: 478-keypoint mesh plus named blend shape coefficients.

use serde::{Deserialize, Serialize};

use super::{smooth_keypoints, Detection, EntityKind, Keypoint, Tracked, TrackingMeta};

/// Landmark near the right ear, one anchor of the matching position
pub const KP_EAR_RIGHT: usize = 234;
/// Landmark near the left ear, the other anchor
pub const KP_EAR_LEFT: usize = 454;

pub const KP_EYE_RIGHT_OUTER: usize = 33;
pub const KP_EYE_RIGHT_INNER: usize = 133;
pub const KP_EYE_RIGHT_MID_TOP: usize = 159;
pub const KP_EYE_RIGHT_MID_BOTTOM: usize = 145;
pub const KP_EYE_LEFT_OUTER: usize = 263;
pub const KP_EYE_LEFT_INNER: usize = 362;
pub const KP_EYE_LEFT_MID_TOP: usize = 386;
pub const KP_EYE_LEFT_MID_BOTTOM: usize = 374;

/// Score above which a blend shape counts as active
pub const ACTIVE_SCORE_CUTOFF: f32 = 0.4;
/// Seconds a shape must hold above the cutoff before it fires
const ACTIVE_DWELL_SECS: f32 = 0.1;
/// Seconds below the cutoff before the shape may fire again
const REARM_SECS: f32 = 0.35;

/// Lid-gap to eye-width ratios treated as fully closed / fully open
const EYE_RATIO_CLOSED: f32 = 0.15;
const EYE_RATIO_OPEN: f32 = 0.6;

/// One facial expression coefficient, e.g. `jawOpen` or `eyeBlinkLeft`,
/// with activation dwell state maintained across ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlendShape {
    pub index: i32,
    pub category_name: String,
    pub score: f32,
    /// Seconds the score has held above the activation cutoff
    #[serde(skip)]
    pub time_active: f32,
    /// Seconds the score has held below it
    #[serde(skip)]
    pub time_inactive: f32,
    /// Latched after firing until the rearm dwell elapses
    #[serde(skip)]
    pub fired: bool,
    /// True only on the tick the shape becomes active
    #[serde(skip)]
    pub changed_to_active: bool,
}

impl BlendShape {
    /// Advance the activation dwell by one tick.
    pub fn tick(&mut self, dt: f32) {
        self.changed_to_active = false;
        if self.score > ACTIVE_SCORE_CUTOFF {
            self.time_active += dt;
            if self.time_active > ACTIVE_DWELL_SECS && !self.fired {
                self.fired = true;
                self.changed_to_active = true;
            }
            self.time_inactive = 0.0;
        } else {
            self.time_active = 0.0;
            self.time_inactive += dt;
            if self.time_inactive > REARM_SECS {
                self.fired = false;
            }
        }
    }
}

/// A tracked face.
#[derive(Debug, Clone)]
pub struct Face {
    pub id: u32,
    pub age: f32,
    pub meta: TrackingMeta,
    pub keypoints: Vec<Keypoint>,
    pub blend_shapes: Vec<BlendShape>,
}

impl Face {
    fn empty(id: u32) -> Self {
        Self {
            id,
            age: 0.0,
            meta: TrackingMeta::default(),
            keypoints: Vec::new(),
            blend_shapes: Vec::new(),
        }
    }

    /// Look up a blend shape coefficient by its category name.
    pub fn blend_shape(&self, category_name: &str) -> Option<&BlendShape> {
        self.blend_shapes
            .iter()
            .find(|bs| bs.category_name == category_name)
    }

    /// True only on the tick the blink becomes active.
    pub fn is_left_eye_blinking(&self) -> bool {
        self.blend_shape("eyeBlinkLeft")
            .map_or(false, |bs| bs.changed_to_active)
    }

    pub fn is_right_eye_blinking(&self) -> bool {
        self.blend_shape("eyeBlinkRight")
            .map_or(false, |bs| bs.changed_to_active)
    }

    /// Openness of one eye in [0, 1], from the lid gap relative to the
    /// eye width. Missing geometry reads as closed.
    pub fn eye_open_percent(&self, right: bool) -> f32 {
        let (top, bottom, inner, outer) = if right {
            (
                KP_EYE_RIGHT_MID_TOP,
                KP_EYE_RIGHT_MID_BOTTOM,
                KP_EYE_RIGHT_INNER,
                KP_EYE_RIGHT_OUTER,
            )
        } else {
            (
                KP_EYE_LEFT_MID_TOP,
                KP_EYE_LEFT_MID_BOTTOM,
                KP_EYE_LEFT_INNER,
                KP_EYE_LEFT_OUTER,
            )
        };
        let at = |i: usize| {
            self.keypoints
                .get(i)
                .map_or_else(nalgebra::Vector3::zeros, |kp| kp.pos_n)
        };
        let height = (at(top) - at(bottom)).norm();
        let width = (at(outer) - at(inner)).norm().max(0.01);
        ((height / width - EYE_RATIO_CLOSED) / (EYE_RATIO_OPEN - EYE_RATIO_CLOSED)).clamp(0.0, 1.0)
    }

    /// Take over the coefficients of an incoming sample while keeping
    /// the dwell timers already accumulated.
    fn merge_blend_shapes(&mut self, incoming: &[BlendShape]) {
        if incoming.is_empty() {
            return;
        }
        if self.blend_shapes.len() != incoming.len() {
            self.blend_shapes = incoming.to_vec();
            return;
        }
        for (cur, new) in self.blend_shapes.iter_mut().zip(incoming) {
            cur.index = new.index;
            cur.category_name.clone_from(&new.category_name);
            cur.score = new.score;
        }
    }
}

impl Tracked for Face {
    const KIND: EntityKind = EntityKind::Face;

    fn from_detection(id: u32, det: &Detection) -> Self {
        let mut face = Face::empty(id);
        face.apply_detection(det);
        face
    }

    fn with_id(id: u32) -> Self {
        Face::empty(id)
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
        self.merge_blend_shapes(&det.blend_shapes);
        self.update_derived();
    }

    fn apply_detection_smoothed(&mut self, det: &Detection, pct: f32) {
        smooth_keypoints(&mut self.keypoints, &det.keypoints, pct);
        self.merge_blend_shapes(&det.blend_shapes);
        self.update_derived();
    }

    fn apply_sample(&mut self, det: &Detection, pct: f32) {
        if (0.001..=0.99).contains(&pct) {
            smooth_keypoints(&mut self.keypoints, &det.keypoints, pct);
        } else {
            self.keypoints.clear();
            self.keypoints.extend_from_slice(&det.keypoints);
        }
        self.merge_blend_shapes(&det.blend_shapes);
        self.update_derived();
    }

    fn update_derived(&mut self) {}

    fn tick(&mut self, dt: f32) {
        for bs in &mut self.blend_shapes {
            bs.tick(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn matching_position_is_ear_midpoint() {
        let mut kps = vec![Keypoint::default(); EntityKind::Face.keypoint_count()];
        kps[KP_EAR_RIGHT].pos_n = Vector3::new(0.2, 0.4, 0.0);
        kps[KP_EAR_LEFT].pos_n = Vector3::new(0.6, 0.4, 0.0);
        let face = Face::from_detection(1, &Detection::from_keypoints(kps));
        let p = face.representative_position();
        assert!((p - Vector3::new(0.4, 0.4, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn short_keypoint_list_matches_at_origin() {
        let face = Face::from_detection(1, &Detection::from_keypoints(vec![Keypoint::default(); 10]));
        assert_eq!(face.representative_position(), Vector3::zeros());
    }

    #[test]
    fn blend_shape_lookup_by_name() {
        let mut det = Detection::from_keypoints(vec![Keypoint::default(); 478]);
        det.blend_shapes = vec![
            BlendShape {
                index: 25,
                category_name: "jawOpen".into(),
                score: 0.8,
                ..Default::default()
            },
            BlendShape {
                index: 9,
                category_name: "eyeBlinkLeft".into(),
                score: 0.1,
                ..Default::default()
            },
        ];
        let face = Face::from_detection(1, &det);
        assert_eq!(face.blend_shape("jawOpen").map(|b| b.score), Some(0.8));
        assert!(face.blend_shape("mouthSmileLeft").is_none());
    }

    fn blink_detection(score: f32) -> Detection {
        let mut det = Detection::from_keypoints(vec![Keypoint::default(); 478]);
        det.blend_shapes = vec![BlendShape {
            index: 9,
            category_name: "eyeBlinkLeft".into(),
            score,
            ..Default::default()
        }];
        det
    }

    #[test]
    fn blink_fires_once_after_the_dwell() {
        let dt = 1.0 / 60.0;
        let mut face = Face::from_detection(1, &blink_detection(0.9));

        face.tick(dt);
        assert!(!face.is_left_eye_blinking(), "no fire before the dwell");
        let mut fired = 0;
        for _ in 0..30 {
            face.tick(dt);
            if face.is_left_eye_blinking() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1, "a held blink fires exactly one tick");
        assert!(!face.is_right_eye_blinking());
    }

    #[test]
    fn blink_rearms_only_after_a_long_enough_release() {
        let dt = 1.0 / 60.0;
        let mut face = Face::from_detection(1, &blink_detection(0.9));
        for _ in 0..30 {
            face.tick(dt);
        }

        // a brief dip well under the rearm dwell keeps the latch
        face.apply_detection(&blink_detection(0.0));
        for _ in 0..5 {
            face.tick(dt);
        }
        face.apply_detection(&blink_detection(0.9));
        let mut refired = 0;
        for _ in 0..30 {
            face.tick(dt);
            if face.is_left_eye_blinking() {
                refired += 1;
            }
        }
        assert_eq!(refired, 0, "still latched after a brief dip");

        // a long release rearms and the next hold fires again
        face.apply_detection(&blink_detection(0.0));
        for _ in 0..25 {
            face.tick(dt);
        }
        face.apply_detection(&blink_detection(0.9));
        let mut again = 0;
        for _ in 0..30 {
            face.tick(dt);
            if face.is_left_eye_blinking() {
                again += 1;
            }
        }
        assert_eq!(again, 1);
    }

    #[test]
    fn eye_openness_maps_the_lid_gap() {
        let mut kps = vec![Keypoint::default(); 478];
        kps[KP_EYE_RIGHT_INNER].pos_n = Vector3::new(0.0, 0.0, 0.0);
        kps[KP_EYE_RIGHT_OUTER].pos_n = Vector3::new(1.0, 0.0, 0.0);
        kps[KP_EYE_RIGHT_MID_TOP].pos_n = Vector3::new(0.5, 0.6, 0.0);
        kps[KP_EYE_RIGHT_MID_BOTTOM].pos_n = Vector3::new(0.5, 0.0, 0.0);
        let mut face = Face::from_detection(1, &Detection::from_keypoints(kps));

        assert!((face.eye_open_percent(true) - 1.0).abs() < 1e-6);
        face.keypoints[KP_EYE_RIGHT_MID_TOP].pos_n.y = 0.375;
        assert!((face.eye_open_percent(true) - 0.5).abs() < 1e-5);
        face.keypoints[KP_EYE_RIGHT_MID_TOP].pos_n.y = 0.1;
        assert_eq!(face.eye_open_percent(true), 0.0);
        // no left-eye geometry set, reads closed
        assert_eq!(face.eye_open_percent(false), 0.0);
    }
}
