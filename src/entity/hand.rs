//! Hand entity: 21 keypoints, per-finger open/closed state and a palm
//! coordinate basis derived from the wrist and knuckle landmarks.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{
    normalize_or, smooth_keypoints, Detection, EntityKind, Keypoint, Tracked, TrackingMeta,
};

/// Wrist landmark index
pub const KP_WRIST: usize = 0;
/// Index-finger knuckle, one edge of the palm triangle
pub const KP_INDEX_MCP: usize = 5;
/// Middle-finger knuckle, defines the palm up direction
pub const KP_MIDDLE_MCP: usize = 9;
/// Pinky knuckle, the other edge of the palm triangle
pub const KP_PINKY_MCP: usize = 17;

/// Default open/closed cutoff in degrees of summed knuckle bend
pub const DEFAULT_OPEN_CUTOFF_DEG: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }

    pub fn parse(s: &str) -> Option<Handedness> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Some(Handedness::Left),
            "right" => Some(Handedness::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FingerType {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl FingerType {
    pub const ALL: [FingerType; 5] = [
        FingerType::Thumb,
        FingerType::Index,
        FingerType::Middle,
        FingerType::Ring,
        FingerType::Pinky,
    ];

    /// First keypoint index of this finger; each finger spans four
    /// consecutive landmarks after the wrist.
    pub fn base_index(&self) -> usize {
        1 + (*self as usize) * 4
    }
}

/// Derived per-finger state, recomputed from world keypoints on every
/// applied detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Finger {
    pub finger_type: FingerType,
    /// Bend angles between consecutive segment directions along the
    /// finger, wrist segment included, in radians.
    pub angles: [f32; 3],
    /// Sum of the two knuckle bends, radians
    pub closed_amount_rad: f32,
    pub open: bool,
    /// Seconds spent continuously open; reset when the finger closes
    pub time_open: f32,
    /// Seconds spent continuously closed; reset when the finger opens
    pub time_closed: f32,
}

impl Finger {
    fn new(finger_type: FingerType) -> Self {
        Self {
            finger_type,
            angles: [0.0; 3],
            closed_amount_rad: 0.0,
            open: false,
            time_open: 0.0,
            time_closed: 0.0,
        }
    }

    fn tick(&mut self, dt: f32) {
        if self.open {
            self.time_open += dt;
            self.time_closed = 0.0;
        } else {
            self.time_closed += dt;
            self.time_open = 0.0;
        }
    }
}

/// A tracked hand.
#[derive(Debug, Clone)]
pub struct Hand {
    pub id: u32,
    pub age: f32,
    pub meta: TrackingMeta,
    pub keypoints: Vec<Keypoint>,
    pub handedness: Option<Handedness>,
    /// Category index as reported by the inference engine
    pub hand_index: i32,
    pub fingers: [Finger; 5],
    /// Degrees of summed knuckle bend below which a finger reads open
    pub open_cutoff_deg: f32,
    /// World-space palm centroid (wrist + two outer knuckles)
    pub palm_pos: Vector3<f32>,
    /// Unit normal out of the palm, handedness-corrected
    pub palm_normal: Vector3<f32>,
    /// Unit direction from wrist toward the middle knuckle
    pub palm_up: Vector3<f32>,
    /// Unit direction across the palm
    pub palm_side: Vector3<f32>,
}

impl Hand {
    fn empty(id: u32) -> Self {
        Self {
            id,
            age: 0.0,
            meta: TrackingMeta::default(),
            keypoints: Vec::new(),
            handedness: None,
            hand_index: -1,
            fingers: FingerType::ALL.map(Finger::new),
            open_cutoff_deg: DEFAULT_OPEN_CUTOFF_DEG,
            palm_pos: Vector3::zeros(),
            palm_normal: Vector3::zeros(),
            palm_up: Vector3::zeros(),
            palm_side: Vector3::zeros(),
        }
    }

    pub fn finger(&self, t: FingerType) -> &Finger {
        &self.fingers[t as usize]
    }

    /// Fraction of the hand's fingers currently open.
    pub fn open_amount(&self) -> f32 {
        let open = self.fingers.iter().filter(|f| f.open).count();
        open as f32 / self.fingers.len() as f32
    }

    /// World keypoints arrive wrist-relative; shift every landmark after
    /// the wrist by the wrist's world position so the hand hangs
    /// together in world space.
    fn reanchor_world(keypoints: &mut [Keypoint]) {
        if keypoints.is_empty() {
            return;
        }
        let wrist = keypoints[KP_WRIST].pos_world;
        for kp in keypoints.iter_mut().skip(1) {
            kp.pos_world += wrist;
        }
    }

    fn update_fingers(&mut self) {
        if self.keypoints.len() < EntityKind::Hand.keypoint_count() {
            return;
        }
        let wrist = self.keypoints[KP_WRIST].pos_world;
        let cutoff = self.open_cutoff_deg;
        for finger in self.fingers.iter_mut() {
            let base = finger.finger_type.base_index();
            let joints = [
                wrist,
                self.keypoints[base].pos_world,
                self.keypoints[base + 1].pos_world,
                self.keypoints[base + 2].pos_world,
                self.keypoints[base + 3].pos_world,
            ];
            let mut dirs = [Vector3::zeros(); 4];
            for i in 0..4 {
                dirs[i] = normalize_or(joints[i + 1] - joints[i], Vector3::zeros());
            }
            for i in 0..3 {
                let dot = dirs[i].dot(&dirs[i + 1]).clamp(-1.0, 1.0);
                finger.angles[i] = dot.acos();
            }
            finger.closed_amount_rad = finger.angles[1].abs() + finger.angles[2].abs();
            finger.open = finger.closed_amount_rad.to_degrees() < cutoff;
        }
    }

    fn update_palm(&mut self) {
        if self.keypoints.len() <= KP_PINKY_MCP {
            return;
        }
        let wrist = self.keypoints[KP_WRIST].pos_world;
        let index = self.keypoints[KP_INDEX_MCP].pos_world;
        let middle = self.keypoints[KP_MIDDLE_MCP].pos_world;
        let pinky = self.keypoints[KP_PINKY_MCP].pos_world;

        self.palm_pos = (wrist + index + pinky) / 3.0;
        let mut normal = normalize_or((index - wrist).cross(&(pinky - wrist)), Vector3::zeros());
        if self.handedness == Some(Handedness::Right) {
            normal = -normal;
        }
        self.palm_normal = normal;
        self.palm_up = normalize_or(middle - wrist, Vector3::zeros());
        self.palm_side = self.palm_up.cross(&self.palm_normal);
    }
}

impl Tracked for Hand {
    const KIND: EntityKind = EntityKind::Hand;

    fn from_detection(id: u32, det: &Detection) -> Self {
        let mut hand = Hand::empty(id);
        hand.apply_detection(det);
        hand
    }

    fn with_id(id: u32) -> Self {
        Hand::empty(id)
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
        let mut sample = det.keypoints.clone();
        Hand::reanchor_world(&mut sample);
        self.keypoints = sample;
        if det.handedness.is_some() {
            self.handedness = det.handedness;
        }
        self.hand_index = det.hand_index;
        self.update_derived();
    }

    fn apply_detection_smoothed(&mut self, det: &Detection, pct: f32) {
        let mut sample = det.keypoints.clone();
        Hand::reanchor_world(&mut sample);
        smooth_keypoints(&mut self.keypoints, &sample, pct);
        if det.handedness.is_some() {
            self.handedness = det.handedness;
        }
        self.hand_index = det.hand_index;
        self.update_derived();
    }

    fn apply_sample(&mut self, det: &Detection, pct: f32) {
        if (0.001..=0.99).contains(&pct) {
            smooth_keypoints(&mut self.keypoints, &det.keypoints, pct);
        } else {
            self.keypoints.clear();
            self.keypoints.extend_from_slice(&det.keypoints);
        }
        if det.handedness.is_some() {
            self.handedness = det.handedness;
        }
        self.hand_index = det.hand_index;
        self.update_derived();
    }

    fn update_derived(&mut self) {
        self.update_fingers();
        self.update_palm();
    }

    fn tick(&mut self, dt: f32) {
        for finger in self.fingers.iter_mut() {
            finger.tick(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_hand() -> Detection {
        // wrist at origin, fingers laid out straight along +y so every
        // bend angle is zero
        let mut kps = vec![Keypoint::default(); 21];
        for finger in FingerType::ALL {
            let base = finger.base_index();
            let x = finger as usize as f32 * 0.02;
            for j in 0..4 {
                kps[base + j].pos_world = Vector3::new(x, 0.03 * (j as f32 + 1.0), 0.0);
                kps[base + j].pos_n = Vector3::new(x, 0.03 * (j as f32 + 1.0), 0.0);
            }
        }
        Detection::from_keypoints(kps)
    }

    fn curled_hand() -> Detection {
        // fingers fold back toward the wrist past the first knuckle
        let mut det = flat_hand();
        for finger in FingerType::ALL {
            let base = finger.base_index();
            let x = finger as usize as f32 * 0.02;
            det.keypoints[base + 2].pos_world = Vector3::new(x, 0.06, -0.03);
            det.keypoints[base + 3].pos_world = Vector3::new(x, 0.03, -0.03);
        }
        det
    }

    #[test]
    fn straight_fingers_read_open() {
        let hand = Hand::from_detection(1, &flat_hand());
        for finger in &hand.fingers {
            assert!(finger.open, "{:?} should be open", finger.finger_type);
            assert!(finger.closed_amount_rad.to_degrees() < 10.0);
        }
        assert_eq!(hand.open_amount(), 1.0);
    }

    #[test]
    fn curled_fingers_read_closed() {
        let hand = Hand::from_detection(1, &curled_hand());
        for finger in &hand.fingers {
            assert!(!finger.open, "{:?} should be closed", finger.finger_type);
        }
        assert_eq!(hand.open_amount(), 0.0);
    }

    #[test]
    fn finger_timers_accumulate_and_reset() {
        let mut hand = Hand::from_detection(1, &flat_hand());
        hand.tick(0.1);
        hand.tick(0.1);
        assert!((hand.finger(FingerType::Index).time_open - 0.2).abs() < 1e-6);
        assert_eq!(hand.finger(FingerType::Index).time_closed, 0.0);

        hand.apply_detection(&curled_hand());
        hand.tick(0.1);
        assert_eq!(hand.finger(FingerType::Index).time_open, 0.0);
        assert!((hand.finger(FingerType::Index).time_closed - 0.1).abs() < 1e-6);
    }

    #[test]
    fn palm_normal_flips_with_handedness() {
        let mut det = flat_hand();
        det.handedness = Some(Handedness::Left);
        let left = Hand::from_detection(1, &det);
        det.handedness = Some(Handedness::Right);
        let right = Hand::from_detection(2, &det);
        assert!((left.palm_normal + right.palm_normal).norm() < 1e-6);
        assert!((left.palm_normal.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn world_keypoints_reanchor_at_wrist() {
        let mut det = flat_hand();
        det.keypoints[KP_WRIST].pos_world = Vector3::new(1.0, 2.0, 3.0);
        let hand = Hand::from_detection(1, &det);
        // knuckle shifted by the wrist offset
        let expected = Vector3::new(0.02, 0.03, 0.0) + Vector3::new(1.0, 2.0, 3.0);
        assert!((hand.keypoints[FingerType::Index.base_index()].pos_world - expected).norm() < 1e-6);
    }
}
