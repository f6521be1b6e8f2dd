//! Greedy nearest-centroid identity matcher.
//!
//! Detections carry no identity from tick to tick; the matcher assigns
//! stable IDs by pairing each incoming detection with the closest
//! unmatched live entity inside a distance gate, and retiring entities
//! that go unmatched for longer than the configured timeout.

use log::debug;

use crate::entity::{Detection, Tracked};

/// Raw frame intervals are clamped to this range before smoothing, so a
/// stall or a burst cannot warp the death threshold.
const MIN_DT: f32 = 1.0 / 200.0;
const MAX_DT: f32 = 1.0;

/// Matching and smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Maximum normalized-space distance for a detection to claim an
    /// existing entity
    pub max_dist_to_match: f32,
    /// Seconds an entity survives without a match, converted to a tick
    /// count using the smoothed frame rate
    pub max_seconds_to_match: f32,
    /// Keypoint smoothing factor in [0, 1]; values near either end snap
    pub smoothing: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_dist_to_match: 0.25,
            max_seconds_to_match: 0.4,
            smoothing: 0.0,
        }
    }
}

/// Identity tracker for one entity kind.
#[derive(Debug)]
pub struct Matcher<T: Tracked> {
    config: TrackerConfig,
    entities: Vec<T>,
    next_id: u32,
    smoothed_dt: f32,
}

impl<T: Tracked> Matcher<T> {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            entities: Vec::new(),
            next_id: 1,
            smoothed_dt: 1.0 / 60.0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TrackerConfig {
        &mut self.config
    }

    /// Live entities, matched or recently lost.
    pub fn entities(&self) -> &[T] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut [T] {
        &mut self.entities
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Current smoothed frame rate estimate, clamped to [1, 200] Hz.
    pub fn fps(&self) -> f32 {
        (1.0 / self.smoothed_dt).clamp(1.0, 200.0)
    }

    /// Advance one tick: age and expire entities, then match this tick's
    /// detections against the survivors. `dt_secs` is the wall-clock
    /// interval since the previous tick.
    pub fn advance(&mut self, detections: &[Detection], dt_secs: f32) {
        let dt = dt_secs.clamp(MIN_DT, MAX_DT);
        self.smoothed_dt += (dt - self.smoothed_dt) * 0.5;

        let frames_to_die = self.config.max_seconds_to_match * self.fps();
        for entity in self.entities.iter_mut() {
            *entity.age_mut() += dt;
            entity.tick(dt);
            let meta = entity.meta_mut();
            meta.found_this_frame = false;
            meta.frames_not_found += 1;
            meta.match_distance = 0.0;
        }
        let before = self.entities.len();
        self.entities
            .retain(|e| (e.meta().frames_not_found as f32) <= frames_to_die);
        if self.entities.len() != before {
            debug!(
                "{}: expired {} after {:.0} missed ticks",
                T::KIND,
                before - self.entities.len(),
                frames_to_die
            );
        }

        for det in detections {
            self.assign(det);
        }
    }

    fn assign(&mut self, det: &Detection) {
        let pos = crate::entity::representative_position(T::KIND, &det.keypoints);

        let mut best: Option<(usize, f32)> = None;
        for (i, entity) in self.entities.iter().enumerate() {
            if entity.meta().found_this_frame {
                continue;
            }
            let dist = (entity.representative_position() - pos).norm();
            if dist < self.config.max_dist_to_match
                && best.map_or(true, |(_, best_dist)| dist < best_dist)
            {
                best = Some((i, dist));
            }
        }

        match best {
            Some((i, dist)) => {
                let pct = self.config.smoothing;
                let entity = &mut self.entities[i];
                let meta = entity.meta_mut();
                meta.found_this_frame = true;
                meta.frames_not_found = 0;
                meta.match_distance = dist;
                if !(0.001..=0.99).contains(&pct) {
                    entity.apply_detection(det);
                } else {
                    entity.apply_detection_smoothed(det, pct);
                }
                let meta = entity.meta_mut();
                meta.normalized_set = true;
                meta.world_set = true;
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                debug!("{}: new entity {}", T::KIND, id);
                let mut entity = T::from_detection(id, det);
                let meta = entity.meta_mut();
                meta.normalized_set = true;
                meta.world_set = true;
                self.entities.push(entity);
            }
        }
    }
}

impl<T: Tracked> Default for Matcher<T> {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Hand, Keypoint, Tracked};
    use nalgebra::Vector3;

    fn hand_at(x: f32, y: f32) -> Detection {
        let mut kps = vec![Keypoint::default(); 21];
        kps[0].pos_n = Vector3::new(x, y, 0.0);
        Detection::from_keypoints(kps)
    }

    #[test]
    fn nearby_detection_keeps_its_id() {
        let mut m: Matcher<Hand> = Matcher::default();
        m.advance(&[hand_at(0.5, 0.5)], 1.0 / 60.0);
        assert_eq!(m.len(), 1);
        assert_eq!(m.entities()[0].id(), 1);

        m.advance(&[hand_at(0.52, 0.51)], 1.0 / 60.0);
        assert_eq!(m.len(), 1);
        assert_eq!(m.entities()[0].id(), 1);
        assert!(m.entities()[0].meta().found_this_frame);
        assert!(m.entities()[0].meta().match_distance >= 0.0);
    }

    #[test]
    fn distant_detection_spawns_a_new_id() {
        let mut m: Matcher<Hand> = Matcher::default();
        m.advance(&[hand_at(0.1, 0.1)], 1.0 / 60.0);
        // outside the 0.25 gate, so the old entity stays lost and a new
        // one is created
        m.advance(&[hand_at(0.9, 0.9)], 1.0 / 60.0);
        assert_eq!(m.len(), 2);
        assert_eq!(m.entities()[0].id(), 1);
        assert_eq!(m.entities()[1].id(), 2);
        assert!(!m.entities()[0].meta().found_this_frame);
        assert!(m.entities()[1].meta().found_this_frame);
    }

    #[test]
    fn two_detections_claim_distinct_entities() {
        let mut m: Matcher<Hand> = Matcher::default();
        m.advance(&[hand_at(0.2, 0.5), hand_at(0.8, 0.5)], 1.0 / 60.0);
        assert_eq!(m.len(), 2);

        // both move slightly; each keeps its own identity
        m.advance(&[hand_at(0.22, 0.5), hand_at(0.78, 0.5)], 1.0 / 60.0);
        assert_eq!(m.len(), 2);
        let ids: Vec<u32> = m.entities().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![1, 2]);

        // one disappears and a new one appears far away
        m.advance(&[hand_at(0.22, 0.5), hand_at(0.5, 0.05)], 1.0 / 60.0);
        assert_eq!(m.len(), 3);
        assert_eq!(m.entities()[2].id(), 3);
    }

    #[test]
    fn close_simultaneous_detections_get_distinct_ids() {
        let mut m: Matcher<Hand> = Matcher::default();
        // both inside each other's gate, same tick: the first claims a
        // fresh entity and the second must not steal it
        m.advance(&[hand_at(0.50, 0.5), hand_at(0.55, 0.5)], 1.0 / 60.0);
        let ids: Vec<u32> = m.entities().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn detection_inside_two_gates_matches_the_nearer() {
        let mut m: Matcher<Hand> = Matcher::default();
        m.advance(&[hand_at(0.50, 0.5), hand_at(0.55, 0.5)], 1.0 / 60.0);

        // 0.02 from ID 1 and 0.07 from ID 2: both in gate, nearer wins;
        // the far detection opens a new identity
        m.advance(&[hand_at(0.48, 0.5), hand_at(0.9, 0.9)], 1.0 / 60.0);
        assert_eq!(m.len(), 3);
        let by_id = |m: &Matcher<Hand>, id: u32| {
            m.entities()
                .iter()
                .find(|e| e.id() == id)
                .map(|e| e.meta().clone())
                .unwrap()
        };
        assert!(by_id(&m, 1).found_this_frame);
        assert!((by_id(&m, 1).match_distance - 0.02).abs() < 1e-4);
        assert!(!by_id(&m, 2).found_this_frame);
        assert!(by_id(&m, 3).found_this_frame);
    }

    #[test]
    fn expiry_lands_on_the_exact_tick() {
        let mut m: Matcher<Hand> = Matcher::default();
        // 0.49 s at the (constant) 60 fps estimate is 29.4 ticks, well
        // clear of an integer boundary either way
        m.config_mut().max_seconds_to_match = 0.49;
        let dt = 1.0 / 60.0;
        m.advance(&[hand_at(0.5, 0.5)], dt);

        for _ in 0..29 {
            m.advance(&[], dt);
        }
        assert_eq!(m.len(), 1, "still inside the threshold");
        m.advance(&[], dt);
        assert_eq!(m.len(), 0, "gone on the first tick past it");
    }

    #[test]
    fn unmatched_entity_expires_after_timeout() {
        let mut m: Matcher<Hand> = Matcher::default();
        let dt = 1.0 / 60.0;
        m.advance(&[hand_at(0.5, 0.5)], dt);
        assert_eq!(m.len(), 1);

        // 0.4 s at ~60 fps is about 24 ticks; well past that the entity
        // must be gone, and well before it must survive
        for _ in 0..10 {
            m.advance(&[], dt);
        }
        assert_eq!(m.len(), 1, "should survive well inside the timeout");
        for _ in 0..40 {
            m.advance(&[], dt);
        }
        assert_eq!(m.len(), 0, "should expire well past the timeout");
    }

    #[test]
    fn expired_identity_is_never_reused() {
        let mut m: Matcher<Hand> = Matcher::default();
        m.advance(&[hand_at(0.5, 0.5)], 1.0 / 60.0);
        for _ in 0..60 {
            m.advance(&[], 1.0 / 60.0);
        }
        assert_eq!(m.len(), 0);
        m.advance(&[hand_at(0.5, 0.5)], 1.0 / 60.0);
        assert_eq!(m.entities()[0].id(), 2);
    }

    #[test]
    fn smoothing_near_bounds_snaps() {
        for pct in [0.0, 0.0005, 0.995, 1.0] {
            let mut m: Matcher<Hand> = Matcher::new(TrackerConfig {
                smoothing: pct,
                ..Default::default()
            });
            m.advance(&[hand_at(0.5, 0.5)], 1.0 / 60.0);
            m.advance(&[hand_at(0.6, 0.5)], 1.0 / 60.0);
            let x = m.entities()[0].keypoints()[0].pos_n.x;
            assert_eq!(x, 0.6, "pct {} should snap", pct);
        }
    }

    #[test]
    fn mid_range_smoothing_lags_behind() {
        let mut m: Matcher<Hand> = Matcher::new(TrackerConfig {
            smoothing: 0.5,
            ..Default::default()
        });
        m.advance(&[hand_at(0.5, 0.5)], 1.0 / 60.0);
        m.advance(&[hand_at(0.7, 0.5)], 1.0 / 60.0);
        let x = m.entities()[0].keypoints()[0].pos_n.x;
        assert!((x - 0.6).abs() < 1e-6, "got {}", x);
    }

    #[test]
    fn fps_estimate_stays_in_bounds() {
        let mut m: Matcher<Hand> = Matcher::default();
        // a long stall clamps to one second per tick
        for _ in 0..10 {
            m.advance(&[], 10.0);
        }
        assert!((m.fps() - 1.0).abs() < 0.01, "got {}", m.fps());
        // a burst of tiny intervals clamps at 200 Hz
        for _ in 0..100 {
            m.advance(&[], 1e-6);
        }
        assert!((m.fps() - 200.0).abs() < 0.01, "got {}", m.fps());
    }
}
