//! Recording and replay of tracked-entity documents.

pub mod player;
pub mod recorder;

pub use player::{PlayFrame, Player};
pub use recorder::Recorder;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Detection, EntityKind, Keypoint};
    use crate::tracker::{DetectionSet, MultiTracker};
    use nalgebra::Vector3;

    fn hand_at(x: f32) -> Detection {
        let mut kps = vec![Keypoint::default(); 21];
        kps[0].pos_n = Vector3::new(x, 0.5, 0.0);
        Detection::from_keypoints(kps)
    }

    // tracked entities written to disk come back through the player
    // with the same identities and positions
    #[test]
    fn tracked_session_replays_from_disk() {
        let mut tracker = MultiTracker::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut recorder = Recorder::new();
        recorder.start(&path, 640.0, 480.0).unwrap();

        let mut ts = 0i64;
        for step in 0..3 {
            ts += 16_667;
            tracker.process(&DetectionSet {
                hands: vec![hand_at(0.4 + step as f32 * 0.01)],
                timestamp_micros: ts,
                ..Default::default()
            });
            recorder.record(tracker.hands.entities());
        }
        recorder.stop().unwrap();

        let mut player = Player::load(&path).unwrap();
        player.play();
        // run past the whole recording
        for _ in 0..100 {
            player.update(1.0 / 60.0);
        }
        let pf = player.play_frame(EntityKind::Hand);
        assert_eq!(pf.total, 3);
        assert_eq!(pf.current, 2);
        assert_eq!(player.hands().len(), 1);
        assert_eq!(player.hands()[0].id, 1);
        assert!((player.hands()[0].keypoints[0].pos_n.x - 0.42).abs() < 1e-6);
    }
}
