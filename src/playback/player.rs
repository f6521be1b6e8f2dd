//! Document player that replays recorded frames against live entity
//! registries, keeping identity continuity across frames.

use std::path::Path;

use log::{debug, info};

use crate::entity::{map_keypoints_to_rect, EntityKind, Face, Hand, OutRect, Pose, Tracked};
use crate::error::DocumentError;
use crate::frame::{Document, Frame};

/// Playback position of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayFrame {
    /// Index of the frame currently applied
    pub current: usize,
    /// Index applied before the last change
    pub prev: usize,
    pub total: usize,
    /// A different frame was applied by the latest update
    pub new_frame: bool,
}

struct Track<T: Tracked> {
    frames: Vec<Frame>,
    /// Next frame index waiting for the playhead to reach it
    next: usize,
    play: PlayFrame,
    entities: Vec<T>,
    out_rect: OutRect,
}

impl<T: Tracked> Track<T> {
    fn new(frames: Vec<Frame>) -> Self {
        let total = frames.len();
        Self {
            frames,
            next: 0,
            play: PlayFrame {
                current: 0,
                prev: 0,
                total,
                new_frame: false,
            },
            entities: Vec::new(),
            out_rect: OutRect::default(),
        }
    }

    fn rewind(&mut self) {
        self.next = 0;
        self.play.current = 0;
        self.play.prev = 0;
        self.play.new_frame = false;
        self.entities.clear();
    }

    /// Advance to the newest frame at or before the playhead and apply
    /// it to the entity registry.
    fn advance(&mut self, playhead_nanos: u64, smoothing: f32, fallback_rect: OutRect) {
        self.play.new_frame = false;
        let mut latest: Option<usize> = None;
        while self.next < self.frames.len()
            && self.frames[self.next].timestamp_nanos <= playhead_nanos
        {
            latest = Some(self.next);
            self.next += 1;
        }
        let Some(index) = latest else {
            return;
        };
        self.play.prev = self.play.current;
        self.play.current = index;
        self.play.new_frame = true;

        let rect = if self.out_rect.width >= 1.0 {
            self.out_rect
        } else {
            fallback_rect
        };
        // split off the frame so the registry can be mutated
        let frame = &self.frames[index];
        apply_frame(&mut self.entities, frame, smoothing, &rect);
    }
}

/// Replay one frame into the registry: matched IDs update in place, new
/// IDs register, absent IDs drop out.
fn apply_frame<T: Tracked>(entities: &mut Vec<T>, frame: &Frame, smoothing: f32, rect: &OutRect) {
    entities.retain(|e| frame.objects.iter().any(|o| o.id.unwrap_or(0) == e.id()));
    for obj in &frame.objects {
        let id = obj.id.unwrap_or(0);
        let det = obj.to_detection();
        let existing = entities.iter_mut().find(|e| e.id() == id);
        let entity = match existing {
            Some(entity) => {
                entity.apply_sample(&det, smoothing);
                entity
            }
            None => {
                debug!("{}: playback entity {} enters", T::KIND, id);
                entities.push(T::with_id(id));
                let entity = entities.last_mut().unwrap();
                // entering entities snap regardless of smoothing
                entity.apply_sample(&det, 0.0);
                entity
            }
        };
        map_keypoints_to_rect(entity.keypoints_mut(), rect);
        entity.update_derived();
        let meta = entity.meta_mut();
        meta.found_this_frame = true;
        meta.frames_not_found = 0;
        meta.normalized_set = true;
        meta.world_set = true;
    }
}

/// Plays a recorded document against three per-kind registries.
pub struct Player {
    width: f32,
    height: f32,
    hands: Track<Hand>,
    faces: Track<Face>,
    poses: Track<Pose>,
    duration_nanos: u64,
    playhead_nanos: u64,
    speed: f32,
    playing: bool,
    looping: bool,
    done: bool,
    /// Keypoint smoothing for replayed updates; snap outside (0, 0.99]
    smoothing: f32,
}

impl Player {
    pub fn load(path: impl AsRef<Path>) -> Result<Player, DocumentError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        info!("loaded recording {:?}", path.as_ref());
        Player::from_document(Document::from_json(&json)?)
    }

    pub fn from_document(doc: Document) -> Result<Player, DocumentError> {
        if doc.frames.is_empty() {
            return Err(DocumentError::MissingFrames);
        }
        let duration_nanos = doc.duration_nanos();
        let split = |kind: EntityKind| {
            doc.frames
                .iter()
                .filter(|f| f.kind == kind)
                .cloned()
                .collect::<Vec<_>>()
        };
        Ok(Player {
            width: doc.width,
            height: doc.height,
            hands: Track::new(split(EntityKind::Hand)),
            faces: Track::new(split(EntityKind::Face)),
            poses: Track::new(split(EntityKind::Pose)),
            duration_nanos,
            playhead_nanos: 0,
            speed: 1.0,
            playing: false,
            looping: false,
            done: false,
            smoothing: 0.0,
        })
    }

    pub fn play(&mut self) {
        if self.done {
            self.rewind();
        }
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn rewind(&mut self) {
        self.playhead_nanos = 0;
        self.done = false;
        self.hands.rewind();
        self.faces.rewind();
        self.poses.rewind();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 1.0);
    }

    /// Output rect for one kind; defaults to the document's video size.
    pub fn set_out_rect(&mut self, kind: EntityKind, rect: OutRect) {
        match kind {
            EntityKind::Hand => self.hands.out_rect = rect,
            EntityKind::Face => self.faces.out_rect = rect,
            EntityKind::Pose => self.poses.out_rect = rect,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_nanos as f64 / 1e9
    }

    pub fn position_secs(&self) -> f64 {
        self.playhead_nanos as f64 / 1e9
    }

    pub fn play_frame(&self, kind: EntityKind) -> PlayFrame {
        match kind {
            EntityKind::Hand => self.hands.play,
            EntityKind::Face => self.faces.play,
            EntityKind::Pose => self.poses.play,
        }
    }

    pub fn hands(&self) -> &[Hand] {
        &self.hands.entities
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces.entities
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses.entities
    }

    /// Advance the playhead and apply any frames it passed.
    pub fn update(&mut self, dt_secs: f32) {
        if !self.playing || self.done {
            return;
        }
        let advance = (dt_secs as f64 * self.speed as f64 * 1e9).max(0.0) as u64;
        self.playhead_nanos = self.playhead_nanos.saturating_add(advance);

        let fallback = OutRect::new(0.0, 0.0, self.width, self.height);
        self.hands
            .advance(self.playhead_nanos, self.smoothing, fallback);
        self.faces
            .advance(self.playhead_nanos, self.smoothing, fallback);
        self.poses
            .advance(self.playhead_nanos, self.smoothing, fallback);

        if self.playhead_nanos > self.duration_nanos {
            if self.looping {
                debug!("playback loops");
                self.rewind();
            } else {
                info!("playback finished");
                self.done = true;
                self.playing = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Handedness, Keypoint};
    use crate::frame::FrameObject;
    use nalgebra::Vector3;

    fn hand_object(id: u32, x: f32) -> FrameObject {
        let mut kps = vec![Keypoint::default(); 21];
        for kp in kps.iter_mut() {
            kp.pos_n = Vector3::new(x, 0.5, 0.0);
            kp.pos_world = Vector3::new(x, 0.0, 1.0);
        }
        FrameObject {
            id: Some(id),
            keypoints: kps,
            handedness: Some(Handedness::Left),
            hand_index: Some(0),
            blend_shapes: Vec::new(),
        }
    }

    fn two_frame_document() -> Document {
        let mut f0 = Frame::new(EntityKind::Hand, 0);
        f0.objects.push(hand_object(1, 0.2));
        f0.objects.push(hand_object(2, 0.8));
        let mut f1 = Frame::new(EntityKind::Hand, 100_000_000);
        f1.objects.push(hand_object(1, 0.3));
        Document {
            width: 100.0,
            height: 100.0,
            frames: vec![f0, f1],
        }
    }

    #[test]
    fn empty_document_is_rejected() {
        let doc = Document {
            width: 1.0,
            height: 1.0,
            frames: Vec::new(),
        };
        assert!(matches!(
            Player::from_document(doc),
            Err(DocumentError::MissingFrames)
        ));
    }

    #[test]
    fn frames_apply_as_the_playhead_passes_them() {
        let mut player = Player::from_document(two_frame_document()).unwrap();
        player.play();

        player.update(0.05);
        let pf = player.play_frame(EntityKind::Hand);
        assert!(pf.new_frame);
        assert_eq!(pf.current, 0);
        assert_eq!(pf.total, 2);
        assert_eq!(player.hands().len(), 2);
        // normalized 0.2 in a 100 px document
        assert!((player.hands()[0].keypoints[0].pos.x - 20.0).abs() < 1e-4);

        player.update(0.06);
        let pf = player.play_frame(EntityKind::Hand);
        assert!(pf.new_frame);
        assert_eq!(pf.current, 1);
        assert_eq!(pf.prev, 0);
        // hand 1 persists with the same identity, hand 2 left the frame
        assert_eq!(player.hands().len(), 1);
        assert_eq!(player.hands()[0].id, 1);
        assert!((player.hands()[0].keypoints[0].pos_n.x - 0.3).abs() < 1e-6);
    }

    #[test]
    fn no_new_frame_between_timestamps() {
        let mut player = Player::from_document(two_frame_document()).unwrap();
        player.play();
        player.update(0.01);
        assert!(player.play_frame(EntityKind::Hand).new_frame);
        player.update(0.01);
        assert!(!player.play_frame(EntityKind::Hand).new_frame);
        assert_eq!(player.hands().len(), 2);
    }

    #[test]
    fn playback_finishes_then_replays_from_the_top() {
        let mut player = Player::from_document(two_frame_document()).unwrap();
        player.play();
        player.update(0.2);
        assert!(player.is_done());
        assert!(!player.is_playing());

        player.play();
        assert!(!player.is_done());
        player.update(0.01);
        assert_eq!(player.play_frame(EntityKind::Hand).current, 0);
        assert_eq!(player.hands().len(), 2);
    }

    #[test]
    fn looping_wraps_without_stopping() {
        let mut player = Player::from_document(two_frame_document()).unwrap();
        player.set_looping(true);
        player.play();
        player.update(0.2);
        assert!(!player.is_done());
        assert!(player.is_playing());
        assert_eq!(player.position_secs(), 0.0);
        player.update(0.01);
        assert_eq!(player.play_frame(EntityKind::Hand).current, 0);
    }

    #[test]
    fn speed_scales_the_playhead() {
        let mut player = Player::from_document(two_frame_document()).unwrap();
        player.set_speed(0.25);
        player.play();
        // 0.2 s at quarter speed is 0.05 s, before the second frame
        player.update(0.2);
        assert_eq!(player.play_frame(EntityKind::Hand).current, 0);
        assert!(!player.is_done());
    }

    #[test]
    fn smoothed_replay_lags_the_recorded_positions() {
        let mut player = Player::from_document(two_frame_document()).unwrap();
        player.set_smoothing(0.5);
        player.play();
        player.update(0.05);
        player.update(0.06);
        // halfway between 0.2 and 0.3
        let x = player.hands()[0].keypoints[0].pos_n.x;
        assert!((x - 0.25).abs() < 1e-6, "got {}", x);
    }
}
