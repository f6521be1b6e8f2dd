//! Frame and document model shared by the recorder, player and OSC
//! codec.
//!
//! The document layer speaks the exact JSON field names produced by
//! existing capture tools, so recordings interchange cleanly; the typed
//! layer is what the rest of the crate works with.

use serde::{Deserialize, Serialize};

use crate::entity::{BlendShape, EntityKind, Handedness, Keypoint, Tracked};
use crate::error::DocumentError;

/// One object inside a frame: a single entity's landmarks plus its
/// kind-specific extras.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameObject {
    /// Identity, when the producer assigned one
    pub id: Option<u32>,
    pub keypoints: Vec<Keypoint>,
    pub handedness: Option<Handedness>,
    pub hand_index: Option<i32>,
    pub blend_shapes: Vec<BlendShape>,
}

impl FrameObject {
    /// View the object as an unidentified detection, for feeding
    /// through the normal entity-apply path.
    pub fn to_detection(&self) -> crate::entity::Detection {
        crate::entity::Detection {
            keypoints: self.keypoints.clone(),
            handedness: self.handedness,
            hand_index: self.hand_index.unwrap_or(-1),
            blend_shapes: self.blend_shapes.clone(),
        }
    }
}

/// All entities of one kind observed at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: EntityKind,
    /// Nanoseconds since the start of the recording
    pub timestamp_nanos: u64,
    pub objects: Vec<FrameObject>,
}

impl Frame {
    pub fn new(kind: EntityKind, timestamp_nanos: u64) -> Self {
        Self {
            kind,
            timestamp_nanos,
            objects: Vec::new(),
        }
    }

    /// Snapshot live entities into a frame.
    pub fn from_entities<'a, T>(entities: &'a [T], timestamp_nanos: u64) -> Self
    where
        T: Tracked,
        FrameObject: From<&'a T>,
    {
        let mut frame = Frame::new(T::KIND, timestamp_nanos);
        frame.objects.extend(entities.iter().map(FrameObject::from));
        frame
    }
}

impl From<&crate::entity::Hand> for FrameObject {
    fn from(hand: &crate::entity::Hand) -> Self {
        FrameObject {
            id: Some(hand.id),
            keypoints: hand.keypoints.clone(),
            handedness: hand.handedness,
            hand_index: Some(hand.hand_index),
            blend_shapes: Vec::new(),
        }
    }
}

impl From<&crate::entity::Face> for FrameObject {
    fn from(face: &crate::entity::Face) -> Self {
        FrameObject {
            id: Some(face.id),
            keypoints: face.keypoints.clone(),
            handedness: None,
            hand_index: None,
            blend_shapes: face.blend_shapes.clone(),
        }
    }
}

impl From<&crate::entity::Pose> for FrameObject {
    fn from(pose: &crate::entity::Pose) -> Self {
        FrameObject {
            id: Some(pose.id),
            keypoints: pose.keypoints.clone(),
            handedness: None,
            hand_index: None,
            blend_shapes: Vec::new(),
        }
    }
}

/// A complete recording: source dimensions plus every captured frame in
/// time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub width: f32,
    pub height: f32,
    pub frames: Vec<Frame>,
}

impl Document {
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(&RawDocument::from(self))?)
    }

    pub fn from_json(json: &str) -> Result<Document, DocumentError> {
        let raw: RawDocument = serde_json::from_str(json)?;
        Ok(Document::from(raw))
    }

    /// Frames of one kind, preserving recording order.
    pub fn frames_of(&self, kind: EntityKind) -> impl Iterator<Item = &Frame> {
        self.frames.iter().filter(move |f| f.kind == kind)
    }

    /// Duration covered by the recording.
    pub fn duration_nanos(&self) -> u64 {
        self.frames
            .iter()
            .map(|f| f.timestamp_nanos)
            .max()
            .unwrap_or(0)
    }
}

// --- document wire schema -------------------------------------------------

#[derive(Serialize, Deserialize)]
struct RawKeypoint {
    i: u32,
    #[serde(rename = "xN")]
    x_n: f32,
    #[serde(rename = "yN")]
    y_n: f32,
    #[serde(rename = "zN")]
    z_n: f32,
    #[serde(rename = "xW")]
    x_w: f32,
    #[serde(rename = "yW")]
    y_w: f32,
    #[serde(rename = "zW")]
    z_w: f32,
}

#[derive(Serialize, Deserialize)]
struct RawObject {
    // redundant with the frame-level type, but capture tools write it
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handed: Option<String>,
    kps: Vec<RawKeypoint>,
    #[serde(
        rename = "blendShapes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    blend_shapes: Vec<BlendShape>,
}

#[derive(Serialize, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    timestamp: u64,
    num: usize,
    objects: Vec<RawObject>,
}

#[derive(Serialize, Deserialize)]
struct RawDocument {
    width: i64,
    height: i64,
    frames: Vec<RawFrame>,
}

impl From<&Document> for RawDocument {
    fn from(doc: &Document) -> Self {
        RawDocument {
            width: doc.width as i64,
            height: doc.height as i64,
            frames: doc
                .frames
                .iter()
                .map(|frame| RawFrame {
                    kind: frame.kind.as_str().to_string(),
                    timestamp: frame.timestamp_nanos,
                    num: frame.objects.len(),
                    objects: frame
                        .objects
                        .iter()
                        .map(|obj| RawObject {
                            kind: Some(frame.kind.as_str().to_string()),
                            id: obj.id,
                            index: obj.hand_index,
                            handed: obj.handedness.map(|h| h.as_str().to_string()),
                            kps: obj
                                .keypoints
                                .iter()
                                .enumerate()
                                .map(|(i, kp)| RawKeypoint {
                                    i: i as u32,
                                    x_n: kp.pos_n.x,
                                    y_n: kp.pos_n.y,
                                    z_n: kp.pos_n.z,
                                    x_w: kp.pos_world.x,
                                    y_w: kp.pos_world.y,
                                    z_w: kp.pos_world.z,
                                })
                                .collect(),
                            blend_shapes: obj.blend_shapes.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        Document {
            width: raw.width as f32,
            height: raw.height as f32,
            frames: raw
                .frames
                .into_iter()
                // frames that recorded nothing carry no information
                .filter(|f| !f.objects.is_empty())
                .map(|frame| Frame {
                    kind: EntityKind::parse(&frame.kind),
                    timestamp_nanos: frame.timestamp,
                    objects: frame
                        .objects
                        .into_iter()
                        .map(|obj| FrameObject {
                            id: obj.id,
                            handedness: obj.handed.as_deref().and_then(Handedness::parse),
                            hand_index: obj.index,
                            keypoints: obj
                                .kps
                                .into_iter()
                                .map(|kp| Keypoint {
                                    pos: Default::default(),
                                    pos_n: nalgebra::Vector3::new(kp.x_n, kp.y_n, kp.z_n),
                                    pos_world: nalgebra::Vector3::new(kp.x_w, kp.y_w, kp.z_w),
                                })
                                .collect(),
                            blend_shapes: obj.blend_shapes,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
