//! OSC wire schema.
//!
//! Entity messages go to `/<ns>/{hands,faces,poses}` for the normalized
//! channel and the same address with a `W` suffix for the world
//! channel. Arguments are a long frame number, an int entity ID and
//! three floats per keypoint. Control messages under `/<ns>/frame/`
//! carry the video size and per-kind output rects as four ints.

use nalgebra::Vector3;
use rosc::{OscMessage, OscType};

use crate::entity::{EntityKind, Keypoint, OutRect, Tracked};

/// Default address namespace
pub const DEFAULT_NAMESPACE: &str = "trk";

/// Which keypoint channel an entity message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Normalized,
    World,
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Source video dimensions
    Video { width: i32, height: i32 },
    /// Output rect for one entity kind
    Rect { kind: EntityKind, rect: OutRect },
    /// One entity's keypoints on one channel
    Entity {
        kind: EntityKind,
        channel: Channel,
        frame: i64,
        id: u32,
        points: Vec<Vector3<f32>>,
    },
}

fn plural(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Hand => "hands",
        EntityKind::Face => "faces",
        EntityKind::Pose => "poses",
    }
}

/// Stateless message builder/parser bound to one address namespace.
#[derive(Debug, Clone)]
pub struct Codec {
    namespace: String,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Codec {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn entity_address(&self, kind: EntityKind, channel: Channel) -> String {
        let suffix = match channel {
            Channel::Normalized => "",
            Channel::World => "W",
        };
        format!("/{}/{}{}", self.namespace, plural(kind), suffix)
    }

    pub fn encode_entity<T: Tracked>(
        &self,
        frame: i64,
        entity: &T,
        channel: Channel,
    ) -> OscMessage {
        self.encode_keypoints(T::KIND, channel, frame, entity.id(), entity.keypoints())
    }

    pub fn encode_keypoints(
        &self,
        kind: EntityKind,
        channel: Channel,
        frame: i64,
        id: u32,
        keypoints: &[Keypoint],
    ) -> OscMessage {
        let mut args = Vec::with_capacity(2 + keypoints.len() * 3);
        args.push(OscType::Long(frame));
        args.push(OscType::Int(id as i32));
        for kp in keypoints {
            let p = match channel {
                Channel::Normalized => kp.pos_n,
                Channel::World => kp.pos_world,
            };
            args.push(OscType::Float(p.x));
            args.push(OscType::Float(p.y));
            args.push(OscType::Float(p.z));
        }
        OscMessage {
            addr: self.entity_address(kind, channel),
            args,
        }
    }

    pub fn encode_video(&self, width: i32, height: i32) -> OscMessage {
        OscMessage {
            addr: format!("/{}/frame/video", self.namespace),
            args: vec![
                OscType::Int(0),
                OscType::Int(0),
                OscType::Int(width),
                OscType::Int(height),
            ],
        }
    }

    pub fn encode_rect(&self, kind: EntityKind, rect: &OutRect) -> OscMessage {
        OscMessage {
            addr: format!("/{}/frame/{}", self.namespace, plural(kind)),
            args: vec![
                OscType::Int(rect.x as i32),
                OscType::Int(rect.y as i32),
                OscType::Int(rect.width as i32),
                OscType::Int(rect.height as i32),
            ],
        }
    }

    /// Parse one message. Anything outside the namespace, malformed or
    /// too short comes back as `None` and is dropped by the caller.
    pub fn decode(&self, msg: &OscMessage) -> Option<WireMessage> {
        let path = msg.addr.strip_prefix('/')?;
        let rest = path.strip_prefix(self.namespace.as_str())?;
        let rest = rest.strip_prefix('/')?;

        if let Some(what) = rest.strip_prefix("frame/") {
            if msg.args.len() < 4 {
                return None;
            }
            let ints: Vec<i32> = msg.args.iter().filter_map(int_arg).collect();
            if ints.len() < 4 {
                return None;
            }
            return match what {
                "video" => Some(WireMessage::Video {
                    width: ints[2],
                    height: ints[3],
                }),
                "hands" | "faces" | "poses" => Some(WireMessage::Rect {
                    kind: EntityKind::parse(&what[..what.len() - 1]),
                    rect: OutRect::new(
                        ints[0] as f32,
                        ints[1] as f32,
                        ints[2] as f32,
                        ints[3] as f32,
                    ),
                }),
                _ => None,
            };
        }

        let (name, channel) = match rest.strip_suffix('W') {
            Some(name) => (name, Channel::World),
            None => (rest, Channel::Normalized),
        };
        let kind = match name {
            "hands" => EntityKind::Hand,
            "faces" => EntityKind::Face,
            "poses" => EntityKind::Pose,
            _ => return None,
        };

        // frame + id + at least one keypoint triple
        if msg.args.len() <= 2 {
            return None;
        }
        let frame = long_arg(&msg.args[0])?;
        let id = int_arg(&msg.args[1])? as u32;
        let mut points = Vec::with_capacity((msg.args.len() - 2) / 3);
        let mut triple = msg.args[2..].chunks_exact(3);
        for chunk in &mut triple {
            points.push(Vector3::new(
                float_arg(&chunk[0])?,
                float_arg(&chunk[1])?,
                float_arg(&chunk[2])?,
            ));
        }
        Some(WireMessage::Entity {
            kind,
            channel,
            frame,
            id,
            points,
        })
    }
}

fn int_arg(arg: &OscType) -> Option<i32> {
    match arg {
        OscType::Int(v) => Some(*v),
        OscType::Long(v) => Some(*v as i32),
        _ => None,
    }
}

fn long_arg(arg: &OscType) -> Option<i64> {
    match arg {
        OscType::Long(v) => Some(*v),
        OscType::Int(v) => Some(*v as i64),
        _ => None,
    }
}

fn float_arg(arg: &OscType) -> Option<f32> {
    match arg {
        OscType::Float(v) => Some(*v),
        OscType::Double(v) => Some(*v as f32),
        _ => None,
    }
}
