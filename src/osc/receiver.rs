//! UDP receiver that mirrors remote entities.
//!
//! Entities are registered by their wire ID, so no re-matching happens
//! on this side; identity is whatever the sender decided. A keypoint
//! update is applied only when its frame number is newer than the last
//! one applied to that entity, which keeps reordered datagrams from
//! stepping backwards.

use std::net::UdpSocket;

use log::{debug, trace, warn};
use nalgebra::Vector3;
use rosc::{decoder, OscMessage, OscPacket};

use crate::entity::{map_keypoints_to_rect, EntityKind, Face, Hand, Keypoint, OutRect, Pose, Tracked};
use crate::error::TransportError;
use crate::osc::codec::{Channel, Codec, WireMessage, DEFAULT_NAMESPACE};

/// Ticks without any message before an entity is dropped
pub const DEFAULT_TIMEOUT_TICKS: u32 = 40;
/// Messages drained per update, so a flood cannot stall the caller
const MAX_MESSAGES_PER_UPDATE: usize = 999;
/// Largest accepted datagram; face messages run several KiB
const RECV_BUF_SIZE: usize = 65_507;

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub namespace: String,
    pub timeout_ticks: u32,
    /// Multiplier on incoming normalized x/y, for mapping between
    /// mismatched capture setups
    pub scale_x: f32,
    pub scale_y: f32,
    /// Offset added to mapped output positions, in output pixels
    pub shift_x: f32,
    pub shift_y: f32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            scale_x: 1.0,
            scale_y: 1.0,
            shift_x: 0.0,
            shift_y: 0.0,
        }
    }
}

/// Entities of one kind keyed by wire ID.
struct Registry<T: Tracked> {
    entities: Vec<T>,
    out_rect: OutRect,
    has_new_data: bool,
}

impl<T: Tracked> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            out_rect: OutRect::default(),
            has_new_data: false,
        }
    }
}

impl<T: Tracked> Registry<T> {
    fn age(&mut self, dt: f32, timeout_ticks: u32) {
        for entity in self.entities.iter_mut() {
            *entity.age_mut() += dt;
            entity.tick(dt);
            let meta = entity.meta_mut();
            meta.found_this_frame = false;
            meta.frames_not_found += 1;
        }
        self.entities
            .retain(|e| e.meta().frames_not_found <= timeout_ticks);
    }

    fn get_or_create(&mut self, id: u32) -> &mut T {
        if let Some(i) = self.entities.iter().position(|e| e.id() == id) {
            return &mut self.entities[i];
        }
        debug!("{}: registering remote entity {}", T::KIND, id);
        self.entities.push(T::with_id(id));
        self.entities.last_mut().unwrap()
    }

    fn apply(
        &mut self,
        channel: Channel,
        frame: i64,
        id: u32,
        points: &[Vector3<f32>],
        config: &ReceiverConfig,
        video_rect: OutRect,
    ) {
        self.has_new_data = true;
        let rect = if self.out_rect.width >= 1.0 {
            self.out_rect
        } else {
            video_rect
        };
        let entity = self.get_or_create(id);
        let meta = entity.meta_mut();
        meta.found_this_frame = true;
        meta.frames_not_found = 0;
        if meta.most_recent_frame < frame {
            meta.most_recent_frame = frame;
            let kps = entity.keypoints_mut();
            kps.resize(points.len(), Keypoint::default());
            for (kp, p) in kps.iter_mut().zip(points) {
                match channel {
                    Channel::Normalized => {
                        kp.pos_n =
                            Vector3::new(p.x * config.scale_x, p.y * config.scale_y, p.z * config.scale_x);
                    }
                    Channel::World => kp.pos_world = *p,
                }
            }
            map_keypoints_to_rect(kps, &rect);
            for kp in kps.iter_mut() {
                kp.pos.x += config.shift_x;
                kp.pos.y += config.shift_y;
            }
            entity.update_derived();
        }
        let meta = entity.meta_mut();
        match channel {
            Channel::Normalized => meta.normalized_set = true,
            Channel::World => meta.world_set = true,
        }
    }
}

pub struct Receiver {
    socket: UdpSocket,
    codec: Codec,
    config: ReceiverConfig,
    video_width: i32,
    video_height: i32,
    hands: Registry<Hand>,
    faces: Registry<Face>,
    poses: Registry<Pose>,
    time_since_data: f32,
    buf: Vec<u8>,
}

impl Receiver {
    pub fn bind(port: u16) -> Result<Receiver, TransportError> {
        Receiver::bind_with(port, ReceiverConfig::default())
    }

    pub fn bind_with(port: u16, config: ReceiverConfig) -> Result<Receiver, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        debug!("osc receiver on {:?}", socket.local_addr().ok());
        Ok(Receiver {
            socket,
            codec: Codec::new(config.namespace.clone()),
            config,
            video_width: 0,
            video_height: 0,
            hands: Registry::default(),
            faces: Registry::default(),
            poses: Registry::default(),
            time_since_data: 0.0,
            buf: vec![0; RECV_BUF_SIZE],
        })
    }

    pub fn local_port(&self) -> Option<u16> {
        self.socket.local_addr().ok().map(|a| a.port())
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ReceiverConfig {
        &mut self.config
    }

    pub fn video_width(&self) -> i32 {
        self.video_width
    }

    pub fn video_height(&self) -> i32 {
        self.video_height
    }

    /// Seconds since any message arrived.
    pub fn time_since_data(&self) -> f32 {
        self.time_since_data
    }

    pub fn has_new_hand_data(&self) -> bool {
        self.hands.has_new_data
    }

    pub fn has_new_face_data(&self) -> bool {
        self.faces.has_new_data
    }

    pub fn has_new_pose_data(&self) -> bool {
        self.poses.has_new_data
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

    /// Hands with both channels delivered at least once.
    pub fn valid_hands(&self) -> impl Iterator<Item = &Hand> {
        self.hands.entities.iter().filter(|h| h.meta().is_valid())
    }

    pub fn valid_faces(&self) -> impl Iterator<Item = &Face> {
        self.faces.entities.iter().filter(|f| f.meta().is_valid())
    }

    pub fn valid_poses(&self) -> impl Iterator<Item = &Pose> {
        self.poses.entities.iter().filter(|p| p.meta().is_valid())
    }

    fn video_rect(&self) -> OutRect {
        OutRect::new(0.0, 0.0, self.video_width as f32, self.video_height as f32)
    }

    /// Age entities, then drain and apply pending datagrams.
    pub fn update(&mut self, dt_secs: f32) {
        self.time_since_data += dt_secs;
        self.hands.has_new_data = false;
        self.faces.has_new_data = false;
        self.poses.has_new_data = false;
        let timeout = self.config.timeout_ticks;
        self.hands.age(dt_secs, timeout);
        self.faces.age(dt_secs, timeout);
        self.poses.age(dt_secs, timeout);

        let mut handled = 0;
        while handled < MAX_MESSAGES_PER_UPDATE {
            let n = match self.socket.recv(&mut self.buf) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("osc receive failed: {}", e);
                    break;
                }
            };
            let packet = match decoder::decode_udp(&self.buf[..n]) {
                Ok((_, packet)) => packet,
                Err(e) => {
                    trace!("undecodable datagram: {}", e);
                    continue;
                }
            };
            handled += self.handle_packet(packet);
        }
    }

    fn handle_packet(&mut self, packet: OscPacket) -> usize {
        match packet {
            OscPacket::Message(msg) => {
                self.handle_message(&msg);
                1
            }
            OscPacket::Bundle(bundle) => bundle
                .content
                .into_iter()
                .map(|p| self.handle_packet(p))
                .sum(),
        }
    }

    fn handle_message(&mut self, msg: &OscMessage) {
        let Some(wire) = self.codec.decode(msg) else {
            return;
        };
        self.time_since_data = 0.0;
        match wire {
            WireMessage::Video { width, height } => {
                self.video_width = width;
                self.video_height = height;
            }
            WireMessage::Rect { kind, rect } => match kind {
                EntityKind::Hand => self.hands.out_rect = rect,
                EntityKind::Face => self.faces.out_rect = rect,
                EntityKind::Pose => self.poses.out_rect = rect,
            },
            WireMessage::Entity {
                kind,
                channel,
                frame,
                id,
                points,
            } => {
                let video_rect = self.video_rect();
                match kind {
                    EntityKind::Hand => {
                        self.hands
                            .apply(channel, frame, id, &points, &self.config, video_rect)
                    }
                    EntityKind::Face => {
                        self.faces
                            .apply(channel, frame, id, &points, &self.config, video_rect)
                    }
                    EntityKind::Pose => {
                        self.poses
                            .apply(channel, frame, id, &points, &self.config, video_rect)
                    }
                }
            }
        }
    }
}
