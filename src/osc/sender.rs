//! UDP broadcaster for tracked entities.
//!
//! Each tick sends every entity twice, once per keypoint channel, and a
//! periodic heartbeat carries the video size and per-kind output rects
//! so late joiners can map normalized positions.

use std::collections::HashMap;
use std::net::{ToSocketAddrs, UdpSocket};

use log::{debug, trace};
use rosc::{encoder, OscMessage, OscPacket};

use crate::entity::{EntityKind, OutRect, Tracked};
use crate::error::TransportError;
use crate::osc::codec::{Channel, Codec};

/// Seconds between heartbeat control messages
pub const DEFAULT_HEARTBEAT_SECS: f32 = 1.0;

pub struct Sender {
    socket: UdpSocket,
    codec: Codec,
    frame: i64,
    video_width: i32,
    video_height: i32,
    out_rects: HashMap<EntityKind, OutRect>,
    heartbeat_secs: f32,
    heartbeat_elapsed: f32,
}

impl Sender {
    /// Connect toward a destination such as `"127.0.0.1:9009"`.
    pub fn connect<A: ToSocketAddrs>(target: A) -> Result<Sender, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(target)?;
        debug!("osc sender -> {:?}", socket.peer_addr().ok());
        Ok(Sender {
            socket,
            codec: Codec::default(),
            // receivers gate on strictly-newer frame numbers, so start
            // above their initial watermark of zero
            frame: 1,
            video_width: 0,
            video_height: 0,
            out_rects: HashMap::new(),
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            // fire the first heartbeat on the first tick
            heartbeat_elapsed: f32::MAX,
        })
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Sender {
        self.codec = Codec::new(namespace);
        self
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn set_heartbeat_secs(&mut self, secs: f32) {
        self.heartbeat_secs = secs;
    }

    /// Source video dimensions, announced in the heartbeat. Kinds with
    /// no explicit rect default to the full video.
    pub fn set_video_size(&mut self, width: i32, height: i32) {
        self.video_width = width;
        self.video_height = height;
    }

    pub fn set_out_rect(&mut self, kind: EntityKind, rect: OutRect) {
        self.out_rects.insert(kind, rect);
    }

    fn out_rect(&self, kind: EntityKind) -> OutRect {
        self.out_rects.get(&kind).copied().unwrap_or_else(|| {
            OutRect::new(0.0, 0.0, self.video_width as f32, self.video_height as f32)
        })
    }

    fn send_message(&self, msg: OscMessage) -> Result<(), TransportError> {
        let buf = encoder::encode(&OscPacket::Message(msg))?;
        self.socket.send(&buf)?;
        Ok(())
    }

    /// Advance the frame counter and emit the heartbeat when due.
    pub fn tick(&mut self, dt_secs: f32) -> Result<(), TransportError> {
        self.frame += 1;
        if self.heartbeat_secs <= 0.0 {
            self.heartbeat_elapsed = 0.0;
            return Ok(());
        }
        self.heartbeat_elapsed += dt_secs;
        if self.heartbeat_elapsed >= self.heartbeat_secs {
            self.heartbeat_elapsed = 0.0;
            self.send_heartbeat()?;
        }
        Ok(())
    }

    /// Send the video size and each kind's output rect immediately.
    pub fn send_heartbeat(&self) -> Result<(), TransportError> {
        trace!("osc heartbeat {}x{}", self.video_width, self.video_height);
        self.send_message(self.codec.encode_video(self.video_width, self.video_height))?;
        for kind in [EntityKind::Hand, EntityKind::Face, EntityKind::Pose] {
            let rect = self.out_rect(kind);
            self.send_message(self.codec.encode_rect(kind, &rect))?;
        }
        Ok(())
    }

    /// Send every entity on both channels, stamped with the current
    /// frame number.
    pub fn send_entities<T: Tracked>(&self, entities: &[T]) -> Result<(), TransportError> {
        for entity in entities {
            if entity.keypoints().is_empty() {
                continue;
            }
            self.send_message(self.codec.encode_entity(self.frame, entity, Channel::Normalized))?;
            self.send_message(self.codec.encode_entity(self.frame, entity, Channel::World))?;
        }
        Ok(())
    }

    pub fn frame(&self) -> i64 {
        self.frame
    }
}
