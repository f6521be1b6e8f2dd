//! In-memory recorder that captures entity frames and writes one JSON
//! document when stopped.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};

use crate::entity::Tracked;
use crate::error::DocumentError;
use crate::frame::{Document, Frame, FrameObject};

struct Session {
    path: PathBuf,
    doc: Document,
    /// Set on the first captured frame; timestamps count from it
    epoch: Option<Instant>,
}

/// Captures frames into memory; nothing touches disk until [`stop`].
///
/// [`stop`]: Recorder::stop
#[derive(Default)]
pub struct Recorder {
    session: Option<Session>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Frames captured so far in the active session.
    pub fn frame_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.doc.frames.len())
    }

    /// Begin a session writing to `path`. `width` and `height` describe
    /// the source video and are stored in the document header.
    pub fn start(
        &mut self,
        path: impl AsRef<Path>,
        width: f32,
        height: f32,
    ) -> Result<(), DocumentError> {
        if self.session.is_some() {
            return Err(DocumentError::RecordingActive);
        }
        let path = path.as_ref();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(DocumentError::BadExtension(
                path.to_string_lossy().into_owned(),
            ));
        }
        info!("recording to {:?}", path);
        self.session = Some(Session {
            path: path.to_path_buf(),
            doc: Document {
                width,
                height,
                frames: Vec::new(),
            },
            epoch: None,
        });
        Ok(())
    }

    /// Capture the current entities of one kind. The first capture of a
    /// session defines timestamp zero. No-op outside a session.
    pub fn record<'a, T>(&mut self, entities: &'a [T])
    where
        T: Tracked,
        FrameObject: From<&'a T>,
    {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let timestamp_nanos = match session.epoch {
            Some(epoch) => epoch.elapsed().as_nanos() as u64,
            None => {
                session.epoch = Some(Instant::now());
                0
            }
        };
        session
            .doc
            .frames
            .push(Frame::from_entities(entities, timestamp_nanos));
    }

    /// Append a frame carrying its own timestamp, for assembling
    /// documents offline. No-op outside a session.
    pub fn record_frame(&mut self, frame: Frame) {
        if let Some(session) = self.session.as_mut() {
            session.doc.frames.push(frame);
        }
    }

    /// Finish the session and write the document. Returns the written
    /// path, or `None` when no session was active.
    pub fn stop(&mut self) -> Result<Option<PathBuf>, DocumentError> {
        let Some(session) = self.session.take() else {
            debug!("stop with no active recording");
            return Ok(None);
        };
        let json = session.doc.to_json()?;
        std::fs::write(&session.path, json)?;
        info!(
            "wrote {} frames to {:?}",
            session.doc.frames.len(),
            session.path
        );
        Ok(Some(session.path))
    }

    /// Discard the session without writing anything.
    pub fn abort(&mut self) {
        if self.session.take().is_some() {
            info!("recording aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Detection, EntityKind, Hand, Keypoint, Tracked};
    use nalgebra::Vector3;

    fn hand(id: u32, x: f32) -> Hand {
        let mut kps = vec![Keypoint::default(); 21];
        kps[0].pos_n = Vector3::new(x, 0.5, 0.0);
        let mut hand = Hand::from_detection(0, &Detection::from_keypoints(kps));
        hand.id = id;
        hand
    }

    #[test]
    fn rejects_non_json_paths() {
        let mut rec = Recorder::new();
        let err = rec.start("/tmp/capture.bin", 640.0, 480.0).unwrap_err();
        assert!(matches!(err, DocumentError::BadExtension(_)));
        assert!(!rec.is_recording());
    }

    #[test]
    fn rejects_overlapping_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new();
        rec.start(dir.path().join("a.json"), 640.0, 480.0).unwrap();
        let err = rec
            .start(dir.path().join("b.json"), 640.0, 480.0)
            .unwrap_err();
        assert!(matches!(err, DocumentError::RecordingActive));
        rec.abort();
        assert!(!rec.is_recording());
    }

    #[test]
    fn written_document_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.json");
        let mut rec = Recorder::new();
        rec.start(&path, 1280.0, 720.0).unwrap();
        rec.record(&[hand(1, 0.3)]);
        std::thread::sleep(std::time::Duration::from_millis(5));
        rec.record(&[hand(1, 0.4), hand(2, 0.8)]);
        assert_eq!(rec.frame_count(), 2);
        let written = rec.stop().unwrap().expect("path");
        assert_eq!(written, path);

        let doc = Document::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc.width, 1280.0);
        let frames: Vec<_> = doc.frames_of(EntityKind::Hand).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].timestamp_nanos, 0);
        assert!(frames[1].timestamp_nanos > 0);
        assert_eq!(frames[1].objects.len(), 2);
        assert_eq!(frames[1].objects[1].id, Some(2));
        assert!((frames[1].objects[0].keypoints[0].pos_n.x - 0.4).abs() < 1e-6);
    }

    #[test]
    fn explicit_timestamps_survive_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.json");
        let mut rec = Recorder::new();
        rec.start(&path, 640.0, 480.0).unwrap();
        let mut frame = Frame::new(EntityKind::Pose, 2_500_000_000);
        frame.objects.push(FrameObject::from(&crate::entity::Pose::with_id(9)));
        rec.record_frame(frame);
        rec.stop().unwrap();

        let doc = Document::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc.frames[0].timestamp_nanos, 2_500_000_000);
        assert_eq!(doc.frames[0].objects[0].id, Some(9));
    }

    #[test]
    fn stop_without_session_is_a_no_op() {
        let mut rec = Recorder::new();
        assert_eq!(rec.stop().unwrap(), None);
    }
}
