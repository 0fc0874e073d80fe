use std::{fs, path::Path};

use crate::{
    FetchError, MirrorError,
    detections::DetectionReport,
    snapshot::{RemoteSnapshot, SnapshotMessage},
};

/// Supplies snapshots to the viewer loop.
///
/// Callers fetch and reconcile one snapshot at a time; implementations need
/// not be thread-safe.
pub trait SnapshotSource {
    /// The snapshot the mirror is initialized from.
    fn init(&mut self) -> Result<SnapshotMessage, FetchError>;

    /// The next state snapshot, or [`SnapshotMessage::End`] once the run is over.
    fn next(&mut self) -> Result<SnapshotMessage, FetchError>;

    /// Recent camera detections. Sources without a detection feed report none.
    fn detections(&mut self) -> Result<Vec<DetectionReport>, FetchError> {
        Ok(Vec::new())
    }
}

/// Replays a recorded run: a JSON array of snapshots.
///
/// The first snapshot initializes the mirror and is also the first state
/// served, the same way the simulation server walks its step log.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    frames: Vec<RemoteSnapshot>,
    cursor: usize,
}

impl ReplaySource {
    pub fn from_json(json: &str) -> Result<Self, FetchError> {
        let frames: Vec<RemoteSnapshot> = serde_json::from_str(json).map_err(MirrorError::from)?;
        if frames.is_empty() {
            return Err(MirrorError::MalformedSnapshot("replay holds no snapshots".into()).into());
        }
        Ok(ReplaySource { frames, cursor: 0 })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FetchError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl SnapshotSource for ReplaySource {
    fn init(&mut self) -> Result<SnapshotMessage, FetchError> {
        Ok(SnapshotMessage::Snapshot(self.frames[0].clone()))
    }

    fn next(&mut self) -> Result<SnapshotMessage, FetchError> {
        match self.frames.get(self.cursor) {
            Some(frame) => {
                self.cursor += 1;
                Ok(SnapshotMessage::Snapshot(frame.clone()))
            }
            None => Ok(SnapshotMessage::End),
        }
    }
}
