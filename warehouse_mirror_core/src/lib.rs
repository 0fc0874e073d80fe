use glam::Vec3;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod detections;
pub mod error;
pub mod fetch;
pub mod mirror;
pub mod raster;
pub mod scene;
pub mod snapshot;

pub use config::MirrorConfig;
pub use error::{FetchError, MirrorError};
pub use mirror::{ReconcileReport, StateMirror};

/// Identifier the simulation server assigns to an agent.
pub type AgentId = i64;

/// A point on the warehouse floor, as reported by the server.
///
/// On the wire this is a two-element array `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Position { x, y }
    }

    /// Lifts the floor position into scene space. The floor `y` becomes the
    /// scene `z` axis; `height` is the vertical coordinate.
    pub fn to_scene(self, height: f32) -> Vec3 {
        Vec3::new(self.x, height, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for Position {
    fn from([x, y]: [f32; 2]) -> Self {
        Position { x, y }
    }
}

impl From<Position> for [f32; 2] {
    fn from(position: Position) -> Self {
        [position.x, position.y]
    }
}
