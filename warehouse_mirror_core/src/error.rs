/// Errors raised while validating or applying a snapshot.
///
/// None of these leave the mirror partially updated: every snapshot is
/// validated in full before the first scene mutation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MirrorError {
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("non-finite position for {kind} #{index}")]
    NonFinitePosition { kind: &'static str, index: usize },
    #[error("snapshot mixes boxes with and without explicit ids")]
    MixedBoxIdentity,
    #[error("two shelves share position ({x}, {y})")]
    DuplicateShelfPosition { x: f32, y: f32 },
    #[error("mirror has not been initialized")]
    NotInitialized,
    #[error("mirror is already initialized")]
    AlreadyInitialized,
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::MalformedSnapshot(err.to_string())
    }
}

/// Errors raised by a snapshot source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Snapshot(#[from] MirrorError),
}
