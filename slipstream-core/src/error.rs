use std::io;

/// Sync protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Peer closed the connection")]
    Disconnected,

    #[error("Transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error("Codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Track definition errors.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Failed to read track file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse track file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Track outline needs at least 3 vertices")]
    DegenerateOutline,
}
