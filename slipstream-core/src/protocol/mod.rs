mod connection;
mod framing;
mod messages;

pub use connection::Connection;
pub use framing::{encode_frame, FrameScanner, FramingError, MAX_FRAME_LEN};
pub use messages::*;

/// The link a participant holds toward the relay.
pub type RelayConnection = Connection<RelayMessage, PlayerState>;
/// The link the relay holds toward one participant.
pub type ParticipantConnection = Connection<PlayerState, RelayMessage>;
