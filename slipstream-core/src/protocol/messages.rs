use std::collections::HashMap;

use glam::DVec2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::protocol::framing;
use crate::PlayerID;

/// Full per-car state as it travels over the wire. Participants send
/// one of these every tick; the relay stamps the sender id before
/// fanning it out, so the id a participant puts here is advisory.
///
/// `finished` and `totalTime` joined the format later than the rest,
/// so they default when a peer omits them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: PlayerID,
    pub position: DVec2,
    pub angle: f64,
    pub lap: u32,
    pub checkpoint_index: u32,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub total_time: f64,
}

/// Final ranking, winner first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceOutcome {
    pub winner: PlayerID,
    pub positions: Vec<PlayerID>,
}

/// Messages the relay sends to participants. Nothing on the wire tags
/// the variant; each shape is told apart by the fields it carries, and
/// unknown extra fields are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayMessage {
    /// Sent once on accept with the id the relay assigned.
    Welcome { id: PlayerID },
    /// Authoritative view of every registered car.
    Snapshot {
        #[serde(deserialize_with = "players_by_id")]
        players: HashMap<PlayerID, PlayerState>,
    },
    /// Sent once the ranking is sealed.
    RaceOver(RaceOutcome),
}

/// JSON object keys are strings, and the untagged dispatch above keeps
/// them buffered as strings instead of re-reading them as integers, so
/// the id keys have to be parsed by hand.
fn players_by_id<'de, D>(deserializer: D) -> Result<HashMap<PlayerID, PlayerState>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let keyed = HashMap::<String, PlayerState>::deserialize(deserializer)?;
    keyed
        .into_iter()
        .map(|(key, state)| {
            key.parse::<PlayerID>()
                .map(|id| (id, state))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

/// Anything that can cross the relay link as one frame.
pub trait Message: Serialize + DeserializeOwned {
    fn to_frame(&self) -> Result<Vec<u8>, SyncError> {
        Ok(framing::encode_frame(self)?)
    }

    fn from_frame(frame: &[u8]) -> Result<Self, SyncError> {
        Ok(serde_json::from_slice(frame)?)
    }
}

impl Message for PlayerState {}
impl Message for RelayMessage {}
