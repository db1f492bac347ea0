use slipstream_core::error::TrackError;
use slipstream_core::physics::{CarState, TickInput};
use slipstream_core::protocol::PlayerState;
use slipstream_core::PlayerID;

use crate::net::RelayLink;
use crate::session::Session;

/// What the rendering layer polls once per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceStatus {
    pub lap_count: u32,
    pub max_laps: u32,
    pub best_lap: Option<f64>,
    pub current_lap_elapsed: f64,
    pub finished: bool,
    pub winner: Option<PlayerID>,
    pub positions: Vec<PlayerID>,
}

/// A participant: the local session plus, when the relay is reachable,
/// the link replicating state both ways.
pub struct GameClient {
    session: Session,
    link: Option<RelayLink>,
}

impl GameClient {
    /// Set up the session and try the relay at `ip_addr`. When the
    /// relay cannot be reached the client runs single player; the
    /// simulation never depends on the network.
    pub fn new(ip_addr: String) -> Result<GameClient, TrackError> {
        let session = Session::new()?;
        let link = match RelayLink::connect(&ip_addr) {
            Ok(link) => Some(link),
            Err(err) => {
                log::warn!("no relay at {}, single player mode: {}", ip_addr, err);
                None
            }
        };
        Ok(GameClient { session, link })
    }

    /// Advance one tick and report the resulting state to the relay.
    pub fn tick(&mut self, input: TickInput) {
        if self.session.car_state().id == 0 {
            if let Some(id) = self.link.as_ref().and_then(|link| link.assigned_id()) {
                self.session.assign_id(id);
            }
        }
        self.session.tick(input);
        if let Some(link) = &self.link {
            link.send_state(self.session.snapshot());
        }
    }

    pub fn car_state(&self) -> &CarState {
        self.session.car_state()
    }

    pub fn on_track(&self) -> bool {
        self.session.on_track()
    }

    /// Everyone else's last known state; empty in single player mode.
    pub fn remote_players(&self) -> Vec<PlayerState> {
        match &self.link {
            Some(link) => link.remote_players(),
            None => Vec::new(),
        }
    }

    pub fn race_status(&self) -> RaceStatus {
        let machine = self.session.machine();
        let outcome = self.link.as_ref().and_then(|link| link.outcome());
        let (winner, positions) = match outcome {
            Some(outcome) => (Some(outcome.winner), outcome.positions),
            None => (None, Vec::new()),
        };
        RaceStatus {
            lap_count: machine.lap_count(),
            max_laps: machine.max_laps(),
            best_lap: machine.best_lap(),
            current_lap_elapsed: machine.current_lap_elapsed(),
            finished: machine.finished(),
            winner,
            positions,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_online(&self) -> bool {
        self.link.is_some()
    }
}
