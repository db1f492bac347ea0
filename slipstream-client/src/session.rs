use std::path::Path;

use slipstream_core::error::TrackError;
use slipstream_core::physics::{CarState, TickInput};
use slipstream_core::protocol::PlayerState;
use slipstream_core::race::RaceMachine;
use slipstream_core::track::{Track, TrackGeometry};
use slipstream_core::{PlayerID, GLOBAL_CONFIG};

/// One participant's world: the track, its rasterized mask and the
/// state machine driving the local car. Remote cars never enter the
/// session; they are display-only and live in the relay link.
pub struct Session {
    track: Track,
    geometry: TrackGeometry,
    machine: RaceMachine,
    dt: f64,
}

impl Session {
    /// Start a session on the configured track: a YAML file when
    /// `track_file` is set, the built-in circuit otherwise.
    pub fn new() -> Result<Session, TrackError> {
        let track = if GLOBAL_CONFIG.track_file.is_empty() {
            Track::default_circuit()
        } else {
            log::info!("loading track from {}", GLOBAL_CONFIG.track_file);
            Track::load(Path::new(&GLOBAL_CONFIG.track_file))?
        };
        Ok(Session::with_track(track))
    }

    pub fn with_track(track: Track) -> Session {
        let geometry = TrackGeometry::build(&track);
        let machine = RaceMachine::new(track.start, GLOBAL_CONFIG.max_laps);
        Session {
            track,
            geometry,
            machine,
            dt: GLOBAL_CONFIG.tick_seconds(),
        }
    }

    /// Advance the local car by one fixed tick.
    pub fn tick(&mut self, input: TickInput) {
        self.machine
            .advance(input, &self.track, &self.geometry, self.dt);
    }

    pub fn assign_id(&mut self, id: PlayerID) {
        self.machine.assign_id(id);
    }

    /// The wire-shaped view of the local car, sent after each tick.
    pub fn snapshot(&self) -> PlayerState {
        self.machine.snapshot()
    }

    pub fn car_state(&self) -> &CarState {
        self.machine.car()
    }

    pub fn on_track(&self) -> bool {
        self.machine.on_track()
    }

    pub fn machine(&self) -> &RaceMachine {
        &self.machine
    }

    pub fn track(&self) -> &Track {
        &self.track
    }
}
