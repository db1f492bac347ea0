use std::collections::HashMap;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use slipstream_core::error::SyncError;
use slipstream_core::protocol::{Message, ParticipantConnection, PlayerState, RelayMessage};
use slipstream_core::{PlayerID, GLOBAL_CONFIG};

use crate::coordinator::RaceCoordinator;

struct RelayState {
    next_id: PlayerID,
    peers: HashMap<PlayerID, TcpStream>,
    states: HashMap<PlayerID, PlayerState>,
    coordinator: RaceCoordinator,
}

/// Roster shared by every handler thread. All writes to any peer
/// happen under this lock, so frames from different threads can never
/// interleave on a socket.
pub struct RelayRegistry {
    state: Mutex<RelayState>,
}

impl RelayRegistry {
    pub fn new() -> RelayRegistry {
        RelayRegistry {
            state: Mutex::new(RelayState {
                next_id: 1,
                peers: HashMap::new(),
                states: HashMap::new(),
                coordinator: RaceCoordinator::new(),
            }),
        }
    }

    /// Admit a connection: assign the next id, keep the write half and
    /// greet the participant. A sealed outcome is replayed so late
    /// joiners still learn how the race ended.
    fn register(&self, stream: TcpStream) -> Result<PlayerID, SyncError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;

        stream.set_write_timeout(Some(Duration::from_millis(GLOBAL_CONFIG.poll_timeout_ms)))?;
        state.peers.insert(id, stream);

        let welcome = RelayMessage::Welcome { id }.to_frame()?;
        write_to(&mut state, id, &welcome);

        if let Some(outcome) = state.coordinator.outcome().cloned() {
            let frame = RelayMessage::RaceOver(outcome).to_frame()?;
            write_to(&mut state, id, &frame);
        }
        Ok(id)
    }

    /// Apply one participant update. The relay's id assignment
    /// overrides whatever the sender stamped, everyone else gets the
    /// refreshed snapshot, and a finish report may seal the race.
    fn update(&self, id: PlayerID, mut update: PlayerState) {
        let mut state = self.state.lock().unwrap();
        // a failed fan-out write may have evicted this peer while its
        // handler was parked in recv; late updates must not resurrect
        // the car
        if !state.peers.contains_key(&id) {
            return;
        }
        update.id = id;
        let finished = update.finished;
        let total_time = update.total_time;
        state.states.insert(id, update);

        broadcast_snapshot(&mut state, Some(id));
        if finished {
            state.coordinator.record_finish(id, total_time);
        }
        seal_if_complete(&mut state);
    }

    /// Forget a connection. The survivors get a roster without the
    /// car, and the race may seal if it was the last one still racing.
    fn remove(&self, id: PlayerID) {
        let mut state = self.state.lock().unwrap();
        state.peers.remove(&id);
        state.states.remove(&id);

        broadcast_snapshot(&mut state, None);
        seal_if_complete(&mut state);
    }

    #[cfg(test)]
    fn peer_count(&self) -> usize {
        self.state.lock().unwrap().peers.len()
    }
}

/// Write one frame to one peer. On failure the peer and its car are
/// evicted so a dead socket cannot wedge the fan-out. The peer's
/// handler keeps polling until the socket dies or idles out; `update`
/// ignores it from here on. Returns false when the peer was evicted.
fn write_to(state: &mut RelayState, id: PlayerID, frame: &[u8]) -> bool {
    let result = match state.peers.get_mut(&id) {
        Some(stream) => stream.write_all(frame),
        None => return true,
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            log::warn!("evicting player {}: write failed: {}", id, err);
            state.peers.remove(&id);
            state.states.remove(&id);
            false
        }
    }
}

/// Send the current roster to every peer except `exclude`. A failed
/// write evicts the peer and changes the roster, so the survivors get
/// a fresh snapshot on the next pass.
fn broadcast_snapshot(state: &mut RelayState, exclude: Option<PlayerID>) {
    loop {
        let snapshot = RelayMessage::Snapshot {
            players: state.states.clone(),
        };
        let frame = match snapshot.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("could not encode snapshot: {}", err);
                return;
            }
        };

        let targets: Vec<PlayerID> = state
            .peers
            .keys()
            .copied()
            .filter(|target| Some(*target) != exclude)
            .collect();
        let mut evicted = false;
        for target in targets {
            evicted |= !write_to(state, target, &frame);
        }
        if !evicted {
            return;
        }
    }
}

fn broadcast_frame(state: &mut RelayState, frame: &[u8]) {
    let targets: Vec<PlayerID> = state.peers.keys().copied().collect();
    for target in targets {
        write_to(state, target, frame);
    }
}

/// Seal the race once no connected car is still racing and announce
/// the outcome to everyone, finished or not.
fn seal_if_complete(state: &mut RelayState) {
    let racing = state
        .peers
        .keys()
        .filter(|id| !state.coordinator.has_finished(**id))
        .count();
    let outcome = state.coordinator.try_seal(racing).cloned();
    if let Some(outcome) = outcome {
        match RelayMessage::RaceOver(outcome).to_frame() {
            Ok(frame) => broadcast_frame(state, &frame),
            Err(err) => log::error!("could not encode race outcome: {}", err),
        }
    }
}

/// One thread per participant: register, pump updates into the
/// registry, drop the car when the socket dies or stays quiet longer
/// than `idle_limit`.
fn handle_participant(registry: Arc<RelayRegistry>, stream: TcpStream, idle_limit: Duration) {
    let peer = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => String::from("unknown peer"),
    };
    let write_half = match stream.try_clone() {
        Ok(clone) => clone,
        Err(err) => {
            log::warn!("could not clone the stream for {}: {}", peer, err);
            return;
        }
    };
    let mut connection = match ParticipantConnection::new(stream) {
        Ok(connection) => connection,
        Err(err) => {
            log::warn!("could not set up a connection for {}: {}", peer, err);
            return;
        }
    };
    let poll = Duration::from_millis(GLOBAL_CONFIG.poll_timeout_ms);
    if let Err(err) = connection.set_poll_timeout(Some(poll)) {
        log::warn!("could not set the poll timeout for {}: {}", peer, err);
        return;
    }
    let id = match registry.register(write_half) {
        Ok(id) => id,
        Err(err) => {
            log::warn!("could not register {}: {}", peer, err);
            return;
        }
    };
    log::info!("player {} joined from {}", id, peer);

    let mut last_heard = Instant::now();
    loop {
        match connection.recv() {
            Ok(Some(update)) => {
                last_heard = Instant::now();
                registry.update(id, update);
            }
            Ok(None) => {
                if last_heard.elapsed() >= idle_limit {
                    log::info!("player {} went quiet, dropping after {:?}", id, idle_limit);
                    break;
                }
            }
            Err(SyncError::Disconnected) => {
                log::info!("player {} disconnected", id);
                break;
            }
            Err(err) => {
                log::warn!("dropping player {}: {}", id, err);
                break;
            }
        }
    }
    registry.remove(id);
}

pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<RelayRegistry>,
}

impl RelayServer {
    pub fn new(ip_addr: &str) -> anyhow::Result<RelayServer> {
        let listener = TcpListener::bind(ip_addr)
            .with_context(|| format!("could not bind the relay socket to {}", ip_addr))?;
        log::info!("relay listening on {}", ip_addr);
        Ok(RelayServer {
            listener,
            registry: Arc::new(RelayRegistry::new()),
        })
    }

    #[cfg(test)]
    fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr().unwrap()
    }

    /// Accept participants until the process exits. Accept errors are
    /// transient, so they log and the loop keeps going.
    pub fn run(self) {
        let idle_limit = Duration::from_millis(GLOBAL_CONFIG.idle_timeout_ms);
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let registry = Arc::clone(&self.registry);
                    thread::spawn(move || handle_participant(registry, stream, idle_limit));
                }
                Err(err) => log::warn!("could not accept a connection: {}", err),
            }
        }
    }
}
