//! Background relay plumbing: a reader thread merging snapshots into
//! the shared registry and a writer thread draining a bounded queue.

use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use slipstream_core::error::SyncError;
use slipstream_core::protocol::{PlayerState, RaceOutcome, RelayConnection, RelayMessage};
use slipstream_core::registry::PlayerRegistry;
use slipstream_core::{PlayerID, GLOBAL_CONFIG};

/// Live link to the relay.
///
/// The tick loop never blocks on it: sends go through a bounded queue
/// drained by a writer thread, and received snapshots land in the
/// registry for the next frame to read. When the link dies the
/// registry keeps its last known roster and the simulation carries on.
pub struct RelayLink {
    my_id: Arc<AtomicU32>,
    registry: PlayerRegistry,
    outcome: Arc<Mutex<Option<RaceOutcome>>>,
    updates: flume::Sender<PlayerState>,
}

impl RelayLink {
    /// Connect and spawn the reader and writer threads. The link is
    /// usable immediately; the relay-assigned id arrives on the reader
    /// thread shortly after.
    pub fn connect(ip_addr: &str) -> Result<RelayLink, SyncError> {
        let stream = TcpStream::connect(ip_addr)?;
        let write_half = stream.try_clone()?;
        let connection = RelayConnection::new(stream)?;
        connection.set_poll_timeout(Some(Duration::from_millis(GLOBAL_CONFIG.poll_timeout_ms)))?;
        log::info!("connected to the relay at {}", ip_addr);

        let my_id = Arc::new(AtomicU32::new(0));
        let registry = PlayerRegistry::new();
        let outcome = Arc::new(Mutex::new(None));
        let (updates, update_queue) = flume::bounded(32);

        let reader_id = Arc::clone(&my_id);
        let reader_registry = registry.clone();
        let reader_outcome = Arc::clone(&outcome);
        thread::spawn(move || read_relay(connection, reader_id, reader_registry, reader_outcome));
        thread::spawn(move || write_relay(write_half, update_queue));

        Ok(RelayLink {
            my_id,
            registry,
            outcome,
            updates,
        })
    }

    /// The relay-assigned id, or `None` until the welcome arrives.
    pub fn assigned_id(&self) -> Option<PlayerID> {
        match self.my_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Queue this tick's state, fire and forget. The update is dropped
    /// while the id is unassigned or the writer is backed up; the next
    /// tick supersedes it anyway.
    pub fn send_state(&self, mut state: PlayerState) {
        let id = match self.assigned_id() {
            Some(id) => id,
            None => return,
        };
        state.id = id;
        if self.updates.try_send(state).is_err() {
            log::debug!("dropped a state update");
        }
    }

    /// Everyone else's last known state, sorted by id.
    pub fn remote_players(&self) -> Vec<PlayerState> {
        self.registry.players()
    }

    /// The sealed ranking, once the relay has announced it.
    pub fn outcome(&self) -> Option<RaceOutcome> {
        self.outcome.lock().unwrap().clone()
    }
}

fn read_relay(
    mut connection: RelayConnection,
    my_id: Arc<AtomicU32>,
    registry: PlayerRegistry,
    outcome: Arc<Mutex<Option<RaceOutcome>>>,
) {
    loop {
        match connection.recv() {
            Ok(Some(RelayMessage::Welcome { id })) => {
                log::info!("relay assigned us id {}", id);
                my_id.store(id, Ordering::SeqCst);
            }
            Ok(Some(RelayMessage::Snapshot { mut players })) => {
                // our own car is simulated locally, never echoed back
                players.remove(&my_id.load(Ordering::SeqCst));
                registry.replace_all(players);
            }
            Ok(Some(RelayMessage::RaceOver(result))) => {
                log::info!("race over, player {} wins", result.winner);
                *outcome.lock().unwrap() = Some(result);
            }
            Ok(None) => {}
            Err(SyncError::Disconnected) => {
                log::info!("relay closed the connection");
                return;
            }
            Err(err) => {
                log::warn!("lost the relay receive path: {}", err);
                return;
            }
        }
    }
}

fn write_relay(stream: TcpStream, updates: flume::Receiver<PlayerState>) {
    let mut connection = match RelayConnection::new(stream) {
        Ok(connection) => connection,
        Err(err) => {
            log::warn!("could not set up the send path: {}", err);
            return;
        }
    };
    // blocks on the queue; exits when the link is dropped or the
    // socket dies
    while let Ok(state) = updates.recv() {
        if let Err(err) = connection.send(&state) {
            log::warn!("lost the relay send path: {}", err);
            return;
        }
    }
}
