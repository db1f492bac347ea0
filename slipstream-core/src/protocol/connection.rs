use std::io::{ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::SyncError;
use crate::protocol::framing::FrameScanner;
use crate::protocol::Message;

const READ_CHUNK: usize = 4096;

/// A typed frame stream over one TCP socket: `In` is what the peer
/// sends us, `Out` what we send back.
///
/// Undecodable but well-framed bytes are logged and dropped together
/// with the rest of the buffer rather than surfaced; only transport
/// conditions reach the caller. One instance must stay on one thread,
/// writes from elsewhere would interleave with ours mid-frame.
pub struct Connection<In: Message, Out: Message> {
    tcp_stream: TcpStream,
    scanner: FrameScanner,
    _direction: PhantomData<(In, Out)>,
}

impl<In: Message, Out: Message> Connection<In, Out> {
    pub fn new(tcp_stream: TcpStream) -> Result<Connection<In, Out>, SyncError> {
        // disable the Nagle algorithm to allow for real-time transfers
        tcp_stream.set_nodelay(true)?;
        Ok(Connection {
            tcp_stream,
            scanner: FrameScanner::new(),
            _direction: PhantomData,
        })
    }

    /// Bound how long [`recv`](Connection::recv) blocks waiting for
    /// bytes. `None` blocks indefinitely.
    pub fn set_poll_timeout(&self, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.tcp_stream.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, SyncError> {
        Ok(self.tcp_stream.peer_addr()?)
    }

    /// Wait for the next message. `Ok(None)` means the poll timeout
    /// elapsed without a complete frame; `Err(Disconnected)` that the
    /// peer shut the stream down.
    pub fn recv(&mut self) -> Result<Option<In>, SyncError> {
        loop {
            loop {
                match self.scanner.next_frame() {
                    Ok(Some(frame)) => match In::from_frame(&frame) {
                        Ok(message) => return Ok(Some(message)),
                        Err(err) => {
                            log::warn!("dropping undecodable frame: {}", err);
                            self.scanner.clear();
                        }
                    },
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!("resynchronizing frame stream: {}", err);
                    }
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.tcp_stream.read(&mut chunk) {
                Ok(0) => return Err(SyncError::Disconnected),
                Ok(n) => self.scanner.push(&chunk[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(ref e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e)
                    if e.kind() == ErrorKind::ConnectionReset
                        || e.kind() == ErrorKind::ConnectionAborted
                        || e.kind() == ErrorKind::BrokenPipe =>
                {
                    return Err(SyncError::Disconnected)
                }
                Err(e) => return Err(SyncError::Transport(e)),
            }
        }
    }

    /// Write one message as a single frame.
    pub fn send(&mut self, message: &Out) -> Result<(), SyncError> {
        let frame = message.to_frame()?;
        self.tcp_stream.write_all(&frame)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::protocol::{PlayerState, RelayMessage};

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let joiner = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (accepted, _) = listener.accept().unwrap();
        (accepted, joiner.join().unwrap())
    }

    #[test]
    fn recv_reassembles_split_and_concatenated_frames() {
        let (server_side, mut client_side) = loopback_pair();
        let mut connection: Connection<RelayMessage, RelayMessage> =
            Connection::new(server_side).unwrap();

        let first = RelayMessage::Welcome { id: 1 }.to_frame().unwrap();
        let second = RelayMessage::Welcome { id: 2 }.to_frame().unwrap();
        let mut wire = first;
        wire.extend_from_slice(&second);

        // split at an arbitrary byte boundary
        client_side.write_all(&wire[..5]).unwrap();
        client_side.write_all(&wire[5..]).unwrap();

        assert_eq!(
            connection.recv().unwrap(),
            Some(RelayMessage::Welcome { id: 1 })
        );
        assert_eq!(
            connection.recv().unwrap(),
            Some(RelayMessage::Welcome { id: 2 })
        );
    }

    #[test]
    fn recv_reports_timeout_and_disconnect() {
        let (server_side, client_side) = loopback_pair();
        let mut connection: Connection<PlayerState, RelayMessage> =
            Connection::new(server_side).unwrap();
        connection
            .set_poll_timeout(Some(Duration::from_millis(50)))
            .unwrap();

        // nothing sent yet
        assert!(matches!(connection.recv(), Ok(None)));

        drop(client_side);
        assert!(matches!(connection.recv(), Err(SyncError::Disconnected)));
    }

    #[test]
    fn send_produces_parseable_frames() {
        let (server_side, client_side) = loopback_pair();
        let mut sender: Connection<RelayMessage, RelayMessage> =
            Connection::new(server_side).unwrap();
        let mut receiver: Connection<RelayMessage, RelayMessage> =
            Connection::new(client_side).unwrap();

        sender.send(&RelayMessage::Welcome { id: 42 }).unwrap();
        assert_eq!(
            receiver.recv().unwrap(),
            Some(RelayMessage::Welcome { id: 42 })
        );
    }
}
