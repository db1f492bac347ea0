//! Newline-delimited JSON framing.
//!
//! Reads arrive as arbitrary byte chunks, so a frame can be split
//! across reads or several frames can land in one read. The scanner
//! walks the bytes once, tracking brace depth across string literals
//! and escapes, and hands out one complete top-level object at a time.
//! Anything that is not whitespace or an object start is treated as
//! corruption and drops the buffer; losing data is preferable to
//! desyncing the stream.

use serde::Serialize;

/// Upper bound on a single frame. A peer that exceeds it mid-frame is
/// assumed corrupt and its buffered bytes are dropped.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Serialize a message and append the frame delimiter.
pub fn encode_frame<M: Serialize>(message: &M) -> Result<Vec<u8>, serde_json::Error> {
    let mut frame = serde_json::to_vec(message)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Scanner errors. Both leave the scanner empty and re-armed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Unexpected byte 0x{0:02x} between frames")]
    StrayByte(u8),

    #[error("Frame exceeded {MAX_FRAME_LEN} bytes")]
    Oversized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    AwaitingStart,
    Accumulating {
        depth: u32,
        in_string: bool,
        escaped: bool,
    },
}

/// Incremental splitter for newline-delimited JSON objects.
pub struct FrameScanner {
    buf: Vec<u8>,
    /// First unscanned byte in `buf`.
    pos: usize,
    /// Where the frame being accumulated starts.
    start: usize,
    state: ScanState,
}

impl FrameScanner {
    pub fn new() -> FrameScanner {
        FrameScanner {
            buf: Vec::new(),
            pos: 0,
            start: 0,
            state: ScanState::AwaitingStart,
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.start = 0;
        self.state = ScanState::AwaitingStart;
    }

    /// Pop the next complete frame, if one is buffered. Bytes belonging
    /// to later frames stay untouched.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        while self.pos < self.buf.len() {
            let byte = self.buf[self.pos];
            match self.state {
                ScanState::AwaitingStart => match byte {
                    b' ' | b'\t' | b'\r' | b'\n' => {
                        self.pos += 1;
                    }
                    b'{' => {
                        self.start = self.pos;
                        self.state = ScanState::Accumulating {
                            depth: 1,
                            in_string: false,
                            escaped: false,
                        };
                        self.pos += 1;
                    }
                    other => {
                        self.clear();
                        return Err(FramingError::StrayByte(other));
                    }
                },
                ScanState::Accumulating {
                    mut depth,
                    mut in_string,
                    mut escaped,
                } => {
                    if escaped {
                        escaped = false;
                    } else if in_string {
                        match byte {
                            b'\\' => escaped = true,
                            b'"' => in_string = false,
                            _ => {}
                        }
                    } else {
                        match byte {
                            b'"' => in_string = true,
                            b'{' => depth += 1,
                            b'}' => depth -= 1,
                            _ => {}
                        }
                    }
                    self.pos += 1;
                    if depth == 0 {
                        let skip = self.start;
                        let frame: Vec<u8> = self.buf.drain(..self.pos).skip(skip).collect();
                        self.pos = 0;
                        self.start = 0;
                        self.state = ScanState::AwaitingStart;
                        return Ok(Some(frame));
                    }
                    self.state = ScanState::Accumulating {
                        depth,
                        in_string,
                        escaped,
                    };
                }
            }
        }

        if self.state == ScanState::AwaitingStart {
            // everything scanned so far was inter-frame whitespace
            self.buf.clear();
            self.pos = 0;
            self.start = 0;
        } else if self.buf.len() > MAX_FRAME_LEN {
            self.clear();
            return Err(FramingError::Oversized);
        }
        Ok(None)
    }
}

impl Default for FrameScanner {
    fn default() -> FrameScanner {
        FrameScanner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(scanner: &mut FrameScanner) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Ok(Some(frame)) = scanner.next_frame() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn concatenated_frames_come_out_one_at_a_time() {
        let first = br#"{"id":1,"position":[10.0,20.0]}"#;
        let second = br#"{"id":2,"position":[30.0,40.0]}"#;
        let mut wire = Vec::new();
        wire.extend_from_slice(first);
        wire.push(b'\n');
        wire.extend_from_slice(second);
        wire.push(b'\n');

        let mut scanner = FrameScanner::new();
        scanner.push(&wire);

        let got = scanner.next_frame().unwrap().unwrap();
        assert_eq!(got, first.to_vec());
        // the second frame is fully retained, nothing of it consumed
        assert_eq!(scanner.pending(), &wire[first.len()..]);

        let got = scanner.next_frame().unwrap().unwrap();
        assert_eq!(got, second.to_vec());
        assert_eq!(scanner.next_frame().unwrap(), None);
        assert!(scanner.pending().is_empty());
    }

    #[test]
    fn partial_frame_waits_for_the_rest() {
        let frame = br#"{"lap":2,"checkpointIndex":5}"#;
        let mut scanner = FrameScanner::new();
        scanner.push(&frame[..10]);
        assert_eq!(scanner.next_frame().unwrap(), None);

        scanner.push(&frame[10..]);
        scanner.push(b"\n");
        assert_eq!(scanner.next_frame().unwrap().unwrap(), frame.to_vec());
    }

    #[test]
    fn braces_inside_strings_do_not_split_frames() {
        let tricky = br#"{"name":"a}{b\"}","n":1}"#;
        let mut scanner = FrameScanner::new();
        scanner.push(tricky);
        scanner.push(b"\n");
        assert_eq!(scanner.next_frame().unwrap().unwrap(), tricky.to_vec());
    }

    #[test]
    fn nested_objects_stay_in_one_frame() {
        let nested = br#"{"players":{"1":{"lap":0},"2":{"lap":1}}}"#;
        let mut scanner = FrameScanner::new();
        scanner.push(nested);
        assert_eq!(scanner.next_frame().unwrap().unwrap(), nested.to_vec());
    }

    #[test]
    fn stray_bytes_drop_the_buffer() {
        let mut scanner = FrameScanner::new();
        scanner.push(b"garbage{\"id\":1}\n");
        assert_eq!(scanner.next_frame(), Err(FramingError::StrayByte(b'g')));
        assert!(scanner.pending().is_empty());

        // the scanner is usable again afterwards
        scanner.push(b"{\"id\":2}\n");
        assert_eq!(
            scanner.next_frame().unwrap().unwrap(),
            b"{\"id\":2}".to_vec()
        );
    }

    #[test]
    fn oversized_frame_is_dropped() {
        let mut scanner = FrameScanner::new();
        scanner.push(b"{\"blob\":\"");
        scanner.push(&vec![b'a'; MAX_FRAME_LEN + 1]);
        assert_eq!(scanner.next_frame(), Err(FramingError::Oversized));
        assert!(scanner.pending().is_empty());
    }

    #[test]
    fn whitespace_between_frames_is_skipped() {
        let mut scanner = FrameScanner::new();
        scanner.push(b" \r\n {\"a\":1}\n\n{\"b\":2}\n  ");
        let got = frames(&mut scanner);
        assert_eq!(got, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
        assert!(scanner.pending().is_empty());
    }
}
