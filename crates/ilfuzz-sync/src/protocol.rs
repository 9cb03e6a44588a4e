//! Wire protocol (spec §4.10, §6 "Sync protocol"): length-prefixed, tagged
//! frames, `{u32 length, u8 tag, u8[length-1] payload}`. `length` counts the
//! tag byte plus the payload, little-endian, matching the REPRL protocol's
//! (`ilfuzz-exec::protocol`) choice of little-endian fixed-width headers.

use std::io::{self, Write};
use std::net::TcpStream;

use crate::error::{Result, SyncError};

pub const TAG_CORPUS_SAMPLE: u8 = 0x01;
pub const TAG_CRASH: u8 = 0x02;
pub const TAG_STATISTICS: u8 = 0x03;
pub const TAG_KEEP_ALIVE: u8 = 0x04;

/// Frames above this size are refused rather than buffered; a corpus
/// program or crash report this large indicates a protocol desync, not a
/// legitimate payload.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// One deserialized protocol message. Program/stderr blobs are carried
/// opaque (`Vec<u8>`) rather than decoded here: this crate transports the
/// project's binary IL format without depending on `ilfuzz-il`, the same
/// seam discipline `ilfuzz-mutate`/`ilfuzz-engine` use for their corpus and
/// executor traits. `ilfuzz-core` decodes payloads at the point it applies
/// them to a live corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A newly interesting sample (spec §4.10 "leaf→parent and
    /// parent→root: a newly interesting sample").
    CorpusSample(Vec<u8>),
    /// spec §4.10 "leaf→root (forwarded by parents without retention)".
    Crash { program: Vec<u8>, stderr: Vec<u8>, signal: i32 },
    /// Opaque serialized `Statistics` payload (see `ilfuzz-core::stats`).
    Statistics(Vec<u8>),
    KeepAlive,
}

impl Message {
    fn tag(&self) -> u8 {
        match self {
            Message::CorpusSample(_) => TAG_CORPUS_SAMPLE,
            Message::Crash { .. } => TAG_CRASH,
            Message::Statistics(_) => TAG_STATISTICS,
            Message::KeepAlive => TAG_KEEP_ALIVE,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Message::CorpusSample(bytes) => bytes.clone(),
            Message::Crash { program, stderr, signal } => {
                let mut out = Vec::with_capacity(4 + 4 + program.len() + 4 + stderr.len());
                out.extend_from_slice(&(*signal).to_le_bytes());
                out.extend_from_slice(&(program.len() as u32).to_le_bytes());
                out.extend_from_slice(program);
                out.extend_from_slice(stderr);
                out
            }
            Message::Statistics(bytes) => bytes.clone(),
            Message::KeepAlive => Vec::new(),
        }
    }

    /// Encodes this message to a complete on-wire frame.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        let length = (payload.len() + 1) as u32;
        let mut out = Vec::with_capacity(4 + payload.len() + 1);
        out.extend_from_slice(&length.to_le_bytes());
        out.push(self.tag());
        out.extend_from_slice(&payload);
        out
    }

    fn decode(tag: u8, payload: &[u8]) -> Result<Self> {
        match tag {
            TAG_CORPUS_SAMPLE => Ok(Message::CorpusSample(payload.to_vec())),
            TAG_CRASH => {
                if payload.len() < 8 {
                    return Err(SyncError::EmptyFrame);
                }
                let signal = i32::from_le_bytes(payload[0..4].try_into().unwrap());
                let program_len = u32::from_le_bytes(payload[4..8].try_into().unwrap()) as usize;
                if payload.len() < 8 + program_len {
                    return Err(SyncError::EmptyFrame);
                }
                let program = payload[8..8 + program_len].to_vec();
                let stderr = payload[8 + program_len..].to_vec();
                Ok(Message::Crash { program, stderr, signal })
            }
            TAG_STATISTICS => Ok(Message::Statistics(payload.to_vec())),
            TAG_KEEP_ALIVE => Ok(Message::KeepAlive),
            other => Err(SyncError::UnknownTag(other)),
        }
    }
}

/// Incrementally reassembles frames out of bytes arriving from a
/// non-blocking socket. One instance per connection; `feed` is called with
/// whatever bytes a single non-blocking read produced (possibly zero, or a
/// partial frame, or several frames back to back).
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops and decodes as many complete frames as are currently buffered.
    /// Partial trailing bytes are left in the buffer for the next `feed`.
    pub fn drain_messages(&mut self) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        loop {
            if self.buf.len() < 4 {
                break;
            }
            let length = u32::from_le_bytes(self.buf[0..4].try_into().unwrap()) as usize;
            if length == 0 {
                return Err(SyncError::EmptyFrame);
            }
            if length > MAX_FRAME_BYTES {
                return Err(SyncError::FrameTooLarge(length));
            }
            if self.buf.len() < 4 + length {
                break;
            }
            let tag = self.buf[4];
            let payload = &self.buf[5..4 + length];
            out.push(Message::decode(tag, payload)?);
            self.buf.drain(0..4 + length);
        }
        Ok(out)
    }
}

/// Buffers encoded frames for a non-blocking `TcpStream`, retrying a
/// partial write on the next `flush` call instead of blocking the event
/// loop (spec §5 "their I/O is multiplexed non-blocking on the main loop").
#[derive(Debug, Default)]
pub struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, message: &Message) {
        self.buf.extend_from_slice(&message.encode());
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes as much of the buffered bytes as the socket accepts right
    /// now. Returns `Ok(())` whether or not everything was written;
    /// leftover bytes stay queued for the next call.
    pub fn flush(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        while !self.buf.is_empty() {
            match stream.write(&self.buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed connection"));
                }
                Ok(n) => {
                    self.buf.drain(0..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_alive_round_trips() {
        let mut reader = FrameReader::new();
        reader.feed(&Message::KeepAlive.encode());
        let messages = reader.drain_messages().unwrap();
        assert_eq!(messages, vec![Message::KeepAlive]);
    }

    #[test]
    fn corpus_sample_round_trips_across_split_reads() {
        let frame = Message::CorpusSample(vec![1, 2, 3, 4, 5]).encode();
        let mut reader = FrameReader::new();
        reader.feed(&frame[..3]);
        assert!(reader.drain_messages().unwrap().is_empty());
        reader.feed(&frame[3..]);
        let messages = reader.drain_messages().unwrap();
        assert_eq!(messages, vec![Message::CorpusSample(vec![1, 2, 3, 4, 5])]);
    }

    #[test]
    fn crash_round_trips_with_program_and_stderr() {
        let msg = Message::Crash {
            program: vec![9, 9, 9],
            stderr: b"segfault".to_vec(),
            signal: 11,
        };
        let mut reader = FrameReader::new();
        reader.feed(&msg.encode());
        let messages = reader.drain_messages().unwrap();
        assert_eq!(messages, vec![msg]);
    }

    #[test]
    fn two_frames_back_to_back_both_decode() {
        let mut reader = FrameReader::new();
        reader.feed(&Message::KeepAlive.encode());
        reader.feed(&Message::CorpusSample(vec![7]).encode());
        let messages = reader.drain_messages().unwrap();
        assert_eq!(messages, vec![Message::KeepAlive, Message::CorpusSample(vec![7])]);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut reader = FrameReader::new();
        let mut bad = (MAX_FRAME_BYTES as u32 + 1).to_le_bytes().to_vec();
        bad.push(TAG_KEEP_ALIVE);
        reader.feed(&bad);
        assert!(matches!(reader.drain_messages(), Err(SyncError::FrameTooLarge(_))));
    }
}
