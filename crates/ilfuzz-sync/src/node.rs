//! Master/intermediate/leaf synchronization node (spec §4.10).
//!
//! A node owns at most one outbound connection to a parent (absent for
//! `Root`) and zero or more inbound connections from children (absent for
//! `Leaf`). `tick` is called once per main-loop iteration (spec §5 "their
//! I/O is multiplexed non-blocking on the main loop") and returns the
//! events the caller (`ilfuzz-core::Fuzzer`) should apply to its local
//! corpus/crash storage.

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use crate::backoff::{Backoff, BackoffParams};
use crate::error::Result;
use crate::outbox::Outbox;
use crate::protocol::{FrameReader, FrameWriter, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Root,
    Intermediate,
    Leaf,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub role: Role,
    pub bind_to: Option<SocketAddr>,
    pub connect_to: Option<SocketAddr>,
    pub outbox_capacity: usize,
    pub backoff: BackoffParams,
}

impl SyncConfig {
    pub fn standalone() -> Self {
        Self {
            role: Role::Root,
            bind_to: None,
            connect_to: None,
            outbox_capacity: 4096,
            backoff: BackoffParams::default(),
        }
    }
}

/// What the caller should do in response to one `tick` (corpus insert,
/// crash persistence, statistics aggregation, or nothing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    NewCorpusSample(Vec<u8>),
    Crash { program: Vec<u8>, stderr: Vec<u8>, signal: i32 },
    Statistics(Vec<u8>),
    ParentConnected,
    ParentDisconnected,
}

const READ_CHUNK: usize = 64 * 1024;

struct ChildLink {
    stream: TcpStream,
    addr: SocketAddr,
    reader: FrameReader,
    writer: FrameWriter,
    outbox: Outbox,
}

struct ParentLink {
    addr: SocketAddr,
    stream: Option<TcpStream>,
    reader: FrameReader,
    writer: FrameWriter,
    outbox: Outbox,
    backoff: Backoff,
}

pub struct SyncNode {
    role: Role,
    listener: Option<TcpListener>,
    outbox_capacity: usize,
    children: Vec<ChildLink>,
    parent: Option<ParentLink>,
}

impl SyncNode {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let listener = match config.bind_to {
            Some(addr) => {
                let listener = TcpListener::bind(addr)?;
                listener.set_nonblocking(true)?;
                Some(listener)
            }
            None => None,
        };

        let parent = config.connect_to.map(|addr| ParentLink {
            addr,
            stream: None,
            reader: FrameReader::new(),
            writer: FrameWriter::new(),
            outbox: Outbox::new(config.outbox_capacity),
            backoff: Backoff::new(config.backoff),
        });

        Ok(Self {
            role: config.role,
            listener,
            outbox_capacity: config.outbox_capacity,
            children: Vec::new(),
            parent,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn parent_connected(&self) -> bool {
        self.parent.as_ref().is_some_and(|p| p.stream.is_some())
    }

    /// A sample this node's own corpus just found interesting. Forwarded
    /// up only; children converge on it when it comes back down through
    /// the parent, or through direct sibling rebroadcast on next sync.
    pub fn offer_corpus_sample(&mut self, bytes: Vec<u8>) {
        if let Some(parent) = &mut self.parent {
            parent.outbox.push(Message::CorpusSample(bytes));
        }
    }

    pub fn offer_crash(&mut self, program: Vec<u8>, stderr: Vec<u8>, signal: i32) {
        if let Some(parent) = &mut self.parent {
            parent.outbox.push(Message::Crash { program, stderr, signal });
        }
    }

    pub fn offer_statistics(&mut self, payload: Vec<u8>) {
        if let Some(parent) = &mut self.parent {
            parent.outbox.push(Message::Statistics(payload));
        }
    }

    /// Replays the full local corpus to the parent after a (re)connect
    /// (spec §4.10 "On reconnect, a child resynchronizes by replaying its
    /// corpus to its parent; the parent filters for newness" — the
    /// filtering happens on the receiving side's `Corpus::insert`
    /// fingerprint check, not here).
    pub fn replay_corpus_to_parent(&mut self, programs: impl IntoIterator<Item = Vec<u8>>) {
        let Some(parent) = &mut self.parent else { return };
        for bytes in programs {
            parent.outbox.push(Message::CorpusSample(bytes));
        }
    }

    /// One main-loop step: accepts new children, drains readable sockets,
    /// attempts a parent reconnect if due, and flushes outboxes. Never
    /// blocks.
    pub fn tick(&mut self, now: Instant) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        self.accept_new_children();
        self.poll_parent(now, &mut events);
        self.poll_children(&mut events);
        self.flush_outboxes();
        events
    }

    fn accept_new_children(&mut self) {
        let Some(listener) = &self.listener else { return };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        tracing::warn!(%addr, error = %err, "failed to configure accepted child socket");
                        continue;
                    }
                    tracing::info!(%addr, "sync child connected");
                    self.children.push(ChildLink {
                        stream,
                        addr,
                        reader: FrameReader::new(),
                        writer: FrameWriter::new(),
                        outbox: Outbox::new(self.outbox_capacity),
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "error accepting sync child connection");
                    break;
                }
            }
        }
    }

    fn poll_parent(&mut self, now: Instant, events: &mut Vec<SyncEvent>) {
        let Some(parent) = &mut self.parent else { return };

        if parent.stream.is_none() {
            if !parent.backoff.ready(now) {
                return;
            }
            match TcpStream::connect(parent.addr) {
                Ok(stream) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        tracing::warn!(addr = %parent.addr, error = %err, "failed to configure parent socket");
                        parent.backoff.failed(now);
                        return;
                    }
                    tracing::info!(addr = %parent.addr, "connected to sync parent");
                    parent.stream = Some(stream);
                    parent.backoff.succeeded();
                    events.push(SyncEvent::ParentConnected);
                }
                Err(err) => {
                    tracing::debug!(addr = %parent.addr, error = %err, "sync parent connect failed, backing off");
                    parent.backoff.failed(now);
                    return;
                }
            }
        }

        let mut disconnect = false;
        if let Some(stream) = &mut parent.stream {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => {
                        disconnect = true;
                        break;
                    }
                    Ok(n) => parent.reader.feed(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        tracing::warn!(addr = %parent.addr, error = %e, "sync parent read failed");
                        disconnect = true;
                        break;
                    }
                }
            }
        }

        if disconnect {
            parent.stream = None;
            parent.backoff.failed(now);
            events.push(SyncEvent::ParentDisconnected);
            return;
        }

        match parent.reader.drain_messages() {
            Ok(messages) => {
                for message in messages {
                    match message {
                        Message::CorpusSample(bytes) => {
                            events.push(SyncEvent::NewCorpusSample(bytes.clone()));
                            for child in &mut self.children {
                                child.outbox.push(Message::CorpusSample(bytes.clone()));
                            }
                        }
                        Message::Crash { .. } => {
                            tracing::debug!("ignoring crash message received from parent");
                        }
                        Message::Statistics(_) => {}
                        Message::KeepAlive => {}
                    }
                }
            }
            Err(err) => {
                tracing::warn!(addr = %parent.addr, error = %err, "malformed frame from sync parent, disconnecting");
                parent.stream = None;
                parent.backoff.failed(now);
                events.push(SyncEvent::ParentDisconnected);
            }
        }
    }

    fn poll_children(&mut self, events: &mut Vec<SyncEvent>) {
        let mut dead = Vec::new();
        let mut to_parent = Vec::new();
        let mut to_siblings: Vec<(usize, Message)> = Vec::new();

        for (index, child) in self.children.iter_mut().enumerate() {
            let mut chunk = [0u8; READ_CHUNK];
            let mut closed = false;
            loop {
                match child.stream.read(&mut chunk) {
                    Ok(0) => {
                        closed = true;
                        break;
                    }
                    Ok(n) => child.reader.feed(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        tracing::warn!(addr = %child.addr, error = %e, "sync child read failed");
                        closed = true;
                        break;
                    }
                }
            }

            if closed {
                tracing::info!(addr = %child.addr, "sync child disconnected");
                dead.push(index);
                continue;
            }

            match child.reader.drain_messages() {
                Ok(messages) => {
                    for message in messages {
                        match message {
                            Message::CorpusSample(bytes) => {
                                events.push(SyncEvent::NewCorpusSample(bytes.clone()));
                                to_parent.push(Message::CorpusSample(bytes.clone()));
                                to_siblings.push((index, Message::CorpusSample(bytes)));
                            }
                            Message::Crash { program, stderr, signal } => {
                                events.push(SyncEvent::Crash {
                                    program: program.clone(),
                                    stderr: stderr.clone(),
                                    signal,
                                });
                                to_parent.push(Message::Crash { program, stderr, signal });
                            }
                            Message::Statistics(payload) => {
                                events.push(SyncEvent::Statistics(payload.clone()));
                                to_parent.push(Message::Statistics(payload));
                            }
                            Message::KeepAlive => {}
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(addr = %child.addr, error = %err, "malformed frame from sync child, disconnecting");
                    dead.push(index);
                }
            }
        }

        for message in to_parent {
            if let Some(parent) = &mut self.parent {
                parent.outbox.push(message);
            }
        }
        for (sender, message) in to_siblings {
            for (index, child) in self.children.iter_mut().enumerate() {
                if index != sender {
                    child.outbox.push(message.clone());
                }
            }
        }

        for index in dead.into_iter().rev() {
            self.children.remove(index);
        }
    }

    fn flush_outboxes(&mut self) {
        if let Some(parent) = &mut self.parent {
            if let Some(stream) = &mut parent.stream {
                if parent.writer.is_empty() {
                    while let Some(message) = parent.outbox.pop() {
                        parent.writer.queue(&message);
                    }
                }
                if let Err(err) = parent.writer.flush(stream) {
                    tracing::warn!(addr = %parent.addr, error = %err, "sync parent write failed, disconnecting");
                    parent.stream = None;
                }
            }
        }

        let mut dead = Vec::new();
        for (index, child) in self.children.iter_mut().enumerate() {
            if child.writer.is_empty() {
                while let Some(message) = child.outbox.pop() {
                    child.writer.queue(&message);
                }
            }
            if let Err(err) = child.writer.flush(&mut child.stream) {
                tracing::warn!(addr = %child.addr, error = %err, "sync child write failed, disconnecting");
                dead.push(index);
            }
        }
        for index in dead.into_iter().rev() {
            self.children.remove(index);
        }
    }
}

/// KeepAlive cadence a caller may use to drive `offer_*`-less liveness
/// checks on otherwise idle connections.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn leaf_connects_to_root_and_propagates_sample() {
        let root_addr = free_addr();
        let root_config = SyncConfig {
            role: Role::Root,
            bind_to: Some(root_addr),
            connect_to: None,
            outbox_capacity: 16,
            backoff: BackoffParams::default(),
        };
        let mut root = SyncNode::new(&root_config).unwrap();

        let leaf_config = SyncConfig {
            role: Role::Leaf,
            bind_to: None,
            connect_to: Some(root_addr),
            outbox_capacity: 16,
            backoff: BackoffParams::default(),
        };
        let mut leaf = SyncNode::new(&leaf_config).unwrap();

        let mut connected = false;
        for _ in 0..200 {
            let leaf_events = leaf.tick(Instant::now());
            if leaf_events.contains(&SyncEvent::ParentConnected) {
                connected = true;
            }
            root.tick(Instant::now());
            if connected && root.child_count() == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(connected, "leaf never observed a parent connection");

        leaf.offer_corpus_sample(vec![42, 1, 2]);

        let mut observed = false;
        for _ in 0..200 {
            leaf.tick(Instant::now());
            let events = root.tick(Instant::now());
            if events.contains(&SyncEvent::NewCorpusSample(vec![42, 1, 2])) {
                observed = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(observed, "root never observed the leaf's corpus sample");
    }
}
