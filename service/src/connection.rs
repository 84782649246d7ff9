//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! A pooled client connection.
//!
//! A [`Connection`] owns its transport, the fixed input and output buffers,
//! the telnet decoder and the compression stream. The engine drives it
//! through one read, at most one dispatched line and one flush per pulse.

use crate::buffer::FixedBuffer;
use crate::error::{EngineError, Result};
use crate::events::{EventOwner, EventQueue};
use crate::mccp::{Compression, CompressionState};
use crate::session::Session;
use crate::transport::{Transport, would_block};
use crate::types::{ConnectionId, ConnectionState, LookupStatus};
use bytes::{Buf, BytesMut};
use metrics::counter;
use pulsemud_compress::MccpVersion;
use pulsemud_telnetcodec::{TelnetCodec, TelnetEvent, TelnetFrame, TelnetOption, consts};
use std::fmt;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

/// Label of the one-shot event that closes a connection left idle at login
pub const IDLE_EVENT: &str = "socket_idle";

/// Appended when output had to be truncated
pub const OVERFLOW_MARKER: &str = "[TOO MUCH OUTPUT]";

// pause between write attempts while draining
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

pub struct Connection {
    id: ConnectionId,
    transport: Option<Box<dyn Transport>>,
    peer: Option<SocketAddr>,
    hostname: Option<String>,
    input: FixedBuffer,
    output: FixedBuffer,
    // encoded bytes the transport has not accepted yet
    wire: BytesMut,
    scratch: BytesMut,
    staged: Option<String>,
    after_cr: bool,
    prompt_pending: bool,
    lookup: LookupStatus,
    state: ConnectionState,
    telnet: TelnetCodec,
    compression: Compression,
    session: Option<Session>,
    events: EventQueue<Connection>,
    close_requested: bool,
    connected_at: Instant,
    bytes_read: u64,
    bytes_written: u64,
}

impl Connection {
    /// Allocate an unattached connection with the given buffer capacities
    pub fn new(input_capacity: usize, output_capacity: usize) -> Self {
        Self {
            id: ConnectionId::new(0),
            transport: None,
            peer: None,
            hostname: None,
            input: FixedBuffer::new(input_capacity),
            output: FixedBuffer::new(output_capacity),
            wire: BytesMut::with_capacity(output_capacity),
            scratch: BytesMut::with_capacity(input_capacity),
            staged: None,
            after_cr: false,
            prompt_pending: false,
            lookup: LookupStatus::ClosedRecyclable,
            state: ConnectionState::Closed,
            telnet: TelnetCodec::new(),
            compression: Compression::default(),
            session: None,
            events: EventQueue::new(),
            close_requested: false,
            connected_at: Instant::now(),
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn lookup_status(&self) -> LookupStatus {
        self.lookup
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Resolved hostname, or the numeric address until the lookup completes
    pub fn host(&self) -> String {
        match (&self.hostname, self.peer) {
            (Some(hostname), _) => hostname.clone(),
            (None, Some(peer)) => peer.ip().to_string(),
            (None, None) => "unknown".to_string(),
        }
    }

    pub fn descriptor(&self) -> Option<RawFd> {
        self.transport.as_ref().and_then(|t| t.descriptor())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn compression_state(&self) -> CompressionState {
        self.compression.state()
    }

    pub fn prompt_pending(&self) -> bool {
        self.prompt_pending
    }

    /// Bytes queued but not yet handed to the transport
    pub fn pending_output(&self) -> &[u8] {
        self.output.as_slice()
    }

    /// Encoded bytes the transport has not accepted yet
    pub fn wire_backlog(&self) -> usize {
        self.wire.len()
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.lookup.is_closed()
    }

    /// Whether input may be read and dispatched this pulse
    pub fn is_serviceable(&self) -> bool {
        self.lookup == LookupStatus::Done
            && self.state != ConnectionState::Closed
            && self.transport.is_some()
    }

    /// Ask the engine to close this connection at the end of the pulse
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn events_mut(&mut self) -> &mut EventQueue<Connection> {
        &mut self.events
    }

    pub(crate) fn take_close_request(&mut self) -> bool {
        std::mem::take(&mut self.close_requested)
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        trace!(conn = %self.id, from = %self.state, to = %state, "State change");
        self.state = state;
    }

    pub(crate) fn set_prompt_pending(&mut self) {
        self.prompt_pending = true;
    }

    pub(crate) fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Attach `session`, destroying any session already attached
    pub(crate) fn attach_session(&mut self, mut session: Session) {
        session.attach(self.id);
        if let Some(mut previous) = self.session.replace(session) {
            previous.destroy();
        }
    }

    /// Bind this pooled object to a freshly accepted transport
    pub(crate) fn reset(
        &mut self,
        id: ConnectionId,
        transport: Box<dyn Transport>,
        peer: Option<SocketAddr>,
    ) {
        self.recycle();
        self.id = id;
        self.transport = Some(transport);
        self.peer = peer;
        self.lookup = LookupStatus::Lookup;
        self.state = ConnectionState::NewName;
        self.connected_at = Instant::now();
    }

    /// Drop everything tied to the previous client; buffer storage is kept
    pub(crate) fn recycle(&mut self) {
        self.transport = None;
        self.peer = None;
        self.hostname = None;
        self.input.clear();
        self.output.clear();
        self.wire.clear();
        self.scratch.clear();
        self.staged = None;
        self.after_cr = false;
        self.prompt_pending = false;
        self.lookup = LookupStatus::ClosedRecyclable;
        self.state = ConnectionState::Closed;
        self.telnet.reset();
        self.compression.reset();
        if let Some(mut session) = self.session.take() {
            session.destroy();
        }
        self.events.cancel_all();
        self.close_requested = false;
        self.bytes_read = 0;
        self.bytes_written = 0;
    }

    /// Record the outcome of the reverse lookup
    pub(crate) fn complete_lookup(&mut self, hostname: String) {
        if self.lookup == LookupStatus::Lookup {
            self.hostname = Some(hostname);
        }
        self.lookup = self.lookup.on_lookup_complete();
    }

    /// Read once from the transport into the input buffer
    ///
    /// Returns the number of raw bytes read, zero when nothing was available
    /// or the buffer is full of complete lines.
    ///
    /// # Errors
    /// [`EngineError::ConnectionClosed`] on end of stream,
    /// [`EngineError::InputOverflow`] when the buffer is full without a line
    /// terminator, and [`EngineError::Protocol`] for malformed telnet.
    pub(crate) fn read(&mut self) -> Result<usize> {
        if !self.is_serviceable() {
            return Ok(0);
        }
        let spare = self.input.remaining();
        if spare == 0 {
            if self.has_complete_line() {
                return Ok(0);
            }
            return Err(EngineError::InputOverflow(self.input.capacity()));
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(EngineError::ConnectionClosed);
        };

        self.scratch.clear();
        self.scratch.resize(spare, 0);
        let count = match transport.try_read(&mut self.scratch[..]) {
            Ok(0) => return Err(EngineError::ConnectionClosed),
            Ok(count) => count,
            Err(err) if would_block(&err) => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        self.scratch.truncate(count);
        self.bytes_read += count as u64;
        counter!("pulsemud.bytes.read").increment(count as u64);

        // decoded data never exceeds the raw bytes, so it always fits
        while let Some(event) = self.telnet.decode(&mut self.scratch)? {
            match event {
                TelnetEvent::Data(byte) => {
                    self.input.push(byte);
                }
                other => self.negotiate(other),
            }
        }
        Ok(count)
    }

    fn has_complete_line(&self) -> bool {
        self.input
            .as_slice()
            .iter()
            .any(|&b| b == consts::LF || b == consts::CR)
    }

    fn negotiate(&mut self, event: TelnetEvent) {
        match event {
            TelnetEvent::Do(option) => match MccpVersion::from_option(option.to_u8()) {
                Some(version) if self.compression.accepts(version) => {
                    self.compress_start(version);
                }
                // active, or never offered
                Some(_) => {}
                // we drive echo ourselves during password entry
                None if option == TelnetOption::Echo => {}
                _ => self.queue_frame(TelnetFrame::Wont(option)),
            },
            TelnetEvent::Dont(option) if option.is_compression() => {
                if let Err(err) = self.compress_end(false) {
                    warn!(conn = %self.id, %err, "Failed to end compression");
                    self.close_requested = true;
                }
            }
            TelnetEvent::Will(option) => self.queue_frame(TelnetFrame::Dont(option)),
            TelnetEvent::Subnegotiate(option, payload) => {
                trace!(conn = %self.id, %option, len = payload.len(), "Ignoring subnegotiation");
            }
            _ => {}
        }
    }

    /// Move the next complete line into the staging slot
    ///
    /// Returns true when a command is staged. Lines end at LF or CR; a LF or
    /// NUL right after a CR belongs to the same terminator. Only printable
    /// ASCII is kept, and empty lines are discarded after marking the prompt
    /// for redisplay.
    pub(crate) fn frame_next(&mut self) -> bool {
        if self.staged.is_some() {
            return true;
        }
        loop {
            if self.after_cr {
                match self.input.as_slice().first() {
                    None => return false,
                    Some(&byte) => {
                        if byte == consts::LF || byte == consts::NUL {
                            self.input.consume(1);
                        }
                        self.after_cr = false;
                    }
                }
            }

            let data = self.input.as_slice();
            let Some(end) = data
                .iter()
                .position(|&b| b == consts::LF || b == consts::CR)
            else {
                return false;
            };
            let line: String = data[..end]
                .iter()
                .filter(|b| b.is_ascii_graphic() || **b == b' ')
                .map(|&b| char::from(b))
                .collect();
            self.after_cr = data[end] == consts::CR;
            self.input.consume(end + 1);
            self.prompt_pending = true;

            if !line.is_empty() {
                self.staged = Some(line);
                return true;
            }
        }
    }

    /// Take the staged command, if any
    pub(crate) fn take_command(&mut self) -> Option<String> {
        self.staged.take()
    }

    fn accepts_output(&self) -> bool {
        self.transport.is_some() && !self.lookup.is_closed()
    }

    /// Queue text for the client
    ///
    /// While playing, the first output after a prompt starts on a new line
    /// and the prompt is redrawn at the next flush. Output that does not fit
    /// is truncated and marked with [`OVERFLOW_MARKER`].
    pub fn queue_output(&mut self, text: &str) {
        if text.is_empty() || !self.accepts_output() {
            return;
        }
        if self.state == ConnectionState::Playing {
            if !self.prompt_pending && self.output.is_empty() {
                self.queue_bytes(b"\r\n");
            }
            self.prompt_pending = true;
        }
        self.queue_bytes(text.as_bytes());
    }

    /// Queue raw protocol bytes, bypassing prompt handling
    pub(crate) fn queue_raw(&mut self, bytes: &[u8]) {
        if self.accepts_output() {
            self.queue_bytes(bytes);
        }
    }

    fn queue_bytes(&mut self, bytes: &[u8]) {
        if bytes.len() > self.output.remaining()
            && let Err(err) = self.flush()
        {
            debug!(conn = %self.id, %err, "Flush during overflow failed");
            self.close_requested = true;
        }
        if self.output.try_extend(bytes) {
            return;
        }

        let marker = OVERFLOW_MARKER.as_bytes();
        if self.output.remaining() < marker.len() {
            // the marker always lands, even if it overwrites queued text
            let keep = self.output.capacity().saturating_sub(marker.len());
            self.output.truncate(keep);
        }
        let room = self.output.remaining().saturating_sub(marker.len());
        self.output.try_extend(&bytes[..room]);
        self.output.try_extend(marker);
        counter!("pulsemud.output.truncated").increment(1);
        warn!(
            conn = %self.id,
            dropped = bytes.len() - room,
            "Output buffer overflow"
        );
    }

    fn queue_frame(&mut self, frame: TelnetFrame) {
        let mut encoded = BytesMut::with_capacity(8);
        match self.telnet.encode(frame, &mut encoded) {
            Ok(()) => self.queue_raw(&encoded),
            Err(err) => warn!(conn = %self.id, %err, "Failed to encode telnet frame"),
        }
    }

    /// Append `prompt` if playing and a redraw is pending
    pub(crate) fn write_prompt(&mut self, prompt: &str) {
        if self.state == ConnectionState::Playing && self.prompt_pending && self.accepts_output() {
            self.queue_bytes(prompt.as_bytes());
            self.prompt_pending = false;
        }
    }

    /// Ask the client to stop echoing (password entry) or resume
    pub(crate) fn suppress_echo(&mut self, suppress: bool) {
        let frame = if suppress {
            TelnetFrame::Will(TelnetOption::Echo)
        } else {
            TelnetFrame::Wont(TelnetOption::Echo)
        };
        self.queue_frame(frame);
    }

    /// Advertise MCCP; legacy also offers v1
    pub fn offer_compression(&mut self, legacy: bool) {
        if self.compression.state().is_active() {
            return;
        }
        for version in self.compression.offer(legacy) {
            self.queue_frame(TelnetFrame::Will(TelnetOption::from_u8(version.option())));
        }
    }

    /// Start compressing with `version`
    ///
    /// Output already queued goes out uncompressed ahead of the activation
    /// sequence. Returns false if compression was already active.
    pub(crate) fn compress_start(&mut self, version: MccpVersion) -> bool {
        if self.compression.state().is_active() {
            return false;
        }
        self.wire.extend_from_slice(self.output.as_slice());
        self.output.clear();
        self.wire.extend_from_slice(version.activation_sequence());
        self.compression.activate(version);
        counter!("pulsemud.compression.started").increment(1);
        debug!(conn = %self.id, %version, "Compression started");
        true
    }

    /// Stop compressing
    ///
    /// Pending output is compressed and the stream trailer appended so the
    /// client sees a clean end of stream. A forced end never fails; whatever
    /// could not be produced is discarded. Returns false if compression was
    /// not active.
    pub fn compress_end(&mut self, forced: bool) -> Result<bool> {
        let Some(mut stream) = self.compression.deactivate() else {
            return Ok(false);
        };
        let outcome = match stream.compress(self.output.as_slice(), &mut self.wire) {
            Ok(_) => {
                debug!(
                    conn = %self.id,
                    version = %stream.version(),
                    ratio = stream.ratio(),
                    "Compression ended"
                );
                stream.finish(&mut self.wire).map(|_| ())
            }
            Err(err) => Err(err),
        };
        self.output.clear();
        match outcome {
            Ok(()) => Ok(true),
            Err(err) if forced => {
                debug!(conn = %self.id, %err, "Discarding compressed output");
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Hand queued output to the transport
    ///
    /// Output moves into the wire queue, compressed if active, unless the
    /// queue already holds a full buffer's worth. One non-blocking write is
    /// attempted; a short write leaves the remainder queued.
    pub fn flush(&mut self) -> Result<usize> {
        if self.transport.is_none() {
            return Ok(0);
        }
        self.stage_output()?;
        self.write_wire()
    }

    /// Flush until nothing is queued or `timeout` passes
    ///
    /// Returns whether everything reached the transport. Used where the
    /// transport is about to be handed away and a later pulse will not run.
    pub(crate) async fn drain(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.flush()?;
            if self.output.is_empty() && self.wire.is_empty() {
                return Ok(true);
            }
            if self.transport.is_none() || tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(DRAIN_INTERVAL).await;
        }
    }

    fn stage_output(&mut self) -> Result<()> {
        if self.output.is_empty() || self.wire.len() >= self.output.capacity() {
            return Ok(());
        }
        match self.compression.stream_mut() {
            Some(stream) => {
                stream.compress(self.output.as_slice(), &mut self.wire)?;
            }
            None => self.wire.extend_from_slice(self.output.as_slice()),
        }
        self.output.clear();
        Ok(())
    }

    fn write_wire(&mut self) -> Result<usize> {
        if self.wire.is_empty() {
            return Ok(0);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Ok(0);
        };
        match transport.try_write(&self.wire) {
            Ok(0) => Err(EngineError::ConnectionClosed),
            Ok(count) => {
                self.wire.advance(count);
                self.bytes_written += count as u64;
                counter!("pulsemud.bytes.written").increment(count as u64);
                Ok(count)
            }
            Err(err) if would_block(&err) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Close the transport after a best-effort final flush
    ///
    /// Returns false if the connection was already closed. The session, if
    /// any, stays attached for the engine to dispose of.
    pub(crate) fn shut(&mut self) -> bool {
        if self.lookup.is_closed() {
            return false;
        }
        if let Err(err) = self.compress_end(true) {
            debug!(conn = %self.id, %err, "Failed to end compression on close");
        }
        if let Err(err) = self.flush() {
            debug!(conn = %self.id, %err, "Final flush failed");
        }
        self.lookup = self.lookup.on_close();
        self.state = ConnectionState::Closed;
        self.events.cancel_all();
        self.staged = None;
        self.transport = None;
        true
    }
}

impl EventOwner for Connection {
    fn events(&self) -> &EventQueue<Self> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self> {
        &mut self.events
    }

    fn is_alive(&self) -> bool {
        !self.lookup.is_closed()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("lookup", &self.lookup)
            .field("host", &self.hostname)
            .field("compression", &self.compression)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("wire", &self.wire.len())
            .field("session", &self.session.as_ref().map(Session::name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryPeer, MemoryTransport};
    use async_compression::tokio::bufread::ZlibDecoder;
    use tokio::io::AsyncReadExt;

    fn open(input: usize, output: usize) -> (Connection, MemoryPeer) {
        let (transport, peer) = MemoryTransport::pair();
        let mut conn = Connection::new(input, output);
        conn.reset(ConnectionId::new(1), Box::new(transport), None);
        conn.complete_lookup("localhost".to_string());
        (conn, peer)
    }

    fn next_line(conn: &mut Connection) -> Option<String> {
        conn.frame_next();
        conn.take_command()
    }

    #[test]
    fn test_terminators() {
        let (mut conn, peer) = open(256, 256);
        peer.send("one\r\ntwo\nthree\rfour\r\0five\n");
        conn.read().unwrap();
        assert_eq!(next_line(&mut conn).as_deref(), Some("one"));
        assert_eq!(next_line(&mut conn).as_deref(), Some("two"));
        assert_eq!(next_line(&mut conn).as_deref(), Some("three"));
        assert_eq!(next_line(&mut conn).as_deref(), Some("four"));
        assert_eq!(next_line(&mut conn).as_deref(), Some("five"));
        assert_eq!(next_line(&mut conn), None);
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let (mut conn, peer) = open(256, 256);
        peer.send("look\r");
        conn.read().unwrap();
        assert_eq!(next_line(&mut conn).as_deref(), Some("look"));

        peer.send("\nsay hi\r\n");
        conn.read().unwrap();
        assert_eq!(next_line(&mut conn).as_deref(), Some("say hi"));
        assert_eq!(next_line(&mut conn), None);
    }

    #[test]
    fn test_partial_line_waits() {
        let (mut conn, peer) = open(256, 256);
        peer.send("hel");
        conn.read().unwrap();
        assert!(!conn.frame_next());
        peer.send("lo\n");
        conn.read().unwrap();
        assert_eq!(next_line(&mut conn).as_deref(), Some("hello"));
    }

    #[test]
    fn test_non_printables_stripped() {
        let (mut conn, peer) = open(256, 256);
        peer.send(b"sa\x07y\x1b h\xc3\xa9i\n");
        conn.read().unwrap();
        assert_eq!(next_line(&mut conn).as_deref(), Some("say hi"));
    }

    #[test]
    fn test_empty_line_only_busts_prompt() {
        let (mut conn, peer) = open(256, 256);
        assert!(!conn.prompt_pending());
        peer.send("\r\n");
        conn.read().unwrap();
        assert!(!conn.frame_next());
        assert!(conn.prompt_pending());
    }

    #[test]
    fn test_staged_command_blocks_framing() {
        let (mut conn, peer) = open(256, 256);
        peer.send("a\nb\n");
        conn.read().unwrap();
        assert!(conn.frame_next());
        assert!(conn.frame_next());
        assert_eq!(conn.take_command().as_deref(), Some("a"));
        assert_eq!(next_line(&mut conn).as_deref(), Some("b"));
    }

    #[test]
    fn test_input_overflow() {
        let (mut conn, peer) = open(16, 256);
        peer.send([b'a'; 16]);
        assert_eq!(conn.read().unwrap(), 16);
        assert!(matches!(conn.read(), Err(EngineError::InputOverflow(16))));
    }

    #[test]
    fn test_full_buffer_with_lines_skips_read() {
        let (mut conn, peer) = open(16, 256);
        peer.send("abc\r\naaaaaaaaaaa");
        assert_eq!(conn.read().unwrap(), 16);
        peer.send("more");
        assert_eq!(conn.read().unwrap(), 0);
        assert_eq!(next_line(&mut conn).as_deref(), Some("abc"));
        assert_eq!(conn.read().unwrap(), 4);
    }

    #[test]
    fn test_eof_closes() {
        let (mut conn, peer) = open(64, 64);
        peer.close();
        assert!(matches!(conn.read(), Err(EngineError::ConnectionClosed)));
    }

    #[test]
    fn test_input_not_serviced_during_lookup() {
        let (transport, peer) = MemoryTransport::pair();
        let mut conn = Connection::new(64, 64);
        conn.reset(ConnectionId::new(2), Box::new(transport), None);
        peer.send("early\n");
        assert_eq!(conn.read().unwrap(), 0);
        conn.complete_lookup("example.org".to_string());
        assert_eq!(conn.host(), "example.org");
        assert_eq!(conn.read().unwrap(), 6);
    }

    #[test]
    fn test_output_overflow_marker() {
        let (mut conn, peer) = open(64, 64);
        peer.set_write_limit(Some(0));
        conn.queue_output(&"x".repeat(100));
        let pending = conn.pending_output();
        assert_eq!(pending.len(), 64);
        assert!(pending.ends_with(OVERFLOW_MARKER.as_bytes()));
    }

    #[test]
    fn test_overflow_flushes_first() {
        let (mut conn, peer) = open(64, 64);
        conn.queue_output(&"a".repeat(60));
        conn.queue_output(&"b".repeat(10));
        assert_eq!(peer.received(), "a".repeat(60).as_bytes());
        assert_eq!(conn.pending_output(), "b".repeat(10).as_bytes());
    }

    #[test]
    fn test_overflow_marker_lands_when_nearly_full() {
        let (mut conn, peer) = open(64, 64);
        peer.set_write_limit(Some(0));
        conn.queue_output(&"a".repeat(64));
        conn.queue_output(&"b".repeat(10));
        conn.queue_output(&"c".repeat(40));
        conn.queue_output(&"d".repeat(20));
        let pending = conn.pending_output();
        assert_eq!(pending.len(), 64);
        assert!(pending.starts_with(&[b'b'; 10]));
        assert!(pending.ends_with(OVERFLOW_MARKER.as_bytes()));
        assert!(!pending.contains(&b'd'));

        conn.queue_output("e");
        assert!(conn.pending_output().ends_with(OVERFLOW_MARKER.as_bytes()));
    }

    #[test]
    fn test_short_write_keeps_remainder() {
        let (mut conn, peer) = open(64, 64);
        peer.set_write_limit(Some(3));
        conn.queue_output("abcdef");
        assert_eq!(conn.flush().unwrap(), 3);
        assert_eq!(conn.wire_backlog(), 3);
        assert_eq!(conn.flush().unwrap(), 3);
        assert_eq!(peer.received(), b"abcdef");
    }

    #[tokio::test]
    async fn test_drain_empties_wire() {
        let (mut conn, peer) = open(64, 64);
        peer.set_write_limit(Some(4));
        conn.queue_output("the world starts spinning");
        assert!(conn.drain(Duration::from_secs(1)).await.unwrap());
        assert_eq!(conn.wire_backlog(), 0);
        assert_eq!(peer.received_text(), "the world starts spinning");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up_on_stalled_peer() {
        let (mut conn, peer) = open(64, 64);
        peer.set_write_limit(Some(0));
        conn.queue_output("stuck");
        assert!(!conn.drain(Duration::from_millis(50)).await.unwrap());
        assert_eq!(conn.wire_backlog(), 5);
    }

    #[test]
    fn test_playing_output_and_prompt() {
        let (mut conn, peer) = open(256, 256);
        conn.set_state(ConnectionState::Playing);
        conn.queue_output("hi");
        conn.queue_output(" there");
        assert!(conn.prompt_pending());
        conn.write_prompt("> ");
        assert!(!conn.prompt_pending());
        conn.flush().unwrap();
        assert_eq!(peer.received_text(), "\r\nhi there> ");
    }

    #[test]
    fn test_refuses_unknown_options() {
        let (mut conn, peer) = open(64, 64);
        peer.send([consts::IAC, consts::WILL, consts::option::NAWS]);
        peer.send([consts::IAC, consts::DO, consts::option::TTYPE]);
        conn.read().unwrap();
        conn.flush().unwrap();
        assert_eq!(
            peer.received(),
            vec![
                consts::IAC,
                consts::DONT,
                consts::option::NAWS,
                consts::IAC,
                consts::WONT,
                consts::option::TTYPE
            ]
        );
    }

    #[test]
    fn test_unoffered_compression_ignored() {
        let (mut conn, peer) = open(64, 64);
        peer.send([consts::IAC, consts::DO, consts::option::COMPRESS2]);
        peer.send([consts::IAC, consts::DO, consts::option::COMPRESS]);
        conn.read().unwrap();
        conn.flush().unwrap();
        assert_eq!(conn.compression_state(), CompressionState::Uncompressed);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_unoffered_legacy_compression_ignored() {
        let (mut conn, peer) = open(64, 64);
        conn.offer_compression(false);
        conn.flush().unwrap();
        peer.received();
        peer.send([consts::IAC, consts::DO, consts::option::COMPRESS]);
        conn.read().unwrap();
        conn.flush().unwrap();
        assert_eq!(conn.compression_state(), CompressionState::NegotiatingWill);
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_protocol_violation() {
        let (mut conn, peer) = open(64, 64);
        peer.send([consts::IAC, consts::SB, consts::option::GMCP, consts::IAC, consts::WILL]);
        assert!(matches!(conn.read(), Err(EngineError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_compression_round_trip() {
        let (mut conn, peer) = open(256, 256);
        conn.offer_compression(false);
        conn.queue_output("before ");
        conn.flush().unwrap();
        assert_eq!(
            peer.received(),
            [
                &[consts::IAC, consts::WILL, consts::option::COMPRESS2][..],
                b"before "
            ]
            .concat()
        );

        conn.queue_output("raw ");
        peer.send([consts::IAC, consts::DO, consts::option::COMPRESS2]);
        conn.read().unwrap();
        assert_eq!(
            conn.compression_state(),
            CompressionState::Compressing(MccpVersion::V2)
        );
        conn.queue_output("hello compressed world");
        conn.flush().unwrap();
        assert!(conn.compress_end(false).unwrap());
        conn.flush().unwrap();

        let received = peer.received();
        let activation = MccpVersion::V2.activation_sequence();
        assert!(received.starts_with(b"raw "));
        assert_eq!(&received[4..4 + activation.len()], activation);

        let mut decoder = ZlibDecoder::new(&received[4 + activation.len()..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).await.unwrap();
        assert_eq!(plain, b"hello compressed world");
    }

    #[test]
    fn test_shut_is_idempotent() {
        let (mut conn, peer) = open(64, 64);
        conn.queue_output("bye");
        assert!(conn.shut());
        assert!(!conn.shut());
        assert!(conn.is_closed());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(peer.received(), b"bye");
        assert!(peer.is_disconnected());
        conn.queue_output("ignored");
        assert!(conn.pending_output().is_empty());
    }
}
