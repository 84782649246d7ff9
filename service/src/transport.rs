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


//! Non-blocking byte transports.
//!
//! The engine never awaits a socket. Each pulse it tries a read and a write
//! on every connection and moves on when the transport would block.

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};

/// A byte stream the engine can poll without blocking
pub trait Transport: Send {
    /// Read whatever is available into `buf`
    ///
    /// `Ok(0)` means the peer closed the stream. A transport with nothing to
    /// offer returns an error of kind [`io::ErrorKind::WouldBlock`].
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `buf` as the transport accepts right now
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// OS descriptor that can survive a copyover, if there is one
    fn descriptor(&self) -> Option<RawFd>;
}

impl Transport for tokio::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }

    fn descriptor(&self) -> Option<RawFd> {
        Some(self.as_raw_fd())
    }
}

pub(crate) fn would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[derive(Debug, Default)]
struct Pipe {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    peer_closed: bool,
    transport_dropped: bool,
    write_limit: Option<usize>,
}

fn lock(pipe: &Mutex<Pipe>) -> MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process transport driven from a [`MemoryPeer`]
///
/// Used to run the engine without sockets, in tests and benchmarks.
#[derive(Debug)]
pub struct MemoryTransport {
    pipe: Arc<Mutex<Pipe>>,
    descriptor: Option<RawFd>,
}

/// The client side of a [`MemoryTransport`]
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    pipe: Arc<Mutex<Pipe>>,
}

impl MemoryTransport {
    /// Create a connected transport and peer without a descriptor
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        Self::build(None)
    }

    /// Create a pair whose transport reports `fd` as its descriptor
    ///
    /// The descriptor is only reported, never touched.
    pub fn with_descriptor(fd: RawFd) -> (MemoryTransport, MemoryPeer) {
        Self::build(Some(fd))
    }

    fn build(descriptor: Option<RawFd>) -> (MemoryTransport, MemoryPeer) {
        let pipe = Arc::new(Mutex::new(Pipe::default()));
        (
            MemoryTransport {
                pipe: Arc::clone(&pipe),
                descriptor,
            },
            MemoryPeer { pipe },
        )
    }
}

impl Transport for MemoryTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.pipe);
        if pipe.inbound.is_empty() {
            if pipe.peer_closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let count = buf.len().min(pipe.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = lock(&self.pipe);
        if pipe.peer_closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let count = match pipe.write_limit {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };
        pipe.outbound.extend_from_slice(&buf[..count]);
        Ok(count)
    }

    fn descriptor(&self) -> Option<RawFd> {
        self.descriptor
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        lock(&self.pipe).transport_dropped = true;
    }
}

impl MemoryPeer {
    /// Queue bytes for the engine to read
    pub fn send(&self, bytes: impl AsRef<[u8]>) {
        lock(&self.pipe).inbound.extend(bytes.as_ref());
    }

    /// Take everything the engine has written so far
    pub fn received(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.pipe).outbound)
    }

    /// Take everything written so far as lossy UTF-8
    pub fn received_text(&self) -> String {
        String::from_utf8_lossy(&self.received()).into_owned()
    }

    /// Close the client side; the engine reads end of stream once drained
    pub fn close(&self) {
        lock(&self.pipe).peer_closed = true;
    }

    /// Cap the bytes accepted per write; `Some(0)` makes writes would-block
    pub fn set_write_limit(&self, limit: Option<usize>) {
        lock(&self.pipe).write_limit = limit;
    }

    /// Whether the engine has dropped its end
    pub fn is_disconnected(&self) -> bool {
        lock(&self.pipe).transport_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_read_would_block() {
        let (mut transport, _peer) = MemoryTransport::pair();
        let mut buf = [0u8; 8];
        let err = transport.try_read(&mut buf).unwrap_err();
        assert!(would_block(&err));
    }

    #[test]
    fn test_read_and_write() {
        let (mut transport, peer) = MemoryTransport::pair();
        peer.send("hello");
        let mut buf = [0u8; 3];
        assert_eq!(transport.try_read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(transport.try_read(&mut buf).unwrap(), 2);

        assert_eq!(transport.try_write(b"out").unwrap(), 3);
        assert_eq!(peer.received(), b"out");
        assert!(peer.received().is_empty());
    }

    #[test]
    fn test_close_reads_eof_after_drain() {
        let (mut transport, peer) = MemoryTransport::pair();
        peer.send("x");
        peer.close();
        let mut buf = [0u8; 8];
        assert_eq!(transport.try_read(&mut buf).unwrap(), 1);
        assert_eq!(transport.try_read(&mut buf).unwrap(), 0);
        assert!(transport.try_write(b"late").is_err());
    }

    #[test]
    fn test_write_limit() {
        let (mut transport, peer) = MemoryTransport::pair();
        peer.set_write_limit(Some(2));
        assert_eq!(transport.try_write(b"abcd").unwrap(), 2);
        peer.set_write_limit(Some(0));
        assert!(would_block(&transport.try_write(b"cd").unwrap_err()));
    }

    #[test]
    fn test_drop_is_observed() {
        let (transport, peer) = MemoryTransport::with_descriptor(42);
        assert_eq!(transport.descriptor(), Some(42));
        assert!(!peer.is_disconnected());
        drop(transport);
        assert!(peer.is_disconnected());
    }
}
