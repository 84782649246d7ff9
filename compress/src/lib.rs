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

//! # MCCP Compression Stream
//!
//! Output compression for the MUD Client Compression Protocol (MCCP, telnet options
//! 85 and 86). A [`MccpStream`] owns a zlib encoder writing into an in-memory sink;
//! the caller feeds it plaintext and collects wire-ready bytes, so compression fits
//! a non-blocking, pulse-driven write path that never awaits the socket.
//!
//! ## Usage
//!
//! ```rust
//! use bytes::BytesMut;
//! use pulsemud_compress::{MccpStream, MccpVersion};
//!
//! let mut wire = BytesMut::new();
//! wire.extend_from_slice(MccpVersion::V2.activation_sequence());
//!
//! let mut stream = MccpStream::new(MccpVersion::V2);
//! stream.compress(b"Welcome!\r\n", &mut wire).unwrap();
//! stream.finish(&mut wire).unwrap();
//! assert!(wire.len() > MccpVersion::V2.activation_sequence().len());
//! ```
//!
//! ## Flushing
//!
//! Every call to [`MccpStream::compress`] ends with a zlib sync flush so the client can
//! render what it has received without waiting for more output. [`MccpStream::finish`]
//! writes the zlib trailer; after it the client expects raw telnet again.
//!
//! ## Implementation Details
//!
//! The encoder is `async_compression`'s tokio writer over a `Vec<u8>`. A `Vec` sink is
//! always ready, so each encoder future completes on its first poll; it is polled once
//! and a pending result is reported as an error rather than awaited.

use async_compression::Level;
use async_compression::tokio::write::ZlibEncoder;
use bytes::BytesMut;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::io;
use tokio::io::AsyncWriteExt;

/// Telnet Interpret As Command
const IAC: u8 = 255;
/// Telnet Subnegotiation Begin
const SB: u8 = 250;
/// Telnet Subnegotiation End
const SE: u8 = 240;
/// Telnet WILL
const WILL: u8 = 251;

/// MCCP protocol version, identified by its telnet option code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MccpVersion {
    /// Option 85. Its activation sequence omits the IAC before SE.
    V1,
    /// Option 86.
    V2,
}

impl MccpVersion {
    /// Telnet option code for this version.
    pub fn option(self) -> u8 {
        match self {
            MccpVersion::V1 => 85,
            MccpVersion::V2 => 86,
        }
    }

    /// Version for a telnet option code, if it names one.
    pub fn from_option(option: u8) -> Option<Self> {
        match option {
            85 => Some(MccpVersion::V1),
            86 => Some(MccpVersion::V2),
            _ => None,
        }
    }

    /// Bytes that announce the start of compression. They are sent raw; every byte
    /// after them is part of the zlib stream.
    pub fn activation_sequence(self) -> &'static [u8] {
        match self {
            MccpVersion::V1 => &[IAC, SB, 85, WILL, SE],
            MccpVersion::V2 => &[IAC, SB, 86, IAC, SE],
        }
    }
}

impl fmt::Display for MccpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MccpVersion::V1 => write!(f, "MCCPv1"),
            MccpVersion::V2 => write!(f, "MCCPv2"),
        }
    }
}

/// A zlib stream producing MCCP wire bytes.
pub struct MccpStream {
    encoder: ZlibEncoder<Vec<u8>>,
    version: MccpVersion,
    bytes_in: u64,
    bytes_out: u64,
}

impl MccpStream {
    /// Start a new zlib stream at best compression.
    pub fn new(version: MccpVersion) -> Self {
        Self {
            encoder: ZlibEncoder::with_quality(Vec::new(), Level::Best),
            version,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Version negotiated for this stream.
    pub fn version(&self) -> MccpVersion {
        self.version
    }

    /// Plaintext bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Compressed bytes produced so far.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Compressed size over plaintext size, or `1.0` before any input.
    pub fn ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            1.0
        } else {
            self.bytes_out as f64 / self.bytes_in as f64
        }
    }

    /// Compress `input` and append the sync-flushed output to `out`.
    ///
    /// Returns the number of bytes appended. Empty input appends nothing.
    pub fn compress(&mut self, input: &[u8], out: &mut BytesMut) -> io::Result<usize> {
        if input.is_empty() {
            return Ok(0);
        }
        poll_once(self.encoder.write_all(input))?;
        poll_once(self.encoder.flush())?;
        self.bytes_in += input.len() as u64;
        Ok(self.drain(out))
    }

    /// Write the zlib trailer to `out` and end the stream.
    pub fn finish(mut self, out: &mut BytesMut) -> io::Result<usize> {
        poll_once(self.encoder.shutdown())?;
        Ok(self.drain(out))
    }

    fn drain(&mut self, out: &mut BytesMut) -> usize {
        let produced = self.encoder.get_mut();
        let n = produced.len();
        out.extend_from_slice(produced);
        produced.clear();
        self.bytes_out += n as u64;
        n
    }
}

impl fmt::Debug for MccpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MccpStream")
            .field("version", &self.version)
            .field("bytes_in", &self.bytes_in)
            .field("bytes_out", &self.bytes_out)
            .finish()
    }
}

fn poll_once<T>(future: impl Future<Output = io::Result<T>>) -> io::Result<T> {
    future.now_or_never().unwrap_or_else(|| {
        Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "compressor did not complete against an in-memory sink",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::ZlibDecoder;
    use tokio::io::AsyncReadExt;

    async fn inflate(data: &[u8]) -> Vec<u8> {
        let mut decoder = ZlibDecoder::new(data);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).await.unwrap();
        plain
    }

    #[test]
    fn test_version_options() {
        assert_eq!(MccpVersion::V1.option(), 85);
        assert_eq!(MccpVersion::V2.option(), 86);
        assert_eq!(MccpVersion::from_option(86), Some(MccpVersion::V2));
        assert_eq!(MccpVersion::from_option(1), None);
    }

    #[test]
    fn test_activation_sequences() {
        assert_eq!(MccpVersion::V2.activation_sequence(), &[255, 250, 86, 255, 240]);
        assert_eq!(MccpVersion::V1.activation_sequence(), &[255, 250, 85, 251, 240]);
    }

    #[test]
    fn test_empty_input_produces_nothing() {
        let mut stream = MccpStream::new(MccpVersion::V2);
        let mut out = BytesMut::new();
        assert_eq!(stream.compress(b"", &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_each_write_is_flushed() {
        let mut stream = MccpStream::new(MccpVersion::V2);
        let mut out = BytesMut::new();
        let produced = stream.compress(b"hello", &mut out).unwrap();
        assert!(produced > 0);
        // Sync flush ends with an empty stored block.
        assert_eq!(&out[out.len() - 4..], &[0x00, 0x00, 0xFF, 0xFF]);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let mut stream = MccpStream::new(MccpVersion::V2);
        let mut out = BytesMut::new();
        stream.compress(b"You say 'hi'.\r\n", &mut out).unwrap();
        stream.compress(b"> ", &mut out).unwrap();
        assert_eq!(stream.bytes_in(), 17);
        stream.finish(&mut out).unwrap();
        assert_eq!(inflate(&out).await, b"You say 'hi'.\r\n> ");
    }

    #[tokio::test]
    async fn test_ratio_on_repetitive_text() {
        let mut stream = MccpStream::new(MccpVersion::V1);
        let mut out = BytesMut::new();
        let text = "The world starts spinning.\r\n".repeat(200);
        stream.compress(text.as_bytes(), &mut out).unwrap();
        assert!(stream.ratio() < 0.1);
        assert_eq!(stream.bytes_out(), out.len() as u64);
    }
}
