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

//! # Pulsemud Telnet Protocol Codec
//!
//! Stateful, byte-oriented Telnet codec used by the pulsemud connection engine.
//!
//! ## Overview
//!
//! The Telnet protocol (RFC 854) interleaves command sequences with plain data on a
//! single TCP stream. This codec handles:
//!
//! - **Data transmission**: Raw byte data with proper IAC (Interpret As Command) escaping
//! - **Control commands**: Break, Interrupt Process, Abort Output, etc.
//! - **Option negotiation**: DO, DONT, WILL, WONT surfaced to the caller as events
//! - **Subnegotiation**: `IAC SB ... IAC SE` payloads with a bounded length
//!
//! The codec does not decide what to answer to a negotiation. The engine refuses
//! everything except MCCP (options 85 and 86) and the echo toggling it drives itself.
//!
//! ## Usage Example
//!
//! ```rust
//! use pulsemud_telnetcodec::{TelnetCodec, TelnetEvent, TelnetFrame, TelnetOption};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//!
//! let mut codec = TelnetCodec::new();
//!
//! // Offer compression
//! let mut out = BytesMut::new();
//! codec.encode(TelnetFrame::Will(TelnetOption::Compress2), &mut out).unwrap();
//! assert_eq!(&out[..], &[255, 251, 86]);
//!
//! // Client accepts and types a line
//! let mut input = BytesMut::from(&b"\xFF\xFD\x56hi\r\n"[..]);
//! let mut events = Vec::new();
//! while let Some(event) = codec.decode(&mut input).unwrap() {
//!     events.push(event);
//! }
//! assert_eq!(events[0], TelnetEvent::Do(TelnetOption::Compress2));
//! assert_eq!(events[1], TelnetEvent::Data(b'h'));
//! ```
//!
//! ## Error Handling
//!
//! Unknown two-byte commands decode to `NoOperation`. A malformed or oversized
//! subnegotiation is reported as [`CodecError::SubnegotiationError`], which callers
//! treat as a protocol violation.
//!
//! ## Thread Safety
//!
//! `TelnetCodec` is **not** thread-safe and should not be shared between threads without
//! appropriate synchronization. Each connection has its own codec instance.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod codec;
pub mod consts;
mod event;
mod frame;
mod options;
mod result;

pub use self::codec::{DEFAULT_MAX_SUBNEGOTIATION, TelnetCodec};
pub use self::event::TelnetEvent;
pub use self::frame::TelnetFrame;
pub use self::options::TelnetOption;
pub use self::result::{CodecError, CodecResult, SubnegotiationErrorKind};

#[cfg(test)]
mod tests {
    use super::{TelnetCodec, TelnetEvent, TelnetFrame, TelnetOption, consts};
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    #[tokio::test]
    async fn telnet_decode() {
        let mut codec = TelnetCodec::new();
        let mut input_buffer = BytesMut::from("Terminated line\r\n");
        let expected_output: Vec<TelnetEvent> = b"Terminated line\r\n"
            .iter()
            .map(|byte| TelnetEvent::Data(*byte))
            .collect();
        let mut actual_output = Vec::new();
        while let Some(event) = codec.decode(&mut input_buffer).unwrap() {
            actual_output.push(event)
        }
        assert_eq!(expected_output, actual_output, "telnet_decode didn't match");
    }

    #[test]
    fn telnet_encode() {
        let mut codec = TelnetCodec::new();
        let expected_output = BytesMut::from(&b"Raw Ascii Data\r\n"[..]);
        let mut actual_output = BytesMut::with_capacity(20);
        for byte in b"Raw Ascii Data\r\n" {
            codec.encode(TelnetFrame::Data(*byte), &mut actual_output).unwrap();
        }
        assert_eq!(expected_output, actual_output, "telnet_encode didn't match");
    }

    #[test]
    fn decode_iac_activation() {
        let mut codec = TelnetCodec::new();
        let mut input_buffer = BytesMut::from(
            &[
                b'L',
                b'o',
                b'g',
                consts::CR,
                consts::LF,
                // Command Do Compress2
                consts::IAC,
                consts::DO,
                consts::option::COMPRESS2,
                b'P',
                b'w',
                // Command Will Terminal Type
                consts::IAC,
                consts::WILL,
                consts::option::TTYPE,
                // Escaped IAC
                consts::IAC,
                consts::IAC,
                consts::CR,
                consts::LF,
            ][..],
        );
        let expected_output = vec![
            TelnetEvent::Data(b'L'),
            TelnetEvent::Data(b'o'),
            TelnetEvent::Data(b'g'),
            TelnetEvent::Data(consts::CR),
            TelnetEvent::Data(consts::LF),
            TelnetEvent::Do(TelnetOption::Compress2),
            TelnetEvent::Data(b'P'),
            TelnetEvent::Data(b'w'),
            TelnetEvent::Will(TelnetOption::TTYPE),
            TelnetEvent::Data(consts::IAC),
            TelnetEvent::Data(consts::CR),
            TelnetEvent::Data(consts::LF),
        ];
        let mut actual_output = Vec::new();
        while let Some(event) = codec.decode(&mut input_buffer).unwrap() {
            actual_output.push(event)
        }

        assert_eq!(expected_output, actual_output);
    }

    #[test]
    fn decode_two_byte_commands() {
        let mut codec = TelnetCodec::new();
        let mut input = BytesMut::from(
            &[
                consts::IAC,
                consts::NOP,
                consts::IAC,
                consts::AYT,
                consts::IAC,
                consts::GA,
                consts::IAC,
                0x10,
            ][..],
        );
        let mut events = Vec::new();
        while let Some(event) = codec.decode(&mut input).unwrap() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                TelnetEvent::NoOperation,
                TelnetEvent::AreYouThere,
                TelnetEvent::GoAhead,
                TelnetEvent::NoOperation,
            ]
        );
    }
}
