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

use super::{CodecError, SubnegotiationErrorKind, TelnetEvent, TelnetFrame, TelnetOption, consts};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Default ceiling on a single subnegotiation payload.
pub const DEFAULT_MAX_SUBNEGOTIATION: usize = 1024;

/// A codec for the Telnet protocol.
///
/// The decoder is a byte-at-a-time state machine that survives being fed a
/// stream in arbitrary pieces: an `IAC` at the end of one read and its
/// command byte at the start of the next decode the same as one read.
/// Option negotiation is reported raw; the codec keeps no option table.
pub struct TelnetCodec {
    decoder_buffer: BytesMut,
    decoder_state: DecoderState,
    max_subnegotiation: usize,
}

impl TelnetCodec {
    /// Creates a new instance of `TelnetCodec`.
    ///
    /// # Example
    /// ```
    /// use pulsemud_telnetcodec::TelnetCodec;
    ///
    /// let codec = TelnetCodec::new();
    /// ```
    pub fn new() -> TelnetCodec {
        TelnetCodec::default()
    }

    /// Codec with a custom ceiling on subnegotiation payload length.
    pub fn with_max_subnegotiation(limit: usize) -> TelnetCodec {
        TelnetCodec {
            max_subnegotiation: limit,
            ..TelnetCodec::default()
        }
    }

    /// Drop any partially decoded sequence and return to plain data.
    pub fn reset(&mut self) {
        self.decoder_state = DecoderState::NormalData;
        self.decoder_buffer.clear();
    }

    /// True while the decoder is part way through a command sequence.
    pub fn is_mid_sequence(&self) -> bool {
        self.decoder_state != DecoderState::NormalData
    }

    fn abort_subnegotiation(&mut self, option: u8, reason: SubnegotiationErrorKind) -> CodecError {
        self.decoder_state = DecoderState::NormalData;
        self.decoder_buffer.clear();
        warn!("Aborting subnegotiation for option {}: {}", option, reason);
        CodecError::SubnegotiationError {
            option: Some(option),
            reason,
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        TelnetCodec {
            decoder_buffer: BytesMut::new(),
            decoder_state: DecoderState::NormalData,
            max_subnegotiation: DEFAULT_MAX_SUBNEGOTIATION,
        }
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = CodecError;

    /// Decodes bytes from `src` into the next [`TelnetEvent`].
    ///
    /// ## States
    /// - `NormalData`: plain bytes are emitted as `TelnetEvent::Data`; `IAC` moves to
    ///   `InterpretAsCommand`.
    /// - `InterpretAsCommand`: two-byte commands are emitted directly, `IAC IAC` is a
    ///   literal 0xFF data byte, `DO`/`DONT`/`WILL`/`WONT` wait for their option byte and
    ///   `SB` starts a subnegotiation. Unknown commands log a warning and emit
    ///   `NoOperation`.
    /// - `Subnegotiate` / `SubnegotiateArgument` / `SubnegotiateArgumentIAC`: payload bytes
    ///   are collected (with `IAC IAC` unescaped) until `IAC SE`.
    ///
    /// # Errors
    /// Any other command after `IAC` inside a subnegotiation, or a payload longer than the
    /// configured limit, aborts the subnegotiation and returns
    /// [`CodecError::SubnegotiationError`].
    ///
    /// Returns `Ok(None)` once `src` is exhausted; state carries over to the next call.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetEvent>, Self::Error> {
        while src.remaining() > 0 {
            let byte = src.get_u8();
            match (self.decoder_state, byte) {
                (DecoderState::NormalData, consts::IAC) => {
                    self.decoder_state = DecoderState::InterpretAsCommand;
                }
                (DecoderState::NormalData, _) => {
                    return Ok(Some(TelnetEvent::Data(byte)));
                }
                (DecoderState::InterpretAsCommand, consts::NOP) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::NoOperation));
                }
                (DecoderState::InterpretAsCommand, consts::DM) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::DataMark));
                }
                (DecoderState::InterpretAsCommand, consts::BRK) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Break));
                }
                (DecoderState::InterpretAsCommand, consts::IP) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::InterruptProcess));
                }
                (DecoderState::InterpretAsCommand, consts::AO) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::AbortOutput));
                }
                (DecoderState::InterpretAsCommand, consts::AYT) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::AreYouThere));
                }
                (DecoderState::InterpretAsCommand, consts::EC) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::EraseCharacter));
                }
                (DecoderState::InterpretAsCommand, consts::EL) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::EraseLine));
                }
                (DecoderState::InterpretAsCommand, consts::GA) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::GoAhead));
                }
                (DecoderState::InterpretAsCommand, consts::EOR) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::EndOfRecord));
                }
                (DecoderState::InterpretAsCommand, consts::IAC) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Data(consts::IAC)));
                }
                (DecoderState::InterpretAsCommand, consts::DO) => {
                    self.decoder_state = DecoderState::NegotiateDo;
                }
                (DecoderState::InterpretAsCommand, consts::DONT) => {
                    self.decoder_state = DecoderState::NegotiateDont;
                }
                (DecoderState::InterpretAsCommand, consts::WILL) => {
                    self.decoder_state = DecoderState::NegotiateWill;
                }
                (DecoderState::InterpretAsCommand, consts::WONT) => {
                    self.decoder_state = DecoderState::NegotiateWont;
                }
                (DecoderState::InterpretAsCommand, consts::SB) => {
                    self.decoder_state = DecoderState::Subnegotiate;
                }
                (DecoderState::InterpretAsCommand, _) => {
                    // Return to NormalData State, and return a No Operation
                    warn!("Received Unknown Command {:#X}", byte);
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::NoOperation));
                }
                (DecoderState::NegotiateDo, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Do(TelnetOption::from_u8(byte))));
                }
                (DecoderState::NegotiateDont, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Dont(TelnetOption::from_u8(byte))));
                }
                (DecoderState::NegotiateWill, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Will(TelnetOption::from_u8(byte))));
                }
                (DecoderState::NegotiateWont, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Wont(TelnetOption::from_u8(byte))));
                }
                (DecoderState::Subnegotiate, _) => {
                    self.decoder_state = DecoderState::SubnegotiateArgument(byte);
                }
                (DecoderState::SubnegotiateArgument(option), consts::IAC) => {
                    self.decoder_state = DecoderState::SubnegotiateArgumentIAC(option);
                }
                (DecoderState::SubnegotiateArgument(option), _) => {
                    if self.decoder_buffer.len() >= self.max_subnegotiation {
                        let limit = self.max_subnegotiation;
                        return Err(
                            self.abort_subnegotiation(option, SubnegotiationErrorKind::Overflow { limit })
                        );
                    }
                    self.decoder_buffer.put_u8(byte);
                }
                (DecoderState::SubnegotiateArgumentIAC(option), consts::IAC) => {
                    if self.decoder_buffer.len() >= self.max_subnegotiation {
                        let limit = self.max_subnegotiation;
                        return Err(
                            self.abort_subnegotiation(option, SubnegotiationErrorKind::Overflow { limit })
                        );
                    }
                    self.decoder_state = DecoderState::SubnegotiateArgument(option);
                    self.decoder_buffer.put_u8(consts::IAC);
                }
                (DecoderState::SubnegotiateArgumentIAC(option), consts::SE) => {
                    self.decoder_state = DecoderState::NormalData;
                    let payload = self.decoder_buffer.split();
                    return Ok(Some(TelnetEvent::Subnegotiate(
                        TelnetOption::from_u8(option),
                        payload,
                    )));
                }
                (DecoderState::SubnegotiateArgumentIAC(option), _) => {
                    return Err(self.abort_subnegotiation(
                        option,
                        SubnegotiationErrorKind::InvalidCommand { command: byte },
                    ));
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<u8> for TelnetCodec {
    type Error = CodecError;

    fn encode(&mut self, item: u8, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Encode a raw byte, escaping IAC if necessary
        dst.reserve(2);
        if item == consts::IAC {
            dst.put_u8(consts::IAC);
        }
        dst.put_u8(item);
        Ok(())
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = CodecError;

    /// Encodes a [`TelnetFrame`] into `dst`.
    ///
    /// Data bytes equal to `IAC` are doubled. Negotiation frames are three bytes,
    /// `IAC <verb> <option>`. Subnegotiation frames are wrapped in `IAC SB <option>`
    /// and `IAC SE` with any `IAC` in the payload doubled.
    fn encode(&mut self, item: TelnetFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            TelnetFrame::Data(ch) => {
                dst.reserve(2);
                if ch == consts::IAC {
                    dst.put_u8(consts::IAC);
                }
                dst.put_u8(ch);
            }
            TelnetFrame::NoOperation => {
                dst.reserve(2);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::NOP);
            }
            TelnetFrame::GoAhead => {
                dst.reserve(2);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::GA);
            }
            TelnetFrame::EndOfRecord => {
                dst.reserve(2);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::EOR);
            }
            TelnetFrame::Do(option) => {
                dst.reserve(3);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::DO);
                dst.put_u8(option.to_u8());
            }
            TelnetFrame::Dont(option) => {
                dst.reserve(3);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::DONT);
                dst.put_u8(option.to_u8());
            }
            TelnetFrame::Will(option) => {
                dst.reserve(3);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::WILL);
                dst.put_u8(option.to_u8());
            }
            TelnetFrame::Wont(option) => {
                dst.reserve(3);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::WONT);
                dst.put_u8(option.to_u8());
            }
            TelnetFrame::Subnegotiate(option, arguments) => {
                dst.reserve(arguments.len() + 5);
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::SB);
                dst.put_u8(option.to_u8());
                for byte in arguments {
                    if byte == consts::IAC {
                        dst.put_u8(consts::IAC);
                    }
                    dst.put_u8(byte);
                }
                dst.put_u8(consts::IAC);
                dst.put_u8(consts::SE);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderState {
    NormalData,
    InterpretAsCommand,
    NegotiateDo,
    NegotiateDont,
    NegotiateWill,
    NegotiateWont,
    Subnegotiate,
    SubnegotiateArgument(u8),
    SubnegotiateArgumentIAC(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut TelnetCodec, bytes: &[u8]) -> Vec<TelnetEvent> {
        let mut src = BytesMut::from(bytes);
        let mut events = Vec::new();
        while let Some(event) = codec.decode(&mut src).unwrap() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_negotiation_split_across_reads() {
        let mut codec = TelnetCodec::new();
        assert!(decode_all(&mut codec, &[consts::IAC]).is_empty());
        assert!(codec.is_mid_sequence());
        assert!(decode_all(&mut codec, &[consts::DO]).is_empty());
        let events = decode_all(&mut codec, &[consts::option::COMPRESS2, b'x']);
        assert_eq!(
            events,
            vec![
                TelnetEvent::Do(TelnetOption::Compress2),
                TelnetEvent::Data(b'x')
            ]
        );
        assert!(!codec.is_mid_sequence());
    }

    #[test]
    fn test_subnegotiation_unescapes_iac() {
        let mut codec = TelnetCodec::new();
        let events = decode_all(
            &mut codec,
            &[
                consts::IAC,
                consts::SB,
                consts::option::TTYPE,
                0,
                consts::IAC,
                consts::IAC,
                b'A',
                consts::IAC,
                consts::SE,
            ],
        );
        assert_eq!(
            events,
            vec![TelnetEvent::Subnegotiate(
                TelnetOption::TTYPE,
                BytesMut::from(&[0, consts::IAC, b'A'][..])
            )]
        );
    }

    #[test]
    fn test_invalid_command_inside_subnegotiation() {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::from(
            &[consts::IAC, consts::SB, consts::option::NAWS, 1, consts::IAC, consts::NOP][..],
        );
        let err = codec.decode(&mut src).unwrap_err();
        assert_eq!(
            err,
            CodecError::SubnegotiationError {
                option: Some(consts::option::NAWS),
                reason: SubnegotiationErrorKind::InvalidCommand {
                    command: consts::NOP
                },
            }
        );
        assert!(!codec.is_mid_sequence());
    }

    #[test]
    fn test_subnegotiation_overflow() {
        let mut codec = TelnetCodec::with_max_subnegotiation(4);
        let mut src = BytesMut::from(&[consts::IAC, consts::SB, 24, 1, 2, 3, 4, 5][..]);
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(
            err,
            CodecError::SubnegotiationError {
                reason: SubnegotiationErrorKind::Overflow { limit: 4 },
                ..
            }
        ));
    }

    #[test]
    fn test_encode_negotiation_frames() {
        let mut codec = TelnetCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(TelnetFrame::Will(TelnetOption::Compress2), &mut dst)
            .unwrap();
        codec
            .encode(TelnetFrame::Wont(TelnetOption::Echo), &mut dst)
            .unwrap();
        assert_eq!(
            &dst[..],
            &[
                consts::IAC,
                consts::WILL,
                consts::option::COMPRESS2,
                consts::IAC,
                consts::WONT,
                consts::option::ECHO
            ]
        );
    }

    #[test]
    fn test_encode_subnegotiation_escapes_payload() {
        let mut codec = TelnetCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(
                TelnetFrame::Subnegotiate(TelnetOption::GMCP, BytesMut::from(&[consts::IAC][..])),
                &mut dst,
            )
            .unwrap();
        assert_eq!(
            &dst[..],
            &[
                consts::IAC,
                consts::SB,
                consts::option::GMCP,
                consts::IAC,
                consts::IAC,
                consts::IAC,
                consts::SE
            ]
        );
    }
}
