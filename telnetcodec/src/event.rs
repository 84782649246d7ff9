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

use super::TelnetOption;
use bytes::BytesMut;

///
/// `TelnetEvent` is what the decoder produces from the client's byte stream.
/// Negotiation verbs are surfaced raw; deciding what to answer is left to the
/// connection that owns the codec.
///
#[derive(Clone, Debug, PartialEq)]
pub enum TelnetEvent {
    /// Telnet Data Byte
    Data(u8),
    /// No Operation
    NoOperation,
    /// End of urgent Data Stream
    DataMark,
    /// Operator pressed the Break key or the Attention key.
    Break,
    /// Interrupt current process.
    InterruptProcess,
    /// Cancel output from the current process.
    AbortOutput,
    /// Request acknowledgment.
    AreYouThere,
    /// Request that the operator erase the previous character.
    EraseCharacter,
    /// Request that the operator erase the previous line.
    EraseLine,
    /// End of input for half-duplex connections.
    GoAhead,
    /// End of Record - marks the end of a prompt
    EndOfRecord,
    /// Peer asks us to enable an option
    Do(TelnetOption),
    /// Peer asks us to disable an option
    Dont(TelnetOption),
    /// Peer offers to enable an option
    Will(TelnetOption),
    /// Peer refuses or disables an option
    Wont(TelnetOption),
    /// Subnegotiation Payload with IAC escapes removed
    Subnegotiate(TelnetOption, BytesMut),
}
