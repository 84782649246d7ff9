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
/// Frames the server writes onto the wire.
///
#[derive(Clone, Debug, PartialEq)]
pub enum TelnetFrame {
    /// Telnet Data Byte, IAC is escaped on encode
    Data(u8),
    /// No Operation
    NoOperation,
    /// Go Ahead, marks the end of a prompt for half-duplex clients
    GoAhead,
    /// End of Record
    EndOfRecord,
    /// Ask the peer to enable an option
    Do(TelnetOption),
    /// Ask the peer to disable an option
    Dont(TelnetOption),
    /// Offer to enable an option locally
    Will(TelnetOption),
    /// Refuse or disable an option locally
    Wont(TelnetOption),
    /// `IAC SB <option> <payload> IAC SE`, IAC in the payload is escaped on encode
    Subnegotiate(TelnetOption, BytesMut),
}
