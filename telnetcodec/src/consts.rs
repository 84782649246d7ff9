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

//! Telnet command and option byte values (RFC 854, RFC 855 and the MUD extensions in use).

/// Subnegotiation End
pub const SE: u8 = 240;
/// No Operation
pub const NOP: u8 = 241;
/// Data Mark
pub const DM: u8 = 242;
/// Break
pub const BRK: u8 = 243;
/// Interrupt Process
pub const IP: u8 = 244;
/// Abort Output
pub const AO: u8 = 245;
/// Are You There
pub const AYT: u8 = 246;
/// Erase Character
pub const EC: u8 = 247;
/// Erase Line
pub const EL: u8 = 248;
/// Go Ahead
pub const GA: u8 = 249;
/// Subnegotiation Begin
pub const SB: u8 = 250;
/// WILL negotiation verb
pub const WILL: u8 = 251;
/// WONT negotiation verb
pub const WONT: u8 = 252;
/// DO negotiation verb
pub const DO: u8 = 253;
/// DONT negotiation verb
pub const DONT: u8 = 254;
/// Interpret As Command
pub const IAC: u8 = 255;
/// End of Record command
pub const EOR: u8 = 239;

/// Carriage Return
pub const CR: u8 = b'\r';
/// Line Feed
pub const LF: u8 = b'\n';
/// Null
pub const NUL: u8 = 0;

/// Option codes.
pub mod option {
    /// Binary Transmission
    pub const BINARY: u8 = 0;
    /// Echo
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead
    pub const SGA: u8 = 3;
    /// Status
    pub const STATUS: u8 = 5;
    /// Timing Mark
    pub const TM: u8 = 6;
    /// Terminal Type
    pub const TTYPE: u8 = 24;
    /// End of Record
    pub const EOR: u8 = 25;
    /// Negotiate About Window Size
    pub const NAWS: u8 = 31;
    /// Linemode
    pub const LINEMODE: u8 = 34;
    /// MUD Server Data Protocol
    pub const MSDP: u8 = 69;
    /// MUD Server Status Protocol
    pub const MSSP: u8 = 70;
    /// MUD Client Compression Protocol, version 1
    pub const COMPRESS: u8 = 85;
    /// MUD Client Compression Protocol, version 2
    pub const COMPRESS2: u8 = 86;
    /// Generic MUD Communication Protocol
    pub const GMCP: u8 = 201;
}
