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

use crate::consts;
use std::fmt;

///
/// Telnet options recognised by the engine. Anything else is carried as
/// [`TelnetOption::Unknown`] so it can be refused by value.
///
/// [Telnet Terminal Options](https://www.iana.org/assignments/telnet-options/telnet-options.xhtml)
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetOption {
    /// [`consts::option::BINARY`] Telnet Binary Transmission [RFC856](https://tools.ietf.org/html/rfc856)
    TransmitBinary,
    /// [`consts::option::ECHO`] Telnet Echo Option [RFC857](https://tools.ietf.org/html/rfc857)
    Echo,
    /// [`consts::option::SGA`] Suppress Go ahead [RFC858](https://tools.ietf.org/html/rfc858)
    SuppressGoAhead,
    /// [`consts::option::STATUS`] Telnet Status Option [RFC859](http://www.iana.org/go/rfc859)
    Status,
    /// [`consts::option::TM`] Telnet Timing Mark Option [RFC860](http://www.iana.org/go/rfc860)
    TimingMark,
    /// [`consts::option::TTYPE`] Terminal Type [RFC1091](http://www.iana.org/go/rfc1091)
    TTYPE,
    /// [`consts::option::EOR`] End of Record [RFC885](http://www.iana.org/go/rfc885)
    EOR,
    /// [`consts::option::NAWS`] Negotiate About Window Size [RFC1073](http://www.iana.org/go/rfc1073)
    NAWS,
    /// [`consts::option::LINEMODE`] Linemode [RFC1184](http://www.iana.org/go/rfc1184)
    Linemode,
    /// [`consts::option::MSDP`] MUD Server Data Protocol
    MSDP,
    /// [`consts::option::MSSP`] MUD Server Status Protocol
    MSSP,
    /// [`consts::option::COMPRESS`] MUD Client Compression Protocol v1
    Compress1,
    /// [`consts::option::COMPRESS2`] MUD Client Compression Protocol v2
    Compress2,
    /// [`consts::option::GMCP`] Generic MUD Communication Protocol
    GMCP,
    /// Any option code without a named variant
    Unknown(u8),
}

impl TelnetOption {
    /// Wire value of this option.
    pub fn to_u8(&self) -> u8 {
        match self {
            TelnetOption::TransmitBinary => consts::option::BINARY,
            TelnetOption::Echo => consts::option::ECHO,
            TelnetOption::SuppressGoAhead => consts::option::SGA,
            TelnetOption::Status => consts::option::STATUS,
            TelnetOption::TimingMark => consts::option::TM,
            TelnetOption::TTYPE => consts::option::TTYPE,
            TelnetOption::EOR => consts::option::EOR,
            TelnetOption::NAWS => consts::option::NAWS,
            TelnetOption::Linemode => consts::option::LINEMODE,
            TelnetOption::MSDP => consts::option::MSDP,
            TelnetOption::MSSP => consts::option::MSSP,
            TelnetOption::Compress1 => consts::option::COMPRESS,
            TelnetOption::Compress2 => consts::option::COMPRESS2,
            TelnetOption::GMCP => consts::option::GMCP,
            TelnetOption::Unknown(byte) => *byte,
        }
    }

    /// Option for a wire value.
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            consts::option::BINARY => TelnetOption::TransmitBinary,
            consts::option::ECHO => TelnetOption::Echo,
            consts::option::SGA => TelnetOption::SuppressGoAhead,
            consts::option::STATUS => TelnetOption::Status,
            consts::option::TM => TelnetOption::TimingMark,
            consts::option::TTYPE => TelnetOption::TTYPE,
            consts::option::EOR => TelnetOption::EOR,
            consts::option::NAWS => TelnetOption::NAWS,
            consts::option::LINEMODE => TelnetOption::Linemode,
            consts::option::MSDP => TelnetOption::MSDP,
            consts::option::MSSP => TelnetOption::MSSP,
            consts::option::COMPRESS => TelnetOption::Compress1,
            consts::option::COMPRESS2 => TelnetOption::Compress2,
            consts::option::GMCP => TelnetOption::GMCP,
            byte => TelnetOption::Unknown(byte),
        }
    }

    /// True for either MCCP version.
    pub fn is_compression(&self) -> bool {
        matches!(self, TelnetOption::Compress1 | TelnetOption::Compress2)
    }
}

impl From<u8> for TelnetOption {
    fn from(byte: u8) -> Self {
        Self::from_u8(byte)
    }
}

impl From<TelnetOption> for u8 {
    fn from(option: TelnetOption) -> Self {
        option.to_u8()
    }
}

impl fmt::Display for TelnetOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetOption::Unknown(byte) => write!(f, "Unknown({byte})"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_byte_mapping() {
        for byte in 0..=u8::MAX {
            assert_eq!(TelnetOption::from_u8(byte).to_u8(), byte);
        }
    }

    #[test]
    fn test_compression_options() {
        assert_eq!(TelnetOption::from_u8(85), TelnetOption::Compress1);
        assert_eq!(TelnetOption::from_u8(86), TelnetOption::Compress2);
        assert!(TelnetOption::Compress2.is_compression());
        assert!(!TelnetOption::Echo.is_compression());
    }

    #[test]
    fn test_display() {
        assert_eq!(TelnetOption::Compress2.to_string(), "Compress2");
        assert_eq!(TelnetOption::Unknown(200).to_string(), "Unknown(200)");
    }
}
