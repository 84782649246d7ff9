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

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Represents possible errors that can occur in the codec handling process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An I/O error occurred while reading from or writing to the underlying stream.
    ///
    /// Contains the error kind and a description of what operation failed.
    IOError {
        /// The kind of I/O error that occurred
        kind: std::io::ErrorKind,
        /// Description of the operation that failed
        operation: String,
    },

    /// Error occurred during telnet option subnegotiation.
    ///
    /// The decoder aborts the subnegotiation and reports this; the peer is
    /// considered to have violated the protocol.
    SubnegotiationError {
        /// The telnet option being subnegotiated
        option: Option<u8>,
        /// Specific reason for the failure
        reason: SubnegotiationErrorKind,
    },

    /// An unknown or invalid telnet command byte was encountered.
    ///
    /// Contains the invalid command byte value.
    UnknownCommand(u8),
}

/// Specific kinds of subnegotiation errors with structured context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubnegotiationErrorKind {
    /// Invalid command byte following IAC inside the subnegotiation payload.
    InvalidCommand {
        /// The invalid command byte
        command: u8,
    },

    /// Payload grew past the decoder's limit without an `IAC SE`.
    Overflow {
        /// Maximum payload length in bytes
        limit: usize,
    },
}

impl std::error::Error for CodecError {}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::IOError { kind, operation } => {
                write!(f, "I/O error during {}: {:?}", operation, kind)
            }
            CodecError::SubnegotiationError { option, reason } => {
                if let Some(opt) = option {
                    write!(f, "Subnegotiation error for option {}: {}", opt, reason)
                } else {
                    write!(f, "Subnegotiation error: {}", reason)
                }
            }
            CodecError::UnknownCommand(cmd) => {
                write!(f, "Unknown telnet command: 0x{:02X}", cmd)
            }
        }
    }
}

impl std::fmt::Display for SubnegotiationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubnegotiationErrorKind::InvalidCommand { command } => {
                write!(f, "invalid command: 0x{:02X}", command)
            }
            SubnegotiationErrorKind::Overflow { limit } => {
                write!(f, "payload exceeds {} bytes", limit)
            }
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::IOError {
            kind: err.kind(),
            operation: err.to_string(),
        }
    }
}
