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


use crate::types::ConnectionId;
use std::io;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error from a transport, file or descriptor operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed telnet sequence from the peer
    #[error("Protocol error: {0}")]
    Protocol(#[from] pulsemud_telnetcodec::CodecError),

    /// The input buffer filled without a line terminator
    #[error("Input overflow: {0} bytes without a line terminator")]
    InputOverflow(usize),

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// Connection has been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection cannot be released while a lookup may still reference it
    #[error("Connection {0} is not recyclable")]
    NotRecyclable(ConnectionId),

    /// Player storage failed
    #[error("Store error: {0}")]
    Store(String),

    /// Password hashing failed
    #[error("Credential error: {0}")]
    Credential(String),

    /// Process replacement could not be completed
    #[error("Copyover failed: {0}")]
    Copyover(String),

    /// A line of the transfer file could not be parsed
    #[error("Invalid transfer record: {0}")]
    TransferRecord(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error with a message
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors leave the engine and the affected connection usable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            EngineError::Store(_) | EngineError::Credential(_) | EngineError::Copyover(_) => true,
            _ => false,
        }
    }

    /// Check if the error ends the connection it occurred on
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            EngineError::ConnectionNotFound(_)
                | EngineError::ConnectionClosed
                | EngineError::Io(_)
                | EngineError::InputOverflow(_)
                | EngineError::Protocol(_)
        )
    }

    /// Check if the peer violated the wire protocol
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            EngineError::Protocol(_) | EngineError::InputOverflow(_)
        )
    }
}
