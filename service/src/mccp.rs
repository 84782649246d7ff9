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


//! Per-connection MCCP negotiation state.

use pulsemud_compress::{MccpStream, MccpVersion};
use std::fmt;

/// Where a connection stands in compression negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionState {
    /// No offer outstanding and no stream active
    Uncompressed,
    /// `WILL` sent, waiting for the client's `DO`
    NegotiatingWill,
    /// Output is flowing through a zlib stream
    Compressing(MccpVersion),
}

impl CompressionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Compressing(_))
    }
}

impl fmt::Display for CompressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uncompressed => write!(f, "uncompressed"),
            Self::NegotiatingWill => write!(f, "negotiating"),
            Self::Compressing(version) => write!(f, "compressing ({version})"),
        }
    }
}

/// Compression negotiation and stream for one connection
#[derive(Default)]
pub(crate) struct Compression {
    offered_legacy: bool,
    negotiating: bool,
    stream: Option<MccpStream>,
}

impl Compression {
    pub(crate) fn state(&self) -> CompressionState {
        match (&self.stream, self.negotiating) {
            (Some(stream), _) => CompressionState::Compressing(stream.version()),
            (None, true) => CompressionState::NegotiatingWill,
            (None, false) => CompressionState::Uncompressed,
        }
    }

    /// Versions to advertise, newest first
    pub(crate) fn offer(&mut self, legacy: bool) -> Vec<MccpVersion> {
        self.negotiating = true;
        self.offered_legacy = legacy;
        if legacy {
            vec![MccpVersion::V2, MccpVersion::V1]
        } else {
            vec![MccpVersion::V2]
        }
    }

    /// Whether a `DO` for `version` answers an outstanding offer
    pub(crate) fn accepts(&self, version: MccpVersion) -> bool {
        self.negotiating
            && self.stream.is_none()
            && (version == MccpVersion::V2 || self.offered_legacy)
    }

    pub(crate) fn activate(&mut self, version: MccpVersion) {
        self.negotiating = false;
        self.stream = Some(MccpStream::new(version));
    }

    pub(crate) fn stream_mut(&mut self) -> Option<&mut MccpStream> {
        self.stream.as_mut()
    }

    /// Remove the active stream, leaving the connection uncompressed
    pub(crate) fn deactivate(&mut self) -> Option<MccpStream> {
        self.negotiating = false;
        self.stream.take()
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compression({})", self.state())
    }
}
