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


//! Identifiers, state machines and snapshots shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a connection
///
/// Identifiers are handed out monotonically by the engine and never reused,
/// even when the underlying pooled connection object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Login and play state of a connection
///
/// `NewName` through `AskGender` form the login funnel. `EnteringWorld` is
/// transient and never observed between pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Waiting for the player to name themselves
    NewName,
    /// Choosing a password for a new character
    NewPassword,
    /// Repeating the new password
    VerifyPassword,
    /// Entering the password of an existing character
    AskPassword,
    /// Choosing a gender for a new character
    AskGender,
    /// Being placed into the world
    EnteringWorld,
    /// In the game and dispatching commands
    Playing,
    /// Closed, waiting to be recycled
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewName => write!(f, "new_name"),
            Self::NewPassword => write!(f, "new_password"),
            Self::VerifyPassword => write!(f, "verify_password"),
            Self::AskPassword => write!(f, "ask_password"),
            Self::AskGender => write!(f, "ask_gender"),
            Self::EnteringWorld => write!(f, "entering_world"),
            Self::Playing => write!(f, "playing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for ConnectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_name" => Ok(Self::NewName),
            "new_password" => Ok(Self::NewPassword),
            "verify_password" => Ok(Self::VerifyPassword),
            "ask_password" => Ok(Self::AskPassword),
            "ask_gender" => Ok(Self::AskGender),
            "entering_world" => Ok(Self::EnteringWorld),
            "playing" => Ok(Self::Playing),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown connection state '{other}'")),
        }
    }
}

/// Progress of the reverse lookup attached to a connection
///
/// The ordering is meaningful: a connection may only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LookupStatus {
    /// A lookup task owns the hostname slot
    Lookup,
    /// The hostname is known and input may be serviced
    Done,
    /// Closed while the lookup was still running
    WaitClose,
    /// Closed and safe to return to the free list
    ClosedRecyclable,
}

impl LookupStatus {
    /// Status after the connection is closed
    pub fn on_close(self) -> Self {
        match self {
            Self::Lookup => Self::WaitClose,
            Self::Done => Self::ClosedRecyclable,
            other => other,
        }
    }

    /// Status after a lookup reply has been collected
    pub fn on_lookup_complete(self) -> Self {
        match self {
            Self::Lookup => Self::Done,
            Self::WaitClose => Self::ClosedRecyclable,
            other => other,
        }
    }

    /// Whether the connection has been closed
    pub fn is_closed(self) -> bool {
        matches!(self, Self::WaitClose | Self::ClosedRecyclable)
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "lookup"),
            Self::Done => write!(f, "done"),
            Self::WaitClose => write!(f, "wait_close"),
            Self::ClosedRecyclable => write!(f, "closed"),
        }
    }
}

/// Privilege level of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Not yet logged in
    Guest = 1,
    /// Ordinary player
    Player = 2,
    /// Administrator
    Admin = 3,
    /// Administrator with control over the process
    God = 4,
}

impl Level {
    /// Whether the level carries administrative rights
    pub fn is_admin(self) -> bool {
        self >= Self::Admin
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::Player => write!(f, "player"),
            Self::Admin => write!(f, "admin"),
            Self::God => write!(f, "god"),
        }
    }
}

/// Gender chosen at character creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Neutral,
}

impl Gender {
    /// Parse a login answer such as `m`, `Female` or `n`
    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Some(Self::Male),
            "f" | "female" => Some(Self::Female),
            "n" | "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => write!(f, "male"),
            Self::Female => write!(f, "female"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Point-in-time view of engine occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Pulses executed since start
    pub pulse: u64,
    /// Connections on the active list, closed ones included
    pub active_connections: usize,
    /// Connections parked on the free list
    pub free_connections: usize,
    /// Connections currently in the `Playing` state
    pub playing: usize,
    /// Sessions without a connection
    pub linkdead_sessions: usize,
    /// Reverse lookups not yet collected
    pub lookups_in_flight: usize,
}

impl fmt::Display for EngineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Engine {{ pulse: {}, active: {}, free: {}, playing: {}, linkdead: {}, lookups: {} }}",
            self.pulse,
            self.active_connections,
            self.free_connections,
            self.playing,
            self.linkdead_sessions,
            self.lookups_in_flight
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id() {
        let id1 = ConnectionId::new(1);
        let id2 = ConnectionId::new(2);

        assert_eq!(id1.as_u64(), 1);
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id2.to_string(), "conn-2");
    }

    #[test]
    fn test_connection_state_names() {
        let states = [
            ConnectionState::NewName,
            ConnectionState::NewPassword,
            ConnectionState::VerifyPassword,
            ConnectionState::AskPassword,
            ConnectionState::AskGender,
            ConnectionState::EnteringWorld,
            ConnectionState::Playing,
            ConnectionState::Closed,
        ];
        for state in states {
            assert_eq!(state.to_string().parse::<ConnectionState>(), Ok(state));
        }
        assert_eq!(ConnectionState::Playing.to_string(), "playing");
        assert!("bogus".parse::<ConnectionState>().is_err());
    }

    #[test]
    fn test_lookup_transitions() {
        assert_eq!(LookupStatus::Lookup.on_close(), LookupStatus::WaitClose);
        assert_eq!(LookupStatus::Done.on_close(), LookupStatus::ClosedRecyclable);
        assert_eq!(
            LookupStatus::WaitClose.on_lookup_complete(),
            LookupStatus::ClosedRecyclable
        );
        assert_eq!(LookupStatus::Lookup.on_lookup_complete(), LookupStatus::Done);
        // closing twice changes nothing
        assert_eq!(
            LookupStatus::WaitClose.on_close(),
            LookupStatus::WaitClose
        );
        assert!(LookupStatus::WaitClose.is_closed());
        assert!(!LookupStatus::Done.is_closed());
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Guest < Level::Player);
        assert!(Level::Admin < Level::God);
        assert!(Level::God.is_admin());
        assert!(!Level::Player.is_admin());
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse("m"), Some(Gender::Male));
        assert_eq!(Gender::parse("Female"), Some(Gender::Female));
        assert_eq!(Gender::parse(" N "), Some(Gender::Neutral));
        assert_eq!(Gender::parse("x"), None);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = EngineSnapshot {
            pulse: 3,
            active_connections: 2,
            free_connections: 1,
            playing: 1,
            linkdead_sessions: 0,
            lookups_in_flight: 1,
        };
        assert_eq!(
            snapshot.to_string(),
            "Engine { pulse: 3, active: 2, free: 1, playing: 1, linkdead: 0, lookups: 1 }"
        );
    }
}
