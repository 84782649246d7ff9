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


//! The in-game identity of a player, separate from any connection.

use crate::events::{EventOwner, EventQueue};
use crate::store::{PlayerRecord, ProfileSummary};
use crate::types::{ConnectionId, Gender, Level};

/// Label of the periodic autosave event
pub const AUTOSAVE_EVENT: &str = "autosave";

/// A player session
///
/// A session outlives its connection when the link drops, and is handed to a
/// new connection on reconnect or takeover.
#[derive(Debug)]
pub struct Session {
    name: String,
    password_hash: String,
    level: Level,
    gender: Gender,
    connection: Option<ConnectionId>,
    save_requested: bool,
    alive: bool,
    events: EventQueue<Session>,
}

impl Session {
    pub fn new(name: impl Into<String>, level: Level) -> Self {
        Self {
            name: name.into(),
            password_hash: String::new(),
            level,
            gender: Gender::default(),
            connection: None,
            save_requested: false,
            alive: true,
            events: EventQueue::new(),
        }
    }

    /// Build a session holding only what authentication needs
    pub fn from_profile(profile: ProfileSummary) -> Self {
        let mut session = Self::new(profile.name, profile.level);
        session.password_hash = profile.password_hash;
        session
    }

    pub fn from_record(record: PlayerRecord) -> Self {
        let mut session = Self::new(record.name, record.level);
        session.password_hash = record.password_hash;
        session.gender = record.gender;
        session
    }

    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            name: self.name.clone(),
            password_hash: self.password_hash.clone(),
            level: self.level,
            gender: self.gender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn set_password_hash(&mut self, hash: String) {
        self.password_hash = hash;
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn set_gender(&mut self, gender: Gender) {
        self.gender = gender;
    }

    /// Connection currently driving this session, `None` while linkdead
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn is_linkdead(&self) -> bool {
        self.connection.is_none()
    }

    pub(crate) fn attach(&mut self, id: ConnectionId) {
        self.connection = Some(id);
    }

    pub(crate) fn detach(&mut self) {
        self.connection = None;
    }

    pub fn request_save(&mut self) {
        self.save_requested = true;
    }

    /// Clear and return the pending save request
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.save_requested)
    }

    /// Arm the periodic session events if they are not already queued
    pub fn arm_events(&mut self, autosave_pulses: Option<u32>) {
        if let Some(pulses) = autosave_pulses
            && !self.events.contains(AUTOSAVE_EVENT)
        {
            self.events
                .schedule_periodic(AUTOSAVE_EVENT, pulses, pulses, |session: &mut Session| {
                    session.request_save()
                });
        }
    }

    /// Mark the session dead and drop its events
    pub fn destroy(&mut self) -> usize {
        self.alive = false;
        self.connection = None;
        self.events.cancel_all()
    }
}

impl EventOwner for Session {
    fn events(&self) -> &EventQueue<Self> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self> {
        &mut self.events
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
