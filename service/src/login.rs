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


//! The login funnel.
//!
//! New characters go `NewName -> NewPassword -> VerifyPassword -> AskGender`
//! and enter the world; existing ones go `NewName -> AskPassword`. Each step
//! consumes exactly one line, so a new player is in the game after four
//! pulses of input.

use crate::auth::{capitalize, check_name, check_password};
use crate::connection::IDLE_EVENT;
use crate::engine::{CloseReason, Engine};
use crate::session::Session;
use crate::types::{ConnectionId, ConnectionState, Gender, Level};
use metrics::counter;
use tracing::{error, info, warn};

const NAME_PROMPT: &str = "What is your name? ";
const NEW_PASSWORD_PROMPT: &str = "Please enter a new password: ";
const GENDER_PROMPT: &str = "What is your gender? (M)ale, (F)emale or (N)eutral: ";

impl Engine {
    pub(crate) async fn handle_login(&mut self, index: usize, line: &str) {
        let state = self.pool.active()[index].state();
        match state {
            ConnectionState::NewName => self.login_name(index, line).await,
            ConnectionState::NewPassword => self.login_new_password(index, line),
            ConnectionState::VerifyPassword => self.login_verify_password(index, line),
            ConnectionState::AskGender => self.login_gender(index, line).await,
            ConnectionState::AskPassword => self.login_password(index, line).await,
            other => warn!(
                conn = %self.pool.active()[index].id(),
                state = %other,
                "Line dispatched outside the login funnel"
            ),
        }
    }

    /// Whether a session named `name` exists anywhere other than on `id`
    fn name_in_use(&self, name: &str, id: ConnectionId) -> bool {
        let on_connection = self.pool.active().iter().any(|conn| {
            conn.id() != id
                && !conn.is_closed()
                && conn
                    .session()
                    .is_some_and(|session| session.name().eq_ignore_ascii_case(name))
        });
        on_connection
            || self
                .linkdead
                .iter()
                .any(|session| session.name().eq_ignore_ascii_case(name))
    }

    async fn login_name(&mut self, index: usize, line: &str) {
        let id = self.pool.active()[index].id();
        if !check_name(line) {
            self.pool.active_mut()[index].queue_output(&format!(
                "Sorry, that's not a legal name, please pick another.\r\n{NAME_PROMPT}"
            ));
            return;
        }
        let name = capitalize(line);
        info!(conn = %id, player = %name, "Login attempt");

        let profile = self.store.load_profile(&name).await;
        let conn = &mut self.pool.active_mut()[index];
        match profile {
            Ok(Some(profile)) => {
                conn.attach_session(Session::from_profile(profile));
                conn.suppress_echo(true);
                conn.queue_output("What is your password? ");
                conn.set_state(ConnectionState::AskPassword);
            }
            Ok(None) => {
                if self.name_in_use(&name, id) {
                    self.pool.active_mut()[index].queue_output(&format!(
                        "That name is already being created, please pick another.\r\n{NAME_PROMPT}"
                    ));
                    return;
                }
                let conn = &mut self.pool.active_mut()[index];
                conn.attach_session(Session::new(name, Level::Player));
                conn.suppress_echo(true);
                conn.queue_output(NEW_PASSWORD_PROMPT);
                conn.set_state(ConnectionState::NewPassword);
            }
            Err(err) => {
                error!(conn = %id, %err, "Failed to load profile");
                conn.queue_output(&format!(
                    "The player files are unavailable, please try again later.\r\n{NAME_PROMPT}"
                ));
            }
        }
    }

    fn login_new_password(&mut self, index: usize, line: &str) {
        let conn = &mut self.pool.active_mut()[index];
        if !check_password(line) {
            conn.queue_output(&format!(
                "\r\nBetween 5 and 12 chars please!\r\n{NEW_PASSWORD_PROMPT}"
            ));
            return;
        }
        let hash = match self.hasher.hash(line) {
            Ok(hash) => hash,
            Err(err) => {
                error!(conn = %conn.id(), %err, "Failed to hash password");
                conn.queue_output(&format!(
                    "\r\nThat did not work, please try again.\r\n{NEW_PASSWORD_PROMPT}"
                ));
                return;
            }
        };
        if let Some(session) = conn.session_mut() {
            session.set_password_hash(hash);
        }
        conn.queue_output("\r\nPlease verify the password: ");
        conn.set_state(ConnectionState::VerifyPassword);
    }

    fn login_verify_password(&mut self, index: usize, line: &str) {
        let conn = &mut self.pool.active_mut()[index];
        let matches = conn
            .session()
            .is_some_and(|session| self.hasher.verify(line, session.password_hash()));
        if matches {
            conn.suppress_echo(false);
            conn.queue_output(&format!("\r\n{GENDER_PROMPT}"));
            conn.set_state(ConnectionState::AskGender);
        } else {
            if let Some(session) = conn.session_mut() {
                session.set_password_hash(String::new());
            }
            conn.queue_output(&format!(
                "\r\nPassword do not match!\r\n{NEW_PASSWORD_PROMPT}"
            ));
            conn.set_state(ConnectionState::NewPassword);
        }
    }

    async fn login_gender(&mut self, index: usize, line: &str) {
        let conn = &mut self.pool.active_mut()[index];
        let Some(gender) = Gender::parse(line) else {
            conn.queue_output("Please answer M, F or N: ");
            return;
        };
        if let Some(session) = conn.session_mut() {
            session.set_gender(gender);
        }
        self.enter_world(index, true).await;
    }

    async fn login_password(&mut self, index: usize, line: &str) {
        let conn = &mut self.pool.active_mut()[index];
        let id = conn.id();
        conn.suppress_echo(false);
        let Some((name, verified)) = conn.session().map(|session| {
            (
                session.name().to_string(),
                self.hasher.verify(line, session.password_hash()),
            )
        }) else {
            self.close_connection(index, CloseReason::Error);
            return;
        };

        if !verified {
            counter!("pulsemud.logins.failed").increment(1);
            warn!(conn = %id, player = %name, host = %conn.host(), "Bad password");
            conn.queue_output("\r\nBad password!\r\n");
            self.close_connection(index, CloseReason::BadPassword);
            return;
        }

        if let Some(session) = self.take_over_session(&name, id) {
            self.reconnect(index, session);
            return;
        }

        match self.store.load(&name).await {
            Ok(Some(record)) => {
                self.pool.active_mut()[index].attach_session(Session::from_record(record));
                self.enter_world(index, false).await;
            }
            Ok(None) | Err(_) => {
                error!(conn = %id, player = %name, "Player file missing after profile load");
                self.pool.active_mut()[index]
                    .queue_output("\r\nERROR: Your player file is missing!\r\n");
                self.close_connection(index, CloseReason::Error);
            }
        }
    }

    /// Find a session named `name` that `id` may take over
    ///
    /// Linkdead sessions are preferred. A session still playing on another
    /// connection is detached from it and that connection is closed.
    fn take_over_session(&mut self, name: &str, id: ConnectionId) -> Option<Session> {
        if let Some(position) = self
            .linkdead
            .iter()
            .position(|session| session.name().eq_ignore_ascii_case(name))
        {
            return Some(self.linkdead.remove(position));
        }

        let other = self.pool.active().iter().position(|conn| {
            conn.id() != id
                && conn.state() == ConnectionState::Playing
                && conn
                    .session()
                    .is_some_and(|session| session.name().eq_ignore_ascii_case(name))
        })?;
        let session = self.pool.active_mut()[other].take_session();
        self.close_connection(other, CloseReason::TakenOver);
        session
    }

    fn reconnect(&mut self, index: usize, session: Session) {
        let autosave = self.config.autosave_pulses();
        let conn = &mut self.pool.active_mut()[index];
        let id = conn.id();
        let name = session.name().to_string();
        conn.attach_session(session);
        if let Some(session) = conn.session_mut() {
            session.arm_events(autosave);
        }
        conn.events_mut().strip(IDLE_EVENT);
        conn.set_state(ConnectionState::Playing);
        conn.queue_output("You take over a body already in use.\r\n");
        counter!("pulsemud.logins.reconnected").increment(1);
        info!(conn = %id, player = %name, "Player has reconnected");
    }

    async fn enter_world(&mut self, index: usize, is_new: bool) {
        let autosave = self.config.autosave_pulses();
        let conn = &mut self.pool.active_mut()[index];
        let id = conn.id();
        conn.set_state(ConnectionState::EnteringWorld);
        conn.events_mut().strip(IDLE_EVENT);
        let Some(session) = conn.session_mut() else {
            error!(conn = %id, "Entering the world without a session");
            self.close_connection(index, CloseReason::Error);
            return;
        };
        session.arm_events(autosave);
        let name = session.name().to_string();
        let record = is_new.then(|| session.to_record());

        if let Some(record) = record
            && let Err(err) = self.store.save(&record).await
        {
            warn!(conn = %id, player = %name, %err, "Failed to save new player");
        }

        let motd = (self.filter)(&self.config.motd);
        let conn = &mut self.pool.active_mut()[index];
        conn.set_state(ConnectionState::Playing);
        conn.queue_output(&motd);
        counter!("pulsemud.logins").increment(1);
        info!(conn = %id, player = %name, new = is_new, "Player has entered the game");
        self.send_to_playing(Some(id), &format!("{name} has entered the game.\r\n"));
    }
}
