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


//! Command table and dispatch for playing connections.

use crate::engine::Engine;
use crate::text::{is_prefix, one_arg};
use crate::types::{ConnectionId, Level};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Handler invoked with the engine, the caller and the argument text
pub type CommandFn = fn(&mut Engine, ConnectionId, &str);

/// One entry in a [`CommandTable`]
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub level: Level,
    pub handler: CommandFn,
}

impl Command {
    pub const fn new(name: &'static str, level: Level, handler: CommandFn) -> Self {
        Self {
            name,
            level,
            handler,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("level", &self.level)
            .finish()
    }
}

/// An ordered, immutable list of commands
///
/// Lookup takes the first entry the typed word abbreviates, so order decides
/// which command a short prefix reaches.
#[derive(Clone, Debug)]
pub struct CommandTable {
    commands: Arc<[Command]>,
}

impl CommandTable {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands: commands.into(),
        }
    }

    /// First command `word` abbreviates that `level` may use
    pub fn find(&self, word: &str, level: Level) -> Option<&Command> {
        self.commands
            .iter()
            .find(|command| level >= command.level && is_prefix(word, command.name))
    }

    /// Commands available at `level`, in table order
    pub fn available(&self, level: Level) -> impl Iterator<Item = &Command> {
        self.commands
            .iter()
            .filter(move |command| level >= command.level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Dispatch one line from a playing connection
pub(crate) fn interpret(engine: &mut Engine, id: ConnectionId, line: &str) {
    // the table is shared, so handlers may borrow the engine mutably
    let table = engine.commands().clone();
    let level = engine.player_level(id);
    let (word, argument) = one_arg(line);

    match table.find(word, level) {
        Some(command) => {
            trace!(conn = %id, command = command.name, "Dispatching");
            (command.handler)(engine, id, argument);
        }
        None => engine.send(id, "No such command.\r\n"),
    }
}
