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


//! Commands every engine ships with.

use crate::buffer::TextBuffer;
use crate::commands::{Command, CommandTable};
use crate::engine::{Engine, Request};
use crate::types::{ConnectionId, ConnectionState, Level};
use std::fmt::Write;

/// The default command table
///
/// Order matters for abbreviations: `s` reaches `say` and `q` reaches `quit`.
pub fn builtin_commands() -> CommandTable {
    CommandTable::new(vec![
        Command::new("say", Level::Guest, cmd_say),
        Command::new("save", Level::Guest, cmd_save),
        Command::new("commands", Level::Guest, cmd_commands),
        Command::new("compress", Level::Guest, cmd_compress),
        Command::new("copyover", Level::God, cmd_copyover),
        Command::new("help", Level::Guest, cmd_help),
        Command::new("linkdead", Level::Admin, cmd_linkdead),
        Command::new("quit", Level::Guest, cmd_quit),
        Command::new("shutdown", Level::God, cmd_shutdown),
        Command::new("who", Level::Guest, cmd_who),
    ])
}

fn columns<'a>(words: impl IntoIterator<Item = &'a str>) -> TextBuffer {
    let mut buffer = TextBuffer::new();
    let mut column = 0;
    for word in words {
        let _ = write!(buffer, " {word:<14.14}");
        column += 1;
        if column % 5 == 0 {
            buffer.push_str("\r\n");
        }
    }
    if column % 5 != 0 {
        buffer.push_str("\r\n");
    }
    buffer
}

pub fn cmd_say(engine: &mut Engine, id: ConnectionId, argument: &str) {
    if argument.is_empty() {
        engine.send(id, "Say what?\r\n");
        return;
    }
    let Some(name) = engine.player_name(id) else {
        return;
    };
    engine.send(id, &format!("You say '{argument}'.\r\n"));
    engine.send_to_playing(Some(id), &format!("{name} says '{argument}'.\r\n"));
}

pub fn cmd_save(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    engine.request(Request::Save(id));
}

pub fn cmd_quit(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    engine.request(Request::Quit(id));
}

pub fn cmd_shutdown(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    engine.send(id, "Shutdown requested.\r\n");
    engine.request(Request::Shutdown(id));
}

pub fn cmd_copyover(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    engine.request(Request::Copyover(id));
}

pub fn cmd_commands(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    let level = engine.player_level(id);
    let table = engine.commands().clone();
    let mut buffer = TextBuffer::new();
    buffer.push_str("    - - - - ----==== The full command list ====---- - - - -\r\n\r\n");
    buffer.push_str(columns(table.available(level).map(|command| command.name)).as_str());
    engine.send(id, buffer.as_str());
}

pub fn cmd_help(engine: &mut Engine, id: ConnectionId, argument: &str) {
    if argument.is_empty() {
        let topics = engine.help().topics();
        if topics.is_empty() {
            engine.send(id, "There are no help topics.\r\n");
            return;
        }
        let mut buffer = TextBuffer::new();
        buffer.push_str("      - - - - - ----====[ HELP FILES ]====---- - - - - -\r\n\r\n");
        buffer.push_str(columns(topics.iter().map(String::as_str)).as_str());
        engine.send(id, buffer.as_str());
        return;
    }
    let entry = engine.help().lookup(argument);
    match entry {
        Some(mut text) => {
            if !text.ends_with("\r\n") {
                text.push_str("\r\n");
            }
            engine.send(id, &text);
        }
        None => engine.send(id, "Sorry, no such helpfile.\r\n"),
    }
}

pub fn cmd_compress(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    let legacy = engine.config().legacy_compression;
    let Some(conn) = engine.connection_mut(id) else {
        return;
    };
    if conn.compression_state().is_active() {
        match conn.compress_end(false) {
            Ok(_) => conn.queue_output("Compression disabled.\r\n"),
            Err(_) => conn.queue_output("Failed.\r\n"),
        }
    } else {
        conn.queue_output("Trying compression.\r\n");
        conn.offer_compression(legacy);
    }
}

pub fn cmd_who(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    let show_hosts = engine.player_level(id).is_admin();
    let mut buffer = TextBuffer::new();
    buffer.push_str(" - - - - ----======[ WHO'S ONLINE ]======---- - - - -\r\n");
    let mut count = 0;
    for conn in engine.connections() {
        if conn.state() != ConnectionState::Playing {
            continue;
        }
        let Some(session) = conn.session() else {
            continue;
        };
        count += 1;
        let _ = if show_hosts {
            write!(buffer, " {:<12}  {}\r\n", session.name(), conn.host())
        } else {
            write!(buffer, " {}\r\n", session.name())
        };
    }
    let _ = write!(
        buffer,
        " - - - - ----======[ {count} player{} ]======---- - - - -\r\n",
        if count == 1 { "" } else { "s" }
    );
    engine.send(id, buffer.as_str());
}

pub fn cmd_linkdead(engine: &mut Engine, id: ConnectionId, _argument: &str) {
    let mut buffer = TextBuffer::new();
    for session in engine.linkdead() {
        let _ = write!(buffer, "{} is linkdead.\r\n", session.name());
    }
    if buffer.is_empty() {
        buffer.push_str("Noone is currently linkdead.\r\n");
    }
    engine.send(id, buffer.as_str());
}
