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


//! The pulse loop.
//!
//! [`Engine`] owns every connection, session and collaborator. Nothing is
//! global: the loop holds the only `&mut Engine`, and each pulse runs the
//! same phases in the same order.
//!
//! 1. Collect reverse lookup replies
//! 2. Read once from every serviceable connection
//! 3. Dispatch at most one line per connection
//! 4. Fire connection events, then session events
//! 5. Process deferred requests and autosaves
//! 6. Flush output, redrawing prompts
//! 7. Recycle closed connections

use crate::auth::{Argon2Hasher, CredentialHasher};
use crate::builtins::builtin_commands;
use crate::commands::{CommandTable, interpret};
use crate::config::EngineConfig;
use crate::connection::{Connection, IDLE_EVENT};
use crate::error::{EngineError, Result};
use crate::events::run_events;
use crate::pool::SocketPool;
use crate::resolver::{HostResolver, LookupReply, Resolver, SystemResolver};
use crate::session::Session;
use crate::store::{MemoryStore, PlayerStore};
use crate::text::{HelpProvider, NoHelp, OutputFilter, plain_text};
use crate::transport::Transport;
use crate::types::{ConnectionId, ConnectionState, EngineSnapshot, Level};
use metrics::{counter, gauge};
use std::fmt;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Work a command asks the engine to do once dispatch is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Save the caller's session
    Save(ConnectionId),
    /// Save and disconnect the caller
    Quit(ConnectionId),
    /// Replace the process image after this pulse
    Copyover(ConnectionId),
    /// Stop the loop after this pulse
    Shutdown(ConnectionId),
}

/// Why a connection is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// End of stream from the peer
    PeerClosed,
    /// Transport or internal failure
    Error,
    /// Malformed telnet or input overflow
    Protocol,
    /// The connection asked to be closed, usually from an event
    Requested,
    /// Closed by an operator
    Kicked,
    /// The player quit
    Quit,
    /// Another connection took the session
    TakenOver,
    /// Failed authentication
    BadPassword,
    /// Could not be carried through a copyover
    Reboot,
    /// The engine is stopping
    Shutdown,
}

impl CloseReason {
    /// Whether a playing session survives as linkdead
    pub fn keeps_session(self) -> bool {
        matches!(
            self,
            Self::PeerClosed | Self::Error | Self::Protocol | Self::Requested | Self::Kicked
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PeerClosed => "peer closed",
            Self::Error => "error",
            Self::Protocol => "protocol violation",
            Self::Requested => "requested",
            Self::Kicked => "kicked",
            Self::Quit => "quit",
            Self::TakenOver => "taken over",
            Self::BadPassword => "bad password",
            Self::Reboot => "reboot",
            Self::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

impl From<&EngineError> for CloseReason {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::ConnectionClosed => Self::PeerClosed,
            err if err.is_protocol_error() => Self::Protocol,
            _ => Self::Error,
        }
    }
}

/// Builds an [`Engine`] from a configuration and its collaborators
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn PlayerStore>>,
    hasher: Option<Arc<dyn CredentialHasher>>,
    resolver: Option<Arc<dyn HostResolver>>,
    help: Option<Arc<dyn HelpProvider>>,
    commands: Option<CommandTable>,
    filter: OutputFilter,
}

impl EngineBuilder {
    pub fn store(mut self, store: Arc<dyn PlayerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn help(mut self, help: Arc<dyn HelpProvider>) -> Self {
        self.help = Some(help);
        self
    }

    pub fn commands(mut self, commands: CommandTable) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn output_filter(mut self, filter: OutputFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Validate the configuration and build the engine
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let pool = SocketPool::new(
            self.config.input_buffer_size,
            self.config.output_buffer_size,
        );
        let hasher: Arc<dyn CredentialHasher> = match self.hasher {
            Some(hasher) => hasher,
            None => Arc::new(Argon2Hasher::with_cost(
                self.config.hash_memory_kib,
                self.config.hash_iterations,
            )?),
        };
        Ok(Engine {
            pool,
            resolver: Resolver::new(
                self.resolver
                    .unwrap_or_else(|| Arc::new(SystemResolver)),
            ),
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            hasher,
            help: self.help.unwrap_or_else(|| Arc::new(NoHelp)),
            commands: self.commands.unwrap_or_else(builtin_commands),
            filter: self.filter,
            config: self.config,
            linkdead: Vec::new(),
            requests: Vec::new(),
            pending_copyover: None,
            next_id: 0,
            pulse: 0,
            shutting_down: false,
        })
    }
}

/// The connection engine
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) pool: SocketPool,
    pub(crate) resolver: Resolver,
    pub(crate) store: Arc<dyn PlayerStore>,
    pub(crate) hasher: Arc<dyn CredentialHasher>,
    pub(crate) help: Arc<dyn HelpProvider>,
    pub(crate) commands: CommandTable,
    pub(crate) filter: OutputFilter,
    pub(crate) linkdead: Vec<Session>,
    requests: Vec<Request>,
    pending_copyover: Option<ConnectionId>,
    next_id: u64,
    pulse: u64,
    shutting_down: bool,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            store: None,
            hasher: None,
            resolver: None,
            help: None,
            commands: None,
            filter: plain_text,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn help(&self) -> &dyn HelpProvider {
        self.help.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn PlayerStore> {
        &self.store
    }

    /// Pulses completed so far
    pub fn pulse_count(&self) -> u64 {
        self.pulse
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Open connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.pool.active().iter().filter(|conn| !conn.is_closed())
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.pool.get(id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.pool.get_mut(id)
    }

    /// Sessions whose connection dropped while playing
    pub fn linkdead(&self) -> &[Session] {
        &self.linkdead
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            pulse: self.pulse,
            active_connections: self.pool.active_len(),
            free_connections: self.pool.free_len(),
            playing: self
                .connections()
                .filter(|conn| conn.state() == ConnectionState::Playing)
                .count(),
            linkdead_sessions: self.linkdead.len(),
            lookups_in_flight: self.resolver.in_flight(),
        }
    }

    pub(crate) fn next_connection_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId::new(self.next_id)
    }

    /// Take over a freshly accepted transport
    ///
    /// Returns `None` and drops the transport when the engine is full.
    pub fn accept(&mut self, transport: Box<dyn Transport>, peer: SocketAddr) -> Option<ConnectionId> {
        if self.pool.active_len() >= self.config.max_connections {
            let mut transport = transport;
            let _ = transport.try_write(b"Sorry, the server is full. Please try again later.\r\n");
            counter!("pulsemud.connections.rejected").increment(1);
            warn!(%peer, max = self.config.max_connections, "Connection refused, server full");
            return None;
        }

        let id = self.next_connection_id();
        let idle_pulses = self.config.idle_pulses();
        let greeting = (self.filter)(&self.config.greeting);
        let conn = self.pool.acquire(id, transport, Some(peer));
        if self.config.offer_compression {
            conn.offer_compression(self.config.legacy_compression);
        }
        conn.queue_output(&greeting);
        conn.queue_output("What is your name? ");
        conn.events_mut()
            .schedule(IDLE_EVENT, idle_pulses, |conn: &mut Connection| {
                conn.queue_output("\r\nYou have been idle too long. Goodbye.\r\n");
                conn.request_close();
            });

        if self.config.resolve_hostnames {
            self.resolver.spawn(id, peer.ip());
        } else {
            conn.complete_lookup(peer.ip().to_string());
        }

        counter!("pulsemud.connections.total").increment(1);
        info!(conn = %id, %peer, "New connection");
        Some(id)
    }

    /// Queue `text` for a connection, through the output filter
    pub fn send(&mut self, id: ConnectionId, text: &str) {
        let filtered = (self.filter)(text);
        if let Some(conn) = self.pool.get_mut(id) {
            conn.queue_output(&filtered);
        }
    }

    /// Queue `text` for every playing connection except `except`
    pub fn send_to_playing(&mut self, except: Option<ConnectionId>, text: &str) {
        let filtered = (self.filter)(text);
        for conn in self.pool.active_mut() {
            if conn.state() == ConnectionState::Playing && Some(conn.id()) != except {
                conn.queue_output(&filtered);
            }
        }
    }

    pub fn player_name(&self, id: ConnectionId) -> Option<String> {
        self.pool
            .get(id)
            .and_then(Connection::session)
            .map(|session| session.name().to_string())
    }

    /// Level of the session on `id`, [`Level::Guest`] without one
    pub fn player_level(&self, id: ConnectionId) -> Level {
        self.pool
            .get(id)
            .and_then(Connection::session)
            .map_or(Level::Guest, Session::level)
    }

    /// Queue work to run after dispatch
    pub fn request(&mut self, request: Request) {
        self.requests.push(request);
    }

    /// Close a connection on operator request
    pub fn close(&mut self, id: ConnectionId) -> Result<()> {
        let index = self
            .pool
            .position(id)
            .ok_or(EngineError::ConnectionNotFound(id))?;
        self.close_connection(index, CloseReason::Kicked);
        Ok(())
    }

    /// Close the connection at `index` on the active list
    ///
    /// A playing session survives as linkdead when `reason` allows it;
    /// otherwise it is destroyed. Closing twice is a no-op.
    pub(crate) fn close_connection(&mut self, index: usize, reason: CloseReason) {
        let conn = &mut self.pool.active_mut()[index];
        let id = conn.id();
        let was_playing = conn.state() == ConnectionState::Playing;
        if reason == CloseReason::TakenOver {
            conn.queue_output("\r\nThis connection has been taken over.\r\n");
        }
        if !conn.shut() {
            return;
        }
        counter!("pulsemud.connections.closed").increment(1);

        if let Some(mut session) = conn.take_session() {
            if was_playing && reason.keeps_session() {
                session.detach();
                info!(conn = %id, player = %session.name(), "Closing link to player");
                self.linkdead.push(session);
            } else {
                session.destroy();
            }
        }
        info!(conn = %id, %reason, "Connection closed");
    }

    /// Run one pulse
    pub async fn pulse(&mut self) {
        self.pulse += 1;
        counter!("pulsemud.pulses").increment(1);

        self.collect_lookups();
        self.read_input();
        self.dispatch_input().await;
        self.fire_events();
        self.process_requests().await;
        self.flush_output();
        self.reap();
    }

    fn collect_lookups(&mut self) {
        for reply in self.resolver.try_collect() {
            self.apply_lookup(reply);
        }
    }

    fn apply_lookup(&mut self, reply: LookupReply) {
        match self.pool.get_mut(reply.id) {
            Some(conn) => {
                debug!(conn = %reply.id, host = %reply.hostname, "Lookup complete");
                conn.complete_lookup(reply.hostname);
            }
            None => debug!(conn = %reply.id, "Lookup reply for unknown connection"),
        }
    }

    /// Wait for every outstanding lookup and apply the replies
    pub async fn settle_lookups(&mut self) {
        for reply in self.resolver.settle().await {
            self.apply_lookup(reply);
        }
    }

    fn read_input(&mut self) {
        for index in 0..self.pool.active_len() {
            let conn = &mut self.pool.active_mut()[index];
            if !conn.is_serviceable() {
                continue;
            }
            let id = conn.id();
            let result = conn.read();
            let reason = match result {
                Ok(_) => conn
                    .take_close_request()
                    .then_some(CloseReason::Requested),
                Err(err) => {
                    match &err {
                        EngineError::ConnectionClosed => debug!(conn = %id, "Peer closed"),
                        err if err.is_protocol_error() => {
                            counter!("pulsemud.errors.protocol").increment(1);
                            warn!(conn = %id, %err, "Protocol violation")
                        }
                        err => debug!(conn = %id, %err, "Read failed"),
                    }
                    Some(CloseReason::from(&err))
                }
            };
            if let Some(reason) = reason {
                self.close_connection(index, reason);
            }
        }
    }

    async fn dispatch_input(&mut self) {
        for index in 0..self.pool.active_len() {
            let conn = &mut self.pool.active_mut()[index];
            if !conn.is_serviceable() || !conn.frame_next() {
                continue;
            }
            let Some(line) = conn.take_command() else {
                continue;
            };
            let id = conn.id();
            if conn.state() == ConnectionState::Playing {
                interpret(self, id, &line);
            } else {
                self.handle_login(index, &line).await;
            }
        }
    }

    fn fire_events(&mut self) {
        for index in 0..self.pool.active_len() {
            let conn = &mut self.pool.active_mut()[index];
            if conn.is_closed() {
                continue;
            }
            run_events(conn);
            if let Some(session) = conn.session_mut() {
                run_events(session);
            }
            if conn.take_close_request() {
                self.close_connection(index, CloseReason::Requested);
            }
        }
        for session in &mut self.linkdead {
            run_events(session);
        }
    }

    async fn process_requests(&mut self) {
        let requests = std::mem::take(&mut self.requests);
        for request in requests {
            match request {
                Request::Save(id) => match self.save_connection(id).await {
                    Ok(()) => self.send(id, "Saved.\r\n"),
                    Err(err) => {
                        warn!(conn = %id, %err, "Save failed");
                        self.send(id, "Save failed, please try again later.\r\n");
                    }
                },
                Request::Quit(id) => self.quit(id).await,
                Request::Copyover(id) => self.pending_copyover = Some(id),
                Request::Shutdown(id) => {
                    info!(conn = %id, "Shutdown requested");
                    self.shutting_down = true;
                }
            }
        }
        self.autosave().await;
    }

    async fn save_connection(&mut self, id: ConnectionId) -> Result<()> {
        let record = self
            .pool
            .get(id)
            .and_then(Connection::session)
            .map(Session::to_record)
            .ok_or(EngineError::ConnectionNotFound(id))?;
        self.store.save(&record).await?;
        counter!("pulsemud.saves").increment(1);
        Ok(())
    }

    async fn quit(&mut self, id: ConnectionId) {
        if let Err(err) = self.save_connection(id).await {
            warn!(conn = %id, %err, "Failed to save on quit");
        }
        let Some(index) = self.pool.position(id) else {
            return;
        };
        if let Some(name) = self.player_name(id) {
            info!(conn = %id, player = %name, "Player has left the game");
            self.send_to_playing(Some(id), &format!("{name} has left the game.\r\n"));
        }
        self.pool.active_mut()[index].queue_output("Alas, all good things must come to an end.\r\n");
        self.close_connection(index, CloseReason::Quit);
    }

    async fn autosave(&mut self) {
        let mut records = Vec::new();
        for conn in self.pool.active_mut() {
            if let Some(session) = conn.session_mut()
                && session.take_save_request()
            {
                records.push(session.to_record());
            }
        }
        for session in &mut self.linkdead {
            if session.take_save_request() {
                records.push(session.to_record());
            }
        }
        for record in records {
            match self.store.save(&record).await {
                Ok(()) => debug!(player = %record.name, "Autosaved"),
                Err(err) => warn!(player = %record.name, %err, "Autosave failed"),
            }
        }
    }

    fn flush_output(&mut self) {
        for index in 0..self.pool.active_len() {
            let conn = &mut self.pool.active_mut()[index];
            if conn.is_closed() {
                continue;
            }
            conn.write_prompt(&self.config.prompt);
            if let Err(err) = conn.flush() {
                debug!(conn = %conn.id(), %err, "Flush failed");
                let reason = CloseReason::from(&err);
                self.close_connection(index, reason);
            }
        }
    }

    fn reap(&mut self) {
        let released = self.pool.recycle();
        if released > 0 {
            debug!(released, "Recycled connections");
        }
        gauge!("pulsemud.connections.active").set(self.pool.active_len() as f64);
        gauge!("pulsemud.sessions.linkdead").set(self.linkdead.len() as f64);
    }

    /// Take the copyover request raised during the last pulse, if any
    pub fn take_copyover_request(&mut self) -> Option<ConnectionId> {
        self.pending_copyover.take()
    }

    /// Serve `listener` until shutdown
    ///
    /// Pulses run on a fixed interval; a pulse that overruns delays the next
    /// one rather than bursting to catch up. Accepts are interleaved between
    /// pulses. Ctrl-C or the `shutdown` command ends the loop after saving
    /// every player.
    pub async fn run(&mut self, listener: TcpListener) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.pulse_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        info!(
            address = ?listener.local_addr().ok(),
            pps = self.config.pulses_per_second,
            "Engine running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pulse().await;
                    if let Some(requested_by) = self.take_copyover_request()
                        && let Err(err) = self.copyover(requested_by, Some(listener.as_raw_fd())).await
                    {
                        error!(%err, "Copyover aborted, still serving");
                    }
                    if self.shutting_down {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        if let Err(err) = socket.set_nodelay(true) {
                            debug!(%peer, %err, "Failed to set TCP_NODELAY");
                        }
                        self.accept(Box::new(socket), peer);
                    }
                    Err(err) => warn!(%err, "Accept failed"),
                },
                result = &mut interrupt, if !self.shutting_down => {
                    match result {
                        Ok(()) => info!("Interrupt received"),
                        Err(err) => warn!(%err, "Failed to listen for interrupt"),
                    }
                    self.shutting_down = true;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Save every player and close every connection
    pub async fn shutdown(&mut self) {
        self.shutting_down = true;
        info!(snapshot = %self.snapshot(), "Shutting down");

        for index in 0..self.pool.active_len() {
            let conn = &self.pool.active()[index];
            if conn.is_closed() {
                continue;
            }
            let record = conn
                .session()
                .filter(|_| conn.state() == ConnectionState::Playing)
                .map(Session::to_record);
            if let Some(record) = record
                && let Err(err) = self.store.save(&record).await
            {
                error!(player = %record.name, %err, "Failed to save on shutdown");
            }
            self.pool.active_mut()[index].queue_output("\r\nThe server is shutting down. Goodbye.\r\n");
            self.close_connection(index, CloseReason::Shutdown);
        }

        for mut session in std::mem::take(&mut self.linkdead) {
            if let Err(err) = self.store.save(&session.to_record()).await {
                error!(player = %session.name(), %err, "Failed to save linkdead player on shutdown");
            }
            session.destroy();
        }
        self.pool.recycle();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("snapshot", &self.snapshot())
            .field("commands", &self.commands.len())
            .finish()
    }
}
