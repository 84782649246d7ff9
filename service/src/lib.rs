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


//! Pulse-driven MUD connection engine
//!
//! A single-threaded game loop over a pool of telnet connections. Time moves
//! in pulses, a fixed number per second, and every pulse runs the same
//! phases in the same order:
//!
//! ```text
//! collect lookups → read sockets → one command per connection
//!     → connection events → session events → requests and autosave
//!     → flush output and prompts → recycle closed slots
//! ```
//!
//! All game state lives in one owned [`Engine`]. Command handlers are plain
//! functions over `&mut Engine`; anything that has to wait on storage is
//! queued as a [`Request`] and handled later in the same pulse. Reverse DNS
//! runs on blocking tasks whose replies are handed back over a channel, so a
//! lookup never touches a connection directly.
//!
//! Players who drop without quitting stay in the world as linkdead sessions
//! and are reattached when they log in again with the right password. A
//! `copyover` re-executes the binary with every playing socket inherited
//! across the exec.
//!
//! # Example
//!
//! ```no_run
//! use pulsemud_service::{Engine, EngineConfig};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let listener = TcpListener::bind(config.bind_address).await?;
//!     let mut engine = Engine::builder(config).build()?;
//!     engine.run(listener).await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod buffer;
mod builtins;
mod commands;
mod config;
mod connection;
mod copyover;
mod engine;
mod error;
mod events;
mod login;
mod mccp;
mod pool;
mod resolver;
mod session;
mod store;
mod text;
mod transport;
pub mod types;

pub use auth::{Argon2Hasher, CredentialHasher, capitalize, check_name, check_password};
pub use buffer::{FixedBuffer, TextBuffer};
pub use builtins::builtin_commands;
pub use commands::{Command, CommandFn, CommandTable};
pub use config::{DEFAULT_BUFFER_SIZE, DEFAULT_PORT, EngineConfig};
pub use connection::{Connection, IDLE_EVENT, OVERFLOW_MARKER};
pub use copyover::{
    TRANSFER_TERMINATOR, TransferRecord, decode_transfer, encode_transfer, inherit_listener,
    inherit_tcp_descriptor, read_transfer_file, set_close_on_exec,
};
pub use engine::{CloseReason, Engine, EngineBuilder, Request};
pub use error::{EngineError, Result};
pub use events::{Event, EventAction, EventOwner, EventQueue, run_events};
pub use mccp::CompressionState;
pub use pool::SocketPool;
pub use resolver::{HostResolver, LookupReply, NumericResolver, Resolver, SystemResolver};
pub use session::{AUTOSAVE_EVENT, Session};
pub use store::{MemoryStore, PlayerRecord, PlayerStore, ProfileSummary};
pub use text::{HelpProvider, NoHelp, OutputFilter, StaticHelp, is_prefix, one_arg, plain_text};
pub use transport::{MemoryPeer, MemoryTransport, Transport};
pub use types::{ConnectionId, ConnectionState, EngineSnapshot, Gender, Level, LookupStatus};
