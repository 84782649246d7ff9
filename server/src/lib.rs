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


//! Pulsemud server
//!
//! The pieces of the binary that touch the outside world: command-line
//! arguments, player files on disk, the help directory and colour codes.
//! `main` wires them into a [`pulsemud_service::Engine`].

mod args;
mod color;
mod help;
mod store;

pub use args::{ArgsError, ServerArgs, USAGE};
pub use color::ansi_color;
pub use help::{GREETING_TOPIC, MOTD_TOPIC, load_help};
pub use store::JsonFileStore;
