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


//! Command-line arguments

use pulsemud_service::DEFAULT_PORT;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::path::PathBuf;
use thiserror::Error;

pub const USAGE: &str = "\
pulsemud-server

USAGE:
  pulsemud-server [--bind HOST:PORT | --port PORT] [--data DIR] [--pps N] [--no-lookup]

OPTIONS:
  --bind HOST:PORT   listen address, default 0.0.0.0:1801
  --port PORT        listen on all interfaces at PORT
  --data DIR         player files and help directory, default ./data
  --pps N            pulses per second, must divide 1000, default 5
  --no-lookup        skip reverse DNS on new connections

ENV:
  PULSEMUD_BIND      default for --bind
  PULSEMUD_DATA      default for --data
  RUST_LOG           log filter, default info
";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },
    #[error("unknown argument {0:?}")]
    Unknown(String),
    #[error("--copyover and --listener must be given together")]
    IncompleteCopyover,
    #[error("help requested")]
    Help,
}

/// Parsed command line
///
/// `copyover` and `listener` are only ever passed by a running server to
/// the image replacing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerArgs {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub pulses_per_second: Option<u32>,
    pub resolve_hostnames: bool,
    pub copyover: Option<PathBuf>,
    pub listener: Option<RawFd>,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            data_dir: PathBuf::from("data"),
            pulses_per_second: None,
            resolve_hostnames: true,
            copyover: None,
            listener: None,
        }
    }
}

impl ServerArgs {
    /// Parse the process arguments over environment defaults
    pub fn from_env() -> Result<Self, ArgsError> {
        let mut defaults = Self::default();
        if let Ok(bind) = std::env::var("PULSEMUD_BIND") {
            defaults.bind = parse_value("PULSEMUD_BIND", &bind)?;
        }
        if let Ok(dir) = std::env::var("PULSEMUD_DATA") {
            defaults.data_dir = PathBuf::from(dir);
        }
        Self::parse(defaults, std::env::args().skip(1))
    }

    /// Parse `args` (without the program name) over `defaults`
    pub fn parse<I>(defaults: Self, args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = defaults;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = || args.next().ok_or_else(|| ArgsError::MissingValue(arg.clone()));
            match arg.as_str() {
                "--bind" => parsed.bind = parse_value(&arg, &value()?)?,
                "--port" => {
                    let port: u16 = parse_value(&arg, &value()?)?;
                    parsed.bind.set_port(port);
                }
                "--data" => parsed.data_dir = PathBuf::from(value()?),
                "--pps" => parsed.pulses_per_second = Some(parse_value(&arg, &value()?)?),
                "--no-lookup" => parsed.resolve_hostnames = false,
                "--copyover" => parsed.copyover = Some(PathBuf::from(value()?)),
                "--listener" => parsed.listener = Some(parse_value(&arg, &value()?)?),
                "-h" | "--help" => return Err(ArgsError::Help),
                _ => return Err(ArgsError::Unknown(arg)),
            }
        }
        if parsed.copyover.is_some() != parsed.listener.is_some() {
            return Err(ArgsError::IncompleteCopyover);
        }
        Ok(parsed)
    }

    /// Arguments that reproduce this configuration in a replacement image
    pub fn exec_args(&self) -> Vec<String> {
        let mut args = vec![
            "--bind".to_string(),
            self.bind.to_string(),
            "--data".to_string(),
            self.data_dir.display().to_string(),
        ];
        if let Some(pps) = self.pulses_per_second {
            args.push("--pps".to_string());
            args.push(pps.to_string());
        }
        if !self.resolve_hostnames {
            args.push("--no-lookup".to_string());
        }
        args
    }

    pub fn players_dir(&self) -> PathBuf {
        self.data_dir.join("players")
    }

    pub fn help_dir(&self) -> PathBuf {
        self.data_dir.join("help")
    }

    pub fn copyover_file(&self) -> PathBuf {
        self.data_dir.join("copyover.dat")
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, ArgsError> {
    value.parse().map_err(|_| ArgsError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}
