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


//! Pulsemud server binary

use pulsemud_server::{
    ArgsError, GREETING_TOPIC, JsonFileStore, MOTD_TOPIC, ServerArgs, USAGE, ansi_color, load_help,
};
use pulsemud_service::{
    Engine, EngineConfig, EngineError, HelpProvider, inherit_listener, inherit_tcp_descriptor,
};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum ServerError {
    #[error(transparent)]
    Args(#[from] ArgsError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match ServerArgs::from_env() {
        Ok(args) => args,
        Err(ArgsError::Help) => {
            eprint!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("{err}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "Server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServerArgs) -> Result<(), ServerError> {
    let store = JsonFileStore::new(args.players_dir());
    store.ensure_dir().await?;
    let help = load_help(&args.help_dir()).await?;

    let mut config = EngineConfig::new(args.bind)
        .with_hostname_lookup(args.resolve_hostnames)
        .with_copyover_file(args.copyover_file())
        .with_exec_args(args.exec_args());
    if let Some(pps) = args.pulses_per_second {
        config = config.with_pulses_per_second(pps);
    }
    if let Some(greeting) = help.lookup(GREETING_TOPIC) {
        config = config.with_greeting(greeting);
    }
    if let Some(motd) = help.lookup(MOTD_TOPIC) {
        config = config.with_motd(motd);
    }

    let mut engine = Engine::builder(config)
        .store(Arc::new(store))
        .help(Arc::new(help))
        .output_filter(ansi_color)
        .build()?;

    let listener = match (args.listener, &args.copyover) {
        (Some(fd), Some(transfer)) => {
            let listener = inherit_listener(fd)?;
            match engine.recover_copyover(transfer, inherit_tcp_descriptor).await {
                Ok(restored) => info!(restored, "Recovered from copyover"),
                Err(err) => warn!(%err, "Copyover recovery failed, starting empty"),
            }
            listener
        }
        _ => TcpListener::bind(args.bind).await?,
    };

    info!(address = %args.bind, data = %args.data_dir.display(), "Pulsemud starting");
    engine.run(listener).await?;
    info!(snapshot = %engine.snapshot(), "Pulsemud stopped");
    Ok(())
}
