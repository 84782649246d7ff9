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


use crate::error::{EngineError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Port the engine listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 1801;

/// Default capacity of the per-connection input and output buffers
pub const DEFAULT_BUFFER_SIZE: usize = 32768;

const DEFAULT_GREETING: &str = "\r\n\
    Welcome to PulseMUD.\r\n\
    \r\n";

const DEFAULT_MOTD: &str = "\r\n\
    Welcome back. Type 'commands' for a list of things you can do.\r\n";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address to bind the listener to
    pub bind_address: SocketAddr,

    /// Pulses per second; must divide 1000 evenly
    pub pulses_per_second: u32,

    /// Maximum number of connections on the active list
    pub max_connections: usize,

    /// Capacity of each connection's input buffer
    pub input_buffer_size: usize,

    /// Capacity of each connection's output buffer
    pub output_buffer_size: usize,

    /// How long a connection may sit in the login funnel before it is closed
    pub idle_timeout: Duration,

    /// Interval between automatic saves of a playing session
    ///
    /// A zero interval disables autosave.
    pub autosave_interval: Duration,

    /// Offer MCCP to every new connection
    pub offer_compression: bool,

    /// Also offer the legacy MCCP v1 option
    pub legacy_compression: bool,

    /// Resolve peer hostnames on a blocking task
    ///
    /// When disabled the numeric address is used and input is serviced
    /// from the first pulse.
    pub resolve_hostnames: bool,

    /// Where connection state is written before a copyover
    pub copyover_file: PathBuf,

    /// Binary to exec on copyover; `None` uses the running executable
    pub executable: Option<PathBuf>,

    /// Arguments passed to the replacement binary ahead of the copyover flags
    pub exec_args: Vec<String>,

    /// Banner sent to new connections before the name prompt
    pub greeting: String,

    /// Message of the day shown when entering the world
    pub motd: String,

    /// Prompt shown to playing connections
    pub prompt: String,

    /// Argon2 memory cost in KiB for new password hashes
    pub hash_memory_kib: u32,

    /// Argon2 passes for new password hashes
    pub hash_iterations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            pulses_per_second: 5,
            max_connections: 1000,
            input_buffer_size: DEFAULT_BUFFER_SIZE,
            output_buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout: Duration::from_secs(300), // 5 minutes
            autosave_interval: Duration::from_secs(120),
            offer_compression: true,
            legacy_compression: false,
            resolve_hostnames: true,
            copyover_file: PathBuf::from("copyover.dat"),
            executable: None,
            exec_args: Vec::new(),
            greeting: DEFAULT_GREETING.to_string(),
            motd: DEFAULT_MOTD.to_string(),
            prompt: "\r\n> ".to_string(),
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the pulse rate
    pub fn with_pulses_per_second(mut self, pps: u32) -> Self {
        self.pulses_per_second = pps;
        self
    }

    /// Set the maximum number of connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set both buffer capacities
    pub fn with_buffer_sizes(mut self, input: usize, output: usize) -> Self {
        self.input_buffer_size = input;
        self.output_buffer_size = output;
        self
    }

    /// Set the login idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the autosave interval
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    /// Enable or disable the compression offer
    pub fn with_compression(mut self, offer: bool, legacy: bool) -> Self {
        self.offer_compression = offer;
        self.legacy_compression = legacy;
        self
    }

    /// Enable or disable reverse hostname lookups
    pub fn with_hostname_lookup(mut self, enabled: bool) -> Self {
        self.resolve_hostnames = enabled;
        self
    }

    /// Set the copyover transfer file location
    pub fn with_copyover_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.copyover_file = path.into();
        self
    }

    /// Set the binary exec'd on copyover
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Set the arguments the replacement binary is started with
    pub fn with_exec_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exec_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the greeting banner
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Set the message of the day
    pub fn with_motd(mut self, motd: impl Into<String>) -> Self {
        self.motd = motd.into();
        self
    }

    /// Set the prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the cost of new password hashes
    ///
    /// Hashing happens inside a pulse; lower costs keep logins from
    /// stalling other connections.
    pub fn with_hash_cost(mut self, memory_kib: u32, iterations: u32) -> Self {
        self.hash_memory_kib = memory_kib;
        self.hash_iterations = iterations;
        self
    }

    /// Length of one pulse
    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.pulses_per_second.max(1)))
    }

    /// Number of whole pulses covering `duration`, never less than one
    pub fn pulses_for(&self, duration: Duration) -> u32 {
        let pulse = self.pulse_duration().as_millis().max(1);
        let pulses = duration.as_millis().div_ceil(pulse);
        u32::try_from(pulses).unwrap_or(u32::MAX).max(1)
    }

    /// Pulses a connection may idle in the login funnel
    pub fn idle_pulses(&self) -> u32 {
        self.pulses_for(self.idle_timeout)
    }

    /// Pulses between autosaves, `None` when disabled
    pub fn autosave_pulses(&self) -> Option<u32> {
        if self.autosave_interval.is_zero() {
            None
        } else {
            Some(self.pulses_for(self.autosave_interval))
        }
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.pulses_per_second == 0 || 1000 % self.pulses_per_second != 0 {
            return Err(EngineError::Config(format!(
                "pulses_per_second must divide 1000, got {}",
                self.pulses_per_second
            )));
        }

        if self.max_connections == 0 {
            return Err(EngineError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        // the overflow marker has to fit with room to spare
        if self.input_buffer_size < 64 || self.output_buffer_size < 64 {
            return Err(EngineError::Config(
                "buffer sizes must be at least 64 bytes".to_string(),
            ));
        }

        if self.idle_timeout.is_zero() {
            return Err(EngineError::Config(
                "idle_timeout must be greater than 0".to_string(),
            ));
        }

        if self.hash_memory_kib < 8 || self.hash_iterations == 0 {
            return Err(EngineError::Config(
                "hash cost needs at least 8 KiB and one iteration".to_string(),
            ));
        }

        if self.legacy_compression && !self.offer_compression {
            return Err(EngineError::Config(
                "legacy_compression requires offer_compression".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.bind_address.port(), DEFAULT_PORT);
        assert_eq!(config.pulses_per_second, 5);
        assert_eq!(config.input_buffer_size, 32768);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert!(config.offer_compression);
        assert!(!config.legacy_compression);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::default()
            .with_pulses_per_second(8)
            .with_max_connections(16)
            .with_compression(true, true)
            .with_hostname_lookup(false)
            .with_prompt("> ");

        assert_eq!(config.pulses_per_second, 8);
        assert_eq!(config.max_connections, 16);
        assert!(config.legacy_compression);
        assert!(!config.resolve_hostnames);
        assert_eq!(config.prompt, "> ");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pulse_arithmetic() {
        let config = EngineConfig::default();
        assert_eq!(config.pulse_duration(), Duration::from_millis(200));
        assert_eq!(config.idle_pulses(), 1500);
        assert_eq!(config.autosave_pulses(), Some(600));
        assert_eq!(config.pulses_for(Duration::from_millis(1)), 1);
        assert_eq!(config.pulses_for(Duration::ZERO), 1);

        let config = config.with_autosave_interval(Duration::ZERO);
        assert_eq!(config.autosave_pulses(), None);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();

        // 3 does not divide 1000
        config.pulses_per_second = 3;
        assert!(config.validate().is_err());
        config.pulses_per_second = 4;
        assert!(config.validate().is_ok());

        config.max_connections = 0;
        assert!(config.validate().is_err());
        config.max_connections = 10;

        config.output_buffer_size = 8;
        assert!(config.validate().is_err());
        config.output_buffer_size = 1024;

        config.offer_compression = false;
        config.legacy_compression = true;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
        config.legacy_compression = false;

        config = config.with_hash_cost(64, 0);
        assert!(config.validate().is_err());
        config = config.with_hash_cost(64, 1);
        assert!(config.validate().is_ok());
    }
}
