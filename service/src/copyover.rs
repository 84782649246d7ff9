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


//! Hot reboot by replacing the process image.
//!
//! Before the exec every playing connection is saved and written to a
//! transfer file as one `descriptor name state hostname` line, terminated by
//! `EOF`. Those descriptors have close-on-exec cleared so they survive into
//! the new image, which reads the file back and reattaches each player
//! without a login.

use crate::engine::{CloseReason, Engine};
use crate::error::{EngineError, Result};
use crate::session::Session;
use crate::transport::Transport;
use crate::types::{ConnectionId, ConnectionState};
use metrics::counter;
use std::io;
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Last line of a transfer file
pub const TRANSFER_TERMINATOR: &str = "EOF";

// how long a carried client may take to accept its last output
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One connection carried across a copyover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub descriptor: RawFd,
    pub name: String,
    pub state: ConnectionState,
    pub hostname: String,
}

impl TransferRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.descriptor, self.name, self.state, self.hostname
        )
    }

    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.splitn(4, ' ');
        let invalid = || EngineError::TransferRecord(line.to_string());
        let descriptor = fields
            .next()
            .and_then(|field| field.parse::<RawFd>().ok())
            .filter(|fd| *fd >= 0)
            .ok_or_else(invalid)?;
        let name = fields
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(invalid)?;
        let state = fields
            .next()
            .and_then(|field| field.parse::<ConnectionState>().ok())
            .ok_or_else(invalid)?;
        let hostname = fields.next().unwrap_or_default();
        Ok(Self {
            descriptor,
            name: name.to_string(),
            state,
            hostname: hostname.to_string(),
        })
    }
}

/// Render records as transfer file contents
pub fn encode_transfer(records: &[TransferRecord]) -> String {
    let mut text = String::new();
    for record in records {
        text.push_str(&record.to_line());
        text.push('\n');
    }
    text.push_str(TRANSFER_TERMINATOR);
    text.push('\n');
    text
}

/// Parse transfer file contents up to the terminator
///
/// Malformed lines are logged and skipped.
pub fn decode_transfer(text: &str) -> Vec<TransferRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line == TRANSFER_TERMINATOR {
            break;
        }
        if line.is_empty() {
            continue;
        }
        match TransferRecord::parse(line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(%err, "Skipping transfer record"),
        }
    }
    records
}

/// Read a transfer file, deleting it before anything else is done
pub async fn read_transfer_file(path: &Path) -> Result<Vec<TransferRecord>> {
    let text = tokio::fs::read_to_string(path).await?;
    tokio::fs::remove_file(path).await?;
    Ok(decode_transfer(&text))
}

/// Set or clear `FD_CLOEXEC` on `fd`
pub fn set_close_on_exec(fd: RawFd, enabled: bool) -> io::Result<()> {
    // SAFETY: F_GETFD only reads descriptor flags and fails with EBADF on a bad fd
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if enabled {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    // SAFETY: as above, F_SETFD only changes descriptor flags
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Adopt a client socket inherited from the previous process image
///
/// Must be called from within a tokio runtime.
pub fn inherit_tcp_descriptor(fd: RawFd) -> io::Result<Box<dyn Transport>> {
    if fd < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "negative descriptor",
        ));
    }
    // SAFETY: the descriptor was recorded by the previous image and nothing
    // else in this process owns it
    let stream = unsafe { std::net::TcpStream::from_raw_fd(fd) };
    stream.set_nonblocking(true)?;
    set_close_on_exec(fd, true)?;
    Ok(Box::new(tokio::net::TcpStream::from_std(stream)?))
}

/// Adopt the listening socket inherited from the previous process image
pub fn inherit_listener(fd: RawFd) -> io::Result<tokio::net::TcpListener> {
    if fd < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "negative descriptor",
        ));
    }
    // SAFETY: as for client sockets
    let listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
    listener.set_nonblocking(true)?;
    set_close_on_exec(fd, true)?;
    tokio::net::TcpListener::from_std(listener)
}

impl Engine {
    /// Save everyone and write the transfer file
    ///
    /// Connections that cannot be carried over, anything not playing or
    /// without an OS descriptor, are told to come back later and closed.
    /// Nothing is touched if the transfer file cannot be created.
    pub async fn prepare_copyover(&mut self, requested_by: ConnectionId) -> Result<Vec<TransferRecord>> {
        let path = self.config.copyover_file.clone();
        let mut file = match tokio::fs::File::create(&path).await {
            Ok(file) => file,
            Err(err) => {
                error!(path = %path.display(), %err, "Cannot create transfer file");
                self.send(requested_by, "Copyover file not writeable, aborted.\r\n");
                return Err(err.into());
            }
        };

        let mut records = Vec::new();
        for index in 0..self.pool.active_len() {
            let conn = &self.pool.active()[index];
            if conn.is_closed() {
                continue;
            }
            let playing = conn.state() == ConnectionState::Playing;
            let descriptor = conn.descriptor();
            let player = conn
                .session()
                .filter(|_| playing)
                .map(Session::to_record);

            if let Some(player) = &player
                && let Err(err) = self.store.save(player).await
            {
                error!(player = %player.name, %err, "Failed to save before copyover");
            }

            let conn = &mut self.pool.active_mut()[index];
            match (player, descriptor) {
                (Some(player), Some(descriptor)) => {
                    if let Err(err) = conn.compress_end(false) {
                        debug!(conn = %conn.id(), %err, "Failed to end compression before copyover");
                    }
                    conn.queue_output("\r\nThe world starts spinning.\r\n");
                    match conn.drain(DRAIN_TIMEOUT).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(conn = %conn.id(), backlog = conn.wire_backlog(), "Output left behind at copyover");
                        }
                        Err(err) => {
                            debug!(conn = %conn.id(), %err, "Flush before copyover failed");
                        }
                    }
                    records.push(TransferRecord {
                        descriptor,
                        name: player.name,
                        state: ConnectionState::Playing,
                        hostname: conn.host(),
                    });
                }
                _ => {
                    conn.queue_output("\r\nSorry, we are rebooting. Come back in a few minutes.\r\n");
                    self.close_connection(index, CloseReason::Reboot);
                }
            }
        }

        for session in &self.linkdead {
            if let Err(err) = self.store.save(&session.to_record()).await {
                error!(player = %session.name(), %err, "Failed to save linkdead player before copyover");
            }
        }

        file.write_all(encode_transfer(&records).as_bytes()).await?;
        file.flush().await?;
        self.pool.recycle();
        info!(carried = records.len(), path = %path.display(), "Transfer file written");
        Ok(records)
    }

    /// Replace the running process, carrying playing connections across
    ///
    /// Only returns if the exec failed, after restoring close-on-exec,
    /// removing the transfer file and telling the requester.
    pub async fn copyover(&mut self, requested_by: ConnectionId, listener: Option<RawFd>) -> Result<()> {
        let executable = match &self.config.executable {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        info!(conn = %requested_by, executable = %executable.display(), "Copyover");
        let records = self.prepare_copyover(requested_by).await?;

        let inherited: Vec<RawFd> = records
            .iter()
            .map(|record| record.descriptor)
            .chain(listener)
            .collect();
        for fd in &inherited {
            if let Err(err) = set_close_on_exec(*fd, false) {
                warn!(fd, %err, "Failed to clear close-on-exec");
            }
        }
        counter!("pulsemud.copyovers").increment(1);

        let mut command = Command::new(&executable);
        command
            .args(&self.config.exec_args)
            .arg("--copyover")
            .arg(&self.config.copyover_file);
        if let Some(fd) = listener {
            command.arg("--listener").arg(fd.to_string());
        }
        let err = command.exec();

        error!(%err, "Copyover exec failed");
        for fd in inherited {
            let _ = set_close_on_exec(fd, true);
        }
        if let Err(err) = tokio::fs::remove_file(&self.config.copyover_file).await {
            debug!(%err, "Failed to remove transfer file");
        }
        self.send(requested_by, "Copyover FAILED!\r\n");
        Err(EngineError::Copyover(err.to_string()))
    }

    /// Reattach the connections listed in a transfer file
    ///
    /// The file is removed first. `opener` turns each recorded descriptor
    /// into a transport; a record whose descriptor or player cannot be
    /// restored is dropped. Returns how many connections were restored.
    pub async fn recover_copyover<F>(&mut self, path: &Path, mut opener: F) -> Result<usize>
    where
        F: FnMut(RawFd) -> io::Result<Box<dyn Transport>>,
    {
        let records = read_transfer_file(path).await?;
        let autosave = self.config.autosave_pulses();
        let mut restored = 0;

        for record in records {
            let transport = match opener(record.descriptor) {
                Ok(transport) => transport,
                Err(err) => {
                    warn!(fd = record.descriptor, player = %record.name, %err, "Dropping unrecoverable descriptor");
                    continue;
                }
            };
            let player = match self.store.load(&record.name).await {
                Ok(Some(player)) => player,
                Ok(None) => {
                    warn!(player = %record.name, "Dropping copyover record without a player file");
                    continue;
                }
                Err(err) => {
                    warn!(player = %record.name, %err, "Dropping copyover record");
                    continue;
                }
            };

            let id = self.next_connection_id();
            let conn = self.pool.acquire(id, transport, None);
            conn.complete_lookup(record.hostname);
            conn.attach_session(Session::from_record(player));
            if let Some(session) = conn.session_mut() {
                session.arm_events(autosave);
            }
            conn.set_state(ConnectionState::Playing);
            conn.queue_output("\r\nAnd before you know it, everything has changed.\r\n");
            conn.set_prompt_pending();
            if self.config.offer_compression {
                conn.offer_compression(self.config.legacy_compression);
            }
            restored += 1;
        }

        info!(restored, "Copyover recovery complete");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    fn record(fd: RawFd, name: &str, host: &str) -> TransferRecord {
        TransferRecord {
            descriptor: fd,
            name: name.to_string(),
            state: ConnectionState::Playing,
            hostname: host.to_string(),
        }
    }

    #[test]
    fn test_record_line_format() {
        assert_eq!(record(7, "Bob", "example.org").to_line(), "7 Bob playing example.org");
    }

    #[test]
    fn test_parse_keeps_hostname_remainder() {
        let parsed = TransferRecord::parse("12 Alice playing host with spaces").unwrap();
        assert_eq!(parsed, record(12, "Alice", "host with spaces"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TransferRecord::parse("").is_err());
        assert!(TransferRecord::parse("x Alice playing host").is_err());
        assert!(TransferRecord::parse("-1 Alice playing host").is_err());
        assert!(TransferRecord::parse("3 Alice dancing host").is_err());
        assert!(TransferRecord::parse("3").is_err());
    }

    #[test]
    fn test_decode_stops_at_terminator_and_skips_bad_lines() {
        let text = "4 Alice playing a.example\nnonsense\n\n5 Bob playing 10.0.0.2\nEOF\n6 Carol playing late\n";
        let records = decode_transfer(text);
        assert_eq!(
            records,
            vec![record(4, "Alice", "a.example"), record(5, "Bob", "10.0.0.2")]
        );
    }

    #[test]
    fn test_encode_ends_with_terminator() {
        let text = encode_transfer(&[record(9, "Dora", "d.example")]);
        assert_eq!(text, "9 Dora playing d.example\nEOF\n");
        assert_eq!(encode_transfer(&[]), "EOF\n");
        assert_eq!(decode_transfer(&text), vec![record(9, "Dora", "d.example")]);
    }

    #[tokio::test]
    async fn test_read_transfer_file_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copyover.dat");
        tokio::fs::write(&path, encode_transfer(&[record(3, "Eve", "e.example")]))
            .await
            .unwrap();

        let records = read_transfer_file(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!path.exists());
        assert!(read_transfer_file(&path).await.is_err());
    }

    #[test]
    fn test_close_on_exec_toggle() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();
        let cloexec = |fd| unsafe { libc::fcntl(fd, libc::F_GETFD) } & libc::FD_CLOEXEC != 0;

        set_close_on_exec(fd, false).unwrap();
        assert!(!cloexec(fd));
        set_close_on_exec(fd, true).unwrap();
        assert!(cloexec(fd));
    }

    #[test]
    fn test_close_on_exec_bad_descriptor() {
        assert!(set_close_on_exec(-1, true).is_err());
        assert!(inherit_listener(-1).is_err());
    }
}
