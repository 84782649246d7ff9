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


//! Reverse hostname lookups off the pulse loop.
//!
//! A lookup runs on the blocking pool and never touches the connection. Its
//! result comes back over a channel and is applied at the start of a pulse,
//! so a connection closed mid-lookup simply waits in
//! [`LookupStatus::WaitClose`](crate::LookupStatus::WaitClose) for the reply
//! before it is recycled.

use crate::types::ConnectionId;
use std::ffi::CStr;
use std::net::IpAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Blocking reverse DNS
pub trait HostResolver: Send + Sync + 'static {
    /// Name for `addr`, or `None` if it has none
    fn reverse_lookup(&self, addr: IpAddr) -> Option<String>;
}

/// Resolves through the system's `getnameinfo`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

const NI_MAXHOST: usize = 1025;

impl HostResolver for SystemResolver {
    fn reverse_lookup(&self, addr: IpAddr) -> Option<String> {
        let mut host = [0 as libc::c_char; NI_MAXHOST];
        let rc = match addr {
            IpAddr::V4(v4) => {
                // SAFETY: sockaddr_in is plain data and all-zero is a valid value
                let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_addr = libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.octets()),
                };
                // SAFETY: the address and host buffer outlive the call and their
                // lengths are passed alongside
                unsafe {
                    libc::getnameinfo(
                        (&sin as *const libc::sockaddr_in).cast::<libc::sockaddr>(),
                        size_of::<libc::sockaddr_in>() as libc::socklen_t,
                        host.as_mut_ptr(),
                        host.len() as libc::socklen_t,
                        std::ptr::null_mut(),
                        0,
                        libc::NI_NAMEREQD,
                    )
                }
            }
            IpAddr::V6(v6) => {
                // SAFETY: sockaddr_in6 is plain data and all-zero is a valid value
                let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_addr = libc::in6_addr {
                    s6_addr: v6.octets(),
                };
                // SAFETY: as above
                unsafe {
                    libc::getnameinfo(
                        (&sin6 as *const libc::sockaddr_in6).cast::<libc::sockaddr>(),
                        size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                        host.as_mut_ptr(),
                        host.len() as libc::socklen_t,
                        std::ptr::null_mut(),
                        0,
                        libc::NI_NAMEREQD,
                    )
                }
            }
        };
        if rc != 0 {
            debug!(%addr, rc, "Reverse lookup failed");
            return None;
        }
        // SAFETY: getnameinfo NUL-terminates the host buffer on success
        let name = unsafe { CStr::from_ptr(host.as_ptr()) };
        let name = name.to_string_lossy().into_owned();
        (!name.is_empty()).then_some(name)
    }
}

/// Never resolves; connections keep their numeric address
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericResolver;

impl HostResolver for NumericResolver {
    fn reverse_lookup(&self, _addr: IpAddr) -> Option<String> {
        None
    }
}

/// Outcome of one lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupReply {
    pub id: ConnectionId,
    pub hostname: String,
}

/// Dispatches lookups and collects their replies
pub struct Resolver {
    resolver: Arc<dyn HostResolver>,
    tx: mpsc::UnboundedSender<LookupReply>,
    rx: mpsc::UnboundedReceiver<LookupReply>,
    in_flight: usize,
}

impl Resolver {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            resolver,
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Look up `addr` on the blocking pool
    ///
    /// A failed or panicking lookup replies with the numeric address.
    /// Must be called from within a tokio runtime.
    pub fn spawn(&mut self, id: ConnectionId, addr: IpAddr) {
        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::task::spawn_blocking(move || {
            let hostname = match catch_unwind(AssertUnwindSafe(|| resolver.reverse_lookup(addr))) {
                Ok(Some(hostname)) => hostname,
                Ok(None) => addr.to_string(),
                Err(_) => {
                    warn!(conn = %id, %addr, "Resolver panicked");
                    addr.to_string()
                }
            };
            // the engine may already be gone
            let _ = tx.send(LookupReply { id, hostname });
        });
    }

    /// Replies that have arrived, without waiting
    pub fn try_collect(&mut self) -> Vec<LookupReply> {
        let mut replies = Vec::new();
        while let Ok(reply) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            replies.push(reply);
        }
        replies
    }

    /// Wait for every outstanding lookup to reply
    pub async fn settle(&mut self) -> Vec<LookupReply> {
        let mut replies = Vec::new();
        while self.in_flight > 0 {
            match self.rx.recv().await {
                Some(reply) => {
                    self.in_flight -= 1;
                    replies.push(reply);
                }
                None => break,
            }
        }
        replies
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
