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


//! Free list and active list of connection objects.

use crate::connection::Connection;
use crate::error::{EngineError, Result};
use crate::transport::Transport;
use crate::types::{ConnectionId, LookupStatus};
use metrics::counter;
use std::net::SocketAddr;
use tracing::trace;

/// Recycles connection objects so their buffers are allocated once
///
/// A connection only returns to the free list once it is
/// [`LookupStatus::ClosedRecyclable`]; a lookup still in flight keeps it on
/// the active list.
#[derive(Debug)]
pub struct SocketPool {
    free: Vec<Connection>,
    active: Vec<Connection>,
    input_capacity: usize,
    output_capacity: usize,
    allocated: usize,
}

impl SocketPool {
    pub fn new(input_capacity: usize, output_capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            active: Vec::new(),
            input_capacity,
            output_capacity,
            allocated: 0,
        }
    }

    /// Take a connection from the free list, or allocate one, and activate it
    pub fn acquire(
        &mut self,
        id: ConnectionId,
        transport: Box<dyn Transport>,
        peer: Option<SocketAddr>,
    ) -> &mut Connection {
        let mut conn = match self.free.pop() {
            Some(conn) => conn,
            None => {
                self.allocated += 1;
                counter!("pulsemud.pool.allocated").increment(1);
                Connection::new(self.input_capacity, self.output_capacity)
            }
        };
        conn.reset(id, transport, peer);
        let index = self.active.len();
        self.active.push(conn);
        &mut self.active[index]
    }

    /// Return one connection to the free list
    ///
    /// # Errors
    /// [`EngineError::NotRecyclable`] unless the connection is closed with no
    /// lookup outstanding.
    pub fn release(&mut self, id: ConnectionId) -> Result<()> {
        let index = self
            .position(id)
            .ok_or(EngineError::ConnectionNotFound(id))?;
        if self.active[index].lookup_status() != LookupStatus::ClosedRecyclable {
            return Err(EngineError::NotRecyclable(id));
        }
        let mut conn = self.active.remove(index);
        conn.recycle();
        self.free.push(conn);
        Ok(())
    }

    /// Move every recyclable connection to the free list
    pub fn recycle(&mut self) -> usize {
        let mut released = 0;
        let mut index = 0;
        while index < self.active.len() {
            if self.active[index].lookup_status() == LookupStatus::ClosedRecyclable {
                let mut conn = self.active.remove(index);
                trace!(conn = %conn.id(), "Recycled");
                conn.recycle();
                self.free.push(conn);
                released += 1;
            } else {
                index += 1;
            }
        }
        released
    }

    pub fn active(&self) -> &[Connection] {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut [Connection] {
        &mut self.active
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Connection objects ever allocated
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn position(&self, id: ConnectionId) -> Option<usize> {
        self.active.iter().position(|conn| conn.id() == id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.active.iter().find(|conn| conn.id() == id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.active.iter_mut().find(|conn| conn.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn acquire(pool: &mut SocketPool, id: u64) -> ConnectionId {
        let (transport, _peer) = MemoryTransport::pair();
        pool.acquire(ConnectionId::new(id), Box::new(transport), None)
            .id()
    }

    #[test]
    fn test_acquire_allocates_then_reuses() {
        let mut pool = SocketPool::new(64, 64);
        let first = acquire(&mut pool, 1);
        assert_eq!(pool.allocated(), 1);

        let conn = pool.get_mut(first).unwrap();
        conn.complete_lookup("host".to_string());
        conn.shut();
        assert_eq!(pool.recycle(), 1);
        assert_eq!(pool.free_len(), 1);

        let second = acquire(&mut pool, 2);
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.free_len(), 0);
        assert_ne!(first, second);
        assert!(pool.get(first).is_none());
    }

    #[test]
    fn test_wait_close_is_not_recycled() {
        let mut pool = SocketPool::new(64, 64);
        let id = acquire(&mut pool, 1);

        let conn = pool.get_mut(id).unwrap();
        conn.shut();
        assert_eq!(conn.lookup_status(), LookupStatus::WaitClose);
        assert_eq!(pool.recycle(), 0);
        assert!(matches!(pool.release(id), Err(EngineError::NotRecyclable(_))));

        pool.get_mut(id)
            .unwrap()
            .complete_lookup("late.example".to_string());
        pool.release(id).unwrap();
        assert_eq!(pool.active_len(), 0);
    }

    #[test]
    fn test_release_unknown() {
        let mut pool = SocketPool::new(64, 64);
        assert!(matches!(
            pool.release(ConnectionId::new(9)),
            Err(EngineError::ConnectionNotFound(_))
        ));
    }

    #[test]
    fn test_recycle_keeps_order() {
        let mut pool = SocketPool::new(64, 64);
        for id in 1..=4 {
            acquire(&mut pool, id);
        }
        for id in [1, 3] {
            let conn = pool.get_mut(ConnectionId::new(id)).unwrap();
            conn.complete_lookup("h".to_string());
            conn.shut();
        }
        assert_eq!(pool.recycle(), 2);
        let ids: Vec<u64> = pool.active().iter().map(|c| c.id().as_u64()).collect();
        assert_eq!(ids, vec![2, 4]);
    }
}
