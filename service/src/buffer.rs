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


//! Buffers used by connections and command output.
//!
//! [`FixedBuffer`] backs the per-connection input and output queues. Its
//! capacity is set once and never grows, so a misbehaving peer cannot make
//! the engine allocate without bound. [`TextBuffer`] is the growable
//! counterpart used when composing long replies.

use std::fmt;

/// A byte buffer with a capacity fixed at construction
pub struct FixedBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl FixedBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space at the tail
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// The filled portion
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Append `bytes` if they fit entirely; otherwise leave the buffer untouched
    pub fn try_extend(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }

    /// Append a single byte if there is room
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[self.len] = byte;
        self.len += 1;
        true
    }

    /// Drop `count` bytes from the front and shift the rest down
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.len);
        self.data.copy_within(count..self.len, 0);
        self.len -= count;
    }

    /// Shorten the filled portion to `len` bytes
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Forget the contents; the allocation is kept
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl fmt::Debug for FixedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedBuffer")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Growable text buffer
///
/// Capacity doubles whenever an append would not fit, and clearing keeps the
/// allocation so a buffer can be reused across pulses.
#[derive(Debug, Default, Clone)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
        }
    }

    /// Append `text`, growing by doubling when needed
    pub fn push_str(&mut self, text: &str) {
        let needed = self.text.len() + text.len();
        if needed > self.text.capacity() {
            let mut target = self.text.capacity().max(64);
            while target < needed {
                target *= 2;
            }
            self.text.reserve_exact(target - self.text.len());
        }
        self.text.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.text.capacity()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Write for TextBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

impl fmt::Display for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
