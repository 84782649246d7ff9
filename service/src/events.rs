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


//! Pulse-counted events attached to connections and sessions.
//!
//! Every owner carries its own [`EventQueue`]. Once per pulse the engine
//! calls [`run_events`], which counts each event down and fires the ones
//! that reach zero in the order they were scheduled.

use std::fmt;

/// Callback run when an event expires
pub type EventAction<O> = Box<dyn FnMut(&mut O) + Send>;

/// A scheduled callback
pub struct Event<O> {
    label: &'static str,
    remaining: u32,
    interval: Option<u32>,
    action: EventAction<O>,
}

impl<O> Event<O> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Pulses left before the event fires
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_periodic(&self) -> bool {
        self.interval.is_some()
    }
}

impl<O> fmt::Debug for Event<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("label", &self.label)
            .field("remaining", &self.remaining)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Events pending on one owner, kept in scheduling order
pub struct EventQueue<O> {
    events: Vec<Event<O>>,
}

impl<O> Default for EventQueue<O> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<O> fmt::Debug for EventQueue<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.events.iter()).finish()
    }
}

impl<O> EventQueue<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether an event with `label` is queued
    pub fn contains(&self, label: &str) -> bool {
        self.events.iter().any(|event| event.label == label)
    }

    /// Labels of queued events in scheduling order
    pub fn labels(&self) -> Vec<&'static str> {
        self.events.iter().map(|event| event.label).collect()
    }

    /// Fire `action` once after `delay` pulses
    ///
    /// A delay of zero fires on the next pulse.
    pub fn schedule<F>(&mut self, label: &'static str, delay: u32, action: F)
    where
        F: FnMut(&mut O) + Send + 'static,
    {
        self.events.push(Event {
            label,
            remaining: delay.max(1),
            interval: None,
            action: Box::new(action),
        });
    }

    /// Fire `action` after `delay` pulses and then every `interval` pulses
    pub fn schedule_periodic<F>(&mut self, label: &'static str, delay: u32, interval: u32, action: F)
    where
        F: FnMut(&mut O) + Send + 'static,
    {
        self.events.push(Event {
            label,
            remaining: delay.max(1),
            interval: Some(interval.max(1)),
            action: Box::new(action),
        });
    }

    /// Cancel every event with `label`, returning how many were removed
    pub fn strip(&mut self, label: &str) -> usize {
        let before = self.events.len();
        self.events.retain(|event| event.label != label);
        before - self.events.len()
    }

    /// Cancel everything
    pub fn cancel_all(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        count
    }

    /// Count every event down one pulse and remove the ones that are due
    fn expire(&mut self) -> Vec<Event<O>> {
        let mut due = Vec::new();
        let mut index = 0;
        while index < self.events.len() {
            let event = &mut self.events[index];
            event.remaining = event.remaining.saturating_sub(1);
            if event.remaining == 0 {
                due.push(self.events.remove(index));
            } else {
                index += 1;
            }
        }
        due
    }

    fn rearm(&mut self, mut event: Event<O>) {
        if let Some(interval) = event.interval {
            event.remaining = interval;
            self.events.push(event);
        }
    }
}

/// Something that owns an [`EventQueue`] of callbacks over itself
pub trait EventOwner: Sized {
    fn events(&self) -> &EventQueue<Self>;

    fn events_mut(&mut self) -> &mut EventQueue<Self>;

    /// Events stop firing once the owner is dead
    fn is_alive(&self) -> bool;
}

/// Advance `owner`'s events by one pulse, returning how many fired
pub fn run_events<O: EventOwner>(owner: &mut O) -> usize {
    if !owner.is_alive() {
        return 0;
    }
    let due = owner.events_mut().expire();
    let mut fired = 0;
    for mut event in due {
        if !owner.is_alive() {
            break;
        }
        (event.action)(owner);
        fired += 1;
        if owner.is_alive() {
            owner.events_mut().rearm(event);
        }
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        log: Vec<&'static str>,
        alive: bool,
        events: EventQueue<Counter>,
    }

    impl EventOwner for Counter {
        fn events(&self) -> &EventQueue<Self> {
            &self.events
        }

        fn events_mut(&mut self) -> &mut EventQueue<Self> {
            &mut self.events
        }

        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    fn counter() -> Counter {
        Counter {
            alive: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_one_shot_fires_after_delay() {
        let mut owner = counter();
        owner.events.schedule("a", 3, |c: &mut Counter| c.log.push("a"));
        assert_eq!(run_events(&mut owner), 0);
        assert_eq!(run_events(&mut owner), 0);
        assert_eq!(run_events(&mut owner), 1);
        assert_eq!(owner.log, vec!["a"]);
        assert!(owner.events.is_empty());
    }

    #[test]
    fn test_same_pulse_fires_in_schedule_order() {
        let mut owner = counter();
        owner.events.schedule("first", 2, |c: &mut Counter| c.log.push("first"));
        owner.events.schedule("early", 1, |c: &mut Counter| c.log.push("early"));
        owner.events.schedule("second", 2, |c: &mut Counter| c.log.push("second"));
        run_events(&mut owner);
        run_events(&mut owner);
        assert_eq!(owner.log, vec!["early", "first", "second"]);
    }

    #[test]
    fn test_zero_delay_fires_next_pulse() {
        let mut owner = counter();
        owner.events.schedule("now", 0, |c: &mut Counter| c.log.push("now"));
        assert_eq!(run_events(&mut owner), 1);
    }

    #[test]
    fn test_periodic_rearms() {
        let mut owner = counter();
        owner
            .events
            .schedule_periodic("tick", 1, 2, |c: &mut Counter| c.log.push("tick"));
        for _ in 0..5 {
            run_events(&mut owner);
        }
        assert_eq!(owner.log.len(), 3);
        assert!(owner.events.contains("tick"));
    }

    #[test]
    fn test_strip_and_cancel() {
        let mut owner = counter();
        owner.events.schedule("idle", 5, |_: &mut Counter| {});
        owner.events.schedule("idle", 6, |_: &mut Counter| {});
        owner.events.schedule("other", 6, |_: &mut Counter| {});
        assert_eq!(owner.events.strip("idle"), 2);
        assert_eq!(owner.events.labels(), vec!["other"]);
        assert_eq!(owner.events.cancel_all(), 1);
    }

    #[test]
    fn test_dead_owner_stops_firing() {
        let mut owner = counter();
        owner.events.schedule("kill", 1, |c: &mut Counter| c.alive = false);
        owner.events.schedule("after", 1, |c: &mut Counter| c.log.push("after"));
        owner
            .events
            .schedule_periodic("tick", 1, 1, |c: &mut Counter| c.log.push("tick"));
        assert_eq!(run_events(&mut owner), 1);
        assert!(owner.log.is_empty());
        assert_eq!(run_events(&mut owner), 0);
    }
}
