// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::exchange::ExchangeKey;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// The kinds of timers the engine runs. Every timer is an entry in the
/// endpoint's single monotonic queue.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum TimerKind {
    /// Retransmit the in-flight confirmable message of an exchange.
    Retransmit(ExchangeKey),

    /// The overall deadline of a request elapsed.
    RequestDeadline(ExchangeKey),

    /// No fresh notification arrived in time; re-register the observation.
    Reregister(ExchangeKey),

    /// Partial block-wise reassembly state reached its lifetime.
    BlockwiseExpiry(ExchangeKey),

    /// Periodic mark-and-sweep over the exchange store.
    Sweep,
}

#[derive(Debug)]
struct TimerEntry {
    at: Instant,
    seq: u64,
    kind: TimerKind,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Monotonic timer priority queue, owned by the endpoint and drained from
/// its event loop.
///
/// Cancellation is lazy: an entry whose exchange no longer wants it is
/// simply ignored by the handler when it fires, so nothing ever needs to
/// be removed from the middle of the heap.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> TimerQueue {
        TimerQueue {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Schedules `kind` to fire at `at`.
    pub fn schedule(&mut self, at: Instant, kind: TimerKind) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(TimerEntry { at, seq, kind }));
    }

    /// Returns the deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(e)| e.at)
    }

    /// Pops the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerKind> {
        match self.heap.peek() {
            Some(Reverse(e)) if e.at <= now => (),
            _ => return None,
        }
        self.heap.pop().map(|Reverse(e)| e.kind)
    }

    /// Number of pending entries, counting lazily-cancelled ones.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();

        queue.schedule(now + Duration::from_secs(10), TimerKind::Sweep);
        queue.schedule(now + Duration::from_secs(2), TimerKind::Sweep);
        queue.schedule(now + Duration::from_secs(5), TimerKind::Sweep);

        assert_eq!(Some(now + Duration::from_secs(2)), queue.next_deadline());

        assert_eq!(None, queue.pop_due(now));
        assert_eq!(3, queue.len());

        assert_eq!(
            Some(TimerKind::Sweep),
            queue.pop_due(now + Duration::from_secs(3))
        );
        assert_eq!(Some(now + Duration::from_secs(5)), queue.next_deadline());
    }

    #[test]
    fn equal_deadlines_fire_in_schedule_order() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();
        let key_a = ("127.0.0.1:1111".parse().unwrap(), Default::default());

        queue.schedule(now, TimerKind::Retransmit(key_a));
        queue.schedule(now, TimerKind::Sweep);

        assert_eq!(Some(TimerKind::Retransmit(key_a)), queue.pop_due(now));
        assert_eq!(Some(TimerKind::Sweep), queue.pop_due(now));
        assert_eq!(None, queue.pop_due(now));
    }
}
