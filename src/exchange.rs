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

//! The exchange record and the store that indexes live exchanges by
//! message-id and token.

use super::*;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Identity of an exchange: the peer it talks to and the token that
/// correlates its messages.
pub(crate) type ExchangeKey = (SocketAddr, MsgToken);

/// Which side created the exchange.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ExchangeOrigin {
    /// We submitted the request.
    Local,

    /// The request arrived from the network.
    Remote,
}

/// Transmission state of an in-flight confirmable message.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ConState {
    /// Built but not yet on the wire.
    Fresh,

    /// On the wire, retransmit timer running.
    InTransit,

    /// The peer acknowledged it.
    Acknowledged,

    /// The peer reset it.
    Rejected,

    /// Retransmissions exhausted.
    TimedOut,

    /// Cancelled locally.
    Cancelled,
}

/// Reliability-layer slot: everything needed to retransmit the current
/// confirmable message of an exchange.
#[derive(Debug)]
pub(crate) struct TransmitState {
    pub state: ConState,
    pub msg_id: MsgId,
    pub bytes: Vec<u8>,
    pub retransmit_count: u32,
    pub current_timeout: Duration,
}

impl TransmitState {
    pub fn new(msg_id: MsgId, bytes: Vec<u8>, initial_timeout: Duration) -> TransmitState {
        TransmitState {
            state: ConState::Fresh,
            msg_id,
            bytes,
            retransmit_count: 0,
            current_timeout: initial_timeout,
        }
    }
}

/// The 24-bit observe counter space.
const OBSERVE_SEQ_MODULUS: u32 = 1 << 24;

/// Half the counter space; the rollover pivot of the freshness rule.
const OBSERVE_SEQ_PIVOT: u32 = 1 << 23;

/// Notifications older than this are accepted regardless of their
/// counter, per RFC 7641 §3.4.
const OBSERVE_FRESHNESS_WINDOW: Duration = Duration::from_secs(128);

/// Observe-layer slot: the state of one observation, on either side of it.
#[derive(Debug)]
pub(crate) struct ObserveRelation {
    /// The first notification carrying an Observe option arrived (client
    /// role), or the registration was accepted (server role).
    pub established: bool,

    /// The relation is torn down; no further notifications flow.
    pub cancelled: bool,

    /// Highest accepted notification counter (client role).
    pub last_counter: Option<u32>,

    /// Arrival time of the last accepted notification.
    pub last_arrival: Option<Instant>,

    /// Outgoing notification counter (server role).
    pub next_seq: u32,

    /// Message-id of the confirmable notification currently in transit
    /// (server role). At most one per relation.
    pub current_control: Option<MsgId>,

    /// Freshest notification generated while another was in transit;
    /// replaces any earlier stash (server role).
    pub next_control: Option<Message>,

    /// Notifications sent since the last confirmable check (server role).
    pub check_count: u32,

    /// Time of the last confirmable check (server role).
    pub last_check: Option<Instant>,
}

impl ObserveRelation {
    pub fn client() -> ObserveRelation {
        ObserveRelation {
            established: false,
            cancelled: false,
            last_counter: None,
            last_arrival: None,
            next_seq: 1,
            current_control: None,
            next_control: None,
            check_count: 0,
            last_check: None,
        }
    }

    pub fn server(now: Instant) -> ObserveRelation {
        ObserveRelation {
            established: true,
            cancelled: false,
            last_counter: None,
            last_arrival: None,
            next_seq: 1,
            current_control: None,
            next_control: None,
            check_count: 0,
            last_check: Some(now),
        }
    }

    /// True while notifications should still flow on this relation.
    pub fn is_active(&self) -> bool {
        !self.cancelled
    }

    /// Applies the RFC 7641 §3.4 freshness rule to an incoming
    /// notification counter. Returns true (and advances the relation's
    /// bookkeeping) if the notification is fresher than the last accepted
    /// one.
    pub fn accept_notification(&mut self, counter: u32, now: Instant) -> bool {
        let fresh = match (self.last_counter, self.last_arrival) {
            (Some(v_last), Some(t_last)) => {
                let v_new = counter % OBSERVE_SEQ_MODULUS;
                (v_new > v_last && v_new - v_last < OBSERVE_SEQ_PIVOT)
                    || (v_last > v_new && v_last - v_new > OBSERVE_SEQ_PIVOT)
                    || now > t_last + OBSERVE_FRESHNESS_WINDOW
            }
            _ => true,
        };

        if fresh {
            self.last_counter = Some(counter % OBSERVE_SEQ_MODULUS);
            self.last_arrival = Some(now);
        }

        fresh
    }

    /// Draws the next outgoing notification counter (server role).
    pub fn next_observe_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = (self.next_seq + 1) % OBSERVE_SEQ_MODULUS;
        seq
    }

    /// Decides whether this notification should go out confirmable to
    /// verify the client still listens, per the relation check policy.
    pub fn take_confirmable_check(
        &mut self,
        now: Instant,
        interval_count: u32,
        interval_time: Duration,
    ) -> bool {
        self.check_count += 1;

        let count_due = self.check_count >= interval_count;
        let time_due = match self.last_check {
            Some(t) => now >= t + interval_time,
            None => true,
        };

        if count_due || time_due {
            self.check_count = 0;
            self.last_check = Some(now);
            true
        } else {
            false
        }
    }
}

/// Re-registration slot: armed after each accepted notification; if no
/// fresher one lands before the timer fires, the registration is
/// refreshed.
#[derive(Debug, Copy, Clone)]
pub(crate) struct ReregistrationContext {
    /// `last_arrival` of the relation at the moment the timer was armed.
    /// The timer is stale if a fresher notification has arrived since.
    pub armed_for: Option<Instant>,
}

/// Block-wise slot: one direction of one block-wise transfer.
#[derive(Debug)]
pub(crate) struct BlockwiseStatus {
    /// Reassembled-so-far (inbound) or complete (outbound) body.
    pub buffer: Vec<u8>,

    /// Next block number expected (inbound) or to send (outbound).
    pub next_num: u32,

    /// Size exponent of this transfer. All blocks must agree.
    pub szx: u8,

    /// Response template for a server-side Block2 transfer: the code and
    /// options of the full response, whose payload is sliced per request.
    pub template: Option<Message>,

    pub created: Instant,
}

impl BlockwiseStatus {
    pub fn new(szx: u8, now: Instant) -> BlockwiseStatus {
        BlockwiseStatus {
            buffer: Vec::new(),
            next_num: 0,
            szx,
            template: None,
            created: now,
        }
    }

    /// Slice of the buffer covered by block `num`, if any.
    pub fn slice(&self, num: u32) -> Option<&[u8]> {
        let size = 1usize << (self.szx as usize + 4);
        let start = num as usize * size;
        if start >= self.buffer.len() {
            return None;
        }
        Some(&self.buffer[start..self.buffer.len().min(start + size)])
    }

    /// True if block `num` is the last one of the buffer.
    pub fn is_last(&self, num: u32) -> bool {
        let size = 1usize << (self.szx as usize + 4);
        (num as usize + 1) * size >= self.buffer.len()
    }
}

/// The stateful junction between a request and its response(s).
pub(crate) struct Exchange {
    pub origin: ExchangeOrigin,
    pub peer: SocketAddr,
    pub token: MsgToken,
    pub request: Message,
    pub response: Option<Message>,

    // Typed per-layer slots.
    pub transmit: Option<TransmitState>,
    pub relation: Option<ObserveRelation>,
    pub reregistration: Option<ReregistrationContext>,
    pub block1: Option<BlockwiseStatus>,
    pub block2: Option<BlockwiseStatus>,

    pub observers: Vec<Box<dyn ExchangeObserver>>,

    /// Message-id of a confirmable remote request we have not acknowledged
    /// yet; consumed when the response piggybacks on the ACK.
    pub pending_ack_id: Option<MsgId>,

    pub created: Instant,
    pub completed_at: Option<Instant>,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("origin", &self.origin)
            .field("peer", &self.peer)
            .field("token", &self.token)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Exchange {
    pub fn new_local(
        peer: SocketAddr,
        token: MsgToken,
        request: Message,
        now: Instant,
    ) -> Exchange {
        Exchange {
            origin: ExchangeOrigin::Local,
            peer,
            token,
            request,
            response: None,
            transmit: None,
            relation: None,
            reregistration: None,
            block1: None,
            block2: None,
            observers: Vec::new(),
            pending_ack_id: None,
            created: now,
            completed_at: None,
        }
    }

    pub fn new_remote(
        peer: SocketAddr,
        token: MsgToken,
        request: Message,
        now: Instant,
    ) -> Exchange {
        Exchange {
            origin: ExchangeOrigin::Remote,
            peer,
            token,
            request,
            response: None,
            transmit: None,
            relation: None,
            reregistration: None,
            block1: None,
            block2: None,
            observers: Vec::new(),
            pending_ack_id: None,
            created: now,
            completed_at: None,
        }
    }

    pub fn key(&self) -> ExchangeKey {
        (self.peer, self.token)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Marks the exchange complete. Message-layer state stays in the
    /// store for deduplication until the sweep retires it.
    pub fn complete(&mut self, now: Instant) {
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    // Observer fan-out.

    pub fn notify_acknowledged(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.acknowledged();
        }
    }

    pub fn notify_retransmitting(&mut self, attempt: u32) {
        for observer in self.observers.iter_mut() {
            observer.retransmitting(attempt);
        }
    }

    pub fn notify_responded(&mut self, response: &Message) {
        for observer in self.observers.iter_mut() {
            observer.responded(response);
        }
    }

    pub fn notify_rejected(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.rejected();
        }
    }

    pub fn notify_timed_out(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.timed_out();
        }
    }

    pub fn notify_cancelled(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.cancelled();
        }
    }

    pub fn notify_reregistering(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.reregistering();
        }
    }

    pub fn notify_failed(&mut self, error: Error) {
        for observer in self.observers.iter_mut() {
            observer.failed(error);
        }
    }
}

/// Deduplication record for a message received from a peer.
#[derive(Debug)]
pub(crate) struct IncomingRecord {
    pub received: Instant,
    pub cached_ack: Option<Vec<u8>>,
}

/// The store of live exchanges, with the two indices the matcher needs:
/// `(peer, message-id)` for ACK/RST matching and deduplication, and
/// `(peer, token)` for response and notification correlation.
pub(crate) struct ExchangeStore {
    exchanges: HashMap<ExchangeKey, Exchange>,
    by_id: HashMap<(SocketAddr, MsgId), MsgToken>,
    incoming: HashMap<(SocketAddr, MsgId), IncomingRecord>,
    next_msg_id: MsgId,
    next_token_seed: u64,
    random_tokens: bool,
}

impl std::fmt::Debug for ExchangeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeStore")
            .field("exchanges", &self.exchanges.keys())
            .field("by_id", &self.by_id.keys())
            .field("incoming", &self.incoming.keys())
            .finish()
    }
}

impl ExchangeStore {
    pub fn new(config: &Config) -> ExchangeStore {
        ExchangeStore {
            exchanges: HashMap::new(),
            by_id: HashMap::new(),
            incoming: HashMap::new(),
            next_msg_id: if config.use_random_id_start {
                rand::random()
            } else {
                0
            },
            next_token_seed: if config.use_random_token_start {
                rand::random()
            } else {
                0
            },
            random_tokens: config.use_random_token_start,
        }
    }

    pub fn insert(&mut self, exchange: Exchange) {
        self.exchanges.insert(exchange.key(), exchange);
    }

    pub fn contains(&self, key: &ExchangeKey) -> bool {
        self.exchanges.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &ExchangeKey) -> Option<&mut Exchange> {
        self.exchanges.get_mut(key)
    }

    pub fn remove(&mut self, key: &ExchangeKey) -> Option<Exchange> {
        let exchange = self.exchanges.remove(key)?;
        self.by_id
            .retain(|(peer, _), token| !(*peer == key.0 && *token == key.1));
        Some(exchange)
    }

    /// Registers an outgoing message-id so later ACK/RST datagrams select
    /// the exchange.
    pub fn register_outgoing_id(&mut self, peer: SocketAddr, msg_id: MsgId, token: MsgToken) {
        self.by_id.insert((peer, msg_id), token);
    }

    /// Looks up the exchange that sent the message with the given id.
    pub fn key_for_id(&self, peer: SocketAddr, msg_id: MsgId) -> Option<ExchangeKey> {
        self.by_id.get(&(peer, msg_id)).map(|token| (peer, *token))
    }

    /// Allocates the next message-id for `peer`: monotonic modulo 2^16,
    /// skipping ids still live in the id index for that peer.
    pub fn next_msg_id(&mut self, peer: SocketAddr) -> MsgId {
        loop {
            let candidate = self.next_msg_id;
            self.next_msg_id = self.next_msg_id.wrapping_add(1);
            if !self.by_id.contains_key(&(peer, candidate)) {
                return candidate;
            }
        }
    }

    /// Allocates a token unique among live exchanges with `peer`.
    pub fn next_token(&mut self, peer: SocketAddr) -> MsgToken {
        loop {
            let candidate = if self.random_tokens {
                MsgToken::from(rand::random::<u64>())
            } else {
                self.next_token_seed = self.next_token_seed.wrapping_add(1);
                MsgToken::from(self.next_token_seed)
            };
            if !self.exchanges.contains_key(&(peer, candidate)) {
                return candidate;
            }
        }
    }

    /// Records an incoming CON/NON message-id for deduplication. Returns
    /// false if `(peer, id)` was already seen within the exchange
    /// lifetime, i.e. the message is a duplicate.
    pub fn note_incoming(&mut self, peer: SocketAddr, msg_id: MsgId, now: Instant) -> bool {
        use std::collections::hash_map::Entry;

        match self.incoming.entry((peer, msg_id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(IncomingRecord {
                    received: now,
                    cached_ack: None,
                });
                true
            }
        }
    }

    /// Stores the encoded acknowledgement we sent for an incoming
    /// confirmable message, for re-emission on duplicates.
    pub fn cache_ack(&mut self, peer: SocketAddr, msg_id: MsgId, bytes: Vec<u8>) {
        if let Some(record) = self.incoming.get_mut(&(peer, msg_id)) {
            record.cached_ack = Some(bytes);
        }
    }

    pub fn cached_ack(&self, peer: SocketAddr, msg_id: MsgId) -> Option<&[u8]> {
        self.incoming
            .get(&(peer, msg_id))
            .and_then(|record| record.cached_ack.as_deref())
    }

    /// Keys of all exchanges holding an observe relation with `peer`.
    pub fn relation_keys_for_peer(&self, peer: SocketAddr) -> Vec<ExchangeKey> {
        self.exchanges
            .iter()
            .filter(|((p, _), exchange)| *p == peer && exchange.relation.is_some())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Mark-and-sweep pass: retires deduplication records and completed
    /// exchanges older than `lifetime`. Returns how many entries were
    /// swept.
    pub fn sweep(&mut self, now: Instant, lifetime: Duration) -> usize {
        let mut swept = 0;

        let before = self.incoming.len();
        self.incoming
            .retain(|_, record| now.duration_since(record.received) < lifetime);
        swept += before - self.incoming.len();

        let expired: Vec<ExchangeKey> = self
            .exchanges
            .iter()
            .filter(|(_, exchange)| match exchange.completed_at {
                Some(at) => now.duration_since(at) >= lifetime,
                None => false,
            })
            .map(|(key, _)| *key)
            .collect();

        for key in expired {
            self.remove(&key);
            swept += 1;
        }

        swept
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.exchanges.len()
    }

    #[cfg(test)]
    pub fn id_index_contains(&self, peer: SocketAddr, msg_id: MsgId) -> bool {
        self.by_id.contains_key(&(peer, msg_id))
    }
}
