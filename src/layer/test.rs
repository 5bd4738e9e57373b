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

//! Stack-level tests driving the full layer pipeline with crafted
//! datagrams and a hand-advanced clock.

use super::*;
use crate::exchange::{Exchange, ObserveRelation};
use crate::observer::ExchangeObserver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn peer() -> SocketAddr {
    "198.51.100.7:5683".parse().unwrap()
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Event {
    Acknowledged,
    Retransmitting(u32),
    Responded(Message),
    Rejected,
    TimedOut,
    Cancelled,
    Reregistering,
    Failed(Error),
}

#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl ExchangeObserver for Recorder {
    fn acknowledged(&mut self) {
        self.push(Event::Acknowledged);
    }

    fn retransmitting(&mut self, attempt: u32) {
        self.push(Event::Retransmitting(attempt));
    }

    fn responded(&mut self, response: &Message) {
        self.push(Event::Responded(response.clone()));
    }

    fn rejected(&mut self) {
        self.push(Event::Rejected);
    }

    fn timed_out(&mut self) {
        self.push(Event::TimedOut);
    }

    fn cancelled(&mut self) {
        self.push(Event::Cancelled);
    }

    fn reregistering(&mut self) {
        self.push(Event::Reregistering);
    }

    fn failed(&mut self, error: Error) {
        self.push(Event::Failed(error));
    }
}

pub(crate) struct Harness {
    pub config: Config,
    pub stack: LayerStack,
    pub store: ExchangeStore,
    pub timers: TimerQueue,
    pub effects: Effects,
    pub now: Instant,
}

impl Harness {
    pub fn new() -> Harness {
        let config = Config {
            use_random_id_start: false,
            use_random_token_start: false,
            ..Config::default()
        };
        Harness {
            store: ExchangeStore::new(&config),
            config,
            stack: LayerStack::standard(),
            timers: TimerQueue::new(),
            effects: Effects::new(),
            now: Instant::now(),
        }
    }

    /// Submits a local request the way the endpoint façade does: create
    /// the exchange, install an observer, run the send pipeline.
    pub fn submit_request(&mut self, msg: Message, peer: SocketAddr) -> Recorder {
        self.submit_local(msg, peer, false)
    }

    /// Same, with an observe relation attached to the fresh exchange.
    pub fn submit_observe(&mut self, msg: Message, peer: SocketAddr) -> Recorder {
        self.submit_local(msg, peer, true)
    }

    fn submit_local(&mut self, mut msg: Message, peer: SocketAddr, observe: bool) -> Recorder {
        if msg.msg_token().is_empty() && !msg.is_empty() {
            msg.set_msg_token(self.store.next_token(peer));
        }

        let recorder = Recorder::default();
        let mut exchange = Exchange::new_local(peer, msg.msg_token(), msg.clone(), self.now);
        exchange.observers.push(Box::new(recorder.clone()));
        if observe {
            exchange.relation = Some(ObserveRelation::client());
        }
        self.store.insert(exchange);

        let mut ctx = LayerContext {
            config: &self.config,
            store: &mut self.store,
            timers: &mut self.timers,
            effects: &mut self.effects,
            now: self.now,
        };
        self.stack.submit(&mut ctx, msg, peer);
        recorder
    }

    /// Submits an application response (server role).
    pub fn respond(&mut self, msg: Message, peer: SocketAddr) {
        let mut ctx = LayerContext {
            config: &self.config,
            store: &mut self.store,
            timers: &mut self.timers,
            effects: &mut self.effects,
            now: self.now,
        };
        self.stack.submit(&mut ctx, msg, peer);
    }

    /// Feeds a message into the receive side of the pipeline.
    pub fn receive(&mut self, msg: &Message, peer: SocketAddr) {
        let bytes = msg.to_bytes().expect("test message encodes");
        let mut ctx = LayerContext {
            config: &self.config,
            store: &mut self.store,
            timers: &mut self.timers,
            effects: &mut self.effects,
            now: self.now,
        };
        self.stack.process_datagram(&mut ctx, &bytes, peer);
    }

    /// Jumps the clock to the next timer deadline and fires it.
    pub fn fire_next_timer(&mut self) -> Option<TimerKind> {
        let at = self.timers.next_deadline()?;
        if at > self.now {
            self.now = at;
        }
        let kind = self.timers.pop_due(self.now)?;
        let mut ctx = LayerContext {
            config: &self.config,
            store: &mut self.store,
            timers: &mut self.timers,
            effects: &mut self.effects,
            now: self.now,
        };
        self.stack.process_timer(&mut ctx, kind.clone());
        Some(kind)
    }

    /// Drains and decodes everything queued for the wire.
    pub fn take_outgoing(&mut self) -> Vec<(Message, SocketAddr)> {
        self.effects
            .outgoing
            .drain(..)
            .map(|(bytes, peer)| {
                (
                    Message::from_bytes(&bytes).expect("outgoing message decodes"),
                    peer,
                )
            })
            .collect()
    }

    /// Drains the requests delivered to the application handler.
    pub fn take_inbound_requests(&mut self) -> Vec<(Message, SocketAddr)> {
        self.effects.inbound_requests.drain(..).collect()
    }
}

fn simple_get(msg_id: MsgId, token: &[u8]) -> Message {
    let mut msg = Message::request(MsgType::Con, MsgCode::MethodGet);
    msg.set_msg_id(msg_id);
    msg.set_msg_token(MsgToken::new(token));
    msg.options_mut().insert(option::URI_PATH, "time").unwrap();
    msg
}

fn piggybacked(msg_id: MsgId, token: &[u8], payload: &[u8]) -> Message {
    let mut msg = Message::response(MsgType::Ack, MsgCode::SuccessContent);
    msg.set_msg_id(msg_id);
    msg.set_msg_token(MsgToken::new(token));
    msg.set_payload(payload.to_vec());
    msg
}

#[test]
fn simple_get_with_piggybacked_response() {
    let mut harness = Harness::new();
    let peer = peer();

    let recorder = harness.submit_request(simple_get(0x1234, &[0xAB]), peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgType::Con, out[0].0.msg_type());
    assert_eq!(0x1234, out[0].0.msg_id());

    harness.receive(&piggybacked(0x1234, &[0xAB], b"42"), peer);

    match &recorder.events()[..] {
        [Event::Acknowledged, Event::Responded(response)] => {
            assert_eq!(MsgCode::SuccessContent, response.msg_code());
            assert_eq!(b"42", response.payload());
        }
        events => panic!("unexpected events: {:?}", events),
    }

    // A piggybacked acknowledgement needs no reply of its own.
    assert!(harness.take_outgoing().is_empty());
}

#[test]
fn retransmit_then_separate_response() {
    let mut harness = Harness::new();
    let peer = peer();

    let recorder = harness.submit_request(simple_get(0x1234, &[0xAB]), peer);
    assert_eq!(1, harness.take_outgoing().len());

    // First retransmission at T0.
    assert!(matches!(
        harness.fire_next_timer(),
        Some(TimerKind::Retransmit(_))
    ));
    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(0x1234, out[0].0.msg_id());

    // An empty acknowledgement stops the retransmissions.
    harness.receive(&Message::empty_ack(0x1234), peer);
    assert_eq!(
        vec![Event::Retransmitting(1), Event::Acknowledged],
        recorder.events()
    );

    // The pending retransmit timer is now stale and does nothing.
    assert!(matches!(
        harness.fire_next_timer(),
        Some(TimerKind::Retransmit(_))
    ));
    assert!(harness.take_outgoing().is_empty());

    // The actual response arrives later as its own confirmable message,
    // which we must acknowledge.
    let mut separate = Message::response(MsgType::Con, MsgCode::SuccessContent);
    separate.set_msg_id(0x9000);
    separate.set_msg_token(MsgToken::new(&[0xAB]));
    separate.set_payload(&b"42"[..]);
    harness.receive(&separate, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgType::Ack, out[0].0.msg_type());
    assert_eq!(0x9000, out[0].0.msg_id());
    assert!(out[0].0.is_empty());

    match recorder.events().last() {
        Some(Event::Responded(response)) => assert_eq!(b"42", response.payload()),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn timeout_after_exhausted_retransmissions() {
    let mut harness = Harness::new();
    let peer = peer();
    let start = harness.now;

    let recorder = harness.submit_request(simple_get(0x1234, &[0xAB]), peer);
    assert_eq!(1, harness.take_outgoing().len());

    let mut transmissions = 1;
    while harness.fire_next_timer().is_some() {
        transmissions += harness.take_outgoing().len();
        if recorder.events().contains(&Event::TimedOut) {
            break;
        }
    }

    // Up to max_retransmit + 1 transmissions, then timed_out, with the
    // whole span inside [30s, 45s) for the default parameters.
    assert_eq!(5, transmissions);
    let retransmissions: Vec<Event> = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Retransmitting(_)))
        .collect();
    assert_eq!(4, retransmissions.len());
    assert_eq!(Some(&Event::TimedOut), recorder.events().last());

    let elapsed = harness.now.duration_since(start);
    assert!(
        elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(45),
        "elapsed: {:?}",
        elapsed
    );
}

#[test]
fn duplicate_con_request_reuses_cached_ack() {
    let mut harness = Harness::new();
    let peer = peer();

    let request = simple_get(0x1234, &[0xCC]);
    harness.receive(&request, peer);

    // The application sees the request exactly once.
    assert_eq!(1, harness.take_inbound_requests().len());

    let mut response = Message::response(MsgType::Non, MsgCode::SuccessContent);
    response.set_msg_token(MsgToken::new(&[0xCC]));
    response.set_payload(&b"42"[..]);
    harness.respond(response, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    let first_ack = out[0].0.clone();
    assert_eq!(MsgType::Ack, first_ack.msg_type());
    assert_eq!(0x1234, first_ack.msg_id());
    assert_eq!(b"42", first_ack.payload());

    // The duplicate re-emits the cached acknowledgement and never reaches
    // the application.
    harness.receive(&request, peer);
    assert!(harness.take_inbound_requests().is_empty());

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(first_ack, out[0].0);
}

#[test]
fn duplicate_non_request_is_dropped_silently() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut request = Message::request(MsgType::Non, MsgCode::MethodGet);
    request.set_msg_id(0x0042);
    request.set_msg_token(MsgToken::new(&[0x11]));

    harness.receive(&request, peer);
    assert_eq!(1, harness.take_inbound_requests().len());

    harness.receive(&request, peer);
    assert!(harness.take_inbound_requests().is_empty());
    assert!(harness.take_outgoing().is_empty());
}

fn notification(msg_id: MsgId, token: &[u8], seq: u32, payload: &[u8]) -> Message {
    let mut msg = Message::response(MsgType::Non, MsgCode::SuccessContent);
    msg.set_msg_id(msg_id);
    msg.set_msg_token(MsgToken::new(token));
    msg.options_mut().insert(option::OBSERVE, seq).unwrap();
    msg.set_payload(payload.to_vec());
    msg
}

#[test]
fn stale_notification_is_discarded() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut register = simple_get(0x0001, &[0xAB]);
    register
        .options_mut()
        .insert(option::OBSERVE, observe::OBSERVE_REGISTER)
        .unwrap();
    let recorder = harness.submit_observe(register, peer);
    harness.take_outgoing();

    harness.receive(&notification(0x9001, &[0xAB], 5, b"v5"), peer);
    harness.now += Duration::from_secs(1);
    harness.receive(&notification(0x9002, &[0xAB], 9, b"v9"), peer);
    harness.now += Duration::from_secs(1);
    harness.receive(&notification(0x9003, &[0xAB], 7, b"v7"), peer);

    let delivered: Vec<Vec<u8>> = recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Responded(msg) => Some(msg.payload().to_vec()),
            _ => None,
        })
        .collect();

    assert_eq!(vec![b"v5".to_vec(), b"v9".to_vec()], delivered);
}

#[test]
fn block2_download_client_side() {
    let mut harness = Harness::new();
    let peer = peer();

    let body: Vec<u8> = (0..1400u32).map(|i| (i % 251) as u8).collect();

    let recorder = harness.submit_request(simple_get(0, &[0xAB]), peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    let mut last_request = out[0].0.clone();

    for num in 0..3u32 {
        let start = num as usize * 512;
        let end = body.len().min(start + 512);
        let more = end < body.len();

        let mut block = piggybacked(last_request.msg_id(), &[0xAB], &body[start..end]);
        block
            .options_mut()
            .insert(option::BLOCK2, BlockInfo::new(num, more, 5).unwrap())
            .unwrap();
        harness.receive(&block, peer);

        let out = harness.take_outgoing();
        if more {
            // The next block is requested with the same token.
            assert_eq!(1, out.len(), "block {}", num);
            last_request = out[0].0.clone();
            assert_eq!(MsgCode::MethodGet, last_request.msg_code());
            assert_eq!(MsgToken::new(&[0xAB]), last_request.msg_token());
            let next = last_request.block2().unwrap();
            assert_eq!(num + 1, next.num());
            assert_eq!(5, next.szx());
        } else {
            assert!(out.is_empty());
        }
    }

    // Only the fully reassembled body reaches the caller.
    let responded: Vec<Message> = recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Responded(msg) => Some(msg),
            _ => None,
        })
        .collect();
    assert_eq!(1, responded.len());
    assert_eq!(body, responded[0].payload());
    assert_eq!(None, responded[0].block2());
}

#[test]
fn block2_download_server_side() {
    let mut harness = Harness::new();
    let peer = peer();

    let body: Vec<u8> = (0..1400u32).map(|i| (i % 199) as u8).collect();

    let mut request = simple_get(0x0100, &[0xDD]);
    request.options_mut().remove(OptionNumber::URI_PATH);
    request.options_mut().insert(option::URI_PATH, "large").unwrap();
    harness.receive(&request, peer);
    assert_eq!(1, harness.take_inbound_requests().len());

    let mut response = Message::response(MsgType::Non, MsgCode::SuccessContent);
    response.set_msg_token(MsgToken::new(&[0xDD]));
    response.set_payload(body.clone());
    harness.respond(response, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    let first = &out[0].0;
    assert_eq!(MsgType::Ack, first.msg_type());
    assert_eq!(0x0100, first.msg_id());
    assert_eq!(BlockInfo::new(0, true, 5), first.block2());
    assert_eq!(512, first.payload().len());
    assert_eq!(Some(1400), first.options().get(option::SIZE2));

    let mut reassembled = first.payload().to_vec();

    // Follow-up requests are served from the cached body without waking
    // the application again.
    for num in 1..3u32 {
        let mut follow_up = simple_get(0x0100 + num as MsgId, &[0xDD]);
        follow_up.options_mut().remove(OptionNumber::URI_PATH);
        follow_up.options_mut().insert(option::URI_PATH, "large").unwrap();
        follow_up
            .options_mut()
            .insert(option::BLOCK2, BlockInfo::new(num, false, 5).unwrap())
            .unwrap();
        harness.receive(&follow_up, peer);

        assert!(harness.take_inbound_requests().is_empty());

        let out = harness.take_outgoing();
        assert_eq!(1, out.len());
        let block = &out[0].0;
        assert_eq!(MsgType::Ack, block.msg_type());
        assert_eq!(0x0100 + num as MsgId, block.msg_id());

        let info = block.block2().unwrap();
        assert_eq!(num, info.num());
        assert_eq!(num != 2, info.more());
        assert_eq!(5, info.szx());
        if num == 2 {
            assert_eq!(376, block.payload().len());
        } else {
            assert_eq!(512, block.payload().len());
        }

        reassembled.extend_from_slice(block.payload());
    }

    assert_eq!(body, reassembled);
}

#[test]
fn block1_upload_client_side() {
    let mut harness = Harness::new();
    let peer = peer();

    let body: Vec<u8> = (0..1000u32).map(|i| (i % 97) as u8).collect();

    let mut request = Message::request(MsgType::Con, MsgCode::MethodPost);
    request.set_msg_token(MsgToken::new(&[0xEE]));
    request.set_payload(body.clone());
    let recorder = harness.submit_request(request, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    let first = &out[0].0;
    assert_eq!(BlockInfo::new(0, true, 5), first.block1());
    assert_eq!(512, first.payload().len());
    assert_eq!(Some(1000), first.options().get(option::SIZE1));

    // 2.31 Continue asks for the next block.
    let mut cont = Message::response(MsgType::Ack, MsgCode::SuccessContinue);
    cont.set_msg_id(first.msg_id());
    cont.set_msg_token(MsgToken::new(&[0xEE]));
    cont.options_mut()
        .insert(option::BLOCK1, BlockInfo::new(0, true, 5).unwrap())
        .unwrap();
    harness.receive(&cont, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    let second = &out[0].0;
    let info = second.block1().unwrap();
    assert_eq!(1, info.num());
    assert!(!info.more());
    assert_eq!(488, second.payload().len());

    // The final response completes the exchange.
    let mut done = Message::response(MsgType::Ack, MsgCode::SuccessChanged);
    done.set_msg_id(second.msg_id());
    done.set_msg_token(MsgToken::new(&[0xEE]));
    done.options_mut()
        .insert(option::BLOCK1, BlockInfo::new(1, false, 5).unwrap())
        .unwrap();
    harness.receive(&done, peer);

    match recorder.events().last() {
        Some(Event::Responded(msg)) => assert_eq!(MsgCode::SuccessChanged, msg.msg_code()),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn block1_upload_server_side() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut first = Message::request(MsgType::Con, MsgCode::MethodPut);
    first.set_msg_id(0x0001);
    first.set_msg_token(MsgToken::new(&[0xFF]));
    first
        .options_mut()
        .insert(option::BLOCK1, BlockInfo::new(0, true, 5).unwrap())
        .unwrap();
    first.set_payload(vec![0xAA; 512]);
    harness.receive(&first, peer);

    // Intermediate blocks never reach the application; each is answered
    // with 2.31 Continue.
    assert!(harness.take_inbound_requests().is_empty());
    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgCode::SuccessContinue, out[0].0.msg_code());
    assert_eq!(0x0001, out[0].0.msg_id());

    let mut last = Message::request(MsgType::Con, MsgCode::MethodPut);
    last.set_msg_id(0x0002);
    last.set_msg_token(MsgToken::new(&[0xFF]));
    last.options_mut()
        .insert(option::BLOCK1, BlockInfo::new(1, false, 5).unwrap())
        .unwrap();
    last.set_payload(vec![0xBB; 200]);
    harness.receive(&last, peer);

    let inbound = harness.take_inbound_requests();
    assert_eq!(1, inbound.len());
    assert_eq!(712, inbound[0].0.payload().len());

    // The final response echoes the last Block1.
    let mut response = Message::response(MsgType::Non, MsgCode::SuccessChanged);
    response.set_msg_token(MsgToken::new(&[0xFF]));
    harness.respond(response, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgCode::SuccessChanged, out[0].0.msg_code());
    assert_eq!(BlockInfo::new(1, false, 5), out[0].0.block1());
}

#[test]
fn block1_szx_change_mid_transfer_is_rejected() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut first = Message::request(MsgType::Con, MsgCode::MethodPut);
    first.set_msg_id(0x0001);
    first.set_msg_token(MsgToken::new(&[0xFE]));
    first
        .options_mut()
        .insert(option::BLOCK1, BlockInfo::new(0, true, 5).unwrap())
        .unwrap();
    first.set_payload(vec![0xAA; 512]);
    harness.receive(&first, peer);
    harness.take_outgoing();

    let mut second = Message::request(MsgType::Con, MsgCode::MethodPut);
    second.set_msg_id(0x0002);
    second.set_msg_token(MsgToken::new(&[0xFE]));
    second
        .options_mut()
        .insert(option::BLOCK1, BlockInfo::new(1, true, 4).unwrap())
        .unwrap();
    second.set_payload(vec![0xBB; 256]);
    harness.receive(&second, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(
        MsgCode::ClientErrorRequestEntityIncomplete,
        out[0].0.msg_code()
    );
    assert!(harness.take_inbound_requests().is_empty());
}

#[test]
fn observe_server_stashes_behind_in_transit_notification() {
    let mut harness = Harness::new();
    let peer = peer();

    // Registration.
    let mut register = simple_get(0x0001, &[0xAA]);
    register
        .options_mut()
        .insert(option::OBSERVE, observe::OBSERVE_REGISTER)
        .unwrap();
    harness.receive(&register, peer);
    assert_eq!(1, harness.take_inbound_requests().len());

    let mut reply = Message::response(MsgType::Non, MsgCode::SuccessContent);
    reply.set_msg_token(MsgToken::new(&[0xAA]));
    reply.set_payload(&b"v1"[..]);
    harness.respond(reply, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgType::Ack, out[0].0.msg_type());
    assert_eq!(Some(1), out[0].0.observe());

    // A confirmable notification goes out and stays in transit.
    let mut notify = Message::response(MsgType::Con, MsgCode::SuccessContent);
    notify.set_msg_token(MsgToken::new(&[0xAA]));
    notify.set_payload(&b"v2"[..]);
    harness.respond(notify, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    let in_transit = out[0].0.clone();
    assert_eq!(MsgType::Con, in_transit.msg_type());
    assert_eq!(Some(2), in_transit.observe());

    // Another notification while the CON is unacknowledged is stashed,
    // not sent: at most one confirmable notification in transit.
    let mut stashed = Message::response(MsgType::Con, MsgCode::SuccessContent);
    stashed.set_msg_token(MsgToken::new(&[0xAA]));
    stashed.set_payload(&b"v3"[..]);
    harness.respond(stashed, peer);
    assert!(harness.take_outgoing().is_empty());

    // The acknowledgement releases the stash with a fresh message-id.
    harness.receive(&Message::empty_ack(in_transit.msg_id()), peer);
    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(b"v3", out[0].0.payload());
    assert_ne!(in_transit.msg_id(), out[0].0.msg_id());
    assert_eq!(Some(3), out[0].0.observe());
}

#[test]
fn observe_retransmission_replaced_by_fresher_notification() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut register = simple_get(0x0001, &[0xAA]);
    register
        .options_mut()
        .insert(option::OBSERVE, observe::OBSERVE_REGISTER)
        .unwrap();
    harness.receive(&register, peer);
    harness.take_inbound_requests();

    let mut reply = Message::response(MsgType::Non, MsgCode::SuccessContent);
    reply.set_msg_token(MsgToken::new(&[0xAA]));
    reply.set_payload(&b"v1"[..]);
    harness.respond(reply, peer);
    harness.take_outgoing();

    let mut notify = Message::response(MsgType::Con, MsgCode::SuccessContent);
    notify.set_msg_token(MsgToken::new(&[0xAA]));
    notify.set_payload(&b"v2"[..]);
    harness.respond(notify, peer);
    let in_transit = harness.take_outgoing()[0].0.clone();

    let mut fresher = Message::response(MsgType::Con, MsgCode::SuccessContent);
    fresher.set_msg_token(MsgToken::new(&[0xAA]));
    fresher.set_payload(&b"v3"[..]);
    harness.respond(fresher, peer);
    assert!(harness.take_outgoing().is_empty());

    // When the retransmission timer fires, the stale payload is replaced
    // by the stashed notification, reusing the same message-id.
    assert!(matches!(
        harness.fire_next_timer(),
        Some(TimerKind::Retransmit(_))
    ));
    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(in_transit.msg_id(), out[0].0.msg_id());
    assert_eq!(MsgType::Con, out[0].0.msg_type());
    assert_eq!(b"v3", out[0].0.payload());
}

#[test]
fn ping_succeeds_on_reset() {
    let mut harness = Harness::new();
    let peer = peer();

    let recorder = harness.submit_request(Message::ping(), peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgType::Con, out[0].0.msg_type());
    assert!(out[0].0.is_empty());

    harness.receive(&Message::reset(out[0].0.msg_id()), peer);
    assert_eq!(vec![Event::Rejected], recorder.events());
}

#[test]
fn inbound_ping_is_answered_with_reset() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut ping = Message::ping();
    ping.set_msg_id(0x0707);
    harness.receive(&ping, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgType::Rst, out[0].0.msg_type());
    assert_eq!(0x0707, out[0].0.msg_id());
    assert!(harness.take_inbound_requests().is_empty());
}

#[test]
fn unknown_critical_option_in_request_gets_bad_option() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut request = simple_get(0x0005, &[0x99]);
    request
        .options_mut()
        .insert_bytes(OptionNumber(65003), b"x")
        .unwrap();
    harness.receive(&request, peer);

    assert!(harness.take_inbound_requests().is_empty());

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgCode::ClientErrorBadOption, out[0].0.msg_code());
    assert_eq!(MsgType::Ack, out[0].0.msg_type());
    assert_eq!(0x0005, out[0].0.msg_id());
}

#[test]
fn unknown_critical_option_in_response_is_rejected() {
    let mut harness = Harness::new();
    let peer = peer();

    let recorder = harness.submit_request(simple_get(0x0006, &[0x98]), peer);
    harness.take_outgoing();

    let mut response = Message::response(MsgType::Con, MsgCode::SuccessContent);
    response.set_msg_id(0x7000);
    response.set_msg_token(MsgToken::new(&[0x98]));
    response
        .options_mut()
        .insert_bytes(OptionNumber(65003), b"x")
        .unwrap();
    harness.receive(&response, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgType::Rst, out[0].0.msg_type());
    assert_eq!(0x7000, out[0].0.msg_id());

    assert!(recorder
        .events()
        .iter()
        .all(|e| !matches!(e, Event::Responded(_))));
}

#[test]
fn unmatched_con_response_is_reset() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut response = Message::response(MsgType::Con, MsgCode::SuccessContent);
    response.set_msg_id(0x4242);
    response.set_msg_token(MsgToken::new(&[0x55]));
    harness.receive(&response, peer);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    assert_eq!(MsgType::Rst, out[0].0.msg_type());
    assert_eq!(0x4242, out[0].0.msg_id());
}

#[test]
fn live_exchange_is_indexed_by_id_and_token() {
    let mut harness = Harness::new();
    let peer = peer();

    harness.submit_request(simple_get(0x2222, &[0x77]), peer);

    assert!(harness.store.contains(&(peer, MsgToken::new(&[0x77]))));
    assert!(harness.store.id_index_contains(peer, 0x2222));
}

#[test]
fn reregistration_reuses_token_after_max_age() {
    let mut harness = Harness::new();
    let peer = peer();

    let mut register = simple_get(0x0001, &[0xAB]);
    register
        .options_mut()
        .insert(option::OBSERVE, observe::OBSERVE_REGISTER)
        .unwrap();
    let recorder = harness.submit_observe(register, peer);
    harness.take_outgoing();

    // First notification piggybacks on the registration's ACK.
    let mut first = piggybacked(0x0001, &[0xAB], b"v5");
    first.options_mut().insert(option::OBSERVE, 5u32).unwrap();
    first.options_mut().insert(option::MAX_AGE, 10u32).unwrap();
    harness.receive(&first, peer);
    harness.take_outgoing();

    // No fresher notification arrives, so the timer refreshes the
    // registration with the original token.
    let fired = loop {
        match harness.fire_next_timer() {
            Some(TimerKind::Reregister(_)) => break true,
            Some(_) => continue,
            None => break false,
        }
    };
    assert!(fired);

    let out = harness.take_outgoing();
    assert_eq!(1, out.len());
    let refresh = &out[0].0;
    assert_eq!(MsgCode::MethodGet, refresh.msg_code());
    assert_eq!(MsgToken::new(&[0xAB]), refresh.msg_token());
    assert_eq!(Some(observe::OBSERVE_REGISTER), refresh.observe());
    assert_ne!(0x0001, refresh.msg_id());

    assert!(recorder.events().contains(&Event::Reregistering));
}
