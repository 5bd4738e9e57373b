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

//! The exchange pipeline: an explicit, ordered stack of layers between
//! the application and the wire.
//!
//! ```text
//!  App ──► [Observe] ──► [BlockWise] ──► [Reliability] ──► [Matcher] ──► Codec ──► UDP
//!  App ◄── [Observe] ◄── [BlockWise] ◄── [Reliability] ◄── [Matcher] ◄── Codec ◄── UDP
//! ```
//!
//! Messages travel top-down on send and bottom-up on receive; any layer
//! may short-circuit the traversal.

use super::*;
use crate::exchange::{ExchangeKey, ExchangeStore};
use crate::timer::{TimerKind, TimerQueue};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

mod matcher;
pub(crate) use matcher::MatcherLayer;

mod reliability;
pub(crate) use reliability::ReliabilityLayer;

mod blockwise;
pub(crate) use blockwise::BlockwiseLayer;

mod observe;
pub(crate) use observe::ObserveLayer;
pub(crate) use observe::{OBSERVE_DEREGISTER, OBSERVE_REGISTER};

/// Whether the pipeline keeps traversing after a layer has seen the
/// message.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Outcome {
    /// Hand the message to the next layer.
    Continue,

    /// The layer consumed the message; stop the traversal.
    Stop,
}

/// A message a layer wants re-run through the stack from the top.
#[derive(Debug)]
pub(crate) enum Emission {
    Request { msg: Message, peer: SocketAddr },
    Response { msg: Message, peer: SocketAddr },
    Empty { msg: Message, peer: SocketAddr },
}

/// Side effects collected while the pipeline runs. The endpoint drains
/// `outgoing` to the socket and `inbound_requests` to the application
/// handler after every pipeline entry.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    emissions: VecDeque<Emission>,

    /// Encoded datagrams ready for the wire, in emit order.
    pub outgoing: Vec<(Vec<u8>, SocketAddr)>,

    /// Fully reassembled requests for the application (server role).
    pub inbound_requests: Vec<(Message, SocketAddr)>,
}

impl Effects {
    pub fn new() -> Effects {
        Effects::default()
    }

    /// Queues a request to be sent through the full stack.
    pub fn send_request(&mut self, msg: Message, peer: SocketAddr) {
        self.emissions.push_back(Emission::Request { msg, peer });
    }

    /// Queues a response to be sent through the full stack.
    pub fn send_response(&mut self, msg: Message, peer: SocketAddr) {
        self.emissions.push_back(Emission::Response { msg, peer });
    }

    /// Queues an empty message (ACK, RST, or ping) to be sent through the
    /// full stack.
    pub fn send_empty(&mut self, msg: Message, peer: SocketAddr) {
        self.emissions.push_back(Emission::Empty { msg, peer });
    }

    /// Queues pre-encoded bytes straight for the wire, bypassing the
    /// stack. Used for retransmissions and re-emitted cached ACKs.
    pub fn transmit(&mut self, bytes: Vec<u8>, peer: SocketAddr) {
        self.outgoing.push((bytes, peer));
    }
}

/// Everything a layer may touch while handling one event: the endpoint
/// configuration, the exchange store, the timer queue, and the effect
/// collector. `now` is the event's logical timestamp.
pub(crate) struct LayerContext<'a> {
    pub config: &'a Config,
    pub store: &'a mut ExchangeStore,
    pub timers: &'a mut TimerQueue,
    pub effects: &'a mut Effects,
    pub now: Instant,
}

/// One layer of the exchange pipeline.
///
/// Every hook defaults to passing the message through untouched, so each
/// layer implements only the directions it participates in.
pub(crate) trait Layer: Send {
    fn send_request(
        &mut self,
        _ctx: &mut LayerContext<'_>,
        _msg: &mut Message,
        _peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        Ok(Outcome::Continue)
    }

    fn send_response(
        &mut self,
        _ctx: &mut LayerContext<'_>,
        _msg: &mut Message,
        _peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        Ok(Outcome::Continue)
    }

    fn send_empty(
        &mut self,
        _ctx: &mut LayerContext<'_>,
        _msg: &mut Message,
        _peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        Ok(Outcome::Continue)
    }

    fn receive_request(
        &mut self,
        _ctx: &mut LayerContext<'_>,
        _msg: &mut Message,
        _peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        Ok(Outcome::Continue)
    }

    fn receive_response(
        &mut self,
        _ctx: &mut LayerContext<'_>,
        _msg: &mut Message,
        _peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        Ok(Outcome::Continue)
    }

    fn receive_empty(
        &mut self,
        _ctx: &mut LayerContext<'_>,
        _msg: &mut Message,
        _peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        Ok(Outcome::Continue)
    }

    /// The encoded form of `msg` has been queued for the wire.
    fn message_sent(
        &mut self,
        _ctx: &mut LayerContext<'_>,
        _msg: &Message,
        _bytes: &[u8],
        _peer: SocketAddr,
    ) {
    }

    /// A timer fired. Returns true if this layer owned it.
    fn timer(&mut self, _ctx: &mut LayerContext<'_>, _kind: &TimerKind) -> bool {
        false
    }
}

/// The pipeline driver: holds the ordered layer list (application side
/// first) and walks it forward on send, backward on receive.
pub(crate) struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
}

impl std::fmt::Debug for LayerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerStack")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl LayerStack {
    /// The standard stack: observe over block-wise over reliability over
    /// the matcher.
    pub fn standard() -> LayerStack {
        LayerStack {
            layers: vec![
                Box::new(ObserveLayer::new()),
                Box::new(BlockwiseLayer::new()),
                Box::new(ReliabilityLayer::new()),
                Box::new(MatcherLayer::new()),
            ],
        }
    }

    /// Submits an application message at the top of the stack and drains
    /// every emission it generates.
    pub fn submit(&mut self, ctx: &mut LayerContext<'_>, msg: Message, peer: SocketAddr) {
        if msg.is_request() {
            ctx.effects.send_request(msg, peer);
        } else if msg.is_response() {
            ctx.effects.send_response(msg, peer);
        } else {
            ctx.effects.send_empty(msg, peer);
        }
        self.drain(ctx);
    }

    /// Feeds one received datagram into the bottom of the stack and
    /// drains every emission it generates. Malformed datagrams are
    /// dropped silently.
    pub fn process_datagram(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8], peer: SocketAddr) {
        let mut msg = match Message::from_bytes(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping malformed datagram from {}: {:?}", peer, e);
                return;
            }
        };

        debug!("INBOUND: {} {}", peer, MessageDisplay(&msg));

        let result = if msg.is_request() {
            self.walk_receive(ctx, &mut msg, peer, ReceiveKind::Request)
        } else if msg.is_response() {
            self.walk_receive(ctx, &mut msg, peer, ReceiveKind::Response)
        } else {
            self.walk_receive(ctx, &mut msg, peer, ReceiveKind::Empty)
        };

        match result {
            Ok(Outcome::Continue) if msg.is_request() => {
                ctx.effects.inbound_requests.push((msg, peer));
            }
            Ok(Outcome::Continue) if msg.is_response() => {
                self.finish_receive_response(ctx, msg, peer);
            }
            Ok(_) => (),
            Err(e) => {
                debug!("Receive pipeline error from {}: {:?}", peer, e);
            }
        }

        self.drain(ctx);
    }

    /// Dispatches a fired timer to the layer that owns it and drains the
    /// resulting emissions.
    pub fn process_timer(&mut self, ctx: &mut LayerContext<'_>, kind: TimerKind) {
        for i in 0..self.layers.len() {
            if self.layers[i].timer(ctx, &kind) {
                break;
            }
        }
        self.drain(ctx);
    }

    fn drain(&mut self, ctx: &mut LayerContext<'_>) {
        while let Some(emission) = ctx.effects.emissions.pop_front() {
            let result = match emission {
                Emission::Request { msg, peer } => self.run_send(ctx, msg, peer, SendKind::Request),
                Emission::Response { msg, peer } => {
                    self.run_send(ctx, msg, peer, SendKind::Response)
                }
                Emission::Empty { msg, peer } => self.run_send(ctx, msg, peer, SendKind::Empty),
            };

            if let Err(e) = result {
                warn!("Send pipeline error: {:?}", e);
            }
        }
    }

    fn run_send(
        &mut self,
        ctx: &mut LayerContext<'_>,
        mut msg: Message,
        peer: SocketAddr,
        kind: SendKind,
    ) -> Result<(), Error> {
        let outcome = self.walk_send(ctx, &mut msg, peer, kind)?;
        self.finish_send(ctx, msg, peer, outcome)
    }

    fn walk_send(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
        kind: SendKind,
    ) -> Result<Outcome, Error> {
        for i in 0..self.layers.len() {
            let outcome = match kind {
                SendKind::Request => self.layers[i].send_request(ctx, msg, peer)?,
                SendKind::Response => self.layers[i].send_response(ctx, msg, peer)?,
                SendKind::Empty => self.layers[i].send_empty(ctx, msg, peer)?,
            };
            if outcome == Outcome::Stop {
                return Ok(Outcome::Stop);
            }
        }
        Ok(Outcome::Continue)
    }

    fn finish_send(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: Message,
        peer: SocketAddr,
        outcome: Outcome,
    ) -> Result<(), Error> {
        if outcome == Outcome::Stop {
            return Ok(());
        }

        let bytes = msg.to_bytes()?;
        debug!("OUTBOUND: {} {}", peer, MessageDisplay(&msg));

        if bytes.len() > ctx.config.max_message_size {
            // The message still goes out, but constrained peers may
            // reject datagrams past the advertised maximum.
            warn!(
                "Outgoing message is {} bytes, over the {}-byte maximum",
                bytes.len(),
                ctx.config.max_message_size
            );
        }

        for i in 0..self.layers.len() {
            self.layers[i].message_sent(ctx, &msg, &bytes, peer);
        }

        ctx.effects.transmit(bytes, peer);
        Ok(())
    }

    fn walk_receive(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
        kind: ReceiveKind,
    ) -> Result<Outcome, Error> {
        for i in (0..self.layers.len()).rev() {
            let outcome = match kind {
                ReceiveKind::Request => self.layers[i].receive_request(ctx, msg, peer)?,
                ReceiveKind::Response => self.layers[i].receive_response(ctx, msg, peer)?,
                ReceiveKind::Empty => self.layers[i].receive_empty(ctx, msg, peer)?,
            };
            if outcome == Outcome::Stop {
                return Ok(Outcome::Stop);
            }
        }
        Ok(Outcome::Continue)
    }

    /// A response survived the whole stack: record it on its exchange,
    /// fan it out to the observers, and complete the exchange unless an
    /// active observe relation keeps it open.
    fn finish_receive_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: Message,
        peer: SocketAddr,
    ) {
        let key: ExchangeKey = (peer, msg.msg_token());

        if let Some(exchange) = ctx.store.get_mut(&key) {
            exchange.response = Some(msg.clone());
            exchange.notify_responded(&msg);

            let keep_open = exchange
                .relation
                .as_ref()
                .map(|relation| relation.is_active())
                .unwrap_or(false);

            if !keep_open {
                exchange.complete(ctx.now);
            }
        }
    }
}

#[derive(Copy, Clone)]
enum SendKind {
    Request,
    Response,
    Empty,
}

#[derive(Copy, Clone)]
enum ReceiveKind {
    Request,
    Response,
    Empty,
}

#[cfg(test)]
pub(crate) mod test;
