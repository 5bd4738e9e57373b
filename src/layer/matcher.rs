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

//! The bottom layer: message-id and token bookkeeping, duplicate
//! suppression, and rejection of unmatchable or bad-option traffic.

use super::*;
use crate::exchange::Exchange;

pub(crate) struct MatcherLayer;

impl MatcherLayer {
    pub fn new() -> MatcherLayer {
        MatcherLayer
    }

    /// Duplicate check for confirmable and non-confirmable messages.
    /// Returns `Stop` when the message is a duplicate, re-emitting the
    /// cached acknowledgement for CON duplicates.
    fn dedup(
        &self,
        ctx: &mut LayerContext<'_>,
        msg: &Message,
        peer: SocketAddr,
    ) -> Outcome {
        if !msg.msg_type().is_con() && !msg.msg_type().is_non() {
            return Outcome::Continue;
        }

        if ctx.store.note_incoming(peer, msg.msg_id(), ctx.now) {
            return Outcome::Continue;
        }

        debug!(
            "Duplicate {:?} MID:{:04X} from {}",
            msg.msg_type(),
            msg.msg_id(),
            peer
        );

        if msg.msg_type().is_con() {
            if let Some(bytes) = ctx.store.cached_ack(peer, msg.msg_id()) {
                let bytes = bytes.to_vec();
                ctx.effects.transmit(bytes, peer);
            }
        }

        Outcome::Stop
    }
}

impl Layer for MatcherLayer {
    fn send_request(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        if msg.msg_id() == 0 {
            msg.set_msg_id(ctx.store.next_msg_id(peer));
        }
        ctx.store
            .register_outgoing_id(peer, msg.msg_id(), msg.msg_token());

        if let Some(exchange) = ctx.store.get_mut(&(peer, msg.msg_token())) {
            exchange.request = msg.clone();
        }

        Ok(Outcome::Continue)
    }

    fn send_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        let pending_ack = ctx
            .store
            .get_mut(&(peer, msg.msg_token()))
            .and_then(|exchange| exchange.pending_ack_id.take());

        if let Some(request_id) = pending_ack {
            // Piggyback onto the acknowledgement of the request.
            msg.set_msg_type(MsgType::Ack);
            msg.set_msg_id(request_id);
        } else {
            // Separate response or notification: its own message-id.
            if msg.msg_type().is_ack() {
                msg.set_msg_type(MsgType::Con);
            }
            if msg.msg_id() == 0 {
                msg.set_msg_id(ctx.store.next_msg_id(peer));
            }
            if msg.msg_type().is_con() {
                ctx.store
                    .register_outgoing_id(peer, msg.msg_id(), msg.msg_token());
            }
        }

        Ok(Outcome::Continue)
    }

    fn send_empty(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        // A confirmable empty message is a ping probe and needs an id of
        // its own; ACK/RST mirror the id of what they answer.
        if msg.msg_type().is_con() && msg.msg_id() == 0 {
            msg.set_msg_id(ctx.store.next_msg_id(peer));
            ctx.store
                .register_outgoing_id(peer, msg.msg_id(), msg.msg_token());
        }
        Ok(Outcome::Continue)
    }

    fn receive_request(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        if self.dedup(ctx, msg, peer) == Outcome::Stop {
            return Ok(Outcome::Stop);
        }

        let key = (peer, msg.msg_token());

        if !ctx.store.contains(&key) {
            ctx.store
                .insert(Exchange::new_remote(peer, msg.msg_token(), msg.clone(), ctx.now));
        }

        if let Some(exchange) = ctx.store.get_mut(&key) {
            exchange.request = msg.clone();
            if msg.msg_type().is_con() {
                exchange.pending_ack_id = Some(msg.msg_id());
            }
        }

        if let Some(number) = msg.options().first_unrecognized_critical() {
            debug!("Unrecognized critical option {} in request", number);
            let mut reply = Message::response(MsgType::Ack, MsgCode::ClientErrorBadOption);
            reply.set_msg_token(msg.msg_token());
            ctx.effects.send_response(reply, peer);
            return Ok(Outcome::Stop);
        }

        Ok(Outcome::Continue)
    }

    fn receive_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        if self.dedup(ctx, msg, peer) == Outcome::Stop {
            return Ok(Outcome::Stop);
        }

        let key = (peer, msg.msg_token());

        if !ctx.store.contains(&key) {
            debug!("Response did not match any exchange: {}", MessageDisplay(msg));
            if msg.msg_type().is_con() {
                ctx.effects.send_empty(Message::reset(msg.msg_id()), peer);
            }
            return Ok(Outcome::Stop);
        }

        if let Some(number) = msg.options().first_unrecognized_critical() {
            debug!("Rejecting response with critical option {}", number);
            if msg.msg_type().is_con() {
                ctx.effects.send_empty(Message::reset(msg.msg_id()), peer);
            }
            return Ok(Outcome::Stop);
        }

        Ok(Outcome::Continue)
    }

    fn receive_empty(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        match msg.msg_type() {
            MsgType::Con => {
                // CoAP ping: answer with a reset.
                ctx.effects.send_empty(Message::reset(msg.msg_id()), peer);
                Ok(Outcome::Stop)
            }
            MsgType::Non => {
                // An empty non-confirmable is meaningless; ignore it.
                Ok(Outcome::Stop)
            }
            MsgType::Ack | MsgType::Rst => Ok(Outcome::Continue),
        }
    }

    fn message_sent(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &Message,
        bytes: &[u8],
        peer: SocketAddr,
    ) {
        // Cache every acknowledgement we emit (empty or piggybacked) so a
        // duplicate of the confirmable it answers can be re-acked.
        if msg.msg_type().is_ack() {
            ctx.store.cache_ack(peer, msg.msg_id(), bytes.to_vec());
        }
    }

    fn timer(&mut self, ctx: &mut LayerContext<'_>, kind: &TimerKind) -> bool {
        match kind {
            TimerKind::Sweep => {
                let swept = ctx.store.sweep(ctx.now, ctx.config.exchange_lifetime);
                if swept > 0 {
                    debug!("Mark-and-sweep retired {} entries", swept);
                }
                ctx.timers.schedule(
                    ctx.now + ctx.config.mark_and_sweep_interval,
                    TimerKind::Sweep,
                );
                true
            }
            TimerKind::RequestDeadline(key) => {
                if let Some(exchange) = ctx.store.get_mut(key) {
                    if exchange.response.is_none() && !exchange.is_complete() {
                        debug!("Request deadline elapsed for {:?}", key);
                        exchange.notify_timed_out();
                        exchange.complete(ctx.now);
                    }
                }
                true
            }
            _ => false,
        }
    }
}
