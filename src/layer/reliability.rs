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

//! The reliability layer: the RFC 7252 retransmission state machine for
//! confirmable messages, and acknowledgement generation for confirmable
//! traffic we receive.

use super::*;
use crate::exchange::{ConState, TransmitState};

pub(crate) struct ReliabilityLayer;

impl ReliabilityLayer {
    pub fn new() -> ReliabilityLayer {
        ReliabilityLayer
    }

    /// Marks the exchange that sent `msg_id` acknowledged and stops its
    /// retransmission.
    fn handle_ack(&self, ctx: &mut LayerContext<'_>, peer: SocketAddr, msg_id: MsgId) {
        let key = match ctx.store.key_for_id(peer, msg_id) {
            Some(key) => key,
            None => {
                debug!("ACK MID:{:04X} from {} matched nothing", msg_id, peer);
                return;
            }
        };

        if let Some(exchange) = ctx.store.get_mut(&key) {
            let newly_acked = match exchange.transmit.as_mut() {
                Some(transmit) if transmit.msg_id == msg_id => match transmit.state {
                    ConState::InTransit => {
                        transmit.state = ConState::Acknowledged;
                        true
                    }
                    _ => false,
                },
                _ => false,
            };

            if newly_acked {
                exchange.notify_acknowledged();
            }
        }
    }

    /// Handles an incoming reset for something we sent: the exchange
    /// completes with failure.
    fn handle_reset(&self, ctx: &mut LayerContext<'_>, peer: SocketAddr, msg_id: MsgId) {
        let key = match ctx.store.key_for_id(peer, msg_id) {
            Some(key) => key,
            None => {
                debug!("RST MID:{:04X} from {} matched nothing", msg_id, peer);
                return;
            }
        };

        if let Some(exchange) = ctx.store.get_mut(&key) {
            if exchange.is_complete() {
                return;
            }
            if let Some(transmit) = exchange.transmit.as_mut() {
                transmit.state = ConState::Rejected;
            }
            exchange.notify_rejected();
            exchange.complete(ctx.now);
        }
    }
}

impl Layer for ReliabilityLayer {
    fn receive_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        match msg.msg_type() {
            // A piggybacked response acknowledges our confirmable request.
            MsgType::Ack => self.handle_ack(ctx, peer, msg.msg_id()),

            // A separate confirmable response must itself be acknowledged.
            MsgType::Con => {
                ctx.effects
                    .send_empty(Message::empty_ack(msg.msg_id()), peer);
            }

            _ => (),
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
            MsgType::Ack => self.handle_ack(ctx, peer, msg.msg_id()),
            MsgType::Rst => self.handle_reset(ctx, peer, msg.msg_id()),
            _ => (),
        }
        Ok(Outcome::Continue)
    }

    fn message_sent(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &Message,
        bytes: &[u8],
        peer: SocketAddr,
    ) {
        if !msg.msg_type().is_con() {
            return;
        }

        let key = (peer, msg.msg_token());

        if let Some(exchange) = ctx.store.get_mut(&key) {
            // Retransmissions bypass the stack, so a confirmable arriving
            // here is always a fresh transmission with a fresh timer.
            let timeout = ctx.config.initial_retransmit_timeout();
            let mut transmit = TransmitState::new(msg.msg_id(), bytes.to_vec(), timeout);
            transmit.state = ConState::InTransit;
            exchange.transmit = Some(transmit);
            ctx.timers
                .schedule(ctx.now + timeout, TimerKind::Retransmit(key));
        }
    }

    fn timer(&mut self, ctx: &mut LayerContext<'_>, kind: &TimerKind) -> bool {
        let key = match kind {
            TimerKind::Retransmit(key) => *key,
            _ => return false,
        };

        let exchange = match ctx.store.get_mut(&key) {
            Some(exchange) => exchange,
            None => return true,
        };

        if exchange.is_complete() {
            return true;
        }

        let in_transit = matches!(
            exchange.transmit,
            Some(TransmitState {
                state: ConState::InTransit,
                ..
            })
        );
        if !in_transit {
            return true;
        }

        // A freshly stashed notification replaces the retransmission:
        // same message-id, forced confirmable, next sequence number.
        let replacement = exchange.relation.as_mut().and_then(|relation| {
            relation.next_control.take().map(|mut stash| {
                let seq = relation.next_observe_seq();
                let _ = stash.options_mut().replace(option::OBSERVE, seq);
                stash
            })
        });

        let transmit = match exchange.transmit.as_mut() {
            Some(transmit) => transmit,
            None => return true,
        };

        if let Some(mut stash) = replacement {
            stash.set_msg_id(transmit.msg_id);
            stash.set_msg_type(MsgType::Con);

            match stash.to_bytes() {
                Ok(bytes) => {
                    debug!("Replacing retransmission MID:{:04X} with fresher notification", transmit.msg_id);
                    transmit.bytes = bytes.clone();
                    transmit.current_timeout =
                        ctx.config.scale_retransmit_timeout(transmit.current_timeout);
                    let at = ctx.now + transmit.current_timeout;
                    ctx.effects.transmit(bytes, key.0);
                    ctx.timers.schedule(at, TimerKind::Retransmit(key));
                    return true;
                }
                Err(e) => {
                    warn!("Could not encode replacement notification: {:?}", e);
                }
            }
        }

        let mut exhausted = transmit.retransmit_count >= ctx.config.max_retransmit;

        if !exhausted {
            transmit.retransmit_count += 1;
            transmit.current_timeout =
                ctx.config.scale_retransmit_timeout(transmit.current_timeout);

            let attempt = transmit.retransmit_count;
            let bytes = transmit.bytes.clone();
            let at = ctx.now + transmit.current_timeout;

            debug!(
                "Retransmission {} of MID:{:04X} to {}",
                attempt, transmit.msg_id, key.0
            );

            // The sender stops waiting once the final permitted copy is
            // on the wire, bounding the whole span by MAX_TRANSMIT_SPAN.
            exhausted = attempt >= ctx.config.max_retransmit;

            exchange.notify_retransmitting(attempt);
            ctx.effects.transmit(bytes, key.0);
            if !exhausted {
                ctx.timers.schedule(at, TimerKind::Retransmit(key));
            }
        }

        if exhausted {
            debug!("Retransmissions exhausted for {:?}", key);
            if let Some(transmit) = exchange.transmit.as_mut() {
                transmit.state = ConState::TimedOut;
            }
            exchange.notify_timed_out();
            exchange.complete(ctx.now);

            // A notification that could not be confirmed tears down every
            // relation with that peer.
            let had_relation = exchange.relation.is_some();
            if had_relation {
                for relation_key in ctx.store.relation_keys_for_peer(key.0) {
                    if let Some(exchange) = ctx.store.get_mut(&relation_key) {
                        if let Some(relation) = exchange.relation.as_mut() {
                            relation.cancelled = true;
                        }
                        exchange.notify_cancelled();
                        exchange.complete(ctx.now);
                    }
                }
            }
        }

        true
    }
}
