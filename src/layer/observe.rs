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

//! The observe layer: RFC 7641 registrations, notification freshness,
//! server-side notification scheduling, and client re-registration.

use super::*;
use crate::exchange::{ObserveRelation, ReregistrationContext};
use std::time::Duration;

/// Observe option value registering an observer.
pub(crate) const OBSERVE_REGISTER: u32 = 0;

/// Observe option value deregistering an observer.
pub(crate) const OBSERVE_DEREGISTER: u32 = 1;

pub(crate) struct ObserveLayer;

impl ObserveLayer {
    pub fn new() -> ObserveLayer {
        ObserveLayer
    }
}

impl Layer for ObserveLayer {
    fn send_request(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        if msg.observe() == Some(OBSERVE_DEREGISTER) {
            let key = (peer, msg.msg_token());
            if let Some(exchange) = ctx.store.get_mut(&key) {
                if let Some(relation) = exchange.relation.as_mut() {
                    relation.cancelled = true;
                }
            }
        }
        Ok(Outcome::Continue)
    }

    /// Server side: turn responses on an observed exchange into numbered
    /// notifications, keeping at most one confirmable notification in
    /// transit per relation.
    fn send_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        let key = (peer, msg.msg_token());

        let exchange = match ctx.store.get_mut(&key) {
            Some(exchange) => exchange,
            None => return Ok(Outcome::Continue),
        };

        let relation = match exchange.relation.as_mut() {
            Some(relation) if exchange.origin == crate::exchange::ExchangeOrigin::Remote => {
                relation
            }
            _ => return Ok(Outcome::Continue),
        };

        if relation.cancelled || msg.msg_code().is_error() {
            // A declined or torn-down relation responds without the
            // observe option, which ends it on the client too.
            msg.options_mut().remove(OptionNumber::OBSERVE);
            exchange.relation = None;
            return Ok(Outcome::Continue);
        }

        // At most one confirmable notification in transit per relation;
        // newer ones replace the stash until the wire frees up. The
        // stash draws its sequence number when it actually goes out.
        if relation.current_control.is_some() {
            debug!("Notification stashed behind in-transit CON for {:?}", key);
            relation.next_control = Some(msg.clone());
            return Ok(Outcome::Stop);
        }

        let seq = relation.next_observe_seq();
        msg.options_mut().replace(option::OBSERVE, seq)?;

        // The check policy promotes an occasional notification to
        // confirmable to verify the client is still there.
        if msg.msg_type().is_non()
            && relation.take_confirmable_check(
                ctx.now,
                ctx.config.notification_check_interval_count,
                ctx.config.notification_check_interval_time,
            )
        {
            msg.set_msg_type(MsgType::Con);
        }

        Ok(Outcome::Continue)
    }

    /// Server side: a GET with Observe=0 establishes a relation before the
    /// application sees the request.
    fn receive_request(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        if msg.msg_code() != MsgCode::MethodGet {
            return Ok(Outcome::Continue);
        }

        let key = (peer, msg.msg_token());

        match msg.observe() {
            Some(OBSERVE_REGISTER) => {
                if let Some(exchange) = ctx.store.get_mut(&key) {
                    if exchange.relation.is_none() {
                        debug!("Observe relation established with {}", peer);
                        exchange.relation = Some(ObserveRelation::server(ctx.now));
                    }
                }
            }
            Some(OBSERVE_DEREGISTER) => {
                if let Some(exchange) = ctx.store.get_mut(&key) {
                    if exchange.relation.take().is_some() {
                        debug!("Observe relation cancelled by {}", peer);
                    }
                }
            }
            _ => (),
        }

        Ok(Outcome::Continue)
    }

    /// Client side: apply the freshness rule to notifications and arm the
    /// re-registration timer.
    fn receive_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        let key = (peer, msg.msg_token());
        let explicit_max_age = msg.options().get(option::MAX_AGE);
        let observe = msg.observe();
        let is_error = msg.msg_code().is_error();

        let exchange = match ctx.store.get_mut(&key) {
            Some(exchange) => exchange,
            None => return Ok(Outcome::Continue),
        };

        if exchange.origin != crate::exchange::ExchangeOrigin::Local {
            return Ok(Outcome::Continue);
        }

        let relation = match exchange.relation.as_mut() {
            Some(relation) => relation,
            None => return Ok(Outcome::Continue),
        };

        if relation.cancelled || is_error {
            // Terminal: deliver this response, then the exchange closes.
            exchange.relation = None;
            return Ok(Outcome::Continue);
        }

        let counter = match observe {
            Some(counter) => counter,
            None => {
                if relation.established {
                    // An established relation ended by the server.
                    relation.cancelled = true;
                } else {
                    // The server declined the registration; the response
                    // is an ordinary one.
                    exchange.relation = None;
                }
                return Ok(Outcome::Continue);
            }
        };

        relation.established = true;

        if !relation.accept_notification(counter, ctx.now) {
            debug!("Discarding stale notification V:{} from {}", counter, peer);
            return Ok(Outcome::Stop);
        }

        // Re-register if no fresher notification lands within Max-Age
        // (the configured fallback when the notification declares none)
        // plus the configured backoff.
        let max_age = match explicit_max_age {
            Some(secs) => Duration::from_secs(secs as u64),
            None => ctx.config.notification_max_age,
        };
        let interval = max_age + ctx.config.notification_reregistration_backoff;
        exchange.reregistration = Some(ReregistrationContext {
            armed_for: exchange
                .relation
                .as_ref()
                .and_then(|relation| relation.last_arrival),
        });
        ctx.timers
            .schedule(ctx.now + interval, TimerKind::Reregister(key));

        Ok(Outcome::Continue)
    }

    /// Server side: when the in-transit confirmable notification is
    /// acknowledged, the stashed one goes out; a reset cancels every
    /// relation with the peer.
    fn receive_empty(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        match msg.msg_type() {
            MsgType::Ack => {
                let key = match ctx.store.key_for_id(peer, msg.msg_id()) {
                    Some(key) => key,
                    None => return Ok(Outcome::Continue),
                };

                let stash = match ctx.store.get_mut(&key) {
                    Some(exchange) => match exchange.relation.as_mut() {
                        Some(relation) if relation.current_control == Some(msg.msg_id()) => {
                            relation.current_control = None;
                            relation.next_control.take()
                        }
                        _ => None,
                    },
                    None => None,
                };

                if let Some(stash) = stash {
                    debug!("In-transit notification acked; sending stash to {}", peer);
                    ctx.effects.send_response(stash, peer);
                }
            }
            MsgType::Rst => {
                // A reset to a notification cancels every relation with
                // that source.
                for key in ctx.store.relation_keys_for_peer(peer) {
                    if let Some(exchange) = ctx.store.get_mut(&key) {
                        let was_active = exchange
                            .relation
                            .as_mut()
                            .map(|relation| {
                                let active = relation.is_active();
                                relation.cancelled = true;
                                active
                            })
                            .unwrap_or(false);

                        if was_active {
                            debug!("Relation {:?} cancelled by reset", key);
                            exchange.notify_cancelled();
                            exchange.complete(ctx.now);
                        }
                    }
                }
            }
            _ => (),
        }

        Ok(Outcome::Continue)
    }

    fn message_sent(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &Message,
        _bytes: &[u8],
        peer: SocketAddr,
    ) {
        // Record the in-transit confirmable notification of a relation.
        if !msg.msg_type().is_con() || !msg.is_response() || msg.observe().is_none() {
            return;
        }

        let key = (peer, msg.msg_token());
        if let Some(exchange) = ctx.store.get_mut(&key) {
            if let Some(relation) = exchange.relation.as_mut() {
                relation.current_control = Some(msg.msg_id());
            }
        }
    }

    fn timer(&mut self, ctx: &mut LayerContext<'_>, kind: &TimerKind) -> bool {
        let key = match kind {
            TimerKind::Reregister(key) => *key,
            _ => return false,
        };

        let refresh = match ctx.store.get_mut(&key) {
            Some(exchange) => {
                let armed_for = match exchange.reregistration {
                    Some(context) => context.armed_for,
                    None => return true,
                };

                let active = exchange
                    .relation
                    .as_ref()
                    .map(|relation| relation.is_active() && relation.last_arrival == armed_for)
                    .unwrap_or(false);

                if active && !exchange.is_complete() {
                    exchange.reregistration = None;
                    exchange.notify_reregistering();

                    let mut refresh = exchange.request.clone();
                    refresh.set_msg_id(0);
                    refresh.set_payload(Vec::new());
                    let _ = refresh
                        .options_mut()
                        .replace(option::OBSERVE, OBSERVE_REGISTER);
                    Some(refresh)
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some(refresh) = refresh {
            debug!("Re-registering observation {:?}", key);
            ctx.effects.send_request(refresh, key.0);
        }

        true
    }
}
