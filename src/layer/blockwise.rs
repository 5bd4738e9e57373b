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

//! The block-wise layer: RFC 7959 Block1 (request payload) and Block2
//! (response payload) fragmentation and reassembly, on both sides of an
//! exchange.

use super::*;
use crate::exchange::BlockwiseStatus;

pub(crate) struct BlockwiseLayer;

impl BlockwiseLayer {
    pub fn new() -> BlockwiseLayer {
        BlockwiseLayer
    }

    fn reply_with(
        effects: &mut Effects,
        code: MsgCode,
        token: MsgToken,
        block1: Option<BlockInfo>,
        peer: SocketAddr,
    ) {
        let mut reply = Message::response(MsgType::Ack, code);
        reply.set_msg_token(token);
        if let Some(block1) = block1 {
            let _ = reply.options_mut().insert(option::BLOCK1, block1);
        }
        effects.send_response(reply, peer);
    }
}

impl Layer for BlockwiseLayer {
    /// Outbound requests: split an oversized payload into a Block1
    /// transfer, sending the first block now.
    fn send_request(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        let block_size = ctx.config.default_block_size;
        if msg.payload().len() <= block_size {
            return Ok(Outcome::Continue);
        }

        let key = (peer, msg.msg_token());
        let szx = BlockInfo::szx_for_size(block_size);

        let payload = msg.take_payload();
        let total = payload.len();

        let mut status = BlockwiseStatus::new(szx, ctx.now);
        status.buffer = payload;
        status.next_num = 1;

        let mut template = msg.clone();
        template.options_mut().remove(OptionNumber::BLOCK1);
        status.template = Some(template);

        let first = status.slice(0).ok_or(Error::Blockwise)?.to_vec();

        if let Some(exchange) = ctx.store.get_mut(&key) {
            exchange.block1 = Some(status);
        } else {
            return Err(Error::Blockwise);
        }

        ctx.timers.schedule(
            ctx.now + ctx.config.blockwise_status_lifetime,
            TimerKind::BlockwiseExpiry(key),
        );

        msg.set_payload(first);
        msg.options_mut().replace(
            option::BLOCK1,
            BlockInfo::new(0, true, szx).ok_or(Error::Blockwise)?,
        )?;
        msg.options_mut().replace(option::SIZE1, total as u32)?;

        Ok(Outcome::Continue)
    }

    /// Outbound responses: slice the payload of a large response at the
    /// block the request asked for, caching the body for the follow-ups.
    fn send_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        // Replies generated inside this layer already carry their block
        // options.
        if msg.block2().is_some() {
            return Ok(Outcome::Continue);
        }

        let key = (peer, msg.msg_token());

        let requested = match ctx.store.get_mut(&key) {
            Some(exchange) => {
                // Echo the final Block1 of a reassembled request.
                if exchange.block1.is_some() && msg.msg_code().is_success() {
                    if let Some(block1) = exchange.request.block1() {
                        msg.options_mut()
                            .replace(option::BLOCK1, block1.with_more(false))?;
                    }
                    exchange.block1 = None;
                }
                exchange.request.block2()
            }
            None => None,
        };

        let block_size = requested
            .map(|b| b.size())
            .unwrap_or(ctx.config.default_block_size)
            .min(ctx.config.default_block_size);

        if msg.payload().len() <= block_size && requested.is_none() {
            return Ok(Outcome::Continue);
        }

        let szx = BlockInfo::szx_for_size(block_size);
        let payload = msg.take_payload();
        let total = payload.len();
        let num = requested.map(|b| b.num()).unwrap_or(0);

        let size = 1usize << (szx as usize + 4);
        let start = num as usize * size;
        if start >= total {
            debug!("Block2 request for NUM:{} beyond {} bytes", num, total);
            msg.set_msg_code(MsgCode::ClientErrorBadRequest);
            return Ok(Outcome::Continue);
        }

        let end = total.min(start + size);
        let more = end < total;

        let mut status = BlockwiseStatus::new(szx, ctx.now);
        status.buffer = payload.clone();

        let mut template = msg.clone();
        template.set_msg_id(0);
        template.set_msg_type(MsgType::Ack);
        status.template = Some(template);

        if let Some(exchange) = ctx.store.get_mut(&key) {
            exchange.block2 = Some(status);
            ctx.timers.schedule(
                ctx.now + ctx.config.blockwise_status_lifetime,
                TimerKind::BlockwiseExpiry(key),
            );
        }

        msg.set_payload(payload[start..end].to_vec());
        msg.options_mut().replace(
            option::BLOCK2,
            BlockInfo::new(num, more, szx).ok_or(Error::Blockwise)?,
        )?;
        if num == 0 {
            msg.options_mut().replace(option::SIZE2, total as u32)?;
        }

        Ok(Outcome::Continue)
    }

    /// Inbound requests (server role): reassemble Block1 uploads and
    /// serve follow-up Block2 downloads from the cached body.
    fn receive_request(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        let key = (peer, msg.msg_token());
        let token = msg.msg_token();

        // Follow-up download requests are answered from the cache without
        // waking the application again.
        if let Some(block2) = msg.block2() {
            if block2.num() > 0 {
                let cached = ctx.store.get_mut(&key).and_then(|exchange| {
                    exchange.block2.as_ref().and_then(|status| {
                        status
                            .template
                            .as_ref()
                            .map(|template| (template.clone(), status.buffer.clone()))
                    })
                });

                if let Some((template, buffer)) = cached {
                    let szx = block2.szx().min(BlockInfo::SZX_MAX);
                    let size = 1usize << (szx as usize + 4);
                    let start = block2.num() as usize * size;

                    if start >= buffer.len() {
                        Self::reply_with(ctx.effects, MsgCode::ClientErrorBadRequest, token, None, peer);
                        return Ok(Outcome::Stop);
                    }

                    let end = buffer.len().min(start + size);
                    let mut reply = template;
                    reply.set_msg_token(token);
                    reply.set_payload(buffer[start..end].to_vec());
                    reply.options_mut().replace(
                        option::BLOCK2,
                        BlockInfo::new(block2.num(), end < buffer.len(), szx)
                            .ok_or(Error::Blockwise)?,
                    )?;
                    ctx.effects.send_response(reply, peer);
                    return Ok(Outcome::Stop);
                }
                // No cached body: fall through and let the application
                // regenerate it; the send path slices it.
            }
        }

        let block1 = match msg.block1() {
            Some(block1) => block1,
            None => return Ok(Outcome::Continue),
        };

        let exchange = match ctx.store.get_mut(&key) {
            Some(exchange) => exchange,
            None => return Ok(Outcome::Continue),
        };

        if exchange.block1.is_none() {
            exchange.block1 = Some(BlockwiseStatus::new(block1.szx(), ctx.now));
            ctx.timers.schedule(
                ctx.now + ctx.config.blockwise_status_lifetime,
                TimerKind::BlockwiseExpiry(key),
            );
        }

        let status = exchange.block1.as_mut().expect("just inserted");

        // All blocks of one transfer must agree on the size exponent.
        if block1.szx() != status.szx {
            debug!("Block1 SZX changed mid-transfer from {}", peer);
            exchange.block1 = None;
            Self::reply_with(
                ctx.effects,
                MsgCode::ClientErrorRequestEntityIncomplete,
                token,
                None,
                peer,
            );
            return Ok(Outcome::Stop);
        }

        // Single sliding window: only the next block number is admitted.
        if block1.num() < status.next_num {
            // A block we already hold; re-acknowledge it.
            Self::reply_with(
                ctx.effects,
                MsgCode::SuccessContinue,
                token,
                Some(block1.with_more(true)),
                peer,
            );
            return Ok(Outcome::Stop);
        }

        if block1.num() > status.next_num {
            debug!(
                "Block1 gap from {}: got NUM:{}, expected {}",
                peer,
                block1.num(),
                status.next_num
            );
            exchange.block1 = None;
            Self::reply_with(
                ctx.effects,
                MsgCode::ClientErrorRequestEntityIncomplete,
                token,
                None,
                peer,
            );
            return Ok(Outcome::Stop);
        }

        status.buffer.extend_from_slice(msg.payload());
        status.next_num += 1;

        if block1.more() {
            Self::reply_with(
                ctx.effects,
                MsgCode::SuccessContinue,
                token,
                Some(block1.with_more(true)),
                peer,
            );
            return Ok(Outcome::Stop);
        }

        // Final block: hand the reassembled request up.
        let body = std::mem::replace(&mut status.buffer, Vec::new());
        msg.set_payload(body);
        exchange.request = msg.clone();

        Ok(Outcome::Continue)
    }

    /// Inbound responses (client role): request the next block of a
    /// Block1 upload or a Block2 download, delivering only the final
    /// assembled response.
    fn receive_response(
        &mut self,
        ctx: &mut LayerContext<'_>,
        msg: &mut Message,
        peer: SocketAddr,
    ) -> Result<Outcome, Error> {
        let key = (peer, msg.msg_token());

        // Block1 upload in progress: 2.31 Continue asks for the next block.
        let continue_upload = msg.msg_code() == MsgCode::SuccessContinue
            && ctx
                .store
                .get_mut(&key)
                .map(|exchange| exchange.block1.is_some())
                .unwrap_or(false);

        if continue_upload {
            let acked = msg.block1();

            let next = match ctx.store.get_mut(&key) {
                Some(exchange) => {
                    let status = exchange.block1.as_mut().expect("checked above");

                    // Late negotiation: mirror a smaller size chosen by
                    // the server, re-deriving the block number.
                    if let Some(acked) = acked {
                        if acked.szx() < status.szx {
                            let sent = (status.next_num as usize) << (status.szx as usize + 4);
                            status.szx = acked.szx();
                            status.next_num = (sent >> (status.szx as usize + 4)) as u32;
                        }
                    }

                    let num = status.next_num;
                    let more = !status.is_last(num);
                    let payload = status.slice(num).ok_or(Error::Blockwise)?.to_vec();
                    let szx = status.szx;
                    status.next_num += 1;

                    let mut next = status
                        .template
                        .as_ref()
                        .cloned()
                        .ok_or(Error::Blockwise)?;
                    next.set_msg_id(0);
                    next.set_payload(payload);
                    next.options_mut().replace(
                        option::BLOCK1,
                        BlockInfo::new(num, more, szx).ok_or(Error::Blockwise)?,
                    )?;
                    next
                }
                None => return Ok(Outcome::Continue),
            };

            ctx.effects.send_request(next, peer);
            return Ok(Outcome::Stop);
        }

        // Anything else ends a pending upload.
        if let Some(exchange) = ctx.store.get_mut(&key) {
            if exchange.block1.is_some() && msg.block1().is_some() {
                exchange.block1 = None;
            }
        }

        let block2 = match msg.block2() {
            Some(block2) => block2,
            None => return Ok(Outcome::Continue),
        };

        let exchange = match ctx.store.get_mut(&key) {
            Some(exchange) => exchange,
            None => return Ok(Outcome::Continue),
        };

        if exchange.block2.is_none() {
            exchange.block2 = Some(BlockwiseStatus::new(block2.szx(), ctx.now));
            ctx.timers.schedule(
                ctx.now + ctx.config.blockwise_status_lifetime,
                TimerKind::BlockwiseExpiry(key),
            );
        }

        let status = exchange.block2.as_mut().expect("just inserted");

        // Late negotiation: adopt the server's size on the first block.
        if status.buffer.is_empty() && status.next_num == 0 {
            status.szx = block2.szx();
        }

        if block2.szx() != status.szx {
            debug!("Block2 SZX changed mid-transfer from {}", peer);
            exchange.block2 = None;
            exchange.notify_failed(Error::Blockwise);
            exchange.complete(ctx.now);
            return Ok(Outcome::Stop);
        }

        if block2.num() < status.next_num {
            // A block we already hold.
            return Ok(Outcome::Stop);
        }

        if block2.num() > status.next_num {
            debug!(
                "Block2 gap from {}: got NUM:{}, expected {}",
                peer,
                block2.num(),
                status.next_num
            );
            exchange.block2 = None;
            exchange.notify_failed(Error::Blockwise);
            exchange.complete(ctx.now);
            return Ok(Outcome::Stop);
        }

        status.buffer.extend_from_slice(msg.payload());
        status.next_num += 1;

        if block2.more() {
            // Ask for the next block, reusing the token.
            let next_num = status.next_num;
            let szx = status.szx;
            let mut next = exchange.request.clone();
            next.set_msg_id(0);
            next.set_payload(Vec::new());
            next.options_mut().remove(OptionNumber::OBSERVE);
            next.options_mut().replace(
                option::BLOCK2,
                BlockInfo::new(next_num, false, szx).ok_or(Error::Blockwise)?,
            )?;
            ctx.effects.send_request(next, peer);
            return Ok(Outcome::Stop);
        }

        // Last block: deliver the assembled body.
        let body = std::mem::replace(&mut status.buffer, Vec::new());
        exchange.block2 = None;
        msg.set_payload(body);
        msg.options_mut().remove(OptionNumber::BLOCK2);
        msg.options_mut().remove(OptionNumber::SIZE2);

        Ok(Outcome::Continue)
    }

    fn timer(&mut self, ctx: &mut LayerContext<'_>, kind: &TimerKind) -> bool {
        let key = match kind {
            TimerKind::BlockwiseExpiry(key) => key,
            _ => return false,
        };

        if let Some(exchange) = ctx.store.get_mut(key) {
            let lifetime = ctx.config.blockwise_status_lifetime;

            if let Some(status) = exchange.block1.as_ref() {
                if ctx.now.duration_since(status.created) >= lifetime {
                    debug!("Block1 reassembly state expired for {:?}", key);
                    exchange.block1 = None;
                }
            }
            if let Some(status) = exchange.block2.as_ref() {
                if ctx.now.duration_since(status.created) >= lifetime {
                    debug!("Block2 reassembly state expired for {:?}", key);
                    exchange.block2 = None;
                }
            }
        }

        true
    }
}
