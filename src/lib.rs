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

//! An asynchronous implementation of the core of the Constrained
//! Application Protocol (CoAP, [IETF-RFC7252]): the message codec, the
//! option model, and the exchange engine that layers reliability,
//! block-wise transfer ([IETF-RFC7959]), and observation
//! ([IETF-RFC7641]) over a datagram socket.
//!
//! [IETF-RFC7252]: https://tools.ietf.org/html/rfc7252
//! [IETF-RFC7959]: https://tools.ietf.org/html/rfc7959
//! [IETF-RFC7641]: https://tools.ietf.org/html/rfc7641
//!
//! ## Design
//!
//! Messages travel through an explicit pipeline of layers — observe over
//! block-wise over reliability over the matcher — top-down on send and
//! bottom-up on receive. All engine state lives on per-exchange records
//! indexed by `(peer, message-id)` and `(peer, token)`, and every timer
//! (retransmission, deduplication sweep, observe re-registration,
//! block-wise lifetime) is an entry in one monotonic queue owned by the
//! endpoint.
//!
//! The [`datagram`] module binds the pipeline to a [`datagram socket
//! contract`][datagram::DatagramSocket] with implementations over the
//! standard library UDP socket, a loopback interface, and a black hole;
//! back-ends for real async runtimes implement the same trait.
//!
//! ## Example
//!
//! The loopback socket makes the endpoint its own peer, which is enough
//! to see a full request/response round trip:
//!
//! ```
//! use coap_endpoint::prelude::*;
//! use coap_endpoint::datagram::LoopbackSocket;
//! use futures::executor::block_on;
//! use futures::future::{select, Either};
//! use futures::pin_mut;
//!
//! let endpoint = Endpoint::new(LoopbackSocket::new());
//!
//! let (request, dest) = endpoint
//!     .request_from_uri(MsgCode::MethodGet, "coap://localhost/time")
//!     .expect("valid URI");
//!
//! let future = endpoint.send(request, dest);
//!
//! // One task must drive the receive loop; here it doubles as the
//! // server answering our own request.
//! let receive = endpoint.receive_loop(|_request, _from| {
//!     let mut response = Message::response(MsgType::Non, MsgCode::SuccessContent);
//!     response.set_payload(&b"12:34"[..]);
//!     Some(response)
//! });
//! pin_mut!(receive);
//!
//! let response = match block_on(select(future, receive)) {
//!     Either::Left((response, _)) => response.expect("request failed"),
//!     Either::Right(_) => unreachable!("receive loop ended"),
//! };
//!
//! assert_eq!(Some("12:34"), response.payload_as_str());
//! ```

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![warn(clippy::all)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod message;
use message::*;

pub mod option;
use option::*;

mod error;
pub use error::*;

mod config;
pub use config::Config;

mod content_format;
pub use content_format::ContentFormat;

mod block;
pub use block::*;

mod etag;
pub use etag::ETag;

pub mod link_format;

mod observer;
pub use observer::ExchangeObserver;

mod util;
use util::*;

mod exchange;
mod layer;
mod timer;

pub mod datagram;

/// The types most users need, in one import.
pub mod prelude {
    pub use super::datagram::{DatagramSocket, Endpoint, Observation};
    pub use super::message::{Message, MsgCode, MsgCodeClass, MsgId, MsgToken, MsgType};
    pub use super::option::{self, OptionKey, OptionNumber, Options};
    pub use super::BlockInfo;
    pub use super::Config;
    pub use super::ContentFormat;
    pub use super::ETag;
    pub use super::Error;
    pub use super::ExchangeObserver;
}
