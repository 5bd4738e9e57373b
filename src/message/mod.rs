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

//! Types related to building, parsing, and encoding CoAP messages.

use super::*;

/// Type for representing a CoAP message id.
pub type MsgId = u16;

mod msg_code;
pub use msg_code::MsgCode;
pub use msg_code::MsgCodeClass;

mod msg_type;
pub use msg_type::MsgType;

mod token;
pub use token::*;

mod display;
pub use display::CoapByteDisplayFormatter;
pub use display::MessageDisplay;

pub mod codec;

pub(crate) const COAP_MSG_VER_MASK: u8 = 0b11000000;
pub(crate) const COAP_MSG_VER_OFFS: u8 = 6;
pub(crate) const COAP_MSG_T_MASK: u8 = 0b00110000;
pub(crate) const COAP_MSG_T_OFFS: u8 = 4;
pub(crate) const COAP_MSG_TKL_MASK: u8 = 0b00001111;

/// A single CoAP message: the common base for requests, responses, and
/// empty messages.
///
/// The message owns its option list and payload. Serialization to and from
/// the RFC 7252 wire format lives in [`codec`], reachable through
/// [`Message::from_bytes`] and [`Message::to_bytes`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    msg_type: MsgType,
    msg_code: MsgCode,
    msg_id: MsgId,
    token: MsgToken,
    options: Options,
    payload: Vec<u8>,
}

impl Default for Message {
    fn default() -> Self {
        Message::new(MsgType::Con, MsgCode::Empty)
    }
}

impl Message {
    /// The CoAP protocol version this library speaks.
    pub const VERSION: u8 = 1;

    /// Creates a new message of the given type and code, with no id, token,
    /// options, or payload.
    pub fn new(msg_type: MsgType, msg_code: MsgCode) -> Message {
        Message {
            msg_type,
            msg_code,
            msg_id: 0,
            token: MsgToken::EMPTY,
            options: Options::new(),
            payload: Vec::new(),
        }
    }

    /// Creates a new request message. `msg_type` must be `Con` or `Non`.
    pub fn request(msg_type: MsgType, method: MsgCode) -> Message {
        debug_assert!(method.is_method());
        Message::new(msg_type, method)
    }

    /// Creates a new response message.
    pub fn response(msg_type: MsgType, code: MsgCode) -> Message {
        debug_assert!(code.is_response());
        Message::new(msg_type, code)
    }

    /// Creates an empty acknowledgement for the given message id.
    pub fn empty_ack(msg_id: MsgId) -> Message {
        let mut msg = Message::new(MsgType::Ack, MsgCode::Empty);
        msg.msg_id = msg_id;
        msg
    }

    /// Creates a reset message for the given message id.
    pub fn reset(msg_id: MsgId) -> Message {
        let mut msg = Message::new(MsgType::Rst, MsgCode::Empty);
        msg.msg_id = msg_id;
        msg
    }

    /// Creates a CoAP ping probe: a confirmable message with the empty code.
    /// A live peer answers it with a reset.
    pub fn ping() -> Message {
        Message::new(MsgType::Con, MsgCode::Empty)
    }

    /// Gets the message type for this message.
    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    /// Gets the message code for this message.
    pub fn msg_code(&self) -> MsgCode {
        self.msg_code
    }

    /// Gets the message id for this message.
    pub fn msg_id(&self) -> MsgId {
        self.msg_id
    }

    /// Gets the message token for this message.
    pub fn msg_token(&self) -> MsgToken {
        self.token
    }

    /// Sets the message type.
    pub fn set_msg_type(&mut self, msg_type: MsgType) {
        self.msg_type = msg_type;
    }

    /// Sets the message code.
    pub fn set_msg_code(&mut self, msg_code: MsgCode) {
        self.msg_code = msg_code;
    }

    /// Sets the message id.
    pub fn set_msg_id(&mut self, msg_id: MsgId) {
        self.msg_id = msg_id;
    }

    /// Sets the message token.
    pub fn set_msg_token(&mut self, token: MsgToken) {
        self.token = token;
    }

    /// Borrows the option collection.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Mutably borrows the option collection.
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// Gets the payload as a byte slice.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Gets the payload as a string slice, if it is valid UTF-8.
    pub fn payload_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Replaces the payload.
    pub fn set_payload<B: Into<Vec<u8>>>(&mut self, payload: B) {
        self.payload = payload.into();
    }

    /// Takes the payload out of the message, leaving it empty.
    pub fn take_payload(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.payload, Vec::new())
    }

    /// Returns true if this message carries a request method code.
    pub fn is_request(&self) -> bool {
        self.msg_code.is_method()
    }

    /// Returns true if this message carries a response code.
    pub fn is_response(&self) -> bool {
        self.msg_code.is_response()
    }

    /// Returns true if this message has the empty code.
    pub fn is_empty(&self) -> bool {
        self.msg_code.is_empty()
    }

    /// Indicates the content format of the payload, if specified.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.options.get(option::CONTENT_FORMAT)
    }

    /// Indicates the content format the sender will accept in the response,
    /// if specified.
    pub fn accept(&self) -> Option<ContentFormat> {
        self.options.get(option::ACCEPT)
    }

    /// Returns the value of the Block1 option for this message, if any.
    pub fn block1(&self) -> Option<BlockInfo> {
        self.options.get(option::BLOCK1)
    }

    /// Returns the value of the Block2 option for this message, if any.
    pub fn block2(&self) -> Option<BlockInfo> {
        self.options.get(option::BLOCK2)
    }

    /// Returns the value of the Observe option for this message, if any.
    pub fn observe(&self) -> Option<u32> {
        self.options.get(option::OBSERVE)
    }

    /// Returns the value of the Max-Age option, falling back to the
    /// option's declared default of 60 seconds.
    pub fn max_age(&self) -> u32 {
        self.options
            .get(option::MAX_AGE)
            .or_else(|| OptionNumber::MAX_AGE.default_value())
            .unwrap_or(0)
    }

    /// Appends the standard option decomposition of a `coap://` URI's
    /// host, port, path, and query to this message.
    ///
    /// `host`/`port` become Uri-Host/Uri-Port when given, path segments
    /// become repeated Uri-Path options, and `k=v` query pairs become
    /// repeated Uri-Query options.
    pub fn append_uri_options(
        &mut self,
        host: Option<&str>,
        port: Option<u16>,
        path: &str,
        query: Option<&str>,
    ) -> Result<(), Error> {
        if let Some(host) = host {
            self.options.insert(option::URI_HOST, host)?;
        }
        if let Some(port) = port {
            self.options.insert(option::URI_PORT, port)?;
        }
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.options.insert(option::URI_PATH, segment)?;
        }
        if let Some(query) = query {
            for item in query.split('&').filter(|s| !s.is_empty()) {
                self.options.insert(option::URI_QUERY, item)?;
            }
        }
        Ok(())
    }

    /// Parses a message from its wire representation. See [`codec::decode_message`].
    pub fn from_bytes(buffer: &[u8]) -> Result<Message, Error> {
        codec::decode_message(buffer)
    }

    /// Serializes this message to its wire representation. See [`codec::encode_message`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        codec::encode_message(self)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        MessageDisplay(self).fmt(f)
    }
}
