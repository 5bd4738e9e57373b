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

use super::*;
use core::fmt::{Display, Formatter};

/// Renders a [`Message`] as a single human-readable line, for logs and
/// test diagnostics.
#[derive(Debug)]
pub struct MessageDisplay<'a>(pub &'a Message);

impl<'a> Display for MessageDisplay<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "<{:?} {}", self.0.msg_type(), self.0.msg_code())?;
        write!(f, " MID:{:04X}", self.0.msg_id())?;

        let token = self.0.msg_token();
        if !token.is_empty() {
            write!(f, " TOK:{}", token)?;
        }

        for (number, bytes) in self.0.options().iter() {
            f.write_str(" ")?;
            number.fmt_with_value(f, bytes)?;
        }

        let payload = self.0.payload();
        if !payload.is_empty() {
            let printable = match self.0.content_format() {
                Some(fmt) => fmt.is_printable(),
                None => true,
            };

            if let Some(payload_str) = Some(payload)
                .filter(|_| printable)
                .and_then(|p| std::str::from_utf8(p).ok())
            {
                write!(f, " {:?}", payload_str)?;
            } else {
                write!(f, " {} bytes", payload.len())?;
            }
        }

        write!(f, ">")
    }
}

/// Helper struct for formatting a raw CoAP datagram for display.
#[derive(Copy, Clone)]
pub struct CoapByteDisplayFormatter<'buf>(pub &'buf [u8]);

impl<'buf> std::fmt::Display for CoapByteDisplayFormatter<'buf> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Message::from_bytes(self.0) {
            Ok(msg) => MessageDisplay(&msg).fmt(f),
            Err(_) => write!(f, "<CORRUPTED {:02x?}>", self.0),
        }
    }
}

impl<'buf> std::fmt::Debug for CoapByteDisplayFormatter<'buf> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option;

    #[test]
    fn display_request() {
        let mut msg = Message::request(MsgType::Con, MsgCode::MethodGet);
        msg.set_msg_id(0x1234);
        msg.set_msg_token(MsgToken::new(&[0xAB]));
        msg.options_mut().insert(option::URI_PATH, "time").unwrap();

        assert_eq!(
            "<Con 0.01 MID:1234 TOK:AB Uri-Path:\"time\">",
            MessageDisplay(&msg).to_string()
        );
    }

    #[test]
    fn display_response() {
        let mut msg = Message::response(MsgType::Ack, MsgCode::SuccessContent);
        msg.set_msg_id(0x1234);
        msg.set_msg_token(MsgToken::new(&[0xAB]));
        msg.set_payload(&b"42"[..]);

        assert_eq!(
            "<Ack 2.05 MID:1234 TOK:AB \"42\">",
            MessageDisplay(&msg).to_string()
        );
    }
}
