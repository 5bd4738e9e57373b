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

/// The CoAP message type, from the two-bit `T` field of the header.
#[derive(Debug, Copy, Eq, PartialEq, Clone, Hash)]
pub enum MsgType {
    /// Confirmable: retransmitted until acknowledged, reset, or given
    /// up on.
    Con = 0,

    /// Non-confirmable: best-effort, never acknowledged.
    Non = 1,

    /// Acknowledgement of a confirmable message, possibly carrying a
    /// piggybacked response.
    Ack = 2,

    /// Reset: the receiver could not or would not process the message.
    Rst = 3,
}

impl MsgType {
    /// The wire encodings, indexed by field value.
    const DECODE: [MsgType; 4] = [MsgType::Con, MsgType::Non, MsgType::Ack, MsgType::Rst];

    /// Decodes the two-bit type field, returning `None` for values
    /// outside it.
    pub fn try_from(raw: u8) -> Option<MsgType> {
        Self::DECODE.get(usize::from(raw)).copied()
    }

    /// Decodes the two-bit type field, panicking for values outside it.
    pub fn from(raw: u8) -> MsgType {
        MsgType::try_from(raw).expect("Invalid message type")
    }

    /// Returns true if this message type is confirmable (CON).
    pub fn is_con(self) -> bool {
        matches!(self, MsgType::Con)
    }

    /// Returns true if this message type is non-confirmable (NON).
    pub fn is_non(self) -> bool {
        matches!(self, MsgType::Non)
    }

    /// Returns true if this message type is an acknowledgement (ACK).
    pub fn is_ack(self) -> bool {
        matches!(self, MsgType::Ack)
    }

    /// Returns true if this message type is a reset (RST).
    pub fn is_rst(self) -> bool {
        matches!(self, MsgType::Rst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_round_trip() {
        for raw in 0u8..4 {
            let tt = MsgType::try_from(raw).unwrap();
            assert_eq!(raw, tt as u8);
        }
        assert_eq!(None, MsgType::try_from(4));
    }

    #[test]
    fn predicates() {
        assert!(MsgType::Con.is_con() && !MsgType::Con.is_non());
        assert!(MsgType::Non.is_non() && !MsgType::Non.is_ack());
        assert!(MsgType::Ack.is_ack() && !MsgType::Ack.is_rst());
        assert!(MsgType::Rst.is_rst() && !MsgType::Rst.is_con());
    }
}
