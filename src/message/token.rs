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

/// An opaque message correlator of zero to eight bytes, linking
/// responses and notifications to the request that caused them.
///
/// Tokens are small enough to live inline, so the type is `Copy` and
/// doubles as a map key in the exchange store.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MsgToken {
    bytes: [u8; MAX_LEN],
    len: u8,
}

const MAX_LEN: usize = 8;

impl MsgToken {
    /// The longest token the wire format can carry.
    pub const MAX_LEN: usize = MAX_LEN;

    /// The zero-length token.
    pub const EMPTY: MsgToken = MsgToken {
        bytes: [0; MAX_LEN],
        len: 0,
    };

    /// Builds a token holding a copy of `value`.
    ///
    /// Panics when `value` is longer than [`MsgToken::MAX_LEN`].
    pub fn new(value: &[u8]) -> MsgToken {
        assert!(value.len() <= Self::MAX_LEN, "token too long");

        let mut token = MsgToken::EMPTY;
        token.bytes[..value.len()].copy_from_slice(value);
        token.len = value.len() as u8;
        token
    }

    /// Number of bytes in this token.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// True for the zero-length token.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The token value.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }
}

impl Default for MsgToken {
    fn default() -> Self {
        MsgToken::EMPTY
    }
}

impl AsRef<[u8]> for MsgToken {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Display for MsgToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_bytes()
            .iter()
            .try_for_each(|b| write!(f, "{:02X}", b))
    }
}

impl From<&[u8]> for MsgToken {
    fn from(value: &[u8]) -> Self {
        MsgToken::new(value)
    }
}

impl From<u32> for MsgToken {
    /// Shortest big-endian encoding of `value`; zero becomes the empty
    /// token.
    fn from(value: u32) -> Self {
        let raw = value.to_be_bytes();
        let skip = raw.iter().take_while(|b| **b == 0).count();
        MsgToken::new(&raw[skip..])
    }
}

impl From<u64> for MsgToken {
    /// Shortest big-endian encoding of `value`, but always at least one
    /// byte, so allocator seeds yield a usable correlator.
    fn from(value: u64) -> Self {
        let raw = value.to_be_bytes();
        let skip = raw.iter().take_while(|b| **b == 0).count();
        MsgToken::new(&raw[skip.min(raw.len() - 1)..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_basics() {
        assert!(MsgToken::EMPTY.is_empty());
        assert_eq!(0, MsgToken::EMPTY.len());

        let token = MsgToken::new(&[0xAB]);
        assert_eq!(1, token.len());
        assert_eq!(&[0xAB], token.as_bytes());
        assert_eq!("AB", token.to_string());
    }

    #[test]
    fn from_u32_is_shortest() {
        assert!(MsgToken::from(0u32).is_empty());
        assert_eq!(&[0x45], MsgToken::from(0x45u32).as_bytes());
        assert_eq!(&[0x20, 0x21], MsgToken::from(0x2021u32).as_bytes());
        assert_eq!(4, MsgToken::from(0x0100_0000u32).len());
    }

    #[test]
    fn from_u64_keeps_one_byte() {
        let token = MsgToken::from(0x0102_0304_0506_0708u64);
        assert_eq!(8, token.len());
        assert_eq!(&[1, 2, 3, 4, 5, 6, 7, 8], token.as_bytes());

        // A zero seed still yields a one-byte token so the token stays
        // usable as a correlator.
        assert_eq!(&[0x00], MsgToken::from(0u64).as_bytes());
    }
}
