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

/// Value of an ETag or If-Match option: a short opaque validator the
/// server assigns to one representation of a resource.
///
/// Entity-tags share the inline byte-array shape of
/// [`MsgToken`](crate::message::MsgToken).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ETag {
    bytes: [u8; MAX_LEN],
    len: u8,
}

const MAX_LEN: usize = 8;

impl ETag {
    /// The longest entity-tag the option accepts.
    pub const MAX_LEN: usize = MAX_LEN;

    /// The zero-length entity-tag.
    pub const EMPTY: ETag = ETag {
        bytes: [0; MAX_LEN],
        len: 0,
    };

    /// Builds an entity-tag holding a copy of `value`.
    ///
    /// Panics when `value` is longer than [`ETag::MAX_LEN`].
    pub fn new(value: &[u8]) -> ETag {
        assert!(value.len() <= Self::MAX_LEN, "entity-tag too long");

        let mut etag = ETag::EMPTY;
        etag.bytes[..value.len()].copy_from_slice(value);
        etag.len = value.len() as u8;
        etag
    }

    /// Number of bytes in this entity-tag.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// True for the zero-length entity-tag.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entity-tag value.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }
}

impl Default for ETag {
    fn default() -> Self {
        ETag::EMPTY
    }
}

impl AsRef<[u8]> for ETag {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_bytes()
            .iter()
            .try_for_each(|b| write!(f, "{:02x}", b))
    }
}

impl From<&[u8]> for ETag {
    fn from(value: &[u8]) -> Self {
        ETag::new(value)
    }
}

impl From<u32> for ETag {
    /// Shortest big-endian encoding of `value`; zero becomes the empty
    /// entity-tag.
    fn from(value: u32) -> Self {
        let raw = value.to_be_bytes();
        let skip = raw.iter().take_while(|b| **b == 0).count();
        ETag::new(&raw[skip..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_basics() {
        assert!(ETag::EMPTY.is_empty());

        let etag = ETag::new(&[0xDE, 0xAD]);
        assert_eq!(2, etag.len());
        assert_eq!(&[0xDE, 0xAD], etag.as_bytes());
        assert_eq!("dead", etag.to_string());
        assert_eq!(etag, ETag::new(&[0xDE, 0xAD]));
    }

    #[test]
    fn from_u32_is_shortest() {
        assert!(ETag::from(0u32).is_empty());
        assert_eq!(&[0x01], ETag::from(1u32).as_bytes());
        assert_eq!(&[0x12, 0x34, 0x56], ETag::from(0x123456u32).as_bytes());
    }
}
