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

use std::fmt::{Display, Formatter};

/// Decoded form of a Block1 or Block2 option value.
///
/// On the wire the three fields pack into a single uint as
/// `NUM << 4 | M << 3 | SZX`; here they are kept apart and only packed
/// at the option boundary. `SZX` encodes the block size as `2^(SZX+4)`
/// bytes, so 0..=6 covers 16 through 1024 and 7 is reserved.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockInfo {
    num: u32,
    more: bool,
    szx: u8,
}

impl BlockInfo {
    /// Largest representable block number (20 bits).
    pub const NUM_MAX: u32 = (1 << 20) - 1;

    /// Largest legal size exponent; 7 is reserved by the protocol.
    pub const SZX_MAX: u8 = 6;

    /// Builds a block descriptor, refusing out-of-range fields.
    pub fn new(num: u32, more: bool, szx: u8) -> Option<BlockInfo> {
        if num > Self::NUM_MAX || szx > Self::SZX_MAX {
            return None;
        }
        Some(BlockInfo { num, more, szx })
    }

    /// Unpacks a raw option value, refusing the reserved size exponent
    /// and overlong block numbers.
    pub fn from_raw(raw: u32) -> Option<BlockInfo> {
        BlockInfo::new(raw >> 4, raw & 0b1000 != 0, (raw & 0b111) as u8)
    }

    /// Packs this descriptor back into its wire representation.
    pub fn to_raw(&self) -> u32 {
        (self.num << 4) | ((self.more as u32) << 3) | u32::from(self.szx)
    }

    /// The exponent of the largest block size not exceeding `size`
    /// bytes, clamped to the legal 16..=1024 range.
    pub fn szx_for_size(size: usize) -> u8 {
        let mut szx = Self::SZX_MAX;
        while szx > 0 && Self::size_for_szx(szx) > size {
            szx -= 1;
        }
        szx
    }

    fn size_for_szx(szx: u8) -> usize {
        1 << (usize::from(szx) + 4)
    }

    /// Block number.
    pub fn num(&self) -> u32 {
        self.num
    }

    /// More-flag: set when further blocks follow this one.
    pub fn more(&self) -> bool {
        self.more
    }

    /// Size exponent.
    pub fn szx(&self) -> u8 {
        self.szx
    }

    /// Block size in bytes.
    pub fn size(&self) -> usize {
        Self::size_for_szx(self.szx)
    }

    /// Copy of this descriptor with the more-flag forced to `more`.
    pub fn with_more(&self, more: bool) -> BlockInfo {
        BlockInfo { more, ..*self }
    }
}

impl Display for BlockInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}@{}B",
            self.num,
            if self.more { "+" } else { "" },
            self.size()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        // NUM=2, M=1, SZX=5 from RFC 7959's worked examples.
        let block = BlockInfo::from_raw(0x2D).unwrap();
        assert_eq!(2, block.num());
        assert!(block.more());
        assert_eq!(5, block.szx());
        assert_eq!(512, block.size());
        assert_eq!(0x2D, block.to_raw());

        for raw in &[0u32, 0x2D, 0x10, (BlockInfo::NUM_MAX << 4) | 0b1110] {
            assert_eq!(Some(*raw), BlockInfo::from_raw(*raw).map(|b| b.to_raw()));
        }
    }

    #[test]
    fn rejects_out_of_range() {
        // SZX=7 is reserved.
        assert_eq!(None, BlockInfo::from_raw(0x27));
        assert_eq!(None, BlockInfo::new(0, false, 7));

        assert_eq!(None, BlockInfo::new(BlockInfo::NUM_MAX + 1, false, 0));
        assert!(BlockInfo::new(BlockInfo::NUM_MAX, true, 6).is_some());

        // A raw value whose number field overflows 20 bits.
        assert_eq!(None, BlockInfo::from_raw(u32::max_value()));
    }

    #[test]
    fn size_exponents() {
        assert_eq!(5, BlockInfo::szx_for_size(512));
        assert_eq!(6, BlockInfo::szx_for_size(1024));
        assert_eq!(6, BlockInfo::szx_for_size(4096));
        assert_eq!(4, BlockInfo::szx_for_size(400));
        assert_eq!(0, BlockInfo::szx_for_size(16));
        assert_eq!(0, BlockInfo::szx_for_size(1));

        assert_eq!(16, BlockInfo::new(0, false, 0).unwrap().size());
        assert_eq!(1024, BlockInfo::new(0, false, 6).unwrap().size());
    }

    #[test]
    fn with_more() {
        let block = BlockInfo::new(3, false, 5).unwrap();
        assert!(block.with_more(true).more());
        assert!(!block.with_more(true).with_more(false).more());
        assert_eq!(block.num(), block.with_more(true).num());
        assert_eq!(block.szx(), block.with_more(true).szx());
    }

    #[test]
    fn display() {
        assert_eq!("2+@512B", BlockInfo::from_raw(0x2D).unwrap().to_string());
        assert_eq!("0@16B", BlockInfo::new(0, false, 0).unwrap().to_string());
    }
}
