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

/// Type representing a CoAP option number.
#[derive(Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd)]
pub struct OptionNumber(pub u16);

impl OptionNumber {
    /// IF_MATCH option.
    pub const IF_MATCH: OptionNumber = OptionNumber(1);

    /// URI_HOST option.
    pub const URI_HOST: OptionNumber = OptionNumber(3);

    /// ETAG option.
    pub const ETAG: OptionNumber = OptionNumber(4);

    /// IF_NONE_MATCH option.
    pub const IF_NONE_MATCH: OptionNumber = OptionNumber(5);

    /// OBSERVE option.
    pub const OBSERVE: OptionNumber = OptionNumber(6);

    /// URI_PORT option.
    pub const URI_PORT: OptionNumber = OptionNumber(7);

    /// LOCATION_PATH option.
    pub const LOCATION_PATH: OptionNumber = OptionNumber(8);

    /// URI_PATH option.
    pub const URI_PATH: OptionNumber = OptionNumber(11);

    /// CONTENT_FORMAT option.
    pub const CONTENT_FORMAT: OptionNumber = OptionNumber(12);

    /// MAX_AGE option.
    pub const MAX_AGE: OptionNumber = OptionNumber(14);

    /// URI_QUERY option.
    pub const URI_QUERY: OptionNumber = OptionNumber(15);

    /// ACCEPT option.
    pub const ACCEPT: OptionNumber = OptionNumber(17);

    /// LOCATION_QUERY option.
    pub const LOCATION_QUERY: OptionNumber = OptionNumber(20);

    /// BLOCK2 option.
    pub const BLOCK2: OptionNumber = OptionNumber(23);

    /// BLOCK1 option.
    pub const BLOCK1: OptionNumber = OptionNumber(27);

    /// SIZE2 option.
    pub const SIZE2: OptionNumber = OptionNumber(28);

    /// PROXY_URI option.
    pub const PROXY_URI: OptionNumber = OptionNumber(35);

    /// PROXY_SCHEME option.
    pub const PROXY_SCHEME: OptionNumber = OptionNumber(39);

    /// SIZE1 option.
    pub const SIZE1: OptionNumber = OptionNumber(60);

    /// Returns true if this option number is critical, false if it is elective.
    ///
    /// A recipient that does not recognize a critical option must reject the
    /// message rather than ignore the option.
    pub fn is_critical(self) -> bool {
        const FLAG_CRITICAL: u16 = 1;
        self.0 & FLAG_CRITICAL == FLAG_CRITICAL
    }

    /// Returns true if this option is "un-safe" to forward.
    pub fn is_un_safe(self) -> bool {
        const FLAG_UN_SAFE: u16 = 2;
        self.0 & FLAG_UN_SAFE == FLAG_UN_SAFE
    }

    /// Returns true if this option is a "no-cache-key" option.
    pub fn is_no_cache_key(self) -> bool {
        const FLAG_NO_CACHE_KEY_MASK: u16 = 0x1e;
        const FLAG_NO_CACHE_KEY_MAGIC: u16 = 0x1c;
        self.0 & FLAG_NO_CACHE_KEY_MASK == FLAG_NO_CACHE_KEY_MAGIC
    }

    /// Returns the declared value format for this option number.
    ///
    /// Unknown option numbers are treated as opaque.
    pub fn value_format(self) -> OptionFormat {
        match self {
            OptionNumber::IF_MATCH => OptionFormat::Opaque,
            OptionNumber::URI_HOST => OptionFormat::String,
            OptionNumber::ETAG => OptionFormat::Opaque,
            OptionNumber::IF_NONE_MATCH => OptionFormat::Empty,
            OptionNumber::OBSERVE => OptionFormat::Uint,
            OptionNumber::URI_PORT => OptionFormat::Uint,
            OptionNumber::LOCATION_PATH => OptionFormat::String,
            OptionNumber::URI_PATH => OptionFormat::String,
            OptionNumber::CONTENT_FORMAT => OptionFormat::Uint,
            OptionNumber::MAX_AGE => OptionFormat::Uint,
            OptionNumber::URI_QUERY => OptionFormat::String,
            OptionNumber::ACCEPT => OptionFormat::Uint,
            OptionNumber::LOCATION_QUERY => OptionFormat::String,
            OptionNumber::BLOCK2 => OptionFormat::Uint,
            OptionNumber::BLOCK1 => OptionFormat::Uint,
            OptionNumber::SIZE2 => OptionFormat::Uint,
            OptionNumber::PROXY_URI => OptionFormat::String,
            OptionNumber::PROXY_SCHEME => OptionFormat::String,
            OptionNumber::SIZE1 => OptionFormat::Uint,
            OptionNumber(_) => OptionFormat::Opaque,
        }
    }

    /// Returns the declared `(min, max)` value length in bytes for this
    /// option number. Values outside these bounds are rejected by the codec.
    ///
    /// Unknown option numbers allow any length up to 65535.
    pub fn value_len_bounds(self) -> (usize, usize) {
        match self {
            OptionNumber::IF_MATCH => (0, 8),
            OptionNumber::URI_HOST => (1, 255),
            OptionNumber::ETAG => (1, 8),
            OptionNumber::IF_NONE_MATCH => (0, 0),
            OptionNumber::OBSERVE => (0, 3),
            OptionNumber::URI_PORT => (0, 2),
            OptionNumber::LOCATION_PATH => (0, 255),
            OptionNumber::URI_PATH => (0, 255),
            OptionNumber::CONTENT_FORMAT => (0, 2),
            OptionNumber::MAX_AGE => (0, 4),
            OptionNumber::URI_QUERY => (0, 255),
            OptionNumber::ACCEPT => (0, 2),
            OptionNumber::LOCATION_QUERY => (0, 255),
            OptionNumber::BLOCK2 => (0, 3),
            OptionNumber::BLOCK1 => (0, 3),
            OptionNumber::SIZE2 => (0, 4),
            OptionNumber::PROXY_URI => (1, 1034),
            OptionNumber::PROXY_SCHEME => (1, 255),
            OptionNumber::SIZE1 => (0, 4),
            OptionNumber(_) => (0, 65535),
        }
    }

    /// Returns the default value for this option, if it declares one.
    pub fn default_value(self) -> Option<u32> {
        match self {
            OptionNumber::MAX_AGE => Some(60),
            _ => None,
        }
    }

    /// Returns true if multiple instances of this option are allowed, false if only one instance
    /// is allowed.
    pub fn is_repeatable(self) -> bool {
        match self {
            OptionNumber::IF_MATCH => true,
            OptionNumber::URI_HOST => false,
            OptionNumber::ETAG => true,
            OptionNumber::IF_NONE_MATCH => false,
            OptionNumber::OBSERVE => false,
            OptionNumber::URI_PORT => false,
            OptionNumber::LOCATION_PATH => true,
            OptionNumber::URI_PATH => true,
            OptionNumber::CONTENT_FORMAT => false,
            OptionNumber::MAX_AGE => false,
            OptionNumber::URI_QUERY => true,
            OptionNumber::ACCEPT => false,
            OptionNumber::LOCATION_QUERY => true,
            OptionNumber::BLOCK2 => false,
            OptionNumber::BLOCK1 => false,
            OptionNumber::SIZE2 => false,
            OptionNumber::PROXY_URI => false,
            OptionNumber::PROXY_SCHEME => false,
            OptionNumber::SIZE1 => false,

            // We default to true for unknown options.
            OptionNumber(_) => true,
        }
    }

    /// Attempts to return a `Some(&'static str)` containing the name of the option.
    ///
    /// If the option number isn't recognized, this method returns `None`.
    pub fn static_name(self) -> Option<&'static str> {
        match self {
            OptionNumber::IF_MATCH => Some("If-Match"),
            OptionNumber::URI_HOST => Some("Uri-Host"),
            OptionNumber::ETAG => Some("ETag"),
            OptionNumber::IF_NONE_MATCH => Some("If-None-Match"),
            OptionNumber::OBSERVE => Some("Observe"),
            OptionNumber::URI_PORT => Some("Uri-Port"),
            OptionNumber::LOCATION_PATH => Some("Location-Path"),
            OptionNumber::URI_PATH => Some("Uri-Path"),
            OptionNumber::CONTENT_FORMAT => Some("Content-Format"),
            OptionNumber::MAX_AGE => Some("Max-Age"),
            OptionNumber::URI_QUERY => Some("Uri-Query"),
            OptionNumber::ACCEPT => Some("Accept"),
            OptionNumber::LOCATION_QUERY => Some("Location-Query"),
            OptionNumber::BLOCK2 => Some("Block2"),
            OptionNumber::BLOCK1 => Some("Block1"),
            OptionNumber::SIZE2 => Some("Size2"),
            OptionNumber::PROXY_URI => Some("Proxy-Uri"),
            OptionNumber::PROXY_SCHEME => Some("Proxy-Scheme"),
            OptionNumber::SIZE1 => Some("Size1"),
            _ => None,
        }
    }

    /// Writes out the name of this option along with a text debugging description of the value
    /// associated with this option.
    pub fn fmt_with_value(self, f: &mut std::fmt::Formatter<'_>, value: &[u8]) -> std::fmt::Result {
        write!(f, "{}", self)?;
        match self {
            OptionNumber::BLOCK1 | OptionNumber::BLOCK2 => {
                match try_decode_u32(value).and_then(BlockInfo::from_raw) {
                    Some(block) => write!(f, ":{}", block)?,
                    None => f.write_str(":ERR")?,
                }
            }
            OptionNumber::CONTENT_FORMAT | OptionNumber::ACCEPT => {
                if let Some(i) = try_decode_u16(value) {
                    write!(f, ":{}", ContentFormat(i))?;
                } else {
                    f.write_str(":ERR")?;
                }
            }
            _ => match self.value_format() {
                OptionFormat::Opaque => {
                    if !value.is_empty() {
                        f.write_str(":")?;
                        for b in value {
                            write!(f, "{:02X}", b)?;
                        }
                    }
                }
                OptionFormat::Empty => {}
                OptionFormat::Uint => {
                    if let Some(i) = try_decode_u32(value) {
                        write!(f, ":{}", i)?;
                    } else {
                        f.write_str(":ERR")?;
                    }
                }
                OptionFormat::String => {
                    if let Ok(s) = std::str::from_utf8(value) {
                        write!(f, ":{:?}", s)?;
                    } else {
                        f.write_str(":ERR")?;
                    }
                }
            },
        }

        Ok(())
    }
}

impl core::fmt::Display for OptionNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(name) = self.static_name() {
            f.write_str(name)
        } else {
            // Write out a descriptive identifier.
            if self.is_critical() {
                f.write_str("Crit-")?;
            } else {
                f.write_str("Opt-")?;
            }

            if self.is_un_safe() {
                f.write_str("UnSafe-")?;
            }

            if self.is_no_cache_key() {
                f.write_str("NoCacheKey-")?;
            }

            write!(f, "{}", self.0)
        }
    }
}

impl core::fmt::Debug for OptionNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.0, self)
    }
}

impl core::ops::Add<u16> for OptionNumber {
    type Output = Self;
    fn add(self, other: u16) -> Self {
        OptionNumber(self.0 + other)
    }
}

impl core::ops::Sub<OptionNumber> for OptionNumber {
    type Output = u16;
    fn sub(self, other: OptionNumber) -> u16 {
        assert!(self.0 >= other.0);
        self.0 - other.0
    }
}

impl core::cmp::PartialOrd<u16> for OptionNumber {
    fn partial_cmp(&self, other: &u16) -> Option<core::cmp::Ordering> {
        Some(self.0.cmp(other))
    }
}

impl core::cmp::PartialEq<u16> for OptionNumber {
    fn eq(&self, other: &u16) -> bool {
        self.0.eq(other)
    }
}

impl Default for OptionNumber {
    fn default() -> Self {
        OptionNumber(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_number_flags() {
        // Critical options have odd numbers.
        assert!(OptionNumber::IF_MATCH.is_critical());
        assert!(OptionNumber::URI_PATH.is_critical());
        assert!(OptionNumber::BLOCK2.is_critical());
        assert!(!OptionNumber::ETAG.is_critical());
        assert!(!OptionNumber::CONTENT_FORMAT.is_critical());

        assert!(OptionNumber::URI_HOST.is_un_safe());
        assert!(!OptionNumber::ETAG.is_un_safe());

        assert!(OptionNumber::SIZE1.is_no_cache_key());
        assert!(OptionNumber::SIZE2.is_no_cache_key());
        assert!(!OptionNumber::URI_PATH.is_no_cache_key());
    }

    #[test]
    fn option_number_semantics() {
        assert!(OptionNumber::URI_PATH.is_repeatable());
        assert!(!OptionNumber::OBSERVE.is_repeatable());
        assert_eq!(OptionFormat::Uint, OptionNumber::BLOCK1.value_format());
        assert_eq!((1, 255), OptionNumber::URI_HOST.value_len_bounds());
        assert_eq!((0, 65535), OptionNumber(65000).value_len_bounds());
        assert_eq!(Some(60), OptionNumber::MAX_AGE.default_value());
        assert_eq!(None, OptionNumber::URI_PATH.default_value());
    }
}
