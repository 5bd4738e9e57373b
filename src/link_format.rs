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

//! Scanning of [IETF-RFC6690 CoAP link-formats], enough to walk the links
//! in a `/.well-known/core` response.
//!
//! [IETF-RFC6690 CoAP link-formats]: https://tools.ietf.org/html/rfc6690

use std::borrow::Cow;
use std::fmt::{Display, Write};
use std::iter::FusedIterator;

/// Resource Type attribute, an opaque string naming the
/// application-specific semantic type of a resource.
pub const LINK_ATTR_RESOURCE_TYPE: &'static str = "rt";

/// Interface Description attribute.
pub const LINK_ATTR_INTERFACE_DESCRIPTION: &'static str = "if";

/// Content-Format attribute, holding the numeric content-format code of
/// the target resource.
pub const LINK_ATTR_CONTENT_FORMAT: &'static str = "ct";

/// Maximum Size Estimate attribute.
pub const LINK_ATTR_MAXIMUM_SIZE_ESTIMATE: &'static str = "sz";

/// Observable attribute, present when the target resource supports
/// observation.
pub const LINK_ATTR_OBSERVABLE: &'static str = "obs";

/// Human-readable label describing the resource.
pub const LINK_ATTR_TITLE: &'static str = "title";

const LINK_SEPARATOR_CHAR: char = ',';
const ATTR_SEPARATOR_CHAR: char = ';';
const QUOTE_ESCAPE_CHAR: char = '\\';

/// Error emitted by [`LinkFormatParser`] for unparseable input.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ErrorLinkFormat;

/// Parsing iterator over the links of an `application/link-format`
/// document.
///
/// Each item is the URI-reference of one link along with a
/// [`LinkAttributeParser`] over its attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkFormatParser<'a> {
    inner: &'a str,
}

impl<'a> LinkFormatParser<'a> {
    /// Creates a new parser over the given link-format text.
    pub fn new(text: &'a str) -> LinkFormatParser<'a> {
        LinkFormatParser { inner: text }
    }
}

impl<'a> Iterator for LinkFormatParser<'a> {
    /// (uri-ref, link-attribute-iterator)
    type Item = Result<(&'a str, LinkAttributeParser<'a>), ErrorLinkFormat>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.is_empty() {
            return None;
        }

        let mut iter = self.inner.chars();

        // Proceed through whitespace until we get a '<'.
        loop {
            match iter.next() {
                Some(c) if c.is_ascii_whitespace() => continue,
                Some('<') => break,
                Some(_) => {
                    self.inner = "";
                    return Some(Err(ErrorLinkFormat));
                }
                None => {
                    self.inner = "";
                    return None;
                }
            }
        }

        let link_ref = iter.as_str();

        // Proceed through characters until we get a '>'.
        while let Some(c) = iter.next() {
            if c == '>' {
                break;
            }
        }

        let link_len = iter.as_str().as_ptr() as usize - link_ref.as_ptr() as usize;
        let link_ref = (&link_ref[..link_len]).trim_end_matches('>');

        let mut attrs = iter.as_str();

        // Skip to the end of the attributes, honoring quoting. The actual
        // attribute parsing is left to `LinkAttributeParser`.
        loop {
            match iter.next() {
                Some(LINK_SEPARATOR_CHAR) | None => {
                    break;
                }
                Some('"') => loop {
                    match iter.next() {
                        Some('"') | None => break,
                        Some(QUOTE_ESCAPE_CHAR) => {
                            iter.next();
                        }
                        _ => (),
                    }
                },
                _ => (),
            }
        }

        let attr_len = iter.as_str().as_ptr() as usize - attrs.as_ptr() as usize;
        attrs = (&attrs[..attr_len]).trim_end_matches(LINK_SEPARATOR_CHAR);

        self.inner = iter.as_str();
        Some(Ok((
            link_ref,
            LinkAttributeParser {
                inner: attrs.trim_matches(ATTR_SEPARATOR_CHAR),
            },
        )))
    }
}

/// Parsing iterator over the attributes of a single link, emitted by
/// [`LinkFormatParser`].
///
/// Yields `(key, value)` tuples where the value is an [`Unquote`] iterator.
/// This iterator is permissive: it makes a best effort and does not emit
/// errors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkAttributeParser<'a> {
    inner: &'a str,
}

impl<'a> Iterator for LinkAttributeParser<'a> {
    /// (key-ref, value-ref)
    type Item = (&'a str, Unquote<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.is_empty() {
            return None;
        }

        let mut iter = self.inner.chars();

        // Skip to the end of the attribute, honoring quoting.
        loop {
            match iter.next() {
                Some(ATTR_SEPARATOR_CHAR) | None => {
                    break;
                }
                Some('"') => loop {
                    match iter.next() {
                        Some('"') | None => break,
                        Some(QUOTE_ESCAPE_CHAR) => {
                            iter.next();
                        }
                        _ => (),
                    }
                },
                _ => (),
            }
        }

        let attr_len = iter.as_str().as_ptr() as usize - self.inner.as_ptr() as usize;
        let attr_str = &self.inner[..attr_len];

        self.inner = iter.as_str();

        let attr_str = attr_str.trim_end_matches(ATTR_SEPARATOR_CHAR);

        let (key, value) = if let Some(i) = attr_str.find('=') {
            let (key, value) = attr_str.split_at(i);
            (key, &value[1..])
        } else {
            (attr_str, "")
        };

        Some((key.trim(), Unquote::new(value.trim())))
    }
}

/// Character iterator which decodes a `quoted-string` attribute value.
/// Used by [`LinkAttributeParser`].
#[derive(Clone, Debug)]
pub struct Unquote<'a> {
    inner: std::str::Chars<'a>,
    state: UnquoteState,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum UnquoteState {
    NotStarted,
    NotQuoted,
    Quoted,
}

impl<'a> Eq for Unquote<'a> {}

impl<'a> PartialEq for Unquote<'a> {
    fn eq(&self, other: &Self) -> bool {
        let self_s = self.inner.as_str();
        let other_s = other.inner.as_str();
        self.state == other.state
            && self_s.as_ptr() == other_s.as_ptr()
            && self_s.len() == other_s.len()
    }
}

impl<'a> FusedIterator for Unquote<'a> {}

impl<'a> Display for Unquote<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.clone().try_for_each(|c| f.write_char(c))
    }
}

impl<'a> Unquote<'a> {
    /// Creates a new instance of the `Unquote` iterator from `quoted_str`.
    pub fn new(quoted_str: &'a str) -> Unquote<'a> {
        Unquote {
            inner: quoted_str.chars(),
            state: UnquoteState::NotStarted,
        }
    }

    /// Converts a fresh, unused instance of `Unquote` into the underlying raw string slice.
    ///
    /// Calling this method will panic if `next()` has been called.
    pub fn into_raw_str(self) -> &'a str {
        assert_eq!(self.state, UnquoteState::NotStarted);
        self.inner.as_str()
    }

    /// Returns the unquoted version of this string as a copy-on-write string.
    pub fn to_cow(&self) -> Cow<'a, str> {
        let str_ref = self.inner.as_str();
        if self.is_quoted() {
            if str_ref.find('\\').is_some() {
                Cow::from(self.to_string())
            } else {
                // Quoted but has no escapes.
                Cow::from(&str_ref[1..str_ref.len() - 1])
            }
        } else {
            Cow::from(str_ref)
        }
    }

    /// Returns true if the underlying string is quoted, false otherwise.
    pub fn is_quoted(&self) -> bool {
        match self.state {
            UnquoteState::NotStarted => self.inner.as_str().starts_with('"'),
            UnquoteState::NotQuoted => false,
            UnquoteState::Quoted => true,
        }
    }
}

impl<'a> Iterator for Unquote<'a> {
    type Item = char;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.state {
                UnquoteState::NotStarted => match self.inner.next() {
                    Some('"') => {
                        self.state = UnquoteState::Quoted;
                        continue;
                    }
                    c => {
                        self.state = UnquoteState::NotQuoted;
                        c
                    }
                },
                UnquoteState::NotQuoted => self.inner.next(),
                UnquoteState::Quoted => match self.inner.next() {
                    Some('"') => {
                        // Finished; make ourselves empty so we stay fused.
                        self.inner = "".chars();
                        None
                    }
                    Some(QUOTE_ESCAPE_CHAR) => self.inner.next(),
                    c => c,
                },
            };
        }
    }
}
