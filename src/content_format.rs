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

use std::borrow::Cow;

/// A type for representing a CoAP Content-Format value.
#[derive(Debug, Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd)]
pub struct ContentFormat(pub u16);

/// One row of the content-format registry: number, MIME name, file
/// extension, and a couple of content-class flags.
struct Registration {
    format: ContentFormat,
    mime: &'static str,
    extension: &'static str,
    printable: bool,
    image: bool,
}

const REGISTRY: &[Registration] = &[
    Registration {
        format: ContentFormat::TEXT_PLAIN_UTF8,
        mime: "text/plain;charset=utf-8",
        extension: "txt",
        printable: true,
        image: false,
    },
    Registration {
        format: ContentFormat::IMAGE_GIF,
        mime: "image/gif",
        extension: "gif",
        printable: false,
        image: true,
    },
    Registration {
        format: ContentFormat::IMAGE_JPEG,
        mime: "image/jpeg",
        extension: "jpg",
        printable: false,
        image: true,
    },
    Registration {
        format: ContentFormat::IMAGE_PNG,
        mime: "image/png",
        extension: "png",
        printable: false,
        image: true,
    },
    Registration {
        format: ContentFormat::APPLICATION_LINK_FORMAT,
        mime: "application/link-format",
        extension: "wlnk",
        printable: true,
        image: false,
    },
    Registration {
        format: ContentFormat::APPLICATION_XML,
        mime: "application/xml",
        extension: "xml",
        printable: true,
        image: false,
    },
    Registration {
        format: ContentFormat::APPLICATION_OCTET_STREAM,
        mime: "application/octet-stream",
        extension: "bin",
        printable: false,
        image: false,
    },
    Registration {
        format: ContentFormat::APPLICATION_EXI,
        mime: "application/exi",
        extension: "exi",
        printable: false,
        image: false,
    },
    Registration {
        format: ContentFormat::APPLICATION_JSON,
        mime: "application/json",
        extension: "json",
        printable: true,
        image: false,
    },
    Registration {
        format: ContentFormat::APPLICATION_CBOR,
        mime: "application/cbor",
        extension: "cbor",
        printable: false,
        image: false,
    },
];

impl ContentFormat {
    /// From IETF-RFC7252.
    pub const TEXT_PLAIN_UTF8: ContentFormat = ContentFormat(0);

    /// Registered image format: GIF.
    pub const IMAGE_GIF: ContentFormat = ContentFormat(21);

    /// Registered image format: JPEG.
    pub const IMAGE_JPEG: ContentFormat = ContentFormat(22);

    /// Registered image format: PNG.
    pub const IMAGE_PNG: ContentFormat = ContentFormat(23);

    /// From IETF-RFC7252.
    pub const APPLICATION_LINK_FORMAT: ContentFormat = ContentFormat(40);

    /// From IETF-RFC7252.
    pub const APPLICATION_XML: ContentFormat = ContentFormat(41);

    /// From IETF-RFC7252.
    pub const APPLICATION_OCTET_STREAM: ContentFormat = ContentFormat(42);

    /// From IETF-RFC7252.
    pub const APPLICATION_EXI: ContentFormat = ContentFormat(47);

    /// From IETF-RFC7252.
    pub const APPLICATION_JSON: ContentFormat = ContentFormat(50);

    /// From IETF-RFC7049 Concise Binary Object Representation (CBOR).
    pub const APPLICATION_CBOR: ContentFormat = ContentFormat(60);

    fn registration(self) -> Option<&'static Registration> {
        REGISTRY.iter().find(|r| r.format == self)
    }

    /// Returns the MIME name of this content format as a `&'static str`, if
    /// it is registered.
    pub fn static_name(self) -> Option<&'static str> {
        self.registration().map(|r| r.mime)
    }

    /// Returns a MIME name for this content format. Unregistered formats
    /// come back as `unknown/<n>`.
    pub fn name(&self) -> Cow<'static, str> {
        if let Some(name) = self.static_name() {
            Cow::from(name)
        } else {
            Cow::from(format!("unknown/{}", self.0))
        }
    }

    /// Returns the customary file extension for this content format, or
    /// `None` if it is not registered.
    pub fn file_extension(self) -> Option<&'static str> {
        self.registration().map(|r| r.extension)
    }

    /// Returns true if this content format is known to be printable text.
    pub fn is_printable(self) -> bool {
        self.registration().map(|r| r.printable).unwrap_or(false)
    }

    /// Returns true if this content format is a registered image format.
    pub fn is_image(self) -> bool {
        self.registration().map(|r| r.image).unwrap_or(false)
    }

    /// Looks up a content format from its exact MIME name.
    pub fn parse(mime: &str) -> Option<ContentFormat> {
        let mime = mime.trim();

        // `text/plain` without parameters means UTF-8 here.
        if mime.eq_ignore_ascii_case("text/plain") {
            return Some(ContentFormat::TEXT_PLAIN_UTF8);
        }

        REGISTRY
            .iter()
            .find(|r| r.mime.eq_ignore_ascii_case(mime))
            .map(|r| r.format)
    }

    /// Looks up all registered content formats whose MIME name matches the
    /// given wildcard pattern, e.g. `image/*` or `*/json`.
    ///
    /// Returns an empty vector when nothing matches.
    pub fn parse_wildcard(pattern: &str) -> Vec<ContentFormat> {
        let escaped = regex::escape(pattern.trim()).replace(r"\*", ".*");
        let re = match regex::Regex::new(&format!("^{}$", escaped)) {
            Ok(re) => re,
            Err(_) => return Vec::new(),
        };

        REGISTRY
            .iter()
            .filter(|r| re.is_match(r.mime))
            .map(|r| r.format)
            .collect()
    }
}

impl core::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name())
    }
}
