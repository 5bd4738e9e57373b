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

use std::fmt::{Debug, Display, Formatter};

/// Type for errors encountered while sending or receiving CoAP requests and responses.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Error {
    /// The datagram could not be parsed as a CoAP message. Malformed messages
    /// are dropped silently and never acknowledged.
    Malformed,

    /// A critical option present in the message was not recognized.
    BadOption,

    /// More than one instance of an option marked as non-repeatable was encountered.
    OptionNotRepeatable,

    /// One or more of the supplied arguments are not valid for the given operation.
    InvalidArgument,

    /// There is not enough space in the given buffer to complete the operation.
    OutOfSpace,

    /// The message code was not recognized by this version of the library.
    UnknownMessageCode,

    /// A confirmable message exhausted its retransmissions, or the overall
    /// request deadline elapsed without a response.
    ResponseTimeout,

    /// The transaction was reset by the peer.
    Reset,

    /// A block-wise transfer failed: size-exponent mismatch, a gap in the
    /// block sequence, or reassembly state expired.
    Blockwise,

    /// This operation has been cancelled locally.
    Cancelled,

    /// An I/O error occurred while performing this operation.
    IOError,

    /// Unable to look up the given host because it was not found.
    HostNotFound,

    /// The given URI scheme is not supported by the associated endpoint.
    UnsupportedUriScheme,

    /// An unspecified error has occurred.
    Unspecified,
}

impl std::convert::From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::IOError
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        <Self as Debug>::fmt(self, f)
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::Unspecified
    }
}
