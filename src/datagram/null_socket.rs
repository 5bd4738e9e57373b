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
use futures::task::{Context, Poll};
use std::net::SocketAddr;

/// A [`DatagramSocket`] implementing a null interface: every packet sent
/// is discarded and nothing is ever received. Useful for exercising
/// retransmission and timeout paths.
#[derive(Debug)]
pub struct NullSocket;

impl NullSocket {
    /// The black-hole address of the null interface.
    pub fn addr() -> SocketAddr {
        "192.0.2.1:5683".parse().expect("static address")
    }

    /// Creates a new instance of [`NullSocket`].
    pub fn new() -> NullSocket {
        NullSocket
    }
}

impl DatagramSocket for NullSocket {
    fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(Self::addr())
    }

    fn lookup_host(_host: &str, _port: u16) -> Result<std::vec::IntoIter<SocketAddr>, Error> {
        Ok(vec![Self::addr()].into_iter())
    }

    fn poll_send_to(
        &self,
        _cx: &mut Context<'_>,
        buf: &[u8],
        _addr: SocketAddr,
    ) -> Poll<Result<usize, Error>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_recv_from(
        &self,
        _cx: &mut Context<'_>,
        _buf: &mut [u8],
    ) -> Poll<Result<(usize, SocketAddr), Error>> {
        Poll::Pending
    }
}
