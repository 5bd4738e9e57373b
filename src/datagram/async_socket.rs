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
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

/// The UDP channel contract the endpoint runs on: best-effort,
/// non-blocking datagram send and receive, one datagram per call.
///
/// Implementations exist for the standard library socket
/// ([`AllowStdUdpSocket`]), a loopback interface ([`LoopbackSocket`]),
/// and a black hole ([`NullSocket`]); production deployments wrap their
/// async runtime's UDP socket the same way.
pub trait DatagramSocket: Send + Sync + Unpin {
    /// Returns the local address this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr, Error>;

    /// A non-blocking, `poll_*` flavor of `std::net::UdpSocket::send_to`.
    fn poll_send_to(
        &self,
        cx: &mut Context<'_>,
        buf: &[u8],
        addr: SocketAddr,
    ) -> Poll<Result<usize, Error>>;

    /// A non-blocking, `poll_*` flavor of `std::net::UdpSocket::recv_from`.
    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<(usize, SocketAddr), Error>>;

    /// Resolves a hostname to the socket addresses this kind of socket
    /// can reach.
    fn lookup_host(host: &str, port: u16) -> Result<std::vec::IntoIter<SocketAddr>, Error>
    where
        Self: Sized,
    {
        use std::net::ToSocketAddrs;
        (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::HostNotFound)
    }

    /// Returns a future that uses [`DatagramSocket::poll_send_to`].
    fn send_to<'a, 'b>(&'a self, buf: &'b [u8], addr: SocketAddr) -> SendToFuture<'a, 'b, Self> {
        SendToFuture {
            socket: self,
            buffer: buf,
            addr,
        }
    }

    /// Returns a future that uses [`DatagramSocket::poll_recv_from`].
    fn recv_from<'a, 'b>(&'a self, buf: &'b mut [u8]) -> RecvFromFuture<'a, 'b, Self> {
        RecvFromFuture {
            socket: self,
            buffer: buf,
        }
    }
}

/// Future returned from [`DatagramSocket::send_to`].
#[derive(Debug)]
pub struct SendToFuture<'a, 'b, T: DatagramSocket + ?Sized> {
    socket: &'a T,
    buffer: &'b [u8],
    addr: SocketAddr,
}

impl<'a, 'b, T: DatagramSocket + ?Sized> Unpin for SendToFuture<'a, 'b, T> {}

impl<'a, 'b, T: DatagramSocket + ?Sized> Future for SendToFuture<'a, 'b, T> {
    type Output = Result<usize, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.socket.poll_send_to(cx, this.buffer, this.addr)
    }
}

/// Future returned from [`DatagramSocket::recv_from`].
#[derive(Debug)]
pub struct RecvFromFuture<'a, 'b, T: DatagramSocket + ?Sized> {
    socket: &'a T,
    buffer: &'b mut [u8],
}

impl<'a, 'b, T: DatagramSocket + ?Sized> Unpin for RecvFromFuture<'a, 'b, T> {}

impl<'a, 'b, T: DatagramSocket + ?Sized> Future for RecvFromFuture<'a, 'b, T> {
    type Output = Result<(usize, SocketAddr), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.socket.poll_recv_from(cx, this.buffer)
    }
}
