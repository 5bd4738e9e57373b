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
use futures_timer::Delay;
use std::future::Future;
use std::net::{SocketAddr, UdpSocket};
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// A wrapper around [`std::net::UdpSocket`] that implements
/// [`DatagramSocket`].
///
/// The standard socket offers no readiness notifications, so when a
/// receive would block, this wrapper parks the task on a short
/// [`futures_timer::Delay`] and tries again. That makes it a convenience
/// stop-gap to get things running quickly; production code wants a
/// wrapper around a genuinely asynchronous socket.
#[derive(Debug)]
pub struct AllowStdUdpSocket(UdpSocket, Mutex<Option<Delay>>, Duration);

impl AllowStdUdpSocket {
    /// The interval between polling attempts when a receive would block.
    const DEFAULT_ASYNC_POLL_INTERVAL: Duration = Duration::from_millis(30);

    /// Upgrades the given [`std::net::UdpSocket`] to an instance of
    /// `AllowStdUdpSocket`. The socket must already be in non-blocking
    /// mode.
    pub fn from_std(udp_socket: UdpSocket) -> AllowStdUdpSocket {
        AllowStdUdpSocket(
            udp_socket,
            Mutex::new(None),
            Self::DEFAULT_ASYNC_POLL_INTERVAL,
        )
    }

    /// Analog of [`std::net::UdpSocket::bind`]. The underlying socket is
    /// put into non-blocking mode.
    pub fn bind<A>(addr: A) -> std::io::Result<AllowStdUdpSocket>
    where
        A: std::net::ToSocketAddrs,
    {
        let udp_socket = UdpSocket::bind(addr)?;
        udp_socket.set_nonblocking(true)?;
        Ok(AllowStdUdpSocket::from_std(udp_socket))
    }

    fn wait_for_data(&self, cx: &mut Context<'_>) {
        let mut lock = self.1.lock().expect("Lock failed");
        let delay = match lock.as_mut() {
            Some(delay) => {
                delay.reset(self.2);
                delay
            }
            None => {
                *lock = Some(Delay::new(self.2));
                lock.as_mut().expect("just inserted")
            }
        };

        let _ = Pin::new(delay).poll(cx);
    }
}

impl DatagramSocket for AllowStdUdpSocket {
    fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.0.local_addr().map_err(|_| Error::IOError)
    }

    fn poll_send_to(
        &self,
        _cx: &mut Context<'_>,
        buf: &[u8],
        addr: SocketAddr,
    ) -> Poll<Result<usize, Error>> {
        match self.0.send_to(buf, addr) {
            Ok(written) => Poll::Ready(Ok(written)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Poll::Pending,
            Err(_) => Poll::Ready(Err(Error::IOError)),
        }
    }

    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<(usize, SocketAddr), Error>> {
        match self.0.recv_from(buf) {
            Ok(received) => Poll::Ready(Ok(received)),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                self.wait_for_data(cx);
                Poll::Pending
            }
            Err(_) => Poll::Ready(Err(Error::IOError)),
        }
    }
}
