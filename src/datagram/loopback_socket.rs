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
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::lock::Mutex;
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::net::SocketAddr;
use std::pin::Pin;

/// A [`DatagramSocket`] implementing a simple loopback interface: every
/// packet sent arrives back on the same socket, attributed to the address
/// it was sent to. With the endpoint acting as both client and server,
/// this exercises the full pipeline without touching the network.
#[derive(Debug)]
pub struct LoopbackSocket {
    // Message is (packet_bytes, dest_addr).
    sender: Sender<(Vec<u8>, SocketAddr)>,
    receiver: Mutex<Receiver<(Vec<u8>, SocketAddr)>>,
}

impl LoopbackSocket {
    /// The fixed address of the loopback interface.
    pub fn addr() -> SocketAddr {
        "127.0.0.1:5683".parse().expect("static address")
    }

    /// Creates a new instance of [`LoopbackSocket`].
    pub fn new() -> LoopbackSocket {
        let (sender, receiver) = channel(8);
        LoopbackSocket {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl Default for LoopbackSocket {
    fn default() -> Self {
        LoopbackSocket::new()
    }
}

impl DatagramSocket for LoopbackSocket {
    fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(Self::addr())
    }

    fn lookup_host(_host: &str, _port: u16) -> Result<std::vec::IntoIter<SocketAddr>, Error> {
        Ok(vec![Self::addr()].into_iter())
    }

    fn poll_send_to(
        &self,
        cx: &mut Context<'_>,
        buf: &[u8],
        addr: SocketAddr,
    ) -> Poll<Result<usize, Error>> {
        let mut sender = self.sender.clone();
        match sender.poll_ready(cx) {
            Poll::Ready(Ok(())) => match sender.start_send((buf.to_vec(), addr)) {
                Ok(()) => Poll::Ready(Ok(buf.len())),
                Err(e) if e.is_full() => Poll::Pending,
                Err(_) => Poll::Ready(Err(Error::IOError)),
            },
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::IOError)),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_recv_from(
        &self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<(usize, SocketAddr), Error>> {
        let mut receiver_lock_future = self.receiver.lock();
        let receiver_lock_future = Pin::new(&mut receiver_lock_future);

        if let Poll::Ready(mut receiver_guard) = receiver_lock_future.poll(cx) {
            let receiver: &mut Receiver<(Vec<u8>, SocketAddr)> = &mut receiver_guard;
            match receiver.poll_next_unpin(cx) {
                Poll::Ready(Some((packet, addr))) => {
                    let len = packet.len();
                    if buf.len() >= len {
                        buf[..len].copy_from_slice(&packet);
                        Poll::Ready(Ok((len, addr)))
                    } else {
                        Poll::Ready(Err(Error::IOError))
                    }
                }
                Poll::Ready(None) => Poll::Ready(Err(Error::IOError)),
                Poll::Pending => Poll::Pending,
            }
        } else {
            Poll::Pending
        }
    }
}
