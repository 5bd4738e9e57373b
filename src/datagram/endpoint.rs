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

//! The endpoint façade: ties the exchange pipeline to a datagram socket,
//! issues outgoing requests, and drives the timers.

use super::*;
use crate::exchange::{ConState, Exchange, ExchangeKey, ExchangeStore, ObserveRelation};
use crate::layer::{Effects, LayerContext, LayerStack};
use crate::timer::TimerKind;
use crate::timer::TimerQueue;
use futures::channel::{mpsc, oneshot};
use futures::future::{select, Either};
use futures::prelude::*;
use futures::task::Poll;
use futures_timer::Delay;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

pub(crate) struct EndpointState {
    stack: LayerStack,
    store: ExchangeStore,
    timers: TimerQueue,
    started: bool,
}

struct PipelineOutput {
    outgoing: Vec<(Vec<u8>, SocketAddr)>,
    inbound: Vec<(Message, SocketAddr)>,
}

/// A CoAP endpoint bound to a [`DatagramSocket`].
///
/// The endpoint is symmetric: it issues requests as a client and, through
/// the handler given to [`receive_loop`](Endpoint::receive_loop), answers
/// requests as a server. One task must drive `receive_loop` for traffic
/// and timers to make progress; everything else may happen from any task
/// holding a clone of the endpoint.
#[derive(Debug)]
pub struct Endpoint<S: DatagramSocket> {
    socket: Arc<S>,
    config: Config,
    state: Arc<Mutex<EndpointState>>,
}

impl std::fmt::Debug for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointState")
            .field("store", &self.store)
            .field("started", &self.started)
            .finish()
    }
}

impl<S: DatagramSocket> Clone for Endpoint<S> {
    fn clone(&self) -> Self {
        Endpoint {
            socket: self.socket.clone(),
            config: self.config,
            state: self.state.clone(),
        }
    }
}

impl<S: DatagramSocket> Endpoint<S> {
    /// Creates a new endpoint over `socket` with the default
    /// configuration.
    pub fn new(socket: S) -> Endpoint<S> {
        Endpoint::with_config(socket, Config::default())
    }

    /// Creates a new endpoint over `socket` with the given configuration.
    pub fn with_config(socket: S, config: Config) -> Endpoint<S> {
        Endpoint {
            socket: Arc::new(socket),
            state: Arc::new(Mutex::new(EndpointState {
                stack: LayerStack::standard(),
                store: ExchangeStore::new(&config),
                timers: TimerQueue::new(),
                started: false,
            })),
            config,
        }
    }

    /// Borrows the underlying socket.
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Borrows this endpoint's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn run_pipeline<R, F>(&self, f: F) -> (R, PipelineOutput)
    where
        F: FnOnce(&mut LayerStack, &mut LayerContext<'_>) -> R,
    {
        let mut effects = Effects::new();
        let mut guard = self.state.lock().expect("endpoint state poisoned");
        let state = &mut *guard;

        let mut ctx = LayerContext {
            config: &self.config,
            store: &mut state.store,
            timers: &mut state.timers,
            effects: &mut effects,
            now: Instant::now(),
        };

        let ret = f(&mut state.stack, &mut ctx);

        (
            ret,
            PipelineOutput {
                outgoing: effects.outgoing,
                inbound: effects.inbound_requests,
            },
        )
    }

    async fn flush(&self, outgoing: Vec<(Vec<u8>, SocketAddr)>) {
        for (bytes, dest) in outgoing {
            if let Err(e) = self.socket.send_to(&bytes, dest).await {
                warn!("send_to: io error: {:?} (dest={:?})", e, dest);
            }
        }
    }

    /// Sends a request, returning a future that resolves with the
    /// response.
    ///
    /// A message-id and token are assigned if absent. The future fails
    /// with [`Error::ResponseTimeout`] when retransmissions are exhausted
    /// or the overall request deadline elapses, and with [`Error::Reset`]
    /// when the peer rejects the request. Dropping the future cancels the
    /// exchange.
    pub fn send(&self, request: Message, dest: SocketAddr) -> SendFuture<S> {
        let (sender, receiver) = oneshot::channel();

        let (key, output) = self.run_pipeline(move |stack, ctx| {
            let mut msg = request;
            if msg.msg_token().is_empty() && !msg.is_empty() {
                msg.set_msg_token(ctx.store.next_token(dest));
            }

            let key: ExchangeKey = (dest, msg.msg_token());

            let mut exchange = Exchange::new_local(dest, msg.msg_token(), msg.clone(), ctx.now);
            exchange
                .observers
                .push(Box::new(FutureObserver(Some(sender))));
            ctx.store.insert(exchange);

            ctx.timers.schedule(
                ctx.now + ctx.config.default_request_timeout,
                TimerKind::RequestDeadline(key),
            );

            stack.submit(ctx, msg, dest);
            key
        });

        SendFuture {
            state: Arc::downgrade(&self.state),
            socket: self.socket.clone(),
            key,
            outgoing: output.outgoing,
            receiver,
            done: false,
        }
    }

    /// Sends a CoAP ping (a confirmable empty message) to `dest`. The
    /// returned future resolves with `Ok(())` when the peer answers with
    /// a reset, proving it is alive.
    pub fn ping(&self, dest: SocketAddr) -> PingFuture<S> {
        PingFuture(self.send(Message::ping(), dest))
    }

    /// Registers an observation: a GET with Observe=0 whose responses
    /// keep arriving as a stream of notifications, fresher-first.
    ///
    /// Dropping the [`Observation`] tears the relation down locally, so
    /// the next notification is answered with a reset and the server
    /// drops the relation too.
    pub fn observe(&self, request: Message, dest: SocketAddr) -> Observation<S> {
        let (sender, receiver) = mpsc::unbounded();

        let (key, output) = self.run_pipeline(move |stack, ctx| {
            let mut msg = request;
            if msg.msg_token().is_empty() {
                msg.set_msg_token(ctx.store.next_token(dest));
            }
            let _ = msg
                .options_mut()
                .replace(option::OBSERVE, crate::layer::OBSERVE_REGISTER);

            let key: ExchangeKey = (dest, msg.msg_token());

            let mut exchange = Exchange::new_local(dest, msg.msg_token(), msg.clone(), ctx.now);
            exchange.relation = Some(ObserveRelation::client());
            exchange
                .observers
                .push(Box::new(StreamObserver(Some(sender))));
            ctx.store.insert(exchange);

            ctx.timers.schedule(
                ctx.now + ctx.config.default_request_timeout,
                TimerKind::RequestDeadline(key),
            );

            stack.submit(ctx, msg, dest);
            key
        });

        Observation {
            state: Arc::downgrade(&self.state),
            socket: self.socket.clone(),
            config: self.config,
            key,
            outgoing: output.outgoing,
            receiver,
        }
    }

    /// Pushes a fresh notification to the observer of `(peer, token)`
    /// (server role). The observe layer numbers it and keeps at most one
    /// confirmable notification in transit.
    pub async fn notify(&self, peer: SocketAddr, token: MsgToken, mut response: Message) {
        if response.msg_token().is_empty() {
            response.set_msg_token(token);
        }
        let ((), output) =
            self.run_pipeline(move |stack, ctx| stack.submit(ctx, response, peer));
        self.flush(output.outgoing).await;
    }

    /// Builds a request for the given `coap://host[:port]/path?query` URI
    /// and resolves its destination address, preferring IPv4.
    pub fn request_from_uri(
        &self,
        method: MsgCode,
        uri: &str,
    ) -> Result<(Message, SocketAddr), Error> {
        let rest = uri
            .strip_prefix("coap://")
            .ok_or(Error::UnsupportedUriScheme)?;

        let (authority, path_and_query) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };
        let (path, query) = match path_and_query.find('?') {
            Some(i) => (&path_and_query[..i], Some(&path_and_query[i + 1..])),
            None => (path_and_query, None),
        };

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            // Bracketed IPv6 literal.
            let end = rest.find(']').ok_or(Error::InvalidArgument)?;
            let host = &rest[..end];
            let port = match rest[end + 1..].strip_prefix(':') {
                Some(p) => Some(p.parse::<u16>().map_err(|_| Error::InvalidArgument)?),
                None => None,
            };
            (host, port)
        } else {
            match authority.rfind(':') {
                Some(i) => (
                    &authority[..i],
                    Some(
                        authority[i + 1..]
                            .parse::<u16>()
                            .map_err(|_| Error::InvalidArgument)?,
                    ),
                ),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(Error::HostNotFound);
        }

        let port = port
            .or_else(|| self.config.default_port_for_scheme("coap"))
            .unwrap_or(self.config.default_port);

        let mut addrs: Vec<SocketAddr> = S::lookup_host(host, port)?.collect();
        addrs.sort_by_key(|addr| match addr {
            SocketAddr::V4(_) => 0,
            SocketAddr::V6(_) => 1,
        });
        let dest = addrs.into_iter().next().ok_or(Error::HostNotFound)?;

        let mut msg = Message::request(MsgType::Con, method);

        // Host and port become options only when they add information
        // beyond the destination address.
        let host_option = if host.parse::<IpAddr>().is_ok() {
            None
        } else {
            Some(host)
        };
        let port_option = if port != self.config.default_port {
            Some(port)
        } else {
            None
        };

        msg.append_uri_options(host_option, port_option, path, query)?;

        Ok((msg, dest))
    }

    /// Receives datagrams and drives timers until the socket fails.
    ///
    /// Inbound requests are handed to `handler`; a `Some` reply is sent
    /// back (piggybacked on the acknowledgement when possible), a `None`
    /// rejects confirmable requests with a reset.
    pub async fn receive_loop<F>(&self, mut handler: F) -> Result<(), Error>
    where
        F: FnMut(&Message, SocketAddr) -> Option<Message> + Send,
    {
        {
            let mut state = self.state.lock().expect("endpoint state poisoned");
            if !state.started {
                state.started = true;
                state.timers.schedule(
                    Instant::now() + self.config.mark_and_sweep_interval,
                    TimerKind::Sweep,
                );
            }
        }

        let mut buffer = vec![0u8; self.config.channel_receive_packet_size];

        loop {
            let deadline = {
                self.state
                    .lock()
                    .expect("endpoint state poisoned")
                    .timers
                    .next_deadline()
            };

            let received = {
                let recv = self.socket.recv_from(&mut buffer);
                match deadline {
                    Some(at) => {
                        let timer = Delay::new(at.saturating_duration_since(Instant::now()));
                        match select(recv, timer).await {
                            Either::Left((result, _)) => Some(result?),
                            Either::Right(((), _)) => None,
                        }
                    }
                    None => Some(recv.await?),
                }
            };

            match received {
                Some((len, src)) => {
                    let packet = buffer[..len].to_vec();
                    self.handle_datagram(&packet, src, &mut handler).await;
                }
                None => self.handle_due_timers().await,
            }
        }
    }

    async fn handle_datagram<F>(&self, packet: &[u8], src: SocketAddr, handler: &mut F)
    where
        F: FnMut(&Message, SocketAddr) -> Option<Message> + Send,
    {
        let ((), output) =
            self.run_pipeline(|stack, ctx| stack.process_datagram(ctx, packet, src));
        self.flush(output.outgoing).await;

        for (request, peer) in output.inbound {
            match handler(&request, peer) {
                Some(mut response) => {
                    if response.msg_token().is_empty() {
                        response.set_msg_token(request.msg_token());
                    }
                    let ((), output) =
                        self.run_pipeline(move |stack, ctx| stack.submit(ctx, response, peer));
                    self.flush(output.outgoing).await;
                }
                None if request.msg_type().is_con() => {
                    let reset = Message::reset(request.msg_id());
                    let ((), output) =
                        self.run_pipeline(move |stack, ctx| stack.submit(ctx, reset, peer));
                    self.flush(output.outgoing).await;
                }
                None => (),
            }
        }
    }

    async fn handle_due_timers(&self) {
        let ((), output) = self.run_pipeline(|stack, ctx| {
            while let Some(kind) = ctx.timers.pop_due(ctx.now) {
                stack.process_timer(ctx, kind);
            }
        });
        self.flush(output.outgoing).await;
    }
}

struct FutureObserver(Option<oneshot::Sender<Result<Message, Error>>>);

impl FutureObserver {
    fn resolve(&mut self, result: Result<Message, Error>) {
        if let Some(sender) = self.0.take() {
            let _ = sender.send(result);
        }
    }
}

impl ExchangeObserver for FutureObserver {
    fn responded(&mut self, response: &Message) {
        self.resolve(Ok(response.clone()));
    }

    fn rejected(&mut self) {
        self.resolve(Err(Error::Reset));
    }

    fn timed_out(&mut self) {
        self.resolve(Err(Error::ResponseTimeout));
    }

    fn cancelled(&mut self) {
        self.resolve(Err(Error::Cancelled));
    }

    fn failed(&mut self, error: Error) {
        self.resolve(Err(error));
    }
}

struct StreamObserver(Option<mpsc::UnboundedSender<Message>>);

impl ExchangeObserver for StreamObserver {
    fn responded(&mut self, response: &Message) {
        if let Some(sender) = self.0.take() {
            if sender.unbounded_send(response.clone()).is_ok() {
                self.0 = Some(sender);
            }
        }
    }

    fn rejected(&mut self) {
        self.0 = None;
    }

    fn timed_out(&mut self) {
        self.0 = None;
    }

    fn cancelled(&mut self) {
        self.0 = None;
    }

    fn failed(&mut self, _error: Error) {
        self.0 = None;
    }
}

/// Future returned by [`Endpoint::send`]. Dropping it cancels the
/// exchange: timers are disarmed and the message-id and token indices
/// are released.
#[must_use = "futures do nothing unless polled"]
pub struct SendFuture<S: DatagramSocket> {
    state: Weak<Mutex<EndpointState>>,
    socket: Arc<S>,
    key: ExchangeKey,
    outgoing: Vec<(Vec<u8>, SocketAddr)>,
    receiver: oneshot::Receiver<Result<Message, Error>>,
    done: bool,
}

impl<S: DatagramSocket> Unpin for SendFuture<S> {}

impl<S: DatagramSocket> Future for SendFuture<S> {
    type Output = Result<Message, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut futures::task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        // The initial transmission (and any follow-ups queued with it)
        // goes out from here, so the future is self-contained even before
        // the receive loop notices the exchange.
        while !this.outgoing.is_empty() {
            let (bytes, dest) = &this.outgoing[0];
            match this.socket.poll_send_to(cx, bytes, *dest) {
                Poll::Ready(Ok(_)) => {
                    this.outgoing.remove(0);
                }
                Poll::Ready(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Err(e));
                }
                Poll::Pending => break,
            }
        }

        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.done = true;
                Poll::Ready(result)
            }
            Poll::Ready(Err(oneshot::Canceled)) => {
                this.done = true;
                Poll::Ready(Err(Error::Cancelled))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: DatagramSocket> Drop for SendFuture<S> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            let mut state = match state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(mut exchange) = state.store.remove(&self.key) {
                if let Some(transmit) = exchange.transmit.as_mut() {
                    transmit.state = ConState::Cancelled;
                }
                exchange.notify_cancelled();
            }
        }
    }
}

impl<S: DatagramSocket> std::fmt::Debug for SendFuture<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendFuture")
            .field("key", &self.key)
            .field("done", &self.done)
            .finish()
    }
}

/// Future returned by [`Endpoint::ping`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct PingFuture<S: DatagramSocket>(SendFuture<S>);

impl<S: DatagramSocket> Future for PingFuture<S> {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut futures::task::Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().0).poll(cx) {
            // A reset is the expected liveness proof; any response at all
            // still means the peer is up.
            Poll::Ready(Err(Error::Reset)) | Poll::Ready(Ok(_)) => Poll::Ready(Ok(())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A live observation: a stream of notifications for one observed
/// resource, fresher-first.
#[must_use = "streams do nothing unless polled"]
pub struct Observation<S: DatagramSocket> {
    state: Weak<Mutex<EndpointState>>,
    socket: Arc<S>,
    config: Config,
    key: ExchangeKey,
    outgoing: Vec<(Vec<u8>, SocketAddr)>,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl<S: DatagramSocket> Unpin for Observation<S> {}

impl<S: DatagramSocket> std::fmt::Debug for Observation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation").field("key", &self.key).finish()
    }
}

impl<S: DatagramSocket> Observation<S> {
    /// The token correlating this observation's notifications.
    pub fn token(&self) -> MsgToken {
        self.key.1
    }

    /// Proactively deregisters: queues a GET with Observe=1 reusing the
    /// original token, which the server answers with one final
    /// observe-less response that also closes this stream.
    pub fn cancel(&mut self) {
        let state = match self.state.upgrade() {
            Some(state) => state,
            None => return,
        };

        let mut effects = Effects::new();
        let mut guard = match state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = &mut *guard;

        let deregister = match state.store.get_mut(&self.key) {
            Some(exchange) => {
                let mut msg = exchange.request.clone();
                msg.set_msg_id(0);
                msg.set_payload(Vec::new());
                let _ = msg
                    .options_mut()
                    .replace(option::OBSERVE, crate::layer::OBSERVE_DEREGISTER);
                Some(msg)
            }
            None => None,
        };

        if let Some(msg) = deregister {
            let mut ctx = LayerContext {
                config: &self.config,
                store: &mut state.store,
                timers: &mut state.timers,
                effects: &mut effects,
                now: Instant::now(),
            };
            state.stack.submit(&mut ctx, msg, self.key.0);
            self.outgoing.append(&mut effects.outgoing);
        }
    }
}

impl<S: DatagramSocket> Stream for Observation<S> {
    type Item = Message;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut futures::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        while !this.outgoing.is_empty() {
            let (bytes, dest) = &this.outgoing[0];
            match this.socket.poll_send_to(cx, bytes, *dest) {
                Poll::Ready(Ok(_)) => {
                    this.outgoing.remove(0);
                }
                Poll::Ready(Err(e)) => {
                    warn!("send_to: io error: {:?} (dest={:?})", e, dest);
                    this.outgoing.remove(0);
                }
                Poll::Pending => break,
            }
        }

        this.receiver.poll_next_unpin(cx)
    }
}

impl<S: DatagramSocket> Drop for Observation<S> {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = match state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(mut exchange) = state.store.remove(&self.key) {
                exchange.notify_cancelled();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn drive<LE, F, R>(endpoint: &Endpoint<LE>, future: F, handler: impl FnMut(&Message, SocketAddr) -> Option<Message> + Send) -> R
    where
        LE: DatagramSocket,
        F: Future<Output = R> + Unpin,
        R: Send,
    {
        let receive = endpoint.receive_loop(handler);
        futures::pin_mut!(receive);

        match block_on(select(future, receive)) {
            Either::Left((ret, _)) => ret,
            Either::Right(_) => panic!("Receive loop terminated unexpectedly"),
        }
    }

    #[test]
    fn ping_loopback() {
        let endpoint = Endpoint::new(LoopbackSocket::new());
        let future = endpoint.ping(LoopbackSocket::addr());

        assert_eq!(Ok(()), drive(&endpoint, future, |_, _| None));
    }

    /// Exercises the full timeout path, so it takes over half a minute of
    /// wall-clock time to run.
    #[test]
    #[ignore]
    fn ping_null() {
        let endpoint = Endpoint::new(NullSocket::new());
        let future = endpoint.ping(NullSocket::addr());

        assert_eq!(
            Err(Error::ResponseTimeout),
            drive(&endpoint, future, |_, _| None)
        );
    }

    #[test]
    fn get_loopback() {
        let endpoint = Endpoint::new(LoopbackSocket::new());

        let (request, dest) = endpoint
            .request_from_uri(MsgCode::MethodGet, "coap://localhost/time")
            .expect("URI is valid");

        let future = endpoint.send(request, dest);

        let response = drive(&endpoint, future, |request, _| {
            assert_eq!(Some("time"), request.options().get(option::URI_PATH));
            let mut response = Message::response(MsgType::Non, MsgCode::SuccessContent);
            response.set_payload(&b"42"[..]);
            Some(response)
        })
        .expect("request succeeds");

        assert_eq!(MsgCode::SuccessContent, response.msg_code());
        assert_eq!(b"42", response.payload());
    }

    #[test]
    fn get_loopback_not_found() {
        let endpoint = Endpoint::new(LoopbackSocket::new());

        let (request, dest) = endpoint
            .request_from_uri(MsgCode::MethodGet, "coap://localhost/missing")
            .expect("URI is valid");

        let future = endpoint.send(request, dest);

        let result = drive(&endpoint, future, |_, _| {
            Some(Message::response(
                MsgType::Non,
                MsgCode::ClientErrorNotFound,
            ))
        });

        assert_eq!(MsgCode::ClientErrorNotFound, result.unwrap().msg_code());
    }

    #[test]
    fn observe_loopback_delivers_notifications() {
        let endpoint = Endpoint::new(LoopbackSocket::new());

        let (request, dest) = endpoint
            .request_from_uri(MsgCode::MethodGet, "coap://localhost/sensor")
            .expect("URI is valid");

        let mut observation = endpoint.observe(request, dest);

        let first = drive(
            &endpoint,
            Box::pin(observation.next()),
            move |_, _| {
                // The loopback endpoint plays both roles, so the handler
                // fabricates the notification numbering itself.
                let mut response = Message::response(MsgType::Non, MsgCode::SuccessContent);
                response.options_mut().insert(option::OBSERVE, 5u32).unwrap();
                response.set_payload(&b"21.5 C"[..]);
                Some(response)
            },
        )
        .expect("stream stays open");

        assert_eq!(b"21.5 C", first.payload());
        assert_eq!(Some(5), first.observe());
    }

    #[test]
    fn request_from_uri_option_mapping() {
        let endpoint = Endpoint::new(NullSocket::new());

        let (msg, dest) = endpoint
            .request_from_uri(MsgCode::MethodGet, "coap://device.example:9999/a/b?u=c&v=d")
            .unwrap();

        assert_eq!(NullSocket::addr(), dest);
        assert_eq!(Some("device.example"), msg.options().get(option::URI_HOST));
        assert_eq!(Some(9999u16), msg.options().get(option::URI_PORT));

        let path: Vec<&str> = msg.options().get_all(option::URI_PATH).collect();
        assert_eq!(vec!["a", "b"], path);
        let query: Vec<&str> = msg.options().get_all(option::URI_QUERY).collect();
        assert_eq!(vec!["u=c", "v=d"], query);

        // Literal addresses and the default port add no options.
        let (msg, _) = endpoint
            .request_from_uri(MsgCode::MethodGet, "coap://192.0.2.1/x")
            .unwrap();
        assert_eq!(None, msg.options().get(option::URI_HOST));
        assert_eq!(None, msg.options().get(option::URI_PORT));

        assert_eq!(
            Err(Error::UnsupportedUriScheme),
            endpoint
                .request_from_uri(MsgCode::MethodGet, "http://example.com/")
                .map(|_| ())
        );
    }
}
