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

use std::time::Duration;

/// Endpoint configuration: the recognized protocol and engine knobs with
/// their RFC 7252 / RFC 7641 defaults.
///
/// A `Config` value is immutable once handed to an endpoint; tests and
/// applications needing different parameters construct fresh endpoints.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// Default IP port for `coap://` destinations that specify none.
    pub default_port: u16,

    /// Default IP port for `coaps://` destinations that specify none.
    pub default_secure_port: u16,

    /// IP port advertised to cross-proxy deployments.
    pub http_port: u16,

    /// Initial acknowledgement timeout for confirmable messages. The
    /// effective first timeout is scaled by a random factor in
    /// `[1, ack_random_factor]`.
    pub ack_timeout: Duration,

    /// Upper bound of the random scale applied to `ack_timeout`.
    pub ack_random_factor: f32,

    /// Back-off factor applied to the timeout after every retransmission.
    pub ack_timeout_scale: f32,

    /// Number of retransmissions after the initial transmission of a
    /// confirmable message, so up to `max_retransmit + 1` transmissions
    /// total.
    pub max_retransmit: u32,

    /// Largest message this endpoint is willing to emit without switching
    /// to a block-wise transfer.
    pub max_message_size: usize,

    /// Preferred payload size of an individual block in block-wise
    /// transfers.
    pub default_block_size: usize,

    /// How long partial block-wise reassembly state is retained before it
    /// is discarded.
    pub blockwise_status_lifetime: Duration,

    /// Start message-id allocation at a random value rather than zero.
    pub use_random_id_start: bool,

    /// Allocate random eight-byte tokens rather than sequential ones.
    pub use_random_token_start: bool,

    /// Fallback freshness lifetime for observed resources whose
    /// notifications carry no Max-Age option.
    pub notification_max_age: Duration,

    /// A server promotes a notification to confirmable at least this often.
    pub notification_check_interval_time: Duration,

    /// A server promotes a notification to confirmable at least every this
    /// many notifications.
    pub notification_check_interval_count: u32,

    /// Slack added on top of Max-Age before the client re-registers an
    /// observation.
    pub notification_reregistration_backoff: Duration,

    /// How long message-layer state about an exchange is retained for
    /// deduplication and ACK/RST matching.
    pub exchange_lifetime: Duration,

    /// Period of the mark-and-sweep pass that expires old exchange state.
    pub mark_and_sweep_interval: Duration,

    /// Receive buffer size; a single CoAP message must fit in one datagram.
    pub channel_receive_packet_size: usize,

    /// Overall deadline for a request future when the caller supplies none.
    pub default_request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_port: 5683,
            default_secure_port: 5684,
            http_port: 8080,
            ack_timeout: Duration::from_millis(2000),
            ack_random_factor: 1.5,
            ack_timeout_scale: 2.0,
            max_retransmit: 4,
            max_message_size: 1024,
            default_block_size: 512,
            blockwise_status_lifetime: Duration::from_millis(600_000),
            use_random_id_start: true,
            use_random_token_start: true,
            notification_max_age: Duration::from_millis(128_000),
            notification_check_interval_time: Duration::from_millis(86_400_000),
            notification_check_interval_count: 100,
            notification_reregistration_backoff: Duration::from_millis(2000),
            exchange_lifetime: Duration::from_millis(247_000),
            mark_and_sweep_interval: Duration::from_millis(10_000),
            channel_receive_packet_size: 2048,
            default_request_timeout: Duration::from_millis(32767),
        }
    }
}

impl Config {
    /// Returns the default destination port for the given URI scheme, if
    /// this endpoint recognizes it.
    pub fn default_port_for_scheme(&self, scheme: &str) -> Option<u16> {
        match scheme {
            "coap" => Some(self.default_port),
            "coaps" => Some(self.default_secure_port),
            "http" => Some(self.http_port),
            _ => None,
        }
    }

    /// Draws the initial acknowledgement timeout `T0 = ack_timeout ×
    /// U(1, ack_random_factor)`. Each retransmission then scales the
    /// drawn value by `ack_timeout_scale`; the jitter is drawn once per
    /// confirmable transmission, not once per retransmit.
    pub(crate) fn initial_retransmit_timeout(&self) -> Duration {
        let base = self.ack_timeout.as_millis() as u64;

        // Jitter in fixed-point: a multiplier in [1, ack_random_factor].
        const JDIV: u64 = 512;
        let rmod = (JDIV as f32 * (self.ack_random_factor - 1.0)) as u64;
        let jmul = if rmod > 0 {
            JDIV + rand::random::<u64>() % rmod
        } else {
            JDIV
        };

        Duration::from_millis(base * jmul / JDIV)
    }

    /// Scales a retransmission timeout by `ack_timeout_scale`.
    pub(crate) fn scale_retransmit_timeout(&self, current: Duration) -> Duration {
        Duration::from_millis((current.as_millis() as f64 * self.ack_timeout_scale as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(5683, config.default_port);
        assert_eq!(5684, config.default_secure_port);
        assert_eq!(Duration::from_secs(2), config.ack_timeout);
        assert_eq!(4, config.max_retransmit);
        assert_eq!(512, config.default_block_size);
        assert_eq!(Duration::from_secs(600), config.blockwise_status_lifetime);
        assert_eq!(Duration::from_secs(247), config.exchange_lifetime);
        assert_eq!(Duration::from_secs(10), config.mark_and_sweep_interval);
        assert_eq!(2048, config.channel_receive_packet_size);

        assert_eq!(Some(5683), config.default_port_for_scheme("coap"));
        assert_eq!(Some(5684), config.default_port_for_scheme("coaps"));
        assert_eq!(Some(8080), config.default_port_for_scheme("http"));
        assert_eq!(None, config.default_port_for_scheme("gopher"));
    }

    #[test]
    fn retransmit_schedule() {
        let config = Config::default();

        // T0 lands in [ack_timeout, ack_timeout * factor); every
        // retransmission doubles it, so the full schedule for the default
        // parameters spans T0 * (1 + 2 + 4 + 8 + 16) in [30s, 45s).
        for _ in 0..32 {
            let t0 = config.initial_retransmit_timeout();
            let millis = t0.as_millis() as u64;
            assert!(millis >= 2000 && millis < 3000, "t0 = {}", millis);

            let mut timeout = t0;
            let mut total = Duration::from_millis(0);
            for _ in 0..=config.max_retransmit {
                total += timeout;
                timeout = config.scale_retransmit_timeout(timeout);
            }
            let total = total.as_millis() as u64;
            assert!(total >= 30_000 && total < 45_000, "total = {}", total);
        }
    }
}
