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

use crate::message::Message;

/// Observer of the lifecycle transitions of a single exchange.
///
/// One observer is registered per interested party when the exchange is
/// created; every method has an empty default so implementations override
/// only the transitions they care about. All methods are invoked from the
/// endpoint's event loop.
pub trait ExchangeObserver: Send {
    /// The peer acknowledged our confirmable message. With a piggybacked
    /// response, [`responded`](ExchangeObserver::responded) follows
    /// immediately.
    fn acknowledged(&mut self) {}

    /// Our confirmable message is being retransmitted; `attempt` is
    /// one-based.
    fn retransmitting(&mut self, attempt: u32) {
        let _ = attempt;
    }

    /// A response matching this exchange has arrived. For an observed
    /// resource this fires once per fresh notification.
    fn responded(&mut self, response: &Message) {
        let _ = response;
    }

    /// The peer rejected our message with a reset.
    fn rejected(&mut self) {}

    /// The exchange ran out of retransmissions, or its overall deadline
    /// elapsed, without a reply.
    fn timed_out(&mut self) {}

    /// The exchange was cancelled locally.
    fn cancelled(&mut self) {}

    /// The observe relation is being refreshed with a new registration
    /// request reusing the original token.
    fn reregistering(&mut self) {}

    /// The exchange terminated with an error that has no transition of
    /// its own, e.g. an aborted block-wise transfer.
    fn failed(&mut self, error: crate::Error) {
        let _ = error;
    }
}
