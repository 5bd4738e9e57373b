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

//! Datagram-based back-end: the socket contract, a few socket
//! implementations, and the endpoint that drives the exchange pipeline
//! over them.

use super::*;

mod async_socket;
pub use async_socket::*;

mod allow_udp_socket;
pub use allow_udp_socket::AllowStdUdpSocket;

mod loopback_socket;
pub use loopback_socket::LoopbackSocket;

mod null_socket;
pub use null_socket::NullSocket;

mod endpoint;
pub use endpoint::*;
