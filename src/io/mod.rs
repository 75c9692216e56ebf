// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Network I/O for running a [`Server`](crate::server::Server).
//!
//! The [`Server`](crate::server::Server) structure implements the
//! processing logic of the AXFR server abstracted from network I/O.
//! This module provides the [framing](framing) of DNS messages over
//! stream sockets and the [`TokioIoProvider`], which acts as the
//! intermediary between Tokio's networking APIs and the
//! [`Server`](crate::server::Server).

use std::time::Duration;

pub mod framing;
mod tokio;

pub use self::tokio::{ShutdownController, TokioIoProvider};
pub use framing::FrameError;

/// How long a client has to send its request after connecting.
const READ_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);
