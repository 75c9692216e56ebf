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

//! Implementation of the Tokio I/O provider.

// NOTE: In this provider, I/O error handling is generally to exit the
// task. The run_with_respawning function acts as a supervisor that will
// respawn the TCP acceptor, possibly after a delay, if it exits with an
// error or a panic.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use super::framing::{self, FrameError};
use crate::name::Name;
use crate::server::Server;

/// The backlog passed to `listen(2)`.
const LISTEN_BACKLOG: u32 = 1024;

/// A Tokio I/O provider.
///
/// This provider runs the server by spawning tasks on a Tokio runtime:
/// one for the accept loop and one per connection. Each connection
/// carries at most one zone transfer. When a transfer has been written
/// in full, the name of the transferred zone is sent on the completion
/// channel passed to [`TokioIoProvider::start`].
///
/// The `TokioIoProvider` supports graceful shutdown. To initiate a
/// graceful shutdown, use the [`ShutdownController`] returned by
/// [`TokioIoProvider::start`].
pub struct TokioIoProvider {
    listener: TcpListener,
}

impl TokioIoProvider {
    /// Creates a new `TokioIoProvider`. This binds a TCP listener with
    /// `SO_REUSEADDR` set, so that repeated short-lived runs can rebind
    /// the port right away, but does not start the server. This
    /// function requires that the Tokio runtime be active.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts the server on the active Tokio runtime.
    ///
    /// This spawns tasks on the active Tokio runtime and then returns
    /// a [`ShutdownController`] that can be used to shut down the tasks
    /// at a later time. (The [`ShutdownController`] must be held as long
    /// as the server should be running, since dropping it will trigger
    /// shutdown.)
    pub fn start(
        self,
        server: &Arc<Server>,
        completions: mpsc::UnboundedSender<Name>,
    ) -> ShutdownController {
        let (shutdown_controller, shutdown_handle) = make_shutdown_channels();
        tokio::spawn(run_with_respawning(
            shutdown_handle,
            server.clone(),
            Arc::new(self.listener),
            completions,
        ));
        shutdown_controller
    }
}

/// How long to wait between respawns of a task. This is to prevent
/// tasks that crash immediately from using up significant CPU time.
const TASK_RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// Runs the TCP accept loop as a Tokio task, respawning it if it
/// returns an I/O error, is cancelled, or panics.
async fn run_with_respawning(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    listener: Arc<TcpListener>,
    completions: mpsc::UnboundedSender<Name>,
) {
    loop {
        let last_spawn_time = Instant::now();
        let task = run_tcp_listener(
            shutdown.clone(),
            server.clone(),
            listener.clone(),
            completions.clone(),
        );
        match tokio::spawn(task).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => error!("TCP accept loop failed: {e}"),
            Err(_) => (), // The task panicked or was cancelled.
        }

        // If necessary, wait before respawning, but receive shutdown
        // requests immediately.
        let since_last_spawn = Instant::now().duration_since(last_spawn_time);
        if let Some(duration_to_wait) = TASK_RESPAWN_DELAY.checked_sub(since_last_spawn) {
            tokio::select! {
                _ = shutdown.request_receiver.recv() => return,
                _ = tokio::time::sleep(duration_to_wait) => (),
            }
        }
    }
}

/// The TCP listener/accept loop.
async fn run_tcp_listener(
    mut shutdown: ShutdownHandle,
    server: Arc<Server>,
    listener: Arc<TcpListener>,
    completions: mpsc::UnboundedSender<Name>,
) -> io::Result<()> {
    loop {
        let (client, client_socket_addr) = tokio::select! {
            _ = shutdown.request_receiver.recv() => return Ok(()),
            res = listener.accept() => res?,
        };
        debug!("accepted connection from {client_socket_addr}");

        // The connection task only holds the wait sender: a transfer in
        // progress is allowed to finish during graceful shutdown.
        let wait_sender = shutdown.wait_sender.clone();
        let server = server.clone();
        let completions = completions.clone();
        tokio::spawn(async move {
            if let Err(e) =
                handle_tcp_connection(&server, client, client_socket_addr, &completions).await
            {
                log_frame_error(client_socket_addr, e);
            }
            drop(wait_sender);
        });
    }
}

/// Handles a TCP connection, which carries at most one exchange.
///
/// Requests that the server declines to answer are logged, and the
/// connection is closed without a response.
async fn handle_tcp_connection(
    server: &Server,
    mut socket: TcpStream,
    client: SocketAddr,
    completions: &mpsc::UnboundedSender<Name>,
) -> Result<(), FrameError> {
    let request = match timeout(
        super::READ_MESSAGE_TIMEOUT,
        framing::read_message(&mut socket),
    )
    .await
    {
        Ok(Ok(request)) => request,
        Ok(Err(FrameError::Io(e))) => return Err(FrameError::Io(e)),
        Ok(Err(e)) => {
            debug!("dropping connection from {client}: {e}");
            return Ok(());
        }
        Err(_) => {
            debug!("dropping connection from {client}: timed out waiting for a request");
            return Ok(());
        }
    };

    let transfer = match server.handle_message(&request) {
        Ok(transfer) => transfer,
        Err(reason) => {
            warn!("dropping request from {client}: {reason}");
            return Ok(());
        }
    };

    framing::write_message(&mut socket, &transfer.response).await?;
    socket.shutdown().await?;
    info!("transferred {} to {client}", transfer.domain);

    // The receiver may be gone if nobody is waiting for completions.
    let _ = completions.send(transfer.domain);
    Ok(())
}

/// Controls the shutdown of a server's Tokio tasks.
///
/// This type is used to shut down the Tokio tasks spawned by
/// [`TokioIoProvider::start`]. Use [`ShutdownController::shut_down`]
/// or its blocking variant, [`ShutdownController::blocking_shut_down`],
/// to initiate shutdown and wait for its completion. Dropping the
/// controller will also trigger shutdown (but will not wait for it to
/// complete).
#[must_use]
pub struct ShutdownController {
    request_sender: broadcast::Sender<()>,
    wait_receiver: mpsc::Receiver<()>,
}

impl ShutdownController {
    /// Requests that running server tasks shut down, and then waits for
    /// them to terminate.
    pub async fn shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.recv().await;
    }

    /// The blocking variant of [`ShutdownController::shut_down`].
    pub fn blocking_shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.blocking_recv();
    }
}

/// A handle held by tasks to interact with the graceful shutdown
/// mechanism.
///
/// This type has two roles:
///
/// 1. It enables tasks to listen for graceful shutdown signals. This
///    is done by waiting for all senders attached to `request_receiver`
///    to close.
/// 2. It prevents graceful shutdown from completing until it is
///    dropped. This is done by holding `wait_sender`. All server tasks
///    therefore own a `ShutdownHandle` (or at least the `wait_sender`
///    component).
struct ShutdownHandle {
    request_receiver: broadcast::Receiver<()>,
    wait_sender: mpsc::Sender<()>,
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        // A resubscribed receiver misses values already queued, but the
        // shutdown signal is the senders closing, not a value.
        ShutdownHandle {
            request_receiver: self.request_receiver.resubscribe(),
            wait_sender: self.wait_sender.clone(),
        }
    }
}

/// Produces a [`ShutdownController`] and an initial [`ShutdownHandle`]
/// connected to it.
fn make_shutdown_channels() -> (ShutdownController, ShutdownHandle) {
    let (request_sender, request_receiver) = broadcast::channel(1);
    let (wait_sender, wait_receiver) = mpsc::channel(1);
    let controller = ShutdownController {
        request_sender,
        wait_receiver,
    };
    let handle = ShutdownHandle {
        request_receiver,
        wait_sender,
    };
    (controller, handle)
}

/// Logs an error that ended a connection.
fn log_frame_error(client: SocketAddr, e: FrameError) {
    error!("connection with {client} failed: {e}");
}
