//! Bridge server — the background thread that runs every transport.
//!
//! Listeners are bound on the caller's thread so address errors surface
//! synchronously. The listeners, the push broadcaster and every connection
//! then run on a dedicated `scale-bridge` thread with its own tokio runtime.
//! Shutdown signals the runtime and waits for the thread for at most the
//! configured timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::push::{PushReceiver, broadcast_pushes};
use crate::transport::pipe::{PipeLimits, run_pipe_listener};
use crate::transport::socket::{ConnectionRegistry, SocketState, serve_socket};

/// Listeners bound but not yet serving.
#[derive(Debug)]
pub struct BoundListeners {
    socket: std::net::TcpListener,
    pipe: Option<std::net::TcpListener>,
}

impl BoundListeners {
    /// Bind the addresses in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] naming the address that failed.
    pub fn bind(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let socket = bind_nonblocking(config.socket_addr)?;
        let pipe = config.pipe_addr.map(bind_nonblocking).transpose()?;
        Ok(Self { socket, pipe })
    }

    /// Address of the socket listener.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Address of the byte-stream listener, if enabled.
    #[must_use]
    pub fn pipe_addr(&self) -> Option<SocketAddr> {
        self.pipe.as_ref().and_then(|l| l.local_addr().ok())
    }
}

fn bind_nonblocking(addr: SocketAddr) -> Result<std::net::TcpListener, BridgeError> {
    let listener =
        std::net::TcpListener::bind(addr).map_err(|source| BridgeError::Bind { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| BridgeError::Bind { addr, source })?;
    Ok(listener)
}

/// Handle to the running background thread.
#[derive(Debug)]
pub struct BridgeServer {
    shutdown: watch::Sender<bool>,
    done: std_mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
    socket_addr: Option<SocketAddr>,
    pipe_addr: Option<SocketAddr>,
    timeout: Duration,
}

impl BridgeServer {
    /// Start serving `listeners` on a background thread.
    ///
    /// The push receiver is taken out of `pushes` only once the thread is
    /// running; on error it is left in place for a later attempt.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyListening`] if `pushes` is empty, or
    /// [`BridgeError::Runtime`] or [`BridgeError::Spawn`] if the background
    /// thread cannot be set up.
    pub fn start<T: Send + 'static>(
        listeners: BoundListeners,
        config: &BridgeConfig,
        dispatcher: Dispatcher<T>,
        pushes: &mut Option<PushReceiver>,
    ) -> Result<Self, BridgeError> {
        if pushes.is_none() {
            return Err(BridgeError::AlreadyListening);
        }
        let socket_addr = listeners.socket_addr();
        let pipe_addr = listeners.pipe_addr();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("scale-bridge-io")
            .build()
            .map_err(BridgeError::Runtime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = std_mpsc::channel();
        let (handoff_tx, handoff_rx) = std_mpsc::sync_channel::<PushReceiver>(1);
        let grace = config.shutdown_timeout / 2;
        let options = ServeOptions {
            pipe_concurrency: config.pipe_concurrency,
            pipe_limits: PipeLimits::new(config.max_frame_len, config.read_timeout),
            local_subnet_only: config.local_subnet_only,
        };

        let thread = std::thread::Builder::new()
            .name("scale-bridge".to_string())
            .spawn(move || {
                if let Ok(pushes) = handoff_rx.recv() {
                    runtime.block_on(serve(listeners, dispatcher, pushes, options, shutdown_rx));
                }
                runtime.shutdown_timeout(grace);
                let _ = done_tx.send(());
            })
            .map_err(BridgeError::Spawn)?;

        if let Some(receiver) = pushes.take()
            && let Err(std_mpsc::SendError(returned)) = handoff_tx.send(receiver)
        {
            *pushes = Some(returned);
            warn!("bridge thread exited before taking the push channel");
        }

        info!(socket = ?socket_addr, pipe = ?pipe_addr, "bridge started");
        Ok(Self {
            shutdown: shutdown_tx,
            done: done_rx,
            thread: Some(thread),
            socket_addr,
            pipe_addr,
            timeout: config.shutdown_timeout,
        })
    }

    /// Address of the socket listener.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.socket_addr
    }

    /// Address of the byte-stream listener, if enabled.
    #[must_use]
    pub fn pipe_addr(&self) -> Option<SocketAddr> {
        self.pipe_addr
    }

    /// Ask every listener to stop. Does not wait.
    pub fn signal(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal and wait for the background thread, up to the configured
    /// timeout.
    ///
    /// Returns `false` if the thread was left running.
    pub fn join(mut self) -> bool {
        self.stop()
    }

    fn stop(&mut self) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };
        self.signal();
        match self.done.recv_timeout(self.timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    error!("bridge thread panicked");
                }
                info!("bridge stopped");
                true
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.timeout, "bridge thread did not stop in time, detaching");
                false
            }
        }
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ServeOptions {
    pipe_concurrency: usize,
    pipe_limits: PipeLimits,
    local_subnet_only: bool,
}

async fn serve<T: Send + 'static>(
    listeners: BoundListeners,
    dispatcher: Dispatcher<T>,
    pushes: PushReceiver,
    options: ServeOptions,
    shutdown: watch::Receiver<bool>,
) {
    let socket = match TcpListener::from_std(listeners.socket) {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, "socket listener could not join the runtime");
            return;
        }
    };

    let connections = ConnectionRegistry::new();
    let broadcaster = tokio::spawn(broadcast_pushes(
        pushes,
        connections.clone(),
        shutdown.clone(),
    ));

    let pipe = match listeners.pipe.map(TcpListener::from_std).transpose() {
        Ok(pipe) => pipe.map(|listener| {
            tokio::spawn(run_pipe_listener(
                listener,
                dispatcher.clone(),
                options.pipe_concurrency,
                options.pipe_limits,
                shutdown.clone(),
            ))
        }),
        Err(err) => {
            error!(%err, "pipe listener could not join the runtime");
            None
        }
    };

    let state = Arc::new(SocketState::new(
        dispatcher,
        connections,
        options.local_subnet_only,
    ));
    if let Err(err) = serve_socket(socket, state, shutdown).await {
        error!(%err, "socket listener failed");
    }

    if let Some(pipe) = pipe {
        let _ = pipe.await;
    }
    let _ = broadcaster.await;
}
