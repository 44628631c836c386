//! The host-facing handle.
//!
//! A [`Bridge`] owns the work queue and the push channel. The host calls
//! [`Bridge::drain_once`] once per tick from the thread that owns the
//! command target; everything else runs on the background server.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use scale_net::Response;

use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::push::{self, PushReceiver, PushSender};
use crate::queue::WorkQueue;
use crate::registry::CommandRegistry;
use crate::server::{BoundListeners, BridgeServer};

/// Work queue, dispatcher and push channel for one command target.
///
/// A new bridge is detached: requests can be dispatched in-process and pushes
/// accumulate until [`Bridge::listen`] starts the transports.
pub struct Bridge<T> {
    queue: WorkQueue<T>,
    dispatcher: Dispatcher<T>,
    push: PushSender,
    pushes: Option<PushReceiver>,
    server: Option<BridgeServer>,
}

impl<T: Send + 'static> Bridge<T> {
    /// Create a detached bridge answering the commands in `registry`.
    #[must_use]
    pub fn new(registry: CommandRegistry<T>) -> Self {
        let queue = WorkQueue::new();
        let dispatcher = Dispatcher::new(Arc::new(registry), queue.sender());
        let (push, pushes) = push::channel();
        Self {
            queue,
            dispatcher,
            push,
            pushes: Some(pushes),
            server: None,
        }
    }

    /// Bind the configured listeners and start serving them.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::AlreadyListening`] on a second call, or the
    /// error that prevented the server from starting. A failed call leaves
    /// the bridge detached, so it can be retried.
    pub fn listen(&mut self, config: &BridgeConfig) -> Result<(), BridgeError> {
        if self.server.is_some() {
            return Err(BridgeError::AlreadyListening);
        }
        let listeners = BoundListeners::bind(config)?;
        let server = BridgeServer::start(listeners, config, self.dispatcher.clone(), &mut self.pushes)?;
        self.server = Some(server);
        Ok(())
    }

    /// Returns a dispatcher feeding this bridge's queue.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher<T> {
        self.dispatcher.clone()
    }

    /// Returns a push producer.
    #[must_use]
    pub fn push_sender(&self) -> PushSender {
        self.push.clone()
    }

    /// Run every queued invocation against `target`.
    ///
    /// Call exactly once per tick, from the thread that owns `target`.
    pub fn drain_once(&self, target: &mut T) -> usize {
        self.queue.drain_once(target)
    }

    /// Take the pushes queued while detached.
    ///
    /// Always empty once the bridge is listening; the server broadcasts them.
    pub fn pending_pushes(&mut self) -> Vec<Response> {
        let mut pending = Vec::new();
        if let Some(pushes) = self.pushes.as_mut() {
            while let Ok(push) = pushes.try_recv() {
                pending.push(push);
            }
        }
        pending
    }

    /// Address of the socket listener, once listening.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(BridgeServer::socket_addr)
    }

    /// Address of the byte-stream listener, once listening.
    #[must_use]
    pub fn pipe_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(BridgeServer::pipe_addr)
    }

    /// Returns `true` while the transports are running.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.server.is_some()
    }

    /// Stop the transports, discard queued work and wait for the background
    /// thread.
    ///
    /// Discarded invocations close their connections. Safe to call more than
    /// once.
    pub fn shutdown(&mut self) {
        self.stop();
    }
}

impl<T> Bridge<T> {
    fn stop(&mut self) {
        let server = self.server.take();
        if let Some(server) = &server {
            server.signal();
        }
        let discarded = self.queue.discard();
        debug!(discarded, "queue discarded at shutdown");
        if let Some(server) = server
            && server.join()
        {
            info!("bridge shut down");
        }
    }
}

impl<T> Drop for Bridge<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T> std::fmt::Debug for Bridge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("queue", &self.queue)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
