//! Pending invocations and the reply path.
//!
//! A [`PendingInvocation`] pairs a bound call with the [`Completion`] that
//! owns the originating connection's [`ReplySink`]. The host runs it on its
//! own thread; writing the reply happens on a short-lived worker so a slow
//! peer never stalls the tick.

use tracing::{debug, warn};

use scale_net::{NetError, Response};

/// Per-connection writer for replies.
///
/// One implementation exists per transport. The sink tags every reply with
/// the correlation id it was given.
pub trait ReplySink: Send {
    /// Remember the request's correlation id for the reply.
    fn set_correlation_id(&mut self, id: Option<String>);

    /// Serialise and write one reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if the reply cannot be encoded or delivered.
    fn send_reply(&mut self, response: Response) -> Result<(), NetError>;

    /// Release the connection. Sinks whose connection outlives the request
    /// may ignore this.
    fn close(&mut self);
}

/// Owns a [`ReplySink`] until the reply is written or abandoned.
///
/// Closing is idempotent, and dropping a completion closes it, so an
/// invocation that is discarded never leaks its connection.
pub struct Completion {
    sink: Box<dyn ReplySink>,
    closed: bool,
}

impl Completion {
    /// Wrap a sink.
    #[must_use]
    pub fn new(sink: Box<dyn ReplySink>) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    /// Write `response` and close.
    pub fn reply(mut self, response: Response) {
        if self.closed {
            return;
        }
        if let Err(err) = self.sink.send_reply(response) {
            warn!(%err, "failed to write reply");
        }
        self.close();
    }

    /// Close without replying.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.sink.close();
        }
    }

    /// Returns `true` once the sink has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// A bound call against `T` that has not run yet.
pub type Call<T> = Box<dyn FnOnce(&mut T) -> Option<Response> + Send>;

/// One unit of work queued for the host thread.
pub struct PendingInvocation<T> {
    call: Call<T>,
    completion: Completion,
}

impl<T: 'static> PendingInvocation<T> {
    /// Queue `call`, replying through `completion`.
    #[must_use]
    pub fn new(call: Call<T>, completion: Completion) -> Self {
        Self { call, completion }
    }

    /// An invocation that does no work and replies with `response`.
    ///
    /// Rejected requests go through the queue like any other so that every
    /// reply takes the same path.
    #[must_use]
    pub fn immediate(response: Response, completion: Completion) -> Self {
        Self::new(Box::new(move |_: &mut T| Some(response)), completion)
    }

    /// Run the call against `target`.
    ///
    /// A `None` result closes the connection. Otherwise the reply is handed
    /// to a new `reply-writer` thread.
    pub fn run(self, target: &mut T) {
        let Self {
            call,
            mut completion,
        } = self;
        match call(target) {
            None => completion.close(),
            Some(response) => spawn_reply(completion, response),
        }
    }
}

impl<T> std::fmt::Debug for PendingInvocation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingInvocation")
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}

fn spawn_reply(completion: Completion, response: Response) {
    let spawned = std::thread::Builder::new()
        .name("reply-writer".to_string())
        .spawn(move || completion.reply(response));
    match spawned {
        Ok(_) => debug!("reply handed to writer thread"),
        // The closure, and with it the completion, is dropped here, which
        // closes the connection.
        Err(err) => warn!(%err, "failed to spawn reply writer"),
    }
}
