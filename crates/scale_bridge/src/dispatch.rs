//! Shared request path for every transport.
//!
//! decode → validate name → resolve → bind → enqueue. Every outcome, success
//! or rejection, ends up on the work queue so replies always leave through
//! the host's drain.

use std::sync::Arc;

use tracing::{debug, warn};

use scale_net::{NetError, Request, decode, validate_command_name};

use crate::error::{BindError, DispatchError};
use crate::invocation::{Call, Completion, PendingInvocation, ReplySink};
use crate::queue::WorkSender;
use crate::registry::CommandRegistry;

/// Turns inbound envelopes into queued invocations.
pub struct Dispatcher<T> {
    registry: Arc<CommandRegistry<T>>,
    work: WorkSender<T>,
}

impl<T: 'static> Dispatcher<T> {
    /// Create a dispatcher resolving against `registry` and feeding `work`.
    #[must_use]
    pub fn new(registry: Arc<CommandRegistry<T>>, work: WorkSender<T>) -> Self {
        Self { registry, work }
    }

    /// Returns the registry requests are resolved against.
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry<T> {
        &self.registry
    }

    /// Dispatch one raw JSON payload.
    pub fn dispatch_bytes(&self, payload: &[u8], sink: Box<dyn ReplySink>) {
        self.dispatch(decode::<Request>(payload), sink);
    }

    /// Dispatch one JSON text frame.
    pub fn dispatch_text(&self, text: &str, sink: Box<dyn ReplySink>) {
        self.dispatch_bytes(text.as_bytes(), sink);
    }

    /// Dispatch an already decoded request, or the error from decoding it.
    pub fn dispatch(&self, decoded: Result<Request, NetError>, mut sink: Box<dyn ReplySink>) {
        let request = match decoded {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "undecodable request");
                let err = DispatchError::Format(err.to_string());
                self.enqueue(PendingInvocation::immediate(err.reply(), Completion::new(sink)));
                return;
            }
        };

        sink.set_correlation_id(request.uuid.clone());
        let completion = Completion::new(sink);
        let uuid = request.uuid.clone();

        let invocation = match self.prepare(request) {
            Ok(call) => PendingInvocation::new(call, completion),
            Err(err) => {
                warn!(%err, uuid = ?uuid, "request rejected");
                PendingInvocation::immediate(err.reply(), completion)
            }
        };
        self.enqueue(invocation);
    }

    /// Resolve and bind a request into a call against the target.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the request cannot be run.
    pub fn prepare(&self, request: Request) -> Result<Call<T>, DispatchError> {
        let name = match request.command {
            Some(name) if !name.is_empty() => name,
            _ => return Err(DispatchError::Format("missing command".to_string())),
        };
        validate_command_name(&name).map_err(|err| DispatchError::Format(err.to_string()))?;

        let command = self
            .registry
            .resolve(&name)
            .ok_or_else(|| DispatchError::UnknownCommand(name.clone()))?;

        let args = command.bind(request.data).map_err(|source| match source {
            BindError::DataNotObject => DispatchError::Format(source.to_string()),
            source => DispatchError::Binding {
                command: name.clone(),
                source,
            },
        })?;

        debug!(command = %name, args = ?args, "request bound");
        let invoke = command.invoker();
        Ok(Box::new(move |target: &mut T| invoke(target, args)))
    }

    fn enqueue(&self, invocation: PendingInvocation<T>) {
        if !self.work.enqueue(invocation) {
            warn!("work queue closed, dropping request");
        }
    }
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            work: self.work.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("work", &self.work)
            .finish()
    }
}
