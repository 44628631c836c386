//! Byte-stream transport.
//!
//! Each connection carries exactly one request: read one frame, dispatch it,
//! wait for the host to produce the reply, write one frame, hang up. Every
//! accepted connection gets its own task right away; a client has
//! `read_timeout` to deliver its frame. At most `concurrency` requests are in
//! flight between the frame arriving and the reply being written.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, oneshot, watch};
use tracing::{debug, info, warn};

use scale_net::{NetError, Response, encode, read_frame_within, write_frame};

use crate::dispatch::Dispatcher;
use crate::invocation::ReplySink;

/// Per-connection limits of the byte-stream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeLimits {
    /// Largest inbound frame accepted.
    pub max_frame_len: usize,
    /// Time a client gets to deliver its whole request frame.
    pub read_timeout: Duration,
}

impl PipeLimits {
    /// Bundle the limits.
    #[must_use]
    pub fn new(max_frame_len: usize, read_timeout: Duration) -> Self {
        Self {
            max_frame_len,
            read_timeout,
        }
    }
}

/// Reply sink for one byte-stream connection.
///
/// The encoded reply is handed back to the connection task through a oneshot
/// channel; closing drops the channel, which makes the task hang up.
#[derive(Debug)]
pub struct PipeReplySink {
    uuid: Option<String>,
    reply: Option<oneshot::Sender<Vec<u8>>>,
}

impl PipeReplySink {
    /// Create a sink delivering to `reply`.
    #[must_use]
    pub fn new(reply: oneshot::Sender<Vec<u8>>) -> Self {
        Self { uuid: None, reply: Some(reply) }
    }
}

impl ReplySink for PipeReplySink {
    fn set_correlation_id(&mut self, id: Option<String>) {
        self.uuid = id;
    }

    fn send_reply(&mut self, mut response: Response) -> Result<(), NetError> {
        response.uuid = self.uuid.clone();
        let bytes = encode(&response)?;
        let reply = self
            .reply
            .take()
            .ok_or_else(|| NetError::Io(ErrorKind::NotConnected.into()))?;
        reply
            .send(bytes)
            .map_err(|_| NetError::Io(ErrorKind::BrokenPipe.into()))
    }

    fn close(&mut self) {
        self.reply.take();
    }
}

/// Serve one request on `stream` with no bound on requests in flight.
///
/// # Errors
///
/// Returns [`NetError`] if the request frame does not arrive in time or the
/// reply cannot be written.
pub async fn serve_connection<S, T>(
    mut stream: S,
    dispatcher: &Dispatcher<T>,
    limits: PipeLimits,
) -> Result<(), NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Send + 'static,
{
    let payload = read_frame_within(&mut stream, limits.max_frame_len, limits.read_timeout).await?;
    answer(stream, dispatcher, &payload).await
}

/// Like [`serve_connection`], but holds a permit from `in_flight` from the
/// moment the frame arrives until the reply is written.
async fn serve_admitted<S, T>(
    mut stream: S,
    dispatcher: &Dispatcher<T>,
    limits: PipeLimits,
    in_flight: &Semaphore,
) -> Result<(), NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Send + 'static,
{
    let payload = read_frame_within(&mut stream, limits.max_frame_len, limits.read_timeout).await?;
    let Ok(_permit) = in_flight.acquire().await else {
        return Ok(());
    };
    answer(stream, dispatcher, &payload).await
}

async fn answer<S, T>(mut stream: S, dispatcher: &Dispatcher<T>, payload: &[u8]) -> Result<(), NetError>
where
    S: AsyncWrite + Unpin,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    dispatcher.dispatch_bytes(payload, Box::new(PipeReplySink::new(tx)));

    match rx.await {
        Ok(reply) => write_frame(&mut stream, &reply).await?,
        Err(_) => debug!("request closed without reply"),
    }
    stream.shutdown().await?;
    Ok(())
}

/// Accept byte-stream clients until `shutdown` fires.
pub async fn run_pipe_listener<T: Send + 'static>(
    listener: TcpListener,
    dispatcher: Dispatcher<T>,
    concurrency: usize,
    limits: PipeLimits,
    mut shutdown: watch::Receiver<bool>,
) {
    let in_flight = Arc::new(Semaphore::new(concurrency.max(1)));
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, concurrency, read_timeout = ?limits.read_timeout, "pipe listener started");
    }

    while !*shutdown.borrow() {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "pipe accept failed");
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };

        debug!(%peer, "pipe client connected");
        let dispatcher = dispatcher.clone();
        let in_flight = Arc::clone(&in_flight);
        tokio::spawn(async move {
            if let Err(err) = serve_admitted(stream, &dispatcher, limits, &in_flight).await {
                warn!(%peer, %err, "pipe connection failed");
            }
        });
    }
    info!("pipe listener stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use scale_net::names::messages;
    use scale_net::{PipeConnection, Request, ResponseType, read_frame, read_message, write_message};
    use tokio::io::duplex;
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::queue::WorkQueue;
    use crate::registry::CommandRegistry;

    struct Target;

    fn setup() -> (Dispatcher<Target>, WorkQueue<Target>) {
        let mut registry = CommandRegistry::new();
        registry.register("Hello", Vec::new(), |_: &mut Target, _| Some(Response::success("hi")));
        registry.register("Quiet", Vec::new(), |_: &mut Target, _| None);
        let queue = WorkQueue::new();
        (Dispatcher::new(Arc::new(registry), queue.sender()), queue)
    }

    fn limits() -> PipeLimits {
        PipeLimits::new(4096, Duration::from_secs(5))
    }

    async fn drain_until_finished<R>(queue: &WorkQueue<Target>, task: JoinHandle<R>) -> R {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !task.is_finished() {
            assert!(Instant::now() < deadline, "task never finished");
            queue.drain_once(&mut Target);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        task.await.unwrap()
    }

    async fn wait_for_queued(queue: &WorkQueue<Target>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.len() < count {
            assert!(Instant::now() < deadline, "only {} of {count} requests queued", queue.len());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn listen(
        dispatcher: Dispatcher<Target>,
        concurrency: usize,
        limits: PipeLimits,
    ) -> (String, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_pipe_listener(listener, dispatcher, concurrency, limits, shutdown_rx));
        (addr, shutdown_tx)
    }

    fn hello(addr: &str) -> JoinHandle<Result<Response, NetError>> {
        let client = PipeConnection::new(addr);
        tokio::spawn(async move { client.request("Hello", None).await })
    }

    async fn drain_until_one(queue: &WorkQueue<Target>) {
        for _ in 0..500 {
            if queue.drain_once(&mut Target) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("nothing was enqueued");
    }

    #[tokio::test]
    async fn test_single_request_roundtrip() {
        let (dispatcher, queue) = setup();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(async move { serve_connection(server, &dispatcher, limits()).await });

        write_message(&mut client, &Request::new("Hello").with_uuid("abc")).await.unwrap();
        drain_until_one(&queue).await;

        let reply: Response = read_message(&mut client, 4096).await.unwrap();
        assert_eq!(reply.kind, ResponseType::Success);
        assert_eq!(reply.uuid.as_deref(), Some("abc"));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_no_reply_closes_stream() {
        let (dispatcher, queue) = setup();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(async move { serve_connection(server, &dispatcher, limits()).await });

        write_message(&mut client, &Request::new("Quiet")).await.unwrap();
        drain_until_one(&queue).await;

        let err = read_frame(&mut client, 4096).await.unwrap_err();
        assert!(matches!(err, NetError::PeerClosed { read: 0, .. }));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejected_request_still_replies() {
        let (dispatcher, queue) = setup();
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(async move { serve_connection(server, &dispatcher, limits()).await });

        write_frame(&mut client, b"{\"command\":\"Nope;\"}").await.unwrap();
        drain_until_one(&queue).await;

        let reply: Response = read_message(&mut client, 4096).await.unwrap();
        assert_eq!(reply.kind, ResponseType::Error);
        assert_eq!(reply.message.as_deref(), Some(messages::UNKNOWN_DATA_STRUCTURE));
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_peer_hangup_mid_frame() {
        let (dispatcher, queue) = setup();
        let (mut client, server) = duplex(4096);
        client.write_all(&[20, 0, 0, 0, b'{']).await.unwrap();
        drop(client);

        let err = serve_connection(server, &dispatcher, limits()).await.unwrap_err();
        assert!(matches!(err, NetError::PeerClosed { .. }));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_listener_stops_on_shutdown() {
        let (dispatcher, _queue) = setup();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_pipe_listener(listener, dispatcher, 1, limits(), shutdown_rx));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[test]
    fn test_sink_after_close_reports_error() {
        let (tx, _rx) = oneshot::channel();
        let mut sink = PipeReplySink::new(tx);
        sink.close();
        assert!(sink.send_reply(Response::success("OK")).is_err());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (dispatcher, queue) = setup();
        let (_client, server) = duplex(4096);
        let limits = PipeLimits::new(4096, Duration::from_millis(50));

        let err = serve_connection(server, &dispatcher, limits).await.unwrap_err();
        assert!(matches!(err, NetError::TimedOut { .. }));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_idle_client_does_not_block_others() {
        let (dispatcher, queue) = setup();
        let (addr, _shutdown) = listen(dispatcher, 1, PipeLimits::new(4096, Duration::from_secs(30))).await;

        let _idle = TcpStream::connect(&addr).await.unwrap();
        let reply = drain_until_finished(&queue, hello(&addr)).await.unwrap();
        assert_eq!(reply.kind, ResponseType::Success);
    }

    #[tokio::test]
    async fn test_concurrency_bounds_requests_in_flight() {
        let (dispatcher, queue) = setup();
        let (addr, _shutdown) = listen(dispatcher, 1, limits()).await;

        let first = hello(&addr);
        let second = hello(&addr);
        wait_for_queued(&queue, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.len(), 1);

        assert!(drain_until_finished(&queue, first).await.unwrap().is_success());
        assert!(drain_until_finished(&queue, second).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_concurrency_admits_parallel_requests() {
        let (dispatcher, queue) = setup();
        let (addr, _shutdown) = listen(dispatcher, 2, limits()).await;

        let first = hello(&addr);
        let second = hello(&addr);
        wait_for_queued(&queue, 2).await;

        assert_eq!(queue.drain_once(&mut Target), 2);
        assert!(drain_until_finished(&queue, first).await.unwrap().is_success());
        assert!(drain_until_finished(&queue, second).await.unwrap().is_success());
    }
}
