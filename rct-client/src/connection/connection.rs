//! Connection to an RCT device
//!
//! One socket is shared by all callers. Its lifecycle is driven by a set of
//! background tasks started with the connection:
//!
//! - the receive loop reads the socket, redials with backoff when it drops,
//!   and feeds raw chunks to the decoder
//! - the decoder turns chunks into datagrams and publishes them to the broker
//! - the cache task stores every response seen on the wire
//! - the status task records read acknowledgements and reports transport
//!   failures to the error callback
//! - the optional logger task hands every datagram to the logger sink
//!
//! All tasks stop when the connection's cancellation token fires.

use super::builder::{ConnectionBuilder, ErrorCallback, Hooks};
use super::config::ConnectionConfig;
use crate::broker::{Broker, Subscription};
use crate::cache::Cache;
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use rct_core::{Datagram, Identifier, InverterState, MAX_PAYLOAD_LENGTH, RctError, RctResult};
use rct_frame::{DatagramBuilder, DatagramParser};
use rct_transport::{Backoff, BoxedReader, BoxedWriter, Dialer, Link, retry};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Size of the socket read buffer
const READ_BUFFER_SIZE: usize = 1024;

/// Chunks buffered between the receive loop and the decoder
const INBOUND_CAPACITY: usize = 64;

/// Status reports buffered for the status task
const STATUS_CAPACITY: usize = 16;

/// Aborts the wrapped task when dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Write side of the current socket
struct Live {
    writer: BoxedWriter,
    /// Cancelled when this socket is given up, releasing its reader
    closed: CancellationToken,
}

/// Input of the decoder task
enum Inbound {
    /// A new socket was installed; drop any partial frame
    Reset,
    Chunk(Bytes),
}

struct Inner {
    config: ConnectionConfig,
    live: Mutex<Option<Live>>,
    connected: AtomicBool,
    last_received: SyncMutex<Option<Instant>>,
    broker: Broker<Datagram>,
    cache: Cache,
    token: CancellationToken,
}

impl Inner {
    /// Make `link` the current socket, returning its read side
    async fn install(&self, link: Link) -> (BoxedReader, CancellationToken) {
        let closed = self.token.child_token();
        let mut live = self.live.lock().await;
        *live = Some(Live {
            writer: link.writer,
            closed: closed.clone(),
        });
        self.connected.store(true, Ordering::SeqCst);
        (link.reader, closed)
    }

    /// Drop the current socket, if any
    async fn disconnect(&self) {
        let mut live = self.live.lock().await;
        Self::release(&mut live);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn release(live: &mut Option<Live>) {
        if let Some(live) = live.take() {
            live.closed.cancel();
        }
    }
}

/// Connection to an RCT device
///
/// Cheap to clone; all clones share the same socket, broker and cache. The
/// socket may be redialed any number of times during the connection's
/// lifetime.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a builder for a connection to `host`
    pub fn builder(host: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(host)
    }

    /// Connect to `host` on the default port with default settings
    pub async fn connect(token: &CancellationToken, host: impl Into<String>) -> RctResult<Self> {
        Self::builder(host).build(token).await
    }

    pub(crate) async fn start(
        config: ConnectionConfig,
        hooks: Hooks,
        dialer: Arc<dyn Dialer>,
        parent: &CancellationToken,
    ) -> RctResult<Self> {
        let token = parent.child_token();
        let endpoint = dialer.endpoint();

        let link = retry(&config.backoff, &token, || dialer.dial()).await?;
        log::info!("connected to {}", endpoint);

        let (broker, broker_loop) = Broker::new();
        let inner = Arc::new(Inner {
            config,
            live: Mutex::new(None),
            connected: AtomicBool::new(false),
            last_received: SyncMutex::new(None),
            broker,
            cache: Cache::new(),
            token: token.clone(),
        });
        let current = inner.install(link).await;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (status_tx, status_rx) = mpsc::channel(STATUS_CAPACITY);

        tokio::spawn(broker_loop.run(token.clone()));
        tokio::spawn(update_cache(Arc::clone(&inner), inner.broker.subscribe()));
        if let Some(logger) = hooks.logger {
            let subscription = inner.broker.subscribe();
            let token = token.clone();
            tokio::spawn(async move {
                let mut subscription = subscription;
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        datagram = subscription.recv() => match datagram {
                            Some(datagram) => logger(&datagram),
                            None => break,
                        },
                    }
                }
            });
        }
        tokio::spawn(report_status(Arc::clone(&inner), status_rx, hooks.on_error));
        tokio::spawn(decode(inner.broker.clone(), inbound_rx, token.clone()));
        tokio::spawn(receive(
            Arc::clone(&inner),
            dialer,
            current,
            inbound_tx,
            status_tx,
        ));

        Ok(Self { inner })
    }

    /// Send an encoded frame to the device
    ///
    /// A failed write drops the socket so the receive loop redials.
    ///
    /// # Returns
    /// Number of bytes written
    ///
    /// # Errors
    /// - `RctError::Cancelled` after shutdown
    /// - `RctError::Disconnected` if no socket is established
    /// - `RctError::Connection` if the write fails
    pub async fn send(&self, frame: &[u8]) -> RctResult<usize> {
        if self.inner.token.is_cancelled() {
            return Err(RctError::Cancelled);
        }

        let mut live = self.inner.live.lock().await;
        let current = live.as_mut().ok_or(RctError::Disconnected)?;
        match write_frame(&mut current.writer, frame).await {
            Ok(()) => Ok(frame.len()),
            Err(e) => {
                log::warn!("write failed, dropping socket: {}", e);
                Inner::release(&mut live);
                self.inner.connected.store(false, Ordering::SeqCst);
                Err(RctError::Connection(e))
            }
        }
    }

    /// Query the value of `identifier`
    ///
    /// A cached response younger than the query timeout is returned without
    /// any I/O. Otherwise a read request is sent and the first datagram
    /// carrying `identifier` is returned.
    ///
    /// # Errors
    /// - `RctError::Timeout` if nothing matching arrives within the query
    ///   timeout
    /// - any error of [`send`](Self::send)
    pub async fn query(&self, identifier: Identifier) -> RctResult<Datagram> {
        let timeout = self.inner.config.query_timeout;
        if let Some((datagram, received)) = self.inner.cache.get(identifier) {
            if received.elapsed() < timeout {
                return Ok(datagram);
            }
        }

        let mut subscription = self.inner.broker.subscribe();
        let (result_tx, mut result_rx) = mpsc::channel(1);
        // the filter owns the subscription; it ends on every exit of this
        // call, including the caller dropping it
        let _filter = AbortOnDrop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = result_tx.closed() => break,
                    datagram = subscription.recv() => match datagram {
                        Some(datagram) if datagram.identifier() == identifier => {
                            // first match wins; later ones find the slot taken
                            if let Err(TrySendError::Closed(_)) = result_tx.try_send(datagram) {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        }));

        self.exchange(identifier, &mut result_rx).await
    }

    async fn exchange(
        &self,
        identifier: Identifier,
        result_rx: &mut mpsc::Receiver<Datagram>,
    ) -> RctResult<Datagram> {
        let request = DatagramBuilder::from_datagram(&Datagram::read(identifier));
        log::debug!("query {:08X}: {}", identifier.value(), request);
        self.send(request.bytes()).await?;

        match tokio::time::timeout(self.inner.config.query_timeout, result_rx.recv()).await {
            Ok(Some(datagram)) => Ok(datagram),
            Ok(None) => Err(RctError::Cancelled),
            Err(_) => Err(RctError::Timeout),
        }
    }

    async fn query_response(&self, identifier: Identifier) -> RctResult<Datagram> {
        let datagram = self.query(identifier).await?;
        datagram.ensure_response_to(identifier)?;
        Ok(datagram)
    }

    /// Query `identifier` and decode the value as `f32`
    pub async fn query_f32(&self, identifier: Identifier) -> RctResult<f32> {
        self.query_response(identifier).await?.f32()
    }

    /// Query `identifier` and decode the value as `i32`
    pub async fn query_i32(&self, identifier: Identifier) -> RctResult<i32> {
        self.query_response(identifier).await?.i32()
    }

    /// Query `identifier` and decode the value as `u16`
    pub async fn query_u16(&self, identifier: Identifier) -> RctResult<u16> {
        self.query_response(identifier).await?.u16()
    }

    /// Query `identifier` and decode the value as `u8`
    pub async fn query_u8(&self, identifier: Identifier) -> RctResult<u8> {
        self.query_response(identifier).await?.u8()
    }

    /// Query the inverter's operating state
    pub async fn query_inverter_state(&self) -> RctResult<InverterState> {
        InverterState::try_from(self.query_u8(Identifier::INVERTER_STATE).await?)
    }

    /// Write `payload` to `identifier`
    ///
    /// Does not wait for a response; query the identifier to confirm.
    ///
    /// # Errors
    /// Returns `RctError::InvalidLength` if the payload does not fit in a
    /// frame, or any error of [`send`](Self::send).
    pub async fn write(&self, identifier: Identifier, payload: &[u8]) -> RctResult<()> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(RctError::InvalidLength {
                expected: MAX_PAYLOAD_LENGTH,
                actual: payload.len(),
            });
        }
        let request = DatagramBuilder::from_datagram(&Datagram::write(identifier, payload));
        log::debug!("write {:08X}: {}", identifier.value(), request);
        self.send(request.bytes()).await.map(|_| ())
    }

    /// Write a big-endian `f32` to `identifier`
    pub async fn write_f32(&self, identifier: Identifier, value: f32) -> RctResult<()> {
        self.write(identifier, &value.to_be_bytes()).await
    }

    /// Write a big-endian `i32` to `identifier`
    pub async fn write_i32(&self, identifier: Identifier, value: i32) -> RctResult<()> {
        self.write(identifier, &value.to_be_bytes()).await
    }

    /// Write a big-endian `u16` to `identifier`
    pub async fn write_u16(&self, identifier: Identifier, value: u16) -> RctResult<()> {
        self.write(identifier, &value.to_be_bytes()).await
    }

    /// Write a `u8` to `identifier`
    pub async fn write_u8(&self, identifier: Identifier, value: u8) -> RctResult<()> {
        self.write(identifier, &[value]).await
    }

    /// Subscribe to every datagram received from the device
    ///
    /// Delivery is best effort: messages are dropped for a subscriber that
    /// falls behind.
    pub fn subscribe(&self) -> Subscription<Datagram> {
        self.inner.broker.subscribe()
    }

    /// Cancel a subscription
    pub fn unsubscribe(&self, subscription: Subscription<Datagram>) {
        self.inner.broker.unsubscribe(subscription);
    }

    /// Get the cached response for `identifier` and when it arrived
    pub fn get(&self, identifier: Identifier) -> Option<(Datagram, Instant)> {
        self.inner.cache.get(identifier)
    }

    /// Check whether a socket is currently established
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Time of the last successful read from the device
    pub fn last_received(&self) -> Option<Instant> {
        *self.inner.last_received.lock()
    }

    /// Get the connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Stop all background tasks and drop the socket
    ///
    /// The token passed to the builder is not affected.
    pub fn shutdown(&self) {
        self.inner.token.cancel();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn write_frame(writer: &mut BoxedWriter, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Receive loop: read the socket, redial when it is gone
async fn receive(
    inner: Arc<Inner>,
    dialer: Arc<dyn Dialer>,
    current: (BoxedReader, CancellationToken),
    inbound_tx: mpsc::Sender<Inbound>,
    status_tx: mpsc::Sender<RctResult<()>>,
) {
    let token = inner.token.clone();
    let mut current = Some(current);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        if current.is_none() {
            match redial(&inner, dialer.as_ref(), &status_tx).await {
                Some(link) => {
                    if inbound_tx.send(Inbound::Reset).await.is_err() {
                        break;
                    }
                    current = Some(link);
                }
                None => break,
            }
        }
        let Some((reader, closed)) = current.as_mut() else {
            continue;
        };

        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = closed.cancelled() => None,
            read = reader.read(&mut buf) => Some(read),
        };

        let error = match read {
            // dropped by a failed write
            None => {
                current = None;
                continue;
            }
            Some(Ok(0)) => {
                io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by device")
            }
            Some(Ok(n)) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if inbound_tx.send(Inbound::Chunk(chunk)).await.is_err() {
                    break;
                }
                let _ = status_tx.send(Ok(())).await;
                continue;
            }
            Some(Err(e)) => e,
        };

        log::warn!("read failed: {}", error);
        inner.disconnect().await;
        current = None;
        let _ = status_tx.send(Err(RctError::Connection(error))).await;
    }

    inner.disconnect().await;
    log::debug!("receive loop stopped");
}

/// Dial until a socket is established, starting the backoff over whenever
/// it runs out
///
/// Returns None once the connection is cancelled.
async fn redial(
    inner: &Inner,
    dialer: &dyn Dialer,
    status_tx: &mpsc::Sender<RctResult<()>>,
) -> Option<(BoxedReader, CancellationToken)> {
    let token = &inner.token;
    let mut backoff = Backoff::new(inner.config.backoff.clone());

    loop {
        let dialed = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            dialed = dialer.dial() => dialed,
        };
        match dialed {
            Ok(link) => {
                log::info!("reconnected to {}", dialer.endpoint());
                return Some(inner.install(link).await);
            }
            Err(e) => {
                log::warn!("dialing {} failed: {}", dialer.endpoint(), e);
                let _ = status_tx.send(Err(e)).await;
            }
        }

        let delay = match backoff.next_delay() {
            Some(delay) => delay,
            None => {
                log::warn!(
                    "no connection to {} after {:?}, still retrying",
                    dialer.endpoint(),
                    backoff.elapsed()
                );
                backoff.reset();
                continue;
            }
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Decoder task: turn received chunks into published datagrams
async fn decode(
    broker: Broker<Datagram>,
    mut inbound_rx: mpsc::Receiver<Inbound>,
    token: CancellationToken,
) {
    let mut parser = DatagramParser::new();
    loop {
        let inbound = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            inbound = inbound_rx.recv() => match inbound {
                Some(inbound) => inbound,
                None => break,
            },
        };
        match inbound {
            Inbound::Reset => parser.reset(),
            Inbound::Chunk(chunk) => {
                for datagram in parser.parse(&chunk) {
                    if broker.publish(datagram).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
    log::debug!("decoder stopped: {:?}", parser.statistics());
}

/// Cache task: store every response
async fn update_cache(inner: Arc<Inner>, mut subscription: Subscription<Datagram>) {
    loop {
        tokio::select! {
            biased;
            _ = inner.token.cancelled() => break,
            datagram = subscription.recv() => match datagram {
                Some(datagram) if datagram.is_response() => inner.cache.put(datagram),
                Some(_) => {}
                None => break,
            },
        }
    }
}

/// Status task: track read acknowledgements, forward transport failures to
/// the error callback
async fn report_status(
    inner: Arc<Inner>,
    mut status_rx: mpsc::Receiver<RctResult<()>>,
    on_error: Option<ErrorCallback>,
) {
    loop {
        let status = tokio::select! {
            biased;
            _ = inner.token.cancelled() => break,
            status = status_rx.recv() => match status {
                Some(status) => status,
                None => break,
            },
        };
        match status {
            Ok(()) => *inner.last_received.lock() = Some(Instant::now()),
            Err(e) => {
                if let Some(callback) = on_error.as_ref() {
                    callback(&e);
                }
            }
        }
    }
}
