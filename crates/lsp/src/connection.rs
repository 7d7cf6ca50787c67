//! A JSON-RPC connection over a duplex byte stream.
//!
//! [`Connection::connect`] binds a [`Dispatcher`] and spawns three tasks:
//!
//! - the read loop, a single sequential reader handing each frame to the dispatcher;
//! - the write loop, a single writer draining the FIFO outbound queue;
//! - a supervisor that waits for both loops, fails what is left and publishes
//!   [`ConnectionState::Closed`].
//!
//! Teardown is triggered by [`Connection::disconnect`], by the peer closing its side (EOF),
//! by a protocol error on read, or by a failed write.

use std::future::Future;
use std::sync::Arc;

use conduit_rpc::Message;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::config::ConnectionConfig;
use crate::dispatcher::Dispatcher;
use crate::link::{Outbound, PeerLink};
use crate::{Error, Result};

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle of a [`Connection`].
///
/// `Disconnected -> Connecting -> Connected -> Disconnecting -> Closed`. `Closed` is terminal:
/// the stream is gone and the connection cannot be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	/// Created, not yet connected.
	Disconnected,
	/// [`Connection::connect`] in progress.
	Connecting,
	/// Both loops running.
	Connected,
	/// Teardown started; pending requests already failed.
	Disconnecting,
	/// Both loops stopped and the stream closed.
	Closed,
}

struct Io {
	reader: BoxReader,
	writer: BoxWriter,
}

struct Shared {
	config: ConnectionConfig,
	state: watch::Sender<ConnectionState>,
	/// Stops the read loop. Parent of every inbound request's token.
	shutdown: CancellationToken,
	/// Stops the write loop without draining the queue.
	abort_writes: CancellationToken,
	link: RwLock<Option<Arc<PeerLink>>>,
	dispatcher: RwLock<Option<Dispatcher>>,
}

impl Shared {
	/// Moves a live connection to `Disconnecting`. Returns `false` if teardown already began.
	///
	/// The link slot is read-locked across the transition so that `connect` either installs its
	/// link before this runs or observes `Disconnecting` afterwards and closes the link itself.
	fn begin_disconnect(&self, flush: bool) -> bool {
		let link = self.link.read();
		let began = self.state.send_if_modified(|state| match state {
			ConnectionState::Connecting | ConnectionState::Connected => {
				*state = ConnectionState::Disconnecting;
				true
			}
			_ => false,
		});
		if !began {
			return false;
		}

		if let Some(link) = link.as_ref() {
			let failed = link.close(flush);
			debug!(flush, failed_requests = failed, "lsp.connection.disconnecting");
		}
		drop(link);
		if !flush {
			self.abort_writes.cancel();
		}
		self.shutdown.cancel();
		true
	}
}

/// One end of a JSON-RPC conversation.
///
/// Owns its stream from construction until teardown. Dropping a live connection tears it
/// down without flushing.
pub struct Connection {
	shared: Arc<Shared>,
	io: Mutex<Option<Io>>,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("state", &self.state())
			.field("config", &self.shared.config)
			.finish_non_exhaustive()
	}
}

impl Connection {
	/// A connection over separate read and write halves, with default configuration.
	pub fn new<R, W>(reader: R, writer: W) -> Self
	where
		R: AsyncRead + Send + Unpin + 'static,
		W: AsyncWrite + Send + Unpin + 'static,
	{
		Self::with_config(reader, writer, ConnectionConfig::default())
	}

	/// A connection over separate read and write halves.
	pub fn with_config<R, W>(reader: R, writer: W, config: ConnectionConfig) -> Self
	where
		R: AsyncRead + Send + Unpin + 'static,
		W: AsyncWrite + Send + Unpin + 'static,
	{
		let (state, _) = watch::channel(ConnectionState::Disconnected);
		Self {
			shared: Arc::new(Shared {
				config,
				state,
				shutdown: CancellationToken::new(),
				abort_writes: CancellationToken::new(),
				link: RwLock::new(None),
				dispatcher: RwLock::new(None),
			}),
			io: Mutex::new(Some(Io {
				reader: Box::new(reader),
				writer: Box::new(writer),
			})),
		}
	}

	/// A connection over a single duplex stream.
	pub fn from_stream<S>(stream: S) -> Self
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (reader, writer) = tokio::io::split(stream);
		Self::new(reader, writer)
	}

	/// The current lifecycle state.
	#[must_use]
	pub fn state(&self) -> ConnectionState {
		*self.shared.state.borrow()
	}

	/// A receiver observing every state transition.
	#[must_use]
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.shared.state.subscribe()
	}

	/// The configuration this connection was built with.
	#[must_use]
	pub fn config(&self) -> &ConnectionConfig {
		&self.shared.config
	}

	/// Binds `dispatcher` and starts the read and write loops.
	///
	/// Must be called from within a tokio runtime.
	///
	/// # Errors
	///
	/// - [`Error::AlreadyConnected`] if this connection was already connected, or if
	///   `dispatcher` is bound to another live connection.
	/// - [`Error::ConnectionClosed`] if this connection has been torn down.
	pub fn connect(&self, dispatcher: Dispatcher) -> Result<()> {
		let mut current = ConnectionState::Disconnected;
		let accepted = self.shared.state.send_if_modified(|state| {
			current = *state;
			if *state == ConnectionState::Disconnected {
				*state = ConnectionState::Connecting;
				true
			} else {
				false
			}
		});
		if !accepted {
			return Err(match current {
				ConnectionState::Closed => Error::ConnectionClosed,
				_ => Error::AlreadyConnected,
			});
		}

		let Some(io) = self.io.lock().take() else {
			self.shared.state.send_replace(ConnectionState::Closed);
			return Err(Error::ConnectionClosed);
		};
		let (link, outbound_rx) = PeerLink::new(self.shared.config.request_timeout());
		let link = Arc::new(link);
		if let Err(err) = dispatcher.bind(Arc::clone(&link)) {
			*self.io.lock() = Some(io);
			let restored = self.shared.state.send_if_modified(|state| {
				if *state == ConnectionState::Connecting {
					*state = ConnectionState::Disconnected;
					true
				} else {
					false
				}
			});
			if !restored {
				// Disconnected concurrently: nothing was started, so there is nothing to tear down.
				self.io.lock().take();
				self.shared.state.send_replace(ConnectionState::Closed);
			}
			return Err(err);
		}
		*self.shared.dispatcher.write() = Some(dispatcher.clone());
		let connected = {
			let mut slot = self.shared.link.write();
			*slot = Some(Arc::clone(&link));
			self.shared.state.send_if_modified(|state| {
				if *state == ConnectionState::Connecting {
					*state = ConnectionState::Connected;
					true
				} else {
					false
				}
			})
		};
		if connected {
			info!(max_content_length = self.shared.config.max_content_length, "lsp.connection.connected");
		} else {
			// A disconnect landed while connecting, before the link was visible to it. The abort
			// token already carries its flush choice.
			let failed = link.close(true);
			self.shared.shutdown.cancel();
			debug!(failed_requests = failed, "lsp.connection.disconnected_while_connecting");
		}

		let read_task = tokio::spawn(read_loop(Arc::clone(&self.shared), io.reader, dispatcher, Arc::clone(&link)));
		let write_task = tokio::spawn(write_loop(Arc::clone(&self.shared), io.writer, outbound_rx));
		let shared = Arc::clone(&self.shared);
		tokio::spawn(async move {
			let (read, write) = tokio::join!(read_task, write_task);
			for (task, outcome) in [("read", read), ("write", write)] {
				if let Err(err) = outcome {
					error!(task, error = %err, "lsp.connection.loop_failed");
				}
			}
			shared.begin_disconnect(false);
			link.close(false);
			shared.shutdown.cancel();
			shared.state.send_replace(ConnectionState::Closed);
			debug!("lsp.connection.closed");
		});
		Ok(())
	}

	/// Starts teardown.
	///
	/// With `flush_outgoing`, every message enqueued before this call is written before the
	/// stream closes; without it, queued messages may be discarded. Either way every
	/// outstanding outbound request fails with [`Error::ConnectionClosed`] immediately.
	/// Calling it again, or on a connection that is already closing, has no effect. A
	/// connection that was never connected moves straight to [`ConnectionState::Closed`].
	pub fn disconnect(&self, flush_outgoing: bool) {
		let never_connected = self.shared.state.send_if_modified(|state| {
			if *state == ConnectionState::Disconnected {
				*state = ConnectionState::Closed;
				true
			} else {
				false
			}
		});
		if never_connected {
			self.io.lock().take();
			debug!("lsp.connection.closed_unconnected");
			return;
		}
		self.shared.begin_disconnect(flush_outgoing);
	}

	/// Resolves once teardown is complete: both loops stopped, the stream closed and every
	/// pending request failed. No message is sent or delivered afterwards.
	pub fn has_disconnected(&self) -> impl Future<Output = ()> + Send + 'static {
		let mut state = self.shared.state.subscribe();
		async move {
			// A dropped sender means the connection is gone as well.
			let _closed = state.wait_for(|s| *s == ConnectionState::Closed).await.is_ok();
		}
	}

	/// The bound dispatcher.
	///
	/// # Errors
	///
	/// [`Error::NotConnected`] before [`Connection::connect`].
	pub fn dispatcher(&self) -> Result<Dispatcher> {
		self.shared.dispatcher.read().clone().ok_or(Error::NotConnected)
	}

	/// See [`Dispatcher::send_empty_notification`].
	///
	/// # Errors
	///
	/// [`Error::NotConnected`] unless connected.
	pub fn send_empty_notification(&self, method: &str) -> Result<()> {
		self.dispatcher()?.send_empty_notification(method)
	}

	/// See [`Dispatcher::send_notification`].
	///
	/// # Errors
	///
	/// [`Error::NotConnected`] unless connected; [`Error::Codec`] for unserializable params.
	pub fn send_notification<T: Serialize>(&self, method: &str, params: T) -> Result<()> {
		self.dispatcher()?.send_notification(method, params)
	}

	/// See [`Dispatcher::send_request`].
	///
	/// # Errors
	///
	/// As [`Dispatcher::send_request`].
	pub async fn send_request<R: DeserializeOwned>(&self, method: &str, params: impl Serialize) -> Result<R> {
		self.dispatcher()?.send_request(method, params).await
	}

	/// See [`Dispatcher::send_command`].
	///
	/// # Errors
	///
	/// As [`Dispatcher::send_command`].
	pub async fn send_command(&self, method: &str, params: impl Serialize) -> Result<()> {
		self.dispatcher()?.send_command(method, params).await
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		if self.shared.begin_disconnect(false) {
			debug!("lsp.connection.dropped_while_connected");
		}
	}
}

async fn read_loop(shared: Arc<Shared>, reader: BoxReader, dispatcher: Dispatcher, link: Arc<PeerLink>) {
	let mut reader = BufReader::new(reader);
	let max_len = shared.config.max_content_length;
	loop {
		// Reading is not resumable mid-frame, which is fine: the loop never reads again once
		// shutdown fires.
		let read = tokio::select! {
			biased;
			() = shared.shutdown.cancelled() => break,
			read = Message::read(&mut reader, max_len) => read,
		};
		match read {
			Ok(Some(msg)) => {
				trace!(method = ?msg.method(), "lsp.connection.recv");
				dispatcher.dispatch(msg, &link, &shared.shutdown);
			}
			Ok(None) => {
				debug!(flush = shared.config.flush_on_eof, "lsp.connection.eof");
				shared.begin_disconnect(shared.config.flush_on_eof);
				break;
			}
			Err(err) => {
				error!(error = %err, "lsp.connection.protocol_error");
				shared.begin_disconnect(false);
				break;
			}
		}
	}
	trace!("lsp.connection.read_loop_exit");
}

async fn write_loop(shared: Arc<Shared>, mut writer: BoxWriter, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
	loop {
		let out = tokio::select! {
			biased;
			() = shared.abort_writes.cancelled() => break,
			out = outbound_rx.recv() => out,
		};
		let msg = match out {
			Some(Outbound::Message(msg)) => msg,
			Some(Outbound::Close) | None => break,
		};
		let written = tokio::select! {
			biased;
			() = shared.abort_writes.cancelled() => break,
			written = msg.write(&mut writer) => written,
		};
		if let Err(err) = written {
			error!(error = %err, "lsp.connection.write_failed");
			shared.begin_disconnect(false);
			break;
		}
	}

	let mut discarded = 0usize;
	while outbound_rx.try_recv().is_ok() {
		discarded += 1;
	}
	if discarded > 0 {
		debug!(discarded, "lsp.connection.discarded_outbound");
	}
	if let Err(err) = writer.shutdown().await {
		debug!(error = %err, "lsp.connection.shutdown_failed");
	}
	trace!("lsp.connection.write_loop_exit");
}
