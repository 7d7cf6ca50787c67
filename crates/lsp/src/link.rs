//! The dispatcher's back-reference to its connection.
//!
//! A [`PeerLink`] is the only thing the dispatcher knows about the connection: the FIFO
//! outbound queue the write loop drains, and the table of outstanding outbound requests.
//! Both are guarded by one lock so that closing the link, failing the pending table and
//! enqueuing the write loop's close marker form a single cut: every message enqueued before
//! the cut is ahead of the marker, and no message or request can be added after it.

use std::collections::HashMap;
use std::time::Duration;

use conduit_rpc::{AnyNotification, AnyRequest, AnyResponse, CounterIdGen, JsonValue, Message, RequestId};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

/// Items on the outbound queue.
#[derive(Debug)]
pub(crate) enum Outbound {
	/// A message to frame and write.
	Message(Message),
	/// Everything before this has been written; close the stream.
	Close,
}

/// An outbound request awaiting its response.
#[derive(Debug)]
struct PendingRequest {
	method: String,
	tx: oneshot::Sender<AnyResponse>,
}

#[derive(Debug)]
struct LinkState {
	open: bool,
	ids: CounterIdGen,
	pending: HashMap<RequestId, PendingRequest>,
}

#[derive(Debug)]
pub(crate) struct PeerLink {
	tx: mpsc::UnboundedSender<Outbound>,
	state: Mutex<LinkState>,
	request_timeout: Option<Duration>,
}

impl PeerLink {
	pub(crate) fn new(request_timeout: Option<Duration>) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let link = Self {
			tx,
			state: Mutex::new(LinkState {
				open: true,
				ids: CounterIdGen::new(),
				pending: HashMap::new(),
			}),
			request_timeout,
		};
		(link, rx)
	}

	pub(crate) fn is_open(&self) -> bool {
		self.state.lock().open
	}

	pub(crate) fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout
	}

	/// Enqueues a message for the write loop.
	pub(crate) fn send(&self, msg: Message) -> Result<()> {
		let state = self.state.lock();
		if !state.open {
			return Err(Error::NotConnected);
		}
		self.tx.send(Outbound::Message(msg)).map_err(|_| Error::NotConnected)
	}

	pub(crate) fn notify(&self, method: &str, params: JsonValue) -> Result<()> {
		self.send(Message::Notification(AnyNotification {
			method: method.to_owned(),
			params,
		}))
	}

	/// Allocates an id, records the pending request and enqueues it.
	pub(crate) fn start_request(&self, method: &str, params: JsonValue) -> Result<(RequestId, oneshot::Receiver<AnyResponse>)> {
		let mut state = self.state.lock();
		if !state.open {
			return Err(Error::NotConnected);
		}
		let id = state.ids.next();
		let (tx, rx) = oneshot::channel();
		let req = AnyRequest {
			id: id.clone(),
			method: method.to_owned(),
			params,
		};
		self.tx.send(Outbound::Message(Message::Request(req))).map_err(|_| Error::NotConnected)?;
		let prev = state.pending.insert(
			id.clone(),
			PendingRequest {
				method: method.to_owned(),
				tx,
			},
		);
		debug_assert!(prev.is_none(), "request id {id} reused while outstanding");
		Ok((id, rx))
	}

	/// Resolves the pending request `resp` answers. Returns `false` for unknown ids.
	pub(crate) fn complete(&self, resp: AnyResponse) -> bool {
		let Some(pending) = self.state.lock().pending.remove(&resp.id) else {
			return false;
		};
		tracing::trace!(id = %resp.id, method = %pending.method, "lsp.request.complete");
		// The caller may have stopped waiting.
		let _: Result<(), _> = pending.tx.send(resp);
		true
	}

	/// Drops a pending request without resolving it. Returns `false` if it was already gone.
	pub(crate) fn forget(&self, id: &RequestId) -> bool {
		self.state.lock().pending.remove(id).is_some()
	}

	/// Stops accepting messages and fails every pending request.
	///
	/// With `flush`, a close marker is queued behind the messages already enqueued. Returns the
	/// number of requests failed. Idempotent.
	pub(crate) fn close(&self, flush: bool) -> usize {
		let mut state = self.state.lock();
		if state.open {
			state.open = false;
			if flush {
				let _: Result<(), _> = self.tx.send(Outbound::Close);
			}
		}
		let failed = state.pending.len();
		for (id, pending) in state.pending.drain() {
			tracing::debug!(id = %id, method = %pending.method, "lsp.request.connection_closed");
			// Dropping the sender resolves the waiter with `ConnectionClosed`.
			drop(pending.tx);
		}
		failed
	}

	#[cfg(test)]
	pub(crate) fn pending_len(&self) -> usize {
		self.state.lock().pending.len()
	}
}

/// Removes a pending request and tells the peer to stop working on it, unless disarmed.
pub(crate) struct CancelOnDrop<'a> {
	link: &'a PeerLink,
	id: Option<RequestId>,
}

impl<'a> CancelOnDrop<'a> {
	pub(crate) fn new(link: &'a PeerLink, id: RequestId) -> Self {
		Self { link, id: Some(id) }
	}

	pub(crate) fn disarm(&mut self) {
		self.id = None;
	}
}

impl Drop for CancelOnDrop<'_> {
	fn drop(&mut self) {
		let Some(id) = self.id.take() else {
			return;
		};
		if self.link.forget(&id) {
			let params = serde_json::json!({ "id": id });
			if let Err(err) = self.link.notify(crate::dispatcher::CANCEL_REQUEST, params) {
				tracing::trace!(id = %id, error = %err, "lsp.request.cancel_not_sent");
			}
		}
	}
}
