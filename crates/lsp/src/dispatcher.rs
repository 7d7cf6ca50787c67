//! Method-name routing for inbound messages and the outbound request/notification API.
//!
//! A [`Dispatcher`] owns two kinds of registrations:
//!
//! - plain handlers, one per method and per table (notifications vs. requests), registered via
//!   the `handle_*` methods;
//! - selector-routed [`HandlerDescriptor`]s, any number per method, resolved per document by the
//!   [`TextDocumentMatcher`].
//!
//! When a method has descriptors, they take precedence over its plain handler. Every inbound
//! notification or request is handed to its handler on a separate tokio task, so the read loop
//! never waits for handler code.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use conduit_rpc::{AnyNotification, AnyRequest, AnyResponse, ErrorCode, JsonValue, Message, RequestId, ResponseError};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::descriptor::{HandlerDescriptor, Registration};
use crate::handler::{Handler, panic_message};
use crate::link::{CancelOnDrop, PeerLink};
use crate::matcher::{DocumentLanguages, TextDocumentMatcher};
use crate::{Error, Result};


/// Notification asking the receiver to abandon an in-flight request.
pub const CANCEL_REQUEST: &str = "$/cancelRequest";

/// Registry of handlers for one connection, plus its outbound API.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
	inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
	notifications: RwLock<HashMap<String, Handler>>,
	requests: RwLock<HashMap<String, Handler>>,
	/// In registration order.
	descriptors: RwLock<Vec<Arc<HandlerDescriptor>>>,
	languages: DocumentLanguages,
	/// Cancellation tokens of inbound requests whose handlers are running.
	inflight: Mutex<HashMap<RequestId, CancellationToken>>,
	link: RwLock<Option<Arc<PeerLink>>>,
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("notifications", &self.inner.notifications.read().len())
			.field("requests", &self.inner.requests.read().len())
			.field("descriptors", &self.inner.descriptors.read().len())
			.field("connected", &self.is_connected())
			.finish()
	}
}

impl Dispatcher {
	/// An empty dispatcher.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a notification handler that ignores params.
	///
	/// # Errors
	///
	/// [`Error::DuplicateHandler`] if `method` already has a notification handler.
	pub fn handle_empty_notification(&self, method: &str, callback: impl Fn() + Send + Sync + 'static) -> Result<()> {
		self.insert(&self.inner.notifications, method, Handler::empty_notification(callback))
	}

	/// Registers a typed notification handler.
	///
	/// Params that fail to decode into `T` are logged and the notification is dropped.
	///
	/// # Errors
	///
	/// [`Error::DuplicateHandler`] if `method` already has a notification handler.
	pub fn handle_notification<T, F>(&self, method: &str, callback: F) -> Result<()>
	where
		T: DeserializeOwned + 'static,
		F: Fn(T) + Send + Sync + 'static,
	{
		self.insert(&self.inner.notifications, method, Handler::notification(callback))
	}

	/// Registers a request handler producing a response payload.
	///
	/// An `Err` from the handler is sent to the peer as is; a panic becomes
	/// [`ErrorCode::INTERNAL_ERROR`]; undecodable params become [`ErrorCode::INVALID_PARAMS`].
	///
	/// # Errors
	///
	/// [`Error::DuplicateHandler`] if `method` already has a request handler.
	pub fn handle_request<TReq, TRes, F, Fut>(&self, method: &str, callback: F) -> Result<()>
	where
		TReq: DeserializeOwned + 'static,
		TRes: Serialize + 'static,
		F: Fn(TReq, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = std::result::Result<TRes, ResponseError>> + Send + 'static,
	{
		self.insert(&self.inner.requests, method, Handler::request(callback))
	}

	/// Registers a command request handler, acknowledged with an empty (`null`) result.
	///
	/// # Errors
	///
	/// [`Error::DuplicateHandler`] if `method` already has a request handler.
	pub fn handle_command<TReq, F, Fut>(&self, method: &str, callback: F) -> Result<()>
	where
		TReq: DeserializeOwned + 'static,
		F: Fn(TReq, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = std::result::Result<(), ResponseError>> + Send + 'static,
	{
		self.insert(&self.inner.requests, method, Handler::command(callback))
	}

	fn insert(&self, table: &RwLock<HashMap<String, Handler>>, method: &str, handler: Handler) -> Result<()> {
		match table.write().entry(method.to_owned()) {
			Entry::Occupied(_) => Err(Error::DuplicateHandler {
				method: method.to_owned(),
				kind: handler.kind(),
			}),
			Entry::Vacant(slot) => {
				trace!(method, kind = %handler.kind(), "lsp.handler.register");
				slot.insert(handler);
				Ok(())
			}
		}
	}

	/// Registers a selector-routed handler.
	///
	/// # Errors
	///
	/// [`Error::DuplicateHandler`] if a descriptor with the same method and key is registered.
	pub fn register_descriptor(&self, descriptor: HandlerDescriptor) -> Result<Registration> {
		let descriptor = Arc::new(descriptor);
		{
			let mut descriptors = self.inner.descriptors.write();
			if descriptors
				.iter()
				.any(|d| d.method() == descriptor.method() && d.key() == descriptor.key())
			{
				return Err(Error::DuplicateHandler {
					method: descriptor.method().to_owned(),
					kind: descriptor.kind(),
				});
			}
			descriptors.push(Arc::clone(&descriptor));
		}

		let registry: Weak<Inner> = Arc::downgrade(&self.inner);
		let target = Arc::downgrade(&descriptor);
		descriptor.chain_unregister(move || {
			let Some(inner) = registry.upgrade() else {
				return;
			};
			inner.descriptors.write().retain(|d| !Weak::ptr_eq(&Arc::downgrade(d), &target));
		});
		debug!(method = descriptor.method(), key = descriptor.key(), "lsp.descriptor.register");
		Ok(Registration::new(descriptor))
	}

	/// Descriptors registered for `method`, in registration order.
	#[must_use]
	pub fn descriptors_for(&self, method: &str) -> Vec<Arc<HandlerDescriptor>> {
		self.inner
			.descriptors
			.read()
			.iter()
			.filter(|d| d.method() == method)
			.cloned()
			.collect()
	}

	/// A matcher sharing this dispatcher's view of open documents.
	#[must_use]
	pub fn matcher(&self) -> TextDocumentMatcher {
		TextDocumentMatcher::with_languages(self.inner.languages.clone())
	}

	/// Whether a live connection is bound.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.inner.link.read().as_ref().is_some_and(|link| link.is_open())
	}

	/// Sends a notification without params.
	///
	/// # Errors
	///
	/// [`Error::NotConnected`] unless a connection is bound and connected.
	pub fn send_empty_notification(&self, method: &str) -> Result<()> {
		self.link()?.notify(method, JsonValue::Null)
	}

	/// Sends a notification.
	///
	/// # Errors
	///
	/// [`Error::NotConnected`] unless connected; [`Error::Codec`] if `params` cannot be
	/// serialized.
	pub fn send_notification<T: Serialize>(&self, method: &str, params: T) -> Result<()> {
		let params = serde_json::to_value(params)?;
		self.link()?.notify(method, params)
	}

	/// Sends a request and waits for its result.
	///
	/// Dropping the returned future before it resolves forgets the request and sends
	/// `$/cancelRequest` to the peer.
	///
	/// # Errors
	///
	/// - [`Error::NotConnected`] unless connected.
	/// - [`Error::Response`] when the peer answers with an error.
	/// - [`Error::ConnectionClosed`] when the connection goes away first.
	/// - [`Error::RequestTimeout`] when a configured timeout elapses first.
	/// - [`Error::Codec`] when params or result do not convert.
	pub async fn send_request<R: DeserializeOwned>(&self, method: &str, params: impl Serialize) -> Result<R> {
		let result = self.request_value(method, serde_json::to_value(params)?).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Sends a request whose result carries no payload.
	///
	/// # Errors
	///
	/// As [`Dispatcher::send_request`], except that any result payload is accepted.
	pub async fn send_command(&self, method: &str, params: impl Serialize) -> Result<()> {
		self.request_value(method, serde_json::to_value(params)?).await?;
		Ok(())
	}

	async fn request_value(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
		let link = self.link()?;
		let (id, rx) = link.start_request(method, params)?;
		let mut guard = CancelOnDrop::new(&link, id);

		let resp = match link.request_timeout() {
			Some(limit) => match tokio::time::timeout(limit, rx).await {
				Ok(resp) => resp,
				Err(_elapsed) => return Err(Error::RequestTimeout(method.to_owned())),
			},
			None => rx.await,
		};
		guard.disarm();

		match resp {
			Ok(resp) => Ok(resp.into_result()?),
			Err(_closed) => Err(Error::ConnectionClosed),
		}
	}

	fn link(&self) -> Result<Arc<PeerLink>> {
		match &*self.inner.link.read() {
			Some(link) if link.is_open() => Ok(Arc::clone(link)),
			_ => Err(Error::NotConnected),
		}
	}

	/// Binds the connection's link. Fails if another live connection is bound.
	pub(crate) fn bind(&self, link: Arc<PeerLink>) -> Result<()> {
		let mut slot = self.inner.link.write();
		if slot.as_ref().is_some_and(|l| l.is_open()) {
			return Err(Error::AlreadyConnected);
		}
		*slot = Some(link);
		Ok(())
	}

	/// Routes one inbound message. Never waits for handler code.
	///
	/// Responses produced by request handlers go back through `link`; `cancel` is the
	/// connection's root token, parent of every request's token.
	pub(crate) fn dispatch(&self, msg: Message, link: &Arc<PeerLink>, cancel: &CancellationToken) {
		match msg {
			Message::Response(resp) => {
				let id = resp.id.clone();
				if !link.complete(resp) {
					warn!(id = %id, "lsp.response.unknown_id: dropping response for a request that is not outstanding");
				}
			}
			Message::UnidentifiedError(err) => {
				warn!(code = err.code.0, message = %err.message, "lsp.response.null_id: dropping error response without an id");
			}
			Message::Notification(notif) => self.dispatch_notification(notif),
			Message::Request(req) => self.dispatch_request(req, link, cancel),
		}
	}

	fn dispatch_notification(&self, notif: AnyNotification) {
		let AnyNotification { method, params } = notif;
		if method == CANCEL_REQUEST {
			self.cancel_inbound(&params);
			return;
		}

		self.inner.languages.observe_open(&method, &params);
		let descriptors: Vec<_> = self
			.descriptors_for(&method)
			.into_iter()
			.filter(|d| !d.kind().is_request())
			.collect();
		let handlers: Vec<Handler> = if descriptors.is_empty() {
			self.inner.notifications.read().get(&method).cloned().into_iter().collect()
		} else {
			self.matcher()
				.find_handler(&params, &descriptors)
				.iter()
				.map(|d| d.handler().clone())
				.collect()
		};
		self.inner.languages.observe_close(&method, &params);

		if handlers.is_empty() {
			trace!(method = %method, "lsp.notification.unhandled");
			return;
		}
		for handler in handlers {
			let method = method.clone();
			let params = params.clone();
			tokio::spawn(async move { run_notification(&method, &handler, params) });
		}
	}

	fn dispatch_request(&self, req: AnyRequest, link: &Arc<PeerLink>, cancel: &CancellationToken) {
		let AnyRequest { id, method, params } = req;
		let descriptors: Vec<_> = self
			.descriptors_for(&method)
			.into_iter()
			.filter(|d| d.kind().is_request())
			.collect();
		let handler = if descriptors.is_empty() {
			self.inner.requests.read().get(&method).cloned()
		} else {
			self.matcher()
				.find_request_handler(&params, &descriptors)
				.map(|d| d.handler().clone())
		};

		let Some(handler) = handler else {
			debug!(id = %id, method = %method, "lsp.request.method_not_found");
			let err = ResponseError::new(ErrorCode::METHOD_NOT_FOUND, format!("No such method {method}"));
			reply(link, AnyResponse::err(id, err));
			return;
		};

		let token = cancel.child_token();
		self.inner.inflight.lock().insert(id.clone(), token.clone());
		let inner = Arc::clone(&self.inner);
		let link = Arc::clone(link);
		tokio::spawn(async move {
			let result = run_request(handler, params, token).await;
			inner.inflight.lock().remove(&id);
			if let Err(err) = &result {
				debug!(id = %id, method = %method, error = %err, "lsp.request.failed");
			}
			let resp = match result {
				Ok(value) => AnyResponse::ok(id, value),
				Err(err) => AnyResponse::err(id, err),
			};
			reply(&link, resp);
		});
	}

	fn cancel_inbound(&self, params: &JsonValue) {
		let Ok(id) = serde_json::from_value::<RequestId>(params["id"].clone()) else {
			warn!(params = %params, "lsp.cancel.invalid_params");
			return;
		};
		match self.inner.inflight.lock().get(&id) {
			Some(token) => {
				debug!(id = %id, "lsp.request.cancelled_by_peer");
				token.cancel();
			}
			None => trace!(id = %id, "lsp.cancel.not_inflight"),
		}
	}
}

fn run_notification(method: &str, handler: &Handler, params: JsonValue) {
	let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| match handler {
		Handler::EmptyNotification(callback) => {
			callback();
			Ok(())
		}
		Handler::Notification(callback) => callback(params),
		Handler::Request(_) | Handler::CommandRequest(_) => {
			warn!(method, "lsp.notification.request_handler: notification routed to a request handler");
			Ok(())
		}
	}));
	match outcome {
		Ok(Ok(())) => {}
		Ok(Err(err)) => warn!(method, error = %err, "lsp.notification.invalid_params"),
		Err(payload) => warn!(method, panic = %panic_message(&*payload), "lsp.notification.handler_panicked"),
	}
}

async fn run_request(handler: Handler, params: JsonValue, token: CancellationToken) -> std::result::Result<JsonValue, ResponseError> {
	let callback = match handler {
		Handler::Request(callback) | Handler::CommandRequest(callback) => callback,
		Handler::Notification(_) | Handler::EmptyNotification(_) => {
			return Err(ResponseError::new(ErrorCode::METHOD_NOT_FOUND, "method is a notification"));
		}
	};
	match AssertUnwindSafe(async move { callback(params, token).await })
		.catch_unwind()
		.await
	{
		Ok(result) => result,
		Err(payload) => Err(ResponseError::internal(panic_message(&*payload))),
	}
}

fn reply(link: &PeerLink, resp: AnyResponse) {
	let id = resp.id.clone();
	if let Err(err) = link.send(Message::Response(resp)) {
		debug!(id = %id, error = %err, "lsp.response.not_sent");
	}
}
