//! Metadata records for selector-routed handler registrations.

use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use conduit_rpc::ResponseError;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::handler::{Handler, HandlerKind};
use crate::selector::DocumentSelector;

type UnregisterFn = Box<dyn FnOnce() + Send>;

/// A runtime type identity with a readable name.
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
	id: TypeId,
	name: &'static str,
}

impl TypeTag {
	/// The tag of `T`.
	#[must_use]
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	/// The type id.
	#[must_use]
	pub fn id(&self) -> TypeId {
		self.id
	}

	/// The type name, as reported by [`std::any::type_name`].
	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Whether this tag denotes `T`.
	#[must_use]
	pub fn is<T: ?Sized + 'static>(&self) -> bool {
		self.id == TypeId::of::<T>()
	}
}

impl PartialEq for TypeTag {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for TypeTag {}

/// One selector-routed handler for a document-scoped method.
///
/// Several descriptors may share a method; the [`TextDocumentMatcher`](crate::TextDocumentMatcher)
/// decides which apply to a given document. A descriptor is immutable once registered, apart
/// from its unregister action, which runs at most once.
pub struct HandlerDescriptor {
	method: String,
	key: String,
	handler: Handler,
	handler_type: TypeTag,
	params_type: TypeTag,
	registration_options_type: Option<TypeTag>,
	capabilities_type: Option<TypeTag>,
	selector: DocumentSelector,
	unregister: Mutex<Option<UnregisterFn>>,
}

impl fmt::Debug for HandlerDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HandlerDescriptor")
			.field("method", &self.method)
			.field("key", &self.key)
			.field("kind", &self.kind())
			.field("handler_type", &self.handler_type.name)
			.field("params_type", &self.params_type.name)
			.field("selector", &self.selector)
			.finish_non_exhaustive()
	}
}

impl HandlerDescriptor {
	fn new(
		method: impl Into<String>,
		key: impl Into<String>,
		selector: DocumentSelector,
		handler: Handler,
		handler_type: TypeTag,
		params_type: TypeTag,
	) -> Self {
		Self {
			method: method.into(),
			key: key.into(),
			handler,
			handler_type,
			params_type,
			registration_options_type: None,
			capabilities_type: None,
			selector,
			unregister: Mutex::new(None),
		}
	}

	/// A notification handler that ignores params. Routing still inspects them to find the
	/// document.
	pub fn empty_notification<F>(method: impl Into<String>, key: impl Into<String>, selector: DocumentSelector, callback: F) -> Self
	where
		F: Fn() + Send + Sync + 'static,
	{
		Self::new(
			method,
			key,
			selector,
			Handler::empty_notification(callback),
			TypeTag::of::<F>(),
			TypeTag::of::<()>(),
		)
	}

	/// A typed notification handler for documents matching `selector`.
	pub fn notification<T, F>(method: impl Into<String>, key: impl Into<String>, selector: DocumentSelector, callback: F) -> Self
	where
		T: DeserializeOwned + 'static,
		F: Fn(T) + Send + Sync + 'static,
	{
		Self::new(
			method,
			key,
			selector,
			Handler::notification(callback),
			TypeTag::of::<F>(),
			TypeTag::of::<T>(),
		)
	}

	/// A request handler for documents matching `selector`.
	pub fn request<TReq, TRes, F, Fut>(
		method: impl Into<String>,
		key: impl Into<String>,
		selector: DocumentSelector,
		callback: F,
	) -> Self
	where
		TReq: DeserializeOwned + 'static,
		TRes: Serialize + 'static,
		F: Fn(TReq, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<TRes, ResponseError>> + Send + 'static,
	{
		Self::new(
			method,
			key,
			selector,
			Handler::request(callback),
			TypeTag::of::<F>(),
			TypeTag::of::<TReq>(),
		)
	}

	/// A command request handler for documents matching `selector`.
	pub fn command<TReq, F, Fut>(method: impl Into<String>, key: impl Into<String>, selector: DocumentSelector, callback: F) -> Self
	where
		TReq: DeserializeOwned + 'static,
		F: Fn(TReq, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), ResponseError>> + Send + 'static,
	{
		Self::new(
			method,
			key,
			selector,
			Handler::command(callback),
			TypeTag::of::<F>(),
			TypeTag::of::<TReq>(),
		)
	}

	/// Records the registration options type advertised for this handler.
	#[must_use]
	pub fn with_registration_options<O: 'static>(mut self) -> Self {
		self.registration_options_type = Some(TypeTag::of::<O>());
		self
	}

	/// Records the client capabilities type this handler consumes.
	#[must_use]
	pub fn with_capabilities<C: 'static>(mut self) -> Self {
		self.capabilities_type = Some(TypeTag::of::<C>());
		self
	}

	/// Adds an action to run when the descriptor is unregistered.
	#[must_use]
	pub fn with_unregister(self, action: impl FnOnce() + Send + 'static) -> Self {
		self.chain_unregister(action);
		self
	}

	/// The method this descriptor handles.
	pub fn method(&self) -> &str {
		&self.method
	}

	/// The registration key, unique per method.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// The handler shape.
	pub fn kind(&self) -> HandlerKind {
		self.handler.kind()
	}

	/// Type of the handler callback.
	pub fn handler_type(&self) -> TypeTag {
		self.handler_type
	}

	/// Declared params type.
	pub fn params_type(&self) -> TypeTag {
		self.params_type
	}

	/// Declared registration options type.
	pub fn registration_options_type(&self) -> Option<TypeTag> {
		self.registration_options_type
	}

	/// Declared client capabilities type.
	pub fn capabilities_type(&self) -> Option<TypeTag> {
		self.capabilities_type
	}

	/// The selector deciding which documents this handler serves.
	pub fn selector(&self) -> &DocumentSelector {
		&self.selector
	}

	/// Runs the unregister action. Returns `false` if it already ran.
	pub fn unregister(&self) -> bool {
		let action = self.unregister.lock().take();
		match action {
			Some(action) => {
				action();
				true
			}
			None => false,
		}
	}

	pub(crate) fn handler(&self) -> &Handler {
		&self.handler
	}

	/// Runs `action` before whatever unregister action is already installed.
	pub(crate) fn chain_unregister(&self, action: impl FnOnce() + Send + 'static) {
		let mut slot = self.unregister.lock();
		let previous = slot.take();
		*slot = Some(Box::new(move || {
			action();
			if let Some(previous) = previous {
				previous();
			}
		}));
	}
}

/// Handle to a registered descriptor.
#[derive(Debug, Clone)]
pub struct Registration {
	descriptor: Arc<HandlerDescriptor>,
}

impl Registration {
	pub(crate) fn new(descriptor: Arc<HandlerDescriptor>) -> Self {
		Self { descriptor }
	}

	/// The registered descriptor.
	pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
		&self.descriptor
	}

	/// Retracts the registration. Returns `false` if it was already retracted.
	pub fn unregister(&self) -> bool {
		self.descriptor.unregister()
	}
}
