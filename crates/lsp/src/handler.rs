//! Type-erased handler callbacks.
//!
//! Payloads stay as [`JsonValue`] until the moment a specific handler is invoked; each
//! constructor here captures the handler's declared types and decodes exactly once, on call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use conduit_rpc::{ErrorCode, ResponseError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub(crate) type RequestFn =
	Arc<dyn Fn(JsonValue, CancellationToken) -> BoxFuture<Result<JsonValue, ResponseError>> + Send + Sync>;
pub(crate) type NotificationFn = Arc<dyn Fn(JsonValue) -> Result<(), serde_json::Error> + Send + Sync>;
pub(crate) type EmptyNotificationFn = Arc<dyn Fn() + Send + Sync>;

/// The four shapes a handler registration can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
	/// Typed notification handler.
	Notification,
	/// Notification handler that ignores params.
	EmptyNotification,
	/// Request handler producing a result payload.
	Request,
	/// Request handler acknowledged with an empty result.
	CommandRequest,
}

impl HandlerKind {
	/// Whether inbound requests (as opposed to notifications) route to this kind.
	#[must_use]
	pub const fn is_request(self) -> bool {
		matches!(self, Self::Request | Self::CommandRequest)
	}
}

impl fmt::Display for HandlerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Notification => "notification",
			Self::EmptyNotification => "empty notification",
			Self::Request => "request",
			Self::CommandRequest => "command request",
		})
	}
}

/// A registered callback, one variant per [`HandlerKind`].
#[derive(Clone)]
pub(crate) enum Handler {
	EmptyNotification(EmptyNotificationFn),
	Notification(NotificationFn),
	Request(RequestFn),
	CommandRequest(RequestFn),
}

impl fmt::Debug for Handler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Handler({})", self.kind())
	}
}

impl Handler {
	pub(crate) fn kind(&self) -> HandlerKind {
		match self {
			Self::EmptyNotification(_) => HandlerKind::EmptyNotification,
			Self::Notification(_) => HandlerKind::Notification,
			Self::Request(_) => HandlerKind::Request,
			Self::CommandRequest(_) => HandlerKind::CommandRequest,
		}
	}

	pub(crate) fn empty_notification(callback: impl Fn() + Send + Sync + 'static) -> Self {
		Self::EmptyNotification(Arc::new(callback))
	}

	pub(crate) fn notification<T, F>(callback: F) -> Self
	where
		T: DeserializeOwned + 'static,
		F: Fn(T) + Send + Sync + 'static,
	{
		Self::Notification(Arc::new(move |params: JsonValue| -> Result<(), serde_json::Error> {
			callback(serde_json::from_value(params)?);
			Ok(())
		}))
	}

	pub(crate) fn request<TReq, TRes, F, Fut>(callback: F) -> Self
	where
		TReq: DeserializeOwned + 'static,
		TRes: Serialize + 'static,
		F: Fn(TReq, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<TRes, ResponseError>> + Send + 'static,
	{
		Self::Request(Arc::new(
			move |params: JsonValue, cancel: CancellationToken| -> BoxFuture<Result<JsonValue, ResponseError>> {
				match decode_params::<TReq>(params) {
					Ok(params) => {
						let fut = callback(params, cancel);
						Box::pin(async move {
							let result = fut.await?;
							serde_json::to_value(result)
								.map_err(|e| ResponseError::internal(format!("Failed to serialize result: {e}")))
						})
					}
					Err(err) => Box::pin(std::future::ready(Err(err))),
				}
			},
		))
	}

	pub(crate) fn command<TReq, F, Fut>(callback: F) -> Self
	where
		TReq: DeserializeOwned + 'static,
		F: Fn(TReq, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), ResponseError>> + Send + 'static,
	{
		Self::CommandRequest(Arc::new(
			move |params: JsonValue, cancel: CancellationToken| -> BoxFuture<Result<JsonValue, ResponseError>> {
				match decode_params::<TReq>(params) {
					Ok(params) => {
						let fut = callback(params, cancel);
						Box::pin(async move {
							fut.await?;
							Ok(JsonValue::Null)
						})
					}
					Err(err) => Box::pin(std::future::ready(Err(err))),
				}
			},
		))
	}
}

fn decode_params<T: DeserializeOwned>(params: JsonValue) -> Result<T, ResponseError> {
	serde_json::from_value(params)
		.map_err(|e| ResponseError::new(ErrorCode::INVALID_PARAMS, format!("Failed to deserialize parameters: {e}")))
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_owned()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"handler panicked".to_owned()
	}
}
