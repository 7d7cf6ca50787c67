//! JSON-RPC payload carriers shared by both peers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The identifier correlating a request with its response.
///
/// Though `null` is technically a valid id for responses, it is rejected since it cannot be
/// matched against any outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
	/// Integer id, as generated by [`CounterIdGen`](crate::CounterIdGen).
	Number(i64),
	/// String id, accepted from peers that prefer them.
	String(String),
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => write!(f, "{n}"),
			Self::String(s) => write!(f, "{s:?}"),
		}
	}
}

impl From<i64> for RequestId {
	fn from(n: i64) -> Self {
		Self::Number(n)
	}
}

impl From<String> for RequestId {
	fn from(s: String) -> Self {
		Self::String(s)
	}
}

/// A JSON-RPC error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl From<i32> for ErrorCode {
	fn from(i: i32) -> Self {
		Self(i)
	}
}

impl ErrorCode {
	/// Invalid JSON was received.
	pub const PARSE_ERROR: Self = Self(-32700);
	/// The JSON sent is not a valid request object.
	pub const INVALID_REQUEST: Self = Self(-32600);
	/// The method does not exist or has no handler registered for the payload.
	pub const METHOD_NOT_FOUND: Self = Self(-32601);
	/// The params could not be decoded into the handler's declared type.
	pub const INVALID_PARAMS: Self = Self(-32602);
	/// The handler failed unexpectedly.
	pub const INTERNAL_ERROR: Self = Self(-32603);
	/// A request arrived before the server was initialized.
	pub const SERVER_NOT_INITIALIZED: Self = Self(-32002);
	/// Reserved by LSP; no defined meaning.
	pub const UNKNOWN_ERROR_CODE: Self = Self(-32001);
	/// A request failed but was syntactically correct.
	pub const REQUEST_FAILED: Self = Self(-32803);
	/// The server cancelled the request.
	pub const SERVER_CANCELLED: Self = Self(-32802);
	/// The document changed while the request was being computed.
	pub const CONTENT_MODIFIED: Self = Self(-32801);
	/// The peer cancelled the request via `$/cancelRequest`.
	pub const REQUEST_CANCELLED: Self = Self(-32800);
}

/// The error object of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ResponseError {
	/// The error code.
	pub code: ErrorCode,
	/// Human-readable description.
	pub message: String,
	/// Additional information about the error.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<JsonValue>,
}

impl ResponseError {
	/// Create a new error object with a code and a message.
	#[must_use]
	pub fn new(code: ErrorCode, message: impl fmt::Display) -> Self {
		Self {
			code,
			message: message.to_string(),
			data: None,
		}
	}

	/// Create a new error object carrying additional data.
	#[must_use]
	pub fn new_with_data(code: ErrorCode, message: impl fmt::Display, data: JsonValue) -> Self {
		Self {
			code,
			message: message.to_string(),
			data: Some(data),
		}
	}

	/// Shorthand for an [`ErrorCode::INTERNAL_ERROR`] error.
	#[must_use]
	pub fn internal(message: impl fmt::Display) -> Self {
		Self::new(ErrorCode::INTERNAL_ERROR, message)
	}
}

/// A request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyRequest {
	/// Correlation id, unique among this side's outstanding requests.
	pub id: RequestId,
	/// Method name, e.g. `textDocument/hover`.
	pub method: String,
	/// Opaque params. `Null` when absent on the wire.
	pub params: JsonValue,
}

/// A notification message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyNotification {
	/// Method name, e.g. `textDocument/didOpen`.
	pub method: String,
	/// Opaque params. `Null` when absent on the wire.
	pub params: JsonValue,
}

/// A response message, either a success or an error.
///
/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyResponse {
	/// Id of the request this answers.
	pub id: RequestId,
	/// Success payload. A command acknowledgment carries `Some(Null)`.
	pub result: Option<JsonValue>,
	/// Error payload.
	pub error: Option<ResponseError>,
}

impl AnyResponse {
	/// A success response.
	#[must_use]
	pub fn ok(id: RequestId, result: JsonValue) -> Self {
		Self {
			id,
			result: Some(result),
			error: None,
		}
	}

	/// An error response.
	#[must_use]
	pub fn err(id: RequestId, error: ResponseError) -> Self {
		Self {
			id,
			result: None,
			error: Some(error),
		}
	}

	/// Converts into the payload or the peer's error.
	pub fn into_result(self) -> Result<JsonValue, ResponseError> {
		match self.error {
			Some(err) => Err(err),
			None => Ok(self.result.unwrap_or_default()),
		}
	}
}
