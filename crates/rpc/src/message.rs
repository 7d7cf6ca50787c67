//! The JSON-RPC message envelope.

use serde_json::{Map, Value as JsonValue};

use crate::ProtocolError;
use crate::types::{AnyNotification, AnyRequest, AnyResponse, RequestId, ResponseError};

#[cfg(test)]
mod tests;

const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC message, classified by which envelope keys are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
	/// `method` and `id`: expects exactly one response.
	Request(AnyRequest),
	/// `id` plus one of `result`/`error`.
	Response(AnyResponse),
	/// `method` without `id`: fire and forget.
	Notification(AnyNotification),
	/// `error` with a null `id`: the peer failed before it could tell which request it was
	/// answering (typically a parse error on one of our frames).
	UnidentifiedError(ResponseError),
}

impl Message {
	/// Method name for requests and notifications.
	#[must_use]
	pub fn method(&self) -> Option<&str> {
		match self {
			Self::Request(req) => Some(&req.method),
			Self::Notification(notif) => Some(&notif.method),
			Self::Response(_) | Self::UnidentifiedError(_) => None,
		}
	}

	/// Builds the wire object. `params` is omitted when `Null`.
	#[must_use]
	pub fn to_value(&self) -> JsonValue {
		let mut obj = Map::new();
		obj.insert("jsonrpc".into(), JSONRPC_VERSION.into());
		match self {
			Self::Request(req) => {
				obj.insert("id".into(), id_to_value(&req.id));
				obj.insert("method".into(), req.method.clone().into());
				if !req.params.is_null() {
					obj.insert("params".into(), req.params.clone());
				}
			}
			Self::Notification(notif) => {
				obj.insert("method".into(), notif.method.clone().into());
				if !notif.params.is_null() {
					obj.insert("params".into(), notif.params.clone());
				}
			}
			Self::Response(resp) => {
				obj.insert("id".into(), id_to_value(&resp.id));
				match &resp.error {
					Some(err) => {
						obj.insert("error".into(), error_to_value(err));
					}
					None => {
						obj.insert("result".into(), resp.result.clone().unwrap_or_default());
					}
				}
			}
			Self::UnidentifiedError(err) => {
				obj.insert("id".into(), JsonValue::Null);
				obj.insert("error".into(), error_to_value(err));
			}
		}
		JsonValue::Object(obj)
	}

	/// Classifies a decoded JSON value.
	///
	/// The `jsonrpc` version field is not checked.
	///
	/// # Errors
	///
	/// [`ProtocolError::InvalidEnvelope`] when the value is not an object, when `method` is not a
	/// string, when the id is missing or not a number/string, or when a response carries both
	/// or neither of `result` and `error`. A null id is accepted only on an error response,
	/// which classifies as [`Message::UnidentifiedError`].
	pub fn from_value(value: JsonValue) -> Result<Self, ProtocolError> {
		let JsonValue::Object(mut obj) = value else {
			return Err(ProtocolError::InvalidEnvelope("message is not a JSON object".into()));
		};

		let null_id = matches!(obj.get("id"), Some(JsonValue::Null));
		let id = match obj.remove("id") {
			None | Some(JsonValue::Null) => None,
			Some(raw) => Some(parse_id(raw)?),
		};
		let params = obj.remove("params").unwrap_or_default();

		if let Some(method) = obj.remove("method") {
			let JsonValue::String(method) = method else {
				return Err(ProtocolError::InvalidEnvelope("`method` is not a string".into()));
			};
			return Ok(match id {
				Some(id) => Self::Request(AnyRequest { id, method, params }),
				None => Self::Notification(AnyNotification { method, params }),
			});
		}

		if null_id && !obj.contains_key("result") && let Some(error) = obj.remove("error") {
			return Ok(Self::UnidentifiedError(parse_error(error)?));
		}

		let id = id.ok_or_else(|| ProtocolError::InvalidEnvelope("neither `method` nor `id` present".into()))?;
		match (obj.remove("result"), obj.remove("error")) {
			(Some(result), None) => Ok(Self::Response(AnyResponse::ok(id, result))),
			(None, Some(error)) => Ok(Self::Response(AnyResponse::err(id, parse_error(error)?))),
			(Some(_), Some(_)) => Err(ProtocolError::InvalidEnvelope(format!(
				"response {id} carries both `result` and `error`"
			))),
			(None, None) => Err(ProtocolError::InvalidEnvelope(format!(
				"response {id} carries neither `result` nor `error`"
			))),
		}
	}

	/// Encodes the message body (without framing).
	///
	/// # Errors
	///
	/// Propagates serializer failures, which only occur for non-string map keys in payloads.
	pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
		Ok(serde_json::to_vec(&self.to_value())?)
	}

	/// Decodes a message body (without framing).
	///
	/// # Errors
	///
	/// [`ProtocolError::Json`] for invalid JSON, otherwise as [`Message::from_value`].
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
		Self::from_value(serde_json::from_slice(bytes)?)
	}
}

impl From<AnyRequest> for Message {
	fn from(req: AnyRequest) -> Self {
		Self::Request(req)
	}
}

impl From<AnyResponse> for Message {
	fn from(resp: AnyResponse) -> Self {
		Self::Response(resp)
	}
}

impl From<AnyNotification> for Message {
	fn from(notif: AnyNotification) -> Self {
		Self::Notification(notif)
	}
}

fn parse_id(raw: JsonValue) -> Result<RequestId, ProtocolError> {
	match raw {
		JsonValue::Number(n) => n
			.as_i64()
			.map(RequestId::Number)
			.ok_or_else(|| ProtocolError::InvalidEnvelope(format!("id {n} is not an integer"))),
		JsonValue::String(s) => Ok(RequestId::String(s)),
		other => Err(ProtocolError::InvalidEnvelope(format!("invalid id: {other}"))),
	}
}

fn parse_error(raw: JsonValue) -> Result<ResponseError, ProtocolError> {
	serde_json::from_value(raw).map_err(|e| ProtocolError::InvalidEnvelope(format!("malformed error object: {e}")))
}

fn id_to_value(id: &RequestId) -> JsonValue {
	match id {
		RequestId::Number(n) => (*n).into(),
		RequestId::String(s) => s.clone().into(),
	}
}

fn error_to_value(err: &ResponseError) -> JsonValue {
	let mut obj = Map::new();
	obj.insert("code".into(), err.code.0.into());
	obj.insert("message".into(), err.message.clone().into());
	if let Some(data) = &err.data {
		obj.insert("data".into(), data.clone());
	}
	JsonValue::Object(obj)
}
