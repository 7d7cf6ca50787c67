use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::ErrorCode;

#[test]
fn classifies_request() {
	let msg = Message::from_value(json!({"jsonrpc": "2.0", "id": 7, "method": "test", "params": {"Value": 1234}})).unwrap();
	assert_eq!(
		msg,
		Message::Request(AnyRequest {
			id: RequestId::Number(7),
			method: "test".into(),
			params: json!({"Value": 1234}),
		})
	);
}

#[test]
fn classifies_notification_without_params() {
	let msg = Message::from_value(json!({"jsonrpc": "2.0", "method": "exit"})).unwrap();
	assert_eq!(
		msg,
		Message::Notification(AnyNotification {
			method: "exit".into(),
			params: JsonValue::Null,
		})
	);
}

#[test]
fn classifies_null_result_as_success() {
	let msg = Message::from_value(json!({"jsonrpc": "2.0", "id": "a", "result": null})).unwrap();
	assert_eq!(msg, Message::Response(AnyResponse::ok(RequestId::String("a".into()), JsonValue::Null)));
}

#[test]
fn classifies_error_response_with_data() {
	let msg = Message::from_value(json!({
		"jsonrpc": "2.0",
		"id": 2,
		"error": {"code": -32602, "message": "Invalid params", "data": {"details": "missing field"}}
	}))
	.unwrap();
	let Message::Response(resp) = msg else {
		panic!("expected response");
	};
	let err = resp.into_result().unwrap_err();
	assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
	assert_eq!(err.data, Some(json!({"details": "missing field"})));
}

#[test]
fn error_with_null_id_is_unidentified() {
	let msg = Message::from_value(json!({
		"jsonrpc": "2.0",
		"id": null,
		"error": {"code": -32700, "message": "Parse error"}
	}))
	.unwrap();
	assert_eq!(msg, Message::UnidentifiedError(ResponseError::new(ErrorCode::PARSE_ERROR, "Parse error")));
	assert_eq!(msg.method(), None);
	assert_eq!(
		msg.to_value(),
		json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}})
	);
}

#[test]
fn null_id_result_is_rejected() {
	assert!(matches!(
		Message::from_value(json!({"jsonrpc": "2.0", "id": null, "result": 1})),
		Err(ProtocolError::InvalidEnvelope(_))
	));
}

#[test]
fn rejects_response_with_both_result_and_error() {
	let err = Message::from_value(json!({"id": 1, "result": 1, "error": {"code": 1, "message": "x"}})).unwrap_err();
	assert!(matches!(err, ProtocolError::InvalidEnvelope(_)));
}

#[test]
fn rejects_non_objects_and_bad_ids() {
	assert!(matches!(Message::from_value(json!([1, 2])), Err(ProtocolError::InvalidEnvelope(_))));
	assert!(matches!(
		Message::from_value(json!({"id": 1.5, "method": "x"})),
		Err(ProtocolError::InvalidEnvelope(_))
	));
	assert!(matches!(Message::from_value(json!({"params": {}})), Err(ProtocolError::InvalidEnvelope(_))));
}

#[test]
fn encodes_version_and_omits_null_params() {
	let notif = Message::Notification(AnyNotification {
		method: "initialized".into(),
		params: JsonValue::Null,
	});
	assert_eq!(notif.to_value(), json!({"jsonrpc": "2.0", "method": "initialized"}));

	let ack = Message::Response(AnyResponse::ok(RequestId::Number(3), JsonValue::Null));
	assert_eq!(ack.to_value(), json!({"jsonrpc": "2.0", "id": 3, "result": null}));
}

#[test]
fn bytes_round_trip_each_variant() {
	let messages = [
		Message::Request(AnyRequest {
			id: RequestId::Number(1),
			method: "textDocument/hover".into(),
			params: json!({"textDocument": {"uri": "file:///a.rs"}}),
		}),
		Message::Notification(AnyNotification {
			method: "textDocument/didOpen".into(),
			params: json!({"x": [1, 2, 3]}),
		}),
		Message::Response(AnyResponse::ok(RequestId::String("r".into()), json!({"Value": "1234"}))),
		Message::Response(AnyResponse::err(
			RequestId::Number(9),
			ResponseError::new_with_data(ErrorCode::REQUEST_FAILED, "nope", json!({"retry": false})),
		)),
	];
	for msg in messages {
		let bytes = msg.to_bytes().unwrap();
		assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
	}
}
