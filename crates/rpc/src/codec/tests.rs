use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::{AnyNotification, AnyRequest, RequestId};

async fn read(input: &[u8]) -> Result<Option<Vec<u8>>, ProtocolError> {
	let mut reader = input;
	read_frame(&mut reader, DEFAULT_MAX_CONTENT_LENGTH).await
}

#[tokio::test]
async fn writes_content_length_header() {
	let mut out = Vec::new();
	write_frame(&mut out, b"test payload").await.unwrap();
	assert_eq!(out, b"Content-Length: 12\r\n\r\ntest payload");
}

#[tokio::test]
async fn reads_single_frame() {
	assert_eq!(read(b"Content-Length: 5\r\n\r\nhello").await.unwrap(), Some(b"hello".to_vec()));
}

#[tokio::test]
async fn ignores_other_headers_and_header_case() {
	let input = b"content-length: 4\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\ntest";
	assert_eq!(read(input).await.unwrap(), Some(b"test".to_vec()));
}

#[tokio::test]
async fn payload_may_contain_header_like_text() {
	let body = b"Content-Length: 99\r\n\r\n";
	let mut framed = Vec::new();
	write_frame(&mut framed, body).await.unwrap();
	assert_eq!(read(&framed).await.unwrap(), Some(body.to_vec()));
}

#[tokio::test]
async fn clean_eof_is_none() {
	assert_eq!(read(b"").await.unwrap(), None);
}

#[tokio::test]
async fn eof_inside_headers_is_an_error() {
	assert!(matches!(read(b"Content-Length: 10").await, Err(ProtocolError::UnexpectedEof)));
}

#[tokio::test]
async fn short_body_is_an_error() {
	assert!(matches!(
		read(b"Content-Length: 10\r\n\r\nabc").await,
		Err(ProtocolError::UnexpectedEof)
	));
}

#[tokio::test]
async fn missing_content_length() {
	assert!(matches!(
		read(b"Content-Type: application/json\r\n\r\ntest").await,
		Err(ProtocolError::MissingContentLength)
	));
}

#[tokio::test]
async fn invalid_content_length() {
	assert!(matches!(
		read(b"Content-Length: invalid\r\n\r\ntest").await,
		Err(ProtocolError::InvalidContentLength(_))
	));
}

#[tokio::test]
async fn malformed_header_line() {
	assert!(matches!(read(b"garbage\r\n\r\n").await, Err(ProtocolError::InvalidHeader(_))));
}

#[tokio::test]
async fn unterminated_header_line_is_capped() {
	let input = vec![b'a'; MAX_HEADER_LINE * 4];
	assert!(matches!(read(&input).await, Err(ProtocolError::InvalidHeader(_))));
}

#[tokio::test]
async fn header_line_at_the_cap_is_accepted() {
	let mut input = format!("X-Padding: {}\r\n", "p".repeat(MAX_HEADER_LINE - 13)).into_bytes();
	assert_eq!(input.len(), MAX_HEADER_LINE);
	input.extend_from_slice(b"Content-Length: 2\r\n\r\nok");
	assert_eq!(read(&input).await.unwrap(), Some(b"ok".to_vec()));
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
	let mut reader: &[u8] = b"Content-Length: 100\r\n\r\n";
	assert!(matches!(
		read_frame(&mut reader, 10).await,
		Err(ProtocolError::FrameTooLarge { len: 100, max: 10 })
	));
}

#[tokio::test]
async fn messages_stream_back_in_order() {
	let first = Message::Request(AnyRequest {
		id: RequestId::Number(0),
		method: "test".into(),
		params: json!({"Value": 1234}),
	});
	let second = Message::Notification(AnyNotification {
		method: "test".into(),
		params: json!(null),
	});

	let mut wire = Vec::new();
	first.write(&mut wire).await.unwrap();
	second.write(&mut wire).await.unwrap();

	let mut reader = wire.as_slice();
	assert_eq!(Message::read(&mut reader, DEFAULT_MAX_CONTENT_LENGTH).await.unwrap(), Some(first));
	assert_eq!(Message::read(&mut reader, DEFAULT_MAX_CONTENT_LENGTH).await.unwrap(), Some(second));
	assert_eq!(Message::read(&mut reader, DEFAULT_MAX_CONTENT_LENGTH).await.unwrap(), None);
}

#[tokio::test]
async fn non_json_body_is_a_protocol_error() {
	let mut reader: &[u8] = b"Content-Length: 3\r\n\r\nabc";
	assert!(matches!(
		Message::read(&mut reader, DEFAULT_MAX_CONTENT_LENGTH).await,
		Err(ProtocolError::Json(_))
	));
}
