//! Wire-level failures.

use std::io;

/// A frame or envelope the codec cannot make sense of.
///
/// Every variant is fatal to the read side of a connection: once framing is lost there is no
/// way to find the start of the next message.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolError {
	/// Reading or writing the underlying stream failed.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// The stream ended in the middle of a frame.
	#[error("stream ended inside a frame")]
	UnexpectedEof,
	/// A header line is not of the form `Name: value`.
	#[error("invalid header: {0:?}")]
	InvalidHeader(String),
	/// The header block ended without a `Content-Length`.
	#[error("missing Content-Length header")]
	MissingContentLength,
	/// The `Content-Length` value is not a byte count.
	#[error("invalid Content-Length: {0:?}")]
	InvalidContentLength(String),
	/// The declared body exceeds the configured maximum.
	#[error("frame of {len} bytes exceeds the {max} byte limit")]
	FrameTooLarge {
		/// Declared body length.
		len: usize,
		/// Configured maximum.
		max: usize,
	},
	/// The body is not valid JSON.
	#[error("malformed JSON payload: {0}")]
	Json(#[from] serde_json::Error),
	/// The body is JSON but not a request, notification or response.
	#[error("invalid message envelope: {0}")]
	InvalidEnvelope(String),
}
