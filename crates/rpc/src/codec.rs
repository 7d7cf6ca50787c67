//! `Content-Length` framing.
//!
//! Each frame is a block of `Name: value` header lines terminated by an empty line, followed by
//! exactly `Content-Length` bytes of UTF-8 JSON:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Message, ProtocolError};

#[cfg(test)]
mod tests;

/// Name of the only header the codec interprets.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Default upper bound on a single frame body.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Upper bound on a single header line, terminator included.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Reads one frame body.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first header byte.
///
/// # Errors
///
/// Any [`ProtocolError`] other than `Json`/`InvalidEnvelope`: I/O failure, EOF inside a
/// frame, a malformed or overlong header line, a missing or unparsable `Content-Length`, or a
/// length above `max_len`.
pub async fn read_frame(
	reader: &mut (impl AsyncBufRead + Unpin),
	max_len: usize,
) -> Result<Option<Vec<u8>>, ProtocolError> {
	let mut line = String::new();
	let mut content_len = None;
	let mut saw_header = false;

	loop {
		line.clear();
		let read = (&mut *reader).take(MAX_HEADER_LINE as u64).read_line(&mut line).await?;
		if read == 0 {
			return if saw_header {
				Err(ProtocolError::UnexpectedEof)
			} else {
				Ok(None)
			};
		}
		if read == MAX_HEADER_LINE && !line.ends_with('\n') {
			return Err(ProtocolError::InvalidHeader(format!("header line exceeds {MAX_HEADER_LINE} bytes")));
		}
		saw_header = true;

		let trimmed = line.trim_end_matches(['\r', '\n']);
		if trimmed.is_empty() {
			break;
		}

		let (name, value) = trimmed
			.split_once(':')
			.ok_or_else(|| ProtocolError::InvalidHeader(trimmed.to_owned()))?;
		if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
			let value = value.trim();
			let len = value
				.parse::<usize>()
				.map_err(|_| ProtocolError::InvalidContentLength(value.to_owned()))?;
			content_len = Some(len);
		}
		// Other headers (e.g. Content-Type) carry nothing we act on.
	}

	let len = content_len.ok_or(ProtocolError::MissingContentLength)?;
	if len > max_len {
		return Err(ProtocolError::FrameTooLarge { len, max: max_len });
	}

	let mut body = vec![0u8; len];
	reader.read_exact(&mut body).await.map_err(|e| match e.kind() {
		io::ErrorKind::UnexpectedEof => ProtocolError::UnexpectedEof,
		_ => ProtocolError::Io(e),
	})?;
	Ok(Some(body))
}

/// Writes one frame and flushes.
///
/// # Errors
///
/// [`ProtocolError::Io`] when the stream rejects the write.
pub async fn write_frame(writer: &mut (impl AsyncWrite + Unpin), body: &[u8]) -> Result<(), ProtocolError> {
	let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());
	writer.write_all(header.as_bytes()).await?;
	writer.write_all(body).await?;
	writer.flush().await?;
	Ok(())
}

impl Message {
	/// Reads and classifies the next framed message.
	///
	/// # Errors
	///
	/// See [`read_frame`] and [`Message::from_bytes`].
	pub async fn read(
		reader: &mut (impl AsyncBufRead + Unpin),
		max_len: usize,
	) -> Result<Option<Self>, ProtocolError> {
		match read_frame(reader, max_len).await? {
			Some(body) => Ok(Some(Self::from_bytes(&body)?)),
			None => Ok(None),
		}
	}

	/// Frames and writes this message.
	///
	/// # Errors
	///
	/// See [`write_frame`].
	pub async fn write(&self, writer: &mut (impl AsyncWrite + Unpin)) -> Result<(), ProtocolError> {
		let body = self.to_bytes()?;
		tracing::trace!(len = body.len(), method = ?self.method(), "rpc.frame.write");
		write_frame(writer, &body).await
	}
}
