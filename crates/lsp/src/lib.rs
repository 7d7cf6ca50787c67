//! Bidirectional JSON-RPC core for [Language Server Protocol (LSP)][lsp] peers.
//!
//! [lsp]: https://microsoft.github.io/language-server-protocol/overviews/lsp/overview/
//!
//! The same machinery serves either side of the protocol:
//!
//! - [`Connection`] owns a duplex byte stream, one sequential reader and one sequential writer.
//! - [`Dispatcher`] routes inbound messages to registered handlers by method name and offers
//!   the outbound `send_*` API.
//! - [`HandlerDescriptor`] and [`TextDocumentMatcher`] route document-scoped methods by the
//!   [`DocumentSelector`] of each registration.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn run(stream: tokio::io::DuplexStream) -> conduit_lsp::Result<()> {
//! use conduit_lsp::{Connection, Dispatcher};
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.handle_empty_notification("initialized", || tracing::info!("peer ready"))?;
//!
//! let conn = Connection::from_stream(stream);
//! conn.connect(dispatcher)?;
//! conn.send_notification("window/logMessage", serde_json::json!({ "type": 3, "message": "hi" }))?;
//! conn.disconnect(true);
//! conn.has_disconnected().await;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

/// Re-export of the [`lsp_types`] dependency of this crate.
pub use lsp_types;

mod config;
mod connection;
mod descriptor;
mod dispatcher;
mod handler;
mod link;
mod matcher;
mod selector;

pub use conduit_rpc::{ErrorCode, JsonValue, ProtocolError, RequestId, ResponseError};
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState};
pub use descriptor::{HandlerDescriptor, Registration, TypeTag};
pub use dispatcher::{CANCEL_REQUEST, Dispatcher};
pub use handler::HandlerKind;
pub use matcher::{DocumentLanguages, TextDocumentMatcher};
pub use selector::{DocumentFilter, DocumentIdentity, DocumentSelector};
pub use tokio_util::sync::CancellationToken;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The peer sent a malformed frame or envelope. Fatal to the connection.
	#[error("protocol error: {0}")]
	Protocol(#[from] ProtocolError),
	/// A handler for this method and kind is already registered.
	#[error("a {kind} handler for `{method}` is already registered")]
	DuplicateHandler {
		/// The contested method.
		method: String,
		/// Kind of the rejected registration.
		kind: HandlerKind,
	},
	/// Sending requires a connected connection.
	#[error("not connected")]
	NotConnected,
	/// The connection, or the dispatcher, is already in use.
	#[error("already connected")]
	AlreadyConnected,
	/// The peer replied with an error.
	#[error("{0}")]
	Response(#[from] ResponseError),
	/// The connection went away before the request completed.
	#[error("connection closed before the request completed")]
	ConnectionClosed,
	/// No response within the configured request timeout.
	#[error("request `{0}` timed out")]
	RequestTimeout(String),
	/// A payload could not be converted to or from the declared type.
	#[error("payload conversion failed: {0}")]
	Codec(#[from] serde_json::Error),
	/// A document filter glob does not compile.
	#[error("invalid glob pattern: {0}")]
	InvalidPattern(#[from] globset::Error),
}
