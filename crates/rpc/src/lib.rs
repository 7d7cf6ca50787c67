//! JSON-RPC envelope and framing for Language Server Protocol peers.
//!
//! This crate is the leaf of the stack: it knows how a request, a notification and a response
//! look on the wire and how to cut a byte stream into `Content-Length` frames, and nothing about
//! handlers or connections.
//!
//! * [`Message`]: The tagged envelope, classified by key presence.
//! * [`codec`]: Frame reading and writing over tokio streams.
//! * [`CounterIdGen`]: Request id allocation.
//! * [`ProtocolError`]: Everything that makes a stream unreadable.

#![warn(missing_docs)]

pub mod codec;
mod error;
mod id;
mod message;
mod types;

pub use error::ProtocolError;
pub use id::CounterIdGen;
pub use message::Message;
pub use serde_json::Value as JsonValue;
pub use types::{AnyNotification, AnyRequest, AnyResponse, ErrorCode, RequestId, ResponseError};
