//! Resolution of selector-routed handlers for a concrete document.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use url::Url;

use crate::descriptor::HandlerDescriptor;
use crate::selector::DocumentIdentity;

#[cfg(test)]
mod tests;

const DID_OPEN: &str = "textDocument/didOpen";
const DID_CLOSE: &str = "textDocument/didClose";

/// Language ids of the documents the peer currently has open.
///
/// Only `didOpen` carries a language id; later payloads name the document by URI alone, so
/// the id is remembered here until `didClose`.
#[derive(Debug, Clone, Default)]
pub struct DocumentLanguages(Arc<RwLock<HashMap<Url, String>>>);

impl DocumentLanguages {
	/// The remembered language of `uri`.
	pub fn get(&self, uri: &Url) -> Option<String> {
		self.0.read().get(uri).cloned()
	}

	/// Records or forgets a document according to an inbound notification.
	pub(crate) fn observe_open(&self, method: &str, params: &JsonValue) {
		if method != DID_OPEN {
			return;
		}
		let item = &params["textDocument"];
		if let (Some(uri), Some(language)) = (parse_uri(&item["uri"]), item["languageId"].as_str()) {
			self.0.write().insert(uri, language.to_owned());
		}
	}

	/// Forgets a document after its `didClose` has been routed.
	pub(crate) fn observe_close(&self, method: &str, params: &JsonValue) {
		if method != DID_CLOSE {
			return;
		}
		if let Some(uri) = parse_uri(&params["textDocument"]["uri"]) {
			self.0.write().remove(&uri);
		}
	}
}

/// Picks the descriptors whose selector applies to the document a payload refers to.
///
/// The document is found under `textDocument.uri` (`didOpen`, `didChange`, hover, ...) or a
/// top-level `uri` (`publishDiagnostics`). Matching is pure: no I/O and no mutation, so one
/// matcher can be shared by every dispatch task.
#[derive(Debug, Clone, Default)]
pub struct TextDocumentMatcher {
	languages: DocumentLanguages,
}

impl TextDocumentMatcher {
	/// A matcher that knows only the language ids carried by payloads themselves.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A matcher that falls back to remembered language ids.
	#[must_use]
	pub fn with_languages(languages: DocumentLanguages) -> Self {
		Self { languages }
	}

	/// Extracts the document identity from a payload, if it names one.
	#[must_use]
	pub fn identify(&self, params: &JsonValue) -> Option<DocumentIdentity> {
		let text_document = &params["textDocument"];
		let uri = parse_uri(&text_document["uri"]).or_else(|| parse_uri(&params["uri"]))?;
		let language_id = text_document["languageId"]
			.as_str()
			.map(str::to_owned)
			.or_else(|| self.languages.get(&uri));
		Some(DocumentIdentity { uri, language_id })
	}

	/// Returns the descriptors, in their given order, whose selector matches the payload's
	/// document.
	///
	/// The result is empty, never absent, when `descriptors` is empty, when the payload names
	/// no document, or when no selector matches.
	#[must_use]
	pub fn find_handler(&self, params: &JsonValue, descriptors: &[Arc<HandlerDescriptor>]) -> Vec<Arc<HandlerDescriptor>> {
		if descriptors.is_empty() {
			return Vec::new();
		}
		let Some(doc) = self.identify(params) else {
			tracing::trace!("lsp.matcher.no_document");
			return Vec::new();
		};
		let found: Vec<_> = descriptors
			.iter()
			.filter(|d| d.selector().matches(&doc))
			.cloned()
			.collect();
		tracing::trace!(uri = %doc.uri, candidates = descriptors.len(), matched = found.len(), "lsp.matcher.find");
		found
	}

	/// Chooses the single descriptor that answers a request: highest selector specificity,
	/// earliest registration on ties.
	#[must_use]
	pub fn find_request_handler(
		&self,
		params: &JsonValue,
		descriptors: &[Arc<HandlerDescriptor>],
	) -> Option<Arc<HandlerDescriptor>> {
		let doc = self.identify(params)?;
		let mut best: Option<(u8, &Arc<HandlerDescriptor>)> = None;
		for descriptor in descriptors {
			let Some(score) = descriptor.selector().best_specificity(&doc) else {
				continue;
			};
			if best.is_none_or(|(top, _)| score > top) {
				best = Some((score, descriptor));
			}
		}
		best.map(|(_, d)| Arc::clone(d))
	}
}

fn parse_uri(value: &JsonValue) -> Option<Url> {
	value.as_str().and_then(|s| Url::parse(s).ok())
}
