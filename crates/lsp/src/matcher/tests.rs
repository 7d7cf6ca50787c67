use lsp_types::{
	DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams, DidSaveTextDocumentParams,
	TextDocumentIdentifier, TextDocumentItem, Uri, VersionedTextDocumentIdentifier,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

use super::*;
use crate::selector::{DocumentFilter, DocumentSelector};

const CS_FILE: &str = "file:///abc/123/d.cs";

fn uri(s: &str) -> Uri {
	s.parse().unwrap()
}

fn descriptor(method: &str, key: &str, selector: DocumentSelector) -> Arc<HandlerDescriptor> {
	Arc::new(HandlerDescriptor::notification(method, key, selector, |_: JsonValue| {}))
}

fn cs_descriptor(method: &str) -> Arc<HandlerDescriptor> {
	descriptor(method, "Key", DocumentSelector::for_pattern("**/*.cs").unwrap())
}

fn did_open(uri_str: &str, language: &str) -> JsonValue {
	serde_json::to_value(DidOpenTextDocumentParams {
		text_document: TextDocumentItem {
			uri: uri(uri_str),
			language_id: language.to_owned(),
			version: 1,
			text: String::new(),
		},
	})
	.unwrap()
}

fn payload_for(method: &str) -> JsonValue {
	match method {
		"textDocument/didOpen" => did_open(CS_FILE, "csharp"),
		"textDocument/didChange" => serde_json::to_value(DidChangeTextDocumentParams {
			text_document: VersionedTextDocumentIdentifier {
				uri: uri(CS_FILE),
				version: 1,
			},
			content_changes: Vec::new(),
		})
		.unwrap(),
		"textDocument/didSave" => serde_json::to_value(DidSaveTextDocumentParams {
			text_document: TextDocumentIdentifier { uri: uri(CS_FILE) },
			text: None,
		})
		.unwrap(),
		"textDocument/didClose" => serde_json::to_value(DidCloseTextDocumentParams {
			text_document: TextDocumentIdentifier { uri: uri(CS_FILE) },
		})
		.unwrap(),
		other => panic!("no payload for {other}"),
	}
}

#[test]
fn empty_descriptors_yield_empty_result() {
	let matcher = TextDocumentMatcher::new();
	assert!(matcher.find_handler(&json!(1), &[]).is_empty());
	assert!(matcher.find_handler(&did_open(CS_FILE, "csharp"), &[]).is_empty());
}

#[test]
fn payload_without_document_yields_empty_result() {
	let matcher = TextDocumentMatcher::new();
	let descriptors = [cs_descriptor("textDocument/didOpen")];
	assert!(matcher.find_handler(&json!(1), &descriptors).is_empty());
	assert!(matcher.find_handler(&json!({ "textDocument": {} }), &descriptors).is_empty());
}

#[rstest]
#[case("textDocument/didOpen")]
#[case("textDocument/didChange")]
#[case("textDocument/didSave")]
#[case("textDocument/didClose")]
fn sync_payload_finds_matching_descriptor(#[case] method: &str) {
	let matcher = TextDocumentMatcher::new();
	let descriptors = [cs_descriptor(method)];

	let found = matcher.find_handler(&payload_for(method), &descriptors);

	assert_eq!(found.len(), 1);
	assert_eq!(found[0].method(), method);
}

#[test]
fn only_matching_descriptors_are_returned_in_order() {
	let matcher = TextDocumentMatcher::new();
	let descriptors = [
		descriptor("textDocument/didOpen", "cs", DocumentSelector::for_pattern("**/*.cs").unwrap()),
		descriptor("textDocument/didOpen", "ts", DocumentSelector::for_pattern("**/*.ts").unwrap()),
		descriptor("textDocument/didOpen", "file", DocumentSelector::for_scheme("file")),
	];

	let found = matcher.find_handler(&did_open(CS_FILE, "csharp"), &descriptors);
	let keys: Vec<_> = found.iter().map(|d| d.key()).collect();

	assert_eq!(keys, ["cs", "file"]);
}

#[test]
fn top_level_uri_identifies_the_document() {
	let matcher = TextDocumentMatcher::new();
	let params = json!({ "uri": CS_FILE, "diagnostics": [] });

	let doc = matcher.identify(&params).unwrap();

	assert_eq!(doc.uri.as_str(), CS_FILE);
	assert_eq!(doc.language_id, None);
}

#[test]
fn language_filters_use_remembered_language() {
	let languages = DocumentLanguages::default();
	let matcher = TextDocumentMatcher::with_languages(languages.clone());
	let descriptors = [descriptor(
		"textDocument/didChange",
		"csharp",
		DocumentSelector::for_language("csharp"),
	)];
	let change = payload_for("textDocument/didChange");

	assert!(matcher.find_handler(&change, &descriptors).is_empty(), "language unknown before didOpen");

	languages.observe_open("textDocument/didOpen", &did_open(CS_FILE, "csharp"));
	assert_eq!(matcher.find_handler(&change, &descriptors).len(), 1);

	languages.observe_close("textDocument/didClose", &payload_for("textDocument/didClose"));
	assert!(matcher.find_handler(&change, &descriptors).is_empty(), "forgotten after didClose");
}

#[test]
fn observe_ignores_other_methods() {
	let languages = DocumentLanguages::default();
	languages.observe_open("textDocument/didChange", &did_open(CS_FILE, "csharp"));
	assert_eq!(languages.get(&Url::parse(CS_FILE).unwrap()), None);
}

#[test]
fn request_routing_prefers_specific_selector() {
	let matcher = TextDocumentMatcher::new();
	let descriptors = [
		descriptor("textDocument/hover", "any-file", DocumentSelector::for_scheme("file")),
		descriptor(
			"textDocument/hover",
			"cs-file",
			DocumentFilter::new(Some("file"), None, Some("**/*.cs")).unwrap().into(),
		),
	];
	let params = json!({ "textDocument": { "uri": CS_FILE }, "position": { "line": 0, "character": 0 } });

	let chosen = matcher.find_request_handler(&params, &descriptors).unwrap();

	assert_eq!(chosen.key(), "cs-file");
}

#[test]
fn request_routing_ties_go_to_earliest() {
	let matcher = TextDocumentMatcher::new();
	let descriptors = [
		descriptor("textDocument/hover", "first", DocumentSelector::for_pattern("**/*.cs").unwrap()),
		descriptor("textDocument/hover", "second", DocumentSelector::for_pattern("/abc/**").unwrap()),
	];
	let params = json!({ "textDocument": { "uri": CS_FILE } });

	let chosen = matcher.find_request_handler(&params, &descriptors).unwrap();

	assert_eq!(chosen.key(), "first");
}

#[test]
fn request_routing_without_match_is_none() {
	let matcher = TextDocumentMatcher::new();
	let descriptors = [descriptor("textDocument/hover", "ts", DocumentSelector::for_pattern("**/*.ts").unwrap())];
	let params = json!({ "textDocument": { "uri": CS_FILE } });

	assert!(matcher.find_request_handler(&params, &descriptors).is_none());
}
