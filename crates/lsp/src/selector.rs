//! Declarative document selectors.
//!
//! A [`DocumentSelector`] is an ordered set of [`DocumentFilter`]s. A filter constrains any
//! subset of the URI scheme, the language id and a glob over the URI path; unset fields are
//! wildcards. A selector matches a document when any of its filters does.

use std::borrow::Cow;
use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use url::Url;

use crate::Result;

#[cfg(test)]
mod tests;

/// What the matcher knows about the document a payload refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIdentity {
	/// The document URI.
	pub uri: Url,
	/// The language id, when the payload or an earlier `didOpen` supplied one.
	pub language_id: Option<String>,
}

impl DocumentIdentity {
	/// An identity without a known language.
	#[must_use]
	pub fn new(uri: Url) -> Self {
		Self { uri, language_id: None }
	}

	/// Sets the language id.
	#[must_use]
	pub fn with_language(mut self, language_id: impl Into<String>) -> Self {
		self.language_id = Some(language_id.into());
		self
	}

	/// The path glob patterns are matched against.
	///
	/// `file` URIs are decoded to a local path; other schemes use the raw URI path.
	fn match_path(&self) -> Cow<'_, str> {
		if self.uri.scheme() == "file"
			&& let Ok(path) = self.uri.to_file_path()
		{
			return Cow::Owned(path.to_string_lossy().into_owned());
		}
		Cow::Borrowed(self.uri.path())
	}
}

/// A compiled glob pattern that remembers its source text.
#[derive(Clone)]
struct Pattern {
	source: String,
	matcher: GlobMatcher,
}

impl Pattern {
	fn compile(source: &str) -> Result<Self> {
		// `*` and `?` stay within one path segment; only `**` crosses separators.
		let glob = GlobBuilder::new(source).literal_separator(true).build()?;
		Ok(Self {
			source: source.to_owned(),
			matcher: glob.compile_matcher(),
		})
	}
}

impl fmt::Debug for Pattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Pattern").field(&self.source).finish()
	}
}

/// One filter of a [`DocumentSelector`].
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
	scheme: Option<String>,
	language: Option<String>,
	pattern: Option<Pattern>,
}

impl DocumentFilter {
	/// Builds a filter from optional constraints.
	///
	/// # Errors
	///
	/// [`Error::InvalidPattern`](crate::Error::InvalidPattern) when `pattern` is not a valid glob.
	pub fn new(scheme: Option<&str>, language: Option<&str>, pattern: Option<&str>) -> Result<Self> {
		Ok(Self {
			scheme: scheme.map(str::to_owned),
			language: language.map(str::to_owned),
			pattern: pattern.map(Pattern::compile).transpose()?,
		})
	}

	/// A filter on the language id only.
	#[must_use]
	pub fn for_language(language: impl Into<String>) -> Self {
		Self {
			language: Some(language.into()),
			..Self::default()
		}
	}

	/// A filter on the URI scheme only.
	#[must_use]
	pub fn for_scheme(scheme: impl Into<String>) -> Self {
		Self {
			scheme: Some(scheme.into()),
			..Self::default()
		}
	}

	/// A filter on a path glob only.
	///
	/// # Errors
	///
	/// [`Error::InvalidPattern`](crate::Error::InvalidPattern) when `pattern` is not a valid glob.
	pub fn for_pattern(pattern: &str) -> Result<Self> {
		Ok(Self {
			pattern: Some(Pattern::compile(pattern)?),
			..Self::default()
		})
	}

	/// The scheme constraint.
	pub fn scheme(&self) -> Option<&str> {
		self.scheme.as_deref()
	}

	/// The language constraint.
	pub fn language(&self) -> Option<&str> {
		self.language.as_deref()
	}

	/// The glob source text.
	pub fn pattern(&self) -> Option<&str> {
		self.pattern.as_ref().map(|p| p.source.as_str())
	}

	/// Whether every constraint this filter sets holds for `doc`.
	///
	/// A language constraint never matches a document whose language is unknown.
	#[must_use]
	pub fn matches(&self, doc: &DocumentIdentity) -> bool {
		if let Some(scheme) = &self.scheme
			&& !scheme.eq_ignore_ascii_case(doc.uri.scheme())
		{
			return false;
		}
		if let Some(language) = &self.language
			&& doc.language_id.as_deref() != Some(language.as_str())
		{
			return false;
		}
		if let Some(pattern) = &self.pattern
			&& !pattern.matcher.is_match(doc.match_path().as_ref())
		{
			return false;
		}
		true
	}

	/// Number of constrained fields, used to rank competing matches.
	#[must_use]
	pub fn specificity(&self) -> u8 {
		u8::from(self.scheme.is_some()) + u8::from(self.language.is_some()) + u8::from(self.pattern.is_some())
	}
}

impl TryFrom<lsp_types::DocumentFilter> for DocumentFilter {
	type Error = crate::Error;

	fn try_from(filter: lsp_types::DocumentFilter) -> Result<Self> {
		Self::new(filter.scheme.as_deref(), filter.language.as_deref(), filter.pattern.as_deref())
	}
}

/// An ordered set of filters; matches when any filter matches.
#[derive(Debug, Clone, Default)]
pub struct DocumentSelector(Vec<DocumentFilter>);

impl DocumentSelector {
	/// A selector over the given filters.
	#[must_use]
	pub fn new(filters: Vec<DocumentFilter>) -> Self {
		Self(filters)
	}

	/// A single-filter selector on a path glob.
	///
	/// # Errors
	///
	/// [`Error::InvalidPattern`](crate::Error::InvalidPattern) when `pattern` is not a valid glob.
	pub fn for_pattern(pattern: &str) -> Result<Self> {
		Ok(Self(vec![DocumentFilter::for_pattern(pattern)?]))
	}

	/// A single-filter selector on a language id.
	#[must_use]
	pub fn for_language(language: impl Into<String>) -> Self {
		Self(vec![DocumentFilter::for_language(language)])
	}

	/// A single-filter selector on a URI scheme.
	#[must_use]
	pub fn for_scheme(scheme: impl Into<String>) -> Self {
		Self(vec![DocumentFilter::for_scheme(scheme)])
	}

	/// The filters, in declaration order.
	pub fn filters(&self) -> &[DocumentFilter] {
		&self.0
	}

	/// Whether any filter matches `doc`. An empty selector matches nothing.
	#[must_use]
	pub fn matches(&self, doc: &DocumentIdentity) -> bool {
		self.0.iter().any(|f| f.matches(doc))
	}

	/// Specificity of the most specific filter matching `doc`, or `None` when nothing matches.
	#[must_use]
	pub fn best_specificity(&self, doc: &DocumentIdentity) -> Option<u8> {
		self.0.iter().filter(|f| f.matches(doc)).map(DocumentFilter::specificity).max()
	}
}

impl From<DocumentFilter> for DocumentSelector {
	fn from(filter: DocumentFilter) -> Self {
		Self(vec![filter])
	}
}

impl TryFrom<Vec<lsp_types::DocumentFilter>> for DocumentSelector {
	type Error = crate::Error;

	fn try_from(filters: Vec<lsp_types::DocumentFilter>) -> Result<Self> {
		filters
			.into_iter()
			.map(DocumentFilter::try_from)
			.collect::<Result<Vec<_>>>()
			.map(Self)
	}
}
