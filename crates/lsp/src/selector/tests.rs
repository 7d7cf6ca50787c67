use rstest::rstest;

use super::*;

fn doc(uri: &str) -> DocumentIdentity {
	DocumentIdentity::new(Url::parse(uri).unwrap())
}

#[rstest]
#[case("**/*.cs", "file:///abc/123/d.cs", true)]
#[case("**/*.cs", "file:///abc/123/d.ts", false)]
#[case("**/*.cs", "file:///d.cs", true)]
#[case("/abc/*.cs", "file:///abc/d.cs", true)]
#[case("/abc/*.cs", "file:///abc/123/d.cs", false)]
#[case("**/d.?s", "file:///abc/d.ts", true)]
#[case("**/src/**/*.rs", "file:///repo/src/a/b/lib.rs", true)]
#[case("**/my file.cs", "file:///abc/my%20file.cs", true)]
fn glob_patterns(#[case] pattern: &str, #[case] uri: &str, #[case] expected: bool) {
	let selector = DocumentSelector::for_pattern(pattern).unwrap();
	assert_eq!(selector.matches(&doc(uri)), expected, "{pattern} vs {uri}");
}

#[test]
fn invalid_glob_is_rejected() {
	assert!(matches!(DocumentFilter::for_pattern("a[b"), Err(crate::Error::InvalidPattern(_))));
}

#[test]
fn absent_fields_are_wildcards() {
	assert!(DocumentFilter::default().matches(&doc("untitled:Untitled-1")));
}

#[test]
fn every_present_field_must_match() {
	let filter = DocumentFilter::new(Some("file"), Some("csharp"), Some("**/*.cs")).unwrap();
	let cs = doc("file:///a/b.cs");

	assert!(!filter.matches(&cs), "language unknown");
	assert!(filter.matches(&cs.clone().with_language("csharp")));
	assert!(!filter.matches(&cs.with_language("fsharp")));
	assert!(!filter.matches(&doc("untitled:/a/b.cs").with_language("csharp")));
	assert_eq!(filter.specificity(), 3);
}

#[test]
fn selector_matches_when_any_filter_matches() {
	let selector = DocumentSelector::new(vec![
		DocumentFilter::for_language("rust"),
		DocumentFilter::for_scheme("untitled"),
	]);
	assert!(selector.matches(&doc("untitled:Untitled-1")));
	assert!(selector.matches(&doc("file:///lib.rs").with_language("rust")));
	assert!(!selector.matches(&doc("file:///lib.rs")));
	assert!(!DocumentSelector::default().matches(&doc("file:///lib.rs")));
}

#[test]
fn best_specificity_picks_the_tightest_matching_filter() {
	let selector = DocumentSelector::new(vec![
		DocumentFilter::for_scheme("file"),
		DocumentFilter::new(Some("file"), None, Some("**/*.rs")).unwrap(),
	]);
	assert_eq!(selector.best_specificity(&doc("file:///lib.rs")), Some(2));
	assert_eq!(selector.best_specificity(&doc("file:///lib.py")), Some(1));
	assert_eq!(selector.best_specificity(&doc("https://x/lib.rs")), None);
}

#[test]
fn converts_from_lsp_filters() {
	let selector = DocumentSelector::try_from(vec![lsp_types::DocumentFilter {
		language: Some("rust".into()),
		scheme: None,
		pattern: Some("**/*.rs".into()),
	}])
	.unwrap();
	let filter = &selector.filters()[0];
	assert_eq!(filter.language(), Some("rust"));
	assert_eq!(filter.pattern(), Some("**/*.rs"));
	assert_eq!(filter.scheme(), None);
}
