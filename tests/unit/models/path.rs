use super::*;

#[test]
fn canonicalize_strips_leading_slash_and_empty_segments() {
    assert_eq!(canonicalize("/src//lib/./a.rs"), "src/lib/a.rs");
    assert_eq!(canonicalize("src/"), "src");
    assert_eq!(canonicalize("/"), "");
    assert_eq!(canonicalize(""), "");
}

#[test]
fn canonicalize_resolves_parent_segments_without_escaping_root() {
    assert_eq!(canonicalize("src/../lib/a.rs"), "lib/a.rs");
    assert_eq!(canonicalize("../../a"), "a");
    assert_eq!(canonicalize("src\\win\\a.rs"), "src/win/a.rs");
}

#[test]
fn parent_of_root_child_is_root() {
    assert_eq!(parent_of("a.txt"), "");
    assert_eq!(parent_of("src/a.txt"), "src");
    assert_eq!(parent_of("src/lib/a.txt"), "src/lib");
}

#[test]
fn file_name_is_last_segment() {
    assert_eq!(file_name("src/lib/a.txt"), "a.txt");
    assert_eq!(file_name("a.txt"), "a.txt");
}

#[test]
fn join_under_root_has_no_separator() {
    assert_eq!(join("", "a"), "a");
    assert_eq!(join("src", "a"), "src/a");
}

#[test]
fn ancestor_or_self_requires_separator_boundary() {
    assert!(is_ancestor_or_self("foo", "foo"));
    assert!(is_ancestor_or_self("foo", "foo/bar"));
    assert!(is_ancestor_or_self("foo", "foo/bar/baz"));
    assert!(!is_ancestor_or_self("foo", "foobar"));
    assert!(!is_ancestor_or_self("foo/bar", "foo"));
    assert!(is_ancestor_or_self("", "anything/at/all"));
}

#[test]
fn rebase_keeps_relative_structure() {
    assert_eq!(rebase("src", "src", "lib").as_deref(), Some("lib"));
    assert_eq!(rebase("src/a/b.rs", "src", "lib").as_deref(), Some("lib/a/b.rs"));
    assert_eq!(rebase("srcx/a.rs", "src", "lib"), None);
    assert_eq!(rebase("a.rs", "", "nested").as_deref(), Some("nested/a.rs"));
}

#[test]
fn names_reject_separators_and_dot_segments() {
    assert!(is_valid_name("a.txt"));
    assert!(!is_valid_name(""));
    assert!(!is_valid_name("."));
    assert!(!is_valid_name(".."));
    assert!(!is_valid_name("a/b"));
}
