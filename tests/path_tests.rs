#![allow(clippy::unwrap_used, missing_docs)]

use dockerfs::path::{clean, file_name, join, parent};

#[test]
fn clean_normalizes_dots_and_slashes() {
    assert_eq!(clean("/etc//hostname"), "/etc/hostname");
    assert_eq!(clean("/etc/./hostname"), "/etc/hostname");
    assert_eq!(clean("/etc/hostname/"), "/etc/hostname");
    assert_eq!(clean("etc/hostname"), "/etc/hostname");
}

#[test]
fn clean_resolves_parent_segments() {
    assert_eq!(clean("/a/b/../c"), "/a/c");
    assert_eq!(clean("/a/../../b"), "/b");
    assert_eq!(clean("/.."), "/");
}

#[test]
fn clean_root_forms() {
    assert_eq!(clean("/"), "/");
    assert_eq!(clean(""), "/");
    assert_eq!(clean("//"), "/");
    assert_eq!(clean("/."), "/");
}

#[test]
fn join_cleans_the_result() {
    assert_eq!(join("/", "etc"), "/etc");
    assert_eq!(join("/etc", "hostname"), "/etc/hostname");
    assert_eq!(join("/etc/", "hostname"), "/etc/hostname");
}

#[test]
fn parent_of_nested_and_top_level() {
    assert_eq!(parent("/etc/hostname"), "/etc");
    assert_eq!(parent("/etc"), "/");
    assert_eq!(parent("/"), "/");
    assert_eq!(parent("/a/b/"), "/a");
}

#[test]
fn file_name_returns_last_segment() {
    assert_eq!(file_name("/etc/hostname"), "hostname");
    assert_eq!(file_name("/etc"), "etc");
    assert_eq!(file_name("/"), "/");
}
