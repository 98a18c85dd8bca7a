//! Lexical utilities for absolute, forward-slash container paths.
//!
//! Every internal key in the core is a *cleaned* path: absolute, no `.` or
//! `..` segments, no duplicate or trailing slashes. The root is `/`.

/// Lexically clean `path` into absolute form.
///
/// Relative input is interpreted against the root, which is what tar entry
/// names require.
#[must_use]
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return String::from("/");
    }
    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    cleaned
}

/// Join `name` onto `base` and clean the result.
#[must_use]
pub fn join(base: &str, name: &str) -> String {
    clean(&format!("{base}/{name}"))
}

/// The cleaned parent directory of `path`. The root is its own parent.
#[must_use]
pub fn parent(path: &str) -> String {
    let cleaned = clean(path);
    match cleaned.rfind('/') {
        Some(0) | None => String::from("/"),
        Some(idx) => cleaned[..idx].to_owned(),
    }
}

/// The final segment of `path`; `/` for the root.
#[must_use]
pub fn file_name(path: &str) -> String {
    let cleaned = clean(path);
    match cleaned.rfind('/') {
        Some(idx) if cleaned.len() > 1 => cleaned[idx + 1..].to_owned(),
        _ => cleaned,
    }
}
