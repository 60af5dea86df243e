//! Branch name predicate.
//!
//! A valid branch name is a `/`-separated list of non-empty components.
//! Components may not start with `.`, names may not end with `.` or
//! `.lock`, and the sequences `..` and `@{` are reserved. Whitespace and the
//! characters `~ ^ : ? * [ \` are forbidden anywhere.

use crate::error::{RefError, Result};

const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

const RESERVED_SEQUENCES: &[&str] = &["..", "@{"];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Check a branch name, returning `Ok(())` if it may be used.
///
/// ```
/// use strata_refs::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("feature/merge-lca").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("a..b").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "branch name must not be empty"));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control()) {
        return Err(invalid(name, format!("contains forbidden character {ch:?}")));
    }
    if let Some(seq) = RESERVED_SEQUENCES.iter().find(|seq| name.contains(*seq)) {
        return Err(invalid(name, format!("must not contain {seq:?}")));
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.' or '.lock'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "empty path component"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component {component:?} starts with '.'"),
            ));
        }
    }
    Ok(())
}
