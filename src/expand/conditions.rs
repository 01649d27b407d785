//! `if` Composition
//!
//! Conjoins an include's `if` with the conditions of the steps (or jobs) it
//! produces. Composition is textual; nothing is evaluated.

/// Strips one `${{ ... }}` wrapper spanning the whole condition.
pub fn expression_body(condition: &str) -> &str {
    let trimmed = condition.trim();
    match trimmed
        .strip_prefix("${{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        Some(inner) if !inner.contains("${{") && !inner.contains("}}") => inner.trim(),
        _ => trimmed,
    }
}

/// Merges an outer (include-level) and inner (step-level) condition.
///
/// Returns the inner condition alone without an outer one, the outer alone
/// without an inner one, and `(outer) && (inner)` otherwise.
pub fn merge_conditions(outer: Option<&str>, inner: Option<&str>) -> Option<String> {
    match (outer, inner) {
        (None, None) => None,
        (None, Some(inner)) => Some(inner.to_string()),
        (Some(outer), None) => Some(outer.to_string()),
        (Some(outer), Some(inner)) => Some(format!(
            "({}) && ({})",
            expression_body(outer),
            expression_body(inner)
        )),
    }
}
