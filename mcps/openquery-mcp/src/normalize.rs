//! Query normalization
//!
//! Two pure, deterministic string transforms applied to user-authored SQL
//! before it is persisted or executed. Neither parses SQL: `apply_limit`
//! looks for a `limit` substring the way the upstream tools expect, and
//! `sanitize` is wire-format escaping for embedding a query in JSON or a
//! command line. This is a known-weak boundary, not a security guarantee;
//! read-only access remains an advisory convention.

/// Append a `LIMIT` clause unless the query already carries one
///
/// The check is a case-insensitive substring match, so a query that
/// mentions `limit` anywhere (including a column name) is left unchanged.
pub fn apply_limit(query: &str, limit: u32) -> String {
    if query.to_lowercase().contains("limit") {
        query.to_string()
    } else {
        format!("{} LIMIT {}", query.trim_end(), limit)
    }
}

/// Escape a query for safe re-embedding in JSON or a shell argument
///
/// Escapes embedded double quotes, collapses newlines to spaces, and
/// strips single quotes.
pub fn sanitize(query: &str) -> String {
    query
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
        .replace('\'', "")
}
