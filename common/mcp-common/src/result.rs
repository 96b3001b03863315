//! Result helpers for MCP tool responses
//!
//! Provides convenient functions for creating `CallToolResult` responses,
//! reducing boilerplate in tool implementations.

use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;

/// Create a successful JSON response from any serializable data
///
/// This replaces the common pattern:
/// ```rust,ignore
/// let json = serde_json::to_string_pretty(&data)
///     .map_err(|e| McpError::internal_error(e.to_string(), None))?;
/// Ok(CallToolResult::success(vec![Content::text(json)]))
/// ```
///
/// With simply:
/// ```rust,ignore
/// json_success(&data)
/// ```
pub fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Create a successful plain text response
///
/// For tools that return simple text rather than structured data.
pub fn text_success(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Create a successful response rendering `(columns, rows)` as an aligned
/// monospace table
///
/// For tools that return tabular data (query results, listings) meant to be
/// read by a model or a human rather than parsed.
pub fn table_success(columns: &[String], rows: &[Vec<serde_json::Value>]) -> CallToolResult {
    text_success(render_table(columns, rows))
}

/// Render `(columns, rows)` as aligned monospace text
///
/// Each column is padded to the width of its widest cell. JSON strings are
/// printed without surrounding quotes; other values use their compact JSON
/// form. Rows wider than the header are truncated to the header width.
pub fn render_table(columns: &[String], rows: &[Vec<serde_json::Value>]) -> String {
    fn cell_text(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "NULL".to_string(),
            other => other.to_string(),
        }
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .take(columns.len())
                .enumerate()
                .map(|(i, v)| {
                    let text = cell_text(v);
                    widths[i] = widths[i].max(text.chars().count());
                    text
                })
                .collect()
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
        .collect();
    out.push_str(header.join("  ").trim_end());
    for row in rendered {
        out.push('\n');
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
            .collect();
        out.push_str(line.join("  ").trim_end());
    }
    out
}
