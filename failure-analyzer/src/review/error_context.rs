//! Error-context extraction from raw job logs.
//!
//! Scans for error indicators (case-insensitive) and keeps a window of lines
//! around each hit. Windows that truly overlap are merged; adjacent ones stay
//! separate. Only the last few blocks survive, newest failures being the most
//! diagnostic.

/// Substrings that mark a log line as an error line (matched case-insensitively).
const ERROR_INDICATORS: [&str; 16] = [
    "ERROR",
    "FAILED",
    "Error:",
    "error:",
    "Exception:",
    "Traceback",
    "TabError:",
    "SyntaxError:",
    "ImportError:",
    "ModuleNotFoundError:",
    "AssertionError:",
    "##[error]",
    "FAIL:",
    "FAILURE:",
    "Remove unused import:",
    "Cannot find module",
];

/// Lines kept before and after each hit.
const WINDOW: usize = 5;

/// Blocks kept (the last ones).
const MAX_BLOCKS: usize = 3;

/// Lines kept when nothing matched.
const FALLBACK_LINES: usize = 10;

pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";
pub const NO_LOGS: &str = "No logs available";

/// Error-focused view of one job log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Last error blocks, or the fallback tail when nothing matched.
    pub excerpt: String,
    /// Log lines after the last kept block. Never repeats excerpt lines; empty
    /// when the excerpt already ends the log.
    pub after: String,
}

/// Returns the error-focused excerpt of `logs`.
pub fn extract_error_context(logs: &str) -> ErrorContext {
    if logs.trim().is_empty() {
        return ErrorContext {
            excerpt: NO_LOGS.to_string(),
            after: String::new(),
        };
    }

    let lines: Vec<&str> = logs.split('\n').collect();
    let needles: Vec<String> = ERROR_INDICATORS
        .iter()
        .map(|i| i.to_lowercase())
        .collect();

    let hits: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let lower = line.to_lowercase();
            needles.iter().any(|n| lower.contains(n.as_str()))
        })
        .map(|(i, _)| i)
        .collect();

    if hits.is_empty() {
        let mut tail: Vec<&str> = lines
            .iter()
            .rev()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .take(FALLBACK_LINES)
            .collect();
        tail.reverse();
        return ErrorContext {
            excerpt: tail.join("\n"),
            after: String::new(),
        };
    }

    // Half-open [start, end) windows, already sorted because hits are.
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for &i in &hits {
        let start = i.saturating_sub(WINDOW);
        let end = (i + WINDOW + 1).min(lines.len());
        match merged.last_mut() {
            Some((_, cur_end)) if start < *cur_end => *cur_end = (*cur_end).max(end),
            _ => merged.push((start, end)),
        }
    }

    let blocks: Vec<String> = merged
        .iter()
        .map(|&(start, end)| {
            lines[start..end]
                .iter()
                .map(|l| l.trim_end())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();

    let skip = blocks.len().saturating_sub(MAX_BLOCKS);
    let covered = merged.last().map_or(lines.len(), |&(_, end)| end);
    ErrorContext {
        excerpt: blocks[skip..].join(BLOCK_SEPARATOR),
        after: lines[covered..].join("\n").trim_end().to_string(),
    }
}
