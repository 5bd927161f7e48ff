//! Lenient response parser: raw model text → [`AnalysisResult`].
//!
//! The prompt asks for `SUMMARY:`, `FIX STEPS:` and `CODE SUGGESTION:` sections
//! plus an optional annotations block. Each marker is detected independently
//! and has its own fallback:
//! - labels are matched case-insensitively, with or without markdown
//!   decoration (`## Summary`, `**Fix steps:**`, `1. **Root Cause**: ...`);
//! - fix steps are numbered or bulleted items under the steps label;
//! - the code suggestion is the first *terminated* fenced block under the code
//!   label, or the first terminated block anywhere;
//! - annotations are JSON between two `<<<CI-RESCUE-ANNOTATIONS>>>` lines and are
//!   dropped silently when malformed;
//! - no summary label → the summary is a bounded prefix of the text.
//!
//! The parser never fails. Only empty/whitespace input yields the
//! "analysis unavailable" sentinel.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::git_providers::FailedJob;
use crate::review::prompt::ANNOTATIONS_DELIMITER;
use crate::review::util::head_chars;

/// Maximum length of a fallback summary (chars).
pub const SUMMARY_FALLBACK_CHARS: usize = 500;

/// Summary used when the model produced nothing usable.
pub const UNAVAILABLE_SUMMARY: &str = "Analysis unavailable: the model returned an empty response.";

/// Structured analysis extracted from the model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    /// Never empty.
    pub summary: String,
    pub fix_steps: Vec<String>,
    pub code_suggestion: Option<String>,
    /// Info string of the fence the code came from (`bash`, `json`, ...).
    pub code_language: Option<String>,
    pub annotations: Vec<Annotation>,
    pub raw_text: String,
    /// `true` when the summary came from a fallback rather than a summary label.
    pub degraded: bool,
    /// Jobs the analysis covers; filled in by the analysis step, not by the parser.
    pub failed_jobs: Vec<FailedJob>,
}

/// A file/line pointer suggested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub path: String,
    pub start_line: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub annotation_level: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationLevel {
    Failure,
    Warning,
    Notice,
}

impl Annotation {
    /// Level with GitHub's default (`failure`) for missing/unknown values.
    pub fn level(&self) -> AnnotationLevel {
        match self
            .annotation_level
            .as_deref()
            .map(|l| l.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("warning") => AnnotationLevel::Warning,
            Some("notice") => AnnotationLevel::Notice,
            _ => AnnotationLevel::Failure,
        }
    }
}

#[derive(Deserialize)]
struct AnnotationsBlock {
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Summary,
    FixSteps,
    Code,
}

/// Label spellings; a phrase always precedes its own prefix (`fix steps` before `fix`).
const LABELS: [(&str, Label); 12] = [
    ("code suggestion", Label::Code),
    ("suggested code", Label::Code),
    ("code change", Label::Code),
    ("code fix", Label::Code),
    ("steps to fix", Label::FixSteps),
    ("suggested fix", Label::FixSteps),
    ("root cause", Label::Summary),
    ("fix steps", Label::FixSteps),
    ("diagnosis", Label::Summary),
    ("solution", Label::FixSteps),
    ("summary", Label::Summary),
    ("fix", Label::FixSteps),
];

lazy_static! {
    static ref LIST_ITEM: Regex = Regex::new(r"^\s*(?:\d+[.)]|[-*+•])\s+(.*)$").unwrap();
}

/// Parses raw model text. Never fails; see module docs for the fallbacks.
pub fn parse_response(raw: &str) -> AnalysisResult {
    if raw.trim().is_empty() {
        return AnalysisResult {
            summary: UNAVAILABLE_SUMMARY.to_string(),
            fix_steps: Vec::new(),
            code_suggestion: None,
            code_language: None,
            annotations: Vec::new(),
            raw_text: raw.to_string(),
            degraded: true,
            failed_jobs: Vec::new(),
        };
    }

    let (text, annotations) = extract_annotations(raw);
    let sections = scan_sections(&text);

    let labelled_summary = join_block(&sections.summary);
    let degraded = labelled_summary.is_empty();
    let summary = if !degraded {
        labelled_summary
    } else {
        fallback_summary(&text, &sections)
    };

    let block = sections
        .blocks
        .iter()
        .find(|b| b.label == Some(Label::Code))
        .or_else(|| sections.blocks.first());
    let (code_suggestion, code_language) = match block {
        Some(b) => (Some(b.code.clone()), b.lang.clone()),
        None => {
            let inline = join_block(&sections.code);
            ((!inline.is_empty()).then_some(inline), None)
        }
    };

    AnalysisResult {
        summary,
        fix_steps: sections.steps,
        code_suggestion,
        code_language,
        annotations,
        raw_text: raw.to_string(),
        degraded,
        failed_jobs: Vec::new(),
    }
}

/// Removes a valid annotations block from `raw` and returns its entries.
/// A missing closing delimiter or malformed JSON leaves the text untouched.
fn extract_annotations(raw: &str) -> (String, Vec<Annotation>) {
    let Some(start) = raw.find(ANNOTATIONS_DELIMITER) else {
        return (raw.to_string(), Vec::new());
    };
    let inner_start = start + ANNOTATIONS_DELIMITER.len();
    let Some(len) = raw[inner_start..].find(ANNOTATIONS_DELIMITER) else {
        return (raw.to_string(), Vec::new());
    };
    let inner_end = inner_start + len;
    let json = strip_json_fence(raw[inner_start..inner_end].trim());

    match serde_json::from_str::<AnnotationsBlock>(json) {
        Ok(block) => {
            let mut text = raw[..start].to_string();
            text.push_str(&raw[inner_end + ANNOTATIONS_DELIMITER.len()..]);
            let annotations = block
                .annotations
                .into_iter()
                .filter(|a| !a.path.trim().is_empty() && !a.message.trim().is_empty())
                .collect();
            (text, annotations)
        }
        Err(e) => {
            debug!("parser: annotations block ignored: {}", e);
            (raw.to_string(), Vec::new())
        }
    }
}

fn strip_json_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Default)]
struct Sections<'a> {
    preamble: Vec<&'a str>,
    summary: Vec<&'a str>,
    code: Vec<&'a str>,
    steps: Vec<String>,
    blocks: Vec<FencedBlock>,
    saw_label: bool,
}

#[derive(Debug)]
struct FencedBlock {
    label: Option<Label>,
    lang: Option<String>,
    code: String,
}

struct OpenFence<'a> {
    ticks: usize,
    lang: Option<String>,
    lines: Vec<&'a str>,
}

fn scan_sections(text: &str) -> Sections<'_> {
    let mut s = Sections::default();
    let mut current: Option<Label> = None;
    let mut fence: Option<OpenFence<'_>> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(open) = fence.as_mut() {
            let ticks = trimmed.chars().take_while(|c| *c == '`').count();
            if ticks >= open.ticks && ticks == trimmed.len() {
                if let Some(f) = fence.take() {
                    let code = f.lines.join("\n").trim_end().to_string();
                    if !code.trim().is_empty() {
                        s.blocks.push(FencedBlock {
                            label: current,
                            lang: f.lang,
                            code,
                        });
                    }
                }
            } else {
                open.lines.push(line);
            }
            continue;
        }

        if trimmed.starts_with("```") {
            let ticks = trimmed.chars().take_while(|c| *c == '`').count();
            let info = trimmed[ticks..].trim();
            fence = Some(OpenFence {
                ticks,
                lang: (!info.is_empty()).then(|| info.to_string()),
                lines: Vec::new(),
            });
            continue;
        }

        if let Some((label, rest)) = label_of(line) {
            current = Some(label);
            s.saw_label = true;
            if !rest.is_empty() {
                match label {
                    Label::Summary => s.summary.push(rest),
                    Label::FixSteps => s.steps.push(list_item(rest).unwrap_or(rest).to_string()),
                    Label::Code => s.code.push(rest),
                }
            }
            continue;
        }

        match current {
            None => s.preamble.push(line),
            Some(Label::Summary) => s.summary.push(line),
            Some(Label::Code) => s.code.push(line),
            Some(Label::FixSteps) => {
                if let Some(item) = list_item(line) {
                    if !item.is_empty() {
                        s.steps.push(item.to_string());
                    }
                } else if !trimmed.is_empty() {
                    match s.steps.last_mut() {
                        Some(last) if line.starts_with([' ', '\t']) => {
                            last.push(' ');
                            last.push_str(trimmed);
                        }
                        _ => s.steps.push(trimmed.to_string()),
                    }
                }
            }
        }
    }
    s
}

/// Recognizes a section label line and returns the text after it.
fn label_of(line: &str) -> Option<(Label, &str)> {
    let candidate = list_item(line).unwrap_or(line);
    let t = candidate
        .trim_start_matches(|c: char| matches!(c, '#' | '*' | '_' | '>') || c.is_whitespace());
    let lower = t.to_ascii_lowercase();

    for (name, label) in LABELS {
        if !lower.starts_with(name) {
            continue;
        }
        let rest = t[name.len()..].trim_start_matches(|c: char| matches!(c, '*' | '_' | ' '));
        if let Some(after) = rest.strip_prefix(':') {
            let after = after
                .trim_start_matches(|c: char| matches!(c, '*' | '_'))
                .trim();
            return Some((label, after));
        }
        if rest
            .trim_matches(|c: char| matches!(c, '*' | '_' | '#' | ':') || c.is_whitespace())
            .is_empty()
        {
            return Some((label, ""));
        }
    }
    None
}

fn list_item(line: &str) -> Option<&str> {
    LIST_ITEM
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Trims surrounding blank lines and trailing spaces; keeps inner line breaks.
fn join_block(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_header_line(line: &str) -> bool {
    line.trim()
        .trim_matches(|c: char| matches!(c, '*' | '#' | '🚨') || c.is_whitespace())
        .eq_ignore_ascii_case("CI Failure Analysis")
}

fn without_header(text: &str) -> &str {
    let trimmed = text.trim_start();
    match trimmed.split_once('\n') {
        Some((first, rest)) if is_header_line(first) => rest,
        None if is_header_line(trimmed) => "",
        _ => trimmed,
    }
}

fn fallback_summary(text: &str, sections: &Sections<'_>) -> String {
    let source = if sections.saw_label {
        join_block(&sections.preamble)
    } else {
        String::new()
    };
    let source = if source.is_empty() {
        text.to_string()
    } else {
        source
    };

    let body = without_header(&source).trim();
    let body = if body.is_empty() { source.trim() } else { body };
    let summary = head_chars(body, SUMMARY_FALLBACK_CHARS).trim_end();
    if summary.is_empty() || is_header_line(summary) {
        UNAVAILABLE_SUMMARY.to_string()
    } else {
        summary.to_string()
    }
}
