//! Prompt telemetry: safe dumping of the exact prompt sent to the model.
//!
//! ## What it does
//! - Writes the prompt to `<dir>/<timestamp>_<model>.txt`.
//! - Emits a concise DEBUG log line (length, token estimate, file path).
//! - Always **redacts secrets** first; optionally truncates huge prompts.
//!
//! ## Env flags
//! - `CI_RESCUE_LOG_PROMPTS` (bool): enable the dump (default: false)
//! - `CI_RESCUE_PROMPT_MAX_CHARS` (usize): 0 = no truncation (default: 0)
//! - `CI_RESCUE_PROMPT_DIR` (path): target directory (default: `ci_rescue_tmp/prompts`)

use std::fs;
use std::path::{Path, PathBuf};

use ai_llm_service::error_handler::env_opt;
use chrono::Utc;
use tracing::{debug, warn};

use crate::review::redact::redact_secrets;
use crate::review::util::approx_tokens;

pub const DEFAULT_PROMPT_DIR: &str = "ci_rescue_tmp/prompts";

const TRUNCATION_NOTE: &str = "\n\n[... TRUNCATED ...]\n";

/// Returns `true` if the given env var is set to a truthy value ("1", "true", "yes", "on").
fn env_flag(name: &str) -> bool {
    env_opt(name).is_some_and(|v| {
        matches!(
            v.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_usize(name: &str, default_: usize) -> usize {
    env_opt(name)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_)
}

/// Dump settings, read from the environment on each call.
#[derive(Debug, Clone)]
pub struct PromptDumpSettings {
    pub enabled: bool,
    pub max_chars: usize,
    pub dir: PathBuf,
}

impl PromptDumpSettings {
    pub fn from_env() -> Self {
        Self {
            enabled: env_flag("CI_RESCUE_LOG_PROMPTS"),
            max_chars: env_usize("CI_RESCUE_PROMPT_MAX_CHARS", 0),
            dir: env_opt("CI_RESCUE_PROMPT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROMPT_DIR)),
        }
    }
}

/// Optionally truncate the prompt to at most `max_chars`, keeping a suffix note.
fn maybe_truncate(s: String, max_chars: usize) -> (String, bool) {
    if max_chars == 0 || s.chars().count() <= max_chars {
        return (s, false);
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str(TRUNCATION_NOTE);
    (out, true)
}

/// Make a safe filename segment from a model id ("openai/gpt-4o-mini" → "openai_gpt-4o-mini").
fn sanitize_for_name(s: &str) -> String {
    let out: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() { "-".to_string() } else { out }
}

/// Dumps `prompt` when `CI_RESCUE_LOG_PROMPTS` is on. Never fails the run.
pub fn dump_prompt(model_id: &str, prompt: &str) {
    let settings = PromptDumpSettings::from_env();
    let _ = dump_prompt_with(&settings, model_id, prompt);
}

/// Writes the redacted prompt under `settings.dir`. Returns the file path, or
/// `None` when disabled or the write failed (logged at WARN).
pub fn dump_prompt_with(
    settings: &PromptDumpSettings,
    model_id: &str,
    prompt: &str,
) -> Option<PathBuf> {
    if !settings.enabled {
        return None;
    }

    let content = redact_secrets(prompt);
    let (content, truncated) = maybe_truncate(content, settings.max_chars);

    let file = dump_file(&settings.dir, model_id);
    if let Err(e) = fs::create_dir_all(&settings.dir).and_then(|_| fs::write(&file, &content)) {
        warn!("prompt dump to {} failed: {}", file.display(), e);
        return None;
    }

    debug!(
        "prompt model={} file={} len={} tokens≈{} truncated={}",
        model_id,
        file.display(),
        content.chars().count(),
        approx_tokens(prompt),
        truncated
    );
    Some(file)
}

fn dump_file(dir: &Path, model_id: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    dir.join(format!("{}_{}.txt", stamp, sanitize_for_name(model_id)))
}
