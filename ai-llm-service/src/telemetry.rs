use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Crate targets whose events are always shown at the requested level.
pub const TARGET_PREFIXES: [&str; 3] = ["ai_llm_service", "failure_analyzer", "ci_rescue"];

/// RFC3339 UTC timer implemented via `chrono` (no extra features).
/// Example output: `2025-09-12T10:20:30Z`
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        // Keep timestamps compact: no fractional seconds, Z-suffix
        let s = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// Level directives for our own crates, e.g. `failure_analyzer=debug`.
pub fn level_directives(level: Level) -> Vec<Directive> {
    TARGET_PREFIXES
        .iter()
        .filter_map(|target| {
            Directive::from_str(&format!("{target}={}", level.as_str().to_lowercase())).ok()
        })
        .collect()
}

/// EnvFilter from `RUST_LOG` or `default`, with our crates raised to `level`.
///
/// Example: `default = "warn"`, `level = Level::INFO` shows INFO from this
/// workspace and WARN from dependencies (reqwest, hyper, ...).
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let from_env = EnvFilter::try_from_default_env().ok();
    let explicit = from_env.is_some();
    let mut filter = from_env.unwrap_or_else(|| EnvFilter::new(default));
    if !explicit {
        for d in level_directives(level) {
            filter = filter.add_directive(d);
        }
    }
    filter
}

/// Installs the global subscriber for the action binary.
///
/// - RFC3339 UTC timestamps
/// - Compact single-line format with target
/// - ANSI colors only when stdout is a terminal (CI logs stay plain)
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(default: &str, level: Level) -> bool {
    let use_ansi = io::stdout().is_terminal();

    let layer = fmt::layer()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_ansi(use_ansi)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter_with_level(default, level))
        .with(layer)
        .try_init()
        .is_ok()
}
