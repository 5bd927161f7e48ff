//! Run configuration, built once from the action environment.
//!
//! Model-side inputs (`INPUT_OPENROUTER_API_KEY`, `INPUT_LLM_PROVIDER`, `INPUT_MODEL`,
//! `INPUT_MAX_TOKENS`, the provider base URL, `LLM_TIMEOUT_SECS`) are validated by
//! [`ai_llm_service::config::default_config`]; everything else lives here.

use std::path::PathBuf;
use std::time::Duration;

use ai_llm_service::LlmModelConfig;
use ai_llm_service::config::default_config::config_from_lookup;
use ai_llm_service::error_handler::{non_empty, parse_opt_u64};

use crate::errors::{ConfigError, RescueResult};
use crate::git_providers::{DEFAULT_GITHUB_API, EventContext, ProviderConfig};
use crate::publish::CommentMode;

/// Immutable configuration for one rescue run.
#[derive(Debug, Clone)]
pub struct RescueConfig {
    pub github: ProviderConfig,
    pub run_id: u64,
    pub event: EventContext,
    pub llm: LlmModelConfig,
    pub include_logs: bool,
    pub comment_mode: CommentMode,
    pub dry_run: bool,
    /// Overall run deadline (`CI_RESCUE_DEADLINE_SECS`).
    pub deadline: Option<Duration>,
}

impl RescueConfig {
    /// Reads the process environment.
    pub fn from_env() -> RescueResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    ///
    /// # Errors
    /// [`crate::errors::Error::Config`] for missing required inputs or malformed values.
    pub fn from_lookup<F>(get: F) -> RescueResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = required(&get, "INPUT_GITHUB_TOKEN")?;

        let repository = required(&get, "GITHUB_REPOSITORY")?;
        if !is_owner_repo(&repository) {
            return Err(ConfigError::InvalidValue {
                var: "GITHUB_REPOSITORY",
                reason: format!("expected owner/repo, got '{repository}'"),
            }
            .into());
        }

        let run_id = required(&get, "GITHUB_RUN_ID")?
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "GITHUB_RUN_ID",
                reason: "expected a positive integer".into(),
            })?;

        let base_api =
            non_empty(get("GITHUB_API_URL")).unwrap_or_else(|| DEFAULT_GITHUB_API.to_string());
        if !(base_api.starts_with("http://") || base_api.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_api).into());
        }

        let llm = config_from_lookup(&get).map_err(ConfigError::from_llm)?;

        let include_logs = parse_bool(&get, "INPUT_INCLUDE_LOGS", true)?;
        let dry_run = parse_bool(&get, "INPUT_DRY_RUN", false)?;
        let comment_mode = match non_empty(get("INPUT_COMMENT_MODE")) {
            Some(v) => v.parse::<CommentMode>()?,
            None => CommentMode::default(),
        };

        let deadline = parse_opt_u64("CI_RESCUE_DEADLINE_SECS", get("CI_RESCUE_DEADLINE_SECS"))
            .map_err(ConfigError::from_llm)?
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        let event = EventContext {
            name: non_empty(get("GITHUB_EVENT_NAME")),
            path: non_empty(get("GITHUB_EVENT_PATH")).map(PathBuf::from),
            sha: non_empty(get("GITHUB_SHA")),
        };

        Ok(Self {
            github: ProviderConfig {
                base_api,
                token,
                repository,
            },
            run_id,
            event,
            llm,
            include_logs,
            comment_mode,
            dry_run,
            deadline,
        })
    }
}

fn required<F>(get: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(get(var)).ok_or(ConfigError::MissingVar(var))
}

/// Action booleans: `true/false`, `1/0`, `yes/no`, `on/off` (any case). Blank → default.
fn parse_bool<F>(get: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(v) = non_empty(get(var)) else {
        return Ok(default);
    };
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            reason: format!("expected a boolean, got '{v}'"),
        }),
    }
}

fn is_owner_repo(s: &str) -> bool {
    let mut parts = s.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::collections::HashMap;

    fn lookup(extra: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut map: HashMap<String, String> = [
            ("INPUT_GITHUB_TOKEN", "ghs_token"),
            ("INPUT_OPENROUTER_API_KEY", "sk-or-key"),
            ("GITHUB_REPOSITORY", "octo/app"),
            ("GITHUB_RUN_ID", "1234"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            map.insert(k.to_string(), v.to_string());
        }
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn minimal_environment_uses_defaults() {
        let cfg = RescueConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.github.base_api, DEFAULT_GITHUB_API);
        assert_eq!(cfg.github.repository, "octo/app");
        assert_eq!(cfg.run_id, 1234);
        assert!(cfg.include_logs);
        assert!(!cfg.dry_run);
        assert_eq!(cfg.comment_mode, CommentMode::UpdateExisting);
        assert_eq!(cfg.deadline, None);
        assert_eq!(cfg.event, EventContext::default());
        assert_eq!(cfg.llm.model, "openai/gpt-4o-mini");
        assert_eq!(cfg.llm.max_tokens, Some(1000));
    }

    #[test]
    fn action_inputs_are_applied() {
        let cfg = RescueConfig::from_lookup(lookup(&[
            ("INPUT_INCLUDE_LOGS", "false"),
            ("INPUT_DRY_RUN", "TRUE"),
            ("INPUT_COMMENT_MODE", "replace"),
            ("INPUT_MAX_TOKENS", "2000"),
            ("CI_RESCUE_DEADLINE_SECS", "300"),
            ("GITHUB_API_URL", "https://ghe.example.com/api/v3"),
            ("GITHUB_EVENT_NAME", "pull_request"),
            ("GITHUB_EVENT_PATH", "/tmp/event.json"),
            ("GITHUB_SHA", "abc123"),
        ]))
        .unwrap();
        assert!(!cfg.include_logs);
        assert!(cfg.dry_run);
        assert_eq!(cfg.comment_mode, CommentMode::Replace);
        assert_eq!(cfg.llm.max_tokens, Some(2000));
        assert_eq!(cfg.deadline, Some(Duration::from_secs(300)));
        assert_eq!(cfg.github.base_api, "https://ghe.example.com/api/v3");
        assert_eq!(cfg.event.name.as_deref(), Some("pull_request"));
        assert_eq!(cfg.event.path, Some(PathBuf::from("/tmp/event.json")));
        assert_eq!(cfg.event.sha.as_deref(), Some("abc123"));
    }

    #[test]
    fn invalid_inputs_are_config_errors() {
        let bad = [
            ("INPUT_MAX_TOKENS", "0"),
            ("INPUT_MAX_TOKENS", "many"),
            ("INPUT_COMMENT_MODE", "append"),
            ("INPUT_DRY_RUN", "maybe"),
            ("GITHUB_RUN_ID", "run-7"),
            ("GITHUB_REPOSITORY", "just-a-name"),
            ("GITHUB_API_URL", "api.github.com"),
            ("CI_RESCUE_DEADLINE_SECS", "soon"),
            ("INPUT_GITHUB_TOKEN", "  "),
        ];
        for (var, value) in bad {
            let res = RescueConfig::from_lookup(lookup(&[(var, value)]));
            assert!(
                matches!(res, Err(Error::Config(_))),
                "{var}={value} should be rejected"
            );
        }
    }

    #[test]
    fn missing_model_key_is_reported_by_name() {
        let res = RescueConfig::from_lookup(lookup(&[("INPUT_OPENROUTER_API_KEY", "")]));
        let err = res.unwrap_err().to_string();
        assert!(err.contains("INPUT_OPENROUTER_API_KEY"), "{err}");
    }
}
