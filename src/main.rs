use std::process::ExitCode;
use std::time::Duration;

use ai_llm_service::CancellationToken;
use failure_analyzer::errors::workflow_error_command;
use failure_analyzer::{RescueConfig, RescueOutcome, run_rescue};
use tracing::{Level, error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file (local runs); the action itself has none.
    dotenvy::dotenv().ok();

    ai_llm_service::telemetry::init("info", Level::INFO);

    let cfg = match RescueConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => return fail(&e),
    };

    let cancel = CancellationToken::new();
    spawn_watchdog(cancel.clone(), cfg.deadline);

    match run_rescue(&cfg, cancel).await {
        Ok(RescueOutcome::Posted { action, comment_id }) => {
            info!("comment {} ({})", comment_id, action.as_str());
            ExitCode::SUCCESS
        }
        Ok(RescueOutcome::Unchanged { comment_id }) => {
            info!("comment {} unchanged", comment_id);
            ExitCode::SUCCESS
        }
        Ok(RescueOutcome::DryRun { action }) => {
            info!("dry-run: would {} the comment", action.as_str());
            ExitCode::SUCCESS
        }
        Ok(RescueOutcome::NoPullRequest) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

/// Cancels the run on the configured deadline or on Ctrl-C / runner shutdown.
fn spawn_watchdog(cancel: CancellationToken, deadline: Option<Duration>) {
    tokio::spawn(async move {
        let timer = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = timer => warn!("run deadline of {:?} reached, cancelling", deadline),
            _ = tokio::signal::ctrl_c() => warn!("interrupt received, cancelling"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

fn fail(e: &failure_analyzer::Error) -> ExitCode {
    error!("ci-rescue failed: {}", e);
    println!("{}", workflow_error_command("CI Rescue", &e.to_string()));
    ExitCode::FAILURE
}
