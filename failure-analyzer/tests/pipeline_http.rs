use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use ai_llm_service::{CancellationToken, RetryPolicy};
use failure_analyzer::publish::render::{COMMENT_MARKER, render_managed_region};
use failure_analyzer::{
    CommentAction, Error, RescueConfig, RescueOutcome, parse_response, run_rescue,
};
use httpmock::Method::{GET, PATCH, POST};
use httpmock::{Mock, MockServer};
use serde_json::json;
use tempfile::NamedTempFile;

const MODEL_REPLY: &str = "SUMMARY: The tests fail because `@testing-library/jest-dom` is not installed.\n\
FIX STEPS:\n\
1. Run `npm install --save-dev @testing-library/jest-dom`.\n\
2. Commit the updated lockfile.";

fn pr_event(number: u64) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", json!({"pull_request": {"number": number}})).unwrap();
    file
}

fn config(server: &MockServer, event: Option<&NamedTempFile>, extra: &[(&str, &str)]) -> RescueConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    let mut set = |k: &str, v: String| {
        vars.insert(k.to_string(), v);
    };
    set("INPUT_GITHUB_TOKEN", "ghs_test".into());
    set("INPUT_OPENROUTER_API_KEY", "sk-or-test".into());
    set("GITHUB_REPOSITORY", "octo/app".into());
    set("GITHUB_RUN_ID", "42".into());
    set("GITHUB_API_URL", server.base_url());
    set("OPENROUTER_BASE_URL", format!("{}/api/v1", server.base_url()));
    if let Some(file) = event {
        set("GITHUB_EVENT_NAME", "pull_request".into());
        set("GITHUB_EVENT_PATH", file.path().display().to_string());
    } else {
        set("GITHUB_EVENT_NAME", "push".into());
    }
    for (k, v) in extra {
        set(k, v.to_string());
    }

    let mut cfg = RescueConfig::from_lookup(move |k: &str| vars.get(k).cloned()).unwrap();
    cfg.llm.retry = RetryPolicy {
        max_retries: 2,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        jitter: false,
    };
    cfg
}

fn mock_failed_run(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/repos/octo/app/actions/runs/42/jobs");
        then.status(200).json_body(json!({
            "jobs": [
                {"id": 1, "name": "build", "conclusion": "success"},
                {"id": 2, "name": "test", "conclusion": "failure", "steps": [
                    {"name": "Run tests", "conclusion": "failure"}
                ]}
            ]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/octo/app/actions/jobs/2/logs");
        then.status(200)
            .body("FAIL src/App.test.js\nError: Cannot find module '@testing-library/jest-dom'");
    });
}

fn mock_model<'a>(server: &'a MockServer, reply: &str) -> Mock<'a> {
    let reply = reply.to_string();
    server.mock(move |when, then| {
        when.method(POST)
            .path("/api/v1/chat/completions")
            .body_includes("Run tests")
            .body_includes("@testing-library/jest-dom");
        then.status(200).json_body(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        }));
    })
}

fn mock_comments(server: &MockServer, pr: u64, comments: serde_json::Value) -> Mock<'_> {
    server.mock(move |when, then| {
        when.method(GET)
            .path(format!("/repos/octo/app/issues/{pr}/comments"));
        then.status(200).json_body(comments);
    })
}

#[tokio::test]
async fn first_run_creates_the_managed_comment() {
    let server = MockServer::start();
    mock_failed_run(&server);
    let model = mock_model(&server, MODEL_REPLY);
    mock_comments(&server, 7, json!([
        {"id": 1, "body": "LGTM", "user": {"login": "alice"}, "created_at": "2025-01-01T00:00:00Z"}
    ]));
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/app/issues/7/comments")
            .body_includes(COMMENT_MARKER)
            .body_includes("jest-dom")
            .body_includes("Suggested fix");
        then.status(201).json_body(json!({"id": 900}));
    });

    let event = pr_event(7);
    let outcome = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(
        outcome,
        RescueOutcome::Posted {
            action: CommentAction::Create,
            comment_id: 900
        }
    );
    model.assert_calls(1);
    create.assert_calls(1);
}

#[tokio::test]
async fn every_failed_job_reaches_the_model_and_the_comment() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/octo/app/actions/runs/42/jobs");
        then.status(200).json_body(json!({
            "jobs": [
                {"id": 3, "name": "lint", "conclusion": "failure", "steps": [
                    {"name": "Run ruff", "conclusion": "failure"}
                ]},
                {"id": 4, "name": "unit", "conclusion": "failure", "steps": [
                    {"name": "Run tests", "conclusion": "failure"}
                ]}
            ]
        }));
    });
    for (id, line) in [(3, "error: F401 unused import os"), (4, "FAILED tests/test_app.py::test_boot")] {
        server.mock(move |when, then| {
            when.method(GET).path(format!("/repos/octo/app/actions/jobs/{id}/logs"));
            then.status(200)
                .body(format!("{}{line}\n{}", "setup output\n".repeat(200), "teardown\n".repeat(30)));
        });
    }
    let model = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/chat/completions")
            .body_includes("- Job: lint")
            .body_includes("- Job: unit")
            .body_includes("F401 unused import")
            .body_includes("test_boot");
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "SUMMARY: Lint and unit tests both fail."}}]
        }));
    });
    mock_comments(&server, 7, json!([]));
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/app/issues/7/comments")
            .body_includes("### Failed jobs")
            .body_includes("**lint** → Run ruff (failure)")
            .body_includes("**unit** → Run tests (failure)");
        then.status(201).json_body(json!({"id": 901}));
    });

    let event = pr_event(7);
    let outcome = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(
        outcome,
        RescueOutcome::Posted {
            action: CommentAction::Create,
            comment_id: 901
        }
    );
    model.assert_calls(1);
    create.assert_calls(1);
}

#[tokio::test]
async fn later_runs_edit_the_earliest_managed_comment() {
    let server = MockServer::start();
    mock_failed_run(&server);
    mock_model(&server, MODEL_REPLY);
    mock_comments(&server, 7, json!([
        {"id": 60, "body": format!("{COMMENT_MARKER}\nduplicate"), "created_at": "2025-01-03T00:00:00Z"},
        {"id": 50, "body": format!("{COMMENT_MARKER}\nold analysis"), "created_at": "2025-01-02T00:00:00Z"}
    ]));
    let create = server.mock(|when, then| {
        when.method(POST).path("/repos/octo/app/issues/7/comments");
        then.status(201).json_body(json!({"id": 1}));
    });
    let edit = server.mock(|when, then| {
        when.method(PATCH)
            .path("/repos/octo/app/issues/comments/50")
            .body_includes("jest-dom");
        then.status(200).json_body(json!({"id": 50}));
    });

    let event = pr_event(7);
    let outcome = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RescueOutcome::Posted {
            action: CommentAction::Update,
            comment_id: 50
        }
    );
    edit.assert_calls(1);
    create.assert_calls(0);
}

#[tokio::test]
async fn identical_analysis_skips_the_write() {
    let server = MockServer::start();
    mock_failed_run(&server);
    mock_model(&server, MODEL_REPLY);
    let current = render_managed_region(&parse_response(MODEL_REPLY));
    mock_comments(&server, 7, json!([
        {"id": 50, "body": current, "created_at": "2025-01-02T00:00:00Z"}
    ]));
    let edit = server.mock(|when, then| {
        when.method(PATCH).path("/repos/octo/app/issues/comments/50");
        then.status(200).json_body(json!({"id": 50}));
    });

    let event = pr_event(7);
    let outcome = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RescueOutcome::Unchanged { comment_id: 50 });
    edit.assert_calls(0);
}

#[tokio::test]
async fn create_new_mode_ignores_the_existing_comment() {
    let server = MockServer::start();
    mock_failed_run(&server);
    mock_model(&server, MODEL_REPLY);
    mock_comments(&server, 7, json!([
        {"id": 50, "body": format!("{COMMENT_MARKER}\nold"), "created_at": "2025-01-02T00:00:00Z"}
    ]));
    let create = server.mock(|when, then| {
        when.method(POST).path("/repos/octo/app/issues/7/comments");
        then.status(201).json_body(json!({"id": 51}));
    });

    let event = pr_event(7);
    let cfg = config(&server, Some(&event), &[("INPUT_COMMENT_MODE", "create-new")]);
    let outcome = run_rescue(&cfg, CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome,
        RescueOutcome::Posted {
            action: CommentAction::Create,
            comment_id: 51
        }
    );
    create.assert_calls(1);
}

#[tokio::test]
async fn dry_run_never_writes() {
    let server = MockServer::start();
    mock_failed_run(&server);
    let model = mock_model(&server, MODEL_REPLY);
    mock_comments(&server, 7, json!([]));
    let create = server.mock(|when, then| {
        when.method(POST).path("/repos/octo/app/issues/7/comments");
        then.status(201).json_body(json!({"id": 1}));
    });

    let event = pr_event(7);
    let cfg = config(&server, Some(&event), &[("INPUT_DRY_RUN", "true")]);
    let outcome = run_rescue(&cfg, CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome,
        RescueOutcome::DryRun {
            action: CommentAction::Create
        }
    );
    model.assert_calls(1);
    create.assert_calls(0);
}

#[tokio::test]
async fn degraded_reply_is_still_posted() {
    let server = MockServer::start();
    mock_failed_run(&server);
    mock_model(&server, "Looks like a dependency problem with jest-dom, try reinstalling.");
    mock_comments(&server, 7, json!([]));
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/app/issues/7/comments")
            .body_includes("Looks like a dependency problem");
        then.status(201).json_body(json!({"id": 77}));
    });

    let event = pr_event(7);
    let outcome = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RescueOutcome::Posted { comment_id: 77, .. }));
    create.assert_calls(1);
}

#[tokio::test]
async fn run_without_pull_request_ends_quietly() {
    let server = MockServer::start();
    mock_failed_run(&server);
    let model = mock_model(&server, MODEL_REPLY);

    let outcome = run_rescue(&config(&server, None, &[]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RescueOutcome::NoPullRequest);
    model.assert_calls(0);
}

#[tokio::test]
async fn run_without_failed_jobs_is_empty_input() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/octo/app/actions/runs/42/jobs");
        then.status(200).json_body(json!({
            "jobs": [{"id": 1, "name": "build", "conclusion": "success"}]
        }));
    });
    let model = mock_model(&server, MODEL_REPLY);

    let event = pr_event(7);
    let err = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EmptyInput), "{err:?}");
    model.assert_calls(0);
}

#[tokio::test]
async fn model_outage_posts_nothing() {
    let server = MockServer::start();
    mock_failed_run(&server);
    let model = server.mock(|when, then| {
        when.method(POST).path("/api/v1/chat/completions");
        then.status(503).body("overloaded");
    });
    let comments = mock_comments(&server, 7, json!([]));
    let create = server.mock(|when, then| {
        when.method(POST).path("/repos/octo/app/issues/7/comments");
        then.status(201).json_body(json!({"id": 1}));
    });

    let event = pr_event(7);
    let err = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ModelUnavailable(_)), "{err:?}");
    model.assert_calls(3);
    comments.assert_calls(0);
    create.assert_calls(0);
}

#[tokio::test]
async fn failed_comment_write_is_surfaced() {
    let server = MockServer::start();
    mock_failed_run(&server);
    mock_model(&server, MODEL_REPLY);
    mock_comments(&server, 7, json!([]));
    let create = server.mock(|when, then| {
        when.method(POST).path("/repos/octo/app/issues/7/comments");
        then.status(500).body("boom");
    });

    let event = pr_event(7);
    let err = run_rescue(&config(&server, Some(&event), &[]), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CommentWrite(_)), "{err:?}");
    create.assert_calls(1);
}

#[tokio::test]
async fn cancelled_run_makes_no_calls() {
    let server = MockServer::start();
    let jobs = server.mock(|when, then| {
        when.method(GET).path("/repos/octo/app/actions/runs/42/jobs");
        then.status(200).json_body(json!({"jobs": []}));
    });

    let cancel = CancellationToken::new();
    cancel.cancel();
    let event = pr_event(7);
    let err = run_rescue(&config(&server, Some(&event), &[]), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "{err:?}");
    jobs.assert_calls(0);
}
