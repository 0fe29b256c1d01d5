use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_modebench::issuer::RequestIssuer;
use rust_modebench::mode::{Mode, ModeToggler, PhaseOutcome};
use rust_modebench::suite::{both_completed, for_each_mode};

fn toggler(server: &MockServer, strict: bool) -> ModeToggler {
    let issuer = RequestIssuer::new(reqwest::Client::new(), &server.uri());
    ModeToggler::new(issuer, Duration::from_secs(2), Duration::ZERO).verify_acknowledgement(strict)
}

async fn mount_acknowledging_toggle(server: &MockServer) {
    for use_ai in [false, true] {
        Mock::given(method("POST"))
            .and(path("/toggle-ai"))
            .and(body_json(json!({ "use_claude_ai": use_ai })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "current_mode": use_ai })))
            .expect(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn both_modes_run_when_the_target_acknowledges() {
    let server = MockServer::start().await;
    mount_acknowledging_toggle(&server).await;

    let order = std::sync::Mutex::new(Vec::new());
    let order_ref = &order;
    let phases = for_each_mode(&toggler(&server, true), "Toggle", move |mode| async move {
        order_ref.lock().unwrap().push(mode);
        mode.label()
    })
    .await;

    assert_eq!(*order.lock().unwrap(), vec![Mode::Local, Mode::Ai]);
    assert_eq!(both_completed(&phases), Some((&"local", &"ai")));
}

#[tokio::test]
async fn rejected_toggle_skips_the_phase() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toggle-ai"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let runs = AtomicUsize::new(0);
    let runs_ref = &runs;
    let phases = for_each_mode(&toggler(&server, false), "Toggle", move |_mode| async move {
        runs_ref.fetch_add(1, Ordering::SeqCst);
    })
    .await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(phases.values().all(PhaseOutcome::is_skipped));
    match &phases[&Mode::Local] {
        PhaseOutcome::Skipped { reason } => assert!(reason.contains("503"), "reason: {}", reason),
        other => panic!("expected a skipped phase, got {:?}", other),
    }
}

#[tokio::test]
async fn strict_toggle_requires_matching_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toggle-ai"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "current_mode": false })))
        .mount(&server)
        .await;

    let toggler = toggler(&server, true);
    assert!(toggler.toggle(Mode::Local).await.is_ok());
    assert!(toggler.toggle(Mode::Ai).await.is_err());
}

#[tokio::test]
async fn missing_acknowledgement_only_fails_strict_toggles() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toggle-ai"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    assert!(toggler(&server, false).toggle(Mode::Ai).await.is_ok());
    assert!(toggler(&server, true).toggle(Mode::Ai).await.is_err());
}

#[tokio::test]
async fn one_failed_mode_leaves_the_other_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toggle-ai"))
        .and(body_json(json!({ "use_claude_ai": false })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/toggle-ai"))
        .and(body_json(json!({ "use_claude_ai": true })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let phases = for_each_mode(&toggler(&server, false), "Toggle", |_mode| async { 42 }).await;

    assert_eq!(phases[&Mode::Local].completed(), Some(&42));
    assert!(phases[&Mode::Ai].is_skipped());
    assert!(both_completed(&phases).is_none());
}
