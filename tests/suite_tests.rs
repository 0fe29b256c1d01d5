use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{any, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_modebench::config::Config;
use rust_modebench::errors::HarnessError;
use rust_modebench::mode::Mode;
use rust_modebench::quick::Winner;
use rust_modebench::suite::SuiteContext;
use rust_modebench::{performance, quality_suite, quick};

fn context(server: &MockServer, results_dir: Option<&Path>) -> SuiteContext {
    let mut config = Config::load(None).expect("default configuration is valid");
    config.base_url = server.uri();
    config.mode_settle_delay = Duration::ZERO;
    config.toggle_timeout = Duration::from_secs(2);
    match results_dir {
        Some(dir) => config.results_dir = dir.to_path_buf(),
        None => config.save_results = false,
    }
    SuiteContext::new(config, reqwest::Client::new())
}

async fn mount_toggle(server: &MockServer) {
    for use_ai in [false, true] {
        Mock::given(method("POST"))
            .and(path("/toggle-ai"))
            .and(body_json(json!({ "use_claude_ai": use_ai })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "current_mode": use_ai })))
            .mount(server)
            .await;
    }
}

async fn mount_json(server: &MockServer, verb: &str, route: &str, status: u16, body: Value) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

fn rich_prediction() -> Value {
    json!({
        "prediction": {
            "home_team": "Liverpool",
            "away_team": "Chelsea",
            "win_probability_home": 0.5,
            "win_probability_draw": 0.3,
            "win_probability_away": 0.2,
            "reasoning": "El equipo local llega en gran forma, con una defensa sólida y un ataque que ha marcado en cada partido en casa durante las últimas semanas, mientras el visitante acumula lesiones importantes en el mediocampo y ha perdido puntos fuera.",
            "key_insights": ["Forma reciente", "Lesiones del visitante", "Ventaja de jugar en casa"]
        }
    })
}

#[tokio::test]
async fn quick_suite_compares_both_modes() {
    let server = MockServer::start().await;
    mount_toggle(&server).await;
    mount_json(&server, "GET", "/health", 200, json!({ "status": "healthy" })).await;
    mount_json(&server, "POST", "/predict", 200, rich_prediction()).await;
    mount_json(&server, "POST", "/chat", 500, json!({ "detail": "boom" })).await;

    let ctx = context(&server, None);
    let report = quick::run(&ctx).await.unwrap();

    for mode in Mode::ALL {
        let results = report.modes[&mode].completed().expect("mode ran");
        assert_eq!(results.endpoints.len(), 3);
        assert_eq!(results.endpoints["health"].success_rate, 1.0);
        assert_eq!(results.endpoints["chat"].avg_time, None);
        assert_eq!(results.endpoints["chat"].failed_tests, 2);
        assert_eq!(results.endpoints["chat"].errors, vec!["HTTP 500", "HTTP 500"]);
    }
    let comparison = report.comparison.expect("both modes completed");
    assert_eq!(comparison.endpoint_winners["chat"].reliability, Winner::Tie);
}

#[tokio::test]
async fn quality_suite_scores_richer_answers_higher() {
    let server = MockServer::start().await;
    mount_toggle(&server).await;
    // Local runs first and gets the bare predictions.
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "prediction": { "reasoning": "Empate." } })),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_json(&server, "POST", "/predict", 200, rich_prediction()).await;
    mount_json(
        &server,
        "POST",
        "/analyze",
        200,
        json!({
            "analysis": {
                "strengths": ["Presión alta", "Juego por bandas"],
                "weaknesses": ["Defensa aérea"],
                "key_players": ["Salah"],
                "recent_form": "Tres victorias en los últimos cuatro partidos",
                "coach": "El entrenador mantiene el once de la temporada pasada"
            }
        }),
    )
    .await;
    mount_json(
        &server,
        "POST",
        "/chat",
        200,
        json!({ "response": "Creo que Haaland marcará más de 30 goles esta temporada porque el City genera muchas ocasiones." }),
    )
    .await;

    let ctx = context(&server, None);
    let report = quality_suite::run(&ctx).await.unwrap();

    let local = &report.modes[&Mode::Local].completed().unwrap().summary;
    let ai = &report.modes[&Mode::Ai].completed().unwrap().summary;
    assert_eq!(local.total_tests, 6);
    assert_eq!(local.category_scores["predictions"], 0.0);
    assert_eq!(ai.category_scores["predictions"], 1.0);
    assert_eq!(local.category_scores["analysis"], 1.0);
    assert_eq!(local.category_scores["chat"], ai.category_scores["chat"]);

    let comparison = report.comparison.unwrap();
    assert!((comparison.quality_diff - 2.0 / 6.0).abs() < 1e-9);
    assert!(comparison.improvement_pct.unwrap() > 0.0);
}

#[tokio::test]
async fn mini_quality_records_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toggle-ai"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"prediction":{"home_team":"Arsenal","away_team":"Chelsea","reasoning":"Probabilidad del 55% de que gane el Arsenal por su forma en casa"}}"#,
        ))
        .mount(&server)
        .await;
    mount_json(&server, "POST", "/chat", 503, json!({})).await;

    let ctx = context(&server, None);
    let report = quality_suite::run_mini(&ctx).await.unwrap();

    let local = report.modes[&Mode::Local].completed().unwrap();
    assert_eq!(local.prediction.status, "success");
    assert_eq!(local.prediction.quality_score, 1.0);
    assert_eq!(local.prediction.flags["has_probabilities"], true);
    assert_eq!(local.prediction.flags["mentions_teams"], true);
    assert_eq!(local.chat.status, "error_503");
    assert_eq!(local.chat.quality_score, 0.0);
    assert_eq!(local.mode_summary.successful_tests, 1);
    assert_eq!(local.mode_summary.average_quality, 0.5);

    let comparison = report.comparison.unwrap();
    assert_eq!(comparison.quality_advantage, Winner::Tie);
}

#[tokio::test]
async fn performance_suite_covers_every_case() {
    let server = MockServer::start().await;
    mount_toggle(&server).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let ctx = context(&server, None);
    let report = performance::run(&ctx).await.unwrap();

    for mode in Mode::ALL {
        let perf = report.modes[&mode].completed().unwrap();
        assert_eq!(perf.categories.len(), 4);
        assert_eq!(perf.categories["basic"].len(), 4);
        assert_eq!(perf.summary.total_tests_run, 95);
        assert_eq!(perf.summary.overall_success_rate, 1.0);
        let health = &perf.categories["basic"]["health"];
        assert_eq!(health.sample_responses.len(), 2);
    }
    assert!(report.comparison.is_some());
}

#[tokio::test]
async fn unreachable_target_is_fatal_for_performance() {
    let server = MockServer::start().await;
    mount_json(&server, "GET", "/health", 503, json!({})).await;

    let ctx = context(&server, None);
    match performance::run(&ctx).await {
        Err(HarnessError::Unreachable(url)) => assert_eq!(url, server.uri()),
        other => panic!("expected an unreachable target, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn skipped_modes_are_saved_with_their_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toggle-ai"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&server, Some(dir.path()));
    let report = quick::run(&ctx).await.unwrap();
    assert!(report.comparison.is_none());

    let saved = ctx.save("quick", &report).unwrap().expect("saving is enabled");
    assert!(saved.starts_with(dir.path()));
    let json: Value = serde_json::from_str(&std::fs::read_to_string(&saved).unwrap()).unwrap();
    assert_eq!(json["modes"]["local"]["status"], "skipped");
    assert!(json["modes"]["ai"]["data"]["reason"]
        .as_str()
        .unwrap()
        .contains("500"));
}
