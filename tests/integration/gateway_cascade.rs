//! Cascade and retry behaviour driven through the adapters.

use super::test_utils::{image_response, test_config, ScriptedClient};
use genflow::adapter::Adapters;
use genflow::error::ApiError;
use genflow::provider::InlineImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn adapters(client: Arc<ScriptedClient>) -> Adapters {
    Adapters::from_config(client, &test_config())
}

#[tokio::test(start_paused = true)]
async fn quota_errors_back_off_then_switch_models() {
    let client = Arc::new(ScriptedClient::new());
    client
        .always("m1", || Err(ApiError::Provider("429 quota exceeded".to_string())))
        .then_text("m2", "from the fallback");

    let started = Instant::now();
    let result = adapters(client.clone())
        .text
        .generate("Write a tagline", 0.7)
        .await
        .unwrap();

    assert_eq!(result.value, "from the fallback");
    assert_eq!(result.model, "m2");
    assert_eq!(result.attempts, 4);
    assert_eq!(client.calls_for("m1"), 3);
    assert!(started.elapsed() >= Duration::from_millis(1000 + 2000 + 4000));
}

#[tokio::test(start_paused = true)]
async fn unknown_model_is_skipped_without_waiting() {
    let client = Arc::new(ScriptedClient::new());
    // m1 has no script and reports "not found"
    client.then_text("m2", "ok");

    let started = Instant::now();
    let result = adapters(client.clone())
        .text
        .generate("hi", 0.2)
        .await
        .unwrap();

    assert_eq!(result.model, "m2");
    assert_eq!(result.attempts, 2);
    assert_eq!(client.calls_for("m1"), 1);
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn caller_errors_do_not_try_other_models() {
    let client = Arc::new(ScriptedClient::new());
    client
        .always("m1", || {
            Err(ApiError::Provider("400 INVALID_ARGUMENT: bad temperature".to_string()))
        })
        .then_text("m2", "never used");

    let err = adapters(client.clone())
        .text
        .generate("hi", 9.0)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("INVALID_ARGUMENT"));
    assert_eq!(client.calls_for("m1"), 1);
    assert_eq!(client.calls_for("m2"), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_cascade_reports_last_error_within_attempt_bound() {
    let client = Arc::new(ScriptedClient::new());
    client
        .always("m1", || Err(ApiError::Provider("503 overloaded".to_string())))
        .always("m2", || Err(ApiError::Provider("RESOURCE_EXHAUSTED".to_string())));

    let err = adapters(client.clone())
        .text
        .generate("hi", 0.2)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("RESOURCE_EXHAUSTED"));
    assert_eq!(client.calls().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn analysis_uses_its_own_cascade_and_forwards_images() {
    let client = Arc::new(ScriptedClient::new());
    client.then_text("vision", "{\"patterns\": []}");
    let images = vec![
        InlineImage::from_bytes("image/png", b"one"),
        InlineImage::from_bytes("image/png", b"two"),
    ];

    let result = adapters(client.clone())
        .analysis
        .analyze("Describe", &images, 0.4)
        .await
        .unwrap();

    assert_eq!(result.model, "vision");
    assert_eq!(client.calls()[0].images, 2);
}

#[tokio::test(start_paused = true)]
async fn variants_are_isolated_from_each_other() {
    let client = Arc::new(ScriptedClient::new());
    client
        .then("painter", || Ok(image_response("painter", "QQ==")))
        .then("painter", || Err(ApiError::Provider("SAFETY: blocked".to_string())))
        .then("painter", || Ok(image_response("painter", "Qg==")));

    let results = adapters(client)
        .generate_variants("Poster", &[], 3)
        .await;

    let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(ok.len(), 2);
    assert!(ok.iter().all(|inv| inv.value.starts_with("data:image/png;base64,")));
}
