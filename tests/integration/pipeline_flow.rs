//! Script review workflow driven stage by stage through the Studio API.

use super::test_utils::{test_config, MapFetcher, ScriptedClient};
use genflow::api::StudioApi;
use genflow::artifact::{ArtifactContent, ContentPath, InMemoryArtifactStore};
use genflow::error::ApiError;
use genflow::pipeline::workflows::script_review::{self, ScriptStage};
use genflow::pipeline::{RecordOrigin, StageInput};
use serde_json::json;
use std::sync::Arc;

fn studio(client: Arc<ScriptedClient>) -> StudioApi {
    StudioApi::new(
        client,
        Arc::new(MapFetcher::default()),
        Arc::new(InMemoryArtifactStore::new()),
        &test_config(),
    )
}

fn script_client() -> Arc<ScriptedClient> {
    let client = Arc::new(ScriptedClient::new());
    client
        .then_text(
            "m1",
            "Here you go:\n```json\n{\"hook\": \"Did you know?\", \"sections\": [], \"callToAction\": \"Enroll\"}\n```",
        )
        .then_text("m1", "Beginners who want quick wins.")
        .then_text("m1", "The middle drags; the CTA is weak.")
        .then_text("m1", "I think you should tighten it.")
        .then_text(
            "m1",
            "{\"proposals\": [{\"target\": \"middle\", \"change\": \"cut\", \"reason\": \"pacing\"}]}",
        )
        .then_text("m1", "```\nDid you know? Enroll today.\n```");
    client
}

#[tokio::test]
async fn full_review_produces_a_final_script_artifact() {
    let client = script_client();
    let api = studio(client.clone());
    let workflow = script_review::workflow();
    let mut ctx = script_review::new_context("Did you know? ... Enroll.");

    for stage in [
        ScriptStage::StructureAnalysis,
        ScriptStage::AudienceAnalysis,
        ScriptStage::DeepAnalysis,
        ScriptStage::ImprovementProposal,
        ScriptStage::FinalWrite,
    ] {
        let response = api
            .run_stage(&workflow, &mut ctx, stage, &StageInput::none())
            .await;
        assert!(response.success, "{:?} failed: {:?}", stage, response.error);
    }

    assert_eq!(
        ctx.parsed(ScriptStage::StructureAnalysis).unwrap()["callToAction"],
        json!("Enroll")
    );
    // Prose-only proposal output was regenerated once
    let proposal = ctx.output(ScriptStage::ImprovementProposal).unwrap();
    assert_eq!(proposal.attempts, 2);
    assert_eq!(proposal.parsed.as_ref().unwrap()["proposals"][0]["change"], json!("cut"));
    assert!(workflow.next_pending(&ctx).is_none());

    // Later prompts are built from earlier outputs
    let calls = client.calls();
    assert!(calls[1].prompt.contains("Did you know?"));
    assert!(calls[2].prompt.contains("Beginners who want quick wins."));

    let content = script_review::final_artifact(&ctx).unwrap();
    let saved = api
        .save_artifact(script_review::NAME, &content)
        .into_result()
        .unwrap();
    assert_eq!(saved.view().text, "Did you know? Enroll today.");
    assert_eq!(saved.view().content_path, ContentPath::FinalScript);

    let edited = api
        .edit_artifact(&saved.id, "Did you know? Join now.", ContentPath::FinalScript)
        .into_result()
        .unwrap();
    assert!(matches!(
        ArtifactContent::from_value(edited.content.clone()),
        ArtifactContent::FinalScript { .. }
    ));
    assert_eq!(edited.content["proposals"][0]["target"], json!("middle"));
}

#[tokio::test]
async fn stages_are_not_chained_and_require_prerequisites() {
    let client = Arc::new(ScriptedClient::new());
    let api = studio(client.clone());
    let workflow = script_review::workflow();
    let mut ctx = script_review::new_context("script");

    let response = api
        .run_stage(&workflow, &mut ctx, ScriptStage::DeepAnalysis, &StageInput::none())
        .await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("structure_analysis"));
    assert!(client.calls().is_empty());
    assert_eq!(ctx.completed().count(), 0);
}

#[tokio::test]
async fn edits_feed_the_next_stage_and_failures_keep_progress() {
    let client = Arc::new(ScriptedClient::new());
    client
        .then_text("m1", "{\"hook\": \"original\"}")
        .then("m1", || Err(ApiError::Provider("400 prompt blocked".to_string())))
        .then_text("m1", "audience ok");
    let api = studio(client.clone());
    let workflow = script_review::workflow();
    let mut ctx = script_review::new_context("script");

    api.run_stage(&workflow, &mut ctx, ScriptStage::StructureAnalysis, &StageInput::none())
        .await
        .into_result()
        .unwrap();
    ctx.edit(ScriptStage::StructureAnalysis, "{\"hook\": \"edited by hand\"}")
        .unwrap();
    assert_eq!(
        ctx.parsed(ScriptStage::StructureAnalysis).unwrap()["hook"],
        json!("edited by hand")
    );

    let failed = api
        .run_stage(&workflow, &mut ctx, ScriptStage::AudienceAnalysis, &StageInput::none())
        .await;
    assert!(!failed.success);
    assert!(ctx.is_complete(ScriptStage::StructureAnalysis));
    assert!(!ctx.is_complete(ScriptStage::AudienceAnalysis));

    let retried = api
        .run_stage(
            &workflow,
            &mut ctx,
            ScriptStage::AudienceAnalysis,
            &StageInput::text("focus on adult learners"),
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(retried.raw, "audience ok");
    assert_eq!(retried.input.as_deref(), Some("focus on adult learners"));

    let prompt = &client.calls()[2].prompt;
    assert!(prompt.contains("edited by hand"));
    assert!(prompt.ends_with("Reviewer notes:\nfocus on adult learners"));

    let origins: Vec<_> = ctx.history().iter().map(|r| r.origin).collect();
    assert_eq!(
        origins,
        vec![RecordOrigin::Generated, RecordOrigin::Edited, RecordOrigin::Generated]
    );
    assert_eq!(ctx.output(ScriptStage::StructureAnalysis).unwrap().revision, 2);
}
