//! Pattern classification and pattern-driven image generation.

use super::test_utils::{image_response, test_config, MapFetcher, ScriptedClient};
use genflow::api::StudioApi;
use genflow::artifact::InMemoryArtifactStore;
use genflow::pattern::{Pattern, PatternReferenceMapper};
use genflow::pipeline::workflows::banner::{self, BannerStage};
use genflow::pipeline::{PipelineContext, StageInput};
use genflow::provider::InlineImage;
use std::sync::Arc;

fn sources(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

fn pattern(indices: &[usize]) -> Pattern {
    Pattern {
        name: "Bright split layout".to_string(),
        description: Some("Photo left, copy right".to_string()),
        characteristics: Default::default(),
        source_indices: indices.to_vec(),
    }
}

#[tokio::test]
async fn one_and_three_fetch_first_and_third_source() {
    let fetcher = Arc::new(MapFetcher::serving(&["u1", "u2", "u3"]));
    let mapper = PatternReferenceMapper::new(fetcher.clone());

    let refs = mapper
        .references_for(&pattern(&[1, 3]), &sources(&["u1", "u2", "u3"]))
        .await;

    assert_eq!(fetcher.requested(), vec!["u1", "u3"]);
    let used: Vec<_> = refs.iter().map(|r| r.source_url.as_str()).collect();
    assert_eq!(used, vec!["u1", "u3"]);
}

#[tokio::test]
async fn classification_maps_indices_back_past_unfetchable_sources() {
    let client = Arc::new(ScriptedClient::new());
    // The model sees three images: u1, u3, u4 (u2 fails to fetch)
    client.then_text(
        "vision",
        r#"{"patterns": [
            {"name": "Split", "sourceIndices": [2, 3]},
            {"name": "Solo", "sourceIndices": [1]}
        ]}"#,
    );
    let fetcher = Arc::new(MapFetcher::serving(&["u1", "u3", "u4"]));
    let api = StudioApi::new(
        client.clone(),
        fetcher,
        Arc::new(InMemoryArtifactStore::new()),
        &test_config(),
    );

    let classification = api
        .classify_patterns(&sources(&["u1", "u2", "u3", "u4"]), None)
        .await
        .into_result()
        .unwrap();

    assert_eq!(classification.patterns.len(), 1);
    assert_eq!(classification.patterns[0].name, "Split");
    assert_eq!(classification.patterns[0].source_indices, vec![3, 4]);
    assert_eq!(classification.skipped_sources, vec![2]);
    assert_eq!(client.calls()[0].images, 3);
}

#[tokio::test]
async fn pattern_generation_falls_back_to_leading_sources() {
    let client = Arc::new(ScriptedClient::new());
    client.always("painter", || Ok(image_response("painter", "QUJD")));
    let fetcher = Arc::new(MapFetcher::serving(&["u1", "u2"]));
    let api = StudioApi::new(
        client.clone(),
        fetcher,
        Arc::new(InMemoryArtifactStore::new()),
        &test_config(),
    );

    // Index 3 points at a source that cannot be fetched
    let images = api
        .generate_from_pattern(&pattern(&[3]), &sources(&["u1", "u2", "u3"]), "Autumn course", 2)
        .await
        .into_result()
        .unwrap();

    assert_eq!(images.references, vec!["u1", "u2"]);
    assert_eq!(images.images.len(), 2);
    let calls = client.calls();
    assert!(calls.iter().all(|c| c.images == 2));
    assert!(calls[0].prompt.starts_with("Use the 2 attached reference images"));
    assert!(calls[0].prompt.contains("Pattern: Bright split layout"));
}

#[tokio::test]
async fn banner_workflow_analysis_feeds_patterns() {
    let client = Arc::new(ScriptedClient::new());
    client
        .then_text(
            "vision",
            "```json\n{\"patterns\": [{\"name\": \"Bold\", \"sourceIndices\": [1, 2]}]}\n```",
        )
        .then_text("m1", "{\"headline\": \"Learn faster\"}");
    let api = StudioApi::new(
        client,
        Arc::new(MapFetcher::default()),
        Arc::new(InMemoryArtifactStore::new()),
        &test_config(),
    );
    let workflow = banner::workflow();
    let mut ctx = PipelineContext::new(banner::NAME);
    let images = StageInput {
        text: None,
        images: vec![
            InlineImage::from_bytes("image/png", b"a"),
            InlineImage::from_bytes("image/png", b"b"),
        ],
    };

    api.run_stage(&workflow, &mut ctx, BannerStage::PatternAnalysis, &images)
        .await
        .into_result()
        .unwrap();
    let patterns = banner::patterns(&ctx, 2);
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].source_indices, vec![1, 2]);

    let copy = api
        .run_stage(&workflow, &mut ctx, BannerStage::CopyDraft, &StageInput::text("a data course"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(copy.parsed.unwrap()["headline"], "Learn faster");
}
