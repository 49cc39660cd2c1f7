//! Artifact extract/patch against persisted JSON shapes.

use genflow::artifact::{
    extract, patch, Artifact, ArtifactContent, ArtifactStore, ContentPath, ContentType,
    InMemoryArtifactStore,
};
use genflow::error::ApiError;
use serde_json::{json, Value};

#[test]
fn each_shape_projects_to_its_editable_field() {
    let cases: Vec<(Value, &str, ContentType, bool, ContentPath)> = vec![
        (json!("plain post"), "plain post", ContentType::Text, true, ContentPath::Root),
        (
            json!({"finalScript": "the script", "durationSec": 90}),
            "the script",
            ContentType::Script,
            true,
            ContentPath::FinalScript,
        ),
        (
            json!({"title": "Week 3", "content": "body"}),
            "body",
            ContentType::Article,
            true,
            ContentPath::Content,
        ),
        (
            json!([{"image": "data:image/png;base64,AA", "prompt": "p"}]),
            "",
            ContentType::Images,
            false,
            ContentPath::Root,
        ),
    ];
    for (value, text, content_type, editable, path) in cases {
        let view = extract(&value);
        assert_eq!(view.text, text);
        assert_eq!(view.content_type, content_type);
        assert_eq!(view.is_editable, editable);
        assert_eq!(view.content_path, path);
    }
}

#[test]
fn opaque_objects_round_trip_through_json_text() {
    let original = json!({"headline": "Old", "colors": ["red"]});
    let view = extract(&original);
    assert_eq!(view.content_type, ContentType::Json);

    let edited_text = view.text.replace("Old", "New");
    let patched = patch(&original, &edited_text, view.content_path).unwrap();
    assert_eq!(patched, json!({"headline": "New", "colors": ["red"]}));

    let broken = patch(&original, "{\"headline\": ", ContentPath::Root).unwrap();
    assert_eq!(broken, json!("{\"headline\": "));
}

#[test]
fn patch_keeps_the_shape_discriminant() {
    let original = json!({"title": "Intro", "content": "draft", "tags": ["a"]});
    let patched = patch(&original, "final body", ContentPath::Content).unwrap();
    assert!(matches!(
        ArtifactContent::from_value(patched.clone()),
        ArtifactContent::TitledContent { .. }
    ));
    assert_eq!(patched["tags"], json!(["a"]));
    assert_eq!(extract(&patched).text, "final body");
}

#[test]
fn store_edits_go_through_patch() {
    let store = InMemoryArtifactStore::new();
    let content = ArtifactContent::from_value(json!({"finalScript": "v1"}));
    store.save(&Artifact::new("s-1", "script_review", &content)).unwrap();

    let updated = store.update_text("s-1", "v2", ContentPath::FinalScript).unwrap();
    assert_eq!(updated.content, json!({"finalScript": "v2"}));
    assert!(updated.updated_at >= updated.created_at);

    let err = store.update_text("s-1", "v3", ContentPath::Content).unwrap_err();
    assert!(matches!(err, ApiError::ArtifactNotEditable(_)));
    assert_eq!(store.load("s-1").unwrap().unwrap().content, json!({"finalScript": "v2"}));

    store.delete("s-1").unwrap();
    assert!(store.is_empty());
}
