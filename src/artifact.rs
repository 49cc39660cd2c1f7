//! Artifact Content Model
//!
//! Generated content is persisted as opaque JSON in one of a few shapes. This module
//! classifies that JSON into a closed union, projects it to a single editable text, and
//! patches edited text back into the same shape.

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

const FINAL_SCRIPT_FIELD: &str = "finalScript";
const TITLE_FIELD: &str = "title";
const CONTENT_FIELD: &str = "content";
const IMAGE_FIELD: &str = "image";

/// Which field of the persisted content the editable text maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentPath {
    Root,
    FinalScript,
    Content,
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentPath::Root => "root",
            ContentPath::FinalScript => "finalScript",
            ContentPath::Content => "content",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ContentPath {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(ContentPath::Root),
            "finalScript" | "final_script" => Ok(ContentPath::FinalScript),
            "content" => Ok(ContentPath::Content),
            other => Err(ApiError::ArtifactNotEditable(format!(
                "unknown content path: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Text,
    Script,
    Article,
    Images,
    Json,
}

/// Persisted content shapes, probed in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "value", rename_all = "camelCase")]
pub enum ArtifactContent {
    /// Plain string
    Root(String),
    /// Object carrying a `finalScript` string
    FinalScript {
        final_script: String,
        extra: Map<String, Value>,
    },
    /// Object carrying `title` plus a `content` string
    TitledContent {
        title: Value,
        content: String,
        extra: Map<String, Value>,
    },
    /// List whose first element has an `image` field; view-only
    ImageList(Vec<Value>),
    /// Anything else
    Opaque(Value),
}

/// Editable projection of an artifact's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableView {
    pub text: String,
    pub content_type: ContentType,
    pub is_editable: bool,
    pub content_path: ContentPath,
}

impl ArtifactContent {
    /// Classify opaque persisted JSON.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => ArtifactContent::Root(text),
            Value::Object(mut map) => {
                if let Some(Value::String(_)) = map.get(FINAL_SCRIPT_FIELD) {
                    if let Some(Value::String(final_script)) = map.remove(FINAL_SCRIPT_FIELD) {
                        return ArtifactContent::FinalScript {
                            final_script,
                            extra: map,
                        };
                    }
                }
                if map.contains_key(TITLE_FIELD) {
                    if let Some(Value::String(_)) = map.get(CONTENT_FIELD) {
                        let title = map.remove(TITLE_FIELD).unwrap_or(Value::Null);
                        let content = match map.remove(CONTENT_FIELD) {
                            Some(Value::String(content)) => content,
                            _ => String::new(),
                        };
                        return ArtifactContent::TitledContent {
                            title,
                            content,
                            extra: map,
                        };
                    }
                }
                ArtifactContent::Opaque(Value::Object(map))
            }
            Value::Array(items) => {
                let is_image_list = items
                    .first()
                    .and_then(Value::as_object)
                    .map(|first| first.contains_key(IMAGE_FIELD))
                    .unwrap_or(false);
                if is_image_list {
                    ArtifactContent::ImageList(items)
                } else {
                    ArtifactContent::Opaque(Value::Array(items))
                }
            }
            other => ArtifactContent::Opaque(other),
        }
    }

    /// Persisted JSON for this content.
    pub fn to_value(&self) -> Value {
        match self {
            ArtifactContent::Root(text) => Value::String(text.clone()),
            ArtifactContent::FinalScript {
                final_script,
                extra,
            } => {
                let mut map = extra.clone();
                map.insert(
                    FINAL_SCRIPT_FIELD.to_string(),
                    Value::String(final_script.clone()),
                );
                Value::Object(map)
            }
            ArtifactContent::TitledContent {
                title,
                content,
                extra,
            } => {
                let mut map = extra.clone();
                map.insert(TITLE_FIELD.to_string(), title.clone());
                map.insert(CONTENT_FIELD.to_string(), Value::String(content.clone()));
                Value::Object(map)
            }
            ArtifactContent::ImageList(items) => Value::Array(items.clone()),
            ArtifactContent::Opaque(value) => value.clone(),
        }
    }

    pub fn content_path(&self) -> ContentPath {
        match self {
            ArtifactContent::FinalScript { .. } => ContentPath::FinalScript,
            ArtifactContent::TitledContent { .. } => ContentPath::Content,
            _ => ContentPath::Root,
        }
    }

    pub fn extract(&self) -> EditableView {
        let (text, content_type, is_editable) = match self {
            ArtifactContent::Root(text) => (text.clone(), ContentType::Text, true),
            ArtifactContent::FinalScript { final_script, .. } => {
                (final_script.clone(), ContentType::Script, true)
            }
            ArtifactContent::TitledContent { content, .. } => {
                (content.clone(), ContentType::Article, true)
            }
            ArtifactContent::ImageList(_) => (String::new(), ContentType::Images, false),
            ArtifactContent::Opaque(value) => (
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
                ContentType::Json,
                true,
            ),
        };
        EditableView {
            text,
            content_type,
            is_editable,
            content_path: self.content_path(),
        }
    }

    /// Write edited text back through `path`.
    ///
    /// `Root` on a string replaces it; on any other editable shape the text is parsed
    /// as JSON and kept as a raw string when it does not parse. Field paths replace that
    /// field only and must match the content's shape.
    pub fn patch(&self, new_text: &str, path: ContentPath) -> Result<ArtifactContent, ApiError> {
        match (self, path) {
            (ArtifactContent::ImageList(_), _) => Err(ApiError::ArtifactNotEditable(
                "image lists have no editable text".to_string(),
            )),
            (ArtifactContent::Root(_), ContentPath::Root) => {
                Ok(ArtifactContent::Root(new_text.to_string()))
            }
            (_, ContentPath::Root) => Ok(match serde_json::from_str::<Value>(new_text) {
                Ok(parsed) => ArtifactContent::from_value(parsed),
                Err(_) => ArtifactContent::Root(new_text.to_string()),
            }),
            (ArtifactContent::FinalScript { extra, .. }, ContentPath::FinalScript) => {
                Ok(ArtifactContent::FinalScript {
                    final_script: new_text.to_string(),
                    extra: extra.clone(),
                })
            }
            (ArtifactContent::TitledContent { title, extra, .. }, ContentPath::Content) => {
                Ok(ArtifactContent::TitledContent {
                    title: title.clone(),
                    content: new_text.to_string(),
                    extra: extra.clone(),
                })
            }
            (content, path) => Err(ApiError::ArtifactNotEditable(format!(
                "content path '{}' does not apply to content at '{}'",
                path,
                content.content_path()
            ))),
        }
    }
}

/// Editable projection of opaque persisted JSON.
pub fn extract(content: &Value) -> EditableView {
    ArtifactContent::from_value(content.clone()).extract()
}

/// Patch opaque persisted JSON with edited text.
pub fn patch(original: &Value, new_text: &str, path: ContentPath) -> Result<Value, ApiError> {
    ArtifactContent::from_value(original.clone())
        .patch(new_text, path)
        .map(|patched| patched.to_value())
}

/// One unit of persisted generated content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    /// Producing tool or workflow, e.g. `script_review`
    pub kind: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, content: &ArtifactContent) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: kind.into(),
            content: content.to_value(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn view(&self) -> EditableView {
        extract(&self.content)
    }
}

/// Persistence boundary for artifacts
pub trait ArtifactStore: Send + Sync {
    fn save(&self, artifact: &Artifact) -> Result<(), ApiError>;
    fn load(&self, id: &str) -> Result<Option<Artifact>, ApiError>;
    fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// Load, patch the editable text and save back.
    fn update_text(
        &self,
        id: &str,
        new_text: &str,
        path: ContentPath,
    ) -> Result<Artifact, ApiError> {
        let mut artifact = self
            .load(id)?
            .ok_or_else(|| ApiError::ArtifactNotFound(id.to_string()))?;
        artifact.content = patch(&artifact.content, new_text, path)?;
        artifact.updated_at = Utc::now();
        self.save(&artifact)?;
        Ok(artifact)
    }
}

/// Process-local store keyed by artifact id
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save(&self, artifact: &Artifact) -> Result<(), ApiError> {
        self.artifacts
            .write()
            .insert(artifact.id.clone(), artifact.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Artifact>, ApiError> {
        Ok(self.artifacts.read().get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.artifacts
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::ArtifactNotFound(id.to_string()))
    }
}
