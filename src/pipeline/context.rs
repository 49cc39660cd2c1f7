//! Pipeline context: current stage outputs plus an append-only audit history.

use crate::error::ApiError;
use crate::parse;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::hash::Hash;

/// Identifies one stage of a workflow.
pub trait StageKey: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;
}

/// Output of one completed stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// Raw model text (or caller-edited text)
    pub raw: String,
    /// Structured form, for stages that expect JSON
    pub parsed: Option<Value>,
    /// Caller input the stage ran with
    pub input: Option<String>,
    /// Model that produced the output; `None` for caller edits
    pub model: Option<String>,
    pub attempts: u32,
    pub revision: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOrigin {
    Generated,
    Edited,
}

/// One entry of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord<S> {
    pub stage: S,
    pub origin: RecordOrigin,
    pub output: StageOutput,
}

/// Ordered mapping of stage to its current output.
///
/// Entries are replaced whole, never mutated in place; every replacement is appended to
/// `history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext<S: StageKey> {
    workflow: String,
    source: Option<String>,
    outputs: IndexMap<S, StageOutput>,
    history: Vec<StageRecord<S>>,
}

impl<S: StageKey> PipelineContext<S> {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            source: None,
            outputs: IndexMap::new(),
            history: Vec::new(),
        }
    }

    /// Attach the material the workflow operates on (e.g. the script under review).
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn output(&self, stage: S) -> Option<&StageOutput> {
        self.outputs.get(&stage)
    }

    pub fn text(&self, stage: S) -> Option<&str> {
        self.output(stage).map(|o| o.raw.as_str())
    }

    pub fn parsed(&self, stage: S) -> Option<&Value> {
        self.output(stage).and_then(|o| o.parsed.as_ref())
    }

    pub fn is_complete(&self, stage: S) -> bool {
        self.outputs.contains_key(&stage)
    }

    /// Stages with an output, in completion order.
    pub fn completed(&self) -> impl Iterator<Item = S> + '_ {
        self.outputs.keys().copied()
    }

    pub fn history(&self) -> &[StageRecord<S>] {
        &self.history
    }

    /// Text of a prerequisite stage, or `StageNotReady` naming both stages.
    pub fn require_text(&self, needed_by: S, stage: S) -> Result<&str, ApiError> {
        self.text(stage).ok_or_else(|| ApiError::StageNotReady {
            stage: needed_by.name().to_string(),
            missing: stage.name().to_string(),
        })
    }

    fn next_revision(&self, stage: S) -> u32 {
        self.output(stage).map(|o| o.revision + 1).unwrap_or(1)
    }

    /// Store a freshly generated output, replacing any previous one for `stage`.
    pub(crate) fn record(&mut self, stage: S, mut output: StageOutput) -> &StageOutput {
        output.revision = self.next_revision(stage);
        self.push(stage, RecordOrigin::Generated, output)
    }

    /// Replace a completed stage's text with caller-edited text.
    ///
    /// Stages that carried structured output are re-parsed; an unparseable edit keeps
    /// the raw text and drops the structure.
    pub fn edit(&mut self, stage: S, text: impl Into<String>) -> Result<&StageOutput, ApiError> {
        let previous = self.output(stage).ok_or_else(|| ApiError::StageNotReady {
            stage: stage.name().to_string(),
            missing: stage.name().to_string(),
        })?;
        let raw = text.into();
        let parsed = if previous.parsed.is_some() {
            parse::parse_json::<Value>(&raw).ok()
        } else {
            None
        };
        let output = StageOutput {
            raw,
            parsed,
            input: previous.input.clone(),
            model: None,
            attempts: 0,
            revision: previous.revision + 1,
            completed_at: Utc::now(),
        };
        Ok(self.push(stage, RecordOrigin::Edited, output))
    }

    fn push(&mut self, stage: S, origin: RecordOrigin, output: StageOutput) -> &StageOutput {
        self.history.push(StageRecord {
            stage,
            origin,
            output: output.clone(),
        });
        // Re-insert so the map keeps completion order
        self.outputs.shift_remove(&stage);
        self.outputs.insert(stage, output);
        &self.outputs[&stage]
    }
}
