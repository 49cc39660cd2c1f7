//! Stage Pipeline
//!
//! A workflow is a fixed, ordered list of named stages. Each stage reads the outputs of
//! earlier stages from a typed `PipelineContext`, makes one adapter call and produces a
//! new output. Stages are triggered one at a time by the caller, so outputs can be
//! inspected or edited between runs. The executor never chains stages and performs no
//! dependency tracking: re-running a stage replaces its entry and leaves re-deriving
//! later stages to the caller.

mod context;
mod executor;
mod stage;
pub mod workflows;

pub use context::{PipelineContext, RecordOrigin, StageKey, StageOutput, StageRecord};
pub use executor::StageExecutor;
pub use stage::{Modality, ResponseFormat, StageDefinition, StageInput, Workflow};
