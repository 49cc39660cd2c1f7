//! Integration tests for the genflow generation layer

mod artifact_editing;
mod config_integration;
mod gateway_cascade;
mod pattern_mapping;
mod pipeline_flow;
mod test_utils;
