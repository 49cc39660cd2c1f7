//! genflow: Resilient Generation Orchestration
//!
//! Every content tool funnels its generative calls through this crate: a retrying,
//! model-cascading gateway, modality adapters, a repair-tolerant JSON parser, a staged
//! pipeline executor, a pattern-to-reference mapper for image tools, and a uniform
//! model for editing heterogeneously shaped artifacts.

pub mod adapter;
pub mod api;
pub mod artifact;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod parse;
pub mod pattern;
pub mod pipeline;
pub mod provider;

pub use api::{ActionResponse, StudioApi};
pub use error::{ApiError, ErrorKind};
pub use gateway::{Invocation, InvocationGateway, InvocationRequest, RetryPolicy};
