//! Concrete content workflows.

pub mod banner;
pub mod script_review;

pub use banner::BannerStage;
pub use script_review::ScriptStage;
