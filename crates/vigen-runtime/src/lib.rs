//! # vigen-runtime
//!
//! Model-backed half of vigen: generation, judging, illustration and page
//! extraction on top of the deterministic rules in `vigen-core`.
//!
//! ## Components
//!
//! - [`providers`]: the `VisionProvider` trait, the Gemini provider (behind
//!   the `gemini` feature), credentials and transport retries
//! - [`agents`]: vision client with phase logs, item generator, illustrator
//!   and page extractor
//! - [`validators`]: quality and consistency judges
//! - [`pipeline`]: the accept / retry / reject loop and batch statistics
//! - [`store`]: on-disk artifacts
//!
//! One model request is in flight at a time. Transient provider errors are
//! resent by the transport layer and never reach the regeneration loop.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigen_runtime::{GeminiProvider, Pipeline, RunOptions, Settings};
//! use vigen_core::Category;
//!
//! let settings = Settings::load(None)?;
//! let provider = Arc::new(GeminiProvider::from_env()?);
//! let pipeline = Pipeline::from_settings(provider, &settings);
//!
//! let result = pipeline
//!     .run("chart.png".as_ref(), Category::Graph, &RunOptions::from_settings(&settings))
//!     .await;
//! println!("{} after {} attempts", result.status, result.attempts);
//! ```

pub mod agents;
pub mod audit;
pub mod config;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod store;
pub mod usage;
pub mod validators;

#[cfg(test)]
mod testing;

pub use agents::{
    ExtractionRun, GenerationOutcome, ImageGenerator, ImagingError, ItemGenerator, PageExtractor, VisionAnalysis,
    VisionClient, VisionError,
};
pub use config::{Settings, SettingsError};
pub use pipeline::{statistics, BatchStatistics, Pipeline, PipelineError, PipelineResult, PipelineStatus, RunOptions};
pub use providers::{
    ApiCredential, GeminiProvider, GeminiProviderFactory, GenerationConfig, ProviderError, ProviderFactory,
    ProviderRegistry, TransportPolicy, VisionProvider,
};
pub use store::{ArtifactStore, StoreError};
pub use usage::{LlmUsage, UsageTracker};
pub use validators::{ConsistencyValidator, Judge, QualityChecker};
