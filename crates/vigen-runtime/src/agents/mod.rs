//! Model-backed agents: vision analysis, item generation, illustration and
//! page extraction.

pub mod extractor;
pub mod generator;
pub mod imaging;
pub mod vision;

pub use extractor::{ExtractionRun, PageExtractor};
pub use generator::{GenerationOutcome, ItemGenerator};
pub use imaging::{visual_spec_for, visual_type, ImageGenerator, ImagingError, RenderedImage, RESOLUTION};
pub use vision::{VisionAnalysis, VisionClient, VisionError};
