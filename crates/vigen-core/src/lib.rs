//! # vigen-core
//!
//! Deterministic core of the vision item generator.
//!
//! This crate owns everything that does not talk to a model:
//! - the item, evidence and validation data model
//! - extraction of JSON objects from free-form model text
//! - item, verdict and page-layout parsing
//! - structural quality rules and the PASS / RETRY / REJECT decision
//! - input image checks
//!
//! ## Key Guarantees
//!
//! 1. **No network**: model calls live in `vigen-runtime`
//! 2. **Order-independent decisions**: swapping the two judge reports never
//!    changes the outcome
//! 3. **Never panics on model text**: malformed responses become `None`,
//!    a parse error, or a REVIEW report
//!
//! ## Example
//!
//! ```rust,ignore
//! use vigen_core::{decide, parse_verdict, Decision, ValidatorKind};
//!
//! let quality = parse_verdict(&item_id, ValidatorKind::Quality, &quality_text);
//! let consistency = parse_verdict(&item_id, ValidatorKind::Consistency, &consistency_text);
//!
//! match decide(&quality, &consistency) {
//!     Decision::Pass => println!("ship {}", item_id),
//!     Decision::Retry => println!("generate again"),
//!     Decision::Reject => println!("image cannot support this item"),
//! }
//! ```

pub mod decision;
pub mod evidence;
pub mod extract;
pub mod ids;
pub mod input;
pub mod item;
pub mod layout;
pub mod quality;
pub mod types;
pub mod verdict;

// Re-export main types at crate root
pub use decision::{decide, is_critical, union_codes, Decision, CRITICAL_CODES};
pub use evidence::{extract_evidence, truncate_chars};
pub use extract::{extract_json, extract_json_object};
pub use input::{list_images, validate_image, ImageFormat, InputCheck, SUPPORTED_EXTENSIONS};
pub use item::{parse_item, ItemDraft, ItemParseError, QuestionContext};
pub use layout::{
    parse_page, AgenticLog, AgenticStep, BoundingBox, ExtractedItem, ExtractionResult,
    ItemLayoutKind, LayoutParseError, PageExtraction, PageLayout, PageSize, PassageInfo,
};
pub use quality::{check_structure, StructuralCheck, StructuralFinding};
pub use types::{
    Category, Choice, Difficulty, EvidencePack, FailureCode, GeneratedImage, GenerationLog,
    PhaseLog, PhaseType, Question, Region, ValidationReport, ValidationStatus, ValidatorKind,
    VisualSpec,
};
pub use verdict::{failed_verdict, parse_verdict, unparseable_verdict};
