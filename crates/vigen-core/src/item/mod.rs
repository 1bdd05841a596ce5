//! Generated item parsing and schema validation.

pub mod parser;
pub mod schema;

pub use parser::{parse_item, ItemDraft, ItemParseError, QuestionContext};
pub use schema::{validate_item_schema, SchemaError};
