pub mod client;
pub mod parser;
pub mod prompts;
pub mod schema;

#[cfg(test)]
pub(crate) mod mock;

pub use client::*;
pub use parser::{ExtractionMethod, Parsed, extract_json_from_response, extract_json_value};
pub use prompts::*;
