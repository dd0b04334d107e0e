pub mod deduplication;
pub mod extraction;
pub mod synthesis;
pub mod validation;

pub use deduplication::*;
pub use extraction::*;
pub use synthesis::*;
pub use validation::*;

use std::time::Instant;

/// Milliseconds since `start`
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
