pub mod quantity;
pub mod negation;
pub mod taxonomy;
pub mod evidence;
pub mod baseline;

pub use baseline::*;
pub use evidence::*;
pub use taxonomy::*;

use crate::models::{FactRecord, PolicyChunk};

/// Anything that turns a clinical note into a fact record.
///
/// Extraction never fails: degraded paths come back as a record whose
/// `extraction_mode` says what happened.
pub trait FactExtractor {
    fn extract(&self, note: &str, retrieved_policy: &[PolicyChunk]) -> FactRecord;
}
