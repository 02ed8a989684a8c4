pub mod enums;
pub mod case;
pub mod facts;
pub mod checklist;

pub use enums::*;
pub use case::*;
pub use facts::*;
pub use checklist::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },
}
