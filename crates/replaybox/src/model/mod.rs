pub mod case;
pub mod ids;
pub mod normalization;
pub mod outcome;

pub use case::*;
pub use ids::{RunId, SessionId};
pub use normalization::*;
pub use outcome::*;

/// Maximum length for user-supplied regex patterns to prevent `ReDoS` attacks.
pub const MAX_REGEX_PATTERN_LEN: usize = 1000;
