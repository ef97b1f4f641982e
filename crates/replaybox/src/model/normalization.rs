use serde::{Deserialize, Serialize};

/// A user-supplied rewrite applied to both transcripts before comparison.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizationRule {
    pub pattern: String,
    #[serde(default)]
    pub replace: String,
}

/// Normalization settings for transcript comparison.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizationConfig {
    /// Skip all normalization, including the built-in rules.
    #[serde(default)]
    pub strict: bool,
    /// Extra rules, applied after the built-in ones.
    #[serde(default)]
    pub rules: Vec<NormalizationRule>,
}
