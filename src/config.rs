//! Config module: compile-time options for the filter language.
//!
//! The choices the grammar leaves open (negative slice offsets, string case
//! sensitivity) are pinned here so hosts can load them from their own config.

use serde::{Deserialize, Serialize};

/// How negative slice offsets such as `frame[-4:]` are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceIndexMode {
    /// Negative offsets count back from the end of the value.
    #[default]
    FromEnd,
    /// Any negative offset is a range error.
    Reject,
}

/// Case handling for character-string comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringCase {
    #[default]
    Sensitive,
    Insensitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub slice_indices: SliceIndexMode,
    pub string_case: StringCase,
    pub matches_case_insensitive: bool,
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            slice_indices: SliceIndexMode::FromEnd,
            string_case: StringCase::Sensitive,
            matches_case_insensitive: true,
            optimize: true,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slice_indices(mut self, mode: SliceIndexMode) -> Self {
        self.slice_indices = mode;
        self
    }

    pub fn string_case(mut self, case: StringCase) -> Self {
        self.string_case = case;
        self
    }

    pub fn matches_case_insensitive(mut self, enabled: bool) -> Self {
        self.matches_case_insensitive = enabled;
        self
    }

    pub fn optimize(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn test_defaults() {
        let opts = CompileOptions::default();
        assert_eq!(opts.slice_indices, SliceIndexMode::FromEnd);
        assert_eq!(opts.string_case, StringCase::Sensitive);
        assert!(opts.matches_case_insensitive);
        assert!(opts.optimize);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts: CompileOptions =
            serde_json::from_str(r#"{"slice_indices": "reject", "optimize": false}"#).unwrap();
        assert_eq!(opts.slice_indices, SliceIndexMode::Reject);
        assert!(!opts.optimize);
        assert_eq!(opts.string_case, StringCase::Sensitive);
    }

    #[test]
    fn test_builder_setters() {
        let opts = CompileOptions::new()
            .string_case(StringCase::Insensitive)
            .matches_case_insensitive(false);
        let json = serde_json::to_string(&opts).unwrap();
        let back: CompileOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(opts, back);
    }
}
