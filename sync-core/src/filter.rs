//! Key inclusion/exclusion filters.
//!
//! Patterns are globs compiled with `globset`: `*` matches any run of
//! characters (including `/` and none at all), `?` matches exactly one
//! character and `[...]` matches a character class.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building a [`KeyFilter`].
#[derive(Debug, Error)]
pub enum FilterError {
    /// A pattern is not a valid glob.
    #[error("invalid key pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parser error from globset.
        #[source]
        source: globset::Error,
    },
}

/// The patterns of a [`KeyFilter`] as they appear in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPatterns {
    /// Patterns a key must match; empty means "everything".
    #[serde(default)]
    pub include: Vec<String>,
    /// Patterns that reject a key.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Decides which keys are tracked for sync.
///
/// A key is tracked when it matches at least one `include` pattern (or
/// `include` is empty) and matches no `exclude` pattern. Exclusion wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FilterPatterns", into = "FilterPatterns")]
pub struct KeyFilter {
    patterns: FilterPatterns,
    include: GlobSet,
    exclude: GlobSet,
}

impl KeyFilter {
    /// Compile a filter from include and exclude patterns.
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Result<Self, FilterError> {
        Self::try_from(FilterPatterns { include, exclude })
    }

    /// Whether `key` passes the filter.
    pub fn allows(&self, key: &str) -> bool {
        let included = self.patterns.include.is_empty() || self.include.is_match(key);
        included && !self.exclude.is_match(key)
    }

    /// Include patterns as configured.
    pub fn include(&self) -> &[String] {
        &self.patterns.include
    }

    /// Exclude patterns as configured.
    pub fn exclude(&self) -> &[String] {
        &self.patterns.exclude
    }
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self {
            patterns: FilterPatterns::default(),
            include: GlobSet::empty(),
            exclude: GlobSet::empty(),
        }
    }
}

impl PartialEq for KeyFilter {
    fn eq(&self, other: &Self) -> bool {
        self.patterns == other.patterns
    }
}

impl Eq for KeyFilter {}

impl TryFrom<FilterPatterns> for KeyFilter {
    type Error = FilterError;

    fn try_from(patterns: FilterPatterns) -> Result<Self, Self::Error> {
        let include = compile(&patterns.include)?;
        let exclude = compile(&patterns.exclude)?;
        Ok(Self {
            patterns,
            include,
            exclude,
        })
    }
}

impl From<KeyFilter> for FilterPatterns {
    fn from(filter: KeyFilter) -> Self {
        filter.patterns
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet, FilterError> {
    let invalid = |pattern: &str, source| FilterError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| invalid(pattern, e))?);
    }
    builder.build().map_err(|e| invalid(&patterns.join(", "), e))
}
