//! Analyzer configuration.
//!
//! [`AnalyzerConfig`] carries the limits and policy knobs the parsing adapter
//! consults. Every field has a default, so a TOML document only needs to name
//! the values it overrides:
//!
//! ```toml
//! max_query_len = 65536
//! serialize_grammar = true
//! sensitive_tables = ["mysql.user", "accounts"]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

/// Limits and policy for query analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Longest query text, in bytes, for which a scan buffer is created.
    pub max_query_len: usize,
    /// Deepest expression/subselect nesting the grammar reduces before it
    /// gives up with [`crate::ParseStatus::ResourceExhausted`].
    pub max_nesting_depth: usize,
    /// Hold the process-wide grammar lock around every grammar call. Only
    /// needed when the grammar engine is swapped for a non-reentrant one.
    pub serialize_grammar: bool,
    /// Tables whose mere mention marks a query as touching sensitive data.
    /// Matched case-insensitively against `name` and `schema.name`.
    pub sensitive_tables: Vec<String>,
    /// A `LIKE` pattern with at least this many wildcards counts as slow.
    pub slow_regex_wildcards: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_query_len: 1024 * 1024,
            max_nesting_depth: 128,
            serialize_grammar: false,
            sensitive_tables: default_sensitive_tables(),
            slow_regex_wildcards: 3,
        }
    }
}

fn default_sensitive_tables() -> Vec<String> {
    [
        "mysql.user",
        "mysql.db",
        "information_schema.tables",
        "information_schema.columns",
        "information_schema.schemata",
        "pg_shadow",
        "sqlite_master",
    ]
    .iter()
    .map(|t| (*t).to_string())
    .collect()
}

impl AnalyzerConfig {
    /// Parse a TOML document, filling unspecified fields with defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AnalyzerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject limits that would make every query unanalyzable.
    pub fn validate(&self) -> Result<()> {
        if self.max_query_len == 0 {
            return Err(WardenError::Config("max_query_len must be non-zero".into()));
        }
        if self.max_nesting_depth == 0 {
            return Err(WardenError::Config(
                "max_nesting_depth must be non-zero".into(),
            ));
        }
        if self.slow_regex_wildcards == 0 {
            return Err(WardenError::Config(
                "slow_regex_wildcards must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Whether `table` (optionally schema-qualified) is on the sensitive list.
    pub fn is_sensitive_table(&self, table: &str) -> bool {
        self.sensitive_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }
}
