//! The risk record accumulated while a query is lexed and parsed.
//!
//! [`QueryRisk`] is a plain attribute bag. The lexer bumps the lexical
//! counters (comments, hex strings, global variables) and the grammar engine
//! records structural signals as it reduces productions. Scoring those
//! signals is left to downstream heuristics.

/// The kind of statement a query starts with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryType {
    #[default]
    Unknown,
    Select,
    Insert,
    Replace,
    Update,
    Delete,
    Create,
    Drop,
    Transaction,
    Set,
    Show,
    Describe,
}

/// Structural signals collected during one parse attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRisk {
    pub query_type: QueryType,
    /// Set once a complete statement list has been reduced.
    pub valid: bool,

    // -- lexical --------------------------------------------------------
    pub multi_line_comments: u32,
    pub hash_comments: u32,
    pub dash_dash_comments: u32,
    /// `/*! ... */` executable comments.
    pub mysql_comments: u32,
    /// `/*!40100 ... */` executable comments gated on a server version.
    pub mysql_versioned_comments: u32,
    pub hex_strings: u32,
    /// `@@name` server variables.
    pub global_variables: u32,

    // -- structural ------------------------------------------------------
    pub or_statements: u32,
    pub union_statements: u32,
    pub union_all_statements: u32,
    pub join_statements: u32,
    pub cross_join_statements: u32,
    pub if_statements: u32,
    pub benchmark_statements: u32,
    /// `USER()`, `CURRENT_USER()` and friends.
    pub user_statements: u32,
    /// `VERSION()`, `DATABASE()` and other server-probing calls.
    pub fingerprinting_statements: u32,
    /// `CHAR()`, `CONCAT()`, `SUBSTRING()` and similar obfuscation helpers.
    pub string_manipulation_statements: u32,
    pub sensitive_tables: u32,
    pub information_schema: bool,
    /// Every table name referenced, in first-seen order, lowercased.
    pub tables: Vec<String>,
    /// Some WHERE/HAVING/ON clause contains an always-true sub-expression.
    pub always_true_conditional: bool,
    /// `ORDER BY <integer>`, the usual column-count probe.
    pub order_by_number: bool,
    /// More than one statement in a single query string.
    pub multiple_queries: bool,
    /// Length of the longest `LIKE` pattern literal.
    pub regex_length: u32,
    pub slow_regexes: u32,
}

impl QueryRisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total comments of every flavour.
    pub fn comments(&self) -> u32 {
        self.multi_line_comments
            + self.hash_comments
            + self.dash_dash_comments
            + self.mysql_comments
            + self.mysql_versioned_comments
    }

    /// Record a referenced table once, lowercased.
    pub(crate) fn add_table(&mut self, name: &str) {
        let lower = name.to_ascii_lowercase();
        if !self.tables.contains(&lower) {
            self.tables.push(lower);
        }
    }
}

/// Where the raw lexer sends lexical risk signals.
///
/// The grammar engine lexes with [`RiskSink::Record`]. The drain that finishes
/// the fingerprint after a syntax error lexes with [`RiskSink::Discard`], so
/// the record handed back to the caller reflects only what was parsed.
pub enum RiskSink<'a> {
    Record(&'a mut QueryRisk),
    Discard,
}

impl RiskSink<'_> {
    pub(crate) fn record(&mut self, f: impl FnOnce(&mut QueryRisk)) {
        if let RiskSink::Record(risk) = self {
            f(risk);
        }
    }

    /// Whether lexed values should be staged for the grammar.
    pub(crate) fn is_recording(&self) -> bool {
        matches!(self, RiskSink::Record(_))
    }

    /// A shorter-lived sink writing to the same place.
    pub(crate) fn reborrow(&mut self) -> RiskSink<'_> {
        match self {
            RiskSink::Record(risk) => RiskSink::Record(&mut **risk),
            RiskSink::Discard => RiskSink::Discard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_is_empty() {
        let risk = QueryRisk::new();
        assert_eq!(risk.query_type, QueryType::Unknown);
        assert!(!risk.valid);
        assert_eq!(risk.comments(), 0);
        assert!(risk.tables.is_empty());
    }

    #[test]
    fn comments_sums_every_flavour() {
        let risk = QueryRisk {
            multi_line_comments: 1,
            hash_comments: 2,
            dash_dash_comments: 3,
            mysql_comments: 4,
            mysql_versioned_comments: 5,
            ..QueryRisk::default()
        };
        assert_eq!(risk.comments(), 15);
    }

    #[test]
    fn tables_are_deduplicated_case_insensitively() {
        let mut risk = QueryRisk::new();
        risk.add_table("Users");
        risk.add_table("users");
        risk.add_table("orders");
        assert_eq!(risk.tables, vec!["users".to_string(), "orders".to_string()]);
    }

    #[test]
    fn discard_sink_drops_updates() {
        let mut sink = RiskSink::Discard;
        sink.record(|r| r.hash_comments += 1);
        assert!(!sink.is_recording());

        let mut risk = QueryRisk::new();
        let mut sink = RiskSink::Record(&mut risk);
        sink.record(|r| r.hash_comments += 1);
        assert!(sink.is_recording());
        assert_eq!(risk.hash_comments, 1);
    }
}
