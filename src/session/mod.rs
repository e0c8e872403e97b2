//! Per-query parsing sessions.
//!
//! A [`QuerySession`] is created for every query string the firewall sees.
//! It owns the query's scan buffer, runs the grammar engine over it at most
//! once, and memoizes the outcome: status, risk record, AST and token
//! fingerprint. Reads before [`QuerySession::parse`] fail with
//! [`WardenError::NotParsed`].
//!
//! When a parse fails the session keeps lexing until end of input, without
//! recording risk, so the fingerprint always covers the whole token stream.
//! That keeps fingerprints comparable between queries that parse and queries
//! that do not.

pub mod bridge;

use std::borrow::Cow;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::AnalyzerConfig;
use crate::error::{Result, WardenError};
use crate::fingerprint::TokenFingerprint;
use crate::risk::QueryRisk;
use crate::sql::ast::Statement;
use crate::sql::lexer::ScanBuffer;
use crate::sql::parser::Parser;

pub use crate::sql::parser::{ParseStatus, SyntaxError};

use self::bridge::TokenBridge;

/// Serializes grammar calls across the process when
/// [`AnalyzerConfig::serialize_grammar`] is set.
static GRAMMAR_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// The memoized outcome of a session's single parse attempt.
#[derive(Debug, Clone)]
struct ParsedQuery {
    status: ParseStatus,
    risk: QueryRisk,
    statements: Vec<Statement>,
    error: Option<SyntaxError>,
    fingerprint: TokenFingerprint,
}

#[derive(Debug)]
enum SessionState {
    Created,
    Parsed(ParsedQuery),
}

/// One query string and everything derived from it.
#[derive(Debug)]
pub struct QuerySession<'c> {
    scan: ScanBuffer,
    config: Cow<'c, AnalyzerConfig>,
    fingerprint: TokenFingerprint,
    state: SessionState,
}

impl QuerySession<'static> {
    /// Create a session with the default configuration.
    pub fn new(text: &str) -> Result<Self> {
        Self::build(text, Cow::Owned(AnalyzerConfig::default()))
    }
}

impl<'c> QuerySession<'c> {
    /// Create a session bound to `text`.
    ///
    /// Fails with [`WardenError::ScanInit`] if no scan buffer can be created
    /// for the text; no session exists in that case.
    pub fn with_config(text: &str, config: &'c AnalyzerConfig) -> Result<Self> {
        Self::build(text, Cow::Borrowed(config))
    }

    fn build(text: &str, config: Cow<'c, AnalyzerConfig>) -> Result<Self> {
        let scan = ScanBuffer::new(text, config.max_query_len).map_err(|err| {
            warn!(len = text.len(), error = %err, "rejecting query");
            err
        })?;
        Ok(QuerySession {
            scan,
            config,
            fingerprint: TokenFingerprint::new(),
            state: SessionState::Created,
        })
    }

    /// Parse the query, filling `risk`.
    ///
    /// The grammar runs only on the first call. Later calls overwrite `risk`
    /// with the record from that first run and return its status again.
    pub fn parse(&mut self, risk: &mut QueryRisk) -> ParseStatus {
        if let SessionState::Parsed(parsed) = &self.state {
            *risk = parsed.risk.clone();
            return parsed.status;
        }

        let parsed = self.run_grammar(risk);
        let status = parsed.status;
        debug!(
            %status,
            tokens = parsed.fingerprint.token_count,
            hash = parsed.fingerprint.hash,
            "query parsed"
        );
        self.state = SessionState::Parsed(parsed);
        status
    }

    fn run_grammar(&mut self, risk: &mut QueryRisk) -> ParsedQuery {
        let config: &AnalyzerConfig = &self.config;

        let outcome = {
            let _guard = config.serialize_grammar.then(|| {
                trace!("acquiring grammar lock");
                GRAMMAR_LOCK.lock()
            });
            self.scan.staging_mut().clear();
            let mut bridge = TokenBridge::new(&mut self.scan, &mut self.fingerprint);
            Parser::run(&mut bridge, risk, config)
        };

        debug_assert!(
            !(outcome.status.is_valid() && risk.valid) || self.scan.staging().is_empty(),
            "staged lexer values left unconsumed after a successful parse"
        );

        if !outcome.status.is_valid() {
            // Finish the fingerprint outside the lock, recording nothing.
            let drained = TokenBridge::new(&mut self.scan, &mut self.fingerprint).drain();
            debug!(drained, status = %outcome.status, "drained lexer after failed parse");
        }

        ParsedQuery {
            status: outcome.status,
            risk: risk.clone(),
            statements: outcome.statements,
            error: outcome.error,
            fingerprint: self.fingerprint,
        }
    }

    fn parsed(&self) -> Result<&ParsedQuery> {
        match &self.state {
            SessionState::Parsed(parsed) => Ok(parsed),
            SessionState::Created => Err(WardenError::NotParsed),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self.state, SessionState::Parsed(_))
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn status(&self) -> Result<ParseStatus> {
        Ok(self.parsed()?.status)
    }

    /// The fingerprint of the complete token stream.
    pub fn fingerprint(&self) -> Result<TokenFingerprint> {
        Ok(self.parsed()?.fingerprint)
    }

    pub fn risk(&self) -> Result<&QueryRisk> {
        Ok(&self.parsed()?.risk)
    }

    /// The statements reduced by the grammar. On failure, those completed
    /// before the error.
    pub fn statements(&self) -> Result<&[Statement]> {
        Ok(&self.parsed()?.statements)
    }

    pub fn syntax_error(&self) -> Result<Option<&SyntaxError>> {
        Ok(self.parsed()?.error.as_ref())
    }

    /// Consume the session, keeping only what was derived from it.
    pub fn into_analysis(self) -> Result<Analysis> {
        match self.state {
            SessionState::Parsed(parsed) => Ok(Analysis {
                status: parsed.status,
                fingerprint: parsed.fingerprint,
                risk: parsed.risk,
                statements: parsed.statements,
                syntax_error: parsed.error,
            }),
            SessionState::Created => Err(WardenError::NotParsed),
        }
    }
}

/// An owned snapshot of a parsed session.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub status: ParseStatus,
    pub fingerprint: TokenFingerprint,
    pub risk: QueryRisk,
    pub statements: Vec<Statement>,
    pub syntax_error: Option<SyntaxError>,
}

impl Analysis {
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }
}

/// Create a session for `text`, parse it and return the result.
pub fn analyze(text: &str, config: &AnalyzerConfig) -> Result<Analysis> {
    let mut session = QuerySession::with_config(text, config)?;
    let mut risk = QueryRisk::new();
    session.parse(&mut risk);
    session.into_analysis()
}
