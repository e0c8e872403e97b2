//! # Warden SQL
//!
//! The query-analysis core of a network-transparent database firewall.
//!
//! Each captured query string gets a [`QuerySession`]. Parsing it yields a
//! [`ParseStatus`], an AST, a [`QueryRisk`] record of structural signals
//! (comments, unions, tautologies, sensitive tables, ...) and a
//! [`TokenFingerprint`] that identifies the query's shape independently of
//! the literal values in it.
//!
//! ```
//! use warden::{QueryRisk, QuerySession, ParseStatus};
//!
//! let mut session = QuerySession::new("SELECT * FROM users WHERE id = 1 OR 1=1").unwrap();
//! let mut risk = QueryRisk::new();
//! assert_eq!(session.parse(&mut risk), ParseStatus::Valid);
//! assert!(risk.always_true_conditional);
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod risk;
pub mod session;
pub mod sql;

pub use config::AnalyzerConfig;
pub use error::{Result, WardenError};
pub use fingerprint::TokenFingerprint;
pub use risk::{QueryRisk, QueryType};
pub use session::{analyze, Analysis, ParseStatus, QuerySession, SyntaxError};
pub use sql::{AstNode, NodeRef};
