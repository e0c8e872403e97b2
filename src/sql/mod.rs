//! SQL front-end for Warden.
//!
//! This module contains the streaming lexer, the abstract syntax tree (AST)
//! definitions, the structural queries run over that tree, and the
//! recursive-descent grammar engine that reduces a token stream into it.

pub mod lexer;
pub mod ast;
pub mod node;
pub mod parser;

pub use ast::*;
pub use lexer::Token;
pub use node::{AstNode, NodeRef};
