//! Recursive-descent grammar engine for Warden SQL.
//!
//! The entry point is [`Parser::run`]. It pulls tokens one at a time through
//! a [`TokenBridge`], reduces one or more semicolon-separated statements into
//! a `Vec<Statement>`, and records structural risk signals into the caller's
//! [`QueryRisk`] as each production is reduced.
//!
//! All parser state lives in the [`Parser`] value, so any number of sessions
//! may run the grammar concurrently.
//!
//! A syntax error does not discard what was already reduced: the outcome
//! carries every complete statement parsed before the failure, plus the
//! position and a description of the offending token.

use std::fmt;

use crate::config::AnalyzerConfig;
use crate::risk::{QueryRisk, QueryType, RiskSink};
use crate::session::bridge::TokenBridge;
use crate::sql::ast::*;
use crate::sql::lexer::Token;
use crate::sql::node::condition_is_always_true;

/// How a grammar run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// Every token up to end of input was reduced.
    Valid,
    /// The token stream does not match the grammar.
    SyntaxError,
    /// Nesting went deeper than [`AnalyzerConfig::max_nesting_depth`].
    ResourceExhausted,
}

impl ParseStatus {
    /// Numeric status: `0` for success, non-zero otherwise.
    pub fn code(self) -> i32 {
        match self {
            ParseStatus::Valid => 0,
            ParseStatus::SyntaxError => 1,
            ParseStatus::ResourceExhausted => 2,
        }
    }

    pub fn is_valid(self) -> bool {
        self == ParseStatus::Valid
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseStatus::Valid => "valid",
            ParseStatus::SyntaxError => "syntax error",
            ParseStatus::ResourceExhausted => "resource exhausted",
        };
        f.write_str(name)
    }
}

/// Where and why a grammar run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset just past the offending token.
    pub position: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.position)
    }
}

/// Everything one grammar run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarOutcome {
    pub status: ParseStatus,
    /// Statements reduced before the run ended. Complete on success, a
    /// prefix of the input's statements on failure.
    pub statements: Vec<Statement>,
    pub error: Option<SyntaxError>,
}

/// Why a production could not be reduced.
struct Failure {
    status: ParseStatus,
    error: SyntaxError,
}

type PResult<T> = std::result::Result<T, Failure>;

/// A recursive-descent parser reading from a [`TokenBridge`].
pub struct Parser<'b, 's> {
    bridge: &'b mut TokenBridge<'s>,
    risk: &'b mut QueryRisk,
    config: &'b AnalyzerConfig,
    depth: usize,
}

impl<'b, 's> Parser<'b, 's> {
    /// Run the grammar over everything `bridge` yields.
    ///
    /// On success `risk.valid` is set and the bridge has been read to end of
    /// input. On failure the bridge is left positioned just after the
    /// offending token.
    pub fn run(
        bridge: &'b mut TokenBridge<'s>,
        risk: &'b mut QueryRisk,
        config: &'b AnalyzerConfig,
    ) -> GrammarOutcome {
        let mut parser = Parser {
            bridge,
            risk,
            config,
            depth: 0,
        };
        let mut statements = Vec::new();
        match parser.parse_statements(&mut statements) {
            Ok(()) => {
                parser.risk.valid = true;
                GrammarOutcome {
                    status: ParseStatus::Valid,
                    statements,
                    error: None,
                }
            }
            Err(failure) => GrammarOutcome {
                status: failure.status,
                statements,
                error: Some(failure.error),
            },
        }
    }

    fn parse_statements(&mut self, statements: &mut Vec<Statement>) -> PResult<()> {
        loop {
            // Skip optional semicolons between statements.
            while self.eat(Token::Semicolon) {}
            if self.current() == Token::Eof {
                return Ok(());
            }
            if !statements.is_empty() {
                self.risk.multiple_queries = true;
            }
            statements.push(self.parse_statement()?);
            match self.current() {
                Token::Semicolon | Token::Eof => {}
                _ => return Err(self.unexpected("after end of statement")),
            }
        }
    }

    // =======================================================================
    // Token helpers
    // =======================================================================

    fn current(&mut self) -> Token {
        self.peek_ahead(0)
    }

    fn peek_ahead(&mut self, offset: usize) -> Token {
        self.bridge.peek(offset, RiskSink::Record(&mut *self.risk))
    }

    /// Consume the current token along with its staged text, if any. Every
    /// consumed literal-class token must pass through here so the staging
    /// queues stay aligned with the token stream.
    fn bump(&mut self) -> (Token, Option<String>) {
        let token = self.bridge.next_token(RiskSink::Record(&mut *self.risk));
        let text = self.bridge.take_text(token);
        (token, text)
    }

    fn advance(&mut self) -> Token {
        self.bump().0
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> PResult<()> {
        let got = self.current();
        if got == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, got {got:?}")))
        }
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        let tok = self.current();
        if tok == Token::Identifier {
            return Ok(self.bump().1.unwrap_or_default());
        }
        // Allow keywords that are safe to use as identifiers.
        match keyword_as_identifier(tok) {
            Some(name) => {
                self.advance();
                Ok(name.to_string())
            }
            None => Err(self.error(format!("expected identifier, got {tok:?}"))),
        }
    }

    fn error(&self, message: String) -> Failure {
        Failure {
            status: ParseStatus::SyntaxError,
            error: SyntaxError {
                position: self.bridge.offset_of(0),
                message,
            },
        }
    }

    fn unexpected(&mut self, context: &str) -> Failure {
        let tok = self.current();
        self.error(format!("unexpected token {tok:?} {context}"))
    }

    /// Run `f` one nesting level deeper, failing once the configured limit
    /// is exceeded.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.deepen()?;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Charge one level against the nesting limit without recursing. Loops
    /// that wrap what they built so far call this once per wrap, and restore
    /// `depth` themselves when the loop ends.
    fn deepen(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > self.config.max_nesting_depth {
            return Err(self.exhausted());
        }
        Ok(())
    }

    fn exhausted(&self) -> Failure {
        Failure {
            status: ParseStatus::ResourceExhausted,
            error: SyntaxError {
                position: self.bridge.offset_of(0),
                message: format!("nesting depth exceeds {}", self.config.max_nesting_depth),
            },
        }
    }

    /// Consume tokens up to the end of the current statement.
    fn skip_to_statement_end(&mut self) {
        while !matches!(self.current(), Token::Semicolon | Token::Eof) {
            self.advance();
        }
    }

    // =======================================================================
    // Risk recording
    // =======================================================================

    fn set_query_type(&mut self, query_type: QueryType) {
        if self.risk.query_type == QueryType::Unknown {
            self.risk.query_type = query_type;
        }
    }

    fn record_table(&mut self, table: &TableName) {
        let qualified = table.qualified();
        self.risk.add_table(&qualified);
        if self.config.is_sensitive_table(&qualified)
            || self.config.is_sensitive_table(&table.name)
        {
            self.risk.sensitive_tables += 1;
        }
        if table
            .schema
            .as_deref()
            .map_or(false, |s| s.eq_ignore_ascii_case("information_schema"))
        {
            self.risk.information_schema = true;
        }
    }

    /// WHERE, HAVING and ON conditions are where injected tautologies land.
    /// Conditions of nested SELECTs were recorded when they were reduced, so
    /// each condition is searched once.
    fn record_condition(&mut self, condition: &Expr) {
        if !self.risk.always_true_conditional && condition_is_always_true(condition) {
            self.risk.always_true_conditional = true;
        }
    }

    fn record_function(&mut self, name: &str) {
        match name {
            "IF" => self.risk.if_statements += 1,
            "BENCHMARK" | "SLEEP" => self.risk.benchmark_statements += 1,
            "USER" | "CURRENT_USER" | "SESSION_USER" | "SYSTEM_USER" => {
                self.risk.user_statements += 1
            }
            "VERSION" | "DATABASE" | "SCHEMA" | "CONNECTION_ID" | "LAST_INSERT_ID"
            | "ROW_COUNT" => self.risk.fingerprinting_statements += 1,
            "CHAR" | "CHR" | "CONCAT" | "CONCAT_WS" | "SUBSTRING" | "SUBSTR" | "MID"
            | "ASCII" | "ORD" | "HEX" | "UNHEX" | "CONV" | "REVERSE" | "LEFT" | "RIGHT"
            | "REPLACE" => self.risk.string_manipulation_statements += 1,
            _ => {}
        }
    }

    fn record_pattern(&mut self, pattern: &Expr, regexp: bool) {
        let Expr::Literal(LiteralValue::String(text)) = pattern else {
            return;
        };
        let length = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        self.risk.regex_length = self.risk.regex_length.max(length);
        let wildcards = if regexp {
            text.chars().filter(|c| matches!(c, '*' | '+')).count()
        } else {
            text.chars().filter(|c| *c == '%').count()
        };
        if wildcards >= self.config.slow_regex_wildcards {
            self.risk.slow_regexes += 1;
        }
    }

    // =======================================================================
    // Statement dispatch
    // =======================================================================

    fn parse_statement(&mut self) -> PResult<Statement> {
        match self.current() {
            Token::Select => {
                self.set_query_type(QueryType::Select);
                Ok(Statement::Select(self.parse_select()?))
            }
            Token::Insert => {
                self.set_query_type(QueryType::Insert);
                self.parse_insert()
            }
            Token::Replace => {
                self.set_query_type(QueryType::Replace);
                self.parse_insert()
            }
            Token::Update => {
                self.set_query_type(QueryType::Update);
                self.parse_update()
            }
            Token::Delete => {
                self.set_query_type(QueryType::Delete);
                self.parse_delete()
            }
            Token::Create => {
                self.set_query_type(QueryType::Create);
                self.parse_create()
            }
            Token::Drop => {
                self.set_query_type(QueryType::Drop);
                self.parse_drop()
            }
            Token::Set => {
                self.set_query_type(QueryType::Set);
                self.parse_set()
            }
            Token::Show => {
                self.set_query_type(QueryType::Show);
                self.parse_show()
            }
            Token::Describe => {
                self.set_query_type(QueryType::Describe);
                self.parse_describe()
            }
            Token::Begin => {
                self.set_query_type(QueryType::Transaction);
                self.advance();
                // Optional TRANSACTION keyword.
                self.eat(Token::Transaction);
                Ok(Statement::Begin)
            }
            Token::Start => {
                self.set_query_type(QueryType::Transaction);
                self.advance();
                self.expect(Token::Transaction)?;
                Ok(Statement::Begin)
            }
            Token::Commit => {
                self.set_query_type(QueryType::Transaction);
                self.advance();
                self.eat(Token::Transaction);
                Ok(Statement::Commit)
            }
            Token::Rollback => {
                self.set_query_type(QueryType::Transaction);
                self.advance();
                self.eat(Token::Transaction);
                Ok(Statement::Rollback)
            }
            _ => Err(self.unexpected("at start of statement")),
        }
    }

    // =======================================================================
    // SELECT
    // =======================================================================

    fn parse_select(&mut self) -> PResult<SelectStatement> {
        self.nested(|p| {
            let mut select = p.parse_select_body()?;
            while p.current() == Token::Union {
                p.advance();
                let all = p.eat(Token::All);
                if !all {
                    p.eat(Token::Distinct);
                }
                if all {
                    p.risk.union_all_statements += 1;
                } else {
                    p.risk.union_statements += 1;
                }
                let branch = p.parse_union_branch()?;
                select.unions.push(UnionBranch {
                    all,
                    select: branch,
                });
            }
            Ok(select)
        })
    }

    /// One UNION operand: a plain SELECT or a parenthesised one.
    fn parse_union_branch(&mut self) -> PResult<SelectStatement> {
        if self.current() == Token::LeftParen && self.peek_ahead(1) == Token::Select {
            self.advance();
            let select = self.parse_select()?;
            self.expect(Token::RightParen)?;
            Ok(select)
        } else {
            self.parse_select_body()
        }
    }

    fn parse_select_body(&mut self) -> PResult<SelectStatement> {
        self.expect(Token::Select)?;

        let distinct = if self.eat(Token::Distinct) {
            true
        } else {
            self.eat(Token::All);
            false
        };

        let columns = self.parse_select_columns()?;

        let from = if self.eat(Token::From) {
            Some(self.parse_from_clause()?)
        } else {
            None
        };

        let where_clause = if self.eat(Token::Where) {
            let condition = self.parse_expr()?;
            self.record_condition(&condition);
            Some(condition)
        } else {
            None
        };

        let group_by = if self.eat(Token::Group) {
            self.expect(Token::By)?;
            self.parse_expr_list()?
        } else {
            vec![]
        };

        let having = if self.eat(Token::Having) {
            let condition = self.parse_expr()?;
            self.record_condition(&condition);
            Some(condition)
        } else {
            None
        };

        let order_by = if self.eat(Token::Order) {
            self.expect(Token::By)?;
            self.parse_order_by_list()?
        } else {
            vec![]
        };
        if order_by
            .iter()
            .any(|item| matches!(item.expr, Expr::Literal(LiteralValue::Integer(_))))
        {
            self.risk.order_by_number = true;
        }

        let (limit, offset) = self.parse_limit()?;

        Ok(SelectStatement {
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
            unions: vec![],
        })
    }

    /// `LIMIT n`, `LIMIT n OFFSET m` or MySQL's `LIMIT m, n`.
    fn parse_limit(&mut self) -> PResult<(Option<Expr>, Option<Expr>)> {
        if !self.eat(Token::Limit) {
            return Ok((None, None));
        }
        let first = self.parse_expr()?;
        if self.eat(Token::Comma) {
            let count = self.parse_expr()?;
            return Ok((Some(count), Some(first)));
        }
        let offset = if self.eat(Token::Offset) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok((Some(first), offset))
    }

    fn parse_select_columns(&mut self) -> PResult<Vec<SelectColumn>> {
        let mut cols = vec![self.parse_select_column()?];
        while self.eat(Token::Comma) {
            cols.push(self.parse_select_column()?);
        }
        Ok(cols)
    }

    fn parse_select_column(&mut self) -> PResult<SelectColumn> {
        // Check for bare *
        if self.eat(Token::Star) {
            return Ok(SelectColumn::AllColumns);
        }

        // Check for table.*: identifier followed by dot followed by star
        if self.current() == Token::Identifier
            && self.peek_ahead(1) == Token::Dot
            && self.peek_ahead(2) == Token::Star
        {
            let name = self.bump().1.unwrap_or_default();
            self.advance(); // dot
            self.advance(); // star
            return Ok(SelectColumn::TableAllColumns(name));
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;
        Ok(SelectColumn::Expr { expr, alias })
    }

    fn parse_optional_alias(&mut self) -> PResult<Option<String>> {
        if self.eat(Token::As) {
            if self.current() == Token::StringLiteral {
                return Ok(self.bump().1);
            }
            return Ok(Some(self.expect_identifier()?));
        }
        // Implicit alias without AS. Clause keywords lex as their own
        // tokens, so a bare identifier here can only be an alias.
        if self.current() == Token::Identifier {
            return Ok(Some(self.expect_identifier()?));
        }
        Ok(None)
    }

    // =======================================================================
    // FROM clause + JOINs
    // =======================================================================

    fn parse_from_clause(&mut self) -> PResult<FromClause> {
        let depth = self.depth;
        let out = self.parse_join_chain();
        self.depth = depth;
        out
    }

    /// Joins nest to the left, one level per join.
    fn parse_join_chain(&mut self) -> PResult<FromClause> {
        let mut left = self.parse_from_item()?;

        loop {
            let join_type = match self.current() {
                Token::Join | Token::Inner => {
                    self.eat(Token::Inner);
                    self.expect(Token::Join)?;
                    JoinType::Inner
                }
                Token::Left | Token::Right => {
                    let join_type = if self.advance() == Token::Left {
                        JoinType::Left
                    } else {
                        JoinType::Right
                    };
                    self.eat(Token::Outer);
                    self.expect(Token::Join)?;
                    join_type
                }
                Token::Cross => {
                    self.advance();
                    self.expect(Token::Join)?;
                    JoinType::Cross
                }
                Token::Natural => {
                    self.advance();
                    if matches!(self.current(), Token::Left | Token::Right) {
                        self.advance();
                        self.eat(Token::Outer);
                    }
                    self.expect(Token::Join)?;
                    JoinType::Natural
                }
                Token::Comma => {
                    self.advance();
                    self.deepen()?;
                    self.risk.cross_join_statements += 1;
                    let right = self.parse_from_item()?;
                    left = FromClause::Join {
                        left: Box::new(left),
                        join_type: JoinType::Cross,
                        right: Box::new(right),
                        on: None,
                        using: vec![],
                    };
                    continue;
                }
                _ => break,
            };

            self.deepen()?;
            self.risk.join_statements += 1;
            if join_type == JoinType::Cross {
                self.risk.cross_join_statements += 1;
            }

            let right = self.parse_from_item()?;

            let on = if self.eat(Token::On) {
                let condition = self.parse_expr()?;
                self.record_condition(&condition);
                Some(condition)
            } else {
                None
            };

            let using = if self.eat(Token::Using) {
                self.expect(Token::LeftParen)?;
                let cols = self.parse_identifier_list()?;
                self.expect(Token::RightParen)?;
                cols
            } else {
                vec![]
            };

            left = FromClause::Join {
                left: Box::new(left),
                join_type,
                right: Box::new(right),
                on,
                using,
            };
        }

        Ok(left)
    }

    fn parse_from_item(&mut self) -> PResult<FromClause> {
        if self.current() == Token::LeftParen {
            self.advance(); // consume (
            if self.current() == Token::Select {
                let query = self.parse_select()?;
                self.expect(Token::RightParen)?;
                let alias = self.parse_optional_alias()?;
                return Ok(FromClause::Subquery {
                    query: Box::new(query),
                    alias,
                });
            }
            // Parenthesised join tree.
            let inner = self.nested(|p| p.parse_from_clause())?;
            self.expect(Token::RightParen)?;
            return Ok(inner);
        }

        let name = self.parse_table_name()?;
        self.record_table(&name);
        let alias = self.parse_optional_alias()?;
        Ok(FromClause::Table { name, alias })
    }

    fn parse_table_name(&mut self) -> PResult<TableName> {
        let first = self.expect_identifier()?;
        if self.eat(Token::Dot) {
            let name = self.expect_identifier()?;
            Ok(TableName {
                schema: Some(first),
                name,
            })
        } else {
            Ok(TableName {
                schema: None,
                name: first,
            })
        }
    }

    // =======================================================================
    // INSERT / REPLACE
    // =======================================================================

    fn parse_insert(&mut self) -> PResult<Statement> {
        let or_replace = self.advance() == Token::Replace;
        let ignore = self.eat(Token::Ignore);
        self.eat(Token::Into);

        let table = self.parse_table_name()?;
        self.record_table(&table);

        // Optional column list; `(SELECT ...)` is a parenthesised source.
        let columns =
            if self.current() == Token::LeftParen && self.peek_ahead(1) != Token::Select {
                self.advance();
                let cols = self.parse_identifier_list()?;
                self.expect(Token::RightParen)?;
                Some(cols)
            } else {
                None
            };

        let source = match self.current() {
            Token::Values => {
                self.advance();
                let mut rows = vec![self.parse_value_row()?];
                while self.eat(Token::Comma) {
                    rows.push(self.parse_value_row()?);
                }
                InsertSource::Values(rows)
            }
            Token::Select => InsertSource::Select(Box::new(self.parse_select()?)),
            Token::LeftParen => {
                self.advance();
                let query = self.parse_select()?;
                self.expect(Token::RightParen)?;
                InsertSource::Select(Box::new(query))
            }
            Token::Set => {
                self.advance();
                InsertSource::Set(self.parse_assignments()?)
            }
            _ => return Err(self.unexpected("in INSERT source")),
        };

        Ok(Statement::Insert(InsertStatement {
            table,
            columns,
            source,
            or_replace,
            ignore,
        }))
    }

    fn parse_value_row(&mut self) -> PResult<Vec<Expr>> {
        self.expect(Token::LeftParen)?;
        if self.eat(Token::RightParen) {
            return Ok(vec![]);
        }
        let values = self.parse_expr_list()?;
        self.expect(Token::RightParen)?;
        Ok(values)
    }

    fn parse_identifier_list(&mut self) -> PResult<Vec<String>> {
        let mut names = vec![self.expect_identifier()?];
        while self.eat(Token::Comma) {
            names.push(self.expect_identifier()?);
        }
        Ok(names)
    }

    // =======================================================================
    // UPDATE / DELETE
    // =======================================================================

    fn parse_update(&mut self) -> PResult<Statement> {
        self.expect(Token::Update)?;
        self.eat(Token::Ignore);
        let table = self.parse_table_name()?;
        self.record_table(&table);
        self.expect(Token::Set)?;
        let assignments = self.parse_assignments()?;

        let where_clause = if self.eat(Token::Where) {
            let condition = self.parse_expr()?;
            self.record_condition(&condition);
            Some(condition)
        } else {
            None
        };
        let (limit, _) = self.parse_limit()?;

        Ok(Statement::Update(UpdateStatement {
            table,
            assignments,
            where_clause,
            limit,
        }))
    }

    fn parse_delete(&mut self) -> PResult<Statement> {
        self.expect(Token::Delete)?;
        self.eat(Token::Ignore);
        self.expect(Token::From)?;
        let table = self.parse_table_name()?;
        self.record_table(&table);

        let where_clause = if self.eat(Token::Where) {
            let condition = self.parse_expr()?;
            self.record_condition(&condition);
            Some(condition)
        } else {
            None
        };
        let (limit, _) = self.parse_limit()?;

        Ok(Statement::Delete(DeleteStatement {
            table,
            where_clause,
            limit,
        }))
    }

    fn parse_assignments(&mut self) -> PResult<Vec<Assignment>> {
        let mut assignments = vec![self.parse_assignment()?];
        while self.eat(Token::Comma) {
            assignments.push(self.parse_assignment()?);
        }
        Ok(assignments)
    }

    fn parse_assignment(&mut self) -> PResult<Assignment> {
        let mut target = self.expect_identifier()?;
        if self.eat(Token::Dot) {
            target = format!("{target}.{}", self.expect_identifier()?);
        }
        if !self.eat(Token::Assign) {
            self.expect(Token::Eq)?;
        }
        let value = self.parse_expr()?;
        Ok(Assignment { target, value })
    }

    // =======================================================================
    // SET / SHOW / DESCRIBE
    // =======================================================================

    fn parse_set(&mut self) -> PResult<Statement> {
        self.expect(Token::Set)?;
        let mut assignments = vec![self.parse_set_assignment()?];
        while self.eat(Token::Comma) {
            assignments.push(self.parse_set_assignment()?);
        }
        Ok(Statement::Set(assignments))
    }

    fn parse_set_target(&mut self) -> PResult<String> {
        match self.current() {
            Token::UserVariable => Ok(format!("@{}", self.bump().1.unwrap_or_default())),
            Token::GlobalVariable => Ok(format!("@@{}", self.bump().1.unwrap_or_default())),
            _ => self.expect_identifier(),
        }
    }

    fn parse_set_assignment(&mut self) -> PResult<Assignment> {
        let mut target = self.parse_set_target()?;
        let is_scope = matches!(
            target.to_ascii_uppercase().as_str(),
            "GLOBAL" | "SESSION" | "LOCAL"
        );
        if is_scope && !matches!(self.current(), Token::Eq | Token::Assign) {
            target = self.parse_set_target()?;
        }
        if !self.eat(Token::Eq) && !self.eat(Token::Assign) {
            // `SET NAMES 'utf8'` and friends take a value without `=`.
            let value = self.parse_primary_expr()?;
            return Ok(Assignment { target, value });
        }
        let value = self.parse_expr()?;
        Ok(Assignment { target, value })
    }

    fn parse_show(&mut self) -> PResult<Statement> {
        self.expect(Token::Show)?;
        let target = match self.bump() {
            (Token::Semicolon | Token::Eof, _) => {
                return Err(self.error("expected SHOW target".into()));
            }
            (_, Some(text)) => Some(text.to_ascii_lowercase()),
            (tok, None) => Some(format!("{tok:?}").to_ascii_lowercase()),
        };
        self.skip_to_statement_end();
        Ok(Statement::Show { target })
    }

    fn parse_describe(&mut self) -> PResult<Statement> {
        self.expect(Token::Describe)?;
        // EXPLAIN <statement>
        if matches!(
            self.current(),
            Token::Select | Token::Insert | Token::Replace | Token::Update | Token::Delete
        ) {
            return self.nested(|p| p.parse_statement());
        }
        let table = self.parse_table_name()?;
        self.record_table(&table);
        // Optional column name or wildcard.
        if matches!(self.current(), Token::Identifier | Token::StringLiteral) {
            self.advance();
        }
        Ok(Statement::Describe { table })
    }

    // =======================================================================
    // CREATE TABLE / INDEX
    // =======================================================================

    fn parse_create(&mut self) -> PResult<Statement> {
        self.expect(Token::Create)?;

        // CREATE UNIQUE INDEX ...
        if self.eat(Token::Unique) {
            return self.parse_create_index(true);
        }

        match self.current() {
            Token::Table => self.parse_create_table(),
            Token::Index => self.parse_create_index(false),
            _ => Err(self.unexpected("after CREATE")),
        }
    }

    fn parse_create_table(&mut self) -> PResult<Statement> {
        self.expect(Token::Table)?;

        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_table_name()?;
        self.record_table(&name);

        self.expect(Token::LeftParen)?;
        let columns = self.parse_column_defs()?;
        self.expect(Token::RightParen)?;
        // Table options: ENGINE=InnoDB DEFAULT CHARSET=utf8 ...
        self.skip_to_statement_end();

        Ok(Statement::CreateTable(CreateTableStatement {
            name,
            if_not_exists,
            columns,
        }))
    }

    fn parse_if_not_exists(&mut self) -> PResult<bool> {
        if self.eat(Token::If) {
            self.expect(Token::Not)?;
            self.expect(Token::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_if_exists(&mut self) -> PResult<bool> {
        if self.eat(Token::If) {
            self.expect(Token::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_column_defs(&mut self) -> PResult<Vec<ColumnDef>> {
        let mut defs = Vec::new();
        loop {
            if matches!(
                self.current(),
                Token::Primary | Token::Unique | Token::Key | Token::Index
            ) {
                // Table constraints are skipped.
                self.skip_list_item()?;
            } else {
                defs.push(self.parse_column_def()?);
            }
            if !self.eat(Token::Comma) {
                return Ok(defs);
            }
        }
    }

    /// Consume a balanced run of tokens up to the next top-level `,` or `)`.
    fn skip_list_item(&mut self) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            match self.current() {
                Token::Comma | Token::RightParen if depth == 0 => return Ok(()),
                Token::LeftParen => depth += 1,
                Token::RightParen => depth -= 1,
                Token::Eof => {
                    return Err(self.error("unexpected end of input in column definitions".into()));
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_column_def(&mut self) -> PResult<ColumnDef> {
        let name = self.expect_identifier()?;
        let type_name = self.parse_type_name()?;

        let mut primary_key = false;
        let mut autoincrement = false;
        let mut not_null = false;
        let mut unique = false;
        let mut default = None;

        // Column constraints
        loop {
            match self.current() {
                Token::Primary => {
                    self.advance();
                    self.expect(Token::Key)?;
                    primary_key = true;
                }
                Token::AutoIncrement => {
                    self.advance();
                    autoincrement = true;
                }
                Token::Not => {
                    self.advance();
                    self.expect(Token::Null)?;
                    not_null = true;
                }
                Token::Null => {
                    self.advance();
                }
                Token::Unique => {
                    self.advance();
                    self.eat(Token::Key);
                    unique = true;
                }
                Token::Default => {
                    self.advance();
                    default = Some(self.parse_unary_expr()?);
                }
                // UNSIGNED, COMMENT 'text', CHARACTER SET utf8, ...
                Token::Identifier | Token::StringLiteral | Token::Set => {
                    self.advance();
                }
                _ => break,
            }
        }

        Ok(ColumnDef {
            name,
            type_name,
            primary_key,
            autoincrement,
            not_null,
            unique,
            default,
        })
    }

    fn parse_type_name(&mut self) -> PResult<Option<String>> {
        if self.current() != Token::Identifier {
            return Ok(None);
        }
        let mut full = self.bump().1.unwrap_or_default().to_ascii_uppercase();
        // Handle optional (N) or (N,M) size suffix
        if self.eat(Token::LeftParen) {
            let mut sizes = Vec::new();
            while !matches!(self.current(), Token::RightParen | Token::Eof) {
                let (tok, text) = self.bump();
                if tok != Token::Comma {
                    sizes.push(text.unwrap_or_default());
                }
            }
            self.expect(Token::RightParen)?;
            full = format!("{full}({})", sizes.join(", "));
        }
        Ok(Some(full))
    }

    fn parse_create_index(&mut self, unique: bool) -> PResult<Statement> {
        self.expect(Token::Index)?;
        let name = self.expect_identifier()?;
        self.expect(Token::On)?;
        let table = self.parse_table_name()?;
        self.record_table(&table);

        self.expect(Token::LeftParen)?;
        let columns = self.parse_order_by_list()?;
        self.expect(Token::RightParen)?;

        Ok(Statement::CreateIndex(CreateIndexStatement {
            name,
            table,
            columns,
            unique,
        }))
    }

    // =======================================================================
    // DROP TABLE / INDEX
    // =======================================================================

    fn parse_drop(&mut self) -> PResult<Statement> {
        self.expect(Token::Drop)?;
        match self.current() {
            Token::Table => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let mut names = vec![self.parse_table_name()?];
                while self.eat(Token::Comma) {
                    names.push(self.parse_table_name()?);
                }
                for name in &names {
                    self.record_table(name);
                }
                Ok(Statement::DropTable(DropTableStatement { names, if_exists }))
            }
            Token::Index => {
                self.advance();
                let name = self.expect_identifier()?;
                let table = if self.eat(Token::On) {
                    let table = self.parse_table_name()?;
                    self.record_table(&table);
                    Some(table)
                } else {
                    None
                };
                Ok(Statement::DropIndex(DropIndexStatement { name, table }))
            }
            _ => Err(self.unexpected("after DROP")),
        }
    }

    // =======================================================================
    // ORDER BY list
    // =======================================================================

    fn parse_order_by_list(&mut self) -> PResult<Vec<OrderByItem>> {
        let mut items = vec![self.parse_order_by_item()?];
        while self.eat(Token::Comma) {
            items.push(self.parse_order_by_item()?);
        }
        Ok(items)
    }

    fn parse_order_by_item(&mut self) -> PResult<OrderByItem> {
        let expr = self.parse_expr()?;
        let desc = if self.eat(Token::Desc) {
            true
        } else {
            self.eat(Token::Asc);
            false
        };
        Ok(OrderByItem { expr, desc })
    }

    // =======================================================================
    // Expression parser (precedence climbing)
    // =======================================================================
    //
    // Precedence (lowest to highest), as in MySQL:
    //   1. OR, ||
    //   2. XOR
    //   3. AND, &&
    //   4. NOT (prefix)
    //   5. IS [NOT] NULL, BETWEEN, IN, LIKE, REGEXP, comparison
    //   6. Bitwise OR (|)
    //   7. Bitwise AND (&)
    //   8. Shift (<<, >>)
    //   9. Addition (+, -)
    //  10. Multiplication (*, /, DIV, %, MOD)
    //  11. Bitwise XOR (^)
    //  12. Unary (-, +, ~, !)
    //  13. Primary (literals, columns, function calls, parens, CAST, CASE, etc.)

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.nested(|p| p.parse_or_expr())
    }

    /// One precedence level: `operand (op operand)*`. However long the run,
    /// it reduces to a single flat chain.
    fn parse_chain(
        &mut self,
        operand: fn(&mut Self) -> PResult<Expr>,
        op_of: fn(Token) -> Option<BinaryOp>,
    ) -> PResult<Expr> {
        let first = operand(self)?;
        let mut rest = Vec::new();
        while let Some(op) = op_of(self.current()) {
            self.advance();
            if op == BinaryOp::Or {
                self.risk.or_statements += 1;
            }
            rest.push((op, operand(self)?));
        }
        Ok(Expr::chain(first, rest))
    }

    fn parse_or_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_xor_expr, |tok| match tok {
            Token::Or | Token::PipePipe => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_xor_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_and_expr, |tok| {
            (tok == Token::Xor).then_some(BinaryOp::Xor)
        })
    }

    fn parse_and_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_not_expr, |tok| match tok {
            Token::And | Token::AmpAmp => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_not_expr(&mut self) -> PResult<Expr> {
        if self.eat(Token::Not) {
            let expr = self.nested(|p| p.parse_not_expr())?;
            Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            })
        } else {
            self.parse_comparison_expr()
        }
    }

    fn parse_comparison_expr(&mut self) -> PResult<Expr> {
        let depth = self.depth;
        let out = self.parse_comparison_chain();
        self.depth = depth;
        out
    }

    /// Comparisons chain flat. IS, BETWEEN, IN and LIKE wrap everything to
    /// their left instead, one nesting level per wrap.
    fn parse_comparison_chain(&mut self) -> PResult<Expr> {
        let mut first = self.parse_bitor_expr()?;
        let mut rest = Vec::new();

        loop {
            let negated = self.current() == Token::Not
                && matches!(
                    self.peek_ahead(1),
                    Token::Between | Token::In | Token::Like | Token::Regexp
                );
            if negated {
                self.advance(); // NOT
            }
            let tok = self.current();
            if let Some(op) = comparison_op(tok) {
                self.advance();
                rest.push((op, self.parse_bitor_expr()?));
                continue;
            }
            if !matches!(
                tok,
                Token::Is | Token::Between | Token::In | Token::Like | Token::Regexp
            ) {
                break;
            }

            self.deepen()?;
            let left = Expr::chain(first, std::mem::take(&mut rest));
            first = match tok {
                Token::Is => {
                    self.advance();
                    let negated = self.eat(Token::Not);
                    self.parse_is(left, negated)?
                }
                Token::Between => {
                    self.advance();
                    let low = self.parse_bitor_expr()?;
                    self.expect(Token::And)?;
                    let high = self.parse_bitor_expr()?;
                    Expr::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated,
                    }
                }
                Token::In => {
                    self.advance();
                    self.parse_in(left, negated)?
                }
                _ => {
                    let regexp = self.advance() == Token::Regexp;
                    let pattern = self.parse_bitor_expr()?;
                    self.record_pattern(&pattern, regexp);
                    Expr::Like {
                        expr: Box::new(left),
                        pattern: Box::new(pattern),
                        negated,
                        regexp,
                    }
                }
            };
        }

        Ok(Expr::chain(first, rest))
    }

    /// The tail of `x IS [NOT] ...`.
    fn parse_is(&mut self, left: Expr, negated: bool) -> PResult<Expr> {
        let truth = match self.advance() {
            Token::Null => {
                return Ok(Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                });
            }
            Token::True => LiteralValue::True,
            Token::False => LiteralValue::False,
            tok => return Err(self.error(format!("expected NULL, TRUE or FALSE after IS, got {tok:?}"))),
        };
        let test = Expr::binary(left, BinaryOp::NullSafeEq, Expr::Literal(truth));
        Ok(if negated {
            Expr::UnaryOp {
                op: UnaryOp::Not,
                expr: Box::new(test),
            }
        } else {
            test
        })
    }

    /// The tail of `x [NOT] IN (...)`.
    fn parse_in(&mut self, left: Expr, negated: bool) -> PResult<Expr> {
        self.expect(Token::LeftParen)?;
        // Check for subquery
        let predicate = if self.current() == Token::Select {
            let query = self.parse_select()?;
            InPredicate::subselect(left, query, negated)
        } else if self.current() == Token::RightParen {
            InPredicate::values(left, vec![], negated)
        } else {
            InPredicate::values(left, self.parse_expr_list()?, negated)
        };
        self.expect(Token::RightParen)?;
        Ok(Expr::In(predicate))
    }

    fn parse_bitor_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_bitand_expr, |tok| {
            (tok == Token::Pipe).then_some(BinaryOp::BitOr)
        })
    }

    fn parse_bitand_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_shift_expr, |tok| {
            (tok == Token::Ampersand).then_some(BinaryOp::BitAnd)
        })
    }

    fn parse_shift_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_add_expr, |tok| match tok {
            Token::ShiftLeft => Some(BinaryOp::ShiftLeft),
            Token::ShiftRight => Some(BinaryOp::ShiftRight),
            _ => None,
        })
    }

    fn parse_add_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_mul_expr, |tok| match tok {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_mul_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_bitxor_expr, |tok| match tok {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Div => Some(BinaryOp::IntDiv),
            Token::Percent | Token::Mod => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    fn parse_bitxor_expr(&mut self) -> PResult<Expr> {
        self.parse_chain(Self::parse_unary_expr, |tok| {
            (tok == Token::Caret).then_some(BinaryOp::BitXor)
        })
    }

    fn parse_unary_expr(&mut self) -> PResult<Expr> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Tilde => UnaryOp::BitNot,
            Token::Bang => UnaryOp::Not,
            Token::Plus => {
                self.advance();
                return self.nested(|p| p.parse_unary_expr());
            }
            _ => return self.parse_primary_expr(),
        };
        self.advance();
        let expr = self.nested(|p| p.parse_unary_expr())?;
        Ok(Expr::UnaryOp {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_primary_expr(&mut self) -> PResult<Expr> {
        match self.current() {
            Token::IntegerLiteral => {
                let text = self.bump().1.unwrap_or_default();
                // Integers beyond i64 degrade to reals, as MySQL does.
                match text.parse::<i64>() {
                    Ok(n) => Ok(Expr::Literal(LiteralValue::Integer(n))),
                    Err(_) => self.real_literal(&text),
                }
            }
            Token::RealLiteral => {
                let text = self.bump().1.unwrap_or_default();
                self.real_literal(&text)
            }
            Token::HexLiteral => {
                let text = self.bump().1.unwrap_or_default();
                match decode_hex(&text) {
                    Some(bytes) => Ok(Expr::Literal(LiteralValue::Blob(bytes))),
                    None => Err(self.error(format!("malformed hex literal {text}"))),
                }
            }
            Token::StringLiteral => {
                let mut s = self.bump().1.unwrap_or_default();
                // Adjacent string literals concatenate: 'a' 'b' is 'ab'.
                while self.current() == Token::StringLiteral {
                    s.push_str(&self.bump().1.unwrap_or_default());
                }
                Ok(Expr::Literal(LiteralValue::String(s)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::Null))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::True))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(LiteralValue::False))
            }
            Token::Placeholder => {
                self.advance();
                Ok(Expr::Placeholder)
            }
            Token::UserVariable | Token::GlobalVariable => {
                let (tok, name) = self.bump();
                Ok(Expr::Variable {
                    name: name.unwrap_or_default(),
                    global: tok == Token::GlobalVariable,
                })
            }
            // Parenthesised expression or subquery
            Token::LeftParen => {
                self.advance();
                let expr = if self.current() == Token::Select {
                    Expr::Subquery(Box::new(self.parse_select()?))
                } else {
                    self.parse_expr()?
                };
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            // CAST(expr AS type)
            Token::Cast => {
                self.advance();
                self.expect(Token::LeftParen)?;
                let expr = self.parse_expr()?;
                self.expect(Token::As)?;
                let type_name = self.parse_type_name()?.unwrap_or_default();
                // UNSIGNED INTEGER and similar two-word types.
                let type_name = if self.current() == Token::Identifier {
                    let second = self.bump().1.unwrap_or_default();
                    format!("{type_name} {}", second.to_ascii_uppercase())
                } else {
                    type_name
                };
                self.expect(Token::RightParen)?;
                Ok(Expr::Cast {
                    expr: Box::new(expr),
                    type_name,
                })
            }
            // CASE [operand] WHEN ... THEN ... [ELSE ...] END
            Token::Case => {
                self.advance();
                let operand = if self.current() != Token::When {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                let mut when_clauses = Vec::new();
                while self.eat(Token::When) {
                    let when_expr = self.parse_expr()?;
                    self.expect(Token::Then)?;
                    let then_expr = self.parse_expr()?;
                    when_clauses.push((when_expr, then_expr));
                }
                if when_clauses.is_empty() {
                    return Err(self.unexpected("in CASE, expected WHEN"));
                }
                let else_clause = if self.eat(Token::Else) {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                self.expect(Token::End)?;
                Ok(Expr::Case {
                    operand,
                    when_clauses,
                    else_clause,
                })
            }
            // EXISTS(subquery)
            Token::Exists => {
                self.advance();
                self.expect(Token::LeftParen)?;
                let query = self.parse_select()?;
                self.expect(Token::RightParen)?;
                Ok(Expr::Exists(Box::new(query)))
            }
            // Identifier: column reference or function call
            Token::Identifier => {
                let name = self.bump().1.unwrap_or_default();
                if self.current() == Token::LeftParen {
                    return self.parse_function_call(name.to_ascii_uppercase());
                }
                self.parse_column_ref(name)
            }
            // Keywords that double as function names: IF(), LEFT(), ...
            tok if function_keyword(tok).is_some() && self.peek_ahead(1) == Token::LeftParen => {
                self.advance();
                let name = function_keyword(tok).unwrap_or_default().to_string();
                self.parse_function_call(name)
            }
            // Star: when used in expression context (e.g. COUNT(*) is handled
            // in the call, but if somehow we land here, treat it as a column ref).
            Token::Star => {
                self.advance();
                Ok(Expr::Column {
                    table: None,
                    name: "*".into(),
                })
            }
            tok => match keyword_as_identifier(tok) {
                Some(name) => {
                    self.advance();
                    self.parse_column_ref(name.to_string())
                }
                None => Err(self.unexpected("in expression")),
            },
        }
    }

    fn real_literal(&self, text: &str) -> PResult<Expr> {
        match text.parse::<f64>() {
            Ok(r) => Ok(Expr::Literal(LiteralValue::Real(r))),
            Err(_) => Err(self.error(format!("malformed number {text}"))),
        }
    }

    /// `name`, `table.name` or `schema.table.name`, current token already
    /// past `name`.
    fn parse_column_ref(&mut self, name: String) -> PResult<Expr> {
        if !self.eat(Token::Dot) {
            if matches!(
                name.to_ascii_uppercase().as_str(),
                "CURRENT_USER" | "SESSION_USER" | "SYSTEM_USER"
            ) {
                self.risk.user_statements += 1;
            }
            return Ok(Expr::Column { table: None, name });
        }
        let mut table = name;
        let mut column = self.expect_identifier()?;
        if self.eat(Token::Dot) {
            table = format!("{table}.{column}");
            column = self.expect_identifier()?;
        }
        Ok(Expr::Column {
            table: Some(table),
            name: column,
        })
    }

    /// Arguments of `name(...)`; the current token is the opening paren.
    fn parse_function_call(&mut self, name: String) -> PResult<Expr> {
        self.expect(Token::LeftParen)?;
        self.record_function(&name);
        let distinct = self.eat(Token::Distinct);
        let args = if self.current() == Token::RightParen {
            vec![]
        } else if self.current() == Token::Star && self.peek_ahead(1) == Token::RightParen {
            // e.g. COUNT(*)
            self.advance();
            vec![Expr::Column {
                table: None,
                name: "*".into(),
            }]
        } else {
            self.parse_expr_list()?
        };
        // CHAR(77 USING utf8)
        if self.eat(Token::Using) {
            self.expect_identifier()?;
        }
        self.expect(Token::RightParen)?;
        Ok(Expr::Function {
            name,
            args,
            distinct,
        })
    }

    // =======================================================================
    // Helper: expression list
    // =======================================================================

    fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }
}

fn comparison_op(token: Token) -> Option<BinaryOp> {
    match token {
        Token::Eq => Some(BinaryOp::Eq),
        Token::NullSafeEq => Some(BinaryOp::NullSafeEq),
        Token::NotEq => Some(BinaryOp::NotEq),
        Token::Lt => Some(BinaryOp::Lt),
        Token::Gt => Some(BinaryOp::Gt),
        Token::LtEq => Some(BinaryOp::LtEq),
        Token::GtEq => Some(BinaryOp::GtEq),
        _ => None,
    }
}

/// Many SQL keywords can also appear as identifiers in certain positions.
/// Return the keyword text if `token` is one of those.
fn keyword_as_identifier(token: Token) -> Option<&'static str> {
    let name = match token {
        Token::Table => "table",
        Token::Index => "index",
        Token::Key => "key",
        Token::Replace => "replace",
        Token::Ignore => "ignore",
        Token::Transaction => "transaction",
        Token::Begin => "begin",
        Token::Start => "start",
        Token::Commit => "commit",
        Token::Rollback => "rollback",
        Token::End => "end",
        Token::Offset => "offset",
        Token::Show => "show",
        Token::Primary => "primary",
        _ => return None,
    };
    Some(name)
}

/// Keywords that MySQL also accepts as function names.
fn function_keyword(token: Token) -> Option<&'static str> {
    let name = match token {
        Token::If => "IF",
        Token::Left => "LEFT",
        Token::Right => "RIGHT",
        Token::Replace => "REPLACE",
        Token::Insert => "INSERT",
        Token::Mod => "MOD",
        _ => return None,
    };
    Some(name)
}

/// Decode `0x4142` into bytes. An odd digit count is left-padded with `0`.
fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    (0..padded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(padded.get(i..i + 2)?, 16).ok())
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================
