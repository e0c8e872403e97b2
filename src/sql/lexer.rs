//! Hand-written, streaming SQL tokenizer for Warden.
//!
//! A [`ScanBuffer`] owns a private copy of one query's text and hands out one
//! [`Token`] per [`ScanBuffer::raw_lex`] call. Tokens carry only a class;
//! the text of identifiers, quoted strings and numbers is staged in
//! [`LexicalStaging`] queues for the grammar to take as it consumes the
//! matching token.
//!
//! Token codes follow the classic generated-scanner layout: `0` is end of
//! input, single-character punctuation uses its ASCII value, and everything
//! else (keywords, multi-character operators, literal classes) sits above
//! 255. Only the latter feed the query fingerprint.
//!
//! The dialect is MySQL's: `#` and `-- ` line comments, backslash escapes in
//! strings, backtick identifiers, `@user` and `@@global` variables, and
//! `/*! ... */` executable comments whose contents are lexed as live SQL.

use std::collections::VecDeque;

use crate::error::{Result, WardenError};
use crate::risk::RiskSink;

/// A single SQL token class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Token {
    /// End-of-input sentinel.
    Eof = 0,

    // -----------------------------------------------------------------------
    // Single-character punctuation (codes are the ASCII values)
    // -----------------------------------------------------------------------
    Bang = b'!' as u16,
    Percent = b'%' as u16,
    Ampersand = b'&' as u16,
    LeftParen = b'(' as u16,
    RightParen = b')' as u16,
    Star = b'*' as u16,
    Plus = b'+' as u16,
    Comma = b',' as u16,
    Minus = b'-' as u16,
    Dot = b'.' as u16,
    Slash = b'/' as u16,
    Semicolon = b';' as u16,
    Lt = b'<' as u16,
    Eq = b'=' as u16,
    Gt = b'>' as u16,
    Caret = b'^' as u16,
    Pipe = b'|' as u16,
    Tilde = b'~' as u16,

    // -----------------------------------------------------------------------
    // Keywords
    // -----------------------------------------------------------------------
    Select = 258,
    From,
    Where,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Create,
    Drop,
    Table,
    Index,
    If,
    Exists,
    Not,
    And,
    Or,
    Xor,
    Is,
    Null,
    In,
    Between,
    Like,
    Regexp,
    As,
    On,
    Using,
    Join,
    Inner,
    Left,
    Right,
    Outer,
    Cross,
    Natural,
    Order,
    By,
    Asc,
    Desc,
    Group,
    Having,
    Limit,
    Offset,
    Distinct,
    Union,
    All,
    Primary,
    Key,
    Unique,
    Default,
    AutoIncrement,
    Begin,
    Start,
    Transaction,
    Commit,
    Rollback,
    Case,
    When,
    Then,
    Else,
    End,
    Cast,
    Replace,
    Ignore,
    True,
    False,
    Show,
    Describe,
    Div,
    Mod,

    // -----------------------------------------------------------------------
    // Multi-character operators
    // -----------------------------------------------------------------------
    NotEq,
    LtEq,
    GtEq,
    NullSafeEq,
    /// `||`, logical OR in MySQL's default SQL mode.
    PipePipe,
    /// `&&`
    AmpAmp,
    ShiftLeft,
    ShiftRight,
    /// `:=`
    Assign,

    // -----------------------------------------------------------------------
    // Literal and name classes (text is staged)
    // -----------------------------------------------------------------------
    IntegerLiteral,
    RealLiteral,
    /// `0x1F` or `X'1F'`.
    HexLiteral,
    StringLiteral,
    Identifier,
    /// `@name`
    UserVariable,
    /// `@@name`
    GlobalVariable,
    /// `?`
    Placeholder,

    /// Input the scanner could not classify: a stray character or an
    /// unterminated string or quoted identifier.
    Invalid,
}

impl Token {
    /// The numeric code the grammar and fingerprint see.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Which staging queue, if any, holds this token's text.
    pub fn staged_in(self) -> Option<StagingQueue> {
        match self {
            Token::Identifier | Token::UserVariable | Token::GlobalVariable => {
                Some(StagingQueue::Identifiers)
            }
            Token::StringLiteral => Some(StagingQueue::QuotedStrings),
            Token::IntegerLiteral | Token::RealLiteral | Token::HexLiteral => {
                Some(StagingQueue::Numbers)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Keyword lookup
// ---------------------------------------------------------------------------

fn keyword_token(word: &str) -> Option<Token> {
    // The input `word` is already uppercased by the caller.
    match word {
        "SELECT" => Some(Token::Select),
        "FROM" => Some(Token::From),
        "WHERE" => Some(Token::Where),
        "INSERT" => Some(Token::Insert),
        "INTO" => Some(Token::Into),
        "VALUES" | "VALUE" => Some(Token::Values),
        "UPDATE" => Some(Token::Update),
        "SET" => Some(Token::Set),
        "DELETE" => Some(Token::Delete),
        "CREATE" => Some(Token::Create),
        "DROP" => Some(Token::Drop),
        "TABLE" => Some(Token::Table),
        "INDEX" => Some(Token::Index),
        "IF" => Some(Token::If),
        "EXISTS" => Some(Token::Exists),
        "NOT" => Some(Token::Not),
        "AND" => Some(Token::And),
        "OR" => Some(Token::Or),
        "XOR" => Some(Token::Xor),
        "IS" => Some(Token::Is),
        "NULL" => Some(Token::Null),
        "IN" => Some(Token::In),
        "BETWEEN" => Some(Token::Between),
        "LIKE" => Some(Token::Like),
        "REGEXP" | "RLIKE" => Some(Token::Regexp),
        "AS" => Some(Token::As),
        "ON" => Some(Token::On),
        "USING" => Some(Token::Using),
        "JOIN" | "STRAIGHT_JOIN" => Some(Token::Join),
        "INNER" => Some(Token::Inner),
        "LEFT" => Some(Token::Left),
        "RIGHT" => Some(Token::Right),
        "OUTER" => Some(Token::Outer),
        "CROSS" => Some(Token::Cross),
        "NATURAL" => Some(Token::Natural),
        "ORDER" => Some(Token::Order),
        "BY" => Some(Token::By),
        "ASC" => Some(Token::Asc),
        "DESC" => Some(Token::Desc),
        "GROUP" => Some(Token::Group),
        "HAVING" => Some(Token::Having),
        "LIMIT" => Some(Token::Limit),
        "OFFSET" => Some(Token::Offset),
        "DISTINCT" | "DISTINCTROW" => Some(Token::Distinct),
        "UNION" => Some(Token::Union),
        "ALL" => Some(Token::All),
        "PRIMARY" => Some(Token::Primary),
        "KEY" => Some(Token::Key),
        "UNIQUE" => Some(Token::Unique),
        "DEFAULT" => Some(Token::Default),
        "AUTO_INCREMENT" => Some(Token::AutoIncrement),
        "BEGIN" => Some(Token::Begin),
        "START" => Some(Token::Start),
        "TRANSACTION" => Some(Token::Transaction),
        "COMMIT" => Some(Token::Commit),
        "ROLLBACK" => Some(Token::Rollback),
        "CASE" => Some(Token::Case),
        "WHEN" => Some(Token::When),
        "THEN" => Some(Token::Then),
        "ELSE" => Some(Token::Else),
        "END" => Some(Token::End),
        "CAST" => Some(Token::Cast),
        "REPLACE" => Some(Token::Replace),
        "IGNORE" => Some(Token::Ignore),
        "TRUE" => Some(Token::True),
        "FALSE" => Some(Token::False),
        "SHOW" => Some(Token::Show),
        "DESCRIBE" | "EXPLAIN" => Some(Token::Describe),
        "DIV" => Some(Token::Div),
        "MOD" => Some(Token::Mod),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Names the staging queue a token's text lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingQueue {
    Identifiers,
    QuotedStrings,
    Numbers,
}

/// Text of literal-class tokens, queued in lex order until the grammar
/// consumes the token it belongs to.
#[derive(Debug, Default)]
pub struct LexicalStaging {
    pub identifiers: VecDeque<String>,
    pub quoted_strings: VecDeque<String>,
    pub numbers: VecDeque<String>,
}

impl LexicalStaging {
    pub fn clear(&mut self) {
        self.identifiers.clear();
        self.quoted_strings.clear();
        self.numbers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.quoted_strings.is_empty() && self.numbers.is_empty()
    }

    fn queue_mut(&mut self, queue: StagingQueue) -> &mut VecDeque<String> {
        match queue {
            StagingQueue::Identifiers => &mut self.identifiers,
            StagingQueue::QuotedStrings => &mut self.quoted_strings,
            StagingQueue::Numbers => &mut self.numbers,
        }
    }

    fn push(&mut self, queue: StagingQueue, text: String) {
        self.queue_mut(queue).push_back(text);
    }

    /// Take the oldest staged text for `token`, if it is a staged class.
    pub fn take(&mut self, token: Token) -> Option<String> {
        let queue = token.staged_in()?;
        self.queue_mut(queue).pop_front()
    }
}

// ---------------------------------------------------------------------------
// Scan buffer
// ---------------------------------------------------------------------------

/// The scanner state bound to one query: the text, a cursor, and the staged
/// values of tokens already handed out.
///
/// Each session owns exactly one buffer; dropping the session releases it.
#[derive(Debug)]
pub struct ScanBuffer {
    input: Box<[u8]>,
    pos: usize,
    /// Inside a `/*! ... */` executable comment; its `*/` is skipped.
    in_executable_comment: bool,
    staging: LexicalStaging,
}

impl ScanBuffer {
    /// Bind a new scan buffer to `text`.
    ///
    /// Fails when the text cannot be scanned as a NUL-terminated buffer
    /// (it contains a NUL byte) or is longer than `max_len` bytes.
    pub fn new(text: &str, max_len: usize) -> Result<Self> {
        if text.len() > max_len {
            return Err(WardenError::ScanInit(format!(
                "query of {} bytes exceeds the {max_len} byte limit",
                text.len()
            )));
        }
        if let Some(at) = text.bytes().position(|b| b == 0) {
            return Err(WardenError::ScanInit(format!(
                "query contains a NUL byte at offset {at}"
            )));
        }
        Ok(ScanBuffer {
            input: text.as_bytes().into(),
            pos: 0,
            in_executable_comment: false,
            staging: LexicalStaging::default(),
        })
    }

    /// Byte offset of the next unread character.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn staging(&self) -> &LexicalStaging {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut LexicalStaging {
        &mut self.staging
    }

    // -- helpers ------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        Some(ch)
    }

    fn text(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.advance() {
            if ch == b'\n' {
                break;
            }
        }
    }

    /// Skip one comment, counting it in `sink`. Returns `true` if something
    /// was consumed so the caller can loop.
    fn skip_comment(&mut self, sink: &mut RiskSink<'_>) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(b'#'), _) => {
                sink.record(|r| r.hash_comments += 1);
                self.skip_line();
                true
            }
            // MySQL only treats `--` as a comment when followed by whitespace.
            (Some(b'-'), Some(b'-'))
                if self.peek_at(2).map_or(true, |c| c.is_ascii_whitespace()) =>
            {
                sink.record(|r| r.dash_dash_comments += 1);
                self.skip_line();
                true
            }
            (Some(b'/'), Some(b'*')) if self.peek_at(2) == Some(b'!') => {
                self.pos += 3;
                let digits = self.input[self.pos..]
                    .iter()
                    .take_while(|c| c.is_ascii_digit())
                    .count();
                if digits > 0 {
                    sink.record(|r| r.mysql_versioned_comments += 1);
                    self.pos += digits;
                } else {
                    sink.record(|r| r.mysql_comments += 1);
                }
                self.in_executable_comment = true;
                true
            }
            (Some(b'/'), Some(b'*')) => {
                sink.record(|r| r.multi_line_comments += 1);
                self.pos += 2;
                // An unterminated comment swallows the rest of the input.
                while self.peek().is_some() {
                    if self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/') {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
                true
            }
            (Some(b'*'), Some(b'/')) if self.in_executable_comment => {
                self.in_executable_comment = false;
                self.pos += 2;
                true
            }
            _ => false,
        }
    }

    fn skip_whitespace_and_comments(&mut self, sink: &mut RiskSink<'_>) {
        loop {
            self.skip_whitespace();
            if !self.skip_comment(sink) {
                break;
            }
        }
    }

    fn stage(&mut self, sink: &RiskSink<'_>, token: Token, text: String) -> Token {
        if sink.is_recording() {
            if let Some(queue) = token.staged_in() {
                self.staging.push(queue, text);
            }
        }
        token
    }

    // -- main scanner -------------------------------------------------------

    /// Scan the next token.
    ///
    /// Lexical risk (comments, hex strings, server variables) is recorded into
    /// `sink`; with [`RiskSink::Discard`] nothing is recorded and no text is
    /// staged, which is what the post-failure fingerprint drain wants.
    pub fn raw_lex(&mut self, mut sink: RiskSink<'_>) -> Token {
        self.skip_whitespace_and_comments(&mut sink);

        let ch = match self.peek() {
            Some(c) => c,
            None => return Token::Eof,
        };

        // ----- string literal -----
        if ch == b'\'' || ch == b'"' {
            return self.read_string_literal(&sink, ch);
        }

        // ----- hex literal X'...' -----
        if (ch == b'x' || ch == b'X') && self.peek_at(1) == Some(b'\'') {
            return self.read_quoted_hex(&mut sink);
        }

        // ----- hex literal 0x... -----
        if ch == b'0'
            && matches!(self.peek_at(1), Some(b'x') | Some(b'X'))
            && self.peek_at(2).map_or(false, |c| c.is_ascii_hexdigit())
        {
            return self.read_bare_hex(&mut sink);
        }

        // ----- numeric literal -----
        if ch.is_ascii_digit() {
            return self.read_number(&sink);
        }

        // ----- dot: could be `.123` real or just a dot -----
        if ch == b'.' && self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
            return self.read_number(&sink);
        }

        // ----- identifier / keyword -----
        if ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$' {
            return self.read_identifier_or_keyword(&sink);
        }

        // ----- backtick identifier -----
        if ch == b'`' {
            return self.read_quoted_identifier(&sink);
        }

        // ----- variables -----
        if ch == b'@' {
            return self.read_variable(&mut sink);
        }

        if ch == b'?' {
            self.advance();
            return Token::Placeholder;
        }

        self.read_operator()
    }

    // -- literal readers ----------------------------------------------------

    fn read_string_literal(&mut self, sink: &RiskSink<'_>, quote: u8) -> Token {
        self.advance(); // consume opening quote
        let mut s = Vec::new();
        loop {
            match self.advance() {
                None => return Token::Invalid,
                Some(b'\\') => match self.advance() {
                    None => return Token::Invalid,
                    Some(b'n') => s.push(b'\n'),
                    Some(b't') => s.push(b'\t'),
                    Some(b'r') => s.push(b'\r'),
                    Some(b'0') => s.push(0),
                    Some(c) => s.push(c),
                },
                Some(c) if c == quote => {
                    // A doubled quote escapes itself.
                    if self.peek() == Some(quote) {
                        self.advance();
                        s.push(quote);
                    } else {
                        break;
                    }
                }
                Some(c) => s.push(c),
            }
        }
        let text = String::from_utf8_lossy(&s).into_owned();
        self.stage(sink, Token::StringLiteral, text)
    }

    fn read_quoted_hex(&mut self, sink: &mut RiskSink<'_>) -> Token {
        self.advance(); // consume 'X' or 'x'
        self.advance(); // consume opening '
        let start = self.pos;
        loop {
            match self.advance() {
                None => return Token::Invalid,
                Some(b'\'') => break,
                Some(c) if c.is_ascii_hexdigit() => {}
                Some(_) => return Token::Invalid,
            }
        }
        let digits = String::from_utf8_lossy(&self.input[start..self.pos - 1]).into_owned();
        sink.record(|r| r.hex_strings += 1);
        self.stage(sink, Token::HexLiteral, format!("0x{digits}"))
    }

    fn read_bare_hex(&mut self, sink: &mut RiskSink<'_>) -> Token {
        let start = self.pos;
        self.pos += 2; // consume 0x
        while self.peek().map_or(false, |c| c.is_ascii_hexdigit()) {
            self.advance();
        }
        let text = self.text(start);
        sink.record(|r| r.hex_strings += 1);
        self.stage(sink, Token::HexLiteral, text)
    }

    fn read_number(&mut self, sink: &RiskSink<'_>) -> Token {
        let start = self.pos;
        let mut is_real = false;

        // Integer part
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Fractional part, including a trailing "123."
        if self.peek() == Some(b'.') {
            is_real = true;
            self.advance();
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part, only when digits actually follow.
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+') | Some(b'-')));
            if self.peek_at(1 + sign).map_or(false, |c| c.is_ascii_digit()) {
                is_real = true;
                self.pos += 1 + sign;
                while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = self.text(start);
        let token = if is_real {
            Token::RealLiteral
        } else {
            Token::IntegerLiteral
        };
        self.stage(sink, token, text)
    }

    fn read_identifier_or_keyword(&mut self, sink: &RiskSink<'_>) -> Token {
        let start = self.pos;
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$')
        {
            self.advance();
        }
        let word = self.text(start);
        match keyword_token(&word.to_ascii_uppercase()) {
            Some(kw) => kw,
            None => self.stage(sink, Token::Identifier, word),
        }
    }

    fn read_quoted_identifier(&mut self, sink: &RiskSink<'_>) -> Token {
        self.advance(); // consume opening `
        let mut name = Vec::new();
        loop {
            match self.advance() {
                None => return Token::Invalid,
                Some(b'`') => {
                    // Doubled backtick escapes itself
                    if self.peek() == Some(b'`') {
                        self.advance();
                        name.push(b'`');
                    } else {
                        break;
                    }
                }
                Some(c) => name.push(c),
            }
        }
        let text = String::from_utf8_lossy(&name).into_owned();
        self.stage(sink, Token::Identifier, text)
    }

    fn read_variable(&mut self, sink: &mut RiskSink<'_>) -> Token {
        self.advance(); // consume '@'
        let global = self.peek() == Some(b'@');
        if global {
            self.advance();
        }
        let start = self.pos;
        while self
            .peek()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c == b'.')
        {
            self.advance();
        }
        let name = self.text(start);
        if global {
            sink.record(|r| r.global_variables += 1);
            self.stage(sink, Token::GlobalVariable, name)
        } else {
            self.stage(sink, Token::UserVariable, name)
        }
    }

    fn read_operator(&mut self) -> Token {
        let Some(ch) = self.advance() else {
            return Token::Eof;
        };
        match ch {
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'(' => Token::LeftParen,
            b')' => Token::RightParen,
            b',' => Token::Comma,
            b';' => Token::Semicolon,
            b'.' => Token::Dot,
            b'~' => Token::Tilde,
            b'^' => Token::Caret,
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                }
                Token::Eq
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            b'<' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    if self.peek() == Some(b'>') {
                        self.advance();
                        Token::NullSafeEq
                    } else {
                        Token::LtEq
                    }
                }
                Some(b'>') => {
                    self.advance();
                    Token::NotEq
                }
                Some(b'<') => {
                    self.advance();
                    Token::ShiftLeft
                }
                _ => Token::Lt,
            },
            b'>' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    Token::GtEq
                }
                Some(b'>') => {
                    self.advance();
                    Token::ShiftRight
                }
                _ => Token::Gt,
            },
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.advance();
                    Token::PipePipe
                } else {
                    Token::Pipe
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.advance();
                    Token::AmpAmp
                } else {
                    Token::Ampersand
                }
            }
            b':' if self.peek() == Some(b'=') => {
                self.advance();
                Token::Assign
            }
            _ => {
                // Swallow the rest of a multi-byte UTF-8 character.
                while self.peek().map_or(false, |c| c & 0xC0 == 0x80) {
                    self.advance();
                }
                Token::Invalid
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
