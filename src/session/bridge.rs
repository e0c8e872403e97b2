//! The single point every token passes through.
//!
//! The grammar engine never calls the raw lexer itself: it pulls tokens from a
//! [`TokenBridge`], which lexes on demand, folds each token's code into the
//! session's [`TokenFingerprint`] and keeps a small lookahead window. The
//! post-failure drain goes through the same bridge, so the fingerprint sees
//! exactly the token stream of the whole input, once per token, whether or not
//! the parse succeeded.

use std::collections::VecDeque;

use tracing::trace;

use crate::fingerprint::TokenFingerprint;
use crate::risk::RiskSink;
use crate::sql::lexer::{ScanBuffer, Token};

/// A lexed token and the byte offset just past it.
#[derive(Debug, Clone, Copy)]
struct Lexed {
    token: Token,
    end: usize,
}

/// Bounded-lookahead token source bound to one session's scan buffer and
/// fingerprint.
pub struct TokenBridge<'s> {
    scan: &'s mut ScanBuffer,
    fingerprint: &'s mut TokenFingerprint,
    lookahead: VecDeque<Lexed>,
    /// End offset of the most recently consumed token.
    consumed_end: usize,
}

impl<'s> TokenBridge<'s> {
    pub fn new(scan: &'s mut ScanBuffer, fingerprint: &'s mut TokenFingerprint) -> Self {
        TokenBridge {
            scan,
            fingerprint,
            lookahead: VecDeque::new(),
            consumed_end: 0,
        }
    }

    /// Pull one token from the raw lexer and fingerprint it.
    fn lex(&mut self, sink: RiskSink<'_>) -> Lexed {
        let token = self.scan.raw_lex(sink);
        self.fingerprint.observe(token.code());
        Lexed {
            token,
            end: self.scan.position(),
        }
    }

    /// Consume and return the next token.
    pub fn next_token(&mut self, sink: RiskSink<'_>) -> Token {
        let lexed = match self.lookahead.pop_front() {
            Some(lexed) => lexed,
            None => self.lex(sink),
        };
        self.consumed_end = lexed.end;
        lexed.token
    }

    /// Look at the token `n` positions ahead without consuming it. `peek(0)`
    /// is the token the next [`TokenBridge::next_token`] returns.
    ///
    /// Tokens lexed to satisfy a peek are fingerprinted now and never again.
    pub fn peek(&mut self, n: usize, mut sink: RiskSink<'_>) -> Token {
        while self.lookahead.len() <= n {
            let lexed = self.lex(sink.reborrow());
            self.lookahead.push_back(lexed);
        }
        self.lookahead[n].token
    }

    /// Take the staged text of a token that has just been consumed.
    pub fn take_text(&mut self, token: Token) -> Option<String> {
        self.scan.staging_mut().take(token)
    }

    /// Byte offset just past the token `n` positions ahead, or past the last
    /// consumed token if nothing that far ahead has been lexed.
    pub fn offset_of(&self, n: usize) -> usize {
        self.lookahead.get(n).map_or(self.consumed_end, |l| l.end)
    }

    /// Consume the rest of the input in fingerprint-only mode. Returns the
    /// number of tokens pulled, end marker excluded.
    pub fn drain(&mut self) -> u64 {
        let mut drained = 0;
        loop {
            let token = self.next_token(RiskSink::Discard);
            if token == Token::Eof {
                break;
            }
            drained += 1;
        }
        trace!(drained, "lexer drained to end of input");
        drained
    }

    pub fn fingerprint(&self) -> TokenFingerprint {
        *self.fingerprint
    }
}
