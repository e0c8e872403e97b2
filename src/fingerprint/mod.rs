//! Literal-independent fingerprints of a query's token stream.
//!
//! A [`TokenFingerprint`] is folded from token *codes* only. Every number
//! lexes to the same code, as does every quoted string and every identifier,
//! so `WHERE id = 1` and `WHERE id = 999` fingerprint identically. That is
//! what lets a firewall whitelist or cache a query shape once and recognise it
//! again regardless of the values a client binds into it.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Codes at or below this value are single-character punctuation and are not
/// folded into the fingerprint.
pub const MAX_CHAR_TOKEN: u16 = 255;

/// A rolling sdbm hash over token codes plus the number of tokens folded.
///
/// Two fingerprints are equal only when both the hash and the token count
/// match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenFingerprint {
    pub hash: u64,
    pub token_count: u64,
}

impl TokenFingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one token code. Returns `true` if the code counted, i.e. it lies
    /// above the single-character range.
    pub fn observe(&mut self, code: u16) -> bool {
        if code <= MAX_CHAR_TOKEN {
            return false;
        }
        self.hash = sdbm(code, self.hash);
        self.token_count += 1;
        true
    }
}

/// `code + (h << 6) + (h << 16) - h`, in wrapping arithmetic.
fn sdbm(code: u16, h: u64) -> u64 {
    u64::from(code)
        .wrapping_add(h << 6)
        .wrapping_add(h << 16)
        .wrapping_sub(h)
}

impl Hash for TokenFingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash.wrapping_add(self.token_count));
    }
}

impl fmt::Display for TokenFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{}", self.hash, self.token_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn punctuation_codes_are_ignored() {
        let mut fp = TokenFingerprint::new();
        assert!(!fp.observe(b'(' as u16));
        assert!(!fp.observe(0));
        assert!(!fp.observe(255));
        assert_eq!(fp, TokenFingerprint::default());
    }

    #[test]
    fn sdbm_matches_reference_steps() {
        let mut fp = TokenFingerprint::new();
        fp.observe(300);
        assert_eq!(fp.hash, 300);
        fp.observe(301);
        assert_eq!(fp.hash, 301 + (300 << 6) + (300 << 16) - 300);
        assert_eq!(fp.token_count, 2);
    }

    #[test]
    fn hash_wraps_instead_of_overflowing() {
        let mut fp = TokenFingerprint::new();
        for _ in 0..64 {
            fp.observe(u16::MAX);
        }
        assert_eq!(fp.token_count, 64);
    }

    #[test]
    fn order_matters() {
        let mut a = TokenFingerprint::new();
        a.observe(300);
        a.observe(400);
        let mut b = TokenFingerprint::new();
        b.observe(400);
        b.observe(300);
        assert_ne!(a, b);
    }

    #[test]
    fn equal_hash_with_different_count_is_not_equal() {
        let a = TokenFingerprint { hash: 7, token_count: 1 };
        let b = TokenFingerprint { hash: 7, token_count: 2 };
        assert_ne!(a, b);
    }

    #[test]
    fn usable_as_set_key() {
        let mut fp = TokenFingerprint::new();
        fp.observe(512);
        let mut seen = HashSet::new();
        assert!(seen.insert(fp));
        assert!(!seen.insert(fp));
    }

    #[test]
    fn display_shows_hash_and_count() {
        let fp = TokenFingerprint { hash: 0xabc, token_count: 3 };
        assert_eq!(fp.to_string(), "0000000000000abc/3");
    }
}
