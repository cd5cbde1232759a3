// src/core/sequence.rs

use crate::constants::{SEQ_SEP, SEQ_SEP_PROTECTED_PREFIXES, SEQ_SEP_PROTECTED_SUFFIXES};

/// Splits a token list into independent command sequences on the sequence separator.
#[derive(Debug, Clone)]
pub struct SequenceBreaker {
    sep: String,
    protected_prefixes: Vec<String>,
    protected_suffixes: Vec<String>,
}

impl Default for SequenceBreaker {
    fn default() -> Self {
        Self::new(SEQ_SEP, SEQ_SEP_PROTECTED_PREFIXES, SEQ_SEP_PROTECTED_SUFFIXES)
    }
}

impl SequenceBreaker {
    pub fn new(sep: &str, protected_prefixes: &[&str], protected_suffixes: &[&str]) -> Self {
        Self {
            sep: sep.to_string(),
            protected_prefixes: protected_prefixes.iter().map(|s| s.to_string()).collect(),
            protected_suffixes: protected_suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Re-tokenizes so that every unprotected separator stands alone.
    ///
    /// An occurrence is protected when the text before it ends with a protected
    /// prefix or the text after it starts with a protected suffix. Empty pieces are dropped.
    pub fn normalize(&self, tokens: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            self.split_token(token, &mut out);
        }
        out
    }

    fn split_token(&self, token: &str, out: &mut Vec<String>) {
        if self.sep.is_empty() {
            if !token.is_empty() {
                out.push(token.to_string());
            }
            return;
        }

        let mut piece_start = 0;
        let mut search_from = 0;
        while let Some(offset) = token.get(search_from..).and_then(|rest| rest.find(&self.sep)) {
            let at = search_from + offset;
            search_from = at + self.sep.len();
            if self.is_protected(token, at) {
                continue;
            }
            if let Some(piece) = token.get(piece_start..at)
                && !piece.is_empty()
            {
                out.push(piece.to_string());
            }
            out.push(self.sep.clone());
            piece_start = search_from;
        }
        if let Some(rest) = token.get(piece_start..)
            && !rest.is_empty()
        {
            out.push(rest.to_string());
        }
    }

    fn is_protected(&self, token: &str, at: usize) -> bool {
        let before = token.get(..at).unwrap_or_default();
        let after = token.get(at + self.sep.len()..).unwrap_or_default();
        self.protected_prefixes.iter().any(|p| before.ends_with(p.as_str()))
            || self.protected_suffixes.iter().any(|s| after.starts_with(s.as_str()))
    }

    /// Normalizes `tokens` and cuts them at each standalone separator.
    ///
    /// Tokens are trimmed, empty tokens and empty sequences are dropped. The flag is
    /// `false` only when the very first normalized token is the separator, meaning the
    /// script opened with an explicit empty sequence and has no global prefix.
    pub fn parse(&self, tokens: &[String]) -> (Vec<Vec<String>>, bool) {
        let normalized = self.normalize(tokens);
        let first_is_global = normalized.first() != Some(&self.sep);

        let mut sequences = Vec::new();
        let mut current: Vec<String> = Vec::new();
        for token in normalized {
            if token == self.sep {
                if !current.is_empty() {
                    sequences.push(std::mem::take(&mut current));
                }
                continue;
            }
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                current.push(trimmed.to_string());
            }
        }
        if !current.is_empty() {
            sequences.push(current);
        }
        log::trace!("Broke script into {} sequence(s): {:?}", sequences.len(), sequences);
        (sequences, first_is_global)
    }
}
