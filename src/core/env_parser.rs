// src/core/env_parser.rs

use crate::constants::{CMD_PATH_SEP, ENV_BRACKET_LEFT, ENV_BRACKET_RIGHT, ENV_KV_SEP};
use crate::core::abbrs::AbbrsIndex;
use crate::core::cmd_tree::{Args, CmdTree};
use crate::models::{NodeId, ParsedEnv, ParsedEnvVal};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Which part of the parser rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Bracket,
    CmdPath,
    Args,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bracket => "Env block",
            Self::CmdPath => "Command path",
            Self::Args => "Argument",
        })
    }
}

fn path_label(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "{} error under '{}': {} (near '{}')",
    .stage,
    path_label(.path),
    .detail,
    .tokens.join(" ")
)]
pub struct ParseError {
    pub stage: ParseStage,
    /// Canonical path of the command matched so far.
    pub path: String,
    pub detail: String,
    /// The tokens the parser was looking at.
    pub tokens: Vec<String>,
}

impl ParseError {
    pub fn new(
        stage: ParseStage,
        path: impl Into<String>,
        detail: impl Into<String>,
        tokens: Vec<String>,
    ) -> Self {
        Self {
            stage,
            path: path.into(),
            detail: detail.into(),
            tokens,
        }
    }
}

/// Outcome of looking for an env block at the front of the token queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketOutcome {
    /// The front token does not start a block.
    NotFound,
    /// The front token contained a bracket mid-token and was split; look again.
    Again,
    /// A complete block was consumed.
    Found(ParsedEnv),
}

/// One piece of a tokenized assignment run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Sep,
}

impl Piece {
    fn into_token(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Sep => ENV_KV_SEP.to_string(),
        }
    }
}

/// Parses `{k=v ...}` blocks and bare assignment runs.
#[derive(Debug, Clone)]
pub struct EnvParser {
    left: String,
    right: String,
    kv_sep: String,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self {
            left: ENV_BRACKET_LEFT.to_string(),
            right: ENV_BRACKET_RIGHT.to_string(),
            kv_sep: ENV_KV_SEP.to_string(),
        }
    }
}

impl EnvParser {
    /// Tries to consume one bracketed env block from the front of `queue`.
    ///
    /// Assignments inside the block are interpreted in the scope of `node`: as
    /// arguments when its executable declares any, as env keys otherwise.
    pub fn try_parse(
        &self,
        tree: &CmdTree,
        node: NodeId,
        index: &AbbrsIndex,
        queue: &mut VecDeque<String>,
    ) -> Result<BracketOutcome, ParseError> {
        let snapshot: Vec<String> = queue.iter().cloned().collect();
        match self.find_left(queue) {
            BracketOutcome::Found(_) => {}
            other => return Ok(other),
        }

        let Some(body) = self.find_right(queue) else {
            return Err(ParseError::new(
                ParseStage::Bracket,
                tree.display_path(node),
                format!("'{}' is never closed by '{}'", self.left, self.right),
                snapshot,
            ));
        };

        let (env, rest) = self.try_parse_raw(tree, node, index, &body);
        if !rest.is_empty() {
            return Err(ParseError::new(
                ParseStage::Bracket,
                tree.display_path(node),
                "tokens inside the env block are not assignments",
                rest,
            ));
        }
        Ok(BracketOutcome::Found(env))
    }

    /// Inspects only the front token. `Found` carries an empty env as a marker.
    fn find_left(&self, queue: &mut VecDeque<String>) -> BracketOutcome {
        let Some(pos) = queue.front().and_then(|front| front.find(&self.left)) else {
            return BracketOutcome::NotFound;
        };
        let Some(token) = queue.pop_front() else {
            return BracketOutcome::NotFound;
        };
        let before = token.get(..pos).unwrap_or_default().trim();
        let after = token.get(pos + self.left.len()..).unwrap_or_default().trim();

        if !after.is_empty() {
            queue.push_front(after.to_string());
        }
        if before.is_empty() {
            return BracketOutcome::Found(ParsedEnv::new());
        }
        queue.push_front(self.left.clone());
        queue.push_front(before.to_string());
        BracketOutcome::Again
    }

    /// Collects the block body up to the closing bracket. Text after the bracket
    /// inside the same token is pushed back. `None` when no closing bracket exists.
    fn find_right(&self, queue: &mut VecDeque<String>) -> Option<Vec<String>> {
        let mut body = Vec::new();
        while let Some(token) = queue.pop_front() {
            if let Some(pos) = token.find(&self.right) {
                let inside = token.get(..pos).unwrap_or_default().trim();
                if !inside.is_empty() {
                    body.push(inside.to_string());
                }
                let after = token.get(pos + self.right.len()..).unwrap_or_default().trim();
                if !after.is_empty() {
                    queue.push_front(after.to_string());
                }
                return Some(body);
            }
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                body.push(trimmed.to_string());
            }
        }
        None
    }

    /// Splits each token on its first `=` into text/separator pieces. Empty texts are dropped.
    fn split_pieces(&self, tokens: &[String]) -> Vec<Piece> {
        let mut pieces = Vec::new();
        for token in tokens {
            match token.split_once(self.kv_sep.as_str()) {
                Some((key, value)) => {
                    push_text(&mut pieces, key);
                    pieces.push(Piece::Sep);
                    push_text(&mut pieces, value);
                }
                None => push_text(&mut pieces, token),
            }
        }
        pieces
    }

    /// Consumes as many assignments from `tokens` as fit the scope of `node`.
    ///
    /// Returns the parsed env and the unconsumed tail (re-joined into tokens).
    pub fn try_parse_raw(
        &self,
        tree: &CmdTree,
        node: NodeId,
        index: &AbbrsIndex,
        tokens: &[String],
    ) -> (ParsedEnv, Vec<String>) {
        let pieces = self.split_pieces(tokens);
        let args = tree
            .node(node)
            .cmd()
            .map(|cmd| cmd.args())
            .filter(|args| !args.is_empty());
        match args {
            Some(args) => self.parse_args(args, pieces),
            None => self.parse_global(index, tokens, pieces),
        }
    }

    /// Global scope: `k=v` triples with keys expanded through the tree index.
    fn parse_global(
        &self,
        index: &AbbrsIndex,
        tokens: &[String],
        pieces: Vec<Piece>,
    ) -> (ParsedEnv, Vec<String>) {
        if !pieces.contains(&Piece::Sep) {
            return (ParsedEnv::new(), tokens.to_vec());
        }
        let mut env = ParsedEnv::new();
        let mut consumed = 0;
        while let (Some(Piece::Text(key)), Some(Piece::Sep), Some(Piece::Text(value))) = (
            pieces.get(consumed),
            pieces.get(consumed + 1),
            pieces.get(consumed + 2),
        ) {
            let (key, _) = index.try_match(key, CMD_PATH_SEP);
            env.insert(key, ParsedEnvVal::new(value.as_str(), false));
            consumed += 3;
        }
        (env, rest_tokens(pieces, consumed))
    }

    /// Command scope: positional values, `name value` pairs, or `name=value` triples.
    fn parse_args(&self, args: &Args, pieces: Vec<Piece>) -> (ParsedEnv, Vec<String>) {
        let mut env = ParsedEnv::new();

        if !pieces.contains(&Piece::Sep) {
            let texts: Vec<String> = pieces.into_iter().map(Piece::into_token).collect();
            let keyword = texts
                .first()
                .is_some_and(|first| args.resolve(first).is_some())
                || texts.len() > args.len();

            if !keyword {
                for (name, value) in args.names().zip(&texts) {
                    env.insert(name, ParsedEnvVal::new(value.as_str(), true));
                }
                return (env, Vec::new());
            }

            let mut consumed = 0;
            while let (Some(key), Some(value)) = (texts.get(consumed), texts.get(consumed + 1)) {
                let Some(name) = args.resolve(key) else {
                    break;
                };
                env.insert(name, ParsedEnvVal::new(value.as_str(), true));
                consumed += 2;
            }
            return (env, texts.into_iter().skip(consumed).collect());
        }

        let mut consumed = 0;
        while let (Some(Piece::Text(key)), Some(Piece::Sep), Some(Piece::Text(value))) = (
            pieces.get(consumed),
            pieces.get(consumed + 1),
            pieces.get(consumed + 2),
        ) {
            let Some(name) = args.resolve(key) else {
                break;
            };
            env.insert(name, ParsedEnvVal::new(value.as_str(), true));
            consumed += 3;
        }
        (env, rest_tokens(pieces, consumed))
    }
}

fn push_text(pieces: &mut Vec<Piece>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        pieces.push(Piece::Text(text.to_string()));
    }
}

fn rest_tokens(pieces: Vec<Piece>, consumed: usize) -> Vec<String> {
    pieces
        .into_iter()
        .skip(consumed)
        .map(Piece::into_token)
        .collect()
}
