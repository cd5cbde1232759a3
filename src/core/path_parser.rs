// src/core/path_parser.rs

use crate::constants::{CMD_PATH_SEP, CMD_PATH_SEP_CHARS};
use crate::core::abbrs::AbbrsIndex;
use crate::core::cmd_tree::CmdTree;
use crate::core::env_parser::{BracketOutcome, EnvParser, ParseError, ParseStage};
use crate::core::sequence::SequenceBreaker;
use crate::models::{MatchedCmd, ParsedCmd, ParsedCmdSeg, ParsedEnv, ParsedFlow};
use std::collections::VecDeque;

/// One raw element produced while walking a sequence against the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Env(ParsedEnv),
    Cmd(MatchedCmd),
    Sep,
}

fn is_path_sep(c: char) -> bool {
    c.is_whitespace() || CMD_PATH_SEP_CHARS.contains(&c)
}

/// Walks one sequence of tokens down the command tree.
#[derive(Debug, Clone, Default)]
pub struct CmdPathParser {
    env_parser: EnvParser,
}

impl CmdPathParser {
    pub fn new(env_parser: EnvParser) -> Self {
        Self { env_parser }
    }

    /// Produces the raw segment list for one sequence.
    ///
    /// Only one command is matched per unseparated run; after a match, the rest of the
    /// run is read as that command's arguments.
    ///
    /// # Errors
    /// An unknown command, an unclosed env block, or tokens that cannot be read as
    /// arguments abort the whole sequence.
    pub fn parse_segments(
        &self,
        tree: &CmdTree,
        index: &AbbrsIndex,
        tokens: &[String],
    ) -> Result<Vec<PathSeg>, ParseError> {
        let mut queue: VecDeque<String> = tokens
            .iter()
            .map(|token| token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        let mut segs: Vec<PathSeg> = Vec::new();
        let mut curr = tree.root();
        let mut allow_descent = true;

        while !queue.is_empty() {
            // 1. Env block.
            match self.env_parser.try_parse(tree, curr, index, &mut queue)? {
                BracketOutcome::Found(env) => {
                    segs.push(PathSeg::Env(env));
                    allow_descent = true;
                    continue;
                }
                BracketOutcome::Again => continue,
                BracketOutcome::NotFound => {}
            }

            let Some(token) = queue.pop_front() else {
                break;
            };

            // 2. Leading separator run.
            let run_len: usize = token
                .chars()
                .take_while(|&c| is_path_sep(c))
                .map(char::len_utf8)
                .sum();
            if run_len > 0 {
                if segs.last() != Some(&PathSeg::Sep) {
                    segs.push(PathSeg::Sep);
                }
                allow_descent = true;
                let rest = token.get(run_len..).unwrap_or_default();
                if !rest.is_empty() {
                    queue.push_front(rest.to_string());
                }
                continue;
            }

            // 3. Separator inside the token.
            if allow_descent && let Some(pos) = token.find(is_path_sep) {
                let (head, tail) = token.split_at(pos);
                queue.push_front(tail.to_string());
                queue.push_front(head.to_string());
                continue;
            }

            // 4. One hop down the tree.
            if allow_descent {
                let Some(child) = tree.find_child(curr, &token) else {
                    let mut offending = vec![token.clone()];
                    offending.extend(queue.iter().cloned());
                    return Err(ParseError::new(
                        ParseStage::CmdPath,
                        tree.display_path(curr),
                        format!("unknown command '{token}'"),
                        offending,
                    ));
                };
                segs.push(PathSeg::Cmd(MatchedCmd {
                    name: tree.node(child).name().to_string(),
                    node: child,
                }));
                curr = child;
                allow_descent = false;
                continue;
            }

            // 5. Everything left belongs to the matched command.
            let mut remaining = vec![token];
            remaining.extend(queue.drain(..));
            let (env, rest) = self
                .env_parser
                .try_parse_raw(tree, curr, index, &remaining);
            if !rest.is_empty() {
                let path = tree.display_path(curr);
                return Err(ParseError::new(
                    ParseStage::Args,
                    path.clone(),
                    format!("tokens should be args of '{path}' but could not be read as such"),
                    rest,
                ));
            }
            if !env.is_empty() {
                segs.push(PathSeg::Env(env));
            }
            break;
        }

        log::trace!("Path segments for {tokens:?}: {segs:?}");
        Ok(segs)
    }

    /// Parses one sequence into a `ParsedCmd`.
    pub fn parse(
        &self,
        tree: &CmdTree,
        index: &AbbrsIndex,
        tokens: &[String],
    ) -> Result<ParsedCmd, ParseError> {
        Ok(fold_segments(self.parse_segments(tree, index, tokens)?))
    }
}

/// Folds raw segments into `(env, command)` pairs.
///
/// Argument keys are prefixed with the dotted path of the commands matched so far,
/// so `X{a=1}` yields the key `X.a`. Env fragments seen before any command form their
/// own command-less segment.
pub fn fold_segments(segs: Vec<PathSeg>) -> ParsedCmd {
    let mut cmd = ParsedCmd::default();
    let mut current = ParsedCmdSeg::default();
    let mut prefix = String::new();

    for seg in segs {
        match seg {
            PathSeg::Sep => {}
            PathSeg::Cmd(matched) => {
                if current.env.is_some() || current.matched.is_some() {
                    cmd.segments.push(std::mem::take(&mut current));
                }
                prefix.push_str(&matched.name);
                prefix.push_str(CMD_PATH_SEP);
                current.matched = Some(matched);
            }
            PathSeg::Env(env) => {
                let env: ParsedEnv = env
                    .into_iter()
                    .map(|(key, val)| {
                        if val.is_arg {
                            (format!("{prefix}{key}"), val)
                        } else {
                            (key, val)
                        }
                    })
                    .collect();
                match current.env.as_mut() {
                    Some(existing) => existing.merge(env),
                    None => current.env = Some(env),
                }
            }
        }
    }
    if current.env.is_some() || current.matched.is_some() {
        cmd.segments.push(current);
    }
    cmd
}

/// Parses a whole script: sequence breaking, then one `ParsedCmd` per sequence.
#[derive(Debug, Clone, Default)]
pub struct FlowParser {
    breaker: SequenceBreaker,
    path_parser: CmdPathParser,
}

impl FlowParser {
    pub fn new(breaker: SequenceBreaker, path_parser: CmdPathParser) -> Self {
        Self {
            breaker,
            path_parser,
        }
    }

    /// Parses `tokens` against the tree.
    ///
    /// Unless the script opens with the sequence separator, a command-less env block
    /// leading the first sequence is hoisted into `global_env`.
    pub fn parse(
        &self,
        tree: &CmdTree,
        index: &AbbrsIndex,
        tokens: &[String],
    ) -> Result<ParsedFlow, ParseError> {
        let (sequences, first_is_global) = self.breaker.parse(tokens);
        let mut flow = ParsedFlow::default();

        for (i, sequence) in sequences.iter().enumerate() {
            let mut cmd = self.path_parser.parse(tree, index, sequence)?;
            if i == 0
                && first_is_global
                && cmd.segments.first().is_some_and(|seg| seg.matched.is_none())
            {
                let global = cmd.segments.remove(0);
                flow.global_env = global.env;
                flow.global_cmd_idx = Some(0);
            }
            flow.cmds.push(cmd);
        }

        log::debug!(
            "Parsed {} command(s), global env: {}",
            flow.cmds.len(),
            flow.global_env.as_ref().map_or(0, ParsedEnv::len)
        );
        Ok(flow)
    }
}
