// src/models.rs

use crate::constants::{CMD_PATH_SEP, ENV_VAL_DEL_ALL_MARK, ENV_VAL_DEL_MARK};
use crate::core::env::Env;
use std::collections::{BTreeMap, btree_map};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- ENV LAYER MODELS ---

/// The tag of one scope in the chained environment.
///
/// Chains are built in a fixed order at startup (`Default` <- `Persisted` <- `Session`),
/// `Global` and `CmdArg` layers are transient and pushed per run / per command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvLayerType {
    Default,
    Persisted,
    Session,
    Global,
    CmdArg,
}

impl EnvLayerType {
    /// The tag as written in env protocol records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Persisted => "persisted",
            Self::Session => "session",
            Self::Global => "global",
            Self::CmdArg => "cmd",
        }
    }
}

impl fmt::Display for EnvLayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown env layer '{0}'.")]
pub struct UnknownLayerError(pub String);

impl FromStr for EnvLayerType {
    type Err = UnknownLayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "default" => Ok(Self::Default),
            "persisted" => Ok(Self::Persisted),
            "session" => Ok(Self::Session),
            "global" => Ok(Self::Global),
            "cmd" => Ok(Self::CmdArg),
            other => Err(UnknownLayerError(other.to_string())),
        }
    }
}

// --- PARSED ENV MODELS ---

/// What writing a parsed value does to the target env.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteKind {
    /// A plain assignment.
    #[default]
    None,
    /// Remove the key from the layer being written only.
    Layer,
    /// Remove the key from every layer of the chain.
    All,
}

/// One value produced by the env-assignment parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEnvVal {
    pub raw: String,
    pub is_arg: bool,
    pub delete: DeleteKind,
}

impl ParsedEnvVal {
    /// Builds a value, recognizing the delete sentinels.
    pub fn new(raw: impl Into<String>, is_arg: bool) -> Self {
        let raw = raw.into();
        let delete = match raw.as_str() {
            ENV_VAL_DEL_MARK => DeleteKind::Layer,
            ENV_VAL_DEL_ALL_MARK => DeleteKind::All,
            _ => DeleteKind::None,
        };
        Self {
            raw,
            is_arg,
            delete,
        }
    }
}

/// An ordered key -> value mapping built while parsing. Later inserts overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEnv(BTreeMap<String, ParsedEnvVal>);

impl ParsedEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, val: ParsedEnvVal) {
        self.0.insert(key.into(), val);
    }

    pub fn get(&self, key: &str) -> Option<&ParsedEnvVal> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ParsedEnvVal> {
        self.0.iter()
    }

    /// Merges `other` into `self`; keys of `other` win.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// The raw values, mostly useful for diagnostics and tests.
    pub fn raw_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.raw.clone()))
            .collect()
    }

    /// Applies every entry to `env`: plain values are set on that layer,
    /// delete sentinels remove the key from that layer or from the whole chain.
    pub fn write_to(&self, env: &Env) {
        for (key, val) in &self.0 {
            match val.delete {
                DeleteKind::None => env.set_ext(key, &val.raw, val.is_arg),
                DeleteKind::Layer => env.delete_ext(key, env.layer_type()),
                DeleteKind::All => env.delete(key),
            }
        }
    }
}

impl IntoIterator for ParsedEnv {
    type Item = (String, ParsedEnvVal);
    type IntoIter = btree_map::IntoIter<String, ParsedEnvVal>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, ParsedEnvVal)> for ParsedEnv {
    fn from_iter<T: IntoIterator<Item = (String, ParsedEnvVal)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// --- PARSED COMMAND MODELS ---

/// Index of a node inside a `CmdTree`. Only the tree that minted it can resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// A command matched while walking the tree: its canonical name and node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedCmd {
    pub name: String,
    pub node: NodeId,
}

/// One `(env fragment, matched command)` pair of an invocation path.
/// `matched` is `None` only for a leading bare env fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCmdSeg {
    pub env: Option<ParsedEnv>,
    pub matched: Option<MatchedCmd>,
}

/// A full root-to-leaf invocation path with the env collected along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCmd {
    pub segments: Vec<ParsedCmdSeg>,
}

impl ParsedCmd {
    /// The last matched command, which is the one that gets dispatched.
    pub fn leaf(&self) -> Option<&MatchedCmd> {
        self.segments.iter().rev().find_map(|seg| seg.matched.as_ref())
    }

    /// Canonical names of the matched commands, root first.
    pub fn path(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|seg| seg.matched.as_ref())
            .map(|m| m.name.as_str())
            .collect()
    }

    pub fn display_path(&self) -> String {
        self.path().join(CMD_PATH_SEP)
    }

    /// All env fragments merged in order.
    pub fn merged_env(&self) -> ParsedEnv {
        let mut merged = ParsedEnv::new();
        for env in self.segments.iter().filter_map(|seg| seg.env.clone()) {
            merged.merge(env);
        }
        merged
    }
}

/// The result of parsing one script: one `ParsedCmd` per sequence plus the hoisted global env.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFlow {
    pub cmds: Vec<ParsedCmd>,
    pub global_env: Option<ParsedEnv>,
    /// Which entry of `cmds` supplied `global_env`, if any.
    pub global_cmd_idx: Option<usize>,
}

/// The mutable list of commands an engine walks. Power commands may rewrite it.
pub type Plan = Vec<ParsedCmd>;
