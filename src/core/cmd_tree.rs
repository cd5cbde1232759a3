// src/core/cmd_tree.rs

use crate::constants::CMD_PATH_SEP;
use crate::core::abbrs::{self, AbbrsIndex};
use crate::core::env::{self, Env, EnvError};
use crate::models::{NodeId, Plan};
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// What a registered name refers to, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Command,
    Argument,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Command => "command",
            Self::Argument => "argument",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error(
        "Invalid {kind} name '{name}': names must be non-empty and contain no whitespace, '.', '/', '{{', '}}', '=' or ':'."
    )]
    InvalidName { kind: NameKind, name: String },

    #[error("Duplicate {kind} name '{name}' under '{owner}'.")]
    DuplicateName {
        kind: NameKind,
        name: String,
        owner: String,
    },

    #[error(
        "The {kind} name or abbreviation '{abbr}' of '{name}' is already taken by '{existing}' under '{owner}'."
    )]
    DuplicateAbbr {
        kind: NameKind,
        abbr: String,
        name: String,
        existing: String,
        owner: String,
    },

    #[error("Command '{path}' already has an executable.")]
    ExecutableExists { path: String },
}

// --- Executables ---

/// Resolved argument values handed to an executable, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVals {
    vals: Vec<(String, String)>,
}

impl ArgVals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.vals.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.vals.push((name, value)),
        }
    }

    pub fn get_opt(&self, name: &str) -> Option<&str> {
        self.vals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Undeclared names read as the empty string.
    pub fn get(&self, name: &str) -> &str {
        self.get_opt(name).unwrap_or_default()
    }

    pub fn get_bool(&self, name: &str) -> bool {
        env::parse_bool(self.get(name))
    }

    pub fn get_int(&self, name: &str) -> Result<i64, EnvError> {
        env::parse_int(name, self.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vals.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }
}

pub type NormalFn = Rc<dyn Fn(&ArgVals, &Env) -> Result<bool>>;
pub type PowerFn = Rc<dyn Fn(&ArgVals, &Env, &mut Plan, &mut usize) -> Result<bool>>;
pub type SetupFn = Rc<dyn Fn(&ArgVals, &Env, &mut CmdTree) -> Result<bool>>;

/// The kinds of executable a node can carry.
#[derive(Clone)]
pub enum CmdKind {
    /// Receives resolved args and the invocation env.
    Normal(NormalFn),
    /// Additionally receives the plan and its own position in it, and may rewrite both.
    Power(PowerFn),
    /// Receives the command tree and may register new commands. They become
    /// reachable from the next parsed phase.
    Setup(SetupFn),
    /// A command line run as an external process.
    External(String),
}

impl fmt::Debug for CmdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal(_) => f.write_str("Normal(<fn>)"),
            Self::Power(_) => f.write_str("Power(<fn>)"),
            Self::Setup(_) => f.write_str("Setup(<fn>)"),
            Self::External(line) => f.debug_tuple("External").field(line).finish(),
        }
    }
}

/// Declared arguments of one executable: ordered names, defaults and an abbreviation map.
#[derive(Debug, Clone, Default)]
pub struct Args {
    names: Vec<String>,
    defaults: HashMap<String, String>,
    index: AbbrsIndex,
}

impl Args {
    pub fn add(
        &mut self,
        owner: &str,
        name: &str,
        default: &str,
        abbrs: &[&str],
    ) -> Result<(), RegistrationError> {
        abbrs::register_names(
            self.index.entries_mut(),
            NameKind::Argument,
            owner,
            name,
            abbrs,
        )?;
        self.names.push(name.to_string());
        self.defaults.insert(name.to_string(), default.to_string());
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn default_value(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    /// Resolves a name or abbreviation to the canonical arg name.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.index.resolve(token)
    }

    pub fn abbrs(&self) -> &AbbrsIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An executable attached to a tree node.
#[derive(Debug, Clone)]
pub struct Cmd {
    kind: CmdKind,
    help: String,
    args: Args,
    quiet: bool,
    path: String,
}

impl Cmd {
    /// Declares an argument. Names and abbreviations must be unique within this executable.
    pub fn add_arg(
        &mut self,
        name: &str,
        default: &str,
        abbrs: &[&str],
    ) -> Result<&mut Self, RegistrationError> {
        self.args.add(&self.path, name, default, abbrs)?;
        Ok(self)
    }

    /// Quiet commands are not announced by reporters.
    pub fn set_quiet(&mut self) -> &mut Self {
        self.quiet = true;
        self
    }

    pub fn kind(&self) -> &CmdKind {
        &self.kind
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_power(&self) -> bool {
        matches!(self.kind, CmdKind::Power(_))
    }
}

// --- Tree ---

#[derive(Debug)]
pub struct CmdNode {
    name: String,
    parent: Option<NodeId>,
    abbrs: Vec<String>,
    children: Vec<NodeId>,
    child_ids: HashMap<String, NodeId>,
    sub_abbrs: HashMap<String, String>,
    cmd: Option<Cmd>,
}

impl CmdNode {
    fn new(name: &str, parent: Option<NodeId>, abbrs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            parent,
            abbrs: abbrs
                .iter()
                .filter(|&&abbr| abbr != name)
                .map(|abbr| abbr.to_string())
                .collect(),
            children: Vec::new(),
            child_ids: HashMap::new(),
            sub_abbrs: HashMap::new(),
            cmd: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Abbreviations this node was registered with, excluding its own name.
    pub fn abbrs(&self) -> &[String] {
        &self.abbrs
    }

    /// Children in registration order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// `abbr -> canonical` for the children of this node, identity entries included.
    pub fn sub_abbrs(&self) -> &HashMap<String, String> {
        &self.sub_abbrs
    }

    pub fn cmd(&self) -> Option<&Cmd> {
        self.cmd.as_ref()
    }

    pub fn has_executable(&self) -> bool {
        self.cmd.is_some()
    }
}

/// The hierarchy of named commands. Nodes live in an arena and are addressed by `NodeId`.
#[derive(Debug)]
pub struct CmdTree {
    nodes: Vec<CmdNode>,
}

impl Default for CmdTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CmdTree {
    /// An empty tree holding only the unnamed root.
    pub fn new() -> Self {
        Self {
            nodes: vec![CmdNode::new("", None, &[])],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    // NodeIds are only minted by `add_sub` on this tree.
    #[allow(clippy::indexing_slicing)]
    pub fn node(&self, id: NodeId) -> &CmdNode {
        &self.nodes[id.0]
    }

    #[allow(clippy::indexing_slicing)]
    fn node_mut(&mut self, id: NodeId) -> &mut CmdNode {
        &mut self.nodes[id.0]
    }

    /// Adds a named child under `parent`.
    ///
    /// # Errors
    /// Fails when the name is malformed, already used by a sibling, or when the name
    /// or any abbreviation is already taken among the siblings.
    pub fn add_sub(
        &mut self,
        parent: NodeId,
        name: &str,
        abbrs: &[&str],
    ) -> Result<NodeId, RegistrationError> {
        let owner = self.display_path(parent);
        let id = NodeId(self.nodes.len());
        let parent_node = self.node_mut(parent);
        abbrs::register_names(
            &mut parent_node.sub_abbrs,
            NameKind::Command,
            &owner,
            name,
            abbrs,
        )?;
        parent_node.children.push(id);
        parent_node.child_ids.insert(name.to_string(), id);
        self.nodes.push(CmdNode::new(name, Some(parent), abbrs));
        log::debug!("Registered command '{}'.", self.display_path(id));
        Ok(id)
    }

    /// Attaches a normal executable to `node`.
    pub fn reg_cmd<F>(
        &mut self,
        node: NodeId,
        help: &str,
        f: F,
    ) -> Result<&mut Cmd, RegistrationError>
    where
        F: Fn(&ArgVals, &Env) -> Result<bool> + 'static,
    {
        self.attach(node, help, CmdKind::Normal(Rc::new(f)))
    }

    /// Attaches a power executable, which may rewrite the plan being executed.
    pub fn reg_power_cmd<F>(
        &mut self,
        node: NodeId,
        help: &str,
        f: F,
    ) -> Result<&mut Cmd, RegistrationError>
    where
        F: Fn(&ArgVals, &Env, &mut Plan, &mut usize) -> Result<bool> + 'static,
    {
        self.attach(node, help, CmdKind::Power(Rc::new(f)))
    }

    /// Attaches a setup executable, which may register further commands on the tree.
    pub fn reg_setup_cmd<F>(
        &mut self,
        node: NodeId,
        help: &str,
        f: F,
    ) -> Result<&mut Cmd, RegistrationError>
    where
        F: Fn(&ArgVals, &Env, &mut CmdTree) -> Result<bool> + 'static,
    {
        self.attach(node, help, CmdKind::Setup(Rc::new(f)))
    }

    /// Attaches an external command line, run as a child process.
    pub fn reg_external_cmd(
        &mut self,
        node: NodeId,
        help: &str,
        command_line: &str,
    ) -> Result<&mut Cmd, RegistrationError> {
        self.attach(node, help, CmdKind::External(command_line.to_string()))
    }

    fn attach(
        &mut self,
        node: NodeId,
        help: &str,
        kind: CmdKind,
    ) -> Result<&mut Cmd, RegistrationError> {
        let path = self.display_path(node);
        let slot = &mut self.node_mut(node).cmd;
        if slot.is_some() {
            return Err(RegistrationError::ExecutableExists { path });
        }
        Ok(slot.insert(Cmd {
            kind,
            help: help.to_string(),
            args: Args::default(),
            quiet: false,
            path,
        }))
    }

    /// Looks up a direct child of `node` by name or abbreviation.
    pub fn find_child(&self, node: NodeId, token: &str) -> Option<NodeId> {
        let parent = self.node(node);
        let canonical = parent.sub_abbrs.get(token)?;
        parent.child_ids.get(canonical).copied()
    }

    /// Follows a dotted path of names or abbreviations from the root.
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        path.split(CMD_PATH_SEP)
            .filter(|segment| !segment.is_empty())
            .try_fold(self.root(), |node, segment| self.find_child(node, segment))
    }

    /// Canonical names from the root (excluded) down to `id`.
    pub fn path_names(&self, id: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if node.parent.is_some() {
                names.push(node.name.as_str());
            }
            current = node.parent;
        }
        names.reverse();
        names
    }

    /// The dotted canonical path of `id`; the root displays as an empty string.
    pub fn display_path(&self, id: NodeId) -> String {
        self.path_names(id).join(CMD_PATH_SEP)
    }
}
