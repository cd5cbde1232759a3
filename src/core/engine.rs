// src/core/engine.rs

use crate::constants::{CMD_PATH_SEP, ENV_KEY_BOOTSTRAP, ENV_KEY_STACK_DEPTH};
use crate::core::abbrs::AbbrsIndex;
use crate::core::cmd_tree::{ArgVals, Args, CmdKind, CmdTree};
use crate::core::env::{self, Env, EnvError};
use crate::core::env_parser::ParseError;
use crate::core::path_parser::FlowParser;
use crate::core::reporter::{DispatchEvent, NullReporter, ReportPhase, Reporter};
use crate::models::{EnvLayerType, ParsedCmd, ParsedEnv, ParsedFlow, Plan};
use crate::system::executor::ProcessRunner;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Command '{path}' failed.")]
    CommandFailed { path: String },

    #[error("Command '{path}' failed: {cause:#}")]
    CommandError { path: String, cause: anyhow::Error },

    #[error("Could not split script text into tokens: {0}")]
    Tokenize(String),
}

/// Runs the command line of an `External` executable.
pub trait ScriptRunner: fmt::Debug {
    /// Returns whether the script succeeded. `env` is the per-invocation env.
    fn run(&self, command_line: &str, args: &ArgVals, env: &Env) -> anyhow::Result<bool>;
}

/// Owns the command tree and the session env, and executes scripts against them.
#[derive(Debug)]
pub struct Engine {
    tree: CmdTree,
    index: AbbrsIndex,
    parser: FlowParser,
    env: Env,
    bootstrap: String,
    reporter: Box<dyn Reporter>,
    runner: Box<dyn ScriptRunner>,
}

impl Engine {
    /// An engine over `tree` with a fresh `Default <- Persisted <- Session` chain.
    pub fn new(tree: CmdTree) -> Self {
        Self::with_env(tree, Env::new_session_chain())
    }

    /// An engine over `tree` using `env` as its session layer.
    pub fn with_env(tree: CmdTree, env: Env) -> Self {
        let index = AbbrsIndex::from_tree(&tree);
        Self {
            tree,
            index,
            parser: FlowParser::default(),
            env,
            bootstrap: String::new(),
            reporter: Box::new(NullReporter),
            runner: Box::new(ProcessRunner::default()),
        }
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn with_script_runner(mut self, runner: impl ScriptRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Script text run before every user script, split with shell quoting rules.
    pub fn with_bootstrap(mut self, script: impl Into<String>) -> Self {
        self.bootstrap = script.into();
        self
    }

    pub fn tree(&self) -> &CmdTree {
        &self.tree
    }

    /// Registering through this handle is picked up by the next parse.
    pub fn tree_mut(&mut self) -> &mut CmdTree {
        &mut self.tree
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    fn session(&self) -> Env {
        self.env
            .get_layer(EnvLayerType::Session)
            .unwrap_or_else(|| self.env.clone())
    }

    /// Parses `tokens` against the current shape of the tree, so commands registered
    /// by an earlier phase are visible by name and abbreviation.
    pub fn parse(&mut self, tokens: &[String]) -> Result<ParsedFlow, ParseError> {
        self.index = AbbrsIndex::from_tree(&self.tree);
        log::debug!(
            "Rebuilt abbreviation index over {} command node(s).",
            self.tree.len().saturating_sub(1)
        );
        self.parser.parse(&self.tree, &self.index, tokens)
    }

    /// Runs the user script after the bootstrap phases.
    pub fn execute(&mut self, script: &[String]) -> Result<(), FlowError> {
        self.execute_with_env(script, None)
    }

    /// Like `execute`, first merging `extra` into the session layer.
    ///
    /// Phases run in order: the fixed bootstrap, the session `bootstrap` key, then the
    /// user script with the session stack depth raised by one for its duration.
    pub fn execute_with_env(
        &mut self,
        script: &[String],
        extra: Option<&ParsedEnv>,
    ) -> Result<(), FlowError> {
        let session = self.session();
        if let Some(extra) = extra {
            extra.write_to(&session);
        }

        let bootstrap = self.bootstrap.clone();
        self.run_text(&bootstrap)?;

        if let Some(text) = session.get(ENV_KEY_BOOTSTRAP)
            && !text.trim().is_empty()
        {
            log::debug!("Running extra bootstrap: {text}");
            self.run_text(&text)?;
        }

        adjust_stack_depth(&session, 1)?;
        let guard = scopeguard::guard(session, |session| {
            if let Err(e) = adjust_stack_depth(&session, -1) {
                log::warn!("Could not restore {ENV_KEY_STACK_DEPTH}: {e}");
            }
        });
        let result = self.run_tokens(script);
        drop(guard);
        result
    }

    fn run_text(&mut self, text: &str) -> Result<(), FlowError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let tokens = shlex::split(text).ok_or_else(|| FlowError::Tokenize(text.to_string()))?;
        self.run_tokens(&tokens)
    }

    /// Parses and runs one phase.
    pub fn run_tokens(&mut self, tokens: &[String]) -> Result<(), FlowError> {
        let flow = self.parse(tokens)?;
        self.run_flow(flow)
    }

    /// Runs an already parsed flow.
    ///
    /// # Errors
    /// Stops at the first command that fails or errors.
    pub fn run_flow(&mut self, flow: ParsedFlow) -> Result<(), FlowError> {
        if let Some(global) = &flow.global_env {
            global.write_to(&self.session());
        }
        let plan: Plan = flow
            .cmds
            .into_iter()
            .filter(|cmd| self.is_runnable(cmd))
            .collect();
        self.run_plan(plan)
    }

    fn is_runnable(&self, cmd: &ParsedCmd) -> bool {
        cmd.leaf()
            .is_some_and(|leaf| self.tree.node(leaf.node).has_executable())
    }

    fn run_plan(&mut self, mut plan: Plan) -> Result<(), FlowError> {
        let session = self.session();
        let mut cursor = 0;

        while let Some(parsed) = plan.get(cursor) {
            let Some(cmd) = parsed
                .leaf()
                .and_then(|leaf| self.tree.node(leaf.node).cmd())
                .cloned()
            else {
                log::debug!("Skipping '{}': nothing to run.", parsed.display_path());
                cursor += 1;
                continue;
            };
            let path = parsed.display_path();

            let cmd_env = session.new_layer(EnvLayerType::CmdArg);
            for env in parsed.segments.iter().filter_map(|seg| seg.env.as_ref()) {
                env.write_to(&cmd_env);
            }
            let args = resolve_args(cmd.args(), &path, &cmd_env);
            log::debug!("Dispatching '{path}' with args {args:?}");

            self.notify(
                ReportPhase::Before,
                &path,
                cmd.is_quiet(),
                &cmd_env,
                None,
                Duration::ZERO,
                &plan,
                cursor,
            );
            let started = Instant::now();
            let outcome = match cmd.kind() {
                CmdKind::Normal(f) => f(&args, &cmd_env),
                CmdKind::Power(f) => f(&args, &cmd_env, &mut plan, &mut cursor),
                CmdKind::Setup(f) => f(&args, &cmd_env, &mut self.tree),
                CmdKind::External(line) => self.runner.run(line, &args, &cmd_env),
            };
            let elapsed = started.elapsed();
            let success = matches!(outcome, Ok(true));
            log::debug!("'{path}' finished in {elapsed:?}, success: {success}");
            self.notify(
                ReportPhase::After,
                &path,
                cmd.is_quiet(),
                &cmd_env,
                Some(success),
                elapsed,
                &plan,
                cursor,
            );

            match outcome {
                Ok(true) => {}
                Ok(false) => return Err(FlowError::CommandFailed { path }),
                Err(cause) => return Err(FlowError::CommandError { path, cause }),
            }
            cursor += 1;
        }
        Ok(())
    }

    fn notify(
        &mut self,
        phase: ReportPhase,
        path: &str,
        quiet: bool,
        env: &Env,
        success: Option<bool>,
        elapsed: Duration,
        plan: &[ParsedCmd],
        cursor: usize,
    ) {
        self.reporter.notify(&DispatchEvent {
            phase,
            path,
            quiet,
            env,
            success,
            elapsed,
            plan,
            cursor,
        });
    }
}

/// Looks up `{path}.{arg}` for every declared arg, falling back to its default.
fn resolve_args(args: &Args, path: &str, env: &Env) -> ArgVals {
    let mut vals = ArgVals::new();
    for name in args.names() {
        let key = format!("{path}{CMD_PATH_SEP}{name}");
        let value = env
            .get(&key)
            .or_else(|| args.default_value(name).map(str::to_string))
            .unwrap_or_default();
        vals.insert(name, value);
    }
    vals
}

/// Stack depth lives on the session layer itself, never on an ancestor.
fn adjust_stack_depth(session: &Env, delta: i64) -> Result<i64, EnvError> {
    let current = match session.get_own(ENV_KEY_STACK_DEPTH) {
        Some(raw) => env::parse_int(ENV_KEY_STACK_DEPTH, &raw)?,
        None => 0,
    };
    let updated = current + delta;
    session.set_int(ENV_KEY_STACK_DEPTH, updated);
    Ok(updated)
}
