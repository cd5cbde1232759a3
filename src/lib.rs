//! # cmdflow
//!
//! A command-flow interpreter. A script is broken into sequences on `:`, each sequence
//! is walked down a tree of abbreviable commands, and the matched commands run one after
//! another inside a chained key/value environment (`default <- persisted <- session`,
//! plus a short-lived layer per command).
//!
//! - [`core`] holds the interpreter: tree, parsers, env and engine.
//! - [`system`] talks to the OS: config file, persisted env, child processes.
//! - [`cli`] is the command line front end and the builtin commands.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
