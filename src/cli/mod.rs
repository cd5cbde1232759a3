// src/cli/mod.rs

use clap::Parser;
use std::path::PathBuf;

pub mod builtins;

/// cmdflow: chain hierarchical, abbreviable commands inside a layered key/value env.
///
/// A script is a list of commands separated by `:`. Each command is a dotted path
/// through the command tree (`env.ls`, `e.list`, `e list`), optionally followed by
/// its arguments, either positional (`sleep 2`), as pairs (`sleep s 2`) or as
/// assignments (`sleep secs=2`). An env block `{key=value ...}` can be attached to
/// any command (`echo{msg=hi}`); a leading block applies to the whole script.
///
/// Examples:
/// - `cmdflow echo hello : sleep 0.5 : echo done`
/// - `cmdflow {greeting=hi} : env.ls`
/// - `cmdflow flow.skip 1 : fail : echo "fail was skipped"`
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Read configuration from this file instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the registered command tree and exit.
    #[arg(short, long)]
    pub list: bool,

    /// Do not announce each command as it starts.
    #[arg(short, long)]
    pub quiet: bool,

    /// The script to run.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub script: Vec<String>,
}
