// src/bin/cmdflow.rs

use anyhow::Result;
use clap::Parser;
use cmdflow::{
    cli::{Cli, builtins},
    constants::ENV_KEY_ENV_FILE,
    core::{
        cmd_tree::CmdTree,
        engine::Engine,
        env::Env,
        graph_display,
        reporter::ConsoleReporter,
    },
    models::EnvLayerType,
    system::{config::AppConfig, persist},
};
use colored::*;

/// The main entry point of the `cmdflow` application.
/// It sets up logging, parses arguments, runs the script,
/// and performs centralized error handling.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Loads configuration and the persisted env, registers the builtins, then runs the script.
fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let config = AppConfig::load(cli.config.as_deref())?;

    let mut tree = CmdTree::new();
    builtins::register(&mut tree)?;

    if cli.list {
        graph_display::display_cmd_tree(&tree);
        return Ok(());
    }

    if cli.script.is_empty() {
        println!("Nothing to run. Use `cmdflow --list` to see the available commands.");
        return Ok(());
    }

    // --- Env chain: default <- persisted <- session ---
    let session = Env::new_session_chain();
    config.apply_defaults(&session);

    let env_file = config.env_file_path()?;
    if let Some(persisted) = session.get_layer(EnvLayerType::Persisted) {
        persist::load_into(&env_file, &persisted)?;
    }
    session.set(ENV_KEY_ENV_FILE, &env_file.display().to_string());

    let mut engine = Engine::with_env(tree, session).with_bootstrap(config.bootstrap.clone());
    if !(cli.quiet || config.quiet) {
        engine = engine.with_reporter(ConsoleReporter::default());
    }

    engine.execute(&cli.script)?;
    Ok(())
}
