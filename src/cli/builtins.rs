// src/cli/builtins.rs

use crate::constants::{CMD_PATH_SEP, ENV_KEY_ENV_FILE, ENV_SYS_PREFIX};
use crate::core::cmd_tree::{ArgVals, CmdTree, NameKind, RegistrationError};
use crate::core::env::Env;
use crate::models::{EnvLayerType, NodeId, Plan};
use crate::system::persist;
use anyhow::{Context, Result, anyhow, bail};
use colored::*;
use std::path::Path;
use std::thread;
use std::time::Duration;

// --- Builtin Definition and Registry ---

type NormalHandler = fn(&ArgVals, &Env) -> Result<bool>;
type PowerHandler = fn(&ArgVals, &Env, &mut Plan, &mut usize) -> Result<bool>;
type SetupHandler = fn(&ArgVals, &Env, &mut CmdTree) -> Result<bool>;

enum Handler {
    Normal(NormalHandler),
    Power(PowerHandler),
    Setup(SetupHandler),
}

struct ArgDef {
    name: &'static str,
    default: &'static str,
    abbrs: &'static [&'static str],
}

/// A builtin command: where it lives in the tree, how it is invoked, and its arguments.
struct BuiltinDef {
    path: &'static str,
    abbrs: &'static [&'static str],
    help: &'static str,
    args: &'static [ArgDef],
    quiet: bool,
    handler: Handler,
}

/// Namespaces holding builtins, with their abbreviations.
static NAMESPACES: &[(&str, &[&str])] = &[("env", &["e"]), ("flow", &["f"])];

static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        path: "dummy",
        abbrs: &["dmy"],
        help: "Do nothing and succeed.",
        args: &[],
        quiet: true,
        handler: Handler::Normal(dummy),
    },
    BuiltinDef {
        path: "echo",
        abbrs: &["say"],
        help: "Print a message.",
        args: &[ArgDef {
            name: "message",
            default: "",
            abbrs: &["msg", "m"],
        }],
        quiet: true,
        handler: Handler::Normal(echo),
    },
    BuiltinDef {
        path: "sleep",
        abbrs: &["slp"],
        help: "Block for a number of seconds.",
        args: &[ArgDef {
            name: "secs",
            default: "1",
            abbrs: &["s"],
        }],
        quiet: false,
        handler: Handler::Normal(sleep),
    },
    BuiltinDef {
        path: "fail",
        abbrs: &[],
        help: "Always fail.",
        args: &[],
        quiet: false,
        handler: Handler::Normal(fail),
    },
    BuiltinDef {
        path: "env.ls",
        abbrs: &["list"],
        help: "Print every visible env key.",
        args: &[],
        quiet: true,
        handler: Handler::Normal(env_ls),
    },
    BuiltinDef {
        path: "env.save",
        abbrs: &["persist"],
        help: "Persist the session env so later runs see it.",
        args: &[],
        quiet: false,
        handler: Handler::Normal(env_save),
    },
    BuiltinDef {
        path: "flow.skip",
        abbrs: &["sk"],
        help: "Drop the next commands of the flow.",
        args: &[ArgDef {
            name: "count",
            default: "1",
            abbrs: &["c"],
        }],
        quiet: true,
        handler: Handler::Power(flow_skip),
    },
    BuiltinDef {
        path: "flow.stop",
        abbrs: &["halt"],
        help: "End the flow successfully, dropping everything after it.",
        args: &[],
        quiet: true,
        handler: Handler::Power(flow_stop),
    },
    BuiltinDef {
        path: "flow.def",
        abbrs: &["define"],
        help: "Register a top-level command running an external command line.",
        args: &[
            ArgDef {
                name: "name",
                default: "",
                abbrs: &["n"],
            },
            ArgDef {
                name: "script",
                default: "",
                abbrs: &["s"],
            },
            ArgDef {
                name: "abbr",
                default: "",
                abbrs: &["a"],
            },
        ],
        quiet: true,
        handler: Handler::Setup(flow_def),
    },
];

/// Registers the namespaces and every builtin on `tree`.
pub fn register(tree: &mut CmdTree) -> Result<(), RegistrationError> {
    for (name, abbrs) in NAMESPACES {
        tree.add_sub(tree.root(), name, abbrs)?;
    }
    for def in BUILTINS {
        let node = add_path(tree, def.path, def.abbrs)?;
        let cmd = match def.handler {
            Handler::Normal(f) => tree.reg_cmd(node, def.help, f)?,
            Handler::Power(f) => tree.reg_power_cmd(node, def.help, f)?,
            Handler::Setup(f) => tree.reg_setup_cmd(node, def.help, f)?,
        };
        for arg in def.args {
            cmd.add_arg(arg.name, arg.default, arg.abbrs)?;
        }
        if def.quiet {
            cmd.set_quiet();
        }
    }
    Ok(())
}

/// Finds the parent of `path` and adds its last segment under it.
fn add_path(
    tree: &mut CmdTree,
    path: &str,
    abbrs: &[&str],
) -> Result<NodeId, RegistrationError> {
    let (parent, name) = match path.rsplit_once(CMD_PATH_SEP) {
        Some((parent_path, name)) => {
            let parent = tree.find_path(parent_path).ok_or_else(|| {
                RegistrationError::InvalidName {
                    kind: NameKind::Command,
                    name: path.to_string(),
                }
            })?;
            (parent, name)
        }
        None => (tree.root(), path),
    };
    tree.add_sub(parent, name, abbrs)
}

// --- Handlers ---

fn dummy(_args: &ArgVals, _env: &Env) -> Result<bool> {
    println!("dummy cmd here");
    Ok(true)
}

fn echo(args: &ArgVals, _env: &Env) -> Result<bool> {
    println!("{}", args.get("message"));
    Ok(true)
}

fn sleep(args: &ArgVals, _env: &Env) -> Result<bool> {
    let raw = args.get("secs");
    let secs: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("'{raw}' is not a number of seconds"))?;
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow!("'{raw}' is not a valid duration: {e}"))?;
    log::debug!("Sleeping for {duration:?}");
    thread::sleep(duration);
    Ok(true)
}

fn fail(_args: &ArgVals, _env: &Env) -> Result<bool> {
    Ok(false)
}

fn env_ls(_args: &ArgVals, env: &Env) -> Result<bool> {
    let flat = env.flatten();
    if flat.is_empty() {
        println!("{}", "(env is empty)".dimmed());
    }
    for (key, value) in flat {
        println!("{} = {}", key.cyan(), value);
    }
    Ok(true)
}

/// Copies the session layer into the persisted layer and writes it to disk.
fn env_save(_args: &ArgVals, env: &Env) -> Result<bool> {
    let session = env
        .get_layer(EnvLayerType::Session)
        .ok_or_else(|| anyhow!("no session env layer"))?;
    let persisted = env
        .get_layer(EnvLayerType::Persisted)
        .ok_or_else(|| anyhow!("no persisted env layer"))?;
    let target = env
        .get(ENV_KEY_ENV_FILE)
        .ok_or_else(|| anyhow!("'{ENV_KEY_ENV_FILE}' is not set, nowhere to save to"))?;

    for (key, value) in session.own_pairs() {
        if key.starts_with(ENV_SYS_PREFIX) {
            continue;
        }
        persisted.set(&key, &value);
    }
    let saved = persist::save_from(Path::new(&target), &persisted)?;
    println!("Saved {saved} key(s) to {}", target.green());
    Ok(true)
}

fn flow_skip(args: &ArgVals, _env: &Env, plan: &mut Plan, cursor: &mut usize) -> Result<bool> {
    let count = usize::try_from(args.get_int("count")?)
        .map_err(|_| anyhow!("skip count must not be negative"))?;
    let start = (*cursor + 1).min(plan.len());
    let end = start.saturating_add(count).min(plan.len());
    let dropped: Vec<String> = plan.drain(start..end).map(|cmd| cmd.display_path()).collect();
    log::debug!("Skipping {dropped:?}");
    Ok(true)
}

fn flow_stop(_args: &ArgVals, _env: &Env, plan: &mut Plan, cursor: &mut usize) -> Result<bool> {
    let left = plan.len().saturating_sub(*cursor + 1);
    log::debug!("Stopping flow with {left} command(s) left.");
    *cursor = plan.len();
    Ok(true)
}

/// Registers `name` under the root. `abbr` holds comma-separated abbreviations.
fn flow_def(args: &ArgVals, _env: &Env, tree: &mut CmdTree) -> Result<bool> {
    let name = args.get("name");
    let script = args.get("script").trim();
    if script.is_empty() {
        bail!("no command line given for '{name}'");
    }
    let abbrs: Vec<&str> = args
        .get("abbr")
        .split(',')
        .map(str::trim)
        .filter(|abbr| !abbr.is_empty())
        .collect();

    let node = tree.add_sub(tree.root(), name, &abbrs)?;
    tree.reg_external_cmd(node, &format!("Runs `{script}`."), script)?;
    log::debug!("Defined '{name}' as `{script}`");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cmd_tree::CmdKind;
    use crate::core::engine::{Engine, FlowError};

    fn toks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn engine() -> Engine {
        let mut tree = CmdTree::new();
        register(&mut tree).unwrap();
        Engine::new(tree)
    }

    #[test]
    fn test_builtins_register_cleanly() {
        let mut tree = CmdTree::new();
        register(&mut tree).unwrap();
        assert!(tree.find_path("e.list").is_some());
        assert!(tree.find_path("f.sk").is_some());
        assert!(register(&mut tree).is_err());
    }

    #[test]
    fn test_skip_drops_the_failing_command() {
        let mut engine = engine();
        engine
            .execute(&toks(&["flow.skip", ":", "fail", ":", "dummy"]))
            .unwrap();
        engine
            .execute(&toks(&["f.sk", "c=2", ":", "fail", ":", "fail", ":", "dmy"]))
            .unwrap();
    }

    #[test]
    fn test_def_registers_a_command_for_later_phases() {
        let mut engine = engine();
        engine
            .execute(&toks(&["flow.def", "greet", "echo hi", "g,hi"]))
            .unwrap();
        let greet = engine.tree().find_path("g").unwrap();
        assert_eq!(engine.tree().find_path("hi"), Some(greet));
        let cmd = engine.tree().node(greet).cmd().unwrap();
        assert!(matches!(cmd.kind(), CmdKind::External(line) if line == "echo hi"));

        let err = engine
            .execute(&toks(&["f.define", "n=greet", "s=true"]))
            .unwrap_err();
        assert!(matches!(err, FlowError::CommandError { .. }));
        assert!(engine.execute(&toks(&["f.define", "other"])).is_err());
    }

    #[test]
    fn test_stop_ends_the_flow() {
        let mut engine = engine();
        engine.execute(&toks(&["f.halt", ":", "fail"])).unwrap();
    }

    #[test]
    fn test_fail_fails() {
        let mut engine = engine();
        let err = engine.execute(&toks(&["dummy", ":", "fail"])).unwrap_err();
        assert!(matches!(err, FlowError::CommandFailed { ref path } if path == "fail"));
    }

    #[test]
    fn test_sleep_rejects_garbage() {
        let mut engine = engine();
        assert!(engine.execute(&toks(&["sleep", "soon"])).is_err());
        assert!(engine.execute(&toks(&["sleep", "-1"])).is_err());
        engine.execute(&toks(&["slp", "s=0"])).unwrap();
    }

    #[test]
    fn test_env_save_writes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("env.toml");
        let mut engine = engine();
        engine.env().set(ENV_KEY_ENV_FILE, &file.display().to_string());
        engine
            .execute(&toks(&["{deploy.region=us}", ":", "env.save"]))
            .unwrap();

        let reloaded = Env::new(EnvLayerType::Persisted);
        persist::load_into(&file, &reloaded).unwrap();
        assert_eq!(reloaded.get_own("deploy.region").as_deref(), Some("us"));
        assert_eq!(reloaded.get_own(ENV_KEY_ENV_FILE), None);
    }
}
