//! End-to-end behavior of parsing and running flows through the public API.

mod common;

use cmdflow::cli::builtins;
use cmdflow::constants::{ENV_KEY_BOOTSTRAP, ENV_KEY_STACK_DEPTH};
use cmdflow::core::abbrs::AbbrsIndex;
use cmdflow::core::cmd_tree::{ArgVals, CmdTree, RegistrationError};
use cmdflow::core::engine::{Engine, FlowError, ScriptRunner};
use cmdflow::core::env::Env;
use cmdflow::core::env_parser::ParseStage;
use cmdflow::core::sequence::SequenceBreaker;
use cmdflow::models::EnvLayerType;
use common::{Log, entries, recorder, toks};
use std::collections::BTreeMap;
use std::rc::Rc;

// --- Sequence breaking ---

#[test]
fn test_protected_separator_keeps_one_sequence() {
    let breaker = SequenceBreaker::default();
    let (seqs, _) = breaker.parse(&toks(&["HTTP://"]));
    assert_eq!(seqs, vec![toks(&["HTTP://"])]);

    let (seqs, _) = breaker.parse(&toks(&["aa:", "bb"]));
    assert_eq!(seqs, vec![toks(&["aa"]), toks(&["bb"])]);
}

#[test]
fn test_normalizing_twice_changes_nothing() {
    let breaker = SequenceBreaker::default();
    for input in [
        toks(&["x:y:z"]),
        toks(&["deploy", "{a=1}:", "ls"]),
        toks(&["HTTP://host:8080/", ":"]),
    ] {
        let once = breaker.normalize(&input);
        assert_eq!(breaker.normalize(&once), once, "input {input:?}");
    }
}

// --- Env blocks ---

#[test]
fn test_env_block_ignores_token_boundaries() {
    let mut engine = Engine::new(CmdTree::new());
    let expected: BTreeMap<String, String> = [("a", "A"), ("b", "B")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for script in [toks(&["{a=A", "b=B}"]), toks(&["{", "a=A", "b=B", "}"])] {
        let flow = engine.parse(&script).unwrap();
        let global = flow.global_env.expect("leading block is hoisted");
        assert_eq!(global.raw_map(), expected, "script {script:?}");
    }
}

#[test]
fn test_unclosed_block_is_a_bracket_error() {
    let mut engine = Engine::new(CmdTree::new());
    let err = engine.execute(&toks(&["{a=1"])).unwrap_err();
    assert!(matches!(err, FlowError::Parse(ref e) if e.stage == ParseStage::Bracket));
}

// --- Abbreviations ---

#[test]
fn test_abbreviation_expansion_is_a_fixed_point() {
    let mut tree = CmdTree::new();
    let deploy = tree.add_sub(tree.root(), "deploy", &["d"]).unwrap();
    tree.add_sub(deploy, "prod", &["p"]).unwrap();
    let index = AbbrsIndex::from_tree(&tree);

    let (expanded, ok) = index.try_match("d.p", ".");
    assert!(ok);
    assert_eq!(expanded, "deploy.prod");
    assert_eq!(index.try_match(&expanded, "."), (expanded.clone(), true));

    assert_eq!(index.try_match("d.zz", "."), ("d.zz".to_string(), false));
}

// --- Env chain ---

#[test]
fn test_session_values_show_through_command_layers() {
    let session = Env::new_session_chain();
    session.set("k", "1");
    let cmd = session.new_layer(EnvLayerType::CmdArg);
    assert_eq!(cmd.get("k").as_deref(), Some("1"));

    cmd.delete_ext("k", EnvLayerType::Default);
    assert_eq!(cmd.get("k").as_deref(), Some("1"));

    session.get_layer(EnvLayerType::Default).unwrap().set("k", "d");
    session.get_layer(EnvLayerType::Persisted).unwrap().set("k", "p");
    cmd.delete("k");
    assert_eq!(cmd.get("k"), None);
    assert_eq!(session.flatten().get("k"), None);
}

#[test]
fn test_delete_marks_in_scripts() {
    let mut engine = Engine::new(CmdTree::new());
    let default = engine.env().get_layer(EnvLayerType::Default).unwrap();
    default.set("k", "d");
    engine.env().set("k", "s");

    engine.execute(&toks(&["{k=--}"])).unwrap();
    assert_eq!(engine.env().get("k").as_deref(), Some("d"));

    engine.execute(&toks(&["{k=---}"])).unwrap();
    assert_eq!(engine.env().get("k"), None);
}

// --- Registration ---

#[test]
fn test_registration_rejects_collisions_atomically() {
    let mut tree = CmdTree::new();
    let root = tree.root();
    tree.add_sub(root, "deploy", &["d"]).unwrap();

    let err = tree.add_sub(root, "deploy", &[]).unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicateName { .. }));

    let err = tree.add_sub(root, "delete", &["dl", "d"]).unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicateAbbr { ref abbr, .. } if abbr == "d"));
    assert_eq!(tree.find_child(root, "dl"), None);
    assert_eq!(tree.find_child(root, "delete"), None);

    let err = tree.add_sub(root, "bad.name", &[]).unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidName { .. }));
}

// --- Execution ---

#[test]
fn test_args_and_ordering_across_sequences() {
    let log = Log::default();
    let mut tree = CmdTree::new();
    recorder(&mut tree, "X", &[("a", "0")], &log, true);
    recorder(&mut tree, "Y", &[], &log, true);
    let mut engine = Engine::new(tree);

    engine.execute(&toks(&["X{a=1}", ":", "Y"])).unwrap();
    assert_eq!(entries(&log), ["X:a=1", "Y:"]);

    engine.execute(&toks(&["X", "5", ":", "X"])).unwrap();
    assert_eq!(entries(&log), ["X:a=1", "Y:", "X:a=5", "X:a=0"]);
}

#[test]
fn test_flow_fails_when_any_command_fails() {
    let log = Log::default();
    let mut tree = CmdTree::new();
    recorder(&mut tree, "X", &[("a", "0")], &log, true);
    recorder(&mut tree, "Y", &[], &log, false);
    let mut engine = Engine::new(tree);

    let err = engine.execute(&toks(&["X{a=1}", ":", "Y"])).unwrap_err();
    assert!(matches!(err, FlowError::CommandFailed { ref path } if path == "Y"));
    assert_eq!(entries(&log), ["X:a=1", "Y:"]);
}

#[test]
fn test_fail_fast_skips_the_rest() {
    let log = Log::default();
    let mut tree = CmdTree::new();
    recorder(&mut tree, "a", &[], &log, true);
    recorder(&mut tree, "b", &[], &log, false);
    recorder(&mut tree, "c", &[], &log, true);
    let mut engine = Engine::new(tree);

    assert!(engine.execute(&toks(&["a", ":", "b", ":", "c"])).is_err());
    assert_eq!(entries(&log), ["a:", "b:"]);
}

#[test]
fn test_unknown_command_is_a_path_error() {
    let mut engine = Engine::new(CmdTree::new());
    let err = engine.execute(&toks(&["nope"])).unwrap_err();
    let FlowError::Parse(parse) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(parse.stage, ParseStage::CmdPath);
    assert_eq!(parse.tokens, toks(&["nope"]));
}

#[test]
fn test_global_keys_expand_to_argument_paths() {
    let log = Log::default();
    let mut tree = CmdTree::new();
    let deploy = tree.add_sub(tree.root(), "deploy", &["d"]).unwrap();
    let prod = tree.add_sub(deploy, "prod", &["p"]).unwrap();
    let sink = Rc::clone(&log);
    tree.reg_cmd(prod, "", move |args, _env| {
        sink.borrow_mut().push(format!("region={}", args.get("region")));
        Ok(true)
    })
    .unwrap()
    .add_arg("region", "eu", &["r"])
    .unwrap();
    let mut engine = Engine::new(tree);

    engine.execute(&toks(&["{d.p.r=us}", ":", "d.p"])).unwrap();
    assert_eq!(entries(&log), ["region=us"]);
    assert_eq!(
        engine.env().get_own("deploy.prod.region").as_deref(),
        Some("us")
    );
}

#[test]
fn test_power_command_replans_from_itself() {
    let log = Log::default();
    let mut tree = CmdTree::new();
    recorder(&mut tree, "A", &[], &log, true);
    recorder(&mut tree, "C", &[], &log, true);
    let p = tree.add_sub(tree.root(), "P", &[]).unwrap();
    let plog = Rc::clone(&log);
    tree.reg_power_cmd(p, "", move |_, _, plan, cursor| {
        plog.borrow_mut().push(format!("P@{cursor}/{}", plan.len()));
        plan.drain(..*cursor);
        *cursor = 0;
        Ok(true)
    })
    .unwrap();
    let mut engine = Engine::new(tree);

    engine.execute(&toks(&["A", ":", "P", ":", "C"])).unwrap();
    assert_eq!(entries(&log), ["A:", "P@1/3", "C:"]);
}

#[test]
fn test_bootstrap_phases_run_first_at_depth_zero() {
    let log = Log::default();
    let mut tree = CmdTree::new();
    let mark = tree.add_sub(tree.root(), "mark", &[]).unwrap();
    let sink = Rc::clone(&log);
    tree.reg_cmd(mark, "", move |args, env| {
        let depth = env.get_int(ENV_KEY_STACK_DEPTH)?;
        sink.borrow_mut().push(format!("{}@{depth}", args.get("tag")));
        Ok(true)
    })
    .unwrap()
    .add_arg("tag", "", &[])
    .unwrap();

    let mut engine = Engine::new(tree).with_bootstrap("mark tag=boot");
    engine.env().set(ENV_KEY_BOOTSTRAP, "mark tag=extra");
    engine.execute(&toks(&["mark", "tag=user"])).unwrap();

    assert_eq!(entries(&log), ["boot@0", "extra@0", "user@1"]);
    assert_eq!(engine.env().get_int(ENV_KEY_STACK_DEPTH), Ok(0));
}

#[test]
fn test_stack_depth_is_restored_after_failure() {
    let log = Log::default();
    let mut tree = CmdTree::new();
    recorder(&mut tree, "bad", &[], &log, false);
    let mut engine = Engine::new(tree);
    assert!(engine.execute(&toks(&["bad"])).is_err());
    assert_eq!(engine.env().get_int(ENV_KEY_STACK_DEPTH), Ok(0));
}

/// Captures what an external executable would have been handed.
#[derive(Debug, Default)]
struct StubRunner {
    calls: Log,
}

impl ScriptRunner for StubRunner {
    fn run(&self, command_line: &str, args: &ArgVals, env: &Env) -> anyhow::Result<bool> {
        self.calls.borrow_mut().push(format!(
            "{command_line} target={} layer={}",
            args.get("target"),
            env.layer_type()
        ));
        Ok(args.get("target") != "broken")
    }
}

#[test]
fn test_external_commands_go_through_the_runner() {
    let calls = Log::default();
    let mut tree = CmdTree::new();
    let ship = tree.add_sub(tree.root(), "ship", &["s"]).unwrap();
    tree.reg_external_cmd(ship, "Ship it.", "./ship.sh")
        .unwrap()
        .add_arg("target", "staging", &["t"])
        .unwrap();
    let mut engine = Engine::new(tree).with_script_runner(StubRunner {
        calls: Rc::clone(&calls),
    });

    engine.execute(&toks(&["s", "t=prod", ":", "ship"])).unwrap();
    assert_eq!(
        entries(&calls),
        [
            "./ship.sh target=prod layer=cmd",
            "./ship.sh target=staging layer=cmd"
        ]
    );

    let err = engine.execute(&toks(&["ship{t=broken}"])).unwrap_err();
    assert!(matches!(err, FlowError::CommandFailed { ref path } if path == "ship"));
}

#[test]
fn test_bootstrap_can_define_commands_for_the_user_script() {
    let calls = Log::default();
    let mut tree = CmdTree::new();
    builtins::register(&mut tree).unwrap();
    let mut engine = Engine::new(tree)
        .with_script_runner(StubRunner {
            calls: Rc::clone(&calls),
        })
        .with_bootstrap("flow.def deploy './deploy.sh --fast' dp");

    engine.execute(&toks(&["dp"])).unwrap();
    assert_eq!(entries(&calls), ["./deploy.sh --fast target= layer=cmd"]);
}
