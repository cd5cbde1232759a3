//! Shared fixtures for the cmdflow integration tests.

use cmdflow::core::cmd_tree::CmdTree;
use std::cell::RefCell;
use std::rc::Rc;

/// Records every dispatch in order.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn toks(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Registers a root-level command `name` that logs `name:arg=value,...` and returns `ok`.
pub fn recorder(tree: &mut CmdTree, name: &str, args: &[(&str, &str)], log: &Log, ok: bool) {
    let node = tree.add_sub(tree.root(), name, &[]).unwrap();
    let log = Rc::clone(log);
    let label = name.to_string();
    let cmd = tree
        .reg_cmd(node, "", move |args, _env| {
            let rendered: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
            log.borrow_mut().push(format!("{label}:{}", rendered.join(",")));
            Ok(ok)
        })
        .unwrap();
    for (arg, default) in args {
        cmd.add_arg(arg, default, &[]).unwrap();
    }
}

/// Snapshot of the log.
#[allow(dead_code)]
pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}
