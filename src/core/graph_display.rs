// src/core/graph_display.rs

use crate::core::cmd_tree::{Cmd, CmdKind, CmdTree};
use crate::models::NodeId;

/// Prints an ASCII tree of every registered command.
pub fn display_cmd_tree(tree: &CmdTree) {
    if tree.is_empty() {
        println!("\nNo commands registered.");
        return;
    }
    println!("\nRegistered Commands:");
    print!("{}", render_cmd_tree(tree));
}

/// Renders the tree below the root, one node per line.
pub fn render_cmd_tree(tree: &CmdTree) -> String {
    let mut out = String::new();
    let roots = tree.node(tree.root()).children();
    for (i, &child) in roots.iter().enumerate() {
        let is_last = i + 1 == roots.len();
        render_node(tree, child, "", is_last, &mut out);
    }
    out
}

/// Recursive function to render a node and its descendants.
fn render_node(tree: &CmdTree, id: NodeId, prefix: &str, is_last: bool, out: &mut String) {
    let node = tree.node(id);
    let connector = if is_last { "└─" } else { "├─" };

    let abbrs = if node.abbrs().is_empty() {
        String::new()
    } else {
        format!(" [{}]", node.abbrs().join("|"))
    };
    let details = node.cmd().map(describe_cmd).unwrap_or_default();

    out.push_str(&format!("{prefix}{connector}{}{abbrs}{details}\n", node.name()));

    // Prepare the prefix for the children of this node
    let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });

    let children = node.children();
    for (i, &child) in children.iter().enumerate() {
        let is_last_child = i + 1 == children.len();
        render_node(tree, child, &child_prefix, is_last_child, out);
    }
}

fn describe_cmd(cmd: &Cmd) -> String {
    let marker = match cmd.kind() {
        CmdKind::Normal(_) => "",
        CmdKind::Power(_) => " (power)",
        CmdKind::Setup(_) => " (setup)",
        CmdKind::External(_) => " (external)",
    };
    let args: Vec<String> = cmd
        .args()
        .names()
        .map(|name| format!("{name}={}", cmd.args().default_value(name).unwrap_or_default()))
        .collect();
    let args = if args.is_empty() {
        String::new()
    } else {
        format!(" ({})", args.join(", "))
    };
    let help = if cmd.help().is_empty() {
        String::new()
    } else {
        format!(" - {}", cmd.help())
    };
    format!("{marker}{args}{help}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_shows_structure_abbrs_and_args() {
        let mut tree = CmdTree::new();
        let root = tree.root();
        let env = tree.add_sub(root, "env", &["e"]).unwrap();
        let ls = tree.add_sub(env, "ls", &["list"]).unwrap();
        tree.reg_cmd(ls, "list env", |_, _| Ok(true)).unwrap();
        let sleep = tree.add_sub(root, "sleep", &[]).unwrap();
        tree.reg_cmd(sleep, "", |_, _| Ok(true))
            .unwrap()
            .add_arg("secs", "1", &["s"])
            .unwrap();

        let rendered = render_cmd_tree(&tree);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            [
                "├─env [e]",
                "│  └─ls [list] - list env",
                "└─sleep (secs=1)",
            ]
        );
    }
}
