// src/core/abbrs.rs

use crate::core::cmd_tree::{CmdTree, NameKind, RegistrationError};
use crate::models::NodeId;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

lazy_static! {
    // Names may not contain path separators, whitespace, brackets, '=' or ':'.
    static ref NAME_RE: Regex = Regex::new(r"^[^\s./{}=:]+$").unwrap();
}

/// Checks that `name` can be used as a command or argument name (or abbreviation).
pub fn validate_name(kind: NameKind, name: &str) -> Result<(), RegistrationError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(RegistrationError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Registers `name` plus its abbreviations in a sibling map (`abbr -> canonical`).
///
/// The canonical name always maps to itself. Nothing is inserted when any check fails.
pub(crate) fn register_names(
    map: &mut HashMap<String, String>,
    kind: NameKind,
    owner: &str,
    name: &str,
    abbrs: &[&str],
) -> Result<(), RegistrationError> {
    validate_name(kind, name)?;
    if let Some(existing) = map.get(name) {
        return Err(if existing == name {
            RegistrationError::DuplicateName {
                kind,
                name: name.to_string(),
                owner: owner.to_string(),
            }
        } else {
            RegistrationError::DuplicateAbbr {
                kind,
                abbr: name.to_string(),
                name: name.to_string(),
                existing: existing.clone(),
                owner: owner.to_string(),
            }
        });
    }

    let mut seen = HashSet::new();
    for &abbr in abbrs.iter().filter(|&&abbr| abbr != name) {
        validate_name(kind, abbr)?;
        let taken_by = map
            .get(abbr)
            .cloned()
            .or_else(|| (!seen.insert(abbr)).then(|| name.to_string()));
        if let Some(existing) = taken_by {
            return Err(RegistrationError::DuplicateAbbr {
                kind,
                abbr: abbr.to_string(),
                name: name.to_string(),
                existing,
                owner: owner.to_string(),
            });
        }
    }

    map.insert(name.to_string(), name.to_string());
    for abbr in seen {
        map.insert(abbr.to_string(), name.to_string());
    }
    Ok(())
}

/// A nested abbreviation index: `abbr -> canonical` at each level, plus one sub-index
/// per canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbbrsIndex {
    abbrs: HashMap<String, String>,
    subs: HashMap<String, AbbrsIndex>,
}

impl AbbrsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors the whole command tree. Each level also indexes the arguments
    /// of that level's executable, which lets `cmd.arg` keys be expanded.
    pub fn from_tree(tree: &CmdTree) -> Self {
        Self::mirror(tree, tree.root())
    }

    fn mirror(tree: &CmdTree, id: NodeId) -> Self {
        let node = tree.node(id);
        let mut index = Self {
            abbrs: node.sub_abbrs().clone(),
            subs: HashMap::new(),
        };
        for &child in node.children() {
            let child_node = tree.node(child);
            index
                .subs
                .insert(child_node.name().to_string(), Self::mirror(tree, child));
        }

        if let Some(cmd) = node.cmd() {
            for (abbr, arg) in &cmd.args().abbrs().abbrs {
                match index.abbrs.get(abbr) {
                    Some(existing) if existing != arg => {
                        log::warn!(
                            "Argument abbreviation '{}' of '{}' is shadowed by sub-command '{}'.",
                            abbr,
                            tree.display_path(id),
                            existing
                        );
                    }
                    _ => {
                        index.abbrs.insert(abbr.clone(), arg.clone());
                        index.subs.entry(arg.clone()).or_default();
                    }
                }
            }
        }
        index
    }

    pub(crate) fn entries_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.abbrs
    }

    /// Resolves one segment at this level.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.abbrs.get(token).map(String::as_str)
    }

    pub fn sub(&self, canonical: &str) -> Option<&Self> {
        self.subs.get(canonical)
    }

    pub fn is_empty(&self) -> bool {
        self.abbrs.is_empty()
    }

    /// Expands every segment of `path` to its canonical name.
    ///
    /// Returns the expanded path and `true`, or the input unchanged and `false`
    /// as soon as one segment does not resolve.
    pub fn try_match(&self, path: &str, sep: &str) -> (String, bool) {
        let mut level = Some(self);
        let mut matched: Vec<&str> = Vec::new();
        for segment in path.split(sep) {
            let Some(name) = level.and_then(|index| index.abbrs.get(segment)) else {
                return (path.to_string(), false);
            };
            matched.push(name);
            level = level.and_then(|index| index.subs.get(name.as_str()));
        }
        (matched.join(sep), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CMD_PATH_SEP;

    fn sample_tree() -> CmdTree {
        let mut tree = CmdTree::new();
        let root = tree.root();
        let git = tree.add_sub(root, "git", &["g"]).unwrap();
        let commit = tree.add_sub(git, "commit", &["ci", "c"]).unwrap();
        tree.reg_cmd(commit, "commit", |_, _| Ok(true))
            .unwrap()
            .add_arg("message", "", &["msg", "m"])
            .unwrap();
        tree
    }

    #[test]
    fn test_try_match_expands_every_segment() {
        let index = AbbrsIndex::from_tree(&sample_tree());
        assert_eq!(
            index.try_match("g.ci", CMD_PATH_SEP),
            ("git.commit".to_string(), true)
        );
        assert_eq!(
            index.try_match("g.c.m", CMD_PATH_SEP),
            ("git.commit.message".to_string(), true)
        );
    }

    #[test]
    fn test_try_match_is_a_fixed_point() {
        let index = AbbrsIndex::from_tree(&sample_tree());
        let (once, ok) = index.try_match("g.ci.msg", CMD_PATH_SEP);
        assert!(ok);
        assert_eq!(index.try_match(&once, CMD_PATH_SEP), (once.clone(), true));
    }

    #[test]
    fn test_try_match_failure_returns_input() {
        let index = AbbrsIndex::from_tree(&sample_tree());
        assert_eq!(
            index.try_match("g.nope", CMD_PATH_SEP),
            ("g.nope".to_string(), false)
        );
        assert_eq!(
            index.try_match("g.ci.m.extra", CMD_PATH_SEP),
            ("g.ci.m.extra".to_string(), false)
        );
        assert_eq!(index.try_match("", CMD_PATH_SEP), (String::new(), false));
    }

    #[test]
    fn test_register_names_rejects_collisions() {
        let mut map = HashMap::new();
        register_names(&mut map, NameKind::Command, "", "build", &["b"]).unwrap();

        let dup = register_names(&mut map, NameKind::Command, "", "build", &[]);
        assert!(matches!(dup, Err(RegistrationError::DuplicateName { .. })));

        let taken = register_names(&mut map, NameKind::Command, "", "bench", &["b"]);
        assert!(matches!(
            taken,
            Err(RegistrationError::DuplicateAbbr { ref existing, .. }) if existing == "build"
        ));

        // A name may not hide behind someone else's abbreviation either.
        let hidden = register_names(&mut map, NameKind::Command, "", "b", &[]);
        assert!(matches!(hidden, Err(RegistrationError::DuplicateAbbr { .. })));

        // Failed registrations leave the map untouched.
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name(NameKind::Command, "deploy-prod").is_ok());
        for bad in ["", "a.b", "a/b", "a b", "a{", "a=b", "a:b"] {
            assert!(validate_name(NameKind::Command, bad).is_err(), "{bad:?}");
        }
    }
}
