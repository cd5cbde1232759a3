// src/core/env.rs

use crate::models::EnvLayerType;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("Env key '{key}' holds '{value}', which is not an integer.")]
    NotAnInt { key: String, value: String },

    #[error("Adding {delta} to env key '{key}' overflows.")]
    Overflow { key: String, delta: i64 },
}

/// A stored value. `is_arg` marks entries produced from command arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVal {
    pub raw: String,
    pub is_arg: bool,
}

#[derive(Debug)]
struct EnvLayer {
    layer_type: EnvLayerType,
    pairs: RefCell<BTreeMap<String, EnvVal>>,
    parent: Option<Env>,
}

/// A handle to one layer of a chained key/value environment.
///
/// Reads walk from this layer towards the root and return the first hit; writes
/// always land in this layer. Cloning the handle shares the layer.
#[derive(Debug, Clone)]
pub struct Env(Rc<EnvLayer>);

/// Iterates a chain from the nearest layer to the root.
struct Layers<'a> {
    next: Option<&'a Env>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a Env;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.0.parent.as_ref();
        Some(current)
    }
}

/// The truthy spellings accepted by `get_bool`, compared case-insensitively.
pub(crate) fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "y"
    )
}

pub(crate) fn parse_int(key: &str, raw: &str) -> Result<i64, EnvError> {
    raw.trim().parse().map_err(|_| EnvError::NotAnInt {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

impl Env {
    /// Creates a root layer.
    pub fn new(layer_type: EnvLayerType) -> Self {
        Self(Rc::new(EnvLayer {
            layer_type,
            pairs: RefCell::new(BTreeMap::new()),
            parent: None,
        }))
    }

    /// Builds the startup chain `Default <- Persisted <- Session` and returns the session layer.
    pub fn new_session_chain() -> Self {
        Self::new(EnvLayerType::Default)
            .new_layer(EnvLayerType::Persisted)
            .new_layer(EnvLayerType::Session)
    }

    /// Pushes an empty child layer whose parent is `self`.
    pub fn new_layer(&self, layer_type: EnvLayerType) -> Self {
        Self(Rc::new(EnvLayer {
            layer_type,
            pairs: RefCell::new(BTreeMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn layer_type(&self) -> EnvLayerType {
        self.0.layer_type
    }

    pub fn parent(&self) -> Option<&Self> {
        self.0.parent.as_ref()
    }

    /// True when both handles point at the same layer.
    pub fn is_same_layer(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn layers(&self) -> Layers<'_> {
        Layers { next: Some(self) }
    }

    // --- Reads ---

    pub fn get_val(&self, name: &str) -> Option<EnvVal> {
        self.layers()
            .find_map(|layer| layer.0.pairs.borrow().get(name).cloned())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.get_val(name).map(|val| val.raw)
    }

    /// Like `get`, but an absent key reads as the empty string.
    pub fn get_raw(&self, name: &str) -> String {
        self.get(name).unwrap_or_default()
    }

    /// Reads this layer only, ignoring parents.
    pub fn get_own(&self, name: &str) -> Option<String> {
        self.0.pairs.borrow().get(name).map(|val| val.raw.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.layers()
            .any(|layer| layer.0.pairs.borrow().contains_key(name))
    }

    /// Absent reads as `false`.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).is_some_and(|raw| parse_bool(&raw))
    }

    /// Absent reads as `0`; a present value must parse as an integer.
    pub fn get_int(&self, name: &str) -> Result<i64, EnvError> {
        match self.get(name) {
            Some(raw) => parse_int(name, &raw),
            None => Ok(0),
        }
    }

    /// The nearest layer of the given type, starting at `self`.
    pub fn get_layer(&self, layer_type: EnvLayerType) -> Option<Self> {
        self.layers()
            .find(|layer| layer.layer_type() == layer_type)
            .cloned()
    }

    /// Every visible key with its visible value; nearer layers shadow farther ones.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let chain: Vec<&Self> = self.layers().collect();
        let mut flat = BTreeMap::new();
        for layer in chain.into_iter().rev() {
            for (key, val) in layer.0.pairs.borrow().iter() {
                flat.insert(key.clone(), val.raw.clone());
            }
        }
        flat
    }

    /// The pairs stored in this layer only.
    pub fn own_pairs(&self) -> BTreeMap<String, String> {
        self.0
            .pairs
            .borrow()
            .iter()
            .map(|(key, val)| (key.clone(), val.raw.clone()))
            .collect()
    }

    // --- Writes ---

    pub fn set(&self, name: &str, raw: &str) {
        self.set_ext(name, raw, false);
    }

    pub fn set_ext(&self, name: &str, raw: &str, is_arg: bool) {
        log::trace!("[{}] {name} = {raw:?}", self.layer_type());
        self.0.pairs.borrow_mut().insert(
            name.to_string(),
            EnvVal {
                raw: raw.to_string(),
                is_arg,
            },
        );
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.set(name, if value { "true" } else { "false" });
    }

    pub fn set_int(&self, name: &str, value: i64) {
        self.set(name, &value.to_string());
    }

    /// Adds `delta` to the integer at `name`, writing the result back to the
    /// layer that currently holds the key (or to this layer if nobody does).
    pub fn plus_int(&self, name: &str, delta: i64) -> Result<i64, EnvError> {
        let target = self
            .layers()
            .find(|layer| layer.0.pairs.borrow().contains_key(name))
            .unwrap_or(self)
            .clone();
        let current = target.get_int(name)?;
        let updated = current
            .checked_add(delta)
            .ok_or_else(|| EnvError::Overflow {
                key: name.to_string(),
                delta,
            })?;
        target.set_int(name, updated);
        Ok(updated)
    }

    /// Removes `name` from the nearest layer of type `layer_type` only.
    pub fn delete_ext(&self, name: &str, layer_type: EnvLayerType) {
        if let Some(layer) = self.get_layer(layer_type) {
            layer.0.pairs.borrow_mut().remove(name);
        }
    }

    /// Removes `name` from every layer of the chain.
    pub fn delete(&self, name: &str) {
        for layer in self.layers() {
            layer.0.pairs.borrow_mut().remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shadows_parent() {
        let session = Env::new_session_chain();
        let default = session.get_layer(EnvLayerType::Default).unwrap();
        default.set("k", "from-default");
        assert_eq!(session.get("k").as_deref(), Some("from-default"));

        session.set("k", "from-session");
        assert_eq!(session.get("k").as_deref(), Some("from-session"));
        assert_eq!(default.get("k").as_deref(), Some("from-default"));

        session.delete_ext("k", EnvLayerType::Session);
        assert_eq!(session.get("k").as_deref(), Some("from-default"));

        session.set("k", "again");
        session.delete("k");
        assert_eq!(session.get("k"), None);
        assert_eq!(session.get_raw("k"), "");
    }

    #[test]
    fn test_get_own_ignores_parents() {
        let session = Env::new_session_chain();
        session.parent().unwrap().set("p", "1");
        assert_eq!(session.get_own("p"), None);
        assert_eq!(session.get("p").as_deref(), Some("1"));
    }

    #[test]
    fn test_bool_parsing() {
        let env = Env::new(EnvLayerType::Session);
        for truthy in ["true", "TRUE", "1", "on", "On", "y"] {
            env.set("b", truthy);
            assert!(env.get_bool("b"), "{truthy} should be true");
        }
        for falsy in ["false", "0", "off", "nope", "yes", ""] {
            env.set("b", falsy);
            assert!(!env.get_bool("b"), "{falsy} should be false");
        }
        assert!(!env.get_bool("missing"));
        env.set_bool("b", true);
        assert_eq!(env.get_own("b").as_deref(), Some("true"));
    }

    #[test]
    fn test_int_reads_and_errors() {
        let env = Env::new(EnvLayerType::Session);
        assert_eq!(env.get_int("n"), Ok(0));
        env.set_int("n", 41);
        assert_eq!(env.get_int("n"), Ok(41));
        env.set("n", "forty-two");
        assert_eq!(
            env.get_int("n"),
            Err(EnvError::NotAnInt {
                key: "n".to_string(),
                value: "forty-two".to_string()
            })
        );
    }

    #[test]
    fn test_plus_int_writes_to_the_owning_layer() {
        let session = Env::new_session_chain();
        let cmd = session.new_layer(EnvLayerType::CmdArg);
        session.set_int("depth", 2);

        assert_eq!(cmd.plus_int("depth", 1), Ok(3));
        assert_eq!(session.get_own("depth").as_deref(), Some("3"));
        assert_eq!(cmd.get_own("depth"), None);

        assert_eq!(cmd.plus_int("fresh", 5), Ok(5));
        assert_eq!(cmd.get_own("fresh").as_deref(), Some("5"));
    }

    #[test]
    fn test_flatten_applies_shadowing() {
        let session = Env::new_session_chain();
        let default = session.get_layer(EnvLayerType::Default).unwrap();
        default.set("a", "1");
        default.set("b", "1");
        session.set("b", "2");
        let flat = session.flatten();
        assert_eq!(flat.get("a").map(String::as_str), Some("1"));
        assert_eq!(flat.get("b").map(String::as_str), Some("2"));
        assert_eq!(session.own_pairs().len(), 1);
    }

    #[test]
    fn test_is_arg_survives_reads() {
        let env = Env::new(EnvLayerType::CmdArg);
        env.set_ext("x.a", "1", true);
        assert!(env.get_val("x.a").unwrap().is_arg);
        assert!(env.has("x.a"));
    }
}
