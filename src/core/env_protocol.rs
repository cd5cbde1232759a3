// src/core/env_protocol.rs

//! Line protocol that lets child processes write back into the env.
//!
//! A record line is `CMDFLOW_ENV<TAB>key<TAB>value[<TAB>layer]`. Every other line is
//! ordinary output and is passed through untouched.

use crate::constants::{PROTO_ENV_MARK, PROTO_FIELD_SEP};
use crate::core::env::Env;
use crate::models::EnvLayerType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRecord {
    pub key: String,
    pub value: String,
    /// Target layer; the session layer when absent.
    pub layer: Option<EnvLayerType>,
}

pub fn format_record(key: &str, value: &str, layer: Option<EnvLayerType>) -> String {
    let sep = PROTO_FIELD_SEP;
    match layer {
        Some(layer) => format!("{PROTO_ENV_MARK}{sep}{key}{sep}{value}{sep}{layer}"),
        None => format!("{PROTO_ENV_MARK}{sep}{key}{sep}{value}"),
    }
}

/// Returns the record carried by `line`, or `None` for passthrough text.
pub fn parse_line(line: &str) -> Option<EnvRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.split(PROTO_FIELD_SEP);
    if fields.next() != Some(PROTO_ENV_MARK) {
        return None;
    }
    match fields.collect::<Vec<_>>().as_slice() {
        [key, value] if !key.is_empty() => Some(EnvRecord {
            key: key.to_string(),
            value: value.to_string(),
            layer: None,
        }),
        [key, value, layer] if !key.is_empty() => match layer.parse() {
            Ok(layer) => Some(EnvRecord {
                key: key.to_string(),
                value: value.to_string(),
                layer: Some(layer),
            }),
            Err(e) => {
                log::warn!("Ignoring env record for '{key}': {e}");
                None
            }
        },
        _ => {
            log::warn!("Malformed env record line: {line:?}");
            None
        }
    }
}

/// Splits output lines into env records and passthrough lines, keeping order within each.
pub fn partition_lines<'a, I>(lines: I) -> (Vec<EnvRecord>, Vec<&'a str>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut records = Vec::new();
    let mut passthrough = Vec::new();
    for line in lines {
        match parse_line(line) {
            Some(record) => records.push(record),
            None => passthrough.push(line),
        }
    }
    (records, passthrough)
}

/// Writes one record into the chain reachable from `env`.
///
/// The record's layer is looked up from `env` towards the root; when it is absent
/// (or not part of this chain) the session layer is used, and `env` itself as a last resort.
pub fn apply_record(env: &Env, record: &EnvRecord) {
    let target = record
        .layer
        .and_then(|layer| env.get_layer(layer))
        .or_else(|| env.get_layer(EnvLayerType::Session))
        .unwrap_or_else(|| env.clone());
    log::trace!(
        "Env record: {}={} -> {} layer",
        record.key,
        record.value,
        target.layer_type()
    );
    target.set(&record.key, &record.value);
}

pub fn apply_records(env: &Env, records: &[EnvRecord]) {
    for record in records {
        apply_record(env, record);
    }
}
