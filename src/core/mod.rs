// src/core/mod.rs

pub mod abbrs;
pub mod cmd_tree;
pub mod engine;
pub mod env;
pub mod env_parser;
pub mod env_protocol;
pub mod graph_display;
pub mod path_parser;
pub mod paths;
pub mod reporter;
pub mod sequence;
