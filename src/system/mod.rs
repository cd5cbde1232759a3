//! # System Interaction Layer
//!
//! Boundary between the interpreter core and the operating system.
//!
//! ## Modules
//!
//! - **`config`**: loads `config.toml` (bootstrap script, persisted env location,
//!   default env values).
//! - **`executor`**: runs `External` executables as child processes and feeds env records
//!   printed on their stdout back into the env.
//! - **`persist`**: loads and saves the persisted env layer as a TOML file.

pub mod config;
pub mod executor;
pub mod persist;
