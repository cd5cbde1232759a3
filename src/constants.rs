// src/constants.rs

// --- Script grammar ---

/// Separates independent sequences in a script (`a : b`).
pub const SEQ_SEP: &str = ":";

/// A `SEQ_SEP` right after one of these is kept inside its token (`http://...`).
pub const SEQ_SEP_PROTECTED_PREFIXES: &[&str] = &["http", "HTTP"];

/// A `SEQ_SEP` right before one of these is kept inside its token (`x://...`).
pub const SEQ_SEP_PROTECTED_SUFFIXES: &[&str] = &["/"];

/// Characters that separate command path segments. Whitespace is also a separator.
pub const CMD_PATH_SEP_CHARS: &[char] = &['.', '/'];

/// The canonical separator used to build dotted command paths and env keys.
pub const CMD_PATH_SEP: &str = ".";

/// Opens an inline env block (`cmd{key=value}`).
pub const ENV_BRACKET_LEFT: &str = "{";

/// Closes an inline env block.
pub const ENV_BRACKET_RIGHT: &str = "}";

/// Separates a key from its value inside an assignment.
pub const ENV_KV_SEP: &str = "=";

/// Assigning this value deletes the key from the layer being written.
pub const ENV_VAL_DEL_MARK: &str = "--";

/// Assigning this value deletes the key from every layer of the chain.
pub const ENV_VAL_DEL_ALL_MARK: &str = "---";

// --- Reserved env keys ---

/// Keys under this prefix are runtime bookkeeping and never persisted.
pub const ENV_SYS_PREFIX: &str = "sys.";

/// Session key holding extra bootstrap script text, run after the fixed bootstrap.
pub const ENV_KEY_BOOTSTRAP: &str = "bootstrap";

/// Session key counting nested user-script runs.
pub const ENV_KEY_STACK_DEPTH: &str = "sys.stack-depth";

/// Session key holding the path `env.save` writes the persisted layer to.
pub const ENV_KEY_ENV_FILE: &str = "sys.env-file";

// --- Inter-process env protocol ---

/// First field of a stdout line that carries an env record.
pub const PROTO_ENV_MARK: &str = "CMDFLOW_ENV";

/// Field separator of an env record line.
pub const PROTO_FIELD_SEP: char = '\t';

// --- Files ---

/// The name of the directory holding cmdflow configuration (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "cmdflow";

/// The name of the main configuration file.
pub const CONFIG_FILENAME: &str = "config.toml";

/// The default name of the persisted env layer file.
pub const PERSISTED_ENV_FILENAME: &str = "env.toml";

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV_VAR: &str = "CMDFLOW_CONFIG";
