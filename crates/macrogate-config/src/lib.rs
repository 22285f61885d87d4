#![warn(missing_docs)]

//! # macrogate-config
//!
//! Configuration loading for the macrogate command gateway.
//!
//! Supports TOML configuration files with environment variable expansion.
//! Every section and every key is optional; absent values fall back to the
//! defaults baked into the crate that consumes them.
//!
//! ## Example
//!
//! ```toml
//! [server]
//! host = "localhost"
//! port = 9876
//! max_connections = 5
//! idle_timeout_secs = 30
//! macro_dir = "${HOME}/.local/share/FreeCAD/Macro"
//!
//! [security]
//! allowed_modules = ["FreeCAD", "Part", "math"]
//!
//! [sandbox]
//! timeout_secs = 10
//! host_aliases = ["App", "FreeCAD"]
//!
//! [logging]
//! level = "info"
//! max_report_lines = 100
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level macrogate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MacrogateConfig {
    /// Listening socket and connection limits.
    #[serde(default)]
    pub server: ServerOverrides,

    /// The security policy consumed by the code validator.
    #[serde(default)]
    pub security: SecurityOverrides,

    /// Sandbox execution settings.
    #[serde(default)]
    pub sandbox: SandboxOverrides,

    /// Logging and report buffer settings.
    #[serde(default)]
    pub logging: LoggingOverrides,

    /// Settings for the `macrogate call` client.
    #[serde(default)]
    pub client: ClientOverrides,
}

/// Gateway listener overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerOverrides {
    /// Interface to bind.
    #[serde(default)]
    pub host: Option<String>,

    /// TCP port to bind (0 picks an ephemeral port).
    #[serde(default)]
    pub port: Option<u16>,

    /// Maximum concurrently open connections.
    #[serde(default)]
    pub max_connections: Option<usize>,

    /// Seconds without a successful read before a connection is dropped.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Bytes requested per non-blocking read.
    #[serde(default)]
    pub read_chunk_size: Option<usize>,

    /// Hard cap on a connection's accumulated receive buffer.
    #[serde(default)]
    pub max_buffer_size: Option<usize>,

    /// Interval between ticks of the connection manager.
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,

    /// Directory that relative `run_macro` paths resolve against.
    #[serde(default)]
    pub macro_dir: Option<PathBuf>,
}

/// Security policy overrides. Each list replaces the built-in default list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityOverrides {
    /// Top-level module names code may import.
    #[serde(default)]
    pub allowed_modules: Option<Vec<String>>,

    /// Identifiers code may not reference or call.
    #[serde(default)]
    pub denied_identifiers: Option<Vec<String>>,

    /// Attribute names code may not access.
    #[serde(default)]
    pub denied_attributes: Option<Vec<String>>,
}

/// Sandbox configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SandboxOverrides {
    /// Execution watchdog in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Maximum size of submitted code in bytes.
    #[serde(default)]
    pub max_code_size: Option<usize>,

    /// Maximum captured output in bytes.
    #[serde(default)]
    pub max_output_size: Option<usize>,

    /// Maximum depth of nested script function calls.
    #[serde(default)]
    pub max_recursion_depth: Option<usize>,

    /// Optional instruction budget per execution.
    #[serde(default)]
    pub max_steps: Option<u64>,

    /// Name reported by the host handle (`App.Name`).
    #[serde(default)]
    pub host_name: Option<String>,

    /// Version reported by the host handle (`App.Version`).
    #[serde(default)]
    pub host_version: Option<String>,

    /// Binding names under which the host handle is exposed.
    #[serde(default)]
    pub host_aliases: Option<Vec<String>>,
}

/// Logging overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingOverrides {
    /// Default log level when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: Option<String>,

    /// Lines kept in the in-memory report served by `get_report`.
    #[serde(default)]
    pub max_report_lines: Option<usize>,

    /// Optional JSON-lines audit log file.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

/// Client overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientOverrides {
    /// Gateway host to connect to.
    #[serde(default)]
    pub host: Option<String>,

    /// Gateway port to connect to.
    #[serde(default)]
    pub port: Option<u16>,

    /// Round-trip timeout for ordinary commands.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Round-trip timeout for code-execution commands.
    #[serde(default)]
    pub code_timeout_secs: Option<u64>,

    /// Maximum response size in bytes.
    #[serde(default)]
    pub max_response_size: Option<usize>,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl MacrogateConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: MacrogateConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(toml_str);
        Self::from_toml(&expanded)
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        non_zero("server.max_connections", server.max_connections)?;
        non_zero("server.idle_timeout_secs", server.idle_timeout_secs)?;
        non_zero("server.read_chunk_size", server.read_chunk_size)?;
        non_zero("server.max_buffer_size", server.max_buffer_size)?;
        non_zero("server.tick_interval_ms", server.tick_interval_ms)?;

        identifiers("security.allowed_modules", &self.security.allowed_modules)?;
        identifiers(
            "security.denied_identifiers",
            &self.security.denied_identifiers,
        )?;
        identifiers(
            "security.denied_attributes",
            &self.security.denied_attributes,
        )?;

        let sandbox = &self.sandbox;
        non_zero("sandbox.timeout_secs", sandbox.timeout_secs)?;
        non_zero("sandbox.max_code_size", sandbox.max_code_size)?;
        non_zero("sandbox.max_output_size", sandbox.max_output_size)?;
        non_zero("sandbox.max_recursion_depth", sandbox.max_recursion_depth)?;
        non_zero("sandbox.max_steps", sandbox.max_steps)?;
        identifiers("sandbox.host_aliases", &sandbox.host_aliases)?;
        if let Some(aliases) = &sandbox.host_aliases {
            if aliases.is_empty() {
                return Err(ConfigError::Invalid(
                    "sandbox.host_aliases must name at least one binding".into(),
                ));
            }
        }

        if let Some(level) = &self.logging.level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "logging.level '{}' is not one of: {}",
                    level,
                    LOG_LEVELS.join(", ")
                )));
            }
        }
        non_zero("logging.max_report_lines", self.logging.max_report_lines)?;

        let client = &self.client;
        if client.port == Some(0) {
            return Err(ConfigError::Invalid(
                "client.port must be a concrete port, not 0".into(),
            ));
        }
        non_zero("client.timeout_secs", client.timeout_secs)?;
        non_zero("client.code_timeout_secs", client.code_timeout_secs)?;
        non_zero("client.max_response_size", client.max_response_size)?;

        Ok(())
    }
}

fn non_zero<T>(key: &str, value: Option<T>) -> Result<(), ConfigError>
where
    T: PartialEq + Default,
{
    if value.is_some_and(|v| v == T::default()) {
        return Err(ConfigError::Invalid(format!("{key} must be greater than 0")));
    }
    Ok(())
}

fn identifiers(key: &str, names: &Option<Vec<String>>) -> Result<(), ConfigError> {
    let Some(names) = names else {
        return Ok(());
    };
    for name in names {
        if !is_identifier(name) {
            return Err(ConfigError::Invalid(format!(
                "{key}: '{name}' is not a valid identifier"
            )));
        }
    }
    Ok(())
}

/// Whether `name` is an ASCII identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expand `${ENV_VAR}` patterns in a string using environment variables.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    // Leave the placeholder if env var not found
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}
