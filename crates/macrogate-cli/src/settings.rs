//! Turning the TOML config into component settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use macrogate_client::ClientConfig;
use macrogate_config::{
    ClientOverrides, MacrogateConfig, SandboxOverrides, SecurityOverrides, ServerOverrides,
};
use macrogate_sandbox::validator::{
    DEFAULT_ALLOWED_MODULES, DEFAULT_DENIED_ATTRIBUTES, DEFAULT_DENIED_IDENTIFIERS,
};
use macrogate_sandbox::{SandboxConfig, SecurityPolicy};
use macrogate_server::{HostIdentity, ServerConfig};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MACROGATE_CONFIG";

/// Config file looked for in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "macrogate.toml";

/// Locate the config file.
///
/// Search order:
/// 1. `--config` (used even if missing, so the error is reported)
/// 2. `MACROGATE_CONFIG` environment variable
/// 3. `./macrogate.toml`
/// 4. None: run on defaults
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let cwd = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd.exists() {
        return Some(cwd);
    }

    None
}

/// Load the config from wherever [`find_config_file`] points.
pub fn load_config(explicit: Option<&Path>) -> Result<MacrogateConfig> {
    match find_config_file(explicit) {
        Some(path) => MacrogateConfig::from_file_with_env(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(MacrogateConfig::default()),
    }
}

/// Build the connection manager settings.
pub fn server_config(overrides: &ServerOverrides) -> ServerConfig {
    let mut config = ServerConfig::default();
    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(max) = overrides.max_connections {
        config.max_connections = max;
    }
    if let Some(secs) = overrides.idle_timeout_secs {
        config.idle_timeout = Duration::from_secs(secs);
    }
    if let Some(size) = overrides.read_chunk_size {
        config.read_chunk_size = size;
    }
    if let Some(size) = overrides.max_buffer_size {
        config.max_buffer_size = size;
    }
    if let Some(ms) = overrides.tick_interval_ms {
        config.tick_interval = Duration::from_millis(ms);
    }
    config
}

/// Build the sandbox limits.
pub fn sandbox_config(overrides: &SandboxOverrides) -> SandboxConfig {
    let mut config = SandboxConfig::default();
    if let Some(secs) = overrides.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(size) = overrides.max_code_size {
        config.max_code_size = size;
    }
    if let Some(size) = overrides.max_output_size {
        config.max_output_size = size;
    }
    if let Some(depth) = overrides.max_recursion_depth {
        config.max_recursion_depth = depth;
    }
    config.max_steps = overrides.max_steps;
    config
}

/// Build the one security policy the process uses. Each configured list
/// replaces the corresponding default list.
pub fn security_policy(overrides: &SecurityOverrides) -> SecurityPolicy {
    fn list(configured: &Option<Vec<String>>, default: &[&str]) -> Vec<String> {
        match configured {
            Some(names) => names.clone(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    SecurityPolicy::new(
        list(&overrides.allowed_modules, DEFAULT_ALLOWED_MODULES),
        list(&overrides.denied_identifiers, DEFAULT_DENIED_IDENTIFIERS),
        list(&overrides.denied_attributes, DEFAULT_DENIED_ATTRIBUTES),
    )
}

/// How the host handle appears to scripts.
pub fn host_identity(overrides: &SandboxOverrides) -> HostIdentity {
    let mut host = HostIdentity::default();
    if let Some(name) = &overrides.host_name {
        host.name = name.clone();
    }
    if let Some(version) = &overrides.host_version {
        host.version = version.clone();
    }
    if let Some(aliases) = &overrides.host_aliases {
        host.aliases = aliases.clone();
    }
    host
}

/// Build the client settings.
pub fn client_config(overrides: &ClientOverrides) -> ClientConfig {
    let mut config = ClientConfig::default();
    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(secs) = overrides.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = overrides.code_timeout_secs {
        config.code_timeout = Duration::from_secs(secs);
    }
    if let Some(size) = overrides.max_response_size {
        config.max_response_size = size;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn empty_config_gives_defaults() {
        let config = MacrogateConfig::from_toml("").unwrap();
        let server = server_config(&config.server);
        assert_eq!(server.port, 9876);
        assert_eq!(server.max_connections, 5);

        let sandbox = sandbox_config(&config.sandbox);
        assert_eq!(sandbox.timeout, SandboxConfig::default().timeout);
        assert!(sandbox.max_steps.is_none());

        let client = client_config(&config.client);
        assert_eq!(client.timeout, Duration::from_secs(30));
        assert_eq!(client.code_timeout, Duration::from_secs(60));

        let host = host_identity(&config.sandbox);
        assert_eq!(host.aliases, vec!["App".to_string(), "FreeCAD".to_string()]);
    }

    #[test]
    fn overrides_apply() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            idle_timeout_secs = 5
            tick_interval_ms = 20

            [sandbox]
            timeout_secs = 3
            max_steps = 1000
            host_name = "FreeCAD"
            host_aliases = ["FreeCAD"]

            [client]
            port = 9000
            code_timeout_secs = 120
        "#;
        let config = MacrogateConfig::from_toml(toml).unwrap();

        let server = server_config(&config.server);
        assert_eq!(server.address(), "0.0.0.0:9000");
        assert_eq!(server.idle_timeout, Duration::from_secs(5));
        assert_eq!(server.tick_interval, Duration::from_millis(20));

        let sandbox = sandbox_config(&config.sandbox);
        assert_eq!(sandbox.timeout, Duration::from_secs(3));
        assert_eq!(sandbox.max_steps, Some(1000));

        let host = host_identity(&config.sandbox);
        assert_eq!(host.name, "FreeCAD");
        assert_eq!(host.aliases, vec!["FreeCAD".to_string()]);

        let client = client_config(&config.client);
        assert_eq!(client.port, 9000);
        assert_eq!(client.code_timeout, Duration::from_secs(120));
    }

    #[test]
    fn security_lists_replace_defaults() {
        let config = MacrogateConfig::from_toml(
            "[security]\nallowed_modules = [\"math\", \"Part\"]\n",
        )
        .unwrap();
        let policy = security_policy(&config.security);
        assert!(policy.is_module_allowed("Part"));
        assert!(!policy.is_module_allowed("Draft"));
        assert!(policy.denied_identifiers().contains("eval"));

        let defaults = security_policy(&SecurityOverrides::default());
        assert_eq!(defaults.allowed_modules().len(), DEFAULT_ALLOWED_MODULES.len());
    }

    #[test]
    #[serial]
    fn explicit_config_path_wins() {
        std::env::set_var(CONFIG_ENV, "/nonexistent/from-env.toml");
        let found = find_config_file(Some(Path::new("/tmp/explicit.toml")));
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(found, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    #[test]
    #[serial]
    fn env_config_path_is_used_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();

        std::env::set_var(CONFIG_ENV, &path);
        let loaded = load_config(None);
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(loaded.unwrap().server.port, Some(9100));
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/macrogate.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to load config"), "{err}");
    }
}
