//! macrogate: a sandboxed command gateway for CAD macro automation.

mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use macrogate_client::GatewayClient;
use macrogate_config::MacrogateConfig;
use macrogate_protocol::Command;
use macrogate_sandbox::audit::{AuditLogger, JsonLinesAuditLogger, TracingAuditLogger};
use macrogate_sandbox::{CapabilitySet, SandboxExecutor};
use macrogate_server::{Dispatcher, HandlerTable, ReportLayer, ReportLog, ServerState};
use serde_json::{Map, Value};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "macrogate", version, about = "Sandboxed command gateway for CAD macros")]
struct Cli {
    /// Path to a macrogate.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway until interrupted.
    Serve(ServeArgs),
    /// Send one command to a running gateway and print the response.
    Call(CallArgs),
    /// Validate a script file against the configured policy.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (0 for an ephemeral port).
    #[arg(long)]
    port: Option<u16>,
    /// Directory relative macro paths resolve against.
    #[arg(long)]
    macro_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CallArgs {
    /// Command type, e.g. `execute_code`.
    kind: String,
    /// Command parameters as a JSON object.
    #[arg(long, default_value = "{}")]
    params: String,
    /// Gateway host.
    #[arg(long)]
    host: Option<String>,
    /// Gateway port.
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Script file to validate.
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = settings::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => serve(config, args).await,
        Commands::Call(args) => {
            init_cli_logging();
            call(&config, args).await
        }
        Commands::Check(args) => {
            init_cli_logging();
            Ok(if check(&config, &args.file)? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

/// Console logging plus the in-memory tail served by `get_report`.
fn init_server_logging(config: &MacrogateConfig) -> ReportLog {
    let level = config.logging.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let report = ReportLog::new(
        config
            .logging
            .max_report_lines
            .unwrap_or(ReportLog::DEFAULT_CAPACITY),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(ReportLayer::new(report.clone()))
        .init();

    report
}

fn init_cli_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(mut config: MacrogateConfig, args: ServeArgs) -> Result<ExitCode> {
    if args.host.is_some() {
        config.server.host = args.host;
    }
    if args.port.is_some() {
        config.server.port = args.port;
    }
    if args.macro_dir.is_some() {
        config.server.macro_dir = args.macro_dir;
    }

    let report = init_server_logging(&config);
    let dispatcher = build_dispatcher(&config, report)?;
    let server_config = settings::server_config(&config.server);

    let mut state = ServerState::start(server_config, dispatcher)?;
    tracing::info!(
        addr = %state.local_addr(),
        commands = ?state.handler().command_names(),
        "macrogate ready"
    );

    state
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
        })
        .await;

    Ok(ExitCode::SUCCESS)
}

fn build_dispatcher(config: &MacrogateConfig, report: ReportLog) -> Result<Dispatcher> {
    let audit: Arc<dyn AuditLogger> = match &config.logging.audit_log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open audit log {}", path.display()))?;
            tracing::info!(path = %path.display(), "writing audit log");
            Arc::new(JsonLinesAuditLogger::new(file))
        }
        None => Arc::new(TracingAuditLogger),
    };

    let mut builder = Dispatcher::builder(HandlerTable::new())
        .sandbox_config(settings::sandbox_config(&config.sandbox))
        .policy(Arc::new(settings::security_policy(&config.security)))
        .host(settings::host_identity(&config.sandbox))
        .report(report)
        .audit_logger(audit);
    if let Some(dir) = &config.server.macro_dir {
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "macro directory does not exist");
        }
        builder = builder.macro_dir(dir.clone());
    }
    Ok(builder.build())
}

async fn call(config: &MacrogateConfig, args: CallArgs) -> Result<ExitCode> {
    let mut client_config = settings::client_config(&config.client);
    if let Some(host) = args.host {
        client_config.host = host;
    }
    if let Some(port) = args.port {
        client_config.port = port;
    }

    let mut command = Command::new(args.kind);
    command.params = parse_params(&args.params)?;

    let response = match GatewayClient::new(client_config).call(command).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn parse_params(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("--params is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {other}"),
    }
}

/// Print the verdict for `file`; `true` when it is safe.
fn check(config: &MacrogateConfig, file: &Path) -> Result<bool> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let executor = SandboxExecutor::new(
        settings::sandbox_config(&config.sandbox),
        Arc::new(settings::security_policy(&config.security)),
        Arc::new(CapabilitySet::standard()),
    );
    let result = executor.validate(&code)?;

    if result.is_safe() {
        println!("{}: ok", file.display());
        return Ok(true);
    }
    for message in result.messages() {
        println!("{}: {message}", file.display());
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from([
            "macrogate",
            "--config",
            "gw.toml",
            "serve",
            "--port",
            "0",
            "--macro-dir",
            "/srv/macros",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("gw.toml")));
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, Some(0));
        assert!(args.host.is_none());
        assert_eq!(args.macro_dir, Some(PathBuf::from("/srv/macros")));
    }

    #[test]
    fn parses_call_with_params() {
        let cli = Cli::try_parse_from([
            "macrogate",
            "call",
            "execute_code",
            "--params",
            r#"{"code": "result = 1"}"#,
        ])
        .unwrap();
        let Commands::Call(args) = cli.command else {
            panic!("expected call");
        };
        assert_eq!(args.kind, "execute_code");
        let params = parse_params(&args.params).unwrap();
        assert_eq!(params["code"], "result = 1");
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["macrogate", "check", "a.py", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn call_requires_a_command_type() {
        assert!(Cli::try_parse_from(["macrogate", "call"]).is_err());
    }

    #[test]
    fn params_must_be_an_object() {
        assert!(parse_params("{}").unwrap().is_empty());
        let err = parse_params("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("JSON object"), "{err}");
        assert!(parse_params("{not json").is_err());
    }

    #[test]
    fn check_flags_unsafe_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = MacrogateConfig::default();

        let safe = dir.path().join("safe.py");
        std::fs::write(&safe, "import math\nresult = math.sqrt(16)\n").unwrap();
        assert!(check(&config, &safe).unwrap());

        let unsafe_file = dir.path().join("unsafe.py");
        std::fs::write(&unsafe_file, "import os\nos.system('true')\n").unwrap();
        assert!(!check(&config, &unsafe_file).unwrap());
    }

    #[test]
    fn builds_dispatcher_with_audit_file() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[logging]\naudit_log = {:?}\n",
            dir.path().join("audit.jsonl").display().to_string()
        );
        let config = MacrogateConfig::from_toml(&toml).unwrap();
        let dispatcher = build_dispatcher(&config, ReportLog::new(10)).unwrap();

        let response = dispatcher.dispatch(&Command::new("execute_code").with_param("code", "result = 3"));
        assert!(response.is_success());
        let audit = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(audit.lines().count(), 1);
    }
}
