//! agentgate - orchestration policy engine CLI
//!
//! ## Commands
//!
//! - `validate`: check one agent against the registry and its artifact
//! - `invoke`: validate and prepare an invocation bundle (never executes it)
//! - `spawn-hook`: run one spawn-gate decision over stdin/exit-code
//!
//! Every command prints the standard response envelope as JSON on stdout.
//! `validate`/`invoke` exit 0 on success and 1 on failure; `spawn-hook`
//! exits 0 to allow and 2 to block.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

use agentgate_core::{
    prepare, run_hook, validate, AuditLog, FsTeamDirectory, PolicyError, Registry,
    ResponseEnvelope, SpawnGate,
};

#[derive(Parser)]
#[command(name = "agentgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent-orchestration policy engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Audit trail file (newline-delimited JSON)
    #[arg(long, global = true, default_value = ".agentgate/audit.ndjson")]
    audit_log: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one agent against the registry and its artifact
    Validate {
        /// Agent name to validate
        #[arg(long)]
        agent: String,

        /// Registry YAML path
        #[arg(long, default_value = "registry.yaml")]
        registry: PathBuf,
    },

    /// Validate and prepare an invocation bundle (printed as JSON)
    Invoke {
        /// Agent name to invoke
        #[arg(long)]
        agent: String,

        /// Invocation parameter, repeatable as -p k=v
        #[arg(short, long = "param")]
        param: Vec<String>,

        /// Per-invocation timeout in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Registry YAML path
        #[arg(long, default_value = "registry.yaml")]
        registry: PathBuf,
    },

    /// Decide one spawn request read as JSON from stdin
    SpawnHook {
        /// Directory of per-team state files written by the host
        #[arg(long, default_value = ".agentgate/teams")]
        teams_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    agentgate_core::init_tracing(cli.json, level);

    let audit = AuditLog::open(&cli.audit_log)
        .map_err(|e| anyhow::anyhow!("cannot open audit log: {e}"))?;

    let exit_code = match cli.command {
        Commands::Validate { agent, registry } => {
            let envelope = cmd_validate(&registry, &agent);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            i32::from(!envelope.success)
        }
        Commands::Invoke {
            agent,
            param,
            timeout,
            registry,
        } => {
            let envelope = cmd_invoke(&registry, &agent, &param, timeout, &audit);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            i32::from(!envelope.success)
        }
        Commands::SpawnHook { teams_dir } => {
            let gate = SpawnGate::new(Arc::new(FsTeamDirectory::new(&teams_dir)), audit);
            run_hook(&gate, std::io::stdin().lock(), std::io::stderr().lock())
        }
    };

    std::process::exit(exit_code);
}

/// Validate one agent and wrap the result in the standard envelope.
fn cmd_validate(registry_path: &PathBuf, agent: &str) -> ResponseEnvelope {
    let registry = match Registry::load(registry_path) {
        Ok(r) => r,
        Err(e) => return ResponseEnvelope::from_error(&e),
    };
    let result = validate(&registry, agent);
    match result.to_error() {
        None => ResponseEnvelope::ok(
            serde_json::to_value(&result).unwrap_or(serde_json::Value::Null),
        ),
        Some(err) => ResponseEnvelope::from_error(&err),
    }
}

/// Validate, prepare, and wrap the bundle in the standard envelope.
fn cmd_invoke(
    registry_path: &PathBuf,
    agent: &str,
    raw_params: &[String],
    timeout: u64,
    audit: &AuditLog,
) -> ResponseEnvelope {
    let registry = match Registry::load(registry_path) {
        Ok(r) => r,
        Err(e) => return ResponseEnvelope::from_error(&e),
    };

    let params = match parse_params(raw_params) {
        Ok(p) => p,
        Err(e) => return ResponseEnvelope::from_error(&e),
    };

    let validation = validate(&registry, agent);
    match prepare(&validation, params, timeout, audit) {
        Ok(bundle) => ResponseEnvelope::ok(
            serde_json::to_value(&bundle).unwrap_or(serde_json::Value::Null),
        ),
        Err(e) => ResponseEnvelope::from_error(&e),
    }
}

/// Parse repeated `k=v` arguments into opaque key/value pairs.
fn parse_params(raw: &[String]) -> agentgate_core::Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            return Err(PolicyError::InvalidInput(format!(
                "parameter '{item}' is not of the form k=v"
            )));
        };
        if key.is_empty() {
            return Err(PolicyError::InvalidInput(format!(
                "parameter '{item}' has an empty key"
            )));
        }
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}
