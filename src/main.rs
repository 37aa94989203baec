mod commands;
mod error;
mod k8s;
mod models;
mod utils;

use clap::{ArgAction, Args, Parser, Subcommand};
use error::AnalyzeError;
use k8s::{ConnectionOptions, KubeSource};
use models::SelectionFilter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kubectl-analyze", about = "Analyze how pods use the resources they request", author, version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log more (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Path to the kubeconfig file to use
    #[arg(long, global = true, value_name = "FILE")]
    kubeconfig: Option<PathBuf>,
    /// The name of the kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,
    /// The name of the kubeconfig cluster to use
    #[arg(long, global = true)]
    cluster: Option<String>,
    /// The name of the kubeconfig user to use
    #[arg(long, global = true)]
    user: Option<String>,
    /// The address and port of the Kubernetes API server
    #[arg(long, short = 's', global = true)]
    server: Option<String>,
    /// Bearer token for authentication to the API server
    #[arg(long, global = true)]
    token: Option<String>,
    /// Username to impersonate for the operation
    #[arg(long = "as", global = true, value_name = "USER")]
    impersonate: Option<String>,
    /// How long to wait for a single server response, e.g. 30s, 2m; 0 waits forever
    #[arg(long, global = true, value_parser = k8s::parse_request_timeout)]
    request_timeout: Option<Duration>,
}

impl From<ConnectionArgs> for ConnectionOptions {
    fn from(a: ConnectionArgs) -> Self {
        Self {
            kubeconfig: a.kubeconfig,
            context: a.context,
            cluster: a.cluster,
            user: a.user,
            server: a.server,
            token: a.token,
            impersonate: a.impersonate,
            request_timeout: a.request_timeout,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List pods whose live usage reaches a multiple of their requests
    #[command(override_usage = "kubectl-analyze podusage [NAME | -n namespace | -N node-name] [flags]")]
    Podusage {
        /// Pod name. Combined with -n, fetches exactly that pod
        name: Option<String>,
        /// Namespace to search
        #[arg(short, long)]
        namespace: Option<String>,
        /// Only pods scheduled on this node
        #[arg(short = 'N', long)]
        node_name: Option<String>,
        /// Report pods whose usage/request ratio is at least this (0 reports every pod with metrics)
        #[arg(short, long, default_value_t = 1.5, allow_negative_numbers = true, value_parser = parse_multiple)]
        multiple: f64,
    },
}

fn parse_multiple(s: &str) -> Result<f64, String> {
    let m: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !m.is_finite() {
        return Err(format!("multiple must be a finite number, got {s}"));
    }
    Ok(m)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

async fn run(cli: Cli) -> Result<(), AnalyzeError> {
    // 1. Initialize Crypto
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        log::debug!("rustls crypto provider already installed");
    }

    // 2. Initialize Client ONCE
    let pb = utils::create_spinner("Initializing Kubernetes client...");
    let client = k8s::connect(&cli.connection.into()).await;
    pb.finish_and_clear();
    let source = KubeSource::new(client?);

    match cli.command {
        Commands::Podusage { name, namespace, node_name, multiple } => {
            let filter = SelectionFilter {
                name: name.unwrap_or_default(),
                namespace: namespace.unwrap_or_default(),
                node_name: node_name.unwrap_or_default(),
            };
            commands::podusage::run(source, filter, multiple).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_podusage_defaults() {
        let cli = Cli::try_parse_from(["kubectl-analyze", "podusage", "-n", "default"]).unwrap();
        let Commands::Podusage { name, namespace, node_name, multiple } = cli.command;
        assert!(name.is_none());
        assert_eq!(namespace.as_deref(), Some("default"));
        assert!(node_name.is_none());
        assert_eq!(multiple, 1.5);
    }

    #[test]
    fn test_podusage_flags() {
        let cli = Cli::try_parse_from([
            "kubectl-analyze",
            "podusage",
            "web-0",
            "-N",
            "node-1",
            "-m",
            "2",
            "--context",
            "prod",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.connection.context.as_deref(), Some("prod"));
        let Commands::Podusage { name, node_name, multiple, .. } = cli.command;
        assert_eq!(name.as_deref(), Some("web-0"));
        assert_eq!(node_name.as_deref(), Some("node-1"));
        assert_eq!(multiple, 2.0);
    }

    #[test]
    fn test_multiple_accepts_any_finite_number() {
        assert_eq!(parse_multiple("1.2"), Ok(1.2));
        assert_eq!(parse_multiple("0"), Ok(0.0));
        assert_eq!(parse_multiple("-1"), Ok(-1.0));
        assert!(parse_multiple("NaN").is_err());
        assert!(parse_multiple("inf").is_err());
        assert!(parse_multiple("lots").is_err());
    }

    #[test]
    fn test_connection_flags() {
        let cli = Cli::try_parse_from([
            "kubectl-analyze",
            "podusage",
            "-n",
            "default",
            "--server",
            "https://api.example.com:6443",
            "--token",
            "abc",
            "--as",
            "auditor",
            "--request-timeout",
            "2m",
        ])
        .unwrap();
        let opts = ConnectionOptions::from(cli.connection);
        assert_eq!(opts.server.as_deref(), Some("https://api.example.com:6443"));
        assert_eq!(opts.token.as_deref(), Some("abc"));
        assert_eq!(opts.impersonate.as_deref(), Some("auditor"));
        assert_eq!(opts.request_timeout, Some(Duration::from_secs(120)));
    }
}
