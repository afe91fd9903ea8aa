use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleetlog::{router, AppState};
use fleetlog_core::{Config, FlatView, HostSummary, SearchRequest, SearchScope, SourceKind, TailRequest};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "fleetlog", about = "Browse and search logs across a fleet of hosts")]
struct Cli {
    /// Write debug logs to /tmp/fleetlog-debug.log (tail -f to inspect).
    #[arg(long, global = true)]
    debug: bool,

    /// Config file. Defaults to ~/.config/fleetlog/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// List configured hosts.
    Hosts,
    /// Enumerate log sources on every host.
    Scan {
        /// Group sources into a host x source matrix.
        #[arg(long)]
        matrix: bool,
    },
    /// Search every source on every host for a fixed string.
    Search {
        query: String,
        /// Restrict to these host ids (repeatable).
        #[arg(long = "host")]
        hosts: Vec<String>,
        /// Restrict to sources with this name.
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        case_sensitive: bool,
    },
    /// Print the last lines of one source.
    Tail {
        host: String,
        name: String,
        /// Treat NAME as a service unit instead of a file.
        #[arg(long)]
        unit: bool,
        #[arg(long)]
        lines: Option<usize>,
    },
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    if debug {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/fleetlog-debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
        tracing::info!("fleetlog debug log started, tail -f /tmp/fleetlog-debug.log");
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), value)?;
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug)?;

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let state = Arc::new(AppState::from_config(&config));

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            tracing::info!(%bind, hosts = state.registry.list_hosts().len(), "serving");
            axum::serve(listener, router(state)).await?;
        }
        Command::Hosts => {
            let hosts: Vec<HostSummary> = state.registry.list_hosts().iter().map(HostSummary::from).collect();
            print_json(&hosts)?;
        }
        Command::Scan { matrix } => {
            if matrix {
                print_json(state.scans.matrix().await.as_ref())?;
            } else {
                print_json(&FlatView::from(state.scans.flat().await.as_ref()))?;
            }
        }
        Command::Search {
            query,
            hosts,
            source,
            case_sensitive,
        } => {
            let request = SearchRequest {
                query,
                scope: SearchScope::parse(source.as_deref()),
                hosts,
                case_sensitive,
            };
            print_json(&state.search.search(&request).await?)?;
        }
        Command::Tail {
            host,
            name,
            unit,
            lines,
        } => {
            let request = TailRequest {
                host_id: host.into(),
                name,
                kind: if unit { SourceKind::ServiceUnit } else { SourceKind::File },
                lines,
            };
            print_json(&state.content.read_tail(&request).await?)?;
        }
    }
    Ok(())
}
