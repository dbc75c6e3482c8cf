mod telemetry;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glbtrace_core::config::Config;
use glbtrace_ingest::mapper::{MapperConfig, SpanMapper};
use glbtrace_ingest::otlp::export::{ExportConfig, build_exporter};
use glbtrace_ingest::server::run_push_server;
use glbtrace_ingest::sink::{MemorySink, OtlpSink, SinkConfig};

use crate::telemetry::{LogFormat, init_cli_tracing, init_run_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "glbtrace")]
#[command(about = "Turn load balancer request logs from Pub/Sub into trace spans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Serve the Pub/Sub push endpoint and export spans")]
    Run {
        #[arg(long)]
        listen_addr: Option<String>,
        #[arg(long)]
        sink_endpoint: Option<String>,
        #[arg(long, help = "grpc or http/protobuf")]
        sink_protocol: Option<String>,
        #[arg(long, help = "Backend API key (default: $HONEYCOMB_APIKEY)")]
        api_key: Option<String>,
        #[arg(long, help = "Backend dataset (default: $HONEYCOMB_DATASET)")]
        dataset: Option<String>,
    },
    #[command(about = "Map one push message (or raw log record) and print the span")]
    Map {
        #[arg(help = "Input file; reads stdin when omitted")]
        file: Option<PathBuf>,
        #[arg(long, help = "Input is a log record, not a push envelope")]
        raw: bool,
    },
}

#[derive(Debug, Default)]
struct RunOverrides {
    listen_addr: Option<String>,
    sink_endpoint: Option<String>,
    sink_protocol: Option<String>,
    api_key: Option<String>,
    dataset: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            listen_addr,
            sink_endpoint,
            sink_protocol,
            api_key,
            dataset,
        } => {
            run_server(RunOverrides {
                listen_addr,
                sink_endpoint,
                sink_protocol,
                api_key,
                dataset,
            })
            .await
        }
        Commands::Map { file, raw } => {
            init_cli_tracing();
            run_map(file, raw)
        }
    }
}

async fn run_server(overrides: RunOverrides) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load config")?;
    apply_run_overrides(&mut cfg, overrides);

    init_run_tracing(LogFormat::from_env());
    if uses_default_listen_addr(&cfg) {
        tracing::info!(addr = %cfg.listen_addr, "no listen address or PORT set, using default");
    }
    cfg.validate().context("invalid configuration")?;
    tracing::info!(config = ?cfg, "starting glbtrace");

    let addr = cfg.listen_socket_addr()?;
    let exporter = build_exporter(&ExportConfig::from(&cfg)).context("build span exporter")?;
    let (sink, sink_handle) = OtlpSink::start(SinkConfig::from(&cfg), exporter);
    let mapper = SpanMapper::new(MapperConfig::from(&cfg), Arc::new(sink));

    let served = run_push_server(addr, mapper, shutdown_signal()).await;

    // Flush buffered spans whether or not the server exited cleanly.
    sink_handle.close().await;
    shutdown_tracing();
    served.context("push server")?;
    Ok(())
}

fn apply_run_overrides(cfg: &mut Config, overrides: RunOverrides) {
    if let Some(v) = overrides.listen_addr {
        cfg.listen_addr = v;
    }
    if let Some(v) = overrides.sink_endpoint {
        cfg.sink_endpoint = v;
    }
    if let Some(v) = overrides.sink_protocol {
        cfg.sink_protocol = v;
    }
    if let Some(v) = overrides.api_key {
        cfg.api_key = Some(v);
    }
    if let Some(v) = overrides.dataset {
        cfg.dataset = Some(v);
    }
}

fn uses_default_listen_addr(cfg: &Config) -> bool {
    cfg.listen_addr == Config::default().listen_addr
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = ?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = ?err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested, draining spans");
}

fn run_map(file: Option<PathBuf>, raw: bool) -> anyhow::Result<()> {
    let input = match &file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("read stdin")?;
            buf
        }
    };

    // Credentials are not needed to map offline, so the config is not validated.
    let cfg = Config::load().context("load config")?;
    let sink = MemorySink::new();
    let mapper = SpanMapper::new(MapperConfig::from(&cfg), Arc::new(sink.clone()));
    if raw {
        mapper.map_and_emit(&input)?;
    } else {
        mapper.process_push(&input)?;
    }

    for span in sink.take() {
        println!("{}", serde_json::to_string_pretty(&span)?);
    }
    Ok(())
}
