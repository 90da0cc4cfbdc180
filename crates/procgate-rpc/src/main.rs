//! procgate RPC server - exposes a process manager over JSON-RPC.
//!
//! Only allow-listed process manager operations are callable. The bound
//! endpoint is printed as `RPC_ENDPOINT=<url>` on stdout.

use anyhow::Result;
use clap::Parser;
use procgate_core::process::{ProcessManager, DEFAULT_ALLOWLIST};
use procgate_core::{NetworkConfig, ProcessConfig, RpcEndpoint, RpcProxy, ShutdownToken};
use procgate_rpc::{listen_for_signals, RpcServer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "procgate-rpc")]
#[command(about = "Allow-listed JSON-RPC control of a local process manager")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = NetworkConfig::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = NetworkConfig::DEFAULT_HOST)]
    host: String,

    /// URL path served; every other path is rejected
    #[arg(long, default_value = NetworkConfig::DEFAULT_RPC_PATH)]
    path: String,

    /// Method to allow (repeatable; defaults to the standard process set)
    #[arg(long = "allow", value_name = "METHOD")]
    allow: Vec<String>,

    /// Directory for managed process logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.debug, args.log_json);

    info!("Starting procgate RPC server");

    let log_dir = args
        .log_dir
        .unwrap_or_else(|| std::env::temp_dir().join("procgate"));

    let allowlist = if args.allow.is_empty() {
        DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect()
    } else {
        args.allow
    };

    let manager = Arc::new(ProcessManager::new(&log_dir)?);
    info!("Process log directory: {}", manager.log_dir().display());
    let proxy = RpcProxy::builder(ProcessManager::command_table())
        .allow(allowlist)
        .on_exit(|manager: &ProcessManager| {
            let stopped = manager.stop_all(ProcessConfig::STOP_TIMEOUT)?;
            info!("Stopped {} managed processes on exit", stopped.len());
            Ok(())
        })
        .build(manager)?;

    let endpoint = RpcEndpoint::new(args.host, args.port, &args.path);
    let server = RpcServer::bind(&endpoint, Arc::new(proxy)).await?;

    // Print endpoint for the parent process to read (intentional stdout)
    println!("RPC_ENDPOINT={}", server.endpoint().url());

    let shutdown = ShutdownToken::new();
    listen_for_signals(shutdown.clone());

    let outcome = server.run(shutdown).await?;
    if outcome.termination_requested {
        warn!("A remote caller had signalled termination");
    }
    info!("RPC server stopped ({})", outcome.reason);

    Ok(ExitCode::from(outcome.exit_code()))
}
