//! boss - launch a container from a TOML file
//!
//! ## Usage
//!
//! ```sh
//! boss run redis.toml
//! boss --namespace prod --log-path /srv/logs run redis.toml
//! ```
//!
//! Progress lines go to stdout, diagnostics to stderr. Set `RUST_LOG` or pass
//! `--debug` for more detail.

use boss::constants::{DEFAULT_LOG_DIR, DEFAULT_NAMESPACE};
use boss::{Context, LaunchOptions, Launcher, LocalConnector, StdoutReporter};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "boss", version, about = "Launch a single OCI container")]
struct Cli {
    /// Runtime namespace
    #[arg(long, global = true, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Directory container log paths are recorded under
    #[arg(long = "log-path", global = true, default_value = DEFAULT_LOG_DIR)]
    log_path: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the container described by a TOML file
    Run {
        /// Path to the launch file
        config: PathBuf,
    },
}

fn init_logging(debug: bool) {
    let default = if debug { "boss=debug" } else { "boss=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling launch");
            on_signal.cancel();
        }
    });

    let options = LaunchOptions {
        namespace: cli.namespace,
        log_dir: cli.log_path,
        ..LaunchOptions::default()
    };
    let ctx = Context::with_cancellation(options.namespace.clone(), cancel);
    let launcher = Launcher::new(
        Arc::new(LocalConnector::new()),
        Arc::new(StdoutReporter),
        options,
    );

    match cli.command {
        Commands::Run { config } => match launcher.launch_file(&ctx, &config).await {
            Ok(launched) => {
                debug!(id = %launched.id, pid = ?launched.pid, "launch complete");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}
