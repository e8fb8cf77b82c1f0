//! `iremoted`: print the events of an infrared remote and optionally turn its Right/Left
//! buttons into slide transitions.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use iremoted::device::{self, TARGET_DEVICE_NAME};
use iremoted::forward::{DatagramSink, DEFAULT_APP_ID};
use iremoted::{run, Error, LoopExit, RunConfig, EX_OSERR};

/// Displays events received from an infrared remote control.
#[derive(Debug, Parser)]
#[command(name = "iremoted", version, about)]
struct Cli {
    /// Use forward/backward button presses for slide transitions.
    #[arg(short, long, env = "IREMOTED_KEYNOTE")]
    keynote: bool,

    /// Name of the input device to monitor.
    #[arg(long, default_value = TARGET_DEVICE_NAME, env = "IREMOTED_DEVICE_NAME")]
    device_name: String,

    /// Open this event node directly instead of searching by name.
    #[arg(long, value_name = "PATH", env = "IREMOTED_DEVICE")]
    device: Option<PathBuf>,

    /// Identifier of the application slide commands are addressed to.
    #[arg(long, value_name = "ID", default_value = DEFAULT_APP_ID, env = "IREMOTED_APP_ID")]
    app_id: String,

    /// Socket slide commands are sent to [default: $XDG_RUNTIME_DIR/<APP_ID>.sock]
    #[arg(long, value_name = "PATH", env = "IREMOTED_SOCKET")]
    socket: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Logs go to stderr; stdout carries the event lines.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("iremoted: failed to create run loop: {e}");
            return ExitCode::from(EX_OSERR);
        }
    };

    match runtime.block_on(monitor(cli)) {
        Ok(exit) => {
            tracing::info!(?exit, "exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("iremoted: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn monitor(cli: Cli) -> Result<LoopExit, Error> {
    let remote = match &cli.device {
        Some(path) => device::open_path(path)?,
        None => device::discover(&cli.device_name)?,
    };
    tracing::debug!("{remote}");

    let socket = cli
        .socket
        .unwrap_or_else(|| DatagramSink::default_path(&cli.app_id));
    let sink = DatagramSink::new(cli.app_id, socket);
    let config = RunConfig {
        forwarding: cli.keynote,
        ..RunConfig::default()
    };

    run::run(remote, &config, std::io::stdout(), sink, shutdown_signal()).await
}

/// Resolves on SIGINT or SIGTERM. If neither can be listened for, never resolves.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => Some(term),
        Err(e) => {
            tracing::warn!("failed to listen for SIGTERM: {e}");
            None
        }
    };
    let term = async {
        match term.as_mut() {
            Some(term) => {
                term.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    let int = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!("failed to listen for SIGINT: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        () = int => tracing::info!("received SIGINT"),
        () = term => tracing::info!("received SIGTERM"),
    }
}
