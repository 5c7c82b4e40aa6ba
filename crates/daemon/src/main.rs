// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Foreman Daemon (fmd)
//!
//! Background process that owns the per-blueprint queues and drives agent
//! executions. Startup: config → logging → recovery → HTTP listener.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use fm_daemon::{lifecycle, routes, Config, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Rotate the log when it crosses this size at startup.
const LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("fmd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("fmd {}", env!("CARGO_PKG_VERSION"));
                println!("Foreman daemon - executes blueprint plans through coding agents");
                println!();
                println!("USAGE:");
                println!("    fmd");
                println!();
                println!("Listens on http://127.0.0.1:$FM_HTTP_PORT (default 7410).");
                println!("State lives under $FM_STATE_DIR.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: fmd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load();
    std::fs::create_dir_all(&config.state_dir)?;
    rotate_log_if_needed(&config.log_path);

    let _log_guard = setup_logging(&config)?;

    info!(state_dir = %config.state_dir.display(), "starting foreman daemon");

    let daemon = match lifecycle::startup(&config).await {
        Ok(daemon) => daemon,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("fmd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "startup failed");
            return Err(err.into());
        }
    };

    info!(
        finalized = daemon.recovery_report.finalized,
        failed = daemon.recovery_report.failed,
        monitoring = daemon.recovery_report.monitoring,
        re_enqueued = daemon.recovery_report.re_enqueued,
        "recovery finished; binding listener"
    );

    // The listener binds only after recovery returned: no new run request can
    // race the triage above.
    let addr = format!("127.0.0.1:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");

    let app = routes::router(daemon.driver.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            return std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

fn rotate_log_if_needed(log_path: &std::path::Path) {
    let Ok(meta) = std::fs::metadata(log_path) else {
        return;
    };
    if meta.len() < LOG_ROTATE_BYTES {
        return;
    }
    let rotated = log_path.with_extension("log.1");
    if let Err(err) = std::fs::rename(log_path, &rotated) {
        eprintln!("warning: failed to rotate log: {err}");
    }
}
