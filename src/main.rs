//! cache-harness command-line entry point.
//!
//! - `client <host> <port> <runtime-secs> <delay-us>` drives the request loop
//! - `launch [<threads>] <ttl-secs>` starts a server and prints its port

use cache_harness::client::{self, ThreadTimer};
use cache_harness::config::{ClientConfig, Config, LaunchConfig, Mode};
use cache_harness::launcher::{self, probe_alive};
use cache_harness::Result;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_level);

    let result = match config.mode {
        Mode::Client(client) => run_client(&client),
        Mode::Launch(launch) => run_launch(launch),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(class = ?e.class(), error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run the stats request loop against a running server
fn run_client(config: &ClientConfig) -> Result<()> {
    let report = client::run(config, &ThreadTimer)?;
    info!(
        iterations = report.iterations,
        started_at = %report.started_at.to_rfc3339(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Dummy stats cachedump requests processed; server shut down"
    );
    Ok(())
}

/// Launch a server and report the port it bound
fn run_launch(config: LaunchConfig) -> Result<()> {
    info!(
        server = %config.server_binary.display(),
        ttl_secs = config.ttl_secs,
        threads = ?config.threads,
        daemon = config.daemon,
        "Starting server"
    );

    let server = launcher::start_server(config)?;
    probe_alive(server.pid)?;

    println!("Server started at port {}.", server.port);
    info!(port = server.port, pid = server.pid, "Server is up");
    Ok(())
}
