//! Clock and weather dashboard for the TCP display.
//!
//! Run with: cargo run --features cli
//!
//! Reads `tiledisplay.yaml` from the working directory (or the file named by
//! `TILEDISPLAY_CONFIG`); without one, built-in defaults are used. Log
//! verbosity follows `RUST_LOG` and defaults to `info`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use tiledisplay::{
    Config, DashboardRenderer, OpenMeteo, SessionLoop, SystemClock, TcpConnector,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "tiledisplay.yaml";

fn load_config() -> Result<Config, tiledisplay::Error> {
    let path = std::env::var_os("TILEDISPLAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if path.exists() {
        tracing::info!("Loading config from {}", path.display());
        Config::load(&path)
    } else {
        tracing::info!("No config at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Display {} ({}x{}), tile payload {} bytes",
        config.address(),
        config.display_width,
        config.display_height,
        config.tile_payload_size
    );

    let mut session = SessionLoop::new(
        &config,
        TcpConnector::from_config(&config),
        DashboardRenderer::from_config(&config),
        OpenMeteo::new(config.latitude, config.longitude),
        SystemClock::from_config(&config),
    );

    // Never set: the process runs until it is terminated.
    let shutdown = AtomicBool::new(false);
    session.run(&shutdown);
    ExitCode::SUCCESS
}
