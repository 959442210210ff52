//! Surface satellite daemon entry point.
//!
//! Loads the configuration, connects to the Companion server and keeps every
//! attached surface registered until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! satellite [OPTIONS]
//!
//! Options:
//!   --config <PATH>      Config file [default: satellite.toml]
//!   --host <HOST>        Companion host (TCP mode)
//!   --port <PORT>        Companion port (TCP mode)
//!   --ws-url <URL>       Connect over WebSocket instead of TCP
//!   --log-level <LEVEL>  Log filter when RUST_LOG is unset
//!   --save-config        Write the effective configuration back to --config
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Flag          |
//! |---------------------|---------------|
//! | `SATELLITE_CONFIG`  | `--config`    |
//! | `SATELLITE_HOST`    | `--host`      |
//! | `SATELLITE_PORT`    | `--port`      |
//! | `SATELLITE_WS_URL`  | `--ws-url`    |
//! | `SATELLITE_LOG`     | `--log-level` |
//!
//! CLI flags and environment variables override the config file.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ ConnectionManager::new()  -- socket owner, emits ClientEvent
//!  └─ SurfaceRegistry::run()     -- routes events to SurfaceProxy by id
//!  └─ add_surface(demo driver)   -- recording mock until a vendor driver is wired in
//!  └─ ctrl_c → disconnect, close surfaces
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use satellite_client::application::surface_registry::{StatusTimings, SurfaceRegistry};
use satellite_client::infrastructure::config::{ClientConfig, ConnectionMode};
use satellite_client::infrastructure::driver::mock::MockSurfaceDriver;
use satellite_client::infrastructure::driver::SolidCardRenderer;
use satellite_client::infrastructure::network::{ConnectionManager, ConnectionTimings};
use satellite_core::{PincodeMap, RegisterProps};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Connects local control surfaces to a Companion server.
#[derive(Debug, Parser)]
#[command(
    name = "satellite",
    about = "Bridges control-surface hardware to a Companion server",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means defaults.
    #[arg(long, default_value = "satellite.toml", env = "SATELLITE_CONFIG")]
    config: PathBuf,

    /// Companion host for TCP mode.
    #[arg(long, env = "SATELLITE_HOST")]
    host: Option<String>,

    /// Companion satellite port for TCP mode.
    #[arg(long, env = "SATELLITE_PORT")]
    port: Option<u16>,

    /// WebSocket URL.  Setting it switches to WebSocket mode.
    #[arg(long, env = "SATELLITE_WS_URL")]
    ws_url: Option<String>,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[arg(long, env = "SATELLITE_LOG")]
    log_level: Option<String>,

    /// Write the effective configuration back to `--config` and continue.
    #[arg(long)]
    save_config: bool,

    /// Columns of the demo surface.
    #[arg(long, default_value_t = 8)]
    demo_columns: u32,

    /// Rows of the demo surface.
    #[arg(long, default_value_t = 4)]
    demo_rows: u32,
}

impl Cli {
    /// Applies flag and environment overrides on top of the file config.
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
            config.connection.mode = ConnectionMode::Tcp;
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(url) = &self.ws_url {
            config.connection.url = url.clone();
            config.connection.mode = ConnectionMode::Ws;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

fn demo_props(columns: u32, rows: u32) -> RegisterProps {
    let mut props = RegisterProps::grid(columns, rows);
    props.bitmap_size = Some(72);
    props.colours = true;
    props.text = true;
    props.brightness = true;
    props.pincode_map = PincodeMap::single_page_for_grid(columns, rows);
    props
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply(&mut config);

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("satellite starting");

    if cli.save_config {
        config
            .save_to(&cli.config)
            .with_context(|| format!("saving {}", cli.config.display()))?;
        info!("configuration written to {}", cli.config.display());
    }

    // ── Connection and surfaces ───────────────────────────────────────────────
    let (manager, events) = ConnectionManager::new(ConnectionTimings::default());
    let registry = SurfaceRegistry::new(
        manager.clone(),
        Arc::new(SolidCardRenderer::default()),
        StatusTimings::default(),
    );
    let dispatch = tokio::spawn(Arc::clone(&registry).run(events));

    let demo = MockSurfaceDriver::new("satellite-demo", demo_props(cli.demo_columns, cli.demo_rows))
        .with_product_name("Satellite Demo Surface");
    registry
        .add_surface(Arc::new(demo))
        .await
        .context("attaching demo surface")?;

    let details = config.connection.to_details();
    info!("connecting to {details}");
    manager.connect(details);

    // ── Run until Ctrl+C ──────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    manager.disconnect();
    registry.close_all().await;
    dispatch.abort();

    info!("satellite stopped");
    Ok(())
}
