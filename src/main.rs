//! Entry point: loads config, wires up the shared state, and serves the
//! local UI control socket until the process exits.

mod codec;
mod config;
mod control;
mod error;
mod proto;
mod resolve;
mod session;
mod state;
mod telemetry;
mod ui;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::control::ControlPlane;
use crate::error::BridgeError;
use crate::ui::channel::UiChannel;

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    let config = config::Config::load();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (ui_channel, commands_rx) = UiChannel::new();
    let ui_channel = Arc::new(ui_channel);
    let control_plane = ControlPlane::new(ui_channel.clone());
    tokio::spawn(control_plane.run(commands_rx));

    ui::transport::serve(&config.listen_addr, ui_channel).await
}
