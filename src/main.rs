use std::{net::SocketAddr, sync::Arc};

use env_logger::{Builder, Target};

use log::{error, info};

use tokio::signal;

use gnss_simcast::{
    BROADCAST_ADDR, BROADCAST_PORT, Core, HTTP_PORT, broadcast::BroadcastReceiver, cli::Cli,
    server::LocalServer,
};

#[tokio::main]
pub async fn main() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    // cli
    let cli = Cli::new();
    let shifts = cli.svid_shifts();

    // composition root: one long lived context, no globals
    let core = Arc::new(Core::new(shifts));

    let broadcast_bind: SocketAddr = format!("0.0.0.0:{}", BROADCAST_PORT)
        .parse()
        .unwrap_or_else(|e| panic!("invalid broadcast address: {}", e));

    let broadcast_target: SocketAddr = format!("{}:{}", BROADCAST_ADDR, BROADCAST_PORT)
        .parse()
        .unwrap_or_else(|e| panic!("invalid broadcast address: {}", e));

    let server_bind: SocketAddr = format!("127.0.0.1:{}", HTTP_PORT)
        .parse()
        .unwrap_or_else(|e| panic!("invalid server address: {}", e));

    // a failed bind disables that subsystem only,
    // the rest of the system keeps running without it
    match BroadcastReceiver::bind(core.clone(), broadcast_bind).await {
        Ok(receiver) => {
            tokio::spawn(receiver.run());
        },
        Err(e) => {
            error!("broadcast receiver not started: {}", e);
        },
    }

    match LocalServer::bind(server_bind, broadcast_target).await {
        Ok(server) => {
            tokio::spawn(server.run());
        },
        Err(e) => {
            error!("local server not started: {}", e);
        },
    }

    info!("application deployed");

    signal::ctrl_c()
        .await
        .unwrap_or_else(|e| panic!("Tokio signal handling error: {}", e));

    info!("shutting down");
}
