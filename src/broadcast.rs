use std::{net::SocketAddr, sync::Arc};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::{
    MAX_BODY,
    core::Core,
    protocol::{Envelope, OP_UPDATE_LOCATION, OP_UPDATE_SATELLITES},
};

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("failed to bind broadcast port {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Connectionless ingress: one long lived receive loop per consuming
/// process, fed by datagrams on the local broadcast address.
pub struct BroadcastReceiver {
    socket: UdpSocket,
    core: Arc<Core>,
}

impl BroadcastReceiver {
    /// Binds the broadcast port. A failure here disables this
    /// subsystem only, the caller keeps the rest running.
    pub async fn bind(core: Arc<Core>, addr: SocketAddr) -> Result<Self, BroadcastError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| BroadcastError::Bind { addr, source })?;

        Ok(Self { socket, core })
    }

    /// Local address the receiver is actually bound on.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop. A malformed datagram never terminates it; the
    /// loop exits only on a hard receive failure or socket closure,
    /// and does not restart itself.
    pub async fn run(self) {
        let mut buffer = [0u8; MAX_BODY];

        info!(
            "broadcast receiver deployed on {}",
            self.local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        );

        loop {
            match self.socket.recv(&mut buffer).await {
                Ok(len) => self.handle_datagram(&buffer[..len]),
                Err(e) => {
                    warn!("failed to receive broadcast packet: {}", e);
                    break;
                },
            }
        }

        info!("broadcast receiver stopped");
    }

    fn handle_datagram(&self, data: &[u8]) {
        let envelope = match Envelope::parse(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("failed to process broadcast data: {}", e);
                return;
            },
        };

        match envelope.op.as_str() {
            OP_UPDATE_LOCATION => match envelope.location_update() {
                Ok(update) => {
                    debug!("location update: {:?}", update);
                    self.core.location.apply(&update);
                },
                Err(e) => warn!("malformed location update: {}", e),
            },
            OP_UPDATE_SATELLITES => match envelope.satellite_entries() {
                Ok(entries) => {
                    debug!("satellite update: {} entries", entries.len());
                    self.core.satellites.apply(&entries);
                },
                Err(e) => warn!("malformed satellite update: {}", e),
            },
            other => warn!("unknown update type: {}", other),
        }
    }
}
