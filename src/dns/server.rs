use crate::config::SharedConfig;
use crate::dns::handlers::Handler;
use crate::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Largest datagram read from the socket.
const MAX_DATAGRAM_LEN: usize = 4096;

/// A UDP DNS listener. Every datagram is handled by its own task.
pub struct Server {
    socket: Arc<UdpSocket>,
    handler: Handler,
}

/// Bind the UDP socket from `config`, answering with `handler`.
///
/// # Errors
///
/// Returns an error if the socket can't be bound.
pub async fn new(config: SharedConfig, handler: Handler) -> Result<Server, Error> {
    let socket = UdpSocket::bind(config.dns_udp_bind_addr).await?;
    Ok(Server {
        socket: Arc::new(socket),
        handler,
    })
}

impl Server {
    /// # Errors
    ///
    /// Returns an error if the socket address can't be read.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve datagrams until the task is dropped.
    ///
    /// # Errors
    ///
    /// None are returned. A failed receive, e.g. an ICMP error reported for an earlier answer,
    /// is logged and the next datagram is awaited.
    pub async fn block_until_done(self) -> Result<(), Error> {
        let mut buf = vec![0_u8; MAX_DATAGRAM_LEN];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    warn!("failed to receive datagram: {err}");
                    continue;
                }
            };
            let datagram = buf[..len].to_vec();
            let socket = self.socket.clone();
            let handler = self.handler.clone();
            tokio::spawn(async move {
                let Some(response) = handler.handle_datagram(&datagram).await else {
                    debug!("no response for {len} byte datagram from {peer}");
                    return;
                };
                if let Err(err) = socket.send_to(&response, peer).await {
                    warn!("failed to answer {peer}: {err}");
                }
            });
        }
    }
}
