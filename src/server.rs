//! Owns the listening endpoint for one SOCKS version. Accepts connections
//! and hands each to a newly spawned session task; one acceptor per server
//! instance, one SOCKS version per instance (selected at construction).

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::access::CheckAccess;
use crate::session::socks4::Socks4Session;
use crate::session::socks5::Socks5Session;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocksVersion {
    V4,
    V5,
}

impl std::fmt::Display for SocksVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => f.write_str("socks4"),
            Self::V5 => f.write_str("socks5"),
        }
    }
}

pub struct Server<A: CheckAccess> {
    version: SocksVersion,
    bind_addr: String,
    access: Arc<A>,
    stop: Arc<Notify>,
}

impl<A: CheckAccess + 'static> Server<A> {
    pub fn new(version: SocksVersion, port: u16, access: A) -> Self {
        Self {
            version,
            bind_addr: format!("0.0.0.0:{port}"),
            access: Arc::new(access),
            stop: Arc::new(Notify::new()),
        }
    }

    /// A handle that, when notified, stops [`Server::run`] after its current
    /// accept call returns.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    /// Runs the accept loop until `stop_handle().notify_one()` is called. A
    /// transient bind failure is logged and retried rather than propagated,
    /// except on the very first bind, which is fatal (§6/§7: acceptor bind
    /// failing at startup propagates to main).
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!(version = %self.version, addr = %self.bind_addr, "listening");

        loop {
            tokio::select! {
                _ = self.stop.notified() => {
                    info!(version = %self.version, "acceptor stopping");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let access = self.access.clone();
                            let version = self.version;
                            tokio::spawn(async move {
                                match version {
                                    SocksVersion::V4 => {
                                        Socks4Session::new(peer_addr, access).run(stream).await
                                    }
                                    SocksVersion::V5 => {
                                        Socks5Session::new(peer_addr, access).run(stream).await
                                    }
                                }
                            });
                        }
                        Err(err) => {
                            warn!(version = %self.version, reason = %err, "accept failed, retrying");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
            }
        }
    }
}
