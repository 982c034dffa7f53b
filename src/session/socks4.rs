use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use crate::access::CheckAccess;
use crate::addr::SocksAddr;
use crate::codec::socks4::{self, Socks4Command, Socks4Status};
use crate::error::SocksError;

use super::{next_session_id, read_frame, relay, Phase, BUF_SIZE};

/// One instance per accepted downstream connection on a SOCKS4-only server.
pub struct Socks4Session<A: CheckAccess> {
    id: u64,
    peer_addr: SocketAddr,
    access: Arc<A>,
}

impl<A: CheckAccess + 'static> Socks4Session<A> {
    pub fn new(peer_addr: SocketAddr, access: Arc<A>) -> Self {
        Self {
            id: next_session_id(),
            peer_addr,
            access,
        }
    }

    pub async fn run(self, mut downstream: TcpStream) {
        let id = self.id;
        let peer = self.peer_addr;
        let reason = match self.drive(&mut downstream).await {
            Ok(()) => "eof".to_string(),
            Err(err) => err.to_string(),
        };
        let _ = downstream.shutdown().await;
        info!(session = id, remote = %peer, phase = %Phase::Closed, reason = %reason, "session closed");
    }

    async fn drive(&self, downstream: &mut TcpStream) -> Result<(), SocksError> {
        let local_addr = downstream.local_addr()?;
        let mut buf = [0u8; BUF_SIZE];
        let mut filled = 0usize;

        let request = match read_frame(downstream, &mut buf, &mut filled, socks4::decode_request).await
        {
            Ok(request) => request,
            Err(err) => {
                self.reply(downstream, Socks4Status::Rejected, 0, [0, 0, 0, 0])
                    .await
                    .ok();
                return Err(err);
            }
        };

        let address = SocksAddr::Ipv4(SocketAddrV4::new(Ipv4Addr::from(request.ipv4), request.port));
        let user = String::from_utf8_lossy(&request.user).into_owned();

        if !self.access.check_access(self.peer_addr, &user, &address).await {
            self.reply(downstream, Socks4Status::Rejected, request.port, [0, 0, 0, 0])
                .await?;
            return Err(SocksError::AccessDenied(address));
        }

        match request.command {
            Socks4Command::Connect => self.connect(downstream, address).await,
            Socks4Command::Bind => self.bind(downstream, local_addr, address).await,
        }
    }

    async fn reply(
        &self,
        downstream: &mut TcpStream,
        status: Socks4Status,
        port: u16,
        ipv4: [u8; 4],
    ) -> Result<(), SocksError> {
        let mut buf = Vec::with_capacity(8);
        socks4::encode_reply(&mut buf, status, port, ipv4);
        downstream.write_all(&buf).await?;
        Ok(())
    }

    async fn connect(&self, downstream: &mut TcpStream, address: SocksAddr) -> Result<(), SocksError> {
        let dest_port = address.port();
        match TcpStream::connect((address.host(), address.port())).await {
            Ok(mut upstream) => {
                self.reply(downstream, Socks4Status::Granted, dest_port, [0, 0, 0, 0])
                    .await?;
                relay::relay(downstream, &mut upstream, self.id).await
            }
            Err(err) => {
                self.reply(downstream, Socks4Status::Rejected, dest_port, [0, 0, 0, 0])
                    .await?;
                Err(err.into())
            }
        }
    }

    /// Binds a fresh ephemeral acceptor, reports its address, then accepts
    /// exactly one connection as the upstream endpoint. Legacy SOCKS4
    /// servers send a second reply once the accept completes; that is not
    /// required here (§4.2) and is left as an extension point.
    async fn bind(
        &self,
        downstream: &mut TcpStream,
        local_addr: SocketAddr,
        _address: SocksAddr,
    ) -> Result<(), SocksError> {
        let listener = match TcpListener::bind((local_addr.ip(), 0)).await {
            Ok(listener) => listener,
            Err(err) => {
                self.reply(downstream, Socks4Status::Rejected, 0, [0, 0, 0, 0])
                    .await?;
                return Err(err.into());
            }
        };

        let bound = listener.local_addr()?;
        let (port, ipv4) = match bound {
            SocketAddr::V4(addr) => (addr.port(), addr.ip().octets()),
            SocketAddr::V6(addr) => (addr.port(), [0, 0, 0, 0]),
        };
        self.reply(downstream, Socks4Status::Granted, port, ipv4).await?;

        let (mut upstream, peer) = listener.accept().await?;
        info!(session = self.id, remote = %peer, "socks4 bind accepted upstream connection");
        relay::relay(downstream, &mut upstream, self.id).await
    }
}
