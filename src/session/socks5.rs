use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tracing::info;

use crate::access::CheckAccess;
use crate::addr::SocksAddr;
use crate::codec::socks5::{self, ReplyAddrShape, Socks5Command, Socks5Method, Socks5Status};
use crate::error::SocksError;

use super::{next_session_id, read_frame, relay, Phase, BUF_SIZE};

/// One instance per accepted downstream connection on a SOCKS5-only server.
/// Realizes the method-negotiation sub-dialogue (only NO_AUTH is accepted;
/// any other offer yields `NO_ACCEPTABLE_METHODS` and the connection
/// closes), then CONNECT. BIND and UDP_ASSOCIATE reply
/// `command_not_supported` — they are out of scope (§1).
pub struct Socks5Session<A: CheckAccess> {
    id: u64,
    peer_addr: SocketAddr,
    access: Arc<A>,
}

impl<A: CheckAccess + 'static> Socks5Session<A> {
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
        let mut buf = [0u8; BUF_SIZE];
        let mut filled = 0usize;

        let methods =
            read_frame(downstream, &mut buf, &mut filled, socks5::decode_method_request).await?;

        let method = if methods.contains(&Socks5Method::NoAuth) {
            Socks5Method::NoAuth
        } else {
            Socks5Method::NoAcceptable
        };

        let mut method_reply = Vec::with_capacity(2);
        socks5::encode_method_reply(&mut method_reply, method);
        downstream.write_all(&method_reply).await?;

        if method == Socks5Method::NoAcceptable {
            return Err(SocksError::Malformed("no acceptable socks5 methods offered"));
        }

        let request = match read_frame(downstream, &mut buf, &mut filled, socks5::decode_request).await
        {
            Ok(request) => request,
            Err(SocksError::Malformed(reason)) => {
                // The address was never parsed here, so the reply defaults
                // to IPV4 zero-padded per §9's corrected BIND-reply-echo
                // rule, regardless of which malformed field caused this.
                let status = if reason.contains("address type") {
                    Socks5Status::AddressTypeNotSupported
                } else {
                    Socks5Status::GeneralFailure
                };
                self.reply_failure(downstream, status, None).await.ok();
                return Err(SocksError::Malformed(reason));
            }
            Err(err) => return Err(err),
        };

        match request.command {
            Socks5Command::Connect => self.connect(downstream, request.address).await,
            Socks5Command::Bind | Socks5Command::UdpAssociate => {
                self.reply_failure(
                    downstream,
                    Socks5Status::CommandNotSupported,
                    Some(ReplyAddrShape::of(&request.address)),
                )
                .await?;
                Err(SocksError::UnsupportedCommand(match request.command {
                    Socks5Command::Bind => 0x02,
                    Socks5Command::UdpAssociate => 0x03,
                    Socks5Command::Connect => unreachable!(),
                }))
            }
        }
    }

    async fn reply_failure(
        &self,
        downstream: &mut TcpStream,
        status: Socks5Status,
        shape: Option<ReplyAddrShape>,
    ) -> Result<(), SocksError> {
        let mut buf = Vec::with_capacity(22);
        socks5::encode_reply_failure(&mut buf, status, shape);
        downstream.write_all(&buf).await?;
        Ok(())
    }

    async fn connect(&self, downstream: &mut TcpStream, address: SocksAddr) -> Result<(), SocksError> {
        let shape = ReplyAddrShape::of(&address);

        if !self.access.check_access(self.peer_addr, "", &address).await {
            self.reply_failure(downstream, Socks5Status::NotAllowedByRuleset, Some(shape))
                .await?;
            return Err(SocksError::AccessDenied(address));
        }

        let resolved = match self.resolve(&address).await {
            Ok(resolved) => resolved,
            Err(err) => {
                self.reply_failure(downstream, Socks5Status::GeneralFailure, Some(shape))
                    .await?;
                return Err(err);
            }
        };

        match TcpStream::connect(resolved).await {
            Ok(mut upstream) => {
                let mut buf = Vec::with_capacity(22);
                socks5::encode_reply_success(&mut buf, shape, address.port());
                downstream.write_all(&buf).await?;
                relay::relay(downstream, &mut upstream, self.id).await
            }
            Err(err) => {
                let status = match err.kind() {
                    std::io::ErrorKind::ConnectionRefused => Socks5Status::ConnectionRefused,
                    _ => Socks5Status::GeneralFailure,
                };
                self.reply_failure(downstream, status, Some(shape)).await?;
                Err(SocksError::ConnectFailed(address, err))
            }
        }
    }

    /// Only DOMAIN addresses are resolved; the first result is used (no
    /// happy-eyeballs, no per-endpoint fallback, per §4.2).
    async fn resolve(&self, address: &SocksAddr) -> Result<SocketAddr, SocksError> {
        match address {
            SocksAddr::Domain(host, port) => {
                let mut addrs = lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|_| SocksError::ResolutionFailed(host.clone()))?;
                addrs
                    .next()
                    .ok_or_else(|| SocksError::ResolutionFailed(host.clone()))
            }
            SocksAddr::Ipv4(addr) => Ok(SocketAddr::V4(*addr)),
            SocksAddr::Ipv6(addr) => Ok(SocketAddr::V6(*addr)),
        }
    }
}
