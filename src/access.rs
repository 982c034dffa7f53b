use std::net::SocketAddr;

use async_trait::async_trait;

use crate::addr::SocksAddr;

/// The single policy surface the session engine calls out to. Default
/// implementation allows everything; a real deployment supplies its own.
///
/// SOCKS4 callers map a denial to `Socks4Reply::Rejected`; SOCKS5 callers
/// map it to `Socks5Reply::ConnectionNotAllowedByRuleset`.
#[async_trait]
pub trait CheckAccess: Send + Sync {
    async fn check_access(&self, client_addr: SocketAddr, user: &str, target: &SocksAddr) -> bool {
        let _ = (client_addr, user, target);
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl CheckAccess for AllowAll {}
