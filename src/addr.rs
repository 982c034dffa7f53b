use std::fmt;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};

/// A SOCKS destination address, tagged by the wire address type it was
/// decoded from (or will be encoded as).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SocksAddr {
    Ipv4(SocketAddrV4),
    Domain(String, u16),
    Ipv6(SocketAddrV6),
}

impl SocksAddr {
    pub fn host(&self) -> String {
        match self {
            Self::Ipv4(addr) => addr.ip().to_string(),
            Self::Domain(host, _) => host.clone(),
            Self::Ipv6(addr) => addr.ip().to_string(),
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Ipv4(addr) => addr.port(),
            Self::Domain(_, port) => *port,
            Self::Ipv6(addr) => addr.port(),
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(..))
    }
}

impl From<SocketAddr> for SocksAddr {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(addr) => Self::Ipv4(addr),
            SocketAddr::V6(addr) => Self::Ipv6(addr),
        }
    }
}

impl fmt::Display for SocksAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.port())
    }
}
