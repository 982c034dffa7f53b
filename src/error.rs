use crate::addr::SocksAddr;

#[derive(Debug, thiserror::Error)]
pub enum SocksError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported SOCKS version {0}")]
    UnsupportedVersion(u8),

    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error("access denied for {0}")]
    AccessDenied(SocksAddr),

    #[error("invalid command {0}")]
    InvalidCommand(u8),

    #[error("unsupported command {0}")]
    UnsupportedCommand(u8),

    #[error("invalid address type {0}")]
    InvalidAddressType(u8),

    #[error("failed to resolve {0}")]
    ResolutionFailed(String),

    #[error("upstream connect to {0} failed: {1}")]
    ConnectFailed(SocksAddr, std::io::Error),

    #[error("peer closed the connection during negotiation")]
    UnexpectedEof,
}

/// Per-frame decode outcome. `NeedMore` and `Malformed` never escalate to
/// [`SocksError`] directly: the session engine is what turns a `Malformed`
/// into the matching wire reply (and only then into a `SocksError` for
/// logging).
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// At least this many additional bytes are required before the frame
    /// can be re-parsed. A hint, not a hard contract — callers should just
    /// read more and retry.
    NeedMore(usize),
    /// The value, and the number of bytes of the input it consumed.
    Done(T, usize),
    Malformed(&'static str),
}
