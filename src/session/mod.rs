//! The per-connection protocol engine: reads framed bytes from the client,
//! decodes a SOCKS4 or SOCKS5 request, dispatches to the requested command,
//! then runs the bidirectional relay until either side closes.

pub mod relay;
pub mod socks4;
pub mod socks5;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncReadExt;

use crate::error::{DecodeResult, SocksError};

/// Fixed relay/negotiation buffer size. No dynamic resizing, per spec.
pub const BUF_SIZE: usize = 4096;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_session_id() -> u64 {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Coarse phase used only for logging (`phase` field) — the real state
/// machine lives in the per-version `drive` methods.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Negotiating,
    Relay,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Negotiating => "negotiating",
            Phase::Relay => "relay",
            Phase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Reads from `stream` into `buf` (starting at `*filled`), feeding the
/// growing slice to `decode` after every read. Implements the incremental
/// framing contract of §4.1: a frame is never assumed to arrive in a single
/// read, and bytes past the frame boundary (the next frame arriving in the
/// same read) are preserved for the next call by shifting them to the front
/// of `buf`.
pub(crate) async fn read_frame<S, T>(
    stream: &mut S,
    buf: &mut [u8; BUF_SIZE],
    filled: &mut usize,
    decode: impl Fn(&[u8]) -> DecodeResult<T>,
) -> Result<T, SocksError>
where
    S: AsyncReadExt + Unpin,
{
    loop {
        match decode(&buf[..*filled]) {
            DecodeResult::Done(value, consumed) => {
                let remaining = *filled - consumed;
                buf.copy_within(consumed..*filled, 0);
                *filled = remaining;
                return Ok(value);
            }
            DecodeResult::Malformed(reason) => return Err(SocksError::Malformed(reason)),
            DecodeResult::NeedMore(_) => {
                if *filled == buf.len() {
                    return Err(SocksError::Malformed("frame exceeds the negotiation buffer"));
                }
                let n = stream.read(&mut buf[*filled..]).await?;
                if n == 0 {
                    return Err(SocksError::UnexpectedEof);
                }
                *filled += n;
            }
        }
    }
}
