//! The bidirectional byte-forwarding phase. Two independent half-duplex
//! pipelines, each with its own fixed buffer; at any moment each direction
//! has exactly one outstanding read or write, never both. Either side
//! observing EOF or an I/O error ends the whole session — there is no
//! half-close preserved across sides.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

use crate::error::SocksError;

use super::BUF_SIZE;

pub async fn relay(
    downstream: &mut TcpStream,
    upstream: &mut TcpStream,
    session_id: u64,
) -> Result<(), SocksError> {
    let (mut down_read, mut down_write) = downstream.split();
    let (mut up_read, mut up_write) = upstream.split();

    let mut up_to_down_bytes = 0u64;
    let mut down_to_up_bytes = 0u64;

    let upstream_to_downstream = async {
        let mut buf = [0u8; BUF_SIZE];
        loop {
            let n = up_read.read(&mut buf).await?;
            if n == 0 {
                return Ok::<(), std::io::Error>(());
            }
            down_write.write_all(&buf[..n]).await?;
            up_to_down_bytes += n as u64;
        }
    };

    let downstream_to_upstream = async {
        let mut buf = [0u8; BUF_SIZE];
        loop {
            let n = down_read.read(&mut buf).await?;
            if n == 0 {
                return Ok::<(), std::io::Error>(());
            }
            up_write.write_all(&buf[..n]).await?;
            down_to_up_bytes += n as u64;
        }
    };

    let result = tokio::select! {
        r = upstream_to_downstream => r,
        r = downstream_to_upstream => r,
    };

    info!(
        session = session_id,
        bytes = up_to_down_bytes,
        direction = "upstream->downstream",
        phase = %super::Phase::Relay,
        "relay direction finished"
    );
    info!(
        session = session_id,
        bytes = down_to_up_bytes,
        direction = "downstream->upstream",
        phase = %super::Phase::Relay,
        "relay direction finished"
    );

    result.map_err(SocksError::from)
}
