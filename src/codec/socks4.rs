//! SOCKS4 request/reply framing.
//!
//! ```text
//! request: ver(1) | cmd(1) | port_hi(1) | port_lo(1) | addr(4) | user(var) | 0x00
//! reply:   0x00    | status(1)          | port_hi(1) | port_lo(1) | addr(4)
//! ```

use crate::error::DecodeResult;

use super::read_u16_be;

pub const VERSION: u8 = 0x04;

/// The source reads the user field until a NUL with no cap; that's an
/// unbounded read off an adversarial peer. Cap it and call anything longer
/// malformed.
pub const MAX_USER_LEN: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Socks4Command {
    Connect = 0x01,
    Bind = 0x02,
}

impl TryFrom<u8> for Socks4Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(Self::Connect),
            0x02 => Ok(Self::Bind),
            other => Err(other),
        }
    }
}

#[derive(Clone)]
pub struct Socks4Request {
    pub command: Socks4Command,
    pub port: u16,
    pub ipv4: [u8; 4],
    pub user: Vec<u8>,
}

/// 0x5A request granted
/// 0x5B request rejected or failed
/// 0x5C request rejected because SOCKS server cannot connect to identd on the client
/// 0x5D request rejected because the client program and identd report different user-ids
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Socks4Status {
    Granted = 0x5a,
    Rejected = 0x5b,
    IdentdNoConnection = 0x5c,
    IdentdMismatch = 0x5d,
}

pub fn decode_request(buf: &[u8]) -> DecodeResult<Socks4Request> {
    if buf.len() < 2 {
        return DecodeResult::NeedMore(2 - buf.len());
    }
    if buf[0] != VERSION {
        return DecodeResult::Malformed("unexpected socks4 version byte");
    }
    let command = match Socks4Command::try_from(buf[1]) {
        Ok(command) => command,
        Err(_) => return DecodeResult::Malformed("invalid socks4 command"),
    };
    if buf.len() < 8 {
        return DecodeResult::NeedMore(8 - buf.len());
    }

    let port = read_u16_be(&buf[2..4]);
    let ipv4 = [buf[4], buf[5], buf[6], buf[7]];

    match buf[8..].iter().position(|&b| b == 0x00) {
        Some(nul_offset) => {
            let user = buf[8..8 + nul_offset].to_vec();
            DecodeResult::Done(
                Socks4Request {
                    command,
                    port,
                    ipv4,
                    user,
                },
                8 + nul_offset + 1,
            )
        }
        None if buf.len() - 8 >= MAX_USER_LEN => {
            DecodeResult::Malformed("socks4 user id exceeds 256 bytes with no terminator")
        }
        None => DecodeResult::NeedMore(1),
    }
}

pub fn encode_reply(buf: &mut Vec<u8>, status: Socks4Status, port: u16, ipv4: [u8; 4]) {
    buf.push(0x00);
    buf.push(status as u8);
    buf.extend_from_slice(&port.to_be_bytes());
    buf.extend_from_slice(&ipv4);
}


impl std::fmt::Debug for Socks4Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socks4Request")
            .field("command", &self.command)
            .field("port", &self.port)
            .field("ipv4", &self.ipv4)
            .field("user_len", &self.user.len())
            .finish()
    }
}
