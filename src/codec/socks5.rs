//! SOCKS5 method negotiation and request/reply framing (RFC 1928).
//!
//! ```text
//! method request:  ver(1) | nmethods(1) | methods(nmethods)
//! method reply:    ver(1) | method(1)
//! request/reply:   ver(1) | cmd/rep(1) | rsv(1) | atyp(1) | addr | port(2)
//! ```
//! `addr` is 4 bytes for IPV4, `len(1) | octets(len)` for DOMAIN, 16 bytes
//! for IPV6. The IPv6 frame is 22 bytes total (`4 + 16 + 2`) — the source
//! this was derived from computes 24, which is the confirmed defect, not
//! the intended size.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use crate::addr::SocksAddr;
use crate::error::DecodeResult;

use super::read_u16_be;

pub const VERSION: u8 = 0x05;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Socks5Method {
    NoAuth,
    GssApi,
    UserPass,
    Other(u8),
    NoAcceptable,
}

impl From<u8> for Socks5Method {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::NoAuth,
            0x01 => Self::GssApi,
            0x02 => Self::UserPass,
            0xff => Self::NoAcceptable,
            other => Self::Other(other),
        }
    }
}

impl From<Socks5Method> for u8 {
    fn from(method: Socks5Method) -> Self {
        match method {
            Socks5Method::NoAuth => 0x00,
            Socks5Method::GssApi => 0x01,
            Socks5Method::UserPass => 0x02,
            Socks5Method::Other(value) => value,
            Socks5Method::NoAcceptable => 0xff,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Socks5Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl TryFrom<u8> for Socks5Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(Self::Connect),
            0x02 => Ok(Self::Bind),
            0x03 => Ok(Self::UdpAssociate),
            other => Err(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Socks5AddrType {
    Ipv4 = 0x01,
    Domain = 0x03,
    Ipv6 = 0x04,
}

impl TryFrom<u8> for Socks5AddrType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(Self::Ipv4),
            0x03 => Ok(Self::Domain),
            0x04 => Ok(Self::Ipv6),
            other => Err(other),
        }
    }
}

impl From<Socks5AddrType> for u8 {
    fn from(atype: Socks5AddrType) -> Self {
        atype as u8
    }
}

/// X'00' succeeded
/// X'01' general SOCKS server failure
/// X'02' connection not allowed by ruleset
/// X'03' Network unreachable
/// X'04' Host unreachable
/// X'05' Connection refused
/// X'06' TTL expired
/// X'07' Command not supported
/// X'08' Address type not supported
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Socks5Status {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    NotAllowedByRuleset = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

#[derive(Clone, Debug)]
pub struct Socks5Request {
    pub command: Socks5Command,
    pub address: SocksAddr,
}

pub fn decode_method_request(buf: &[u8]) -> DecodeResult<Vec<Socks5Method>> {
    if buf.len() < 2 {
        return DecodeResult::NeedMore(2 - buf.len());
    }
    if buf[0] != VERSION {
        return DecodeResult::Malformed("unexpected socks5 version byte");
    }
    let nmethods = buf[1] as usize;
    let total = 2 + nmethods;
    if buf.len() < total {
        return DecodeResult::NeedMore(total - buf.len());
    }
    let methods = buf[2..total].iter().map(|&b| b.into()).collect();
    DecodeResult::Done(methods, total)
}

pub fn encode_method_reply(buf: &mut Vec<u8>, method: Socks5Method) {
    buf.push(VERSION);
    buf.push(method.into());
}

/// Computes how many bytes the fixed request prefix plus address occupies,
/// once enough of the buffer is present to know `atype` (and, for DOMAIN,
/// the length octet that follows it).
fn request_size(buf: &[u8]) -> DecodeResult<usize> {
    if buf.len() < 4 {
        return DecodeResult::NeedMore(4 - buf.len());
    }
    let atype = match Socks5AddrType::try_from(buf[3]) {
        Ok(atype) => atype,
        Err(_) => return DecodeResult::Malformed("unsupported socks5 address type"),
    };
    match atype {
        Socks5AddrType::Ipv4 => DecodeResult::Done(10, 0),
        Socks5AddrType::Ipv6 => DecodeResult::Done(22, 0),
        Socks5AddrType::Domain => {
            if buf.len() < 5 {
                return DecodeResult::NeedMore(5 - buf.len());
            }
            let domain_len = buf[4] as usize;
            DecodeResult::Done(7 + domain_len, 0)
        }
    }
}

pub fn decode_request(buf: &[u8]) -> DecodeResult<Socks5Request> {
    let total = match request_size(buf) {
        DecodeResult::Done(total, _) => total,
        DecodeResult::NeedMore(n) => return DecodeResult::NeedMore(n),
        DecodeResult::Malformed(reason) => return DecodeResult::Malformed(reason),
    };
    if buf.len() < total {
        return DecodeResult::NeedMore(total - buf.len());
    }
    if buf[0] != VERSION {
        return DecodeResult::Malformed("unexpected socks5 version byte");
    }
    let command = match Socks5Command::try_from(buf[1]) {
        Ok(command) => command,
        Err(_) => return DecodeResult::Malformed("unsupported socks5 command"),
    };
    let atype = Socks5AddrType::try_from(buf[3]).expect("validated by request_size");

    let address = match atype {
        Socks5AddrType::Ipv4 => {
            let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);
            let port = read_u16_be(&buf[8..10]);
            SocksAddr::Ipv4(SocketAddrV4::new(ip, port))
        }
        Socks5AddrType::Domain => {
            let len = buf[4] as usize;
            let domain = match String::from_utf8(buf[5..5 + len].to_vec()) {
                Ok(domain) => domain,
                Err(_) => return DecodeResult::Malformed("domain name is not valid utf-8"),
            };
            let port = read_u16_be(&buf[5 + len..5 + len + 2]);
            SocksAddr::Domain(domain, port)
        }
        Socks5AddrType::Ipv6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[4..20]);
            let ip = Ipv6Addr::from(octets);
            let port = read_u16_be(&buf[20..22]);
            SocksAddr::Ipv6(SocketAddrV6::new(ip, port, 0, 0))
        }
    };

    DecodeResult::Done(Socks5Request { command, address }, total)
}

/// The shape (atype +, for DOMAIN, the address length) a reply's address
/// field echoes, independent of the actual bytes written.
#[derive(Clone, Copy, Debug)]
pub enum ReplyAddrShape {
    Ipv4,
    Ipv6,
    Domain(u8),
}

impl ReplyAddrShape {
    pub fn of(address: &SocksAddr) -> Self {
        match address {
            SocksAddr::Ipv4(_) => Self::Ipv4,
            SocksAddr::Domain(host, _) => Self::Domain(host.len().min(255) as u8),
            SocksAddr::Ipv6(_) => Self::Ipv6,
        }
    }
}

/// Encodes a failure reply. The source still echoes whatever `atype` byte
/// happened to be in its buffer even when the address was never parsed;
/// that byte can be indeterminate. `shape = None` defaults to `IPV4` with a
/// zeroed, zero-length address instead (§9's BIND-reply-echo defect, fixed).
pub fn encode_reply_failure(buf: &mut Vec<u8>, status: Socks5Status, shape: Option<ReplyAddrShape>) {
    buf.push(VERSION);
    buf.push(status as u8);
    buf.push(0x00);
    match shape {
        Some(ReplyAddrShape::Domain(len)) => {
            buf.push(Socks5AddrType::Domain.into());
            buf.push(len);
            buf.extend(std::iter::repeat(0u8).take(len as usize));
            buf.extend_from_slice(&[0u8; 2]);
        }
        Some(ReplyAddrShape::Ipv6) => {
            buf.push(Socks5AddrType::Ipv6.into());
            buf.extend_from_slice(&[0u8; 18]);
        }
        Some(ReplyAddrShape::Ipv4) | None => {
            buf.push(Socks5AddrType::Ipv4.into());
            buf.extend_from_slice(&[0u8; 6]);
        }
    }
}

/// Encodes a successful CONNECT reply. IPV4/IPV6 destinations get a zeroed
/// bind address (clients conventionally ignore BND.ADDR/BND.PORT once
/// CONNECT succeeds); DOMAIN destinations echo the requested port so the
/// reply round-trips the port the client asked for.
pub fn encode_reply_success(buf: &mut Vec<u8>, shape: ReplyAddrShape, port: u16) {
    buf.push(VERSION);
    buf.push(Socks5Status::Succeeded as u8);
    buf.push(0x00);
    match shape {
        ReplyAddrShape::Domain(len) => {
            buf.push(Socks5AddrType::Domain.into());
            buf.push(len);
            buf.extend(std::iter::repeat(0u8).take(len as usize));
            buf.extend_from_slice(&port.to_be_bytes());
        }
        ReplyAddrShape::Ipv4 => {
            buf.push(Socks5AddrType::Ipv4.into());
            buf.extend_from_slice(&[0u8; 6]);
        }
        ReplyAddrShape::Ipv6 => {
            buf.push(Socks5AddrType::Ipv6.into());
            buf.extend_from_slice(&[0u8; 18]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_negotiation_no_auth_offered() {
        let frame = [0x05, 0x01, 0x00];
        match decode_method_request(&frame) {
            DecodeResult::Done(methods, consumed) => {
                assert_eq!(consumed, 3);
                assert_eq!(methods, vec![Socks5Method::NoAuth]);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn request_byte_at_a_time_ipv4() {
        let frame = [0x05, 0x01, 0x00, 0x01, 1, 2, 3, 4, 0x00, 0x50];
        for n in 0..frame.len() - 1 {
            assert!(matches!(decode_request(&frame[..n]), DecodeResult::NeedMore(_)));
        }
        match decode_request(&frame) {
            DecodeResult::Done(req, consumed) => {
                assert_eq!(consumed, frame.len());
                assert_eq!(req.address.port(), 0x50);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn request_domain_max_length() {
        let mut frame = vec![0x05, 0x01, 0x00, 0x03, 255];
        frame.extend(std::iter::repeat(b'a').take(255));
        frame.extend_from_slice(&80u16.to_be_bytes());
        match decode_request(&frame) {
            DecodeResult::Done(req, consumed) => {
                assert_eq!(consumed, frame.len());
                assert!(req.address.is_domain());
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn request_rejects_bad_address_type() {
        for bad in [0x02u8, 0x05, 0xff] {
            let frame = [0x05, 0x01, 0x00, bad, 0, 0, 0, 0, 0, 0];
            assert!(matches!(decode_request(&frame), DecodeResult::Malformed(_)));
        }
    }

    #[test]
    fn domain_resolve_failure_zeroes_address_and_port_but_echoes_shape() {
        // scenario 6: example.com, 11-byte domain, resolve failure.
        let request = [
            0x05, 0x01, 0x00, 0x03, 0x0b, b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c',
            b'o', b'm', 0x00, 0x50,
        ];
        let decoded = match decode_request(&request) {
            DecodeResult::Done(req, _) => req,
            other => panic!("expected Done, got {other:?}"),
        };
        let mut buf = Vec::new();
        encode_reply_failure(
            &mut buf,
            Socks5Status::GeneralFailure,
            Some(ReplyAddrShape::of(&decoded.address)),
        );
        let mut expected = vec![0x05, 0x01, 0x00, 0x03, 0x0b];
        expected.extend(std::iter::repeat(0u8).take(11));
        expected.extend_from_slice(&[0, 0]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn reply_defaults_to_ipv4_zero_padded_when_address_unknown() {
        let mut buf = Vec::new();
        encode_reply_failure(&mut buf, Socks5Status::AddressTypeNotSupported, None);
        assert_eq!(buf, vec![0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn success_reply_zeroes_ipv4_address_and_port() {
        // scenario 5: CONNECT 1.2.3.4:80 succeeds.
        let mut buf = Vec::new();
        encode_reply_success(&mut buf, ReplyAddrShape::Ipv4, 80);
        assert_eq!(buf, vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn success_reply_echoes_requested_port_for_domain() {
        let mut buf = Vec::new();
        encode_reply_success(&mut buf, ReplyAddrShape::Domain(11), 0x50);
        assert_eq!(&buf[buf.len() - 2..], &0x50u16.to_be_bytes());
    }

    #[test]
    fn ipv6_request_is_22_bytes_not_24() {
        let mut frame = vec![0x05, 0x01, 0x00, 0x04];
        frame.extend_from_slice(&[0u8; 16]);
        frame.extend_from_slice(&80u16.to_be_bytes());
        assert_eq!(frame.len(), 22);
        assert!(matches!(decode_request(&frame), DecodeResult::Done(_, 22)));
    }
}
