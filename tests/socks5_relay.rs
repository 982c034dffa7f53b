//! End-to-end SOCKS5 tests: a raw client talks the wire protocol to a
//! [`Socks5Session`] driving a real loopback socket, with a real echo
//! server standing in for the upstream.

use std::net::SocketAddr;
use std::sync::Arc;

use socksd::access::AllowAll;
use socksd::session::socks5::Socks5Session;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    addr
}

/// Spawns a single `Socks5Session` against one accepted connection and
/// returns the downstream address a client should dial.
async fn spawn_session() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, peer)) = listener.accept().await {
            Socks5Session::new(peer, Arc::new(AllowAll)).run(stream).await;
        }
    });
    addr
}

#[tokio::test]
async fn method_negotiation_selects_no_auth_when_offered() {
    let session_addr = spawn_session().await;
    let mut client = TcpStream::connect(session_addr).await.unwrap();

    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

#[tokio::test]
async fn method_negotiation_rejects_when_only_gssapi_offered() {
    let session_addr = spawn_session().await;
    let mut client = TcpStream::connect(session_addr).await.unwrap();

    client.write_all(&[0x05, 0x01, 0x01]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0xff]);

    // server closes after a NO_ACCEPTABLE_METHODS reply.
    let mut probe = [0u8; 1];
    let n = client.read(&mut probe).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn connect_by_ipv4_succeeds_and_relays() {
    let echo_addr = spawn_echo_server().await;
    let session_addr = spawn_session().await;
    let mut client = TcpStream::connect(session_addr).await.unwrap();

    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x00]);

    let (ip, port) = match echo_addr {
        SocketAddr::V4(addr) => (addr.ip().octets(), addr.port()),
        SocketAddr::V6(_) => unreachable!("echo server is bound on an ipv4 loopback"),
    };
    let mut req = vec![0x05, 0x01, 0x00, 0x01];
    req.extend_from_slice(&ip);
    req.extend_from_slice(&port.to_be_bytes());
    client.write_all(&req).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    client.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
}

#[tokio::test]
async fn connect_by_domain_resolve_failure_zeroes_address_and_echoes_shape() {
    let session_addr = spawn_session().await;
    let mut client = TcpStream::connect(session_addr).await.unwrap();

    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();

    // scenario 6: a domain name that cannot resolve.
    let domain = b"this-domain-should-not-exist.invalid";
    let mut req = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    req.extend_from_slice(domain);
    req.extend_from_slice(&80u16.to_be_bytes());
    client.write_all(&req).await.unwrap();

    let mut reply = vec![0u8; 5 + domain.len() + 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x01, "expected general_socks_server_failure");
    assert_eq!(reply[2], 0x00);
    assert_eq!(reply[3], 0x03, "atype echoed as DOMAIN");
    assert_eq!(reply[4], domain.len() as u8);
    assert!(reply[5..5 + domain.len()].iter().all(|&b| b == 0));
    assert_eq!(&reply[5 + domain.len()..], &[0, 0]);
}

#[tokio::test]
async fn bind_command_is_rejected_as_unsupported() {
    let session_addr = spawn_session().await;
    let mut client = TcpStream::connect(session_addr).await.unwrap();

    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();

    let req = [0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];
    client.write_all(&req).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x07, "expected command_not_supported");
}

#[tokio::test]
async fn bad_address_type_yields_address_type_not_supported() {
    let session_addr = spawn_session().await;
    let mut client = TcpStream::connect(session_addr).await.unwrap();

    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();

    let req = [0x05, 0x01, 0x00, 0xff, 0, 0, 0, 0, 0, 0];
    client.write_all(&req).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn request_arriving_byte_at_a_time_still_decodes() {
    let echo_addr = spawn_echo_server().await;
    let session_addr = spawn_session().await;
    let mut client = TcpStream::connect(session_addr).await.unwrap();

    for byte in [0x05u8, 0x01, 0x00] {
        client.write_all(&[byte]).await.unwrap();
    }
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();

    let (ip, port) = match echo_addr {
        SocketAddr::V4(addr) => (addr.ip().octets(), addr.port()),
        SocketAddr::V6(_) => unreachable!(),
    };
    let mut req = vec![0x05, 0x01, 0x00, 0x01];
    req.extend_from_slice(&ip);
    req.extend_from_slice(&port.to_be_bytes());
    for byte in &req {
        client.write_all(&[*byte]).await.unwrap();
    }

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);
}
