use maxsmart_transport::{DatagramTransport, Transport, TransportError};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::net::UdpSocket;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Fake strip that answers a single datagram with a canned reply
async fn spawn_responder(reply: &'static [u8]) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        let (len, from) = socket.recv_from(&mut buf).await.unwrap();
        socket.send_to(reply, from).await.unwrap();
        buf.truncate(len);
        buf
    });
    (port, handle)
}

#[tokio::test]
async fn test_single_exchange() {
    let (port, handle) = spawn_responder(br#"{"code":200,"response":20}"#).await;

    let reply = DatagramTransport::with_port(port)
        .exchange(LOCALHOST, br#"V3{"cmd":20}"#, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(reply, br#"{"code":200,"response":20}"#);
    assert_eq!(handle.await.unwrap(), br#"V3{"cmd":20}"#);
}

#[tokio::test]
async fn test_silent_device_times_out() {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();

    let started = std::time::Instant::now();
    let result = DatagramTransport::with_port(port)
        .exchange(LOCALHOST, b"V3{}", Duration::from_millis(200))
        .await;

    assert!(matches!(result, Err(TransportError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(2));
    drop(socket);
}
