//! UDP transport over the loopback interface.

use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use hmd_calib::{
    inbound_queue, ConnectionConfig, InboundReceiver, OverflowPolicy, Transport, TransportError,
    UdpTransport,
};
use hmd_wire::{decode, encode_engine_message, GazeSample, WireMessage};

fn relay() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

fn config_for(relay: &UdpSocket) -> ConnectionConfig {
    ConnectionConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        remote_addr: relay.local_addr().unwrap().to_string(),
        ..ConnectionConfig::default()
    }
}

fn wait_for(rx: &InboundReceiver, count: usize) -> Vec<bytes::Bytes> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut received = Vec::new();
    while received.len() < count && Instant::now() < deadline {
        received.extend(rx.drain());
        thread::sleep(Duration::from_millis(5));
    }
    received
}

#[test]
fn test_send_reaches_remote() {
    let relay = relay();
    let (tx, _rx) = inbound_queue(16, OverflowPolicy::DropOldest);
    let mut transport = UdpTransport::bind(&config_for(&relay), tx).unwrap();

    transport.send(&[90, 1, b'H']).unwrap();

    let mut buf = [0u8; 64];
    let (len, from) = relay.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], &[90, 1, b'H']);
    assert_eq!(from, transport.local_addr().unwrap());
}

#[test]
fn test_received_datagrams_are_queued_in_order() {
    let relay = relay();
    let (tx, rx) = inbound_queue(16, OverflowPolicy::DropOldest);
    let transport = UdpTransport::bind(&config_for(&relay), tx).unwrap();
    let headset = transport.local_addr().unwrap();

    let messages = [
        WireMessage::ConnectionEstablished,
        WireMessage::Gaze(GazeSample::LeftEye([0.25, 0.75])),
        WireMessage::RawText("ready".to_string()),
    ];
    for message in &messages {
        relay
            .send_to(&encode_engine_message(message), headset)
            .unwrap();
    }

    let received = wait_for(&rx, messages.len());
    let decoded: Vec<_> = received.iter().map(|p| decode(p).unwrap()).collect();
    assert_eq!(decoded, messages);
}

#[test]
fn test_invalid_remote_address() {
    let (tx, _rx) = inbound_queue(4, OverflowPolicy::DropOldest);
    let config = ConnectionConfig {
        remote_addr: "not an address".to_string(),
        ..ConnectionConfig::default()
    };
    assert!(matches!(
        UdpTransport::bind(&config, tx),
        Err(TransportError::InvalidAddress(_))
    ));
}

#[test]
fn test_drop_stops_reader_promptly() {
    let relay = relay();
    let (tx, _rx) = inbound_queue(4, OverflowPolicy::DropOldest);
    let transport = UdpTransport::bind(&config_for(&relay), tx).unwrap();

    let started = Instant::now();
    drop(transport);
    assert!(started.elapsed() < Duration::from_secs(1));
}
