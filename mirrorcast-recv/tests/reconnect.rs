//! Integration tests — the receiver against a scripted TCP server on
//! localhost: frame skipping, reconnects, and shutdown.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use mirrorcast_recv::config::RecvConfig;
use mirrorcast_recv::receiver::StreamReceiver;

const TIMEOUT: Duration = Duration::from_secs(5);

fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![tag];
    buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn config(port: u16) -> RecvConfig {
    let mut cfg = RecvConfig::default();
    cfg.network.port = port;
    cfg.network.reconnect_ms = 10;
    cfg
}

#[tokio::test]
async fn test_reconnects_and_concatenates_sessions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // The receiver writes into a pipe so the test can see when output lands.
    let (output, mut sink) = tokio::io::duplex(64 * 1024);
    let receiver = StreamReceiver::new(&config(port), output);
    let shutdown = receiver.shutdown_handle();
    let task = tokio::spawn(async move {
        let mut receiver = receiver;
        receiver.run().await.unwrap()
    });

    // First session: two video frames around an unknown one.
    let (mut stream, _) = tokio::time::timeout(TIMEOUT, listener.accept())
        .await
        .expect("timeout")
        .unwrap();
    stream.write_all(&frame(1, b"first")).await.unwrap();
    stream.write_all(&frame(2, b"ignored")).await.unwrap();
    stream.write_all(&frame(1, b"second")).await.unwrap();
    drop(stream);

    // Second session after the reconnect delay.
    let (mut stream, _) = tokio::time::timeout(TIMEOUT, listener.accept())
        .await
        .expect("timeout")
        .unwrap();
    stream.write_all(&frame(1, b"third")).await.unwrap();
    drop(stream);

    // Third session stays open; stop only once its frame is written out.
    let (mut stream, _) = tokio::time::timeout(TIMEOUT, listener.accept())
        .await
        .expect("timeout")
        .unwrap();
    stream.write_all(&frame(1, b"fourth")).await.unwrap();

    let expected = b"firstsecondthirdfourth";
    let mut received = vec![0u8; expected.len()];
    tokio::time::timeout(TIMEOUT, sink.read_exact(&mut received))
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(&received[..], &expected[..]);

    shutdown.cancel();
    let stats = tokio::time::timeout(TIMEOUT, task)
        .await
        .expect("timeout")
        .unwrap();

    assert_eq!(stats.connections, 3);
    assert_eq!(stats.frames, 4);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.bytes, expected.len() as u64);
}

#[tokio::test]
async fn test_stops_while_server_is_down() {
    // Reserve a port, then free it so connects are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut receiver = StreamReceiver::new(&config(port), Vec::new());
    let shutdown = receiver.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    let stats = tokio::time::timeout(TIMEOUT, receiver.run())
        .await
        .expect("timeout")
        .unwrap();

    assert_eq!(stats.connections, 0);
    assert_eq!(stats.frames, 0);
    assert!(receiver.into_output().is_empty());
}
