//! End-to-end session behavior against a scripted local pool.
//!
//! The mock pool speaks just enough Stratum v1 to drive the worker through
//! the interesting transitions: handshake, a job, a severed socket
//! mid-scan, and the reconnect handshake that must follow.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use solominer::config::Config;
use solominer::engine::Worker;
use solominer::stats::StatsRegistry;

fn test_config(port: u16) -> Config {
    Config {
        pool_host: "127.0.0.1".to_string(),
        pool_port: port,
        address: "bc1qtestworker".to_string(),
        password: "x".to_string(),
        workers: 1,
        pin_cpus: Vec::new(),
        debug: false,
        io_timeout: Duration::from_millis(300),
        reconnect_delay: Duration::from_millis(100),
        connect_backoff: Duration::from_millis(100),
    }
}

const SUBSCRIBE_RESPONSE: &[u8] = b"{\"id\":1,\"result\":[[],\"f8002c90\",4],\"error\":null}\n";
const AUTHORIZE_RESPONSE: &[u8] = b"{\"id\":2,\"result\":true,\"error\":null}\n";

/// A mining.notify with mainnet-like difficulty: the scan will never find
/// a share, it just grinds until something interrupts it.
fn notify_line() -> String {
    let coinbase1 = format!(
        "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff20{}",
        "00".repeat(24)
    );
    let coinbase2 = format!("ffffffff0100f2052a01000000160014{}00000000", "00".repeat(20));
    format!(
        concat!(
            r#"{{"id":null,"method":"mining.notify","params":["a1b2","#,
            r#""6b6455fd6db962c101f2d4fc0d67f4a3bc96391d000152960000000000000000","#,
            r#""{}","{}",[],"20000000","1d00ffff","495fab29",true]}}"#,
            "\n"
        ),
        coinbase1, coinbase2
    )
}

/// Serve one handshake on an accepted connection, returning the request
/// lines received.
fn serve_handshake(stream: &std::net::TcpStream) -> Vec<String> {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream.try_clone().unwrap();
    let mut received = Vec::new();

    let mut line = String::new();
    reader.read_line(&mut line).unwrap(); // mining.subscribe
    received.push(line.trim().to_string());
    writer.write_all(SUBSCRIBE_RESPONSE).unwrap();

    line.clear();
    reader.read_line(&mut line).unwrap(); // mining.authorize
    received.push(line.trim().to_string());
    writer.write_all(AUTHORIZE_RESPONSE).unwrap();

    received
}

#[test]
fn test_sever_mid_scan_tears_down_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let (handshakes_tx, handshakes_rx) = mpsc::channel();
    let pool = thread::spawn(move || {
        // Session one: handshake, a job, then sever while the worker is
        // deep in the nonce space.
        {
            let (stream, _) = listener.accept().unwrap();
            let received = serve_handshake(&stream);
            (&stream).write_all(notify_line().as_bytes()).unwrap();
            handshakes_tx.send(received).unwrap();
            // Dropping the stream here sends the FIN mid-scan.
        }

        // Session two: the worker must come back with a fresh handshake.
        let (stream, _) = listener.accept().unwrap();
        let received = serve_handshake(&stream);
        handshakes_tx.send(received).unwrap();

        // Keep the socket open until the worker shuts down.
        let mut sink = BufReader::new(stream);
        let mut scratch = String::new();
        let _ = sink.read_line(&mut scratch);
    });

    let config = Arc::new(test_config(port));
    let stats = Arc::new(StatsRegistry::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    let worker = {
        let worker = Worker::new(
            0,
            Arc::clone(&config),
            Arc::clone(&stats),
            Arc::clone(&shutdown),
        );
        thread::spawn(move || worker.run())
    };

    let first = handshakes_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("first handshake");
    assert!(first[0].contains("\"mining.subscribe\""));
    assert!(first[1].contains("\"mining.authorize\""));
    assert!(first[1].contains("bc1qtestworker"));

    // The sever happens while the worker is scanning; it must notice at a
    // stats interval, tear the session down, and redo the handshake.
    let second = handshakes_rx
        .recv_timeout(Duration::from_secs(30))
        .expect("handshake after reconnect");
    assert!(second[0].contains("\"mining.subscribe\""));
    assert!(second[1].contains("\"mining.authorize\""));

    shutdown.store(true, Ordering::Relaxed);
    worker.join().unwrap();
    pool.join().unwrap();

    let snap = stats.snapshot();
    assert_eq!(snap.templates, 1, "one job was handed out");
    assert!(
        snap.hashes > 0,
        "scan counters must be flushed before teardown"
    );
    assert_eq!(snap.valids, 0);
    assert!(!snap.block_found);
}
