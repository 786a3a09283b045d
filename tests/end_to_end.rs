//! Client runs against a loopback stand-in for the cache server.

use cache_harness::client::{self, Deadline, DeadlineSource, ThreadTimer};
use cache_harness::config::ClientConfig;
use cache_harness::HarnessError;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What the stand-in server saw on its single connection.
#[derive(Debug, Default)]
struct Observed {
    stats_requests: u64,
    shutdown: bool,
}

/// Accept one connection and answer every stats request with `reply`.
/// On `shutdown` the connection is closed.
fn spawn_server(reply: &'static [u8]) -> (u16, JoinHandle<Observed>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut observed = Observed::default();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            match line.as_str() {
                "stats cachedump 1 0 0\r\n" => {
                    observed.stats_requests += 1;
                    writer.write_all(reply).unwrap();
                }
                "shutdown\r\n" => {
                    observed.shutdown = true;
                    break;
                }
                other => panic!("unexpected request {other:?}"),
            }
        }
        observed
    });

    (port, handle)
}

fn client_config(port: u16, runtime: Duration, delay: Duration) -> ClientConfig {
    ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        runtime,
        delay,
        max_line: 1024,
        connect_timeout: Duration::from_secs(2),
        progress_every: 0,
        nodelay: true,
    }
}

#[test]
fn test_runs_until_deadline_and_shuts_server_down() {
    let (port, server) = spawn_server(b"END\r\n");
    let config = client_config(port, Duration::from_millis(550), Duration::from_millis(100));

    let report = client::run(&config, &ThreadTimer).unwrap();
    let observed = server.join().unwrap();

    assert!(
        (1..=10).contains(&report.iterations),
        "iterations = {}",
        report.iterations
    );
    assert_eq!(observed.stats_requests, report.iterations);
    assert!(observed.shutdown);
    assert!(report.elapsed >= Duration::from_millis(100));
}

/// Fires as soon as it is armed.
struct Expired;

impl DeadlineSource for Expired {
    fn arm(&self, deadline: &Deadline, _after: Duration) -> io::Result<()> {
        deadline.fire();
        Ok(())
    }
}

#[test]
fn test_expired_deadline_goes_straight_to_shutdown() {
    let (port, server) = spawn_server(b"END\r\n");
    let config = client_config(port, Duration::from_secs(60), Duration::ZERO);

    let report = client::run(&config, &Expired).unwrap();
    let observed = server.join().unwrap();

    assert_eq!(report.iterations, 0);
    assert_eq!(observed.stats_requests, 0);
    assert!(observed.shutdown);
}

#[test]
fn test_bad_reply_stops_the_run() {
    let (port, server) = spawn_server(b"ERROR\r\n");
    let config = client_config(port, Duration::from_secs(60), Duration::ZERO);

    match client::run(&config, &ThreadTimer) {
        Err(HarnessError::UnexpectedResponse(line)) => assert_eq!(line, "ERROR\r\n"),
        other => panic!("unexpected: {:?}", other.map(|r| r.iterations)),
    }

    let observed = server.join().unwrap();
    assert_eq!(observed.stats_requests, 1);
    assert!(!observed.shutdown);
}

#[test]
fn test_server_that_ignores_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "shutdown\r\n");
        writer.write_all(b"ERROR\r\n").unwrap();
        // Hold the connection open until the client gives up on it.
        line.clear();
        let _ = reader.read_line(&mut line);
    });

    let config = client_config(port, Duration::ZERO, Duration::ZERO);
    assert!(matches!(
        client::run(&config, &ThreadTimer),
        Err(HarnessError::ShutdownRefused(7))
    ));
    server.join().unwrap();
}
