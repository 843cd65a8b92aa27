#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Decoded view of one request the fixture received.
#[derive(Clone, Debug)]
pub struct FixtureRequest {
    pub filter: String,
    pub limit: Option<String>,
}

impl FixtureRequest {
    /// First quoted literal after `field = '`.
    pub fn entity(&self, field: &str) -> Option<String> {
        quoted_after(&self.filter, &format!("{field} = '"))
    }

    /// Literal bound in `field >= '...'`.
    pub fn window_start(&self, field: &str) -> Option<String> {
        quoted_after(&self.filter, &format!("{field} >= '"))
    }
}

fn quoted_after(haystack: &str, prefix: &str) -> Option<String> {
    let rest = haystack.split_once(prefix)?.1;
    Some(rest.split('\'').next()?.to_string())
}

/// Counters shared between the fixture server and the test.
#[derive(Default)]
pub struct FixtureStats {
    pub requests: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FixtureStats {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Status line and body returned for one request.
pub struct FixtureResponse {
    pub status: &'static str,
    pub body: Vec<u8>,
}

impl FixtureResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: "200 OK",
            body: body.into(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: "500 Internal Server Error",
            body: b"{\"error\":true}".to_vec(),
        }
    }
}

/// Serve every incoming connection on its own thread until the test exits.
pub fn spawn_fixture_http<F>(delay: Duration, respond: F) -> (String, Arc<FixtureStats>)
where
    F: Fn(&FixtureRequest) -> FixtureResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(FixtureStats::default());
    let respond = Arc::new(respond);
    let server_stats = Arc::clone(&stats);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else {
                continue;
            };
            let stats = Arc::clone(&server_stats);
            let respond = Arc::clone(&respond);
            thread::spawn(move || handle(stream, delay, &stats, respond.as_ref()));
        }
    });
    (format!("http://{addr}/resource/speeds.json"), stats)
}

fn handle<F>(mut stream: TcpStream, delay: Duration, stats: &FixtureStats, respond: &F)
where
    F: Fn(&FixtureRequest) -> FixtureResponse,
{
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(read) => raw.extend_from_slice(&buf[..read]),
        }
    }
    let current = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stats.max_in_flight.fetch_max(current, Ordering::SeqCst);
    stats.requests.fetch_add(1, Ordering::SeqCst);

    let request = parse_request(&String::from_utf8_lossy(&raw));
    thread::sleep(delay);
    let response = respond(&request);

    stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    let headers = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len()
    );
    let _ = stream.write_all(headers.as_bytes());
    let _ = stream.write_all(&response.body);
    let _ = stream.flush();
}

fn parse_request(raw: &str) -> FixtureRequest {
    let target = raw
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default();
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();
    let mut filter = String::new();
    let mut limit = None;
    for pair in query.split('&') {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        match percent_decode(name).as_str() {
            "$where" => filter = percent_decode(value),
            "$limit" => limit = Some(percent_decode(value)),
            _ => {}
        }
    }
    FixtureRequest { filter, limit }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'+' => {
                out.push(b' ');
                idx += 1;
            }
            b'%' if idx + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[idx + 1..idx + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        idx += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        idx += 1;
                    }
                }
            }
            other => {
                out.push(other);
                idx += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// JSON array of `count` rows tagged with the request's entity and window start.
pub fn tagged_rows(request: &FixtureRequest, count: usize) -> String {
    let entity = request.entity("link_name").unwrap_or_default();
    let start = request
        .window_start("median_calculation_timestamp")
        .unwrap_or_default();
    let rows: Vec<serde_json::Value> = (0..count)
        .map(|idx| {
            serde_json::json!({
                "link_name": entity,
                "median_calculation_timestamp": start,
                "median_speed_fps": format!("{}.5", 20 + idx),
                "n_samples": "12",
            })
        })
        .collect();
    serde_json::Value::Array(rows).to_string()
}

pub fn day(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 8, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + TimeDelta::days(offset)
}
