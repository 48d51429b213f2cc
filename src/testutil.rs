//! Canned-response HTTP listener for exercising the fetcher in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct Canned {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

pub fn ok(body: &str) -> Canned {
    Canned {
        status: 200,
        body: body.to_string(),
        delay: Duration::ZERO,
    }
}

pub fn ok_slow(body: &str, delay_ms: u64) -> Canned {
    Canned {
        delay: Duration::from_millis(delay_ms),
        ..ok(body)
    }
}

pub fn status(code: u16) -> Canned {
    Canned {
        status: code,
        body: String::new(),
        delay: Duration::ZERO,
    }
}

#[derive(Default)]
struct Gauge {
    current: u32,
    max: u32,
}

/// Routes map a path to a response sequence; the last entry repeats.
/// Unknown paths get a 404. Request counts and the peak number of
/// simultaneously open requests are recorded for assertions.
pub struct TestServer {
    addr: String,
    hits: Arc<Mutex<HashMap<String, u32>>>,
    gauge: Arc<Mutex<Gauge>>,
}

impl TestServer {
    pub async fn start(routes: HashMap<String, Vec<Canned>>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let hits: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
        let gauge: Arc<Mutex<Gauge>> = Arc::default();

        let accept_hits = Arc::clone(&hits);
        let accept_gauge = Arc::clone(&gauge);
        let routes = Arc::new(routes);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&accept_hits);
                let gauge = Arc::clone(&accept_gauge);
                tokio::spawn(async move {
                    handle(socket, &routes, &hits, &gauge).await;
                });
            }
        });

        TestServer { addr, hits, gauge }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> u32 {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.gauge.lock().unwrap().max
    }
}

async fn handle(
    mut socket: tokio::net::TcpStream,
    routes: &HashMap<String, Vec<Canned>>,
    hits: &Mutex<HashMap<String, u32>>,
    gauge: &Mutex<Gauge>,
) {
    {
        let mut g = gauge.lock().unwrap();
        g.current += 1;
        g.max = g.max.max(g.current);
    }

    let request = read_request(&mut socket).await;
    let path = request
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let seq = {
        let mut h = hits.lock().unwrap();
        let count = h.entry(path.clone()).or_insert(0);
        *count += 1;
        *count as usize - 1
    };

    let canned = routes
        .get(&path)
        .map(|responses| responses[seq.min(responses.len() - 1)].clone())
        .unwrap_or_else(|| status(404));

    if !canned.delay.is_zero() {
        tokio::time::sleep(canned.delay).await;
    }

    let reason = match canned.status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Canned",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n{}",
        canned.status,
        reason,
        canned.body.len(),
        canned.body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;

    gauge.lock().unwrap().current -= 1;
}

/// Read headers plus any Content-Length body so the client never sees a
/// reset while still writing.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = vec![0u8; 16 * 1024];
    let mut read = 0usize;
    let mut headers_end = None;

    loop {
        if headers_end.is_none() {
            headers_end = buf[..read]
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map(|p| p + 4);
        }
        if let Some(end) = headers_end {
            let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if read >= end + content_length {
                break;
            }
        }
        if read == buf.len() {
            break;
        }
        match socket.read(&mut buf[read..]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => read += n,
        }
    }

    String::from_utf8_lossy(&buf[..read]).to_string()
}
