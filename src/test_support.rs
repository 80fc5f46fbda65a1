//! Shared test doubles: canned HTTP responders over raw sockets

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve exactly one HTTP request with a canned JSON body, returning the
/// request's JSON body (or Null for body-less requests)
pub fn serve_one_json(
    listener: TcpListener,
    status_line: &'static str,
    body: String,
) -> JoinHandle<serde_json::Value> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 65536];
        let mut read = 0;
        let request_body = loop {
            let n = socket.read(&mut buf[read..]).await.unwrap();
            read += n;
            let text = String::from_utf8_lossy(&buf[..read]).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let len = text
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if read >= header_end + 4 + len {
                    break text[header_end + 4..header_end + 4 + len].to_string();
                }
            }
            if n == 0 {
                panic!("client closed before sending a full request");
            }
        };

        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();

        if request_body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&request_body).unwrap()
        }
    })
}

/// Request log shared between a routed server and the test body
pub type RequestLog = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

/// Serve requests forever, answering by path prefix and recording
/// (path, body) pairs; tests abort the handle when done
pub fn serve_routes(
    listener: TcpListener,
    routes: Vec<(&'static str, String)>,
    log: RequestLog,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 65536];
            let mut read = 0;
            let (path, request_body) = loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                read += n;
                let text = String::from_utf8_lossy(&buf[..read]).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let len = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if read >= header_end + 4 + len {
                        let path = text
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or_default()
                            .to_string();
                        break (path, text[header_end + 4..header_end + 4 + len].to_string());
                    }
                }
                if n == 0 {
                    return;
                }
            };

            let body_value = if request_body.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(&request_body).unwrap()
            };
            log.lock().unwrap().push((path.clone(), body_value));

            let (status, body) = match routes.iter().find(|(p, _)| path.starts_with(p)) {
                Some((_, body)) => ("200 OK", body.clone()),
                None => ("404 Not Found", "{}".to_string()),
            };
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        }
    })
}
