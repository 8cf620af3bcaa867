use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::core::message::ChatMessage;

/// A canned reply served by [`spawn_http_stub`]. The body is written in
/// `chunks`, pausing `chunk_delay` between them, and the connection is
/// closed afterwards so close-delimited streams end.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: String,
    pub chunks: Vec<String>,
    pub chunk_delay: Duration,
}

impl StubResponse {
    pub fn ok(content_type: &str, body: &str) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            chunks: vec![body.to_string()],
            chunk_delay: Duration::ZERO,
        }
    }

    pub fn json(body: &str) -> Self {
        Self::ok("application/json", body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::json(body)
        }
    }

    pub fn chunked(content_type: &str, chunks: &[&str], chunk_delay: Duration) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            chunks: chunks.iter().map(|chunk| chunk.to_string()).collect(),
            chunk_delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

pub struct HttpStub {
    addr: SocketAddr,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    _server: tokio::task::JoinHandle<()>,
}

impl HttpStub {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().await.clone()
    }
}

/// Serve `responses` in order, one per connection.
pub async fn spawn_http_stub(responses: Vec<StubResponse>) -> HttpStub {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let captured = Arc::new(Mutex::new(Vec::new()));
    let captured_for_server = Arc::clone(&captured);

    let server = tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            match read_http_request(&mut stream).await {
                Ok(request) => captured_for_server.lock().await.push(request),
                Err(_) => continue,
            }
            let _ = write_response(&mut stream, &response).await;
        }
    });

    HttpStub {
        addr,
        captured,
        _server: server,
    }
}

/// A reqwest client that ignores proxy environment variables, so stub
/// traffic always goes straight to localhost.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("test client should build")
}

pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        let frame = serde_json::json!({ "choices": [{ "delta": { "content": delta } }] });
        body.push_str(&format!("data: {frame}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn ndjson_body(deltas: &[&str]) -> String {
    deltas
        .iter()
        .map(|delta| {
            serde_json::json!({ "message": { "role": "assistant", "content": delta } }).to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn create_test_history() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("Hello"),
        ChatMessage::assistant("Hi there!"),
        ChatMessage::user("How are you?"),
        ChatMessage::assistant("I'm doing well, thank you for asking!"),
    ]
}

async fn write_response(stream: &mut TcpStream, response: &StubResponse) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        response.content_type
    );
    stream.write_all(head.as_bytes()).await?;
    for (index, chunk) in response.chunks.iter().enumerate() {
        if index > 0 && !response.chunk_delay.is_zero() {
            tokio::time::sleep(response.chunk_delay).await;
        }
        stream.write_all(chunk.as_bytes()).await?;
        stream.flush().await?;
    }
    stream.shutdown().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.ok_or_else(|| "header end should exist".to_string())?;
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length.saturating_sub(body.len())];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
