//! Minimal HTTP/1.1 framing over a raw byte stream.
//! Reads one request head, lets the handler complete the body, writes one response; no keep-alive.

use crate::error::{ConsoleError, ConsoleResult};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";
const HEAD_CHUNK: usize = 1024;
const BODY_CHUNK: usize = 2048;
/// Largest body a handler will assemble (device flash is small).
pub const MAX_BODY_BYTES: usize = 512 * 1024;

/// HTTP method for requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            _ => None,
        }
    }
}

/// A framed request. `body` holds whatever arrived with the head until `read_body` completes it.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    /// Lowercased keys; a repeated header keeps its last value.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Declared body length; absent or unparseable means 0.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .map(|v| v.eq_ignore_ascii_case("100-continue"))
            .unwrap_or(false)
    }

    /// Path without the query component.
    pub fn route(&self) -> &str {
        split_query(&self.path).0
    }

    pub fn query(&self) -> Form {
        Form::parse(split_query(&self.path).1.as_bytes())
    }
}

/// HTTP response (server → client). Always sent with `Connection: close`.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status_code: u16,
    pub reason_phrase: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16, reason_phrase: &str) -> Self {
        Self {
            status_code,
            reason_phrase: reason_phrase.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: &[u8], content_type: &str) -> Self {
        Self::new(200, "OK")
            .with_header("Content-Type", content_type)
            .with_header("Cache-Control", "no-store")
            .with_body(body)
    }

    pub fn html(body: &str) -> Self {
        Self::ok(body.as_bytes(), "text/html; charset=utf-8")
    }

    pub fn text(body: &str) -> Self {
        Self::ok(body.as_bytes(), "text/plain; charset=utf-8")
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(400, "Bad Request")
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(msg.as_bytes())
    }

    pub fn unauthorized(realm: &str) -> Self {
        Self::new(401, "Unauthorized")
            .with_header("WWW-Authenticate", &format!("Basic realm=\"{}\"", realm))
            .with_header("Content-Type", "text/plain")
            .with_body(b"Auth required")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status_code, self.reason_phrase).as_bytes(),
        );
        out.extend_from_slice(b"Connection: close\r\n");
        for (k, v) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", k, v).as_bytes());
        }
        if !self.body.is_empty() {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Read until the end of the request head. Fails with `Malformed` when the delimiter is not
/// seen within `max_head` bytes or the client hangs up first. Answers `Expect: 100-continue`.
pub async fn read_request_head<S>(stream: &mut S, max_head: usize) -> ConsoleResult<HttpRequest>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut data: Vec<u8> = Vec::new();
    let mut chunk = [0u8; HEAD_CHUNK];
    let split = loop {
        if let Some(pos) = find_delimiter(&data) {
            break pos;
        }
        if data.len() >= max_head {
            return Err(ConsoleError::Malformed(format!(
                "no end of headers within {} bytes",
                max_head
            )));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ConsoleError::Malformed(
                "connection closed before end of headers".to_string(),
            ));
        }
        data.extend_from_slice(&chunk[..n]);
    };

    let mut req = parse_head(&data[..split])?;
    req.body = data[split + HEAD_DELIMITER.len()..].to_vec();

    if req.expects_continue() {
        let _ = stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await;
    }
    Ok(req)
}

/// Complete `req.body` up to its declared Content-Length. Stops early when the client
/// hangs up or goes quiet for `recv_timeout`; a partial body is kept as-is.
pub async fn read_body<S>(
    stream: &mut S,
    req: &mut HttpRequest,
    recv_timeout: Duration,
) -> ConsoleResult<()>
where
    S: AsyncRead + Unpin,
{
    let total = req.content_length();
    if total > MAX_BODY_BYTES {
        return Err(ConsoleError::Malformed(format!(
            "body of {} bytes exceeds {} byte limit",
            total, MAX_BODY_BYTES
        )));
    }
    let mut chunk = [0u8; BODY_CHUNK];
    while req.body.len() < total {
        let want = (total - req.body.len()).min(BODY_CHUNK);
        let n = match tokio::time::timeout(recv_timeout, stream.read(&mut chunk[..want])).await {
            Ok(res) => res?,
            Err(_) => break,
        };
        if n == 0 {
            break;
        }
        req.body.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Parse the request line and headers (everything before `\r\n\r\n`).
pub fn parse_head(head: &[u8]) -> ConsoleResult<HttpRequest> {
    let s = std::str::from_utf8(head)
        .map_err(|e| ConsoleError::Malformed(format!("head is not utf-8: {}", e)))?;
    let mut lines = s.split("\r\n");
    let first = lines
        .next()
        .ok_or_else(|| ConsoleError::Malformed("missing request line".to_string()))?;
    let parts: Vec<&str> = first.splitn(3, ' ').collect();
    if parts.len() < 3 {
        return Err(ConsoleError::Malformed(format!(
            "invalid request line: {}",
            first
        )));
    }
    let method = HttpMethod::parse(parts[0])
        .ok_or_else(|| ConsoleError::Malformed(format!("unknown method: {}", parts[0])))?;

    let mut req = HttpRequest::new(method, parts[1]);
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            req.headers
                .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Ok(req)
}

fn find_delimiter(data: &[u8]) -> Option<usize> {
    data.windows(HEAD_DELIMITER.len())
        .position(|w| w == HEAD_DELIMITER)
}

/// `("/run", "f=a.lua")` from `"/run?f=a.lua"`.
pub fn split_query(path: &str) -> (&str, &str) {
    path.split_once('?').unwrap_or((path, ""))
}

/// Decoded `application/x-www-form-urlencoded` pairs (also used for query strings).
/// Repeated keys keep every value in arrival order.
#[derive(Clone, Debug, Default)]
pub struct Form {
    fields: HashMap<String, Vec<Vec<u8>>>,
}

impl Form {
    pub fn parse(raw: &[u8]) -> Self {
        let mut fields: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        for pair in raw.split(|b| *b == b'&') {
            if pair.is_empty() {
                continue;
            }
            let (k, v) = match pair.iter().position(|b| *b == b'=') {
                Some(i) => (&pair[..i], &pair[i + 1..]),
                None => (pair, &[][..]),
            };
            let key = String::from_utf8_lossy(&url_decode(k)).into_owned();
            fields.entry(key).or_default().push(url_decode(v));
        }
        Self { fields }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// First raw value for `key`, byte-exact.
    pub fn first(&self, key: &str) -> Option<&[u8]> {
        self.fields
            .get(key)
            .and_then(|v| v.first())
            .map(Vec::as_slice)
    }

    pub fn first_str(&self, key: &str) -> Option<String> {
        self.first(key)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// `+` → space and `%XX` → byte. A broken escape is kept literally.
pub fn url_decode(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                match (hex_val(raw.get(i + 1)), hex_val(raw.get(i + 2))) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

fn hex_val(b: Option<&u8>) -> Option<u8> {
    match b? {
        c @ b'0'..=b'9' => Some(c - b'0'),
        c @ b'a'..=b'f' => Some(c - b'a' + 10),
        c @ b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_get_request() {
        let (mut client, mut server) = duplex(4096);
        client
            .write_all(b"GET /run?f=a.lua HTTP/1.1\r\nHost: esp\r\nAuthorization: Basic abc\r\n\r\n")
            .await
            .unwrap();
        let req = read_request_head(&mut server, MAX_BODY_BYTES).await.unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "/run?f=a.lua");
        assert_eq!(req.route(), "/run");
        assert_eq!(req.header("Authorization"), Some("Basic abc"));
        assert_eq!(req.header("host"), Some("esp"));
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn test_body_prefix_is_kept_and_completed() {
        let (mut client, mut server) = duplex(4096);
        client
            .write_all(b"POST /exec HTTP/1.1\r\nContent-Length: 11\r\n\r\ncode=")
            .await
            .unwrap();
        let mut req = read_request_head(&mut server, 1024).await.unwrap();
        assert_eq!(req.body, b"code=");
        client.write_all(b"x%3D1").await.unwrap();
        client.write_all(b"!").await.unwrap();
        read_body(&mut server, &mut req, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(req.body, b"code=x%3D1!");
    }

    #[tokio::test]
    async fn test_partial_body_accepted_when_client_hangs_up() {
        let (mut client, mut server) = duplex(4096);
        client
            .write_all(b"POST /save HTTP/1.1\r\nContent-Length: 100\r\n\r\nname=a")
            .await
            .unwrap();
        drop(client);
        let mut req = read_request_head(&mut server, 1024).await.unwrap();
        read_body(&mut server, &mut req, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(req.body, b"name=a");
    }

    #[tokio::test]
    async fn test_missing_delimiter_within_bound_is_malformed() {
        let (mut client, mut server) = duplex(1 << 16);
        client.write_all(&[b'a'; 3000]).await.unwrap();
        let err = read_request_head(&mut server, 2048).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_eof_before_delimiter_is_malformed() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();
        drop(client);
        let err = read_request_head(&mut server, 1024).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_short_request_line_is_malformed() {
        let (mut client, mut server) = duplex(1024);
        client.write_all(b"GET /\r\n\r\n").await.unwrap();
        let err = read_request_head(&mut server, 1024).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_expect_continue_gets_interim_response() {
        let (mut client, mut server) = duplex(1024);
        client
            .write_all(b"POST /save HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 3\r\n\r\n")
            .await
            .unwrap();
        let req = read_request_head(&mut server, 1024).await.unwrap();
        assert!(req.expects_continue());
        let mut buf = [0u8; 25];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HTTP/1.1 100 Continue\r\n\r\n");
    }

    #[tokio::test]
    async fn test_oversized_content_length_is_rejected() {
        let mut req = HttpRequest::new(HttpMethod::Post, "/save");
        req.headers
            .insert("content-length".into(), (MAX_BODY_BYTES + 1).to_string());
        let (_client, mut server) = duplex(16);
        let err = read_body(&mut server, &mut req, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::Malformed(_)));
    }

    #[test]
    fn test_parse_head_lowercases_and_dedups_headers() {
        let req = parse_head(b"POST /exec HTTP/1.1\r\nX-A: 1\r\nx-a: 2\r\nno-colon-line").unwrap();
        assert_eq!(req.header("x-a"), Some("2"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_unknown_method_is_malformed() {
        assert!(parse_head(b"BREW /pot HTTP/1.1").is_err());
    }

    #[test]
    fn test_response_to_bytes() {
        let s = String::from_utf8(HttpResponse::text("Hello").to_bytes()).unwrap();
        assert!(s.starts_with("HTTP/1.1 200 OK\r\nConnection: close\r\n"));
        assert!(s.contains("Cache-Control: no-store\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn test_form_decoding() {
        let form = Form::parse(b"name=a.lua&code=print(%22a%26b%22)+--x&run=1&run=2&flag");
        assert_eq!(form.first_str("name").as_deref(), Some("a.lua"));
        assert_eq!(form.first("code"), Some(&b"print(\"a&b\") --x"[..]));
        assert_eq!(form.first_str("run").as_deref(), Some("1"));
        assert!(form.contains("flag"));
        assert!(!form.contains("missing"));
    }

    #[test]
    fn test_url_decode_keeps_broken_escapes() {
        assert_eq!(url_decode(b"100%"), b"100%");
        assert_eq!(url_decode(b"%zz%4"), b"%zz%4");
        assert_eq!(url_decode(b"%c3%a9"), "é".as_bytes());
    }

    #[test]
    fn test_split_query() {
        assert_eq!(split_query("/del?f=x"), ("/del", "f=x"));
        assert_eq!(split_query("/"), ("/", ""));
    }
}
