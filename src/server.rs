//! Accept loop and the per-connection pipeline: head → auth → route → body → handler.
//! Connections are served one at a time; each one is answered once and closed.

use crate::error::{ConsoleError, ConsoleResult};
use crate::handlers;
use crate::net::http_proto::{HttpMethod, HttpResponse, read_body, read_request_head};
use crate::net::router::Route;
use crate::state::ConsoleState;
use futures_util::FutureExt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, warn};

pub async fn bind(addr: SocketAddr) -> ConsoleResult<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Runs until the process ends. Accept timeouts hand control to `DeviceControl::idle`.
pub async fn serve(listener: TcpListener, state: Arc<ConsoleState>) {
    loop {
        let (stream, peer) = match timeout(state.config.accept_timeout, listener.accept()).await {
            Err(_) => {
                state.device.idle();
                continue;
            }
            Ok(Err(e)) => {
                warn!("[http] accept failed: {}", e);
                continue;
            }
            Ok(Ok(conn)) => conn,
        };

        let conn_state = state.clone();
        let task = tokio::spawn(async move { handle_connection(stream, conn_state).await });
        if let Err(e) = task.await {
            warn!("[http] connection from {} aborted: {}", peer, e);
        }
    }
}

type Outcome = std::thread::Result<ConsoleResult<HttpResponse>>;

/// Serve exactly one request on `stream`, then shut it down. A panic while producing
/// the response still gets a 400 back to the client.
pub async fn handle_connection<S>(mut stream: S, state: Arc<ConsoleState>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = AssertUnwindSafe(respond(&mut stream, &state))
        .catch_unwind()
        .await;
    reply(&mut stream, outcome, &state).await;
}

async fn reply<S>(stream: &mut S, outcome: Outcome, state: &ConsoleState)
where
    S: AsyncWrite + Unpin,
{
    let response = match outcome {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            match &e {
                ConsoleError::Unauthorized => debug!("[http] rejected: {}", e),
                e if e.is_transport() => debug!("[http] bad request: {}", e),
                e => warn!("[http] handler failed: {}", e),
            }
            error_response(&e, state)
        }
        Err(_) => {
            warn!("[http] handler panicked");
            HttpResponse::bad_request("Exception: handler panicked")
        }
    };
    if let Err(e) = stream.write_all(&response.to_bytes()).await {
        debug!("[http] write failed: {}", e);
    }
    let _ = stream.shutdown().await;
}

async fn respond<S>(stream: &mut S, state: &Arc<ConsoleState>) -> ConsoleResult<HttpResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = read_request_head(stream, state.config.max_head);
    let mut req = timeout(state.config.recv_timeout, head)
        .await
        .map_err(|_| ConsoleError::Timeout)??;

    if !state.auth.check(&req) {
        return Err(ConsoleError::Unauthorized);
    }

    let Some(route) = Route::resolve(req.method, &req.path) else {
        let msg = match req.method {
            HttpMethod::Post => "Unknown POST",
            _ => "Bad Request",
        };
        return Ok(HttpResponse::bad_request(msg));
    };

    if route.reads_body() {
        read_body(stream, &mut req, state.config.recv_timeout).await?;
    }
    handlers::dispatch(route, &req, state).await
}

fn error_response(e: &ConsoleError, state: &ConsoleState) -> HttpResponse {
    match e {
        ConsoleError::Unauthorized => state.auth.challenge(),
        ConsoleError::Malformed(_) | ConsoleError::Timeout => HttpResponse::bad_request("Bad headers"),
        other => HttpResponse::bad_request(&format!("Exception: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::basic_header_value;
    use crate::config::ConsoleConfig;
    use crate::device::DeviceControl;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, duplex};

    struct NoopDevice;

    impl DeviceControl for NoopDevice {
        fn reset(&self) {}
    }

    fn state(dir: &tempfile::TempDir) -> Arc<ConsoleState> {
        let config = ConsoleConfig {
            root: dir.path().to_path_buf(),
            recv_timeout: Duration::from_millis(200),
            ..ConsoleConfig::default()
        };
        Arc::new(ConsoleState::new(config, Arc::new(NoopDevice)).unwrap())
    }

    async fn exchange(st: Arc<ConsoleState>, raw: &[u8]) -> String {
        let (mut client, server) = duplex(64 * 1024);
        client.write_all(raw).await.unwrap();
        handle_connection(server, st).await;
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    fn authed(request_line: &str, extra: &str) -> Vec<u8> {
        format!(
            "{}\r\nAuthorization: {}\r\n{}\r\n",
            request_line,
            basic_header_value("admin", "admin"),
            extra
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_missing_auth_is_401() {
        let dir = tempfile::tempdir().unwrap();
        let out = exchange(state(&dir), b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(out.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn test_unauthorized_save_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(&dir);
        let out = exchange(
            st.clone(),
            b"POST /save HTTP/1.1\r\nContent-Length: 15\r\n\r\nname=x.lua&code",
        )
        .await;
        assert!(out.starts_with("HTTP/1.1 401"));
        assert!(!st.store.exists("x.lua").await);
    }

    #[tokio::test]
    async fn test_garbage_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let out = exchange(state(&dir), b"HELLO\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.ends_with("Bad headers"));
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, server) = duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        handle_connection(server, state(&dir)).await;
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8_lossy(&out).starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(&dir);
        let get = exchange(st.clone(), &authed("GET /nope HTTP/1.1", "")).await;
        assert!(get.starts_with("HTTP/1.1 400"));
        assert!(get.ends_with("Bad Request"));
        let post = exchange(st, &authed("POST /nope HTTP/1.1", "Content-Length: 0\r\n")).await;
        assert!(post.ends_with("Unknown POST"));
    }

    async fn exploding_handler() -> ConsoleResult<HttpResponse> {
        panic!("handler blew up")
    }

    #[tokio::test]
    async fn test_panicking_handler_still_gets_400() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(&dir);
        let (mut client, mut server) = duplex(4096);
        let outcome = AssertUnwindSafe(exploding_handler()).catch_unwind().await;
        reply(&mut server, outcome, &st).await;
        drop(server);

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("Exception: handler panicked"));
    }

    #[tokio::test]
    async fn test_log_route() {
        let dir = tempfile::tempdir().unwrap();
        let st = state(&dir);
        st.log.append("booted\n");
        let out = exchange(st, &authed("GET /log HTTP/1.1", "")).await;
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Type: text/plain"));
        assert!(out.ends_with("\r\n\r\nbooted\n"));
    }
}
