//! [`ApiServer`] – HTTP + WebSocket server on a single port.
//!
//! Listens on `0.0.0.0:5000` (configurable via [`ApiServer::with_port`]).
//!
//! * Regular HTTP requests → the read/write API in [`routes`][crate::routes].
//! * WebSocket upgrades → a viewer session (`ws`).
//!
//! The request head is read in full before dispatch and then replayed, so
//! the upgrade check and the handshake see the same bytes. Clients that do
//! not finish a request within the read timeout are disconnected.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hearth_kernel::BridgeCore;
use hearth_types::HearthError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{self, RequestError, Response};
use crate::{routes, ws};

/// Default TCP port for the API.
pub const DEFAULT_PORT: u16 = 5000;

/// How long a client may take to send a complete request.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApiServer {
    core: Arc<BridgeCore>,
    port: u16,
    read_timeout: Duration,
}

impl ApiServer {
    /// Create a server backed by `core` on the [`DEFAULT_PORT`].
    pub fn new(core: Arc<BridgeCore>) -> Self {
        Self {
            core,
            port: DEFAULT_PORT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Override the listening port (builder-style). `0` picks a free port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Deadline for reading a request (the handshake, for viewers).
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::Io`] if the port cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, HearthError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        TcpListener::bind(addr)
            .await
            .map_err(|e| HearthError::Io(format!("bind error on {addr}: {e}")))
    }

    /// Bind and serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), HearthError> {
        let listener = self.bind().await?;
        self.serve(listener, cancel).await
    }

    /// Accept connections on `listener` until `cancel` fires.
    ///
    /// Each connection is dispatched as either a viewer session (when the
    /// request carries `Upgrade: websocket`) or a single API request.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), HearthError> {
        let local = listener.local_addr()?;
        info!(addr = %local, "API listening on http://localhost:{}", local.port());

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let core = Arc::clone(&self.core);
                        let read_timeout = self.read_timeout;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, core, read_timeout).await {
                                debug!(%peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept error"),
                },
            }
        }
        info!("API server stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    core: Arc<BridgeCore>,
    read_timeout: Duration,
) -> Result<(), HearthError> {
    let (mut reader, mut writer) = stream.into_split();
    let head = match tokio::time::timeout(read_timeout, http::read_head(&mut reader)).await {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => return answer_error(&mut writer, peer, e).await,
        Err(_) => {
            debug!(%peer, "request head not received in time; closing");
            return Ok(());
        }
    };

    // The head was consumed from the socket; replay it ahead of the rest.
    let upgrade = is_ws_upgrade(&head);
    let replay = Cursor::new(head).chain(reader);
    if upgrade {
        ws::handle_viewer(tokio::io::join(replay, writer), peer, core).await
    } else {
        serve_http(replay, writer, peer, &core, read_timeout).await
    }
}

/// Whether the request head asks for a WebSocket upgrade.
fn is_ws_upgrade(head: &[u8]) -> bool {
    let head = &head[..http::head_len(head).unwrap_or(head.len())];
    String::from_utf8_lossy(head).lines().any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    })
}

async fn serve_http<R: AsyncRead + Unpin>(
    mut reader: R,
    mut writer: OwnedWriteHalf,
    peer: SocketAddr,
    core: &BridgeCore,
    read_timeout: Duration,
) -> Result<(), HearthError> {
    let request = match tokio::time::timeout(read_timeout, http::read_request(&mut reader)).await {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => return answer_error(&mut writer, peer, e).await,
        Err(_) => {
            debug!(%peer, "request body not received in time; closing");
            return Ok(());
        }
    };
    let response = routes::route(core, &request);
    debug!(
        %peer,
        method = %request.method,
        path = %request.path,
        status = response.status,
        "request"
    );
    write_response(&mut writer, &response).await
}

/// Answer a request that could not be read, when it is worth answering.
async fn answer_error(
    writer: &mut OwnedWriteHalf,
    peer: SocketAddr,
    error: RequestError,
) -> Result<(), HearthError> {
    match error.status() {
        Some(status) => {
            debug!(%peer, error = %error, status, "bad request");
            let body = serde_json::json!({ "success": false, "error": error.to_string() });
            write_response(writer, &Response::json(status, body)).await
        }
        None => match error {
            RequestError::Io(io) => Err(io.into()),
            _ => Ok(()),
        },
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<(), HearthError> {
    writer.write_all(&response.to_bytes()).await?;
    let _ = writer.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_types::DeviceState;

    fn make_core() -> Arc<BridgeCore> {
        BridgeCore::new(DeviceState::default(), "home", 16).0
    }

    #[test]
    fn default_port_is_5000() {
        let server = ApiServer::new(make_core());
        assert_eq!(server.port(), DEFAULT_PORT);
    }

    #[test]
    fn with_port_overrides_default() {
        let server = ApiServer::new(make_core()).with_port(9999);
        assert_eq!(server.port(), 9999);
    }

    #[test]
    fn upgrade_detection_is_case_insensitive() {
        assert!(is_ws_upgrade(
            b"GET / HTTP/1.1\r\nHost: x\r\nUPGRADE: WebSocket\r\nConnection: Upgrade\r\n\r\n"
        ));
        assert!(!is_ws_upgrade(b"GET /api/devices HTTP/1.1\r\nHost: x\r\n\r\n"));
    }

    #[test]
    fn upgrade_header_is_found_past_long_headers() {
        let head = format!(
            "GET / HTTP/1.1\r\nHost: x\r\nCookie: {}\r\nUpgrade: websocket\r\n\r\n",
            "c".repeat(2048)
        );
        assert!(is_ws_upgrade(head.as_bytes()));
    }

    #[test]
    fn upgrade_in_body_is_ignored() {
        let raw = b"POST /api/devices/lights/kitchen HTTP/1.1\r\nContent-Length: 18\r\n\r\nUpgrade: websocket";
        assert!(!is_ws_upgrade(raw));
    }

    #[tokio::test]
    async fn stalled_request_is_dropped() {
        let server = ApiServer::new(make_core())
            .with_port(0)
            .with_read_timeout(Duration::from_millis(100));
        let listener = server.bind().await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = CancellationToken::new();
        tokio::spawn(server.serve(listener, cancel.clone()));

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"GET /api/devices HTTP/1.1\r\nHost:").await.unwrap();

        let mut received = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut received))
            .await
            .expect("server must close a stalled connection")
            .unwrap();
        assert_eq!(n, 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let server = ApiServer::new(make_core()).with_port(0);
        let listener = server.bind().await.unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.serve(listener, cancel.clone()));
        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
