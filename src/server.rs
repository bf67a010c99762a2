use std::{net::SocketAddr, sync::Arc};

use log::{debug, info, warn};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::mpsc,
};

use crate::{
    MAX_BODY,
    protocol::{Envelope, OP_PING, OP_REJECTED, OP_UPDATE_LOCATION, OP_UPDATE_SATELLITES},
};

/// Bounded worker pool sizing: 2 in-flight requests, 10 queued.
/// Saturation is a hard backpressure signal, the connection is
/// dropped rather than queued indefinitely.
const WORKERS: usize = 2;
const QUEUE_DEPTH: usize = 10;

/// Upper bound on request head (request line + headers).
const MAX_HEAD: usize = 4096;

const UNSUPPORTED_METHOD: &str = "Unsupported in gnss-simcast";
const UNKNOWN_METHOD: &str = "Unknown method";
const SOCKET_FAILED: &str = "Socket connection failed";

const LANDING_PAGE: &str = "<html><head><title>gnss-simcast</title></head>\
    <body><h1>This is probably not the site you are looking for.</h1></body></html>";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open broadcast socket: {0}")]
    BroadcastSocket(std::io::Error),

    #[error("request head too large")]
    HeadTooLarge,

    #[error("request body too large")]
    BodyTooLarge,

    #[error("malformed request head")]
    BadHead,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Datagram re-emitter: update requests received on the request
/// channel are pushed back out on the local broadcast address so
/// every listening process picks them up.
pub struct BroadcastSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl BroadcastSender {
    pub async fn open(target: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        Ok(Self { socket, target })
    }

    async fn send_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.socket.send_to(bytes, self.target).await.map(|_| ())
    }
}

struct Response {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    fn json_envelope(status: i64, result: Value) -> Result<Self, ServerError> {
        Ok(Self {
            status: 200,
            content_type: "application/json",
            body: serde_json::to_vec(&json!([status, result]))?,
        })
    }

    fn teapot() -> Self {
        Self {
            status: 418,
            content_type: "text/html",
            body: LANDING_PAGE.as_bytes().to_vec(),
        }
    }

    /// Internal failures surface as status 1 in the envelope, never
    /// as a transport level failure. A plain text body is the last
    /// resort when even the error envelope cannot be built.
    fn internal_error(e: &ServerError) -> Self {
        match serde_json::to_vec(&json!([1, e.to_string()])) {
            Ok(body) => Self {
                status: 500,
                content_type: "application/json",
                body,
            },
            Err(e1) => Self {
                status: 500,
                content_type: "text/plain",
                body: e1.to_string().into_bytes(),
            },
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            418 => "I'm a teapot",
            _ => "Internal Server Error",
        }
    }

    async fn write(&self, stream: &mut TcpStream) -> std::io::Result<()> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len(),
        );

        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&self.body).await?;
        stream.flush().await
    }
}

/// Request/response ingress: a minimal HTTP endpoint on loopback.
/// The producer posts `[opType, reserved, payload]` bodies; update
/// type messages are re-emitted as broadcast datagrams.
pub struct LocalServer {
    listener: TcpListener,
    broadcast: Arc<BroadcastSender>,
}

impl LocalServer {
    /// Binds the request port and opens the re-broadcast socket.
    pub async fn bind(addr: SocketAddr, broadcast_target: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let broadcast = BroadcastSender::open(broadcast_target)
            .await
            .map_err(ServerError::BroadcastSocket)?;

        Ok(Self {
            listener,
            broadcast: Arc::new(broadcast),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop plus the bounded worker pool. Connections are
    /// queued through a bounded channel; once 2 are in flight and
    /// 10 queued, further connections are rejected outright.
    pub async fn run(self) {
        info!(
            "local server deployed on {}",
            self.local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        );

        let (tx, rx) = mpsc::channel::<TcpStream>(QUEUE_DEPTH);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker in 0..WORKERS {
            let rx = rx.clone();
            let broadcast = self.broadcast.clone();

            tokio::spawn(async move {
                loop {
                    let stream = rx.lock().await.recv().await;

                    match stream {
                        Some(mut stream) => {
                            if let Err(e) = handle_connection(&mut stream, &broadcast).await {
                                debug!("worker {}: connection error: {}", worker, e);
                            }
                        },
                        None => break,
                    }
                }
            });
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = tx.try_send(stream) {
                        // dropping the stream aborts the connection
                        warn!("request queue saturated, rejecting {}: {}", peer, e);
                    }
                },
                Err(e) => {
                    warn!("accept failure: {}", e);
                    break;
                },
            }
        }
    }
}

async fn handle_connection(
    stream: &mut TcpStream,
    broadcast: &BroadcastSender,
) -> std::io::Result<()> {
    let response = match read_request(stream).await {
        Ok((method, body)) => match process(&method, &body, broadcast).await {
            Ok(response) => response,
            Err(e) => Response::internal_error(&e),
        },
        Err(e) => Response::internal_error(&e),
    };

    response.write(stream).await
}

/// Reads one request: request line, headers, then a Content-Length
/// bounded body capped at [MAX_BODY].
async fn read_request(stream: &mut TcpStream) -> Result<(String, Vec<u8>), ServerError> {
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEAD {
            return Err(ServerError::HeadTooLarge);
        }

        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(ServerError::BadHead);
        }

        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ServerError::BadHead)?;
    let method = request_line
        .split_whitespace()
        .next()
        .ok_or(ServerError::BadHead)?
        .to_string();

    let mut content_length = 0usize;

    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().map_err(|_| ServerError::BadHead)?;
            }
        }
    }

    if content_length > MAX_BODY {
        return Err(ServerError::BodyTooLarge);
    }

    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).await?;

    Ok((method, body))
}

/// Method table of the request channel. Anything that is not a POST
/// with a recognized 3 element body gets the landing page.
async fn process(
    method: &str,
    body: &[u8],
    broadcast: &BroadcastSender,
) -> Result<Response, ServerError> {
    if method == "POST" {
        if let Ok(envelope) = Envelope::parse(body) {
            let (status, result) = match envelope.op.as_str() {
                OP_PING => (0, json!(0)),
                OP_UPDATE_LOCATION | OP_UPDATE_SATELLITES => {
                    // re-emit the raw body so every listening
                    // process receives the exact producer message
                    match broadcast.send_raw(body).await {
                        Ok(()) => (0, Value::Null),
                        Err(e) => {
                            warn!("re-broadcast failed: {}", e);
                            (1, json!(SOCKET_FAILED))
                        },
                    }
                },
                op if OP_REJECTED.contains(&op) => (1, json!(UNSUPPORTED_METHOD)),
                _ => (1, json!(UNKNOWN_METHOD)),
            };

            return Response::json_envelope(status, result);
        }
    }

    Ok(Response::teapot())
}
