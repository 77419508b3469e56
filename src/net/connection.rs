//! Per-connection request handling.
//!
//! A [`ConnectionHandler`] owns one accepted socket and drives it through
//! `AwaitingRequestLine -> AwaitingHeaders -> Dispatching -> Responding ->
//! Closed`. Failures before dispatch go through `Error`, which still
//! answers with a status page before closing. The socket is shut down and
//! dropped on every path except a protocol upgrade, where it is handed to
//! the upgrade session together with its buffered reader.

use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_std::future;
use async_std::io::{BufRead, BufReadExt, BufReader, ReadExt};
use async_std::net::TcpStream;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::handler::Target;
use crate::handler::upgrade::{AcceptCallback, SessionHooks, UpgradeSession, UpgradedConnection};
use crate::http::HttpMethod;
use crate::http::encoding::parse_urlencoded;
use crate::http::headers::HttpHeaders;
use crate::http::parser::{ParserError, ParserOk, RequestParser};
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseSink, ResponseWriter, SendError};
use crate::http::status::HttpStatus;
use crate::net::server::Shared;

/// The handler's view of the client: the parsed request plus the peer.
#[derive(Debug, Clone)]
pub struct Connection {
    request: HttpRequest,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(request: HttpRequest, peer: SocketAddr) -> Self {
        Self { request, peer }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn ip_addr(&self) -> IpAddr {
        self.peer.ip()
    }

    pub fn port(&self) -> u16 {
        self.peer.port()
    }

    pub fn method(&self) -> &HttpMethod {
        &self.request.method
    }

    /// The raw request target, query string included.
    pub fn total_path(&self) -> &str {
        &self.request.path
    }

    /// The decoded resource path.
    pub fn path(&self) -> &str {
        &self.request.resource_path
    }

    pub fn query_string(&self) -> &str {
        &self.request.query_string
    }

    pub fn query_params(&self) -> &IndexMap<String, String> {
        &self.request.query_params
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.request.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.request.content_type.as_deref()
    }

    pub fn content_length(&self) -> usize {
        self.request.content_length
    }

    /// The request body; empty for methods that carry none.
    pub fn read_content(&self) -> &[u8] {
        &self.request.body
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    pub fn read_form_data(&self) -> IndexMap<String, String> {
        parse_urlencoded(&String::from_utf8_lossy(&self.request.body))
    }

    pub fn read_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.request.body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequestLine,
    AwaitingHeaders,
    Dispatching,
    Responding,
    Error,
    Closed,
}

fn advance(state: &mut ConnectionState, peer: SocketAddr, next: ConnectionState) {
    trace!(%peer, from = ?*state, to = ?next, "connection state");
    *state = next;
}

/// Errors that interrupt reading a request.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error while reading request: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error(transparent)]
    Parser(#[from] ParserError),
}

/// Reads one request, line by line, from `reader`. Lines longer than
/// `max_line_size` are refused; the body is read in full for POST and PUT.
pub async fn read_request<R: BufRead + Unpin>(
    reader: &mut R,
    state: &mut ConnectionState,
    peer: SocketAddr,
    config: &ServerConfig,
) -> Result<HttpRequest, ReadError> {
    let mut parser = RequestParser::new(config.max_body_size);
    let mut line = String::new();

    loop {
        line.clear();
        let n = (&mut *reader)
            .take(config.max_line_size as u64 + 1)
            .read_line(&mut line)
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::InvalidData => ReadError::Parser(ParserError::InvalidEncoding),
                _ => ReadError::Io(err),
            })?;

        if n == 0 {
            if parser.awaiting_request_line() {
                return Err(ReadError::ConnectionClosed);
            }
            return Err(ParserError::MalformedHeader(
                "connection closed inside header block".to_string(),
            )
            .into());
        }
        if n > config.max_line_size {
            return Err(parser.line_too_long(config.max_line_size).into());
        }

        let was_request_line = parser.awaiting_request_line();
        let progress = parser.feed_line(&line)?;
        if was_request_line {
            advance(state, peer, ConnectionState::AwaitingHeaders);
        }
        if progress == ParserOk::HeadersDone {
            break;
        }
    }

    let mut request = parser.into_request();
    let expected = request.content_length;
    if expected > 0 {
        let mut body = Vec::with_capacity(expected);
        (&mut *reader)
            .take(expected as u64)
            .read_to_end(&mut body)
            .await?;
        if body.len() < expected {
            return Err(ParserError::TruncatedBody(body.len(), expected).into());
        }
        request.body = body;
    }
    Ok(request)
}

pub(crate) struct ConnectionHandler {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    peer: SocketAddr,
    shared: Arc<Shared>,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) -> Self {
        let reader = BufReader::new(stream.clone());
        Self {
            stream,
            reader,
            peer,
            shared,
            state: ConnectionState::AwaitingRequestLine,
        }
    }

    pub(crate) async fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let config = &shared.config;

        let read = future::timeout(
            config.read_timeout,
            read_request(&mut self.reader, &mut self.state, self.peer, config),
        )
        .await;

        let request = match read {
            Ok(Ok(request)) => request,
            Ok(Err(ReadError::ConnectionClosed)) => {
                debug!(peer = %self.peer, "connection closed before a request was sent");
                return self.close();
            }
            Ok(Err(ReadError::Io(err))) => {
                error!(peer = %self.peer, error = %err, "I/O error while reading request");
                return self.close();
            }
            Ok(Err(ReadError::Parser(err))) => {
                warn!(peer = %self.peer, error = %err, "rejecting malformed request");
                return self.fail(err.into_http_status()).await;
            }
            Err(_) => {
                warn!(peer = %self.peer, timeout = ?config.read_timeout, "request read timed out");
                return self.fail(HttpStatus::RequestTimeout).await;
            }
        };

        self.advance(ConnectionState::Dispatching);
        debug!(
            peer = %self.peer,
            method = %request.method,
            path = %request.path,
            "request received"
        );
        let connection = Connection::new(request, self.peer);

        match shared.dispatcher.resolve(connection.request()) {
            Target::Upgrade {
                protocol,
                session,
                accept,
            } => self.upgrade(connection, protocol, session, accept).await,
            target => {
                let mut writer = ResponseWriter::new(shared.not_found_url());
                shared
                    .dispatcher
                    .respond(target, &connection, &mut writer, shared.cache_level());
                self.respond(writer).await;
                self.close();
            }
        }
    }

    fn advance(&mut self, next: ConnectionState) {
        advance(&mut self.state, self.peer, next);
    }

    /// Answers with an error page and closes.
    async fn fail(mut self, status: HttpStatus) {
        self.advance(ConnectionState::Error);
        let mut writer = ResponseWriter::new(None);
        if let Err(err) = writer.error(status) {
            error!(error = %err, "cannot stage error response");
        }
        self.respond(writer).await;
        self.close();
    }

    async fn respond(&mut self, mut writer: ResponseWriter) {
        self.advance(ConnectionState::Responding);
        let Some(response) = writer.take() else {
            error!(peer = %self.peer, "no response staged");
            return;
        };
        let status = response.status;

        match self.send(response).await {
            Ok(bytes) => info!(peer = %self.peer, status = status.code(), bytes, "request served"),
            Err(err) if !err.headers_sent() && status != HttpStatus::InternalServerError => {
                error!(peer = %self.peer, error = %err, "response failed before any byte was sent");
                let mut fallback = ResponseWriter::new(None);
                if fallback.internal_server_error().is_ok() {
                    if let Some(response) = fallback.take() {
                        if let Err(err) = self.send(response).await {
                            error!(peer = %self.peer, error = %err, "cannot send 500 response");
                        }
                    }
                }
            }
            Err(err) => error!(peer = %self.peer, error = %err, "response aborted"),
        }
    }

    /// Emits `response` under the write timeout, returning the bytes sent.
    async fn send(&mut self, response: HttpResponse) -> Result<u64, SendError> {
        let shared = Arc::clone(&self.shared);
        let mut sink = ResponseSink::new(&mut self.stream, &shared.config.server_name);
        let outcome = future::timeout(shared.config.write_timeout, sink.send(response)).await;
        match outcome {
            Ok(result) => result.map(|()| sink.bytes_sent()),
            Err(_) => Err(SendError::Socket {
                sent: sink.bytes_sent(),
                source: io::Error::new(io::ErrorKind::TimedOut, "response write timed out"),
            }),
        }
    }

    /// Runs the accept callback and gives the socket to the session.
    async fn upgrade(
        mut self,
        connection: Connection,
        protocol: String,
        session: Arc<dyn UpgradeSession>,
        accept: AcceptCallback,
    ) {
        let mut hooks = SessionHooks::default();
        let accepted = panic::catch_unwind(AssertUnwindSafe(|| accept(&connection, &mut hooks)));
        if accepted.is_err() {
            error!(peer = %self.peer, %protocol, "upgrade accept callback panicked");
            let mut writer = ResponseWriter::new(None);
            if let Err(err) = writer.internal_server_error() {
                error!(error = %err, "cannot stage 500 response");
            }
            self.respond(writer).await;
            return self.close();
        }

        info!(peer = %self.peer, %protocol, ?hooks, "handing connection to upgrade session");
        let ConnectionHandler {
            stream,
            reader,
            shared,
            ..
        } = self;
        let upgraded = UpgradedConnection {
            reader,
            stream,
            connection,
            protocol,
            max_frame_len: shared.config.max_upgrade_frame_len,
            server_name: shared.config.server_name.clone(),
        };
        session.start(upgraded, hooks).await;
    }

    fn close(mut self) {
        self.advance(ConnectionState::Closed);
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            trace!(peer = %self.peer, error = %err, "socket shutdown");
        }
    }
}

/// Handles one accepted connection to completion.
pub(crate) async fn handle(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    ConnectionHandler::new(stream, peer, shared).run().await
}
