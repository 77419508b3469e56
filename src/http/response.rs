//! Response staging and emission.
//!
//! A [`ResponseWriter`] stages exactly one [`HttpResponse`] per connection;
//! a second write is refused with [`ResponseError::AlreadyWritten`]. The
//! staged response is then emitted by a [`ResponseSink`], which pushes every
//! byte through a single write primitive so that the amount already on the
//! wire is always known. File bodies are streamed in [`FILE_CHUNK_SIZE`]
//! chunks instead of being loaded into memory.

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use async_std::io::{ReadExt, Write, WriteExt};
use once_cell::sync::Lazy;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::http::encoding::html_escape;
use crate::http::headers::HttpHeaders;
use crate::http::status::HttpStatus;

pub const FILE_CHUNK_SIZE: usize = 1024;

/// `max-age` sent with cacheable static content (ten years).
pub const CACHE_MAX_AGE: u64 = 315_360_000;

/// Fixed modification date advertised for static content.
static LAST_MODIFIED: Lazy<String> =
    Lazy::new(|| httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_514_850_120)));

static CACHE_CONTROL: Lazy<String> = Lazy::new(|| format!("max-age={}", CACHE_MAX_AGE));

/// Headers attached to static files when caching is enabled.
pub fn cache_headers() -> [(&'static str, &'static str); 2] {
    [
        ("Last-Modified", LAST_MODIFIED.as_str()),
        ("Cache-Control", CACHE_CONTROL.as_str()),
    ]
}

#[derive(Debug)]
pub enum ResponseBody {
    Empty,
    Bytes(Vec<u8>),
    /// An open file and the number of bytes to send from it.
    File { file: File, length: u64 },
}

impl ResponseBody {
    pub fn len(&self) -> u64 {
        match self {
            ResponseBody::Empty => 0,
            ResponseBody::Bytes(bytes) => bytes.len() as u64,
            ResponseBody::File { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            ResponseBody::Empty
        } else {
            ResponseBody::Bytes(bytes)
        }
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: HttpStatus,
    pub headers: HttpHeaders,
    pub content_type: Option<String>,
    pub charset: Option<String>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: HttpStatus) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            content_type: None,
            charset: None,
            body: ResponseBody::Empty,
        }
    }

    /// The `101 Switching Protocols` handshake answer.
    pub fn switching_protocols(upgrade: &str, headers: &[(&str, &str)]) -> Self {
        let mut res = HttpResponse::new(HttpStatus::SwitchingProtocols);
        res.headers.set_raw("Connection", "Upgrade");
        res.headers.set_raw("Upgrade", upgrade);
        for (name, value) in headers {
            res.headers.set_raw(name, value);
        }
        res
    }

    /// Serializes the status line and header block, including the blank
    /// line that precedes the body.
    pub fn build_headers(&self, server_name: &str) -> String {
        // HTTP/1.1 <status> <reason>\r\n
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        head.push_str(&self.headers.stringify());

        if self.status == HttpStatus::SwitchingProtocols {
            head.push_str(&format!("Server: {}\r\n\r\n", server_name));
            return head;
        }

        let length = self.body.len();
        if length > 0 {
            let content_type = match (&self.content_type, &self.charset) {
                (Some(ct), Some(charset)) => format!("{}; charset={}", ct, charset),
                (Some(ct), None) => ct.clone(),
                (None, _) => "application/octet-stream".to_string(),
            };
            head.push_str(&format!("Content-Type: {}\r\n", content_type));
            head.push_str(&format!("Content-Length: {}\r\n", length));
        }
        head.push_str(&format!("Server: {}\r\n", server_name));
        head.push_str("Connection: close\r\n");
        head.push_str("\r\n");
        head
    }
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("a {0} response was already written for this connection")]
    AlreadyWritten(u16),

    #[error("cannot serialize JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stages the single response of a connection.
///
/// Handlers receive a `&mut ResponseWriter` and call one of the outcome
/// methods; nothing reaches the socket until the connection handler sends
/// the staged response.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    not_found_url: Option<String>,
    staged: Option<HttpResponse>,
}

impl ResponseWriter {
    /// `not_found_url`, when set, turns every 404 into a redirect.
    pub fn new(not_found_url: Option<String>) -> Self {
        Self {
            not_found_url,
            staged: None,
        }
    }

    pub fn is_written(&self) -> bool {
        self.staged.is_some()
    }

    pub fn status(&self) -> Option<HttpStatus> {
        self.staged.as_ref().map(|res| res.status)
    }

    /// Removes the staged response, leaving the writer empty.
    pub fn take(&mut self) -> Option<HttpResponse> {
        self.staged.take()
    }

    pub fn stage(&mut self, response: HttpResponse) -> Result<(), ResponseError> {
        if let Some(existing) = &self.staged {
            return Err(ResponseError::AlreadyWritten(existing.status.code()));
        }
        debug!(
            status = response.status.code(),
            length = response.body.len(),
            "response staged"
        );
        self.staged = Some(response);
        Ok(())
    }

    pub fn write(
        &mut self,
        status: HttpStatus,
        headers: &[(&str, &str)],
        content_type: Option<&str>,
        charset: Option<&str>,
        body: impl Into<Vec<u8>>,
    ) -> Result<(), ResponseError> {
        self.stage(HttpResponse {
            status,
            headers: HttpHeaders::from(headers),
            content_type: content_type.map(str::to_string),
            charset: charset.map(str::to_string),
            body: ResponseBody::from(body.into()),
        })
    }

    pub fn ok(
        &mut self,
        headers: &[(&str, &str)],
        content_type: Option<&str>,
        charset: Option<&str>,
        body: impl Into<Vec<u8>>,
    ) -> Result<(), ResponseError> {
        self.write(HttpStatus::Ok, headers, content_type, charset, body)
    }

    pub fn ok_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ResponseError> {
        let body = serde_json::to_string(value)?;
        self.write(
            HttpStatus::Ok,
            &[],
            Some("application/json"),
            Some("UTF-8"),
            body,
        )
    }

    pub fn json_error<T: Serialize + ?Sized>(
        &mut self,
        status: HttpStatus,
        value: &T,
    ) -> Result<(), ResponseError> {
        let body = serde_json::to_string(value)?;
        self.write(status, &[], Some("application/json"), Some("UTF-8"), body)
    }

    pub fn redirect(&mut self, location: &str) -> Result<(), ResponseError> {
        self.write(HttpStatus::Found, &[("Location", location)], None, None, Vec::new())
    }

    /// A small HTML page naming the status. `304` never carries a body.
    pub fn error(&mut self, status: HttpStatus) -> Result<(), ResponseError> {
        if status == HttpStatus::NotModified {
            return self.write(status, &[], None, None, Vec::new());
        }
        self.write(
            status,
            &[],
            Some("text/html"),
            Some("UTF-8"),
            error_page(status),
        )
    }

    pub fn not_modified(&mut self) -> Result<(), ResponseError> {
        self.error(HttpStatus::NotModified)
    }

    pub fn bad_request(&mut self) -> Result<(), ResponseError> {
        self.error(HttpStatus::BadRequest)
    }

    pub fn forbidden(&mut self) -> Result<(), ResponseError> {
        self.error(HttpStatus::Forbidden)
    }

    pub fn not_found(&mut self) -> Result<(), ResponseError> {
        warn!("resource not found, answering 404");
        match self.not_found_url.clone() {
            Some(url) => self.redirect(&url),
            None => self.error(HttpStatus::NotFound),
        }
    }

    pub fn method_not_allowed(&mut self) -> Result<(), ResponseError> {
        self.error(HttpStatus::MethodNotAllowed)
    }

    pub fn internal_server_error(&mut self) -> Result<(), ResponseError> {
        error!("internal server error, answering 500");
        self.error(HttpStatus::InternalServerError)
    }

    pub fn not_implemented(&mut self) -> Result<(), ResponseError> {
        self.error(HttpStatus::NotImplemented)
    }

    pub fn switching_protocols(
        &mut self,
        upgrade: &str,
        headers: &[(&str, &str)],
    ) -> Result<(), ResponseError> {
        self.stage(HttpResponse::switching_protocols(upgrade, headers))
    }

    /// A 500 page reporting that `module` failed while producing the page.
    pub fn execution_error(&mut self, module: &str, message: &str) -> Result<(), ResponseError> {
        error!(module, message, "page execution failed");
        self.write(
            HttpStatus::InternalServerError,
            &[],
            Some("text/html"),
            Some("UTF-8"),
            execution_error_page(module, message),
        )
    }

    /// Stages `path` to be streamed with a 200, or a 404 when it cannot be
    /// opened as a regular file.
    pub fn file(
        &mut self,
        path: &Path,
        content_type: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<(), ResponseError> {
        let opened = File::open(path).and_then(|file| {
            let meta = file.metadata()?;
            if !meta.is_file() {
                return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
            }
            Ok((file, meta.len()))
        });

        let (file, length) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot open file");
                return self.not_found();
            }
        };

        debug!(
            path = %path.display(),
            length,
            content_type = content_type.unwrap_or("-"),
            "serving file"
        );
        let body = match length {
            0 => ResponseBody::Empty,
            length => ResponseBody::File { file, length },
        };
        self.stage(HttpResponse {
            status: HttpStatus::Ok,
            headers: HttpHeaders::from(headers),
            content_type: content_type.map(str::to_string),
            charset: None,
            body,
        })
    }

    /// Serves `path` as a download. Characters that could end the quoted
    /// filename or the header line are dropped from `attachment_name`.
    pub fn file_attachment(
        &mut self,
        path: &Path,
        attachment_name: &str,
        headers: &[(&str, &str)],
    ) -> Result<(), ResponseError> {
        let name: String = attachment_name
            .chars()
            .filter(|c| !matches!(c, '"' | '\\') && !c.is_control())
            .collect();
        let disposition = format!("attachment; filename=\"{}\"", name);
        let mut all: Vec<(&str, &str)> = headers.to_vec();
        all.push(("Content-Disposition", disposition.as_str()));
        self.file(path, None, &all)
    }
}

fn error_page(status: HttpStatus) -> String {
    format!(
        "<html>\n\
         \x20   <head>\n\
         \x20       <title>Error</title>\n\
         \x20   </head>\n\
         \x20   <body>\n\
         \x20       <h1>{} {}</h1>\n\
         \x20       {}\n\
         \x20   </body>\n\
         </html>\n",
        status.code(),
        status.reason(),
        status.message()
    )
}

fn execution_error_page(module: &str, message: &str) -> String {
    format!(
        "<html>\n\
         \x20   <head>\n\
         \x20       <title>Page execution error</title>\n\
         \x20   </head>\n\
         \x20   <body>\n\
         \x20       <h1>{} page execution error</h1>\n\
         \x20       {}\n\
         \x20   </body>\n\
         </html>\n",
        html_escape(module),
        html_escape(message)
    )
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("socket write failed after {sent} bytes: {source}")]
    Socket { sent: u64, source: io::Error },

    #[error("file read failed after {sent} bytes: {source}")]
    File { sent: u64, source: io::Error },
}

impl SendError {
    /// Whether any part of the response already reached the client.
    pub fn headers_sent(&self) -> bool {
        match self {
            SendError::Socket { sent, .. } | SendError::File { sent, .. } => *sent > 0,
        }
    }
}

/// Emits staged responses onto a stream.
pub struct ResponseSink<'a, W> {
    stream: &'a mut W,
    server_name: &'a str,
    bytes_sent: u64,
}

impl<'a, W: Write + Unpin> ResponseSink<'a, W> {
    pub fn new(stream: &'a mut W, server_name: &'a str) -> Self {
        Self {
            stream,
            server_name,
            bytes_sent: 0,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// The only place bytes are written to the stream.
    async fn write(&mut self, data: &[u8]) -> Result<(), SendError> {
        self.stream
            .write_all(data)
            .await
            .map_err(|source| SendError::Socket {
                sent: self.bytes_sent,
                source,
            })?;
        self.bytes_sent += data.len() as u64;
        Ok(())
    }

    pub async fn send(&mut self, response: HttpResponse) -> Result<(), SendError> {
        let head = response.build_headers(self.server_name);
        self.write(head.as_bytes()).await?;

        match response.body {
            ResponseBody::Empty => {}
            ResponseBody::Bytes(bytes) => self.write(&bytes).await?,
            ResponseBody::File { file, length } => self.stream_file(file, length).await?,
        }

        self.stream
            .flush()
            .await
            .map_err(|source| SendError::Socket {
                sent: self.bytes_sent,
                source,
            })?;
        debug!(
            status = response.status.code(),
            bytes = self.bytes_sent,
            "response written"
        );
        Ok(())
    }

    async fn stream_file(&mut self, file: File, length: u64) -> Result<(), SendError> {
        let mut file = async_std::fs::File::from(file);
        let mut buf = [0u8; FILE_CHUNK_SIZE];
        let mut remaining = length;

        while remaining > 0 {
            let want = remaining.min(FILE_CHUNK_SIZE as u64) as usize;
            let n = file
                .read(&mut buf[..want])
                .await
                .map_err(|source| SendError::File {
                    sent: self.bytes_sent,
                    source,
                })?;
            if n == 0 {
                return Err(SendError::File {
                    sent: self.bytes_sent,
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while sending"),
                });
            }
            self.write(&buf[..n]).await?;
            remaining -= n as u64;
        }
        Ok(())
    }
}

/// Writes the `101 Switching Protocols` answer for an upgrade session.
pub async fn send_switching_protocols<W: Write + Unpin>(
    stream: &mut W,
    upgrade: &str,
    headers: &[(&str, &str)],
    server_name: &str,
) -> Result<(), SendError> {
    ResponseSink::new(stream, server_name)
        .send(HttpResponse::switching_protocols(upgrade, headers))
        .await
}
