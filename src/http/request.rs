use indexmap::IndexMap;

use crate::http::HttpMethod;
use crate::http::headers::HttpHeaders;

/// A request as produced by the [`RequestParser`](crate::http::parser::RequestParser).
///
/// Header names are lower-cased. `resource_path` is fully percent-decoded;
/// `query_string` is kept raw while `query_params` holds decoded pairs.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub http_version: String,
    pub resource_path: String,
    pub query_string: String,
    pub query_params: IndexMap<String, String>,

    pub headers: HttpHeaders,
    pub content_type: Option<String>,
    pub content_length: usize,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            method: HttpMethod::Get,
            path: String::new(),
            http_version: String::new(),
            resource_path: "/".to_string(),
            query_string: String::new(),
            query_params: IndexMap::new(),
            headers: HttpHeaders::new(),
            content_type: None,
            content_length: 0,
            body: Vec::new(),
        }
    }

    /// Looks a header up by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The lower-cased `upgrade` target, present only when the `connection`
    /// header asks for an upgrade and the `upgrade` header names a protocol.
    pub fn upgrade(&self) -> Option<String> {
        let connection = self.header("connection")?;
        if !connection.to_ascii_lowercase().contains("upgrade") {
            return None;
        }
        let target = self.header("upgrade")?.trim();
        if target.is_empty() {
            return None;
        }
        Some(target.to_ascii_lowercase())
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}
