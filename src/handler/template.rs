//! Server-side page templates.
//!
//! Template rendering is an optional capability: the dispatcher is given an
//! `Option<Arc<dyn TemplateEngine>>` and answers `501 Not Implemented` for
//! template files when none is configured.

use std::path::Path;

use indexmap::IndexMap;
use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use thiserror::Error;

use crate::http::headers::HttpHeaders;
use crate::net::connection::Connection;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Render(String),
}

pub trait TemplateEngine: Send + Sync {
    /// Renders `source`, read from `path`, into an HTML document.
    fn render(
        &self,
        path: &Path,
        source: &str,
        conn: &Connection,
    ) -> Result<String, TemplateError>;
}

/// Values exposed to templates.
#[derive(Serialize)]
struct TemplateContext<'a> {
    method: &'a str,
    path: &'a str,
    query_string: &'a str,
    query: &'a IndexMap<String, String>,
    headers: &'a HttpHeaders,
    client_ip: String,
}

impl<'a> From<&'a Connection> for TemplateContext<'a> {
    fn from(conn: &'a Connection) -> Self {
        let req = conn.request();
        Self {
            method: req.method.as_str(),
            path: &req.resource_path,
            query_string: &req.query_string,
            query: &req.query_params,
            headers: &req.headers,
            client_ip: conn.ip_addr().to_string(),
        }
    }
}

/// [`TemplateEngine`] backed by minijinja, with HTML auto-escaping on for
/// every template.
pub struct MiniJinjaEngine {
    env: Environment<'static>,
}

impl MiniJinjaEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        Self { env }
    }
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn render(
        &self,
        path: &Path,
        source: &str,
        conn: &Connection,
    ) -> Result<String, TemplateError> {
        self.env
            .render_str(source, TemplateContext::from(conn))
            .map_err(|err| TemplateError::Render(format!("{}: {}", path.display(), err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::RequestParser;

    fn connection(lines: &[&str]) -> Connection {
        let mut parser = RequestParser::new(1024);
        for line in lines {
            parser.feed_line(line).unwrap();
        }
        Connection::new(parser.into_request(), "192.168.4.2:50123".parse().unwrap())
    }

    #[test]
    fn test_renders_request_values_escaped() {
        let conn = connection(&["GET /page.thtml?name=%3Cb%3Eme HTTP/1.1", "Host: x", ""]);
        let engine = MiniJinjaEngine::new();
        let html = engine
            .render(
                Path::new("page.thtml"),
                "<p>{{ method }} from {{ client_ip }}: {{ query.name }}</p>",
                &conn,
            )
            .unwrap();
        assert_eq!(
            html,
            "<p>GET from 192.168.4.2: &lt;b&gt;me</p>"
        );
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let conn = connection(&["GET / HTTP/1.1", ""]);
        let err = MiniJinjaEngine::new()
            .render(Path::new("broken.thtml"), "{% if %}", &conn)
            .unwrap_err();
        assert!(err.to_string().starts_with("broken.thtml: "));
    }
}
