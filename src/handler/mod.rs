//! Request dispatch.
//!
//! Resolution order for a parsed request, first match wins:
//!
//! 1. an upgrade request goes to the configured upgrade session, or is
//!    refused with `501` when no session can take it;
//! 2. a registered route for the resource path and method;
//! 3. for `GET`, a file below the static root (templates are rendered,
//!    other files are served by MIME type, unknown types are `403`);
//! 4. `404` for `GET`, `405` for anything else.
//!
//! Faults raised while executing steps 2 and 3 (handler errors, panics,
//! template failures) are turned into a single `500` response.

pub mod router;
pub mod static_files;
pub mod template;
pub mod upgrade;

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::http::HttpMethod;
use crate::http::request::HttpRequest;
use crate::http::response::{ResponseWriter, cache_headers};
use crate::net::connection::Connection;
use router::{HandlerResult, RouteMatch, RouteTable};
use static_files::{StaticFiles, is_template, mime_type};
use template::{TemplateEngine, TemplateError};
use upgrade::{AcceptCallback, UpgradeSession, UpgradeSupport};

/// Where a request ends up.
pub enum Target {
    Upgrade {
        protocol: String,
        session: Arc<dyn UpgradeSession>,
        accept: AcceptCallback,
    },
    UpgradeUnsupported(String),
    Route(RouteMatch),
    StaticFile(PathBuf),
    NotFound,
    MethodNotAllowed,
}

pub struct Dispatcher {
    routes: RouteTable,
    static_files: StaticFiles,
    templates: Option<Arc<dyn TemplateEngine>>,
    upgrade: UpgradeSupport,
}

impl Dispatcher {
    pub fn new(
        routes: RouteTable,
        static_files: StaticFiles,
        templates: Option<Arc<dyn TemplateEngine>>,
        upgrade: UpgradeSupport,
    ) -> Self {
        Self {
            routes,
            static_files,
            templates,
            upgrade,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn resolve(&self, request: &HttpRequest) -> Target {
        if let Some(protocol) = request.upgrade() {
            return match self.upgrade.handler_for(&protocol) {
                Some((session, accept)) => Target::Upgrade {
                    protocol,
                    session,
                    accept,
                },
                None => Target::UpgradeUnsupported(protocol),
            };
        }

        if let Some(found) = self.routes.lookup(&request.resource_path, &request.method) {
            return Target::Route(found);
        }

        if request.method != HttpMethod::Get {
            return Target::MethodNotAllowed;
        }

        match self.static_files.resolve(&request.resource_path) {
            Some(path) => Target::StaticFile(path),
            None => Target::NotFound,
        }
    }

    /// Stages the response for `target`. Always leaves exactly one response
    /// in `writer`.
    pub fn respond(
        &self,
        target: Target,
        conn: &Connection,
        writer: &mut ResponseWriter,
        cache_level: u8,
    ) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(target, conn, writer, cache_level)
        }));

        let fault = match outcome {
            Ok(Ok(())) if writer.is_written() => return,
            Ok(Ok(())) => "handler returned without writing a response".to_string(),
            Ok(Err(err)) => err.to_string(),
            Err(panic) => panic_message(&*panic),
        };

        error!(path = %conn.path(), %fault, "request handling failed");
        writer.take();
        if let Err(err) = writer.internal_server_error() {
            error!(error = %err, "cannot stage 500 response");
        }
    }

    fn execute(
        &self,
        target: Target,
        conn: &Connection,
        writer: &mut ResponseWriter,
        cache_level: u8,
    ) -> HandlerResult {
        match target {
            Target::Route(found) => {
                debug!(pattern = %found.pattern, args = found.args.len(), "route matched");
                (found.handler)(conn, writer, &found.args)?;
            }
            Target::StaticFile(path) => self.serve_static(&path, conn, writer, cache_level)?,
            Target::NotFound => writer.not_found()?,
            Target::MethodNotAllowed => writer.method_not_allowed()?,
            Target::UpgradeUnsupported(protocol) | Target::Upgrade { protocol, .. } => {
                warn!(%protocol, "upgrade requested but not available");
                writer.not_implemented()?;
            }
        }
        Ok(())
    }

    fn serve_static(
        &self,
        path: &Path,
        conn: &Connection,
        writer: &mut ResponseWriter,
        cache_level: u8,
    ) -> HandlerResult {
        if is_template(path) {
            let Some(engine) = &self.templates else {
                warn!(path = %path.display(), "no template engine configured");
                writer.not_implemented()?;
                return Ok(());
            };

            let source = fs::read_to_string(path).map_err(|source| TemplateError::Read {
                path: path.display().to_string(),
                source,
            })?;
            match engine.render(path, &source, conn) {
                Ok(html) => writer.ok(&[], Some("text/html"), Some("UTF-8"), html)?,
                Err(err) => writer.execution_error("Template", &err.to_string())?,
            }
            return Ok(());
        }

        let Some(content_type) = mime_type(path) else {
            warn!(path = %path.display(), "refusing file with unknown content type");
            writer.forbidden()?;
            return Ok(());
        };

        if cache_level == 0 {
            writer.file(path, Some(content_type), &[])?;
        } else if cache_level >= 2 && conn.request().header("if-modified-since").is_some() {
            writer.not_modified()?;
        } else {
            writer.file(path, Some(content_type), &cache_headers())?;
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", msg)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::RequestParser;
    use crate::http::response::HttpResponse;
    use crate::http::status::HttpStatus;
    use std::io;

    fn connection(lines: &[&str]) -> Connection {
        let mut parser = RequestParser::new(1024);
        for line in lines {
            parser.feed_line(line).unwrap();
        }
        Connection::new(parser.into_request(), "127.0.0.1:40000".parse().unwrap())
    }

    fn dispatcher(root: &Path, templates: Option<Arc<dyn TemplateEngine>>) -> Dispatcher {
        let mut routes = RouteTable::new();
        routes
            .register("/hello/<name>", "GET", |_, w, args| {
                let body = format!("hi {}", args.get_str("name").unwrap_or("?"));
                w.ok(&[], Some("text/plain"), None, body)?;
                Ok(())
            })
            .unwrap()
            .register("/fail", "GET", |_, _, _| {
                Err(io::Error::other("sensor offline").into())
            })
            .unwrap()
            .register("/panic", "GET", |_, _, _| panic!("boom"))
            .unwrap()
            .register("/silent", "GET", |_, _, _| Ok(()))
            .unwrap();
        Dispatcher::new(routes, StaticFiles::new(root), templates, UpgradeSupport::none())
    }

    fn run(d: &Dispatcher, lines: &[&str], cache_level: u8) -> HttpResponse {
        let conn = connection(lines);
        let mut writer = ResponseWriter::new(None);
        let target = d.resolve(conn.request());
        d.respond(target, &conn, &mut writer, cache_level);
        writer.take().unwrap()
    }

    fn body(res: &HttpResponse) -> String {
        match &res.body {
            crate::http::response::ResponseBody::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            _ => String::new(),
        }
    }

    #[test]
    fn test_route_then_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), None);

        let res = run(&d, &["GET /hello/ada HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::Ok);
        assert_eq!(body(&res), "hi ada");

        let res = run(&d, &["GET /nowhere HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::NotFound);

        let res = run(&d, &["POST /nowhere HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::MethodNotAllowed);

        let res = run(&d, &["DELETE /hello/ada HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::MethodNotAllowed);
    }

    #[test]
    fn test_faults_become_500() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), None);
        for path in ["/fail", "/panic", "/silent"] {
            let line = format!("GET {} HTTP/1.1", path);
            let res = run(&d, &[&line, ""], 0);
            assert_eq!(res.status, HttpStatus::InternalServerError, "{}", path);
        }
    }

    #[test]
    fn test_static_content_rules() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("firmware.bin"), [0u8, 1, 2]).unwrap();
        let d = dispatcher(dir.path(), None);

        let res = run(&d, &["GET / HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::Ok);
        assert_eq!(res.content_type.as_deref(), Some("text/html"));
        assert!(res.headers.is_empty());

        let res = run(&d, &["GET /index.html HTTP/1.1", ""], 1);
        assert!(res.headers.contains("Cache-Control"));
        assert!(res.headers.contains("Last-Modified"));

        let conditional = ["GET /index.html HTTP/1.1", "If-Modified-Since: x", ""];
        assert_eq!(run(&d, &conditional, 1).status, HttpStatus::Ok);
        let res = run(&d, &conditional, 2);
        assert_eq!(res.status, HttpStatus::NotModified);
        assert!(res.body.is_empty());

        let res = run(&d, &["GET /firmware.bin HTTP/1.1", ""], 2);
        assert_eq!(res.status, HttpStatus::Forbidden);
    }

    #[test]
    fn test_templates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.thtml"), "<p>{{ query.v }}</p>").unwrap();
        fs::write(dir.path().join("bad.thtml"), "{% for %}").unwrap();

        let d = dispatcher(dir.path(), None);
        let res = run(&d, &["GET / HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::NotImplemented);

        let engine: Arc<dyn TemplateEngine> = Arc::new(template::MiniJinjaEngine::new());
        let d = dispatcher(dir.path(), Some(engine));
        let res = run(&d, &["GET /?v=%3Cx%3E HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::Ok);
        assert_eq!(body(&res), "<p>&lt;x&gt;</p>");

        let res = run(&d, &["GET /bad.thtml HTTP/1.1", ""], 0);
        assert_eq!(res.status, HttpStatus::InternalServerError);
        assert!(body(&res).contains("Template page execution error"));
    }

    #[test]
    fn test_unsupported_upgrade_is_501() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), None);
        let res = run(
            &d,
            &[
                "GET /hello/ada HTTP/1.1",
                "Connection: Upgrade",
                "Upgrade: websocket",
                "",
            ],
            0,
        );
        assert_eq!(res.status, HttpStatus::NotImplemented);
    }
}
