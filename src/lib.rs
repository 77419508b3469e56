//! A small embedded HTTP/1.1 server.
//!
//! Requests are parsed by hand, routed through a [`RouteTable`] with
//! `<name>` captures, and otherwise resolved against a static root with
//! optional server-side templates. Upgrade requests can be handed to an
//! external [`UpgradeSession`]. Every response is sent with
//! `Connection: close`.

pub mod config;
pub mod devices;
pub mod handler;
pub mod http;
pub mod net;
pub mod pages;

pub use config::ServerConfig;
pub use handler::router::{HandlerError, HandlerResult, RouteArgs, RouteError, RouteTable, RouteValue};
pub use handler::template::{MiniJinjaEngine, TemplateEngine, TemplateError};
pub use handler::upgrade::{SessionHooks, UpgradeSession, UpgradedConnection};
pub use http::response::{ResponseError, ResponseWriter};
pub use http::status::HttpStatus;
pub use net::connection::Connection;
pub use net::server::{Server, ServerBuilder, ServerError};
