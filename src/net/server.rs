//! Listening socket and accept loop.
//!
//! The server owns the listener and the state shared by every connection:
//! the read-only [`ServerConfig`], the [`Dispatcher`] with its route table,
//! and the two settings that may change at runtime (cache level and the
//! not-found redirect). Request semantics live in the `http` and `handler`
//! modules; this module only accepts sockets and hands each one to
//! [`connection::handle`](crate::net::connection::handle), either on its
//! own task or inline when `threaded` is off.
//!
//! [`Server::stop`] closes a one-shot channel which ends the accept stream;
//! the listener is then dropped, closing the socket. Connections already
//! being served run to completion.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_std::channel::{self, Receiver, Sender};
use async_std::net::TcpListener;
use async_std::task::{self, JoinHandle};
use futures_util::{StreamExt, pin_mut};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::handler::Dispatcher;
use crate::handler::router::RouteTable;
use crate::handler::static_files::StaticFiles;
use crate::handler::template::TemplateEngine;
use crate::handler::upgrade::{AcceptCallback, SessionHooks, UpgradeSession, UpgradeSupport};
use crate::net::connection::{self, Connection};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("cannot read listener address: {0}")]
    LocalAddr(io::Error),

    #[error("the accept loop is already running")]
    AlreadyRunning,
}

/// State shared by the accept loop and every connection.
pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) dispatcher: Dispatcher,
    cache_level: AtomicU8,
    not_found_url: RwLock<Option<String>>,
}

impl Shared {
    pub(crate) fn cache_level(&self) -> u8 {
        self.cache_level.load(Ordering::Relaxed)
    }

    pub(crate) fn not_found_url(&self) -> Option<String> {
        self.not_found_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collects the pieces of a server that cannot come from a config file.
pub struct ServerBuilder {
    config: ServerConfig,
    routes: RouteTable,
    templates: Option<Arc<dyn TemplateEngine>>,
    upgrade_session: Option<Arc<dyn UpgradeSession>>,
    accept_upgrade: Option<AcceptCallback>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
            templates: None,
            upgrade_session: None,
            accept_upgrade: None,
        }
    }

    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn templates<E: TemplateEngine + 'static>(mut self, engine: E) -> Self {
        self.templates = Some(Arc::new(engine));
        self
    }

    pub fn upgrade_session<S: UpgradeSession + 'static>(mut self, session: S) -> Self {
        self.upgrade_session = Some(Arc::new(session));
        self
    }

    /// Upgrade requests are only handed off once an accept callback is set.
    pub fn accept_upgrades<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Connection, &mut SessionHooks) + Send + Sync + 'static,
    {
        self.accept_upgrade = Some(Arc::new(callback));
        self
    }

    /// Binds the listening socket. Port 0 picks a free port; see
    /// [`Server::local_addr`].
    pub async fn bind(self) -> Result<Server, ServerError> {
        let addr = SocketAddr::new(self.config.address, self.config.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let dispatcher = Dispatcher::new(
            self.routes,
            StaticFiles::new(self.config.static_root.clone()),
            self.templates,
            UpgradeSupport::new(self.upgrade_session, self.accept_upgrade),
        );
        info!(
            %local_addr,
            routes = dispatcher.routes().len(),
            static_root = %self.config.static_root.display(),
            "server bound"
        );

        let shared = Shared {
            cache_level: AtomicU8::new(self.config.cache_level),
            not_found_url: RwLock::new(self.config.not_found_url.clone()),
            config: self.config,
            dispatcher,
        };
        Ok(Server {
            shared: Arc::new(shared),
            local_addr,
            listener: Arc::new(Mutex::new(Some(listener))),
            stop_tx: Arc::new(Mutex::new(None)),
            started: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A bound server. Clones share the same listener and state, so one clone
/// can run the accept loop while another stops it.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    listener: Arc<Mutex<Option<TcpListener>>>,
    stop_tx: Arc<Mutex<Option<Sender<()>>>>,
    started: Arc<AtomicBool>,
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn cache_level(&self) -> u8 {
        self.shared.cache_level()
    }

    /// Takes effect for connections accepted afterwards. Levels above 2
    /// behave like 2.
    pub fn set_cache_level(&self, level: u8) {
        self.shared.cache_level.store(level, Ordering::Relaxed);
    }

    pub fn set_not_found_url(&self, url: Option<String>) {
        *self
            .shared
            .not_found_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = url;
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Runs the accept loop until [`Server::stop`] is called. After a stop
    /// the same server can be run again; it rebinds its previous address.
    pub async fn run(&self) -> Result<(), ServerError> {
        let stop_rx = self.arm_stop()?;
        self.accept_loop(stop_rx).await
    }

    /// Runs the accept loop on its own task. A [`Server::stop`] issued as
    /// soon as this returns still ends the loop.
    pub fn spawn(&self) -> JoinHandle<Result<(), ServerError>> {
        let server = self.clone();
        let armed = self.arm_stop();
        task::spawn(async move { server.accept_loop(armed?).await })
    }

    /// Stops accepting connections and closes the listening socket.
    pub fn stop(&self) {
        match lock(&self.stop_tx).take() {
            Some(stop_tx) => {
                debug!(addr = %self.local_addr, "stop requested");
                stop_tx.close();
            }
            None => debug!(addr = %self.local_addr, "stop requested while not running"),
        }
        if lock(&self.listener).take().is_some() {
            debug!(addr = %self.local_addr, "idle listener closed");
        }
    }

    /// Installs the channel [`Server::stop`] closes. Only one accept loop
    /// may hold it at a time.
    fn arm_stop(&self) -> Result<Receiver<()>, ServerError> {
        let mut slot = lock(&self.stop_tx);
        if slot.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        *slot = Some(stop_tx);
        Ok(stop_rx)
    }

    async fn accept_loop(&self, stop_rx: Receiver<()>) -> Result<(), ServerError> {
        if stop_rx.is_closed() {
            debug!(addr = %self.local_addr, "stopped before accepting");
            return Ok(());
        }

        let bound = lock(&self.listener).take();
        let listener = match bound {
            Some(listener) => listener,
            None => match TcpListener::bind(self.local_addr).await {
                Ok(listener) => listener,
                Err(source) => {
                    // An open channel means the slot still holds our sender.
                    if !stop_rx.is_closed() {
                        lock(&self.stop_tx).take();
                    }
                    return Err(ServerError::Bind {
                        addr: self.local_addr,
                        source,
                    });
                }
            },
        };
        self.started.store(true, Ordering::SeqCst);

        let threaded = self.shared.config.threaded;
        info!(addr = %self.local_addr, threaded, "accepting connections");

        let incoming = listener.incoming().take_until(stop_rx.recv());
        pin_mut!(incoming);
        while let Some(accepted) = incoming.next().await {
            let stream = match accepted {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };
            let peer = match stream.peer_addr() {
                Ok(peer) => peer,
                Err(err) => {
                    warn!(error = %err, "dropping connection without peer address");
                    continue;
                }
            };

            info!(%peer, "connection accepted");
            let shared = Arc::clone(&self.shared);
            if threaded {
                task::spawn(connection::handle(stream, peer, shared));
            } else {
                connection::handle(stream, peer, shared).await;
            }
        }

        self.started.store(false, Ordering::SeqCst);
        info!(addr = %self.local_addr, "server stopped");
        Ok(())
    }
}
