//! Protocol upgrade hand-off.
//!
//! The server never speaks the upgraded protocol itself. When a request
//! asks for an upgrade, the registered [`UpgradeSession`] for that protocol
//! receives the socket after the accept callback has filled in the session
//! hooks. From then on the session owns the connection.

use std::fmt;
use std::sync::Arc;

use async_std::io::BufReader;
use async_std::net::TcpStream;
use async_trait::async_trait;

use crate::net::connection::Connection;

pub type TextHook = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;
pub type BinaryHook = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;
pub type ClosedHook = Box<dyn Fn() + Send + Sync>;

/// Callbacks an upgraded session reports to. Text and binary hooks may
/// return a reply to be sent back on the same session.
#[derive(Default)]
pub struct SessionHooks {
    pub on_text: Option<TextHook>,
    pub on_binary: Option<BinaryHook>,
    pub on_closed: Option<ClosedHook>,
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_text", &self.on_text.is_some())
            .field("on_binary", &self.on_binary.is_some())
            .field("on_closed", &self.on_closed.is_some())
            .finish()
    }
}

/// Decides how an accepted upgrade is wired up.
pub type AcceptCallback = Arc<dyn Fn(&Connection, &mut SessionHooks) + Send + Sync>;

/// Everything a session needs to take over a connection.
pub struct UpgradedConnection {
    /// Buffered read half; may already hold bytes sent after the handshake.
    pub reader: BufReader<TcpStream>,
    pub stream: TcpStream,
    pub connection: Connection,
    pub protocol: String,
    pub max_frame_len: usize,
    pub server_name: String,
}

#[async_trait]
pub trait UpgradeSession: Send + Sync {
    /// The lower-cased `Upgrade` token this session serves, e.g. `websocket`.
    fn protocol(&self) -> &str;

    async fn start(&self, upgraded: UpgradedConnection, hooks: SessionHooks);
}

/// The configured upgrade capability. Either half may be missing, in which
/// case upgrade requests are refused.
#[derive(Clone, Default)]
pub struct UpgradeSupport {
    session: Option<Arc<dyn UpgradeSession>>,
    accept: Option<AcceptCallback>,
}

impl UpgradeSupport {
    pub fn new(session: Option<Arc<dyn UpgradeSession>>, accept: Option<AcceptCallback>) -> Self {
        Self { session, accept }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// The session and callback to use for `protocol`, if both exist and
    /// the session serves that protocol.
    pub fn handler_for(&self, protocol: &str) -> Option<(Arc<dyn UpgradeSession>, AcceptCallback)> {
        let session = self.session.as_ref()?;
        let accept = self.accept.as_ref()?;
        if !session.protocol().eq_ignore_ascii_case(protocol) {
            return None;
        }
        Some((Arc::clone(session), Arc::clone(accept)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    #[async_trait]
    impl UpgradeSession for Dummy {
        fn protocol(&self) -> &str {
            "websocket"
        }

        async fn start(&self, _upgraded: UpgradedConnection, _hooks: SessionHooks) {}
    }

    #[test]
    fn test_needs_session_and_callback() {
        let accept: AcceptCallback = Arc::new(|_: &Connection, _: &mut SessionHooks| {});
        let session: Arc<dyn UpgradeSession> = Arc::new(Dummy);

        assert!(UpgradeSupport::none().handler_for("websocket").is_none());
        assert!(
            UpgradeSupport::new(Some(Arc::clone(&session)), None)
                .handler_for("websocket")
                .is_none()
        );
        assert!(
            UpgradeSupport::new(None, Some(Arc::clone(&accept)))
                .handler_for("websocket")
                .is_none()
        );

        let both = UpgradeSupport::new(Some(session), Some(accept));
        assert!(both.handler_for("websocket").is_some());
        assert!(both.handler_for("h2c").is_none());
    }
}
