#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_std::net::TcpStream;
use async_std::prelude::*;
use async_std::task::{self, JoinHandle};
use microserver::{RouteTable, Server, ServerBuilder, ServerConfig, ServerError};
use tempfile::TempDir;

pub struct TestServer {
    pub server: Server,
    pub handle: JoinHandle<Result<(), ServerError>>,
    pub root: TempDir,
}

impl TestServer {
    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) {
        std::fs::write(self.root.path().join(name), contents).unwrap();
    }

    pub async fn request(&self, raw: &str) -> String {
        request(self.addr(), raw).await
    }

    pub async fn get(&self, path: &str) -> String {
        self.request(&format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path))
            .await
    }

    pub async fn shutdown(self) {
        self.server.stop();
        self.handle.await.unwrap();
    }
}

pub fn test_config(root: &TempDir) -> ServerConfig {
    ServerConfig {
        address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        static_root: root.path().to_path_buf(),
        read_timeout: Duration::from_secs(2),
        write_timeout: Duration::from_secs(2),
        ..ServerConfig::default()
    }
}

pub async fn start(routes: RouteTable) -> TestServer {
    start_with(|_| {}, |builder| builder.routes(routes)).await
}

pub async fn start_with<C, B>(configure: C, build: B) -> TestServer
where
    C: FnOnce(&mut ServerConfig),
    B: FnOnce(ServerBuilder) -> ServerBuilder,
{
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(&root);
    configure(&mut config);

    let server = build(Server::builder(config)).bind().await.unwrap();
    let handle = server.spawn();
    wait_until_started(&server).await;

    TestServer {
        server,
        handle,
        root,
    }
}

pub async fn wait_until_started(server: &Server) {
    for _ in 0..200 {
        if server.is_started() {
            return;
        }
        task::sleep(Duration::from_millis(5)).await;
    }
    panic!("server did not start");
}

/// Sends `raw` and reads until the server closes the connection.
pub async fn request(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

pub fn status(response: &str) -> u16 {
    response
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("no status line in {:?}", response))
}

pub fn header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let head = response.split("\r\n\r\n").next()?;
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

pub fn body(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}
