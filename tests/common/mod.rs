// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 集成测试共用的站点目录与进程内服务器

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use staticpipe::{server, Config, Pipeline};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

pub const HOME: &str = "<!DOCTYPE html><html><body><h1>home home home home home home</h1></body></html>";

/// 测试站点：
///
/// ```text
/// index.html
/// app.js
/// logo.png
/// docs/      a.txt  b.txt  Zeta.txt  sub/
/// site/      index.html
/// ```
pub fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "index.html", HOME);
    write(root, "app.js", "console.log('app');");
    std::fs::write(root.join("logo.png"), [0x89u8, b'P', b'N', b'G', 0, 1, 2, 3]).unwrap();
    std::fs::create_dir(root.join("docs")).unwrap();
    write(root, "docs/a.txt", "alpha");
    write(root, "docs/b.txt", "bravo");
    write(root, "docs/Zeta.txt", "zeta");
    std::fs::create_dir(root.join("docs/sub")).unwrap();
    std::fs::create_dir(root.join("site")).unwrap();
    write(root, "site/index.html", "<h1>site</h1>");
    dir
}

pub fn write(root: &Path, relative: &str, content: &str) {
    std::fs::write(root.join(relative), content).unwrap();
}

pub fn config_for(dir: &TempDir) -> Config {
    Config::new().with_root(dir.path().to_str().unwrap())
}

/// 在临时端口上运行的服务器，析构时发出停机信号
pub struct TestServer {
    pub port: u16,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start(config: Config) -> TestServer {
    let pipeline = Pipeline::from_config(&config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server::serve(
        listener,
        Arc::new(pipeline),
        Arc::new(config),
        async move {
            let _ = rx.await;
        },
    ));
    TestServer {
        port,
        shutdown: Some(tx),
    }
}

/// 发送原始请求并读取到连接关闭为止
pub async fn send_raw(request: &[u8], port: u16) -> Result<Vec<u8>, String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(|e| e.to_string())?;
    stream.write_all(request).await.map_err(|e| e.to_string())?;

    let mut buffer = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;
    Ok(buffer)
}

pub async fn send_request(request: &str, port: u16) -> Result<Vec<u8>, String> {
    send_raw(request.as_bytes(), port).await
}

pub struct ParsedResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

pub fn parse_response(raw: &[u8]) -> ParsedResponse {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(raw.len());
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    let body = raw.get(split + 4..).unwrap_or(&[]).to_vec();

    let mut lines = head.split("\r\n");
    let status_code = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect();
    ParsedResponse {
        status_code,
        headers,
        body,
    }
}
