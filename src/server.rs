// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接层
//!
//! 接受 TCP 连接，读取请求头并交给 [`Pipeline`]，最后把响应写回。每个连接只处理一个请求
//! （`Connection: close`）。管道执行期间如果客户端断开，未完成的处理会被直接丢弃，
//! 不会写入缓存。

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
};

use crate::{
    config::Config, exception::Exception, param::HttpVersion, pipeline::Pipeline,
    request::Request, response::Response,
};

/// 运行直到收到 Ctrl-C
pub async fn run(
    listener: TcpListener,
    pipeline: Arc<Pipeline>,
    config: Arc<Config>,
) -> std::io::Result<()> {
    serve(listener, pipeline, config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听停机信号：{}", e);
            std::future::pending::<()>().await;
        }
        info!("收到停机信号，停止接受新连接");
    })
    .await
}

/// 主事件循环。`shutdown` 完成后停止接受新连接，已经开始处理的连接继续完成。
pub async fn serve<F>(
    listener: TcpListener,
    pipeline: Arc<Pipeline>,
    config: Arc<Config>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut id: u128 = 0;
    loop {
        let (stream, addr) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("接受TCP连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let pipeline = Arc::clone(&pipeline);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            handle_connection(stream, id, &pipeline, &config).await;
        });
        id += 1;
    }
    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    id: u128,
    pipeline: &Pipeline,
    config: &Config,
) {
    let buffer = match read_head(&mut stream, config.max_header_size()).await {
        Ok(Some(buffer)) => buffer,
        Ok(None) => {
            debug!("[ID{}]客户端未发送任何数据便关闭了连接", id);
            return;
        }
        Err(e) => {
            warn!("[ID{}]读取请求失败：{}", id, e);
            let response = Response::from_status_code(e.status_code());
            send(stream, response, HttpVersion::V1_1, id, config).await;
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);
    let start_time = Instant::now();

    let request = match Request::try_from(&buffer, id, config.trust_forwarded_proto()) {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败：{}", id, e);
            let response = Response::from_status_code(e.status_code());
            send(stream, response, HttpVersion::V1_1, id, config).await;
            return;
        }
    };

    let result = tokio::select! {
        result = pipeline.handle(&request) => result,
        _ = client_gone(&stream) => {
            info!("[ID{}]客户端在响应完成前断开，放弃处理", id);
            return;
        }
    };
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            error!("[ID{}]处理请求时发生内部错误：{}", id, e);
            Response::internal_error()
        }
    };
    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}, {}ms",
        id,
        request.version(),
        request.url(),
        request.method(),
        response.status_code(),
        response.information(),
        request.user_agent(),
        start_time.elapsed().as_millis()
    );
    send(stream, response, request.version(), id, config).await;
}

async fn send(
    mut stream: TcpStream,
    response: Response,
    version: HttpVersion,
    id: u128,
    config: &Config,
) {
    match response.write_to(&mut stream, version, config.chunk_size()).await {
        Ok(sent) => debug!("[ID{}]响应发送完毕，响应体{}字节", id, sent),
        Err(e) => warn!("[ID{}]发送响应失败：{}", id, e),
    }
}

/// 读取到空行为止。请求头超过 `limit` 字节时返回 `HeaderTooLarge`；
/// 对端在发送任何数据之前关闭连接时返回 `None`。
async fn read_head(stream: &mut TcpStream, limit: usize) -> Result<Option<Vec<u8>>, Exception> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(if buffer.is_empty() { None } else { Some(buffer) });
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_head_end(&buffer) {
            if end > limit {
                return Err(Exception::HeaderTooLarge);
            }
            buffer.truncate(end);
            return Ok(Some(buffer));
        }
        if buffer.len() > limit {
            return Err(Exception::HeaderTooLarge);
        }
    }
}

/// 空行之后的位置
fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
}

/// 对端关闭或连接出错时完成，否则一直挂起
async fn client_gone(stream: &TcpStream) {
    let mut byte = [0u8; 1];
    match stream.peek(&mut byte).await {
        Ok(0) | Err(_) => {}
        Ok(_) => std::future::pending::<()>().await,
    }
}
