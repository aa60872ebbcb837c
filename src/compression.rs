// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 压缩阶段
//!
//! 先调用下游，再根据响应的 `Content-Type` 与请求的 `Accept-Encoding` 决定是否压缩。
//! 同时接受时优先使用 Brotli。压缩在阻塞线程池中完成，不占用异步工作线程。
//!
//! 流式响应体（超过流式阈值的大文件）保持原样发送，不做压缩。

use std::io::{self, Write};

use async_trait::async_trait;
use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression as GzipLevel};
use log::{debug, error};

use crate::{
    chain::{Middleware, Next},
    config::CompressionConfig,
    exception::Exception,
    param::{HttpEncoding, HttpRequestMethod},
    request::Request,
    response::{Body, Response},
};

pub struct Compression {
    level: u32,
    types: Vec<String>,
    /// 以缓冲形式发送的响应体的最大长度，更大的响应体以流的形式发送，不会被压缩
    buffered_limit: u64,
}

impl Compression {
    pub fn new(config: &CompressionConfig, buffered_limit: u64) -> Self {
        Self {
            level: config.level,
            buffered_limit,
            types: config
                .types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// 内容类型（忽略 `;` 之后的参数）是否以白名单中的某一项开头
    pub fn is_compressible(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        !essence.is_empty() && self.types.iter().any(|t| essence.starts_with(t.as_str()))
    }
}

impl Compression {
    /// 只有标头的 HEAD 响应：同一资源的 GET 响应体非空且以缓冲形式发送时才会被压缩
    fn would_compress(&self, response: &Response) -> bool {
        response
            .header("Content-Length")
            .and_then(|length| length.parse::<u64>().ok())
            .map_or(false, |length| length > 0 && length <= self.buffered_limit)
    }
}

#[async_trait]
impl Middleware for Compression {
    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Response, Exception> {
        let mut response = next.run(request).await?;
        let id = request.id();

        if response.header("Content-Encoding").is_some() {
            return Ok(response);
        }
        let compressible = response
            .header("Content-Type")
            .map_or(false, |content_type| self.is_compressible(content_type));
        if !compressible {
            return Ok(response);
        }
        let encoding = match decide_encoding(&request.accept_encoding()) {
            Some(e) => e,
            None => return Ok(response),
        };

        // HEAD 没有响应体，按对应 GET 会得到的结果只调整标头
        if request.method() == HttpRequestMethod::Head && response.body().is_empty() {
            if self.would_compress(&response) {
                debug!("[ID{}]HEAD请求，按{}编码调整标头", id, encoding);
                response
                    .set_header("Content-Encoding", &encoding.to_string())
                    .add_vary("Accept-Encoding")
                    .remove_header("Content-Length");
            }
            return Ok(response);
        }

        let data = match response.body() {
            Body::Buffered(b) if !b.is_empty() => Some(b.clone()),
            _ => None,
        };
        let data = match data {
            Some(data) => data,
            None => return Ok(response),
        };

        let level = self.level;
        let original_size = data.len();
        let compressed =
            tokio::task::spawn_blocking(move || compress(&data, encoding, level)).await;
        match compressed {
            Ok(Ok(bytes)) => {
                debug!(
                    "[ID{}]{}压缩完成：{} -> {} bytes",
                    id,
                    encoding,
                    original_size,
                    bytes.len()
                );
                response
                    .set_header("Content-Encoding", &encoding.to_string())
                    .add_vary("Accept-Encoding")
                    .remove_header("Content-Length")
                    .set_body(Body::Buffered(Bytes::from(bytes)));
            }
            Ok(Err(e)) => {
                error!("[ID{}]压缩失败，发送未压缩的内容：{}", id, e);
            }
            Err(e) => {
                error!("[ID{}]压缩任务异常结束，发送未压缩的内容：{}", id, e);
            }
        }
        Ok(response)
    }
}

/// 客户端同时接受时优先选择 Brotli
pub fn decide_encoding(accepted: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accepted.contains(&HttpEncoding::Br) {
        Some(HttpEncoding::Br)
    } else if accepted.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else {
        None
    }
}

/// Brotli 质量上限为 11，gzip 级别上限为 9
pub fn compress(data: &[u8], encoding: HttpEncoding, level: u32) -> io::Result<Vec<u8>> {
    match encoding {
        HttpEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::new(level.min(9)));
            encoder.write_all(data)?;
            encoder.finish()
        }
        HttpEncoding::Br => {
            let params = BrotliEncoderParams {
                quality: level.min(11) as i32,
                ..Default::default()
            };
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
    }
}
