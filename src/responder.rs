// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态资源处理器
//!
//! 链末端的 [`Handler`]。根据请求路径的解析结果决定返回文件、目录首页、目录列表、
//! 重定向、SPA 根文档还是错误页：
//!
//! | 条件 | 结果 |
//! |---|---|
//! | 方法不是 GET/HEAD | 405，`Allow: GET, HEAD` |
//! | 路径逃逸出根目录 | 403 |
//! | 普通文件 | 返回文件 |
//! | 目录且 URL 不以 `/` 结尾 | 301 到 URL + `/` |
//! | 目录且存在 `index.html` | 返回该文件 |
//! | 目录、无首页、允许列表 | 200 目录列表 |
//! | 目录、无首页、禁止列表 | 404 |
//! | 路径不存在且启用 SPA | 根目录 `index.html`，不存在则 404 |
//! | 其他 | 404 |

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, warn};
use tokio::fs;

use crate::{
    chain::Handler,
    config::Config,
    exception::Exception,
    listing::DirectoryListing,
    param::*,
    path::{is_under_root, PathContext},
    request::Request,
    response::{Body, FileStream, Response},
    util::{http_date, parse_http_date, HtmlBuilder},
};

pub struct StaticResponder {
    /// 规范化（canonicalize）后的根目录
    root: PathBuf,
    spa: bool,
    directory_listing: bool,
    streaming_threshold: u64,
    follow_symlinks: bool,
}

impl StaticResponder {
    pub fn new(config: &Config) -> Result<Self, Exception> {
        let root = std::fs::canonicalize(config.www_root()).map_err(|e| {
            Exception::InvalidConfig(format!("无法解析根目录{}: {}", config.www_root(), e))
        })?;
        if !root.is_dir() {
            return Err(Exception::InvalidConfig(format!(
                "根目录{}不是一个目录",
                root.display()
            )));
        }
        Ok(Self {
            root,
            spa: config.spa(),
            directory_listing: config.directory_listing(),
            streaming_threshold: config.streaming_threshold(),
            follow_symlinks: config.follow_symlinks(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn respond(&self, request: &Request) -> Result<Response, Exception> {
        let id = request.id();
        let method = request.method();
        if !ALLOWED_METHODS.contains(&method) {
            debug!("[ID{}]方法{}不被接受，返回405", id, method);
            return Ok(Response::method_not_allowed());
        }
        let head_only = method == HttpRequestMethod::Head;

        let context = match PathContext::resolve(&self.root, request.path()) {
            Ok(context) => context,
            Err(Exception::PathTraversal) => {
                warn!("[ID{}]安全事件：请求路径{}逃逸出根目录，返回403", id, request.path());
                return Ok(Response::forbidden());
            }
            Err(e) => {
                warn!("[ID{}]请求路径{}无法处理：{}", id, request.path(), e);
                return Ok(Response::from_status_code(e.status_code()));
            }
        };
        debug!("[ID{}]映射物理路径：{}", id, context.fs_path().display());

        let metadata = match fs::metadata(context.fs_path()).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.fallback(request, head_only).await;
            }
            Err(e) => {
                warn!("[ID{}]无法获取{}的元数据：{}", id, context.fs_path().display(), e);
                return Ok(Response::not_found());
            }
        };

        if !self.follow_symlinks && !self.contained_after_links(context.fs_path()).await {
            warn!("[ID{}]安全事件：{}经符号链接指向根目录之外，返回403", id, request.path());
            return Ok(Response::forbidden());
        }

        if metadata.is_file() {
            debug!("[ID{}]请求的路径是文件", id);
            self.serve_file(request, context.fs_path(), &metadata, head_only).await
        } else if metadata.is_dir() {
            debug!("[ID{}]请求的路径是目录", id);
            self.serve_dir(request, &context, head_only).await
        } else {
            warn!("[ID{}]{}既不是文件也不是目录", id, context.fs_path().display());
            Ok(Response::not_found())
        }
    }

    async fn serve_dir(
        &self,
        request: &Request,
        context: &PathContext,
        head_only: bool,
    ) -> Result<Response, Exception> {
        let id = request.id();
        if !context.has_trailing_slash() {
            // Location 取规范化后的路径，不会以 `//` 开头
            let directory_url = context.directory_url();
            let location = match request.query() {
                Some(q) => format!("{}?{}", directory_url, q),
                None => directory_url,
            };
            debug!("[ID{}]目录地址缺少结尾的/，重定向到{}", id, location);
            return Ok(Response::redirect(&location));
        }

        let index_path = context.fs_path().join(INDEX_FILE);
        if let Ok(metadata) = fs::metadata(&index_path).await {
            if metadata.is_file() {
                debug!("[ID{}]使用目录首页{}", id, index_path.display());
                return self.serve_file(request, &index_path, &metadata, head_only).await;
            }
        }

        if !self.directory_listing {
            debug!("[ID{}]目录没有首页且未启用目录列表，返回404", id);
            return Ok(Response::not_found());
        }

        let listing = match DirectoryListing::read(context.fs_path(), context.url_path(), id).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("[ID{}]读取目录{}失败：{}", id, context.fs_path().display(), e);
                return Ok(Response::not_found());
            }
        };
        let (content, content_type) = if request.wants_json() {
            (listing.to_json()?, "application/json")
        } else {
            (
                HtmlBuilder::from_listing(&listing).build().into_bytes(),
                "text/html;charset=utf-8",
            )
        };

        let mut response = Response::new();
        response
            .set_header("Content-Type", content_type)
            .set_header("Content-Length", &content.len().to_string())
            .add_vary("Accept");
        if !head_only {
            response.set_body(Body::Buffered(Bytes::from(content)));
        }
        Ok(response)
    }

    /// 路径不存在时的处理：SPA 模式下返回根目录首页
    async fn fallback(&self, request: &Request, head_only: bool) -> Result<Response, Exception> {
        let id = request.id();
        if !self.spa {
            debug!("[ID{}]请求的路径：{} 不存在，返回404", id, request.path());
            return Ok(Response::not_found());
        }
        let index_path = self.root.join(INDEX_FILE);
        match fs::metadata(&index_path).await {
            Ok(metadata) if metadata.is_file() => {
                debug!("[ID{}]SPA 路由触发：返回根目录 index.html", id);
                self.serve_file(request, &index_path, &metadata, head_only)
                    .await
            }
            _ => {
                debug!("[ID{}]SPA 模式下根目录缺少 index.html，返回404", id);
                Ok(Response::not_found())
            }
        }
    }

    async fn serve_file(
        &self,
        request: &Request,
        path: &Path,
        metadata: &Metadata,
        head_only: bool,
    ) -> Result<Response, Exception> {
        let id = request.id();
        let size = metadata.len();
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let etag = weak_etag(size, modified);
        let last_modified = http_date(modified);

        let mut response = Response::new();
        if is_not_modified(request, &etag, modified) {
            debug!("[ID{}]条件请求命中，返回304", id);
            response
                .set_code(304)
                .set_header("ETag", &etag)
                .set_header("Last-Modified", &last_modified);
            return Ok(response);
        }

        let mime = get_mime(path.extension().and_then(|e| e.to_str()));
        debug!("[ID{}]MIME类型: {}, 文件大小: {} bytes", id, mime, size);
        response
            .set_header("Content-Type", mime)
            .set_header("Content-Length", &size.to_string())
            .set_header("Last-Modified", &last_modified)
            .set_header("ETag", &etag);
        if head_only {
            return Ok(response);
        }

        if size > self.streaming_threshold {
            debug!("[ID{}]文件超过流式阈值，使用流式传输", id);
            match fs::File::open(path).await {
                Ok(file) => {
                    response.set_body(Body::Stream(FileStream::new(file, size)));
                }
                Err(e) => {
                    error!("[ID{}]无法打开文件{}：{}", id, path.display(), e);
                    return Ok(Response::not_found());
                }
            }
        } else {
            match fs::read(path).await {
                Ok(contents) => {
                    response.set_body(Body::Buffered(Bytes::from(contents)));
                }
                Err(e) => {
                    error!("[ID{}]无法读取文件{}：{}", id, path.display(), e);
                    return Ok(Response::not_found());
                }
            }
        }
        Ok(response)
    }

    /// 解析符号链接后再次检查包含性
    async fn contained_after_links(&self, path: &Path) -> bool {
        match fs::canonicalize(path).await {
            Ok(real) => is_under_root(&real, &self.root),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Handler for StaticResponder {
    async fn call(&self, request: &Request) -> Result<Response, Exception> {
        self.respond(request).await
    }
}

/// 由文件大小和修改时间（纳秒）构成的弱校验器，两者任一变化都会得到不同的值
pub fn weak_etag(size: u64, modified: SystemTime) -> String {
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("W/\"{:x}-{:x}\"", size, nanos)
}

fn is_not_modified(request: &Request, etag: &str, modified: SystemTime) -> bool {
    if let Some(if_none_match) = request.header("if-none-match") {
        let current = strip_weak(etag);
        return if_none_match
            .split(',')
            .map(str::trim)
            .any(|tag| tag == "*" || strip_weak(tag) == current);
    }
    if let Some(since) = request.header("if-modified-since").and_then(parse_http_date) {
        let modified_secs = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let since_secs = since
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        return modified_secs <= since_secs;
    }
    false
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
