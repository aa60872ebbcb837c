// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了 `staticpipe` 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 扩展名到 MIME 类型的映射表，以及查找函数 [`get_mime`]。
//! - HTTP 方法、版本及编码格式的强类型枚举。

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// 目录默认首页文件名，同时也是 SPA 回退时使用的根文档
pub const INDEX_FILE: &str = "index.html";

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "staticpipe";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 无法识别扩展名时使用的兜底类型
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// 405 响应中 `Allow` 头的取值
pub const ALLOW_HEADER_VALUE: &str = "GET, HEAD";

lazy_static! {
    /// 静态资源处理器接受的 HTTP 方法。其余方法一律返回 405。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = {
        vec![HttpRequestMethod::Get, HttpRequestMethod::Head]
    };
}

lazy_static! {
    /// 默认的可压缩内容类型白名单（按前缀匹配，忽略参数部分）。
    pub static ref COMPRESSIBLE_TYPES: Vec<&'static str> = {
        vec![
            "text/plain",
            "text/html",
            "text/css",
            "text/javascript",
            "application/javascript",
            "application/json",
            "application/xml",
            "text/xml",
            "image/svg+xml",
        ]
    };
}

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");

        // 3xx: 重定向 (Redirection)
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(408, "Request Timeout");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(431, "Request Header Fields Too Large");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(503, "Service Unavailable");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型（Media Type）的映射表。
    ///
    /// 用于设置响应头中的 `Content-Type` 字段，确保浏览器能正确解析返回的文件流。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("aac", "audio/aac");
        map.insert("avi", "video/x-msvideo");
        map.insert("avif", "image/avif");
        map.insert("bin", "application/octet-stream");
        map.insert("bmp", "image/bmp");
        map.insert("bz2", "application/x-bzip2");
        map.insert("css", "text/css;charset=utf-8");
        map.insert("csv", "text/csv");
        map.insert("doc", "application/msword");
        map.insert("eot", "application/vnd.ms-fontobject");
        map.insert("epub", "application/epub+zip");
        map.insert("gif", "image/gif");
        map.insert("gz", "application/gzip");
        map.insert("htm", "text/html;charset=utf-8");
        map.insert("html", "text/html;charset=utf-8");
        map.insert("ico", "image/x-icon");
        map.insert("ics", "text/calendar");
        map.insert("jar", "application/java-archive");
        map.insert("js", "text/javascript;charset=utf-8");
        map.insert("json", "application/json");
        map.insert("jsonld", "application/ld+json");
        map.insert("jpg", "image/jpeg");
        map.insert("jpeg", "image/jpeg");
        map.insert("map", "application/json");
        map.insert("md", "text/markdown;charset=utf-8");
        map.insert("mjs", "text/javascript;charset=utf-8");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("mpeg", "video/mpeg");
        map.insert("oga", "audio/ogg");
        map.insert("ogv", "video/ogg");
        map.insert("opus", "audio/opus");
        map.insert("otf", "font/otf");
        map.insert("pdf", "application/pdf");
        map.insert("png", "image/png");
        map.insert("rar", "application/x-rar-compressed");
        map.insert("rtf", "application/rtf");
        map.insert("svg", "image/svg+xml");
        map.insert("tar", "application/x-tar");
        map.insert("tif", "image/tiff");
        map.insert("tiff", "image/tiff");
        map.insert("txt", "text/plain;charset=utf-8");
        map.insert("ttf", "font/ttf");
        map.insert("wav", "audio/wav");
        map.insert("wasm", "application/wasm");
        map.insert("weba", "audio/webm");
        map.insert("webm", "video/webm");
        map.insert("webmanifest", "application/manifest+json");
        map.insert("webp", "image/webp");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("xhtml", "application/xhtml+xml");
        map.insert("xml", "application/xml");
        map.insert("zip", "application/zip");
        map.insert("7z", "application/x-7z-compressed");
        map
    };
}

/// 按扩展名查找 MIME 类型，大小写不敏感，查不到时返回 [`DEFAULT_MIME`]。
pub fn get_mime(extension: Option<&str>) -> &'static str {
    match extension {
        Some(ext) => MIME_TYPES
            .get(ext.to_ascii_lowercase().as_str())
            .copied()
            .unwrap_or(DEFAULT_MIME),
        None => DEFAULT_MIME,
    }
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// 标准 HTTP 请求方法
///
/// 解析阶段接受所有标准方法，是否处理由管道内的各个阶段决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Delete,
    Patch,
    Trace,
    Connect,
}

impl HttpRequestMethod {
    /// 从请求行中的方法标记解析，大小写不敏感
    pub fn parse(token: &str) -> Option<Self> {
        let method = match token.to_ascii_uppercase().as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "DELETE" => HttpRequestMethod::Delete,
            "PATCH" => HttpRequestMethod::Patch,
            "TRACE" => HttpRequestMethod::Trace,
            "CONNECT" => HttpRequestMethod::Connect,
            _ => return None,
        };
        Some(method)
    }
}

/// 支持的内容编码（压缩）格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    /// GNU zip 压缩
    Gzip,
    /// Brotli 压缩
    Br,
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            HttpRequestMethod::Get => "GET",
            HttpRequestMethod::Head => "HEAD",
            HttpRequestMethod::Options => "OPTIONS",
            HttpRequestMethod::Post => "POST",
            HttpRequestMethod::Put => "PUT",
            HttpRequestMethod::Delete => "DELETE",
            HttpRequestMethod::Patch => "PATCH",
            HttpRequestMethod::Trace => "TRACE",
            HttpRequestMethod::Connect => "CONNECT",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for HttpEncoding {
    /// 将枚举格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}
