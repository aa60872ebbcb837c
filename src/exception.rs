// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理管道在生命周期中可能产生的各类异常情况。
//!
//! - **错误分类**：涵盖协议解析错误、路径安全错误、配置错误以及管道内部的意外故障。
//! - **语义映射**：每个变体通过 [`Exception::status_code`] 对应一个 HTTP 状态码。
//! - **对外隐藏细节**：`Upstream` 携带的详细信息只进入日志，客户端只能看到不透明的 500 页面。

use std::fmt;
use std::io;

/// 服务器处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行或标头格式不正确。
    MalformedRequest,
    /// 请求行中的方法标记不是任何已知的 HTTP 方法。
    UnsupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求头超过了配置的上限。
    HeaderTooLarge,
    /// 请求的资源不存在。对应 `404 Not Found`。
    FileNotFound,
    /// 解析后的路径逃逸出根目录。对应 `403 Forbidden`，只作为安全事件记录。
    PathTraversal,
    /// 路径包含无法处理的内容（非法的百分号编码、空字节等）。对应 `400 Bad Request`。
    InvalidPath,
    /// 方法不被静态资源处理器接受。对应 `405 Method Not Allowed`。
    MethodNotAllowed,
    /// 配置文件无法读取或解析。
    InvalidConfig(String),
    /// 管道内部的意外故障，由最外层边界转为 500。
    Upstream(String),
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8 | MalformedRequest | UnsupportedRequestMethod | InvalidPath => 400,
            UnsupportedHttpVersion => 505,
            HeaderTooLarge => 431,
            FileNotFound => 404,
            PathTraversal => 403,
            MethodNotAllowed => 405,
            InvalidConfig(_) | Upstream(_) => 500,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request"),
            UnsupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            HeaderTooLarge => write!(f, "Request header too large (431)"),
            FileNotFound => write!(f, "File not found (404)"),
            PathTraversal => write!(f, "Path escapes the served root (403)"),
            InvalidPath => write!(f, "Invalid path (400)"),
            MethodNotAllowed => write!(f, "Method not allowed (405)"),
            InvalidConfig(detail) => write!(f, "Invalid configuration: {}", detail),
            Upstream(detail) => write!(f, "Upstream failure: {}", detail),
        }
    }
}

impl std::error::Error for Exception {}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Upstream(e.to_string())
    }
}
