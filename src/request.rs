// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型、不可变的 [`Request`]：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本）。
//! 2. 标头（Headers）解析为大小写不敏感、键唯一的映射。
//! 3. 请求目标拆分为路径与查询串，并确定请求的 scheme。
//! 4. 内容协商（Content Negotiation）相关的编码解析。

use std::collections::HashMap;
use std::fmt;

use log::error;

use crate::{exception::Exception, param::*};

/// 请求使用的传输方案
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// 表示一个完整的 HTTP 请求元数据。构造完成后不再修改。
#[derive(Debug, Clone)]
pub struct Request {
    /// 连接序号，用于在多线程环境下追踪日志
    id: u128,
    method: HttpRequestMethod,
    /// 请求目标中的路径部分（未解码，不含查询串）
    path: String,
    /// 查询串（不含 `?`）
    query: Option<String>,
    version: HttpVersion,
    scheme: Scheme,
    /// 标头名统一为小写，重复出现时后者覆盖前者
    headers: HashMap<String, String>,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据（至少包含完整的请求头）。
    /// * `id` - 全局请求 ID。
    /// * `trust_forwarded_proto` - 是否根据 `X-Forwarded-Proto` 判断请求是否经由 TLS 到达。
    pub fn try_from(
        buffer: &[u8],
        id: u128,
        trust_forwarded_proto: bool,
    ) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let head = match request_string.find("\r\n\r\n") {
            Some(end) => &request_string[..end],
            None => request_string.trim_end_matches(CRLF),
        };
        let mut request_lines = head.split(CRLF);

        // 1. 请求行 (e.g., "GET /index.html HTTP/1.1")
        let request_line = request_lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method = match HttpRequestMethod::parse(parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(Exception::UnsupportedRequestMethod);
            }
        };

        let version = match parts[2].to_ascii_uppercase().as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 2. 请求目标，兼容 absolute-form
        let mut scheme = Scheme::Http;
        let mut target = parts[1];
        for (prefix, s) in [("http://", Scheme::Http), ("https://", Scheme::Https)] {
            if target
                .get(..prefix.len())
                .map_or(false, |p| p.eq_ignore_ascii_case(prefix))
            {
                scheme = s;
                let rest = &target[prefix.len()..];
                target = match rest.find('/') {
                    Some(slash) => &rest[slash..],
                    None => "/",
                };
                break;
            }
        }
        if target != "*" && !target.starts_with('/') {
            error!("[ID{}]无法识别的请求目标：{}", id, target);
            return Err(Exception::MalformedRequest);
        }
        let (path, query) = split_target(target);

        // 3. 标头
        let mut headers = HashMap::new();
        for line in request_lines {
            if line.is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                }
                None => {
                    error!("[ID{}]无法解析的标头行：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            }
        }

        if trust_forwarded_proto {
            if let Some(proto) = headers.get("x-forwarded-proto") {
                if proto.eq_ignore_ascii_case("https") {
                    scheme = Scheme::Https;
                }
            }
        }

        Ok(Self {
            id,
            method,
            path,
            query,
            version,
            scheme,
            headers,
        })
    }

    /// 直接以方法和 URL（路径 + 可选查询串）构造请求，供管道内部和测试使用
    pub fn new(method: HttpRequestMethod, url: &str) -> Self {
        let (path, query) = split_target(url);
        Self {
            id: 0,
            method,
            path,
            query,
            version: HttpVersion::V1_1,
            scheme: Scheme::Http,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_id(mut self, id: u128) -> Self {
        self.id = id;
        self
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 请求路径（不含查询串，未做百分号解码）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// 路径加查询串，作为缓存键使用
    pub fn url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// 按名称（大小写不敏感）读取标头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }

    /// 目录列表以 JSON 而不是 HTML 返回
    pub fn wants_json(&self) -> bool {
        self.accept()
            .map_or(false, |accept| accept.contains("application/json"))
    }

    /// 客户端可接受的压缩算法列表。
    ///
    /// `q=0` 的条目视为拒绝；`*` 表示接受所有未被显式拒绝的编码。
    pub fn accept_encoding(&self) -> Vec<HttpEncoding> {
        let header = match self.header("accept-encoding") {
            Some(h) => h,
            None => return vec![],
        };
        let mut accepted = vec![];
        let mut rejected = vec![];
        let mut wildcard = false;
        for item in header.split(',') {
            let mut params = item.split(';');
            let coding = params.next().unwrap_or("").trim().to_ascii_lowercase();
            let refused = params.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .map_or(false, |q| q <= 0.0)
            });
            let encoding = match coding.as_str() {
                "gzip" | "x-gzip" => Some(HttpEncoding::Gzip),
                "br" => Some(HttpEncoding::Br),
                "*" => {
                    wildcard = !refused;
                    None
                }
                _ => None,
            };
            if let Some(e) = encoding {
                if refused {
                    rejected.push(e);
                } else if !accepted.contains(&e) {
                    accepted.push(e);
                }
            }
        }
        if wildcard {
            for e in [HttpEncoding::Br, HttpEncoding::Gzip] {
                if !accepted.contains(&e) && !rejected.contains(&e) {
                    accepted.push(e);
                }
            }
        }
        accepted
    }
}
