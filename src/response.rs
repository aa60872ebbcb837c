// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! [`Response`] 由状态码、按插入顺序保存的标头（同名标头后写覆盖前写）以及 [`Body`] 组成。
//!
//! 响应体有两种形态：
//! - `Buffered`：内存中的字节，可任意复制，每个副本都能独立读取；
//! - `Stream`：打开的文件，只能被消费一次。缓存与压缩阶段必须先把它缓冲成 `Buffered`。

use crate::{
    exception::Exception,
    param::*,
    util::{http_date, HtmlBuilder},
};

use bytes::Bytes;
use log::{debug, error};
use std::time::SystemTime;

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
};

/// 只能读取一次的文件流
#[derive(Debug)]
pub struct FileStream {
    file: File,
    len: u64,
}

impl FileStream {
    pub fn new(file: File, len: u64) -> Self {
        Self { file, len }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 读取全部剩余内容，流随之耗尽
    pub async fn read_all(mut self) -> Result<Bytes, Exception> {
        let mut buffer = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}

#[derive(Debug)]
pub enum Body {
    Empty,
    Buffered(Bytes),
    Stream(FileStream),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Buffered(b) => b.is_empty(),
            Body::Stream(s) => s.is_empty(),
        }
    }

    /// 已知的长度（字节）
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Buffered(b) => b.len() as u64,
            Body::Stream(s) => s.len(),
        }
    }

    /// 复制响应体。流式响应体无法复制，返回 `None`。
    pub fn duplicate(&self) -> Option<Body> {
        match self {
            Body::Empty => Some(Body::Empty),
            Body::Buffered(b) => Some(Body::Buffered(b.clone())),
            Body::Stream(_) => None,
        }
    }

    /// 消费响应体，得到完整的字节内容
    pub async fn into_bytes(self) -> Result<Bytes, Exception> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Buffered(b) => Ok(b),
            Body::Stream(s) => s.read_all().await,
        }
    }
}

#[derive(Debug)]
pub struct Response {
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                "Unknown".to_string()
            }
        };
        self
    }

    /// 设置标头。同名标头（大小写不敏感）已存在时原位覆盖，保留首次插入的位置。
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self
    }

    /// 向 `Vary` 追加一个字段，已存在（大小写不敏感）时不重复添加
    pub fn add_vary(&mut self, field: &str) -> &mut Self {
        let merged = match self.header("Vary") {
            Some(current)
                if current
                    .split(',')
                    .any(|f| f.trim().eq_ignore_ascii_case(field)) =>
            {
                None
            }
            Some(current) => Some(format!("{}, {}", current, field)),
            None => Some(field.to_string()),
        };
        if let Some(merged) = merged {
            self.set_header("Vary", &merged);
        }
        self
    }

    pub fn set_body(&mut self, body: Body) -> &mut Self {
        self.body = body;
        self
    }

    /// 取出响应体，原位置留下 `Body::Empty`
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, Body::Empty)
    }

    /// 把流式响应体读入内存。
    ///
    /// 响应体超过 `limit` 字节时保持原状并返回 `false`。
    pub async fn buffer_within(&mut self, limit: u64) -> Result<bool, Exception> {
        if self.body.len() > limit {
            return Ok(false);
        }
        if let Body::Stream(_) = self.body {
            let bytes = self.take_body().into_bytes().await?;
            self.body = Body::Buffered(bytes);
        }
        Ok(true)
    }

    /// 生成一份独立的副本。流式响应体无法复制时返回 `None`。
    pub fn duplicate(&self) -> Option<Response> {
        Some(Response {
            status_code: self.status_code,
            information: self.information.clone(),
            headers: self.headers.clone(),
            body: self.body.duplicate()?,
        })
    }
}

// --- 常用响应构造 ---

impl Response {
    /// 以状态码构造一个带 HTML 说明页的响应
    pub fn from_status_code(code: u16) -> Self {
        let note = match code {
            400 => Some(r"<h2>噢！</h2><p>服务器无法理解这个请求。</p>"),
            403 => Some(r"<h2>噢！</h2><p>你没有权限访问这个地址。</p>"),
            404 => Some(r"<h2>噢！</h2><p>你指定的网页无法找到。</p>"),
            405 => Some(r"<h2>噢！</h2><p>本服务器只接受GET和HEAD方法。</p>"),
            500 => Some(r"<h2>噢！</h2><p>服务器出现了一个内部错误。</p>"),
            _ => None,
        };
        let content = HtmlBuilder::from_status_code(code, note).build();
        let mut response = Self::from_html(content);
        response.set_code(code);
        response
    }

    pub fn from_html(html: String) -> Self {
        let mut response = Self::new();
        response
            .set_header("Content-Type", "text/html;charset=utf-8")
            .set_header("Content-Length", &html.len().to_string())
            .set_body(Body::Buffered(Bytes::from(html)));
        response
    }

    pub fn bad_request() -> Self {
        Self::from_status_code(400)
    }

    pub fn forbidden() -> Self {
        Self::from_status_code(403)
    }

    pub fn not_found() -> Self {
        Self::from_status_code(404)
    }

    pub fn method_not_allowed() -> Self {
        let mut response = Self::from_status_code(405);
        response.set_header("Allow", ALLOW_HEADER_VALUE);
        response
    }

    pub fn internal_error() -> Self {
        Self::from_status_code(500)
    }

    /// 301 重定向，不带响应体
    pub fn redirect(location: &str) -> Self {
        let mut response = Self::new();
        response
            .set_code(301)
            .set_header("Location", location)
            .set_header("Content-Length", "0");
        response
    }

    pub fn no_content() -> Self {
        let mut response = Self::new();
        response.set_code(204);
        response
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }
}

// --- 报文序列化 ---

impl Response {
    /// 状态行与标头部分。
    ///
    /// 自动补充 `Date`、`Server`、`Connection`；缓冲响应体缺少 `Content-Length` 时按实际长度补上。
    pub fn head_bytes(&self, version: HttpVersion) -> Vec<u8> {
        let mut head = format!("{} {} {}{}", version, self.status_code, self.information, CRLF);
        for (name, value) in &self.headers {
            head.push_str(&[name.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        if self.header("Content-Length").is_none() {
            match &self.body {
                Body::Buffered(b) => {
                    head.push_str(&format!("Content-Length: {}{}", b.len(), CRLF));
                }
                Body::Stream(s) => {
                    head.push_str(&format!("Content-Length: {}{}", s.len(), CRLF));
                }
                Body::Empty => {}
            }
        }
        head.push_str(&["Date: ", &http_date(SystemTime::now()), CRLF].concat());
        head.push_str(&["Server: ", SERVER_NAME, CRLF].concat());
        head.push_str(&["Connection: close", CRLF, CRLF].concat());
        head.into_bytes()
    }

    /// 将整个响应写入连接，流式响应体按 `chunk_size` 分块发送。返回发送的响应体字节数。
    pub async fn write_to<W>(
        self,
        writer: &mut W,
        version: HttpVersion,
        chunk_size: usize,
    ) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.head_bytes(version)).await?;
        let sent = match self.body {
            Body::Empty => 0,
            Body::Buffered(bytes) => {
                writer.write_all(&bytes).await?;
                bytes.len() as u64
            }
            Body::Stream(mut stream) => {
                let mut buffer = vec![0u8; chunk_size.max(1)];
                let mut total_sent = 0u64;
                loop {
                    let n = stream.file.read(&mut buffer).await?;
                    if n == 0 {
                        break;
                    }
                    writer.write_all(&buffer[..n]).await?;
                    total_sent += n as u64;
                }
                debug!("流式传输完成，共发送 {} 字节", total_sent);
                total_sent
            }
        };
        writer.flush().await?;
        Ok(sent)
    }
}
