// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径解析与安全守卫
//!
//! 把 URL 路径映射为根目录下的文件系统路径，并证明结果仍位于根目录之内。
//! 所有计算都是词法上的，不访问文件系统。
//!
//! 处理顺序：百分号解码 -> [`normalize_url_path`] -> [`resolve`] -> [`is_under_root`]。
//! 只有通过全部步骤的路径才会被包装为 [`PathContext`]，也只有 `PathContext` 会被交给文件系统 I/O。

use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

use crate::exception::Exception;

/// 写回 URL（重定向地址、列表链接）时需要转义的字符，`/` 保持原样
const URL_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

lazy_static! {
    static ref REPEATED_SEPARATORS: Regex = Regex::new(r"/{2,}").unwrap();
}

/// 合并重复的分隔符，保证以单个 `/` 开头，并去掉结尾的 `/`（根路径 `/` 除外）。
/// 空输入规范化为 `/`。
pub fn normalize_url_path(path: &str) -> String {
    let collapsed = REPEATED_SEPARATORS.replace_all(path, "/");
    let mut normalized = if collapsed.starts_with('/') {
        collapsed.into_owned()
    } else {
        format!("/{}", collapsed)
    };
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// 百分号解码。结果不是合法 UTF-8 或包含空字节时视为非法路径。
pub fn decode_url_path(raw: &str) -> Result<String, Exception> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| Exception::InvalidPath)?;
    if decoded.contains('\0') {
        return Err(Exception::InvalidPath);
    }
    Ok(decoded.into_owned())
}

/// [`decode_url_path`] 的逆操作，用于把解码后的路径重新放进 URL
pub fn encode_url_path(path: &str) -> String {
    utf8_percent_encode(path, URL_ESCAPE).to_string()
}

/// 去掉 URL 路径开头的分隔符后拼接到 `root` 之下，再按词法消解 `.` 和 `..`。
pub fn resolve(root: &Path, url_path: &str) -> PathBuf {
    let relative = url_path.trim_start_matches('/');
    lexical_normalize(&root.join(relative))
}

/// `candidate` 等于 `root`，或以 `root` 加分隔符开头时成立。两边都先转为绝对形式。
pub fn is_under_root(candidate: &Path, root: &Path) -> bool {
    let candidate = absolutize(candidate);
    let root = absolutize(root);
    // Path::starts_with 按路径组件比较，"/srv/www2" 不会被当作 "/srv/www" 的子路径
    candidate.starts_with(&root)
}

/// 相对路径基于当前工作目录转为绝对路径，然后做词法规范化。
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return lexical_normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => lexical_normalize(&cwd.join(path)),
        Err(_) => lexical_normalize(path),
    }
}

/// 不访问文件系统地消解 `.` 与 `..`。绝对路径中越过根的 `..` 被丢弃。
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// 已通过包含性检查的路径。
///
/// 唯一的构造途径是 [`PathContext::resolve`]，因此任何 `PathContext` 都位于根目录之内。
#[derive(Debug, Clone, PartialEq)]
pub struct PathContext {
    url_path: String,
    fs_path: PathBuf,
    /// 解码后的原始路径是否以 `/` 结尾
    trailing_slash: bool,
}

impl PathContext {
    pub fn resolve(root: &Path, raw_url_path: &str) -> Result<Self, Exception> {
        let decoded = decode_url_path(raw_url_path)?;
        let trailing_slash = decoded.ends_with('/');
        let url_path = normalize_url_path(&decoded);
        let fs_path = resolve(root, &url_path);
        if !is_under_root(&fs_path, root) {
            return Err(Exception::PathTraversal);
        }
        Ok(Self {
            url_path,
            fs_path,
            trailing_slash,
        })
    }

    /// 规范化后的 URL 路径
    pub fn url_path(&self) -> &str {
        &self.url_path
    }

    pub fn fs_path(&self) -> &Path {
        &self.fs_path
    }

    pub fn is_root(&self) -> bool {
        self.url_path == "/"
    }

    /// 目录请求是否已经带有结尾的 `/`。根路径总是成立。
    pub fn has_trailing_slash(&self) -> bool {
        self.trailing_slash || self.is_root()
    }

    /// 目录的规范地址：规范化路径加结尾的 `/`，已做百分号编码
    pub fn directory_url(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("{}/", encode_url_path(&self.url_path))
        }
    }
}
