// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 目录列表：读取目录内容并排序，目录在前、文件在后，组内按名称（区分大小写）升序。

use std::cmp::Ordering;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::warn;

use crate::exception::Exception;
use crate::param::get_mime;
use crate::path::encode_url_path;
use crate::util::format_file_size;

#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub name: String,
    /// 指向该条目的 URL，目录以 `/` 结尾
    pub url: String,
    pub size: u64,
    pub modified: SystemTime,
    /// 目录为 `directory`，文件为扩展名对应的 MIME 类型
    pub mime_class: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct DirectoryListing {
    url_path: String,
    parent_url: Option<String>,
    entries: Vec<ListingEntry>,
}

impl DirectoryListing {
    /// 读取 `dir` 的内容。`url_path` 是解码、规范化后的目录地址。
    ///
    /// 无法读取元数据的条目会被跳过，不影响整个列表。
    pub async fn read(dir: &Path, url_path: &str, id: u128) -> Result<Self, Exception> {
        let mut reader = tokio::fs::read_dir(dir).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(m) => m,
                Err(e) => {
                    warn!("[ID{}]跳过无法读取元数据的条目{}: {}", id, name, e);
                    continue;
                }
            };
            entries.push(ListingEntry {
                name,
                url: String::new(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                mime_class: String::new(),
                is_dir: metadata.is_dir(),
            });
        }
        Ok(Self::from_entries(url_path, entries))
    }

    /// 由条目构造列表，补全链接与类型并排序
    pub fn from_entries(url_path: &str, mut entries: Vec<ListingEntry>) -> Self {
        let url_path = if url_path.ends_with('/') {
            url_path.to_string()
        } else {
            format!("{}/", url_path)
        };
        let base = encode_url_path(&url_path);
        for entry in entries.iter_mut() {
            let encoded = encode_url_path(&entry.name);
            if entry.is_dir {
                entry.url = format!("{}{}/", base, encoded);
                entry.mime_class = "directory".to_string();
            } else {
                entry.url = format!("{}{}", base, encoded);
                let extension = Path::new(&entry.name).extension().and_then(|e| e.to_str());
                entry.mime_class = get_mime(extension).to_string();
            }
        }
        sort_entries(&mut entries);
        Self {
            parent_url: parent_url(&base),
            url_path,
            entries,
        }
    }

    pub fn url_path(&self) -> &str {
        &self.url_path
    }

    /// 上一级目录的地址，根目录没有上一级
    pub fn parent_url(&self) -> Option<&str> {
        self.parent_url.as_deref()
    }

    pub fn entries(&self) -> &[ListingEntry] {
        &self.entries
    }

    pub fn to_json(&self) -> Result<Vec<u8>, Exception> {
        let json_struct: Vec<_> = self
            .entries
            .iter()
            .map(|entry| {
                let size_str = format_file_size(entry.size);
                serde_json::json!({
                    "name": entry.name,
                    "url": entry.url,
                    "type": if entry.is_dir { "dir" } else { "file" },
                    "mime": entry.mime_class,
                    "size": if entry.is_dir { "-" } else { size_str.as_str() },
                    "raw_size": entry.size,
                    "date": DateTime::<Utc>::from(entry.modified).to_rfc3339(),
                })
            })
            .collect();
        serde_json::to_vec(&json_struct).map_err(|e| Exception::Upstream(e.to_string()))
    }
}

fn parent_url(url_path: &str) -> Option<String> {
    if url_path == "/" {
        return None;
    }
    let trimmed = url_path.trim_end_matches('/');
    trimmed.rfind('/').map(|i| trimmed[..=i].to_string())
}

fn sort_entries(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
}
