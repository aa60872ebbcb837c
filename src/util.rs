// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::time::SystemTime;

use chrono::{DateTime, Local, Utc};

use crate::listing::DirectoryListing;
use crate::param::STATUS_CODES;

pub struct HtmlBuilder {
    title: String,
    css: String,
    script: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => n,
            None => STATUS_CODES.get(&code).copied().unwrap_or(""),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self {
            title,
            css,
            script: "".to_string(),
            body,
        }
    }

    /// 目录列表页。条目顺序由 [`DirectoryListing`] 保证，这里只负责呈现。
    pub fn from_listing(listing: &DirectoryListing) -> Self {
        let mut body = String::new();
        let shown_path = escape_html(listing.url_path());

        body.push_str(&format!("<h1>{}的文件列表</h1><hr>", shown_path));
        body.push_str("<table>");
        body.push_str(
            r#"
            <tr>
                <td>文件名</td>
                <td>大小</td>
                <td>修改时间</td>
            </tr>
            "#,
        );
        if let Some(parent) = listing.parent_url() {
            body.push_str(&format!(
                r#"
            <tr>
                <td><a href="{}">..</a></td>
                <td></td>
                <td></td>
            </tr>
            "#,
                escape_html(parent)
            ));
        }
        for entry in listing.entries() {
            let local_time: DateTime<Local> = entry.modified.into();
            let formatted_time = local_time.format("%Y-%m-%d %H:%M:%S %Z").to_string();
            let (shown_name, size) = if entry.is_dir {
                (format!("{}/", entry.name), "文件夹".to_string())
            } else {
                (entry.name.clone(), format_file_size(entry.size))
            };
            body.push_str(&format!(
                r#"
                <tr>
                    <td><a href="{}">{}</a></td>
                    <td>{}</td>
                    <td>{}</td>
                </tr>
                "#,
                escape_html(&entry.url),
                escape_html(&shown_name),
                size,
                formatted_time
            ));
        }
        body.push_str("</table>");
        let title = format!("{}的文件列表", shown_path);
        let css = r"
            table {
                border-collapse: collapse;
                width: 100%;
            }

            td {
                padding: 8px;
                white-space: pre-wrap;
                border: none;
            }"
        .to_string();
        HtmlBuilder {
            title,
            css,
            script: "".to_string(),
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <script>{}</script>
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.script, self.title, self.css, self.body
        )
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// IMF-fixdate 格式，例如 `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: SystemTime) -> String {
    let date: DateTime<Utc> = time.into();
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(text: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(text.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc).into())
}
