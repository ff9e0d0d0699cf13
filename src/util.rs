// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::param::STATUS_CODES;

/// 宿主错误页面（400/404/416/500 等）的 HTML 构建器
pub struct HtmlBuilder {
    title: String,
    css: String,
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
        let description = note.unwrap_or_else(|| STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status"));
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

/// 把字节数格式化为便于阅读的形式，用于控制台的缓存统计
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

/// IMF-fixdate 格式（RFC 9110 §5.6.7），用于 `Date` 与 `Last-Modified`
pub fn http_date(time: SystemTime) -> String {
    let date: DateTime<Utc> = time.into();
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
