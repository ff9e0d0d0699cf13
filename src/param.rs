// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块集中定义了静态资源引擎与宿主服务器共用的常量：
//! - 宿主会用到的 HTTP 状态码及其原因短语。
//! - 文件扩展名到 MIME 类型的静态映射表。
//! - 缓存指令与校验器的默认取值。
//! - HTTP 方法、版本的强类型枚举。

use std::{collections::HashMap, fmt, path::Path};

use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "webstatic";

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// 未知扩展名时使用的兜底类型
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// 普通资源的默认缓存指令：允许缓存，但每次使用前都要向服务器确认
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=0, must-revalidate";

/// 带内容指纹的资源使用的长期缓存指令（一年）
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// 根路径默认指向的文件名
pub const HTML_INDEX: &str = "index.html";

/// 弱校验器前缀（RFC 9110 §8.8.3）
pub const WEAK_ETAG_PREFIX: &str = "W/";

lazy_static! {
    /// 服务器当前允许处理的 HTTP 方法列表。
    pub static ref ALLOWED_METHODS: Vec<HttpRequestMethod> = {
        vec![
            HttpRequestMethod::Get,
            HttpRequestMethod::Head,
            HttpRequestMethod::Options,
        ]
    };
}

lazy_static! {
    /// 宿主会发出的状态码与其原因短语。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        [
            (200, "OK"),
            (204, "No Content"),
            (206, "Partial Content"),
            (304, "Not Modified"),
            (400, "Bad Request"),
            (403, "Forbidden"),
            (404, "Not Found"),
            (405, "Method Not Allowed"),
            (416, "Range Not Satisfiable"),
            (500, "Internal Server Error"),
            (503, "Service Unavailable"),
        ]
        .into_iter()
        .collect()
    };
}

lazy_static! {
    /// 文件后缀名（小写）到 `Content-Type` 的映射表。
    ///
    /// 只收录 Web 应用打包产物里常见的类型，其余一律按二进制流处理。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        [
            ("avif", "image/avif"),
            ("bmp", "image/bmp"),
            ("css", "text/css;charset=utf-8"),
            ("csv", "text/csv"),
            ("eot", "application/vnd.ms-fontobject"),
            ("gif", "image/gif"),
            ("gz", "application/gzip"),
            ("htm", "text/html;charset=utf-8"),
            ("html", "text/html;charset=utf-8"),
            ("ico", "image/x-icon"),
            ("jpeg", "image/jpeg"),
            ("jpg", "image/jpeg"),
            ("js", "text/javascript;charset=utf-8"),
            ("json", "application/json"),
            ("jsonld", "application/ld+json"),
            ("map", "application/json"),
            ("mjs", "text/javascript;charset=utf-8"),
            ("mp3", "audio/mpeg"),
            ("mp4", "video/mp4"),
            ("oga", "audio/ogg"),
            ("ogv", "video/ogg"),
            ("otf", "font/otf"),
            ("pdf", "application/pdf"),
            ("png", "image/png"),
            ("svg", "image/svg+xml"),
            ("tar", "application/x-tar"),
            ("ttf", "font/ttf"),
            ("txt", "text/plain;charset=utf-8"),
            ("wasm", "application/wasm"),
            ("wav", "audio/wav"),
            ("webm", "video/webm"),
            ("webmanifest", "application/manifest+json"),
            ("webp", "image/webp"),
            ("woff", "font/woff"),
            ("woff2", "font/woff2"),
            ("xml", "text/xml"),
            ("zip", "application/zip"),
        ]
        .into_iter()
        .collect()
    };
}

/// 根据文件扩展名推断 `Content-Type`，未知或缺失时返回 [`DEFAULT_MIME`]。
pub fn mime_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| MIME_TYPES.get(ext.to_ascii_lowercase().as_str()).copied())
        .unwrap_or(DEFAULT_MIME)
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy)]
pub enum HttpVersion {
    /// HTTP/1.1 版本
    V1_1,
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体）
    Head,
    /// 查询服务器支持的选项
    Options,
    /// 提交数据。静态资源不接受，返回 405
    Post,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}
