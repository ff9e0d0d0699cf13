// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 校验器（ETag）生成
//!
//! - 小文件：对完整内容做 SHA-256，得到强校验器 `"<base64url>"`，内容相同则逐字节相同。
//! - 大文件：不读内容，由大小与修改时间拼出弱校验器 `W/"<size>-<mtime>"`。
//!   两个大小与修改时间都相同的大文件会得到同一个值，这是弱校验器的既定语义。

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::param::WEAK_ETAG_PREFIX;

/// 由内容计算强校验器
pub fn strong_etag(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("\"{}\"", URL_SAFE_NO_PAD.encode(digest))
}

/// 由大小与修改时间计算弱校验器
pub fn weak_etag(size: u64, modified: SystemTime) -> String {
    let mtime = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}\"{:x}-{:x}\"", WEAK_ETAG_PREFIX, size, mtime)
}

pub fn is_weak(etag: &str) -> bool {
    etag.starts_with(WEAK_ETAG_PREFIX)
}

/// 弱比较（RFC 9110 §8.8.3.2）：忽略 `W/` 前缀后比较不透明部分
pub fn weak_match(a: &str, b: &str) -> bool {
    opaque(a) == opaque(b)
}

fn opaque(etag: &str) -> &str {
    let etag = etag.trim();
    etag.strip_prefix(WEAK_ETAG_PREFIX).unwrap_or(etag)
}

/// `If-None-Match` 是否命中当前校验器，支持逗号分隔的列表与 `*`
pub fn if_none_match(header: &str, current: &str) -> bool {
    let header = header.trim();
    if header == "*" {
        return true;
    }
    header
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .any(|candidate| weak_match(candidate, current))
}
