// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 识别文件名中带内容指纹的构建产物，例如 `app.3f9a1c2b.js`、`vendor-9d8e7f6a.css`。
//!
//! 指纹至少 6 个字母或数字，`.v1.js` 这类版本后缀不算。
//! 只看形状不看内容：`my-button.js`、`bootstrap.bundle.js` 这样带 6 位以上普通单词的文件名
//! 同样会被当作不可变资源，因此只应对存放构建产物的目录开启 `detect_immutable`。

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `name.<hash>.ext`
    static ref DOT_FINGERPRINT: Regex = Regex::new(r"^.+\.[A-Za-z0-9]{6,}\.[A-Za-z0-9]+$").unwrap();
    /// `name-<hash>.ext`
    static ref DASH_FINGERPRINT: Regex = Regex::new(r"^.+-[A-Za-z0-9]{6,}\.[A-Za-z0-9]+$").unwrap();
}

/// 文件名是否带有内容指纹
pub fn is_fingerprinted(file_name: &str) -> bool {
    DOT_FINGERPRINT.is_match(file_name) || DASH_FINGERPRINT.is_match(file_name)
}

/// 只有在目录开启了指纹识别、且文件名匹配时才视为不可变资源
pub fn is_immutable(path: &Path, detect_immutable: bool) -> bool {
    detect_immutable
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_fingerprinted)
}
