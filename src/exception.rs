// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了静态资源引擎与宿主服务器在请求处理生命周期中可能产生的各类错误。
//!
//! - [`LookupError`]：引擎层面的文件查找失败，宿主据此决定 404 或 500。
//! - [`Exception`]：宿主层面的协议解析与配置加载失败。

use std::{io, path::PathBuf, sync::Arc};

use thiserror::Error;

/// 引擎查找文件时的失败原因。
///
/// `NotFound` 涵盖了“路径非法”“没有映射”“文件不存在”“目标是目录”这几种情况，
/// 对外不做区分，以免向客户端泄露文件系统结构。
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// 请求路径无法映射到任何可读的普通文件。
    #[error("file not found")]
    NotFound,
    /// 文件系统返回了“不存在”以外的错误（权限不足、I/O 故障等）。该错误不会被缓存。
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl LookupError {
    pub(crate) fn read(path: PathBuf, source: io::Error) -> Self {
        LookupError::Read {
            path,
            source: Arc::new(source),
        }
    }
}

/// 宿主服务器处理请求过程中发生的异常类型。
#[derive(Debug, Error)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    #[error("Request bytes can't be parsed in UTF-8")]
    RequestIsNotUtf8,
    /// 客户端使用了服务器暂不支持的 HTTP 方法。
    #[error("Unsupported request method")]
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    #[error("Unsupported HTTP version")]
    UnsupportedHttpVersion,
    /// 无法读取配置文件。
    #[error("Couldn't read config file {path}: {source}")]
    ConfigUnreadable {
        path: String,
        #[source]
        source: io::Error,
    },
    /// 配置文件不是合法的 TOML，或字段类型不匹配。
    #[error("Invalid config file {path}: {source}")]
    ConfigInvalid {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
