// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（方法、路径、版本）；
//! 2. 静态资源引擎关心的标头：`If-None-Match`、`Range`，以及用于日志的 `User-Agent`。
//!
//! `Range` 以原始字符串保留，语法校验交给引擎（非法时返回 400 而不是直接断开）。

use crate::{exception::Exception, param::*};
use log::error;

/// 表示一个 HTTP 请求的元数据。静态资源请求不关心请求体。
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpRequestMethod,
    /// 请求的资源路径（包含查询字符串）
    path: String,
    version: HttpVersion,
    user_agent: String,
    if_none_match: Option<String>,
    range: Option<String>,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据。
    /// * `id` - 全局请求 ID，用于在多线程环境下追踪日志。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        // 只看头部，忽略请求体
        let head = request_string
            .split_once("\r\n\r\n")
            .map_or(request_string, |(head, _)| head);
        let mut lines = head.split(CRLF);

        // 请求行，例如 "GET /index.html HTTP/1.1"
        let first_line = lines.next().unwrap_or_default();
        let first_line_parts: Vec<&str> = first_line.split(' ').collect();
        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, first_line);
            return Err(Exception::UnSupportedRequestMethod);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中夹带空格虽不规范，仍尝试拼回原样，由引擎决定能否映射
        let path = first_line_parts[1..first_line_parts.len() - 1].join(" ");

        let mut user_agent = String::new();
        let mut if_none_match = None;
        let mut range = None;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "user-agent" => user_agent = value,
                "if-none-match" => if_none_match = Some(value),
                "range" => range = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            method,
            path,
            version,
            user_agent,
            if_none_match,
            range,
        })
    }
}

impl Request {
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取请求路径（含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn if_none_match(&self) -> Option<&str> {
        self.if_none_match.as_deref()
    }

    /// `Range` 头原文
    pub fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }
}
