// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应构建
//!
//! 把引擎给出的 [`ServeResult`] 或查找失败翻译成 HTTP/1.1 响应报文。
//! 小文件的响应体直接放在内存里；大文件只记录需要流式发送的区间，由连接处理器分块写出。

use std::{path::PathBuf, time::SystemTime};

use bytes::Bytes;
use log::{debug, error};

use crate::{
    engine::{Body, ServeResult},
    exception::LookupError,
    param::*,
    util::{http_date, HtmlBuilder},
};

/// 需要从磁盘流式发送的区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRange {
    pub path: PathBuf,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(&'static str, String)>,
    content_length: u64,
    date: SystemTime,
    allow: Option<Vec<HttpRequestMethod>>,
    content: Option<Bytes>,
    stream: Option<StreamRange>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            content_length: 0,
            date: SystemTime::now(),
            allow: None,
            content: None,
            stream: None,
        }
    }

    /// 由引擎的结论构建。`headonly` 时保留 `Content-Length`，但不携带响应体。
    pub fn from_serve(result: ServeResult, headonly: bool, id: u128) -> Self {
        let mut response = Self::new();
        response.set_code(result.status);
        response.headers = result.headers;

        match result.body {
            // 4xx 且引擎没有给出响应体时，补一个错误页
            Body::Empty if result.status >= 400 => {
                response.set_html(HtmlBuilder::from_status_code(result.status, None).build());
            }
            Body::Empty => {}
            Body::Bytes(bytes) => {
                response.content_length = bytes.len() as u64;
                response.content = Some(bytes);
            }
            Body::File {
                path,
                offset,
                length,
            } => {
                debug!("[ID{}]大文件{}使用流式传输", id, path.display());
                response.content_length = length;
                response.stream = Some(StreamRange {
                    path,
                    offset,
                    length,
                });
            }
        }

        match headonly {
            true => response.head_only(),
            false => response,
        }
    }

    /// 用于 `HEAD`：保留全部头部（包括 `Content-Length`），去掉响应体
    pub fn head_only(mut self) -> Self {
        self.content = None;
        self.stream = None;
        self
    }

    /// 查找失败：不存在返回 404，其余返回 500
    pub fn from_lookup_error(err: &LookupError, id: u128) -> Self {
        match err {
            LookupError::NotFound => Self::from_status_code(404, Some(
                r"<h2>噢！</h2><p>你指定的资源无法找到。</p>",
            )),
            LookupError::Read { .. } => {
                error!("[ID{}]读取文件失败：{}", id, err);
                Self::from_status_code(500, Some(r"<h2>噢！</h2><p>服务器出现了一个内部错误。</p>"))
            }
        }
    }

    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        response.set_html(HtmlBuilder::from_status_code(code, note).build());
        if code == 405 {
            response.allow = Some(ALLOWED_METHODS.to_vec());
        }
        response
    }

    /// `OPTIONS` 的应答
    pub fn options() -> Self {
        let mut response = Self::new();
        response.set_code(204);
        response.allow = Some(ALLOWED_METHODS.to_vec());
        response
    }

    fn set_html(&mut self, html: String) {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("Content-Type"));
        self.headers
            .push(("Content-Type", "text/html;charset=utf-8".to_string()));
        let bytes = Bytes::from(html);
        self.content_length = bytes.len() as u64;
        self.content = Some(bytes);
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = STATUS_CODES
            .get(&code)
            .copied()
            .unwrap_or("Unknown")
            .to_string();
        self
    }

    /// 报文头部以及内存中的响应体。流式部分不包含在内。
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        for (name, value) in &self.headers {
            header.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        // 304 不描述响应体长度
        if self.status_code != 304 {
            header.push_str(&format!("Content-Length: {}{}", self.content_length, CRLF));
        }
        header.push_str(&format!("Date: {}{}", http_date(self.date), CRLF));
        header.push_str(&format!("Server: {}{}", SERVER_NAME, CRLF));
        if let Some(allow) = &self.allow {
            let methods: Vec<String> = allow.iter().map(|m| m.to_string()).collect();
            header.push_str(&format!("Allow: {}{}", methods.join(", "), CRLF));
        }
        header.push_str(CRLF);

        let mut bytes = header.into_bytes();
        if let Some(content) = &self.content {
            bytes.extend_from_slice(content);
        }
        bytes
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn stream(&self) -> Option<&StreamRange> {
        self.stream.as_ref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn text(response: &Response) -> String {
        String::from_utf8_lossy(&response.as_bytes()).to_string()
    }

    fn serve(status: u16, body: Body) -> ServeResult {
        ServeResult {
            status,
            headers: vec![
                ("ETag", "\"abc\"".to_string()),
                ("Content-Type", "text/plain;charset=utf-8".to_string()),
            ],
            body,
        }
    }

    #[test]
    fn test_response_new() {
        let response = Response::new();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.information(), "OK");
    }

    #[test]
    fn test_response_as_bytes_basic() {
        let response_str = text(&Response::new());
        assert!(response_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response_str.contains("Content-Length: 0"));
        assert!(response_str.contains("Server: webstatic"));
        assert!(response_str.contains("Date: "));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_from_serve_with_bytes() {
        let response = Response::from_serve(serve(200, Body::Bytes(Bytes::from("Hello"))), false, 0);
        let response_str = text(&response);

        assert!(response_str.contains("ETag: \"abc\""));
        assert!(response_str.contains("Content-Type: text/plain;charset=utf-8"));
        assert!(response_str.contains("Content-Length: 5"));
        assert!(response_str.ends_with("Hello"));
        assert!(response.stream().is_none());
    }

    #[test]
    fn test_from_serve_headonly_keeps_length() {
        let response = Response::from_serve(serve(200, Body::Bytes(Bytes::from("Hello"))), true, 0);
        let response_str = text(&response);

        assert!(response_str.contains("Content-Length: 5"));
        assert!(!response_str.ends_with("Hello"));
    }

    #[test]
    fn test_from_serve_streams_large_body() {
        let body = Body::File {
            path: PathBuf::from("/srv/big.bin"),
            offset: 100,
            length: 50,
        };
        let response = Response::from_serve(serve(206, body), false, 0);

        assert_eq!(response.status_code(), 206);
        assert_eq!(response.information(), "Partial Content");
        assert_eq!(response.content_length(), 50);
        assert_eq!(
            response.stream(),
            Some(&StreamRange {
                path: PathBuf::from("/srv/big.bin"),
                offset: 100,
                length: 50,
            })
        );
    }

    #[test]
    fn test_head_error_page_has_no_body() {
        let response = Response::from_lookup_error(&LookupError::NotFound, 0).head_only();
        let response_str = text(&response);
        assert!(response_str.starts_with("HTTP/1.1 404 Not Found"));
        assert!(!response_str.contains("Content-Length: 0"));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_not_modified_has_no_length() {
        let response = Response::from_serve(serve(304, Body::Empty), false, 0);
        let response_str = text(&response);
        assert!(response_str.starts_with("HTTP/1.1 304 Not Modified"));
        assert!(!response_str.contains("Content-Length"));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_unsatisfiable_gets_error_page_and_keeps_range() {
        let mut result = serve(416, Body::Empty);
        result.headers.push(("Content-Range", "bytes */100".to_string()));
        let response = Response::from_serve(result, false, 0);
        let response_str = text(&response);

        assert!(response_str.contains("Content-Range: bytes */100"));
        assert!(response_str.contains("Content-Type: text/html;charset=utf-8"));
        assert!(!response_str.contains("text/plain"));
        assert!(response_str.contains("Range Not Satisfiable"));
    }

    #[test]
    fn test_from_lookup_error() {
        let not_found = Response::from_lookup_error(&LookupError::NotFound, 0);
        assert_eq!(not_found.status_code(), 404);

        let err = LookupError::Read {
            path: PathBuf::from("/srv/x"),
            source: std::sync::Arc::new(io::Error::from(io::ErrorKind::PermissionDenied)),
        };
        assert_eq!(Response::from_lookup_error(&err, 0).status_code(), 500);
    }

    #[test]
    fn test_options_and_405_carry_allow() {
        assert!(text(&Response::options()).contains("Allow: GET, HEAD, OPTIONS"));
        let response = Response::from_status_code(405, None);
        assert!(text(&response).contains("Allow: GET, HEAD, OPTIONS"));
        assert!(!text(&Response::from_status_code(404, None)).contains("Allow:"));
    }

    #[test]
    fn test_response_status_code_various() {
        for (code, expected_info) in [
            (200, "OK"),
            (206, "Partial Content"),
            (304, "Not Modified"),
            (400, "Bad Request"),
            (404, "Not Found"),
            (416, "Range Not Satisfiable"),
            (500, "Internal Server Error"),
        ] {
            let mut response = Response::new();
            response.set_code(code);
            assert_eq!(response.status_code(), code);
            assert_eq!(response.information(), expected_info);
        }
    }
}
