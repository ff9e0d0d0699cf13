// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 范围请求
//!
//! 只支持单个字节区间 `bytes=start-end`（允许省略起点或终点）。
//! 多区间请求按完整响应处理。

use std::fmt;

/// `Range` 头语法错误，对应 400
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedRange;

impl fmt::Display for MalformedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed Range header")
    }
}

impl std::error::Error for MalformedRange {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end`
    Bounded { start: u64, end: u64 },
    /// `bytes=start-`
    From { start: u64 },
    /// `bytes=-length`，最后 `length` 个字节
    Suffix { length: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    Single(ByteRange),
    /// 多个区间，不支持，返回完整内容
    Multiple,
}

/// 针对具体文件大小求值后的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// 闭区间 `[start, end]`
    Satisfiable { start: u64, end: u64 },
    Unsatisfiable,
}

pub fn parse_range(header: &str) -> Result<RangeRequest, MalformedRange> {
    let header = header.trim();
    let (unit, set) = header.split_once('=').ok_or(MalformedRange)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(MalformedRange);
    }

    let mut ranges = set
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_one)
        .collect::<Result<Vec<_>, _>>()?;

    match ranges.len() {
        0 => Err(MalformedRange),
        1 => Ok(RangeRequest::Single(ranges.remove(0))),
        _ => Ok(RangeRequest::Multiple),
    }
}

fn parse_one(spec: &str) -> Result<ByteRange, MalformedRange> {
    let (start, end) = spec.split_once('-').ok_or(MalformedRange)?;
    let (start, end) = (start.trim(), end.trim());
    match (start.is_empty(), end.is_empty()) {
        (true, true) => Err(MalformedRange),
        (true, false) => Ok(ByteRange::Suffix {
            length: parse_number(end)?,
        }),
        (false, true) => Ok(ByteRange::From {
            start: parse_number(start)?,
        }),
        (false, false) => Ok(ByteRange::Bounded {
            start: parse_number(start)?,
            end: parse_number(end)?,
        }),
    }
}

fn parse_number(text: &str) -> Result<u64, MalformedRange> {
    // u64::from_str 接受前导 '+'，这里只认纯数字
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedRange);
    }
    text.parse().map_err(|_| MalformedRange)
}

impl ByteRange {
    /// 起点或终点超出 `[0, size)`、或起点大于终点时不可满足
    pub fn evaluate(self, size: u64) -> RangeOutcome {
        match self {
            ByteRange::Bounded { start, end } if start <= end && end < size => {
                RangeOutcome::Satisfiable { start, end }
            }
            ByteRange::From { start } if start < size => RangeOutcome::Satisfiable {
                start,
                end: size - 1,
            },
            ByteRange::Suffix { length } if length > 0 && size > 0 => RangeOutcome::Satisfiable {
                start: size.saturating_sub(length),
                end: size - 1,
            },
            _ => RangeOutcome::Unsatisfiable,
        }
    }
}

pub fn content_range(start: u64, end: u64, size: u64) -> String {
    format!("bytes {}-{}/{}", start, end, size)
}

pub fn unsatisfied_range(size: u64) -> String {
    format!("bytes */{}", size)
}
