// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 引擎访问文件系统的唯一入口。
//!
//! 生产环境使用基于 `tokio::fs` 的 [`TokioFs`]；测试可以替换成计数或模拟实现，
//! 以验证“命中缓存时不触碰文件系统”之类的性质。

use std::{
    io::{self, SeekFrom},
    path::Path,
    time::SystemTime,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// 一次 stat 调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: SystemTime,
    pub is_file: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// 获取文件元数据。文件不存在时返回 `ErrorKind::NotFound`。
    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// 读取整个文件
    async fn read(&self, path: &Path) -> io::Result<Bytes>;

    /// 读取 `[offset, offset + length)` 区间
    async fn read_range(&self, path: &Path, offset: u64, length: u64) -> io::Result<Bytes>;
}

/// 基于 Tokio 异步文件 API 的实现
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

#[async_trait]
impl FileSystem for TokioFs {
    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            size: metadata.len(),
            // 个别平台拿不到修改时间，退化为纪元时间，弱校验器仍然可用
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_file: metadata.is_file(),
        })
    }

    async fn read(&self, path: &Path) -> io::Result<Bytes> {
        tokio::fs::read(path).await.map(Bytes::from)
    }

    async fn read_range(&self, path: &Path, offset: u64, length: u64) -> io::Result<Bytes> {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buffer = Vec::with_capacity(length as usize);
        file.take(length).read_to_end(&mut buffer).await?;
        if (buffer.len() as u64) < length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank while reading range",
            ));
        }
        Ok(Bytes::from(buffer))
    }
}
