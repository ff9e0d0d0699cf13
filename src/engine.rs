// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 静态资源引擎
//!
//! 一个 [`StaticEngine`] 对应一组挂载的静态根目录，内部维护三个以解析后绝对路径为键的缓存：
//!
//! | 缓存 | 内容 | 失效方式 |
//! |------|------|----------|
//! | 元数据 | stat 结果（含“不存在”） | 正/负两种 TTL、LRU、显式失效 |
//! | 内容 | 小文件的原始字节 | 字节预算 + 条目数 LRU、与元数据不一致时重读 |
//! | ETag | 校验器字符串 | 条目数 LRU、与元数据不一致时重算 |
//!
//! 映射表与运行参数组成不可变的 [`Snapshot`]，重新配置时构建新快照并整体替换，
//! 读者要么看到完整的旧表，要么看到完整的新表。

use std::{
    mem,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use bytes::Bytes;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde_derive::Serialize;

use crate::{
    cache::{CacheLimits, CacheStat, ShardedLru, Weighted},
    config::{EngineConfig, PartialEngineConfig},
    etag::{self, strong_etag, weak_etag},
    exception::LookupError,
    fs::{FileStat, FileSystem, TokioFs},
    immutable::is_immutable,
    logger::EngineLogger,
    param::mime_for,
    range::{content_range, parse_range, unsatisfied_range, RangeOutcome, RangeRequest},
    resolver::Mappings,
    util::http_date,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlKind {
    Positive,
    Negative,
}

/// 元数据缓存条目
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    pub exists: bool,
    pub is_file: bool,
    pub size: u64,
    pub modified: SystemTime,
    pub cached_at: Instant,
    pub ttl_kind: TtlKind,
}

impl MetadataEntry {
    fn found(stat: FileStat) -> Self {
        Self {
            exists: true,
            is_file: stat.is_file,
            size: stat.size,
            modified: stat.modified,
            cached_at: Instant::now(),
            ttl_kind: TtlKind::Positive,
        }
    }

    fn missing() -> Self {
        Self {
            exists: false,
            is_file: false,
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
            cached_at: Instant::now(),
            ttl_kind: TtlKind::Negative,
        }
    }

    fn is_fresh(&self, settings: &Settings) -> bool {
        let ttl = match self.ttl_kind {
            TtlKind::Positive => settings.positive_ttl,
            TtlKind::Negative => settings.negative_ttl,
        };
        self.cached_at.elapsed() < ttl
    }

    fn version(&self) -> Version {
        Version {
            size: self.size,
            modified: self.modified,
        }
    }
}

impl Weighted for MetadataEntry {
    fn weight(&self) -> u64 {
        mem::size_of::<Self>() as u64
    }
}

/// 内容与 ETag 条目据以生成的文件版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Version {
    size: u64,
    modified: SystemTime,
}

#[derive(Debug, Clone)]
struct ContentEntry {
    content: Bytes,
    version: Version,
}

impl Weighted for ContentEntry {
    fn weight(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Debug, Clone)]
struct EtagEntry {
    etag: String,
    version: Version,
}

impl Weighted for EtagEntry {
    fn weight(&self) -> u64 {
        (self.etag.len() + mem::size_of::<Version>()) as u64
    }
}

/// 快照中的运行参数
#[derive(Debug, Clone)]
struct Settings {
    small_file_threshold: u64,
    positive_ttl: Duration,
    negative_ttl: Duration,
    enable_range_requests: bool,
    cache_control: String,
    immutable_cache_control: String,
}

impl Settings {
    fn from_config(config: &EngineConfig, logger: Option<&dyn EngineLogger>) -> Self {
        let positive_ttl = config.positive_ttl();
        let mut negative_ttl = config.negative_ttl();
        if negative_ttl > positive_ttl {
            if let Some(logger) = logger {
                logger.warn(&format!(
                    "negative_ttl_ms（{}）大于positive_ttl_ms（{}），已截断",
                    config.negative_ttl_ms, config.positive_ttl_ms
                ));
            }
            negative_ttl = positive_ttl;
        }
        Self {
            small_file_threshold: config.small_file_threshold,
            positive_ttl,
            negative_ttl,
            enable_range_requests: config.enable_range_requests,
            cache_control: config.cache_control.clone(),
            immutable_cache_control: config.immutable_cache_control.clone(),
        }
    }
}

/// 映射表与运行参数的不可变快照
#[derive(Debug)]
pub struct Snapshot {
    mappings: Mappings,
    settings: Settings,
}

impl Snapshot {
    fn build(config: &EngineConfig, logger: Option<&dyn EngineLogger>) -> Self {
        Self {
            mappings: Mappings::build(config, logger),
            settings: Settings::from_config(config, logger),
        }
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }
}

/// `get_file` 的选项
#[derive(Debug, Clone, Copy)]
pub struct LookupOptions {
    /// 对小文件同时返回内容
    pub load_content: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self { load_content: true }
    }
}

/// 一次成功查找的结果
#[derive(Debug, Clone)]
pub struct FileLookup {
    /// 解析后的绝对路径
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub etag: String,
    /// 小文件且请求了内容时才有值
    pub content: Option<Bytes>,
    pub content_type: &'static str,
    pub cache_control: String,
    pub immutable: bool,
    /// 不超过小文件阈值，响应体从内存发送
    pub small_file: bool,
}

impl FileLookup {
    pub fn is_weak(&self) -> bool {
        etag::is_weak(&self.etag)
    }

    fn version(&self) -> Version {
        Version {
            size: self.size,
            modified: self.modified,
        }
    }
}

/// 条件请求头
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalHeaders<'a> {
    pub if_none_match: Option<&'a str>,
}

/// 响应体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Bytes(Bytes),
    /// 大文件，由宿主从磁盘流式发送 `[offset, offset + length)`
    File {
        path: PathBuf,
        offset: u64,
        length: u64,
    },
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `handle_request` 的结论，宿主据此写出 HTTP 响应
#[derive(Debug, Clone)]
pub struct ServeResult {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Body,
}

impl ServeResult {
    fn bare(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// 按名称（不区分大小写）查找响应头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// 三个缓存的统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub metadata: CacheStat,
    pub content: CacheStat,
    pub identifier: CacheStat,
}

pub struct EngineBuilder {
    config: EngineConfig,
    fs: Option<Arc<dyn FileSystem>>,
    logger: Option<Arc<dyn EngineLogger>>,
}

impl EngineBuilder {
    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn EngineLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> StaticEngine {
        let config = self.config;
        let shards = config.cache_shards;
        let snapshot = Snapshot::build(&config, self.logger.as_deref());
        StaticEngine {
            snapshot: RwLock::new(Arc::new(snapshot)),
            metadata: ShardedLru::new(metadata_limits(&config), shards),
            content: ShardedLru::new(content_limits(&config), shards),
            etags: ShardedLru::new(etag_limits(&config), shards),
            config: Mutex::new(config),
            fs: self.fs.unwrap_or_else(|| Arc::new(TokioFs)),
            logger: self.logger,
        }
    }
}

fn metadata_limits(config: &EngineConfig) -> CacheLimits {
    CacheLimits::items(config.metadata_cache_items)
}

fn content_limits(config: &EngineConfig) -> CacheLimits {
    CacheLimits {
        max_items: config.content_cache_items,
        max_bytes: config.content_cache_bytes,
    }
}

fn etag_limits(config: &EngineConfig) -> CacheLimits {
    CacheLimits::items(config.etag_cache_items)
}

pub struct StaticEngine {
    snapshot: RwLock<Arc<Snapshot>>,
    /// 当前生效的原始配置；同时串行化所有重新配置操作
    config: Mutex<EngineConfig>,
    metadata: ShardedLru<MetadataEntry>,
    content: ShardedLru<ContentEntry>,
    etags: ShardedLru<EtagEntry>,
    fs: Arc<dyn FileSystem>,
    logger: Option<Arc<dyn EngineLogger>>,
}

impl StaticEngine {
    /// 使用 Tokio 文件系统、不注入日志
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            fs: None,
            logger: None,
        }
    }

    /// 当前快照。持有期间不受并发重新配置影响
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    pub fn config(&self) -> EngineConfig {
        self.config.lock().clone()
    }

    fn warn(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger.warn(message);
        }
    }

    /// 查找文件：解析路径 → 元数据 → ETag（必要时读取内容）
    pub async fn get_file(&self, path: &str, options: LookupOptions) -> Result<FileLookup, LookupError> {
        let snapshot = self.snapshot();
        self.lookup(&snapshot, path, options).await
    }

    async fn lookup(
        &self,
        snapshot: &Snapshot,
        path: &str,
        options: LookupOptions,
    ) -> Result<FileLookup, LookupError> {
        let settings = &snapshot.settings;
        let Some(resolved) = snapshot.mappings.resolve(path) else {
            debug!("请求路径{:?}无法映射，视为不存在", path);
            return Err(LookupError::NotFound);
        };

        let meta = self.metadata_for(&resolved.path, settings).await?;
        if !meta.exists || !meta.is_file {
            return Err(LookupError::NotFound);
        }

        let small_file = meta.size <= settings.small_file_threshold;
        let (etag, content) = self
            .etag_for(&resolved.path, meta.version(), small_file, options.load_content)
            .await?;

        let immutable = is_immutable(&resolved.path, resolved.detect_immutable);
        let cache_control = match immutable {
            true => settings.immutable_cache_control.clone(),
            false => settings.cache_control.clone(),
        };
        Ok(FileLookup {
            content_type: mime_for(&resolved.path),
            size: content.as_ref().map_or(meta.size, |c| c.len() as u64),
            modified: meta.modified,
            path: resolved.path,
            etag,
            content,
            cache_control,
            immutable,
            small_file,
        })
    }

    async fn metadata_for(&self, path: &Path, settings: &Settings) -> Result<MetadataEntry, LookupError> {
        let previous = self.metadata.get(path);
        if let Some(entry) = &previous {
            if entry.is_fresh(settings) {
                return Ok(entry.clone());
            }
        }

        let entry = match self.fs.stat(path).await {
            Ok(stat) => MetadataEntry::found(stat),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataEntry::missing(),
            Err(e) => {
                self.warn(&format!("无法获取{}的元数据：{}", path.display(), e));
                return Err(LookupError::read(path.to_path_buf(), e));
            }
        };

        // 文件版本变了，派生出的内容与 ETag 一并作废
        if let Some(old) = previous {
            if old.exists != entry.exists || old.version() != entry.version() {
                debug!("{}已变化，丢弃内容与ETag缓存", path.display());
                self.content.remove(path);
                self.etags.remove(path);
            }
        }
        self.metadata.insert(path.to_path_buf(), entry.clone());
        Ok(entry)
    }

    async fn etag_for(
        &self,
        path: &Path,
        version: Version,
        small_file: bool,
        load_content: bool,
    ) -> Result<(String, Option<Bytes>), LookupError> {
        if let Some(entry) = self.etags.get(path).filter(|e| e.version == version) {
            // 阈值变化后仍沿用已缓存的强/弱选择，直到条目被淘汰或失效
            let content = match small_file && load_content {
                true => Some(self.content_for(path, version).await?),
                false => None,
            };
            return Ok((entry.etag, content));
        }

        if !small_file {
            let etag = weak_etag(version.size, version.modified);
            self.etags.insert(
                path.to_path_buf(),
                EtagEntry {
                    etag: etag.clone(),
                    version,
                },
            );
            return Ok((etag, None));
        }

        let content = self.content_for(path, version).await?;
        let etag = strong_etag(&content);
        if content.len() as u64 == version.size {
            self.etags.insert(
                path.to_path_buf(),
                EtagEntry {
                    etag: etag.clone(),
                    version,
                },
            );
        }
        Ok((etag, load_content.then_some(content)))
    }

    async fn content_for(&self, path: &Path, version: Version) -> Result<Bytes, LookupError> {
        if let Some(entry) = self.content.get(path).filter(|e| e.version == version) {
            return Ok(entry.content);
        }

        let content = match self.fs.read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.metadata.insert(path.to_path_buf(), MetadataEntry::missing());
                self.content.remove(path);
                self.etags.remove(path);
                return Err(LookupError::NotFound);
            }
            Err(e) => {
                self.warn(&format!("无法读取{}：{}", path.display(), e));
                return Err(LookupError::read(path.to_path_buf(), e));
            }
        };

        if content.len() as u64 != version.size {
            // stat 与 read 之间文件被改写：不缓存，下一次请求重新 stat
            debug!(
                "{}读取到{}字节，与元数据中的{}字节不一致",
                path.display(),
                content.len(),
                version.size
            );
            self.metadata.remove(path);
            return Ok(content);
        }
        self.content.insert(
            path.to_path_buf(),
            ContentEntry {
                content: content.clone(),
                version,
            },
        );
        Ok(content)
    }

    /// 处理一次请求：条件判断优先于范围判断
    pub async fn handle_request(
        &self,
        path: &str,
        conditional: ConditionalHeaders<'_>,
        range: Option<&str>,
    ) -> Result<ServeResult, LookupError> {
        let snapshot = self.snapshot();
        let settings = &snapshot.settings;
        let lookup = self
            .lookup(&snapshot, path, LookupOptions { load_content: false })
            .await?;

        let mut headers = vec![
            ("ETag", lookup.etag.clone()),
            ("Cache-Control", lookup.cache_control.clone()),
            ("Last-Modified", http_date(lookup.modified)),
        ];

        if let Some(if_none_match) = conditional.if_none_match {
            if etag::if_none_match(if_none_match, &lookup.etag) {
                debug!("{}命中If-None-Match，返回304", path);
                return Ok(ServeResult {
                    status: 304,
                    headers,
                    body: Body::Empty,
                });
            }
        }

        headers.push(("Content-Type", lookup.content_type.to_string()));
        let range = match range {
            Some(header) if settings.enable_range_requests => {
                headers.push(("Accept-Ranges", "bytes".to_string()));
                match parse_range(header) {
                    Ok(RangeRequest::Single(range)) => Some(range),
                    Ok(RangeRequest::Multiple) => {
                        debug!("{}请求了多个区间，按完整响应处理", path);
                        None
                    }
                    Err(e) => {
                        debug!("{}的Range头{:?}非法：{}", path, header, e);
                        return Ok(ServeResult::bare(400));
                    }
                }
            }
            None if settings.enable_range_requests => {
                headers.push(("Accept-Ranges", "bytes".to_string()));
                None
            }
            _ => None,
        };

        let Some(range) = range else {
            let body = self.body(&lookup, 0, lookup.size).await?;
            return Ok(ServeResult {
                status: 200,
                headers,
                body,
            });
        };

        match range.evaluate(lookup.size) {
            RangeOutcome::Satisfiable { start, end } => {
                headers.push(("Content-Range", content_range(start, end, lookup.size)));
                let body = self.body(&lookup, start, end - start + 1).await?;
                Ok(ServeResult {
                    status: 206,
                    headers,
                    body,
                })
            }
            RangeOutcome::Unsatisfiable => {
                headers.push(("Content-Range", unsatisfied_range(lookup.size)));
                Ok(ServeResult {
                    status: 416,
                    headers,
                    body: Body::Empty,
                })
            }
        }
    }

    async fn body(&self, lookup: &FileLookup, offset: u64, length: u64) -> Result<Body, LookupError> {
        if length == 0 {
            return Ok(Body::Empty);
        }
        if lookup.small_file {
            let content = self.content_for(&lookup.path, lookup.version()).await?;
            let end = offset + length;
            if end <= content.len() as u64 {
                return Ok(Body::Bytes(content.slice(offset as usize..end as usize)));
            }
        }
        Ok(Body::File {
            path: lookup.path.clone(),
            offset,
            length,
        })
    }

    /// 把响应体读成字节（`Body::File` 会访问磁盘）
    pub async fn read_body(&self, body: &Body) -> Result<Bytes, LookupError> {
        match body {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes(bytes) => Ok(bytes.clone()),
            Body::File {
                path,
                offset,
                length,
            } => self
                .fs
                .read_range(path, *offset, *length)
                .await
                .map_err(|e| LookupError::read(path.clone(), e)),
        }
    }

    /// 按请求路径失效。路径无法映射时返回 `false`
    pub fn invalidate_file(&self, path: &str) -> bool {
        match self.snapshot().mappings.resolve(path) {
            Some(resolved) => {
                self.invalidate_resolved(&resolved.path);
                true
            }
            None => false,
        }
    }

    /// 从三个缓存中移除一个解析后的路径
    pub fn invalidate_resolved(&self, path: &Path) {
        debug!("失效缓存：{}", path.display());
        self.metadata.remove(path);
        self.content.remove(path);
        self.etags.remove(path);
    }

    pub fn clear_caches(&self) {
        self.metadata.clear();
        self.content.clear();
        self.etags.clear();
    }

    /// 用全新的配置替换当前配置
    pub fn replace_config(&self, config: EngineConfig) {
        let mut current = self.config.lock();
        self.reconcile(&mut current, config);
    }

    /// 在当前配置上应用增量
    pub fn update_config(&self, partial: &PartialEngineConfig) {
        let mut current = self.config.lock();
        let merged = partial.apply_to(&current);
        self.reconcile(&mut current, merged);
    }

    fn reconcile(&self, current: &mut EngineConfig, config: EngineConfig) {
        let next = Arc::new(Snapshot::build(&config, self.logger.as_deref()));
        let previous = mem::replace(&mut *self.snapshot.write(), Arc::clone(&next));

        self.metadata.resize(metadata_limits(&config));
        self.content.resize(content_limits(&config));
        self.etags.resize(etag_limits(&config));

        if previous.mappings.folders() != next.mappings.folders() {
            info!("目录映射已变化，清空全部缓存");
            self.clear_caches();
        } else {
            let old_assets = previous.mappings.single_assets();
            let new_assets = next.mappings.single_assets();
            for key in old_assets.keys().chain(new_assets.keys()) {
                let (old, new) = (old_assets.get(key), new_assets.get(key));
                if old == new {
                    continue;
                }
                debug!("单文件映射{}已变化", key);
                for target in [old, new].into_iter().flatten() {
                    self.invalidate_resolved(target);
                }
            }
        }
        *current = config;
    }

    pub fn cache_stats(&self) -> EngineStats {
        EngineStats {
            metadata: self.metadata.stats(),
            content: self.content.stats(),
            identifier: self.etags.stats(),
        }
    }
}
