// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 配置模块
//!
//! - [`Config`]：宿主服务器的运行参数，从 TOML 文件加载。
//! - [`EngineConfig`]：静态资源引擎的完整配置（映射表 + 缓存参数），对应 TOML 中的 `[engine]` 表。
//! - [`PartialEngineConfig`]：增量更新，所有字段可选。

use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use log::warn;
use serde_derive::{Deserialize, Serialize};

use crate::{
    exception::Exception,
    param::{DEFAULT_CACHE_CONTROL, HTML_INDEX, IMMUTABLE_CACHE_CONTROL},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_www_root")]
    www_root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default)]
    engine: EngineConfig,
}

fn default_www_root() -> String {
    "static".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_chunk_size() -> usize {
    262144 // 256KB
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: default_www_root(),
            port: default_port(),
            worker_threads: num_cpus::get(),
            local: default_local(),
            chunk_size: default_chunk_size(),
            engine: EngineConfig::default(),
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let text = fs::read_to_string(filename).map_err(|source| Exception::ConfigUnreadable {
            path: filename.to_string(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| Exception::ConfigInvalid {
            path: filename.to_string(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(text)?;
        if config.worker_threads == 0 {
            config.worker_threads = num_cpus::get();
        }
        if config.chunk_size == 0 {
            warn!("chunk_size被设置为0，将改为默认值{}", default_chunk_size());
            config.chunk_size = default_chunk_size();
        }
        Ok(config)
    }

    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 引擎配置。未配置任何目录映射时，把 `www_root` 挂载到 `/`，
    /// 并让 `/` 本身指向其中的 `index.html`。
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = self.engine.clone();
        if engine.folders.is_empty() {
            engine.folders.insert(
                "/".to_string(),
                FolderConfig {
                    path: self.www_root.clone(),
                    detect_immutable: true,
                },
            );
            let index = Path::new(&self.www_root).join(HTML_INDEX);
            engine
                .single_assets
                .entry("/".to_string())
                .or_insert_with(|| index.to_string_lossy().into_owned());
        }
        engine
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// 目录映射表中的一项
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FolderConfig {
    /// 文件系统上的目录
    pub path: String,
    /// 是否识别带指纹的文件名并下发长期缓存指令
    #[serde(default)]
    pub detect_immutable: bool,
}

impl FolderConfig {
    pub fn new(path: impl Into<String>, detect_immutable: bool) -> Self {
        Self {
            path: path.into(),
            detect_immutable,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// 不超过该大小（字节）的文件读入内存、使用强校验器
    #[serde(default = "default_small_file_threshold")]
    pub small_file_threshold: u64,
    /// 文件存在时元数据缓存的有效期
    #[serde(default = "default_positive_ttl_ms")]
    pub positive_ttl_ms: u64,
    /// 文件不存在时元数据缓存的有效期，不得长于 `positive_ttl_ms`
    #[serde(default = "default_negative_ttl_ms")]
    pub negative_ttl_ms: u64,
    #[serde(default = "default_metadata_cache_items")]
    pub metadata_cache_items: usize,
    #[serde(default = "default_content_cache_items")]
    pub content_cache_items: usize,
    #[serde(default = "default_content_cache_bytes")]
    pub content_cache_bytes: u64,
    #[serde(default = "default_etag_cache_items")]
    pub etag_cache_items: usize,
    /// 每个缓存的分片数
    #[serde(default = "default_cache_shards")]
    pub cache_shards: usize,
    #[serde(default = "default_enable_range_requests")]
    pub enable_range_requests: bool,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    #[serde(default = "default_immutable_cache_control")]
    pub immutable_cache_control: String,
    /// 精确路径 → 文件
    #[serde(default)]
    pub single_assets: BTreeMap<String, String>,
    /// 路径前缀 → 目录
    #[serde(default)]
    pub folders: BTreeMap<String, FolderConfig>,
}

fn default_small_file_threshold() -> u64 {
    1048576 // 1MB
}

fn default_positive_ttl_ms() -> u64 {
    5000
}

fn default_negative_ttl_ms() -> u64 {
    1000
}

fn default_metadata_cache_items() -> usize {
    10000
}

fn default_content_cache_items() -> usize {
    1000
}

fn default_content_cache_bytes() -> u64 {
    67108864 // 64MB
}

fn default_etag_cache_items() -> usize {
    10000
}

fn default_cache_shards() -> usize {
    16
}

fn default_enable_range_requests() -> bool {
    true
}

fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}

fn default_immutable_cache_control() -> String {
    IMMUTABLE_CACHE_CONTROL.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            small_file_threshold: default_small_file_threshold(),
            positive_ttl_ms: default_positive_ttl_ms(),
            negative_ttl_ms: default_negative_ttl_ms(),
            metadata_cache_items: default_metadata_cache_items(),
            content_cache_items: default_content_cache_items(),
            content_cache_bytes: default_content_cache_bytes(),
            etag_cache_items: default_etag_cache_items(),
            cache_shards: default_cache_shards(),
            enable_range_requests: default_enable_range_requests(),
            cache_control: default_cache_control(),
            immutable_cache_control: default_immutable_cache_control(),
            single_assets: BTreeMap::new(),
            folders: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_single_asset(mut self, url: impl Into<String>, file: impl Into<String>) -> Self {
        self.single_assets.insert(url.into(), file.into());
        self
    }

    pub fn with_folder(mut self, prefix: impl Into<String>, folder: FolderConfig) -> Self {
        self.folders.insert(prefix.into(), folder);
        self
    }

    pub fn positive_ttl(&self) -> Duration {
        Duration::from_millis(self.positive_ttl_ms)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_millis(self.negative_ttl_ms)
    }
}

/// 增量配置。未出现的字段保持原值；映射表按键合并，`remove_*` 中列出的键被删除。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PartialEngineConfig {
    pub small_file_threshold: Option<u64>,
    pub positive_ttl_ms: Option<u64>,
    pub negative_ttl_ms: Option<u64>,
    pub metadata_cache_items: Option<usize>,
    pub content_cache_items: Option<usize>,
    pub content_cache_bytes: Option<u64>,
    pub etag_cache_items: Option<usize>,
    pub enable_range_requests: Option<bool>,
    pub cache_control: Option<String>,
    pub immutable_cache_control: Option<String>,
    pub single_assets: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub remove_single_assets: Vec<String>,
    pub folders: Option<BTreeMap<String, FolderConfig>>,
    #[serde(default)]
    pub remove_folders: Vec<String>,
}

impl PartialEngineConfig {
    /// 在 `base` 的基础上应用本次增量，得到新的完整配置
    pub fn apply_to(&self, base: &EngineConfig) -> EngineConfig {
        let mut merged = base.clone();
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if let Some(value) = &self.$field {
                    merged.$field = value.clone();
                })*
            };
        }
        overlay!(
            small_file_threshold,
            positive_ttl_ms,
            negative_ttl_ms,
            metadata_cache_items,
            content_cache_items,
            content_cache_bytes,
            etag_cache_items,
            enable_range_requests,
            cache_control,
            immutable_cache_control
        );

        if let Some(assets) = &self.single_assets {
            merged
                .single_assets
                .extend(assets.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        for key in &self.remove_single_assets {
            merged.single_assets.remove(key);
        }
        if let Some(folders) = &self.folders {
            merged
                .folders
                .extend(folders.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        for key in &self.remove_folders {
            merged.folders.remove(key);
        }
        merged
    }
}
