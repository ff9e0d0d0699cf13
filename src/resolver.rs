// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径解析
//!
//! 把请求路径映射到文件系统上的绝对路径。映射表分两张：
//! 1. 单文件表：请求路径精确匹配 → 文件；
//! 2. 目录表：按最长前缀匹配 → 目录，剩余部分拼接到目录之后。
//!
//! 这里是安全边界：含空字节、`..` 段或反斜杠的路径一律视为不存在，
//! 且在触碰文件系统之前就被拒绝。

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use log::debug;
use percent_encoding::percent_decode_str;

use crate::{config::EngineConfig, logger::EngineLogger};

/// 目录映射表中的一项（已校验）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMount {
    pub prefix: String,
    pub dir: PathBuf,
    pub detect_immutable: bool,
}

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    /// 命中的目录开启了指纹识别
    pub detect_immutable: bool,
}

/// 某一时刻的完整映射表快照。构造后不再修改，更新配置时整体替换。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mappings {
    single_assets: HashMap<String, PathBuf>,
    /// 按前缀长度降序排列，便于最长前缀匹配
    folders: Vec<FolderMount>,
}

impl Mappings {
    /// 从配置构建映射表。非法条目被跳过并告警，其余条目照常生效。
    pub fn build(config: &EngineConfig, logger: Option<&dyn EngineLogger>) -> Self {
        let reject = |kind: &str, key: &str, target: &str| {
            if let Some(logger) = logger {
                logger.warn(&format!(
                    "忽略非法的{}映射：{:?} -> {:?}（包含空字节或路径穿越）",
                    kind, key, target
                ));
            }
        };

        let mut single_assets = HashMap::with_capacity(config.single_assets.len());
        for (key, target) in &config.single_assets {
            if is_unsafe(key) || is_unsafe_target(target) {
                reject("单文件", key, target);
                continue;
            }
            single_assets.insert(normalize_key(key), PathBuf::from(target));
        }

        let mut folders = Vec::with_capacity(config.folders.len());
        for (prefix, folder) in &config.folders {
            if is_unsafe(prefix) || is_unsafe_target(&folder.path) {
                reject("目录", prefix, &folder.path);
                continue;
            }
            let prefix = normalize_prefix(prefix);
            folders.retain(|mount: &FolderMount| mount.prefix != prefix);
            folders.push(FolderMount {
                prefix,
                dir: PathBuf::from(&folder.path),
                detect_immutable: folder.detect_immutable,
            });
        }
        folders.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()).then(a.prefix.cmp(&b.prefix)));

        Self {
            single_assets,
            folders,
        }
    }

    pub fn single_assets(&self) -> &HashMap<String, PathBuf> {
        &self.single_assets
    }

    pub fn folders(&self) -> &[FolderMount] {
        &self.folders
    }

    /// 解析请求路径。无法安全映射时返回 `None`，不会访问文件系统。
    pub fn resolve(&self, raw_path: &str) -> Option<Resolved> {
        let path = clean_request_path(raw_path)?;

        if let Some(file) = self.single_assets.get(&path) {
            return Some(Resolved {
                path: file.clone(),
                detect_immutable: false,
            });
        }

        for mount in &self.folders {
            let Some(rest) = strip_prefix(&path, &mount.prefix) else {
                continue;
            };
            let mut joined = mount.dir.clone();
            let mut pushed = false;
            for segment in rest.split('/').filter(|s| !s.is_empty() && *s != ".") {
                joined.push(segment);
                pushed = true;
            }
            // 目录本身不对外提供（不做目录列表）
            if !pushed || !joined.starts_with(&mount.dir) {
                debug!("请求路径{:?}落在目录{}上，视为不存在", raw_path, mount.prefix);
                return None;
            }
            return Some(Resolved {
                path: joined,
                detect_immutable: mount.detect_immutable,
            });
        }
        None
    }
}

/// 去掉查询串与片段，百分号解码并做安全检查。
///
/// 返回 `None` 表示路径非法（空字节、`..` 段、反斜杠、解码后不是 UTF-8）。
pub fn clean_request_path(raw: &str) -> Option<String> {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    let raw = &raw[..end];
    if is_unsafe(raw) {
        return None;
    }
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    if is_unsafe(&decoded) {
        return None;
    }
    Some(normalize_key(&decoded))
}

fn is_unsafe(path: &str) -> bool {
    path.contains('\0') || path.contains('\\') || path.split('/').any(|segment| segment == "..")
}

fn is_unsafe_target(target: &str) -> bool {
    target.is_empty()
        || target.contains('\0')
        || Path::new(target)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
}

fn normalize_key(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{}", key)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let key = normalize_key(prefix);
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 只在路径段边界上匹配前缀：`/assets` 匹配 `/assets/x` 但不匹配 `/assetsx`
fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::FolderConfig, logger::MockEngineLogger};

    fn mappings() -> Mappings {
        let config = EngineConfig::default()
            .with_single_asset("/", "/srv/app/index.html")
            .with_single_asset("/robots.txt", "/srv/app/robots.txt")
            .with_folder("/", FolderConfig::new("/srv/public", false))
            .with_folder("/assets/", FolderConfig::new("/srv/build/assets", true))
            .with_folder("/assets/img", FolderConfig::new("/srv/images", false));
        Mappings::build(&config, None)
    }

    #[test]
    fn test_single_asset_exact_match_wins() {
        let resolved = mappings().resolve("/robots.txt").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/srv/app/robots.txt"));
        assert!(!resolved.detect_immutable);

        let resolved = mappings().resolve("/?utm=1").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/srv/app/index.html"));
    }

    #[test]
    fn test_longest_prefix_match() {
        let m = mappings();
        let resolved = m.resolve("/assets/img/logo.png").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/srv/images/logo.png"));

        let resolved = m.resolve("/assets/app.1a2b3c4d.js#top").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/srv/build/assets/app.1a2b3c4d.js"));
        assert!(resolved.detect_immutable);

        let resolved = m.resolve("/assetsx/file.txt").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/srv/public/assetsx/file.txt"));
    }

    #[test]
    fn test_encoded_segments_are_decoded() {
        let resolved = mappings().resolve("/docs/hello%20world.txt").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/srv/public/docs/hello world.txt"));
    }

    #[test]
    fn test_traversal_rejected() {
        let m = mappings();
        for path in [
            "/../etc/passwd",
            "/assets/../../etc/passwd",
            "/%2e%2e/etc/passwd",
            "/..%2fetc%2fpasswd",
            "/assets/..%5c..%5cwindows",
            "/a\\b.txt",
        ] {
            assert!(m.resolve(path).is_none(), "{} 应该被拒绝", path);
        }
    }

    #[test]
    fn test_null_byte_rejected() {
        let m = mappings();
        assert!(m.resolve("/index.html\0.jpg").is_none());
        assert!(m.resolve("/index.html%00.jpg").is_none());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(mappings().resolve("/%ff%fe.txt").is_none());
    }

    #[test]
    fn test_folder_root_is_not_served() {
        let m = mappings();
        assert!(m.resolve("/assets").is_none());
        assert!(m.resolve("/assets/").is_none());
    }

    #[test]
    fn test_no_match_is_none() {
        let config = EngineConfig::default().with_folder("/static", FolderConfig::new("/srv/s", false));
        let m = Mappings::build(&config, None);
        assert!(m.resolve("/other/file.txt").is_none());
    }

    #[test]
    fn test_unsafe_config_entries_skipped_with_warning() {
        let config = EngineConfig::default()
            .with_single_asset("/ok", "/srv/ok.txt")
            .with_single_asset("/bad", "/srv/../etc/passwd")
            .with_single_asset("/nul\0", "/srv/x")
            .with_folder("/static", FolderConfig::new("/srv/static", false))
            .with_folder("/evil", FolderConfig::new("../outside", false));

        let mut logger = MockEngineLogger::new();
        logger.expect_warn().times(3).return_const(());
        let m = Mappings::build(&config, Some(&logger));

        assert_eq!(m.single_assets().len(), 1);
        assert_eq!(m.folders().len(), 1);
        assert!(m.resolve("/ok").is_some());
        assert!(m.resolve("/static/a.css").is_some());
    }

    #[test]
    fn test_prefix_normalization() {
        let config = EngineConfig::default()
            .with_folder("static/", FolderConfig::new("/srv/s", false))
            .with_single_asset("favicon.ico", "/srv/favicon.ico");
        let m = Mappings::build(&config, None);
        assert_eq!(m.folders()[0].prefix, "/static");
        assert!(m.resolve("/favicon.ico").is_some());
        assert!(m.resolve("/static/a.txt").is_some());
    }
}
