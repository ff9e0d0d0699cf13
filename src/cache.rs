// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 分片 LRU 缓存
//!
//! 元数据、内容、ETag 三个缓存共用的有界存储。键是解析后的绝对路径，
//! 按哈希分到若干个分片，每个分片各持有一把短时间的互斥锁，
//! 不相关的请求不会排在同一把全局锁后面。
//!
//! 分片只用来分散锁竞争，容量上限针对整个缓存：条目数与字节数用全局计数器统计，
//! 超出任意一个上限时，在所有分片中挑出最久未使用的条目淘汰。
//! 每次访问从全局时钟取一个递增序号，分片内的 LRU 顺序与序号顺序一致，
//! 所以只需比较各分片队尾的序号。

use std::{
    collections::hash_map::RandomState,
    hash::BuildHasher,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use lru::LruCache;
use parking_lot::Mutex;
use serde_derive::Serialize;

/// 缓存值占用的字节数，用于字节预算统计。
pub trait Weighted {
    fn weight(&self) -> u64;
}

/// 整个缓存（所有分片合计）的容量上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_items: usize,
    pub max_bytes: u64,
}

impl CacheLimits {
    /// 只限制条目数，不限制字节数
    pub fn items(max_items: usize) -> Self {
        Self {
            max_items,
            max_bytes: u64::MAX,
        }
    }
}

/// 单个缓存的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStat {
    pub items: usize,
    pub byte_size: u64,
}

struct Slot<V> {
    value: V,
    /// 最近一次访问时的全局时钟
    tick: u64,
}

struct Shard<V> {
    entries: LruCache<PathBuf, Slot<V>>,
    bytes: u64,
}

pub struct ShardedLru<V> {
    shards: Box<[Mutex<Shard<V>>]>,
    max_items: AtomicUsize,
    max_bytes: AtomicU64,
    items: AtomicUsize,
    bytes: AtomicU64,
    clock: AtomicU64,
    hasher: RandomState,
}

impl<V: Weighted + Clone> ShardedLru<V> {
    /// 按总容量与期望的分片数构造。分片数不会超过条目上限。
    pub fn new(limits: CacheLimits, shards: usize) -> Self {
        let count = shards.max(1).min(limits.max_items.max(1));
        let shards = (0..count)
            .map(|_| {
                Mutex::new(Shard {
                    entries: LruCache::unbounded(),
                    bytes: 0,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            max_items: AtomicUsize::new(limits.max_items),
            max_bytes: AtomicU64::new(limits.max_bytes),
            items: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            hasher: RandomState::new(),
        }
    }

    fn limits(&self) -> CacheLimits {
        CacheLimits {
            max_items: self.max_items.load(Ordering::Relaxed),
            max_bytes: self.max_bytes.load(Ordering::Relaxed),
        }
    }

    fn over_limits(&self) -> bool {
        let limits = self.limits();
        self.items.load(Ordering::SeqCst) > limits.max_items
            || self.bytes.load(Ordering::SeqCst) > limits.max_bytes
    }

    fn shard(&self, key: &Path) -> &Mutex<Shard<V>> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// 必须在持有该分片锁时调用
    fn release(&self, shard: &mut Shard<V>, weight: u64) {
        shard.bytes -= weight;
        self.items.fetch_sub(1, Ordering::SeqCst);
        self.bytes.fetch_sub(weight, Ordering::SeqCst);
    }

    /// 查询并刷新该条目的最近使用位置
    pub fn get(&self, key: &Path) -> Option<V> {
        let mut shard = self.shard(key).lock();
        let slot = shard.entries.get_mut(key)?;
        slot.tick = self.tick();
        Some(slot.value.clone())
    }

    /// 放入一个条目，必要时从全体分片中淘汰最久未使用的条目。
    ///
    /// 单个条目大于整个缓存的字节上限时不会被缓存（同时移除旧值），返回 `false`。
    pub fn insert(&self, key: PathBuf, value: V) -> bool {
        let limits = self.limits();
        let weight = value.weight();
        {
            let mut shard = self.shard(&key).lock();
            if limits.max_items == 0 || weight > limits.max_bytes {
                if let Some(old) = shard.entries.pop(&key) {
                    self.release(&mut shard, old.value.weight());
                }
                return false;
            }
            let tick = self.tick();
            match shard.entries.put(key, Slot { value, tick }) {
                Some(old) => {
                    let old_weight = old.value.weight();
                    shard.bytes = shard.bytes + weight - old_weight;
                    self.bytes.fetch_add(weight, Ordering::SeqCst);
                    self.bytes.fetch_sub(old_weight, Ordering::SeqCst);
                }
                None => {
                    shard.bytes += weight;
                    self.items.fetch_add(1, Ordering::SeqCst);
                    self.bytes.fetch_add(weight, Ordering::SeqCst);
                }
            }
        }
        self.evict_to_fit();
        true
    }

    pub fn remove(&self, key: &Path) -> Option<V> {
        let mut shard = self.shard(key).lock();
        let old = shard.entries.pop(key)?;
        self.release(&mut shard, old.value.weight());
        Some(old.value)
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let (items, bytes) = (shard.entries.len(), shard.bytes);
            shard.entries.clear();
            shard.bytes = 0;
            self.items.fetch_sub(items, Ordering::SeqCst);
            self.bytes.fetch_sub(bytes, Ordering::SeqCst);
        }
    }

    /// 调整容量上限，超出部分立即按 LRU 淘汰。分片数保持不变。
    pub fn resize(&self, limits: CacheLimits) {
        self.max_items.store(limits.max_items, Ordering::Relaxed);
        self.max_bytes.store(limits.max_bytes, Ordering::Relaxed);
        self.evict_to_fit();
    }

    /// 每轮只锁一个分片，不会同时持有两把分片锁
    fn evict_to_fit(&self) {
        while self.over_limits() {
            let oldest = self
                .shards
                .iter()
                .enumerate()
                .filter_map(|(index, shard)| {
                    shard.lock().entries.peek_lru().map(|(_, slot)| (slot.tick, index))
                })
                .min();
            let Some((_, index)) = oldest else {
                break;
            };

            let mut shard = self.shards[index].lock();
            // 其他线程可能已经淘汰过
            if !self.over_limits() {
                break;
            }
            if let Some((_, old)) = shard.entries.pop_lru() {
                self.release(&mut shard, old.value.weight());
            }
        }
    }

    pub fn stats(&self) -> CacheStat {
        self.shards.iter().fold(CacheStat::default(), |mut acc, shard| {
            let shard = shard.lock();
            acc.items += shard.entries.len();
            acc.byte_size += shard.bytes;
            acc
        })
    }

    pub fn len(&self) -> usize {
        self.stats().items
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Clone, Debug, PartialEq)]
    struct Blob(Vec<u8>);

    impl Weighted for Blob {
        fn weight(&self) -> u64 {
            self.0.len() as u64
        }
    }

    fn blob(n: usize) -> Blob {
        Blob(vec![0u8; n])
    }

    fn key(name: &str) -> PathBuf {
        PathBuf::from("/srv").join(name)
    }

    #[test]
    fn test_cache_creation() {
        let cache: ShardedLru<Blob> = ShardedLru::new(CacheLimits::items(10), 4);
        assert_eq!(cache.shard_count(), 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shard_count_never_exceeds_capacity() {
        let cache: ShardedLru<Blob> = ShardedLru::new(CacheLimits::items(2), 16);
        assert_eq!(cache.shard_count(), 2);
        let cache: ShardedLru<Blob> = ShardedLru::new(CacheLimits::items(0), 16);
        assert_eq!(cache.shard_count(), 1);
    }

    #[test]
    fn test_cache_push_and_find() {
        let cache = ShardedLru::new(CacheLimits::items(3), 1);
        assert!(cache.insert(key("file1.txt"), blob(12)));
        assert_eq!(cache.get(&key("file1.txt")), Some(blob(12)));
        assert_eq!(cache.stats(), CacheStat { items: 1, byte_size: 12 });
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = ShardedLru::new(CacheLimits::items(2), 1);
        cache.insert(key("file1.txt"), blob(1));
        cache.insert(key("file2.txt"), blob(1));

        cache.get(&key("file1.txt"));
        cache.insert(key("file3.txt"), blob(1));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("file2.txt")).is_none());
        assert!(cache.get(&key("file1.txt")).is_some());
        assert!(cache.get(&key("file3.txt")).is_some());
    }

    #[test]
    fn test_cache_byte_budget_eviction() {
        let cache = ShardedLru::new(
            CacheLimits {
                max_items: 100,
                max_bytes: 100,
            },
            1,
        );
        cache.insert(key("a"), blob(40));
        cache.insert(key("b"), blob(40));
        cache.insert(key("c"), blob(40));

        let stats = cache.stats();
        assert_eq!(stats.items, 2);
        assert_eq!(stats.byte_size, 80);
        assert!(cache.get(&key("a")).is_none());
    }

    #[test]
    fn test_cache_oversized_entry_rejected() {
        let cache = ShardedLru::new(
            CacheLimits {
                max_items: 10,
                max_bytes: 10,
            },
            1,
        );
        cache.insert(key("a"), blob(5));
        assert!(!cache.insert(key("a"), blob(11)));
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.stats(), CacheStat::default());
    }

    #[test]
    fn test_cache_update_existing() {
        let cache = ShardedLru::new(CacheLimits::items(3), 1);
        cache.insert(key("file1.txt"), blob(10));
        cache.insert(key("file1.txt"), blob(4));
        assert_eq!(cache.stats(), CacheStat { items: 1, byte_size: 4 });
    }

    #[test]
    fn test_cache_remove_and_clear() {
        let cache = ShardedLru::new(CacheLimits::items(8), 4);
        for i in 0..5 {
            cache.insert(key(&format!("f{}", i)), blob(2));
        }
        assert_eq!(cache.remove(&key("f0")), Some(blob(2)));
        assert!(cache.remove(&key("f0")).is_none());
        assert_eq!(cache.stats(), CacheStat { items: 4, byte_size: 8 });

        cache.clear();
        assert_eq!(cache.stats(), CacheStat::default());
    }

    #[test]
    fn test_cache_resize_shrinks() {
        let cache = ShardedLru::new(CacheLimits::items(4), 1);
        for i in 0..4 {
            cache.insert(key(&format!("f{}", i)), blob(1));
        }
        cache.resize(CacheLimits::items(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("f3")).is_some());
    }

    #[test]
    fn test_item_cap_is_global_across_shards() {
        for round in 0..50 {
            let cache = ShardedLru::new(CacheLimits::items(2), 16);
            assert!(cache.insert(key(&format!("a{}", round)), blob(1)));
            assert!(cache.insert(key(&format!("b{}", round)), blob(1)));
            assert_eq!(cache.len(), 2, "round {}", round);
        }
    }

    #[test]
    fn test_byte_budget_is_global_across_shards() {
        let cache = ShardedLru::new(
            CacheLimits {
                max_items: 1000,
                max_bytes: 1000,
            },
            16,
        );
        assert!(cache.insert(key("half.bin"), blob(500)));
        assert!(cache.insert(key("whole.bin"), blob(500)));
        assert_eq!(cache.stats(), CacheStat { items: 2, byte_size: 1000 });

        assert!(cache.insert(key("more.bin"), blob(1)));
        assert!(cache.get(&key("half.bin")).is_none());
        assert_eq!(cache.stats(), CacheStat { items: 2, byte_size: 501 });
    }

    #[test]
    fn test_eviction_picks_oldest_across_shards() {
        let cache = ShardedLru::new(CacheLimits::items(3), 8);
        cache.insert(key("a"), blob(1));
        cache.insert(key("b"), blob(1));
        cache.insert(key("c"), blob(1));
        cache.get(&key("a"));
        cache.insert(key("d"), blob(1));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key("b")).is_none());
        for name in ["a", "c", "d"] {
            assert!(cache.get(&key(name)).is_some(), "{}", name);
        }
    }

    #[test]
    fn test_resize_shrinks_across_shards() {
        let cache = ShardedLru::new(CacheLimits::items(16), 4);
        for i in 0..16 {
            cache.insert(key(&format!("f{}", i)), blob(1));
        }
        cache.resize(CacheLimits::items(4));
        assert_eq!(cache.len(), 4);
        for i in 12..16 {
            assert!(cache.get(&key(&format!("f{}", i))).is_some());
        }
    }

    #[test]
    fn test_cache_zero_capacity_disables() {
        let cache = ShardedLru::new(CacheLimits::items(0), 1);
        assert!(!cache.insert(key("a"), blob(1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_concurrent_access() {
        let cache = Arc::new(ShardedLru::new(
            CacheLimits {
                max_items: 64,
                max_bytes: 64 * 8,
            },
            8,
        ));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let k = key(&format!("t{}-{}", t, i % 20));
                        cache.insert(k.clone(), blob(8));
                        cache.get(&k);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = cache.stats();
        assert!(stats.items <= 64);
        assert_eq!(stats.byte_size, stats.items as u64 * 8);
    }
}
