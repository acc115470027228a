// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lru::LruCache;
use serde_json::Value;

#[derive(Clone)]
struct CacheEntry {
    content: Value,
    modified_time: SystemTime,
}

/// 已解析配置文件的 LRU 缓存，以文件修改时间判断条目是否仍然有效
pub struct ConfigCache {
    cache: LruCache<PathBuf, CacheEntry>,
}

impl ConfigCache {
    // 根据容量构造
    pub fn from_capacity(capacity: usize) -> Self {
        let capacity = match NonZeroUsize::new(capacity) {
            Some(c) => c,
            None => panic!("调用from_capacity时指定的大小是0。如果需要自动设置大小，请在调用处进行处理，而不是传入0"),
        };
        Self {
            cache: LruCache::new(capacity),
        }
    }

    // 放入
    pub fn push(&mut self, path: &Path, content: Value, modified_time: SystemTime) {
        let entry = CacheEntry {
            content,
            modified_time,
        };
        self.cache.put(path.to_path_buf(), entry);
    }

    // 查询有效缓存，修改时间不一致时视为未命中
    pub fn find(&mut self, path: &Path, current_modified_time: SystemTime) -> Option<&Value> {
        match self.cache.get(path) {
            Some(entry) if entry.modified_time == current_modified_time => Some(&entry.content),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
