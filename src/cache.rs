// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 响应缓存：以请求 URL（见 [`cache_key`]）为键、带 TTL 的 LRU 缓存，以及使用它的中间件。

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use lru::LruCache;

use crate::{
    chain::{Middleware, Next},
    config::CacheConfig,
    exception::Exception,
    param::HttpRequestMethod,
    request::Request,
    response::Response,
};

struct CacheEntry {
    response: Response,
    expires_at: Instant,
}

/// 容量受限的响应存储。只保存已缓冲的响应，每次读取都返回一份独立的副本。
pub struct ResponseStore {
    cache: LruCache<String, CacheEntry>,
}

impl ResponseStore {
    /// 容量为 0 时返回 `None`，调用方应直接关闭缓存
    pub fn from_capacity(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            cache: LruCache::new(capacity),
        })
    }

    /// 查询有效缓存。已过期的条目会被顺手删除。
    pub fn find(&mut self, key: &str, now: Instant) -> Option<Response> {
        let expired = match self.cache.get(key) {
            Some(entry) if now < entry.expires_at => return entry.response.duplicate(),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.cache.pop(key);
        }
        None
    }

    /// 放入。无法复制的（流式）响应不会被存储，返回 `false`。
    ///
    /// 已满时淘汰最久未使用的条目，并返回被淘汰的键。
    pub fn push(
        &mut self,
        key: &str,
        response: &Response,
        expires_at: Instant,
    ) -> (bool, Option<String>) {
        let response = match response.duplicate() {
            Some(r) => r,
            None => return (false, None),
        };
        let evicted = self
            .cache
            .push(key.to_string(), CacheEntry { response, expires_at })
            .and_then(|(old_key, _)| if old_key != key { Some(old_key) } else { None });
        (true, evicted)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

/// 缓存中间件。只缓存 GET 的成功响应。
pub struct ResponseCache {
    store: Mutex<ResponseStore>,
    ttl: Duration,
    max_entry_size: u64,
}

impl ResponseCache {
    /// `ttl` 或 `max_entries` 为 0 时不启用缓存
    pub fn new(config: &CacheConfig) -> Option<Self> {
        if config.ttl == 0 {
            return None;
        }
        let store = ResponseStore::from_capacity(config.max_entries)?;
        Some(Self {
            store: Mutex::new(store),
            ttl: Duration::from_secs(config.ttl),
            max_entry_size: config.max_entry_size,
        })
    }

    fn lookup(&self, key: &str, id: u128) -> Option<Response> {
        let mut store = match self.store.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("[ID{}]缓存锁被污染，继续使用", id);
                poisoned.into_inner()
            }
        };
        store.find(key, Instant::now())
    }

    fn store(&self, key: &str, response: &Response, id: u128) {
        let mut store = match self.store.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("[ID{}]缓存锁被污染，继续使用", id);
                poisoned.into_inner()
            }
        };
        let (stored, evicted) = store.push(key, response, Instant::now() + self.ttl);
        if stored {
            debug!("[ID{}]{}已写入缓存", id, key);
        }
        if let Some(old) = evicted {
            debug!("[ID{}]缓存已满，淘汰{}", id, old);
        }
    }

    pub fn len(&self) -> usize {
        match self.store.lock() {
            Ok(lock) => lock.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 缓存键：路径加查询串。目录列表会按 `Accept` 返回 JSON 或 HTML，两种形式分开保存。
pub fn cache_key(request: &Request) -> String {
    let url = request.url();
    if request.wants_json() {
        // `#` 不会出现在请求目标中，不会与真实 URL 冲突
        format!("{}#json", url)
    } else {
        url
    }
}

#[async_trait]
impl Middleware for ResponseCache {
    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Response, Exception> {
        if request.method() != HttpRequestMethod::Get {
            return next.run(request).await;
        }
        let id = request.id();
        let key = cache_key(request);
        if let Some(hit) = self.lookup(&key, id) {
            debug!("[ID{}]缓存命中：{}", id, key);
            return Ok(hit);
        }
        debug!("[ID{}]缓存未命中：{}", id, key);

        let mut response = next.run(request).await?;
        if response.is_success() && response.buffer_within(self.max_entry_size).await? {
            self.store(&key, &response, id);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Handler, MiddlewareChain};
    use crate::response::Body;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn text(content: &'static str) -> Response {
        let mut response = Response::new();
        response.set_body(Body::Buffered(Bytes::from(content)));
        response
    }

    fn body(response: &Response) -> Bytes {
        match response.body() {
            Body::Buffered(b) => b.clone(),
            _ => panic!("expected buffered body"),
        }
    }

    /// 记录调用次数的处理器，返回请求路径作为响应体
    struct Counting {
        calls: AtomicUsize,
        status: u16,
    }

    #[async_trait]
    impl Handler for Counting {
        async fn call(&self, request: &Request) -> Result<Response, Exception> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut response = Response::new();
            response
                .set_code(self.status)
                .set_body(Body::Buffered(Bytes::from(request.url())));
            Ok(response)
        }
    }

    fn counting(status: u16) -> Counting {
        Counting {
            calls: AtomicUsize::new(0),
            status,
        }
    }

    fn config(ttl: u64, max_entries: usize) -> CacheConfig {
        CacheConfig {
            ttl,
            max_entries,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_store_zero_capacity() {
        assert!(ResponseStore::from_capacity(0).is_none());
        assert!(ResponseCache::new(&config(60, 0)).is_none());
        assert!(ResponseCache::new(&config(0, 10)).is_none());
    }

    #[test]
    fn test_store_push_and_find() {
        let mut store = ResponseStore::from_capacity(3).unwrap();
        let now = Instant::now();
        store.push("/a", &text("a"), now + Duration::from_secs(5));
        assert_eq!(store.len(), 1);
        assert_eq!(body(&store.find("/a", now).unwrap()), Bytes::from("a"));
        assert!(store.find("/b", now).is_none());
    }

    #[test]
    fn test_store_expiry() {
        let mut store = ResponseStore::from_capacity(3).unwrap();
        let now = Instant::now();
        store.push("/a", &text("a"), now + Duration::from_secs(5));
        assert!(store.find("/a", now + Duration::from_secs(4)).is_some());
        assert!(store.find("/a", now + Duration::from_secs(5)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = ResponseStore::from_capacity(2).unwrap();
        let now = Instant::now();
        let later = now + Duration::from_secs(60);
        store.push("/a", &text("a"), later);
        store.push("/b", &text("b"), later);
        let (_, evicted) = store.push("/c", &text("c"), later);

        assert_eq!(evicted, Some("/a".to_string()));
        assert_eq!(store.len(), 2);
        assert!(store.find("/a", now).is_none());
        assert!(store.find("/b", now).is_some());
        assert!(store.find("/c", now).is_some());
    }

    #[test]
    fn test_store_find_refreshes_recency() {
        let mut store = ResponseStore::from_capacity(2).unwrap();
        let now = Instant::now();
        let later = now + Duration::from_secs(60);
        store.push("/a", &text("a"), later);
        store.push("/b", &text("b"), later);
        store.find("/a", now);
        let (_, evicted) = store.push("/c", &text("c"), later);
        assert_eq!(evicted, Some("/b".to_string()));
    }

    #[test]
    fn test_store_replace_existing() {
        let mut store = ResponseStore::from_capacity(2).unwrap();
        let now = Instant::now();
        let later = now + Duration::from_secs(60);
        store.push("/a", &text("old"), later);
        let (stored, evicted) = store.push("/a", &text("new"), later);
        assert!(stored);
        assert_eq!(evicted, None);
        assert_eq!(body(&store.find("/a", now).unwrap()), Bytes::from("new"));
    }

    #[test]
    fn test_store_hits_are_independent() {
        let mut store = ResponseStore::from_capacity(2).unwrap();
        let now = Instant::now();
        store.push("/a", &text("a"), now + Duration::from_secs(60));
        let mut first = store.find("/a", now).unwrap();
        first.set_header("X-Mutated", "1").set_body(Body::Empty);
        let second = store.find("/a", now).unwrap();
        assert!(second.header("X-Mutated").is_none());
        assert_eq!(body(&second), Bytes::from("a"));
    }

    #[tokio::test]
    async fn test_middleware_serves_hits() {
        let cache = ResponseCache::new(&config(60, 8)).unwrap();
        let chain = MiddlewareChain::new().with(cache);
        let handler = counting(200);

        for _ in 0..3 {
            let request = Request::new(HttpRequestMethod::Get, "/a.txt?v=1");
            let response = chain.execute(&request, &handler).await.unwrap();
            assert_eq!(body(&response), Bytes::from("/a.txt?v=1"));
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let request = Request::new(HttpRequestMethod::Get, "/a.txt?v=2");
        chain.execute(&request, &handler).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_key_separates_json() {
        let html = Request::new(HttpRequestMethod::Get, "/docs/?v=1")
            .with_header("Accept", "text/html");
        let json = Request::new(HttpRequestMethod::Get, "/docs/?v=1")
            .with_header("Accept", "application/json");
        assert_eq!(cache_key(&html), "/docs/?v=1");
        assert_eq!(cache_key(&json), "/docs/?v=1#json");
    }

    #[tokio::test]
    async fn test_middleware_keys_on_accept_format() {
        let cache = ResponseCache::new(&config(60, 8)).unwrap();
        let chain = MiddlewareChain::new().with(cache);
        let handler = counting(200);

        let json = Request::new(HttpRequestMethod::Get, "/docs/")
            .with_header("Accept", "application/json");
        let html = Request::new(HttpRequestMethod::Get, "/docs/")
            .with_header("Accept", "text/html");
        for request in [&json, &html, &json, &html] {
            chain.execute(request, &handler).await.unwrap();
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_middleware_skips_failures_and_head() {
        let cache = ResponseCache::new(&config(60, 8)).unwrap();
        let chain = MiddlewareChain::new().with(cache);

        let missing = counting(404);
        for _ in 0..2 {
            let request = Request::new(HttpRequestMethod::Get, "/missing");
            chain.execute(&request, &missing).await.unwrap();
        }
        assert_eq!(missing.calls.load(Ordering::SeqCst), 2);

        let ok = counting(200);
        for _ in 0..2 {
            let request = Request::new(HttpRequestMethod::Head, "/a");
            chain.execute(&request, &ok).await.unwrap();
        }
        assert_eq!(ok.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_middleware_respects_entry_size() {
        let cache = ResponseCache::new(&CacheConfig {
            ttl: 60,
            max_entries: 8,
            max_entry_size: 4,
        })
        .unwrap();
        let chain = MiddlewareChain::new().with(cache);
        let handler = counting(200);
        for _ in 0..2 {
            let request = Request::new(HttpRequestMethod::Get, "/too-long");
            chain.execute(&request, &handler).await.unwrap();
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }
}
