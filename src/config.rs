// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 配置模块
//!
//! 从 TOML 文件构建 [`Config`]。所有字段都有默认值，因此配置文件可以只写需要覆盖的部分。
//! 各阶段的配置（缓存、压缩、CORS、安全头）位于独立的表中，由对应阶段在构造时一次性读取。

use std::fs;

use log::{info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::exception::Exception;
use crate::param::COMPRESSIBLE_TYPES;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    www_root: String,
    port: u16,
    worker_threads: usize,
    local: bool,
    spa: bool,
    directory_listing: bool,
    streaming_threshold: u64,
    chunk_size: usize,
    max_header_size: usize,
    follow_symlinks: bool,
    /// 仅在 TLS 终止代理之后开启，否则任何明文客户端都能伪造 `X-Forwarded-Proto`
    trust_forwarded_proto: bool,
    cache: CacheConfig,
    compression: CompressionConfig,
    cors: CorsConfig,
    security: SecurityConfig,
}

/// 响应缓存配置。`ttl` 或 `max_entries` 为 0 时缓存阶段直接放行。
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 条目存活时间（秒）
    pub ttl: u64,
    /// 最多保存的条目数
    pub max_entries: usize,
    /// 单个响应体超过该字节数时不缓存
    pub max_entry_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Brotli 质量 (0-11)；用于 gzip 时截断到 0-9
    pub level: u32,
    /// 可压缩的内容类型白名单，按前缀匹配
    pub types: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// 允许的来源列表，`"*"` 表示任意来源
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    /// 为空时回显预检请求的 `Access-Control-Request-Headers`
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub credentials: bool,
    /// 预检结果的缓存时间（秒）
    pub max_age: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub enabled: bool,
    pub xss_protection: bool,
    pub no_sniff: bool,
    pub frame_options: Option<String>,
    pub hsts: HstsConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HstsConfig {
    pub enabled: bool,
    pub max_age: u64,
    pub include_subdomains: bool,
    pub preload: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: 60,
            max_entries: 128,
            max_entry_size: 1048576, // 1MB
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
            types: COMPRESSIBLE_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            origins: vec!["*".to_string()],
            methods: vec!["GET".to_string(), "HEAD".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec![],
            exposed_headers: vec![],
            credentials: false,
            max_age: 86400,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            xss_protection: true,
            no_sniff: true,
            frame_options: Some("DENY".to_string()),
            hsts: HstsConfig::default(),
        }
    }
}

impl Default for HstsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: 31536000,
            include_subdomains: true,
            preload: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: ".".to_string(),
            port: 7878,
            worker_threads: 0,
            local: true,
            spa: false,
            directory_listing: true,
            streaming_threshold: 10485760, // 10MB
            chunk_size: 262144,            // 256KB
            max_header_size: 8192,
            follow_symlinks: true,
            trust_forwarded_proto: false,
            cache: CacheConfig::default(),
            compression: CompressionConfig::default(),
            cors: CorsConfig::default(),
            security: SecurityConfig::default(),
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename)
            .map_err(|e| Exception::InvalidConfig(format!("无法读取{}: {}", filename, e)))?;
        let mut config = Self::from_toml_str(&str_val)?;
        if config.worker_threads == 0 {
            config.worker_threads = num_cpus::get();
            info!("worker_threads未设置，使用CPU核心数：{}", config.worker_threads);
        }
        Ok(config)
    }

    pub fn from_toml_str(str_val: &str) -> Result<Self, Exception> {
        let config: Config =
            toml::from_str(str_val).map_err(|e| Exception::InvalidConfig(e.to_string()))?;
        if config.cache.ttl > 0 && config.cache.max_entries == 0 {
            warn!("cache.max_entries被设置为0，响应缓存将被禁用。");
        }
        if config.compression.level > 11 {
            warn!("compression.level超过11，Brotli将按11处理。");
        }
        Ok(config)
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.www_root = root.to_string();
        self
    }

    pub fn with_spa(mut self, spa: bool) -> Self {
        self.spa = spa;
        self
    }

    pub fn with_directory_listing(mut self, enabled: bool) -> Self {
        self.directory_listing = enabled;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }

    pub fn with_streaming_threshold(mut self, threshold: u64) -> Self {
        self.streaming_threshold = threshold;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }
}

impl Config {
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

    pub fn spa(&self) -> bool {
        self.spa
    }

    pub fn directory_listing(&self) -> bool {
        self.directory_listing
    }

    pub fn streaming_threshold(&self) -> u64 {
        self.streaming_threshold
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    pub fn trust_forwarded_proto(&self) -> bool {
        self.trust_forwarded_proto
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn compression(&self) -> &CompressionConfig {
        &self.compression
    }

    pub fn cors(&self) -> &CorsConfig {
        &self.cors
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }
}
