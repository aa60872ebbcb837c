// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求处理管道
//!
//! 按配置组装中间件链与静态资源处理器。阶段顺序固定为：
//!
//! 安全标头 -> CORS -> 压缩 -> 缓存 -> 静态资源处理器
//!
//! 缓存位于压缩之内，保存的是未压缩的响应，因此同一条缓存可以服务不同编码偏好的客户端。
//! 未启用的阶段不会出现在链中。

use log::info;

use crate::{
    cache::ResponseCache,
    chain::MiddlewareChain,
    compression::Compression,
    config::Config,
    cors::Cors,
    exception::Exception,
    request::Request,
    responder::StaticResponder,
    response::Response,
    security::SecurityHeaders,
};

pub struct Pipeline {
    chain: MiddlewareChain,
    responder: StaticResponder,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self, Exception> {
        let responder = StaticResponder::new(config)?;
        info!("www root: {}", responder.root().display());

        let mut chain = MiddlewareChain::new();
        if config.security().enabled {
            chain = chain.with(SecurityHeaders::new(config.security()));
            info!("已启用安全标头阶段");
        }
        if config.cors().enabled {
            chain = chain.with(Cors::new(config.cors()));
            info!("已启用CORS阶段");
        }
        if config.compression().enabled {
            // 超过流式阈值的文件只有在被缓存阶段缓冲后才会以缓冲形式到达压缩阶段
            let mut buffered_limit = config.streaming_threshold();
            if config.cache().ttl > 0 && config.cache().max_entries > 0 {
                buffered_limit = buffered_limit.max(config.cache().max_entry_size);
            }
            chain = chain.with(Compression::new(config.compression(), buffered_limit));
            info!("已启用压缩阶段，级别：{}", config.compression().level);
        }
        match ResponseCache::new(config.cache()) {
            Some(cache) => {
                chain = chain.with(cache);
                info!(
                    "已启用响应缓存，容量：{}，TTL：{}s",
                    config.cache().max_entries,
                    config.cache().ttl
                );
            }
            None => info!("响应缓存未启用"),
        }
        Ok(Self { chain, responder })
    }

    pub async fn handle(&self, request: &Request) -> Result<Response, Exception> {
        self.chain.execute(request, &self.responder).await
    }

    /// 链中已启用的阶段数量
    pub fn stages(&self) -> usize {
        self.chain.len()
    }
}
