// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 中间件链
//!
//! 洋葱模型：进入时按注册顺序依次调用各中间件，处理器返回后按相反顺序回溯。
//!
//! 每个中间件拿到一个 [`Next`]，可以调用 `next.run(request)` 把请求交给下游，
//! 也可以直接返回响应（短路，例如 CORS 预检、缓存命中）。`Next::run` 按值消费 `Next`，
//! 因此同一个中间件不可能调用下游两次。
//!
//! 链本身只保存中间件列表，不持有任何请求级的可变状态，可在所有请求之间共享。
//! 请求级的游标就是 `Next` 中剩余的切片。

use std::sync::Arc;

use async_trait::async_trait;

use crate::exception::Exception;
use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Response, Exception>;
}

/// 链末端的处理器
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: &Request) -> Result<Response, Exception>;
}

/// 下游的延续：尚未执行的中间件加上末端处理器
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: &Request) -> Result<Response, Exception> {
        match self.stages.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    stages: rest,
                    handler: self.handler,
                };
                current.handle(request, next).await
            }
            None => self.handler.call(request).await,
        }
    }
}

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// 在链尾追加一个中间件
    pub fn with<M: Middleware + 'static>(self, middleware: M) -> Self {
        self.with_shared(Arc::new(middleware))
    }

    pub fn with_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.stages.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn execute(
        &self,
        request: &Request,
        handler: &dyn Handler,
    ) -> Result<Response, Exception> {
        Next {
            stages: &self.stages,
            handler,
        }
        .run(request)
        .await
    }
}
