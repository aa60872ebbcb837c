// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 跨域资源共享。预检请求（OPTIONS）直接返回 204，其余请求在下游响应上追加允许的来源。

use async_trait::async_trait;
use log::debug;

use crate::{
    chain::{Middleware, Next},
    config::CorsConfig,
    exception::Exception,
    param::HttpRequestMethod,
    request::Request,
    response::Response,
};

pub struct Cors {
    any_origin: bool,
    origins: Vec<String>,
    credentials: bool,
    // 以下标头值在构造时拼接好
    methods: String,
    allowed_headers: Option<String>,
    exposed_headers: Option<String>,
    max_age: String,
}

fn join(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

impl Cors {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            any_origin: config.origins.iter().any(|o| o == "*"),
            origins: config
                .origins
                .iter()
                .filter(|o| o.as_str() != "*")
                .cloned()
                .collect(),
            credentials: config.credentials,
            methods: config.methods.join(", "),
            allowed_headers: join(&config.allowed_headers),
            exposed_headers: join(&config.exposed_headers),
            max_age: config.max_age.to_string(),
        }
    }

    /// 协商 `Access-Control-Allow-Origin` 的取值。
    ///
    /// 返回值的第二项表示结果是否回显了请求的 `Origin`，此时响应需要 `Vary: Origin`。
    /// 携带凭据时不能使用 `*`，通配配置会改为回显来源。
    pub fn allow_origin(&self, origin: Option<&str>) -> Option<(String, bool)> {
        if let Some(origin) = origin {
            if self.origins.iter().any(|o| o == origin) {
                return Some((origin.to_string(), true));
            }
        }
        if !self.any_origin {
            return None;
        }
        if self.credentials {
            origin.map(|o| (o.to_string(), true))
        } else {
            Some(("*".to_string(), false))
        }
    }

    fn apply_origin(&self, request: &Request, response: &mut Response) {
        let (value, echoed) = match self.allow_origin(request.header("origin")) {
            Some(negotiated) => negotiated,
            None => {
                debug!("[ID{}]来源不在允许列表中，不添加CORS标头", request.id());
                return;
            }
        };
        response.set_header("Access-Control-Allow-Origin", &value);
        if echoed {
            response.add_vary("Origin");
        }
        if self.credentials {
            response.set_header("Access-Control-Allow-Credentials", "true");
        }
    }

    fn preflight(&self, request: &Request) -> Response {
        let mut response = Response::no_content();
        self.apply_origin(request, &mut response);
        response
            .set_header("Access-Control-Allow-Methods", &self.methods)
            .set_header("Access-Control-Max-Age", &self.max_age);
        let allowed_headers = self
            .allowed_headers
            .as_deref()
            .or_else(|| request.header("access-control-request-headers"));
        if let Some(headers) = allowed_headers {
            response.set_header("Access-Control-Allow-Headers", headers);
        }
        response
    }
}

#[async_trait]
impl Middleware for Cors {
    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Response, Exception> {
        if request.method() == HttpRequestMethod::Options {
            debug!("[ID{}]CORS预检请求，返回204", request.id());
            return Ok(self.preflight(request));
        }
        let mut response = next.run(request).await?;
        self.apply_origin(request, &mut response);
        if let Some(exposed) = &self.exposed_headers {
            response.set_header("Access-Control-Expose-Headers", exposed);
        }
        Ok(response)
    }
}
