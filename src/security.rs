// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 安全加固标头。仅对经由 HTTPS 到达的请求生效，标头值在构造时一次性生成。

use async_trait::async_trait;

use crate::{
    chain::{Middleware, Next},
    config::SecurityConfig,
    exception::Exception,
    request::Request,
    response::Response,
};

pub struct SecurityHeaders {
    headers: Vec<(&'static str, String)>,
}

impl SecurityHeaders {
    pub fn new(config: &SecurityConfig) -> Self {
        let mut headers = Vec::new();
        if config.xss_protection {
            headers.push(("X-XSS-Protection", "1; mode=block".to_string()));
        }
        if config.no_sniff {
            headers.push(("X-Content-Type-Options", "nosniff".to_string()));
        }
        if let Some(frame_options) = &config.frame_options {
            headers.push(("X-Frame-Options", frame_options.clone()));
        }
        if config.hsts.enabled {
            let mut hsts = format!("max-age={}", config.hsts.max_age);
            if config.hsts.include_subdomains {
                hsts.push_str("; includeSubDomains");
            }
            if config.hsts.preload {
                hsts.push_str("; preload");
            }
            headers.push(("Strict-Transport-Security", hsts));
        }
        Self { headers }
    }

    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }
}

#[async_trait]
impl Middleware for SecurityHeaders {
    async fn handle(&self, request: &Request, next: Next<'_>) -> Result<Response, Exception> {
        let mut response = next.run(request).await?;
        if request.is_secure() {
            for (name, value) in &self.headers {
                response.set_header(name, value);
            }
        }
        Ok(response)
    }
}
