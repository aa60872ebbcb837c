// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 不经过网络，直接驱动完整管道的行为测试

mod common;

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use common::{config_for, site, write, HOME};
use proptest::prelude::*;
use staticpipe::config::{CacheConfig, CorsConfig};
use staticpipe::path::{is_under_root, normalize_url_path};
use staticpipe::request::Scheme;
use staticpipe::{Config, HttpRequestMethod, PathContext, Pipeline, Request, Response};

fn get(url: &str) -> Request {
    Request::new(HttpRequestMethod::Get, url)
}

async fn body_text(mut response: Response) -> String {
    let bytes = response.take_body().into_bytes().await.unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

fn small_cache(ttl: u64, max_entries: usize) -> CacheConfig {
    CacheConfig {
        ttl,
        max_entries,
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn test_directory_without_slash_redirects() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    let response = pipeline.handle(&get("/docs")).await.unwrap();
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.header("Location"), Some("/docs/"));
}

#[tokio::test]
async fn test_listing_directories_first_then_names() {
    let dir = site();
    let pipeline =
        Pipeline::from_config(&config_for(&dir).with_directory_listing(true)).unwrap();
    let response = pipeline.handle(&get("/docs/")).await.unwrap();
    assert_eq!(response.status_code(), 200);

    let html = body_text(response).await;
    let position = |name: &str| {
        html.find(&format!(">{}<", name))
            .unwrap_or_else(|| panic!("{} missing from listing", name))
    };
    assert!(position("sub/") < position("Zeta.txt"));
    assert!(position("Zeta.txt") < position("a.txt"));
    assert!(position("a.txt") < position("b.txt"));
}

#[tokio::test]
async fn test_listing_disabled_is_not_found() {
    let dir = site();
    let pipeline =
        Pipeline::from_config(&config_for(&dir).with_directory_listing(false)).unwrap();
    let response = pipeline.handle(&get("/docs/")).await.unwrap();
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_spa_fallback_toggle() {
    let dir = site();
    let spa = Pipeline::from_config(&config_for(&dir).with_spa(true)).unwrap();
    let response = spa.handle(&get("/app/route/42")).await.unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(body_text(response).await, HOME);

    let plain = Pipeline::from_config(&config_for(&dir).with_spa(false)).unwrap();
    let response = plain.handle(&get("/app/route/42")).await.unwrap();
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_cache_evicts_least_recently_used() {
    let dir = site();
    let config = config_for(&dir).with_cache(small_cache(60, 2));
    let pipeline = Pipeline::from_config(&config).unwrap();

    for url in ["/docs/a.txt", "/docs/b.txt", "/docs/Zeta.txt"] {
        pipeline.handle(&get(url)).await.unwrap();
    }
    write(dir.path(), "docs/a.txt", "ALPHA");
    write(dir.path(), "docs/b.txt", "BRAVO");
    write(dir.path(), "docs/Zeta.txt", "ZETA");

    // b.txt 与 Zeta.txt 仍由缓存提供，a.txt 已被淘汰，读到磁盘上的新内容
    let response = pipeline.handle(&get("/docs/b.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "bravo");
    let response = pipeline.handle(&get("/docs/Zeta.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "zeta");
    let response = pipeline.handle(&get("/docs/a.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "ALPHA");
}

#[tokio::test]
async fn test_cached_listing_keeps_requested_format() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    let json = get("/docs/").with_header("Accept", "application/json");
    let html = get("/docs/").with_header("Accept", "text/html");

    // 每种格式都请求两次，第二次来自缓存
    for _ in 0..2 {
        let response = pipeline.handle(&json).await.unwrap();
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert!(body_text(response).await.starts_with('['));

        let response = pipeline.handle(&html).await.unwrap();
        assert_eq!(response.header("Content-Type"), Some("text/html;charset=utf-8"));
        assert!(body_text(response).await.contains("<!DOCTYPE html>"));
    }
}

#[tokio::test]
async fn test_redirect_location_is_normalized() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    let response = pipeline.handle(&get("//docs")).await.unwrap();
    assert_eq!(response.status_code(), 301);
    assert_eq!(response.header("Location"), Some("/docs/"));
}

#[tokio::test]
async fn test_cache_entries_expire() {
    let dir = site();
    let config = config_for(&dir).with_cache(small_cache(1, 8));
    let pipeline = Pipeline::from_config(&config).unwrap();

    pipeline.handle(&get("/docs/a.txt")).await.unwrap();
    write(dir.path(), "docs/a.txt", "changed");
    let response = pipeline.handle(&get("/docs/a.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "alpha");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let response = pipeline.handle(&get("/docs/a.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "changed");
}

#[tokio::test]
async fn test_cache_disabled() {
    let dir = site();
    let config = config_for(&dir).with_cache(small_cache(0, 8));
    let pipeline = Pipeline::from_config(&config).unwrap();

    pipeline.handle(&get("/docs/a.txt")).await.unwrap();
    write(dir.path(), "docs/a.txt", "changed");
    let response = pipeline.handle(&get("/docs/a.txt")).await.unwrap();
    assert_eq!(body_text(response).await, "changed");
}

#[tokio::test]
async fn test_brotli_preferred_and_length_removed() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();

    // 第二次请求来自缓存，两次都必须得到完整、独立的压缩结果
    for _ in 0..2 {
        let request = get("/index.html").with_header("Accept-Encoding", "br, gzip");
        let mut response = pipeline.handle(&request).await.unwrap();
        assert_eq!(response.header("Content-Encoding"), Some("br"));
        assert!(response.header("Content-Length").is_none());

        let compressed = response.take_body().into_bytes().await.unwrap();
        let mut out = Vec::new();
        brotli::BrotliDecompress(&mut Cursor::new(&compressed[..]), &mut out).unwrap();
        assert_eq!(out, HOME.as_bytes());
    }
}

#[tokio::test]
async fn test_no_accept_encoding_is_unchanged() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    let response = pipeline.handle(&get("/index.html")).await.unwrap();
    assert!(response.header("Content-Encoding").is_none());
    assert_eq!(
        response.header("Content-Length"),
        Some(HOME.len().to_string().as_str())
    );
    assert_eq!(body_text(response).await, HOME);
}

#[tokio::test]
async fn test_binary_files_are_not_compressed() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    let request = get("/logo.png").with_header("Accept-Encoding", "br, gzip");
    let response = pipeline.handle(&request).await.unwrap();
    assert_eq!(response.header("Content-Type"), Some("image/png"));
    assert!(response.header("Content-Encoding").is_none());
}

#[tokio::test]
async fn test_traversal_is_forbidden() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    for url in [
        "/../etc/passwd",
        "/docs/../../etc/passwd",
        "/%2e%2e/%2e%2e/etc/passwd",
        "/..%2f..%2fetc%2fpasswd",
    ] {
        let response = pipeline.handle(&get(url)).await.unwrap();
        assert_eq!(response.status_code(), 403, "{}", url);
        assert!(!body_text(response).await.contains("root:"));
    }
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    let request = Request::new(HttpRequestMethod::Post, "/index.html");
    let response = pipeline.handle(&request).await.unwrap();
    assert_eq!(response.status_code(), 405);
    assert_eq!(response.header("Allow"), Some("GET, HEAD"));
}

#[tokio::test]
async fn test_options_without_cors_is_not_allowed() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    let request = Request::new(HttpRequestMethod::Options, "/");
    let response = pipeline.handle(&request).await.unwrap();
    assert_eq!(response.status_code(), 405);
}

#[tokio::test]
async fn test_cors_preflight_through_pipeline() {
    let dir = site();
    let cors = CorsConfig {
        enabled: true,
        origins: vec!["https://app.example".to_string()],
        ..CorsConfig::default()
    };
    let pipeline = Pipeline::from_config(&config_for(&dir).with_cors(cors)).unwrap();

    let preflight = Request::new(HttpRequestMethod::Options, "/index.html")
        .with_header("Origin", "https://app.example");
    let response = pipeline.handle(&preflight).await.unwrap();
    assert_eq!(response.status_code(), 204);
    assert_eq!(
        response.header("Access-Control-Allow-Origin"),
        Some("https://app.example")
    );

    let simple = get("/index.html").with_header("Origin", "https://app.example");
    let response = pipeline.handle(&simple).await.unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.header("Access-Control-Allow-Origin"),
        Some("https://app.example")
    );
}

#[tokio::test]
async fn test_security_headers_only_over_https() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();

    let response = pipeline.handle(&get("/index.html")).await.unwrap();
    assert!(response.header("Strict-Transport-Security").is_none());

    let secure = get("/index.html").with_scheme(Scheme::Https);
    let response = pipeline.handle(&secure).await.unwrap();
    assert_eq!(
        response.header("Strict-Transport-Security"),
        Some("max-age=31536000; includeSubDomains")
    );
    assert_eq!(response.header("X-Content-Type-Options"), Some("nosniff"));
}

#[tokio::test]
async fn test_head_matches_get_headers() {
    let dir = site();
    let pipeline = Pipeline::from_config(&config_for(&dir)).unwrap();
    for accept_encoding in [None, Some("br, gzip"), Some("gzip")] {
        let with_encoding = |request: Request| match accept_encoding {
            Some(value) => request.with_header("Accept-Encoding", value),
            None => request,
        };
        let get_response = pipeline
            .handle(&with_encoding(get("/index.html")))
            .await
            .unwrap();
        let head_response = pipeline
            .handle(&with_encoding(Request::new(HttpRequestMethod::Head, "/index.html")))
            .await
            .unwrap();

        assert_eq!(head_response.status_code(), 200);
        for name in ["Content-Length", "Content-Encoding", "Vary", "ETag", "Content-Type"] {
            assert_eq!(
                head_response.header(name),
                get_response.header(name),
                "{} with Accept-Encoding {:?}",
                name,
                accept_encoding
            );
        }
        assert!(head_response.body().is_empty());
    }
}

#[test]
fn test_missing_root_fails_fast() {
    let config = Config::new().with_root("/nonexistent/staticpipe");
    assert!(Pipeline::from_config(&config).is_err());
}

proptest! {
    #[test]
    fn prop_normalize_is_idempotent(path in "[a-z./]{0,24}") {
        let once = normalize_url_path(&path);
        prop_assert_eq!(normalize_url_path(&once), once);
    }

    #[test]
    fn prop_resolved_paths_stay_under_root(
        segments in prop::collection::vec(
            prop::sample::select(vec!["..", ".", "a", "b", "%2e%2e", "%2f", ""]),
            0..8,
        )
    ) {
        let root = Path::new("/srv/www");
        let url = format!("/{}", segments.join("/"));
        if let Ok(context) = PathContext::resolve(root, &url) {
            prop_assert!(is_under_root(context.fs_path(), root));
        }
    }
}
