//! End-to-end crawl scenarios against a live HTTP fake.
//!
//! Fixtures are served on loopback, so configs enable
//! `allow_private_networks` except where the SSRF path itself is under
//! test.

use std::sync::Arc;
use std::time::Duration;

use sitevault::{CrawlConfig, CrawlEngine, EngineState, Storage};
use url::Url;

fn host_dir(server: &mockito::ServerGuard) -> String {
    let url = Url::parse(&server.url()).unwrap();
    format!(
        "{}_{}",
        url.host_str().unwrap(),
        url.port().expect("mockito serves on an explicit port")
    )
}

fn base_config(server: &mockito::ServerGuard, output: &std::path::Path) -> CrawlConfig {
    CrawlConfig::builder()
        .seed_url(server.url())
        .output_root(output.to_path_buf())
        .allow_private_networks(true)
        .respect_robots_txt(false)
        .delay_ms(0)
        .concurrency(2)
        .timeout_ms(10_000)
        .build()
        .unwrap()
}

async fn read_text(storage: &Storage, rel: &str) -> String {
    String::from_utf8(storage.read(rel).await.unwrap()).unwrap()
}

#[tokio::test]
async fn single_page_asset_fan_out_and_rewrite() {
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(concat!(
            r#"<html><head><link rel="stylesheet" href="/s.css">"#,
            r#"<style>body{background:url(/bg.jpg)}</style></head>"#,
            r#"<body><img src="/a.png"><a href="/b">next</a></body></html>"#,
        ))
        .create_async()
        .await;
    let _css = server
        .mock("GET", "/s.css")
        .with_status(200)
        .with_header("content-type", "text/css")
        .with_body("body { color: red }")
        .create_async()
        .await;
    let _img = server
        .mock("GET", "/a.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("png-bytes")
        .create_async()
        .await;
    let _bg = server
        .mock("GET", "/bg.jpg")
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body("jpg-bytes")
        .create_async()
        .await;
    // maxDepth 0 must keep /b out of the frontier entirely.
    let never = server.mock("GET", "/b").expect(0).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .output_root(dir.path().to_path_buf())
        .allow_private_networks(true)
        .respect_robots_txt(false)
        .delay_ms(0)
        .max_depth(0)
        .build()
        .unwrap();

    let engine = CrawlEngine::new("fanout", &server.url(), config).unwrap();
    let outcome = engine.start().await.unwrap();

    assert!(outcome.success, "{:?}", outcome.errors);
    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.assets, 3);
    assert_eq!(engine.state(), EngineState::Complete);

    let storage = engine.storage().unwrap();
    let host = host_dir(&server);
    let files = storage.list_files().await.unwrap();
    assert_eq!(
        files,
        vec![
            format!("{host}/a.png"),
            format!("{host}/bg.jpg"),
            format!("{host}/index.html"),
            format!("{host}/s.css"),
        ]
    );

    let index = read_text(&storage, &format!("{host}/index.html")).await;
    assert!(index.contains(r#"href="s.css""#), "{index}");
    assert!(index.contains(r#"src="a.png""#), "{index}");
    assert!(index.contains("url(bg.jpg)"), "{index}");
    // The out-of-budget anchor keeps its original URL.
    assert!(index.contains(r#"href="/b""#), "{index}");
    never.assert_async().await;
}

#[tokio::test]
async fn redirects_preserve_linkability() {
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<a href="/p">p</a><a href="/r">r</a>"#)
        .create_async()
        .await;
    let _p = server
        .mock("GET", "/p")
        .with_status(301)
        .with_header("location", "/q")
        .create_async()
        .await;
    let _q = server
        .mock("GET", "/q")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>the content</html>")
        .create_async()
        .await;
    let _r = server
        .mock("GET", "/r")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<a href="/p">also to p</a>"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&server, dir.path());
    let engine = CrawlEngine::new("redirects", &server.url(), config).unwrap();
    let outcome = engine.start().await.unwrap();
    assert!(outcome.success, "{:?}", outcome.errors);

    let storage = engine.storage().unwrap();
    let host = host_dir(&server);
    let files = storage.list_files().await.unwrap();
    // The redirect target is stored once; no separate file for /p.
    assert!(files.contains(&format!("{host}/q.html")), "{files:?}");
    assert!(!files.contains(&format!("{host}/p.html")), "{files:?}");

    // Both the pre-redirect and post-redirect URLs rewrite to that file.
    let index = read_text(&storage, &format!("{host}/index.html")).await;
    assert!(index.contains(r#"href="q.html""#), "{index}");
    let r_page = read_text(&storage, &format!("{host}/r.html")).await;
    assert!(r_page.contains(r#"href="q.html""#), "{r_page}");
}

#[tokio::test]
async fn srcset_fidelity_with_partial_failures() {
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<img srcset="/a.png 1x, /b.png 2x">"#)
        .create_async()
        .await;
    let _a = server
        .mock("GET", "/a.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("a-bytes")
        .create_async()
        .await;
    let _b = server.mock("GET", "/b.png").with_status(404).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&server, dir.path());
    let engine = CrawlEngine::new("srcset", &server.url(), config).unwrap();
    let outcome = engine.start().await.unwrap();

    // The failed candidate is a per-URL error, not a fatal one.
    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].url.ends_with("/b.png"));

    let storage = engine.storage().unwrap();
    let host = host_dir(&server);
    let index = read_text(&storage, &format!("{host}/index.html")).await;
    // Fetched candidate rewritten, failed one untouched, descriptors kept.
    assert!(index.contains(r#"srcset="a.png 1x, /b.png 2x""#), "{index}");
}

#[tokio::test]
async fn css_imports_extend_the_crawl_and_rewrite() {
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<link rel="stylesheet" href="/css/s.css">"#)
        .create_async()
        .await;
    let _s = server
        .mock("GET", "/css/s.css")
        .with_status(200)
        .with_header("content-type", "text/css")
        .with_body("@import \"t.css\";\nbody { background: url(/img/bg.png); }")
        .create_async()
        .await;
    let _t = server
        .mock("GET", "/css/t.css")
        .with_status(200)
        .with_header("content-type", "text/css")
        .with_body("p { margin: 0 }")
        .create_async()
        .await;
    let _bg = server
        .mock("GET", "/img/bg.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("bg")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&server, dir.path());
    let engine = CrawlEngine::new("css-chain", &server.url(), config).unwrap();
    let outcome = engine.start().await.unwrap();
    assert!(outcome.success, "{:?}", outcome.errors);

    let storage = engine.storage().unwrap();
    let host = host_dir(&server);
    let files = storage.list_files().await.unwrap();
    assert!(files.contains(&format!("{host}/css/t.css")), "{files:?}");

    let sheet = read_text(&storage, &format!("{host}/css/s.css")).await;
    // Same-directory import unchanged in effect; cross-directory url()
    // climbs out of css/ into img/.
    assert!(sheet.contains("\"t.css\""), "{sheet}");
    assert!(sheet.contains("url(../img/bg.png)"), "{sheet}");
}

#[tokio::test]
async fn robots_directives_skip_pages() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("User-agent: *\nDisallow: /private/")
        .create_async()
        .await;
    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<a href="/private/x">secret</a><a href="/public">open</a>"#)
        .create_async()
        .await;
    let _public = server
        .mock("GET", "/public")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>public</html>")
        .create_async()
        .await;
    let never = server.mock("GET", "/private/x").expect(0).create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .output_root(dir.path().to_path_buf())
        .allow_private_networks(true)
        .respect_robots_txt(true)
        .delay_ms(0)
        .build()
        .unwrap();
    let engine = CrawlEngine::new("robots", &server.url(), config).unwrap();
    let outcome = engine.start().await.unwrap();
    assert!(outcome.success, "{:?}", outcome.errors);

    let snapshot = engine.progress();
    assert_eq!(snapshot.queue_stats.skipped, 1);

    let storage = engine.storage().unwrap();
    let host = host_dir(&server);
    let files = storage.list_files().await.unwrap();
    assert!(files.contains(&format!("{host}/public.html")), "{files:?}");
    assert!(!files.iter().any(|f| f.contains("private")), "{files:?}");
    never.assert_async().await;
}

#[tokio::test]
async fn ssrf_blocked_seed_fails_without_touching_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = CrawlConfig::builder()
        .seed_url("http://10.255.0.9/")
        .output_root(dir.path().to_path_buf())
        .respect_robots_txt(false)
        .delay_ms(0)
        .build()
        .unwrap();
    let engine = CrawlEngine::new("ssrf", "http://10.255.0.9/", config).unwrap();
    let outcome = engine.start().await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "SSRF");
    assert_eq!(outcome.errors[0].url, "http://10.255.0.9/");

    let storage = engine.storage().unwrap();
    assert!(storage.list_files().await.unwrap().is_empty());
}

#[tokio::test]
async fn out_of_scope_pages_rejected_but_frontier_admits_cross_host_assets() {
    // The cross-host half of scenario 6 lives at the frontier level (all
    // loopback fixtures share a hostname); the engine half checks that an
    // out-of-scope anchor is neither fetched nor stored.
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<a href="https://elsewhere.invalid/">away</a>"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&server, dir.path());
    let engine = CrawlEngine::new("scope", &server.url(), config).unwrap();
    let outcome = engine.start().await.unwrap();

    assert!(outcome.success, "{:?}", outcome.errors);
    assert_eq!(outcome.pages, 1);
    let storage = engine.storage().unwrap();
    let files = storage.list_files().await.unwrap();
    assert_eq!(files.len(), 1, "{files:?}");
}

#[tokio::test]
async fn cancel_interrupts_and_skips_the_rewrite_pass() {
    let mut server = mockito::Server::new_async().await;
    let mut body = String::new();
    for i in 0..30 {
        body.push_str(&format!(r#"<a href="/page-{i}">p{i}</a>"#));
    }
    let _index = server
        .mock("GET", mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(body)
        .expect_at_least(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .output_root(dir.path().to_path_buf())
        .allow_private_networks(true)
        .respect_robots_txt(false)
        .delay_ms(100)
        .concurrency(1)
        .build()
        .unwrap();
    let engine = Arc::new(CrawlEngine::new("cancel", &server.url(), config).unwrap());

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.start().await })
    };
    tokio::time::sleep(Duration::from_millis(400)).await;
    engine.cancel();

    let outcome = runner.await.unwrap().unwrap();
    assert!(!outcome.success);
    assert_eq!(engine.state(), EngineState::Cancelled);
}

#[tokio::test]
async fn total_size_ceiling_is_engine_fatal() {
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("x".repeat(2048))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .output_root(dir.path().to_path_buf())
        .allow_private_networks(true)
        .respect_robots_txt(false)
        .delay_ms(0)
        .max_total_size(1024)
        .build()
        .unwrap();
    let engine = CrawlEngine::new("ceiling", &server.url(), config).unwrap();

    assert!(engine.start().await.is_err());
    assert_eq!(engine.state(), EngineState::Failed);
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let mut body = String::new();
    for i in 0..5 {
        body.push_str(&format!(r#"<a href="/page-{i}">p{i}</a>"#));
    }
    let _any = server
        .mock("GET", mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(body)
        .expect_at_least(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = CrawlConfig::builder()
        .seed_url(server.url())
        .output_root(dir.path().to_path_buf())
        .allow_private_networks(true)
        .respect_robots_txt(false)
        .delay_ms(50)
        .concurrency(1)
        .max_depth(1)
        .build()
        .unwrap();
    let engine = Arc::new(CrawlEngine::new("pause", &server.url(), config).unwrap());

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.start().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.pause().unwrap();
    assert_eq!(engine.state(), EngineState::Paused);
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.resume().unwrap();

    let outcome = runner.await.unwrap().unwrap();
    assert!(outcome.success, "{:?}", outcome.errors);
    assert_eq!(engine.state(), EngineState::Complete);
}
