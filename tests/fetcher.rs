//! Content fetcher against a scripted local HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use trailsync::http_client::{content_hash, ContentFetcher, FetchError, PageFetcher};
use trailsync::rate_limit::RetryPolicy;

/// Serves the scripted `(status, body)` responses in order, repeating the last.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let (status, body) = responses[n.min(responses.len() - 1)];

            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&buf[..read]),
                }
            }

            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}/info", addr), hits)
}

fn fetcher() -> ContentFetcher {
    ContentFetcher::new(None, Duration::from_secs(5))
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate(3))
}

const PAGE: &str = "<html><head><script>var t = 1;</script></head><body>\
    <main><h1>登山道情報</h1><p>鴨沢ルート 通行止め</p><a href=\"/detail\">詳細</a></main>\
    </body></html>";

#[tokio::test]
async fn fetches_readable_text_and_hash() {
    let (url, hits) = serve(vec![(200, PAGE)]).await;

    let page = fetcher().fetch_page(&url).await.unwrap();

    assert!(page.text.contains("鴨沢ルート"));
    assert!(!page.text.contains("var t"));
    assert_eq!(page.content_hash, content_hash(PAGE));
    assert_eq!(page.content_hash.len(), 64);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let (url, hits) = serve(vec![(404, "missing")]).await;

    let err = fetcher().fetch_page(&url).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(!err.is_retryable());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let (url, hits) = serve(vec![(503, "busy"), (200, PAGE)]).await;

    let page = fetcher().fetch_page(&url).await.unwrap();

    assert!(page.text.contains("通行止め"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_are_bounded() {
    let (url, hits) = serve(vec![(500, "down")]).await;

    let err = fetcher().fetch_page(&url).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn page_without_text_is_an_error() {
    let (url, _) = serve(vec![(200, "<html><body><script>x()</script></body></html>")]).await;

    let err = fetcher().fetch_page(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::Empty { .. }));
}
