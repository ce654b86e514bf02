use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use volley::http::{HttpClient, ReqwestHttpClient};
use volley::{BatchReport, FetchDescriptor, FetchError, Loader, Method, Registry};

/// Serve a single HTTP/1.1 response and hand back the raw request that was received.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if request_complete(&raw) {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();

        let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
    });

    (base_url, rx)
}

/// Headers are terminated and the declared body length has arrived.
fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= header_end + 4 + content_length
}

fn header_lines(raw: &str) -> Vec<String> {
    raw.split("\r\n\r\n")
        .next()
        .unwrap_or_default()
        .lines()
        .map(|line| line.to_ascii_lowercase())
        .collect()
}

fn body_of(raw: &str) -> &str {
    raw.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or_default()
}

#[test_log::test(tokio::test)]
async fn test_payload_is_sent_as_json_with_charset() {
    let (base_url, received) = serve_once("200 OK", r#"{"Template": "<li>row</li>"}"#).await;
    let client = ReqwestHttpClient::new();

    let descriptor = FetchDescriptor::get("row", format!("{}/api/templates", base_url))
        .with_method(Method::Post)
        .wrapped()
        .with_payload(serde_json::json!({"a": 1}));
    let response = client.execute(&descriptor).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, r#"{"Template": "<li>row</li>"}"#);

    let raw = received.await.unwrap();
    assert!(raw.starts_with("POST /api/templates HTTP/1.1\r\n"), "request was: {}", raw);
    let headers = header_lines(&raw);
    assert!(
        headers.contains(&"content-type: application/json; charset=utf-8".to_string()),
        "headers were: {:?}",
        headers
    );
    assert_eq!(body_of(&raw), r#"{"a":1}"#);
}

#[test_log::test(tokio::test)]
async fn test_get_without_payload_sends_no_body() {
    let (base_url, received) = serve_once("200 OK", "<h1>Header</h1>").await;
    let client = ReqwestHttpClient::new();

    let response = client
        .execute(&FetchDescriptor::get("header", format!("{}/tpl/header.html", base_url)))
        .await
        .unwrap();
    assert_eq!(response.body, "<h1>Header</h1>");

    let raw = received.await.unwrap();
    assert!(raw.starts_with("GET /tpl/header.html HTTP/1.1\r\n"), "request was: {}", raw);
    assert!(
        !header_lines(&raw)
            .iter()
            .any(|line| line.starts_with("content-type:")),
        "request was: {}",
        raw
    );
    assert_eq!(body_of(&raw), "");
}

#[test_log::test(tokio::test)]
async fn test_loader_registers_envelope_over_real_http() {
    let (base_url, received) = serve_once("200 OK", r#"{"Template": "<li>row</li>"}"#).await;
    let registry = Arc::new(Registry::new());
    let loader = Loader::new(registry.clone(), Arc::new(ReqwestHttpClient::new()));

    let report = loader
        .load_all(&[FetchDescriptor::get("row", format!("{}/api/templates", base_url))
            .with_method(Method::Post)
            .wrapped()
            .with_payload(serde_json::json!({"a": 1}))])
        .await;

    assert_eq!(report, BatchReport::Loaded { fetched: 1 });
    assert_eq!(registry.get("row").as_deref(), Some("<li>row</li>"));
    assert_eq!(body_of(&received.await.unwrap()), r#"{"a":1}"#);
}

#[test_log::test(tokio::test)]
async fn test_loader_reports_real_error_status() {
    let (base_url, _received) = serve_once("404 Not Found", "no such template").await;
    let registry = Arc::new(Registry::new());
    let loader = Loader::new(registry.clone(), Arc::new(ReqwestHttpClient::new()));

    let report = loader
        .load_all(&[FetchDescriptor::get("gone", format!("{}/tpl/gone.html", base_url))])
        .await;

    let BatchReport::Failed(failure) = report else {
        panic!("expected a failed batch, got {:?}", report);
    };
    assert_eq!(
        failure.failed_entries[0].error,
        FetchError::Status {
            status: 404,
            body: "no such template".to_string()
        }
    );
    assert!(!registry.exists("gone"));
}
