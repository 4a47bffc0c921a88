//! Drives the OpenAI-compatible client against a canned local HTTP server.

use novelist_core::{CompletionOptions, GenerateRequest, LlmConfig};
use novelist_error::{CompletionErrorKind, RetryableError};
use novelist_interface::CompletionDriver;
use novelist_models::OpenAICompatibleClient;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves one HTTP response and returns the base URL.
async fn serve_once(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 64 * 1024];
        let mut read = 0;
        // Read until the end of headers plus the declared body
        loop {
            let n = socket.read(&mut buf[read..]).await.unwrap();
            if n == 0 {
                break;
            }
            read += n;
            let text = String::from_utf8_lossy(&buf[..read]);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if read >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        let response = format!(
            "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    format!("http://{}/v1/chat/completions", addr)
}

fn client_for(url: String) -> OpenAICompatibleClient {
    let llm = LlmConfig {
        base_url: url,
        model: "test-model".into(),
        request_timeout_secs: 5,
        ..LlmConfig::default()
    };
    OpenAICompatibleClient::new("test-key", &llm).unwrap()
}

fn request() -> GenerateRequest {
    GenerateRequest::from_prompt("Write an opening line.", &CompletionOptions::default())
}

#[tokio::test]
async fn test_successful_completion() {
    let url = serve_once(
        "HTTP/1.1 200 OK",
        r#"{"choices":[{"message":{"role":"assistant","content":"It was a dark night."}}]}"#,
    )
    .await;

    let response = client_for(url).generate(&request()).await.unwrap();
    assert_eq!(response.text, "It was a dark night.");
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let url = serve_once("HTTP/1.1 429 Too Many Requests", r#"{"error":"slow down"}"#).await;

    let err = client_for(url).generate(&request()).await.unwrap_err();
    assert!(matches!(err.kind, CompletionErrorKind::RateLimited(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_rejected_credential_is_fatal() {
    let url = serve_once("HTTP/1.1 401 Unauthorized", r#"{"error":"invalid key"}"#).await;

    let err = client_for(url).generate(&request()).await.unwrap_err();
    assert!(matches!(err.kind, CompletionErrorKind::Unauthorized(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unparseable_body_is_malformed() {
    let url = serve_once("HTTP/1.1 200 OK", "this is not json").await;

    let err = client_for(url).generate(&request()).await.unwrap_err();
    assert!(matches!(err.kind, CompletionErrorKind::MalformedResponse(_)));
}
