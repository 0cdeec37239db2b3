use crate::feed::document::Document;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default cap on a feed body, in bytes.
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default deadline for one request, including the body read.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching a feed document.
///
/// `Transport`, `Timeout`, `Cancelled` and `HttpStatus` are transport-class
/// failures; `Decode` and `ResponseTooLarge` mean the body was unusable.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Request plus body read exceeded the deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Shutdown was requested while the request was in flight
    #[error("Request cancelled")]
    Cancelled,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body was not UTF-8, not well-formed XML, or not an RSS channel
    #[error("Decode error: {0}")]
    Decode(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

impl FetchError {
    /// True for failures of the exchange itself rather than of the body.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_)
                | FetchError::Timeout(_)
                | FetchError::Cancelled
                | FetchError::HttpStatus(_)
        )
    }
}

/// Knobs for a single fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_size: MAX_DOCUMENT_SIZE,
        }
    }
}

/// Build the shared HTTP client, identifying ourselves with `user_agent`.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder().user_agent(user_agent).build()?)
}

/// Fetch and parse the RSS document at `url`.
///
/// Performs a single GET (no retries), bounded by `options.timeout` and
/// abandoned early if `cancel` fires. The response is dropped on every exit
/// path, releasing the connection.
///
/// # Errors
///
/// - [`FetchError::Transport`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Deadline exceeded
/// - [`FetchError::Cancelled`] - `cancel` fired first
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Body over `options.max_size`
/// - [`FetchError::Decode`] - Body is not a valid RSS document
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
    cancel: &CancellationToken,
) -> Result<Document, FetchError> {
    let exchange = async {
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, options.max_size).await
    };

    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        result = tokio::time::timeout(options.timeout, exchange) => {
            result.map_err(|_| FetchError::Timeout(options.timeout))??
        }
    };

    let body = std::str::from_utf8(&bytes)
        .map_err(|e| FetchError::Decode(format!("body is not UTF-8: {}", e)))?;
    let document = Document::from_xml(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    tracing::debug!(
        url = %url,
        bytes = bytes.len(),
        items = document.channel.items.len(),
        "Fetched feed document"
    );

    Ok(document)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test &amp;amp; Co</title>
    <item><title>One</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    async fn serve(template: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }

    async fn fetch(server: &MockServer, options: &FetchOptions) -> Result<Document, FetchError> {
        let client = build_client("gator").unwrap();
        let url = format!("{}/feed", server.uri());
        fetch_document(&client, &url, options, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("User-Agent", "gator"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let doc = fetch(&mock_server, &FetchOptions::default()).await.unwrap();
        assert_eq!(doc.channel.title, "Test & Co");
        assert_eq!(doc.channel.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_404_is_transport_class() {
        let mock_server = serve(ResponseTemplate::new(404)).await;

        let err = fetch(&mock_server, &FetchOptions::default()).await.unwrap_err();
        match err {
            FetchError::HttpStatus(404) => {}
            ref e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = fetch(&mock_server, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mock_server = serve(ResponseTemplate::new(200).set_body_string("<not valid xml")).await;

        let err = fetch(&mock_server, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "got {:?}", err);
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_non_utf8_body_is_decode_error() {
        let mock_server =
            serve(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00, 0x3c])).await;

        let err = fetch(&mock_server, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = serve(ResponseTemplate::new(200).set_body_string(VALID_RSS)).await;
        let options = FetchOptions {
            max_size: 16,
            ..FetchOptions::default()
        };

        let err = fetch(&mock_server, &options).await.unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(Duration::from_secs(5)),
        )
        .await;
        let options = FetchOptions {
            timeout: Duration::from_millis(100),
            ..FetchOptions::default()
        };

        let err = fetch(&mock_server, &options).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "got {:?}", err);
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        let mock_server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(Duration::from_secs(5)),
        )
        .await;
        let client = build_client("gator").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetch_document(
            &client,
            &format!("{}/feed", mock_server.uri()),
            &FetchOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let client = build_client("gator").unwrap();
        let err = fetch_document(
            &client,
            "http://127.0.0.1:9/feed",
            &FetchOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "got {:?}", err);
    }
}
