use std::time::Duration;

use thiserror::Error;

use crate::protocol::{
    BorrowReceipt, BorrowRequest, ErrorDetail, OutstandingBorrow, ReturnReceipt, ReturnRequest,
    ToolStatus,
};

/// Per-request deadline for the one-shot REST calls. The push stream is
/// long-lived and deliberately has no such deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server rejected the request and said why.
    #[error("{0}")]
    Rejected(String),
}

/// HTTP client for the license server's request/response endpoints.
///
/// These are data sources and submission targets only; the push stream is
/// owned elsewhere and this client never touches it.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The push-stream endpoint for the connection worker.
    pub fn stream_endpoint(&self) -> String {
        self.url("/realtime/stream")
    }

    /// Live outstanding borrows, optionally filtered by user.
    pub async fn outstanding_borrows(
        &self,
        user: Option<&str>,
    ) -> Result<Vec<OutstandingBorrow>, ApiError> {
        let mut request = self
            .http
            .get(self.url("/borrows"))
            .timeout(REQUEST_TIMEOUT);
        if let Some(user) = user {
            request = request.query(&[("user", user)]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// Per-tool seat counts plus the derived cost fields.
    pub async fn tool_status(&self) -> Result<Vec<ToolStatus>, ApiError> {
        let response = self
            .http
            .get(self.url("/licenses/status"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// Submit a borrow. Failures carry the server's detail message and are
    /// never retried here.
    pub async fn borrow(&self, tool: &str, user: &str) -> Result<BorrowReceipt, ApiError> {
        let response = self
            .http
            .post(self.url("/licenses/borrow"))
            .timeout(REQUEST_TIMEOUT)
            .json(&BorrowRequest {
                tool: tool.to_string(),
                user: user.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json().await?)
    }

    /// Return a borrowed seat by borrow id.
    pub async fn return_license(&self, id: &str) -> Result<ReturnReceipt, ApiError> {
        let response = self
            .http
            .post(self.url("/licenses/return"))
            .timeout(REQUEST_TIMEOUT)
            .json(&ReturnRequest { id: id.to_string() })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json().await?)
    }
}

/// Turn a non-2xx response into the server's detail message, falling back
/// to the bare status when the body is not the expected error shape.
async fn rejection(response: reqwest::Response) -> ApiError {
    let status = response.status();
    match response.json::<ErrorDetail>().await {
        Ok(body) => ApiError::Rejected(body.detail),
        Err(_) => ApiError::Rejected(format!("request failed: {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Minimal one-shot HTTP fixture: accepts a single connection, consumes
    /// the full request (headers plus declared body), answers with the
    /// canned status/body.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let mut seen = Vec::new();
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
                if let Some(pos) = seen.windows(4).position(|w| w == b"\r\n\r\n") {
                    let header_end = pos + 4;
                    let expected = content_length(&seen[..header_end]);
                    while seen.len() - header_end < expected {
                        let n = stream.read(&mut buf).unwrap();
                        if n == 0 {
                            break;
                        }
                        seen.extend_from_slice(&buf[..n]);
                    }
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len(),
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}")
    }

    fn content_length(headers: &[u8]) -> usize {
        let text = String::from_utf8_lossy(headers);
        for line in text.lines() {
            let mut parts = line.splitn(2, ':');
            if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    if let Ok(len) = value.trim().parse() {
                        return len;
                    }
                }
            }
        }
        0
    }

    #[tokio::test]
    async fn outstanding_borrows_parses_list() {
        let base = serve_once(
            "200 OK",
            r#"[{"id": "b-1", "tool": "CAD Suite", "user": "alice",
                "borrowed_at": "2025-11-03T10:00:00Z"}]"#,
        );
        let client = ApiClient::new(&base);
        let borrows = client.outstanding_borrows(None).await.unwrap();
        assert_eq!(borrows.len(), 1);
        assert_eq!(borrows[0].user, "alice");
    }

    #[tokio::test]
    async fn borrow_success_returns_receipt() {
        let base = serve_once("200 OK", r#"{"id": "b-42"}"#);
        let client = ApiClient::new(&base);
        let receipt = client.borrow("CAD Suite", "alice").await.unwrap();
        assert_eq!(receipt.id, "b-42");
    }

    #[tokio::test]
    async fn borrow_rejection_surfaces_detail() {
        let base = serve_once("409 Conflict", r#"{"detail": "no seats available"}"#);
        let client = ApiClient::new(&base);
        let err = client.borrow("CAD Suite", "alice").await.unwrap_err();
        match err {
            ApiError::Rejected(detail) => assert_eq!(detail, "no seats available"),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_error_body_falls_back_to_status() {
        let base = serve_once("500 Internal Server Error", "boom");
        let client = ApiClient::new(&base);
        let err = client.tool_status().await.unwrap_err();
        match err {
            ApiError::Rejected(detail) => assert!(detail.contains("500")),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(
            client.stream_endpoint(),
            "http://localhost:8000/realtime/stream"
        );
    }
}
