//! Markdown conversion through a layout-analysis service.
//!
//! The converter never raises: a service failure, a failed analysis or an
//! unreadable source is logged and reported as `None`, and callers treat
//! that as "no content". There is no retry at this level.

use crate::config::LayoutServiceOptions;
use crate::pipeline::input::{file_uri_to_path, is_url};
use crate::pipeline::postprocess::clean_markdown;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Converts a document to Markdown bytes.
#[allow(clippy::wrong_self_convention)]
#[async_trait]
pub trait MarkdownConverter: Send + Sync {
    /// Convert the document behind `uri`.
    async fn from_uri(&self, uri: &str) -> Option<Vec<u8>>;

    /// Convert an in-memory document.
    async fn from_bytes(&self, bytes: &[u8]) -> Option<Vec<u8>>;
}

/// Azure AI Document Intelligence `prebuilt-layout` with Markdown output.
#[derive(Debug, Clone)]
pub struct DocumentIntelligenceConverter {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

/// Source body of an analyze request.
enum AnalyzeSource<'a> {
    Url(&'a str),
    Inline(&'a [u8]),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
}

/// What a single poll of the analyze operation told us.
#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    Pending,
    Succeeded(String),
    Failed(String),
}

impl DocumentIntelligenceConverter {
    /// Build a converter. Returns `None` when no endpoint is configured.
    pub fn new(options: &LayoutServiceOptions) -> Option<Self> {
        let endpoint = options.endpoint.as_deref()?.trim_end_matches('/').to_string();
        Some(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: options.api_key.clone(),
            api_version: options.api_version.clone(),
            poll_interval: Duration::from_millis(options.poll_interval_ms),
            max_polls: options.max_polls.max(1),
        })
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/prebuilt-layout:analyze?api-version={}&outputContentFormat=markdown",
            self.endpoint, self.api_version
        )
    }

    fn authorise(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Ocp-Apim-Subscription-Key", key),
            None => request,
        }
    }

    async fn analyze(&self, source: AnalyzeSource<'_>) -> Result<String, String> {
        let body = match source {
            AnalyzeSource::Url(url) => json!({ "urlSource": url }),
            AnalyzeSource::Inline(bytes) => json!({ "base64Source": STANDARD.encode(bytes) }),
        };

        let response = self
            .authorise(self.client.post(self.analyze_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {text}"));
        }

        let operation = response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| "response carried no Operation-Location header".to_string())?;

        debug!("Layout analysis accepted, polling {}", operation);

        for _ in 0..self.max_polls {
            let body = self
                .authorise(self.client.get(&operation))
                .send()
                .await
                .map_err(|e| e.to_string())?
                .text()
                .await
                .map_err(|e| e.to_string())?;

            match parse_operation(&body)? {
                PollOutcome::Succeeded(content) => return Ok(content),
                PollOutcome::Failed(reason) => return Err(reason),
                PollOutcome::Pending => tokio::time::sleep(self.poll_interval).await,
            }
        }

        Err(format!("analysis still running after {} polls", self.max_polls))
    }

    fn finish(&self, outcome: Result<String, String>) -> Option<Vec<u8>> {
        match outcome {
            Ok(content) => {
                let markdown = clean_markdown(&content);
                info!("Layout analysis produced {} bytes of markdown", markdown.len());
                Some(markdown.into_bytes())
            }
            Err(reason) => {
                error!("Failed to convert document to markdown: {}", reason);
                None
            }
        }
    }
}

#[async_trait]
impl MarkdownConverter for DocumentIntelligenceConverter {
    async fn from_uri(&self, uri: &str) -> Option<Vec<u8>> {
        if is_url(uri) {
            let outcome = self.analyze(AnalyzeSource::Url(uri)).await;
            return self.finish(outcome);
        }

        // The service cannot dereference local files; send them inline.
        let Some(path) = file_uri_to_path(uri) else {
            warn!("Unsupported document URI for markdown conversion: {}", uri);
            return None;
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => self.from_bytes(&bytes).await,
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn from_bytes(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        if bytes.is_empty() {
            warn!("Empty document passed to markdown conversion");
            return None;
        }
        let outcome = self.analyze(AnalyzeSource::Inline(bytes)).await;
        self.finish(outcome)
    }
}

fn parse_operation(body: &str) -> Result<PollOutcome, String> {
    let op: AnalyzeOperation =
        serde_json::from_str(body).map_err(|e| format!("unreadable operation status: {e}"))?;

    Ok(match op.status.to_ascii_lowercase().as_str() {
        "succeeded" => PollOutcome::Succeeded(
            op.analyze_result.map(|r| r.content).unwrap_or_default(),
        ),
        "failed" | "canceled" | "cancelled" => PollOutcome::Failed(format!(
            "analysis {}: {}",
            op.status,
            op.error.map(|e| e.to_string()).unwrap_or_default()
        )),
        _ => PollOutcome::Pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(endpoint: &str) -> LayoutServiceOptions {
        LayoutServiceOptions {
            endpoint: Some(endpoint.to_string()),
            poll_interval_ms: 1,
            max_polls: 1,
            ..Default::default()
        }
    }

    #[test]
    fn parse_succeeded_operation() {
        let body = r##"{"status":"succeeded","analyzeResult":{"content":"# Invoice"}}"##;
        assert_eq!(
            parse_operation(body).unwrap(),
            PollOutcome::Succeeded("# Invoice".into())
        );
    }

    #[test]
    fn parse_running_and_failed_operations() {
        assert_eq!(
            parse_operation(r#"{"status":"running"}"#).unwrap(),
            PollOutcome::Pending
        );
        assert!(matches!(
            parse_operation(r#"{"status":"failed","error":{"code":"InvalidRequest"}}"#).unwrap(),
            PollOutcome::Failed(reason) if reason.contains("InvalidRequest")
        ));
        assert!(parse_operation("<html>").is_err());
    }

    #[test]
    fn analyze_url_requests_markdown() {
        let c = DocumentIntelligenceConverter::new(&options("https://di.example.com/")).unwrap();
        let url = c.analyze_url();
        assert!(url.starts_with("https://di.example.com/documentintelligence/"));
        assert!(url.contains("prebuilt-layout:analyze"));
        assert!(url.ends_with("outputContentFormat=markdown"));
    }

    #[test]
    fn no_endpoint_no_converter() {
        assert!(DocumentIntelligenceConverter::new(&LayoutServiceOptions::default()).is_none());
    }

    #[tokio::test]
    async fn unreachable_service_yields_none() {
        let c = DocumentIntelligenceConverter::new(&options("http://127.0.0.1:9")).unwrap();
        assert!(c.from_bytes(b"%PDF-1.7").await.is_none());
        assert!(c.from_uri("file:///definitely/not/here.pdf").await.is_none());
        assert!(c.from_uri("s3://bucket/key").await.is_none());
    }
}
