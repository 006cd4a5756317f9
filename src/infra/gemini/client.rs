use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SynthesisConfig;
use crate::error::SynthesisError;
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, HttpClient, post_json};
use crate::retrieval::AnswerSynthesizer;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Gemini `generateContent` over any [`HttpClient`].
pub struct GeminiClient<C> {
    http: C,
    endpoint: String,
}

impl GeminiClient<ApiKey<BasicClient>> {
    /// Builds an authenticated client, or `None` when no API key is configured.
    pub fn from_config(config: &SynthesisConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let http = ApiKey::header(
            BasicClient::new(Duration::from_secs(config.timeout_secs))?,
            API_KEY_HEADER,
            api_key.trim(),
        )?;
        Ok(Some(Self::new(http, &config.base_url, &config.model)))
    }
}

impl<C: HttpClient> GeminiClient<C> {
    pub fn new(http: C, base_url: &str, model: &str) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl<C: HttpClient> AnswerSynthesizer for GeminiClient<C> {
    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoint, prompt_chars = prompt.len()))]
    async fn synthesize(&self, prompt: &str) -> Result<String, SynthesisError> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response = post_json(&self.http, &self.endpoint, &body)
            .await
            .map_err(|e| SynthesisError::Transport(format!("{e:#}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        debug!(bytes = text.len(), "Gemini response received");
        extract_text(&text)
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, SynthesisError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| SynthesisError::Parse(e.to_string()))?;

    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(SynthesisError::EmptyResponse)?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        return Err(SynthesisError::EmptyResponse);
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the raw request it read.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });

        (base_url, handle)
    }

    fn client(base_url: &str) -> GeminiClient<ApiKey<BasicClient>> {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let http = ApiKey::header(BasicClient::from(http), API_KEY_HEADER, "test-key").unwrap();
        GeminiClient::new(http, base_url, "gemini-2.5-flash")
    }

    #[test]
    fn test_endpoint_format() {
        let c = client("https://example.test/");
        assert_eq!(
            c.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"text":"Order ORD1 "},{"text":"was late."}
        ]}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "Order ORD1 was late.");
    }

    #[test]
    fn test_extract_text_without_candidates() {
        assert!(matches!(
            extract_text(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
            Err(SynthesisError::EmptyResponse)
        ));
        assert!(matches!(extract_text("not json"), Err(SynthesisError::Parse(_))));
    }

    #[test]
    fn test_from_config_without_key() {
        let config = SynthesisConfig::default();
        assert!(GeminiClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_synthesize_sends_key_and_prompt() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"ORD2 arrived damaged."}]}}]}"#,
        )
        .await;

        let text = client(&base_url).synthesize("why damaged?").await.unwrap();
        assert_eq!(text, "ORD2 arrived damaged.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains(r#"{"contents":[{"parts":[{"text":"why damaged?"}]}]}"#));
    }

    #[tokio::test]
    async fn test_synthesize_reports_status() {
        let (base_url, server) =
            serve_once("429 Too Many Requests", r#"{"error":"quota"}"#).await;

        let err = client(&base_url).synthesize("q").await.unwrap_err();
        match err {
            SynthesisError::Status { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("quota"));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }
}
