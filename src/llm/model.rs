//! Chat completion backend over the OpenAI-compatible HTTP API.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::images::ImageFetcher;
use crate::{ImageRef, Turn};

use async_trait::async_trait;
use std::time::Duration;

/// One single-shot completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Prior turns for this conversation, oldest first.
    pub history: Vec<Turn>,
    pub user_text: String,
    pub images: Vec<ImageRef>,
    /// Use the search-capable model with web search enabled.
    pub augmented: bool,
}

/// Produces assistant text for a request.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Calls `POST {base_url}/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: reqwest::Client,
    images: ImageFetcher,
    api_key: String,
    base_url: String,
    model: String,
    search_model: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(format!("failed to build HTTP client: {error}")))?;

        let images = ImageFetcher::new(
            http.clone(),
            Duration::from_secs(config.image_timeout_secs),
        );

        Ok(Self {
            http,
            images,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            search_model: config.search_model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn model_for(&self, augmented: bool) -> &str {
        if augmented {
            &self.search_model
        } else {
            &self.model
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let image_urls = self.images.fetch_all(&request.images).await;
        if image_urls.len() < request.images.len() {
            tracing::debug!(
                requested = request.images.len(),
                resolved = image_urls.len(),
                "some images could not be resolved"
            );
        }

        let messages = build_messages(&request, &image_urls);
        let body = build_body(
            self.model_for(request.augmented),
            messages,
            self.max_tokens,
            request.augmented,
        );

        let url = format!("{}/v1/chat/completions", self.base_url);

        tracing::debug!(
            model = %self.model_for(request.augmented),
            augmented = request.augmented,
            history_turns = request.history.len(),
            images = image_urls.len(),
            "sending completion request"
        );

        let response = self
            .http
            .post(&url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|error| {
            LlmError::Transport(format!("failed to read response body: {error}"))
        })?;

        let response_body: serde_json::Value = match serde_json::from_str(&response_text) {
            Ok(body) => body,
            Err(error) if status.is_success() => {
                return Err(LlmError::InvalidResponse(format!(
                    "response is not valid JSON: {error}\nBody: {}",
                    truncate_body(&response_text)
                ))
                .into());
            }
            Err(_) => serde_json::Value::Null,
        };

        if !status.is_success() {
            let message = response_body["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| truncate_body(&response_text).to_string());
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        Ok(parse_completion(&response_body)?)
    }
}

/// System prompt, prior turns, then the user turn. The user turn is a plain
/// string unless images were resolved, in which case it is a content list.
pub fn build_messages(request: &CompletionRequest, image_urls: &[String]) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);

    messages.push(serde_json::json!({
        "role": "system",
        "content": request.system_prompt,
    }));

    messages.extend(request.history.iter().map(|turn| {
        serde_json::json!({
            "role": turn.role.as_str(),
            "content": turn.content,
        })
    }));

    let content = if request.images.is_empty() {
        serde_json::json!(request.user_text)
    } else {
        let mut parts = Vec::with_capacity(image_urls.len() + 1);
        if !request.user_text.is_empty() {
            parts.push(serde_json::json!({"type": "text", "text": request.user_text}));
        }
        parts.extend(image_urls.iter().map(|url| {
            serde_json::json!({
                "type": "image_url",
                "image_url": {"url": url},
            })
        }));
        serde_json::json!(parts)
    };

    messages.push(serde_json::json!({
        "role": "user",
        "content": content,
    }));

    messages
}

pub fn build_body(
    model: &str,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    augmented: bool,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
    });

    if augmented {
        body["web_search_options"] = serde_json::json!({});
    }

    body
}

/// Extract `choices[0].message.content`.
pub fn parse_completion(body: &serde_json::Value) -> std::result::Result<String, LlmError> {
    let choices = body["choices"]
        .as_array()
        .ok_or_else(|| LlmError::InvalidResponse("missing choices array".into()))?;

    let Some(choice) = choices.first() else {
        return Err(LlmError::EmptyResponse);
    };

    match choice["message"]["content"].as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(LlmError::EmptyResponse),
    }
}

fn truncate_body(body: &str) -> &str {
    let limit = 500;
    match body.char_indices().nth(limit) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            api_key: "sk-test".into(),
            base_url,
            model: "gpt-4o".into(),
            search_model: "gpt-4o-search-preview".into(),
            max_tokens: 2000,
            system_prompt: "be helpful".into(),
            system_prompt_file: None,
            request_timeout_secs: 5,
            image_timeout_secs: 5,
        }
    }

    fn request(user_text: &str) -> CompletionRequest {
        CompletionRequest {
            system_prompt: "be helpful".into(),
            history: vec![Turn::user("hi"), Turn::assistant("hello!")],
            user_text: user_text.into(),
            images: Vec::new(),
            augmented: false,
        }
    }

    #[test]
    fn text_only_request_uses_plain_string_content() {
        let messages = build_messages(&request("what is rust?"), &[]);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], serde_json::json!({"role": "system", "content": "be helpful"}));
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3], serde_json::json!({"role": "user", "content": "what is rust?"}));
    }

    #[test]
    fn image_request_uses_content_parts() {
        let mut with_images = request("what is this?");
        with_images.images = vec![
            ImageRef {
                url: "https://cdn.example/a.png".into(),
                content_type: "image/png".into(),
            },
            ImageRef {
                url: "https://cdn.example/b.png".into(),
                content_type: "image/png".into(),
            },
        ];

        // Second image failed to resolve.
        let messages = build_messages(&with_images, &["data:image/png;base64,AAAA".into()]);
        let content = &messages[3]["content"];

        assert_eq!(
            content,
            &serde_json::json!([
                {"type": "text", "text": "what is this?"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
            ])
        );
    }

    #[test]
    fn image_request_without_text_has_no_text_part() {
        let mut image_only = request("");
        image_only.images = vec![ImageRef {
            url: "https://cdn.example/a.png".into(),
            content_type: "image/png".into(),
        }];

        let messages = build_messages(&image_only, &["data:image/png;base64,AAAA".into()]);
        let parts = messages[3]["content"].as_array().expect("content list");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["type"], "image_url");
    }

    #[test]
    fn augmented_body_carries_web_search_options() {
        let plain = build_body("gpt-4o", Vec::new(), 2000, false);
        assert_eq!(plain["max_tokens"], 2000);
        assert!(plain.get("web_search_options").is_none());

        let augmented = build_body("gpt-4o-search-preview", Vec::new(), 2000, true);
        assert_eq!(augmented["model"], "gpt-4o-search-preview");
        assert_eq!(augmented["web_search_options"], serde_json::json!({}));
    }

    #[test]
    fn completion_text_is_extracted() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Ownership!"}}]
        });
        assert_eq!(parse_completion(&body).expect("text"), "Ownership!");
    }

    #[test]
    fn missing_or_blank_content_is_empty_response() {
        let null_content = serde_json::json!({"choices": [{"message": {"content": null}}]});
        let blank = serde_json::json!({"choices": [{"message": {"content": "  "}}]});
        let no_choices = serde_json::json!({"choices": []});

        for body in [null_content, blank, no_choices] {
            assert!(matches!(parse_completion(&body), Err(LlmError::EmptyResponse)));
        }
    }

    #[test]
    fn malformed_body_is_invalid_response() {
        let body = serde_json::json!({"id": "x"});
        let error = parse_completion(&body).expect_err("no choices");
        assert_eq!(error.category(), "InvalidResponse");
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "あ".repeat(600);
        assert_eq!(truncate_body(&body).chars().count(), 500);
        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn complete_posts_to_chat_completions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-search-preview",
                "max_tokens": 2000,
                "web_search_options": {},
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "Sunny."}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let backend = OpenAiBackend::new(&config(server.url())).expect("backend");
        let mut weather = request("天気教えて");
        weather.augmented = true;

        let text = backend.complete(weather).await.expect("completion");
        assert_eq!(text, "Sunny.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_keeps_status_and_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(
                serde_json::json!({"error": {"message": "rate limited"}}).to_string(),
            )
            .create_async()
            .await;

        let backend = OpenAiBackend::new(&config(server.url())).expect("backend");
        let error = backend
            .complete(request("hi"))
            .await
            .expect_err("429 must fail");

        match error {
            Error::Llm(LlmError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_success_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let backend = OpenAiBackend::new(&config(server.url())).expect("backend");
        let error = backend
            .complete(request("hi"))
            .await
            .expect_err("html must fail");
        assert_eq!(error.category(), "InvalidResponse");
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_error() {
        let backend = OpenAiBackend::new(&config("http://127.0.0.1:1".into())).expect("backend");
        let error = backend
            .complete(request("hi"))
            .await
            .expect_err("connection must fail");
        assert_eq!(error.category(), "TransportError");
    }
}
