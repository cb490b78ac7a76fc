use crate::traits::TextGenerator;
use crate::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            model: "qwen2.5-7b-instruct".to_string(),
            api_key: None,
            temperature: 0.2,
        }
    }
}

/// Client for any server exposing an OpenAI-compatible
/// `/v1/chat/completions` route.
pub struct ChatCompletionsGenerator {
    client: Client,
    url: Url,
    config: GeneratorConfig,
}

impl ChatCompletionsGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        let base = Url::parse(&config.endpoint)?;
        let url = base.join("/v1/chat/completions")?;
        Ok(Self {
            client: Client::new(),
            url,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "user", "content": prompt}
            ],
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut request = self.client.post(self.url.clone()).json(&self.request_body(prompt));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: "chat-completions".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        extract_message_content(&parsed)
    }
}

pub fn extract_message_content(body: &Value) -> Result<String, GenerationError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or(GenerationError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_read_from_first_choice() {
        let body = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "  低盐饮食。 "}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        });
        assert_eq!(extract_message_content(&body).ok().as_deref(), Some("低盐饮食。"));
    }

    #[test]
    fn missing_or_blank_content_is_an_error() {
        assert!(matches!(
            extract_message_content(&json!({"choices": []})),
            Err(GenerationError::EmptyResponse)
        ));
        assert!(matches!(
            extract_message_content(&json!({"choices": [{"message": {"content": "  "}}]})),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn endpoint_is_joined_with_route() -> Result<(), Box<dyn std::error::Error>> {
        let generator = ChatCompletionsGenerator::new(GeneratorConfig {
            endpoint: "http://llm.local:9000/".to_string(),
            ..GeneratorConfig::default()
        })?;
        assert_eq!(generator.url.as_str(), "http://llm.local:9000/v1/chat/completions");
        assert_eq!(generator.model(), "qwen2.5-7b-instruct");
        Ok(())
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let result = ChatCompletionsGenerator::new(GeneratorConfig {
            endpoint: "not a url".to_string(),
            ..GeneratorConfig::default()
        });
        assert!(matches!(result, Err(GenerationError::Url(_))));
    }

    #[test]
    fn request_body_carries_model_and_prompt() -> Result<(), Box<dyn std::error::Error>> {
        let generator = ChatCompletionsGenerator::new(GeneratorConfig::default())?;
        let body = generator.request_body("你好");
        assert_eq!(body["model"], "qwen2.5-7b-instruct");
        assert_eq!(body["messages"][0]["content"], "你好");
        Ok(())
    }
}
