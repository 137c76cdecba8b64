use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::NutritionRecord;
use std::time::Duration;

use super::provider::{
    NutritionProvider, ProviderError, check_status, nutrition_prompt, parse_nutrition_payload,
    transport_error,
};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";

#[derive(Clone)]
pub struct AnthropicProvider {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(
        http_client: reqwest::Client,
        api_key: String,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout,
        }
    }
}

#[async_trait]
impl NutritionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, food_name: &str, context: &str) -> Result<NutritionRecord, ProviderError> {
        let prompt = nutrition_prompt(food_name, context);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 300,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };

        let response = self
            .http_client
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let reply: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        parse_nutrition_payload(&extract_text(reply)?)
    }
}

fn extract_text(reply: MessagesResponse) -> Result<String, ProviderError> {
    reply
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .find(|text| !text.trim().is_empty())
        .ok_or_else(|| ProviderError::Parse("response has no text block".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(body: &str) -> MessagesResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn skips_non_text_blocks() {
        let body = r#"{
            "id": "msg_1",
            "type": "message",
            "content": [
                {"type": "tool_use", "id": "t1", "name": "lookup", "input": {}},
                {"type": "text", "text": "{\"calories_per_100g\": 130, \"protein\": 2.7, \"carbs\": 28, \"fat\": 0.3}"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let record = parse_nutrition_payload(&extract_text(reply(body)).unwrap()).unwrap();
        assert_eq!(record.calories_per_100g, 130.0);
        assert_eq!(record.protein, 2.7);
    }

    #[test]
    fn missing_text_is_a_parse_error() {
        assert!(matches!(
            extract_text(reply(r#"{"content": []}"#)),
            Err(ProviderError::Parse(_))
        ));
        assert!(matches!(
            extract_text(reply(r#"{"content": [{"type": "text", "text": ""}]}"#)),
            Err(ProviderError::Parse(_))
        ));
    }
}
